//! Lumen CLI
//!
//! Plumbing shared by the `lumen` binary: tracing setup, edit loading and the
//! process pipeline with its fallback-image path.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use lumen_core::{
    EditDocument, ErrorMetadata, FallbackImageConfig, ImageHandlerError, LogFormat, LogLevel,
    RewriteConfig,
};
use lumen_processing::{EditApplicator, FallbackImage};
use lumen_storage::Storage;
use lumen_thumbor::{parse_custom_path, ThumborMapper};
use lumen_vision::{
    DetectionError, DetectionResult, DetectionService, FaceDetail, ModerationLabel,
};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber. Log lines go to stderr so stdout stays JSON.
pub fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "lumen=debug".into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

/// Detection backend used with `--no-detection`: every call fails.
pub struct DisabledDetection;

const DETECTION_DISABLED: &str = "Face and moderation detection is disabled";

#[async_trait]
impl DetectionService for DisabledDetection {
    async fn detect_faces(&self, _image: &[u8]) -> DetectionResult<Vec<FaceDetail>> {
        Err(DetectionError::ConfigError(DETECTION_DISABLED.to_string()))
    }

    async fn detect_moderation_labels(
        &self,
        _image: &[u8],
        _min_confidence: f32,
    ) -> DetectionResult<Vec<ModerationLabel>> {
        Err(DetectionError::ConfigError(DETECTION_DISABLED.to_string()))
    }
}

/// Apply the configured rewrite to `path` when `custom` is set.
pub fn resolve_path(path: &str, custom: bool, rewrite: &RewriteConfig) -> anyhow::Result<String> {
    if !custom {
        return Ok(path.to_string());
    }
    let rewritten = parse_custom_path(Some(path), rewrite)?;
    tracing::debug!(path = %path, rewritten = %rewritten, "Rewrote custom path");
    Ok(rewritten)
}

/// Build the edit document from either a JSON edits argument or a thumbor path.
pub fn load_edits(
    mapper: &ThumborMapper,
    edits: Option<&str>,
    path: Option<&str>,
) -> anyhow::Result<EditDocument> {
    match (edits, path) {
        (Some(_), Some(_)) => anyhow::bail!("--edits and --path cannot be combined"),
        (Some(json), None) => {
            let value: serde_json::Value =
                serde_json::from_str(json).context("Parse edits JSON")?;
            Ok(EditDocument::from_json(&value)?)
        }
        (None, Some(path)) => Ok(mapper.translate(path)?),
        (None, None) => Ok(EditDocument::default()),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    pub status_code: u16,
    pub code: String,
    pub message: String,
}

impl From<&ImageHandlerError> for ErrorReport {
    fn from(err: &ImageHandlerError) -> Self {
        ErrorReport {
            status_code: err.http_status_code(),
            code: err.error_code().to_string(),
            message: err.to_string(),
        }
    }
}

/// Summary printed after `lumen process`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessReport {
    pub output: String,
    pub content_type: &'static str,
    pub size_bytes: usize,
    pub fallback: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorReport>,
}

/// Applicator plus the fallback image it falls back to on failure.
pub struct Pipeline {
    applicator: EditApplicator,
    storage: Arc<dyn Storage>,
    fallback: FallbackImageConfig,
}

impl Pipeline {
    pub fn new(
        storage: Arc<dyn Storage>,
        detection: Arc<dyn DetectionService>,
        fallback: FallbackImageConfig,
    ) -> Self {
        Pipeline {
            applicator: EditApplicator::new(storage.clone(), detection),
            storage,
            fallback,
        }
    }

    /// Process `original` and write the decoded body to `output`.
    ///
    /// A failed request is answered with the fallback image when one is
    /// configured; otherwise the failure is returned.
    pub async fn run(
        &self,
        original: &[u8],
        edits: &EditDocument,
        output_format: Option<&str>,
        reduction_effort: Option<u8>,
        output: &Path,
    ) -> anyhow::Result<ProcessReport> {
        let err = match self
            .applicator
            .process(original, edits, output_format, reduction_effort)
            .await
        {
            Ok(processed) => {
                let size_bytes = write_body(&processed.body_base64, output).await?;
                return Ok(ProcessReport {
                    output: output.display().to_string(),
                    content_type: processed.content_type,
                    size_bytes,
                    fallback: false,
                    cache_control: None,
                    error: None,
                });
            }
            Err(err) => err,
        };

        log_failure(&err);

        let fallback = match FallbackImage::load(self.storage.as_ref(), &self.fallback).await {
            Ok(fallback) => fallback,
            Err(fallback_err) => {
                tracing::warn!(error = %fallback_err, "Fallback image could not be loaded");
                None
            }
        };
        let Some(fallback) = fallback else {
            return Err(err.into());
        };

        let size_bytes = write_body(&fallback.body_base64, output).await?;
        Ok(ProcessReport {
            output: output.display().to_string(),
            content_type: fallback.content_type,
            size_bytes,
            fallback: true,
            cache_control: Some(fallback.cache_control),
            error: Some(ErrorReport::from(&err)),
        })
    }
}

fn log_failure(err: &ImageHandlerError) {
    let status = err.http_status_code();
    let code = err.error_code();
    match err.log_level() {
        LogLevel::Debug => tracing::debug!(status, code, error = %err, "Image request failed"),
        LogLevel::Warn => tracing::warn!(status, code, error = %err, "Image request failed"),
        LogLevel::Error => tracing::error!(status, code, error = %err, "Image request failed"),
    }
}

async fn write_body(body_base64: &str, output: &Path) -> anyhow::Result<usize> {
    let bytes = STANDARD
        .decode(body_base64)
        .context("Decode base64 body")?;
    tokio::fs::write(output, &bytes)
        .await
        .with_context(|| format!("Write {}", output.display()))?;
    Ok(bytes.len())
}
