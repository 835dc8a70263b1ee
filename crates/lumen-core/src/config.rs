//! Configuration module
//!
//! Settings are read from the environment (optionally seeded from a `.env` file)
//! and checked with `validate` before any collaborator is built.

use std::env;

use crate::storage_types::StorageBackend;

const DEFAULT_AWS_REGION: &str = "us-east-1";
const DEFAULT_LOCAL_STORAGE_PATH: &str = "./data/images";

/// Output format for log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Rewrite rule for the custom-path pass (`REWRITE_MATCH_PATTERN` + `REWRITE_SUBSTITUTION`).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RewriteConfig {
    pub match_pattern: Option<String>,
    pub substitution: Option<String>,
}

/// Image returned in place of an error response when enabled.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FallbackImageConfig {
    pub enabled: bool,
    pub bucket: Option<String>,
    pub key: Option<String>,
}

impl FallbackImageConfig {
    /// Bucket and key when the fallback is enabled and both are non-blank.
    pub fn location(&self) -> Option<(&str, &str)> {
        if !self.enabled {
            return None;
        }
        let bucket = self.bucket.as_deref().filter(|b| !b.trim().is_empty())?;
        let key = self.key.as_deref().filter(|k| !k.trim().is_empty())?;
        Some((bucket, key))
    }
}

/// Application configuration
#[derive(Clone, Debug)]
pub struct Config {
    pub environment: String,
    pub aws_region: String,
    pub storage_backend: StorageBackend,
    pub s3_endpoint: Option<String>, // Custom endpoint for S3-compatible providers (MinIO etc.)
    pub local_storage_path: String,
    pub rewrite: RewriteConfig,
    pub fallback_image: FallbackImageConfig,
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            environment: "development".to_string(),
            aws_region: DEFAULT_AWS_REGION.to_string(),
            storage_backend: StorageBackend::S3,
            s3_endpoint: None,
            local_storage_path: DEFAULT_LOCAL_STORAGE_PATH.to_string(),
            rewrite: RewriteConfig::default(),
            fallback_image: FallbackImageConfig::default(),
            log_format: LogFormat::Text,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        let aws_region = env::var("AWS_REGION")
            .or_else(|_| env::var("AWS_DEFAULT_REGION"))
            .unwrap_or_else(|_| DEFAULT_AWS_REGION.to_string());

        let storage_backend = match env::var("STORAGE_BACKEND") {
            Ok(value) => value.parse()?,
            Err(_) => StorageBackend::S3,
        };

        let s3_endpoint = env::var("S3_ENDPOINT").ok().filter(|s| !s.is_empty());
        let local_storage_path = env::var("LOCAL_STORAGE_PATH")
            .unwrap_or_else(|_| DEFAULT_LOCAL_STORAGE_PATH.to_string());

        let rewrite = RewriteConfig {
            match_pattern: env::var("REWRITE_MATCH_PATTERN").ok(),
            substitution: env::var("REWRITE_SUBSTITUTION").ok(),
        };

        let fallback_image = FallbackImageConfig {
            enabled: env::var("ENABLE_DEFAULT_FALLBACK_IMAGE")
                .map(|v| v == "Yes")
                .unwrap_or(false),
            bucket: env::var("DEFAULT_FALLBACK_IMAGE_BUCKET").ok(),
            key: env::var("DEFAULT_FALLBACK_IMAGE_KEY").ok(),
        };

        let log_format = match env::var("LOG_FORMAT") {
            Ok(value) if value.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Text,
        };

        let config = Config {
            environment,
            aws_region,
            storage_backend,
            s3_endpoint,
            local_storage_path,
            rewrite,
            fallback_image,
            log_format,
        };

        config.validate()?;
        Ok(config)
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let env = self.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.aws_region.trim().is_empty() {
            return Err(anyhow::anyhow!("AWS_REGION cannot be empty"));
        }

        if self.storage_backend == StorageBackend::Local && self.local_storage_path.trim().is_empty()
        {
            return Err(anyhow::anyhow!(
                "LOCAL_STORAGE_PATH is required when STORAGE_BACKEND=local"
            ));
        }

        if let Some(ref endpoint) = self.s3_endpoint {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err(anyhow::anyhow!(
                    "S3_ENDPOINT must start with http:// or https://, got {}",
                    endpoint
                ));
            }
        }

        if self.fallback_image.enabled && self.fallback_image.location().is_none() {
            return Err(anyhow::anyhow!(
                "DEFAULT_FALLBACK_IMAGE_BUCKET and DEFAULT_FALLBACK_IMAGE_KEY are required when ENABLE_DEFAULT_FALLBACK_IMAGE=Yes"
            ));
        }

        Ok(())
    }
}
