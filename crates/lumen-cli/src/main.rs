//! Lumen CLI: translate thumbor paths and run edits against local images.
//!
//! Configuration comes from the environment (see `lumen_core::Config`).

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use lumen_cli::{init_tracing, load_edits, resolve_path, DisabledDetection, Pipeline};
use lumen_core::Config;
use lumen_storage::create_storage;
use lumen_thumbor::ThumborMapper;
use lumen_vision::{DetectionService, RekognitionDetection};
use serde::Serialize;
use serde_json::json;

#[derive(Parser)]
#[command(name = "lumen", about = "Image handler CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Translate a thumbor-style URL path into an edit document
    Translate {
        /// Request path, e.g. /fit-in/200x200/filters:grayscale()/photo.jpg
        path: String,
        /// Rewrite the path with REWRITE_MATCH_PATTERN first
        #[arg(long)]
        custom: bool,
    },
    /// Apply edits to a local image and write the encoded result
    Process {
        /// Source image
        #[arg(long)]
        input: PathBuf,
        /// Edit document as JSON
        #[arg(long, conflicts_with = "path")]
        edits: Option<String>,
        /// Thumbor-style request path
        #[arg(long)]
        path: Option<String>,
        /// Rewrite --path with REWRITE_MATCH_PATTERN first
        #[arg(long, requires = "path")]
        custom: bool,
        /// Output format: jpeg, png, webp, tiff, heif, avif or raw
        #[arg(long)]
        format: Option<String>,
        /// WebP reduction effort
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=6))]
        effort: Option<u8>,
        /// Where to write the output image
        #[arg(long)]
        output: PathBuf,
        /// Skip Rekognition; smartCrop and contentModeration will fail
        #[arg(long)]
        no_detection: bool,
    },
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Serialize response")?
    );
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Load configuration")?;
    init_tracing(config.log_format);

    let cli = Cli::parse();
    let mapper = ThumborMapper::new()?;

    match cli.command {
        Commands::Translate { path, custom } => {
            let path = resolve_path(&path, custom, &config.rewrite)?;
            let edits = mapper.map_path_to_edits(&path);
            print_json(&json!({ "path": path, "edits": edits }))?;
        }
        Commands::Process {
            input,
            edits,
            path,
            custom,
            format,
            effort,
            output,
            no_detection,
        } => {
            let path = path
                .map(|path| resolve_path(&path, custom, &config.rewrite))
                .transpose()?;
            let edits = load_edits(&mapper, edits.as_deref(), path.as_deref())?;
            let original = tokio::fs::read(&input)
                .await
                .with_context(|| format!("Read {}", input.display()))?;

            let storage = create_storage(&config)
                .await
                .context("Initialise storage")?;
            let detection: Arc<dyn DetectionService> = if no_detection {
                Arc::new(DisabledDetection)
            } else {
                Arc::new(RekognitionDetection::new(&config.aws_region).await)
            };

            let pipeline = Pipeline::new(storage, detection, config.fallback_image.clone());
            let report = pipeline
                .run(&original, &edits, format.as_deref(), effort, &output)
                .await?;
            print_json(&report)?;
        }
    }

    Ok(())
}
