//! Lesionscope CLI
//!
//! `serve` runs the HTTP service, `predict` classifies a single image file and
//! writes the overlay next to it.

use super::config::CliConfigBuilder;
use crate::{
    inference::ClassifierModel,
    processor::PredictionPipeline,
    server,
    tracing_config::{spans, TracingConfig, TracingFormat},
    ServiceConfig,
};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Skin lesion classification service with visual explanations
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "lesionscope")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP prediction service
    Serve(ServeArgs),
    /// Classify one image file and write its overlay
    Predict(PredictArgs),
}

/// Options shared by every subcommand
#[derive(Args, Debug, Clone, Default)]
pub struct CommonArgs {
    /// Model directory containing model.json
    #[arg(short, long, env = "LESIONSCOPE_MODEL_DIR", value_name = "DIR")]
    pub model: Option<PathBuf>,

    /// JSON configuration file; flags override its values
    #[arg(short, long, env = "LESIONSCOPE_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log format
    #[arg(long, value_enum, env = "LESIONSCOPE_LOG_FORMAT", default_value_t = CliLogFormat::Console)]
    pub log_format: CliLogFormat,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ServeArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Address to bind
    #[arg(long, env = "LESIONSCOPE_HOST")]
    pub host: Option<String>,

    /// Port to listen on [default: 5000]
    #[arg(short, long, env = "LESIONSCOPE_PORT")]
    pub port: Option<u16>,

    /// Largest accepted request body in bytes
    #[arg(long, env = "LESIONSCOPE_MAX_UPLOAD_BYTES")]
    pub max_upload_bytes: Option<usize>,

    /// Requests processed at once (0 = unlimited)
    #[arg(long, env = "LESIONSCOPE_MAX_CONCURRENT_REQUESTS")]
    pub max_concurrent_requests: Option<usize>,

    /// Per-request deadline in seconds
    #[arg(long, env = "LESIONSCOPE_REQUEST_TIMEOUT_SECS")]
    pub request_timeout_secs: Option<u64>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct PredictArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Image to classify
    #[arg(value_name = "IMAGE")]
    pub image: PathBuf,

    /// Where to write the overlay [default: <IMAGE stem>_overlay.<ext>]
    #[arg(short, long, value_name = "OUTPUT")]
    pub output: Option<PathBuf>,

    /// Include the base64 overlay in the printed JSON
    #[arg(long)]
    pub include_image: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug, Default)]
pub enum CliLogFormat {
    #[default]
    Console,
    Compact,
    #[cfg(feature = "tracing-json")]
    Json,
}

impl From<CliLogFormat> for TracingFormat {
    fn from(format: CliLogFormat) -> Self {
        match format {
            CliLogFormat::Console => Self::Console,
            CliLogFormat::Compact => Self::Compact,
            #[cfg(feature = "tracing-json")]
            CliLogFormat::Json => Self::Json,
        }
    }
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    let common = match &cli.command {
        Command::Serve(args) => &args.common,
        Command::Predict(args) => &args.common,
    };
    init_tracing(common).context("Failed to initialize tracing")?;

    match cli.command {
        Command::Serve(args) => serve(&args).await,
        Command::Predict(args) => predict(&args).await,
    }
}

fn init_tracing(common: &CommonArgs) -> Result<()> {
    TracingConfig::new()
        .with_verbosity(common.verbose)
        .with_format(common.log_format.into())
        .with_env_filter_from_env()
        .init()
        .context("Failed to initialize tracing subscriber")
}

fn load_model(model_dir: &Path) -> Result<Arc<ClassifierModel>> {
    let _span = spans::model_loading(model_dir).entered();
    let model = ClassifierModel::load(model_dir)
        .with_context(|| format!("Failed to load model from {}", model_dir.display()))?;

    info!(
        name = %model.manifest().name,
        backend = model.backend_name(),
        labels = ?model.labels(),
        "Model loaded"
    );
    Ok(Arc::new(model))
}

fn model_dir(config: &ServiceConfig) -> Result<&Path> {
    config.model_dir.as_deref().context(
        "No model directory given. Use --model, LESIONSCOPE_MODEL_DIR or model_dir in the config file",
    )
}

async fn serve(args: &ServeArgs) -> Result<()> {
    let config = CliConfigBuilder::from_serve_args(args).context("Invalid configuration")?;
    debug!(config = ?config, "Resolved configuration");

    let model = load_model(model_dir(&config)?)?;
    server::serve(&config, model)
        .await
        .context("Server terminated with an error")
}

async fn predict(args: &PredictArgs) -> Result<()> {
    let config = CliConfigBuilder::from_predict_args(args).context("Invalid configuration")?;
    let model = load_model(model_dir(&config)?)?;
    let pipeline = PredictionPipeline::new(model, &config)?;

    let bytes = tokio::fs::read(&args.image)
        .await
        .with_context(|| format!("Failed to read {}", args.image.display()))?;

    let image = args.image.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        let _span = spans::offline_prediction(&image).entered();
        pipeline.predict_bytes(&bytes, None)
    })
    .await
    .context("Prediction task failed")?
    .with_context(|| format!("Prediction failed for {}", args.image.display()))?;

    let output = args.output.clone().unwrap_or_else(|| {
        default_output_path(&args.image, config.overlay.format.extension())
    });
    tokio::fs::write(&output, &outcome.composite.bytes)
        .await
        .with_context(|| format!("Failed to write overlay to {}", output.display()))?;

    let mut body = serde_json::to_value(&outcome.response)?;
    if !args.include_image {
        if let Some(object) = body.as_object_mut() {
            object.remove("superimposed_image");
        }
    }
    println!("{}", serde_json::to_string_pretty(&body)?);

    info!(
        output = %output.display(),
        total_ms = outcome.timings.total_ms,
        degraded = outcome.explanation_degraded,
        "Overlay written"
    );
    Ok(())
}

/// `scans/mole.jpg` -> `scans/mole_overlay.<ext>`
fn default_output_path(image: &Path, extension: &str) -> PathBuf {
    let stem = image
        .file_stem()
        .map_or_else(|| "image".into(), |s| s.to_string_lossy());
    image.with_file_name(format!("{stem}_overlay.{extension}"))
}
