use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use paragon_ocr::engines::correction::HttpTextCorrector;
use paragon_ocr::engines::vision::HttpVisionModel;
use paragon_ocr::engines::ClassicalOcr;
use paragon_ocr::{ExtractionRequest, FileKind, PipelineConfig, ReceiptPipeline};

#[derive(Parser, Debug)]
#[command(name = "paragon-ocr")]
#[command(about = "Receipt OCR extraction pipeline")]
#[command(version)]
struct Args {
    /// Receipt image or PDF document to process
    input: PathBuf,

    /// Input type: auto, image, or document
    #[arg(long, default_value = "auto")]
    file_type: String,

    /// Fallback text used when every engine fails (e.g. an email body)
    #[arg(long)]
    fallback_text: Option<String>,

    /// Base URL of the OpenAI-compatible model endpoint
    #[arg(long, env = "OCR_VISION_BASE_URL", default_value = "https://api.openai.com/v1")]
    vision_base_url: String,

    /// Vision model id
    #[arg(long, env = "OCR_VISION_MODEL", default_value = "gpt-4o-mini")]
    vision_model: String,

    /// API key for the model endpoint; vision and correction are disabled
    /// when absent
    #[arg(long, env = "OPENAI_API_KEY")]
    api_key: Option<String>,

    /// Vision call timeout in seconds
    #[arg(long, env = "OCR_VISION_TIMEOUT", default_value = "60")]
    vision_timeout_secs: u64,

    /// Disable the model-based text-correction pass
    #[arg(long)]
    no_correction: bool,

    /// Retries per pipeline stage
    #[arg(long, env = "OCR_MAX_RETRIES", default_value = "2")]
    max_retries: u32,

    /// Tesseract language for the fallback engine (requires the
    /// engine-tesseract feature)
    #[arg(long, env = "OCR_TESSERACT_LANGUAGE", default_value = "pol")]
    tesseract_language: String,

    /// Print accumulated pipeline statistics after the run
    #[arg(long)]
    stats: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let bytes = std::fs::read(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;

    let kind = resolve_file_kind(&args.file_type, &bytes)?;
    tracing::info!(input = %args.input.display(), kind = kind.as_str(), "starting extraction");

    let config = PipelineConfig {
        vision_timeout: Duration::from_secs(args.vision_timeout_secs),
        max_retries: args.max_retries,
        ..PipelineConfig::default()
    };

    let classical = build_classical()?;
    let mut builder = ReceiptPipeline::builder(config, classical);

    if let Some(api_key) = &args.api_key {
        let vision = HttpVisionModel::new(&args.vision_base_url, api_key, &args.vision_model)
            .map_err(|e| anyhow::anyhow!("{e}"))?;
        builder = builder.with_vision(Arc::new(vision));

        if !args.no_correction {
            let corrector =
                HttpTextCorrector::new(&args.vision_base_url, api_key, &args.vision_model)
                    .map_err(|e| anyhow::anyhow!("{e}"))?;
            builder = builder.with_corrector(Arc::new(corrector));
        }
    } else {
        tracing::warn!("no API key configured, vision and correction passes disabled");
    }

    if let Some(fallback) = build_fallback(&args.tesseract_language)? {
        builder = builder.with_fallback(fallback);
    }

    let pipeline = builder.build();

    let mut request = ExtractionRequest { bytes, kind, fallback_text: None };
    if let Some(text) = args.fallback_text {
        request = request.with_fallback_text(text);
    }

    match pipeline.run(request).await {
        Ok(response) => {
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Err(failure) => {
            eprintln!("{}", serde_json::to_string_pretty(&failure)?);
            if args.stats {
                print_stats(&pipeline)?;
            }
            std::process::exit(1);
        }
    }

    if args.stats {
        print_stats(&pipeline)?;
    }

    Ok(())
}

fn resolve_file_kind(flag: &str, bytes: &[u8]) -> anyhow::Result<FileKind> {
    match flag {
        "auto" => Ok(if bytes.starts_with(b"%PDF-") {
            FileKind::Document
        } else {
            FileKind::Image
        }),
        other => FileKind::from_str(other)
            .ok_or_else(|| anyhow::anyhow!("unknown file type '{other}' (expected auto, image or document)")),
    }
}

#[cfg(feature = "engine-ocrs")]
fn build_classical() -> anyhow::Result<Arc<dyn ClassicalOcr>> {
    let engine = paragon_ocr::engines::ocrs::OcrsClassical::new()
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    Ok(Arc::new(engine))
}

#[cfg(not(feature = "engine-ocrs"))]
fn build_classical() -> anyhow::Result<Arc<dyn ClassicalOcr>> {
    anyhow::bail!("no classical OCR engine available; build with --features engine-ocrs")
}

#[cfg(feature = "engine-tesseract")]
fn build_fallback(
    language: &str,
) -> anyhow::Result<Option<Arc<dyn paragon_ocr::engines::FallbackOcr>>> {
    let engine = paragon_ocr::engines::tesseract::TesseractFallback::new(language)
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    Ok(Some(Arc::new(engine)))
}

#[cfg(not(feature = "engine-tesseract"))]
fn build_fallback(
    _language: &str,
) -> anyhow::Result<Option<Arc<dyn paragon_ocr::engines::FallbackOcr>>> {
    Ok(None)
}

fn print_stats(pipeline: &ReceiptPipeline) -> anyhow::Result<()> {
    eprintln!("{}", serde_json::to_string_pretty(&pipeline.statistics())?);
    Ok(())
}
