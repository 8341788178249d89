//! Label Reader - command line front end
//!
//! Runs the label pipeline on stored images with recorded detector masks and
//! OCR output, and exposes the QR and reconciliation stages on their own.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use label_reader::config::{self, AppConfig};
use label_reader::storage::{self, records};
use label_reader::vision::detection::RecordedDetector;
use label_reader::vision::ocr::{load_text_blocks, RecordedRecognizer};
use label_reader::vision::qr::{QrLocator, QrPayload};
use label_reader::{LabelFrame, LabelPipeline, TextReconciler};

/// Label Reader - QR-validated label recognition
#[derive(Parser, Debug)]
#[command(name = "label-reader")]
#[command(about = "Reads shipping labels and validates them against their QR code")]
struct Args {
    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the full pipeline on one frame
    Process {
        /// Frame image
        #[arg(long)]
        image: PathBuf,
        /// Binary label mask produced by the detector
        #[arg(long)]
        mask: PathBuf,
        /// Recorded OCR blocks for the merged text regions (JSON)
        #[arg(long)]
        ocr: PathBuf,
        /// Write the record as pretty JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Append the record to a JSON-lines log
        #[arg(long)]
        append: Option<PathBuf>,
    },
    /// Reconcile recorded OCR blocks against a QR text
    Reconcile {
        /// OCR blocks (JSON)
        #[arg(long)]
        blocks: PathBuf,
        /// Decoded QR text, e.g. 110125-VA-M-000002-2
        #[arg(long)]
        qr: Option<String>,
    },
    /// Decode the QR code in an image
    DecodeQr {
        #[arg(long)]
        image: PathBuf,
    },
    /// Write the default configuration
    InitConfig {
        /// Destination (defaults to the platform config directory)
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = config::load_or_default_logged(args.config.as_deref(), std::io::stderr)?;

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match args.command {
        Command::Process {
            image,
            mask,
            ocr,
            output,
            append,
        } => run_process(&config, &image, &mask, &ocr, output.as_deref(), append.as_deref()),
        Command::Reconcile { blocks, qr } => run_reconcile(&config, &blocks, qr.as_deref()),
        Command::DecodeQr { image } => run_decode_qr(&config, &image),
        Command::InitConfig { path } => run_init_config(path),
    }
}

fn run_process(
    config: &AppConfig,
    image: &Path,
    mask: &Path,
    ocr: &Path,
    output: Option<&Path>,
    append: Option<&Path>,
) -> Result<()> {
    let frame = LabelFrame::from_path(image)?;
    let mut detector = RecordedDetector::from_mask_file(mask)?;
    let mut recognizer = RecordedRecognizer::from_json_file(ocr)?;
    let pipeline = LabelPipeline::from_config(config);

    info!("Processing frame {} from {:?}", frame.id, image);
    let result = pipeline
        .process_frame(&frame, &mut detector, &mut recognizer)
        .map_err(|e| anyhow::anyhow!("{} stage: {}", e.stage(), e))?;

    if let Some(path) = output {
        records::save_record(&result.record, path)?;
        info!("Record written to {:?}", path);
    }
    if let Some(path) = append {
        records::append_record(&result.record, path)?;
    }

    let summary = serde_json::json!({
        "frameId": result.frame_id,
        "record": result.record,
        "qr": result.qr,
        "rectification": result.rectify_message,
        "degradedRegions": result.regions.is_degraded(),
        "processingTimeMs": result.processing_time_ms,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn run_reconcile(config: &AppConfig, blocks: &Path, qr: Option<&str>) -> Result<()> {
    let blocks = load_text_blocks(blocks)?;
    let payload = qr.map(|text| QrPayload::new(text, [(0, 0); 4], 1.0));
    let reconciler = TextReconciler::from_settings(&config.reconciliation);

    let record = reconciler.reconcile(&blocks, payload.as_ref());
    println!("{}", serde_json::to_string_pretty(&record)?);
    if !record.has_position() {
        anyhow::bail!("position/quantity not found");
    }
    Ok(())
}

fn run_decode_qr(config: &AppConfig, path: &Path) -> Result<()> {
    let image = image::open(path).with_context(|| format!("Failed to open image {:?}", path))?;
    let locator = QrLocator::new(config.qr.clone());

    match locator.detect(&image)? {
        Some(payload) => println!("{}", serde_json::to_string_pretty(&payload)?),
        None => anyhow::bail!("no QR code detected"),
    }
    Ok(())
}

fn run_init_config(path: Option<PathBuf>) -> Result<()> {
    let path = match path {
        Some(path) => path,
        None => storage::get_config_dir()?.join("config.toml"),
    };
    config::save_config(&AppConfig::default(), &path)?;
    println!("Default configuration written to {}", path.display());
    Ok(())
}
