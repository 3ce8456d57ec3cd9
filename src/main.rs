use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::{Parser, Subcommand};
use image::ImageReader;
use time::UtcOffset;

use weighbot::bot::{Bot, polling::run_polling, telegram::TelegramClient};
use weighbot::config::{Config, DetectorConfig};
use weighbot::detection::{DigitDetector, DigitReconstructor, Reconstruction, YoloDetector, YoloParams};
use weighbot::{WeightDb, logging};

#[derive(Parser)]
#[command(name = "weighbot")]
#[command(about = "Read weighing-scale photos over Telegram and keep a weight log")]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the Telegram bot (default)
    Run,
    /// Read the scale display in a local image and print the result
    Detect {
        /// Path to input image file
        #[arg(value_name = "IMAGE")]
        image_path: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    logging::init_logger(args.verbose);

    // must be queried before the runtime starts its worker threads
    let local_offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);

    match args.command.unwrap_or(Commands::Run) {
        Commands::Detect { image_path } => detect(image_path),
        Commands::Run => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("Failed to start async runtime")?;
            runtime.block_on(run(local_offset))
        }
    }
}

async fn run(local_offset: UtcOffset) -> anyhow::Result<()> {
    let config = Config::from_env()?;

    let detector = Arc::new(YoloDetector::load(
        &config.detector.model_path,
        YoloParams::default(),
    )?);
    let reconstructor = DigitReconstructor::new().with_integer_digits(config.detector.integer_digits);

    tracing::info!(host = %config.db.host, port = config.db.port, db = %config.db.name, "Connecting to database");
    let store = match WeightDb::connect(&config.db).await {
        Ok(db) => {
            tracing::info!("Database connected and schema verified");
            Some(db)
        }
        Err(err) => {
            tracing::error!(error = ?err, "Database unavailable, storage commands disabled");
            None
        }
    };

    let client = TelegramClient::new(&config.telegram_api_url, &config.bot_token)?;
    let me = client.get_me().await.context("Failed to reach Telegram with the given BOT_TOKEN")?;
    tracing::info!(id = me.id, username = ?me.username, "Bot authenticated");

    let bot = Arc::new(
        Bot::new(client, store.clone(), detector, reconstructor).with_display_offset(local_offset),
    );
    run_polling(bot).await?;

    if let Some(db) = store {
        db.close().await;
    }
    Ok(())
}

fn detect(image_path: PathBuf) -> anyhow::Result<()> {
    let config = DetectorConfig::from_env()?;

    tracing::info!("Loading image: {}", image_path.display());
    let img = ImageReader::open(&image_path)?
        .decode()
        .with_context(|| format!("Failed to decode image {}", image_path.display()))?;
    tracing::info!("Image loaded: {}x{}", img.width(), img.height());

    let detector = YoloDetector::load(&config.model_path, YoloParams::default())?;
    let reconstructor = DigitReconstructor::new().with_integer_digits(config.integer_digits);

    let mut detections = detector.detect(&img)?;
    detections.sort_by(|a, b| a.bbox.center_x().total_cmp(&b.bbox.center_x()));

    println!("\n=== Scale Display Detections ===");
    println!("Total detections: {}", detections.len());
    for d in &detections {
        println!(
            "  '{}' at ({:.0}, {:.0}) - confidence: {:.2}",
            d.symbol(),
            d.bbox.x1,
            d.bbox.y1,
            d.confidence
        );
    }

    match reconstructor.reconstruct(&detections) {
        Reconstruction::Reading(reading) => println!("\nReading: {}", reading),
        Reconstruction::NoObjects => println!("\nNo symbols detected."),
        Reconstruction::LowConfidence => println!(
            "\nNo symbol reached confidence {:.2}.",
            reconstructor.confidence_threshold
        ),
    }

    Ok(())
}
