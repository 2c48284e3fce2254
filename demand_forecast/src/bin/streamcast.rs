use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use demand_forecast::catalog::Catalog;
use demand_forecast::checkpoint::Checkpoint;
use demand_forecast::config::PipelineConfig;
use demand_forecast::model::DemandForecastModel;
use demand_forecast::pipeline::Pipeline;
use demand_forecast::series::SeriesSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| format!("Invalid date '{}': {}", s, e))
}

#[derive(Parser, Debug)]
#[command(name = "streamcast")]
#[command(about = "Daily track demand forecasting", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file. CLI flags override values from the file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Random seed for generation, splitting and initialization
    #[arg(long, global = true)]
    seed: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a synthetic staging dataset from a track catalog
    Generate {
        /// Catalog CSV
        #[arg(long)]
        catalog: PathBuf,

        /// First day to generate
        #[arg(long, value_parser = parse_date)]
        start: NaiveDate,

        /// Last day to generate (inclusive)
        #[arg(long, value_parser = parse_date)]
        end: NaiveDate,

        /// Only generate for this many tracks, sampled deterministically
        #[arg(long)]
        sample: Option<usize>,

        /// Emit the playlist_adds covariate
        #[arg(long)]
        playlist_adds: bool,

        /// Staging CSV to write
        #[arg(short, long, default_value = "data/staging/daily_streams.csv")]
        output: PathBuf,
    },

    /// Validate a daily demand table, train a model and evaluate it
    Train {
        /// Staging or mart CSV with track_id, date and stream_count
        #[arg(short, long)]
        input: PathBuf,

        /// Catalog CSV used for per-genre metrics
        #[arg(long)]
        catalog: Option<PathBuf>,

        /// Reject rows before this date
        #[arg(long, value_parser = parse_date)]
        start: Option<NaiveDate>,

        /// Reject rows after this date
        #[arg(long, value_parser = parse_date)]
        end: Option<NaiveDate>,

        #[arg(long)]
        epochs: Option<usize>,

        #[arg(long)]
        checkpoint_dir: Option<PathBuf>,

        /// Continue from a checkpoint, e.g. the last.ckpt of a stopped run
        #[arg(long)]
        resume: Option<PathBuf>,

        /// Where to save the best model
        #[arg(long, default_value = "models/model.ckpt")]
        model_output: PathBuf,

        /// Directory for the forecast table, evaluation report and run summary
        #[arg(short, long, default_value = "output")]
        output_dir: PathBuf,
    },

    /// Forecast the days after the end of a daily demand table
    Forecast {
        /// Staging or mart CSV with track_id, date and stream_count
        #[arg(short, long)]
        input: PathBuf,

        /// Checkpoint to load
        #[arg(long)]
        model: PathBuf,

        /// Forecast CSV to write
        #[arg(short, long, default_value = "output/forecast.csv")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    let mut config = match &cli.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            PipelineConfig::from_file(path)?
        }
        None => PipelineConfig::default(),
    };
    if let Some(seed) = cli.seed {
        config.random_seed = seed;
        config.generator.random_seed = seed;
    }

    match cli.command {
        Commands::Generate {
            catalog,
            start,
            end,
            sample,
            playlist_adds,
            output,
        } => {
            config.generator.emit_playlist_adds |= playlist_adds;
            let mut catalog = Catalog::from_csv(&catalog)?;
            if let Some(n) = sample {
                catalog = catalog.sample(n, config.generator.random_seed);
            }
            let pipeline = Pipeline::new(config)?;
            let series = pipeline.generate(&catalog, start, end)?;
            series.write_csv(&output)?;
        }
        Commands::Train {
            input,
            catalog,
            start,
            end,
            epochs,
            checkpoint_dir,
            resume,
            model_output,
            output_dir,
        } => {
            if let Some(epochs) = epochs {
                config.num_epochs = epochs;
            }
            if checkpoint_dir.is_some() {
                config.checkpoint_dir = checkpoint_dir;
            }
            let declared_range = match (start, end) {
                (Some(start), Some(end)) => Some((start, end)),
                (None, None) => None,
                _ => anyhow::bail!("--start and --end must be given together"),
            };

            let catalog = catalog.as_deref().map(Catalog::from_csv).transpose()?;
            let series = SeriesSet::from_csv(&input)?;
            let pipeline = Pipeline::new(config)?;

            let stop = Arc::new(AtomicBool::new(false));
            let handler_stop = Arc::clone(&stop);
            ctrlc::set_handler(move || {
                warn!("Interrupt received, stopping after the current epoch");
                handler_stop.store(true, Ordering::SeqCst);
            })
            .context("Failed to install Ctrl-C handler")?;

            let resume = resume
                .map(|path| {
                    Checkpoint::load(&path)
                        .with_context(|| format!("Failed to load checkpoint from {:?}", path))
                })
                .transpose()?;
            let outcome =
                pipeline.train_from(&series, catalog.as_ref(), declared_range, stop, resume)?;
            outcome.model.save(&model_output)?;
            info!("Saved model to {}", model_output.display());

            outcome.forecasts.write_csv(output_dir.join("forecast.csv"))?;
            outcome.evaluation.write_json(output_dir.join("evaluation.json"))?;
            write_text(&output_dir.join("training_run.json"), &outcome.run.to_json()?)?;
            write_text(&output_dir.join("validation.json"), &outcome.validation.to_json()?)?;
            println!("{}", outcome.evaluation);
        }
        Commands::Forecast {
            input,
            model,
            output,
        } => {
            let model = DemandForecastModel::load(&model)
                .with_context(|| format!("Failed to load model from {:?}", model))?;
            let series = SeriesSet::from_csv(&input)?;
            let pipeline = Pipeline::new(config)?;
            let forecasts = pipeline.forecast(&model, &series)?;
            forecasts.write_csv(&output)?;
        }
    }

    Ok(())
}

fn write_text(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content).with_context(|| format!("Failed to write {:?}", path))?;
    info!("Saved {}", path.display());
    Ok(())
}
