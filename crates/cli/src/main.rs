//! Burndown CLI - velocity-based completion forecasts.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use burndown_core::{AlertId, BoardId, BurndownAlert, BurndownPrediction, ConfidenceLevel, Time};
use burndown_service::{
    BoardExport, EngineConfig, ForecastService, GenerateRequest, StorageConfig,
};
use burndown_storage::{JsonStorage, SqliteStorage, Storage};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "burndown")]
#[command(about = "Probabilistic completion forecasts from team velocity", long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use JSON storage in this directory
    #[arg(long, global = true, conflicts_with = "sqlite")]
    storage: Option<PathBuf>,

    /// Use a SQLite database file
    #[arg(long, global = true)]
    sqlite: Option<PathBuf>,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Recompute velocity snapshots from a board export
    Snapshot {
        /// Board export (JSON)
        #[arg(long)]
        board: PathBuf,
        /// Start of the first period (default: day of the first completion)
        #[arg(long, value_parser = parse_time)]
        from: Option<Time>,
        /// Only periods closing at or before this time (default: now)
        #[arg(long, value_parser = parse_time)]
        until: Option<Time>,
    },
    /// Run one forecast generation cycle
    Forecast {
        /// Board export (JSON)
        #[arg(long)]
        board: PathBuf,
        /// Target date (default: next incomplete milestone)
        #[arg(long, value_parser = parse_time)]
        target: Option<Time>,
        /// Confidence level: 90, 95 or 99
        #[arg(long, value_parser = parse_confidence)]
        confidence: Option<ConfidenceLevel>,
        /// Print the prediction as JSON
        #[arg(long)]
        json: bool,
    },
    /// List past predictions
    History {
        /// Board ID
        board: String,
        /// Show only the most recent N
        #[arg(long)]
        limit: Option<usize>,
    },
    /// List alerts
    Alerts {
        /// Board ID
        board: String,
        /// Include resolved alerts
        #[arg(long)]
        all: bool,
    },
    /// Acknowledge an alert
    Ack {
        /// Board ID
        board: String,
        /// Alert ID
        id: String,
    },
    /// Resolve an alert
    Resolve {
        /// Board ID
        board: String,
        /// Alert ID
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };
    if let Some(path) = cli.storage {
        config = config.with_storage(StorageConfig::Json { path });
    }
    if let Some(path) = cli.sqlite {
        config = config.with_storage(StorageConfig::Sqlite { path });
    }

    let storage = open_storage(&config.storage).await?;

    match cli.command {
        Commands::Snapshot { board, from, until } => {
            let export = BoardExport::from_file(&board).await?;
            let board_id = export.board_id.clone();
            let service = ForecastService::new(storage, Arc::new(export), config);

            let snapshots = service
                .refresh_snapshots(&board_id, from, until.unwrap_or_else(Utc::now))
                .await?;

            println!("Snapshots for {} ({})", board_id, snapshots.len());
            for s in snapshots {
                println!(
                    "  {} .. {} | {:>3} tasks | {:>6.1} pts | quality {}",
                    s.period_start.format("%Y-%m-%d"),
                    s.period_end.format("%Y-%m-%d"),
                    s.tasks_completed,
                    s.story_points_completed,
                    s.quality_score
                        .map(|q| format!("{:.0}", q))
                        .unwrap_or_else(|| "-".to_string()),
                );
            }
        }
        Commands::Forecast {
            board,
            target,
            confidence,
            json,
        } => {
            let export = BoardExport::from_file(&board).await?;
            let board_id = export.board_id.clone();
            let service = ForecastService::new(storage, Arc::new(export), config);

            let request = GenerateRequest {
                target_date: target,
                confidence_level: confidence,
            };
            let prediction = match service.generate(&board_id, request).await {
                Err(e) if e.is_insufficient_data() => {
                    println!("Not enough history to forecast {}: {}", board_id, e);
                    return Ok(());
                }
                other => other?,
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&prediction)?);
            } else {
                print_prediction(&prediction);
                for alert in service.open_alerts(&board_id).await? {
                    print_alert(&alert);
                }
            }
        }
        Commands::History { board, limit } => {
            let predictions = storage.list_predictions(&BoardId::new(board)).await?;
            let skip = limit.map_or(0, |n| predictions.len().saturating_sub(n));

            println!("Predictions ({})", predictions.len());
            for p in predictions.iter().skip(skip) {
                println!(
                    "  {} | {} | remaining {:.1} | predicted {} | risk {}",
                    p.id,
                    p.generated_at.format("%Y-%m-%d %H:%M"),
                    p.remaining_work,
                    p.predicted_completion_date.format("%Y-%m-%d"),
                    p.risk_level.as_str(),
                );
            }
        }
        Commands::Alerts { board, all } => {
            let board_id = BoardId::new(board);
            let alerts = if all {
                storage.list_alerts(&board_id).await?
            } else {
                storage.list_open_alerts(&board_id).await?
            };

            println!("Alerts ({})", alerts.len());
            for alert in &alerts {
                print_alert(alert);
            }
        }
        Commands::Ack { board, id } => {
            let (service, board_id, alert_id) = alert_service(storage, config, board, &id)?;
            let alert = service.acknowledge(&board_id, alert_id).await?;
            info!("Acknowledged {}", alert.id);
            print_alert(&alert);
        }
        Commands::Resolve { board, id } => {
            let (service, board_id, alert_id) = alert_service(storage, config, board, &id)?;
            let alert = service.resolve(&board_id, alert_id).await?;
            info!("Resolved {}", alert.id);
            print_alert(&alert);
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn open_storage(config: &StorageConfig) -> Result<Arc<dyn Storage>> {
    let storage: Arc<dyn Storage> = match config {
        StorageConfig::Json { path } => {
            debug!("Opening JSON storage at {}", path.display());
            Arc::new(JsonStorage::new(path).await?)
        }
        StorageConfig::Sqlite { path } => {
            debug!("Opening SQLite storage at {}", path.display());
            Arc::new(SqliteStorage::new_from_path(path).await?)
        }
    };
    Ok(storage)
}

fn alert_service(
    storage: Arc<dyn Storage>,
    config: EngineConfig,
    board: String,
    id: &str,
) -> Result<(ForecastService, BoardId, AlertId)> {
    let alert_id: AlertId = id.parse().with_context(|| format!("Invalid alert ID: {}", id))?;
    let board_id = BoardId::new(board);
    let source = Arc::new(BoardExport::empty(board_id.clone()));
    Ok((ForecastService::new(storage, source, config), board_id, alert_id))
}

fn parse_time(s: &str) -> std::result::Result<Time, String> {
    if let Ok(t) = s.parse::<Time>() {
        return Ok(t);
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map(|d| d.and_time(chrono::NaiveTime::MIN).and_utc())
        .map_err(|_| format!("expected RFC 3339 or YYYY-MM-DD, got '{}'", s))
}

fn parse_confidence(s: &str) -> std::result::Result<ConfidenceLevel, String> {
    let value: u8 = s.trim_end_matches('%').parse().map_err(|_| format!("not a number: '{}'", s))?;
    ConfidenceLevel::try_from(value).map_err(|e| e.to_string())
}

fn print_prediction(p: &BurndownPrediction) {
    println!("Forecast for {} ({} confidence)", p.board_id, p.confidence_level);
    println!("  Remaining: {:.1} {}", p.remaining_work, p.basis.as_str());
    println!(
        "  Predicted: {}  [{} .. {}]  (±{:.1} days)",
        p.predicted_completion_date.format("%Y-%m-%d"),
        p.completion_date_lower_bound.format("%Y-%m-%d"),
        p.completion_date_upper_bound.format("%Y-%m-%d"),
        p.days_margin_of_error,
    );
    println!(
        "  Velocity: {:.2} ± {:.2} per period (CV {:.1}%, {}, trend {})",
        p.velocity_mean,
        p.velocity_std_dev,
        p.velocity_cv,
        p.cv_bucket.as_str(),
        p.velocity_trend.as_str(),
    );
    match (p.target_date, p.delay_probability) {
        (Some(target), Some(delay)) => println!(
            "  Target: {}  delay probability {:.1}%  risk {}",
            target.format("%Y-%m-%d"),
            delay,
            p.risk_level.as_str()
        ),
        _ => println!("  Target: none  risk {}", p.risk_level.as_str()),
    }
    for s in &p.actionable_suggestions {
        println!("  [{:>3}] {}: {}", s.priority, s.suggestion_type.as_str(), s.text);
    }
}

fn print_alert(alert: &BurndownAlert) {
    println!(
        "  {} | {} | {} | {} - {}",
        alert.id,
        alert.alert_type,
        alert.severity.as_str(),
        alert.status.as_str(),
        alert.message,
    );
}
