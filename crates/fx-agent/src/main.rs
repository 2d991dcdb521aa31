use std::sync::Arc;
use std::time::Duration;

use alert_manager::{FxDb, InboxChannel};
use anyhow::{Context, Result};
use fx_core::CurrencyPair;
use fx_engine::FxEngine;
use notification_service::{NotificationConfig, NotificationService};
use serde::Serialize;
use tokio::signal::unix::SignalKind;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

mod config;

use config::AgentConfig;

const USAGE: &str = "Usage: fx-agent [COMMAND]

Commands:
  run                          Run the prediction and alert-check schedules (default)
  predict                      Run one prediction sweep and print the summary
  check                        Run one alert-check sweep and print the summary
  trend <BASE/QUOTE> [days]    Print the trend report for a pair
  opportunities                Print buy/sell/hold opportunities for tracked pairs
  alerts <BASE/QUOTE>          Print every stored alert for a pair";

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load .env, init tracing
    dotenvy::dotenv().ok();

    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .with_writer(std::io::stderr)
            .init();
    }

    std::panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
        tracing::error!("PANIC: {info}");
    }));

    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(String::as_str).unwrap_or("run");
    if matches!(command, "help" | "--help" | "-h") {
        println!("{}", USAGE);
        return Ok(());
    }

    // 2. Configuration
    let config = AgentConfig::from_env().context("Failed to load configuration")?;
    tracing::info!("Configuration loaded and validated");
    tracing::info!(
        "  Tracked pairs: {}",
        config
            .tracked_pairs
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );
    tracing::info!(
        "  Window: {} days, horizon: {} days",
        config.prediction_window_days,
        config.prediction_horizon_days
    );

    // 3. Store and notification channels
    if !config.database_url.contains(":memory:") && !FxDb::exists(&config.database_url) {
        tracing::info!("Creating new database at {}", config.database_url);
    }
    let db = FxDb::new(&config.database_url)
        .await
        .with_context(|| format!("Failed to open database {}", config.database_url))?;

    let notifications = NotificationService::new(&NotificationConfig::from_env())
        .with_channel(InboxChannel::new(db.clone()));
    tracing::info!("Notification channels: {}", notifications.channel_names().join(", "));

    let db = Arc::new(db);
    let engine = FxEngine::new(
        config.engine_config(),
        db.clone(),
        db.clone(),
        Arc::new(notifications),
    );

    // 4. Dispatch
    match command {
        "run" => run_schedules(&engine, &config).await,
        "predict" => {
            let summary = engine.run_prediction_sweep(&CancellationToken::new()).await;
            print_json(&summary)
        }
        "check" => {
            let summary = engine.run_trigger_check_sweep(&CancellationToken::new()).await;
            print_json(&summary)
        }
        "trend" => {
            let pair: CurrencyPair = args
                .get(2)
                .context("Usage: fx-agent trend <BASE/QUOTE> [days]")?
                .parse()?;
            let days: i64 = match args.get(3) {
                Some(raw) => raw.parse().context("days must be an integer")?,
                None => config.prediction_window_days,
            };

            match engine.get_trend(&pair, days).await {
                Ok(report) => print_json(&report),
                Err(e) if e.is_not_found() => {
                    anyhow::bail!("No exchange rate data found for {} in the last {} days", pair, days)
                }
                Err(e) => Err(e.into()),
            }
        }
        "opportunities" => print_json(&engine.get_opportunities().await),
        "alerts" => {
            let pair: CurrencyPair = args
                .get(2)
                .context("Usage: fx-agent alerts <BASE/QUOTE>")?
                .parse()?;
            print_json(&db.list_alerts_for_pair(&pair).await?)
        }
        other => {
            eprintln!("{}", USAGE);
            anyhow::bail!("Unknown command: {}", other)
        }
    }
}

/// Run both sweeps on their intervals until SIGINT or SIGTERM.
async fn run_schedules(engine: &FxEngine, config: &AgentConfig) -> Result<()> {
    tracing::info!(
        "Starting FX agent: prediction every {}s, alert check every {}s",
        config.prediction_interval_seconds,
        config.alert_check_interval_seconds
    );

    let shutdown = CancellationToken::new();
    let mut sigterm = tokio::signal::unix::signal(SignalKind::terminate())?;
    let watcher = shutdown.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received SIGINT");
            }
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM");
            }
        }
        watcher.cancel();
    });

    let mut prediction_interval = time::interval(Duration::from_secs(config.prediction_interval_seconds));
    let mut check_interval = time::interval(Duration::from_secs(config.alert_check_interval_seconds));
    prediction_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    check_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = prediction_interval.tick() => {
                engine.run_prediction_sweep(&shutdown).await;
            }
            _ = check_interval.tick() => {
                engine.run_trigger_check_sweep(&shutdown).await;
            }
            _ = shutdown.cancelled() => {
                tracing::info!("Shutdown signal received, exiting gracefully...");
                break;
            }
        }
    }

    tracing::info!("FX agent shut down.");
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
