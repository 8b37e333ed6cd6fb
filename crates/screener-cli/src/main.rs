use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use krx_client::KrxClient;
use market_gate::{GateVerdict, MarketGate};
use screener_core::ScreenerConfig;
use screener_engine::ScreenerEngine;

const DATA_DIR: &str = "data";
const DEFAULT_CAPITAL: f64 = 100_000_000.0;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env, init tracing
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let command = std::env::args().nth(1).unwrap_or_else(|| "run".to_string());

    let config = ScreenerConfig::from_env();
    let capital: f64 = std::env::var("SCREENER_CAPITAL")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_CAPITAL);

    let client = Arc::new(KrxClient::new(config.clone()));

    match command.as_str() {
        "run" => {
            let snapshot = run_gate(client.clone()).await?;
            if snapshot.gate == GateVerdict::Red {
                tracing::warn!(
                    score = snapshot.score,
                    "Market gate is RED, screening skipped"
                );
                return Ok(());
            }
            run_screener(client, config, capital).await?;
        }
        "screen" => {
            run_screener(client, config, capital).await?;
        }
        "gate" => {
            run_gate(client).await?;
        }
        other => {
            eprintln!("Unknown command: {other}");
            eprintln!("Usage: screener [run|screen|gate]");
            std::process::exit(2);
        }
    }

    Ok(())
}

/// Classify the market regime and persist the snapshot.
async fn run_gate(client: Arc<KrxClient>) -> Result<market_gate::RegimeSnapshot> {
    let gate = MarketGate::new(client);
    let snapshot = gate.analyze().await;

    for reason in &snapshot.analysis.reasons {
        tracing::info!("  {}", reason);
    }

    write_json(Path::new(DATA_DIR).join("market_gate.json"), &snapshot)?;
    Ok(snapshot)
}

/// Run a full screening pass and persist both the dated and the
/// latest-pointer result files.
async fn run_screener(
    client: Arc<KrxClient>,
    config: ScreenerConfig,
    capital: f64,
) -> Result<()> {
    let classifier = news_sentiment::classifier_from_env();
    let engine = ScreenerEngine::new(client, classifier, config);

    let result = engine.run(capital).await;

    for signal in &result.signals {
        tracing::info!(
            "{} {} [{}] grade {} ({} pts) entry {:.0} stop {:.0} qty {}",
            signal.stock_code,
            signal.stock_name,
            signal.market.as_str(),
            signal.grade.as_str(),
            signal.score.total(),
            signal.entry_price,
            signal.stop_price,
            signal.quantity,
        );
    }

    let dated = format!("screener_{}.json", result.date.format("%Y%m%d"));
    write_json(Path::new(DATA_DIR).join(dated), &result)?;
    write_json(Path::new(DATA_DIR).join("screener_latest.json"), &result)?;

    Ok(())
}

fn write_json<P: AsRef<Path>, T: serde::Serialize>(path: P, value: &T) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    tracing::info!("Wrote {}", path.display());
    Ok(())
}
