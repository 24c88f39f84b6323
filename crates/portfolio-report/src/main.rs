use std::path::Path;

use anyhow::{Context, Result};
use portfolio_manager::{PortfolioManager, ShownAlerts};
use serde::de::DeserializeOwned;

mod config;
mod report;

use config::ReportConfig;
use report::{build_report, ReportInputs};

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

async fn read_optional<T: DeserializeOwned + Default>(path: Option<&Path>) -> Result<T> {
    match path {
        Some(path) => read_json(path).await,
        None => Ok(T::default()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load .env, init tracing
    dotenvy::dotenv().ok();

    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let env_filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };
    // Logs go to stderr so stdout carries only the report
    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter())
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter())
            .with_writer(std::io::stderr)
            .init();
    }

    // 2. Configuration
    let config = ReportConfig::from_env()?;
    let as_of = config
        .as_of
        .unwrap_or_else(|| chrono::Utc::now().date_naive());
    tracing::info!("Valuing portfolio as of {}", as_of);
    tracing::info!(
        "  Short-term rate: {}, long-term rate: {}, long-term after {} days",
        config.tax_rules.short_term_rate,
        config.tax_rules.long_term_rate,
        config.tax_rules.long_term_threshold_days
    );

    // 3. Inputs
    let inputs = ReportInputs {
        lots: read_json(&config.lots_path).await?,
        prices: read_optional(config.prices_path.as_deref()).await?,
        sells: read_optional(config.sells_path.as_deref()).await?,
        targets: read_optional(config.targets_path.as_deref()).await?,
    };
    tracing::info!(
        "Loaded {} lots, {} prices, {} sells, {} targets",
        inputs.lots.len(),
        inputs.prices.len(),
        inputs.sells.len(),
        inputs.targets.len()
    );

    let mut shown: ShownAlerts = match config.shown_alerts_path.as_deref() {
        Some(path) if path.exists() => read_json(path).await?,
        _ => ShownAlerts::default(),
    };

    // 4. Compute
    let manager = PortfolioManager::new(config.tax_rules.clone())?;
    let report = build_report(&manager, inputs, &mut shown, as_of)?;

    if let Some(xirr) = report.summary.weighted_xirr {
        tracing::info!("Weighted portfolio XIRR: {:.2}%", xirr);
    } else {
        tracing::info!("Weighted portfolio XIRR undetermined");
    }
    for alert in &report.alerts {
        tracing::warn!("{}", alert.message);
    }

    // 5. Persist alert state, print report
    if let Some(path) = config.shown_alerts_path.as_deref() {
        let raw = serde_json::to_string_pretty(&shown)?;
        tokio::fs::write(path, raw)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
    }

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
