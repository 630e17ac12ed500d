use anyhow::{Context, Result};
use clap::Parser;
use forecaster::config::{Cli, Command, ForecastConfig, InsightConfig, StoreConfig};
use forecaster::errors::Error;
use forecaster::forecast::ForecastEngine;
use forecaster::insight::InsightClient;
use forecaster::jobs;
use forecaster::store::StoreClient;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    cli.store.validate().context("Invalid store configuration")?;

    let run_id = uuid::Uuid::new_v4();
    info!(%run_id, store = %cli.store.store_url, "Starting forecaster");

    let store = StoreClient::new(&cli.store.store_url, cli.store.timeout()).context("Failed to build store client")?;

    match cli.command {
        Command::Forecast(config) => forecast(&store, config).await,
        Command::Insight(config) => insight(&store, &cli.store, config).await,
    }
}

async fn forecast(store: &StoreClient, config: ForecastConfig) -> Result<()> {
    config.validate().context("Invalid forecast configuration")?;
    let engine = ForecastEngine::new(config.min_history, config.horizon_hours);

    match jobs::run_forecast(store, &engine).await {
        Ok(rows) => {
            info!(rows = rows.len(), "Forecast run complete");
            Ok(())
        }
        Err(e @ Error::InsufficientData { .. }) => {
            error!(error = %e, "Forecast aborted, forecast table left unchanged");
            Err(e.into())
        }
        Err(e) => Err(e).context("Forecast run failed"),
    }
}

async fn insight(store: &StoreClient, store_config: &StoreConfig, config: InsightConfig) -> Result<()> {
    let config = config.with_env_key();
    config.validate().context("Invalid insight configuration")?;
    let api_key = config.api_key.as_deref().unwrap_or_default();

    let client = InsightClient::new(&config.endpoint, api_key, store_config.timeout());
    let text = jobs::run_insight(store, &client, config.recent_rows)
        .await
        .context("Insight run failed")?;

    info!(chars = text.chars().count(), "Insight run complete");
    Ok(())
}
