use crate::errors::Result;
use crate::forecast::ForecastEngine;
use crate::insight::{build_prompt, InsightClient};
use crate::model::{ForecastRow, Metric};
use crate::store::StoreClient;
use tracing::{debug, info};

/// fetch → fit every metric → replace the forecast table.
///
/// Nothing is written unless every metric has enough history.
pub async fn run_forecast(store: &StoreClient, engine: &ForecastEngine) -> Result<Vec<ForecastRow>> {
    let rows = store.fetch_rows().await?;
    info!(rows = rows.len(), "Loaded history");

    let forecast = engine.forecast_rows(&rows)?;
    for metric in Metric::ALL {
        if let Some(next) = engine.forecast_points(&forecast, metric).first() {
            debug!(
                %metric,
                timestamp = next.timestamp.timestamp(),
                point = next.band.point,
                lower = next.band.lower,
                upper = next.band.upper,
                "Next hour"
            );
        }
    }

    store.replace_forecast(&forecast).await?;
    Ok(forecast)
}

/// fetch → prompt → generate → store. Generation failures are stored as
/// diagnostic text; only store errors fail the routine.
pub async fn run_insight(store: &StoreClient, client: &InsightClient, recent_rows: usize) -> Result<String> {
    let rows = store.fetch_rows().await?;
    let prompt = build_prompt(&rows, recent_rows);

    let text = client.generate(&prompt).await;
    store.store_insight(&text).await?;
    Ok(text)
}
