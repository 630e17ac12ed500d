use crate::errors::{Error, Result};
use crate::model::{ForecastRow, StoredRow};
use reqwest::{Client, Response, Url};
use std::time::Duration;
use tracing::{debug, info};

const ROWS_PATH: &str = "rows";
const FORECAST_PATH: &str = "forecast";
const INSIGHT_PATH: &str = "insight";

pub struct StoreClient {
    client: Client,
    base: Url,
}

impl StoreClient {
    pub fn new(base: &str, timeout: Duration) -> Result<Self> {
        // Without a trailing slash `join` would replace the last segment.
        let normalized = if base.ends_with('/') {
            base.to_string()
        } else {
            format!("{}/", base)
        };
        let base = Url::parse(&normalized)
            .map_err(|e| Error::Config(format!("invalid store URL {}: {}", base, e)))?;

        let client = Client::builder().timeout(timeout).build()?;
        info!(base = %base, "Created store client");

        Ok(Self { client, base })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Fetches every stored row, in whatever order the store returns them.
    pub async fn fetch_rows(&self) -> Result<Vec<StoredRow>> {
        let url = self.url(ROWS_PATH)?;
        let response = check(self.client.get(url).send().await?).await?;
        let body = response.text().await?;
        let rows: Vec<StoredRow> = serde_json::from_str(&body)?;

        debug!(rows = rows.len(), "Fetched stored rows");
        Ok(rows)
    }

    /// Replaces the whole forecast table.
    pub async fn replace_forecast(&self, rows: &[ForecastRow]) -> Result<()> {
        let url = self.url(FORECAST_PATH)?;
        check(self.client.put(url).json(rows).send().await?).await?;

        info!(rows = rows.len(), "Forecast table replaced");
        Ok(())
    }

    /// Stores the insight text verbatim.
    pub async fn store_insight(&self, text: &str) -> Result<()> {
        let url = self.url(INSIGHT_PATH)?;
        check(
            self.client
                .put(url)
                .header(reqwest::header::CONTENT_TYPE, "text/plain; charset=utf-8")
                .body(text.to_string())
                .send()
                .await?,
        )
        .await?;

        info!(chars = text.chars().count(), "Insight stored");
        Ok(())
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .map_err(|e| Error::Config(format!("invalid store path {}: {}", path, e)))
    }
}

async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(Error::Store {
        status: status.as_u16(),
        body,
    })
}
