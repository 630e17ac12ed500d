use crate::model::{Metric, StoredRow};
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::json;
use std::fmt::Write;
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_ENDPOINT: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash:generateContent";

const UNAVAILABLE_PREFIX: &str = "Insight unavailable";

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

pub struct InsightClient {
    client: Option<Client>,
    endpoint: String,
    api_key: String,
}

impl InsightClient {
    pub fn new(endpoint: &str, api_key: &str, timeout: Duration) -> Self {
        let client = match Client::builder().timeout(timeout).build() {
            Ok(client) => Some(client),
            Err(e) => {
                warn!(error = %e, "Failed to build insight HTTP client");
                None
            }
        };

        Self {
            client,
            endpoint: endpoint.to_string(),
            api_key: api_key.to_string(),
        }
    }

    /// Sends one request. The returned string is either the model's text or
    /// a diagnostic starting with "Insight unavailable".
    pub async fn generate(&self, prompt: &str) -> String {
        match self.request(prompt).await {
            Ok(text) => {
                info!(chars = text.chars().count(), "Insight generated");
                text
            }
            Err(reason) => {
                warn!(reason = %reason, "Insight generation failed");
                format!("{}: {}", UNAVAILABLE_PREFIX, reason)
            }
        }
    }

    async fn request(&self, prompt: &str) -> Result<String, String> {
        let client = self.client.as_ref().ok_or("HTTP client unavailable")?;
        let mut url = Url::parse(&self.endpoint).map_err(|e| format!("invalid endpoint: {}", e))?;
        url.query_pairs_mut().append_pair("key", &self.api_key);

        let body = json!({ "contents": [{ "parts": [{ "text": prompt }] }] });

        // Errors are reported without the URL; it carries the API key.
        let response = client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| format!("request failed: {}", e.without_url()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| format!("failed to read response: {}", e.without_url()))?;

        if status != reqwest::StatusCode::OK {
            return Err(format!("service returned {}", status.as_u16()));
        }

        parse_response(&text)
    }
}

fn parse_response(body: &str) -> Result<String, String> {
    let parsed: GenerateResponse =
        serde_json::from_str(body).map_err(|e| format!("malformed response: {}", e))?;

    let text = parsed
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .and_then(|content| content.parts.into_iter().next())
        .map(|part| part.text)
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err("empty response".to_string());
    }
    Ok(text)
}

/// Summarises the newest `recent` rows into a prompt.
pub fn build_prompt(rows: &[StoredRow], recent: usize) -> String {
    let mut sorted = rows.to_vec();
    sorted.sort_by_key(|row| row.timestamp);
    let start = sorted.len().saturating_sub(recent);
    let window = &sorted[start..];

    let mut prompt = String::from(
        "You are monitoring an environmental sensor station measuring water level distance (cm), \
         temperature (C), relative humidity (%) and barometric pressure (hPa). \
         Summarise the recent conditions and any notable trends in a short paragraph.\n\n",
    );

    if let (Some(first), Some(last)) = (window.first(), window.last()) {
        let _ = writeln!(
            prompt,
            "{} readings from {} to {}:",
            window.len(),
            first.timestamp.to_rfc3339(),
            last.timestamp.to_rfc3339()
        );
    } else {
        prompt.push_str("No readings are available.\n");
        return prompt;
    }

    for metric in Metric::ALL {
        let values: Vec<f64> = window
            .iter()
            .filter_map(|row| metric.value(row))
            .filter(|v| v.is_finite())
            .collect();

        let Some(latest) = values.last() else {
            let _ = writeln!(prompt, "- {}: no data", metric);
            continue;
        };
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean = values.iter().sum::<f64>() / values.len() as f64;

        let _ = writeln!(
            prompt,
            "- {}: latest {:.2}, min {:.2}, max {:.2}, mean {:.2}",
            metric, latest, min, max, mean
        );
    }

    prompt
}
