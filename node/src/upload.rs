use crate::errors::Result;
use crate::indicator::{BlinkPattern, Indicator};
use crate::metrics::{UPLOADS_REJECTED_TOTAL, UPLOADS_SUCCEEDED_TOTAL, UPLOAD_TRANSPORT_FAILURES_TOTAL};
use crate::telemetry::Reading;
use reqwest::{redirect, Client, StatusCode, Url};
use std::time::Duration;
use tracing::{info, warn};

/// Longest response body kept for diagnostics.
const MAX_DIAGNOSTIC_BODY: usize = 512;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// 200, 201, or 302. The store answers accepted writes with a redirect.
    Success { status: u16 },
    /// The store answered with anything else.
    Rejected { status: u16, body: String },
    /// No response at all: DNS, TLS, connect, or timeout.
    TransportFailure { reason: String },
}

impl UploadOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, UploadOutcome::Success { .. })
    }
}

pub fn is_accepted(status: StatusCode) -> bool {
    matches!(status, StatusCode::OK | StatusCode::CREATED | StatusCode::FOUND)
}

pub struct UploadClient {
    client: Client,
    endpoint: Url,
}

impl UploadClient {
    /// Redirects are not followed: a 302 is the store's acknowledgement.
    pub fn new(endpoint: Url, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .redirect(redirect::Policy::none())
            .build()?;
        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Sends the reading once and signals the outcome. Failed readings are
    /// dropped; the next cycle samples fresh.
    pub async fn deliver(&self, reading: Reading, indicator: &mut impl Indicator) -> UploadOutcome {
        let outcome = self.send(&reading).await;

        match &outcome {
            UploadOutcome::Success { status } => {
                UPLOADS_SUCCEEDED_TOTAL.inc();
                info!(status, timestamp = reading.timestamp.timestamp(), "Reading delivered");
                indicator.signal(BlinkPattern::Success);
            }
            UploadOutcome::Rejected { status, body } => {
                UPLOADS_REJECTED_TOTAL.inc();
                warn!(status, body = %body, "Reading rejected by remote store");
                indicator.signal(BlinkPattern::UploadFailed);
            }
            UploadOutcome::TransportFailure { reason } => {
                UPLOAD_TRANSPORT_FAILURES_TOTAL.inc();
                warn!(reason = %reason, "Reading not delivered");
                indicator.signal(BlinkPattern::UploadFailed);
            }
        }

        outcome
    }

    async fn send(&self, reading: &Reading) -> UploadOutcome {
        let response = match self
            .client
            .get(self.endpoint.clone())
            .query(&reading.to_query())
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                return UploadOutcome::TransportFailure {
                    reason: e.to_string(),
                }
            }
        };

        let status = response.status();
        if is_accepted(status) {
            return UploadOutcome::Success {
                status: status.as_u16(),
            };
        }

        let body = match response.text().await {
            Ok(text) => text.chars().take(MAX_DIAGNOSTIC_BODY).collect(),
            Err(e) => format!("<unreadable body: {}>", e),
        };
        UploadOutcome::Rejected {
            status: status.as_u16(),
            body,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepted_statuses() {
        assert!(is_accepted(StatusCode::OK));
        assert!(is_accepted(StatusCode::CREATED));
        assert!(is_accepted(StatusCode::FOUND));
    }

    #[test]
    fn test_rejected_statuses() {
        assert!(!is_accepted(StatusCode::NO_CONTENT));
        assert!(!is_accepted(StatusCode::MOVED_PERMANENTLY));
        assert!(!is_accepted(StatusCode::SEE_OTHER));
        assert!(!is_accepted(StatusCode::NOT_FOUND));
        assert!(!is_accepted(StatusCode::INTERNAL_SERVER_ERROR));
    }
}
