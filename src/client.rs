//! Blocking HTTP client for the external budget forecaster.
//!
//! - One `POST` endpoint taking a [`ForecastRequest`] and answering with a
//!   [`ForecastResponse`].
//! - The whole call (connect, send, receive) is capped by a global timeout.
//! - Non-2xx answers are read and reported with their body instead of being
//!   turned into opaque transport errors.

use http::StatusCode;
use log::debug;
use std::time::Duration;

use crate::models::forecast::{ForecastRequest, ForecastResponse};

pub const DEFAULT_FORECAST_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest error body kept in an [`ForecastClientError::Http`] message.
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, thiserror::Error)]
pub enum ForecastClientError {
    #[error("forecaster did not answer within {0:?}")]
    Timeout(Duration),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("http {status}: {message}")]
    Http { status: u16, message: String },
    #[error("unexpected response body: {0}")]
    Decode(String),
}

/// The forecasting collaborator, as seen by the orchestrator.
pub trait Forecaster {
    fn forecast(&self, request: &ForecastRequest) -> Result<ForecastResponse, ForecastClientError>;
}

pub struct ForecastClient {
    agent: ureq::Agent,
    url: String,
    timeout: Duration,
}

impl ForecastClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build()
            .into();
        ForecastClient {
            agent,
            url: url.into(),
            timeout,
        }
    }

    fn map_transport(&self, err: ureq::Error) -> ForecastClientError {
        match err {
            ureq::Error::Timeout(_) => ForecastClientError::Timeout(self.timeout),
            ureq::Error::Io(e) if e.kind() == std::io::ErrorKind::TimedOut => ForecastClientError::Timeout(self.timeout),
            other => ForecastClientError::Transport(other.to_string()),
        }
    }
}

impl Forecaster for ForecastClient {
    fn forecast(&self, request: &ForecastRequest) -> Result<ForecastResponse, ForecastClientError> {
        debug!(
            "POST {} ({} historical day(s), budget {}, as of {})",
            self.url,
            request.historical_data.len(),
            request.budget,
            request.current_date
        );
        let mut resp = self
            .agent
            .post(&self.url)
            .header("Accept", "application/json")
            .send_json(request)
            .map_err(|e| self.map_transport(e))?;

        let status: StatusCode = resp.status();
        let body = resp.body_mut().read_to_string().map_err(|e| self.map_transport(e))?;
        if !status.is_success() {
            return Err(ForecastClientError::Http {
                status: status.as_u16(),
                message: truncate(&body, MAX_ERROR_BODY),
            });
        }
        decode_response(&body)
    }
}

/// Parses a forecaster answer; errors name the offending JSON path.
pub fn decode_response(body: &str) -> Result<ForecastResponse, ForecastClientError> {
    let de = &mut serde_json::Deserializer::from_str(body);
    serde_path_to_error::deserialize(de).map_err(|e| ForecastClientError::Decode(e.to_string()))
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
