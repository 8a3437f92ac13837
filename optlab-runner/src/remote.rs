//! Networked collaborators: a remote scoring endpoint and a chat webhook.
//!
//! Both use a blocking `reqwest` client with a request timeout, so a slow
//! endpoint costs at most one timeout per call and never stalls a run.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use optlab_core::components::{
    check_probability, format_alert, Notifier, NotifyError, ScoringError, SignalSource,
};
use optlab_core::domain::{FeatureSnapshot, HorizonSpec, LifecycleEvent};

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

fn client(timeout: Duration) -> Result<reqwest::blocking::Client, RemoteError> {
    Ok(reqwest::blocking::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("optlab/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

#[derive(Debug, Serialize)]
struct ScoreRequest<'a> {
    features: BTreeMap<&'a str, f64>,
    horizon: &'a str,
}

#[derive(Debug, Deserialize)]
struct ScoreResponse {
    score: Option<f64>,
    #[serde(default)]
    error: Option<String>,
}

/// Scores by POSTing `{"features": {...}}` to a prediction endpoint and
/// reading `score` from the JSON response.
pub struct HttpSignal {
    client: reqwest::blocking::Client,
    url: String,
    features: Vec<String>,
}

impl HttpSignal {
    pub fn new(
        url: impl Into<String>,
        features: Vec<String>,
        timeout: Duration,
    ) -> Result<Self, RemoteError> {
        Ok(Self {
            client: client(timeout)?,
            url: url.into(),
            features,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl SignalSource for HttpSignal {
    fn name(&self) -> &str {
        "http"
    }

    fn required_features(&self) -> &[String] {
        &self.features
    }

    fn score(&self, snapshot: &FeatureSnapshot, horizon: &HorizonSpec) -> Result<f64, ScoringError> {
        let features = self
            .features
            .iter()
            .map(|name| Ok((name.as_str(), snapshot.require(name)?)))
            .collect::<Result<BTreeMap<_, _>, ScoringError>>()?;
        let body = ScoreRequest {
            features,
            horizon: &horizon.label,
        };

        let resp = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .map_err(|e| ScoringError::Remote(e.to_string()))?;
        let status = resp.status();
        let parsed: Result<ScoreResponse, _> = resp.json();

        if !status.is_success() {
            let detail = parsed
                .ok()
                .and_then(|r| r.error)
                .unwrap_or_else(|| "no detail".to_string());
            return Err(ScoringError::Remote(format!("HTTP {status}: {detail}")));
        }
        let parsed = parsed.map_err(|e| ScoringError::Remote(format!("bad response: {e}")))?;
        match parsed.score {
            Some(p) => check_probability(p),
            None => Err(ScoringError::Remote(
                parsed.error.unwrap_or_else(|| "response has no score".to_string()),
            )),
        }
    }
}

#[derive(Debug, Serialize)]
struct WebhookMessage {
    content: String,
}

/// Posts alerts to a chat webhook as `{"content": "..."}`.
///
/// One attempt per event; failures are returned for the caller to log.
pub struct WebhookNotifier {
    client: reqwest::blocking::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, RemoteError> {
        Ok(Self {
            client: client(timeout)?,
            url: url.into(),
        })
    }
}

impl Notifier for WebhookNotifier {
    fn name(&self) -> &str {
        "webhook"
    }

    fn notify(&self, event: &LifecycleEvent) -> Result<(), NotifyError> {
        let resp = self
            .client
            .post(&self.url)
            .json(&WebhookMessage {
                content: format_alert(event),
            })
            .send()
            .map_err(|e| NotifyError::Transport(e.to_string()))?;
        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(NotifyError::Rejected {
                status: status.as_u16(),
            })
        }
    }
}
