//! History service HTTP client
//!
//! Uses synchronous HTTP (ureq) on tokio's blocking pool, so a slow backend
//! never stalls the async side. Abandoning a call drops its future; the
//! blocking request may still run to completion but its result is discarded.

use async_trait::async_trait;
use chrono::Utc;
use log::debug;
use std::time::Duration;
use url::Url;

use super::api::{HistoryRecord, MutationResponse, SaveRequest};
use super::{GatewayError, HistoryGateway, normalize_record};
use crate::models::{HistoryDraft, HistoryId, HistoryItem};

/// HTTP implementation of HistoryGateway
#[derive(Clone)]
pub struct HttpHistoryGateway {
    agent: ureq::Agent,
    base_url: Url,
    timeout: Duration,
}

impl HttpHistoryGateway {
    /// Default backend location
    pub const DEFAULT_BASE_URL: &'static str = "http://localhost:8000/api";

    /// Create a client for the backend at `base_url`.
    ///
    /// # Arguments
    /// * `base_url` - API root, e.g. `http://localhost:8000/api`
    /// * `timeout` - Upper bound for each request, connect included
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, GatewayError> {
        Ok(Self {
            agent: agent_with_timeout(timeout),
            base_url: parse_base_url(base_url)?,
            timeout,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Build an endpoint URL from percent-encoded path segments
    fn endpoint(&self, segments: &[&str]) -> Result<Url, GatewayError> {
        let path = segments
            .iter()
            .map(|s| urlencoding::encode(s).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        self.base_url
            .join(&path)
            .map_err(|e| GatewayError::network(format!("Invalid endpoint {}: {}", path, e)))
    }

    async fn run_blocking<T, F>(&self, request: F) -> Result<T, GatewayError>
    where
        T: Send + 'static,
        F: FnOnce(ureq::Agent) -> Result<T, GatewayError> + Send + 'static,
    {
        run_blocking(&self.agent, self.timeout, request).await
    }
}

/// Parse an API root so that `Url::join` appends below it
pub(crate) fn parse_base_url(base_url: &str) -> Result<Url, GatewayError> {
    // A trailing slash makes Url::join append rather than replace the last segment
    let normalized = format!("{}/", base_url.trim_end_matches('/'));
    Url::parse(&normalized)
        .map_err(|e| GatewayError::network(format!("Invalid base URL {}: {}", base_url, e)))
}

/// Agent whose every request, connect included, ends within `timeout`
pub(crate) fn agent_with_timeout(timeout: Duration) -> ureq::Agent {
    let config = ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build();
    ureq::Agent::new_with_config(config)
}

/// Run a blocking request on the blocking pool, bounded by `timeout`
pub(crate) async fn run_blocking<T, F>(agent: &ureq::Agent, timeout: Duration, request: F) -> Result<T, GatewayError>
where
    T: Send + 'static,
    F: FnOnce(ureq::Agent) -> Result<T, GatewayError> + Send + 'static,
{
    let agent = agent.clone();
    let task = tokio::task::spawn_blocking(move || request(agent));

    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_error)) => Err(GatewayError::network(format!(
            "Request worker failed: {}",
            join_error
        ))),
        Err(_) => Err(GatewayError::Timeout),
    }
}

/// Headers that keep proxies and the HTTP stack from answering with a
/// cached list
fn no_cache<B>(request: ureq::RequestBuilder<B>) -> ureq::RequestBuilder<B> {
    request
        .header("Cache-Control", "no-cache, no-store, must-revalidate")
        .header("Pragma", "no-cache")
        .header("Expires", "0")
        .header("X-Requested-At", Utc::now().timestamp_millis().to_string())
}

/// Map a transport error, naming the resource for 404s
pub(crate) fn map_error(err: ureq::Error, resource: &str) -> GatewayError {
    match err {
        ureq::Error::StatusCode(404) => GatewayError::NotFound {
            resource: resource.to_string(),
        },
        ureq::Error::StatusCode(401) => GatewayError::Unauthenticated,
        ureq::Error::StatusCode(status) => GatewayError::ServerError {
            status,
            message: format!("{} request rejected", resource),
        },
        ureq::Error::Timeout(_) => GatewayError::Timeout,
        ureq::Error::Json(e) => GatewayError::malformed(e.to_string()),
        other => GatewayError::network(other.to_string()),
    }
}

#[async_trait]
impl HistoryGateway for HttpHistoryGateway {
    async fn list_history(&self, username: &str) -> Result<Vec<HistoryItem>, GatewayError> {
        let url = self.endpoint(&["history", username])?;
        let username = username.to_string();
        debug!("GET {}", url);

        self.run_blocking(move |agent| {
            let resource = format!("history of {}", username);
            let mut response = no_cache(agent.get(url.as_str()))
                .call()
                .map_err(|e| map_error(e, &resource))?;

            let records: Vec<HistoryRecord> = response
                .body_mut()
                .read_json()
                .map_err(|e| map_error(e, &resource))?;

            Ok(records
                .into_iter()
                .map(|record| normalize_record(record, &username))
                .collect())
        })
        .await
    }

    async fn get_detail(&self, id: HistoryId) -> Result<HistoryItem, GatewayError> {
        let url = self.endpoint(&["history", "detail", &id.to_string()])?;
        debug!("GET {}", url);

        self.run_blocking(move |agent| {
            let resource = format!("history {}", id);
            let mut response = no_cache(agent.get(url.as_str()))
                .call()
                .map_err(|e| map_error(e, &resource))?;

            let record: HistoryRecord = response
                .body_mut()
                .read_json()
                .map_err(|e| map_error(e, &resource))?;

            if record.id != id.value() {
                return Err(GatewayError::malformed(format!(
                    "Asked for history {}, got {}",
                    id, record.id
                )));
            }

            Ok(normalize_record(record, ""))
        })
        .await
    }

    async fn save_history(&self, draft: &HistoryDraft) -> Result<HistoryId, GatewayError> {
        let url = self.endpoint(&["history", "save"])?;
        let draft = draft.clone();
        debug!("POST {}", url);

        self.run_blocking(move |agent| {
            let body = SaveRequest {
                username: &draft.username,
                original_code: &draft.original_code,
                review_summary: draft.artifact.feedback.as_deref().unwrap_or_default(),
                fixed_code: draft.artifact.revised_code.as_deref().unwrap_or_default(),
                language: &draft.language,
                error_lines: &draft.error_lines,
                kind: draft.kind.code(),
            };

            let mut response = agent
                .post(url.as_str())
                .send_json(&body)
                .map_err(|e| map_error(e, "history save"))?;

            let saved: MutationResponse = response
                .body_mut()
                .read_json()
                .map_err(|e| map_error(e, "history save"))?;

            if !saved.success {
                return Err(GatewayError::ServerError {
                    status: 200,
                    message: saved.message.unwrap_or_else(|| "Save rejected".to_string()),
                });
            }

            saved
                .history_id
                .map(HistoryId::new)
                .ok_or_else(|| GatewayError::malformed("Save response has no historyId"))
        })
        .await
    }

    async fn delete_history(&self, id: HistoryId, username: &str) -> Result<(), GatewayError> {
        let mut url = self.endpoint(&["history", &id.to_string()])?;
        url.query_pairs_mut().append_pair("username", username);
        debug!("DELETE {}", url);

        self.run_blocking(move |agent| {
            let resource = format!("history {}", id);
            agent
                .delete(url.as_str())
                .call()
                .map_err(|e| map_error(e, &resource))?;
            Ok(())
        })
        .await
    }
}
