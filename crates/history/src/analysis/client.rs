//! Analysis service HTTP client

use async_trait::async_trait;
use log::debug;
use std::time::Duration;
use url::Url;

use super::api::{AnalysisResponse, AnalyzeRequest};
use super::{Analysis, AnalysisGateway, AnalysisRequest};
use crate::gateway::{GatewayError, agent_with_timeout, map_error, parse_base_url, run_blocking};
use crate::models::AnalysisKind;

/// HTTP implementation of AnalysisGateway
#[derive(Clone)]
pub struct HttpAnalysisGateway {
    agent: ureq::Agent,
    base_url: Url,
    timeout: Duration,
}

impl HttpAnalysisGateway {
    /// Create a client for the analysis endpoints under `base_url`.
    ///
    /// Analyses run a model on the server, so `timeout` is usually longer
    /// than the history service's.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, GatewayError> {
        Ok(Self {
            agent: agent_with_timeout(timeout),
            base_url: parse_base_url(base_url)?,
            timeout,
        })
    }

    fn endpoint(kind: AnalysisKind) -> &'static str {
        match kind {
            AnalysisKind::Review => "review",
            AnalysisKind::Explain => "explain",
            AnalysisKind::Suggest => "suggest",
        }
    }

    async fn post(
        &self,
        kind: AnalysisKind,
        username: Option<&str>,
        request: &AnalysisRequest,
    ) -> Result<Analysis, GatewayError> {
        let url = self
            .base_url
            .join(Self::endpoint(kind))
            .map_err(|e| GatewayError::network(format!("Invalid endpoint: {}", e)))?;
        let request = request.clone();
        let username = username.map(str::to_string);
        debug!("POST {}", url);

        run_blocking(&self.agent, self.timeout, move |agent| {
            let submitter = username.as_deref();
            let body = AnalyzeRequest {
                language: &request.language,
                code: &request.code,
                user: submitter.filter(|_| kind == AnalysisKind::Review),
                username: submitter.filter(|_| kind == AnalysisKind::Explain),
            };
            let resource = kind.label().to_lowercase();

            let mut response = agent
                .post(url.as_str())
                .send_json(&body)
                .map_err(|e| map_error(e, &resource))?;

            let parsed: AnalysisResponse = response
                .body_mut()
                .read_json()
                .map_err(|e| map_error(e, &resource))?;
            parsed.into_analysis(kind)
        })
        .await
    }
}

#[async_trait]
impl AnalysisGateway for HttpAnalysisGateway {
    async fn review(&self, username: &str, request: &AnalysisRequest) -> Result<Analysis, GatewayError> {
        self.post(AnalysisKind::Review, Some(username), request).await
    }

    async fn explain(&self, username: &str, request: &AnalysisRequest) -> Result<Analysis, GatewayError> {
        self.post(AnalysisKind::Explain, Some(username), request).await
    }

    async fn suggest(&self, request: &AnalysisRequest) -> Result<Analysis, GatewayError> {
        self.post(AnalysisKind::Suggest, None, request).await
    }
}
