use super::{
    CaptureProbe, CaptureValidation, ConsistencyReport, GateRunReport, GatesProbe, ProbeError,
    Probes, RecoveryProbe, RecoverySource, SessionSnapshot, SyncProbe,
};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::debug;

/// Probe implementations backed by the host application's JSON endpoints
#[derive(Debug, Clone)]
pub struct HttpProbes {
    client: Client,
    base_url: String,
}

impl HttpProbes {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// One shared instance behind all four probe seams
    pub fn into_probes(self) -> Probes {
        let shared = Arc::new(self);
        Probes {
            capture: shared.clone(),
            sync: shared.clone(),
            gates: shared.clone(),
            recovery: shared,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn fetch<T>(&self, probe: &'static str, request: RequestBuilder) -> Result<T, ProbeError>
    where
        T: DeserializeOwned,
    {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProbeError::Status {
                probe,
                status: status.as_u16(),
            });
        }
        let body = response.json::<T>().await?;
        debug!(probe, "Probe answered");
        Ok(body)
    }
}

#[async_trait]
impl CaptureProbe for HttpProbes {
    async fn validate(&self) -> Result<CaptureValidation, ProbeError> {
        self.fetch(
            "session capture",
            self.client.get(self.url("/capture/validate")),
        )
        .await
    }

    async fn capture_session_state(&self) -> Result<SessionSnapshot, ProbeError> {
        self.fetch(
            "session capture",
            self.client.get(self.url("/capture/session")),
        )
        .await
    }
}

#[async_trait]
impl SyncProbe for HttpProbes {
    async fn validate_consistency(&self) -> Result<ConsistencyReport, ProbeError> {
        self.fetch(
            "documentation sync",
            self.client.get(self.url("/sync/consistency")),
        )
        .await
    }
}

#[async_trait]
impl GatesProbe for HttpProbes {
    async fn run_all_gates(&self, session: &SessionSnapshot) -> Result<GateRunReport, ProbeError> {
        self.fetch(
            "quality gates",
            self.client.post(self.url("/gates/run")).json(session),
        )
        .await
    }
}

#[async_trait]
impl RecoveryProbe for HttpProbes {
    async fn analyze_available_sources(&self) -> Result<Vec<RecoverySource>, ProbeError> {
        self.fetch(
            "context recovery",
            self.client.get(self.url("/recovery/sources")),
        )
        .await
    }
}
