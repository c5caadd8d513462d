#![allow(dead_code)]

use async_trait::async_trait;
use continuity_monitor::monitoring::{
    CaptureProbe, CaptureValidation, ConsistencyReport, GateResult, GateRunReport, GatesProbe,
    ProbeError, Probes, RecoveryProbe, RecoverySource, SessionSnapshot, SyncProbe,
};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Probes whose capture answer can be flipped between valid and broken
#[derive(Default)]
pub struct StubProbes {
    pub capture_broken: AtomicBool,
}

#[async_trait]
impl CaptureProbe for StubProbes {
    async fn validate(&self) -> Result<CaptureValidation, ProbeError> {
        if self.capture_broken.load(Ordering::SeqCst) {
            return Err(ProbeError::Failed("capture store offline".to_string()));
        }
        Ok(CaptureValidation {
            valid: true,
            error_message: None,
        })
    }

    async fn capture_session_state(&self) -> Result<SessionSnapshot, ProbeError> {
        Ok(json!({ "sessionId": "integration" }))
    }
}

#[async_trait]
impl SyncProbe for StubProbes {
    async fn validate_consistency(&self) -> Result<ConsistencyReport, ProbeError> {
        Ok(ConsistencyReport {
            consistency_score: 0.99,
        })
    }
}

#[async_trait]
impl GatesProbe for StubProbes {
    async fn run_all_gates(&self, _session: &SessionSnapshot) -> Result<GateRunReport, ProbeError> {
        Ok(GateRunReport {
            results: vec![
                GateResult {
                    name: Some("lint".to_string()),
                    passed: true,
                },
                GateResult {
                    name: Some("tests".to_string()),
                    passed: true,
                },
            ],
        })
    }
}

#[async_trait]
impl RecoveryProbe for StubProbes {
    async fn analyze_available_sources(&self) -> Result<Vec<RecoverySource>, ProbeError> {
        Ok(vec![RecoverySource {
            name: Some("git".to_string()),
            reliability_score: 0.95,
        }])
    }
}

impl StubProbes {
    pub fn broken() -> Arc<Self> {
        let stub = Self::default();
        stub.capture_broken.store(true, Ordering::SeqCst);
        Arc::new(stub)
    }
}

pub fn probes(stub: &Arc<StubProbes>) -> Probes {
    Probes {
        capture: stub.clone(),
        sync: stub.clone(),
        gates: stub.clone(),
        recovery: stub.clone(),
    }
}
