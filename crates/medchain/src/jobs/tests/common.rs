use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::response::Response;
use serde_json::Value;

use crate::compute::{
    AssetRef, BackendKind, ComputeAssets, ComputeOutput, ComputeProvider, ComputeRequest,
    JobHandle, ProviderError, RemoteStatus, ScoredHospital,
};
use crate::jobs::{JobOrchestrator, JobRegistry, PollPolicy};
use crate::matching::{EmergencyDescriptor, GeoPoint};

/// Provider replaying scripted answers. Once the poll script runs out it keeps answering
/// `Running`.
pub(super) struct ScriptedProvider {
    submit: Mutex<Option<Result<JobHandle, ProviderError>>>,
    polls: Mutex<VecDeque<Result<RemoteStatus, ProviderError>>>,
    fetch: Mutex<Option<Result<ComputeOutput, ProviderError>>>,
    pub(super) submit_calls: AtomicUsize,
    pub(super) poll_calls: AtomicUsize,
    pub(super) fetch_calls: AtomicUsize,
    pub(super) last_request: Mutex<Option<ComputeRequest>>,
}

impl ScriptedProvider {
    pub(super) fn new(polls: Vec<Result<RemoteStatus, ProviderError>>) -> Self {
        Self {
            submit: Mutex::new(Some(Ok(JobHandle("remote-1".into())))),
            polls: Mutex::new(polls.into()),
            fetch: Mutex::new(Some(Ok(scored_output()))),
            submit_calls: AtomicUsize::new(0),
            poll_calls: AtomicUsize::new(0),
            fetch_calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    pub(super) fn rejecting_submit(error: ProviderError) -> Self {
        let provider = Self::new(Vec::new());
        *provider.submit.lock().unwrap() = Some(Err(error));
        provider
    }

    pub(super) fn with_fetch(self, fetch: Result<ComputeOutput, ProviderError>) -> Self {
        *self.fetch.lock().unwrap() = Some(fetch);
        self
    }

    pub(super) fn polls(&self) -> usize {
        self.poll_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ComputeProvider for ScriptedProvider {
    fn backend(&self) -> BackendKind {
        BackendKind::Direct
    }

    async fn submit(&self, request: &ComputeRequest) -> Result<JobHandle, ProviderError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request.clone());
        self.submit
            .lock()
            .unwrap()
            .clone()
            .expect("submit scripted")
    }

    async fn poll_status(&self, _handle: &JobHandle) -> Result<RemoteStatus, ProviderError> {
        self.poll_calls.fetch_add(1, Ordering::SeqCst);
        self.polls
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(RemoteStatus::Running))
    }

    async fn fetch_result(&self, _handle: &JobHandle) -> Result<ComputeOutput, ProviderError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.fetch
            .lock()
            .unwrap()
            .take()
            .expect("result fetched at most once")
    }
}

/// Provider that hands out `h0`, `h1`, ... and never answers status polls for `h0`.
#[derive(Default)]
pub(super) struct StalledFirstProvider {
    submitted: AtomicUsize,
}

#[async_trait]
impl ComputeProvider for StalledFirstProvider {
    fn backend(&self) -> BackendKind {
        BackendKind::Direct
    }

    async fn submit(&self, _request: &ComputeRequest) -> Result<JobHandle, ProviderError> {
        let n = self.submitted.fetch_add(1, Ordering::SeqCst);
        Ok(JobHandle(format!("h{n}")))
    }

    async fn poll_status(&self, handle: &JobHandle) -> Result<RemoteStatus, ProviderError> {
        if handle.0 == "h0" {
            tokio::time::sleep(Duration::from_secs(100_000)).await;
            return Ok(RemoteStatus::Running);
        }
        Ok(RemoteStatus::Succeeded)
    }

    async fn fetch_result(&self, _handle: &JobHandle) -> Result<ComputeOutput, ProviderError> {
        Ok(scored_output())
    }
}

pub(super) fn scored_output() -> ComputeOutput {
    ComputeOutput::Scored(vec![
        ScoredHospital {
            hospital_id: "spital_judetean_cluj".into(),
            score: 52.0,
            distance_km: 324.2,
            reasoning: None,
        },
        ScoredHospital {
            hospital_id: "spital_urgenta_bucuresti".into(),
            score: 94.2,
            distance_km: 0.8,
            reasoning: Some("Distance: 0.8km, Capacity: 5ICU/12ER, Wait: 25min".into()),
        },
    ])
}

pub(super) fn assets() -> ComputeAssets {
    ComputeAssets::inline(
        AssetRef::inline("algorithm.py", "text/plain", b"print('match')".to_vec()),
        b"[]".to_vec(),
    )
}

pub(super) fn policy(max_attempts: u32) -> PollPolicy {
    PollPolicy {
        interval: Duration::from_secs(5),
        max_attempts,
    }
}

pub(super) fn orchestrator(provider: Arc<ScriptedProvider>, max_attempts: u32) -> JobOrchestrator {
    JobOrchestrator::new(
        provider,
        Arc::new(JobRegistry::new()),
        assets(),
        policy(max_attempts),
    )
}

pub(super) fn emergency() -> EmergencyDescriptor {
    EmergencyDescriptor::new(
        Some("emergency-42".into()),
        GeoPoint::new(44.42, 26.10),
        7,
        "cardiac",
        None,
    )
    .expect("valid emergency")
}

pub(super) async fn read_json(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
