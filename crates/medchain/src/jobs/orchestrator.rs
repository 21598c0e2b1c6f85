use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::domain::{Job, JobError, JobEvent, JobId, JobState, JobStatusView};
use super::registry::{JobRegistry, RegistryError};
use crate::compute::{
    BackendKind, ComputeAssets, ComputeOutput, ComputeProvider, ComputeRequest, JobHandle,
    ProviderError, RemoteStatus,
};
use crate::matching::{score_hospitals, EmergencyDescriptor, MatchOutcome, MatchResult};

/// Inter-poll delay and attempt budget. The timeout is their product.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            max_attempts: 30,
        }
    }
}

struct PollLoop {
    cancel: CancellationToken,
    /// Fired when the loop's future is dropped, however it ended.
    finished: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl PollLoop {
    fn is_finished(&self) -> bool {
        self.finished.is_cancelled()
    }
}

fn prune_finished(loops: &mut HashMap<JobId, PollLoop>) {
    loops.retain(|_, poll_loop| !poll_loop.is_finished());
}

/// Creates jobs, submits them to the compute backend, and drives one poll loop per job.
pub struct JobOrchestrator {
    provider: Arc<dyn ComputeProvider>,
    registry: Arc<JobRegistry>,
    assets: ComputeAssets,
    policy: PollPolicy,
    loops: Mutex<HashMap<JobId, PollLoop>>,
}

impl JobOrchestrator {
    pub fn new(
        provider: Arc<dyn ComputeProvider>,
        registry: Arc<JobRegistry>,
        assets: ComputeAssets,
        policy: PollPolicy,
    ) -> Self {
        Self {
            provider,
            registry,
            assets,
            policy,
            loops: Mutex::new(HashMap::new()),
        }
    }

    pub fn backend(&self) -> BackendKind {
        self.provider.backend()
    }

    pub fn policy(&self) -> PollPolicy {
        self.policy
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    /// Registers a job for `emergency`, submits it once, and starts polling on acceptance.
    ///
    /// A rejected submission leaves the job `Failed` in the registry and is never retried.
    pub async fn start_job(
        &self,
        emergency: EmergencyDescriptor,
    ) -> Result<JobId, OrchestratorError> {
        let job_id = JobId::generate();
        let created_at = Utc::now();
        self.registry.insert(Job::new(
            job_id.clone(),
            emergency.clone(),
            self.policy.max_attempts,
            created_at,
        ))?;

        let request = ComputeRequest {
            algorithm: self.assets.algorithm.clone(),
            dataset: self.assets.dataset.clone(),
            extra_input: json!({ "emergency": emergency }),
        };

        info!(
            job_id = %job_id,
            emergency_id = emergency.emergency_id(),
            severity = emergency.severity(),
            backend = %self.provider.backend(),
            algorithm = %self.assets.algorithm.describe(),
            dataset = %self.assets.dataset.describe(),
            "submitting matching job"
        );

        let handle = match self.provider.submit(&request).await {
            Ok(handle) => handle,
            Err(source) => {
                warn!(job_id = %job_id, error = %source, "submission rejected");
                self.registry.apply(
                    &job_id,
                    JobEvent::SubmissionRejected(source.to_string()),
                    Utc::now(),
                )?;
                return Err(OrchestratorError::Submission { job_id, source });
            }
        };

        self.registry
            .apply(&job_id, JobEvent::Accepted(handle.clone()), Utc::now())?;
        self.spawn_poll_loop(job_id.clone(), handle, emergency);
        Ok(job_id)
    }

    fn spawn_poll_loop(&self, job_id: JobId, handle: JobHandle, emergency: EmergencyDescriptor) {
        let mut loops = self.loops.lock().unwrap_or_else(PoisonError::into_inner);
        prune_finished(&mut loops);
        if loops.contains_key(&job_id) {
            error!(job_id = %job_id, "poll loop already running");
            return;
        }

        let cancel = CancellationToken::new();
        let finished = CancellationToken::new();
        let span = info_span!(
            "poll_loop",
            job_id = %job_id,
            job_handle = %handle,
            backend = %self.provider.backend()
        );
        let poller = Poller {
            provider: Arc::clone(&self.provider),
            registry: Arc::clone(&self.registry),
            policy: self.policy,
            job_id: job_id.clone(),
            handle,
            emergency,
            cancel: cancel.clone(),
            _finished: finished.clone().drop_guard(),
        };
        let task = tokio::spawn(poller.run().instrument(span));

        loops.insert(
            job_id,
            PollLoop {
                cancel,
                finished,
                handle: Some(task),
            },
        );
    }

    pub fn job(&self, id: &JobId) -> Option<Job> {
        self.registry.get(id)
    }

    pub fn job_status(&self, id: &JobId) -> Result<JobStatusView, JobQueryError> {
        self.registry
            .get(id)
            .map(|job| job.status_view())
            .ok_or_else(|| JobQueryError::NotFound(id.clone()))
    }

    /// Returns the outcome of a succeeded job, or why there is none.
    pub fn job_result(&self, id: &JobId) -> Result<MatchOutcome, JobQueryError> {
        let job = self
            .registry
            .get(id)
            .ok_or_else(|| JobQueryError::NotFound(id.clone()))?;

        match (job.state(), job.outcome(), job.error()) {
            (JobState::Succeeded, Some(outcome), _) => Ok(outcome.clone()),
            (state @ (JobState::Failed | JobState::TimedOut), _, Some(detail)) => {
                Err(JobQueryError::JobFailed {
                    id: id.clone(),
                    state,
                    detail: detail.clone(),
                })
            }
            (state, _, _) => Err(JobQueryError::NotReady {
                id: id.clone(),
                state,
            }),
        }
    }

    /// Stops the job's poll loop. The record keeps its last observed state.
    ///
    /// Returns `false` when there is no live loop to stop: the job never had one, its loop
    /// already ended (terminal jobs included), or it was cancelled before.
    pub fn cancel(&self, id: &JobId) -> bool {
        let mut loops = self.loops.lock().unwrap_or_else(PoisonError::into_inner);
        prune_finished(&mut loops);
        match loops.get(id) {
            Some(poll_loop) if !poll_loop.cancel.is_cancelled() => {
                poll_loop.cancel.cancel();
                info!(job_id = %id, "poll loop cancelled");
                true
            }
            _ => false,
        }
    }

    /// Number of poll loops that have not ended yet.
    pub fn active_loops(&self) -> usize {
        let mut loops = self.loops.lock().unwrap_or_else(PoisonError::into_inner);
        prune_finished(&mut loops);
        loops.len()
    }

    /// Waits for the job's poll loop to end and returns the snapshot it left behind.
    ///
    /// Any number of callers may wait on the same job; each resolves once the loop has
    /// stopped. Jobs without a live loop return their current snapshot straight away.
    pub async fn wait(&self, id: &JobId) -> Option<Job> {
        let (task, finished) = {
            let mut loops = self.loops.lock().unwrap_or_else(PoisonError::into_inner);
            match loops.get_mut(id) {
                Some(poll_loop) => (poll_loop.handle.take(), Some(poll_loop.finished.clone())),
                None => (None, None),
            }
        };

        match (task, finished) {
            (Some(task), _) => {
                if let Err(err) = task.await {
                    error!(job_id = %id, error = %err, "poll loop task aborted");
                }
            }
            (None, Some(finished)) => finished.cancelled().await,
            (None, None) => {}
        }
        self.registry.get(id)
    }
}

/// State moved into a spawned poll loop.
struct Poller {
    provider: Arc<dyn ComputeProvider>,
    registry: Arc<JobRegistry>,
    policy: PollPolicy,
    job_id: JobId,
    handle: JobHandle,
    emergency: EmergencyDescriptor,
    cancel: CancellationToken,
    _finished: DropGuard,
}

impl Poller {
    async fn run(self) {
        if self.record(JobEvent::PollingStarted).is_none() {
            return;
        }

        loop {
            let status = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return,
                status = self.provider.poll_status(&self.handle) => status,
            };

            let event = match status {
                Ok(RemoteStatus::Queued | RemoteStatus::Running) => JobEvent::StillRunning,
                Ok(RemoteStatus::Succeeded) => {
                    let fetched = tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => return,
                        fetched = self.provider.fetch_result(&self.handle) => fetched,
                    };
                    match fetched {
                        Ok(output) => JobEvent::Completed(self.materialize(output)),
                        Err(err) => JobEvent::FetchFailed(err.to_string()),
                    }
                }
                Ok(RemoteStatus::Failed { reason }) => JobEvent::BackendFailed(reason),
                Err(err) if err.is_transient() => {
                    warn!(error = %err, "transient error while polling");
                    JobEvent::TransientFailure(err.to_string())
                }
                Err(err) => JobEvent::ProviderFailed(err.to_string()),
            };

            if self.cancel.is_cancelled() {
                return;
            }
            let Some(job) = self.record(event) else {
                return;
            };

            if job.state().is_terminal() {
                match job.error() {
                    Some(detail) => warn!(
                        state = %job.state(),
                        attempts = job.attempts(),
                        error = %detail,
                        "matching job ended without a result"
                    ),
                    None => info!(
                        attempts = job.attempts(),
                        best_hospital = job
                            .outcome()
                            .and_then(|outcome| outcome.best_hospital_id.as_deref())
                            .unwrap_or("none"),
                        "matching job succeeded"
                    ),
                }
                return;
            }

            debug!(
                attempt = job.attempts(),
                max_attempts = job.max_attempts(),
                "job still running"
            );

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep(self.policy.interval) => {}
            }
        }
    }

    fn record(&self, event: JobEvent) -> Option<Job> {
        match self.registry.apply(&self.job_id, event, Utc::now()) {
            Ok(job) => Some(job),
            Err(err) => {
                error!(error = %err, "failed to record job transition");
                None
            }
        }
    }

    /// Turns backend output into an outcome.
    ///
    /// Backend-scored entries carry only what the backend reported; an entry without its own
    /// reasoning gets a distance-only line since bed counts and wait time are unknown here.
    /// Raw snapshots are scored locally with the full reasoning.
    fn materialize(&self, output: ComputeOutput) -> MatchOutcome {
        match output {
            ComputeOutput::Scored(entries) => MatchOutcome::from_results(
                entries
                    .into_iter()
                    .map(|entry| MatchResult {
                        reasoning: entry
                            .reasoning
                            .unwrap_or_else(|| format!("Distance: {:.1}km", entry.distance_km)),
                        hospital_id: entry.hospital_id,
                        score: entry.score,
                        distance_km: entry.distance_km,
                    })
                    .collect(),
            ),
            ComputeOutput::Snapshot(hospitals) => score_hospitals(&hospitals, &self.emergency),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("job {job_id} was rejected at submission: {source}")]
    Submission {
        job_id: JobId,
        #[source]
        source: ProviderError,
    },
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum JobQueryError {
    #[error("job {0} not found")]
    NotFound(JobId),
    #[error("job {id} is still {state}")]
    NotReady { id: JobId, state: JobState },
    #[error("job {id} ended {state}: {detail}")]
    JobFailed {
        id: JobId,
        state: JobState,
        detail: JobError,
    },
}
