use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::compute::JobHandle;
use crate::matching::{EmergencyDescriptor, MatchOutcome};

/// Orchestrator-issued job identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub String);

impl JobId {
    pub fn generate() -> Self {
        Self(format!("job-{}", Uuid::new_v4()))
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle of a matching job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Submitted,
    Polling,
    Succeeded,
    Failed,
    TimedOut,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::Failed | JobState::TimedOut
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Submitted => "submitted",
            JobState::Polling => "polling",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
            JobState::TimedOut => "timed_out",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Error detail stored on a job that ended in `Failed` or `TimedOut`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobError {
    #[error("submission rejected: {message}")]
    Submission { message: String },
    #[error("backend reported failure: {message}")]
    BackendFailed { message: String },
    #[error("backend error while polling: {message}")]
    Provider { message: String },
    #[error("result fetch failed after reported success: {message}")]
    ResultFetch { message: String },
    #[error("no terminal status after {attempts} attempts")]
    TimeoutExceeded { attempts: u32 },
}

/// Observation fed into [`Job::apply`].
#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    Accepted(JobHandle),
    SubmissionRejected(String),
    PollingStarted,
    /// Backend reported `Queued` or `Running`.
    StillRunning,
    TransientFailure(String),
    Completed(MatchOutcome),
    BackendFailed(String),
    /// Fatal provider error during a status check.
    ProviderFailed(String),
    FetchFailed(String),
}

impl JobEvent {
    pub fn label(&self) -> &'static str {
        match self {
            JobEvent::Accepted(_) => "accepted",
            JobEvent::SubmissionRejected(_) => "submission_rejected",
            JobEvent::PollingStarted => "polling_started",
            JobEvent::StillRunning => "still_running",
            JobEvent::TransientFailure(_) => "transient_failure",
            JobEvent::Completed(_) => "completed",
            JobEvent::BackendFailed(_) => "backend_failed",
            JobEvent::ProviderFailed(_) => "provider_failed",
            JobEvent::FetchFailed(_) => "fetch_failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("event '{event}' is not valid in state '{from}'")]
    Invalid { from: JobState, event: &'static str },
}

/// A matching job and everything observed about it so far.
///
/// State only changes through [`Job::apply`], which keeps `outcome` present exactly when the
/// job succeeded and `error` present exactly when it failed or timed out.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Job {
    id: JobId,
    state: JobState,
    handle: Option<JobHandle>,
    emergency: EmergencyDescriptor,
    outcome: Option<MatchOutcome>,
    error: Option<JobError>,
    created_at: DateTime<Utc>,
    last_transition_at: DateTime<Utc>,
    attempts: u32,
    max_attempts: u32,
}

impl Job {
    /// Creates a `Pending` job. A zero budget is raised to one attempt.
    pub fn new(
        id: JobId,
        emergency: EmergencyDescriptor,
        max_attempts: u32,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            state: JobState::Pending,
            handle: None,
            emergency,
            outcome: None,
            error: None,
            created_at,
            last_transition_at: created_at,
            attempts: 0,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn apply(&mut self, event: JobEvent, at: DateTime<Utc>) -> Result<(), TransitionError> {
        let label = event.label();
        match (self.state, event) {
            (JobState::Pending, JobEvent::Accepted(handle)) => {
                self.handle = Some(handle);
                self.state = JobState::Submitted;
            }
            (JobState::Pending, JobEvent::SubmissionRejected(message)) => {
                self.fail(JobError::Submission { message });
            }
            (JobState::Submitted, JobEvent::PollingStarted) => {
                self.state = JobState::Polling;
            }
            (JobState::Polling, JobEvent::StillRunning | JobEvent::TransientFailure(_)) => {
                self.attempts += 1;
                if self.attempts >= self.max_attempts {
                    self.state = JobState::TimedOut;
                    self.error = Some(JobError::TimeoutExceeded {
                        attempts: self.attempts,
                    });
                }
            }
            (JobState::Polling, JobEvent::Completed(outcome)) => {
                self.outcome = Some(outcome);
                self.state = JobState::Succeeded;
            }
            (JobState::Polling, JobEvent::BackendFailed(message)) => {
                self.fail(JobError::BackendFailed { message });
            }
            (JobState::Polling, JobEvent::ProviderFailed(message)) => {
                self.fail(JobError::Provider { message });
            }
            (JobState::Polling, JobEvent::FetchFailed(message)) => {
                self.fail(JobError::ResultFetch { message });
            }
            (from, _) => {
                return Err(TransitionError::Invalid { from, event: label });
            }
        }

        self.last_transition_at = at;
        Ok(())
    }

    fn fail(&mut self, error: JobError) {
        self.error = Some(error);
        self.state = JobState::Failed;
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn handle(&self) -> Option<&JobHandle> {
        self.handle.as_ref()
    }

    pub fn emergency(&self) -> &EmergencyDescriptor {
        &self.emergency
    }

    pub fn outcome(&self) -> Option<&MatchOutcome> {
        self.outcome.as_ref()
    }

    pub fn error(&self) -> Option<&JobError> {
        self.error.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_transition_at(&self) -> DateTime<Utc> {
        self.last_transition_at
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn status_view(&self) -> JobStatusView {
        JobStatusView {
            job_id: self.id.clone(),
            state: self.state,
            attempt_count: self.attempts,
            last_transition_at: self.last_transition_at,
        }
    }
}

/// Status exposed to callers polling a job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobStatusView {
    pub job_id: JobId,
    pub state: JobState,
    pub attempt_count: u32,
    pub last_transition_at: DateTime<Utc>,
}
