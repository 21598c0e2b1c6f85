//! Matching job lifecycle: the state machine, the process-scoped registry, the orchestrator
//! driving submissions and poll loops, and the HTTP endpoints over it.

pub mod domain;
pub mod orchestrator;
pub mod registry;
pub mod router;

#[cfg(test)]
mod tests;

pub use domain::{Job, JobError, JobEvent, JobId, JobState, JobStatusView, TransitionError};
pub use orchestrator::{JobOrchestrator, JobQueryError, OrchestratorError, PollPolicy};
pub use registry::{JobRegistry, RegistryError};
pub use router::{job_router, EmergencyRequest};
