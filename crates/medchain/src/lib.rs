//! Emergency-to-hospital matching on remote compute backends.
//!
//! [`matching`] scores a hospital snapshot for one emergency, [`compute`] abstracts the backends
//! that run the matching job, and [`jobs`] tracks each submitted job from submission to a
//! terminal state.

pub mod compute;
pub mod config;
pub mod error;
pub mod jobs;
pub mod matching;
pub mod telemetry;

pub use error::AppError;
