//! Deterministic emergency-to-hospital scoring.
//!
//! Scoring is a pure function of a hospital snapshot and one emergency; it holds no state and is
//! safe to call from any task.

pub mod domain;
pub mod geo;
mod rules;
pub mod source;

pub use domain::{
    EmergencyDescriptor, EmergencyValidationError, GeoPoint, HospitalRecord, MatchOutcome,
    MatchResult, CRITICAL_SEVERITY,
};
pub use geo::haversine_km;
pub use source::{HospitalSource, HospitalSourceError, StaticHospitalSource};

/// Scores every hospital in `hospitals` and ranks them for `emergency`.
///
/// An empty snapshot yields [`MatchOutcome::empty`].
pub fn score_hospitals(hospitals: &[HospitalRecord], emergency: &EmergencyDescriptor) -> MatchOutcome {
    let results = hospitals
        .iter()
        .map(|hospital| rules::score_hospital(hospital, emergency))
        .collect();

    MatchOutcome::from_results(results)
}
