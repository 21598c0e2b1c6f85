use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Severity at or above which an emergency is treated as critical.
pub const CRITICAL_SEVERITY: u8 = 8;

/// Latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    fn validate(self) -> Result<Self, EmergencyValidationError> {
        if !self.lat.is_finite() || !(-90.0..=90.0).contains(&self.lat) {
            return Err(EmergencyValidationError::Latitude(self.lat));
        }
        if !self.lng.is_finite() || !(-180.0..=180.0).contains(&self.lng) {
            return Err(EmergencyValidationError::Longitude(self.lng));
        }
        Ok(self)
    }
}

/// Immutable description of an emergency awaiting a hospital match.
///
/// Fields are private so a descriptor can only be obtained through [`EmergencyDescriptor::new`]
/// (or deserialization of a previously validated descriptor) and never changes afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyDescriptor {
    emergency_id: String,
    location: GeoPoint,
    severity: u8,
    emergency_type: String,
    timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    patient: Option<Value>,
}

impl EmergencyDescriptor {
    pub fn new(
        emergency_id: Option<String>,
        location: GeoPoint,
        severity: u8,
        emergency_type: impl Into<String>,
        patient: Option<Value>,
    ) -> Result<Self, EmergencyValidationError> {
        if !(1..=10).contains(&severity) {
            return Err(EmergencyValidationError::Severity(severity));
        }

        let location = location.validate()?;
        let emergency_id = match emergency_id.map(|id| id.trim().to_string()) {
            Some(id) if !id.is_empty() => id,
            _ => format!("emergency_{}", Uuid::new_v4().simple()),
        };

        Ok(Self {
            emergency_id,
            location,
            severity,
            emergency_type: emergency_type.into(),
            timestamp: Utc::now(),
            patient,
        })
    }

    pub fn emergency_id(&self) -> &str {
        &self.emergency_id
    }

    pub fn location(&self) -> GeoPoint {
        self.location
    }

    pub fn severity(&self) -> u8 {
        self.severity
    }

    pub fn is_critical(&self) -> bool {
        self.severity >= CRITICAL_SEVERITY
    }

    pub fn emergency_type(&self) -> &str {
        &self.emergency_type
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Opaque patient payload, passed through to the backend untouched.
    pub fn patient(&self) -> Option<&Value> {
        self.patient.as_ref()
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EmergencyValidationError {
    #[error("severity must be between 1 and 10, got {0}")]
    Severity(u8),
    #[error("latitude must be within [-90, 90], got {0}")]
    Latitude(f64),
    #[error("longitude must be within [-180, 180], got {0}")]
    Longitude(f64),
}

/// Capacity snapshot for one hospital as published by the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HospitalRecord {
    pub hospital_id: String,
    pub location: GeoPoint,
    pub icu_beds_available: u32,
    pub emergency_beds_available: u32,
    #[serde(default)]
    pub ventilators_available: u32,
    pub has_cardiac_surgery: bool,
    pub has_trauma_center: bool,
    pub average_wait_time_minutes: f64,
    #[serde(default = "Utc::now")]
    pub last_updated: DateTime<Utc>,
}

/// Score and explanation for a single hospital.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub hospital_id: String,
    pub score: f64,
    pub distance_km: f64,
    pub reasoning: String,
}

/// Ranked matching output for one emergency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchOutcome {
    pub best_hospital_id: Option<String>,
    pub best_score: f64,
    pub best_distance_km: f64,
    pub rankings: Vec<MatchResult>,
}

impl MatchOutcome {
    pub fn empty() -> Self {
        Self {
            best_hospital_id: None,
            best_score: 0.0,
            best_distance_km: 0.0,
            rankings: Vec::new(),
        }
    }

    /// Builds an outcome from per-hospital results given in input order.
    ///
    /// The best match is the first result holding the maximum score. Rankings are ordered by
    /// descending score; equal scores keep their input order.
    pub fn from_results(results: Vec<MatchResult>) -> Self {
        let mut best: Option<&MatchResult> = None;
        for result in &results {
            match best {
                Some(current) if result.score <= current.score => {}
                _ => best = Some(result),
            }
        }

        let Some(best) = best else {
            return Self::empty();
        };
        let best_hospital_id = Some(best.hospital_id.clone());
        let best_score = best.score;
        let best_distance_km = best.distance_km;

        let mut rankings = results;
        rankings.sort_by(|a, b| b.score.total_cmp(&a.score));

        Self {
            best_hospital_id,
            best_score,
            best_distance_km,
            rankings,
        }
    }

    pub fn best(&self) -> Option<&MatchResult> {
        let id = self.best_hospital_id.as_deref()?;
        self.rankings.iter().find(|result| result.hospital_id == id)
    }
}
