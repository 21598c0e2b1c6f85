use super::domain::{EmergencyDescriptor, HospitalRecord, MatchResult};
use super::geo::haversine_km;

pub(crate) const MAX_DISTANCE_POINTS: f64 = 50.0;
pub(crate) const ICU_POINTS: f64 = 30.0;
pub(crate) const CARDIAC_SURGERY_POINTS: f64 = 20.0;
pub(crate) const EMERGENCY_BED_POINTS: f64 = 25.0;
pub(crate) const MAX_WAIT_POINTS: f64 = 30.0;
pub(crate) const TRAUMA_CENTER_POINTS: f64 = 15.0;

/// Individual contributions to a hospital's score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ScoreBreakdown {
    pub distance_km: f64,
    pub distance: f64,
    pub capacity: f64,
    pub wait: f64,
    pub trauma: f64,
}

impl ScoreBreakdown {
    pub fn total(&self) -> f64 {
        self.distance + self.capacity + self.wait + self.trauma
    }
}

pub(crate) fn breakdown(
    hospital: &HospitalRecord,
    emergency: &EmergencyDescriptor,
) -> ScoreBreakdown {
    let distance_km = haversine_km(emergency.location(), hospital.location);

    ScoreBreakdown {
        distance_km,
        distance: (MAX_DISTANCE_POINTS - distance_km).max(0.0),
        capacity: capacity_points(hospital, emergency),
        wait: (MAX_WAIT_POINTS - hospital.average_wait_time_minutes).max(0.0),
        trauma: if hospital.has_trauma_center {
            TRAUMA_CENTER_POINTS
        } else {
            0.0
        },
    }
}

fn capacity_points(hospital: &HospitalRecord, emergency: &EmergencyDescriptor) -> f64 {
    if emergency.is_critical() {
        let mut points = 0.0;
        if hospital.icu_beds_available > 0 {
            points += ICU_POINTS;
        }
        if hospital.has_cardiac_surgery {
            points += CARDIAC_SURGERY_POINTS;
        }
        points
    } else if hospital.emergency_beds_available > 0 {
        EMERGENCY_BED_POINTS
    } else {
        0.0
    }
}

pub(crate) fn reasoning(hospital: &HospitalRecord, distance_km: f64) -> String {
    format!(
        "Distance: {:.1}km, Capacity: {}ICU/{}ER, Wait: {}min",
        distance_km,
        hospital.icu_beds_available,
        hospital.emergency_beds_available,
        hospital.average_wait_time_minutes
    )
}

pub(crate) fn score_hospital(
    hospital: &HospitalRecord,
    emergency: &EmergencyDescriptor,
) -> MatchResult {
    let breakdown = breakdown(hospital, emergency);

    MatchResult {
        hospital_id: hospital.hospital_id.clone(),
        score: breakdown.total(),
        distance_km: breakdown.distance_km,
        reasoning: reasoning(hospital, breakdown.distance_km),
    }
}
