use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use super::domain::HospitalRecord;

const BUNDLED_HOSPITALS: &str = include_str!("../../assets/hospitals.json");

/// Read-only provider of the current hospital capacity snapshot.
pub trait HospitalSource: Send + Sync {
    fn snapshot(&self) -> Result<Vec<HospitalRecord>, HospitalSourceError>;
}

#[derive(Debug, thiserror::Error)]
pub enum HospitalSourceError {
    #[error("failed to read hospital snapshot: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid hospital snapshot: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Snapshot loaded once from a JSON array of hospital records.
#[derive(Debug, Clone)]
pub struct StaticHospitalSource {
    hospitals: Vec<HospitalRecord>,
}

impl StaticHospitalSource {
    pub fn new(hospitals: Vec<HospitalRecord>) -> Self {
        Self { hospitals }
    }

    /// Sample snapshot shipped with the crate.
    pub fn bundled() -> Result<Self, HospitalSourceError> {
        Self::from_reader(BUNDLED_HOSPITALS.as_bytes())
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, HospitalSourceError> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, HospitalSourceError> {
        let hospitals = serde_json::from_reader(reader)?;
        Ok(Self { hospitals })
    }
}

impl HospitalSource for StaticHospitalSource {
    fn snapshot(&self) -> Result<Vec<HospitalRecord>, HospitalSourceError> {
        Ok(self.hospitals.clone())
    }
}
