use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::matching::HospitalRecord;

/// Compute backend families the orchestrator can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Uploads algorithm and dataset content straight to a job endpoint.
    Direct,
    /// Resolves published asset identifiers through an indexer before submitting.
    Ledger,
}

impl BackendKind {
    pub const fn label(self) -> &'static str {
        match self {
            BackendKind::Direct => "direct",
            BackendKind::Ledger => "ledger",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "direct" | "free" | "free-compute" => Some(Self::Direct),
            "ledger" | "ocean" | "c2d" => Some(Self::Ledger),
            _ => None,
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Reference to an algorithm or dataset handed to a backend.
#[derive(Debug, Clone, PartialEq)]
pub enum AssetRef {
    /// Identifier of an asset already published to the ledger.
    Published { did: String },
    /// Raw content uploaded with the job.
    Inline {
        file_name: String,
        media_type: String,
        content: Arc<[u8]>,
    },
}

impl AssetRef {
    pub fn published(did: impl Into<String>) -> Self {
        Self::Published { did: did.into() }
    }

    pub fn inline(
        file_name: impl Into<String>,
        media_type: impl Into<String>,
        content: impl Into<Vec<u8>>,
    ) -> Self {
        Self::Inline {
            file_name: file_name.into(),
            media_type: media_type.into(),
            content: Arc::from(content.into()),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            AssetRef::Published { did } => did.clone(),
            AssetRef::Inline {
                file_name, content, ..
            } => format!("{file_name} ({} bytes)", content.len()),
        }
    }
}

/// The algorithm/dataset pairing every job of an orchestrator runs with.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputeAssets {
    pub algorithm: AssetRef,
    pub dataset: AssetRef,
}

/// A single submission handed to [`super::ComputeProvider::submit`].
#[derive(Debug, Clone, PartialEq)]
pub struct ComputeRequest {
    pub algorithm: AssetRef,
    pub dataset: AssetRef,
    pub extra_input: Value,
}

/// Backend-issued token correlating an orchestrator job with remote work.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobHandle(pub String);

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Backend status normalized across providers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteStatus {
    Queued,
    Running,
    Succeeded,
    Failed { reason: String },
}

impl RemoteStatus {
    pub fn label(&self) -> &'static str {
        match self {
            RemoteStatus::Queued => "queued",
            RemoteStatus::Running => "running",
            RemoteStatus::Succeeded => "succeeded",
            RemoteStatus::Failed { .. } => "failed",
        }
    }
}

/// Per-hospital score already computed by the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredHospital {
    pub hospital_id: String,
    pub score: f64,
    pub distance_km: f64,
    pub reasoning: Option<String>,
}

/// Decoded result of a finished backend job.
#[derive(Debug, Clone, PartialEq)]
pub enum ComputeOutput {
    /// The backend ran the scoring itself; entries are in backend order.
    Scored(Vec<ScoredHospital>),
    /// The backend only returned hospital data, which still needs scoring.
    Snapshot(Vec<HospitalRecord>),
}
