//! Decoding of backend status and result bodies shared by both providers.

use serde::Deserialize;
use serde_json::Value;

use super::error::ProviderError;
use super::types::{ComputeOutput, RemoteStatus, ScoredHospital};
use crate::matching::HospitalRecord;

const SUCCEEDED_CODE: u64 = 70;
const FAILED_CODE: u64 = 50;
const FIRST_RUNNING_CODE: u64 = 10;

#[derive(Deserialize)]
#[serde(untagged)]
enum ResultShape {
    Ranked { all_hospitals: Vec<RankedEntry> },
    Matches { matches: Vec<MatchEntry> },
    Wrapped { hospitals: Vec<HospitalRecord> },
    Bare(Vec<HospitalRecord>),
}

#[derive(Deserialize)]
struct RankedEntry {
    hospital_id: String,
    score: f64,
    distance_km: f64,
    #[serde(default)]
    reasoning: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MatchEntry {
    #[serde(alias = "hospital_id")]
    hospital_id: String,
    score: f64,
    #[serde(alias = "distance_km")]
    distance: f64,
    #[serde(default)]
    reasoning: Option<String>,
}

/// Decodes a result body into scored entries or a hospital snapshot.
pub(crate) fn decode_output(body: &[u8]) -> Result<ComputeOutput, ProviderError> {
    let mut value: Value = serde_json::from_slice(body)
        .map_err(|err| ProviderError::fatal(format!("result is not valid JSON: {err}")))?;

    // Some nodes return the result file content as a JSON string.
    if let Value::String(inner) = &value {
        value = serde_json::from_str(inner)
            .map_err(|err| ProviderError::fatal(format!("result is not valid JSON: {err}")))?;
    }

    let shape: ResultShape = serde_json::from_value(value)
        .map_err(|err| ProviderError::fatal(format!("unrecognised result payload: {err}")))?;

    let output = match shape {
        ResultShape::Ranked { all_hospitals } => ComputeOutput::Scored(
            all_hospitals
                .into_iter()
                .map(|entry| ScoredHospital {
                    hospital_id: entry.hospital_id,
                    score: entry.score,
                    distance_km: entry.distance_km,
                    reasoning: entry.reasoning,
                })
                .collect(),
        ),
        ResultShape::Matches { matches } => ComputeOutput::Scored(
            matches
                .into_iter()
                .map(|entry| ScoredHospital {
                    hospital_id: entry.hospital_id,
                    score: entry.score,
                    distance_km: entry.distance,
                    reasoning: entry.reasoning,
                })
                .collect(),
        ),
        ResultShape::Wrapped { hospitals } | ResultShape::Bare(hospitals) => {
            ComputeOutput::Snapshot(hospitals)
        }
    };

    Ok(output)
}

/// Maps a status body onto [`RemoteStatus`].
///
/// Accepts a single status object or a list whose first entry is the job.
pub(crate) fn normalize_status(body: &Value) -> Result<RemoteStatus, ProviderError> {
    let entry = match body {
        Value::Array(entries) => entries
            .first()
            .ok_or_else(|| ProviderError::fatal("status response listed no jobs"))?,
        other => other,
    };

    let reason = failure_reason(entry);
    match entry.get("status") {
        Some(Value::String(text)) => status_from_text(text, reason),
        Some(Value::Number(code)) => code
            .as_u64()
            .map(|code| status_from_code(code, reason))
            .ok_or_else(|| ProviderError::fatal(format!("invalid status code {code}"))),
        _ => Err(ProviderError::fatal("status response missing status field")),
    }
}

fn failure_reason(entry: &Value) -> String {
    ["error", "statusText", "message"]
        .iter()
        .find_map(|key| entry.get(*key).and_then(Value::as_str))
        .unwrap_or("unknown error")
        .to_string()
}

fn status_from_text(text: &str, reason: String) -> Result<RemoteStatus, ProviderError> {
    let normalized: String = text
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase();

    let status = match normalized.as_str() {
        "queued" | "pending" | "submitted" | "started" | "accepted" | "warmingup" => {
            RemoteStatus::Queued
        }
        "running" | "processing" | "inprogress" | "configuringvolumes" | "runningalgorithm"
        | "filteringresults" | "publishingresults" => RemoteStatus::Running,
        "succeeded" | "success" | "completed" | "finished" | "jobfinished" | "done" => {
            RemoteStatus::Succeeded
        }
        "failed" | "failure" | "error" | "cancelled" | "canceled" => {
            RemoteStatus::Failed { reason }
        }
        _ => {
            return Err(ProviderError::fatal(format!(
                "unrecognised backend status '{text}'"
            )))
        }
    };

    Ok(status)
}

fn status_from_code(code: u64, reason: String) -> RemoteStatus {
    match code {
        SUCCEEDED_CODE => RemoteStatus::Succeeded,
        FAILED_CODE => RemoteStatus::Failed { reason },
        code if code > SUCCEEDED_CODE => RemoteStatus::Failed { reason },
        code if code < FIRST_RUNNING_CODE => RemoteStatus::Queued,
        _ => RemoteStatus::Running,
    }
}
