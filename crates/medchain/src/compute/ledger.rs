//! Backend that works with assets published to the data ledger.
//!
//! Dataset and algorithm identifiers are resolved through the metadata indexer, the dataset's
//! compute service and the provider's first compute environment are selected, and the job is
//! started on the provider on behalf of the configured consumer.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use super::error::ProviderError;
use super::http::{build_client, join_url, parse_json, send};
use super::payload::{decode_output, normalize_status};
use super::types::{AssetRef, BackendKind, ComputeOutput, ComputeRequest, JobHandle, RemoteStatus};
use super::{ComputeProvider, IdentityProvider};

const RESULT_INDEX: u32 = 0;

/// Endpoints and container settings for the ledger-mediated backend.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerSettings {
    pub indexer_url: String,
    pub provider_url: String,
    pub container: AlgorithmContainer,
    pub request_timeout: Duration,
}

/// Container the published algorithm runs in.
#[derive(Debug, Clone, PartialEq)]
pub struct AlgorithmContainer {
    pub image: String,
    pub tag: String,
    pub entrypoint: String,
}

impl Default for AlgorithmContainer {
    fn default() -> Self {
        Self {
            image: "python".to_string(),
            tag: "3.9-slim".to_string(),
            entrypoint: "python $ALGO".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Ddo {
    id: String,
    #[serde(default)]
    services: Vec<DdoService>,
}

#[derive(Debug, Deserialize)]
struct DdoService {
    id: String,
    #[serde(rename = "type")]
    service_type: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartedJob {
    job_id: String,
}

pub struct LedgerComputeProvider {
    http: reqwest::Client,
    settings: LedgerSettings,
    identity: Arc<dyn IdentityProvider>,
}

impl LedgerComputeProvider {
    pub fn new(
        settings: LedgerSettings,
        identity: Arc<dyn IdentityProvider>,
    ) -> Result<Self, ProviderError> {
        let http = build_client(settings.request_timeout)?;
        Ok(Self {
            http,
            settings,
            identity,
        })
    }

    async fn resolve(&self, did: &str) -> Result<Ddo, ProviderError> {
        let context = format!("resolve {did}");
        let url = join_url(
            &self.settings.indexer_url,
            &format!("api/aquarius/assets/ddo/{did}"),
        );
        debug!(%did, %url, "resolving published asset");

        let body = send(self.http.get(&url), &context).await?;
        parse_json(&body, &context)
    }

    async fn first_environment(&self) -> Result<String, ProviderError> {
        let context = "list compute environments";
        let url = join_url(&self.settings.provider_url, "api/services/computeEnvironments");
        let body = send(self.http.get(&url), context).await?;
        let environments: Value = parse_json(&body, context)?;

        // Providers answer either with a flat list or with lists keyed by chain id.
        let candidates: Vec<&Value> = match &environments {
            Value::Array(list) => list.iter().collect(),
            Value::Object(by_chain) => by_chain
                .values()
                .filter_map(Value::as_array)
                .flatten()
                .collect(),
            _ => Vec::new(),
        };

        candidates
            .into_iter()
            .find_map(|env| env.get("id").and_then(Value::as_str))
            .map(str::to_string)
            .ok_or_else(|| ProviderError::fatal("no compute environments available"))
    }

    fn published_did<'a>(asset: &'a AssetRef, role: &str) -> Result<&'a str, ProviderError> {
        match asset {
            AssetRef::Published { did } => Ok(did.as_str()),
            AssetRef::Inline { file_name, .. } => Err(ProviderError::fatal(format!(
                "ledger backend needs a published {role}, got inline content '{file_name}'"
            ))),
        }
    }

    fn consumer_query(&self, handle: &JobHandle) -> Vec<(&'static str, String)> {
        vec![
            ("consumerAddress", self.identity.consumer_address().to_string()),
            ("jobId", handle.0.clone()),
        ]
    }
}

#[async_trait]
impl ComputeProvider for LedgerComputeProvider {
    fn backend(&self) -> BackendKind {
        BackendKind::Ledger
    }

    async fn submit(&self, request: &ComputeRequest) -> Result<JobHandle, ProviderError> {
        let dataset_did = Self::published_did(&request.dataset, "dataset")?;
        let algorithm_did = Self::published_did(&request.algorithm, "algorithm")?;

        let dataset = self.resolve(dataset_did).await?;
        let algorithm = self.resolve(algorithm_did).await?;

        let compute_service = dataset
            .services
            .iter()
            .find(|service| service.service_type == "compute")
            .ok_or_else(|| {
                ProviderError::fatal(format!("dataset {} has no compute service", dataset.id))
            })?;
        let algorithm_service = algorithm.services.first().ok_or_else(|| {
            ProviderError::fatal(format!("algorithm {} has no services", algorithm.id))
        })?;

        let environment = self.first_environment().await?;
        let consumer = self.identity.consumer_address().to_string();
        let nonce = Utc::now().timestamp_millis();
        let signature = self
            .identity
            .sign(&format!("{consumer}{}{nonce}", dataset.id));
        let container = &self.settings.container;

        let body = json!({
            "consumerAddress": consumer,
            "signature": signature,
            "nonce": nonce,
            "environment": environment,
            "dataset": {
                "documentId": dataset.id,
                "serviceId": compute_service.id,
            },
            "algorithm": {
                "documentId": algorithm.id,
                "serviceId": algorithm_service.id,
                "meta": {
                    "container": {
                        "image": container.image,
                        "tag": container.tag,
                        "entrypoint": container.entrypoint,
                    },
                },
            },
            "additionalInputs": [{ "input": request.extra_input }],
        });

        let context = "start compute job";
        let url = join_url(&self.settings.provider_url, "api/services/compute");
        let response = send(self.http.post(&url).json(&body), context).await?;

        // Providers return the started job either alone or as a one-element list.
        let started: Value = parse_json(&response, context)?;
        let started = match started {
            Value::Array(mut jobs) if !jobs.is_empty() => jobs.swap_remove(0),
            other => other,
        };
        let started: StartedJob = serde_json::from_value(started).map_err(|err| {
            ProviderError::fatal(format!("{context}: response missing jobId: {err}"))
        })?;

        info!(
            job_handle = %started.job_id,
            %environment,
            dataset = %dataset.id,
            algorithm = %algorithm.id,
            "ledger compute job started"
        );
        Ok(JobHandle(started.job_id))
    }

    async fn poll_status(&self, handle: &JobHandle) -> Result<RemoteStatus, ProviderError> {
        let context = format!("status of {handle}");
        let url = join_url(&self.settings.provider_url, "api/services/compute");
        let request = self.http.get(&url).query(&self.consumer_query(handle));

        let body = send(request, &context).await?;
        let status: Value = parse_json(&body, &context)?;
        normalize_status(&status)
    }

    async fn fetch_result(&self, handle: &JobHandle) -> Result<ComputeOutput, ProviderError> {
        let context = format!("result of {handle}");
        let url = join_url(&self.settings.provider_url, "api/services/computeResult");
        let mut query = self.consumer_query(handle);
        query.push(("index", RESULT_INDEX.to_string()));

        let body = send(self.http.get(&url).query(&query), &context).await?;
        decode_output(&body)
    }
}
