//! Backend that uploads raw algorithm and dataset content to a node's free compute endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use super::error::ProviderError;
use super::http::{build_client, join_url, parse_json, send};
use super::payload::{decode_output, normalize_status};
use super::types::{AssetRef, BackendKind, ComputeOutput, ComputeRequest, JobHandle, RemoteStatus};
use super::ComputeProvider;

#[derive(Debug, Clone, PartialEq)]
pub struct DirectSettings {
    pub node_url: String,
    pub request_timeout: Duration,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    job_id: String,
    #[serde(default)]
    message: Option<String>,
}

pub struct DirectComputeProvider {
    http: reqwest::Client,
    node_url: String,
}

impl DirectComputeProvider {
    pub fn new(settings: DirectSettings) -> Result<Self, ProviderError> {
        Ok(Self {
            http: build_client(settings.request_timeout)?,
            node_url: settings.node_url,
        })
    }

    fn upload_part(asset: &AssetRef, role: &str) -> Result<Part, ProviderError> {
        match asset {
            AssetRef::Inline {
                file_name,
                media_type,
                content,
            } => Part::bytes(content.to_vec())
                .file_name(file_name.clone())
                .mime_str(media_type)
                .map_err(|err| {
                    ProviderError::fatal(format!("invalid media type for {role}: {err}"))
                }),
            AssetRef::Published { did } => Err(ProviderError::fatal(format!(
                "direct backend uploads {role} content, got published asset '{did}'"
            ))),
        }
    }
}

#[async_trait]
impl ComputeProvider for DirectComputeProvider {
    fn backend(&self) -> BackendKind {
        BackendKind::Direct
    }

    async fn submit(&self, request: &ComputeRequest) -> Result<JobHandle, ProviderError> {
        let form = Form::new()
            .part("algorithm", Self::upload_part(&request.algorithm, "algorithm")?)
            .part("dataset", Self::upload_part(&request.dataset, "dataset")?)
            .text("additionalInputs", request.extra_input.to_string());

        let context = "submit free compute job";
        let url = join_url(&self.node_url, "api/v1/compute/free");
        let body = send(self.http.post(&url).multipart(form), context).await?;
        let submitted: SubmitResponse = parse_json(&body, context)?;

        info!(
            job_handle = %submitted.job_id,
            message = submitted.message.as_deref().unwrap_or("job started"),
            "direct compute job started"
        );
        Ok(JobHandle(submitted.job_id))
    }

    async fn poll_status(&self, handle: &JobHandle) -> Result<RemoteStatus, ProviderError> {
        let context = format!("status of {handle}");
        let url = join_url(&self.node_url, &format!("api/v1/compute/status/{handle}"));
        let body = send(self.http.get(&url), &context).await?;
        let status: Value = parse_json(&body, &context)?;
        normalize_status(&status)
    }

    async fn fetch_result(&self, handle: &JobHandle) -> Result<ComputeOutput, ProviderError> {
        let context = format!("result of {handle}");
        let url = join_url(&self.node_url, &format!("api/v1/compute/result/{handle}"));
        let body = send(self.http.get(&url), &context).await?;
        decode_output(&body)
    }
}
