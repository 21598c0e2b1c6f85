//! Compute backend abstraction.
//!
//! The orchestrator talks to every backend through [`ComputeProvider`]; each implementation
//! classifies its failures as transient or fatal and normalizes its status vocabulary into
//! [`RemoteStatus`].

pub mod direct;
pub mod error;
mod http;
pub mod ledger;
mod payload;
pub mod types;

use std::sync::Arc;

use async_trait::async_trait;

pub use direct::{DirectComputeProvider, DirectSettings};
pub use error::{ErrorClass, ProviderError};
pub use ledger::{AlgorithmContainer, LedgerComputeProvider, LedgerSettings};
pub use types::{
    AssetRef, BackendKind, ComputeAssets, ComputeOutput, ComputeRequest, JobHandle, RemoteStatus,
    ScoredHospital,
};

use crate::config::ComputeConfig;

/// Matching algorithm uploaded to backends that accept raw algorithm content.
pub const BUNDLED_ALGORITHM: &str = include_str!("../../assets/matching_algorithm.py");
pub const BUNDLED_ALGORITHM_FILE: &str = "algorithm.py";

/// Capability set shared by every compute backend.
#[async_trait]
pub trait ComputeProvider: Send + Sync {
    fn backend(&self) -> BackendKind;

    /// Starts remote work. Callers never retry a failed submission.
    async fn submit(&self, request: &ComputeRequest) -> Result<JobHandle, ProviderError>;

    async fn poll_status(&self, handle: &JobHandle) -> Result<RemoteStatus, ProviderError>;

    /// Downloads the output of a job that reported success.
    async fn fetch_result(&self, handle: &JobHandle) -> Result<ComputeOutput, ProviderError>;
}

/// Consumer identity used to authenticate ledger requests. Key custody lives elsewhere; this
/// only exposes the address and any signature already produced for it.
pub trait IdentityProvider: Send + Sync {
    fn consumer_address(&self) -> &str;
    fn sign(&self, message: &str) -> Option<String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticIdentity {
    address: String,
    signature: Option<String>,
}

impl StaticIdentity {
    pub fn new(address: impl Into<String>, signature: Option<String>) -> Self {
        Self {
            address: address.into(),
            signature,
        }
    }
}

impl IdentityProvider for StaticIdentity {
    fn consumer_address(&self) -> &str {
        &self.address
    }

    fn sign(&self, _message: &str) -> Option<String> {
        self.signature.clone()
    }
}

/// Builds the provider selected by `config.backend`.
pub fn build_provider(config: &ComputeConfig) -> Result<Arc<dyn ComputeProvider>, ProviderError> {
    match config.backend {
        BackendKind::Direct => Ok(Arc::new(DirectComputeProvider::new(DirectSettings {
            node_url: config.direct.node_url.clone(),
            request_timeout: config.request_timeout,
        })?)),
        BackendKind::Ledger => {
            let identity = Arc::new(StaticIdentity::new(
                config.ledger.consumer_address.clone(),
                config.ledger.consumer_signature.clone(),
            ));
            let settings = LedgerSettings {
                indexer_url: config.ledger.indexer_url.clone(),
                provider_url: config.ledger.provider_url.clone(),
                container: AlgorithmContainer::default(),
                request_timeout: config.request_timeout,
            };
            Ok(Arc::new(LedgerComputeProvider::new(settings, identity)?))
        }
    }
}

impl ComputeAssets {
    /// Published identifiers for the ledger backend.
    pub fn published(algorithm_did: impl Into<String>, dataset_did: impl Into<String>) -> Self {
        Self {
            algorithm: AssetRef::published(algorithm_did),
            dataset: AssetRef::published(dataset_did),
        }
    }

    /// Inline upload of `algorithm` alongside the hospital snapshot serialized as JSON.
    pub fn inline(algorithm: AssetRef, hospitals_json: impl Into<Vec<u8>>) -> Self {
        Self {
            algorithm,
            dataset: AssetRef::inline("hospitals_dataset.json", "application/json", hospitals_json),
        }
    }

    pub fn bundled_algorithm() -> AssetRef {
        AssetRef::inline(BUNDLED_ALGORITHM_FILE, "text/plain", BUNDLED_ALGORITHM.as_bytes())
    }
}
