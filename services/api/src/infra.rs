use medchain::compute::{AssetRef, BackendKind, ComputeAssets};
use medchain::config::{AssetPaths, ComputeConfig};
use medchain::error::AppError;
use medchain::matching::{HospitalRecord, HospitalSourceError, StaticHospitalSource};
use metrics_exporter_prometheus::PrometheusHandle;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
    pub(crate) backend: BackendKind,
    pub(crate) compute_endpoint: String,
}

/// Hospital snapshot from `path`, or the bundled sample when none is configured.
pub(crate) fn load_hospitals(path: Option<&Path>) -> Result<StaticHospitalSource, AppError> {
    let source = match path {
        Some(path) => StaticHospitalSource::from_path(path)?,
        None => StaticHospitalSource::bundled()?,
    };
    Ok(source)
}

/// Algorithm/dataset pairing for the configured backend.
///
/// The ledger backend runs published assets; the direct backend uploads the algorithm script
/// and the hospital snapshot with every job.
pub(crate) fn compute_assets(
    compute: &ComputeConfig,
    paths: &AssetPaths,
    hospitals: &[HospitalRecord],
) -> Result<ComputeAssets, AppError> {
    if compute.backend == BackendKind::Ledger {
        return Ok(ComputeAssets::published(
            compute.ledger.algorithm_did.clone(),
            compute.ledger.dataset_did.clone(),
        ));
    }

    let algorithm = match &paths.algorithm_path {
        Some(path) => {
            let content = std::fs::read(path)?;
            let file_name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| medchain::compute::BUNDLED_ALGORITHM_FILE.to_string());
            AssetRef::inline(file_name, "text/plain", content)
        }
        None => ComputeAssets::bundled_algorithm(),
    };
    let dataset = serde_json::to_vec(hospitals).map_err(HospitalSourceError::from)?;

    Ok(ComputeAssets::inline(algorithm, dataset))
}
