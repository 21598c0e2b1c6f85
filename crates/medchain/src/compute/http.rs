use std::time::Duration;

use serde::de::DeserializeOwned;

use super::error::ProviderError;

const USER_AGENT: &str = concat!("medchain/", env!("CARGO_PKG_VERSION"));

pub(crate) fn build_client(request_timeout: Duration) -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(request_timeout)
        .build()
        .map_err(|err| ProviderError::fatal(format!("failed to build HTTP client: {err}")))
}

pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Sends a request and returns the body of a successful response.
pub(crate) async fn send(
    request: reqwest::RequestBuilder,
    context: &str,
) -> Result<Vec<u8>, ProviderError> {
    let response = request
        .send()
        .await
        .map_err(|err| ProviderError::from_reqwest(err, context))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderError::from_status(status, context, &body));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|err| ProviderError::from_reqwest(err, context))?;
    Ok(bytes.to_vec())
}

pub(crate) fn parse_json<T: DeserializeOwned>(body: &[u8], context: &str) -> Result<T, ProviderError> {
    serde_json::from_slice(body)
        .map_err(|err| ProviderError::fatal(format!("{context}: invalid response body: {err}")))
}
