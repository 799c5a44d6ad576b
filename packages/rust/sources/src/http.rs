//! The HTTP client shared by all source adapters.

use std::time::Duration;

use reqwest::Client;
use reqwest::header::{ACCEPT_LANGUAGE, HeaderMap, HeaderValue};
use tracing::debug;

use jobagent_shared::{HttpConfig, JobAgentError, Result};

/// Maximum number of redirects followed for any source request.
const MAX_REDIRECTS: usize = 5;

/// Build the client handed to every adapter. Built once per run from
/// `[http]`; adapters clone it (cheap, shares the connection pool).
pub fn build_client(config: &HttpConfig) -> Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT_LANGUAGE,
        HeaderValue::from_static("zh-CN,zh;q=0.9,en-US;q=0.8,en;q=0.7"),
    );

    Client::builder()
        .user_agent(config.user_agent.as_str())
        .default_headers(headers)
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .map_err(|e| JobAgentError::Network(format!("failed to build HTTP client: {e}")))
}

/// GET `url` and return the body as text. Non-2xx is an error.
pub(crate) async fn fetch_text(client: &Client, url: &str) -> Result<String> {
    let bytes = fetch_bytes(client, url).await?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// GET `url` and return the raw body. Non-2xx is an error.
pub(crate) async fn fetch_bytes(client: &Client, url: &str) -> Result<Vec<u8>> {
    debug!(%url, "GET");

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| JobAgentError::Network(format!("{url}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(JobAgentError::Network(format!("{url}: HTTP {status}")));
    }

    let body = response
        .bytes()
        .await
        .map_err(|e| JobAgentError::Network(format!("{url}: body read failed: {e}")))?;

    Ok(body.to_vec())
}
