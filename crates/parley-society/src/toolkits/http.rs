// Shared HTTP plumbing for toolkits that read the web

use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use super::text::html_to_text;
use crate::error::{Result, SocietyError};

const USER_AGENT: &str = concat!("parley/", env!("CARGO_PKG_VERSION"));

/// Build the client toolkits use for outbound requests.
pub(crate) fn http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| SocietyError::Configuration(format!("Failed to build HTTP client: {}", e)))
}

/// Fetch `url` and return its readable text. HTML is reduced to text;
/// anything else is returned as-is. The raw body is returned alongside for
/// link extraction.
pub(crate) async fn fetch_text(client: &Client, url: &str, tool: &str) -> Result<(String, String)> {
    debug!(url = %url, "Fetching page");
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| SocietyError::tool(tool, format!("Request to {} failed: {}", url, e)))?;

    let status = response.status();
    let is_html = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("html"));
    let body = response
        .text()
        .await
        .map_err(|e| SocietyError::tool(tool, format!("Failed to read {}: {}", url, e)))?;

    if !status.is_success() {
        return Err(SocietyError::tool(tool, format!("{} returned HTTP {}", url, status.as_u16())));
    }

    let text = if is_html || body.trim_start().starts_with('<') { html_to_text(&body) } else { body.clone() };
    Ok((text, body))
}
