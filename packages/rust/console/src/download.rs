//! Vendor download helpers: one-hop redirect resolution and icon fetching.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::header::{CONTENT_TYPE, LOCATION};
use reqwest::{Client, redirect};
use tracing::{debug, instrument};
use url::Url;

use besengine_core::pipeline::TaskSources;
use besengine_shared::{BesEngineError, Result};

/// Redirects followed when fetching an icon.
const MAX_REDIRECTS: usize = 5;

fn network(url: &str, e: impl std::fmt::Display) -> BesEngineError {
    BesEngineError::Network(format!("{url}: {e}"))
}

/// HTTP-backed [`TaskSources`] used by `build`.
#[derive(Debug, Clone)]
pub struct HttpSources {
    /// Never follows redirects; used to read `Location`.
    resolver: Client,
    fetcher: Client,
}

impl HttpSources {
    /// Build both clients; `user_agent` is presented to vendor download servers.
    pub fn new(user_agent: &str, timeout_secs: u64) -> Result<Self> {
        let timeout = Duration::from_secs(timeout_secs);
        let build = |policy: redirect::Policy| {
            Client::builder()
                .user_agent(user_agent)
                .redirect(policy)
                .timeout(timeout)
                .build()
                .map_err(|e| BesEngineError::Network(format!("failed to build HTTP client: {e}")))
        };

        Ok(Self {
            resolver: build(redirect::Policy::none())?,
            fetcher: build(redirect::Policy::limited(MAX_REDIRECTS))?,
        })
    }
}

impl TaskSources for HttpSources {
    async fn resolve_url(&self, url: &str) -> Result<String> {
        resolve_direct_url(&self.resolver, url).await
    }

    async fn fetch_icon(&self, url: &str) -> Result<String> {
        fetch_icon(&self.fetcher, url).await
    }
}

/// Send a `HEAD` without following redirects and return the `Location` target.
///
/// Returns `url` unchanged when the server answers without a `Location`.
/// Relative locations are resolved against `url`.
#[instrument(skip(client))]
pub async fn resolve_direct_url(client: &Client, url: &str) -> Result<String> {
    let response = client.head(url).send().await.map_err(|e| network(url, e))?;

    let Some(location) = response.headers().get(LOCATION) else {
        debug!(status = %response.status(), "no redirect, using URL as-is");
        return Ok(url.to_string());
    };

    let location = location
        .to_str()
        .map_err(|e| BesEngineError::parse(format!("{url}: invalid Location header: {e}")))?;

    let resolved = match Url::parse(location) {
        Ok(absolute) => absolute,
        Err(url::ParseError::RelativeUrlWithoutBase) => Url::parse(url)
            .and_then(|base| base.join(location))
            .map_err(|e| BesEngineError::parse(format!("{url}: bad redirect {location}: {e}")))?,
        Err(e) => {
            return Err(BesEngineError::parse(format!(
                "{url}: bad redirect {location}: {e}"
            )));
        }
    };

    debug!(%resolved, "followed redirect");
    Ok(resolved.to_string())
}

/// Download an icon and encode it as a `data:` URI.
#[instrument(skip(client))]
pub async fn fetch_icon(client: &Client, url: &str) -> Result<String> {
    let response = client.get(url).send().await.map_err(|e| network(url, e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(network(url, format!("HTTP {status}")));
    }

    let final_url = response.url().clone();
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let bytes = response.bytes().await.map_err(|e| network(url, e))?;
    let mime = icon_mime_type(&final_url, content_type.as_deref());
    debug!(%final_url, %mime, size = bytes.len(), "fetched icon");

    Ok(icon_data_uri(&mime, &bytes))
}

/// Image type from the final URL's extension, falling back to `Content-Type`.
pub fn icon_mime_type(final_url: &Url, content_type: Option<&str>) -> String {
    let extension = final_url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .and_then(|last| last.rsplit_once('.'))
        .map(|(_, ext)| ext)
        .filter(|ext| !ext.is_empty());

    match (extension, content_type) {
        (Some(ext), _) => format!("image/{ext}"),
        (None, Some(ct)) => ct.split(';').next().unwrap_or(ct).trim().to_string(),
        (None, None) => "image/png".to_string(),
    }
}

pub fn icon_data_uri(mime: &str, bytes: &[u8]) -> String {
    format!("data:{mime};base64,{}", STANDARD.encode(bytes))
}
