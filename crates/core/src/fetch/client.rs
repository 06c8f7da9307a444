//! Fetch client with HTTPS upgrade and user-agent fallback.

use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use super::transport::{HttpRequest, HttpResponse, Transport};
use crate::providers::UrlParts;
use crate::{Error, Result};

/// User agent sent when a server rejects the default one.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Safari/605.1.15";

/// Hosts whose HEAD responses are known to be unreliable; a 403 from them is
/// not retried with a browser user agent.
pub const UNRELIABLE_HEADER_HOSTS: &[&str] = &[
    "github.com",
    "objects.githubusercontent.com",
    "bitbucket.org",
    "sourceforge.net",
    "amazonaws.com",
];

/// Outcome of probing a URL's headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Probe {
    /// URL that was probed (possibly the HTTPS variant of the request).
    pub url: String,
    /// URL after redirects.
    pub final_url: String,
    /// Final HTTP status.
    pub status: u16,
    /// Response headers, names lower-cased.
    pub headers: BTreeMap<String, String>,
    /// User agent needed to get a successful response, when not the default.
    pub user_agent: Option<String>,
    /// Number of redirects followed.
    pub redirects: usize,
    /// Whether `url` is the HTTPS variant of an `http://` request.
    pub upgraded: bool,
}

impl Probe {
    fn from_response(url: &str, response: HttpResponse, user_agent: Option<&str>, upgraded: bool) -> Self {
        Self {
            url: url.to_string(),
            final_url: response.url,
            status: response.status,
            headers: response.headers,
            user_agent: user_agent.map(str::to_string),
            redirects: response.redirects,
            upgraded,
        }
    }

    /// Whether the probe ended with a 2xx or 3xx status.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status < 400
    }

    /// Declared content type.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type").map(String::as_str)
    }

    /// File name offered by a `Content-Disposition` header.
    #[must_use]
    pub fn disposition_filename(&self) -> Option<String> {
        self.headers
            .get("content-disposition")
            .and_then(|value| disposition_filename(value))
    }
}

/// Extract the `filename` parameter from a `Content-Disposition` value.
#[must_use]
pub fn disposition_filename(value: &str) -> Option<String> {
    value.split(';').map(str::trim).find_map(|param| {
        let (key, raw) = param.split_once('=')?;
        let key = key.trim().to_ascii_lowercase();
        if key != "filename" && key != "filename*" {
            return None;
        }
        let raw = raw.trim();
        // RFC 5987 form: UTF-8''name.dmg
        let raw = raw.rsplit_once("''").map_or(raw, |(_, name)| name);
        let name = raw.trim_matches('"');
        let name = name.rsplit(['/', '\\']).next().unwrap_or(name);
        (!name.is_empty()).then(|| name.to_string())
    })
}

/// The `https://` equivalent of an `http://` URL.
#[must_use]
pub fn https_variant(url: &str) -> Option<String> {
    let lower = url.to_ascii_lowercase();
    lower
        .starts_with("http://")
        .then(|| format!("https://{}", &url["http://".len()..]))
}

/// Whether `url` points at a host with unreliable HEAD responses.
#[must_use]
pub fn has_unreliable_headers(url: &str) -> bool {
    UrlParts::parse(url).is_some_and(|parts| {
        UNRELIABLE_HEADER_HOSTS
            .iter()
            .any(|known| parts.host_is(known))
    })
}

/// Hex-encoded SHA-256 of a file.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub async fn sha256_file(path: &Path) -> Result<String> {
    let bytes = tokio::fs::read(path).await?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

/// HTTP(S)/FTP client used by every inspector and provider adapter.
#[derive(Clone)]
pub struct FetchClient {
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for FetchClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchClient").finish_non_exhaustive()
    }
}

impl FetchClient {
    /// Create a client over the given transport.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Probe a URL's headers.
    ///
    /// `http://` URLs are tried over HTTPS first; when that fails the original
    /// URL is probed unchanged. A 403 from a host that normally answers HEAD
    /// requests is retried once with [`BROWSER_USER_AGENT`].
    ///
    /// # Errors
    ///
    /// Returns an error when no attempt produced a response. Error statuses are
    /// reported through [`Probe::status`].
    pub async fn headers(&self, url: &str) -> Result<Probe> {
        if let Some(https) = https_variant(url) {
            match self.probe(&https, true).await {
                Ok(probe) if probe.is_ok() => {
                    info!(from = %url, to = %https, "Upgraded download URL to HTTPS");
                    return Ok(probe);
                }
                Ok(probe) => debug!(url = %https, status = probe.status, "HTTPS variant rejected"),
                Err(e) => debug!(url = %https, error = %e, "HTTPS variant unavailable"),
            }
        }
        self.probe(url, false).await
    }

    async fn probe(&self, url: &str, upgraded: bool) -> Result<Probe> {
        let response = self.transport.send(&HttpRequest::head(url)).await?;
        if response.status == 403 && !has_unreliable_headers(url) {
            debug!(%url, "Retrying with browser user agent");
            let retry = self
                .transport
                .send(&HttpRequest::head(url).with_header("User-Agent", BROWSER_USER_AGENT))
                .await?;
            if retry.is_ok() {
                return Ok(Probe::from_response(url, retry, Some(BROWSER_USER_AGENT), upgraded));
            }
        }
        Ok(Probe::from_response(url, response, None, upgraded))
    }

    /// Fetch a URL's body, sending `user_agent` when given.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a non-success status.
    pub async fn body(&self, url: &str, user_agent: Option<&str>) -> Result<Vec<u8>> {
        let mut request = HttpRequest::get(url);
        if let Some(agent) = user_agent {
            request = request.with_header("User-Agent", agent);
        }
        Ok(self.send_checked(&request).await?.body)
    }

    /// Fetch a URL's body into `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, a non-success status, or when
    /// the file cannot be written.
    pub async fn body_to_file(
        &self,
        url: &str,
        user_agent: Option<&str>,
        path: &Path,
    ) -> Result<PathBuf> {
        let body = self.body(url, user_agent).await?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, &body).await?;
        debug!(%url, path = %path.display(), bytes = body.len(), "Downloaded");
        Ok(path.to_path_buf())
    }

    /// Fetch and deserialize a JSON document, with an optional bearer token.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, a non-success status, or
    /// malformed JSON.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str, bearer: Option<&str>) -> Result<T> {
        let mut request = HttpRequest::get(url).with_header("Accept", "application/json");
        if let Some(token) = bearer {
            request = request.with_header("Authorization", format!("Bearer {token}"));
        }
        let response = self.send_checked(&request).await?;
        Ok(serde_json::from_slice(&response.body)?)
    }

    async fn send_checked(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let response = self.transport.send(request).await?;
        if !response.is_ok() {
            return Err(Error::http_status(&request.url, response.status));
        }
        Ok(response)
    }
}
