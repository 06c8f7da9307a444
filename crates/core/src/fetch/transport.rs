//! HTTP(S)/FTP transport.
//!
//! Redirects are followed by hand so callers can see both the final URL and
//! how many hops it took.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, LOCATION};
use reqwest::{Client, Method, Url, redirect};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, trace};

use crate::command::{CommandRunner, SystemRunner, args};
use crate::{Error, Result};

/// Maximum redirect hops before giving up.
pub const MAX_REDIRECTS: usize = 10;

/// Request verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    /// Headers only.
    Head,
    /// Full body.
    Get,
}

/// An outbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Verb.
    pub method: HttpMethod,
    /// Target URL.
    pub url: String,
    /// Extra request headers (authorization, user agent, accept).
    pub headers: Vec<(String, String)>,
}

impl HttpRequest {
    /// A HEAD request.
    #[must_use]
    pub fn head(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Head,
            url: url.into(),
            headers: Vec::new(),
        }
    }

    /// A GET request.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            headers: Vec::new(),
        }
    }

    /// Add a request header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// A response after redirects were followed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpResponse {
    /// URL that produced this response.
    pub url: String,
    /// HTTP status code.
    pub status: u16,
    /// Response headers, names lower-cased.
    pub headers: BTreeMap<String, String>,
    /// Number of redirects followed.
    pub redirects: usize,
    /// Response body; empty for HEAD.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Whether the status is 2xx or 3xx.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status < 400
    }

    /// A response header by lower-case name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

/// Sends requests on behalf of the fetch client.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `request`, following redirects.
    ///
    /// # Errors
    ///
    /// Returns an error when no response could be obtained. Error statuses are
    /// returned as responses.
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse>;
}

/// Transport backed by `reqwest`, with `curl` for FTP.
pub struct ReqwestTransport {
    client: Client,
    runner: SystemRunner,
}

impl ReqwestTransport {
    /// Create a transport with the given default user agent and timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend fails to initialize.
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .redirect(redirect::Policy::none())
            .build()
            .map_err(|e| Error::fetch("(client)", format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            runner: SystemRunner,
        })
    }

    async fn send_ftp(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let mut curl_args = vec!["--silent", "--show-error", "--fail"];
        if request.method == HttpMethod::Head {
            curl_args.push("--head");
        }
        curl_args.push(&request.url);

        let output = self.runner.run("curl", &args(curl_args), None).await?;
        if !output.success() {
            return Err(Error::fetch(&request.url, output.stderr_text().trim().to_string()));
        }
        Ok(HttpResponse {
            url: request.url.clone(),
            status: 200,
            headers: BTreeMap::new(),
            redirects: 0,
            body: if request.method == HttpMethod::Get {
                output.stdout
            } else {
                Vec::new()
            },
        })
    }
}

fn header_map(headers: &[(String, String)], url: &str) -> Result<HeaderMap> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| Error::fetch(url, format!("invalid header name {name}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| Error::fetch(url, format!("invalid header value: {e}")))?;
        map.insert(name, value);
    }
    Ok(map)
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse> {
        if request.url.to_ascii_lowercase().starts_with("ftp://") {
            return self.send_ftp(request).await;
        }

        let headers = header_map(&request.headers, &request.url)?;
        let method = match request.method {
            HttpMethod::Head => Method::HEAD,
            HttpMethod::Get => Method::GET,
        };

        let mut current =
            Url::parse(&request.url).map_err(|e| Error::fetch(&request.url, e.to_string()))?;
        let mut redirects = 0;

        loop {
            trace!(url = %current, ?method, "Sending request");
            let response = self
                .client
                .request(method.clone(), current.clone())
                .headers(headers.clone())
                .send()
                .await
                .map_err(|e| Error::fetch(current.as_str(), e.to_string()))?;

            let status = response.status();
            if status.is_redirection() {
                if let Some(location) = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                {
                    if redirects >= MAX_REDIRECTS {
                        return Err(Error::fetch(&request.url, "too many redirects"));
                    }
                    let next = current
                        .join(location)
                        .map_err(|e| Error::fetch(current.as_str(), e.to_string()))?;
                    debug!(from = %current, to = %next, "Following redirect");
                    current = next;
                    redirects += 1;
                    continue;
                }
            }

            let headers = response
                .headers()
                .iter()
                .filter_map(|(k, v)| Some((k.as_str().to_string(), v.to_str().ok()?.to_string())))
                .collect();
            let body = if request.method == HttpMethod::Get {
                response
                    .bytes()
                    .await
                    .map_err(|e| Error::fetch(current.as_str(), e.to_string()))?
                    .to_vec()
            } else {
                Vec::new()
            };

            return Ok(HttpResponse {
                url: current.to_string(),
                status: status.as_u16(),
                headers,
                redirects,
                body,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transport() -> ReqwestTransport {
        ReqwestTransport::new("appsleuth-test", Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_follows_redirects_and_counts_hops() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/latest"))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", "/v2/App.zip"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/App.zip"))
            .respond_with(ResponseTemplate::new(301).insert_header("Location", "/files/App.zip"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/files/App.zip"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"PK".to_vec()))
            .mount(&server)
            .await;

        let response = transport()
            .send(&HttpRequest::get(format!("{}/latest", server.uri())))
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.redirects, 2);
        assert!(response.url.ends_with("/files/App.zip"));
        assert_eq!(response.body, b"PK");
    }

    #[tokio::test]
    async fn test_error_status_is_a_response() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let response = transport()
            .send(&HttpRequest::head(format!("{}/missing.dmg", server.uri())))
            .await
            .unwrap();
        assert_eq!(response.status, 404);
        assert!(!response.is_ok());
    }

    #[tokio::test]
    async fn test_injects_request_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).insert_header("content-type", "application/json"))
            .mount(&server)
            .await;

        let response = transport()
            .send(
                &HttpRequest::get(format!("{}/api", server.uri()))
                    .with_header("Authorization", "Bearer secret"),
            )
            .await
            .unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.header("content-type"), Some("application/json"));
    }

    #[tokio::test]
    async fn test_connection_failure_is_an_error() {
        let result = transport()
            .send(&HttpRequest::head("http://127.0.0.1:9/unreachable"))
            .await;
        assert!(matches!(result, Err(Error::Fetch { status: None, .. })));
    }
}
