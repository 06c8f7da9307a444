//! Outbound HTTP(S)/FTP access.

mod client;
mod transport;

pub use client::{
    BROWSER_USER_AGENT, FetchClient, Probe, UNRELIABLE_HEADER_HOSTS, disposition_filename,
    has_unreliable_headers, https_variant, sha256_file,
};
pub use transport::{HttpMethod, HttpRequest, HttpResponse, MAX_REDIRECTS, ReqwestTransport, Transport};
