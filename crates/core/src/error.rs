//! Error types shared across the appsleuth crates.

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for appsleuth operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while resolving a piece of software.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// The input string is not a URL or a recognized local artifact.
    #[error("Unrecognized input: {input}")]
    #[diagnostic(
        code(appsleuth::input::invalid),
        help(
            "Pass an http(s)/ftp/file URL, or a path ending in .app, .zip, .tgz, .dmg, .iso, .pkg or .mpkg"
        )
    )]
    InvalidInput {
        /// The rejected input
        input: String,
    },

    /// A local input path does not exist.
    #[error("Input not found: {}", path.display())]
    #[diagnostic(code(appsleuth::input::not_found))]
    InputNotFound {
        /// The missing path
        path: PathBuf,
    },

    /// The artifact did not match any format in the catalogue.
    #[error("Unsupported format: {subject}")]
    #[diagnostic(
        code(appsleuth::format::unsupported),
        help("Only disk images, archives, installer packages and update feeds can be inspected")
    )]
    UnsupportedFormat {
        /// The URL or path that could not be classified
        subject: String,
    },

    /// An outbound request failed or returned a non-success status.
    #[error("Failed to fetch {url}: {message}")]
    #[diagnostic(code(appsleuth::fetch::failed))]
    Fetch {
        /// The requested URL
        url: String,
        /// HTTP status, when a response was received
        status: Option<u16>,
        /// Transport error text
        message: String,
    },

    /// A provider adapter could not produce its contribution.
    #[error("{provider} request failed: {message}")]
    #[diagnostic(
        code(appsleuth::provider::failed),
        help("Provider APIs are rate limited; set GITHUB_TOKEN to raise the limit")
    )]
    Provider {
        /// Provider name
        provider: &'static str,
        /// Error message
        message: String,
    },

    /// An artifact could not be opened by its unpacker.
    #[error("Failed to unpack {kind} {}: {message}", path.display())]
    #[diagnostic(code(appsleuth::unpack::failed))]
    Unpack {
        /// Artifact kind (archive, disk image, package)
        kind: &'static str,
        /// The artifact path
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// A shell collaborator could not be spawned.
    #[error("Failed to run {program}: {message}")]
    #[diagnostic(code(appsleuth::command::failed))]
    Command {
        /// The program name
        program: String,
        /// Error message
        message: String,
    },

    /// Structured metadata could not be parsed.
    #[error("Failed to parse {what}: {message}")]
    #[diagnostic(code(appsleuth::parse::failed))]
    Parse {
        /// What was being parsed (Info.plist, update feed, ...)
        what: &'static str,
        /// Error message
        message: String,
    },

    /// A mandatory fact could not be derived.
    #[error("Could not determine {fact}")]
    #[diagnostic(
        code(appsleuth::facts::missing),
        help("The application bundle does not carry enough metadata to build a recipe")
    )]
    MissingFact {
        /// Name of the missing fact
        fact: &'static str,
    },

    /// Store-distributed software cannot be resolved from a URL.
    #[error("App Store URLs are not supported: {url}")]
    #[diagnostic(
        code(appsleuth::input::store_url),
        help("Pass the path to the installed application instead")
    )]
    StoreUrl {
        /// The rejected URL
        url: String,
    },

    /// IO error.
    #[error("IO error: {0}")]
    #[diagnostic(code(appsleuth::io))]
    Io(#[from] std::io::Error),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    #[diagnostic(code(appsleuth::json))]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create an invalid input error.
    #[must_use]
    pub fn invalid_input(input: impl Into<String>) -> Self {
        Self::InvalidInput {
            input: input.into(),
        }
    }

    /// Create an unsupported format error.
    #[must_use]
    pub fn unsupported_format(subject: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            subject: subject.into(),
        }
    }

    /// Create a fetch error without a response status.
    #[must_use]
    pub fn fetch(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Fetch {
            url: url.into(),
            status: None,
            message: message.into(),
        }
    }

    /// Create a fetch error for a non-success response.
    #[must_use]
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::Fetch {
            url: url.into(),
            status: Some(status),
            message: format!("HTTP {status}"),
        }
    }

    /// Create a provider error.
    #[must_use]
    pub fn provider(provider: &'static str, message: impl Into<String>) -> Self {
        Self::Provider {
            provider,
            message: message.into(),
        }
    }

    /// Create an unpack error.
    #[must_use]
    pub fn unpack(kind: &'static str, path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Unpack {
            kind,
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a command error.
    #[must_use]
    pub fn command(program: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Command {
            program: program.into(),
            message: message.into(),
        }
    }

    /// Create a parse error.
    #[must_use]
    pub fn parse(what: &'static str, message: impl Into<String>) -> Self {
        Self::Parse {
            what,
            message: message.into(),
        }
    }

    /// HTTP status carried by a fetch error, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Fetch { status, .. } => *status,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_status() {
        let err = Error::http_status("https://example.com/app.dmg", 404);
        assert_eq!(err.status(), Some(404));
        assert_eq!(
            err.to_string(),
            "Failed to fetch https://example.com/app.dmg: HTTP 404"
        );

        let err = Error::fetch("https://example.com", "connection refused");
        assert_eq!(err.status(), None);
    }

    #[test]
    fn test_unpack_error_display() {
        let err = Error::unpack("archive", "/tmp/app.zip", "not a zip file");
        assert_eq!(
            err.to_string(),
            "Failed to unpack archive /tmp/app.zip: not a zip file"
        );
    }

    #[test]
    fn test_diagnostic_code() {
        let err = Error::invalid_input("hello");
        let code = err.code().map(|c| c.to_string());
        assert_eq!(code.as_deref(), Some("appsleuth::input::invalid"));
    }
}
