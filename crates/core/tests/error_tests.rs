//! Tests for error types

#![allow(clippy::unwrap_used, clippy::expect_used)]

use appsleuth_core::Error;
use miette::Diagnostic;
use std::path::PathBuf;

#[test]
fn test_invalid_input_error() {
    let error = Error::invalid_input("not a thing");
    assert_eq!(error.to_string(), "Unrecognized input: not a thing");
    assert!(error.help().is_some());
}

#[test]
fn test_input_not_found_error() {
    let error = Error::InputNotFound {
        path: PathBuf::from("/tmp/Missing.dmg"),
    };
    assert_eq!(error.to_string(), "Input not found: /tmp/Missing.dmg");
}

#[test]
fn test_unsupported_format_error() {
    let error = Error::unsupported_format("https://example.com/blob");
    assert_eq!(
        error.to_string(),
        "Unsupported format: https://example.com/blob"
    );
    assert_eq!(
        error.code().map(|c| c.to_string()).as_deref(),
        Some("appsleuth::format::unsupported")
    );
}

#[test]
fn test_provider_error() {
    let error = Error::provider("github", "rate limited or forbidden: HTTP 403");
    assert_eq!(
        error.to_string(),
        "github request failed: rate limited or forbidden: HTTP 403"
    );
    assert!(error.help().unwrap().to_string().contains("GITHUB_TOKEN"));
}

#[test]
fn test_command_and_parse_errors() {
    let error = Error::command("hdiutil", "No such file or directory");
    assert_eq!(
        error.to_string(),
        "Failed to run hdiutil: No such file or directory"
    );

    let error = Error::parse("Info.plist", "top level is not a dictionary");
    assert_eq!(
        error.to_string(),
        "Failed to parse Info.plist: top level is not a dictionary"
    );
}

#[test]
fn test_missing_fact_error() {
    let error = Error::MissingFact { fact: "version" };
    assert_eq!(error.to_string(), "Could not determine version");
    assert!(error.help().is_some());
}

#[test]
fn test_store_url_error() {
    let error = Error::StoreUrl {
        url: "https://apps.apple.com/app/id1".to_string(),
    };
    assert!(error.to_string().contains("App Store"));
    assert_eq!(
        error.code().map(|c| c.to_string()).as_deref(),
        Some("appsleuth::input::store_url")
    );
}

#[test]
fn test_io_error_conversion() {
    use std::io;

    let io_error = io::Error::new(io::ErrorKind::NotFound, "file not found");
    let error = Error::from(io_error);
    assert!(matches!(error, Error::Io(_)));
    assert!(error.to_string().contains("file not found"));
}

#[test]
fn test_json_error_conversion() {
    let json_error = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
    let error = Error::from(json_error);
    assert!(matches!(error, Error::Json(_)));
    assert!(error.to_string().starts_with("JSON error:"));
}

#[test]
fn test_status_only_for_fetch_errors() {
    assert_eq!(Error::http_status("https://example.com", 500).status(), Some(500));
    assert_eq!(Error::parse("update feed", "no channel").status(), None);
}
