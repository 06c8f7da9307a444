//! Application bundle metadata.
//!
//! Reads `Contents/Info.plist`, the Mac App Store receipt marker and the code
//! signature of an `.app` bundle. Nothing here mutates the fact store; the
//! dispatcher decides how each value is merged.

use appsleuth_core::command::{CommandRunner, args};
use appsleuth_core::{Error, Result};
use plist::{Dictionary, Value};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Metadata read from a bundle's Info.plist.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BundleInfo {
    /// Bundle path.
    pub path: PathBuf,
    /// `CFBundleName`, falling back to `CFBundleDisplayName` and the file stem.
    pub name: String,
    /// `CFBundleIdentifier`.
    pub bundle_id: Option<String>,
    /// `CFBundleShortVersionString`.
    pub short_version: Option<String>,
    /// `CFBundleVersion`.
    pub bundle_version: Option<String>,
    /// `SUFeedURL`.
    pub feed_url: Option<String>,
    /// Absolute path of the `.icns` named by `CFBundleIconFile`.
    pub icon_file: Option<PathBuf>,
    /// `LSMinimumSystemVersion`.
    pub minimum_os: Option<String>,
    /// Whether `Contents/_MASReceipt/receipt` exists.
    pub has_store_receipt: bool,
}

fn info_plist(bundle: &Path) -> PathBuf {
    bundle.join("Contents").join("Info.plist")
}

fn string_key(dict: &Dictionary, key: &str) -> Option<String> {
    dict.get(key)
        .and_then(Value::as_string)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn bundle_stem(bundle: &Path) -> String {
    bundle
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Read a bundle's Info.plist.
///
/// # Errors
///
/// Returns an error if the plist is missing or is not a dictionary.
pub fn read_info(bundle: &Path) -> Result<BundleInfo> {
    let plist_path = info_plist(bundle);
    let value = Value::from_file(&plist_path)
        .map_err(|e| Error::parse("Info.plist", format!("{}: {e}", plist_path.display())))?;
    let dict = value
        .as_dictionary()
        .ok_or_else(|| Error::parse("Info.plist", "top level is not a dictionary"))?;

    let name = string_key(dict, "CFBundleName")
        .or_else(|| string_key(dict, "CFBundleDisplayName"))
        .unwrap_or_else(|| bundle_stem(bundle));

    let icon_file = string_key(dict, "CFBundleIconFile").map(|icon| {
        let icon = if Path::new(&icon).extension().is_some() {
            icon
        } else {
            format!("{icon}.icns")
        };
        bundle.join("Contents").join("Resources").join(icon)
    });

    Ok(BundleInfo {
        path: bundle.to_path_buf(),
        name,
        bundle_id: string_key(dict, "CFBundleIdentifier"),
        short_version: string_key(dict, "CFBundleShortVersionString"),
        bundle_version: string_key(dict, "CFBundleVersion"),
        feed_url: string_key(dict, "SUFeedURL"),
        icon_file,
        minimum_os: string_key(dict, "LSMinimumSystemVersion"),
        has_store_receipt: bundle
            .join("Contents")
            .join("_MASReceipt")
            .join("receipt")
            .is_file(),
    })
}

/// Whether a bundle declares an update feed. Unreadable bundles do not.
#[must_use]
pub fn declares_feed(bundle: &Path) -> bool {
    read_info(bundle).is_ok_and(|info| info.feed_url.is_some())
}

/// Whether a directory looks like bundle contents without the `.app` wrapper.
#[must_use]
pub fn is_bare_contents(dir: &Path) -> bool {
    dir.join("Contents").join("Info.plist").is_file()
}

/// Re-wrap bare bundle contents found at `dir` into `<parent>/<name>.app`.
///
/// The bundle name comes from the contents' own Info.plist when possible.
///
/// # Errors
///
/// Returns an error if the contents cannot be moved.
pub fn rewrap(dir: &Path, parent: &Path, fallback_name: &str) -> Result<PathBuf> {
    let name = Value::from_file(dir.join("Contents").join("Info.plist"))
        .ok()
        .and_then(|v| {
            let dict = v.as_dictionary()?;
            string_key(dict, "CFBundleName").or_else(|| string_key(dict, "CFBundleExecutable"))
        })
        .unwrap_or_else(|| fallback_name.to_string());

    let bundle = parent.join(format!("{name}.app"));
    std::fs::create_dir_all(&bundle)?;
    std::fs::rename(dir.join("Contents"), bundle.join("Contents"))?;
    debug!(from = %dir.display(), to = %bundle.display(), "Re-wrapped bare bundle contents");
    Ok(bundle)
}

/// Whether a bundle name suggests an installer rather than the app itself.
#[must_use]
pub fn looks_like_installer(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower.contains("install")
}

/// Parsed `codesign --display` output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeSignature {
    /// Authority chain, leaf first.
    pub authorities: Vec<String>,
    /// Designated requirement.
    pub designated_requirement: Option<String>,
    /// Developer name from a Developer ID authority.
    pub developer: Option<String>,
    /// Team identifier.
    pub team_id: Option<String>,
}

/// Parse the combined output of `codesign --display --verbose=2 -r-`.
#[must_use]
pub fn parse_codesign(output: &str) -> CodeSignature {
    let mut signature = CodeSignature::default();

    for line in output.lines().map(str::trim) {
        if let Some(authority) = line.strip_prefix("Authority=") {
            signature.authorities.push(authority.to_string());
            let developer_id = authority
                .strip_prefix("Developer ID Application: ")
                .and_then(|rest| rest.rsplit_once(" ("));
            if let (None, Some((name, team))) = (&signature.developer, developer_id) {
                signature.developer = Some(name.trim().to_string());
                signature.team_id = Some(team.trim_end_matches(')').to_string());
            }
        } else if let Some(team) = line.strip_prefix("TeamIdentifier=") {
            if team != "not set" && signature.team_id.is_none() {
                signature.team_id = Some(team.to_string());
            }
        } else if let Some(requirement) = line.strip_prefix("designated => ") {
            signature.designated_requirement = Some(requirement.to_string());
        }
    }
    signature
}

/// Read a bundle's code signature.
///
/// Returns `Ok(None)` when the bundle is unsigned or `codesign` rejects it.
///
/// # Errors
///
/// Returns an error only if `codesign` cannot be run.
pub async fn read_signature(runner: &dyn CommandRunner, bundle: &Path) -> Result<Option<CodeSignature>> {
    let target = bundle.to_string_lossy();
    let output = runner
        .run("codesign", &args(["--display", "--verbose=2", "-r-", &*target]), None)
        .await?;
    if !output.success() {
        debug!(bundle = %bundle.display(), stderr = %output.stderr_text().trim(), "No usable code signature");
        return Ok(None);
    }
    let combined = format!("{}\n{}", output.stderr_text(), output.stdout_text());
    let signature = parse_codesign(&combined);
    Ok((!signature.authorities.is_empty() || signature.designated_requirement.is_some())
        .then_some(signature))
}

/// Convert an `.icns` file to PNG with `sips`.
///
/// # Errors
///
/// Returns an error if `sips` cannot be run or reports a failure.
pub async fn convert_icon(runner: &dyn CommandRunner, icns: &Path, png: &Path) -> Result<PathBuf> {
    let source = icns.to_string_lossy();
    let target = png.to_string_lossy();
    let output = runner
        .run("sips", &args(["-s", "format", "png", &*source, "--out", &*target]), None)
        .await?;
    if !output.success() {
        return Err(Error::command("sips", output.stderr_text().trim().to_string()));
    }
    Ok(png.to_path_buf())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Write a minimal bundle with the given Info.plist entries.
    pub(crate) fn write_bundle(parent: &Path, name: &str, entries: &[(&str, &str)]) -> PathBuf {
        let bundle = parent.join(format!("{name}.app"));
        let contents = bundle.join("Contents");
        std::fs::create_dir_all(contents.join("MacOS")).unwrap();
        let mut dict = Dictionary::new();
        for (key, value) in entries {
            dict.insert((*key).to_string(), Value::String((*value).to_string()));
        }
        Value::Dictionary(dict)
            .to_file_xml(contents.join("Info.plist"))
            .unwrap();
        std::fs::write(contents.join("MacOS").join(name), vec![0u8; 64]).unwrap();
        bundle
    }

    #[test]
    fn test_read_info() {
        let temp = TempDir::new().unwrap();
        let bundle = write_bundle(
            temp.path(),
            "Example",
            &[
                ("CFBundleName", "Example"),
                ("CFBundleIdentifier", "com.example.app"),
                ("CFBundleShortVersionString", "1.2.3"),
                ("CFBundleVersion", "123"),
                ("SUFeedURL", "https://example.com/appcast.xml"),
                ("CFBundleIconFile", "AppIcon"),
                ("LSMinimumSystemVersion", "11.0"),
            ],
        );

        let info = read_info(&bundle).unwrap();
        assert_eq!(info.name, "Example");
        assert_eq!(info.bundle_id.as_deref(), Some("com.example.app"));
        assert_eq!(info.short_version.as_deref(), Some("1.2.3"));
        assert_eq!(info.bundle_version.as_deref(), Some("123"));
        assert_eq!(info.feed_url.as_deref(), Some("https://example.com/appcast.xml"));
        assert_eq!(
            info.icon_file.unwrap(),
            bundle.join("Contents/Resources/AppIcon.icns")
        );
        assert_eq!(info.minimum_os.as_deref(), Some("11.0"));
        assert!(!info.has_store_receipt);
        assert!(declares_feed(&bundle));
    }

    #[test]
    fn test_name_falls_back_to_stem() {
        let temp = TempDir::new().unwrap();
        let bundle = write_bundle(temp.path(), "Fallback", &[("CFBundleVersion", "1")]);
        assert_eq!(read_info(&bundle).unwrap().name, "Fallback");
        assert!(!declares_feed(&bundle));
    }

    #[test]
    fn test_store_receipt() {
        let temp = TempDir::new().unwrap();
        let bundle = write_bundle(temp.path(), "Store", &[]);
        let receipt = bundle.join("Contents/_MASReceipt");
        std::fs::create_dir_all(&receipt).unwrap();
        std::fs::write(receipt.join("receipt"), b"x").unwrap();
        assert!(read_info(&bundle).unwrap().has_store_receipt);
    }

    #[test]
    fn test_missing_plist_is_parse_error() {
        let temp = TempDir::new().unwrap();
        let result = read_info(&temp.path().join("Nothing.app"));
        assert!(matches!(result, Err(Error::Parse { .. })));
    }

    #[test]
    fn test_rewrap_bare_contents() {
        let temp = TempDir::new().unwrap();
        let payload = temp.path().join("payload");
        let built = write_bundle(temp.path(), "Renamed", &[("CFBundleName", "Real Name")]);
        std::fs::create_dir_all(&payload).unwrap();
        std::fs::rename(built.join("Contents"), payload.join("Contents")).unwrap();
        assert!(is_bare_contents(&payload));

        let bundle = rewrap(&payload, temp.path(), "fallback").unwrap();
        assert_eq!(bundle, temp.path().join("Real Name.app"));
        assert_eq!(read_info(&bundle).unwrap().name, "Real Name");
    }

    #[test]
    fn test_looks_like_installer() {
        assert!(looks_like_installer("Install Example"));
        assert!(looks_like_installer("Example Uninstaller"));
        assert!(!looks_like_installer("Example"));
    }

    #[test]
    fn test_parse_codesign() {
        let output = "\
Executable=/Applications/Example.app/Contents/MacOS/Example
Identifier=com.example.app
Authority=Developer ID Application: Example Corp (ABCDE12345)
Authority=Developer ID Certification Authority
Authority=Apple Root CA
TeamIdentifier=ABCDE12345
designated => identifier \"com.example.app\" and anchor apple generic and certificate leaf[subject.OU] = ABCDE12345
";
        let signature = parse_codesign(output);
        assert_eq!(signature.authorities.len(), 3);
        assert_eq!(signature.developer.as_deref(), Some("Example Corp"));
        assert_eq!(signature.team_id.as_deref(), Some("ABCDE12345"));
        assert!(
            signature
                .designated_requirement
                .unwrap()
                .starts_with("identifier \"com.example.app\"")
        );
    }

    #[test]
    fn test_parse_ad_hoc_signature() {
        let signature = parse_codesign("Signature=adhoc\nTeamIdentifier=not set\n");
        assert!(signature.authorities.is_empty());
        assert!(signature.team_id.is_none());
        assert!(signature.developer.is_none());
    }
}
