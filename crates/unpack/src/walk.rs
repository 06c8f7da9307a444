//! Bounded searches over unpacked trees.

use appsleuth_core::Subject;
use appsleuth_core::select::{ApplicationCandidate, most_likely};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

use crate::Discovery;
use crate::bundle;

/// Name fragments of bundles that ship alongside an app but are never the app.
pub const HELPER_APP_MARKERS: &[&str] = &[
    "uninstall",
    "installer",
    "updater",
    "autoupdate",
    "crash reporter",
    "crashreporter",
];

/// Whether a bundle name matches the helper deny-list.
#[must_use]
pub fn is_helper_app(path: &Path) -> bool {
    let name = file_name(path).to_lowercase();
    HELPER_APP_MARKERS.iter().any(|marker| name.contains(marker))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn is_hidden(entry: &DirEntry) -> bool {
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || name == "__MACOSX"
}

/// Whether a file name ends in `.<suffix>` for one of `suffixes`.
#[must_use]
pub fn has_suffix(path: &Path, suffixes: &[&str]) -> bool {
    let name = file_name(path).to_ascii_lowercase();
    suffixes.iter().any(|s| {
        name.strip_suffix(s)
            .is_some_and(|stem| stem.ends_with('.') && stem.len() > 1)
    })
}

/// Find entries with one of `suffixes`, searching `root` itself first.
///
/// Matching directories are not descended into. Hidden entries are skipped.
/// The walk only runs when nothing matches directly under `root`.
#[must_use]
pub fn find_with_suffix(root: &Path, max_depth: usize, suffixes: &[&str]) -> Vec<PathBuf> {
    let matches = |path: &Path| has_suffix(path, suffixes);
    let at_root = find_matching(root, 1, matches);
    if !at_root.is_empty() || max_depth <= 1 {
        return at_root;
    }
    find_matching(root, max_depth, matches)
}

/// Find entries accepted by `matches` within `max_depth` levels of `root`.
///
/// Matching directories are not descended into. Hidden entries are skipped.
pub fn find_matching(root: &Path, max_depth: usize, matches: impl Fn(&Path) -> bool) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut walker = WalkDir::new(root)
        .min_depth(1)
        .max_depth(max_depth)
        .sort_by_file_name()
        .into_iter();

    while let Some(entry) = walker.next() {
        let Ok(entry) = entry else { continue };
        let is_dir = entry.file_type().is_dir();
        if is_hidden(&entry) {
            if is_dir {
                walker.skip_current_dir();
            }
            continue;
        }
        if matches(entry.path()) {
            found.push(entry.path().to_path_buf());
            if is_dir {
                walker.skip_current_dir();
            }
        }
    }
    found
}

/// Application bundles under `root`.
#[must_use]
pub fn find_bundles(root: &Path, max_depth: usize) -> Vec<PathBuf> {
    find_with_suffix(root, max_depth, &["app"])
}

/// Total size in bytes of everything under `path`.
#[must_use]
pub fn tree_size(path: &Path) -> u64 {
    WalkDir::new(path)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter_map(|e| e.metadata().ok())
        .filter(std::fs::Metadata::is_file)
        .map(|m| m.len())
        .sum()
}

fn candidate(path: &Path) -> ApplicationCandidate {
    ApplicationCandidate {
        path: path.to_path_buf(),
        size: tree_size(path),
        in_applications_dir: path
            .parent()
            .and_then(Path::file_name)
            .is_some_and(|n| n == "Applications"),
        has_feed: bundle::declares_feed(path),
    }
}

/// Choose the primary application among `apps` and record the rest.
///
/// Helper bundles are recorded as helpers and never block. Every other
/// non-primary bundle is recorded as a blocking application. When only helper
/// bundles exist, they compete for primary instead.
pub fn select_applications(apps: Vec<PathBuf>, discovery: &mut Discovery) {
    let (helpers, mut apps): (Vec<_>, Vec<_>) = apps.into_iter().partition(|p| is_helper_app(p));
    if apps.is_empty() {
        apps = helpers;
    } else {
        for helper in &helpers {
            discovery.helper_applications.push(file_name(helper));
        }
    }

    let candidates: Vec<ApplicationCandidate> = apps.iter().map(|p| candidate(p)).collect();
    let Some(primary) = most_likely(&candidates) else {
        return;
    };
    if candidates.len() > 1 {
        debug!(
            primary = %candidates[primary].file_name(),
            count = candidates.len(),
            "Chose primary application"
        );
    }
    for (i, c) in candidates.into_iter().enumerate() {
        if i == primary {
            discovery.artifacts.insert(0, Subject::Bundle(c.path));
        } else {
            discovery.blocking_applications.push(c.file_name());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::tests::write_bundle;
    use tempfile::TempDir;

    #[test]
    fn test_root_matches_win_over_walk() {
        let temp = TempDir::new().unwrap();
        write_bundle(temp.path(), "Top", &[]);
        write_bundle(&temp.path().join("nested/dir"), "Deep", &[]);

        let found = find_bundles(temp.path(), 4);
        assert_eq!(found, vec![temp.path().join("Top.app")]);
    }

    #[test]
    fn test_walk_is_bounded_and_skips_hidden() {
        let temp = TempDir::new().unwrap();
        write_bundle(&temp.path().join("a"), "Shallow", &[]);
        write_bundle(&temp.path().join(".hidden"), "Hidden", &[]);
        write_bundle(&temp.path().join("__MACOSX"), "Fork", &[]);
        write_bundle(&temp.path().join("a/b/c/d/e"), "TooDeep", &[]);

        let found = find_bundles(temp.path(), 4);
        assert_eq!(found, vec![temp.path().join("a/Shallow.app")]);
    }

    #[test]
    fn test_does_not_descend_into_bundles() {
        let temp = TempDir::new().unwrap();
        let outer = write_bundle(&temp.path().join("dir"), "Outer", &[]);
        write_bundle(&outer.join("Contents/Helpers"), "Inner", &[]);
        assert_eq!(find_bundles(temp.path(), 6), vec![outer]);
    }

    #[test]
    fn test_suffix_requires_stem() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("pkg"), b"").unwrap();
        std::fs::write(temp.path().join("Example.pkg"), b"").unwrap();
        assert_eq!(
            find_with_suffix(temp.path(), 1, &["pkg", "mpkg"]),
            vec![temp.path().join("Example.pkg")]
        );
    }

    #[test]
    fn test_helpers_never_block() {
        let temp = TempDir::new().unwrap();
        let main = write_bundle(temp.path(), "Example", &[("SUFeedURL", "https://example.com/feed.xml")]);
        let other = write_bundle(temp.path(), "Example Companion", &[]);
        let helper = write_bundle(temp.path(), "Example Uninstaller", &[]);

        let mut discovery = Discovery::default();
        select_applications(vec![other, helper, main.clone()], &mut discovery);

        assert_eq!(discovery.artifacts, vec![Subject::Bundle(main)]);
        assert_eq!(discovery.blocking_applications, vec!["Example Companion.app"]);
        assert_eq!(discovery.helper_applications, vec!["Example Uninstaller.app"]);
    }

    #[test]
    fn test_installer_only_becomes_primary() {
        let temp = TempDir::new().unwrap();
        let installer = write_bundle(temp.path(), "Example Installer", &[]);

        let mut discovery = Discovery::default();
        select_applications(vec![installer.clone()], &mut discovery);
        assert_eq!(discovery.artifacts, vec![Subject::Bundle(installer)]);
        assert!(discovery.helper_applications.is_empty());
    }

    #[test]
    fn test_tree_size() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("a"), vec![0u8; 10]).unwrap();
        std::fs::create_dir(temp.path().join("d")).unwrap();
        std::fs::write(temp.path().join("d/b"), vec![0u8; 5]).unwrap();
        assert_eq!(tree_size(temp.path()), 15);
    }
}
