//! Installer package unpacker.
//!
//! Flat packages are expanded with `pkgutil`. The expansion tree is then
//! searched for package identity metadata, payloads (expanded further to find
//! the applications they install) and nested flat packages, which are
//! expanded in turn up to the configured nesting limit.

use appsleuth_core::command::args;
use appsleuth_core::{Error, Inspection, Result, RunContext};
use async_trait::async_trait;
use std::collections::{BTreeSet, VecDeque};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::{Discovery, Unpacker, WorkingTree, bundle, walk};

/// File names that carry a package payload.
const PAYLOAD_NAMES: &[&str] = &["Payload", "Archive.pax.gz"];

/// Tentative bundle identifier from a `PackageInfo` document.
///
/// An `.app` bundle entry's `id` is preferred over the package identifier.
#[must_use]
pub fn parse_package_info(xml: &str) -> Option<String> {
    let doc = roxmltree::Document::parse(xml).ok()?;
    let root = doc.root_element();
    if !root.has_tag_name("pkg-info") {
        return None;
    }
    root.descendants()
        .filter(|n| n.has_tag_name("bundle"))
        .find(|n| n.attribute("path").is_some_and(|p| p.ends_with(".app")))
        .and_then(|n| n.attribute("id"))
        .or_else(|| root.attribute("identifier"))
        .map(str::to_string)
}

fn named(path: &Path, names: &[&str]) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| names.contains(&n))
}

fn canonical(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

async fn expand(ctx: &RunContext, package: &Path) -> Result<PathBuf> {
    let source = package.to_string_lossy().into_owned();
    let mut last = String::new();

    // --expand-full also unpacks payloads; older systems only know --expand
    for mode in ["--expand-full", "--expand"] {
        let dest = ctx.work_dir("package")?.join("expanded");
        let target = dest.to_string_lossy().into_owned();
        let output = ctx
            .runner()
            .run("pkgutil", &args([mode, source.as_str(), target.as_str()]), None)
            .await
            .map_err(|e| Error::unpack("package", package, e.to_string()))?;
        if output.success() && dest.is_dir() {
            debug!(package = %package.display(), %mode, "Expanded package");
            return Ok(dest);
        }
        last = output.stderr_text().trim().to_string();
    }
    Err(Error::unpack("package", package, last))
}

async fn expand_payload(ctx: &RunContext, payload: &Path) -> Result<PathBuf> {
    if payload.is_dir() {
        return Ok(payload.to_path_buf());
    }
    let dest = ctx.work_dir("payload")?;
    let source = payload.to_string_lossy().into_owned();
    let target = dest.to_string_lossy().into_owned();

    let attempts = [
        ("tar", args(["-xf", source.as_str(), "-C", target.as_str()])),
        ("ditto", args(["-x", source.as_str(), target.as_str()])),
    ];
    let mut last = String::new();
    for (program, arguments) in &attempts {
        match ctx.runner().run(program, arguments, None).await {
            Ok(output) if output.success() => return Ok(dest),
            Ok(output) => last = format!("{program}: {}", output.stderr_text().trim()),
            Err(e) => last = e.to_string(),
        }
    }
    Err(Error::unpack("package", payload, format!("payload: {last}")))
}

/// Expands installer packages and enumerates their payloads.
#[derive(Debug, Clone, Copy, Default)]
pub struct PackageUnpacker;

impl PackageUnpacker {
    async fn payload_apps(
        &self,
        ctx: &RunContext,
        payload: &Path,
        fallback_name: &str,
        discovery: &mut Discovery,
    ) -> Option<(PathBuf, Vec<PathBuf>)> {
        let dir = match expand_payload(ctx, payload).await {
            Ok(dir) => dir,
            Err(e) => {
                discovery.warnings.push(e.to_string());
                return None;
            }
        };

        if bundle::is_bare_contents(&dir) {
            let rewrapped = ctx
                .work_dir("rewrapped")
                .and_then(|parent| bundle::rewrap(&dir, &parent, fallback_name));
            return match rewrapped {
                Ok(app) => Some((dir, vec![app])),
                Err(e) => {
                    discovery.warnings.push(e.to_string());
                    None
                }
            };
        }
        let apps = walk::find_bundles(&dir, ctx.config().max_walk_depth);
        Some((dir, apps))
    }
}

#[async_trait]
impl Unpacker for PackageUnpacker {
    fn kind(&self) -> Inspection {
        Inspection::Package
    }

    async fn open(&self, ctx: &RunContext, path: &Path) -> Result<WorkingTree> {
        // Bundle-style packages are already directories
        if path.is_dir() {
            return Ok(WorkingTree::directory(path));
        }
        let dest = expand(ctx, path).await?;
        info!(package = %path.display(), "Expanded installer package");
        Ok(WorkingTree::directory(dest))
    }

    async fn find_artifacts(&self, ctx: &RunContext, tree: &WorkingTree) -> Result<Discovery> {
        let depth = ctx.config().max_walk_depth;
        let max_nested = ctx.config().max_nested_packages;
        let mut discovery = Discovery::default();
        let mut apps = Vec::new();
        let mut seen_packages = BTreeSet::new();
        let mut queue = VecDeque::from([(tree.root().to_path_buf(), 0usize)]);

        while let Some((root, level)) = queue.pop_front() {
            let fallback_name = stem(&root);

            if discovery.bundle_id_hint.is_none() {
                discovery.bundle_id_hint =
                    walk::find_matching(&root, depth, |p| named(p, &["PackageInfo"]))
                        .iter()
                        .filter_map(|p| std::fs::read_to_string(p).ok())
                        .find_map(|xml| parse_package_info(&xml));
            }

            // Payloads expanded in place are already covered by the walk of `root`
            let mut search_roots = vec![root.clone()];
            for payload in walk::find_matching(&root, depth, |p| named(p, PAYLOAD_NAMES)) {
                let name = payload
                    .parent()
                    .map_or_else(|| fallback_name.clone(), stem);
                if let Some((dir, found)) = self.payload_apps(ctx, &payload, &name, &mut discovery).await {
                    apps.extend(found);
                    if !dir.starts_with(&root) {
                        search_roots.push(dir);
                    }
                }
            }

            for search_root in &search_roots {
                let nested = walk::find_matching(search_root, depth, |p| {
                    p.is_file() && walk::has_suffix(p, &["pkg", "mpkg"])
                });
                for package in nested {
                    if !seen_packages.insert(canonical(&package)) {
                        continue;
                    }
                    let name = package
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    if level >= max_nested {
                        discovery
                            .warnings
                            .push(format!("Skipping {name}: packages nested deeper than {max_nested} levels"));
                        continue;
                    }
                    discovery
                        .warnings
                        .push(format!("Installer package contains a nested package: {name}"));
                    match expand(ctx, &package).await {
                        Ok(dest) => queue.push_back((dest, level + 1)),
                        Err(e) => discovery.warnings.push(e.to_string()),
                    }
                }
            }
        }

        let mut seen_apps = BTreeSet::new();
        apps.retain(|app| seen_apps.insert(canonical(app)));
        walk::select_applications(apps, &mut discovery);
        if discovery.artifacts.is_empty() {
            discovery
                .warnings
                .push("No application found in the installer package payload".to_string());
        }
        Ok(discovery)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use appsleuth_core::command::{CommandOutput, CommandRunner};
    use appsleuth_core::{RunConfig, Subject};
    use std::sync::Arc;
    use tempfile::TempDir;

    const PACKAGE_INFO: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<pkg-info format-version="2" identifier="com.example.pkg.app" version="1.0" install-location="/Applications">
    <payload numberOfFiles="10" installKBytes="100"/>
    <bundle path="./Example.app" id="com.example.app" CFBundleShortVersionString="1.0"/>
</pkg-info>"#;

    /// Stands in for pkgutil by copying the tree prepared for each package
    /// file name into place.
    struct FakePkgutil {
        templates: Vec<(String, PathBuf)>,
    }

    fn copy_tree(from: &Path, to: &Path) {
        for entry in walkdir::WalkDir::new(from) {
            let entry = entry.unwrap();
            let target = to.join(entry.path().strip_prefix(from).unwrap());
            if entry.file_type().is_dir() {
                std::fs::create_dir_all(&target).unwrap();
            } else {
                std::fs::copy(entry.path(), &target).unwrap();
            }
        }
    }

    #[async_trait]
    impl CommandRunner for FakePkgutil {
        async fn run(&self, program: &str, args: &[String], _stdin: Option<&[u8]>) -> Result<CommandOutput> {
            if program == "pkgutil" && args[0] == "--expand-full" {
                let template = Path::new(&args[1])
                    .file_name()
                    .and_then(|name| self.templates.iter().find(|(n, _)| name == n.as_str()))
                    .map(|(_, template)| template)
                    .filter(|template| template.is_dir());
                if let Some(template) = template {
                    copy_tree(template, Path::new(&args[2]));
                    return Ok(CommandOutput {
                        code: Some(0),
                        ..CommandOutput::default()
                    });
                }
            }
            Ok(CommandOutput {
                code: Some(1),
                ..CommandOutput::default()
            })
        }
    }

    fn context(temp: &Path, templates: &[(&str, PathBuf)]) -> RunContext {
        context_with(RunConfig::new(), temp, templates)
    }

    fn context_with(config: RunConfig, temp: &Path, templates: &[(&str, PathBuf)]) -> RunContext {
        let templates = templates
            .iter()
            .map(|(name, path)| ((*name).to_string(), path.clone()))
            .collect();
        RunContext::with_parts(
            config.with_scratch_root(temp.join("scratch")),
            Arc::new(
                appsleuth_core::fetch::ReqwestTransport::new("test", std::time::Duration::from_secs(1))
                    .unwrap(),
            ),
            Arc::new(FakePkgutil { templates }),
        )
        .unwrap()
    }

    #[test]
    fn test_parse_package_info_prefers_app_bundle() {
        assert_eq!(parse_package_info(PACKAGE_INFO).as_deref(), Some("com.example.app"));
        let without_bundle = r#"<pkg-info identifier="com.example.pkg"/>"#;
        assert_eq!(parse_package_info(without_bundle).as_deref(), Some("com.example.pkg"));
        assert_eq!(parse_package_info("<installer-gui-script/>"), None);
        assert_eq!(parse_package_info("not xml"), None);
    }

    #[tokio::test]
    async fn test_expanded_payload_with_app() {
        let temp = TempDir::new().unwrap();
        let template = temp.path().join("template");
        let component = template.join("Example.pkg");
        std::fs::create_dir_all(&component).unwrap();
        std::fs::write(component.join("PackageInfo"), PACKAGE_INFO).unwrap();
        crate::bundle::tests::write_bundle(
            &component.join("Payload/Applications"),
            "Example",
            &[("CFBundleName", "Example")],
        );

        let ctx = context(temp.path(), &[("Example.pkg", template)]);
        let package = temp.path().join("Example.pkg");
        std::fs::write(&package, b"xar!").unwrap();

        let tree = PackageUnpacker.open(&ctx, &package).await.unwrap();
        let discovery = PackageUnpacker.find_artifacts(&ctx, &tree).await.unwrap();

        assert_eq!(discovery.bundle_id_hint.as_deref(), Some("com.example.app"));
        assert_eq!(discovery.artifacts.len(), 1);
        let Subject::Bundle(app) = &discovery.artifacts[0] else {
            panic!("expected a bundle");
        };
        assert!(app.ends_with("Payload/Applications/Example.app"));
    }

    #[tokio::test]
    async fn test_bare_payload_is_rewrapped() {
        let temp = TempDir::new().unwrap();
        let template = temp.path().join("template");
        let built = crate::bundle::tests::write_bundle(temp.path(), "Tool", &[("CFBundleName", "Tool")]);
        let payload = template.join("Tool.pkg/Payload");
        std::fs::create_dir_all(&payload).unwrap();
        std::fs::rename(built.join("Contents"), payload.join("Contents")).unwrap();

        let ctx = context(temp.path(), &[("Tool.pkg", template)]);
        let package = temp.path().join("Tool.pkg");
        std::fs::write(&package, b"xar!").unwrap();

        let tree = PackageUnpacker.open(&ctx, &package).await.unwrap();
        let discovery = PackageUnpacker.find_artifacts(&ctx, &tree).await.unwrap();
        let Subject::Bundle(app) = &discovery.artifacts[0] else {
            panic!("expected a bundle");
        };
        assert!(app.ends_with("Tool.app"));
        assert!(app.join("Contents/Info.plist").is_file());
    }

    #[tokio::test]
    async fn test_expand_failure_is_unpack_error() {
        let temp = TempDir::new().unwrap();
        let ctx = context(temp.path(), &[("Broken.pkg", temp.path().join("missing"))]);
        let package = temp.path().join("Broken.pkg");
        std::fs::write(&package, b"garbage").unwrap();

        // FakePkgutil copies nothing from a missing template, leaving no tree
        let result = PackageUnpacker.open(&ctx, &package).await;
        assert!(matches!(result, Err(Error::Unpack { .. })));
    }

    /// `Outer.pkg` expands to a component whose payload holds `Inner.pkg`,
    /// which in turn installs `Example.app`.
    fn nested_templates(temp: &Path) -> Vec<(&'static str, PathBuf)> {
        let outer = temp.join("outer");
        let payload = outer.join("Comp.pkg/Payload");
        std::fs::create_dir_all(&payload).unwrap();
        std::fs::write(payload.join("Inner.pkg"), b"xar!").unwrap();

        let inner = temp.join("inner");
        std::fs::create_dir_all(inner.join("App.pkg")).unwrap();
        std::fs::write(inner.join("App.pkg/PackageInfo"), PACKAGE_INFO).unwrap();
        crate::bundle::tests::write_bundle(
            &inner.join("App.pkg/Payload"),
            "Example",
            &[("CFBundleName", "Example")],
        );
        vec![("Outer.pkg", outer), ("Inner.pkg", inner)]
    }

    #[tokio::test]
    async fn test_nested_package_is_expanded_once() {
        let temp = TempDir::new().unwrap();
        let ctx = context(temp.path(), &nested_templates(temp.path()));
        let package = temp.path().join("Outer.pkg");
        std::fs::write(&package, b"xar!").unwrap();

        let tree = PackageUnpacker.open(&ctx, &package).await.unwrap();
        let discovery = PackageUnpacker.find_artifacts(&ctx, &tree).await.unwrap();

        assert_eq!(discovery.artifacts.len(), 1);
        let Subject::Bundle(app) = &discovery.artifacts[0] else {
            panic!("expected a bundle");
        };
        assert!(app.ends_with("Payload/Example.app"));
        assert!(discovery.blocking_applications.is_empty());
        assert_eq!(discovery.bundle_id_hint.as_deref(), Some("com.example.app"));
        assert_eq!(
            discovery.warnings,
            vec!["Installer package contains a nested package: Inner.pkg".to_string()]
        );
    }

    #[tokio::test]
    async fn test_nesting_limit_skips_deeper_packages() {
        let temp = TempDir::new().unwrap();
        let ctx = context_with(
            RunConfig::new().with_max_nested_packages(0),
            temp.path(),
            &nested_templates(temp.path()),
        );
        let package = temp.path().join("Outer.pkg");
        std::fs::write(&package, b"xar!").unwrap();

        let tree = PackageUnpacker.open(&ctx, &package).await.unwrap();
        let discovery = PackageUnpacker.find_artifacts(&ctx, &tree).await.unwrap();

        assert!(discovery.artifacts.is_empty());
        assert!(
            discovery
                .warnings
                .contains(&"Skipping Inner.pkg: packages nested deeper than 0 levels".to_string())
        );
        assert!(
            discovery
                .warnings
                .iter()
                .any(|w| w == "No application found in the installer package payload")
        );
    }
}
