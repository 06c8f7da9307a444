//! Archive unpacker.
//!
//! Each extension family has a fixed list of extraction strategies tried in
//! order: the in-process decoders first, then the system tools. The first
//! strategy that succeeds wins; a failed attempt leaves an empty destination
//! for the next one.

use appsleuth_core::command::args;
use appsleuth_core::format::{CATALOGUE, FormatKind, kind_for_suffix};
use appsleuth_core::{Error, Inspection, Result, RunContext, Subject};
use async_trait::async_trait;
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::{debug, info};

use crate::{Discovery, Unpacker, WorkingTree, walk};

/// One way of extracting an archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// `zip` crate.
    NativeZip,
    /// `flate2` + `tar` crates.
    NativeTarGz,
    /// `tar` crate.
    NativeTar,
    /// `ditto -x -k`, macOS's own zip extractor.
    Ditto,
    /// `unzip -qq`.
    Unzip,
    /// `tar -xf`, which auto-detects gzip, bzip2 and xz.
    SystemTar,
    /// `7z x`.
    SevenZip,
}

/// Extraction strategies for an archive suffix, in priority order.
#[must_use]
pub fn strategies(suffix: Option<&str>) -> &'static [Strategy] {
    use Strategy::{Ditto, NativeTar, NativeTarGz, NativeZip, SevenZip, SystemTar, Unzip};
    match suffix {
        Some("zip") => &[NativeZip, Ditto, Unzip],
        Some("tar.gz" | "tgz") => &[NativeTarGz, SystemTar],
        Some("tar") => &[NativeTar, SystemTar],
        Some("tar.bz2" | "tbz" | "tbz2" | "tar.xz" | "txz") => &[SystemTar],
        Some("7z") => &[SevenZip],
        _ => &[NativeZip, NativeTarGz, NativeTar, SystemTar],
    }
}

fn extract_native(strategy: Strategy, path: &Path, dest: &Path) -> Result<()> {
    let fail = |e: &dyn std::fmt::Display| Error::unpack("archive", path, e.to_string());
    let file = File::open(path)?;
    match strategy {
        Strategy::NativeZip => {
            let mut archive = zip::ZipArchive::new(BufReader::new(file)).map_err(|e| fail(&e))?;
            archive.extract(dest).map_err(|e| fail(&e))
        }
        Strategy::NativeTarGz => tar::Archive::new(GzDecoder::new(BufReader::new(file)))
            .unpack(dest)
            .map_err(|e| fail(&e)),
        Strategy::NativeTar => tar::Archive::new(BufReader::new(file))
            .unpack(dest)
            .map_err(|e| fail(&e)),
        _ => Err(fail(&"not an in-process strategy")),
    }
}

async fn extract(ctx: &RunContext, strategy: Strategy, path: &Path, dest: &Path) -> Result<()> {
    let source = path.to_string_lossy();
    let target = dest.to_string_lossy();
    let (program, arguments) = match strategy {
        Strategy::NativeZip | Strategy::NativeTarGz | Strategy::NativeTar => {
            return extract_native(strategy, path, dest);
        }
        Strategy::Ditto => ("ditto", args(["-x", "-k", &*source, &*target])),
        Strategy::Unzip => ("unzip", args(["-qq", "-o", &*source, "-d", &*target])),
        Strategy::SystemTar => ("tar", args(["-xf", &*source, "-C", &*target])),
        Strategy::SevenZip => ("7z", args(["x", "-y", format!("-o{target}").as_str(), &*source])),
    };

    let output = ctx
        .runner()
        .run(program, &arguments, None)
        .await
        .map_err(|e| Error::unpack("archive", path, e.to_string()))?;
    if output.success() {
        Ok(())
    } else {
        Err(Error::unpack("archive", path, format!("{program}: {}", output.stderr_text().trim())))
    }
}

fn reset_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        std::fs::remove_dir_all(dir)?;
    }
    std::fs::create_dir_all(dir)?;
    Ok(())
}

fn is_empty_dir(dir: &Path) -> bool {
    std::fs::read_dir(dir).map_or(true, |mut entries| entries.next().is_none())
}

/// Extracts archives into the scratch area.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArchiveUnpacker;

#[async_trait]
impl Unpacker for ArchiveUnpacker {
    fn kind(&self) -> Inspection {
        Inspection::Archive
    }

    async fn open(&self, ctx: &RunContext, path: &Path) -> Result<WorkingTree> {
        let suffix = match kind_for_suffix(&path.to_string_lossy()) {
            Some((FormatKind::Archive, suffix)) => Some(suffix),
            _ => None,
        };
        let dest = ctx.work_dir("archive")?;
        let mut last_error = None;

        for strategy in strategies(suffix) {
            debug!(path = %path.display(), ?strategy, "Trying archive strategy");
            match extract(ctx, *strategy, path, &dest).await {
                Ok(()) if !is_empty_dir(&dest) => {
                    info!(path = %path.display(), ?strategy, "Extracted archive");
                    return Ok(WorkingTree::directory(dest));
                }
                Ok(()) => last_error = Some(Error::unpack("archive", path, "archive is empty")),
                Err(e) => last_error = Some(e),
            }
            reset_dir(&dest)?;
        }

        Err(last_error.unwrap_or_else(|| Error::unpack("archive", path, "no extraction strategy")))
    }

    async fn find_artifacts(&self, ctx: &RunContext, tree: &WorkingTree) -> Result<Discovery> {
        let depth = ctx.config().max_walk_depth;
        let mut discovery = Discovery::default();

        let apps = walk::find_bundles(tree.root(), depth);
        if !apps.is_empty() {
            walk::select_applications(apps, &mut discovery);
            return Ok(discovery);
        }

        // No app at any depth; hand nested installers and images back to the
        // dispatcher instead.
        let nested: Vec<&str> = CATALOGUE
            .iter()
            .filter(|(_, kind)| *kind != FormatKind::Archive)
            .map(|(suffix, _)| *suffix)
            .collect();
        for path in walk::find_with_suffix(tree.root(), depth, &nested) {
            match kind_for_suffix(&path.to_string_lossy()) {
                Some((FormatKind::Package, _)) => discovery.artifacts.push(Subject::Package(path)),
                Some((FormatKind::DiskImage, _)) => discovery.artifacts.push(Subject::DiskImage(path)),
                _ => {}
            }
        }
        if discovery.artifacts.is_empty() {
            discovery
                .warnings
                .push("No application or installer found in the archive".to_string());
        }
        Ok(discovery)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use appsleuth_core::RunConfig;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    fn context(root: &Path) -> RunContext {
        RunContext::new(RunConfig::new().with_scratch_root(root)).unwrap()
    }

    const PLIST: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0"><dict><key>CFBundleName</key><string>Example</string></dict></plist>"#;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let mut writer = zip::ZipWriter::new(File::create(path).unwrap());
        for (name, data) in entries {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn test_strategy_order() {
        assert_eq!(
            strategies(Some("zip")),
            &[Strategy::NativeZip, Strategy::Ditto, Strategy::Unzip]
        );
        assert_eq!(strategies(Some("tbz")), &[Strategy::SystemTar]);
        assert_eq!(strategies(None)[0], Strategy::NativeZip);
    }

    #[tokio::test]
    async fn test_zip_with_app() {
        let temp = TempDir::new().unwrap();
        let ctx = context(temp.path());
        let zip_path = temp.path().join("Example.zip");
        write_zip(
            &zip_path,
            &[
                ("Example.app/Contents/Info.plist", PLIST.as_bytes()),
                ("Example.app/Contents/MacOS/Example", b"\xcf\xfa\xed\xfe"),
            ],
        );

        let unpacker = ArchiveUnpacker;
        let tree = unpacker.open(&ctx, &zip_path).await.unwrap();
        let discovery = unpacker.find_artifacts(&ctx, &tree).await.unwrap();

        assert_eq!(
            discovery.artifacts,
            vec![Subject::Bundle(tree.root().join("Example.app"))]
        );
        tree.release(&ctx).await;
    }

    #[tokio::test]
    async fn test_tar_gz_with_nested_package() {
        let temp = TempDir::new().unwrap();
        let ctx = context(temp.path());
        let tgz = temp.path().join("bundle.tar.gz");
        {
            let encoder =
                flate2::write::GzEncoder::new(File::create(&tgz).unwrap(), flate2::Compression::fast());
            let mut builder = tar::Builder::new(encoder);
            let data = b"xar!";
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, "dist/Example.pkg", &data[..])
                .unwrap();
            builder.into_inner().unwrap().finish().unwrap();
        }

        let unpacker = ArchiveUnpacker;
        let tree = unpacker.open(&ctx, &tgz).await.unwrap();
        let discovery = unpacker.find_artifacts(&ctx, &tree).await.unwrap();
        assert_eq!(
            discovery.artifacts,
            vec![Subject::Package(tree.root().join("dist/Example.pkg"))]
        );
    }

    #[tokio::test]
    async fn test_garbage_is_an_unpack_error() {
        let temp = TempDir::new().unwrap();
        let ctx = context(temp.path());
        let bogus = temp.path().join("bogus.zip");
        std::fs::write(&bogus, b"this is not an archive").unwrap();

        let result = ArchiveUnpacker.open(&ctx, &bogus).await;
        assert!(matches!(result, Err(Error::Unpack { .. })));
    }

    #[tokio::test]
    async fn test_empty_archive_warns() {
        let temp = TempDir::new().unwrap();
        let ctx = context(temp.path());
        let zip_path = temp.path().join("docs.zip");
        write_zip(&zip_path, &[("README.txt", b"hello")]);

        let tree = ArchiveUnpacker.open(&ctx, &zip_path).await.unwrap();
        let discovery = ArchiveUnpacker.find_artifacts(&ctx, &tree).await.unwrap();
        assert!(discovery.artifacts.is_empty());
        assert_eq!(discovery.warnings.len(), 1);
    }
}
