//! Download inspection.
//!
//! Downloads are probed, fetched into the scratch area, deduplicated by
//! content digest and classified. A payload with no recognizable name or
//! content type is offered to each unpacker in turn; the first one that can
//! open it keeps its guard.

use std::path::{Path, PathBuf};

use appsleuth_core::fetch::{https_variant, sha256_file};
use appsleuth_core::format::{Format, FormatKind, SNIFF_LEN, classify, kind_for_suffix, sniff_suffix};
use appsleuth_core::{Error, FactStore, Inspection, Result, Subject};
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

use super::{Resolver, url_file_name};

/// Order in which unrecognized payloads are offered to the unpackers.
const GUESS_ORDER: [FormatKind; 3] = [FormatKind::DiskImage, FormatKind::Archive, FormatKind::Package];

fn guard_for(kind: FormatKind) -> Inspection {
    match kind {
        FormatKind::DiskImage => Inspection::DiskImage,
        FormatKind::Archive => Inspection::Archive,
        FormatKind::Package => Inspection::Package,
    }
}

fn subject_for(kind: FormatKind, path: PathBuf) -> Subject {
    match kind {
        FormatKind::DiskImage => Subject::DiskImage(path),
        FormatKind::Archive => Subject::Archive(path),
        FormatKind::Package => Subject::Package(path),
    }
}

/// The suffix to record for a payload that opened as `kind`.
fn guessed_suffix(kind: FormatKind, sample: &[u8]) -> &'static str {
    if let Some((sniffed, suffix)) = sniff_suffix(sample) {
        if sniffed == kind {
            return suffix;
        }
    }
    match kind {
        FormatKind::DiskImage => "dmg",
        FormatKind::Archive => "zip",
        FormatKind::Package => "pkg",
    }
}

/// A file name safe to create inside the downloads directory.
fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c == '/' || c == '\\' || c.is_control() { '_' } else { c })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').trim();
    if cleaned.is_empty() {
        "download".to_string()
    } else {
        cleaned.to_string()
    }
}

/// A path under `dir` that no earlier download in this run has taken.
fn unused_path(dir: &Path, file_name: &str) -> PathBuf {
    let mut candidate = dir.join(file_name);
    let mut attempt = 1;
    while candidate.exists() {
        attempt += 1;
        candidate = dir.join(attempt.to_string()).join(file_name);
    }
    candidate
}

async fn read_sample(path: &Path) -> Result<Vec<u8>> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut sample = vec![0; SNIFF_LEN];
    let read = file.read(&mut sample).await?;
    sample.truncate(read);
    Ok(sample)
}

impl Resolver {
    pub(super) async fn inspect_download(&self, facts: &mut FactStore, url: &str) -> Result<()> {
        let client = self.ctx.client();
        let (fetch_url, final_url, user_agent, content_type, offered_name) =
            match client.headers(url).await {
                Ok(probe) => {
                    if !probe.is_ok() {
                        debug!(%url, status = probe.status, "Header probe rejected; fetching anyway");
                    }
                    if https_variant(url).is_some() && !probe.upgraded {
                        facts.warn(format!("{url} is only available over plain HTTP"));
                    }
                    let content_type = probe.content_type().map(str::to_string);
                    let offered_name = probe.disposition_filename();
                    (probe.url, probe.final_url, probe.user_agent, content_type, offered_name)
                }
                Err(e) => {
                    debug!(%url, error = %e, "Header probe failed; fetching anyway");
                    (url.to_string(), url.to_string(), None, None, None)
                }
            };

        let file_name = sanitize_file_name(
            offered_name
                .as_deref()
                .or_else(|| url_file_name(&final_url))
                .or_else(|| url_file_name(&fetch_url))
                .unwrap_or("download"),
        );
        let target = unused_path(&self.ctx.downloads_dir(), &file_name);

        let path = match client
            .body_to_file(&fetch_url, user_agent.as_deref(), &target)
            .await
        {
            Ok(path) => path,
            // Once the app itself has been read, a failed extra download only
            // costs detail
            Err(e) if facts.has_inspected(Inspection::Bundle) => {
                facts.warn(format!("Could not download {fetch_url}: {e}"));
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        info!(url = %fetch_url, path = %path.display(), "Downloaded");

        let digest = sha256_file(&path).await?;
        if !facts.record_download(digest) {
            debug!(url = %fetch_url, "Same bytes already inspected");
            return Ok(());
        }

        let sample = read_sample(&path).await?;
        let format = classify(&file_name, content_type.as_deref(), Some(&sample));
        debug!(url = %fetch_url, ?format, "Classified download");

        match format {
            Format::Feed => {
                return self
                    .dispatch(
                        facts,
                        Subject::Feed {
                            url: fetch_url,
                            local: Some(path),
                        },
                    )
                    .await;
            }
            Format::ErrorPage => {
                facts.warn(format!("{fetch_url} returned a web page instead of a download"));
                return Ok(());
            }
            Format::Binary => {
                facts.warn(format!(
                    "{fetch_url} is a bare executable, not an application bundle"
                ));
                return Ok(());
            }
            Format::Known(..) | Format::Unknown => {}
        }

        facts.download_url.set_if_absent(fetch_url.clone());
        if let Some(agent) = user_agent {
            facts.user_agent.set_if_absent(agent);
        }
        facts.download_filename.set_if_absent(file_name.clone());

        let tried = match format {
            Format::Known(kind, suffix) => {
                facts.download_format.set_if_absent(suffix.to_string());
                let path = with_suffix(&path, &file_name, suffix).await?;
                if self.open_as(facts, kind, path).await? {
                    return Ok(());
                }
                info!(url = %fetch_url, %suffix, "Download did not open as its declared format");
                Some(kind)
            }
            _ => None,
        };

        for kind in GUESS_ORDER {
            if Some(kind) == tried || facts.has_inspected(guard_for(kind)) {
                continue;
            }
            if self.open_as(facts, kind, path.clone()).await? {
                facts
                    .download_format
                    .set_if_absent(guessed_suffix(kind, &sample).to_string());
                return Ok(());
            }
        }

        if facts.has_inspected(Inspection::Bundle) {
            facts.warn(format!("Could not identify the format of {fetch_url}"));
            Ok(())
        } else {
            Err(Error::unsupported_format(fetch_url))
        }
    }

    /// Dispatch `path` as `kind`; true when its guard stays set.
    async fn open_as(&self, facts: &mut FactStore, kind: FormatKind, path: PathBuf) -> Result<bool> {
        self.dispatch(facts, subject_for(kind, path)).await?;
        Ok(facts.has_inspected(guard_for(kind)))
    }
}

/// Rename a download whose name lacks its format suffix, so the system
/// tools recognize it.
async fn with_suffix(path: &Path, file_name: &str, suffix: &str) -> Result<PathBuf> {
    if kind_for_suffix(file_name).is_some() {
        return Ok(path.to_path_buf());
    }
    let renamed = path.with_file_name(format!("{file_name}.{suffix}"));
    tokio::fs::rename(path, &renamed).await?;
    Ok(renamed)
}
