//! Choosing the primary application among several candidates.

use std::path::PathBuf;

/// One application bundle discovered inside an unpacked artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationCandidate {
    /// Path to the bundle.
    pub path: PathBuf,
    /// Total on-disk size in bytes.
    pub size: u64,
    /// Whether the bundle sits directly in an `Applications` directory.
    pub in_applications_dir: bool,
    /// Whether the bundle declares an update feed.
    pub has_feed: bool,
}

impl ApplicationCandidate {
    /// Bundle file name, e.g. `Example.app`.
    #[must_use]
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

fn exactly_one(candidates: &[ApplicationCandidate], pred: impl Fn(&ApplicationCandidate) -> bool) -> Option<usize> {
    let mut matches = candidates.iter().enumerate().filter(|(_, c)| pred(c));
    let (index, _) = matches.next()?;
    matches.next().is_none().then_some(index)
}

/// Index of the most likely primary application.
///
/// Rules, first match wins:
/// 1. exactly one candidate declares an update feed;
/// 2. exactly one candidate sits in an `Applications` directory;
/// 3. the largest candidate, earliest on ties.
#[must_use]
pub fn most_likely(candidates: &[ApplicationCandidate]) -> Option<usize> {
    if candidates.len() <= 1 {
        return candidates.first().map(|_| 0);
    }
    if let Some(index) = exactly_one(candidates, |c| c.has_feed) {
        return Some(index);
    }
    if let Some(index) = exactly_one(candidates, |c| c.in_applications_dir) {
        return Some(index);
    }
    candidates
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, u64)>, (i, c)| match best {
            Some((_, size)) if size >= c.size => best,
            _ => Some((i, c.size)),
        })
        .map(|(i, _)| i)
}
