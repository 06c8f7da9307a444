//! Sparkle update feed dialect for appsleuth.
//!
//! A Sparkle appcast is an RSS document whose items carry an `<enclosure>`
//! plus version information in the Sparkle namespace, either as enclosure
//! attributes or as item child elements. Unlike the forge adapters this one
//! calls no API: it parses the feed document itself and ranks its items.

use appsleuth_core::fetch::FetchClient;
use appsleuth_core::format::looks_like_feed;
use appsleuth_core::version::natural_cmp;
use appsleuth_core::{Error, Result};
use roxmltree::{Document, Node, ParsingOptions};
use serde::Serialize;
use std::cmp::Ordering;
use std::path::Path;
use tracing::{debug, info};

/// Namespace URI of Sparkle's RSS extensions.
pub const SPARKLE_NAMESPACE: &str = "http://www.andymatuschak.org/xml-namespaces/sparkle";

/// One downloadable release listed in a feed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FeedItem {
    /// Item title.
    pub title: Option<String>,
    /// Enclosure URL.
    pub url: String,
    /// Machine-readable build version (`sparkle:version`).
    pub version: Option<String>,
    /// Human-readable version (`sparkle:shortVersionString`).
    pub short_version: Option<String>,
    /// Minimum OS version (`sparkle:minimumSystemVersion`).
    pub minimum_os: Option<String>,
}

impl FeedItem {
    /// Whether the item carries any version information.
    #[must_use]
    pub fn has_version(&self) -> bool {
        self.version.is_some() || self.short_version.is_some()
    }
}

/// A parsed update feed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Feed {
    /// Channel title.
    pub title: Option<String>,
    /// Items with a usable download URL, in document order.
    pub items: Vec<FeedItem>,
}

impl Feed {
    /// The newest item; see [`compare_items`].
    #[must_use]
    pub fn latest(&self) -> Option<&FeedItem> {
        latest(&self.items)
    }
}

fn is_sparkle(namespace: Option<&str>) -> bool {
    // Some feeds bind the prefix to an https or trailing-slash variant
    namespace.is_some_and(|ns| ns == SPARKLE_NAMESPACE || ns.contains("xml-namespaces/sparkle"))
}

fn sparkle_attribute<'a>(node: Node<'a, '_>, name: &str) -> Option<&'a str> {
    node.attributes()
        .find(|a| a.name() == name && is_sparkle(a.namespace()))
        .map(|a| a.value())
}

fn sparkle_child(item: Node<'_, '_>, name: &str) -> Option<String> {
    item.children()
        .find(|n| n.is_element() && n.tag_name().name() == name && is_sparkle(n.tag_name().namespace()))
        .and_then(|n| n.text())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

fn child_text(node: Node<'_, '_>, name: &str) -> Option<String> {
    node.children()
        .find(|n| n.is_element() && n.has_tag_name(name))
        .and_then(|n| n.text())
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

fn parse_item(item: Node<'_, '_>) -> Option<FeedItem> {
    // Only the item's own enclosure; delta enclosures live under sparkle:deltas
    let enclosure = item
        .children()
        .find(|n| n.is_element() && n.has_tag_name("enclosure"))?;
    let url = enclosure.attribute("url").map(str::trim).filter(|u| !u.is_empty())?;

    let attribute = |name: &str| sparkle_attribute(enclosure, name).map(|v| v.trim().to_string());
    Some(FeedItem {
        title: child_text(item, "title"),
        url: url.to_string(),
        version: attribute("version").or_else(|| sparkle_child(item, "version")),
        short_version: attribute("shortVersionString")
            .or_else(|| sparkle_child(item, "shortVersionString")),
        minimum_os: sparkle_child(item, "minimumSystemVersion")
            .or_else(|| attribute("minimumSystemVersion")),
    })
}

/// Parse an appcast document.
///
/// Items without an enclosure URL are dropped.
///
/// # Errors
///
/// Returns an error when the document is not XML or has no RSS channel.
pub fn parse_feed(xml: &str) -> Result<Feed> {
    let mut options = ParsingOptions::default();
    options.allow_dtd = true;
    let doc = Document::parse_with_options(xml, options)
        .map_err(|e| Error::parse("update feed", e.to_string()))?;

    let channel = doc
        .descendants()
        .find(|n| n.has_tag_name("channel"))
        .ok_or_else(|| Error::parse("update feed", "no RSS channel"))?;

    let items: Vec<FeedItem> = channel
        .children()
        .filter(|n| n.is_element() && n.has_tag_name("item"))
        .filter_map(parse_item)
        .collect();
    debug!(items = items.len(), "Parsed update feed");

    Ok(Feed {
        title: child_text(channel, "title"),
        items,
    })
}

fn cmp_optional(a: Option<&str>, b: Option<&str>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => natural_cmp(a, b),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => Ordering::Equal,
    }
}

/// Order items by build version, then short version, then URL.
///
/// Every key is compared with natural version ordering; a missing key sorts
/// below a present one.
#[must_use]
pub fn compare_items(a: &FeedItem, b: &FeedItem) -> Ordering {
    cmp_optional(a.version.as_deref(), b.version.as_deref())
        .then_with(|| cmp_optional(a.short_version.as_deref(), b.short_version.as_deref()))
        .then_with(|| natural_cmp(&a.url, &b.url))
}

/// The newest of `items`. Earlier items win ties.
#[must_use]
pub fn latest(items: &[FeedItem]) -> Option<&FeedItem> {
    items.iter().reduce(|best, item| {
        if compare_items(item, best) == Ordering::Greater {
            item
        } else {
            best
        }
    })
}

/// Read a feed from a local copy, or fetch it.
///
/// # Errors
///
/// Returns an error when the feed cannot be read, is not a feed, or does
/// not parse.
pub async fn load_feed(
    client: &FetchClient,
    url: &str,
    local: Option<&Path>,
    user_agent: Option<&str>,
) -> Result<Feed> {
    let bytes = match local {
        Some(path) => tokio::fs::read(path).await?,
        None => client.body(url, user_agent).await?,
    };
    if !looks_like_feed(&bytes) {
        return Err(Error::parse("update feed", format!("{url} is not an update feed")));
    }
    let text = String::from_utf8_lossy(&bytes);
    let feed = parse_feed(&text)?;
    info!(%url, items = feed.items.len(), "Loaded update feed");
    Ok(feed)
}
