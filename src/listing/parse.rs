//! Apache index page parsing

use crate::error::{FetchError, FetchResult};
use regex::Regex;
use std::sync::LazyLock;

/// Display names that are listing chrome or folders we never descend into
pub const IGNORED_NAMES: &[&str] = &[
    "Name",
    "Last modified",
    "Size",
    "Description",
    "Parent Directory",
    "NEGATIVE_CONTROLS/",
    "NEGATIVE_CONTROL/",
];

/// Matches one anchor: capture 1 is the href, capture 2 the inner HTML
static ANCHOR_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<a\s[^>]*?href\s*=\s*["']([^"']*)["'][^>]*>(.*?)</a\s*>"#)
        .expect("Invalid anchor regex")
});

static TAG_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("Invalid tag regex"));

/// Extract child entry names from an index page
///
/// Anchors that cannot point at a child (sort links, absolute or parent
/// links, fragments, other hosts) are dropped structurally, then the
/// `IGNORED_NAMES` list is applied to the display text. A page with no
/// anchors at all is not a listing.
pub fn parse_listing(url: &str, html: &str) -> FetchResult<Vec<String>> {
    let mut saw_anchor = false;
    let mut names = Vec::new();

    for caps in ANCHOR_REGEX.captures_iter(html) {
        saw_anchor = true;
        let href = caps.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
        if !is_child_href(href) {
            continue;
        }

        let inner = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
        let name = decode_entities(TAG_REGEX.replace_all(inner, "").trim());
        if name.is_empty() || IGNORED_NAMES.contains(&name.as_str()) {
            continue;
        }
        names.push(name);
    }

    if !saw_anchor {
        return Err(FetchError::MalformedListing {
            url: url.to_string(),
            reason: "page contains no anchors".into(),
        });
    }

    Ok(names)
}

fn is_child_href(href: &str) -> bool {
    !(href.is_empty()
        || href.starts_with('?')
        || href.starts_with('/')
        || href.starts_with('#')
        || href.starts_with("../")
        || href == ".."
        || href.contains("://")
        || href.starts_with("mailto:"))
}

fn decode_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}
