//! Remote directory listings
//!
//! The crawler only ever needs one thing from the remote server: the ordered
//! child entry names of a directory URL. This module provides:
//! - The `ListingClient` trait the traversal engine is written against
//! - `parse_listing`, which turns an Apache index page into entry names
//! - `HttpListingClient`, the blocking reqwest implementation with retry
//! - URL helpers that keep directory URLs in a single normalized form
//!
//! # Listing format
//!
//! ```text
//! <tr><td><a href="?C=N;O=D">Name</a></td> ...        sort link, rejected
//! <tr><td><a href="/sadc/tarapacific/">Parent Directory</a></td>   rejected
//! <tr><td><a href="CO-0001234/">CO-0001234/</a></td>  directory entry
//! <tr><td><a href="TARA_..._R1.fastq.gz">TARA_...</a></td>  file entry
//! ```

mod http;
mod parse;

pub use http::HttpListingClient;
pub use parse::{parse_listing, IGNORED_NAMES};

use crate::error::FetchResult;

/// Something that can list the children of a remote directory
pub trait ListingClient {
    /// Ordered child entry names at `url`, chrome and ignored names removed
    fn list(&mut self, url: &str) -> FetchResult<Vec<String>>;
}

impl<T: ListingClient + ?Sized> ListingClient for Box<T> {
    fn list(&mut self, url: &str) -> FetchResult<Vec<String>> {
        (**self).list(url)
    }
}

/// Join a directory URL and a child entry name
///
/// Directory URLs always end with '/', so the child is appended as-is.
/// Entries that are directories keep the trailing '/' the listing gave them.
pub fn join_url(dir: &str, name: &str) -> String {
    let name = name.trim_start_matches('/');
    if dir.ends_with('/') {
        format!("{}{}", dir, name)
    } else {
        format!("{}/{}", dir, name)
    }
}

/// True for entries the listing marks as directories (trailing '/')
///
/// Anything else that is not a read file is a plain file and is never
/// descended into.
pub fn is_directory_entry(name: &str) -> bool {
    name.ends_with('/')
}

/// Parent directory URL (with trailing '/'), or None at the host root
pub fn parent_url(url: &str) -> Option<String> {
    let trimmed = url.strip_suffix('/').unwrap_or(url);
    let scheme_end = trimmed.find("://").map(|i| i + 3).unwrap_or(0);
    let idx = trimmed.rfind('/')?;
    if idx < scheme_end {
        return None;
    }
    Some(trimmed[..=idx].to_string())
}
