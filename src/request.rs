//! Batch request specifiers and URL deduplication.

use std::collections::HashMap;

use crate::checksum::Checksum;

/// One entry of a submitted batch: a URL, optionally with the digest the
/// downloaded content must match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestSpec {
    /// Fetch the URL without verification.
    Url(String),
    /// Fetch the URL and verify it against a checksum string
    /// (see [`Checksum::parse`]).
    WithChecksum(String, String),
}

impl RequestSpec {
    /// The URL this entry refers to.
    #[must_use]
    pub fn url(&self) -> &str {
        match self {
            Self::Url(url) | Self::WithChecksum(url, _) => url,
        }
    }
}

impl From<&str> for RequestSpec {
    fn from(url: &str) -> Self {
        Self::Url(url.to_string())
    }
}

impl From<String> for RequestSpec {
    fn from(url: String) -> Self {
        Self::Url(url)
    }
}

impl From<(&str, &str)> for RequestSpec {
    fn from((url, checksum): (&str, &str)) -> Self {
        Self::WithChecksum(url.to_string(), checksum.to_string())
    }
}

impl From<(String, String)> for RequestSpec {
    fn from((url, checksum): (String, String)) -> Self {
        Self::WithChecksum(url, checksum)
    }
}

/// A unique, checksum-aware download request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// URL exactly as submitted; also the key of the result map.
    pub url: String,
    /// Digest to verify the content against, if any.
    pub checksum: Option<Checksum>,
}

/// Outcome of normalizing a batch.
#[derive(Debug, Default)]
pub struct Normalized {
    /// One request per distinct URL, in order of first appearance.
    pub requests: Vec<Request>,
    /// URLs submitted with two different checksums. No request is issued for
    /// these.
    pub conflicts: Vec<String>,
}

impl Normalized {
    /// Number of distinct URLs in the batch, conflicts included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.requests.len() + self.conflicts.len()
    }

    /// Returns true if the batch named no URL at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

enum Slot {
    Pending(Request),
    Conflict(String),
}

/// Deduplicates a batch by URL.
///
/// Repeats of a URL collapse into one request. If only some repeats carry a
/// checksum, the checksum is kept. Two different checksums for the same URL
/// make that URL a conflict.
pub fn normalize<I, S>(specs: I) -> Normalized
where
    I: IntoIterator<Item = S>,
    S: Into<RequestSpec>,
{
    let mut order: Vec<String> = Vec::new();
    let mut slots: HashMap<String, Slot> = HashMap::new();

    for spec in specs {
        let (url, checksum) = match spec.into() {
            RequestSpec::Url(url) => (url, None),
            RequestSpec::WithChecksum(url, value) => (url, Some(Checksum::parse(&value))),
        };

        let Some(slot) = slots.get_mut(&url) else {
            order.push(url.clone());
            slots.insert(url.clone(), Slot::Pending(Request { url, checksum }));
            continue;
        };

        let (Slot::Pending(existing), Some(new)) = (&mut *slot, checksum) else {
            continue;
        };
        let conflicting = existing.checksum.as_ref().is_some_and(|old| *old != new);
        if conflicting {
            log::warn!("Conflicting checksums for {url}, rejecting it (last seen {new})");
            *slot = Slot::Conflict(url);
        } else if existing.checksum.is_none() {
            existing.checksum = Some(new);
        }
    }

    let mut normalized = Normalized::default();
    for url in order {
        match slots.remove(&url) {
            Some(Slot::Pending(request)) => normalized.requests.push(request),
            Some(Slot::Conflict(url)) => normalized.conflicts.push(url),
            None => {}
        }
    }
    normalized
}
