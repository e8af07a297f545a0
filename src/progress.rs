//! Transfer progress snapshots and their shared aggregation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Progress of one URL at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSnapshot {
    /// Total size announced by the server (`Content-Length`), if any.
    pub size: Option<u64>,
    /// Bytes received so far.
    pub current: u64,
}

impl ProgressSnapshot {
    /// Size with `-1` standing for "unknown".
    #[must_use]
    pub fn size_or_unknown(&self) -> i64 {
        self.size
            .and_then(|size| i64::try_from(size).ok())
            .unwrap_or(-1)
    }
}

/// Latest snapshot of every URL that reported progress.
pub type ProgressMap = HashMap<String, ProgressSnapshot>;

/// Receives a full copy of the progress map after every update.
pub type ProgressCallback = Arc<dyn Fn(ProgressMap) + Send + Sync>;

/// Shared, synchronized progress state of one batch.
///
/// Workers call [`report`](Self::report); each call updates the map and then
/// hands a copy of the whole map to the callback while still holding the lock,
/// so callers never observe interleaved partial updates.
pub struct ProgressAggregator {
    map: Mutex<ProgressMap>,
    callback: Option<ProgressCallback>,
}

impl ProgressAggregator {
    /// Creates an empty aggregator.
    #[must_use]
    pub fn new(callback: Option<ProgressCallback>) -> Self {
        Self {
            map: Mutex::new(HashMap::new()),
            callback,
        }
    }

    /// Records a snapshot for `url` and notifies the callback.
    ///
    /// `current` never goes backwards for a URL: a lower value than the one
    /// already recorded is raised to it.
    pub fn report(&self, url: &str, snapshot: ProgressSnapshot) {
        let mut map = self.map.lock().unwrap_or_else(PoisonError::into_inner);
        let current = map
            .get(url)
            .map_or(snapshot.current, |prev| prev.current.max(snapshot.current));
        map.insert(
            url.to_string(),
            ProgressSnapshot {
                size: snapshot.size,
                current,
            },
        );
        if let Some(callback) = &self.callback {
            callback(map.clone());
        }
    }

    /// Returns a copy of the current map.
    #[must_use]
    pub fn snapshot(&self) -> ProgressMap {
        self.map
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl std::fmt::Debug for ProgressAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressAggregator")
            .field("map", &self.map)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recording() -> (ProgressCallback, Arc<Mutex<Vec<ProgressMap>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&calls);
        let callback: ProgressCallback = Arc::new(move |map| sink.lock().unwrap().push(map));
        (callback, calls)
    }

    #[test]
    fn every_report_delivers_full_map() {
        let (callback, calls) = recording();
        let aggregator = ProgressAggregator::new(Some(callback));

        aggregator.report("a", ProgressSnapshot { size: Some(10), current: 0 });
        aggregator.report("b", ProgressSnapshot { size: None, current: 0 });
        aggregator.report("a", ProgressSnapshot { size: Some(10), current: 10 });

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0].len(), 1);
        assert_eq!(calls[1].len(), 2);
        assert_eq!(calls[2]["a"].current, 10);
        assert_eq!(calls[2]["b"].size, None);
    }

    #[test]
    fn current_never_decreases() {
        let aggregator = ProgressAggregator::new(None);
        aggregator.report("a", ProgressSnapshot { size: None, current: 100 });
        aggregator.report("a", ProgressSnapshot { size: None, current: 40 });
        assert_eq!(aggregator.snapshot()["a"].current, 100);
    }

    #[test]
    fn unknown_size_maps_to_minus_one() {
        let known = ProgressSnapshot { size: Some(50), current: 0 };
        let unknown = ProgressSnapshot { size: None, current: 0 };
        assert_eq!(known.size_or_unknown(), 50);
        assert_eq!(unknown.size_or_unknown(), -1);
    }

    #[test]
    fn works_without_callback() {
        let aggregator = ProgressAggregator::new(None);
        aggregator.report("a", ProgressSnapshot { size: Some(1), current: 1 });
        assert_eq!(aggregator.snapshot().len(), 1);
    }

    #[test]
    fn concurrent_reports_are_all_recorded() {
        let (callback, calls) = recording();
        let aggregator = Arc::new(ProgressAggregator::new(Some(callback)));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let aggregator = Arc::clone(&aggregator);
                std::thread::spawn(move || {
                    for current in 0..=10 {
                        aggregator.report(&format!("url{i}"), ProgressSnapshot {
                            size: Some(10),
                            current,
                        });
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(calls.lock().unwrap().len(), 88);
        let map = aggregator.snapshot();
        assert_eq!(map.len(), 8);
        assert!(map.values().all(|s| s.current == 10));
    }
}
