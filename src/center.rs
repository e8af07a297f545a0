//! Batch orchestration: one worker per unique URL, one completion per batch.

use std::sync::{Arc, Mutex, PoisonError};

use reqwest::Client;

use crate::config::{Delivery, FetchConfig};
use crate::error::Result;
use crate::fetch::{FetchContext, build_client, fetch};
use crate::fs::{FileSystem, TempDirFileSystem};
use crate::outcome::{DownloadResult, ResultMap};
use crate::progress::{ProgressAggregator, ProgressCallback, ProgressMap};
use crate::request::{Request, RequestSpec, normalize};

/// Per-batch options.
#[derive(Clone, Default)]
pub struct BatchOptions {
    /// Where successful downloads are delivered.
    pub delivery: Delivery,
    /// Called with the full progress map after every snapshot.
    pub on_progress: Option<ProgressCallback>,
}

impl BatchOptions {
    /// Creates options with default values: persisted files, no progress.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the delivery mode.
    #[must_use]
    pub const fn with_delivery(mut self, delivery: Delivery) -> Self {
        self.delivery = delivery;
        self
    }

    /// Delivers successful downloads as in-memory buffers.
    #[must_use]
    pub const fn in_memory(self) -> Self {
        self.with_delivery(Delivery::Memory)
    }

    /// Sets the progress callback.
    #[must_use]
    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(ProgressMap) + Send + Sync + 'static,
    {
        self.on_progress = Some(Arc::new(callback));
        self
    }
}

impl std::fmt::Debug for BatchOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchOptions")
            .field("delivery", &self.delivery)
            .field("on_progress", &self.on_progress.is_some())
            .finish()
    }
}

type CompletionCallback = Box<dyn FnOnce(ResultMap) + Send>;

/// Results gathered so far plus the pending completion callback.
struct Completion {
    results: ResultMap,
    finished: usize,
    on_done: Option<CompletionCallback>,
}

/// State shared by all workers of one batch, dropped once the batch completes.
struct Batch {
    expected: usize,
    completion: Mutex<Completion>,
    progress: ProgressAggregator,
}

impl Batch {
    /// Stores a terminal result; the call that stores the last one runs the
    /// completion callback.
    fn record(&self, url: String, result: DownloadResult) {
        let ready = {
            let mut completion = self
                .completion
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            completion.results.insert(url, result);
            completion.finished += 1;
            if completion.finished == self.expected {
                completion
                    .on_done
                    .take()
                    .map(|on_done| (on_done, std::mem::take(&mut completion.results)))
            } else {
                None
            }
        };

        if let Some((on_done, results)) = ready {
            log::info!("Batch complete: {} result(s)", results.len());
            on_done(results);
        }
    }
}

/// Concurrent, deduplicating fetch engine.
///
/// Each call to [`submit`](Self::submit) is an independent batch with its own
/// result and progress maps. The HTTP client and its connection pool are
/// shared between batches.
pub struct DownloadCenter {
    client: Client,
    config: Arc<FetchConfig>,
    fs: Arc<dyn FileSystem>,
}

impl DownloadCenter {
    /// Creates a download center persisting files through
    /// [`TempDirFileSystem`].
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the CA bundle cannot
    /// be loaded.
    pub fn new(config: FetchConfig) -> Result<Self> {
        let fs = TempDirFileSystem::in_dir(config.temp_dir.clone());
        Self::with_fs(config, fs)
    }

    /// Creates a download center with a custom file system implementation.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the CA bundle cannot
    /// be loaded.
    pub fn with_fs<F: FileSystem + 'static>(config: FetchConfig, fs: F) -> Result<Self> {
        config.validate()?;
        let client = build_client(&config)?;
        Ok(Self {
            client,
            config: Arc::new(config),
            fs: Arc::new(fs),
        })
    }

    /// Returns a reference to the configuration.
    #[must_use]
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Starts a batch and returns immediately.
    ///
    /// One task is spawned per distinct URL, all at once. `on_done` runs exactly
    /// once, on the task that finishes last, with one result per distinct URL.
    /// An empty batch completes before this returns.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn submit<I, S, D>(&self, specs: I, options: BatchOptions, on_done: D)
    where
        I: IntoIterator<Item = S>,
        S: Into<RequestSpec>,
        D: FnOnce(ResultMap) + Send + 'static,
    {
        let normalized = normalize(specs);
        let batch = Arc::new(Batch {
            expected: normalized.len(),
            completion: Mutex::new(Completion {
                results: ResultMap::with_capacity(normalized.len()),
                finished: 0,
                on_done: Some(Box::new(on_done)),
            }),
            progress: ProgressAggregator::new(options.on_progress),
        });

        log::info!(
            "Starting batch of {} URL(s), {} rejected",
            normalized.len(),
            normalized.conflicts.len()
        );

        if normalized.is_empty() {
            let on_done = batch
                .completion
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .on_done
                .take();
            if let Some(on_done) = on_done {
                on_done(ResultMap::new());
            }
            return;
        }

        let ctx = FetchContext {
            client: self.client.clone(),
            config: Arc::clone(&self.config),
            fs: Arc::clone(&self.fs),
            delivery: options.delivery,
        };

        for request in normalized.requests {
            spawn_worker(ctx.clone(), request, Arc::clone(&batch));
        }

        for url in normalized.conflicts {
            let message = format!("Conflicting checksums requested for {url}");
            batch.record(url, DownloadResult::Error(message));
        }
    }

    /// Runs a batch and waits for its results.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub async fn fetch_all<I, S>(&self, specs: I, options: BatchOptions) -> ResultMap
    where
        I: IntoIterator<Item = S>,
        S: Into<RequestSpec>,
    {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.submit(specs, options, move |results| {
            let _ = tx.send(results);
        });
        rx.await.unwrap_or_default()
    }
}

/// Spawns the worker for one request, plus a supervisor turning a panic into
/// an error result so the batch still completes.
fn spawn_worker(ctx: FetchContext, request: Request, batch: Arc<Batch>) {
    tokio::spawn(async move {
        let url = request.url.clone();
        let worker_batch = Arc::clone(&batch);
        let handle = tokio::spawn(async move {
            let progress_batch = Arc::clone(&worker_batch);
            let progress_url = request.url.clone();
            fetch(&ctx, &request, move |snapshot| {
                progress_batch.progress.report(&progress_url, snapshot);
            })
            .await
        });

        let result = handle.await.unwrap_or_else(|e| {
            log::error!("{url}: worker failed: {e}");
            DownloadResult::Error(format!("Download worker failed: {e}"))
        });
        batch.record(url, result);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn batch_options_builder() {
        let options = BatchOptions::new().in_memory().with_progress(|_| {});
        assert_eq!(options.delivery, Delivery::Memory);
        assert!(options.on_progress.is_some());

        let options = BatchOptions::default();
        assert_eq!(options.delivery, Delivery::TempFile);
        assert!(options.on_progress.is_none());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let result = DownloadCenter::new(FetchConfig::new().with_block_size(0));
        assert!(matches!(result, Err(crate::Error::Config(_))));
    }

    fn batch_of(expected: usize, calls: Arc<AtomicUsize>) -> Arc<Batch> {
        Arc::new(Batch {
            expected,
            completion: Mutex::new(Completion {
                results: ResultMap::new(),
                finished: 0,
                on_done: Some(Box::new(move |results: ResultMap| {
                    assert_eq!(results.len(), expected);
                    calls.fetch_add(1, Ordering::SeqCst);
                })),
            }),
            progress: ProgressAggregator::new(None),
        })
    }

    #[test]
    fn completion_runs_once_under_concurrent_records() {
        let calls = Arc::new(AtomicUsize::new(0));
        let batch = batch_of(32, Arc::clone(&calls));

        let handles: Vec<_> = (0..32)
            .map(|i| {
                let batch = Arc::clone(&batch);
                std::thread::spawn(move || {
                    batch.record(format!("http://h/{i}"), DownloadResult::Error("x".into()));
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn completion_waits_for_last_result() {
        let calls = Arc::new(AtomicUsize::new(0));
        let batch = batch_of(2, Arc::clone(&calls));

        batch.record("a".into(), DownloadResult::Error("x".into()));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        batch.record("b".into(), DownloadResult::Error("x".into()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_batch_completes_immediately() {
        let center = DownloadCenter::new(FetchConfig::default()).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        center.submit(Vec::<RequestSpec>::new(), BatchOptions::new(), move |results| {
            assert!(results.is_empty());
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
