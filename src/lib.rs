//! download-center - A concurrent, deduplicating fetch engine for installers.
//!
//! A batch of URLs (optionally paired with checksums) is fetched in parallel,
//! one task per distinct URL. Progress is reported through an optional
//! callback, and a completion callback receives exactly one result per URL
//! once every transfer has finished.
//!
//! # Example
//!
//! ```no_run
//! use download_center::{BatchOptions, DownloadCenter, FetchConfig};
//!
//! # async fn example() -> download_center::Result<()> {
//! let center = DownloadCenter::new(FetchConfig::default())?;
//!
//! let options = BatchOptions::new().with_progress(|progress| {
//!     for (url, snapshot) in &progress {
//!         println!("{url}: {}/{}", snapshot.current, snapshot.size_or_unknown());
//!     }
//! });
//!
//! let results = center
//!     .fetch_all(
//!         [("https://example.com/tool.tar.gz", "sha256:0123abcd")],
//!         options,
//!     )
//!     .await;
//!
//! for (url, result) in results {
//!     match result.error() {
//!         Some(error) => eprintln!("{url}: {error}"),
//!         None => println!("{url}: ok"),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod center;
pub mod checksum;
pub mod config;
pub mod error;
mod fetch;
pub mod fs;
pub mod outcome;
pub mod progress;
pub mod request;

#[cfg(feature = "cli")]
pub mod cli;

// Re-export main types for convenience
pub use center::{BatchOptions, DownloadCenter};
pub use checksum::{Algorithm, Checksum};
pub use config::{BLOCK_SIZE, Delivery, FetchConfig, MAX_REDIRECTS};
pub use error::{Error, FetchError, Result};
pub use fs::{FileSystem, TempDirFileSystem};
pub use outcome::{DownloadResult, ResultMap};
pub use progress::{ProgressCallback, ProgressMap, ProgressSnapshot};
pub use request::{Request, RequestSpec, normalize};
