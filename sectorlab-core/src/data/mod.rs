//! Data collaborators: providers, caching, alignment and the default universe.

pub mod align;
pub mod cache;
pub mod circuit_breaker;
pub mod download;
pub mod provider;
pub mod storage;
pub mod universe;
pub mod yahoo;

pub use align::bars_to_panel;
pub use cache::{BarCache, CacheMeta, CacheStatus, CoverageResult};
pub use circuit_breaker::CircuitBreaker;
pub use download::{download_symbols, DownloadSummary};
pub use provider::{DataError, DataProvider, DataSource, DownloadProgress, FetchResult, LogProgress, RawBar};
pub use storage::{BlobStore, FsBlobStore, MemoryBlobStore};
pub use universe::{Listing, Universe};
pub use yahoo::YahooProvider;
