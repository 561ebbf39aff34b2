//! segmented-downloader - resumable, multi-segment downloads of media streams
//!
//! This library downloads the streams produced by a site resolver (or a plain
//! URL) to disk.
//!
//! # Features
//!
//! - Concurrent ranged requests per file, with progress persisted in segment files
//! - Resume after interruption, including self-healing of stale or broken segments
//! - Multi-part streams merged or muxed with ffmpeg
//! - Single-stream resumable downloads
//! - Delegation to an aria2 daemon over JSON-RPC
//! - Playlist item selection and bounded playlist concurrency
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use segmented_downloader::{load_manifest, Config, Dispatcher, HttpClient};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load(Path::new("config.toml"))?;
//!     let client = HttpClient::new(&config.request)?;
//!     let items = load_manifest(Path::new("items.json"))?;
//!
//!     let dispatcher = Dispatcher::new(config, client, CancellationToken::new());
//!     for report in dispatcher.load_playlist(items).await {
//!         println!("{}: {:?}", report.title, report.result.is_ok());
//!     }
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod download;
pub mod error;
pub mod fs;
pub mod http;
pub mod media;
pub mod output;

// Re-exports for convenience
pub use config::{Config, DeliveryMode};
pub use download::{Dispatcher, GlobalState, ItemReport, Outcome};
pub use error::{Error, Result};
pub use http::HttpClient;
pub use media::{load_manifest, resolve_direct, Data, Stream};
