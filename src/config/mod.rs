//! Configuration module for the segmented downloader.
//!
//! This module handles:
//! - Loading configuration from TOML files
//! - Delivery mode selection
//! - Configuration validation and playlist item selection

pub mod loader;
pub mod modes;
pub mod validation;

pub use loader::{Aria2Config, Config, DownloadConfig, RequestConfig};
pub use modes::DeliveryMode;
pub use validation::{need_download_list, parse_items, validate_config};
