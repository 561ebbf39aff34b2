//! HTTP request module.
//!
//! This module provides:
//! - A shared client with header injection and fixed-delay retry
//! - Content-Length / Content-Type probing
//! - JSON POST for the delegate daemon

pub mod client;

pub use client::{referer_header, HttpClient};
