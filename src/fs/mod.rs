//! Filesystem module.
//!
//! Provides:
//! - Output path resolution and temp file naming
//! - Filename generation and manipulation

pub mod naming;
pub mod paths;

pub use naming::{file_name, limit_length, part_file_name};
pub use paths::{
    ensure_dir, file_path, file_size, mux_temp_path, remove_if_exists, temp_path, TEMP_SUFFIX,
};
