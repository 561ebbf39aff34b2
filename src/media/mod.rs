//! Media module: the resolver boundary.
//!
//! Provides:
//! - Item, stream and part types produced by resolvers
//! - Manifest loading, plain URL resolution and playlist selection

pub mod item;
pub mod parser;

pub use item::{CaptionPart, Data, DataType, Part, Stream};
pub use parser::{load_manifest, parse_manifest, resolve_direct, select_items};
