//! Download module: the segmented download engine and its alternatives.
//!
//! This module provides:
//! - Segment files with persisted progress, and resume planning
//! - Concurrent ranged fetching of segments
//! - Merging segments and multi-part streams
//! - The single-stream and aria2 delegate paths
//! - The dispatcher that drives items through them

pub mod delegate;
pub mod fetcher;
pub mod lock;
pub mod merge;
pub mod mux;
pub mod orchestrator;
pub mod planner;
pub mod segment;
pub mod single;
pub mod state;

pub use delegate::Aria2Client;
pub use fetcher::{FetchJob, RetryPolicy};
pub use lock::{PathGuard, PathLocks};
pub use merge::{concat_segments, merge_parts};
pub use mux::{FfmpegMuxer, Muxer};
pub use orchestrator::Dispatcher;
pub use planner::{fresh_plan, plan, SegmentPlan};
pub use segment::{SegmentIndex, SegmentMeta};
pub use state::{GlobalState, ItemReport, Outcome};
