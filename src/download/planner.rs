//! Segment planning: a fresh split of a part, or a reconciliation of the segment
//! files a previous run left on disk.

use std::path::Path;

use tokio_util::sync::CancellationToken;

use crate::download::segment::{self, SegmentIndex, SegmentMeta};
use crate::error::{Error, Result};

/// The authoritative segment list for one part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentPlan {
    /// Every segment, ordered by index. Their ranges tile `[0, total_size - 1]`.
    pub segments: Vec<SegmentMeta>,
    pub total_size: i64,
}

impl SegmentPlan {
    /// Segments that still need fetching.
    pub fn pending(&self) -> Vec<SegmentMeta> {
        self.segments
            .iter()
            .filter(|s| !s.is_complete())
            .copied()
            .collect()
    }

    /// Bytes already on disk across all segments.
    pub fn downloaded(&self) -> i64 {
        self.segments.iter().map(|s| s.downloaded()).sum()
    }

    /// Whether nothing is left to fetch and the part can go straight to merge.
    pub fn is_complete(&self) -> bool {
        self.downloaded() == self.total_size
    }
}

/// Split `total_size` bytes into `thread_number` near-equal ranges.
///
/// The last range absorbs the remainder. The count is clamped so that no range
/// is empty.
pub fn fresh_plan(total_size: i64, thread_number: usize) -> SegmentPlan {
    let mut segments = Vec::new();
    if total_size <= 0 {
        return SegmentPlan {
            segments,
            total_size: total_size.max(0),
        };
    }

    let count = (thread_number.max(1) as i64).min(total_size);
    let part_size = total_size / count;

    let mut start = 0i64;
    for i in 0..count {
        let end = if i + 1 == count {
            total_size - 1
        } else {
            start + part_size - 1
        };
        segments.push(SegmentMeta::new(SegmentIndex::new(i as f32), start, end));
        start = end + 1;
    }

    SegmentPlan {
        segments,
        total_size,
    }
}

/// Build the plan for the part that will end up at `final_path`.
///
/// Without segment files on disk this is [`fresh_plan`]; otherwise the recovered
/// segments are reconciled: gaps are patched with new segments, stale and
/// overshot files are deleted, and a missing tail is appended.
pub async fn plan(
    final_path: &Path,
    total_size: i64,
    thread_number: usize,
    cancel: &CancellationToken,
) -> Result<SegmentPlan> {
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    let recovered = segment::scan(final_path).await?;
    if recovered.is_empty() {
        return Ok(fresh_plan(total_size, thread_number));
    }

    tracing::debug!(
        "Found {} segment file(s) for {}",
        recovered.len(),
        final_path.display()
    );
    reconcile(final_path, recovered, total_size, thread_number).await
}

async fn reconcile(
    final_path: &Path,
    recovered: Vec<SegmentMeta>,
    total_size: i64,
    thread_number: usize,
) -> Result<SegmentPlan> {
    let mut segments: Vec<SegmentMeta> = Vec::with_capacity(recovered.len() + 1);
    let mut prev_end = -1i64;

    for mut seg in recovered {
        // Left over from a plan for a different layout or size.
        if seg.start <= prev_end || seg.end >= total_size || seg.end < seg.start {
            tracing::warn!(
                "Discarding stale segment {} [{}-{}] of {}",
                seg.index,
                seg.start,
                seg.end,
                final_path.display()
            );
            segment::remove(final_path, seg.index).await?;
            continue;
        }

        if seg.start != prev_end + 1 {
            let before = segments.last().map(|s| s.index);
            let index = SegmentIndex::between(before, seg.index)?;
            tracing::debug!(
                "Patching gap [{}-{}] with segment {}",
                prev_end + 1,
                seg.start - 1,
                index
            );
            segments.push(SegmentMeta::new(index, prev_end + 1, seg.start - 1));
        }

        if seg.is_overshot() {
            tracing::warn!(
                "Segment {} of {} holds more bytes than its range, re-downloading",
                seg.index,
                final_path.display()
            );
            segment::remove(final_path, seg.index).await?;
            seg.cursor = seg.start;
        }

        prev_end = seg.end;
        segments.push(seg);
    }

    if segments.is_empty() {
        return Ok(fresh_plan(total_size, thread_number));
    }

    if prev_end != total_size - 1 {
        let index = segments
            .last()
            .map(|s| s.index.next())
            .unwrap_or(SegmentIndex::new(0.0));
        segments.push(SegmentMeta::new(index, prev_end + 1, total_size - 1));
    }

    Ok(SegmentPlan {
        segments,
        total_size,
    })
}
