//! Per-item outcomes and run-wide statistics.

use std::path::PathBuf;

use crate::error::Error;

/// What happened to one item that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Written to this path by this run.
    Downloaded { path: PathBuf, bytes: u64 },
    /// The final file was already there.
    Skipped(PathBuf),
    /// Handed to the delegate daemon, with the number of queued parts.
    Delegated(usize),
}

/// Result of one playlist item.
#[derive(Debug)]
pub struct ItemReport {
    /// 1-based position in the selected items.
    pub position: usize,
    pub title: String,
    pub result: Result<Outcome, Error>,
}

impl ItemReport {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Statistics across every item of a run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GlobalState {
    pub downloaded: u64,
    pub skipped: u64,
    pub delegated: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub bytes: u64,
}

impl GlobalState {
    /// Fold one item's report into the totals.
    pub fn record(&mut self, report: &ItemReport) {
        match &report.result {
            Ok(Outcome::Downloaded { bytes, .. }) => {
                self.downloaded += 1;
                self.bytes += bytes;
            }
            Ok(Outcome::Skipped(_)) => self.skipped += 1,
            Ok(Outcome::Delegated(_)) => self.delegated += 1,
            Err(e) if e.is_cancelled() => self.cancelled += 1,
            Err(_) => self.failed += 1,
        }
    }

    pub fn from_reports(reports: &[ItemReport]) -> Self {
        let mut state = Self::default();
        for report in reports {
            state.record(report);
        }
        state
    }

    /// Items that finished without error.
    pub fn total_succeeded(&self) -> u64 {
        self.downloaded + self.skipped + self.delegated
    }
}
