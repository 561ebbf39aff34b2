//! Ranged byte fetching for the segments of one part.

use std::path::PathBuf;
use std::time::Duration;

use futures::future::join_all;
use futures::StreamExt;
use indicatif::ProgressBar;
use reqwest::header::{HeaderValue, ACCEPT_ENCODING, RANGE};
use reqwest::{Response, StatusCode};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::config::DownloadConfig;
use crate::download::segment::{self, SegmentMeta};
use crate::error::{Error, Result, SegmentFailure};
use crate::http::{referer_header, HttpClient};

/// How often and how far apart a failed range request is repeated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per chunk, the first one included.
    pub attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &DownloadConfig) -> Self {
        Self {
            attempts: config.retry_times.max(1),
            delay: config.retry_delay(),
        }
    }
}

/// Everything needed to fetch one part into `final_path`.
///
/// Shared by the segmented path (this module) and the single-stream path.
#[derive(Clone)]
pub struct FetchJob {
    pub client: HttpClient,
    pub url: String,
    pub refer: String,
    pub final_path: PathBuf,
    /// Bytes per request, `None` for the whole remaining range.
    pub chunk_size: Option<u64>,
    pub retry: RetryPolicy,
    pub cancel: CancellationToken,
    pub progress: Option<ProgressBar>,
}

impl FetchJob {
    /// Fetch every pending segment concurrently.
    ///
    /// A failing segment does not stop its siblings. Once all have finished,
    /// the failures are returned together, ordered by segment index.
    pub async fn fetch_segments(&self, pending: Vec<SegmentMeta>) -> Result<()> {
        tracing::debug!(
            "Fetching {} segment(s) of {}",
            pending.len(),
            self.final_path.display()
        );

        let results = join_all(
            pending
                .into_iter()
                .map(|meta| async move { (meta.index, self.fetch_segment(meta).await) }),
        )
        .await;

        let mut failures: Vec<SegmentFailure> = results
            .into_iter()
            .filter_map(|(index, result)| result.err().map(|error| SegmentFailure { index, error }))
            .collect();

        if failures.is_empty() {
            return Ok(());
        }
        failures.sort_by_key(|f| f.index);
        Err(Error::SegmentsFailed {
            path: self.final_path.clone(),
            failures,
        })
    }

    /// Advance one segment's cursor to `end + 1`, chunk by chunk.
    async fn fetch_segment(&self, mut meta: SegmentMeta) -> Result<()> {
        let mut file = segment::open_for_append(&self.final_path, &meta).await?;

        while meta.cursor <= meta.end {
            let range_end = match self.chunk_size {
                Some(chunk) => (meta.cursor + chunk as i64 - 1).min(meta.end),
                None => meta.end,
            };
            self.fetch_with_retry(&mut file, meta.cursor, Some(range_end))
                .await?;
            meta.cursor = range_end + 1;
        }

        tracing::debug!(
            "Segment {} of {} complete",
            meta.index,
            self.final_path.display()
        );
        Ok(())
    }

    /// Fetch `[start, end]` into `file`, retrying the same range.
    ///
    /// Bytes written by a failed attempt are kept and the next attempt starts
    /// after them. Without `end` the body is read until the server closes it.
    /// Returns the number of bytes written.
    pub(crate) async fn fetch_with_retry(
        &self,
        file: &mut File,
        start: i64,
        end: Option<i64>,
    ) -> Result<u64> {
        let expected = end.map(|end| (end - start + 1) as u64);
        let mut written = 0u64;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let from = start + written as i64;
            let err = match self.fetch_range(file, from, end, &mut written).await {
                Ok(()) => match expected {
                    Some(expected) if written < expected => Error::ShortRead { expected, received: written },
                    _ => return Ok(written),
                },
                Err(e @ (Error::Cancelled | Error::RangeNotSupported(_))) => return Err(e),
                Err(e) => e,
            };

            if attempt >= self.retry.attempts {
                return Err(err);
            }
            tracing::warn!(
                "{} (attempt {}/{}), retrying from byte {}",
                err,
                attempt,
                self.retry.attempts,
                start + written as i64
            );

            tokio::select! {
                _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                _ = sleep(self.retry.delay) => {}
            }
        }
    }

    /// One request for `[from, end]`, appending the body to `file`.
    async fn fetch_range(
        &self,
        file: &mut File,
        from: i64,
        end: Option<i64>,
        written: &mut u64,
    ) -> Result<()> {
        let mut headers = referer_header(&self.refer)?;
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));
        if from > 0 || end.is_some() {
            let range = match end {
                Some(end) => format!("bytes={}-{}", from, end),
                None => format!("bytes={}-", from),
            };
            let value = HeaderValue::from_str(&range)
                .map_err(|_| Error::Config(format!("Invalid range header: {}", range)))?;
            headers.insert(RANGE, value);
        }

        let response = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(Error::Cancelled),
            response = self.client.send_once(&self.url, headers) => response?,
        };

        if from > 0 && response.status() != StatusCode::PARTIAL_CONTENT {
            return Err(Error::RangeNotSupported(self.url.clone()));
        }

        let limit = end.map(|end| (end - from + 1) as u64);
        copy_body(
            response,
            file,
            limit,
            &self.cancel,
            self.progress.as_ref(),
            written,
        )
        .await
    }
}

/// Stream a response body into `file`, flushing every chunk.
///
/// At most `limit` bytes are written; anything the server sends past it is
/// dropped. `written` is advanced as bytes land on disk, so a caller can tell
/// how far a failed transfer got.
pub(crate) async fn copy_body(
    response: Response,
    file: &mut File,
    limit: Option<u64>,
    cancel: &CancellationToken,
    progress: Option<&ProgressBar>,
    written: &mut u64,
) -> Result<()> {
    let url = response.url().to_string();
    let mut stream = response.bytes_stream();
    let mut received = 0u64;

    loop {
        if limit.is_some_and(|limit| received >= limit) {
            break;
        }

        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            next = stream.next() => next,
        };
        let Some(chunk) = next else {
            break;
        };
        let chunk = chunk.map_err(|e| Error::Request {
            url: url.clone(),
            message: format!("stream error: {}", e),
        })?;

        let take = match limit {
            Some(limit) => chunk.len().min((limit - received) as usize),
            None => chunk.len(),
        };
        file.write_all(&chunk[..take])
            .await
            .map_err(|e| Error::io_at("write downloaded bytes", e))?;
        file.flush()
            .await
            .map_err(|e| Error::io_at("flush downloaded bytes", e))?;

        received += take as u64;
        *written += take as u64;
        if let Some(pb) = progress {
            pb.inc(take as u64);
        }
    }

    Ok(())
}
