//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use segmented_downloader::config::Config;
use segmented_downloader::download::mux::Muxer;
use segmented_downloader::download::segment::{segment_path, SegmentMeta};
use segmented_downloader::media::{Data, Part, Stream};
use segmented_downloader::Result;
use wiremock::{Request, Respond, ResponseTemplate};

/// Serves `body`, honoring `Range: bytes=a-b` and `bytes=a-` requests.
///
/// Requests whose range starts at one of `failing_starts` get a 500.
pub struct RangeResponder {
    pub body: Vec<u8>,
    pub failing_starts: Vec<u64>,
}

impl RangeResponder {
    pub fn new(body: Vec<u8>) -> Self {
        Self {
            body,
            failing_starts: Vec::new(),
        }
    }

    pub fn failing_at(mut self, starts: &[u64]) -> Self {
        self.failing_starts = starts.to_vec();
        self
    }
}

impl Respond for RangeResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let Some((start, end)) = request_range(request) else {
            return ResponseTemplate::new(200).set_body_bytes(self.body.clone());
        };
        if self.failing_starts.contains(&start) {
            return ResponseTemplate::new(500);
        }

        let last = self.body.len() as u64 - 1;
        let end = end.unwrap_or(last).min(last);
        ResponseTemplate::new(206)
            .insert_header(
                "content-range",
                format!("bytes {}-{}/{}", start, end, self.body.len()).as_str(),
            )
            .set_body_bytes(self.body[start as usize..=end as usize].to_vec())
    }
}

/// `(start, end)` of a request's `Range` header.
pub fn request_range(request: &Request) -> Option<(u64, Option<u64>)> {
    let value = request.headers.get("range")?.to_str().ok()?;
    let (start, end) = value.strip_prefix("bytes=")?.split_once('-')?;
    let start = start.parse().ok()?;
    let end = if end.is_empty() { None } else { end.parse().ok() };
    Some((start, end))
}

/// Deterministic payload of `len` bytes.
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

/// Quiet configuration writing into `dir`, with no retry delay.
pub fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.download.output_directory = Some(dir.to_path_buf());
    config.download.silent = true;
    config.download.retry_times = 2;
    config.download.retry_delay_ms = 0;
    config.request.retry_times = 1;
    config.request.retry_delay_ms = 0;
    config
}

/// One video item whose only stream has the given parts.
pub fn item(title: &str, parts: Vec<Part>) -> Data {
    let mut streams = BTreeMap::new();
    streams.insert(
        "default".to_string(),
        Stream {
            parts,
            ..Default::default()
        },
    );
    let mut data = Data {
        url: "https://site.example/watch/1".into(),
        title: title.into(),
        streams,
        ..Default::default()
    };
    data.fill_streams_data();
    data
}

pub fn part(url: String, size: usize, ext: &str) -> Part {
    Part {
        url,
        size: size as i64,
        ext: ext.into(),
    }
}

/// Write a segment file as an interrupted run would have left it.
pub fn write_segment(final_path: &Path, meta: SegmentMeta, payload: &[u8]) -> PathBuf {
    let path = segment_path(final_path, meta.index);
    let mut bytes = meta.encode().to_vec();
    bytes.extend_from_slice(payload);
    std::fs::write(&path, bytes).unwrap();
    path
}

/// Muxer that concatenates its inputs and records how it was called.
#[derive(Default)]
pub struct RecordingMuxer {
    pub calls: Mutex<Vec<&'static str>>,
}

#[async_trait]
impl Muxer for RecordingMuxer {
    async fn concat(&self, inputs: &[PathBuf], output: &Path) -> Result<()> {
        self.calls.lock().unwrap().push("concat");
        join(inputs, output)
    }

    async fn mux(&self, inputs: &[PathBuf], output: &Path) -> Result<()> {
        self.calls.lock().unwrap().push("mux");
        join(inputs, output)
    }
}

fn join(inputs: &[PathBuf], output: &Path) -> Result<()> {
    let mut joined = Vec::new();
    for input in inputs {
        joined.extend(std::fs::read(input)?);
    }
    std::fs::write(output, joined)?;
    Ok(())
}
