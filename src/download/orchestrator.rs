//! Turning resolved items into files: stream selection, naming and dispatch
//! to the segmented, single-stream or delegate path.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::join_all;
use futures::stream::{self, StreamExt};
use indicatif::{MultiProgress, ProgressBar};
use regex::Regex;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, DeliveryMode};
use crate::download::delegate::Aria2Client;
use crate::download::fetcher::{FetchJob, RetryPolicy};
use crate::download::lock::{PathGuard, PathLocks};
use crate::download::merge::{concat_segments, merge_parts};
use crate::download::mux::{FfmpegMuxer, Muxer};
use crate::download::planner;
use crate::download::state::{ItemReport, Outcome};
use crate::error::{Error, PartFailure, Result};
use crate::fs::{file_name, file_path, file_size, remove_if_exists, temp_path};
use crate::http::HttpClient;
use crate::media::{Data, DataType, Part, Stream};
use crate::output::create_download_bar;

/// Quality label pattern of audio-only streams.
const AUDIO_QUALITY_PATTERN: &str = "audio+";

/// Downloads resolved items according to an explicit configuration.
///
/// Cheap to clone; clones share the HTTP client, the muxer and the path locks.
#[derive(Clone)]
pub struct Dispatcher {
    config: Arc<Config>,
    client: HttpClient,
    muxer: Arc<dyn Muxer>,
    locks: PathLocks,
    cancel: CancellationToken,
    output_name: Option<String>,
    progress: Option<MultiProgress>,
}

impl Dispatcher {
    pub fn new(config: Config, client: HttpClient, cancel: CancellationToken) -> Self {
        let progress = (!config.download.silent).then(MultiProgress::new);
        Self {
            config: Arc::new(config),
            client,
            muxer: Arc::new(FfmpegMuxer::locate()),
            locks: PathLocks::new(),
            cancel,
            output_name: None,
            progress,
        }
    }

    pub fn with_muxer(mut self, muxer: Arc<dyn Muxer>) -> Self {
        self.muxer = muxer;
        self
    }

    /// Use `name` instead of the item title for the output file.
    pub fn with_output_name(mut self, name: Option<String>) -> Self {
        self.output_name = name.filter(|n| !n.is_empty());
        self
    }

    pub fn locks(&self) -> &PathLocks {
        &self.locks
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Download every item with at most `playlist_concurrency` in flight.
    ///
    /// A failing item does not stop the others. Reports come back in item order.
    pub async fn load_playlist(&self, items: Vec<Data>) -> Vec<ItemReport> {
        let concurrency = self.config.download.playlist_concurrency.max(1);

        let mut reports: Vec<ItemReport> = stream::iter(items.into_iter().enumerate())
            .map(|(i, data)| async move {
                let result = if self.cancel.is_cancelled() {
                    Err(Error::Cancelled)
                } else {
                    self.load(&data).await
                };
                if let Err(e) = &result {
                    tracing::error!("Failed to download '{}': {}", data.title, e);
                }
                ItemReport {
                    position: i + 1,
                    title: data.title,
                    result,
                }
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        reports.sort_by_key(|r| r.position);
        reports
    }

    /// Download one item.
    pub async fn load(&self, data: &Data) -> Result<Outcome> {
        if data.streams.is_empty() {
            return Err(Error::Resolver(format!("No streams in '{}'", data.title)));
        }

        let download = &self.config.download;
        let title = self.output_name.as_deref().unwrap_or(&data.title);
        let output_name = file_name(title, "", download.file_name_length)?;
        let stream = self.select_stream(data)?;
        if stream.parts.is_empty() {
            return Err(Error::Resolver(format!(
                "Stream '{}' of '{}' has no parts",
                stream.id, data.title
            )));
        }
        let output_dir = self.config.output_directory();

        if download.mode == DeliveryMode::Delegate {
            self.captions(data, &output_name, &output_dir).await;
            let refer = self.config.request.refer.as_deref().unwrap_or(&data.url);
            let aria2 = Aria2Client::new(self.client.clone(), &self.config.aria2)?;
            let queued = aria2.dispatch(&output_name, stream, refer).await?;
            return Ok(Outcome::Delegated(queued));
        }

        let merged_path = file_path(
            &output_name,
            &stream.ext,
            download.file_name_length,
            &output_dir,
            false,
        )?;
        if file_size(&merged_path).await?.is_some() {
            tracing::info!("{} already exists, skipping", merged_path.display());
            return Ok(Outcome::Skipped(merged_path));
        }
        let _guard = self.locks.acquire(&merged_path)?;

        tracing::info!(
            "Downloading '{}' [{}] ({} part(s), {} bytes)",
            output_name,
            stream.quality,
            stream.parts.len(),
            stream.size
        );
        self.captions(data, &output_name, &output_dir).await;

        let progress = self.progress_bar(stream.size, &output_name);
        let outcome = if stream.parts.len() == 1 {
            self.single_part(data, stream, &output_name, &output_dir, progress.clone())
                .await
        } else {
            self.multi_part(
                data,
                stream,
                &output_name,
                &output_dir,
                &merged_path,
                progress.clone(),
            )
            .await
        };

        if let Some(pb) = progress {
            pb.finish_and_clear();
        }
        outcome
    }

    /// The stream to download: the configured id, else the largest one.
    ///
    /// With `audio_only` the largest stream whose quality looks like audio wins.
    pub fn select_stream<'a>(&self, data: &'a Data) -> Result<&'a Stream> {
        let sorted = data.sorted_streams();

        let mut stream = match self.config.download.stream.as_deref() {
            Some(id) if !id.is_empty() => data
                .streams
                .get(id)
                .ok_or_else(|| Error::Resolver(format!("No stream named {}", id)))?,
            _ => sorted
                .first()
                .copied()
                .ok_or_else(|| Error::Resolver(format!("No streams in '{}'", data.title)))?,
        };

        if self.config.download.audio_only {
            let audio = Regex::new(AUDIO_QUALITY_PATTERN)
                .map_err(|e| Error::Config(format!("Invalid audio pattern: {}", e)))?;
            stream = sorted
                .into_iter()
                .find(|s| audio.is_match(&s.quality))
                .ok_or_else(|| Error::Resolver("No audio stream found".into()))?;
        }

        Ok(stream)
    }

    async fn single_part(
        &self,
        data: &Data,
        stream: &Stream,
        output_name: &str,
        output_dir: &Path,
        progress: Option<ProgressBar>,
    ) -> Result<Outcome> {
        let part = &stream.parts[0];
        let path = file_path(
            output_name,
            &part.ext,
            self.config.download.file_name_length,
            output_dir,
            false,
        )?;
        let _guard = self.claim_part(&path, &stream.ext, output_name, output_dir)?;

        match self.download_part(part, &data.url, &path, progress).await? {
            Some(bytes) => Ok(Outcome::Downloaded { path, bytes }),
            None => Ok(Outcome::Skipped(path)),
        }
    }

    async fn multi_part(
        &self,
        data: &Data,
        stream: &Stream,
        output_name: &str,
        output_dir: &Path,
        merged_path: &Path,
        progress: Option<ProgressBar>,
    ) -> Result<Outcome> {
        let paths = stream
            .parts
            .iter()
            .enumerate()
            .map(|(i, part)| {
                file_path(
                    &format!("{}[{}]", output_name, i),
                    &part.ext,
                    self.config.download.file_name_length,
                    output_dir,
                    false,
                )
            })
            .collect::<Result<Vec<PathBuf>>>()?;

        let results = join_all(stream.parts.iter().zip(&paths).map(|(part, path)| {
            self.download_part(part, &data.url, path, progress.clone())
        }))
        .await;

        let mut bytes = 0u64;
        let mut failures = Vec::new();
        for (i, result) in results.into_iter().enumerate() {
            match result {
                Ok(written) => bytes += written.unwrap_or(0),
                Err(error) => failures.push(PartFailure { part: i, error }),
            }
        }
        if !failures.is_empty() {
            return Err(Error::PartsFailed {
                title: output_name.to_string(),
                failures,
            });
        }

        if data.data_type != DataType::Video {
            return Ok(Outcome::Downloaded {
                path: output_dir.to_path_buf(),
                bytes,
            });
        }

        tracing::info!("Merging {} part(s) into {}", paths.len(), merged_path.display());
        let mux = stream.ext != "mp4" || stream.need_mux;
        merge_parts(self.muxer.as_ref(), &paths, merged_path, mux).await?;

        Ok(Outcome::Downloaded {
            path: merged_path.to_path_buf(),
            bytes,
        })
    }

    /// Fetch one part to `path`. `None` means it was already complete on disk.
    async fn download_part(
        &self,
        part: &Part,
        refer: &str,
        path: &Path,
        progress: Option<ProgressBar>,
    ) -> Result<Option<u64>> {
        if part.size > 0 && file_size(path).await? == Some(part.size as u64) {
            tracing::info!("{} is complete, skipping", path.display());
            if let Some(pb) = &progress {
                pb.inc(part.size as u64);
            }
            return Ok(None);
        }

        let job = FetchJob {
            client: self.client.clone(),
            url: part.url.clone(),
            refer: refer.to_string(),
            final_path: path.to_path_buf(),
            chunk_size: self.config.download.chunk_size(),
            retry: RetryPolicy::from_config(&self.config.download),
            cancel: self.cancel.clone(),
            progress,
        };

        let bytes = if self.config.download.mode == DeliveryMode::Segmented && part.size > 0 {
            self.segmented(&job, part.size).await?
        } else {
            job.fetch_whole(part.size).await?
        };
        tracing::debug!("Saved {} ({} bytes)", path.display(), bytes);
        Ok(Some(bytes))
    }

    async fn segmented(&self, job: &FetchJob, size: i64) -> Result<u64> {
        let final_path = &job.final_path;

        let temp = temp_path(final_path);
        if let Some(temp_size) = file_size(&temp).await? {
            if temp_size == size as u64 {
                tokio::fs::rename(&temp, final_path).await.map_err(|e| {
                    Error::io_at(
                        format!("rename {} to {}", temp.display(), final_path.display()),
                        e,
                    )
                })?;
                return Ok(temp_size);
            }
            remove_if_exists(&temp).await?;
        }

        let plan = planner::plan(
            final_path,
            size,
            self.config.download.thread_number,
            &self.cancel,
        )
        .await?;
        if let Some(pb) = &job.progress {
            pb.inc(plan.downloaded().max(0) as u64);
        }

        if plan.is_complete() {
            tracing::debug!("All segments of {} are on disk", final_path.display());
        } else {
            job.fetch_segments(plan.pending()).await?;
        }
        concat_segments(final_path, &plan, &self.cancel).await?;
        Ok(size as u64)
    }

    /// Write each caption next to the media. Failures are logged only.
    async fn captions(&self, data: &Data, output_name: &str, output_dir: &Path) {
        if !self.config.download.caption {
            return;
        }

        for (name, caption) in &data.captions {
            tracing::info!("Downloading [{}] caption of '{}'", name, output_name);
            if let Err(e) = self.caption(&caption.url, &caption.ext, output_name, output_dir).await {
                tracing::error!("Caption [{}] of '{}' failed: {}", name, output_name, e);
            }
        }
    }

    async fn caption(&self, url: &str, ext: &str, output_name: &str, output_dir: &Path) -> Result<()> {
        let body = self.client.get_bytes(url, "").await?;
        let path = file_path(
            output_name,
            ext,
            self.config.download.file_name_length,
            output_dir,
            true,
        )?;
        tokio::fs::write(&path, body)
            .await
            .map_err(|e| Error::io_at(format!("write {}", path.display()), e))
    }

    /// Lock a single part's own path when it differs from the merged path.
    fn claim_part(
        &self,
        path: &Path,
        stream_ext: &str,
        output_name: &str,
        output_dir: &Path,
    ) -> Result<Option<PathGuard>> {
        let merged = output_dir.join(format!("{}.{}", output_name, stream_ext));
        if path == merged {
            return Ok(None);
        }
        self.locks.acquire(path).map(Some)
    }

    fn progress_bar(&self, total: i64, title: &str) -> Option<ProgressBar> {
        let multi = self.progress.as_ref()?;
        Some(multi.add(create_download_bar(total.max(0) as u64, title)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RequestConfig;
    use std::collections::BTreeMap;

    fn stream(quality: &str, size: i64) -> Stream {
        Stream {
            quality: quality.into(),
            parts: vec![Part {
                url: format!("https://cdn.example/{}", quality),
                size,
                ext: "mp4".into(),
            }],
            ..Default::default()
        }
    }

    fn data() -> Data {
        let mut streams = BTreeMap::new();
        streams.insert("1080".to_string(), stream("1080P", 300));
        streams.insert("720".to_string(), stream("720P", 200));
        streams.insert("a".to_string(), stream("audio", 50));
        let mut data = Data {
            url: "https://site.example/v/1".into(),
            title: "clip".into(),
            streams,
            ..Default::default()
        };
        data.fill_streams_data();
        data
    }

    fn dispatcher(config: Config) -> Dispatcher {
        let client = HttpClient::new(&RequestConfig::default()).unwrap();
        Dispatcher::new(config, client, CancellationToken::new())
    }

    #[test]
    fn test_select_largest_stream_by_default() {
        let mut config = Config::default();
        config.download.silent = true;
        let data = data();
        assert_eq!(dispatcher(config).select_stream(&data).unwrap().id, "1080");
    }

    #[test]
    fn test_select_explicit_and_audio_streams() {
        let data = data();

        let mut config = Config::default();
        config.download.silent = true;
        config.download.stream = Some("720".into());
        assert_eq!(dispatcher(config.clone()).select_stream(&data).unwrap().id, "720");

        config.download.stream = Some("4k".into());
        assert!(dispatcher(config.clone()).select_stream(&data).is_err());

        config.download.stream = None;
        config.download.audio_only = true;
        assert_eq!(dispatcher(config).select_stream(&data).unwrap().id, "a");
    }

    #[tokio::test]
    async fn test_item_without_streams_fails() {
        let mut config = Config::default();
        config.download.silent = true;
        let err = dispatcher(config)
            .load(&Data {
                title: "empty".into(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Resolver(_)));
    }

    #[tokio::test]
    async fn test_busy_path_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.download.silent = true;
        config.download.output_directory = Some(dir.path().to_path_buf());
        let dispatcher = dispatcher(config);

        let _held = dispatcher.locks().acquire(&dir.path().join("clip.mp4")).unwrap();
        let err = dispatcher.load(&data()).await.unwrap_err();
        assert!(matches!(err, Error::PathBusy(_)));
    }
}
