//! Whole-file download through a resumable `.download` temp file.

use tokio::fs::{self, OpenOptions};

use crate::download::fetcher::FetchJob;
use crate::error::{Error, Result};
use crate::fs::temp_path;

impl FetchJob {
    /// Download the part as one stream.
    ///
    /// Bytes already in the temp file are kept and the transfer resumes after
    /// them with an open `Range` request. With a known `size` and a chunk size
    /// the remainder is fetched in sequential chunks. The temp file is renamed
    /// to the final path only after the transfer succeeds.
    pub async fn fetch_whole(&self, size: i64) -> Result<u64> {
        let temp = temp_path(&self.final_path);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&temp)
            .await
            .map_err(|e| Error::io_at(format!("open {}", temp.display()), e))?;

        let mut written = file
            .metadata()
            .await
            .map_err(|e| Error::io_at(format!("stat {}", temp.display()), e))?
            .len();

        if size > 0 && written > size as u64 {
            tracing::warn!(
                "{} holds more than {} bytes, starting over",
                temp.display(),
                size
            );
            file.set_len(0)
                .await
                .map_err(|e| Error::io_at(format!("truncate {}", temp.display()), e))?;
            written = 0;
        }
        if written > 0 {
            tracing::info!("Resuming {} from byte {}", self.final_path.display(), written);
        }
        if let Some(pb) = &self.progress {
            pb.inc(written);
        }

        if size > 0 {
            let size = size as u64;
            while written < size {
                let start = written as i64;
                let end = match self.chunk_size {
                    Some(chunk) => (start + chunk as i64 - 1).min(size as i64 - 1),
                    None => size as i64 - 1,
                };
                written += self.fetch_with_retry(&mut file, start, Some(end)).await?;
            }
        } else {
            written += self.fetch_with_retry(&mut file, written as i64, None).await?;
        }
        drop(file);

        fs::rename(&temp, &self.final_path).await.map_err(|e| {
            Error::io_at(
                format!("rename {} to {}", temp.display(), self.final_path.display()),
                e,
            )
        })?;
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use tokio_util::sync::CancellationToken;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::config::RequestConfig;
    use crate::download::fetcher::{FetchJob, RetryPolicy};
    use crate::fs::temp_path;
    use crate::http::HttpClient;

    fn job(server: &MockServer, final_path: PathBuf) -> FetchJob {
        let client = HttpClient::new(&RequestConfig {
            retry_delay_ms: 0,
            ..RequestConfig::default()
        })
        .unwrap();
        FetchJob {
            client,
            url: format!("{}/whole", server.uri()),
            refer: String::new(),
            final_path,
            chunk_size: None,
            retry: RetryPolicy {
                attempts: 2,
                delay: Duration::ZERO,
            },
            cancel: CancellationToken::new(),
            progress: None,
        }
    }

    #[tokio::test]
    async fn test_fresh_download_is_renamed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/whole"))
            .respond_with(ResponseTemplate::new(206).set_body_bytes(b"hello".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let final_path = dir.path().join("a.txt");
        let written = job(&server, final_path.clone()).fetch_whole(5).await.unwrap();

        assert_eq!(written, 5);
        assert_eq!(tokio::fs::read(&final_path).await.unwrap(), b"hello");
        assert!(!temp_path(&final_path).exists());
    }

    #[tokio::test]
    async fn test_resume_requests_remaining_bytes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/whole"))
            .and(header("range", "bytes=3-5"))
            .respond_with(ResponseTemplate::new(206).set_body_bytes(b"def".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let final_path = dir.path().join("a.txt");
        tokio::fs::write(temp_path(&final_path), b"abc").await.unwrap();

        job(&server, final_path.clone()).fetch_whole(6).await.unwrap();
        assert_eq!(tokio::fs::read(&final_path).await.unwrap(), b"abcdef");
    }

    #[tokio::test]
    async fn test_chunk_retry_resumes_after_partial_body() {
        let server = MockServer::start().await;
        for (range, body) in [
            ("bytes=0-4", &b"ab"[..]),
            ("bytes=2-4", &b"cde"[..]),
            ("bytes=5-9", &b"fghij"[..]),
        ] {
            Mock::given(method("GET"))
                .and(path("/whole"))
                .and(header("range", range))
                .respond_with(ResponseTemplate::new(206).set_body_bytes(body.to_vec()))
                .expect(1)
                .mount(&server)
                .await;
        }

        let dir = tempfile::tempdir().unwrap();
        let final_path = dir.path().join("a.txt");
        let mut fetcher = job(&server, final_path.clone());
        fetcher.chunk_size = Some(5);

        assert_eq!(fetcher.fetch_whole(10).await.unwrap(), 10);
        assert_eq!(tokio::fs::read(&final_path).await.unwrap(), b"abcdefghij");
    }

    #[tokio::test]
    async fn test_unknown_size_reads_to_end() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/whole"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![9u8; 32]))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let final_path = dir.path().join("stream.bin");
        let written = job(&server, final_path.clone()).fetch_whole(0).await.unwrap();
        assert_eq!(written, 32);
    }

    #[tokio::test]
    async fn test_failed_download_keeps_temp_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/whole"))
            .respond_with(ResponseTemplate::new(500))
            .expect(2)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let final_path = dir.path().join("a.txt");
        assert!(job(&server, final_path.clone()).fetch_whole(5).await.is_err());
        assert!(!final_path.exists());
        assert!(temp_path(&final_path).exists());
    }
}
