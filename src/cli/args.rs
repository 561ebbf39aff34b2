//! Command-line argument definitions using clap.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::config::{Config, DeliveryMode};

/// Resumable multi-segment downloader CLI.
#[derive(Parser, Debug)]
#[command(
    name = "segdl",
    version,
    about = "Resumable, multi-segment downloader for media streams",
    long_about = "Download a URL, or the items of a resolver manifest, with concurrent ranged requests.\n\n\
                  Progress is kept on disk, so an interrupted download resumes where it stopped."
)]
pub struct Args {
    /// URL of a file to download directly.
    #[arg(required_unless_present = "manifest", conflicts_with = "manifest")]
    pub url: Option<String>,

    /// Resolver output (JSON item or array of items) to download.
    #[arg(short, long)]
    pub manifest: Option<PathBuf>,

    /// Output directory.
    #[arg(short = 'o', long = "output-path")]
    pub output_path: Option<PathBuf>,

    /// Output file name, without extension. Only used for a single item.
    #[arg(short = 'O', long = "output-name")]
    pub output_name: Option<String>,

    /// Download every selected item of a playlist instead of the first one.
    #[arg(short, long)]
    pub playlist: bool,

    /// Playlist items to download, e.g. "1,5,6,8-10".
    #[arg(short, long, default_value = "")]
    pub items: String,

    /// First playlist item to download.
    #[arg(long = "start", default_value_t = 1)]
    pub item_start: usize,

    /// Last playlist item to download, 0 for the last one.
    #[arg(long = "end", default_value_t = 0)]
    pub item_end: usize,

    /// Stream id to download instead of the largest one.
    #[arg(short = 'f', long)]
    pub stream: Option<String>,

    /// Pick the best audio-only stream.
    #[arg(long)]
    pub audio_only: bool,

    /// Also download captions.
    #[arg(short = 'C', long)]
    pub caption: bool,

    /// Segments per file.
    #[arg(short = 'n', long = "thread")]
    pub thread_number: Option<usize>,

    /// Bytes per ranged request in MiB, 0 for the whole segment.
    #[arg(long)]
    pub chunk_size_mb: Option<u64>,

    /// Attempts per request.
    #[arg(long = "retry")]
    pub retry_times: Option<u32>,

    /// Milliseconds to wait between attempts.
    #[arg(long)]
    pub retry_delay_ms: Option<u64>,

    /// How files are fetched.
    #[arg(long, value_enum)]
    pub mode: Option<DeliveryModeArg>,

    /// Items of a playlist downloaded at the same time.
    #[arg(long)]
    pub playlist_concurrency: Option<usize>,

    /// Maximum length of generated file names, 0 for no limit.
    #[arg(long)]
    pub file_name_length: Option<usize>,

    /// Cookie header sent with every request.
    #[arg(short = 'k', long, env = "SEGDL_COOKIE")]
    pub cookie: Option<String>,

    /// Fixed Referer header.
    #[arg(short, long)]
    pub refer: Option<String>,

    /// User-Agent header.
    #[arg(short = 'u', long = "user-agent", env = "SEGDL_USER_AGENT")]
    pub user_agent: Option<String>,

    /// aria2 RPC secret.
    #[arg(long, env = "SEGDL_ARIA2_TOKEN")]
    pub aria2_token: Option<String>,

    /// aria2 RPC address, host:port.
    #[arg(long)]
    pub aria2_addr: Option<String>,

    /// aria2 RPC scheme, http or https.
    #[arg(long = "aria2-method")]
    pub aria2_scheme: Option<String>,

    /// Path to configuration file.
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Hide progress bars and the banner.
    #[arg(long, short)]
    pub silent: bool,

    /// Enable debug logging.
    #[arg(long)]
    pub debug: bool,
}

/// CLI delivery mode argument.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum DeliveryModeArg {
    /// Concurrent ranged requests with on-disk progress.
    Segmented,
    /// One resumable request per file.
    Single,
    /// Hand the URLs to an aria2 daemon.
    Aria2,
}

impl From<DeliveryModeArg> for DeliveryMode {
    fn from(arg: DeliveryModeArg) -> Self {
        match arg {
            DeliveryModeArg::Segmented => DeliveryMode::Segmented,
            DeliveryModeArg::Single => DeliveryMode::Single,
            DeliveryModeArg::Aria2 => DeliveryMode::Delegate,
        }
    }
}

impl Args {
    /// Merge CLI arguments into an existing config, overriding where specified.
    pub fn merge_into_config(self, config: &mut Config) {
        let download = &mut config.download;

        if let Some(dir) = self.output_path {
            download.output_directory = Some(dir);
        }
        if let Some(mode) = self.mode {
            download.mode = mode.into();
        }
        if let Some(threads) = self.thread_number {
            download.thread_number = threads;
        }
        if let Some(chunk) = self.chunk_size_mb {
            download.chunk_size_mb = chunk;
        }
        if let Some(retries) = self.retry_times {
            download.retry_times = retries;
            config.request.retry_times = retries;
        }
        if let Some(delay) = self.retry_delay_ms {
            download.retry_delay_ms = delay;
            config.request.retry_delay_ms = delay;
        }
        if let Some(concurrency) = self.playlist_concurrency {
            download.playlist_concurrency = concurrency;
        }
        if let Some(length) = self.file_name_length {
            download.file_name_length = length;
        }
        if let Some(stream) = self.stream {
            download.stream = Some(stream);
        }

        // Boolean flags (only override if set to non-default)
        if self.audio_only {
            download.audio_only = true;
        }
        if self.caption {
            download.caption = true;
        }
        if self.silent {
            download.silent = true;
        }

        if let Some(cookie) = self.cookie {
            config.request.cookie = Some(cookie);
        }
        if let Some(refer) = self.refer {
            config.request.refer = Some(refer);
        }
        if let Some(user_agent) = self.user_agent {
            config.request.user_agent = Some(user_agent);
        }

        if let Some(token) = self.aria2_token {
            config.aria2.token = token;
        }
        if let Some(addr) = self.aria2_addr {
            config.aria2.addr = Some(addr);
        }
        if let Some(scheme) = self.aria2_scheme {
            config.aria2.scheme = scheme;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let args = Args::parse_from([
            "segdl",
            "https://cdn.example/a.mp4",
            "-n",
            "8",
            "--mode",
            "aria2",
            "--aria2-addr",
            "localhost:6800",
            "--retry",
            "5",
            "-C",
        ]);
        let mut config = Config::default();
        args.merge_into_config(&mut config);

        assert_eq!(config.download.thread_number, 8);
        assert_eq!(config.download.mode, DeliveryMode::Delegate);
        assert_eq!(config.aria2.addr.as_deref(), Some("localhost:6800"));
        assert_eq!(config.download.retry_times, 5);
        assert_eq!(config.request.retry_times, 5);
        assert!(config.download.caption);
        assert!(!config.download.audio_only);
    }

    #[test]
    fn test_url_or_manifest_required() {
        assert!(Args::try_parse_from(["segdl"]).is_err());
        assert!(Args::try_parse_from(["segdl", "-m", "items.json"]).is_ok());
        assert!(Args::try_parse_from(["segdl", "https://x/a", "-m", "items.json"]).is_err());
    }
}
