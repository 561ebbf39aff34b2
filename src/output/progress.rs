//! Progress bar utilities.

use indicatif::{ProgressBar, ProgressStyle};

/// Create a byte progress bar for one download.
pub fn create_download_bar(total: u64, title: &str) -> ProgressBar {
    let bar = ProgressBar::new(total);
    let style = ProgressStyle::default_bar()
        .template(
            "{spinner:.green} {msg:30!} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    bar.set_style(style);
    bar.set_message(title.to_string());
    bar
}
