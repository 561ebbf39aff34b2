//! External muxer used to join the parts of multi-part streams.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::fs;
use tokio::process::Command;

use crate::error::{Error, Result};
use crate::fs::remove_if_exists;

/// Joins separately downloaded part files into one media file.
#[async_trait]
pub trait Muxer: Send + Sync {
    /// Join parts that are consecutive pieces of the same encoding.
    async fn concat(&self, inputs: &[PathBuf], output: &Path) -> Result<()>;

    /// Combine parts that are separate tracks, e.g. video and audio.
    async fn mux(&self, inputs: &[PathBuf], output: &Path) -> Result<()>;
}

/// [`Muxer`] backed by the `ffmpeg` binary.
#[derive(Debug, Clone)]
pub struct FfmpegMuxer {
    binary: PathBuf,
}

impl FfmpegMuxer {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Prefer an `ffmpeg` next to the working directory, else the one on `PATH`.
    pub fn locate() -> Self {
        let name = if cfg!(windows) { "ffmpeg.exe" } else { "ffmpeg" };
        let local = Path::new(".").join(name);
        if local.is_file() {
            Self::new(local)
        } else {
            Self::new(name)
        }
    }

    async fn run(&self, args: Vec<String>) -> Result<()> {
        tracing::debug!("{} {}", self.binary.display(), args.join(" "));

        let output = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::FFmpegNotFound
                } else {
                    Error::FFmpeg(format!("Failed to run ffmpeg: {}", e))
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail = stderr.lines().last().unwrap_or_default();
            return Err(Error::FFmpeg(format!(
                "ffmpeg exited with status {}: {}",
                output.status, tail
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Muxer for FfmpegMuxer {
    async fn concat(&self, inputs: &[PathBuf], output: &Path) -> Result<()> {
        let concat_list = output.with_extension("ffc");
        fs::write(&concat_list, concat_list_content(inputs).await?)
            .await
            .map_err(|e| Error::io_at(format!("write {}", concat_list.display()), e))?;

        let args = vec![
            "-y".to_string(),
            "-f".into(),
            "concat".into(),
            "-safe".into(),
            "0".into(),
            "-i".into(),
            path_arg(&concat_list)?,
            "-c".into(),
            "copy".into(),
            "-bsf:a".into(),
            "aac_adtstoasc".into(),
            path_arg(output)?,
        ];
        let result = self.run(args).await;

        remove_if_exists(&concat_list).await?;
        result
    }

    async fn mux(&self, inputs: &[PathBuf], output: &Path) -> Result<()> {
        let mut args = vec!["-y".to_string()];
        for input in inputs {
            args.push("-i".into());
            args.push(path_arg(input)?);
        }
        args.extend(["-c:v", "copy", "-c:a", "copy"].map(String::from));
        args.push(path_arg(output)?);

        self.run(args).await
    }
}

/// Concat demuxer list: one `file '<path>'` line per input.
///
/// ffmpeg resolves relative entries against the list's own directory, so every
/// input is written as an absolute path.
async fn concat_list_content(inputs: &[PathBuf]) -> Result<String> {
    let mut content = String::new();
    for input in inputs {
        let absolute = fs::canonicalize(input)
            .await
            .map_err(|e| Error::io_at(format!("resolve {}", input.display()), e))?;
        content.push_str(&concat_list_line(&absolute));
    }
    Ok(content)
}

fn concat_list_line(path: &Path) -> String {
    let escaped = path.display().to_string().replace('\'', r"'\''");
    format!("file '{}'\n", escaped)
}

fn path_arg(path: &Path) -> Result<String> {
    path.to_str()
        .map(str::to_string)
        .ok_or_else(|| Error::InvalidFilename(format!("{} is not valid UTF-8", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concat_list_escapes_quotes() {
        assert_eq!(concat_list_line(Path::new("/out/a[0].ts")), "file '/out/a[0].ts'\n");
        assert_eq!(
            concat_list_line(Path::new("/out/it's[1].ts")),
            "file '/out/it'\\''s[1].ts'\n"
        );
    }

    #[tokio::test]
    async fn test_concat_list_uses_absolute_paths_for_relative_dir() {
        let dir = tempfile::tempdir_in(".").unwrap();
        let relative = PathBuf::from(dir.path().file_name().unwrap());
        let inputs = vec![relative.join("show[0].ts"), relative.join("show[1].ts")];
        for input in &inputs {
            fs::write(input, b"ts").await.unwrap();
        }

        let content = concat_list_content(&inputs).await.unwrap();

        let absolute = std::fs::canonicalize(dir.path()).unwrap();
        let expected = format!(
            "file '{}'\nfile '{}'\n",
            absolute.join("show[0].ts").display(),
            absolute.join("show[1].ts").display()
        );
        assert_eq!(content, expected);
    }

    #[tokio::test]
    async fn test_missing_input_fails_before_running_ffmpeg() {
        let muxer = FfmpegMuxer::new("/nonexistent/ffmpeg-binary");
        let dir = tempfile::tempdir().unwrap();
        let err = muxer
            .concat(&[dir.path().join("gone[0].ts")], &dir.path().join("out.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::IoAt { .. }));
        assert!(!dir.path().join("out.ffc").exists());
    }

    #[tokio::test]
    async fn test_missing_binary_is_reported() {
        let muxer = FfmpegMuxer::new("/nonexistent/ffmpeg-binary");
        let dir = tempfile::tempdir().unwrap();
        let err = muxer
            .mux(&[dir.path().join("a.m4s")], &dir.path().join("out.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::FFmpegNotFound));
    }
}
