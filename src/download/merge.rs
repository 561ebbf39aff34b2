//! Turning finished segments and parts into the final file.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use tokio::fs::{self, File};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::download::mux::Muxer;
use crate::download::planner::SegmentPlan;
use crate::download::segment::{self, segment_path, HEADER_SIZE};
use crate::error::{Error, Result};
use crate::fs::{mux_temp_path, remove_if_exists, temp_path};

/// Concatenate the payloads of a complete plan into `final_path`.
///
/// Segments are read in ascending index order, whatever order they were
/// written in. Every segment file must hold exactly its range, otherwise
/// nothing is written. Segment files are deleted only after the merged file has
/// been renamed into place.
pub async fn concat_segments(
    final_path: &Path,
    plan: &SegmentPlan,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut segments = plan.segments.clone();
    segments.sort_by_key(|s| s.index);

    for seg in &segments {
        let path = segment_path(final_path, seg.index);
        let size = fs::metadata(&path)
            .await
            .map_err(|e| Error::io_at(format!("stat segment {}", path.display()), e))?
            .len();
        let expected = HEADER_SIZE + seg.len() as u64;
        if size != expected {
            return Err(Error::Merge(format!(
                "segment {} holds {} bytes, expected {}",
                path.display(),
                size,
                expected
            )));
        }
    }

    let temp = temp_path(final_path);
    if let Err(e) = write_payloads(final_path, &temp, &segments, cancel).await {
        remove_if_exists(&temp).await?;
        return Err(e);
    }

    fs::rename(&temp, final_path).await.map_err(|e| {
        Error::io_at(
            format!("rename {} to {}", temp.display(), final_path.display()),
            e,
        )
    })?;

    for seg in &segments {
        segment::remove(final_path, seg.index).await?;
    }
    tracing::debug!(
        "Merged {} segment(s) into {}",
        segments.len(),
        final_path.display()
    );
    Ok(())
}

async fn write_payloads(
    final_path: &Path,
    temp: &Path,
    segments: &[segment::SegmentMeta],
    cancel: &CancellationToken,
) -> Result<()> {
    let mut out = File::create(temp)
        .await
        .map_err(|e| Error::io_at(format!("create {}", temp.display()), e))?;

    for seg in segments {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let path = segment_path(final_path, seg.index);
        let mut input = File::open(&path)
            .await
            .map_err(|e| Error::io_at(format!("open segment {}", path.display()), e))?;
        input
            .seek(SeekFrom::Start(HEADER_SIZE))
            .await
            .map_err(|e| Error::io_at(format!("seek segment {}", path.display()), e))?;
        tokio::io::copy(&mut input, &mut out)
            .await
            .map_err(|e| Error::io_at(format!("copy segment {}", path.display()), e))?;
    }

    out.flush()
        .await
        .map_err(|e| Error::io_at(format!("flush {}", temp.display()), e))?;
    Ok(())
}

/// Join the downloaded part files of a multi-part stream into `output`.
///
/// With `mux` the parts are treated as separate tracks, otherwise as pieces of
/// one encoding. The muxer writes to `<stem>.download.<ext>`; the part files are
/// deleted once that has been renamed to `output`.
pub async fn merge_parts(
    muxer: &dyn Muxer,
    inputs: &[PathBuf],
    output: &Path,
    mux: bool,
) -> Result<()> {
    let temp = mux_temp_path(output);
    let result = if mux {
        muxer.mux(inputs, &temp).await
    } else {
        muxer.concat(inputs, &temp).await
    };
    if let Err(e) = result {
        remove_if_exists(&temp).await?;
        return Err(e);
    }

    fs::rename(&temp, output).await.map_err(|e| {
        Error::io_at(
            format!("rename {} to {}", temp.display(), output.display()),
            e,
        )
    })?;

    for input in inputs {
        remove_if_exists(input).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::download::planner::fresh_plan;
    use crate::download::segment::{write_segment, SegmentIndex, SegmentMeta};

    #[tokio::test]
    async fn test_concat_orders_by_index_not_creation() {
        let dir = tempfile::tempdir().unwrap();
        let final_path = dir.path().join("clip.bin");

        let first = SegmentMeta::new(SegmentIndex::new(0.0), 0, 2);
        let patch = SegmentMeta::new(SegmentIndex::new(1.0 - 0.000_001), 3, 4);
        let last = SegmentMeta::new(SegmentIndex::new(1.0), 5, 6);

        // written last-to-first on purpose
        write_segment(&final_path, last, b"fg").await;
        write_segment(&final_path, patch, b"de").await;
        write_segment(&final_path, first, b"abc").await;

        let plan = SegmentPlan {
            segments: vec![last, first, patch],
            total_size: 7,
        };
        concat_segments(&final_path, &plan, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(tokio::fs::read(&final_path).await.unwrap(), b"abcdefg");
        assert!(segment::scan(&final_path).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_incomplete_segment_aborts_merge_and_keeps_files() {
        let dir = tempfile::tempdir().unwrap();
        let final_path = dir.path().join("clip.bin");
        let plan = fresh_plan(8, 2);

        write_segment(&final_path, plan.segments[0], b"abcd").await;
        write_segment(&final_path, plan.segments[1], b"ef").await;

        let err = concat_segments(&final_path, &plan, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Merge(_)));
        assert!(!final_path.exists());
        assert_eq!(segment::scan(&final_path).await.unwrap().len(), 2);
    }

    #[derive(Default)]
    struct RecordingMuxer {
        calls: Mutex<Vec<(&'static str, usize)>>,
    }

    #[async_trait]
    impl Muxer for RecordingMuxer {
        async fn concat(&self, inputs: &[PathBuf], output: &Path) -> Result<()> {
            self.calls.lock().unwrap().push(("concat", inputs.len()));
            tokio::fs::write(output, b"joined").await.map_err(Error::from)
        }

        async fn mux(&self, inputs: &[PathBuf], output: &Path) -> Result<()> {
            self.calls.lock().unwrap().push(("mux", inputs.len()));
            tokio::fs::write(output, b"muxed").await.map_err(Error::from)
        }
    }

    #[tokio::test]
    async fn test_merge_parts_renames_and_removes_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let inputs = vec![dir.path().join("v[0].m4s"), dir.path().join("v[1].m4s")];
        for input in &inputs {
            tokio::fs::write(input, b"x").await.unwrap();
        }
        let output = dir.path().join("v.mp4");
        let muxer = RecordingMuxer::default();

        merge_parts(&muxer, &inputs, &output, true).await.unwrap();

        assert_eq!(tokio::fs::read(&output).await.unwrap(), b"muxed");
        assert!(inputs.iter().all(|p| !p.exists()));
        assert_eq!(*muxer.calls.lock().unwrap(), vec![("mux", 2)]);
    }
}
