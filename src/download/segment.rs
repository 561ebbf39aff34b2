//! Segment files: a fixed binary header followed by the payload bytes fetched so far.
//!
//! A segment of `final.mp4` lives next to it as `final.mp4.part<index>`, where
//! `<index>` is the fractional sort key rendered with six decimals. The header is
//! `{index: f32, start: i64, end: i64, cursor: i64}` in little-endian order and is
//! written once, when the file is created. The cursor stored in the header is not
//! trusted on resume; progress is derived from the file length instead.

use std::cmp::Ordering;
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use regex::Regex;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::{Error, Result};

/// Size of the encoded [`SegmentMeta`] header in bytes.
pub const HEADER_SIZE: u64 = 4 + 8 + 8 + 8;

/// Offset subtracted from a neighbour's index when a gap segment is inserted.
pub const INDEX_EPSILON: f32 = 0.000_001;

/// Fractional sort key of a segment.
///
/// Segments planned together get 0, 1, 2, ...; a segment patched into a gap later
/// gets a key strictly between its neighbours so nothing on disk is renamed.
#[derive(Debug, Clone, Copy)]
pub struct SegmentIndex(f32);

impl SegmentIndex {
    pub fn new(value: f32) -> Self {
        Self(value)
    }

    pub fn value(self) -> f32 {
        self.0
    }

    /// The key following this one, used when appending a tail segment.
    pub fn next(self) -> Self {
        Self((self.0 + 1.0).floor())
    }

    /// A key strictly between `before` (if any) and `after`.
    ///
    /// Prefers `after - INDEX_EPSILON` and falls back to the midpoint when float
    /// precision makes that collide with a neighbour. Fails when neither lies
    /// strictly between the two.
    pub fn between(before: Option<SegmentIndex>, after: SegmentIndex) -> Result<Self> {
        // The key must also render differently, since it names the file.
        let fits = |candidate: f32| {
            let rendered = Self(candidate).to_string();
            candidate.is_finite()
                && candidate < after.0
                && rendered != after.to_string()
                && before.map_or(true, |b| candidate > b.0 && rendered != b.to_string())
        };

        let candidate = after.0 - INDEX_EPSILON;
        if fits(candidate) {
            return Ok(Self(candidate));
        }

        let fallback = match before {
            Some(b) => b.0 + (after.0 - b.0) / 2.0,
            None => after.0 - 1.0,
        };
        if fits(fallback) {
            return Ok(Self(fallback));
        }

        Err(Error::IndexExhausted { before, after })
    }
}

impl PartialEq for SegmentIndex {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SegmentIndex {}

impl PartialOrd for SegmentIndex {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SegmentIndex {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl fmt::Display for SegmentIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}", self.0)
    }
}

/// Persisted description of one segment.
///
/// Invariant: `start <= cursor <= end + 1`; `cursor == end + 1` means complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentMeta {
    pub index: SegmentIndex,
    pub start: i64,
    pub end: i64,
    pub cursor: i64,
}

impl SegmentMeta {
    /// A segment with nothing downloaded yet.
    pub fn new(index: SegmentIndex, start: i64, end: i64) -> Self {
        Self {
            index,
            start,
            end,
            cursor: start,
        }
    }

    /// Number of bytes the segment covers.
    pub fn len(&self) -> i64 {
        self.end - self.start + 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() <= 0
    }

    /// Bytes already on disk.
    pub fn downloaded(&self) -> i64 {
        self.cursor - self.start
    }

    pub fn is_complete(&self) -> bool {
        self.cursor == self.end + 1
    }

    /// More bytes on disk than the range allows.
    pub fn is_overshot(&self) -> bool {
        self.cursor > self.end + 1
    }

    pub fn encode(&self) -> [u8; HEADER_SIZE as usize] {
        let mut buf = [0u8; HEADER_SIZE as usize];
        buf[0..4].copy_from_slice(&self.index.value().to_le_bytes());
        buf[4..12].copy_from_slice(&self.start.to_le_bytes());
        buf[12..20].copy_from_slice(&self.end.to_le_bytes());
        buf[20..28].copy_from_slice(&self.cursor.to_le_bytes());
        buf
    }

    pub fn decode(buf: &[u8; HEADER_SIZE as usize]) -> Self {
        let mut f = [0u8; 4];
        let mut w = [0u8; 8];
        f.copy_from_slice(&buf[0..4]);
        let index = SegmentIndex::new(f32::from_le_bytes(f));
        w.copy_from_slice(&buf[4..12]);
        let start = i64::from_le_bytes(w);
        w.copy_from_slice(&buf[12..20]);
        let end = i64::from_le_bytes(w);
        w.copy_from_slice(&buf[20..28]);
        let cursor = i64::from_le_bytes(w);
        Self {
            index,
            start,
            end,
            cursor,
        }
    }
}

/// Path of the segment file for `index` next to `final_path`.
pub fn segment_path(final_path: &Path, index: SegmentIndex) -> PathBuf {
    let mut name = final_path.as_os_str().to_owned();
    name.push(format!(".part{}", index));
    PathBuf::from(name)
}

/// Read every segment file belonging to `final_path`, sorted by index.
///
/// Each segment's cursor is recomputed from the file length.
pub async fn scan(final_path: &Path) -> Result<Vec<SegmentMeta>> {
    let file_name = final_path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::InvalidFilename(final_path.display().to_string()))?;
    let dir = match final_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let pattern = Regex::new(&format!(r"^{}\.part-?\d+\.\d+$", regex::escape(file_name)))
        .map_err(|e| Error::Config(format!("Invalid segment pattern: {}", e)))?;

    let mut entries = match fs::read_dir(&dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(Error::io_at(format!("read dir {}", dir.display()), e)),
    };

    let mut metas = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| Error::io_at(format!("read dir {}", dir.display()), e))?
    {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if !pattern.is_match(name) {
            continue;
        }
        metas.push(read_meta(&entry.path()).await?);
    }

    metas.sort_by_key(|m| m.index);
    Ok(metas)
}

/// Parse the header of one segment file and derive its cursor.
pub async fn read_meta(path: &Path) -> Result<SegmentMeta> {
    let mut file = File::open(path)
        .await
        .map_err(|e| Error::io_at(format!("open segment {}", path.display()), e))?;
    let size = file
        .metadata()
        .await
        .map_err(|e| Error::io_at(format!("stat segment {}", path.display()), e))?
        .len();

    let mut buf = [0u8; HEADER_SIZE as usize];
    match file.read_exact(&mut buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
            return Err(Error::CorruptSegment(path.to_path_buf()))
        }
        Err(e) => return Err(Error::io_at(format!("read segment {}", path.display()), e)),
    }

    let mut meta = SegmentMeta::decode(&buf);
    meta.cursor = i64::try_from(size - HEADER_SIZE)
        .ok()
        .and_then(|payload| meta.start.checked_add(payload))
        .ok_or_else(|| Error::CorruptSegment(path.to_path_buf()))?;
    Ok(meta)
}

/// Open a segment file for appending, writing the header if the file is new.
pub async fn open_for_append(final_path: &Path, meta: &SegmentMeta) -> Result<File> {
    let path = segment_path(final_path, meta.index);
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .await
        .map_err(|e| Error::io_at(format!("open segment {}", path.display()), e))?;

    let len = file
        .metadata()
        .await
        .map_err(|e| Error::io_at(format!("stat segment {}", path.display()), e))?
        .len();
    if len == 0 {
        let header = SegmentMeta::new(meta.index, meta.start, meta.end);
        file.write_all(&header.encode())
            .await
            .map_err(|e| Error::io_at(format!("write header {}", path.display()), e))?;
        file.flush()
            .await
            .map_err(|e| Error::io_at(format!("write header {}", path.display()), e))?;
    }

    Ok(file)
}

/// Delete a segment file, ignoring files that are already gone.
pub async fn remove(final_path: &Path, index: SegmentIndex) -> Result<()> {
    let path = segment_path(final_path, index);
    match fs::remove_file(&path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::io_at(format!("remove segment {}", path.display()), e)),
    }
}

/// Write a segment file with the given header and payload, for test fixtures.
#[cfg(test)]
pub(crate) async fn write_segment(final_path: &Path, meta: SegmentMeta, payload: &[u8]) {
    let mut bytes = meta.encode().to_vec();
    bytes.extend_from_slice(payload);
    fs::write(segment_path(final_path, meta.index), bytes)
        .await
        .unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_header_layout_is_little_endian() {
        let meta = SegmentMeta {
            index: SegmentIndex::new(2.0),
            start: 1,
            end: 0x0102,
            cursor: 7,
        };
        let buf = meta.encode();
        assert_eq!(buf.len(), 28);
        assert_eq!(&buf[0..4], &2.0f32.to_le_bytes());
        assert_eq!(buf[4], 1);
        assert_eq!(buf[12], 0x02);
        assert_eq!(buf[13], 0x01);
        assert_eq!(SegmentMeta::decode(&buf), meta);
    }

    #[test]
    fn test_segment_path_uses_six_decimals() {
        let path = segment_path(Path::new("/out/clip.mp4"), SegmentIndex::new(3.0));
        assert_eq!(path, PathBuf::from("/out/clip.mp4.part3.000000"));

        let patched = SegmentIndex::between(Some(SegmentIndex::new(1.0)), SegmentIndex::new(2.0))
            .unwrap();
        let path = segment_path(Path::new("clip.mp4"), patched);
        assert_eq!(path, PathBuf::from("clip.mp4.part1.999999"));
    }

    #[test]
    fn test_between_prefers_epsilon_below_next() {
        let idx = SegmentIndex::between(Some(SegmentIndex::new(1.0)), SegmentIndex::new(2.0))
            .unwrap();
        assert!(idx > SegmentIndex::new(1.0));
        assert!(idx < SegmentIndex::new(2.0));
        assert!((idx.value() - (2.0 - INDEX_EPSILON)).abs() < f32::EPSILON * 4.0);
    }

    #[test]
    fn test_between_falls_back_to_midpoint_on_precision_loss() {
        // 1e-6 is below the spacing of f32 around 1000.
        let before = SegmentIndex::new(999.0);
        let after = SegmentIndex::new(1000.0);
        let idx = SegmentIndex::between(Some(before), after).unwrap();
        assert!(idx > before && idx < after);
        assert_eq!(idx.value(), 999.5);
    }

    #[test]
    fn test_between_reports_exhaustion() {
        let after = SegmentIndex::new(1.0);
        let before = SegmentIndex::new(f32::from_bits(after.value().to_bits() - 1));
        assert!(matches!(
            SegmentIndex::between(Some(before), after),
            Err(Error::IndexExhausted { .. })
        ));
    }

    #[test]
    fn test_between_without_predecessor() {
        let idx = SegmentIndex::between(None, SegmentIndex::new(0.0)).unwrap();
        assert!(idx < SegmentIndex::new(0.0));
    }

    #[tokio::test]
    async fn test_scan_sorts_and_derives_cursor() {
        let dir = TempDir::new().unwrap();
        let final_path = dir.path().join("movie.mp4");

        write_segment(
            &final_path,
            SegmentMeta::new(SegmentIndex::new(1.0), 10, 19),
            b"abc",
        )
        .await;
        write_segment(
            &final_path,
            SegmentMeta::new(SegmentIndex::new(0.0), 0, 9),
            b"0123456789",
        )
        .await;
        // Not ours: different base name.
        write_segment(
            &dir.path().join("movie.mp4x"),
            SegmentMeta::new(SegmentIndex::new(0.0), 0, 9),
            b"",
        )
        .await;

        let metas = scan(&final_path).await.unwrap();
        assert_eq!(metas.len(), 2);
        assert_eq!(metas[0].index, SegmentIndex::new(0.0));
        assert!(metas[0].is_complete());
        assert_eq!(metas[1].cursor, 13);
        assert!(!metas[1].is_complete());
    }

    #[tokio::test]
    async fn test_truncated_header_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let final_path = dir.path().join("a.bin");
        fs::write(segment_path(&final_path, SegmentIndex::new(0.0)), [1u8, 2, 3])
            .await
            .unwrap();

        assert!(matches!(
            scan(&final_path).await,
            Err(Error::CorruptSegment(_))
        ));
    }

    #[tokio::test]
    async fn test_overflowing_start_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let final_path = dir.path().join("a.bin");
        let meta = SegmentMeta::new(SegmentIndex::new(0.0), i64::MAX, i64::MAX);
        write_segment(&final_path, meta, b"xy").await;

        assert!(matches!(
            read_meta(&segment_path(&final_path, meta.index)).await,
            Err(Error::CorruptSegment(_))
        ));
    }

    #[tokio::test]
    async fn test_header_written_only_once() {
        let dir = TempDir::new().unwrap();
        let final_path = dir.path().join("a.bin");
        let meta = SegmentMeta::new(SegmentIndex::new(0.0), 0, 99);

        let file = open_for_append(&final_path, &meta).await.unwrap();
        drop(file);
        let mut file = open_for_append(&final_path, &meta).await.unwrap();
        file.write_all(b"xy").await.unwrap();
        file.flush().await.unwrap();
        drop(file);

        let on_disk = read_meta(&segment_path(&final_path, meta.index))
            .await
            .unwrap();
        assert_eq!(on_disk.cursor, 2);
        assert_eq!(on_disk.end, 99);
    }
}
