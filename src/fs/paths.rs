//! Path and directory management.

use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::fs::naming::file_name;

/// Suffix of files that are still being written.
pub const TEMP_SUFFIX: &str = "download";

/// Full path of `<name>.<ext>` inside `output_dir`.
///
/// With `escape` the name goes through [`file_name`]; otherwise it is used
/// as given. The directory must already exist.
pub fn file_path(
    name: &str,
    ext: &str,
    max_len: usize,
    output_dir: &Path,
    escape: bool,
) -> Result<PathBuf> {
    if !output_dir.as_os_str().is_empty() && !output_dir.is_dir() {
        return Err(Error::io_at(
            format!("output directory {}", output_dir.display()),
            std::io::Error::from(ErrorKind::NotFound),
        ));
    }

    let name = if escape {
        file_name(name, ext, max_len)?
    } else if ext.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", name, ext)
    };
    Ok(output_dir.join(name))
}

/// Size of the file at `path`, or `None` when it does not exist.
pub async fn file_size(path: &Path) -> Result<Option<u64>> {
    match tokio::fs::metadata(path).await {
        Ok(meta) => Ok(Some(meta.len())),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::io_at(format!("stat {}", path.display()), e)),
    }
}

/// `<path>.download`: where a whole file or a segment merge is written before
/// being renamed into place.
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(".");
    name.push(TEMP_SUFFIX);
    PathBuf::from(name)
}

/// `<stem>.download.<ext>`: output of the external muxer, which picks the
/// container from the extension.
pub fn mux_temp_path(path: &Path) -> PathBuf {
    let stem = path.file_stem().map(OsString::from).unwrap_or_default();
    let mut name = stem;
    name.push(".");
    name.push(TEMP_SUFFIX);
    if let Some(ext) = path.extension() {
        name.push(".");
        name.push(ext);
    }
    path.with_file_name(name)
}

/// Ensure a directory exists, creating it if necessary.
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)
            .map_err(|e| Error::io_at(format!("create directory {}", path.display()), e))?;
    }
    Ok(())
}

/// Remove a file, treating a missing file as already removed.
pub async fn remove_if_exists(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::io_at(format!("remove {}", path.display()), e)),
    }
}
