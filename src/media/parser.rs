//! Loading resolver output and resolving plain URLs.

use std::collections::BTreeMap;
use std::path::Path;

use crate::config::need_download_list;
use crate::error::{Error, Result};
use crate::http::HttpClient;
use crate::media::item::{Data, DataType, Part, Stream};

/// Stream id used for items resolved from a plain URL.
pub const DEFAULT_STREAM_ID: &str = "default";

/// Read a resolver manifest: one JSON item or an array of items.
pub fn load_manifest(path: &Path) -> Result<Vec<Data>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::io_at(format!("read manifest {}", path.display()), e))?;
    parse_manifest(&content)
}

/// Parse resolver output and fill in derived stream fields.
pub fn parse_manifest(content: &str) -> Result<Vec<Data>> {
    let value: serde_json::Value = serde_json::from_str(content)?;
    let mut items: Vec<Data> = if value.is_array() {
        serde_json::from_value(value)?
    } else {
        vec![serde_json::from_value(value)?]
    };

    if items.is_empty() {
        return Err(Error::Resolver("Manifest contains no items".into()));
    }
    for item in &mut items {
        item.fill_streams_data();
    }
    Ok(items)
}

/// Build an item for a URL that points straight at a file.
///
/// Size comes from `Content-Length`; the name and extension from the URL path,
/// falling back to the `Content-Type` when the path has no extension.
pub async fn resolve_direct(client: &HttpClient, url: &str) -> Result<Data> {
    let (name, ext, data_type) = match name_and_ext(url)? {
        (name, Some(ext)) => {
            let mime = mime_guess::from_ext(&ext).first_raw().unwrap_or_default();
            (name, ext, data_type_for(mime))
        }
        (name, None) => {
            let content_type = client.content_type(url, url).await?;
            (name, extension_for(&content_type), data_type_for(&content_type))
        }
    };

    let size = match client.content_length(url, url).await {
        Ok(size) => size as i64,
        Err(e) => {
            tracing::warn!("Unknown size for {}: {}", url, e);
            0
        }
    };

    let mut streams = BTreeMap::new();
    streams.insert(
        DEFAULT_STREAM_ID.to_string(),
        Stream {
            parts: vec![Part {
                url: url.to_string(),
                size,
                ext: ext.clone(),
            }],
            ext,
            ..Default::default()
        },
    );

    let mut data = Data {
        url: url.to_string(),
        site: url::Url::parse(url)?.host_str().unwrap_or_default().to_string(),
        title: name,
        data_type,
        streams,
        captions: BTreeMap::new(),
    };
    data.fill_streams_data();
    Ok(data)
}

/// Keep the playlist items selected by `items` or `item_start..=item_end`.
///
/// Without `playlist` only the first item is kept.
pub fn select_items(
    items: Vec<Data>,
    playlist: bool,
    expression: &str,
    item_start: usize,
    item_end: usize,
) -> Result<Vec<Data>> {
    if !playlist {
        return Ok(items.into_iter().take(1).collect());
    }

    let wanted = need_download_list(expression, item_start, item_end, items.len())?;
    Ok(items
        .into_iter()
        .enumerate()
        .filter(|(i, _)| wanted.contains(&(i + 1)))
        .map(|(_, item)| item)
        .collect())
}

/// File name and extension from the last path segment of `url`.
fn name_and_ext(url: &str) -> Result<(String, Option<String>)> {
    let parsed = url::Url::parse(url)?;
    let last = parsed
        .path_segments()
        .and_then(|segments| segments.last())
        .unwrap_or_default();

    let mut pieces = last.split('.');
    let name = pieces.next().unwrap_or_default();
    let name = if name.is_empty() {
        parsed.host_str().unwrap_or("download").to_string()
    } else {
        name.to_string()
    };
    let ext = pieces.next().filter(|e| !e.is_empty()).map(str::to_string);
    Ok((name, ext))
}

fn data_type_for(mime: &str) -> DataType {
    match mime.split('/').next() {
        Some("image") => DataType::Image,
        Some("audio") => DataType::Audio,
        _ => DataType::Video,
    }
}

fn extension_for(content_type: &str) -> String {
    mime_guess::get_mime_extensions_str(content_type)
        .and_then(|exts| exts.first())
        .map(|ext| ext.to_string())
        .unwrap_or_else(|| {
            content_type
                .split('/')
                .nth(1)
                .unwrap_or("bin")
                .to_string()
        })
}
