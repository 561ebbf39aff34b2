//! Resolver output: items, their streams and the parts making up each stream.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Extensions of container formats that are remuxed into MP4 when merged.
const MP4_REMUX_EXTENSIONS: [&str; 3] = ["ts", "flv", "f4v"];

/// One retrievable byte stream with a known size and extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Part {
    pub url: String,
    /// Total size in bytes, 0 or negative when unknown.
    #[serde(default)]
    pub size: i64,
    pub ext: String,
}

/// A caption or other side file fetched next to the media.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptionPart {
    pub url: String,
    #[serde(default)]
    pub size: i64,
    pub ext: String,
}

/// A quality variant, e.g. 720P or 1080P, made of one or more parts.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Stream {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub quality: String,
    pub parts: Vec<Part>,
    /// Total size of all parts.
    #[serde(default)]
    pub size: i64,
    /// Extension of the merged file.
    #[serde(default)]
    pub ext: String,
    /// Parts are separately encoded tracks that need an external muxer.
    #[serde(default, alias = "NeedMux")]
    pub need_mux: bool,
}

/// Type of extracted data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    #[default]
    Video,
    Image,
    Audio,
}

/// One downloadable item as produced by a resolver.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Data {
    /// The address this item was resolved from; used as the referer.
    pub url: String,
    #[serde(default)]
    pub site: String,
    pub title: String,
    #[serde(default, rename = "type")]
    pub data_type: DataType,
    #[serde(default)]
    pub streams: BTreeMap<String, Stream>,
    #[serde(default, alias = "caption")]
    pub captions: BTreeMap<String, CaptionPart>,
}

impl Data {
    /// Fill in stream fields a resolver may leave out.
    ///
    /// The id comes from the map key, quality defaults to the id, a video's
    /// extension is taken from its first part and the size is summed from the parts.
    pub fn fill_streams_data(&mut self) {
        for (id, stream) in self.streams.iter_mut() {
            stream.id = id.clone();
            if stream.quality.is_empty() {
                stream.quality = id.clone();
            }

            if self.data_type == DataType::Video && stream.ext.is_empty() {
                if let Some(first) = stream.parts.first() {
                    stream.ext = if MP4_REMUX_EXTENSIONS.contains(&first.ext.as_str()) {
                        "mp4".to_string()
                    } else {
                        first.ext.clone()
                    };
                }
            }
            if stream.ext.is_empty() {
                if let Some(first) = stream.parts.first() {
                    stream.ext = first.ext.clone();
                }
            }

            if stream.size <= 0 {
                stream.size = stream.parts.iter().map(|p| p.size.max(0)).sum();
            }
        }
    }

    /// Streams ordered from largest to smallest.
    pub fn sorted_streams(&self) -> Vec<&Stream> {
        let mut streams: Vec<&Stream> = self.streams.values().collect();
        streams.sort_by(|a, b| b.size.cmp(&a.size));
        streams
    }
}
