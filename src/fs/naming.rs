//! Filename generation and manipulation.

use crate::error::{Error, Result};

/// Turn a title into a filename, optionally with an extension.
///
/// Newlines and `/` become spaces, `|` becomes `-` and colons become full-width
/// colons. On Windows the remaining reserved characters become spaces too. The
/// name is then limited to `max_len` characters (0 = unlimited).
pub fn file_name(name: &str, ext: &str, max_len: usize) -> Result<String> {
    let name = name
        .replace('\n', " ")
        .replace('/', " ")
        .replace('|', "-")
        .replace(": ", "\u{ff1a}")
        .replace(':', "\u{ff1a}")
        .replace('\'', "\u{2019}");

    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '"' | '?' | '*' | '\\' | '<' | '>' if cfg!(windows) => ' ',
            c if c.is_control() => ' ',
            c => c,
        })
        .collect();

    if sanitized.trim().is_empty() || sanitized.trim().chars().all(|c| c == '.') {
        return Err(Error::InvalidFilename(format!(
            "'{}' does not make a usable file name",
            name
        )));
    }

    let limited = limit_length(&sanitized, max_len);
    if ext.is_empty() {
        Ok(limited)
    } else {
        Ok(format!("{}.{}", limited, ext))
    }
}

/// Name of the `index`-th part of a multi-part stream, e.g. `title[2].flv`.
pub fn part_file_name(title: &str, index: usize, ext: &str) -> String {
    format!("{}[{}].{}", title, index, ext)
}

/// Truncate `s` to `length` characters, ending in `...`. Zero means unlimited.
pub fn limit_length(s: &str, length: usize) -> String {
    const ELLIPSIS: &str = "...";

    let count = s.chars().count();
    if length == 0 || count <= length {
        return s.to_string();
    }
    if length <= ELLIPSIS.len() {
        return s.chars().take(length).collect();
    }

    let mut limited: String = s.chars().take(length - ELLIPSIS.len()).collect();
    limited.push_str(ELLIPSIS);
    limited
}
