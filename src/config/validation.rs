//! Configuration validation and playlist item selection.

use crate::config::{Config, DeliveryMode};
use crate::error::{Error, Result};

/// Validate the entire configuration.
pub fn validate_config(config: &Config) -> Result<()> {
    if config.download.thread_number == 0 {
        return Err(Error::ConfigValidation {
            field: "download.thread_number".to_string(),
            message: "At least one thread is required".to_string(),
        });
    }

    if config.download.retry_times == 0 {
        return Err(Error::ConfigValidation {
            field: "download.retry_times".to_string(),
            message: "At least one attempt is required".to_string(),
        });
    }

    if config.request.retry_times == 0 {
        return Err(Error::ConfigValidation {
            field: "request.retry_times".to_string(),
            message: "At least one attempt is required".to_string(),
        });
    }

    if config.download.playlist_concurrency == 0 {
        return Err(Error::ConfigValidation {
            field: "download.playlist_concurrency".to_string(),
            message: "Must be at least 1".to_string(),
        });
    }

    if config.download.mode == DeliveryMode::Delegate {
        validate_aria2(config)?;
    }

    Ok(())
}

fn validate_aria2(config: &Config) -> Result<()> {
    let scheme = config.aria2.scheme.as_str();
    if scheme != "http" && scheme != "https" {
        return Err(Error::ConfigValidation {
            field: "aria2.scheme".to_string(),
            message: format!("Expected http or https, got '{}'", scheme),
        });
    }

    let endpoint = config.aria2.endpoint()?;
    url::Url::parse(&endpoint)?;
    Ok(())
}

/// Resolve the playlist items to download, as 1-based indices.
///
/// A non-empty `items` expression such as `"1,5,6,8-10"` wins. Otherwise the
/// inclusive range `item_start..=item_end` is used, where `item_end == 0` means
/// the last item and a reversed range is swapped.
pub fn need_download_list(
    items: &str,
    item_start: usize,
    item_end: usize,
    length: usize,
) -> Result<Vec<usize>> {
    if !items.trim().is_empty() {
        return parse_items(items, length);
    }
    if length == 0 {
        return Ok(Vec::new());
    }

    let mut start = item_start.max(1);
    let mut end = if item_end == 0 { length } else { item_end };
    if end < start {
        std::mem::swap(&mut start, &mut end);
    }
    Ok((start..=end.min(length)).collect())
}

/// Parse an item selection expression such as `"1,5,6,8-10"`.
///
/// Ranges stop at `length`, the number of items in the playlist.
pub fn parse_items(items: &str, length: usize) -> Result<Vec<usize>> {
    let mut list = Vec::new();

    for selection in items.split(',') {
        let selection = selection.trim();
        if selection.is_empty() {
            continue;
        }

        let (start, end) = match selection.split_once('-') {
            Some((start, end)) => (parse_item(start, items)?, parse_item(end, items)?),
            None => {
                let item = parse_item(selection, items)?;
                (item, item)
            }
        };
        list.extend(start..=end.min(length));
    }

    Ok(list)
}

fn parse_item(value: &str, expression: &str) -> Result<usize> {
    value
        .trim()
        .parse::<usize>()
        .map_err(|_| Error::ConfigValidation {
            field: "items".to_string(),
            message: format!(
                "Invalid item '{}' in '{}'. Use a list like 1,5,6,8-10",
                value.trim(),
                expression
            ),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_items_expression() {
        assert_eq!(parse_items("1,5,6,8-10", 10).unwrap(), vec![1, 5, 6, 8, 9, 10]);
        assert_eq!(parse_items(" 2 , 4 - 5 ", 10).unwrap(), vec![2, 4, 5]);
        assert!(parse_items("10-8", 10).unwrap().is_empty());
    }

    #[test]
    fn test_parse_items_range_stops_at_playlist_length() {
        assert_eq!(parse_items("2-4000000000", 3).unwrap(), vec![2, 3]);
        assert!(parse_items("5-4000000000", 3).unwrap().is_empty());
    }

    #[test]
    fn test_parse_items_invalid() {
        assert!(parse_items("1,x", 5).is_err());
        assert!(parse_items("3-", 5).is_err());
    }

    #[test]
    fn test_need_download_list_range() {
        assert_eq!(need_download_list("", 0, 0, 3).unwrap(), vec![1, 2, 3]);
        assert_eq!(need_download_list("", 2, 0, 4).unwrap(), vec![2, 3, 4]);
        assert_eq!(need_download_list("", 4, 2, 9).unwrap(), vec![2, 3, 4]);
        assert!(need_download_list("", 0, 0, 0).unwrap().is_empty());
        assert!(need_download_list("", 3, 0, 0).unwrap().is_empty());
        assert_eq!(need_download_list("", 2, 50, 4).unwrap(), vec![2, 3, 4]);
        assert_eq!(need_download_list("3", 1, 2, 9).unwrap(), vec![3]);
    }

    #[test]
    fn test_zero_threads_rejected() {
        let mut config = Config::default();
        config.download.thread_number = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_delegate_requires_addr() {
        let mut config = Config::default();
        config.download.mode = DeliveryMode::Delegate;
        assert!(matches!(
            validate_config(&config),
            Err(Error::MissingConfig(_))
        ));

        config.aria2.addr = Some("localhost:6800".into());
        assert!(validate_config(&config).is_ok());

        config.aria2.scheme = "ws".into();
        assert!(validate_config(&config).is_err());
    }
}
