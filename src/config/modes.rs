//! Delivery mode definitions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How the parts of a stream are fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    /// Split each part into concurrent ranged segments (default).
    #[default]
    Segmented,
    /// Fetch each part as one resumable stream.
    Single,
    /// Hand the URLs to an aria2 daemon.
    Delegate,
}

impl fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryMode::Segmented => write!(f, "segmented"),
            DeliveryMode::Single => write!(f, "single"),
            DeliveryMode::Delegate => write!(f, "delegate"),
        }
    }
}

impl FromStr for DeliveryMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "segmented" | "multi" => Ok(DeliveryMode::Segmented),
            "single" => Ok(DeliveryMode::Single),
            "delegate" | "aria2" => Ok(DeliveryMode::Delegate),
            _ => Err(format!("Unknown delivery mode: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_aliases() {
        assert_eq!("aria2".parse::<DeliveryMode>(), Ok(DeliveryMode::Delegate));
        assert_eq!("Single".parse::<DeliveryMode>(), Ok(DeliveryMode::Single));
        assert!("bogus".parse::<DeliveryMode>().is_err());
        assert_eq!(DeliveryMode::Segmented.to_string(), "segmented");
    }
}
