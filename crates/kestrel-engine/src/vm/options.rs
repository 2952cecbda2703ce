//! Runtime configuration

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Runtime configuration, loadable from JSON
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeOptions {
    /// Property count above which a hidden class becomes a dictionary
    pub dictionary_threshold: usize,

    /// Largest length a fast array may grow to
    pub fast_array_max_length: usize,

    /// Largest element storage a regular array may grow to; longer
    /// lengths and larger indices raise RangeError
    pub array_dense_limit: usize,

    /// Cache the hidden class of each object literal site
    pub literal_shape_cache: bool,

    /// Default strictness for operations that do not carry their own
    pub strict: bool,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            dictionary_threshold: 64,
            fast_array_max_length: 1 << 24,
            array_dense_limit: 1 << 26,
            literal_shape_cache: true,
            strict: false,
        }
    }
}

impl RuntimeOptions {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Read options from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, serde_json::Error> {
        let text = std::fs::read_to_string(path).map_err(serde_json::Error::io)?;
        Self::from_json(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = RuntimeOptions::default();
        assert_eq!(options.dictionary_threshold, 64);
        assert_eq!(options.fast_array_max_length, 16_777_216);
        assert_eq!(options.array_dense_limit, 67_108_864);
        assert!(options.literal_shape_cache);
        assert!(!options.strict);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let options = RuntimeOptions::from_json(r#"{ "dictionary_threshold": 8 }"#).unwrap();
        assert_eq!(options.dictionary_threshold, 8);
        assert!(options.literal_shape_cache);
    }
}
