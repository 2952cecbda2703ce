//! Compiler configuration

use super::error::CompileResult;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Optimization preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptLevel {
    /// Pass-through
    None,
    /// `-Og`: cheap cleanups that keep the IR close to the source
    Debug,
    /// `-O3`
    #[default]
    Full,
}

/// Options for one compilation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileOptions {
    pub opt_level: OptLevel,
    /// Explicit pass list; overrides `opt_level` when set
    pub custom_passes: Option<Vec<String>>,
    /// Run the IR validator after lowering and after optimization
    pub verify_ir: bool,
    pub warnings_as_errors: bool,
    pub suppress_warnings: bool,
    /// Compile the top-level program as strict code
    pub strict: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            opt_level: OptLevel::Full,
            custom_passes: None,
            verify_ir: true,
            warnings_as_errors: false,
            suppress_warnings: false,
            strict: false,
        }
    }
}

impl CompileOptions {
    pub fn from_json(text: &str) -> CompileResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Read options from a JSON file; I/O errors surface as option errors
    pub fn from_file(path: impl AsRef<Path>) -> CompileResult<Self> {
        let text = std::fs::read_to_string(path).map_err(serde_json::Error::io)?;
        Self::from_json(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let opts = CompileOptions::from_json(r#"{ "opt_level": "debug" }"#).unwrap();
        assert_eq!(opts.opt_level, OptLevel::Debug);
        assert!(opts.verify_ir);
        assert!(opts.custom_passes.is_none());
    }

    #[test]
    fn test_custom_passes() {
        let opts = CompileOptions::from_json(r#"{ "custom_passes": ["DCE", "CSE"] }"#).unwrap();
        assert_eq!(opts.custom_passes, Some(vec!["DCE".to_string(), "CSE".to_string()]));
    }

    #[test]
    fn test_bad_json_is_an_error() {
        assert!(CompileOptions::from_json("{ not json").is_err());
    }
}
