use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::scanner::pattern::PatternRole;

pub type Result<T> = std::result::Result<T, AnchorError>;

#[derive(Error, Debug)]
pub enum AnchorError {
    #[error("Invalid {role} pattern `{source_text}`: {error}")]
    InvalidPattern {
        role: PatternRole,
        source_text: String,
        #[source]
        error: regex::Error,
    },

    #[error("The {role} pattern `{source_text}` has no capture group for the anchor name")]
    MissingNameGroup {
        role: PatternRole,
        source_text: String,
    },

    #[error("Invalid settings: {0}")]
    InvalidSettings(#[from] serde_json::Error),

    #[error("No anchor patterns are active")]
    NoPatterns,

    #[error("Search backend unavailable ({}): {reason}", binary.display())]
    SearchUnavailable { binary: PathBuf, reason: String },

    #[error("Search failed in {}: {message}", root.display())]
    SearchFailed { root: PathBuf, message: String },

    #[error("Search in {} timed out after {timeout:?}", root.display())]
    SearchTimeout { root: PathBuf, timeout: Duration },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AnchorError {
    /// Errors after which the bulk scan degrades to "no results" instead of failing.
    pub fn is_backend_unavailable(&self) -> bool {
        matches!(
            self,
            AnchorError::SearchUnavailable { .. } | AnchorError::SearchTimeout { .. }
        )
    }
}
