//! Server settings
//!
//! Settings arrive from the host as LSP `initializationOptions` and again with
//! every `anchor/refreshSettings` request. Both use the same camelCase JSON
//! shape; absent fields fall back to the defaults below so that a host can send
//! a partial object.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tower_lsp::lsp_types::DiagnosticSeverity;
use tracing::warn;

use crate::error::Result;
use crate::index::diagnostics::DiagnosticSettings;

/// Environment variable that overrides the search binary location.
pub const RIPGREP_PATH_ENV: &str = "ANCHOR_RIPGREP_PATH";

pub const DEFAULT_DEFINITION_PATTERN: &str = r"\[\[([^@\]].*?)\]\]";
pub const DEFAULT_REFERENCE_PATTERN: &str = r"\[\[@(.+?)\]\]";
pub const DEFAULT_COMPLETION_PREFIX_PATTERN: &str = r"\[\[@";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnchorSettings {
    pub definition_pattern: String,
    pub reference_pattern: String,
    pub completion_prefix_pattern: String,
    pub completion_trigger_characters: Vec<String>,
    /// LSP numeric severity: 1 = error, 2 = warning, 3 = information, 4 = hint.
    pub diagnostic_severity: i32,
    pub allow_unused_definitions: bool,
    pub report_duplicate_definitions: bool,
    pub report_undefined_references: bool,
    /// Milliseconds of quiet time before an edited file is re-scanned.
    pub update_file_debounce_latency: u64,
    pub ripgrep_path: Option<PathBuf>,
    /// Upper bound for a single external search call, in milliseconds.
    pub scan_timeout_ms: u64,
}

impl Default for AnchorSettings {
    fn default() -> Self {
        Self {
            definition_pattern: DEFAULT_DEFINITION_PATTERN.to_string(),
            reference_pattern: DEFAULT_REFERENCE_PATTERN.to_string(),
            completion_prefix_pattern: DEFAULT_COMPLETION_PREFIX_PATTERN.to_string(),
            completion_trigger_characters: vec!["@".to_string()],
            diagnostic_severity: 2,
            allow_unused_definitions: false,
            report_duplicate_definitions: true,
            report_undefined_references: true,
            update_file_debounce_latency: 200,
            ripgrep_path: None,
            scan_timeout_ms: 30_000,
        }
    }
}

impl AnchorSettings {
    /// Parse settings from an optional JSON value. An absent value yields the
    /// defaults; a present one must deserialize as a whole.
    pub fn from_json(value: Option<serde_json::Value>) -> Result<Self> {
        match value {
            None | Some(serde_json::Value::Null) => Ok(Self::default()),
            Some(value) => Ok(serde_json::from_value(value)?),
        }
    }

    pub fn severity(&self) -> DiagnosticSeverity {
        match self.diagnostic_severity {
            1 => DiagnosticSeverity::ERROR,
            2 => DiagnosticSeverity::WARNING,
            3 => DiagnosticSeverity::INFORMATION,
            4 => DiagnosticSeverity::HINT,
            other => {
                warn!("Unknown diagnostic severity {}, using warning", other);
                DiagnosticSeverity::WARNING
            }
        }
    }

    pub fn diagnostic_settings(&self) -> DiagnosticSettings {
        DiagnosticSettings {
            severity: self.severity(),
            report_duplicates: self.report_duplicate_definitions,
            report_undefined: self.report_undefined_references,
            report_unused: !self.allow_unused_definitions,
        }
    }

    pub fn debounce_latency(&self) -> Duration {
        Duration::from_millis(self.update_file_debounce_latency)
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_millis(self.scan_timeout_ms)
    }

    /// Resolve the search binary: environment override, then the setting,
    /// then `rg` from `PATH`.
    pub fn ripgrep_binary(&self) -> PathBuf {
        if let Ok(path) = std::env::var(RIPGREP_PATH_ENV) {
            if !path.trim().is_empty() {
                return PathBuf::from(path);
            }
        }
        self.ripgrep_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("rg"))
    }
}
