//! Pattern compilation
//!
//! The host supplies three regular expressions as plain strings. The
//! definition and reference patterns must carry at least one capture group:
//! the first group is the anchor name. The completion prefix pattern only
//! marks where a reference being typed starts.
//!
//! The raw source of each pattern is kept next to the compiled matcher
//! because the bulk scanner hands it verbatim to the external search tool.

use std::fmt;
use std::ops::Range as ByteRange;

use regex::Regex;

use crate::config::AnchorSettings;
use crate::error::{AnchorError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatternRole {
    Definition,
    Reference,
    CompletionPrefix,
}

impl fmt::Display for PatternRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatternRole::Definition => write!(f, "definition"),
            PatternRole::Reference => write!(f, "reference"),
            PatternRole::CompletionPrefix => write!(f, "completion prefix"),
        }
    }
}

/// One match of an [`AnchorPattern`], as byte offsets into the searched text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternMatch {
    pub whole: ByteRange<usize>,
    /// First capture group; `None` when the group did not participate.
    pub name: Option<ByteRange<usize>>,
}

#[derive(Debug, Clone)]
pub struct AnchorPattern {
    role: PatternRole,
    regex: Regex,
}

impl AnchorPattern {
    pub fn compile(role: PatternRole, source: &str) -> Result<Self> {
        let regex = Regex::new(source).map_err(|error| AnchorError::InvalidPattern {
            role,
            source_text: source.to_string(),
            error,
        })?;

        // captures_len counts the implicit whole-match group
        if role != PatternRole::CompletionPrefix && regex.captures_len() < 2 {
            return Err(AnchorError::MissingNameGroup {
                role,
                source_text: source.to_string(),
            });
        }

        Ok(Self { role, regex })
    }

    pub fn role(&self) -> PatternRole {
        self.role
    }

    pub fn source(&self) -> &str {
        self.regex.as_str()
    }

    /// All non-overlapping matches in `text`, left to right.
    pub fn matches(&self, text: &str) -> Vec<PatternMatch> {
        self.regex
            .captures_iter(text)
            .filter_map(|caps| {
                let whole = caps.get(0)?.range();
                let name = caps.get(1).map(|m| m.range());
                Some(PatternMatch { whole, name })
            })
            .collect()
    }

    /// The match closest to the end of `text`.
    pub fn last_match(&self, text: &str) -> Option<ByteRange<usize>> {
        self.regex.find_iter(text).last().map(|m| m.range())
    }
}

/// The three compiled patterns that are active at any one time.
#[derive(Debug, Clone)]
pub struct PatternSet {
    pub definition: AnchorPattern,
    pub reference: AnchorPattern,
    pub completion_prefix: AnchorPattern,
}

impl PatternSet {
    pub fn compile(definition: &str, reference: &str, completion_prefix: &str) -> Result<Self> {
        Ok(Self {
            definition: AnchorPattern::compile(PatternRole::Definition, definition)?,
            reference: AnchorPattern::compile(PatternRole::Reference, reference)?,
            completion_prefix: AnchorPattern::compile(
                PatternRole::CompletionPrefix,
                completion_prefix,
            )?,
        })
    }

    pub fn from_settings(settings: &AnchorSettings) -> Result<Self> {
        Self::compile(
            &settings.definition_pattern,
            &settings.reference_pattern,
            &settings.completion_prefix_pattern,
        )
    }

    pub fn for_kind(&self, kind: super::Kind) -> &AnchorPattern {
        match kind {
            super::Kind::Definition => &self.definition,
            super::Kind::Reference => &self.reference,
        }
    }
}
