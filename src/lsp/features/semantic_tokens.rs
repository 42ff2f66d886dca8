use tower_lsp::lsp_types::{
    SemanticToken, SemanticTokenModifier, SemanticTokenType, SemanticTokensLegend, Url,
};

use crate::index::AnchorIndex;
use crate::scanner::Kind;

pub const DEFINITION_TOKEN_TYPE: u32 = 0;
pub const REFERENCE_TOKEN_TYPE: u32 = 1;
const REFERENCE_MODIFIERS: u32 = 1; // defaultLibrary

pub fn legend() -> SemanticTokensLegend {
    SemanticTokensLegend {
        token_types: vec![SemanticTokenType::CLASS, SemanticTokenType::TYPE],
        token_modifiers: vec![SemanticTokenModifier::DEFAULT_LIBRARY],
    }
}

/// Helper for building semantic tokens using delta encoding
///
/// LSP semantic tokens use delta encoding where each token's position
/// is relative to the previous token. Tokens must be pushed in document order.
pub struct SemanticTokensBuilder {
    tokens: Vec<SemanticToken>,
    prev_line: u32,
    prev_start: u32,
}

impl SemanticTokensBuilder {
    pub fn new() -> Self {
        Self {
            tokens: Vec::new(),
            prev_line: 0,
            prev_start: 0,
        }
    }

    /// Add a token with absolute position
    pub fn push(&mut self, line: u32, start: u32, length: u32, token_type: u32, modifiers: u32) {
        let delta_line = line.saturating_sub(self.prev_line);
        let delta_start = if delta_line == 0 {
            start.saturating_sub(self.prev_start)
        } else {
            start
        };

        self.tokens.push(SemanticToken {
            delta_line,
            delta_start,
            length,
            token_type,
            token_modifiers_bitset: modifiers,
        });

        self.prev_line = line;
        self.prev_start = start;
    }

    pub fn build(self) -> Vec<SemanticToken> {
        self.tokens
    }
}

impl Default for SemanticTokensBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Every anchor in `uri`, in document order. The token spans the whole
/// matched text including delimiters.
pub fn semantic_tokens(index: &AnchorIndex, uri: &Url) -> Vec<SemanticToken> {
    let mut builder = SemanticTokensBuilder::new();
    for (kind, anchor) in index.all_anchors_in(uri) {
        let (token_type, modifiers) = match kind {
            Kind::Definition => (DEFINITION_TOKEN_TYPE, 0),
            Kind::Reference => (REFERENCE_TOKEN_TYPE, REFERENCE_MODIFIERS),
        };
        let start = anchor.range.start;
        let length = anchor.range.end.character.saturating_sub(start.character);
        builder.push(start.line, start.character, length, token_type, modifiers);
    }
    builder.build()
}
