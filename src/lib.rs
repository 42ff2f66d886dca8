pub mod config;
pub mod error;
pub mod index;
pub mod logging;
pub mod lsp;
pub mod paths;
pub mod scanner;

pub use config::AnchorSettings;
pub use error::{AnchorError, Result};
pub use index::AnchorIndex;
pub use lsp::engine::AnchorEngine;
