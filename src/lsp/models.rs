use serde::{Deserialize, Serialize};

use tower_lsp::lsp_types::request::Request;
use tower_lsp::lsp_types::{Location, Range, Url};

/// One node of the definition tree shown by the host: a name that is defined
/// exactly once, where it is defined, and everything that points at it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefinitionTreeItem {
    pub name: String,
    pub uri: Url,
    pub range: Range,
    pub refs: Vec<Location>,
}

/// Server-to-client push of the full definition tree.
#[derive(Debug)]
pub enum RefreshTree {}

impl Request for RefreshTree {
    type Params = Vec<DefinitionTreeItem>;
    type Result = ();
    const METHOD: &'static str = "anchor/refreshTree";
}

/// Method names of the requests the host sends to the server.
pub mod methods {
    pub const INIT: &str = "anchor/init";
    pub const REFRESH: &str = "anchor/refresh";
    pub const REFRESH_SETTINGS: &str = "anchor/refreshSettings";
}
