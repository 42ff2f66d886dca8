//! Read-only queries over the anchor index
//!
//! Every feature is a plain function of an [`AnchorIndex`](crate::index::AnchorIndex)
//! snapshot plus request parameters, so the backend only has to take the
//! read lock and call in. Rename is the one feature that also drives a write,
//! see [`rename`].

pub mod completion;
pub mod definition;
pub mod hover;
pub mod references;
pub mod rename;
pub mod semantic_tokens;
