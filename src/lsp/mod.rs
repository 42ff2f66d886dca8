pub mod backend;
pub mod document;
pub mod engine;
pub mod features;
pub mod models;
