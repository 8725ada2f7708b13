pub mod api;
pub mod checkpoint;
pub mod config;
pub mod document;
pub mod mapping;
pub mod pipeline;
pub mod rewrite;
