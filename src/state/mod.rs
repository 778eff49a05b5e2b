/// State management module
///
/// This module handles everything that lives on disk between runs:
/// - Shared data structures (data.rs)
/// - The repository tree and navigation history (tree.rs)
/// - Sidecar metadata records (metadata.rs)
/// - Application configuration (config.rs)

pub mod config;
pub mod data;
pub mod metadata;
pub mod tree;
