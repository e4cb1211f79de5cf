//! Shared types, error model, and configuration for bundlekit.
//!
//! This crate is the foundation depended on by all other bundlekit crates.
//! It provides:
//! - [`BundleError`], the unified error type
//! - Domain types ([`Collection`], [`CompileDetail`], [`BuildId`])
//! - Configuration ([`Configuration`], [`EngineEnv`], [`AppConfig`], config loading)
//! - The comment-style table ([`comments`])

pub mod comments;
pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use comments::{CommentStyle, block_comment, comment_style, is_script, is_stylesheet, line_comment};
pub use config::{
    AppConfig, Configuration, DefaultsConfig, EngineEnv, PersistMode, config_dir,
    config_file_path, expand_dist, init_config, load_config, load_config_from,
};
pub use error::{BundleError, Result};
pub use types::{BuildId, Collection, CompileDetail, KNOWN_DISTRIBUTIONS};
