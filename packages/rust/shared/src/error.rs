//! Error types for bundlekit.
//!
//! Library crates use [`BundleError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

use crate::types::Collection;

/// Top-level error type for all bundlekit operations.
#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    /// Malformed or missing manifest, or a bundle file it references.
    #[error("manifest error: {message}")]
    Manifest { message: String },

    /// An include directive points at a file that does not exist.
    #[error("directive error: {target:?} (included from {from:?}) does not exist")]
    Directive { target: PathBuf, from: PathBuf },

    /// Directive recursion revisited a file already in the active chain.
    #[error("include cycle: {target:?} is already being resolved (chain: {chain:?})")]
    Cycle { target: PathBuf, chain: Vec<PathBuf> },

    /// A compiler collaborator failed for a bundle.
    #[error("compile error in {path:?}: {message}")]
    Compile { path: PathBuf, message: String },

    /// A transform stage failed. `partial` holds the last value that
    /// made it through the pipeline.
    #[error("pipeline error in stage `{stage}`: {message}")]
    Pipeline {
        stage: String,
        message: String,
        partial: Box<Collection>,
    },

    /// One or more storages failed to persist an artifact.
    #[error("write error: {message}")]
    Write { message: String },

    /// Error raised by a host-supplied plugin (stage, storage, compiler).
    #[error("plugin error: {0}")]
    Plugin(String),

    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, BundleError>;

impl BundleError {
    /// Create a manifest error from any displayable message.
    pub fn manifest(msg: impl Into<String>) -> Self {
        Self::Manifest {
            message: msg.into(),
        }
    }

    /// Create a write error from any displayable message.
    pub fn write(msg: impl Into<String>) -> Self {
        Self::Write {
            message: msg.into(),
        }
    }

    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a plugin error from any displayable message.
    pub fn plugin(msg: impl Into<String>) -> Self {
        Self::Plugin(msg.into())
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// The partially transformed collection, if this is a pipeline failure.
    pub fn partial(&self) -> Option<&Collection> {
        match self {
            Self::Pipeline { partial, .. } => Some(partial.as_ref()),
            _ => None,
        }
    }
}
