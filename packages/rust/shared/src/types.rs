//! Core domain types shared by every bundlekit crate.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Distribution kinds every manifest knows about.
///
/// A bare-string `dist` template is expanded over exactly these kinds.
pub const KNOWN_DISTRIBUTIONS: &[&str] = &["dev", "min"];

// ---------------------------------------------------------------------------
// BuildId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying one build invocation (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildId(pub Uuid);

impl BuildId {
    /// Generate a new time-sortable build identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for BuildId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for BuildId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for BuildId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Collection
// ---------------------------------------------------------------------------

/// The in-flight artifact for one output extension and distribution.
///
/// Produced by the reducer, moved through the transform pipeline, and
/// finally tagged and persisted by the writer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    /// Concatenated (and possibly transformed) content.
    pub content: String,
    /// Output extension, without the leading dot.
    pub extension: String,
    /// Target platform the build was reduced for.
    pub platform: String,
    /// Distribution kind (`dev`, `min`, ...).
    pub distribution: String,
    /// Absolute output path, set by the writer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    /// File name component of `file`, set by the writer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basename: Option<String>,
}

impl Collection {
    pub fn new(
        content: impl Into<String>,
        extension: impl Into<String>,
        platform: impl Into<String>,
        distribution: impl Into<String>,
    ) -> Self {
        Self {
            content: content.into(),
            extension: extension.into(),
            platform: platform.into(),
            distribution: distribution.into(),
            file: None,
            basename: None,
        }
    }

    /// Return a copy with `content` replaced, keeping every other field.
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }
}

// ---------------------------------------------------------------------------
// CompileDetail
// ---------------------------------------------------------------------------

/// Positional information handed to a compiler for each bundle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CompileDetail {
    /// Zero-based position, counting down among bundles that share the
    /// bundle's source extension.
    pub index: usize,
    /// Number of tree bundles sharing the bundle's source extension.
    pub count: usize,
    /// Platform being built.
    pub platform: String,
}
