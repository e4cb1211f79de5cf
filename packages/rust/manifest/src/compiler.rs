//! Compiler collaborator trait and the host-supplied registry.
//!
//! A compiler turns one bundle's resolved source text into another language
//! (e.g. `.coffee` → `.js`). Compilers are looked up by source extension when
//! the tree is built.

use std::collections::HashMap;
use std::sync::Arc;

use bundlekit_shared::{CompileDetail, Result};

/// Trait for per-file compilers.
pub trait Compiler: Send + Sync {
    /// Human-readable compiler name for tracing and comments.
    fn name(&self) -> &str;

    /// Source extensions this compiler accepts (without the leading dot).
    fn extensions(&self) -> Vec<String>;

    /// Output extensions this compiler can produce. The first one is the
    /// default when a bundle does not ask for a specific output.
    fn outputs(&self) -> Vec<String>;

    /// Compile `source`. Errors are reported as compile errors for the
    /// bundle being reduced.
    fn compile(&self, source: &str, detail: &CompileDetail) -> Result<String>;
}

/// Maps source extensions to compilers.
#[derive(Clone, Default)]
pub struct CompilerRegistry {
    by_extension: HashMap<String, Arc<dyn Compiler>>,
}

impl CompilerRegistry {
    /// An empty registry: every bundle is emitted as-is.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `compiler` for every extension it declares. A later
    /// registration for the same extension replaces the earlier one.
    pub fn register(&mut self, compiler: Arc<dyn Compiler>) {
        for ext in compiler.extensions() {
            tracing::debug!(compiler = compiler.name(), extension = %ext, "registered compiler");
            self.by_extension.insert(ext.to_ascii_lowercase(), compiler.clone());
        }
    }

    /// Compiler for a source extension, if any.
    pub fn for_extension(&self, extension: &str) -> Option<Arc<dyn Compiler>> {
        self.by_extension.get(&extension.to_ascii_lowercase()).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.by_extension.is_empty()
    }
}

impl std::fmt::Debug for CompilerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut extensions: Vec<&String> = self.by_extension.keys().collect();
        extensions.sort();
        f.debug_struct("CompilerRegistry")
            .field("extensions", &extensions)
            .finish()
    }
}
