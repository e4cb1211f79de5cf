//! Dependency tree builder.
//!
//! Turns the raw bundle entries of a manifest into the weight-ordered
//! [`Tree`]: every bundle file is validated and read, its compiler and
//! output extension are resolved, and its declared dependencies are checked
//! and attached. The resulting order is the only concatenation order used
//! downstream.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, instrument};

use bundlekit_shared::{BundleError, Result};

use crate::compiler::{Compiler, CompilerRegistry};

/// A bundle entry as declared in a manifest, before validation.
#[derive(Debug, Clone, PartialEq)]
pub struct RawBundle {
    /// Key as written in the manifest (a path relative to `base_dir`).
    pub key: String,
    /// Directory of the manifest that declared the entry.
    pub base_dir: PathBuf,
    /// Explicit weight, if any.
    pub weight: Option<i64>,
    /// Dependency paths relative to `base_dir`.
    pub dependencies: Vec<String>,
    /// Free-text description.
    pub description: Option<String>,
    /// Explicit output extension override.
    pub output: Option<String>,
}

impl RawBundle {
    pub fn new(key: impl Into<String>, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            key: key.into(),
            base_dir: base_dir.into(),
            weight: None,
            dependencies: Vec::new(),
            description: None,
            output: None,
        }
    }
}

/// Derived information about a bundle's source file.
#[derive(Clone)]
pub struct Meta {
    /// Raw file content.
    pub content: String,
    /// Source extension, lower-cased, without the dot.
    pub extension: String,
    /// Extension of the artifact this bundle contributes to.
    pub output: String,
    /// Compiler applied during preprocessing, if any.
    pub compiler: Option<Arc<dyn Compiler>>,
    /// Manifest key.
    pub key: String,
    /// Absolute path of the source file.
    pub location: PathBuf,
    /// Directory containing the source file.
    pub directory: PathBuf,
    /// File name of the source file.
    pub filename: String,
}

impl std::fmt::Debug for Meta {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Meta")
            .field("key", &self.key)
            .field("extension", &self.extension)
            .field("output", &self.output)
            .field("compiler", &self.compiler.as_ref().map(|c| c.name().to_string()))
            .field("location", &self.location)
            .field("bytes", &self.content.len())
            .finish()
    }
}

/// A validated bundle in the tree.
#[derive(Debug, Clone)]
pub struct Bundle {
    pub key: String,
    /// Ordering weight; higher sorts earlier.
    pub weight: i64,
    /// Absolute paths concatenated ahead of this bundle's own content.
    pub dependencies: Vec<PathBuf>,
    pub description: Option<String>,
    pub meta: Meta,
}

/// Weight-ordered bundles plus the output-extension index.
#[derive(Debug, Clone, Default)]
pub struct Tree {
    bundles: Vec<Bundle>,
    extensions: BTreeMap<String, Vec<String>>,
}

impl Tree {
    /// Bundles in concatenation order.
    pub fn bundles(&self) -> &[Bundle] {
        &self.bundles
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Bundle> {
        self.bundles.iter()
    }

    pub fn len(&self) -> usize {
        self.bundles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }

    /// Look up a bundle by manifest key.
    pub fn get(&self, key: &str) -> Option<&Bundle> {
        self.bundles.iter().find(|b| b.key == key)
    }

    /// Output extension → bundle keys, in tree order.
    pub fn extensions(&self) -> &BTreeMap<String, Vec<String>> {
        &self.extensions
    }

    /// Every output extension the tree produces.
    pub fn output_extensions(&self) -> Vec<String> {
        self.extensions.keys().cloned().collect()
    }
}

/// Validate, enrich and order raw bundle entries.
#[instrument(skip_all, fields(bundles = raw.len()))]
pub fn build(raw: Vec<RawBundle>, compilers: &CompilerRegistry) -> Result<Tree> {
    let total = raw.len();
    let mut bundles = Vec::with_capacity(total);

    for (position, entry) in raw.into_iter().enumerate() {
        let weight = entry.weight.unwrap_or((total - position) as i64);
        bundles.push(build_bundle(entry, weight, compilers)?);
    }

    // Stable: equal weights keep manifest order.
    bundles.sort_by(|a, b| b.weight.cmp(&a.weight));

    let mut extensions: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for bundle in &bundles {
        extensions
            .entry(bundle.meta.output.clone())
            .or_default()
            .push(bundle.key.clone());
    }

    debug!(
        bundles = bundles.len(),
        outputs = extensions.len(),
        "dependency tree built"
    );

    Ok(Tree {
        bundles,
        extensions,
    })
}

fn build_bundle(entry: RawBundle, weight: i64, compilers: &CompilerRegistry) -> Result<Bundle> {
    let location = existing_file(&entry.base_dir, &entry.key).ok_or_else(|| {
        BundleError::manifest(format!(
            "bundle file `{}` not found in {}",
            entry.key,
            entry.base_dir.display()
        ))
    })?;

    let content =
        std::fs::read_to_string(&location).map_err(|e| BundleError::io(&location, e))?;

    let extension = location
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();

    let compiler = compilers.for_extension(&extension);
    let output = entry
        .output
        .clone()
        .or_else(|| compiler.as_ref().and_then(|c| c.outputs().into_iter().next()))
        .unwrap_or_else(|| extension.clone());

    let mut dependencies = Vec::with_capacity(entry.dependencies.len());
    for dep in &entry.dependencies {
        let path = existing_file(&entry.base_dir, dep).ok_or_else(|| {
            BundleError::manifest(format!(
                "dependency `{dep}` of bundle `{}` not found in {}",
                entry.key,
                entry.base_dir.display()
            ))
        })?;
        dependencies.push(path);
    }

    let directory = location
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| entry.base_dir.clone());
    let filename = location
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    debug!(
        key = %entry.key,
        weight,
        %extension,
        %output,
        dependencies = dependencies.len(),
        "bundle resolved"
    );

    Ok(Bundle {
        key: entry.key.clone(),
        weight,
        dependencies,
        description: entry.description,
        meta: Meta {
            content,
            extension,
            output,
            compiler,
            key: entry.key,
            location,
            directory,
            filename,
        },
    })
}

/// Resolve `relative` against `base` and return its canonical path if it is
/// an existing file.
fn existing_file(base: &Path, relative: &str) -> Option<PathBuf> {
    let path = base.join(relative);
    if !path.is_file() {
        return None;
    }
    Some(std::fs::canonicalize(&path).unwrap_or(path))
}
