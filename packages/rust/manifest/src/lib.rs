//! Bundle manifest model.
//!
//! A manifest is JSON (comments allowed) with two top-level keys:
//!
//! ```text
//! {
//!   // global settings, merged over defaults
//!   "configuration": { "name": "app", "license": "LICENSE.txt", "dist": "dist/{name}.{extension}" },
//!   // source files keyed by path (or a plain array of paths)
//!   "bundle": {
//!     "src/vendor.js": { "weight": 100 },
//!     "src/app.js":    { "dependencies": ["lib/polyfill.js"] },
//!     "src/app.css":   "application styles"
//!   }
//! }
//! ```
//!
//! [`parse`] turns a manifest into a [`Package`]: the normalized
//! [`Configuration`] plus the weight-ordered [`Tree`].

pub mod compiler;
mod jsonc;
pub mod tree;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use bundlekit_shared::{BundleError, Configuration, Result};

pub use compiler::{Compiler, CompilerRegistry};
pub use tree::{Bundle, Meta, RawBundle, Tree};

/// Where a manifest comes from.
#[derive(Debug, Clone)]
pub enum ManifestSource {
    /// A manifest file on disk.
    Path(PathBuf),
    /// An in-memory manifest; relative paths resolve against `base_dir`.
    Value { value: Value, base_dir: PathBuf },
}

/// A fully parsed manifest, owned by one build invocation.
#[derive(Debug, Clone)]
pub struct Package {
    /// Directory relative paths (bundles, outputs) resolve against.
    pub root: PathBuf,
    /// Manifest file, when parsed from disk.
    pub manifest_path: Option<PathBuf>,
    pub configuration: Configuration,
    pub tree: Tree,
}

/// Object form of a bundle entry.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct BundleSpec {
    weight: Option<i64>,
    dependencies: Vec<String>,
    description: Option<String>,
    output: Option<String>,
}

/// Parse a manifest into a [`Package`].
///
/// Imports are merged, the license is read, `dist` is normalized, and the
/// dependency tree is built. Any missing bundle or dependency file aborts
/// the whole parse.
#[instrument(skip_all)]
pub fn parse(source: ManifestSource, compilers: &CompilerRegistry) -> Result<Package> {
    let (value, root, manifest_path) = match source {
        ManifestSource::Path(path) => {
            let value = read_manifest(&path)?;
            let path = canonical(&path);
            let root = parent_dir(&path);
            (value, root, Some(path))
        }
        ManifestSource::Value { value, base_dir } => (value, canonical(&base_dir), None),
    };

    let mut visited = HashSet::new();
    if let Some(path) = &manifest_path {
        visited.insert(path.clone());
    }

    let (mut configuration, bundles) = load(value, &root, visited)?;
    normalize_license(&mut configuration, &root);

    info!(
        root = %root.display(),
        bundles = bundles.len(),
        dist_kinds = configuration.dist.len(),
        "manifest parsed"
    );

    let tree = tree::build(bundles, compilers)?;

    Ok(Package {
        root,
        manifest_path,
        configuration,
        tree,
    })
}

/// Parse the manifest at `path` in parse-only mode: its own imports are
/// followed, but no files are validated and no state beyond the returned
/// bundle entries is produced. `visited` holds the manifests already on the
/// import chain.
pub fn parse_only(path: &Path, visited: HashSet<PathBuf>) -> Result<Vec<RawBundle>> {
    let path = canonical(path);
    if visited.contains(&path) {
        return Err(BundleError::manifest(format!(
            "import cycle: {} is already being imported",
            path.display()
        )));
    }

    let value = read_manifest(&path)?;
    let mut visited = visited;
    visited.insert(path.clone());

    let (_, bundles) = load(value, &parent_dir(&path), visited)?;
    Ok(bundles)
}

/// Split a manifest value into configuration and bundle entries, merging
/// in every imported manifest's bundles.
fn load(
    value: Value,
    root: &Path,
    visited: HashSet<PathBuf>,
) -> Result<(Configuration, Vec<RawBundle>)> {
    let Value::Object(mut top) = value else {
        return Err(BundleError::manifest("manifest must be a JSON object"));
    };

    let configuration =
        Configuration::from_value(top.remove("configuration").unwrap_or(Value::Null))?;
    let mut bundles = raw_bundles(top.remove("bundle").unwrap_or(Value::Null), root)?;

    for import in &configuration.import {
        let import_path = root.join(import);
        debug!(import = %import_path.display(), "importing manifest");
        let imported = parse_only(&import_path, visited.clone())?;
        merge_bundles(&mut bundles, imported);
    }

    Ok((configuration, bundles))
}

/// Convert the `bundle` value (object or array) into raw entries in
/// declaration order.
fn raw_bundles(value: Value, base_dir: &Path) -> Result<Vec<RawBundle>> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => {
            let total = items.len();
            items
                .into_iter()
                .enumerate()
                .map(|(position, item)| match item {
                    Value::String(key) => Ok(RawBundle {
                        weight: Some((total - position) as i64),
                        ..RawBundle::new(key, base_dir)
                    }),
                    other => Err(BundleError::manifest(format!(
                        "bundle list entries must be paths, got {other}"
                    ))),
                })
                .collect()
        }
        Value::Object(entries) => entries
            .into_iter()
            .map(|(key, spec)| raw_bundle(key, spec, base_dir))
            .collect(),
        other => Err(BundleError::manifest(format!(
            "`bundle` must be an object or an array, got {other}"
        ))),
    }
}

fn raw_bundle(key: String, spec: Value, base_dir: &Path) -> Result<RawBundle> {
    let spec = match spec {
        Value::Null | Value::Bool(true) => BundleSpec::default(),
        Value::String(description) => BundleSpec {
            description: Some(description),
            ..BundleSpec::default()
        },
        Value::Object(map) => serde_json::from_value(Value::Object(map))
            .map_err(|e| BundleError::manifest(format!("invalid bundle entry `{key}`: {e}")))?,
        other => {
            return Err(BundleError::manifest(format!(
                "invalid bundle entry `{key}`: {other}"
            )));
        }
    };

    Ok(RawBundle {
        weight: spec.weight,
        dependencies: spec.dependencies,
        description: spec.description,
        output: spec.output,
        ..RawBundle::new(key, base_dir)
    })
}

/// Map-merge `from` into `into`: identical keys are replaced in place
/// (last write wins), new keys are appended.
fn merge_bundles(into: &mut Vec<RawBundle>, from: Vec<RawBundle>) {
    for entry in from {
        match into.iter_mut().find(|existing| existing.key == entry.key) {
            Some(existing) => {
                debug!(key = %entry.key, "imported bundle replaces existing entry");
                *existing = entry;
            }
            None => into.push(entry),
        }
    }
}

/// Replace the license path with its text, or drop it if unreadable.
fn normalize_license(configuration: &mut Configuration, root: &Path) {
    let Some(license) = configuration.license.clone() else {
        return;
    };
    let path = root.join(&license);
    match std::fs::read_to_string(&path) {
        Ok(text) => {
            debug!(path = %path.display(), "license header loaded");
            configuration.license_text = Some(text);
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "license file not readable, ignoring");
            configuration.license = None;
        }
    }
}

/// Read a manifest file and parse it as JSON with comments.
fn read_manifest(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        BundleError::manifest(format!("cannot read manifest {}: {e}", path.display()))
    })?;

    serde_json::from_str(&jsonc::strip_comments(&content))
        .map_err(|e| BundleError::manifest(format!("invalid manifest {}: {e}", path.display())))
}

fn canonical(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn parent_dir(path: &Path) -> PathBuf {
    path.parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
