//! Per-extension reducer.
//!
//! Walks the tree once per requested output extension and concatenates the
//! preprocessed content of every bundle contributing to it, strictly in tree
//! order.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use tracing::{debug, instrument, warn};

use bundlekit_manifest::{Bundle, Tree};
use bundlekit_shared::{BundleError, CompileDetail, Result, is_script, line_comment};

/// Reduce the tree into one document per output extension.
///
/// Extensions with no contributing bundle are skipped with a warning.
#[instrument(skip_all, fields(platform = %platform, extensions = ?extensions))]
pub fn reduce(tree: &Tree, platform: &str, extensions: &[String]) -> Result<BTreeMap<String, String>> {
    let mut documents = BTreeMap::new();

    for extension in extensions {
        match reduce_extension(tree, platform, extension)? {
            Some(content) => {
                documents.insert(extension.clone(), content);
            }
            None => warn!(%extension, "no bundle produces this extension, skipping"),
        }
    }

    Ok(documents)
}

/// Concatenated content for one output extension, or `None` when nothing
/// in the tree produces it.
pub fn reduce_extension(tree: &Tree, platform: &str, extension: &str) -> Result<Option<String>> {
    // Source extension -> bundles in the whole tree sharing it.
    let mut totals: HashMap<&str, usize> = HashMap::new();
    for bundle in tree.iter() {
        *totals.entry(bundle.meta.extension.as_str()).or_default() += 1;
    }

    // Every bundle consumes its source slot, including those feeding other
    // outputs, so the index is the same whichever extension is reduced.
    let mut remaining = totals.clone();
    let mut fragments = Vec::new();

    for bundle in tree.iter() {
        let source = bundle.meta.extension.as_str();
        let count = totals.get(source).copied().unwrap_or_default();
        let left = remaining.entry(source).or_insert(count);
        *left = left.saturating_sub(1);
        if bundle.meta.output != extension {
            continue;
        }

        let detail = CompileDetail {
            index: *left,
            count,
            platform: platform.to_string(),
        };
        debug!(key = %bundle.key, index = detail.index, count, "reducing bundle");
        fragments.push(preprocess(bundle, &detail)?);
    }

    if fragments.is_empty() {
        return Ok(None);
    }
    Ok(Some(concat_fragments(&fragments, extension)))
}

/// Join fragments with newlines, terminating script statements.
pub fn concat_fragments(fragments: &[String], extension: &str) -> String {
    let script = is_script(extension);
    fragments
        .iter()
        .map(|fragment| {
            let trimmed = fragment.trim();
            if script && !trimmed.is_empty() && !trimmed.ends_with(';') {
                format!("{trimmed};")
            } else {
                trimmed.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Dependencies + own content, directives resolved, compiled if the bundle
/// has a compiler.
#[instrument(skip_all, fields(key = %bundle.key))]
pub fn preprocess(bundle: &Bundle, detail: &CompileDetail) -> Result<String> {
    let meta = &bundle.meta;
    let mut parts = Vec::with_capacity(bundle.dependencies.len() * 2 + 2);

    for dependency in &bundle.dependencies {
        let raw =
            std::fs::read_to_string(dependency).map_err(|e| BundleError::io(dependency, e))?;
        // Directives in a dependency are relative to the dependency itself.
        let content = bundlekit_directives::resolve(&raw, &meta.extension, dependency)?;
        if let Some(tag) = line_comment(&meta.extension, &display_path(dependency, &meta.directory)) {
            parts.push(tag);
        }
        parts.push(content);
    }

    if let Some(tag) = line_comment(&meta.extension, &meta.key) {
        parts.push(tag);
    }
    parts.push(bundlekit_directives::resolve(
        &meta.content,
        &meta.extension,
        &meta.location,
    )?);

    let text = parts.join("\n");

    let Some(compiler) = &meta.compiler else {
        return Ok(text);
    };

    let compiled = compiler
        .compile(&text, detail)
        .map_err(|e| BundleError::Compile {
            path: meta.location.clone(),
            message: e.to_string(),
        })?;
    debug!(compiler = compiler.name(), bytes = compiled.len(), "compiled bundle");

    let banner = format!("{} -> {}: {}", meta.extension, meta.output, meta.key);
    Ok(match line_comment(&meta.output, &banner) {
        Some(tag) => format!("{tag}\n{compiled}"),
        None => compiled,
    })
}

/// `path` relative to `base` when it lives underneath it.
fn display_path(path: &Path, base: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .display()
        .to_string()
}
