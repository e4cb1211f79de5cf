//! Writer: resolves a collection's output file, prepends the license header
//! and persists it through every storage.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::join_all;
use serde_json::{Map, Value, json};
use tracing::{debug, info, instrument};

use bundlekit_manifest::Package;
use bundlekit_shared::{BundleError, Collection, EngineEnv, Result, block_comment};
use bundlekit_storage::Storage;

use crate::tags::{Tagger, template};

/// Everything a write needs, borrowed from the running build.
pub struct Writer<'a> {
    pub package: &'a Package,
    pub env: &'a EngineEnv,
    pub tagger: &'a Tagger,
    pub storages: &'a [Arc<dyn Storage>],
}

impl Writer<'_> {
    /// Tag, name, license and persist `collection`.
    ///
    /// In dry-run and stdout modes nothing is persisted; the tagged
    /// collection is still returned.
    #[instrument(skip_all, fields(extension = %collection.extension, distribution = %collection.distribution))]
    pub async fn write(&self, mut collection: Collection) -> Result<Collection> {
        let configuration = &self.package.configuration;
        let mut bag = self
            .tagger
            .tag(&collection, configuration, self.env, &self.package.root);

        let dist = configuration.dist.get(&collection.distribution).ok_or_else(|| {
            BundleError::write(format!(
                "no output template for distribution `{}`",
                collection.distribution
            ))
        })?;
        let dist = expand_home(dist, self.env.home.as_deref())?;
        let file = self
            .package
            .root
            .join(template(&dist, &Value::Object(bag.clone())));
        let basename = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        bag.insert("file".into(), json!(file.display().to_string()));
        bag.insert("basename".into(), json!(basename));
        collection.file = Some(file);
        collection.basename = Some(basename);

        match &configuration.license_text {
            Some(license) if !collection.content.trim().is_empty() => {
                collection.content = with_license(&collection, license, bag);
            }
            _ => {}
        }

        if self.env.skips_storage() {
            debug!(mode = ?self.env.persist, "storage skipped");
            return Ok(collection);
        }

        self.persist(&collection).await?;
        info!(
            file = %collection.file.as_deref().unwrap_or(Path::new("")).display(),
            bytes = collection.content.len(),
            storages = self.storages.len(),
            "collection written"
        );
        Ok(collection)
    }

    /// Hand the collection to every storage at once and wait for all of
    /// them. Failures are collected, not short-circuited.
    async fn persist(&self, collection: &Collection) -> Result<()> {
        let results = join_all(
            self.storages
                .iter()
                .map(|storage| storage.persist(self.env, collection)),
        )
        .await;

        let failures: Vec<String> = self
            .storages
            .iter()
            .zip(results)
            .filter_map(|(storage, result)| {
                result
                    .err()
                    .map(|e| format!("storage `{}` failed: {e}", storage.name()))
            })
            .collect();

        if failures.is_empty() {
            Ok(())
        } else {
            Err(BundleError::write(failures.join("; ")))
        }
    }
}

/// Prepend the templated license in the collection's block comment style.
fn with_license(collection: &Collection, license: &str, bag: Map<String, Value>) -> String {
    let text = template(license, &Value::Object(bag));
    match block_comment(&collection.extension, text.trim_end()) {
        Some(header) => format!("{header}\n{}", collection.content),
        None => {
            debug!(extension = %collection.extension, "no comment style, license omitted");
            collection.content.clone()
        }
    }
}

/// Expand a leading `~` to the injected home directory.
fn expand_home(template: &str, home: Option<&Path>) -> Result<String> {
    let rest = match template.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
        _ => return Ok(template.to_string()),
    };
    let home = home.ok_or_else(|| {
        BundleError::write(format!("cannot expand `~` in `{template}`: home directory unknown"))
    })?;
    let mut expanded = PathBuf::from(home).display().to_string();
    expanded.push_str(rest);
    Ok(expanded)
}
