//! Transform pipeline: reduced collection → stage → stage → ... → writer.
//!
//! Stages run strictly in sequence. Each one receives the working
//! [`Collection`] by value and either returns a replacement, declines
//! (`Ok(None)`, the working value reverts to what it was before the stage),
//! or fails. A failure skips every remaining stage and carries the last
//! successfully produced collection.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, instrument};

use bundlekit_shared::{BundleError, Collection, Configuration, Result, is_script};

/// One step of the transform pipeline.
#[async_trait]
pub trait TransformStage: Send + Sync {
    /// Registry name, used in logs and errors.
    fn name(&self) -> &str;

    /// Transform the collection. `Ok(None)` means "no replacement".
    async fn transform(&self, collection: Collection) -> Result<Option<Collection>>;
}

/// Run `collection` through `stages` in order.
#[instrument(skip_all, fields(extension = %collection.extension, distribution = %collection.distribution, stages = stages.len()))]
pub async fn run(mut collection: Collection, stages: &[Arc<dyn TransformStage>]) -> Result<Collection> {
    if is_script(&collection.extension) && !collection.content.trim_end().ends_with(';') {
        collection.content.push(';');
    }

    for stage in stages {
        let snapshot = collection.clone();
        match stage.transform(collection).await {
            Ok(Some(next)) => {
                debug!(stage = stage.name(), bytes = next.content.len(), "stage replaced collection");
                collection = next;
            }
            Ok(None) => {
                debug!(stage = stage.name(), "stage declined, keeping previous value");
                collection = snapshot;
            }
            Err(e) => {
                return Err(BundleError::Pipeline {
                    stage: stage.name().to_string(),
                    message: e.to_string(),
                    partial: Box::new(snapshot),
                });
            }
        }
    }

    Ok(collection)
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Builds a stage from its option object (`configuration.plugins[name]`).
pub type StageFactory = Arc<dyn Fn(&Value) -> Result<Arc<dyn TransformStage>> + Send + Sync>;

/// Name → stage factory.
#[derive(Clone)]
pub struct StageRegistry {
    factories: BTreeMap<String, StageFactory>,
}

impl StageRegistry {
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// A registry with `strip-whitespace` and `final-newline`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register(
            StripWhitespace::NAME,
            Arc::new(|_: &Value| Ok(Arc::new(StripWhitespace) as Arc<dyn TransformStage>)),
        );
        registry.register(
            FinalNewline::NAME,
            Arc::new(|options: &Value| {
                Ok(Arc::new(FinalNewline::from_options(options)?) as Arc<dyn TransformStage>)
            }),
        );
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, factory: StageFactory) {
        self.factories.insert(name.into(), factory);
    }

    /// Instantiate the named stages with their options from `configuration`.
    pub fn create(
        &self,
        names: &[String],
        configuration: &Configuration,
    ) -> Result<Vec<Arc<dyn TransformStage>>> {
        names
            .iter()
            .map(|name| {
                let factory = self.factories.get(name).ok_or_else(|| {
                    BundleError::plugin(format!(
                        "unknown transform `{name}` (available: {})",
                        self.names().join(", ")
                    ))
                })?;
                factory(configuration.plugin_options(name))
            })
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }
}

impl Default for StageRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl std::fmt::Debug for StageRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageRegistry")
            .field("names", &self.names())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Built-in stages
// ---------------------------------------------------------------------------

/// Removes trailing whitespace from every line.
#[derive(Debug, Clone, Copy)]
pub struct StripWhitespace;

impl StripWhitespace {
    pub const NAME: &'static str = "strip-whitespace";
}

#[async_trait]
impl TransformStage for StripWhitespace {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn transform(&self, collection: Collection) -> Result<Option<Collection>> {
        let stripped = collection
            .content
            .lines()
            .map(str::trim_end)
            .collect::<Vec<_>>()
            .join("\n");
        let stripped = if collection.content.ends_with('\n') {
            stripped + "\n"
        } else {
            stripped
        };

        if stripped == collection.content {
            return Ok(None);
        }
        Ok(Some(collection.with_content(stripped)))
    }
}

/// Ensures the content ends with exactly one newline.
#[derive(Debug, Clone, Copy)]
pub struct FinalNewline {
    enabled: bool,
}

impl FinalNewline {
    pub const NAME: &'static str = "final-newline";

    /// Options: `{ "enabled": bool }`, default enabled.
    pub fn from_options(options: &Value) -> Result<Self> {
        let enabled = match options.get("enabled") {
            None | Some(Value::Null) => true,
            Some(Value::Bool(b)) => *b,
            Some(other) => {
                return Err(BundleError::plugin(format!(
                    "{}: `enabled` must be a boolean, got {other}",
                    Self::NAME
                )));
            }
        };
        Ok(Self { enabled })
    }
}

#[async_trait]
impl TransformStage for FinalNewline {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn transform(&self, collection: Collection) -> Result<Option<Collection>> {
        if !self.enabled {
            return Ok(None);
        }
        let content = format!("{}\n", collection.content.trim_end_matches('\n'));
        Ok(Some(collection.with_content(content)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct AddSuffix(&'static str);

    #[async_trait]
    impl TransformStage for AddSuffix {
        fn name(&self) -> &str {
            "add-suffix"
        }
        async fn transform(&self, collection: Collection) -> Result<Option<Collection>> {
            let content = format!("{}{}", collection.content, self.0);
            Ok(Some(collection.with_content(content)))
        }
    }

    /// Mangles its input, then declines.
    struct Noop;

    #[async_trait]
    impl TransformStage for Noop {
        fn name(&self) -> &str {
            "noop"
        }
        async fn transform(&self, mut collection: Collection) -> Result<Option<Collection>> {
            collection.content.clear();
            Ok(None)
        }
    }

    struct Throws;

    #[async_trait]
    impl TransformStage for Throws {
        fn name(&self) -> &str {
            "throws"
        }
        async fn transform(&self, _collection: Collection) -> Result<Option<Collection>> {
            Err(BundleError::plugin("boom"))
        }
    }

    #[derive(Default)]
    struct NeverRun {
        ran: AtomicBool,
    }

    #[async_trait]
    impl TransformStage for NeverRun {
        fn name(&self) -> &str {
            "never-run"
        }
        async fn transform(&self, collection: Collection) -> Result<Option<Collection>> {
            self.ran.store(true, Ordering::SeqCst);
            Ok(Some(collection))
        }
    }

    fn text(content: &str) -> Collection {
        Collection::new(content, "txt", "default", "dev")
    }

    #[tokio::test]
    async fn declined_stage_rolls_back() {
        let stages: Vec<Arc<dyn TransformStage>> =
            vec![Arc::new(AddSuffix("X")), Arc::new(Noop), Arc::new(AddSuffix("Y"))];
        let out = run(text("C"), &stages).await.unwrap();
        assert_eq!(out.content, "CXY");
    }

    #[tokio::test]
    async fn failing_stage_short_circuits() {
        let never = Arc::new(NeverRun::default());
        let stages: Vec<Arc<dyn TransformStage>> =
            vec![Arc::new(AddSuffix("ok")), Arc::new(Throws), never.clone()];

        let err = run(text("C"), &stages).await.unwrap_err();
        assert!(err.to_string().contains("boom"));
        assert!(err.to_string().contains("throws"));
        assert_eq!(err.partial().unwrap().content, "Cok");
        assert!(!never.ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn scripts_get_a_trailing_terminator() {
        let out = run(Collection::new("var a = 1\n", "js", "default", "dev"), &[])
            .await
            .unwrap();
        assert_eq!(out.content, "var a = 1\n;");

        let out = run(Collection::new("var a = 1;  ", "js", "default", "dev"), &[])
            .await
            .unwrap();
        assert_eq!(out.content, "var a = 1;  ");

        let out = run(text("plain"), &[]).await.unwrap();
        assert_eq!(out.content, "plain");
    }

    #[tokio::test]
    async fn strip_whitespace_declines_when_clean() {
        let stage = StripWhitespace;
        assert!(stage.transform(text("a\nb\n")).await.unwrap().is_none());

        let out = stage.transform(text("a  \nb\t\n")).await.unwrap().unwrap();
        assert_eq!(out.content, "a\nb\n");
    }

    #[tokio::test]
    async fn final_newline_respects_options() {
        let stage = FinalNewline::from_options(&Value::Null).unwrap();
        let out = stage.transform(text("a\n\n\n")).await.unwrap().unwrap();
        assert_eq!(out.content, "a\n");

        let disabled = FinalNewline::from_options(&json!({ "enabled": false })).unwrap();
        assert!(disabled.transform(text("a")).await.unwrap().is_none());

        assert!(FinalNewline::from_options(&json!({ "enabled": "yes" })).is_err());
    }

    #[test]
    fn registry_passes_plugin_options() {
        let registry = StageRegistry::with_builtins();
        assert_eq!(registry.names(), vec!["final-newline", "strip-whitespace"]);

        let configuration = Configuration::from_value(json!({
            "plugins": { "final-newline": { "enabled": "nope" } }
        }))
        .unwrap();
        let err = registry
            .create(&["final-newline".to_string()], &configuration)
            .err()
            .unwrap();
        assert!(err.to_string().contains("must be a boolean"));

        let stages = registry
            .create(&["strip-whitespace".to_string()], &Configuration::default())
            .unwrap();
        assert_eq!(stages[0].name(), "strip-whitespace");
    }

    #[test]
    fn registry_rejects_unknown_stage() {
        let err = StageRegistry::with_builtins()
            .create(&["minify".to_string()], &Configuration::default())
            .err()
            .unwrap();
        assert!(err.to_string().contains("unknown transform `minify`"));
    }
}
