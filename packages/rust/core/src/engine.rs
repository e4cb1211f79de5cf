//! Build orchestration: package → reduce → transform → write.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tracing::{debug, info, instrument};

use bundlekit_manifest::{CompilerRegistry, ManifestSource, Package};
use bundlekit_shared::{BuildId, Collection, EngineEnv, Result};
use bundlekit_storage::StorageRegistry;

use crate::pipeline::{self, StageRegistry, TransformStage};
use crate::reducer;
use crate::tags::{Tagger, Vcs};
use crate::writer::Writer;

/// Per-build options.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Platform handed to compilers.
    pub platform: String,
    /// Output extensions to build; `None` builds every extension the tree
    /// produces.
    pub extensions: Option<Vec<String>>,
    /// Distribution kinds to build; `None` builds every configured kind.
    pub distributions: Option<Vec<String>>,
    /// Transform stages, in order.
    pub stages: Vec<String>,
    /// Storages to persist through.
    pub storages: Vec<String>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            platform: "default".into(),
            extensions: None,
            distributions: None,
            stages: Vec::new(),
            storages: vec![bundlekit_storage::DiskStorage::NAME.to_string()],
        }
    }
}

/// Result of a build.
#[derive(Debug)]
pub struct BuildReport {
    pub build_id: BuildId,
    /// Written collections, by extension then distribution.
    pub collections: Vec<Collection>,
    pub elapsed: Duration,
}

/// Progress callback for build steps.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after an extension has been reduced.
    fn reduced(&self, extension: &str, bytes: usize);
    /// Called after a collection has been written.
    fn written(&self, collection: &Collection);
    /// Called when the build completes.
    fn done(&self, report: &BuildReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn reduced(&self, _extension: &str, _bytes: usize) {}
    fn written(&self, _collection: &Collection) {}
    fn done(&self, _report: &BuildReport) {}
}

/// The build engine. Holds the host's collaborators and the injected
/// environment; one engine can run any number of builds, concurrently too.
/// Nothing mutable is shared between builds.
pub struct Engine {
    env: EngineEnv,
    compilers: CompilerRegistry,
    stages: StageRegistry,
    storages: StorageRegistry,
    vcs: Arc<dyn Vcs>,
}

impl Engine {
    pub fn new(
        env: EngineEnv,
        compilers: CompilerRegistry,
        stages: StageRegistry,
        storages: StorageRegistry,
        vcs: Arc<dyn Vcs>,
    ) -> Self {
        Self {
            env,
            compilers,
            stages,
            storages,
            vcs,
        }
    }

    pub fn env(&self) -> &EngineEnv {
        &self.env
    }

    /// Parse a manifest with this engine's compilers.
    pub fn load(&self, source: ManifestSource) -> Result<Package> {
        bundlekit_manifest::parse(source, &self.compilers)
    }

    /// Build every requested extension × distribution of `package`.
    ///
    /// Each call gets its own VCS cache, which lives exactly as long as the
    /// call, whatever the outcome. Every extension settles before an error
    /// is returned, so storages already in flight are never cut off.
    #[instrument(skip_all, fields(root = %package.root.display(), platform = %options.platform))]
    pub async fn build(
        &self,
        package: &Package,
        options: &BuildOptions,
        progress: &dyn ProgressReporter,
    ) -> Result<BuildReport> {
        let start = Instant::now();
        let build_id = BuildId::new();
        info!(%build_id, bundles = package.tree.len(), "starting build");

        let tagger = Tagger::new(self.vcs.clone());
        tagger.start();
        let result = self.run(package, options, &tagger, progress).await;
        tagger.stop();

        let report = BuildReport {
            build_id,
            collections: result?,
            elapsed: start.elapsed(),
        };
        info!(
            build_id = %report.build_id,
            collections = report.collections.len(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "build complete"
        );
        progress.done(&report);
        Ok(report)
    }

    async fn run(
        &self,
        package: &Package,
        options: &BuildOptions,
        tagger: &Tagger,
        progress: &dyn ProgressReporter,
    ) -> Result<Vec<Collection>> {
        let configuration = &package.configuration;

        progress.phase("Preparing plugins");
        let stages = self.stages.create(&options.stages, configuration)?;
        let storages = self.storages.create(&options.storages)?;

        let extensions = options
            .extensions
            .clone()
            .unwrap_or_else(|| package.tree.output_extensions());
        let distributions = options
            .distributions
            .clone()
            .unwrap_or_else(|| configuration.dist.keys().cloned().collect());

        let writer = Writer {
            package,
            env: &self.env,
            tagger,
            storages: &storages,
        };

        progress.phase("Building");
        let settled = join_all(extensions.iter().map(|extension| {
            self.build_extension(
                package,
                extension,
                &distributions,
                options,
                &stages,
                &writer,
                progress,
            )
        }))
        .await;

        let mut collections = Vec::new();
        for result in settled {
            collections.extend(result?);
        }
        Ok(collections)
    }

    #[allow(clippy::too_many_arguments)]
    async fn build_extension(
        &self,
        package: &Package,
        extension: &str,
        distributions: &[String],
        options: &BuildOptions,
        stages: &[Arc<dyn TransformStage>],
        writer: &Writer<'_>,
        progress: &dyn ProgressReporter,
    ) -> Result<Vec<Collection>> {
        let Some(content) = reducer::reduce_extension(&package.tree, &options.platform, extension)?
        else {
            debug!(%extension, "nothing to build");
            return Ok(Vec::new());
        };
        progress.reduced(extension, content.len());

        let mut written = Vec::with_capacity(distributions.len());
        for distribution in distributions {
            let collection =
                Collection::new(content.clone(), extension, &options.platform, distribution);
            let collection = pipeline::run(collection, stages).await?;
            let collection = writer.write(collection).await?;
            progress.written(&collection);
            written.push(collection);
        }
        Ok(written)
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("env", &self.env)
            .field("compilers", &self.compilers)
            .field("stages", &self.stages)
            .field("storages", &self.storages)
            .finish()
    }
}
