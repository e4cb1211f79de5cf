//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::sync::Arc;

use bundlekit_core::{
    BuildOptions, BuildReport, Engine, GitVcs, ProgressReporter, StageRegistry,
};
use bundlekit_manifest::{CompilerRegistry, ManifestSource};
use bundlekit_shared::{
    AppConfig, Collection, EngineEnv, PersistMode, init_config, load_config,
};
use bundlekit_storage::StorageRegistry;
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// bundlekit: concatenate, transform and publish asset bundles.
#[derive(Parser)]
#[command(
    name = "bundlekit",
    version,
    about = "Build asset bundles (scripts, stylesheets, ...) from a JSON manifest.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Build every bundle declared in a manifest.
    Build(BuildArgs),

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Arguments of `bundlekit build`.
#[derive(clap::Args)]
pub(crate) struct BuildArgs {
    /// Manifest file.
    #[arg(default_value = "bundle.json")]
    pub manifest: PathBuf,

    /// Output extensions to build (comma-separated). Defaults to all.
    #[arg(long, value_delimiter = ',')]
    pub ext: Vec<String>,

    /// Distribution kinds to build (comma-separated). Defaults to all.
    #[arg(long, value_delimiter = ',')]
    pub dist_kind: Vec<String>,

    /// Transform stage to run (repeatable, in order). Overrides the config file.
    #[arg(long = "plugin")]
    pub plugins: Vec<String>,

    /// Storage to persist through (repeatable). Overrides the config file.
    #[arg(long = "storage")]
    pub storages: Vec<String>,

    /// Override an output template, e.g. `--out min=build/{name}.min.{extension}`.
    #[arg(long = "out", value_parser = parse_out)]
    pub outputs: Vec<(String, String)>,

    /// Platform handed to compilers.
    #[arg(long)]
    pub platform: Option<String>,

    /// Environment name exposed to templates.
    #[arg(long = "env", env = "BUNDLEKIT_ENV")]
    pub environment: Option<String>,

    /// Build everything but persist nothing.
    #[arg(long, conflicts_with = "stdout")]
    pub dry_run: bool,

    /// Print the built bundles instead of persisting them.
    #[arg(long)]
    pub stdout: bool,
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

fn parse_out(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((kind, template)) if !kind.is_empty() && !template.is_empty() => {
            Ok((kind.to_string(), template.to_string()))
        }
        _ => Err(format!("expected KIND=TEMPLATE, got `{raw}`")),
    }
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "bundlekit=info",
        1 => "bundlekit=debug",
        _ => "bundlekit=trace",
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Build(args) => cmd_build(args).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Build
// ---------------------------------------------------------------------------

async fn cmd_build(args: BuildArgs) -> Result<()> {
    let config = load_config()?;
    let env = engine_env(&args, &config)?;
    let persist = env.persist;

    let engine = Engine::new(
        env,
        CompilerRegistry::new(),
        StageRegistry::with_builtins(),
        StorageRegistry::with_builtins(),
        Arc::new(GitVcs),
    );

    let mut package = engine
        .load(ManifestSource::Path(args.manifest.clone()))
        .wrap_err_with(|| format!("failed to load {}", args.manifest.display()))?;
    for (kind, template) in &args.outputs {
        info!(%kind, %template, "output template override");
        package.configuration.dist.insert(kind.clone(), template.clone());
    }

    let options = build_options(&args, &config);
    let reporter = CliProgress::new();
    let result = engine.build(&package, &options, &reporter).await;
    reporter.spinner.finish_and_clear();

    let report = match result {
        Ok(report) => report,
        Err(e) => {
            if let Some(partial) = e.partial() {
                warn!(
                    extension = %partial.extension,
                    distribution = %partial.distribution,
                    bytes = partial.content.len(),
                    "transform stage failed, partial result not written"
                );
            }
            return Err(e).wrap_err_with(|| {
                format!(
                    "bundlekit {} ({}) build failed",
                    env!("CARGO_PKG_VERSION"),
                    std::env::consts::OS
                )
            });
        }
    };

    if persist == PersistMode::Stdout {
        print_collections(&report.collections);
        return Ok(());
    }

    print_summary(&report, persist);
    Ok(())
}

/// Collect the process environment once, at the edge.
fn engine_env(args: &BuildArgs, config: &AppConfig) -> Result<EngineEnv> {
    let cwd =
        std::env::current_dir().map_err(|e| eyre!("cannot determine working directory: {e}"))?;

    let persist = if args.stdout {
        PersistMode::Stdout
    } else if args.dry_run {
        PersistMode::DryRun
    } else {
        PersistMode::Storage
    };

    Ok(EngineEnv {
        home: dirs::home_dir(),
        cwd,
        user: whoami::username(),
        host: whoami::fallible::hostname().unwrap_or_else(|_| "unknown".to_string()),
        environment: args
            .environment
            .clone()
            .unwrap_or_else(|| config.defaults.environment.clone()),
        persist,
    })
}

/// CLI flags override the config file.
fn build_options(args: &BuildArgs, config: &AppConfig) -> BuildOptions {
    let defaults = &config.defaults;
    BuildOptions {
        platform: args
            .platform
            .clone()
            .unwrap_or_else(|| defaults.platform.clone()),
        extensions: (!args.ext.is_empty()).then(|| args.ext.clone()),
        distributions: (!args.dist_kind.is_empty()).then(|| args.dist_kind.clone()),
        stages: if args.plugins.is_empty() {
            defaults.plugins.clone()
        } else {
            args.plugins.clone()
        },
        storages: if args.storages.is_empty() {
            defaults.storages.clone()
        } else {
            args.storages.clone()
        },
    }
}

fn print_collections(collections: &[Collection]) {
    let headers = collections.len() > 1;
    for collection in collections {
        if headers {
            println!(
                "==> {} <==",
                collection.basename.as_deref().unwrap_or(&collection.extension)
            );
        }
        println!("{}", collection.content);
    }
}

fn print_summary(report: &BuildReport, persist: PersistMode) {
    println!();
    if persist == PersistMode::DryRun {
        println!("  Dry run: nothing was written.");
    } else {
        println!("  Bundles built successfully!");
    }
    println!("  Build:  {}", report.build_id);
    for collection in &report.collections {
        let file = collection
            .file
            .as_ref()
            .map(|f| f.display().to_string())
            .unwrap_or_default();
        println!(
            "  {:<4} {:<4} {} ({} bytes)",
            collection.extension,
            collection.distribution,
            file,
            collection.content.len()
        );
    }
    println!("  Time:   {:.1}s", report.elapsed.as_secs_f64());
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .expect("valid progress template")
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn reduced(&self, extension: &str, bytes: usize) {
        self.spinner
            .set_message(format!("Reduced .{extension} ({bytes} bytes)"));
    }

    fn written(&self, collection: &Collection) {
        let name = collection.basename.as_deref().unwrap_or(&collection.extension);
        self.spinner.set_message(format!("Wrote {name}"));
    }

    fn done(&self, _report: &BuildReport) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_overrides_parse() {
        assert_eq!(
            parse_out("min=build/{name}.min.js").unwrap(),
            ("min".to_string(), "build/{name}.min.js".to_string())
        );
        assert!(parse_out("min").is_err());
        assert!(parse_out("=x").is_err());
    }

    #[test]
    fn flags_override_config_defaults() {
        let cli = Cli::parse_from([
            "bundlekit",
            "build",
            "app.json",
            "--ext",
            "js,css",
            "--plugin",
            "final-newline",
            "--platform",
            "browser",
        ]);
        let Command::Build(args) = cli.command else {
            panic!("expected build");
        };
        let options = build_options(&args, &AppConfig::default());

        assert_eq!(args.manifest, PathBuf::from("app.json"));
        assert_eq!(options.platform, "browser");
        assert_eq!(options.extensions, Some(vec!["js".to_string(), "css".to_string()]));
        assert_eq!(options.distributions, None);
        assert_eq!(options.stages, vec!["final-newline"]);
        assert_eq!(options.storages, vec!["disk"]);
    }

    #[test]
    fn dry_run_and_stdout_conflict() {
        let parsed = Cli::try_parse_from(["bundlekit", "build", "--dry-run", "--stdout"]);
        assert!(parsed.is_err());
    }
}
