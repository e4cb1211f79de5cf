//! Configuration for bundlekit.
//!
//! Two layers live here:
//! - [`Configuration`]: the `configuration` object of a bundle manifest,
//!   merged over hard-coded defaults.
//! - [`AppConfig`]: the user's `~/.bundlekit/bundlekit.toml`, holding CLI
//!   defaults. CLI flags override config file values, which override defaults.
//!
//! [`EngineEnv`] carries the process environment (home, cwd, user, ...) into
//! the engine so core logic never reads it ambiently.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::{BundleError, Result};
use crate::types::KNOWN_DISTRIBUTIONS;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "bundlekit.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".bundlekit";

// ---------------------------------------------------------------------------
// Manifest configuration
// ---------------------------------------------------------------------------

/// The `configuration` section of a manifest, merged over defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Configuration {
    /// Package name, available to templates as `{name}`.
    #[serde(default = "default_name")]
    pub name: String,

    /// Path to a license header file, relative to the manifest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,

    /// License text, read from `license` during normalization.
    #[serde(skip)]
    pub license_text: Option<String>,

    /// Distribution kind → output path template.
    #[serde(default = "default_dist", deserialize_with = "deserialize_dist")]
    pub dist: BTreeMap<String, String>,

    /// Sub-manifests whose bundles are merged into this one.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub import: Vec<String>,

    /// User-defined template variables.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub tags: Map<String, Value>,

    /// Per-plugin option overrides keyed by plugin name.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub plugins: Map<String, Value>,

    /// Suppress the release-version probe.
    #[serde(default)]
    pub noupdate: bool,

    /// Unrecognized keys, passed through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            name: default_name(),
            license: None,
            license_text: None,
            dist: default_dist(),
            import: Vec::new(),
            tags: Map::new(),
            plugins: Map::new(),
            noupdate: false,
            extra: Map::new(),
        }
    }
}

fn default_name() -> String {
    "bundle".into()
}

fn default_dist() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("dev".to_string(), "dist/{name}.{extension}".to_string()),
        ("min".to_string(), "dist/{name}.min.{extension}".to_string()),
    ])
}

/// `dist` may be a single template or a map of kind → template.
#[derive(Deserialize)]
#[serde(untagged)]
enum DistSpec {
    Single(String),
    PerKind(BTreeMap<String, String>),
}

fn deserialize_dist<'de, D>(deserializer: D) -> std::result::Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match DistSpec::deserialize(deserializer)? {
        DistSpec::Single(template) => expand_dist(&template),
        DistSpec::PerKind(map) => map,
    })
}

/// Expand a single output template over every known distribution kind.
pub fn expand_dist(template: &str) -> BTreeMap<String, String> {
    KNOWN_DISTRIBUTIONS
        .iter()
        .map(|kind| ((*kind).to_string(), template.to_string()))
        .collect()
}

impl Configuration {
    /// Build a configuration from a manifest's raw `configuration` value.
    /// `null` yields the defaults.
    pub fn from_value(value: Value) -> Result<Self> {
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(value)
            .map_err(|e| BundleError::manifest(format!("invalid configuration: {e}")))
    }

    /// Options for the named plugin, or `Value::Null` when none are set.
    pub fn plugin_options(&self, name: &str) -> &Value {
        self.plugins.get(name).unwrap_or(&Value::Null)
    }
}

// ---------------------------------------------------------------------------
// Engine environment
// ---------------------------------------------------------------------------

/// What the writer does with a finished collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PersistMode {
    /// Hand the collection to every registered storage.
    #[default]
    Storage,
    /// Compute everything but persist nothing.
    DryRun,
    /// The caller prints the returned collections itself.
    Stdout,
}

/// Process-wide facts injected into the engine at construction.
#[derive(Debug, Clone)]
pub struct EngineEnv {
    /// The invoking user's home directory (for `~` in output templates).
    pub home: Option<PathBuf>,
    /// Working directory the build was started from.
    pub cwd: PathBuf,
    /// Invoking user name.
    pub user: String,
    /// Host name.
    pub host: String,
    /// Active environment name (`development`, `production`, ...).
    pub environment: String,
    /// Persistence behavior of the writer.
    pub persist: PersistMode,
}

impl EngineEnv {
    /// An environment rooted at `cwd` with placeholder identity values.
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            home: None,
            cwd: cwd.into(),
            user: "unknown".into(),
            host: "unknown".into(),
            environment: default_environment(),
            persist: PersistMode::Storage,
        }
    }

    /// Whether storages should be skipped.
    pub fn skips_storage(&self) -> bool {
        self.persist != PersistMode::Storage
    }
}

// ---------------------------------------------------------------------------
// User config (matching bundlekit.toml schema)
// ---------------------------------------------------------------------------

/// Top-level user config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Environment name exposed to templates as `{environment}`.
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Platform passed to the reducer and compilers.
    #[serde(default = "default_platform")]
    pub platform: String,

    /// Storages to persist through.
    #[serde(default = "default_storages")]
    pub storages: Vec<String>,

    /// Transform stages to run, in order.
    #[serde(default)]
    pub plugins: Vec<String>,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            platform: default_platform(),
            storages: default_storages(),
            plugins: Vec::new(),
        }
    }
}

fn default_environment() -> String {
    "development".into()
}
fn default_platform() -> String {
    "default".into()
}
fn default_storages() -> Vec<String> {
    vec!["disk".into()]
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.bundlekit/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| BundleError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.bundlekit/bundlekit.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the user config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the user config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| BundleError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| BundleError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| BundleError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| BundleError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| BundleError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
