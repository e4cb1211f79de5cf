//! Tag/template generator.
//!
//! [`Tagger::tag`] builds the property bag a collection's output path and
//! license header are templated with. [`template`] substitutes `{a.b.c}`
//! placeholders from any JSON value.

use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::{Arc, LazyLock};

use chrono::{Datelike, Local};
use regex::{Captures, Regex};
use serde_json::{Map, Value, json};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use bundlekit_shared::{Collection, Configuration, EngineEnv};

use crate::cache::ExpiringCache;

static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([^{}\s]+)\}").expect("valid regex"));

/// Version-control collaborator. Failures yield `None`.
pub trait Vcs: Send + Sync {
    /// Current branch of the repository containing `dir`.
    fn branch(&self, dir: &Path) -> Option<String>;
    /// Abbreviated current commit of the repository containing `dir`.
    fn commit(&self, dir: &Path) -> Option<String>;
}

/// Shells out to `git`.
#[derive(Debug, Default, Clone, Copy)]
pub struct GitVcs;

impl GitVcs {
    fn rev_parse(&self, dir: &Path, args: &[&str]) -> Option<String> {
        let output = Command::new("git")
            .arg("rev-parse")
            .args(args)
            .current_dir(dir)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output();

        match output {
            Ok(out) if out.status.success() => {
                let value = String::from_utf8_lossy(&out.stdout).trim().to_string();
                (!value.is_empty()).then_some(value)
            }
            Ok(out) => {
                debug!(dir = %dir.display(), status = %out.status, "git rev-parse failed");
                None
            }
            Err(e) => {
                warn!(error = %e, "could not run git, branch/commit tags will be empty");
                None
            }
        }
    }
}

impl Vcs for GitVcs {
    fn branch(&self, dir: &Path) -> Option<String> {
        self.rev_parse(dir, &["--abbrev-ref", "HEAD"])
    }

    fn commit(&self, dir: &Path) -> Option<String> {
        self.rev_parse(dir, &["--short", "HEAD"])
    }
}

/// Builds property bags, memoizing VCS lookups for the current build.
pub struct Tagger {
    vcs: Arc<dyn Vcs>,
    cache: ExpiringCache<&'static str, String>,
}

impl Tagger {
    pub fn new(vcs: Arc<dyn Vcs>) -> Self {
        Self {
            vcs,
            cache: ExpiringCache::default(),
        }
    }

    /// Begin a build: VCS lookups are cached from here on.
    pub fn start(&self) {
        self.cache.start();
    }

    /// End a build and forget cached lookups.
    pub fn stop(&self) {
        self.cache.stop();
    }

    /// Property bag for `collection`. User `tags` from the configuration
    /// are included; built-in keys win on collision.
    pub fn tag(
        &self,
        collection: &Collection,
        configuration: &Configuration,
        env: &EngineEnv,
        root: &Path,
    ) -> Map<String, Value> {
        let mut bag = configuration.tags.clone();

        let now = Local::now();
        let branch = self
            .cache
            .get_or_insert_with("branch", || self.vcs.branch(root).unwrap_or_default());
        let commit = self
            .cache
            .get_or_insert_with("commit", || self.vcs.commit(root).unwrap_or_default());

        let builtins = [
            ("hash", json!(sha256_hex(&collection.content))),
            ("extension", json!(collection.extension)),
            ("platform", json!(collection.platform)),
            ("distribution", json!(collection.distribution)),
            ("type", json!("bundle")),
            ("name", json!(configuration.name)),
            ("date", json!(now.format("%Y-%m-%d").to_string())),
            ("year", json!(now.year())),
            ("user", json!(env.user)),
            ("host", json!(env.host)),
            ("environment", json!(env.environment)),
            ("branch", json!(branch)),
            ("commit", json!(commit)),
        ];
        for (key, value) in builtins {
            bag.insert(key.to_string(), value);
        }

        bag
    }
}

impl std::fmt::Debug for Tagger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tagger").field("cache", &self.cache).finish()
    }
}

/// Replace every `{a.b.c}` in `input` with the value at that dotted path in
/// `data`. Numeric segments index arrays. Missing and null values render as
/// an empty string.
pub fn template(input: &str, data: &Value) -> String {
    PLACEHOLDER_RE
        .replace_all(input, |caps: &Captures<'_>| render(lookup(data, &caps[1])))
        .into_owned()
}

fn lookup<'a>(data: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(data, |value, segment| match value {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn render(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn sha256_hex(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingVcs {
        branches: AtomicUsize,
        commits: AtomicUsize,
    }

    impl Vcs for CountingVcs {
        fn branch(&self, _dir: &Path) -> Option<String> {
            self.branches.fetch_add(1, Ordering::SeqCst);
            Some("main".into())
        }
        fn commit(&self, _dir: &Path) -> Option<String> {
            self.commits.fetch_add(1, Ordering::SeqCst);
            None
        }
    }

    fn env() -> EngineEnv {
        EngineEnv {
            user: "ada".into(),
            host: "forge".into(),
            ..EngineEnv::new("/work")
        }
    }

    #[test]
    fn template_resolves_dotted_paths() {
        assert_eq!(template("{a.b}", &json!({ "a": { "b": "ok" } })), "ok");
        assert_eq!(template("{missing}", &json!({})), "");
        assert_eq!(template("{list.1}", &json!({ "list": ["x", "y"] })), "y");
        assert_eq!(
            template("v{n}-{flag}-{nil}", &json!({ "n": 3, "flag": true, "nil": null })),
            "v3-true-"
        );
        assert_eq!(template("no placeholders", &json!({})), "no placeholders");
        assert_eq!(template("{a.b.c}", &json!({ "a": "leaf" })), "");
    }

    #[test]
    fn tag_contains_builtin_fields() {
        let tagger = Tagger::new(Arc::new(CountingVcs::default()));
        tagger.start();
        let configuration = Configuration {
            name: "app".into(),
            ..Configuration::default()
        };
        let collection = Collection::new("abc", "js", "browser", "min");

        let bag = tagger.tag(&collection, &configuration, &env(), Path::new("/work"));
        assert_eq!(
            bag["hash"],
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(bag["extension"], "js");
        assert_eq!(bag["platform"], "browser");
        assert_eq!(bag["distribution"], "min");
        assert_eq!(bag["type"], "bundle");
        assert_eq!(bag["name"], "app");
        assert_eq!(bag["user"], "ada");
        assert_eq!(bag["host"], "forge");
        assert_eq!(bag["environment"], "development");
        assert_eq!(bag["branch"], "main");
        assert_eq!(bag["commit"], "");
        assert_eq!(bag["date"].as_str().unwrap().len(), 10);
        assert!(bag["year"].as_i64().unwrap() >= 2024);
    }

    #[test]
    fn builtin_keys_win_over_user_tags() {
        let tagger = Tagger::new(Arc::new(CountingVcs::default()));
        let mut configuration = Configuration::default();
        configuration.tags.insert("name".into(), json!("spoofed"));
        configuration.tags.insert("homepage".into(), json!("https://example.com"));

        let bag = tagger.tag(
            &Collection::new("", "css", "default", "dev"),
            &configuration,
            &env(),
            Path::new("/work"),
        );
        assert_eq!(bag["name"], "bundle");
        assert_eq!(bag["homepage"], "https://example.com");
    }

    #[test]
    fn vcs_is_queried_once_per_build() {
        let vcs = Arc::new(CountingVcs::default());
        let tagger = Tagger::new(vcs.clone());
        let configuration = Configuration::default();
        let collection = Collection::new("x", "js", "default", "dev");

        tagger.start();
        tagger.tag(&collection, &configuration, &env(), Path::new("/work"));
        tagger.tag(&collection, &configuration, &env(), Path::new("/work"));
        assert_eq!(vcs.branches.load(Ordering::SeqCst), 1);
        // An empty commit is cached too.
        assert_eq!(vcs.commits.load(Ordering::SeqCst), 1);

        tagger.stop();
        tagger.start();
        tagger.tag(&collection, &configuration, &env(), Path::new("/work"));
        assert_eq!(vcs.branches.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn git_outside_a_repository_yields_nothing() {
        let dir = std::env::temp_dir().join(format!("bundlekit-tags-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        // Either git is missing or the directory is not a work tree; both
        // paths must come back empty rather than failing.
        let _ = GitVcs.branch(&dir);
        assert!(GitVcs.commit(Path::new("/nonexistent/bundlekit")).is_none());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
