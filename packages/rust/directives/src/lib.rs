//! Include-directive resolver.
//!
//! Source files may pull other files in with comment directives:
//!
//! ```text
//! // @require "vendor/jquery.js"
//! /* @import './partials/reset.css' */
//! # @include "helpers.coffee"
//! ```
//!
//! Each directive line is replaced by the target's content (itself resolved
//! recursively), preceded by a comment naming the target. The set of files
//! on the active inclusion chain is threaded by value through the recursion,
//! so a file may be included by two siblings but never by its own
//! descendants.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, instrument};

use bundlekit_shared::{BundleError, Result, is_script, line_comment};

/// Matches a comment-prefixed `@require`/`@import`/`@include` directive and
/// captures the quoted path.
static DIRECTIVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"^\s*(?://+|/\*+|\*|#+|<!--)\s*=?\s*@(?:require|import|include)\s+["']([^"']+)["']"#,
    )
    .expect("valid regex")
});

/// Resolve every directive in `text`, starting a fresh inclusion chain.
///
/// `origin` is the file `text` was read from; it is part of the chain, so a
/// file that includes itself (directly or not) is reported as a cycle.
pub fn resolve(text: &str, extension: &str, origin: &Path) -> Result<String> {
    let reference_dir = origin.parent().unwrap_or_else(|| Path::new("."));
    let mut seen = HashSet::new();
    seen.insert(canonical(origin));
    resolve_with(text, extension, reference_dir, seen)
}

/// Resolve every directive in `text`, relative to `reference_dir`, given the
/// files already on the active chain.
#[instrument(skip_all, fields(extension = %extension, dir = %reference_dir.display(), depth = seen.len()))]
pub fn resolve_with(
    text: &str,
    extension: &str,
    reference_dir: &Path,
    seen: HashSet<PathBuf>,
) -> Result<String> {
    let script = is_script(extension);
    let mut out: Vec<String> = Vec::new();

    for line in text.lines() {
        let Some(caps) = DIRECTIVE_RE.captures(line) else {
            out.push(line.to_string());
            continue;
        };

        let declared = &caps[1];
        let target = reference_dir.join(declared);
        if !target.is_file() {
            return Err(BundleError::Directive {
                target,
                from: reference_dir.to_path_buf(),
            });
        }

        let target = canonical(&target);
        if seen.contains(&target) {
            let mut chain: Vec<PathBuf> = seen.into_iter().collect();
            chain.sort();
            return Err(BundleError::Cycle { target, chain });
        }

        let raw = std::fs::read_to_string(&target).map_err(|e| BundleError::io(&target, e))?;
        let target_dir = target.parent().unwrap_or(reference_dir).to_path_buf();

        let mut branch = seen.clone();
        branch.insert(target.clone());
        let resolved = resolve_with(&raw, extension, &target_dir, branch)?;

        debug!(target = %target.display(), bytes = resolved.len(), "inlined directive");

        if script && !resolved.trim_start().starts_with(';') {
            terminate_previous(&mut out);
        }

        if let Some(tag) = line_comment(extension, declared) {
            out.push(tag);
        }
        // One entry per line, so the terminator check sees the last line.
        out.extend(resolved.trim_end_matches('\n').split('\n').map(str::to_string));
    }

    let mut joined = out.join("\n");
    if text.ends_with('\n') {
        joined.push('\n');
    }
    Ok(joined)
}

/// Append `;` to the last non-blank line when it does not already end a
/// statement, is not mid-expression and is not a comment.
fn terminate_previous(out: &mut [String]) {
    let Some(prev) = out.iter_mut().rev().find(|l| !l.trim().is_empty()) else {
        return;
    };
    let trimmed = prev.trim_end();
    if trimmed.ends_with([';', '{', '[', '(', ','])
        || trimmed.ends_with("*/")
        || trimmed.trim_start().starts_with("//")
    {
        return;
    }
    let len = trimmed.len();
    prev.truncate(len);
    prev.push(';');
}

fn canonical(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "bundlekit-directives-test-{}",
            uuid::Uuid::now_v7()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn text_without_directives_is_unchanged() {
        let tmp = temp_dir();
        let main = write(&tmp, "main.js", "var a = 1;\n");

        let out = resolve("var a = 1;\n", "js", &main).unwrap();
        assert_eq!(out, "var a = 1;\n");

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn inlines_nested_includes_relative_to_each_file() {
        let tmp = temp_dir();
        write(&tmp, "lib/util.js", "// @require \"inner/deep.js\"\nvar util = 1;\n");
        write(&tmp, "lib/inner/deep.js", "var deep = 2;\n");
        let main_src = "// @require \"lib/util.js\"\nvar main = 3;\n";
        let main = write(&tmp, "main.js", main_src);

        let out = resolve(main_src, "js", &main).unwrap();
        let deep_at = out.find("var deep = 2;").unwrap();
        let util_at = out.find("var util = 1;").unwrap();
        let main_at = out.find("var main = 3;").unwrap();
        assert!(deep_at < util_at && util_at < main_at);
        assert!(out.contains("/* lib/util.js */"));
        assert!(out.contains("/* inner/deep.js */"));
        assert!(!out.contains("@require"));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn missing_target_is_a_directive_error() {
        let tmp = temp_dir();
        let src = "/* @import \"nope.css\" */\n";
        let main = write(&tmp, "main.css", src);

        let err = resolve(src, "css", &main).unwrap_err();
        assert!(matches!(err, BundleError::Directive { .. }));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn two_file_cycle_is_detected() {
        let tmp = temp_dir();
        let a_src = "// @include \"b.js\"\nvar a;\n";
        let a = write(&tmp, "a.js", a_src);
        write(&tmp, "b.js", "// @include \"a.js\"\nvar b;\n");

        let err = resolve(a_src, "js", &a).unwrap_err();
        match err {
            BundleError::Cycle { target, .. } => {
                assert_eq!(target.file_name().unwrap(), "a.js");
            }
            other => panic!("expected Cycle, got {other:?}"),
        }

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn siblings_may_include_the_same_file() {
        let tmp = temp_dir();
        write(&tmp, "shared.js", "var shared;\n");
        write(&tmp, "left.js", "// @require \"shared.js\"\n");
        write(&tmp, "right.js", "// @require \"shared.js\"\n");
        let src = "// @require \"left.js\"\n// @require \"right.js\"\n";
        let main = write(&tmp, "main.js", src);

        let out = resolve(src, "js", &main).unwrap();
        assert_eq!(out.matches("var shared;").count(), 2);

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn script_inclusion_terminates_previous_statement() {
        let tmp = temp_dir();
        write(&tmp, "b.js", "var b = 2\n");
        let src = "var a = 1\n// @require \"b.js\"\n";
        let main = write(&tmp, "main.js", src);

        let out = resolve(src, "js", &main).unwrap();
        assert!(out.starts_with("var a = 1;\n"), "got: {out}");

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn comment_lines_are_never_terminated() {
        let tmp = temp_dir();
        write(&tmp, "b.js", "var b = 2\n");
        let src = "/* header */\n// @require \"b.js\"\n";
        let main = write(&tmp, "main.js", src);

        let out = resolve(src, "js", &main).unwrap();
        assert!(out.starts_with("/* header */\n/* b.js */\n"), "got: {out}");

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn included_file_opening_with_a_line_comment_is_still_terminated() {
        let tmp = temp_dir();
        write(&tmp, "a.js", "// a header\nvar x = 1");
        write(&tmp, "b.js", "(function () {})()");
        let src = "// @require \"a.js\"\n// @require \"b.js\"";
        let main = write(&tmp, "main.js", src);

        let out = resolve(src, "js", &main).unwrap();
        assert!(out.contains("// a header\nvar x = 1;\n"), "got: {out}");
        assert!(!out.contains("// a header;"), "got: {out}");

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn script_inclusion_starting_with_terminator_is_left_alone() {
        let tmp = temp_dir();
        write(&tmp, "b.js", ";(function () {})();\n");
        let src = "var a = 1\n// @require \"b.js\"\n";
        let main = write(&tmp, "main.js", src);

        let out = resolve(src, "js", &main).unwrap();
        assert!(out.starts_with("var a = 1\n"), "got: {out}");

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn stylesheets_never_get_terminators() {
        let tmp = temp_dir();
        write(&tmp, "reset.css", "* { margin: 0 }\n");
        let src = "body { color: red }\n/* @import \"reset.css\" */\n";
        let main = write(&tmp, "main.css", src);

        let out = resolve(src, "css", &main).unwrap();
        assert!(out.starts_with("body { color: red }\n"), "got: {out}");
        assert!(out.contains("* { margin: 0 }"));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn native_css_import_is_not_a_directive() {
        let tmp = temp_dir();
        let src = "@import \"theme.css\";\n";
        let main = write(&tmp, "main.css", src);

        let out = resolve(src, "css", &main).unwrap();
        assert_eq!(out, src);

        let _ = std::fs::remove_dir_all(&tmp);
    }
}
