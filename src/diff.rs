//! Structural extraction of touched file paths from unified diffs.
//!
//! Only file-header lines are parsed (`diff --git`, `---`/`+++` pairs); hunk
//! bodies are skipped entirely because nothing downstream needs them. The
//! extracted list preserves first-seen order with duplicates removed, so the
//! same patch always yields the same path sequence.

use crate::error::{Error, Result};
use std::collections::BTreeSet;
use std::ffi::OsStr;
use std::path::Path;

const DEV_NULL: &str = "/dev/null";

/// Extract the ordered, deduplicated list of file paths a diff touches.
///
/// Blank input yields an empty list (a patch that touches nothing is not
/// malformed). Non-blank input with no recognizable file header fails with
/// [`Error::MalformedDiff`] before any command synthesis can happen.
pub fn modified_files(diff: &str) -> Result<Vec<String>> {
    if diff.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut ordered = Vec::new();
    let mut seen = BTreeSet::new();
    let mut push = |path: String| {
        if !path.is_empty() && seen.insert(path.clone()) {
            ordered.push(path);
        }
    };

    let git_mode = diff.lines().any(|line| line.starts_with("diff --git "));
    if git_mode {
        for line in diff.lines() {
            if let Some(path) = parse_git_header(line) {
                push(path);
            }
        }
    } else {
        // Plain unified diff: `---` immediately followed by `+++`. The target
        // path wins unless the file was deleted.
        let lines: Vec<&str> = diff.lines().collect();
        for window in lines.windows(2) {
            let (Some(old), Some(new)) = (
                header_path(window[0], "--- ", "a/"),
                header_path(window[1], "+++ ", "b/"),
            ) else {
                continue;
            };
            let path = if new == DEV_NULL { old } else { new };
            if path != DEV_NULL {
                push(path);
            }
        }
    }

    if ordered.is_empty() {
        return Err(Error::malformed_diff(
            "no file headers found in non-empty diff text",
        ));
    }
    Ok(ordered)
}

/// [`modified_files`] wrapped into [`TouchedPath`] values for classification.
pub fn touched_paths(diff: &str) -> Result<Vec<TouchedPath>> {
    Ok(modified_files(diff)?
        .into_iter()
        .map(TouchedPath::new)
        .collect())
}

/// Post-image path from a `diff --git a/X b/Y` line.
///
/// Git emits the quoted form for unusual paths; for deletions the post-image
/// path equals the pre-image path, so taking `b/` is always correct.
fn parse_git_header(line: &str) -> Option<String> {
    let rest = line.strip_prefix("diff --git ")?.trim();
    if rest.starts_with('"') {
        let close = rest[1..].find('"')? + 1;
        let target = rest[close + 1..].trim();
        let target = target.strip_prefix('"').unwrap_or(target);
        let target = target.strip_suffix('"').unwrap_or(target);
        return target.strip_prefix("b/").map(str::to_string);
    }
    let split = rest.rfind(" b/")?;
    Some(rest[split + 3..].to_string())
}

/// Path from a `--- ` / `+++ ` header line, with the diff prefix and any
/// trailing tab-separated timestamp removed.
fn header_path(line: &str, marker: &str, strip: &str) -> Option<String> {
    let rest = line.strip_prefix(marker)?;
    let rest = rest.split('\t').next().unwrap_or(rest).trim();
    if rest == DEV_NULL {
        return Some(DEV_NULL.to_string());
    }
    Some(rest.strip_prefix(strip).unwrap_or(rest).to_string())
}

/// A normalized repository-relative path with the accessors strategies
/// classify on.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct TouchedPath {
    path: String,
}

impl TouchedPath {
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.path
    }

    /// Plain string-prefix check, matching the convention rules downstream.
    #[must_use]
    pub fn has_prefix(&self, prefix: &str) -> bool {
        self.path.starts_with(prefix)
    }

    /// The `idx`-th `/`-separated segment, if present.
    #[must_use]
    pub fn segment(&self, idx: usize) -> Option<&str> {
        self.path.split('/').nth(idx)
    }

    /// File name with its last extension removed.
    #[must_use]
    pub fn stem(&self) -> &str {
        Path::new(&self.path)
            .file_stem()
            .and_then(OsStr::to_str)
            .unwrap_or("")
    }

    /// Last extension, without the dot.
    #[must_use]
    pub fn extension(&self) -> Option<&str> {
        Path::new(&self.path).extension().and_then(OsStr::to_str)
    }

    /// True when the path ends with any of the given suffixes.
    #[must_use]
    pub fn ends_with_any(&self, suffixes: &[&str]) -> bool {
        suffixes.iter().any(|s| self.path.ends_with(s))
    }
}

impl std::fmt::Display for TouchedPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const GIT_DIFF: &str = "\
diff --git a/tests/languages/python/sample.test.js b/tests/languages/python/sample.test.js
index 1111111..2222222 100644
--- a/tests/languages/python/sample.test.js
+++ b/tests/languages/python/sample.test.js
@@ -1,3 +1,4 @@
 line
+added
 line
diff --git a/tests/core/greedy.js b/tests/core/greedy.js
--- a/tests/core/greedy.js
+++ b/tests/core/greedy.js
@@ -1 +1,2 @@
 x
+y
";

    #[test]
    fn test_git_mode_preserves_first_seen_order() {
        let files = modified_files(GIT_DIFF).expect("parse");
        assert_eq!(
            files,
            vec![
                "tests/languages/python/sample.test.js".to_string(),
                "tests/core/greedy.js".to_string(),
            ]
        );
    }

    #[test]
    fn test_duplicate_headers_collapse() {
        let doubled = format!("{GIT_DIFF}{GIT_DIFF}");
        let files = modified_files(&doubled).expect("parse");
        assert_eq!(files.len(), 2);
    }

    #[test]
    fn test_plain_mode_prefers_target_path() {
        let diff = "\
--- a/old/name.js\t2021-01-01 00:00:00
+++ b/new/name.js\t2021-01-02 00:00:00
@@ -1 +1 @@
-x
+y
";
        let files = modified_files(diff).expect("parse");
        assert_eq!(files, vec!["new/name.js".to_string()]);
    }

    #[test]
    fn test_plain_mode_deletion_falls_back_to_source() {
        let diff = "\
--- a/gone/file.js
+++ /dev/null
@@ -1 +0,0 @@
-x
";
        let files = modified_files(diff).expect("parse");
        assert_eq!(files, vec!["gone/file.js".to_string()]);
    }

    #[test]
    fn test_quoted_git_header() {
        let diff = "diff --git \"a/dir/spaced name.js\" \"b/dir/spaced name.js\"\n";
        let files = modified_files(diff).expect("parse");
        assert_eq!(files, vec!["dir/spaced name.js".to_string()]);
    }

    #[test]
    fn test_blank_diff_is_empty_not_malformed() {
        assert!(modified_files("   \n").expect("parse").is_empty());
    }

    #[test]
    fn test_headerless_text_is_malformed() {
        let err = modified_files("this is not a diff\njust text\n").expect_err("must fail");
        assert!(matches!(err, Error::MalformedDiff(_)), "{err}");
    }

    #[test]
    fn test_touched_path_accessors() {
        let path = TouchedPath::new("packages/driver/cypress/e2e/dom.cy.ts");
        assert_eq!(path.segment(0), Some("packages"));
        assert_eq!(path.segment(1), Some("driver"));
        assert_eq!(path.stem(), "dom.cy");
        assert_eq!(path.extension(), Some("ts"));
        assert!(path.has_prefix("packages/driver"));
        assert!(path.ends_with_any(&[".ts", ".js"]));
    }
}
