//! Shared fixtures for integration tests.
//!
//! Builders for task instances, unified diffs and marker-delimited
//! transcripts so individual test files stay focused on behavior.

use gradebench::instance::{TaskInstance, TestAsset};
use gradebench::script::{END_TEST_OUTPUT, START_TEST_OUTPUT};

/// A git-style unified diff touching each of the given paths.
#[allow(dead_code)]
pub fn unified_diff(paths: &[&str]) -> String {
    let mut diff = String::new();
    for path in paths {
        diff.push_str(&format!(
            "diff --git a/{path} b/{path}\n\
             index 1111111..2222222 100644\n\
             --- a/{path}\n\
             +++ b/{path}\n\
             @@ -1,2 +1,2 @@\n\
             -old line\n\
             +new line\n"
        ));
    }
    diff
}

/// A ready-to-use task instance whose test patch touches `paths`.
#[allow(dead_code)]
pub fn instance(repo: &str, version: &str, paths: &[&str]) -> TaskInstance {
    TaskInstance {
        instance_id: format!(
            "{}-{version}-0001",
            repo.replace('/', "__").to_lowercase()
        ),
        repo: repo.to_string(),
        version: version.to_string(),
        base_commit: "0123456789abcdef0123456789abcdef01234567".to_string(),
        test_patch: unified_diff(paths),
        test_assets: Vec::new(),
    }
}

/// Same instance with download assets attached.
#[allow(dead_code)]
pub fn instance_with_assets(
    repo: &str,
    version: &str,
    paths: &[&str],
    assets: &[(&str, &str)],
) -> TaskInstance {
    let mut built = instance(repo, version, paths);
    built.test_assets = assets
        .iter()
        .map(|(path, url)| TestAsset {
            path: (*path).to_string(),
            url: (*url).to_string(),
        })
        .collect();
    built
}

/// The instance serialized the way task files store it.
#[allow(dead_code)]
pub fn instance_json(repo: &str, version: &str, paths: &[&str]) -> String {
    serde_json::to_string_pretty(&instance(repo, version, paths)).expect("serialize instance")
}

/// Wraps a transcript body in the `bash -x` trace lines the executor
/// produces around the test-output region.
#[allow(dead_code)]
pub fn traced_transcript(body: &str) -> String {
    format!(
        "+ git apply --verbose --reject -\n\
         Checking patch tests/example.test.js...\n\
         Applied patch tests/example.test.js cleanly.\n\
         + : '{START_TEST_OUTPUT}'\n\
         {body}\n\
         + : '{END_TEST_OUTPUT}'\n\
         + git checkout 0123456 tests/example.test.js\n"
    )
}
