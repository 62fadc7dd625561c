//! Three-stage script assembly for one task instance.
//!
//! The pipeline hands the executor three bash stages: a repository stage that
//! clones and pins the tree, an environment stage for system packages, and an
//! evaluation stage that applies the withheld test patch and runs the
//! synthesized commands between sentinel markers. Building is pure string
//! assembly; nothing here executes.
//!
//! # Invariants
//! - The evaluation stage emits each sentinel marker exactly once, as a shell
//!   no-op (`: '<marker>'`).
//! - The test patch rides in a quoted heredoc and is never shell-interpolated.
//! - The reset command before the markers and the one after them are
//!   textually identical, so the tree ends clean even when tests mutate
//!   fixtures.

use crate::diff;
use crate::error::Result;
use crate::instance::{TaskInstance, TestAsset};
use crate::specs::RepoSpec;
use serde::Serialize;
use std::path::Path;

/// Sentinel bracketing the start of graded test output.
pub const START_TEST_OUTPUT: &str = ">>>>> Start Test Output";
/// Sentinel bracketing the end of graded test output.
pub const END_TEST_OUTPUT: &str = ">>>>> End Test Output";
/// Heredoc delimiter for the embedded test patch; unusual on purpose so no
/// plausible diff content collides with it.
pub const HEREDOC_DELIMITER: &str = "EOF_114329324912";
/// Where the repository is checked out inside the execution environment.
pub const DEFAULT_REPO_DIRECTORY: &str = "/testbed";

/// The three command lists handed to the executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScriptPipeline {
    pub repo_script: Vec<String>,
    pub env_script: Vec<String>,
    pub eval_script: Vec<String>,
}

impl ScriptPipeline {
    #[must_use]
    pub fn repo_shell(&self) -> String {
        render_shell(&self.repo_script, true)
    }

    #[must_use]
    pub fn env_shell(&self) -> String {
        render_shell(&self.env_script, true)
    }

    /// Rendered without `-e`: a failing test command must not abort the stage
    /// before the end marker and the final reset run.
    #[must_use]
    pub fn eval_shell(&self) -> String {
        render_shell(&self.eval_script, false)
    }
}

fn render_shell(commands: &[String], exit_on_error: bool) -> String {
    let preamble = if exit_on_error {
        "set -euxo pipefail"
    } else {
        "set -uxo pipefail"
    };
    let mut script = String::from("#!/bin/bash\n");
    script.push_str(preamble);
    for command in commands {
        script.push('\n');
        script.push_str(command);
    }
    script.push('\n');
    script
}

/// Assembles a [`ScriptPipeline`] for one instance and its resolved spec.
#[derive(Debug)]
pub struct ScriptBuilder<'a> {
    instance: &'a TaskInstance,
    spec: &'a RepoSpec,
    repo_directory: String,
}

impl<'a> ScriptBuilder<'a> {
    #[must_use]
    pub fn new(instance: &'a TaskInstance, spec: &'a RepoSpec) -> Self {
        Self {
            instance,
            spec,
            repo_directory: DEFAULT_REPO_DIRECTORY.to_string(),
        }
    }

    #[must_use]
    pub fn with_repo_directory(mut self, dir: impl Into<String>) -> Self {
        self.repo_directory = dir.into();
        self
    }

    /// Assemble all three stages around the synthesized `test_commands`.
    pub fn build(&self, test_commands: &[String]) -> Result<ScriptPipeline> {
        Ok(ScriptPipeline {
            repo_script: self.repo_stage(),
            env_script: self.env_stage(),
            eval_script: self.eval_stage(test_commands)?,
        })
    }

    fn repo_stage(&self) -> Vec<String> {
        let dir = &self.repo_directory;
        let mut commands = vec![
            format!(
                "git clone -o origin https://github.com/{} {dir}",
                self.instance.repo
            ),
            format!("cd {dir}"),
            format!("git reset --hard {}", self.instance.base_commit),
            // Test runners may execute as a nonroot user.
            format!("chmod -R 777 {dir}"),
            // Drop the remote so nothing newer than the base commit is
            // reachable from inside the environment.
            "git remote remove origin".to_string(),
        ];
        commands.extend(self.spec.install.iter().cloned());
        commands
    }

    fn env_stage(&self) -> Vec<String> {
        if self.spec.apt_pkgs.is_empty() {
            return Vec::new();
        }
        vec![
            "apt-get update".to_string(),
            format!("apt-get install -y {}", self.spec.apt_pkgs.join(" ")),
        ]
    }

    fn eval_stage(&self, test_commands: &[String]) -> Result<Vec<String>> {
        let dir = &self.repo_directory;
        let reset_tests = self.reset_tests_command()?;
        let mut commands = vec![
            format!("cd {dir}"),
            // nonroot users hit git's dubious-ownership guard otherwise.
            format!("git config --global --add safe.directory {dir}"),
            format!("cd {dir}"),
            reset_tests.clone(),
        ];
        commands.extend(asset_commands(&self.instance.test_assets));
        commands.push(self.apply_patch_command());
        commands.push(format!(": '{START_TEST_OUTPUT}'"));
        commands.extend(test_commands.iter().cloned());
        commands.push(format!(": '{END_TEST_OUTPUT}'"));
        commands.push(reset_tests);
        Ok(commands)
    }

    fn reset_tests_command(&self) -> Result<String> {
        let files = diff::modified_files(&self.instance.test_patch)?;
        if files.is_empty() {
            return Ok(r#"echo "No test files to reset""#.to_string());
        }
        Ok(format!(
            "git checkout {} {}",
            self.instance.base_commit,
            files.join(" ")
        ))
    }

    fn apply_patch_command(&self) -> String {
        format!(
            "git apply --verbose --reject - <<'{HEREDOC_DELIMITER}'\n{}\n{HEREDOC_DELIMITER}",
            self.instance.test_patch
        )
    }
}

/// `mkdir -p` / `curl -o` / `chmod 777` triple per declared asset, emitted
/// before the patch applies so patched fixtures can reference the files.
fn asset_commands(assets: &[TestAsset]) -> Vec<String> {
    let mut commands = Vec::with_capacity(assets.len() * 3);
    for asset in assets {
        let parent = Path::new(&asset.path)
            .parent()
            .map(|p| p.to_string_lossy().into_owned())
            .filter(|p| !p.is_empty());
        if let Some(parent) = parent {
            commands.push(format!("mkdir -p {parent}"));
        }
        commands.push(format!("curl -o {} {}", asset.path, asset.url));
        commands.push(format!("chmod 777 {}", asset.path));
    }
    commands
}
