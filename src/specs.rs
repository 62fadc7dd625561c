//! Per-repository/version specs and the read-only registry over them.
//!
//! A [`RepoSpec`] is the static configuration for one (repository, version)
//! pair: install steps, the default test command, OS packages, and runtime
//! parameters. The [`SpecRegistry`] is populated once at process start from
//! the built-in catalog plus an optional JSON overrides file, and is never
//! mutated afterwards, so lookups from concurrent pipeline invocations need
//! no locking.

use crate::error::{Error, Result};
use crate::log_parser::LogParserKind;
use crate::spec_catalog;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Default test command: a single string or an ordered list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TestCmd {
    One(String),
    Many(Vec<String>),
}

impl TestCmd {
    /// The command sequence this default expands to.
    #[must_use]
    pub fn commands(&self) -> Vec<String> {
        match self {
            Self::One(cmd) => vec![cmd.clone()],
            Self::Many(cmds) => cmds.clone(),
        }
    }

    /// The leading command, used by strategies that extend the default.
    #[must_use]
    pub fn primary(&self) -> &str {
        match self {
            Self::One(cmd) => cmd,
            Self::Many(cmds) => cmds.first().map_or("", String::as_str),
        }
    }
}

/// Static per-(repository, version) configuration record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoSpec {
    /// Ordered install commands appended to the repo-setup stage.
    #[serde(default)]
    pub install: Vec<String>,
    /// Default test command(s); also the fallback when classification yields
    /// no specialized command.
    pub test_cmd: TestCmd,
    /// OS packages installed in the environment stage.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub apt_pkgs: Vec<String>,
    /// Runtime-version parameters consumed by the external image builder.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub php_version: Option<String>,
    /// Result-line matcher for transcripts produced under this spec.
    #[serde(default)]
    pub log_parser: LogParserKind,
}

impl RepoSpec {
    #[must_use]
    pub fn new(install: &[&str], test_cmd: &str, log_parser: LogParserKind) -> Self {
        Self {
            install: install.iter().map(|s| (*s).to_string()).collect(),
            test_cmd: TestCmd::One(test_cmd.to_string()),
            apt_pkgs: Vec::new(),
            node_version: None,
            php_version: None,
            log_parser,
        }
    }

    #[must_use]
    pub fn with_test_cmds(mut self, cmds: &[&str]) -> Self {
        self.test_cmd = TestCmd::Many(cmds.iter().map(|s| (*s).to_string()).collect());
        self
    }

    #[must_use]
    pub fn with_apt_pkgs(mut self, pkgs: &[&str]) -> Self {
        self.apt_pkgs = pkgs.iter().map(|s| (*s).to_string()).collect();
        self
    }

    #[must_use]
    pub fn with_node_version(mut self, version: &str) -> Self {
        self.node_version = Some(version.to_string());
        self
    }

    #[must_use]
    pub fn with_php_version(mut self, version: &str) -> Self {
        self.php_version = Some(version.to_string());
        self
    }
}

/// repo → version → spec.
pub type SpecTable = BTreeMap<String, BTreeMap<String, RepoSpec>>;

/// Immutable lookup from (repository identity, version) to [`RepoSpec`].
#[derive(Debug, Clone)]
pub struct SpecRegistry {
    specs: SpecTable,
    error: Option<String>,
}

impl SpecRegistry {
    /// Registry backed by the built-in catalog only.
    #[must_use]
    pub fn builtin() -> Self {
        Self {
            specs: spec_catalog::catalog(),
            error: None,
        }
    }

    /// Built-in catalog with a JSON overrides file merged on top.
    ///
    /// Override entries replace built-in entries per (repo, version) key. A
    /// missing file is fine; an unreadable or invalid file keeps the built-in
    /// table and records the failure rather than aborting startup.
    #[must_use]
    pub fn load(overrides_path: Option<&Path>) -> Self {
        let mut registry = Self::builtin();

        if let Some(path) = overrides_path {
            if path.exists() {
                match std::fs::read_to_string(path)
                    .map_err(|e| Error::config(format!("failed to read spec overrides: {e}")))
                    .and_then(|s| serde_json::from_str::<SpecTable>(&s).map_err(Error::from))
                {
                    Ok(overrides) => registry.merge(overrides),
                    Err(err) => {
                        tracing::warn!(
                            "ignoring spec overrides at {}: {err}",
                            path.display()
                        );
                        registry.error = Some(format!("{err}\n\nFile: {}", path.display()));
                    }
                }
            }
        }

        registry
    }

    fn merge(&mut self, overrides: SpecTable) {
        for (repo, versions) in overrides {
            self.specs.entry(repo).or_default().extend(versions);
        }
    }

    pub fn lookup(&self, repo: &str, version: &str) -> Result<&RepoSpec> {
        self.specs
            .get(repo)
            .and_then(|versions| versions.get(version))
            .ok_or_else(|| Error::spec_not_found(repo, version))
    }

    /// Registered repository identities, sorted.
    pub fn repos(&self) -> impl Iterator<Item = &str> {
        self.specs.keys().map(String::as_str)
    }

    /// Registered versions for one repository, sorted by key.
    #[must_use]
    pub fn versions(&self, repo: &str) -> Vec<&str> {
        self.specs
            .get(repo)
            .map(|versions| versions.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Total number of (repo, version) entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.specs.values().map(BTreeMap::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Load failure for the overrides file, if any.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_builtin_lookup_hit() {
        let registry = SpecRegistry::builtin();
        let spec = registry
            .lookup("phpoffice/phpspreadsheet", "4313")
            .expect("phpspreadsheet spec");
        assert_eq!(
            spec.install,
            vec!["composer update".to_string(), "composer install".to_string()]
        );
        assert_eq!(spec.log_parser, LogParserKind::PhpunitTestdox);
    }

    #[test]
    fn test_builtin_lookup_miss_is_spec_not_found() {
        let registry = SpecRegistry::builtin();
        let err = registry
            .lookup("nobody/nothing", "1.0")
            .expect_err("must miss");
        assert!(matches!(err, Error::SpecNotFound { .. }), "{err}");
    }

    #[test]
    fn test_missing_version_is_spec_not_found() {
        let registry = SpecRegistry::builtin();
        assert!(registry.lookup("PrismJS/prism", "0.0.0").is_err());
    }

    #[test]
    fn test_test_cmd_untagged_forms() {
        let one: TestCmd = serde_json::from_str(r#""npm test""#).expect("one");
        assert_eq!(one.commands(), vec!["npm test".to_string()]);

        let many: TestCmd = serde_json::from_str(r#"["a", "b"]"#).expect("many");
        assert_eq!(many.commands(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(many.primary(), "a");
    }

    #[test]
    fn test_overrides_replace_builtin_entry() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("specs.json");
        std::fs::write(
            &path,
            r#"{
                "PrismJS/prism": {
                    "1.27": { "install": ["npm ci"], "test_cmd": "npm run test:suite --" }
                },
                "new/repo": {
                    "0.1": { "test_cmd": "make check" }
                }
            }"#,
        )
        .expect("write overrides");

        let registry = SpecRegistry::load(Some(&path));
        assert!(registry.error().is_none());
        assert_eq!(
            registry
                .lookup("PrismJS/prism", "1.27")
                .expect("overridden")
                .install,
            vec!["npm ci".to_string()]
        );
        // Untouched versions keep their built-in entries.
        assert!(registry.lookup("PrismJS/prism", "1.29").is_ok());
        assert_eq!(
            registry.lookup("new/repo", "0.1").expect("added").test_cmd,
            TestCmd::One("make check".to_string())
        );
    }

    #[test]
    fn test_invalid_overrides_keep_builtins_and_record_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("specs.json");
        std::fs::write(&path, "{ not json").expect("write overrides");

        let registry = SpecRegistry::load(Some(&path));
        assert!(registry.error().is_some());
        assert!(registry.lookup("PrismJS/prism", "1.27").is_ok());
    }
}
