//! Process configuration.
//!
//! Every location resolves the same way: explicit environment override first,
//! then the conventional spot under the user's home directory. Resolution is
//! split into pure helpers so the precedence rules are testable without
//! touching process state.

use crate::script::DEFAULT_REPO_DIRECTORY;
use std::path::{Path, PathBuf};

/// Overrides the gradebench root directory (default `~/.gradebench`).
pub const DIR_ENV_VAR: &str = "GRADEBENCH_DIR";
/// Overrides the spec-overrides file location (default
/// `<root>/specs.json`).
pub const SPECS_PATH_ENV_VAR: &str = "GRADEBENCH_SPECS_PATH";

/// Resolved process configuration, loaded once at startup and passed by
/// reference.
#[derive(Debug, Clone)]
pub struct Config {
    /// Spec-overrides file merged over the built-in catalog when present.
    pub specs_path: PathBuf,
    /// Checkout directory inside the execution environment.
    pub repo_directory: String,
}

impl Config {
    #[must_use]
    pub fn load() -> Self {
        Self {
            specs_path: Self::default_specs_path(),
            repo_directory: DEFAULT_REPO_DIRECTORY.to_string(),
        }
    }

    /// Root directory for user-level gradebench files.
    #[must_use]
    pub fn global_dir() -> PathBuf {
        resolve_global_dir(env_value(DIR_ENV_VAR).as_deref(), dirs::home_dir())
    }

    /// Where the spec-overrides JSON file is expected.
    #[must_use]
    pub fn default_specs_path() -> PathBuf {
        resolve_specs_path(env_value(SPECS_PATH_ENV_VAR).as_deref(), &Self::global_dir())
    }
}

fn env_value(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.is_empty())
}

fn resolve_global_dir(override_dir: Option<&str>, home: Option<PathBuf>) -> PathBuf {
    match override_dir {
        Some(dir) => PathBuf::from(dir),
        None => home
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".gradebench"),
    }
}

fn resolve_specs_path(override_path: Option<&str>, global_dir: &Path) -> PathBuf {
    match override_path {
        Some(path) => PathBuf::from(path),
        None => global_dir.join("specs.json"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_global_dir_override_wins() {
        let dir = resolve_global_dir(Some("/srv/grading"), Some(PathBuf::from("/home/u")));
        assert_eq!(dir, PathBuf::from("/srv/grading"));
    }

    #[test]
    fn test_global_dir_defaults_under_home() {
        let dir = resolve_global_dir(None, Some(PathBuf::from("/home/u")));
        assert_eq!(dir, PathBuf::from("/home/u/.gradebench"));
    }

    #[test]
    fn test_global_dir_survives_missing_home() {
        let dir = resolve_global_dir(None, None);
        assert_eq!(dir, PathBuf::from("./.gradebench"));
    }

    #[test]
    fn test_specs_path_override_wins() {
        let path = resolve_specs_path(Some("/tmp/custom.json"), Path::new("/home/u/.gradebench"));
        assert_eq!(path, PathBuf::from("/tmp/custom.json"));
    }

    #[test]
    fn test_specs_path_defaults_inside_global_dir() {
        let path = resolve_specs_path(None, Path::new("/home/u/.gradebench"));
        assert_eq!(path, PathBuf::from("/home/u/.gradebench/specs.json"));
    }

    #[test]
    fn test_load_uses_default_repo_directory() {
        let config = Config::load();
        assert_eq!(config.repo_directory, DEFAULT_REPO_DIRECTORY);
    }
}
