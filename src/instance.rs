//! Task instance records.
//!
//! A [`TaskInstance`] is one historical code-change record driving a single
//! pipeline invocation. Instances arrive as JSON from an external collector
//! and are never mutated; every pipeline component reads them behind a shared
//! reference.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskInstance {
    pub instance_id: String,
    /// Repository identity, `owner/name`.
    pub repo: String,
    /// Version identifier used for spec lookup and rule gating.
    pub version: String,
    /// Base revision the repository is reset to before evaluation.
    pub base_commit: String,
    /// Unified-diff text for the withheld test patch.
    pub test_patch: String,
    /// Auxiliary binary test assets to materialize before the patch applies.
    /// Collector exports name this field `image_assets`.
    #[serde(
        default,
        alias = "image_assets",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub test_assets: Vec<TestAsset>,
}

/// Descriptor for one auxiliary binary asset: target path plus source URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestAsset {
    pub path: String,
    pub url: String,
}

impl TaskInstance {
    /// Parse and validate an instance from its JSON representation.
    pub fn from_json(text: &str) -> Result<Self> {
        let instance: Self = serde_json::from_str(text)?;
        instance.validate()?;
        Ok(instance)
    }

    pub fn validate(&self) -> Result<()> {
        if self.instance_id.trim().is_empty() {
            return Err(Error::validation("instance_id must not be empty"));
        }
        if self.repo.trim().is_empty() || !self.repo.contains('/') {
            return Err(Error::validation(format!(
                "repo must be 'owner/name', got '{}'",
                self.repo
            )));
        }
        if self.version.trim().is_empty() {
            return Err(Error::validation("version must not be empty"));
        }
        if self.base_commit.trim().is_empty() {
            return Err(Error::validation("base_commit must not be empty"));
        }
        for asset in &self.test_assets {
            if asset.path.trim().is_empty() || asset.url.trim().is_empty() {
                return Err(Error::validation(
                    "test asset entries need both a target path and a source url",
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn minimal_json() -> &'static str {
        r#"{
            "instance_id": "prismjs__prism-2331",
            "repo": "PrismJS/prism",
            "version": "1.27",
            "base_commit": "abc123",
            "test_patch": "diff --git a/x b/x\n--- a/x\n+++ b/x\n"
        }"#
    }

    #[test]
    fn test_from_json_without_assets() {
        let instance = TaskInstance::from_json(minimal_json()).expect("parse");
        assert_eq!(instance.repo, "PrismJS/prism");
        assert!(instance.test_assets.is_empty());
    }

    #[test]
    fn test_from_json_with_assets() {
        let json = r#"{
            "instance_id": "diegomura__react-pdf-1142",
            "repo": "diegomura/react-pdf",
            "version": "3.0",
            "base_commit": "deadbeef",
            "test_patch": "diff --git a/y b/y\n--- a/y\n+++ b/y\n",
            "test_assets": [
                { "path": "tests/assets/logo.png", "url": "https://example.com/logo.png" }
            ]
        }"#;
        let instance = TaskInstance::from_json(json).expect("parse");
        assert_eq!(instance.test_assets.len(), 1);
        assert_eq!(instance.test_assets[0].path, "tests/assets/logo.png");
    }

    #[test]
    fn test_from_json_accepts_collector_asset_field_name() {
        let json = r#"{
            "instance_id": "diegomura__react-pdf-1142",
            "repo": "diegomura/react-pdf",
            "version": "3.0",
            "base_commit": "deadbeef",
            "test_patch": "diff --git a/y b/y\n--- a/y\n+++ b/y\n",
            "image_assets": [
                { "path": "tests/assets/logo.png", "url": "https://example.com/logo.png" }
            ]
        }"#;
        let instance = TaskInstance::from_json(json).expect("parse");
        assert_eq!(instance.test_assets.len(), 1);
    }

    #[test]
    fn test_validate_rejects_bare_repo_name() {
        let mut instance = TaskInstance::from_json(minimal_json()).expect("parse");
        instance.repo = "prism".to_string();
        let err = instance.validate().expect_err("must fail");
        assert!(matches!(err, Error::Validation(_)), "{err}");
    }

    #[test]
    fn test_validate_rejects_incomplete_asset() {
        let mut instance = TaskInstance::from_json(minimal_json()).expect("parse");
        instance.test_assets.push(TestAsset {
            path: "tests/assets/logo.png".to_string(),
            url: String::new(),
        });
        assert!(instance.validate().is_err());
    }

    #[test]
    fn test_serialize_skips_empty_assets() {
        let instance = TaskInstance::from_json(minimal_json()).expect("parse");
        let json = serde_json::to_string(&instance).expect("serialize");
        assert!(!json.contains("test_assets"));
    }
}
