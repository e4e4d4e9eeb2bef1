//! Resource bundle: templated documents and reference data.
//!
//! The bundle directory holds the DMS table-mapping and task-settings
//! templates, workload startup scripts, and the instance-type/region
//! reference data used for validation. Lookup order: the
//! `DBFERRY_RESOURCES_DIR` environment variable, then `./resources`.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable overriding the bundle location.
pub const RESOURCES_DIR_ENV: &str = "DBFERRY_RESOURCES_DIR";

const DEFAULT_RESOURCES_DIR: &str = "resources";

/// Placeholder substituted with the live database name in DMS templates.
const SCHEMA_PLACEHOLDER: &str = "__SCHEMA__";

const TABLE_MAPPINGS: &str = "dms/table_mappings.json";
const TASK_SETTINGS: &str = "dms/task_settings.json";
const INSTANCE_TYPES: &str = "reference/instance_types.json";
const REGIONS: &str = "reference/regions.json";

#[derive(Debug, Clone)]
pub struct ResourceBundle {
    root: PathBuf,
}

impl ResourceBundle {
    /// Resolve the bundle directory from the environment or the default
    /// location.
    pub fn discover() -> Result<Self> {
        let root = match std::env::var(RESOURCES_DIR_ENV) {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => PathBuf::from(DEFAULT_RESOURCES_DIR),
        };
        Self::from_dir(root)
    }

    pub fn from_dir(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(CoreError::ResourceNotFound(root));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Full path of a bundled file; the file must exist.
    pub fn path(&self, relative: &str) -> Result<PathBuf> {
        let full = self.root.join(relative);
        if !full.is_file() {
            return Err(CoreError::ResourceNotFound(full));
        }
        Ok(full)
    }

    pub fn read(&self, relative: &str) -> Result<String> {
        let path = self.path(relative)?;
        Ok(std::fs::read_to_string(path)?)
    }

    /// Table-mappings document with the schema placeholder substituted.
    pub fn table_mappings(&self, schema: &str) -> Result<String> {
        Ok(self.read(TABLE_MAPPINGS)?.replace(SCHEMA_PLACEHOLDER, schema))
    }

    /// Task-settings document (no substitution).
    pub fn task_settings(&self) -> Result<String> {
        self.read(TASK_SETTINGS)
    }

    /// Startup script for a workload profile, e.g. `tomcat` →
    /// `scripts/tomcat.sh`.
    pub fn startup_script(&self, profile: &str) -> Result<String> {
        self.read(&format!("scripts/{profile}.sh"))
    }

    pub fn instance_types(&self) -> Result<Vec<InstanceTypeEntry>> {
        Ok(serde_json::from_str(&self.read(INSTANCE_TYPES)?)?)
    }

    pub fn regions(&self) -> Result<Vec<RegionEntry>> {
        Ok(serde_json::from_str(&self.read(REGIONS)?)?)
    }
}

/// One row of the EC2 instance-type reference data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceTypeEntry {
    pub api_name: String,
    pub name: String,
    pub memory: String,
    pub vcpus: String,
}

/// One row of the region reference data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionEntry {
    pub name: String,
    pub description: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn bundle_with(files: &[(&str, &str)]) -> (tempfile::TempDir, ResourceBundle) {
        let dir = tempfile::tempdir().unwrap();
        for (rel, content) in files {
            let path = dir.path().join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        let bundle = ResourceBundle::from_dir(dir.path()).unwrap();
        (dir, bundle)
    }

    #[test]
    fn missing_bundle_dir() {
        let err = ResourceBundle::from_dir("/nonexistent/resources").unwrap_err();
        assert!(matches!(err, CoreError::ResourceNotFound(_)));
    }

    #[test]
    fn schema_placeholder_is_substituted() {
        let (_dir, bundle) = bundle_with(&[(
            "dms/table_mappings.json",
            r#"{"object-locator": {"schema-name": "__SCHEMA__"}}"#,
        )]);
        let doc = bundle.table_mappings("sales").unwrap();
        assert!(doc.contains(r#""schema-name": "sales""#));
        assert!(!doc.contains("__SCHEMA__"));
    }

    #[test]
    fn missing_template_is_an_error() {
        let (_dir, bundle) = bundle_with(&[]);
        let err = bundle.task_settings().unwrap_err();
        assert!(matches!(err, CoreError::ResourceNotFound(_)));
    }

    #[test]
    fn reference_data_deserializes() {
        let (_dir, bundle) = bundle_with(&[(
            "reference/regions.json",
            r#"[{"name": "us-east-2", "description": "US East (Ohio)"}]"#,
        )]);
        let regions = bundle.regions().unwrap();
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].name, "us-east-2");
    }
}
