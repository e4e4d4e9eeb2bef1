//! Flat `key=value` properties surface.
//!
//! All per-run parameters come from a single properties file (recognized keys
//! include `name`, `region`, `type`, `db_name`, `source`, `target`,
//! `s_user`, `s_password`, ...). Blank lines and `#`/`;` comments are
//! ignored; values keep their case.

use crate::error::{CoreError, Result};
use indexmap::IndexMap;
use std::path::Path;

#[derive(Debug, Clone, Default)]
pub struct Properties {
    values: IndexMap<String, String>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(CoreError::ResourceNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        let props = Self::parse(&content)?;
        tracing::info!(
            "loaded [{}] and {} properties are defined",
            path.display(),
            props.len()
        );
        Ok(props)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let mut values = IndexMap::new();
        for (lineno, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            let (key, value) = line.split_once('=').ok_or_else(|| {
                CoreError::InvalidProperties(format!("line {}: expected key=value", lineno + 1))
            })?;
            let key = key.trim();
            if key.is_empty() {
                return Err(CoreError::InvalidProperties(format!(
                    "line {}: empty key",
                    lineno + 1
                )));
            }
            values.insert(key.to_string(), value.trim().to_string());
        }
        Ok(Self { values })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn require(&self, key: &str, what: &str) -> Result<&str> {
        self.get(key)
            .ok_or_else(|| CoreError::MissingParameter(what.to_string()))
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_pairs_comments_and_blanks() {
        let props = Properties::parse(
            "# run parameters\nname=demo\nregion = us-east-2\n\n; target side\nt_user=admin\n",
        )
        .unwrap();
        assert_eq!(props.get("name"), Some("demo"));
        assert_eq!(props.get("region"), Some("us-east-2"));
        assert_eq!(props.get("t_user"), Some("admin"));
        assert_eq!(props.len(), 3);
    }

    #[test]
    fn rejects_line_without_separator() {
        let err = Properties::parse("name=demo\nnot a pair\n").unwrap_err();
        assert!(matches!(err, CoreError::InvalidProperties(_)));
    }

    #[test]
    fn require_reports_the_human_name() {
        let props = Properties::parse("name=demo\n").unwrap();
        let err = props.require("db_name", "Database name").unwrap_err();
        assert_eq!(err.to_string(), "Database name must be specified");
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "name=demo\ndb_name=sales").unwrap();
        let props = Properties::load(file.path()).unwrap();
        assert_eq!(props.get("db_name"), Some("sales"));
    }

    #[test]
    fn load_missing_file() {
        let err = Properties::load("/nonexistent/dbferry.properties").unwrap_err();
        assert!(matches!(err, CoreError::ResourceNotFound(_)));
    }
}
