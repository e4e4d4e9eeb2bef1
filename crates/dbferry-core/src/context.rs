//! Provisioning context: the state bag threaded through pipeline steps.
//!
//! Each provisioning step appends the identifiers it produced (VPC id, subnet
//! ids, endpoint ARNs, ...) so later steps can consume them. Keys are
//! append-only: once written, a key keeps its value for the remainder of the
//! run, and any attempt to overwrite is rejected.

use crate::error::{CoreError, Result};
use indexmap::IndexMap;

/// A context value: a string, an integer, or a list of strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Str(String),
    Int(i64),
    List(Vec<String>),
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Value::Str(_) => "string",
            Value::Int(_) => "integer",
            Value::List(_) => "list",
        }
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<Vec<String>> for Value {
    fn from(v: Vec<String>) -> Self {
        Value::List(v)
    }
}

/// Ordered, append-only key/value state shared across provisioning steps.
///
/// Created once at pipeline start from the loaded configuration, then passed
/// `&mut` through the (single-threaded) pipeline.
#[derive(Debug, Clone, Default)]
pub struct ProvisioningContext {
    values: IndexMap<String, Value>,
}

impl ProvisioningContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a key. Overwriting an existing key is an error.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Result<()> {
        let key = key.into();
        if self.values.contains_key(&key) {
            return Err(CoreError::ContextOverwrite(key));
        }
        self.values.insert(key, value.into());
        Ok(())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.values.get(key) {
            Some(Value::Str(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        match self.values.get(key) {
            Some(Value::Int(i)) => Some(*i),
            _ => None,
        }
    }

    pub fn get_list(&self, key: &str) -> Option<&[String]> {
        match self.values.get(key) {
            Some(Value::List(l)) => Some(l.as_slice()),
            _ => None,
        }
    }

    /// Fetch a required string key. `what` is the human name used in the
    /// error ("Name", "Database name", ...).
    pub fn require_str(&self, key: &str, what: &str) -> Result<&str> {
        match self.values.get(key) {
            Some(Value::Str(s)) => Ok(s.as_str()),
            Some(other) => Err(CoreError::ContextType {
                key: key.to_string(),
                expected: "string",
                found: other.type_name(),
            }),
            None => Err(CoreError::MissingParameter(what.to_string())),
        }
    }

    /// Fetch a required list key.
    pub fn require_list(&self, key: &str, what: &str) -> Result<&[String]> {
        match self.values.get(key) {
            Some(Value::List(l)) => Ok(l.as_slice()),
            Some(other) => Err(CoreError::ContextType {
                key: key.to_string(),
                expected: "list",
                found: other.type_name(),
            }),
            None => Err(CoreError::MissingParameter(what.to_string())),
        }
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
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

    #[test]
    fn insert_and_typed_get() {
        let mut ctx = ProvisioningContext::new();
        ctx.insert("vpc_id", "vpc-123").unwrap();
        ctx.insert("subnet_number", 2i64).unwrap();
        ctx.insert("subnet", vec!["subnet-a".to_string(), "subnet-b".to_string()])
            .unwrap();

        assert_eq!(ctx.get_str("vpc_id"), Some("vpc-123"));
        assert_eq!(ctx.get_int("subnet_number"), Some(2));
        assert_eq!(ctx.get_list("subnet").unwrap().len(), 2);
    }

    #[test]
    fn overwrite_is_rejected_and_value_retained() {
        let mut ctx = ProvisioningContext::new();
        ctx.insert("vpc_id", "vpc-123").unwrap();

        let err = ctx.insert("vpc_id", "vpc-456").unwrap_err();
        assert!(matches!(err, CoreError::ContextOverwrite(k) if k == "vpc_id"));
        // the first write wins for the remainder of the run
        assert_eq!(ctx.get_str("vpc_id"), Some("vpc-123"));
    }

    #[test]
    fn require_missing_key() {
        let ctx = ProvisioningContext::new();
        let err = ctx.require_str("db_name", "Database name").unwrap_err();
        assert!(matches!(err, CoreError::MissingParameter(m) if m == "Database name"));
    }

    #[test]
    fn require_wrong_type() {
        let mut ctx = ProvisioningContext::new();
        ctx.insert("subnet", vec!["subnet-a".to_string()]).unwrap();
        let err = ctx.require_str("subnet", "Subnets").unwrap_err();
        assert!(matches!(err, CoreError::ContextType { .. }));
    }

    #[test]
    fn keys_keep_insertion_order() {
        let mut ctx = ProvisioningContext::new();
        ctx.insert("name", "demo").unwrap();
        ctx.insert("region", "us-east-2").unwrap();
        ctx.insert("vpc_id", "vpc-1").unwrap();
        let keys: Vec<_> = ctx.keys().collect();
        assert_eq!(keys, vec!["name", "region", "vpc_id"]);
    }
}
