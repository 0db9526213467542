//! Nesting configuration.

use serde::{Deserialize, Serialize};

use crate::savepoint::MAX_ID_LENGTH;
use crate::transaction::{TransactionError, TransactionResult};

/// Host identity used when resolution fails.
pub(crate) const DEFAULT_HOST_FALLBACK: &str = "localhost";
/// Savepoint identifier length.
pub(crate) const DEFAULT_ID_LENGTH: usize = 11;

/// Configuration for primitive dispatch and savepoint naming.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NestingConfig {
    /// Map scopes opened inside an open transaction to savepoints.
    /// When disabled every scope opens a root transaction.
    pub nested: bool,
    /// Adapter-kind fragments whose savepoint commit executes nothing.
    pub noop_commit_families: Vec<String>,
    /// Host identity used when the host name cannot be resolved.
    pub host_fallback: String,
    /// Characters kept from the identifier digest.
    pub id_length: usize,
}

impl Default for NestingConfig {
    fn default() -> Self {
        Self {
            nested: true,
            noop_commit_families: vec!["oracle".to_string()],
            host_fallback: DEFAULT_HOST_FALLBACK.to_string(),
            id_length: DEFAULT_ID_LENGTH,
        }
    }
}

impl NestingConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> TransactionResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| TransactionError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Set the nested flag.
    pub fn nested(mut self, value: bool) -> Self {
        self.nested = value;
        self
    }

    /// Add an adapter-kind fragment with no-op savepoint commit.
    pub fn noop_commit_family(mut self, family: impl Into<String>) -> Self {
        self.noop_commit_families.push(family.into());
        self
    }

    /// Set the host fallback.
    pub fn host_fallback(mut self, value: impl Into<String>) -> Self {
        self.host_fallback = value.into();
        self
    }

    /// Set the identifier length.
    pub fn id_length(mut self, value: usize) -> Self {
        self.id_length = value;
        self
    }

    /// Check value ranges.
    pub fn validate(&self) -> TransactionResult<()> {
        if self.id_length == 0 || self.id_length > MAX_ID_LENGTH {
            return Err(TransactionError::InvalidConfig(format!(
                "id_length must be between 1 and {}, got {}",
                MAX_ID_LENGTH, self.id_length
            )));
        }
        if self.host_fallback.trim().is_empty() {
            return Err(TransactionError::InvalidConfig(
                "host_fallback must not be empty".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = NestingConfig::default();
        assert!(config.nested);
        assert_eq!(config.noop_commit_families, vec!["oracle".to_string()]);
        assert_eq!(config.host_fallback, "localhost");
        assert_eq!(config.id_length, 11);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_partial() {
        let config = NestingConfig::from_json(r#"{"id_length": 16}"#).unwrap();
        assert_eq!(config.id_length, 16);
        assert!(config.nested);
        assert_eq!(config.host_fallback, "localhost");
    }

    #[test]
    fn test_from_json_rejects_bad_length() {
        let err = NestingConfig::from_json(r#"{"id_length": 0}"#).unwrap_err();
        assert!(matches!(err, TransactionError::InvalidConfig(_)));

        let err = NestingConfig::from_json(r#"{"id_length": 65}"#).unwrap_err();
        assert!(matches!(err, TransactionError::InvalidConfig(_)));
    }

    #[test]
    fn test_from_json_rejects_malformed() {
        let err = NestingConfig::from_json("{not json").unwrap_err();
        assert!(matches!(err, TransactionError::InvalidConfig(_)));
    }

    #[test]
    fn test_builder_and_serialize() {
        let config = NestingConfig::default()
            .nested(false)
            .noop_commit_family("sqlserver")
            .host_fallback("db-host");
        let json = serde_json::to_string(&config).unwrap();
        let parsed = NestingConfig::from_json(&json).unwrap();
        assert_eq!(parsed, config);
        assert_eq!(parsed.noop_commit_families.len(), 2);
    }
}
