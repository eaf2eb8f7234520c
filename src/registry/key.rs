//! Service identity.
//!
//! A registered instance is addressed by `(name, instance)`. The textual
//! form `name:instance` is used in config files, URLs and logs; a bare
//! `name` refers to the `default` instance.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Instance name used when a key or registration omits one.
pub const DEFAULT_INSTANCE: &str = "default";

/// Returned when a string cannot be parsed as a [`ServiceKey`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid service key {0:?}: expected `name` or `name:instance`")]
pub struct InvalidServiceKey(pub String);

/// Unique key of a registered service instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ServiceKey {
    name: String,
    instance: String,
}

impl ServiceKey {
    /// Build a key from its parts.
    pub fn new(name: impl Into<String>, instance: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instance: instance.into(),
        }
    }

    /// Logical service name shared by all instances.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Instance discriminator.
    pub fn instance(&self) -> &str {
        &self.instance
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.instance)
    }
}

impl FromStr for ServiceKey {
    type Err = InvalidServiceKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (name, instance) = match trimmed.split_once(':') {
            Some((name, instance)) => (name, instance),
            None => (trimmed, DEFAULT_INSTANCE),
        };

        if name.is_empty()
            || instance.is_empty()
            || instance.contains(':')
            || name.chars().any(char::is_whitespace)
        {
            return Err(InvalidServiceKey(s.to_string()));
        }

        Ok(Self::new(name, instance))
    }
}

impl TryFrom<String> for ServiceKey {
    type Error = InvalidServiceKey;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ServiceKey> for String {
    fn from(key: ServiceKey) -> Self {
        key.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_name_and_instance() {
        let key: ServiceKey = "orders:blue".parse().unwrap();
        assert_eq!(key.name(), "orders");
        assert_eq!(key.instance(), "blue");
        assert_eq!(key.to_string(), "orders:blue");
    }

    #[test]
    fn bare_name_uses_default_instance() {
        let key: ServiceKey = "billing".parse().unwrap();
        assert_eq!(key, ServiceKey::new("billing", DEFAULT_INSTANCE));
    }

    #[test]
    fn rejects_empty_parts() {
        assert!("".parse::<ServiceKey>().is_err());
        assert!(":default".parse::<ServiceKey>().is_err());
        assert!("orders:".parse::<ServiceKey>().is_err());
        assert!("my service".parse::<ServiceKey>().is_err());
    }

    #[test]
    fn rejects_more_than_one_separator() {
        assert!("a:b:c".parse::<ServiceKey>().is_err());
        assert!("orders::blue".parse::<ServiceKey>().is_err());
    }

    #[test]
    fn serializes_as_string() {
        let key = ServiceKey::new("orders", "default");
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"orders:default\"");

        let back: ServiceKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
    }
}
