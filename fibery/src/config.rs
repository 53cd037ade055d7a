//! This module contains configurations of the schema cache, field handling
//! and the http transport.

use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::time::Duration;

use crate::{Error, ErrorKind, Result};

const SCHEMA_CACHE_CAPACITY: &str = "fibery.schema_cache.capacity";
const SCHEMA_CACHE_TTL_SECS: &str = "fibery.schema_cache.ttl_secs";
const FILE_FIELDS: &str = "fibery.fields.file_fields";
const DOMAIN: &str = "fibery.domain";
const REQUEST_TIMEOUT_MS: &str = "fibery.request_timeout_ms";
const WORKSPACE_PREFIX: &str = "fibery.workspace.";
const TOKEN_SUFFIX: &str = ".token";

/// Schema cache configuration.
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct CoordinatorConfig {
    /// Max number of workspaces kept in the cache.
    pub capacity: usize,
    /// How long a cached schema is served without asking the backend.
    pub ttl: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            ttl: Duration::from_secs(10 * 60),
        }
    }
}

impl TryFrom<&'_ HashMap<String, String>> for CoordinatorConfig {
    type Error = Error;

    fn try_from(value: &'_ HashMap<String, String>) -> Result<Self> {
        let mut config = CoordinatorConfig::default();

        value
            .get(SCHEMA_CACHE_CAPACITY)
            .map(|v| v.parse::<usize>())
            .transpose()
            .map_err(|e| {
                Error::new(
                    ErrorKind::ConfigInvalid,
                    format!("Can't parse {SCHEMA_CACHE_CAPACITY}."),
                )
                .set_source(e)
            })?
            .iter()
            .for_each(|v| config.capacity = *v);

        if config.capacity == 0 {
            return Err(Error::new(
                ErrorKind::ConfigInvalid,
                format!("{SCHEMA_CACHE_CAPACITY} must be greater than 0."),
            ));
        }

        value
            .get(SCHEMA_CACHE_TTL_SECS)
            .map(|v| v.parse::<u64>())
            .transpose()
            .map_err(|e| {
                Error::new(
                    ErrorKind::ConfigInvalid,
                    format!("Can't parse {SCHEMA_CACHE_TTL_SECS}."),
                )
                .set_source(e)
            })?
            .iter()
            .for_each(|v| config.ttl = Duration::from_secs(*v));

        Ok(config)
    }
}

/// Whether `fibery/file` fields take part in selects and filters.
#[derive(PartialEq, Eq, Debug, Clone, Copy, Default)]
pub enum FileFieldPolicy {
    /// File fields are dropped like any other unsupported field.
    #[default]
    Unsupported,
    /// File fields are selected as name and secret pairs.
    Supported,
}

impl FromStr for FileFieldPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "unsupported" => Ok(FileFieldPolicy::Unsupported),
            "supported" => Ok(FileFieldPolicy::Supported),
            other => Err(Error::new(
                ErrorKind::ConfigInvalid,
                format!("Invalid file field policy {other}"),
            )),
        }
    }
}

impl Display for FileFieldPolicy {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            FileFieldPolicy::Unsupported => write!(f, "unsupported"),
            FileFieldPolicy::Supported => write!(f, "supported"),
        }
    }
}

/// Field handling configuration.
#[derive(PartialEq, Eq, Debug, Clone, Copy, Default)]
pub struct FieldPolicy {
    /// File field handling.
    pub file_fields: FileFieldPolicy,
}

impl TryFrom<&'_ HashMap<String, String>> for FieldPolicy {
    type Error = Error;

    fn try_from(value: &'_ HashMap<String, String>) -> Result<Self> {
        let mut config = FieldPolicy::default();

        value
            .get(FILE_FIELDS)
            .map(|v| v.parse::<FileFieldPolicy>())
            .transpose()?
            .iter()
            .for_each(|v| config.file_fields = *v);

        Ok(config)
    }
}

/// Http transport configuration.
#[derive(PartialEq, Eq, Clone)]
pub struct FiberyClientConfig {
    /// Domain workspaces live under, `{workspace}.{domain}`.
    pub domain: String,
    /// Timeout of a single http request.
    pub request_timeout: Duration,
    /// Api tokens keyed by workspace.
    pub tokens: HashMap<String, String>,
}

impl Default for FiberyClientConfig {
    fn default() -> Self {
        Self {
            domain: "fibery.io".to_string(),
            request_timeout: Duration::from_millis(30_000),
            tokens: HashMap::new(),
        }
    }
}

// Tokens must never end up in logs.
impl std::fmt::Debug for FiberyClientConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FiberyClientConfig")
            .field("domain", &self.domain)
            .field("request_timeout", &self.request_timeout)
            .field("workspaces", &self.tokens.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl TryFrom<&'_ HashMap<String, String>> for FiberyClientConfig {
    type Error = Error;

    fn try_from(value: &'_ HashMap<String, String>) -> Result<Self> {
        let mut config = FiberyClientConfig::default();

        value
            .get(DOMAIN)
            .iter()
            .for_each(|v| config.domain = v.trim_matches('.').to_string());

        value
            .get(REQUEST_TIMEOUT_MS)
            .map(|v| v.parse::<u64>())
            .transpose()
            .map_err(|e| {
                Error::new(
                    ErrorKind::ConfigInvalid,
                    format!("Can't parse {REQUEST_TIMEOUT_MS}."),
                )
                .set_source(e)
            })?
            .iter()
            .for_each(|v| config.request_timeout = Duration::from_millis(*v));

        for (key, token) in value {
            let Some(workspace) = key
                .strip_prefix(WORKSPACE_PREFIX)
                .and_then(|rest| rest.strip_suffix(TOKEN_SUFFIX))
            else {
                continue;
            };

            if workspace.is_empty() || token.is_empty() {
                return Err(Error::new(
                    ErrorKind::ConfigInvalid,
                    format!("{key} must name a workspace and carry a token."),
                ));
            }
            config
                .tokens
                .insert(workspace.to_string(), token.to_string());
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use crate::config::{CoordinatorConfig, FiberyClientConfig, FieldPolicy, FileFieldPolicy};
    use crate::ErrorKind;

    fn props(entries: &[(&str, &str)]) -> HashMap<String, String> {
        entries
            .iter()
            .map(|e| (e.0.to_string(), e.1.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_coordinator_config_from_hashmap() {
        let expected_config = CoordinatorConfig {
            capacity: 8,
            ttl: Duration::from_secs(30),
        };

        let parsed_config = CoordinatorConfig::try_from(&props(&[
            ("fibery.schema_cache.capacity", "8"),
            ("fibery.schema_cache.ttl_secs", "30"),
        ]))
        .unwrap();

        assert_eq!(expected_config, parsed_config);
        assert_eq!(
            CoordinatorConfig::try_from(&HashMap::new()).unwrap(),
            CoordinatorConfig::default()
        );
    }

    #[test]
    fn test_invalid_coordinator_config() {
        let err =
            CoordinatorConfig::try_from(&props(&[("fibery.schema_cache.capacity", "0")]))
                .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);

        let err =
            CoordinatorConfig::try_from(&props(&[("fibery.schema_cache.ttl_secs", "soon")]))
                .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);
    }

    #[test]
    fn test_parse_field_policy() {
        let policy =
            FieldPolicy::try_from(&props(&[("fibery.fields.file_fields", "Supported")])).unwrap();
        assert_eq!(policy.file_fields, FileFieldPolicy::Supported);
        assert_eq!(
            FieldPolicy::default().file_fields,
            FileFieldPolicy::Unsupported
        );

        let err = FieldPolicy::try_from(&props(&[("fibery.fields.file_fields", "sometimes")]))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);
    }

    #[test]
    fn test_parse_client_config() {
        let config = FiberyClientConfig::try_from(&props(&[
            ("fibery.domain", "fibery.dev"),
            ("fibery.request_timeout_ms", "500"),
            ("fibery.workspace.acme.token", "secret-1"),
            ("fibery.workspace.globex.token", "secret-2"),
            ("fibery.schema_cache.capacity", "3"),
        ]))
        .unwrap();

        assert_eq!(config.domain, "fibery.dev");
        assert_eq!(config.request_timeout, Duration::from_millis(500));
        assert_eq!(config.tokens.len(), 2);
        assert_eq!(config.tokens["acme"], "secret-1");

        let debug = format!("{config:?}");
        assert!(!debug.contains("secret-1"));
    }

    #[test]
    fn test_client_config_rejects_empty_token() {
        let err = FiberyClientConfig::try_from(&props(&[("fibery.workspace.acme.token", "")]))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);
    }
}
