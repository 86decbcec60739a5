//! Environment configuration shared by the `ingest` CLI and the API service.

use crate::orchestrator::DEFAULT_MAX_UPLOAD_BYTES;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} env var missing")]
    Missing(&'static str),

    #[error("{name} has invalid value {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub db_url: Option<String>,
    pub api_bind: String,
    pub db_max_connections: u32,
    pub max_upload_bytes: usize,
    /// Lower-cased. Empty means any authenticated caller may upload.
    pub admin_emails: Vec<String>,
    pub admin_subjects: Vec<String>,
    pub run_migrations: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source; `from_env` passes the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        Ok(Self {
            db_url: var("DB_URL"),
            api_bind: var("API_BIND").unwrap_or_else(|| "127.0.0.1:8080".to_string()),
            db_max_connections: parse_or("DB_MAX_CONNECTIONS", var("DB_MAX_CONNECTIONS"), 10)?,
            max_upload_bytes: parse_or("MAX_UPLOAD_BYTES", var("MAX_UPLOAD_BYTES"), DEFAULT_MAX_UPLOAD_BYTES)?,
            admin_emails: split_list(var("ADMIN_EMAILS"), true),
            admin_subjects: split_list(var("ADMIN_SUBJECTS"), false),
            run_migrations: parse_bool("RUN_MIGRATIONS", var("RUN_MIGRATIONS"), true)?,
        })
    }

    pub fn require_db_url(&self) -> Result<&str, ConfigError> {
        self.db_url.as_deref().ok_or(ConfigError::Missing("DB_URL"))
    }
}

fn parse_or<T: std::str::FromStr>(name: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value.parse().map_err(|_| ConfigError::Invalid { name, value }),
    }
}

fn parse_bool(name: &'static str, raw: Option<String>, default: bool) -> Result<bool, ConfigError> {
    match raw.as_deref().map(str::to_ascii_lowercase).as_deref() {
        None => Ok(default),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(_) => Err(ConfigError::Invalid {
            name,
            value: raw.unwrap_or_default(),
        }),
    }
}

fn split_list(raw: Option<String>, lowercase: bool) -> Vec<String> {
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| if lowercase { s.to_lowercase() } else { s.to_string() })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.db_url, None);
        assert_eq!(cfg.api_bind, "127.0.0.1:8080");
        assert_eq!(cfg.db_max_connections, 10);
        assert_eq!(cfg.max_upload_bytes, 10 * 1024 * 1024);
        assert!(cfg.admin_emails.is_empty());
        assert!(cfg.run_migrations);
        assert_eq!(cfg.require_db_url(), Err(ConfigError::Missing("DB_URL")));
    }

    #[test]
    fn test_overrides() {
        let cfg = config(&[
            ("DB_URL", "postgres://localhost/ingest"),
            ("MAX_UPLOAD_BYTES", "1024"),
            ("ADMIN_EMAILS", " Ana@Example.com, ,bo@example.com"),
            ("ADMIN_SUBJECTS", "oid-1"),
            ("RUN_MIGRATIONS", "false"),
        ])
        .unwrap();
        assert_eq!(cfg.require_db_url(), Ok("postgres://localhost/ingest"));
        assert_eq!(cfg.max_upload_bytes, 1024);
        assert_eq!(cfg.admin_emails, ["ana@example.com", "bo@example.com"]);
        assert_eq!(cfg.admin_subjects, ["oid-1"]);
        assert!(!cfg.run_migrations);
    }

    #[test]
    fn test_invalid_values() {
        assert_eq!(
            config(&[("DB_MAX_CONNECTIONS", "lots")]).unwrap_err(),
            ConfigError::Invalid {
                name: "DB_MAX_CONNECTIONS",
                value: "lots".into()
            }
        );
        assert!(config(&[("RUN_MIGRATIONS", "maybe")]).is_err());
    }
}
