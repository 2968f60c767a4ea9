//! Service configuration.
//!
//! Loaded from environment variables with defaults suitable for running the
//! service locally.

use std::net::SocketAddr;
use std::path::PathBuf;

use crate::error::{MergeError, MergeResult};

/// Default upload limit per request (both archives together).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 512 * 1024 * 1024;

/// Settings for the HTTP merge service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Interface to bind
    pub bind_host: String,
    /// Port to listen on
    pub port: u16,
    /// Directory holding uploads, extracted backups and the merged output
    pub work_dir: PathBuf,
    /// Maximum accepted request body size in bytes
    pub max_upload_bytes: usize,
    /// Allowed CORS origins; empty allows any origin
    pub cors_origins: Vec<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            port: 8000,
            work_dir: PathBuf::from("data"),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            cors_origins: Vec::new(),
        }
    }
}

impl ServiceConfig {
    /// Create a ServiceConfig from environment variables.
    ///
    /// Environment variables:
    /// - `MERGE_BIND`: interface to bind (default: 0.0.0.0)
    /// - `PORT` or `MERGE_PORT`: listen port (default: 8000)
    /// - `MERGE_WORK_DIR`: working directory (default: data)
    /// - `MERGE_MAX_UPLOAD_BYTES`: request body limit (default: 512 MiB)
    /// - `MERGE_CORS_ORIGINS`: comma-separated allowed origins (empty = allow all)
    pub fn from_env() -> MergeResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> MergeResult<Self> {
        let defaults = Self::default();

        let bind_host = lookup("MERGE_BIND").unwrap_or(defaults.bind_host);

        let port = match lookup("PORT").or_else(|| lookup("MERGE_PORT")) {
            Some(value) => value
                .parse::<u16>()
                .map_err(|_| MergeError::Config(format!("Invalid port value: {}", value)))?,
            None => defaults.port,
        };

        let work_dir = lookup("MERGE_WORK_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.work_dir);

        let max_upload_bytes = match lookup("MERGE_MAX_UPLOAD_BYTES") {
            Some(value) => value.parse::<usize>().map_err(|_| {
                MergeError::Config(format!("Invalid upload limit: {}", value))
            })?,
            None => defaults.max_upload_bytes,
        };

        let cors_origins = lookup("MERGE_CORS_ORIGINS")
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            bind_host,
            port,
            work_dir,
            max_upload_bytes,
            cors_origins,
        })
    }

    /// Socket address to bind.
    pub fn bind_addr(&self) -> MergeResult<SocketAddr> {
        let addr = format!("{}:{}", self.bind_host, self.port);
        addr.parse::<SocketAddr>()
            .map_err(|e| MergeError::Config(format!("Invalid bind address {}: {}", addr, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ServiceConfig::default());
        assert_eq!(config.bind_addr().unwrap().port(), 8000);
    }

    #[test]
    fn test_overrides() {
        let config = ServiceConfig::from_lookup(lookup(&[
            ("MERGE_BIND", "127.0.0.1"),
            ("MERGE_PORT", "9100"),
            ("MERGE_WORK_DIR", "/tmp/merge"),
            ("MERGE_MAX_UPLOAD_BYTES", "1024"),
            ("MERGE_CORS_ORIGINS", "https://a.example, https://b.example,"),
        ]))
        .unwrap();

        assert_eq!(config.bind_addr().unwrap().to_string(), "127.0.0.1:9100");
        assert_eq!(config.work_dir, PathBuf::from("/tmp/merge"));
        assert_eq!(config.max_upload_bytes, 1024);
        assert_eq!(config.cors_origins, vec!["https://a.example", "https://b.example"]);
    }

    #[test]
    fn test_port_takes_precedence() {
        let config =
            ServiceConfig::from_lookup(lookup(&[("PORT", "7000"), ("MERGE_PORT", "9100")])).unwrap();
        assert_eq!(config.port, 7000);
    }

    #[test]
    fn test_invalid_port() {
        let err = ServiceConfig::from_lookup(lookup(&[("PORT", "http")])).unwrap_err();
        assert!(matches!(err, MergeError::Config(_)));
    }
}
