//! Server configuration loaded from environment variables.
//!
//! All settings have defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use tatsahay_core::{PipelineConfig, ProjectionPolicy};
use tatsahay_shared::constants::{
    DEFAULT_HTTP_PORT, MAX_MEDIA_SIZE, SESSION_TTL_SECS, SUBMISSION_RETENTION_SECS,
};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP API.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// SQLite database file.
    /// Env: `DATABASE_PATH`
    /// Default: unset, meaning the platform data directory.
    pub database_path: Option<PathBuf>,

    /// Directory holding uploaded report photos.
    /// Env: `MEDIA_STORAGE_PATH`
    /// Default: `./media`
    pub media_storage_path: PathBuf,

    /// Maximum photo size in bytes.
    /// Env: `MAX_MEDIA_SIZE`
    pub max_media_size: usize,

    /// Bearer token for `/admin/*`.
    /// Env: `ADMIN_TOKEN`
    /// Default: empty (admin API disabled).
    pub admin_token: Option<String>,

    /// Env: `INSTANCE_NAME`
    pub instance_name: String,

    /// Env: `UPLOAD_TIMEOUT_SECS`
    pub upload_timeout: Duration,

    /// Env: `STORE_TIMEOUT_SECS`
    pub store_timeout: Duration,

    /// Whether reports awaiting moderation appear in the public feed.
    /// Env: `FEED_INCLUDES_UNVERIFIED` (true/false)
    /// Default: `true`
    pub feed_includes_unverified: bool,

    /// How long a finished submission can still be polled.
    /// Env: `SUBMISSION_RETENTION_SECS`
    /// Default: 15 minutes
    pub submission_retention: Duration,

    /// Lifetime of a session token issued by `/auth/login`.
    /// Env: `SESSION_TTL_SECS`
    /// Default: 24 hours
    pub session_ttl: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let pipeline = PipelineConfig::default();
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            database_path: None,
            media_storage_path: PathBuf::from("./media"),
            max_media_size: MAX_MEDIA_SIZE,
            admin_token: None,
            instance_name: "Tat-Sahay".to_string(),
            upload_timeout: pipeline.upload_timeout,
            store_timeout: pipeline.store_timeout,
            feed_includes_unverified: ProjectionPolicy::default().feed_includes_unverified,
            submission_retention: Duration::from_secs(SUBMISSION_RETENTION_SECS),
            session_ttl: Duration::from_secs(SESSION_TTL_SECS),
        }
    }
}

impl ServerConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`, falling back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = lookup("HTTP_ADDR") {
            match addr.parse::<SocketAddr>() {
                Ok(parsed) => config.http_addr = parsed,
                Err(_) => tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default"),
            }
        }

        if let Some(path) = lookup("DATABASE_PATH").filter(|p| !p.is_empty()) {
            config.database_path = Some(PathBuf::from(path));
        }

        if let Some(path) = lookup("MEDIA_STORAGE_PATH").filter(|p| !p.is_empty()) {
            config.media_storage_path = PathBuf::from(path);
        }

        if let Some(size) = parse_var(&lookup, "MAX_MEDIA_SIZE") {
            config.max_media_size = size;
        }

        if let Some(token) = lookup("ADMIN_TOKEN").filter(|t| !t.is_empty()) {
            config.admin_token = Some(token);
        }

        if let Some(name) = lookup("INSTANCE_NAME") {
            config.instance_name = name;
        }

        if let Some(secs) = parse_var::<u64, _>(&lookup, "UPLOAD_TIMEOUT_SECS") {
            config.upload_timeout = Duration::from_secs(secs);
        }

        if let Some(secs) = parse_var::<u64, _>(&lookup, "STORE_TIMEOUT_SECS") {
            config.store_timeout = Duration::from_secs(secs);
        }

        if let Some(val) = lookup("FEED_INCLUDES_UNVERIFIED") {
            config.feed_includes_unverified = val != "false" && val != "0";
        }

        if let Some(secs) = parse_var::<u64, _>(&lookup, "SUBMISSION_RETENTION_SECS") {
            config.submission_retention = Duration::from_secs(secs);
        }

        if let Some(secs) = parse_var::<u64, _>(&lookup, "SESSION_TTL_SECS") {
            config.session_ttl = Duration::from_secs(secs);
        }

        config
    }

    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            upload_timeout: self.upload_timeout,
            store_timeout: self.store_timeout,
        }
    }

    pub fn projection_policy(&self) -> ProjectionPolicy {
        ProjectionPolicy {
            feed_includes_unverified: self.feed_includes_unverified,
        }
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Invalid value, using default");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> ServerConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 8080).into());
        assert!(config.database_path.is_none());
        assert!(config.admin_token.is_none());
        assert!(config.feed_includes_unverified);
        assert_eq!(config.max_media_size, MAX_MEDIA_SIZE);
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("HTTP_ADDR", "127.0.0.1:9000"),
            ("DATABASE_PATH", "/var/lib/tatsahay/reports.db"),
            ("ADMIN_TOKEN", "s3cret"),
            ("UPLOAD_TIMEOUT_SECS", "5"),
            ("FEED_INCLUDES_UNVERIFIED", "false"),
            ("SESSION_TTL_SECS", "3600"),
        ]);
        assert_eq!(config.http_addr, ([127, 0, 0, 1], 9000).into());
        assert_eq!(
            config.database_path,
            Some(PathBuf::from("/var/lib/tatsahay/reports.db"))
        );
        assert_eq!(config.admin_token.as_deref(), Some("s3cret"));
        assert_eq!(config.pipeline().upload_timeout, Duration::from_secs(5));
        assert!(!config.projection_policy().feed_includes_unverified);
        assert_eq!(config.session_ttl, Duration::from_secs(3600));
        assert_eq!(
            config.submission_retention,
            Duration::from_secs(SUBMISSION_RETENTION_SECS)
        );
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = config_from(&[
            ("HTTP_ADDR", "not-an-addr"),
            ("MAX_MEDIA_SIZE", "lots"),
            ("ADMIN_TOKEN", ""),
        ]);
        assert_eq!(config.http_addr, ServerConfig::default().http_addr);
        assert_eq!(config.max_media_size, MAX_MEDIA_SIZE);
        assert!(config.admin_token.is_none());
    }
}
