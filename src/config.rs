//! Configuration management for Vellum Server

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

/// Default listen port
pub const DEFAULT_PORT: u16 = 5000;

/// Default upload limit in megabytes
pub const DEFAULT_MAX_UPLOAD_MB: u64 = 50;

/// Wall-clock limit for a single office conversion
pub const DEFAULT_OFFICE_TIMEOUT_SECS: u64 = 120;

/// Wall-clock limit for the `--version` liveness query
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 5;

/// Wall-clock limit for a single EPUB render
pub const DEFAULT_EPUB_TIMEOUT_SECS: u64 = 120;

/// How long a `--version` result is reused by `/health`
pub const DEFAULT_PROBE_CACHE_SECS: u64 = 5;

/// Decompressed bytes one EPUB may expand to, in megabytes
pub const DEFAULT_EPUB_MAX_EXTRACTED_MB: u64 = 8 * DEFAULT_MAX_UPLOAD_MB;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub upload: UploadConfig,
    pub office: OfficeConfig,
    pub epub: EpubConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Maximum accepted request body in bytes
    pub max_bytes: usize,
    /// Parent directory for per-request workspaces (system temp dir when unset)
    pub workspace_root: Option<PathBuf>,
}

impl UploadConfig {
    pub fn max_megabytes(&self) -> u64 {
        (self.max_bytes / (1024 * 1024)) as u64
    }
}

/// Headless office converter settings
#[derive(Debug, Clone)]
pub struct OfficeConfig {
    pub binary: PathBuf,
    pub timeout: Duration,
    pub probe_timeout: Duration,
    /// Age after which a cached `--version` result is refreshed
    pub probe_cache: Duration,
    /// Number of conversions allowed to run at once
    pub max_concurrent: usize,
    /// Fixed profile directory. When set, conversions are serialized.
    pub shared_profile: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct EpubConfig {
    pub enabled: bool,
    pub render_timeout: Duration,
    /// Total decompressed bytes read from one container
    pub max_extracted_bytes: u64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: DEFAULT_PORT,
            },
            upload: UploadConfig {
                max_bytes: (DEFAULT_MAX_UPLOAD_MB * 1024 * 1024) as usize,
                workspace_root: None,
            },
            office: OfficeConfig {
                binary: PathBuf::from("libreoffice"),
                timeout: Duration::from_secs(DEFAULT_OFFICE_TIMEOUT_SECS),
                probe_timeout: Duration::from_secs(DEFAULT_PROBE_TIMEOUT_SECS),
                probe_cache: Duration::from_secs(DEFAULT_PROBE_CACHE_SECS),
                max_concurrent: 2,
                shared_profile: None,
            },
            epub: EpubConfig {
                enabled: true,
                render_timeout: Duration::from_secs(DEFAULT_EPUB_TIMEOUT_SECS),
                max_extracted_bytes: DEFAULT_EPUB_MAX_EXTRACTED_MB * 1024 * 1024,
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load from the environment, or start from defaults if any value is invalid
    pub fn load() -> Self {
        Self::or_defaults(Self::from_env())
    }

    fn or_defaults(loaded: Result<Self, ConfigError>) -> Self {
        loaded.unwrap_or_else(|e| {
            tracing::warn!(
                "Failed to load config from env: {}. Ignoring every environment setting \
                 (HOST, PORT, OFFICE_BINARY, ...) and starting with defaults",
                e
            );
            Config::default()
        })
    }

    /// Build a configuration from an arbitrary key lookup.
    ///
    /// Missing keys take their defaults; present but unparseable keys are errors.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        let max_upload_mb: u64 = parse_or(&lookup, "MAX_UPLOAD_MB", DEFAULT_MAX_UPLOAD_MB)?;
        let max_concurrent: usize = parse_or(&lookup, "OFFICE_MAX_CONCURRENT", 2)?;
        let max_extracted_mb: u64 =
            parse_or(&lookup, "EPUB_MAX_EXTRACTED_MB", DEFAULT_EPUB_MAX_EXTRACTED_MB)?;

        Ok(Config {
            server: ServerConfig {
                host: lookup("HOST").unwrap_or(defaults.server.host),
                port: parse_or(&lookup, "PORT", DEFAULT_PORT)?,
            },
            upload: UploadConfig {
                max_bytes: (max_upload_mb * 1024 * 1024) as usize,
                workspace_root: lookup("WORKSPACE_DIR").map(PathBuf::from),
            },
            office: OfficeConfig {
                binary: lookup("OFFICE_BINARY")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.office.binary),
                timeout: Duration::from_secs(parse_or(
                    &lookup,
                    "OFFICE_TIMEOUT_SECS",
                    DEFAULT_OFFICE_TIMEOUT_SECS,
                )?),
                probe_timeout: Duration::from_secs(parse_or(
                    &lookup,
                    "OFFICE_PROBE_TIMEOUT_SECS",
                    DEFAULT_PROBE_TIMEOUT_SECS,
                )?),
                probe_cache: Duration::from_secs(parse_or(
                    &lookup,
                    "OFFICE_PROBE_CACHE_SECS",
                    DEFAULT_PROBE_CACHE_SECS,
                )?),
                max_concurrent: max_concurrent.max(1),
                shared_profile: lookup("OFFICE_SHARED_PROFILE")
                    .filter(|value| !value.trim().is_empty())
                    .map(PathBuf::from),
            },
            epub: EpubConfig {
                enabled: parse_or(&lookup, "EPUB_ENABLED", true)?,
                render_timeout: Duration::from_secs(parse_or(
                    &lookup,
                    "EPUB_RENDER_TIMEOUT_SECS",
                    DEFAULT_EPUB_TIMEOUT_SECS,
                )?),
                max_extracted_bytes: max_extracted_mb.saturating_mul(1024 * 1024),
            },
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { key, value: raw }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = Config::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.upload.max_bytes, 50 * 1024 * 1024);
        assert_eq!(config.upload.max_megabytes(), 50);
        assert_eq!(config.office.timeout, Duration::from_secs(120));
        assert_eq!(config.office.probe_timeout, Duration::from_secs(5));
        assert_eq!(config.office.binary, PathBuf::from("libreoffice"));
        assert!(config.office.shared_profile.is_none());
        assert!(config.epub.enabled);
        assert_eq!(config.epub.max_extracted_bytes, 400 * 1024 * 1024);
        assert_eq!(config.office.probe_cache, Duration::from_secs(5));
    }

    #[test]
    fn test_extraction_limit_and_probe_cache() {
        let config = Config::from_lookup(lookup_from(&[
            ("EPUB_MAX_EXTRACTED_MB", "16"),
            ("OFFICE_PROBE_CACHE_SECS", "0"),
        ]))
        .unwrap();

        assert_eq!(config.epub.max_extracted_bytes, 16 * 1024 * 1024);
        assert_eq!(config.office.probe_cache, Duration::ZERO);
    }

    #[test]
    fn test_port_and_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("PORT", "8088"),
            ("OFFICE_BINARY", "/usr/bin/soffice"),
            ("OFFICE_MAX_CONCURRENT", "0"),
            ("OFFICE_SHARED_PROFILE", "/var/lib/vellum/profile"),
            ("EPUB_ENABLED", "false"),
        ]))
        .unwrap();

        assert_eq!(config.server.port, 8088);
        assert_eq!(config.office.binary, PathBuf::from("/usr/bin/soffice"));
        assert_eq!(config.office.max_concurrent, 1);
        assert_eq!(
            config.office.shared_profile,
            Some(PathBuf::from("/var/lib/vellum/profile"))
        );
        assert!(!config.epub.enabled);
    }

    #[test]
    fn test_one_invalid_value_discards_all_settings() {
        let config = Config::or_defaults(Config::from_lookup(lookup_from(&[
            ("PORT", "8088"),
            ("OFFICE_BINARY", "/usr/bin/soffice"),
            ("OFFICE_TIMEOUT_SECS", "two minutes"),
        ])));

        assert_eq!(config.server.port, DEFAULT_PORT);
        assert_eq!(config.office.binary, PathBuf::from("libreoffice"));
    }

    #[test]
    fn test_invalid_port_is_rejected() {
        let err = Config::from_lookup(lookup_from(&[("PORT", "not-a-port")])).unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }
}
