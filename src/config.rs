//! Configuration for the proxy.
//!
//! Sources, lowest to highest precedence: built-in defaults, an optional TOML
//! file, environment variables, then command-line flags (applied by `main`).
//! A missing file yields `Config::default()`. Unknown keys are accepted but
//! logged as a warning.
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::feed::upstream::CHANNEL_PLACEHOLDER;
use crate::media::DEFAULT_MAX_IMAGE_BYTES;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// SEC-014: Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// ============================================================================
// Configuration Struct
// ============================================================================

/// Process configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// TCP port to listen on (all interfaces).
    pub port: u16,

    /// Public origin used to build image links, e.g. `https://rss.example.com`.
    /// Defaults to `http://localhost:<port>` when unset.
    pub base_url: Option<String>,

    /// Directory holding harvested images. Created at startup if missing.
    pub content_dir: PathBuf,

    /// Channel served when a request has no `channel` query parameter.
    pub default_channel: String,

    /// Upstream feed URL template; must contain `{channel}`.
    pub upstream_url: String,

    /// Per-image download timeout in seconds. 0 = wait indefinitely.
    pub image_timeout_secs: u64,

    /// Largest image body accepted, in bytes.
    pub max_image_bytes: usize,

    /// Allow image URLs pointing at localhost or private networks.
    pub allow_private_hosts: bool,

    /// Allow plain `http` image URLs. Off means only `https` is downloaded.
    pub allow_insecure_http: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 80,
            base_url: None,
            content_dir: PathBuf::from("images"),
            default_channel: "telegram".to_string(),
            upstream_url: "https://rsshub.app/telegram/channel/{channel}".to_string(),
            image_timeout_secs: 0,
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
            allow_private_hosts: false,
            allow_insecure_http: false,
        }
    }
}

impl Config {
    /// SEC-014: Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 9] = [
        "port",
        "base_url",
        "content_dir",
        "default_channel",
        "upstream_url",
        "image_timeout_secs",
        "max_image_bytes",
        "allow_private_hosts",
        "allow_insecure_http",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Race condition: file deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), port = config.port, "Loaded configuration");
        Ok(config)
    }

    /// Applies `PORT`, `RSSOK_BASE_URL`, `RSSOK_CONTENT_DIR` and
    /// `RSSOK_UPSTREAM_URL` from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Same as [`Config::apply_env`] with an injectable lookup.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(port) = get("PORT") {
            self.port = port
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("PORT is not a valid port: {port:?}")))?;
        }
        if let Some(base_url) = get("RSSOK_BASE_URL") {
            self.base_url = Some(base_url);
        }
        if let Some(dir) = get("RSSOK_CONTENT_DIR") {
            self.content_dir = PathBuf::from(dir);
        }
        if let Some(upstream) = get("RSSOK_UPSTREAM_URL") {
            self.upstream_url = upstream;
        }
        Ok(())
    }

    /// Rejects values that would only fail later at request time.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(base_url) = &self.base_url {
            let parsed = url::Url::parse(base_url)
                .map_err(|e| ConfigError::Invalid(format!("base_url {base_url:?}: {e}")))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(ConfigError::Invalid(format!(
                    "base_url {base_url:?} must be http or https"
                )));
            }
        }
        if !self.upstream_url.contains(CHANNEL_PLACEHOLDER) {
            return Err(ConfigError::Invalid(format!(
                "upstream_url must contain {CHANNEL_PLACEHOLDER}"
            )));
        }
        if !crate::util::is_valid_channel_id(&self.default_channel) {
            return Err(ConfigError::Invalid(format!(
                "default_channel {:?} is not a valid channel id",
                self.default_channel
            )));
        }
        Ok(())
    }

    /// Origin that image links are built on.
    pub fn media_base_url(&self) -> String {
        match &self.base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://localhost:{}", self.port),
        }
    }

    pub fn image_timeout(&self) -> Option<Duration> {
        (self.image_timeout_secs > 0).then(|| Duration::from_secs(self.image_timeout_secs))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn write_config(content: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rssok.toml");
        std::fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.port, 80);
        assert_eq!(config.base_url, None);
        assert_eq!(config.content_dir, PathBuf::from("images"));
        assert_eq!(config.default_channel, "telegram");
        assert_eq!(config.image_timeout(), None);
        assert!(!config.allow_private_hosts);
        assert!(!config.allow_insecure_http);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.port, 80);
    }

    #[test]
    fn test_whitespace_only_file_returns_default() {
        let (_dir, path) = write_config("   \n  \n  ");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.default_channel, "telegram");
    }

    #[test]
    fn test_partial_config_uses_defaults_for_missing() {
        let (_dir, path) = write_config("port = 8080\n");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.content_dir, PathBuf::from("images"));
        assert_eq!(config.media_base_url(), "http://localhost:8080");
    }

    #[test]
    fn test_full_config() {
        let (_dir, path) = write_config(
            r#"
port = 3000
base_url = "https://rss.example.com/"
content_dir = "/var/lib/rssok"
default_channel = "durov"
upstream_url = "https://bridge.example/tg/{channel}.xml"
image_timeout_secs = 15
max_image_bytes = 1024
allow_private_hosts = true
allow_insecure_http = true
"#,
        );
        let config = Config::load(&path).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.media_base_url(), "https://rss.example.com");
        assert_eq!(config.content_dir, PathBuf::from("/var/lib/rssok"));
        assert_eq!(config.default_channel, "durov");
        assert_eq!(config.image_timeout(), Some(Duration::from_secs(15)));
        assert_eq!(config.max_image_bytes, 1024);
        assert!(config.allow_private_hosts);
        assert!(config.allow_insecure_http);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let (_dir, path) = write_config("this is not [valid toml");
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("Invalid TOML"));
    }

    #[test]
    fn test_wrong_type_returns_error() {
        let (_dir, path) = write_config("port = \"eighty\"\n");
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn test_unknown_keys_accepted() {
        let (_dir, path) = write_config("port = 81\ntotally_fake_key = 1\n");
        assert_eq!(Config::load(&path).unwrap().port, 81);
    }

    // SEC-014: File size limit
    #[test]
    fn test_too_large_file_rejected() {
        let (_dir, path) = write_config(&"a".repeat(1_048_577));
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::TooLarge(_)));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("PORT", "9090"),
            ("RSSOK_BASE_URL", "https://feeds.example.org"),
            ("RSSOK_CONTENT_DIR", "/tmp/media"),
            ("RSSOK_UPSTREAM_URL", "https://b.example/{channel}"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_env_from(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.port, 9090);
        assert_eq!(config.media_base_url(), "https://feeds.example.org");
        assert_eq!(config.content_dir, PathBuf::from("/tmp/media"));
        assert_eq!(config.upstream_url, "https://b.example/{channel}");
    }

    #[test]
    fn test_blank_env_values_ignored() {
        let mut config = Config::default();
        config
            .apply_env_from(|key| (key == "PORT").then(|| "  ".to_string()))
            .unwrap();
        assert_eq!(config.port, 80);
    }

    #[test]
    fn test_bad_port_env_rejected() {
        let mut config = Config::default();
        let result = config.apply_env_from(|key| (key == "PORT").then(|| "http".to_string()));
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = Config {
            base_url: Some("not a url".into()),
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            base_url: Some("ftp://example.com".into()),
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            upstream_url: "https://bridge.example/static.xml".into(),
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            default_channel: "no/slashes".into(),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
