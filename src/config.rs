use crate::dispatch::DispatchConfig;

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Directory holding the subscription store and the VAPID key file.
    pub data_dir: PathBuf,
    /// VAPID `sub` claim identifying this server to push services; a
    /// `mailto:` or `https:` URI.
    pub contact: String,
    /// Base64url AES-256 key sealing the VAPID private key at rest.
    pub codec_key: String,
    pub enabled: bool,
    pub pool_size: usize,
    pub dispatch_delay: Duration,
    pub max_body_length: usize,
    pub require_interaction: bool,
    pub renotify: bool,
    pub silent: bool,
    pub default_lang: String,
    /// TTL header of outgoing push messages, in seconds.
    pub ttl: u32,
}

impl AppConfig {
    pub fn dispatch(&self) -> DispatchConfig {
        DispatchConfig {
            enabled: self.enabled,
            pool_size: self.pool_size,
            delay: self.dispatch_delay,
            max_body_length: self.max_body_length,
            require_interaction: self.require_interaction,
            renotify: self.renotify,
            silent: self.silent,
        }
    }
}

#[cfg(test)]
impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: std::env::temp_dir().join("pushgate-test"),
            contact: "mailto:admin@example.com".to_string(),
            codec_key: crate::adapters::AesGcmCodec::generate_key(),
            enabled: true,
            pool_size: 5,
            dispatch_delay: Duration::from_secs(1),
            max_body_length: 75,
            require_interaction: true,
            renotify: true,
            silent: false,
            default_lang: "en".to_string(),
            ttl: 3600,
        }
    }
}

/// Optional TOML configuration file; command-line flags and environment
/// variables take precedence over its values.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub listen: Option<SocketAddr>,
    pub data_dir: Option<PathBuf>,
    pub contact: Option<String>,
    pub codec_key: Option<String>,
    pub enabled: Option<bool>,
    pub pool_size: Option<usize>,
    pub dispatch_delay_ms: Option<u64>,
    pub max_body_length: Option<usize>,
    pub require_interaction: Option<bool>,
    pub renotify: Option<bool>,
    pub silent: Option<bool>,
    pub default_lang: Option<String>,
    pub ttl: Option<u32>,
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Self, String> {
        let contents = std::fs::read_to_string(path)
            .map_err(|err| format!("failed to read {}: {err}", path.display()))?;
        toml::from_str(&contents).map_err(|err| format!("invalid {}: {err}", path.display()))
    }
}

#[cfg(test)]
#[allow(non_snake_case)]
mod tests {
    use super::*;

    #[test]
    fn config_file__should_parse_known_fields() {
        // Given
        let raw = r#"
            listen = "127.0.0.1:8080"
            data_dir = "/var/lib/pushgate"
            contact = "mailto:ops@example.com"
            pool_size = 10
            dispatch_delay_ms = 250
            silent = true
        "#;

        // When
        let file: ConfigFile = toml::from_str(raw).expect("parse config");

        // Then
        assert_eq!(file.listen, Some("127.0.0.1:8080".parse().expect("addr")));
        assert_eq!(file.data_dir, Some(PathBuf::from("/var/lib/pushgate")));
        assert_eq!(file.contact.as_deref(), Some("mailto:ops@example.com"));
        assert_eq!(file.pool_size, Some(10));
        assert_eq!(file.dispatch_delay_ms, Some(250));
        assert_eq!(file.silent, Some(true));
        assert_eq!(file.ttl, None);
    }

    #[test]
    fn config_file__should_reject_unknown_fields() {
        let result: Result<ConfigFile, _> = toml::from_str("max_body = 75");

        assert!(result.is_err());
    }
}
