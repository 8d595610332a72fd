//! Connection settings for the TestMonitor client.

use thiserror::Error;

/// Service root appended to the server URI.
pub const SERVICE_BASE_PATH: &str = "/nitestmonitor/v2";

pub const ENV_SERVER_URI: &str = "SYSTEMLINK_HTTP_URI";
pub const ENV_API_KEY: &str = "SYSTEMLINK_API_KEY";
pub const ENV_WORKSPACE: &str = "SYSTEMLINK_WORKSPACE";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("server URI cannot be empty")]
    EmptyServerUri,

    #[error("server URI must start with http:// or https://: {0}")]
    InvalidScheme(String),

    #[error("API key cannot be empty when set")]
    EmptyApiKey,

    #[error("default workspace cannot be empty when set")]
    EmptyWorkspace,
}

/// Where the service lives and how requests are scoped.
///
/// `default_workspace` stands in for the workspace lookup service: it is
/// applied to created results that name no workspace of their own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub server_uri: String,
    pub api_key: Option<String>,
    pub default_workspace: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_uri: "http://localhost:3000".to_string(),
            api_key: None,
            default_workspace: None,
        }
    }
}

impl ClientConfig {
    pub fn new(server_uri: impl Into<String>) -> Self {
        Self {
            server_uri: server_uri.into(),
            ..Self::default()
        }
    }

    /// Read settings from `SYSTEMLINK_HTTP_URI`, `SYSTEMLINK_API_KEY` and
    /// `SYSTEMLINK_WORKSPACE`. Unset variables keep their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(uri) = lookup(ENV_SERVER_URI) {
            config.server_uri = uri;
        }
        config.api_key = lookup(ENV_API_KEY);
        config.default_workspace = lookup(ENV_WORKSPACE);
        config.validate()?;
        Ok(config)
    }

    pub fn with_server_uri(mut self, server_uri: impl Into<String>) -> Self {
        self.server_uri = server_uri.into();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_default_workspace(mut self, workspace: impl Into<String>) -> Self {
        self.default_workspace = Some(workspace.into());
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server_uri.trim().is_empty() {
            return Err(ConfigError::EmptyServerUri);
        }
        if !self.server_uri.starts_with("http://") && !self.server_uri.starts_with("https://") {
            return Err(ConfigError::InvalidScheme(self.server_uri.clone()));
        }
        if matches!(self.api_key.as_deref(), Some(k) if k.is_empty()) {
            return Err(ConfigError::EmptyApiKey);
        }
        if matches!(self.default_workspace.as_deref(), Some(w) if w.is_empty()) {
            return Err(ConfigError::EmptyWorkspace);
        }
        Ok(())
    }

    /// Base URL of the results API, without a trailing slash.
    pub fn service_url(&self) -> String {
        format!("{}{SERVICE_BASE_PATH}", self.server_uri.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config_is_valid() {
        assert!(ClientConfig::default().validate().is_ok());
    }

    #[test]
    fn service_url_appends_base_path() {
        let config = ClientConfig::new("https://systemlink.example.com/");
        assert_eq!(
            config.service_url(),
            "https://systemlink.example.com/nitestmonitor/v2"
        );
    }

    #[test]
    fn rejects_missing_scheme() {
        let err = ClientConfig::new("systemlink.example.com").validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidScheme(_)));
    }

    #[test]
    fn rejects_empty_values() {
        assert_eq!(
            ClientConfig::new("").validate().unwrap_err(),
            ConfigError::EmptyServerUri
        );
        assert_eq!(
            ClientConfig::default().with_api_key("").validate().unwrap_err(),
            ConfigError::EmptyApiKey
        );
        assert_eq!(
            ClientConfig::default()
                .with_default_workspace("")
                .validate()
                .unwrap_err(),
            ConfigError::EmptyWorkspace
        );
    }

    #[test]
    fn lookup_reads_all_variables() {
        let env: HashMap<&str, &str> = [
            (ENV_SERVER_URI, "https://sl.example.com"),
            (ENV_API_KEY, "secret"),
            (ENV_WORKSPACE, "ws-1"),
        ]
        .into_iter()
        .collect();
        let config = ClientConfig::from_lookup(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.server_uri, "https://sl.example.com");
        assert_eq!(config.api_key.as_deref(), Some("secret"));
        assert_eq!(config.default_workspace.as_deref(), Some("ws-1"));
    }

    #[test]
    fn lookup_keeps_defaults_when_unset() {
        let config = ClientConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn lookup_propagates_validation_errors() {
        let err = ClientConfig::from_lookup(|k| (k == ENV_SERVER_URI).then(|| "ftp://x".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidScheme(_)));
    }
}
