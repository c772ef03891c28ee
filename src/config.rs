use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::scope::Scope;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    /// Default account / org / project the wizards run in
    #[serde(default)]
    pub scope: Scope,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Location the app is served from, e.g. `https://app.example.com/ng/`
    #[serde(default = "default_location")]
    pub location: String,
    /// API path appended to the resolved base
    #[serde(default = "default_api_path")]
    pub api_path: String,
    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// API key sent as `x-api-key`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

fn default_location() -> String {
    "http://localhost:8181/ng/".to_string()
}

fn default_api_path() -> String {
    "ng/api".to_string()
}

fn default_timeout() -> u64 {
    30
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            location: default_location(),
            api_path: default_api_path(),
            timeout_secs: default_timeout(),
            token: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Write logs to a file instead of stderr
    #[serde(default)]
    pub to_file: bool,

    /// Directory for log files (default: platform data dir)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            to_file: false,
            dir: None,
        }
    }
}

impl Config {
    /// `~/.config/stepwizard/config.toml`
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("stepwizard").join("config.toml"))
    }

    pub fn load(config_path: Option<&str>) -> Result<Self> {
        // Start with embedded defaults so the tool works without config files
        let defaults = Config::default();
        let defaults_json =
            serde_json::to_string(&defaults).context("Failed to serialize default config")?;

        let mut builder = config::Config::builder().add_source(config::File::from_str(
            &defaults_json,
            config::FileFormat::Json,
        ));

        if let Some(user_config) = Self::user_config_path() {
            if user_config.exists() {
                builder = builder.add_source(config::File::from(user_config));
            }
        }

        // Explicit config file (CLI override)
        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path));
        }

        // Environment variables with STEPWIZARD_ prefix
        builder = builder.add_source(
            config::Environment::with_prefix("STEPWIZARD")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to load configuration")?;
        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    pub fn save(&self) -> Result<()> {
        let Some(config_path) = Self::user_config_path() else {
            bail!("No user config directory on this platform");
        };
        self.save_to(&config_path)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let toml_str =
            toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        std::fs::write(config_path, toml_str).context("Failed to write config file")?;

        Ok(())
    }

    /// Scope wizards and API calls default to
    pub fn scope(&self) -> Scope {
        self.scope.clone()
    }

    /// NG API base URL resolved from the configured location
    pub fn api_base_url(&self) -> Result<String> {
        resolve_api_base(&self.api.location, &self.api.api_path)
    }

    pub fn logs_path(&self) -> PathBuf {
        match &self.logging.dir {
            Some(dir) => PathBuf::from(dir),
            None => dirs::data_local_dir()
                .map(|dir| dir.join("stepwizard"))
                .unwrap_or_else(|| PathBuf::from(".stepwizard"))
                .join("logs"),
        }
    }
}

/// Resolve an API base URL against the location the app is served from
///
/// Everything from the `ng` mount segment onwards is dropped, then
/// `api_path` is appended: `https://host/gateway/ng/#/account/x` with
/// `ng/api` gives `https://host/gateway/ng/api`.
pub fn resolve_api_base(location: &str, api_path: &str) -> Result<String> {
    let url = reqwest::Url::parse(location)
        .with_context(|| format!("Invalid location URL: {}", location))?;
    if !matches!(url.scheme(), "http" | "https") {
        bail!("Location must be an http(s) URL: {}", location);
    }

    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|s| !s.is_empty()).collect())
        .unwrap_or_default();
    let mount = segments
        .iter()
        .position(|s| *s == "ng")
        .unwrap_or(segments.len());

    let mut base = url.origin().ascii_serialization();
    for segment in &segments[..mount] {
        base.push('/');
        base.push_str(segment);
    }
    let api_path = api_path.trim_matches('/');
    if !api_path.is_empty() {
        base.push('/');
        base.push_str(api_path);
    }
    Ok(base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::Module;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_api_base_strips_mount() {
        assert_eq!(
            resolve_api_base("https://app.example.com/ng/#/account/abc/home", "ng/api").unwrap(),
            "https://app.example.com/ng/api"
        );
        assert_eq!(
            resolve_api_base("https://app.example.com/gateway/ng/account/abc", "/ng/api/").unwrap(),
            "https://app.example.com/gateway/ng/api"
        );
    }

    #[test]
    fn test_resolve_api_base_without_mount() {
        assert_eq!(
            resolve_api_base("http://localhost:8181/", "ng/api").unwrap(),
            "http://localhost:8181/ng/api"
        );
        assert_eq!(
            resolve_api_base("http://localhost:8181/prefix?x=1", "ng/api").unwrap(),
            "http://localhost:8181/prefix/ng/api"
        );
    }

    #[test]
    fn test_resolve_api_base_rejects_bad_location() {
        assert!(resolve_api_base("not a url", "ng/api").is_err());
        assert!(resolve_api_base("file:///tmp/ng/", "ng/api").is_err());
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.api.timeout_secs, 30);
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.to_file);
        assert_eq!(config.api_base_url().unwrap(), "http://localhost:8181/ng/api");
    }

    #[test]
    fn test_load_explicit_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("custom.toml");
        std::fs::write(
            &path,
            r#"
[api]
location = "https://app.example.com/ng/"
token = "pat.abc"

[scope]
account_id = "acc1"
org_identifier = "default"
project_identifier = "web"
module = "cd"
"#,
        )
        .unwrap();

        let config = Config::load(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(config.api.token.as_deref(), Some("pat.abc"));
        assert_eq!(config.api.api_path, "ng/api");
        assert_eq!(
            config.scope(),
            Scope::project("acc1", "default", "web").with_module(Module::Cd)
        );
        assert_eq!(config.api_base_url().unwrap(), "https://app.example.com/ng/api");
    }

    #[test]
    fn test_save_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");
        let mut config = Config::default();
        config.scope = Scope::account("acc1").with_org("default");
        config.logging.dir = Some("/tmp/logs".to_string());

        config.save_to(&path).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("account_id = \"acc1\""));
        assert!(!written.contains("token"));

        let loaded = Config::load(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(loaded.scope, config.scope);
        assert_eq!(loaded.logs_path(), PathBuf::from("/tmp/logs"));
    }
}
