//! Configuration loading: defaults, then `zentest.yaml`, then environment
//! variable overrides, in that order.

use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::errors::ZentestError;

pub const DEFAULT_MAX_STEPS: u32 = 50;
pub const DEFAULT_VIEWPORT_WIDTH: u32 = 1280;
pub const DEFAULT_VIEWPORT_HEIGHT: u32 = 720;

/// Which model backend to instantiate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Anthropic,
    OpenAi,
    OpenRouter,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Anthropic => "anthropic",
            Provider::OpenAi => "openai",
            Provider::OpenRouter => "openrouter",
        }
    }

    /// Suffix used in `ZENTEST_<SUFFIX>_API_KEY`.
    pub fn env_suffix(&self) -> &'static str {
        match self {
            Provider::Anthropic => "ANTHROPIC",
            Provider::OpenAi => "OPENAI",
            Provider::OpenRouter => "OPENROUTER",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "anthropic" => Some(Provider::Anthropic),
            "openai" => Some(Provider::OpenAi),
            "openrouter" => Some(Provider::OpenRouter),
            _ => None,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Viewport dimensions for the browser page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: DEFAULT_VIEWPORT_WIDTH,
            height: DEFAULT_VIEWPORT_HEIGHT,
        }
    }
}

/// Headless mode: `auto` resolves from TTY/CI at launch time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Headless {
    Auto,
    Enabled,
    Disabled,
}

impl Default for Headless {
    fn default() -> Self {
        Headless::Auto
    }
}

impl Headless {
    /// Resolve to a concrete headless flag: `auto` means headless iff stdout
    /// is not a terminal or `CI` is set.
    pub fn resolved(&self) -> bool {
        match self {
            Headless::Enabled => true,
            Headless::Disabled => false,
            Headless::Auto => !std::io::stdout().is_terminal() || env::var_os("CI").is_some(),
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto" => Some(Headless::Auto),
            "true" | "1" | "yes" => Some(Headless::Enabled),
            "false" | "0" | "no" => Some(Headless::Disabled),
            _ => None,
        }
    }
}

// Accepts `auto`, a bare boolean, or a boolean-ish string in YAML.
impl<'de> Deserialize<'de> for Headless {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct Visitor;

        impl<'de> de::Visitor<'de> for Visitor {
            type Value = Headless;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("\"auto\", true, or false")
            }

            fn visit_bool<E: de::Error>(self, v: bool) -> Result<Headless, E> {
                Ok(if v {
                    Headless::Enabled
                } else {
                    Headless::Disabled
                })
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Headless, E> {
                Headless::parse(v)
                    .ok_or_else(|| E::custom(format!("invalid headless value '{}'", v)))
            }
        }

        deserializer.deserialize_any(Visitor)
    }
}

/// Model identifiers per role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Models {
    pub agentic_model: String,
    pub builder_model: String,
    pub healer_model: String,
}

impl Default for Models {
    fn default() -> Self {
        Self {
            agentic_model: "claude-sonnet-4-20250514".to_string(),
            builder_model: "claude-sonnet-4-20250514".to_string(),
            healer_model: "claude-sonnet-4-20250514".to_string(),
        }
    }
}

/// Named environment overriding the base URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    pub url: String,
}

/// Root configuration, deserialized from `zentest.yaml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub base_url: Option<String>,
    pub environments: BTreeMap<String, Environment>,
    pub provider: Provider,
    pub models: Models,
    pub max_steps: u32,
    pub viewport: Viewport,
    pub headless: Headless,
    pub api_key: Option<String>,
    /// Command used to run generated scripts; defaults to `npx playwright test`.
    pub static_runner: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: None,
            environments: BTreeMap::new(),
            provider: Provider::Anthropic,
            models: Models::default(),
            max_steps: DEFAULT_MAX_STEPS,
            viewport: Viewport::default(),
            headless: Headless::default(),
            api_key: None,
            static_runner: None,
        }
    }
}

impl Config {
    /// Load configuration: `zentest.yaml` in the working directory, falling
    /// back to `~/.config/zentest/zentest.yaml`, then apply environment
    /// variable overrides.
    pub async fn load(explicit: Option<&Path>) -> Result<Self, ZentestError> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => default_config_path(),
        };

        let mut config = match path {
            Some(ref path) if path.exists() => {
                let content = tokio::fs::read_to_string(path)
                    .await
                    .map_err(|err| ZentestError::Config(format!("{}: {}", path.display(), err)))?;
                let config: Config = serde_yaml::from_str(&content)
                    .map_err(|err| ZentestError::Config(format!("{}: {}", path.display(), err)))?;
                info!(path = %path.display(), "loaded configuration");
                config
            }
            _ => {
                warn!("no config file found, using defaults");
                Config::default()
            }
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Environment variables override the file.
    pub fn apply_env_overrides(&mut self) {
        if let Some(value) = read_env("ZENTEST_PROVIDER") {
            match Provider::parse(&value) {
                Some(provider) => self.provider = provider,
                None => warn!(value, "ignoring invalid ZENTEST_PROVIDER"),
            }
        }
        if let Some(value) = read_env("ZENTEST_AGENTIC_MODEL") {
            self.models.agentic_model = value;
        }
        if let Some(value) = read_env("ZENTEST_BUILDER_MODEL") {
            self.models.builder_model = value;
        }
        if let Some(value) = read_env("ZENTEST_HEALER_MODEL") {
            self.models.healer_model = value;
        }
        if let Some(value) = read_env("ZENTEST_VIEWPORT_WIDTH") {
            match value.parse() {
                Ok(width) => self.viewport.width = width,
                Err(_) => warn!(value, "ignoring invalid ZENTEST_VIEWPORT_WIDTH"),
            }
        }
        if let Some(value) = read_env("ZENTEST_VIEWPORT_HEIGHT") {
            match value.parse() {
                Ok(height) => self.viewport.height = height,
                Err(_) => warn!(value, "ignoring invalid ZENTEST_VIEWPORT_HEIGHT"),
            }
        }
        if let Some(value) = read_env("ZENTEST_HEADLESS") {
            match Headless::parse(&value) {
                Some(headless) => self.headless = headless,
                None => warn!(value, "ignoring invalid ZENTEST_HEADLESS"),
            }
        }
        if let Some(value) = read_env("ZENTEST_MAX_STEPS") {
            match value.parse() {
                Ok(max_steps) => self.max_steps = max_steps,
                Err(_) => warn!(value, "ignoring invalid ZENTEST_MAX_STEPS"),
            }
        }
        if let Some(value) = read_env("ZENTEST_BASE_URL") {
            self.base_url = Some(value);
        }
    }

    /// Base URL for a run, honoring `--env NAME`.
    pub fn resolve_base_url(&self, env_name: Option<&str>) -> Result<String, ZentestError> {
        let raw = match env_name {
            Some(name) => self
                .environments
                .get(name)
                .map(|e| e.url.clone())
                .ok_or_else(|| ZentestError::UnknownEnvironment(name.to_string()))?,
            None => self.base_url.clone().ok_or(ZentestError::MissingBaseUrl)?,
        };
        url::Url::parse(&raw)
            .map_err(|err| ZentestError::Config(format!("invalid base URL '{}': {}", raw, err)))?;
        Ok(raw)
    }

    /// API key for the configured provider: config value, else
    /// `ZENTEST_<PROVIDER>_API_KEY`.
    pub fn resolve_api_key(&self) -> Result<String, ZentestError> {
        if let Some(key) = self.api_key.as_ref().filter(|k| !k.trim().is_empty()) {
            return Ok(key.clone());
        }
        let var = format!("ZENTEST_{}_API_KEY", self.provider.env_suffix());
        read_env(&var).ok_or_else(|| {
            ZentestError::MissingApiKey(
                self.provider.as_str().to_string(),
                self.provider.env_suffix().to_string(),
            )
        })
    }
}

fn read_env(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Some(value),
        _ => None,
    }
}

fn default_config_path() -> Option<PathBuf> {
    let local = PathBuf::from("zentest.yaml");
    if local.exists() {
        return Some(local);
    }
    dirs::config_dir().map(|mut path| {
        path.push("zentest");
        path.push("zentest.yaml");
        path
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.max_steps, 50);
        assert_eq!(config.viewport.width, 1280);
        assert_eq!(config.viewport.height, 720);
        assert_eq!(config.provider, Provider::Anthropic);
        assert_eq!(config.headless, Headless::Auto);
    }

    #[test]
    fn parses_yaml_with_environments() {
        let yaml = r#"
baseUrl: http://localhost:3000
provider: openai
maxSteps: 25
headless: true
environments:
  staging:
    url: https://staging.example.com
models:
  agenticModel: gpt-4o
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.base_url.as_deref(), Some("http://localhost:3000"));
        assert_eq!(config.provider, Provider::OpenAi);
        assert_eq!(config.max_steps, 25);
        assert_eq!(config.headless, Headless::Enabled);
        assert_eq!(config.models.agentic_model, "gpt-4o");
        assert_eq!(
            config.resolve_base_url(Some("staging")).unwrap(),
            "https://staging.example.com"
        );
    }

    #[test]
    fn headless_accepts_auto_and_bool() {
        #[derive(Deserialize)]
        struct Wrap {
            headless: Headless,
        }
        let auto: Wrap = serde_yaml::from_str("headless: auto").unwrap();
        assert_eq!(auto.headless, Headless::Auto);
        let off: Wrap = serde_yaml::from_str("headless: false").unwrap();
        assert_eq!(off.headless, Headless::Disabled);
    }

    #[test]
    fn unknown_environment_is_an_error() {
        let config = Config::default();
        assert!(matches!(
            config.resolve_base_url(Some("nope")),
            Err(ZentestError::UnknownEnvironment(_))
        ));
    }
}
