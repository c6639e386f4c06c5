//! Configuration loader for the coordination core.
//!
//! Uses Figment to merge built-in defaults + `config.toml` +
//! `config.<env>.toml` + `APP_*` env vars (nested keys split on `__`, e.g.
//! `APP_SERVICES__SEARCH_HOST`).
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use tracing::warn;
use url::Url;

use crate::error::{Error, Result};
use crate::types::{SortKey, StageKind};

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::from(Serialized::defaults(Settings::default())).merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment };
        config.validate_for_env(&env_name)?;
        Ok(config)
    }

    /// Wrap an already-assembled figment (defaults are not added).
    pub fn from_figment(figment: Figment) -> Self {
        Self { figment }
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    pub fn settings(&self) -> anyhow::Result<Settings> {
        let settings: Settings = self
            .figment
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to extract settings: {}", e))?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate_for_env(&self, env: &str) -> anyhow::Result<()> {
        let settings = self.settings()?;
        match env {
            "prod" | "production" => {
                for (name, host) in [
                    ("services.metadata_host", &settings.services.metadata_host),
                    ("services.search_host", &settings.services.search_host),
                ] {
                    if host.contains("localhost") || host.contains("127.0.0.1") {
                        warn!("{name} points at a local address in production: {host}");
                    }
                }
            }
            "dev" | "development" => {}
            "test" | "testing" => {}
            _ => {}
        }
        Ok(())
    }
}

/// Typed view of the whole configuration tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub services: ServiceEndpoints,
    pub timeouts: StageTimeouts,
    pub retry: RetrySettings,
    pub results: ResultSettings,
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        self.services.metadata_url()?;
        self.services.search_url()?;
        for stage in StageKind::ALL {
            if self.timeouts.for_stage(stage).is_zero() {
                return Err(Error::InvalidConfig(format!("timeout for {stage} must be > 0")));
            }
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(Error::InvalidConfig(format!(
                "retry.base_delay_ms ({}) exceeds retry.max_delay_ms ({})",
                self.retry.base_delay_ms, self.retry.max_delay_ms
            )));
        }
        Ok(())
    }
}

/// Base URLs of the two external services. A path prefix is allowed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceEndpoints {
    pub metadata_host: String,
    pub search_host: String,
}

impl Default for ServiceEndpoints {
    fn default() -> Self {
        Self {
            metadata_host: "http://localhost:3113".to_string(),
            search_host: "http://localhost:5001".to_string(),
        }
    }
}

impl ServiceEndpoints {
    pub fn metadata_url(&self) -> Result<Url> { parse_host("services.metadata_host", &self.metadata_host) }

    pub fn search_url(&self) -> Result<Url> { parse_host("services.search_host", &self.search_host) }
}

fn parse_host(key: &str, raw: &str) -> Result<Url> {
    let url = Url::parse(raw).map_err(|e| Error::InvalidConfig(format!("{key} '{raw}': {e}")))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(Error::InvalidConfig(format!("{key} '{raw}': only http/https are supported")));
    }
    if url.cannot_be_a_base() {
        return Err(Error::InvalidConfig(format!("{key} '{raw}': not a base URL")));
    }
    Ok(url)
}

/// Per-stage request timeouts in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageTimeouts {
    pub metadata_ms: u64,
    pub search_ms: u64,
    pub rows_ms: u64,
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self { metadata_ms: 10_000, search_ms: 30_000, rows_ms: 30_000 }
    }
}

impl StageTimeouts {
    pub fn for_stage(&self, stage: StageKind) -> Duration {
        let ms = match stage {
            StageKind::Metadata => self.metadata_ms,
            StageKind::Search => self.search_ms,
            StageKind::Assembly => self.rows_ms,
        };
        Duration::from_millis(ms)
    }
}

/// Bounded exponential backoff for transient network failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self { max_retries: 2, base_delay_ms: 200, max_delay_ms: 2_000 }
    }
}

impl RetrySettings {
    pub fn base_delay(&self) -> Duration { Duration::from_millis(self.base_delay_ms) }

    pub fn max_delay(&self) -> Duration { Duration::from_millis(self.max_delay_ms) }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultSettings {
    pub sort_key: SortKey,
}
