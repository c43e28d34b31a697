// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use orderdesk_app::{DEFAULT_SCREEN_HEIGHT, DEFAULT_SCREEN_WIDTH};
use orderdesk_engine::PricingPolicy;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

pub const APP_NAME: &str = "orderdesk";
const CONFIG_VERSION: i64 = 1;
const DEFAULT_BASE_URL: &str = "http://localhost:8000/api";
const DEFAULT_ORIGIN: &str = "http://localhost:8000";
const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub version: i64,
    #[serde(default)]
    pub backend: Backend,
    #[serde(default)]
    pub session: Session,
    #[serde(default)]
    pub popup: Popup,
    #[serde(default)]
    pub pricing: Pricing,
    #[serde(default)]
    pub output: Output,
    #[serde(default)]
    pub logging: Logging,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            backend: Backend::default(),
            session: Session::default(),
            popup: Popup::default(),
            pricing: Pricing::default(),
            output: Output::default(),
            logging: Logging::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Backend {
    pub base_url: Option<String>,
}

impl Default for Backend {
    fn default() -> Self {
        Self {
            base_url: Some(DEFAULT_BASE_URL.to_owned()),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Session {
    /// Unset keeps the draft in memory for the life of the process.
    pub db_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Popup {
    pub origin: Option<String>,
    pub screen_width: Option<u32>,
    pub screen_height: Option<u32>,
}

impl Default for Popup {
    fn default() -> Self {
        Self {
            origin: Some(DEFAULT_ORIGIN.to_owned()),
            screen_width: Some(DEFAULT_SCREEN_WIDTH),
            screen_height: Some(DEFAULT_SCREEN_HEIGHT),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Pricing {
    pub stale_responses: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Output {
    pub document_dir: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Logging {
    pub level: Option<String>,
    pub json: Option<bool>,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: Some(DEFAULT_LOG_LEVEL.to_owned()),
            json: Some(false),
        }
    }
}

impl Config {
    pub fn default_path() -> Result<PathBuf> {
        if let Some(path) = env::var_os("ORDERDESK_CONFIG_PATH") {
            return Ok(PathBuf::from(path));
        }

        let config_root = dirs::config_dir().ok_or_else(|| {
            anyhow!("cannot resolve config directory; set ORDERDESK_CONFIG_PATH to the config file")
        })?;
        Ok(config_root.join(APP_NAME).join("config.toml"))
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("read config file {}", path.display()))?;
        let value: toml::Value = toml::from_str(&raw)
            .with_context(|| format!("parse TOML config {}", path.display()))?;

        let version = value
            .get("version")
            .and_then(toml::Value::as_integer)
            .ok_or_else(|| {
                anyhow!(
                    "config file {} has no version. Add `version = 1` at the top and keep settings under [backend], [session], [popup], [pricing], [output], and [logging]",
                    path.display()
                )
            })?;

        if version != CONFIG_VERSION {
            bail!(
                "unsupported config version {} in {}; expected version = 1",
                version,
                path.display()
            );
        }

        let config: Config = value
            .try_into()
            .with_context(|| format!("decode config {}", path.display()))?;
        config.validate(path)?;
        Ok(config)
    }

    fn validate(&self, path: &Path) -> Result<()> {
        if let Some(base_url) = &self.backend.base_url
            && base_url.trim().is_empty()
        {
            bail!(
                "backend.base_url in {} is empty; set it to the API root, for example {DEFAULT_BASE_URL}",
                path.display()
            );
        }

        if let Some(db_path) = &self.session.db_path {
            orderdesk_db::validate_db_path(db_path)?;
        }

        if let Some(origin) = &self.popup.origin {
            Url::parse(origin).with_context(|| {
                format!(
                    "popup.origin {origin:?} in {} is not a URL; use the order page origin, for example {DEFAULT_ORIGIN}",
                    path.display()
                )
            })?;
        }

        for (name, value) in [
            ("popup.screen_width", self.popup.screen_width),
            ("popup.screen_height", self.popup.screen_height),
        ] {
            if value == Some(0) {
                bail!("{name} in {} must be positive", path.display());
            }
        }

        self.pricing_policy()
            .with_context(|| format!("pricing.stale_responses in {}", path.display()))?;
        Ok(())
    }

    pub fn base_url(&self) -> &str {
        self.backend
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
    }

    pub fn db_path(&self) -> Option<PathBuf> {
        self.session.db_path.as_ref().map(PathBuf::from)
    }

    pub fn popup_origin(&self) -> &str {
        self.popup.origin.as_deref().unwrap_or(DEFAULT_ORIGIN)
    }

    pub fn screen_size(&self) -> (u32, u32) {
        (
            self.popup.screen_width.unwrap_or(DEFAULT_SCREEN_WIDTH),
            self.popup.screen_height.unwrap_or(DEFAULT_SCREEN_HEIGHT),
        )
    }

    pub fn pricing_policy(&self) -> Result<PricingPolicy> {
        match &self.pricing.stale_responses {
            Some(raw) => PricingPolicy::parse(raw),
            None => Ok(PricingPolicy::default()),
        }
    }

    pub fn document_dir(&self) -> PathBuf {
        self.output
            .document_dir
            .as_ref()
            .map_or_else(|| PathBuf::from("."), PathBuf::from)
    }

    pub fn log_level(&self) -> &str {
        self.logging.level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL)
    }

    pub fn log_json(&self) -> bool {
        self.logging.json.unwrap_or(false)
    }

    pub fn example_config(path: &Path) -> String {
        format!(
            "# orderdesk config\n# Place this file at: {}\n\nversion = 1\n\n[backend]\nbase_url = \"{}\"\n\n[session]\n# Optional. Unset keeps the draft in memory until the shell exits.\n# When set, the file mirrors the live draft and is cleared on the next start.\n# db_path = \"/absolute/path/to/orderdesk-session.db\"\n\n[popup]\norigin = \"{}\"\nscreen_width = {}\nscreen_height = {}\n\n[pricing]\n# \"commit\" writes late price replies as they arrive; \"revalidate\" re-requests the current key.\nstale_responses = \"commit\"\n\n[output]\ndocument_dir = \".\"\n\n[logging]\nlevel = \"{}\"\njson = false\n",
            path.display(),
            DEFAULT_BASE_URL,
            DEFAULT_ORIGIN,
            DEFAULT_SCREEN_WIDTH,
            DEFAULT_SCREEN_HEIGHT,
            DEFAULT_LOG_LEVEL,
        )
    }
}
