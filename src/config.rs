use std::{
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
};

use chrono_tz::Tz;
use log::warn;
use serde::{Deserialize, Serialize};

use crate::utils;

const DEFAULT_TIMEZONE: &str = "America/Sao_Paulo";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    #[default]
    Fixture,
    Eventbrite,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    pub source: SourceKind,
    pub eventbrite_token: Option<String>,
    pub eventbrite_organization_id: Option<String>,
    pub display_timezone: String,
    pub share_command: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            source: SourceKind::default(),
            eventbrite_token: None,
            eventbrite_organization_id: None,
            display_timezone: DEFAULT_TIMEZONE.to_string(),
            share_command: None,
        }
    }
}

impl AppConfig {
    /// Overlays values from the process environment.
    pub fn apply_env(self) -> Self {
        self.apply_vars(|name| std::env::var(name).ok())
    }

    pub(crate) fn apply_vars<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(source) = lookup("EVENT_FINDER_SOURCE") {
            match source.trim().to_lowercase().as_str() {
                "fixture" | "mock" => self.source = SourceKind::Fixture,
                "eventbrite" => self.source = SourceKind::Eventbrite,
                other => warn!("ignoring unknown EVENT_FINDER_SOURCE: {other}"),
            }
        }
        if let Some(token) = lookup("EVENTBRITE_TOKEN") {
            self.eventbrite_token = Some(token.trim().to_string());
        }
        if let Some(org) = lookup("EVENTBRITE_ORG_ID") {
            self.eventbrite_organization_id = Some(org.trim().to_string());
        }
        if let Some(tz) = lookup("EVENT_FINDER_TZ") {
            self.display_timezone = tz.trim().to_string();
        }
        if let Some(command) = lookup("EVENT_FINDER_SHARE_COMMAND") {
            self.share_command = Some(command.trim().to_string());
        }
        self
    }

    pub fn timezone(&self) -> Tz {
        match self.display_timezone.parse::<Tz>() {
            Ok(tz) => tz,
            Err(err) => {
                warn!("invalid display timezone {:?}: {err}", self.display_timezone);
                Tz::UTC
            }
        }
    }
}

pub struct ConfigStore {
    path: PathBuf,
    data: Mutex<AppConfig>,
}

impl ConfigStore {
    pub fn load() -> Self {
        Self::load_from(utils::config_path())
    }

    pub fn load_from(path: PathBuf) -> Self {
        let data = match read_config(&path) {
            Ok(config) => config,
            Err(err) => {
                warn!("config at {:?} unreadable, using defaults: {err}", path);
                AppConfig::default()
            }
        };
        Self {
            path,
            data: Mutex::new(data.apply_env()),
        }
    }

    pub fn read(&self) -> AppConfig {
        match self.data.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn update<F>(&self, transform: F) -> Result<AppConfig, String>
    where
        F: FnOnce(&mut AppConfig),
    {
        let mut guard = self
            .data
            .lock()
            .map_err(|_| "config mutex poisoned".to_string())?;
        let mut next = guard.clone();
        transform(&mut next);
        write_config(&self.path, &next)?;
        *guard = next;
        Ok(guard.clone())
    }

    pub fn set_credentials(&self, token: &str, organization_id: &str) -> Result<AppConfig, String> {
        let token = token.trim();
        let organization_id = organization_id.trim();
        if token.is_empty() || organization_id.is_empty() {
            return Err("Eventbrite token and organization ID are required".into());
        }
        self.update(|config| {
            config.eventbrite_token = Some(token.to_string());
            config.eventbrite_organization_id = Some(organization_id.to_string());
        })
    }
}

fn read_config(path: &Path) -> Result<AppConfig, String> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let contents = fs::read_to_string(path).map_err(|err| err.to_string())?;
    serde_json::from_str(&contents).map_err(|err| err.to_string())
}

fn write_config(path: &Path, config: &AppConfig) -> Result<(), String> {
    utils::ensure_parent(path);
    let contents = serde_json::to_string_pretty(config).map_err(|err| err.to_string())?;
    fs::write(path, contents).map_err(|err| err.to_string())
}
