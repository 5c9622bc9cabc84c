use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::notion_client::API_BASE_URL;

#[derive(Error, Debug)]
pub enum AppConfigError {
    #[error("Config file not found at {0}. Run with --setup first.")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Unknown timezone \"{0}\"")]
    InvalidTimezone(String),
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Schedule {
    pub unit: String,
    /// Six fields, seconds first.
    pub cron: String,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct AppConfig {
    pub smtp_server: String,
    pub smtp_port: u16,
    pub username: String,
    /// Leave empty to read the password from the OS keyring.
    #[serde(default)]
    pub password: String,
    pub from_email: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_api_base")]
    pub notion_api_base: String,
    #[serde(default)]
    pub schedules: Vec<Schedule>,
}

fn default_timezone() -> String {
    "Asia/Tokyo".to_string()
}

fn default_api_base() -> String {
    API_BASE_URL.to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            smtp_server: "smtp.gmail.com".to_string(),
            smtp_port: 587,
            username: "your_email@gmail.com".to_string(),
            password: String::new(),
            from_email: "your_email@gmail.com".to_string(),
            timezone: default_timezone(),
            notion_api_base: default_api_base(),
            schedules: vec![Schedule {
                unit: "my-tasks".to_string(),
                cron: "0 0 8 * * *".to_string(),
            }],
        }
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, AppConfigError> {
        if !path.exists() {
            return Err(AppConfigError::NotFound(path.display().to_string()));
        }

        let content = fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        config.timezone()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), AppConfigError> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn timezone(&self) -> Result<Tz, AppConfigError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| AppConfigError::InvalidTimezone(self.timezone.clone()))
    }
}
