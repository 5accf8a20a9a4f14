//! Shell-supplied configuration for the core.
//!
//! Every section has working defaults, so `GuideConfig::default()` talks to the
//! public Nominatim instance and leaves the contact webhook unconfigured.
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::capabilities::{HttpError, ValidatedUrl};
use crate::i18n::Language;

pub const NOMINATIM_ENDPOINT: &str = "https://nominatim.openstreetmap.org/search";
pub const DEFAULT_USER_AGENT: &str = concat!("tajik-guide/", env!("CARGO_PKG_VERSION"));
pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";
pub const DEFAULT_FOLLOW_UP_URL: &str = "https://t.me/TJKGuideBot";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config parse error: {0}")]
    Parse(String),

    #[error("invalid URL in '{field}': {reason}")]
    InvalidUrl { field: &'static str, reason: String },

    #[error("invalid value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GuideConfig {
    pub geocoder: GeocoderConfig,
    pub default_language: Language,
    pub contact: Option<TelegramConfig>,
}

impl GuideConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_contact(mut self, contact: TelegramConfig) -> Self {
        self.contact = Some(contact);
        self
    }

    pub fn with_default_language(mut self, language: Language) -> Self {
        self.default_language = language;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.geocoder.validate()?;
        if let Some(contact) = &self.contact {
            contact.validate()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeocoderConfig {
    pub endpoint: String,
    /// Nominatim's usage policy requires an identifying agent.
    pub user_agent: String,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            endpoint: NOMINATIM_ENDPOINT.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl GeocoderConfig {
    pub fn endpoint_url(&self) -> Result<ValidatedUrl, HttpError> {
        ValidatedUrl::new(self.endpoint.as_str())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.endpoint_url().map_err(|e| ConfigError::InvalidUrl {
            field: "geocoder.endpoint",
            reason: e.to_string(),
        })?;
        if self.user_agent.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "geocoder.user_agent",
                reason: "must not be empty".into(),
            });
        }
        Ok(())
    }
}

/// Telegram accepts numeric chat ids and `@channel` usernames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatId {
    Id(i64),
    Username(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: SecretString,
    pub chat_id: ChatId,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Opened by the shell after a successful submission.
    #[serde(default = "default_follow_up_url")]
    pub follow_up_url: Option<String>,
}

fn default_api_base() -> String {
    TELEGRAM_API_BASE.to_string()
}

fn default_follow_up_url() -> Option<String> {
    Some(DEFAULT_FOLLOW_UP_URL.to_string())
}

impl TelegramConfig {
    pub fn new(bot_token: impl Into<String>, chat_id: ChatId) -> Self {
        Self {
            bot_token: SecretString::new(bot_token.into()),
            chat_id,
            api_base: default_api_base(),
            follow_up_url: default_follow_up_url(),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn without_follow_up(mut self) -> Self {
        self.follow_up_url = None;
        self
    }

    /// `{api_base}/bot{token}/sendMessage`. The result carries the token, so
    /// errors from here never echo the URL.
    pub fn send_message_url(&self) -> Result<ValidatedUrl, ConfigError> {
        let url = format!(
            "{}/bot{}/sendMessage",
            self.api_base.trim_end_matches('/'),
            self.bot_token.expose_secret()
        );
        ValidatedUrl::new(url).map_err(|_| ConfigError::InvalidUrl {
            field: "contact.api_base",
            reason: "cannot build the sendMessage URL".into(),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let token = self.bot_token.expose_secret();
        if token.is_empty() {
            return Err(ConfigError::Invalid {
                field: "contact.bot_token",
                reason: "must not be empty".into(),
            });
        }
        if !token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == ':' || c == '_' || c == '-')
        {
            return Err(ConfigError::Invalid {
                field: "contact.bot_token",
                reason: "contains characters not allowed in a bot token".into(),
            });
        }
        if matches!(&self.chat_id, ChatId::Username(name) if !name.starts_with('@')) {
            return Err(ConfigError::Invalid {
                field: "contact.chat_id",
                reason: "usernames must start with '@'".into(),
            });
        }
        ValidatedUrl::new(self.api_base.as_str()).map_err(|e| ConfigError::InvalidUrl {
            field: "contact.api_base",
            reason: e.to_string(),
        })?;
        if let Some(url) = &self.follow_up_url {
            ValidatedUrl::new(url.as_str()).map_err(|e| ConfigError::InvalidUrl {
                field: "contact.follow_up_url",
                reason: e.to_string(),
            })?;
        }
        self.send_message_url().map(|_| ())
    }
}
