//! Contact form: validation and the Telegram `sendMessage` notification.
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::capabilities::{response_parts, HttpError, HttpMethod, HttpRequest, HttpResult};
use crate::config::{ChatId, ConfigError, TelegramConfig};

pub const MIN_NAME_CHARS: usize = 2;
pub const MIN_MESSAGE_CHARS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContactField {
    Name,
    Surname,
    Email,
    Message,
}

/// A failed rule; `key` is a translation key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: ContactField,
    pub key: &'static str,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactForm {
    pub name: String,
    pub surname: String,
    pub email: String,
    pub message: String,
}

impl ContactForm {
    pub fn set(&mut self, field: ContactField, value: String) {
        match field {
            ContactField::Name => self.name = value,
            ContactField::Surname => self.surname = value,
            ContactField::Email => self.email = value,
            ContactField::Message => self.message = value,
        }
    }

    /// Every failed rule, in field order.
    pub fn validate(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();
        if self.name.chars().count() < MIN_NAME_CHARS {
            errors.push(FieldError {
                field: ContactField::Name,
                key: "name_too_short",
            });
        }
        if self.surname.chars().count() < MIN_NAME_CHARS {
            errors.push(FieldError {
                field: ContactField::Surname,
                key: "surname_too_short",
            });
        }
        if !is_valid_email(&self.email) {
            errors.push(FieldError {
                field: ContactField::Email,
                key: "invalid_email",
            });
        }
        if self.message.chars().count() < MIN_MESSAGE_CHARS {
            errors.push(FieldError {
                field: ContactField::Message,
                key: "message_too_short",
            });
        }
        errors
    }

    pub fn notification_text(&self) -> String {
        format!(
            "📝 New Contact Form Submission:\n👤 Name: {}\n👥 Surname: {}\n📧 Email: {}\n💬 Message: {}",
            self.name, self.surname, self.email, self.message
        )
        .trim()
        .to_string()
    }
}

fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.rsplit_once('@') else {
        return false;
    };

    let local_ok = !local.is_empty()
        && !local.starts_with('.')
        && !local.ends_with('.')
        && !local.contains("..")
        && local
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_'+-.".contains(c));
    if !local_ok {
        return false;
    }

    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return false;
    }
    let labels_ok = labels.iter().all(|label| {
        label.chars().next().is_some_and(|c| c.is_ascii_alphanumeric())
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    });
    let tld_ok = labels
        .last()
        .is_some_and(|tld| tld.len() >= 2 && tld.chars().all(|c| c.is_ascii_alphabetic()));
    labels_ok && tld_ok
}

#[derive(Debug, Error)]
pub enum ContactError {
    #[error("form has {} invalid field(s)", .0.len())]
    Invalid(Vec<FieldError>),

    #[error("contact webhook is not configured")]
    NotConfigured,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("cannot build webhook request: {0}")]
    Request(#[from] HttpError),

    #[error("webhook request failed: {0}")]
    Transport(String),

    #[error("webhook rejected the message with status {0}")]
    Rejected(u16),
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a ChatId,
    text: String,
}

/// JSON POST to `{api_base}/bot{token}/sendMessage` carrying the form text.
pub fn build_request(
    config: Option<&TelegramConfig>,
    form: &ContactForm,
) -> Result<HttpRequest, ContactError> {
    let errors = form.validate();
    if !errors.is_empty() {
        return Err(ContactError::Invalid(errors));
    }
    let config = config.ok_or(ContactError::NotConfigured)?;
    let url = config.send_message_url()?;
    let payload = SendMessage {
        chat_id: &config.chat_id,
        text: form.notification_text(),
    };
    HttpRequest::new(HttpMethod::Post, url)
        .with_json(&payload)
        .map_err(ContactError::from)
}

pub fn interpret_response(result: HttpResult) -> Result<(), ContactError> {
    let response = result.map_err(|e| ContactError::Transport(e.to_string()))?;
    let (status, _) = response_parts(&response);
    interpret_status(status)
}

/// Any 2xx is delivery; the body is not inspected.
pub fn interpret_status(status: u16) -> Result<(), ContactError> {
    if !(200..300).contains(&status) {
        return Err(ContactError::Rejected(status));
    }
    Ok(())
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContactState {
    pub form: ContactForm,
    pub errors: Vec<FieldError>,
    pub submitting: bool,
    /// Set after a successful send; the shell opens it once and clears it.
    pub follow_up_url: Option<String>,
}

impl ContactState {
    pub fn error_for(&self, field: ContactField) -> Option<&'static str> {
        self.errors.iter().find(|e| e.field == field).map(|e| e.key)
    }

    pub fn reset(&mut self) {
        self.form = ContactForm::default();
        self.errors.clear();
    }
}
