//! Shared core of the Tajikistan travel guide.
//!
//! A Crux app: `update` mutates the [`Model`] and asks the render, HTTP and
//! key-value capabilities for effects. Shells drive it through [`Core`],
//! execute the effects and send the results back as events.

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod capabilities;
pub mod config;
pub mod contact;
pub mod durable_store;
pub mod event;
pub mod geocode;
pub mod i18n;
pub mod location_memory;
pub mod map;
pub mod model;

use serde::Serialize;
use std::collections::HashMap;

pub use app::App;
pub use capabilities::{Capabilities, Effect};
pub use config::GuideConfig;
pub use event::Event;
pub use i18n::{Language, Translator};
pub use location_memory::HISTORY_CAPACITY;
pub use model::{Model, Place};

pub type Core = crux_core::Core<Effect, App>;

use crate::capabilities::{HttpError, KvError};
use crate::config::ConfigError;
use crate::contact::{ContactError, ContactField, ContactForm};
use crate::geocode::GeocodeError;
use crate::i18n::I18nError;
use crate::map::{MapView, TileLayer};
use crux_kv::error::KeyValueError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorSeverity {
    Transient,
    Permanent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Network,
    Upstream,
    Storage,
    Serialization,
    UnsupportedLanguage,
    Configuration,
    Internal,
}

impl ErrorKind {
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Validation => "VALIDATION_ERROR",
            Self::NotFound => "NOT_FOUND",
            Self::Network => "NETWORK_ERROR",
            Self::Upstream => "UPSTREAM_ERROR",
            Self::Storage => "STORAGE_ERROR",
            Self::Serialization => "SERIALIZATION_ERROR",
            Self::UnsupportedLanguage => "UNSUPPORTED_LANGUAGE",
            Self::Configuration => "CONFIGURATION_ERROR",
            Self::Internal => "INTERNAL_ERROR",
        }
    }

    #[must_use]
    pub const fn default_severity(self) -> ErrorSeverity {
        match self {
            Self::Network | Self::Upstream | Self::Storage => ErrorSeverity::Transient,
            Self::Validation
            | Self::NotFound
            | Self::Serialization
            | Self::UnsupportedLanguage
            | Self::Configuration
            | Self::Internal => ErrorSeverity::Permanent,
        }
    }

    /// Whether resubmitting the same input by hand may succeed. The core
    /// itself never retries.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self.default_severity(), ErrorSeverity::Transient)
    }
}

/// An error on its way to the user: a machine kind plus the translation key
/// of the notification text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppError {
    pub kind: ErrorKind,
    pub severity: ErrorSeverity,
    pub message: String,
    pub message_key: &'static str,
    pub context: HashMap<String, String>,
}

impl AppError {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>, message_key: &'static str) -> Self {
        Self {
            kind,
            severity: kind.default_severity(),
            message: message.into(),
            message_key,
            context: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.kind.code()
    }

    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    // Raised before anything is sent.
    fn from_request(error: &HttpError, message_key: &'static str) -> Self {
        let kind = match error {
            HttpError::InvalidUrl { .. } | HttpError::PrivateNetworkBlocked { .. } => {
                ErrorKind::Configuration
            }
            _ => ErrorKind::Internal,
        };
        Self::new(kind, error.to_string(), message_key)
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code(), self.message)
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

impl From<GeocodeError> for AppError {
    fn from(e: GeocodeError) -> Self {
        let key = e.message_key();
        match &e {
            GeocodeError::EmptyQuery => Self::new(ErrorKind::Validation, e.to_string(), key),
            GeocodeError::NotFound => Self::new(ErrorKind::NotFound, e.to_string(), key),
            GeocodeError::Request(http) => Self::from_request(http, key),
            GeocodeError::Transport(_) => Self::new(ErrorKind::Network, e.to_string(), key),
            GeocodeError::Status(status) => Self::new(ErrorKind::Upstream, e.to_string(), key)
                .with_context("http_status", status.to_string()),
            GeocodeError::Malformed(_) | GeocodeError::InvalidCoordinates(_) => {
                Self::new(ErrorKind::Serialization, e.to_string(), key)
            }
        }
    }
}

impl From<ContactError> for AppError {
    fn from(e: ContactError) -> Self {
        const KEY: &str = "message_send_error";
        match &e {
            ContactError::Invalid(_) => Self::new(ErrorKind::Validation, e.to_string(), KEY),
            ContactError::NotConfigured | ContactError::Config(_) => {
                Self::new(ErrorKind::Configuration, e.to_string(), KEY)
            }
            ContactError::Request(http) => Self::from_request(http, KEY),
            ContactError::Transport(_) => Self::new(ErrorKind::Network, e.to_string(), KEY),
            ContactError::Rejected(status) => Self::new(ErrorKind::Upstream, e.to_string(), KEY)
                .with_context("http_status", status.to_string()),
        }
    }
}

impl From<KvError> for AppError {
    fn from(e: KvError) -> Self {
        let kind = match &e {
            KvError::Serialization { .. } => ErrorKind::Serialization,
            KvError::InvalidKey { .. } | KvError::ValueTooLarge { .. } => ErrorKind::Internal,
            KvError::Storage(_) => ErrorKind::Storage,
        };
        Self::new(kind, e.to_string(), "error")
    }
}

impl From<KeyValueError> for AppError {
    fn from(e: KeyValueError) -> Self {
        KvError::from(e).into()
    }
}

impl From<I18nError> for AppError {
    fn from(e: I18nError) -> Self {
        Self::new(ErrorKind::UnsupportedLanguage, e.to_string(), "error")
    }
}

impl From<ConfigError> for AppError {
    fn from(e: ConfigError) -> Self {
        Self::new(ErrorKind::Configuration, e.to_string(), "error")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ToastKind {
    #[default]
    Info,
    Error,
}

impl ToastKind {
    #[must_use]
    pub const fn default_duration_ms(self) -> u64 {
        match self {
            Self::Info => 3000,
            Self::Error => 5000,
        }
    }
}

/// Toast body: either another translation key or text shown as-is (a place
/// name, for instance).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ToastDetail {
    Key(&'static str),
    Verbatim(String),
}

/// A transient notification, stored untranslated so a language switch
/// re-renders it in the new language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToastMessage {
    pub kind: ToastKind,
    pub title_key: &'static str,
    pub detail: Option<ToastDetail>,
    pub duration_ms: u64,
}

impl ToastMessage {
    #[must_use]
    pub fn new(kind: ToastKind, title_key: &'static str, detail: Option<ToastDetail>) -> Self {
        Self {
            kind,
            title_key,
            detail,
            duration_ms: kind.default_duration_ms(),
        }
    }

    #[must_use]
    pub fn info(title_key: &'static str, detail: ToastDetail) -> Self {
        Self::new(ToastKind::Info, title_key, Some(detail))
    }

    #[must_use]
    pub fn from_error(error: &AppError) -> Self {
        Self::new(
            ToastKind::Error,
            "error",
            Some(ToastDetail::Key(error.message_key)),
        )
    }
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct ToastView {
    pub title: String,
    pub description: Option<String>,
    pub kind: ToastKind,
    pub duration_ms: u64,
}

impl ToastView {
    fn new(toast: &ToastMessage, translator: &Translator) -> Self {
        Self {
            title: translator.resolve(toast.title_key).to_string(),
            description: toast.detail.as_ref().map(|detail| match detail {
                ToastDetail::Key(key) => translator.resolve(key).to_string(),
                ToastDetail::Verbatim(text) => text.clone(),
            }),
            kind: toast.kind,
            duration_ms: toast.duration_ms,
        }
    }
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct LanguageOption {
    pub code: &'static str,
    pub native_name: &'static str,
    pub active: bool,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct SearchView {
    pub title: String,
    pub placeholder: String,
    pub button_label: String,
    pub term: String,
    pub is_searching: bool,
    pub history_title: String,
    pub history: Vec<String>,
    /// Present only while the history is empty.
    pub history_empty_text: Option<String>,
    pub favorites_title: String,
    pub favorites: Vec<Place>,
    pub favorites_empty_text: Option<String>,
    pub selected: Option<Place>,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct FieldErrorView {
    pub field: ContactField,
    pub message: String,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct ContactView {
    pub form: ContactForm,
    pub errors: Vec<FieldErrorView>,
    pub submitting: bool,
    pub submit_label: String,
    pub follow_up_url: Option<String>,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct ViewModel {
    pub is_loading: bool,
    pub language: Language,
    pub languages: Vec<LanguageOption>,
    pub search: SearchView,
    pub map: MapView,
    pub tiles: TileLayer,
    pub contact: ContactView,
    pub toast: Option<ToastView>,
}

pub mod app {
    use super::*;
    use crate::capabilities::{KvResult, StorageSlot};
    use crate::geocode::GeocodeQuery;
    use crate::map::OSM_TILES;
    use crate::model::{AppState, Hydration};
    use tracing::{debug, error, info, warn};

    type HttpResultBox = Box<crate::capabilities::HttpResult>;

    #[derive(Debug, Default)]
    pub struct App;

    impl App {
        /// Writes `slot` from the model, or defers the write until the
        /// stored value has been read and merged.
        fn persist(slot: StorageSlot, model: &mut Model, caps: &Capabilities) {
            if !model.hydration.is_loaded(slot) {
                debug!(slot = slot.name(), "slot not loaded yet, deferring write");
                model.hydration.defer(slot);
                return;
            }

            let value = match slot {
                StorageSlot::SearchHistory => model.memory.history_write(),
                StorageSlot::Favorites => model.memory.favorites_write(),
                // bare code, not JSON
                StorageSlot::Language => {
                    Ok(model.translator.active_language().code().as_bytes().to_vec())
                }
            };
            let queued = value.and_then(|bytes| {
                slot.write(&caps.key_value, bytes, move |result| Event::Persisted {
                    slot,
                    result,
                })
            });
            if let Err(e) = queued {
                error!(slot = slot.name(), error = %e, "cannot encode slot");
            }
        }

        fn slot_loaded(slot: StorageSlot, model: &mut Model, caps: &Capabilities) {
            model.hydration.mark_loaded(slot);
            if model.hydration.take_deferred(slot) {
                Self::persist(slot, model, caps);
            }
            Self::finish_hydration_step(model);
        }

        fn restore_language(result: KvResult, model: &mut Model) {
            if model.hydration.is_deferred(StorageSlot::Language) {
                debug!("language chosen during startup, ignoring the stored one");
                return;
            }
            match result {
                Ok(Some(bytes)) => match std::str::from_utf8(&bytes) {
                    Ok(code) if model.translator.set_active_language(code) => {
                        debug!(code, "restored language");
                    }
                    Ok(code) => debug!(code, "stored language not supported, keeping default"),
                    Err(_) => warn!("stored language is not UTF-8"),
                },
                Ok(None) => {}
                Err(e) => warn!(error = %e, "failed to read language"),
            }
        }

        fn configure(json: &str, model: &mut Model) {
            let config = match GuideConfig::from_json(json) {
                Ok(config) => config,
                Err(e) => {
                    let error = AppError::from(e);
                    error!(code = error.code(), error = %error, "configuration rejected");
                    return;
                }
            };
            // a stored or chosen language outranks the default
            let language_settled = model.hydration.language
                || model.hydration.is_deferred(StorageSlot::Language);
            if !language_settled {
                model
                    .translator
                    .set_active_language(config.default_language.code());
            }
            info!(
                default_language = %config.default_language,
                contact = config.contact.is_some(),
                "configured"
            );
            model.config = config;
        }

        fn finish_hydration_step(model: &mut Model) {
            if model.state == AppState::Loading && model.hydration.is_complete() {
                model.state = AppState::Ready;
                info!(
                    language = %model.translator.active_language(),
                    history = model.memory.history().len(),
                    favorites = model.memory.favorites().len(),
                    "hydrated"
                );
            }
        }

        fn report(error: AppError, model: &mut Model) {
            model.show_toast(ToastMessage::from_error(&error));
        }

        fn start_geocode(raw: &str, model: &mut Model, caps: &Capabilities) {
            let query = match GeocodeQuery::new(raw) {
                Ok(query) => query,
                Err(e) => {
                    debug!("empty search rejected");
                    Self::report(e.into(), model);
                    return;
                }
            };

            let request = match crate::geocode::build_request(&model.config.geocoder, &query) {
                Ok(request) => request,
                Err(e) => {
                    error!(error = %e, "cannot build geocode request");
                    Self::report(GeocodeError::from(e).into(), model);
                    return;
                }
            };

            model.pending_searches += 1;
            debug!(
                request_id = request.request_id(),
                in_flight = model.pending_searches,
                "geocoding"
            );
            let query = query.as_str().to_string();
            request.send(&caps.http, move |result| Event::GeocodeResponse {
                query,
                result: Box::new(result),
            });
        }

        fn handle_geocode_response(
            query: &str,
            result: HttpResultBox,
            model: &mut Model,
            caps: &Capabilities,
        ) {
            model.pending_searches = model.pending_searches.saturating_sub(1);
            match crate::geocode::interpret_response(*result) {
                Ok(place) => {
                    info!(query, name = %place.name, "location found");
                    model.memory.record_search(&place.name);
                    model.memory.select(place);
                    Self::persist(StorageSlot::SearchHistory, model, caps);
                }
                Err(e) => {
                    let app_error = AppError::from(e);
                    warn!(query, code = app_error.code(), error = %app_error, "geocode failed");
                    Self::report(app_error, model);
                }
            }
        }

        fn add_favorite(place: Place, model: &mut Model, caps: &Capabilities) {
            if let Err(e) = place.coordinate() {
                warn!(name = %place.name, error = %e, "refusing favorite with invalid coordinates");
                return;
            }
            let name = place.name.clone();
            if !model.memory.add_favorite(place) {
                debug!(name = %name, "already a favorite");
                return;
            }
            Self::persist(StorageSlot::Favorites, model, caps);
            model.show_toast(ToastMessage::info(
                "added_to_favorites",
                ToastDetail::Verbatim(name),
            ));
        }

        fn remove_favorite(name: String, model: &mut Model, caps: &Capabilities) {
            let existed = model.memory.remove_favorite(&name);
            debug!(name = %name, existed, "removing favorite");
            Self::persist(StorageSlot::Favorites, model, caps);
            model.show_toast(ToastMessage::info(
                "removed_from_favorites",
                ToastDetail::Verbatim(name),
            ));
        }

        fn submit_contact(model: &mut Model, caps: &Capabilities) {
            if model.contact.submitting {
                debug!("contact submission already in flight");
                return;
            }

            let errors = model.contact.form.validate();
            if !errors.is_empty() {
                debug!(count = errors.len(), "contact form invalid");
                model.contact.errors = errors;
                return;
            }
            model.contact.errors.clear();

            match crate::contact::build_request(model.config.contact.as_ref(), &model.contact.form)
            {
                Ok(request) => {
                    model.contact.submitting = true;
                    debug!(request_id = request.request_id(), "sending contact message");
                    request.send(&caps.http, |result| Event::ContactResponse(Box::new(result)));
                }
                Err(e) => {
                    let app_error = AppError::from(e);
                    error!(code = app_error.code(), error = %app_error, "contact message not sent");
                    Self::report(app_error, model);
                }
            }
        }

        fn handle_contact_response(result: HttpResultBox, model: &mut Model) {
            model.contact.submitting = false;
            match crate::contact::interpret_response(*result) {
                Ok(()) => {
                    info!("contact message delivered");
                    model.contact.reset();
                    model.contact.follow_up_url = model
                        .config
                        .contact
                        .as_ref()
                        .and_then(|c| c.follow_up_url.clone());
                    model.show_toast(ToastMessage::info(
                        "message_sent",
                        ToastDetail::Key("message_sent_description"),
                    ));
                }
                Err(e) => {
                    let app_error = AppError::from(e);
                    error!(code = app_error.code(), error = %app_error, "contact message failed");
                    Self::report(app_error, model);
                }
            }
        }
    }

    impl crux_core::App for App {
        type Event = Event;
        type Model = Model;
        type ViewModel = ViewModel;
        type Capabilities = Capabilities;

        fn update(&self, event: Event, model: &mut Model, caps: &Capabilities) {
            debug!(event = event.name(), "update");

            match event {
                Event::Configure { json } => {
                    Self::configure(&json, model);
                }

                Event::AppStarted => {
                    model.state = AppState::Loading;
                    model.hydration = Hydration::default();
                    let kv = &caps.key_value;
                    StorageSlot::Language.read(kv, Event::LanguageLoaded);
                    StorageSlot::SearchHistory.read(kv, Event::HistoryLoaded);
                    StorageSlot::Favorites.read(kv, Event::FavoritesLoaded);
                }

                Event::LanguageLoaded(result) => {
                    Self::restore_language(result, model);
                    Self::slot_loaded(StorageSlot::Language, model, caps);
                }

                Event::HistoryLoaded(result) => {
                    model.memory.restore_history(result);
                    Self::slot_loaded(StorageSlot::SearchHistory, model, caps);
                }

                Event::FavoritesLoaded(result) => {
                    model.memory.restore_favorites(result);
                    Self::slot_loaded(StorageSlot::Favorites, model, caps);
                }

                Event::LanguageSelected { code } => {
                    if model.translator.set_active_language(&code) {
                        info!(code = %code, "language changed");
                        Self::persist(StorageSlot::Language, model, caps);
                    } else {
                        let error = AppError::from(I18nError::UnsupportedLanguage(code));
                        debug!(error = %error, "language selection ignored");
                        return;
                    }
                }

                Event::SearchTermChanged { term } => {
                    model.search_term = term;
                }

                Event::SearchRequested => {
                    let raw = model.search_term.clone();
                    Self::start_geocode(&raw, model, caps);
                }

                Event::HistoryEntrySelected { name } => {
                    model.search_term = name.clone();
                    Self::start_geocode(&name, model, caps);
                }

                Event::GeocodeResponse { query, result } => {
                    Self::handle_geocode_response(&query, result, model, caps);
                }

                Event::AddFavorite { name, lat, lon } => {
                    Self::add_favorite(Place::new(name, lat, lon), model, caps);
                }

                Event::RemoveFavorite { name } => {
                    Self::remove_favorite(name, model, caps);
                }

                Event::FavoriteSelected { name } => {
                    match model.memory.favorites().get(&name).cloned() {
                        Some(place) => model.memory.select(place),
                        None => {
                            debug!(name = %name, "selected favorite no longer exists");
                            return;
                        }
                    }
                }

                Event::MapFavoriteRequested { marker_id } => {
                    let view = model.map_view();
                    match view.marker(marker_id) {
                        Some(marker) => Self::add_favorite(marker.place.clone(), model, caps),
                        None => {
                            warn!(%marker_id, "favorite requested for a marker not on the map");
                            return;
                        }
                    }
                }

                Event::ContactFieldChanged { field, value } => {
                    model.contact.form.set(field, value);
                    // re-validate only once the user has seen errors
                    if !model.contact.errors.is_empty() {
                        model.contact.errors = model.contact.form.validate();
                    }
                }

                Event::ContactSubmitted => Self::submit_contact(model, caps),

                Event::ContactResponse(result) => Self::handle_contact_response(result, model),

                Event::FollowUpOpened => {
                    model.contact.follow_up_url = None;
                }

                Event::Persisted { slot, result } => {
                    match result {
                        Ok(_) => debug!(slot = slot.name(), "slot written"),
                        Err(e) => {
                            let error = AppError::from(e);
                            error!(
                                slot = slot.name(),
                                code = error.code(),
                                error = %error,
                                "failed to persist slot"
                            );
                        }
                    }
                    return;
                }

                Event::ToastDismissed => model.clear_toast(),
            }

            caps.render.render();
        }

        fn view(&self, model: &Model) -> ViewModel {
            let t = &model.translator;
            let text = |key: &str| t.resolve(key).to_string();

            let history: Vec<String> = model.memory.history().entries().to_vec();
            let favorites: Vec<Place> = model.memory.favorites().iter().cloned().collect();

            let search = SearchView {
                title: text("address_search"),
                placeholder: text("enter_address_placeholder"),
                button_label: text("search"),
                term: model.search_term.clone(),
                is_searching: model.is_searching(),
                history_title: text("search_history"),
                history_empty_text: history.is_empty().then(|| text("no_history")),
                history,
                favorites_title: text("favorites"),
                favorites_empty_text: favorites.is_empty().then(|| text("no_favorites")),
                favorites,
                selected: model.memory.selected().cloned(),
            };

            let contact = ContactView {
                form: model.contact.form.clone(),
                errors: model
                    .contact
                    .errors
                    .iter()
                    .map(|e| FieldErrorView {
                        field: e.field,
                        message: text(e.key),
                    })
                    .collect(),
                submitting: model.contact.submitting,
                submit_label: text(if model.contact.submitting {
                    "sending"
                } else {
                    "send_message"
                }),
                follow_up_url: model.contact.follow_up_url.clone(),
            };

            let active = t.active_language();
            ViewModel {
                is_loading: model.state == AppState::Loading,
                language: active,
                languages: Language::ALL
                    .into_iter()
                    .map(|lang| LanguageOption {
                        code: lang.code(),
                        native_name: lang.native_name(),
                        active: lang == active,
                    })
                    .collect(),
                search,
                map: model.map_view(),
                tiles: OSM_TILES,
                contact,
                toast: model.active_toast.as_ref().map(|toast| ToastView::new(toast, t)),
            }
        }
    }
}
