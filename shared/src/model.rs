use serde::{Deserialize, Serialize};
use std::fmt;

use crate::capabilities::StorageSlot;
use crate::config::GuideConfig;
use crate::contact::ContactState;
use crate::i18n::{LocaleDictionary, Translator};
use crate::location_memory::LocationMemory;
use crate::map::MapView;
use crate::ToastMessage;

#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum CoordinateError {
    #[error("coordinate is not a finite number")]
    NonFinite,
    #[error("latitude {0} out of range [-90, 90]")]
    LatitudeOutOfRange(f64),
    #[error("longitude {0} out of range [-180, 180]")]
    LongitudeOutOfRange(f64),
}

/// Validated lat/lon
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    pub fn new(lat: f64, lon: f64) -> Result<Self, CoordinateError> {
        if !lat.is_finite() || !lon.is_finite() {
            return Err(CoordinateError::NonFinite);
        }
        if !(-90.0..=90.0).contains(&lat) {
            return Err(CoordinateError::LatitudeOutOfRange(lat));
        }
        if !(-180.0..=180.0).contains(&lon) {
            return Err(CoordinateError::LongitudeOutOfRange(lon));
        }
        Ok(Self { lat, lon })
    }
}

/// A named point: a favorite, or the location currently focused on the map.
///
/// Serialized as `{"name", "lat", "lon"}`, the shape stored in the
/// `favorites` slot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

impl Place {
    pub fn new(name: impl Into<String>, lat: f64, lon: f64) -> Self {
        Self {
            name: name.into(),
            lat,
            lon,
        }
    }

    pub fn coordinate(&self) -> Result<LatLon, CoordinateError> {
        LatLon::new(self.lat, self.lon)
    }
}

impl fmt::Display for Place {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:.4}, {:.4})", self.name, self.lat, self.lon)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppState {
    #[default]
    Loading,
    Ready,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Hydration {
    pub language: bool,
    pub history: bool,
    pub favorites: bool,
    /// Slots changed before their stored value arrived. They are written
    /// once the stored value has been merged in.
    pub deferred: Vec<StorageSlot>,
}

impl Hydration {
    pub fn is_complete(&self) -> bool {
        self.language && self.history && self.favorites
    }

    pub fn is_loaded(&self, slot: StorageSlot) -> bool {
        match slot {
            StorageSlot::Language => self.language,
            StorageSlot::SearchHistory => self.history,
            StorageSlot::Favorites => self.favorites,
        }
    }

    pub fn mark_loaded(&mut self, slot: StorageSlot) {
        match slot {
            StorageSlot::Language => self.language = true,
            StorageSlot::SearchHistory => self.history = true,
            StorageSlot::Favorites => self.favorites = true,
        }
    }

    pub fn defer(&mut self, slot: StorageSlot) {
        if !self.deferred.contains(&slot) {
            self.deferred.push(slot);
        }
    }

    pub fn is_deferred(&self, slot: StorageSlot) -> bool {
        self.deferred.contains(&slot)
    }

    /// Clears the deferral, returning whether there was one.
    pub fn take_deferred(&mut self, slot: StorageSlot) -> bool {
        let before = self.deferred.len();
        self.deferred.retain(|s| *s != slot);
        self.deferred.len() != before
    }
}

#[derive(Debug, Clone)]
pub struct Model {
    pub state: AppState,
    pub hydration: Hydration,
    pub config: GuideConfig,

    pub translator: Translator,
    pub memory: LocationMemory,

    // Search page
    pub search_term: String,
    pub pending_searches: u32,

    pub contact: ContactState,

    pub active_toast: Option<ToastMessage>,
}

impl Default for Model {
    fn default() -> Self {
        Self::new(Translator::default())
    }
}

impl Model {
    pub fn new(translator: Translator) -> Self {
        Self {
            state: AppState::Loading,
            hydration: Hydration::default(),
            config: GuideConfig::default(),
            translator,
            memory: LocationMemory::default(),
            search_term: String::new(),
            pending_searches: 0,
            contact: ContactState::default(),
            active_toast: None,
        }
    }

    /// A model for an already validated config, starting in its default
    /// language.
    pub fn with_config(config: GuideConfig) -> Self {
        let translator = Translator::new(LocaleDictionary::bundled(), config.default_language);
        Self {
            config,
            ..Self::new(translator)
        }
    }

    pub fn show_toast(&mut self, toast: ToastMessage) {
        self.active_toast = Some(toast);
    }

    pub fn clear_toast(&mut self) {
        self.active_toast = None;
    }

    pub fn is_searching(&self) -> bool {
        self.pending_searches > 0
    }

    pub fn map_view(&self) -> MapView {
        MapView::from_selection(self.memory.selected()).focused(self.memory.focus())
    }
}
