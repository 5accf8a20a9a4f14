use serde::{Deserialize, Serialize};

use crate::capabilities::{HttpResult, KvResult, StorageSlot};
use crate::contact::ContactField;
use crate::map::MarkerId;

// --- Event enum: user intents plus capability results, large variants boxed ---
// Capability results never cross the FFI boundary, so they skip serde.

#[derive(Serialize, Deserialize, Debug)]
pub enum Event {
    // Lifecycle
    /// Shell configuration as JSON, parsed into a `GuideConfig`.
    Configure {
        json: String,
    },
    AppStarted,
    #[serde(skip)]
    LanguageLoaded(KvResult),
    #[serde(skip)]
    HistoryLoaded(KvResult),
    #[serde(skip)]
    FavoritesLoaded(KvResult),
    LanguageSelected {
        code: String,
    },

    // Search
    SearchTermChanged {
        term: String,
    },
    SearchRequested,
    HistoryEntrySelected {
        name: String,
    },
    #[serde(skip)]
    GeocodeResponse {
        query: String,
        result: Box<HttpResult>,
    },

    // Favorites & map
    AddFavorite {
        name: String,
        lat: f64,
        lon: f64,
    },
    RemoveFavorite {
        name: String,
    },
    FavoriteSelected {
        name: String,
    },
    /// "Add to favorites" pressed in a marker popup.
    MapFavoriteRequested {
        marker_id: MarkerId,
    },

    // Contact
    ContactFieldChanged {
        field: ContactField,
        value: String,
    },
    ContactSubmitted,
    #[serde(skip)]
    ContactResponse(Box<HttpResult>),
    FollowUpOpened,

    // Persistence & UI
    #[serde(skip)]
    Persisted {
        slot: StorageSlot,
        result: KvResult,
    },
    ToastDismissed,
}

impl Event {
    /// Variant name for log fields; never includes payload data.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Configure { .. } => "Configure",
            Self::AppStarted => "AppStarted",
            Self::LanguageLoaded(_) => "LanguageLoaded",
            Self::HistoryLoaded(_) => "HistoryLoaded",
            Self::FavoritesLoaded(_) => "FavoritesLoaded",
            Self::LanguageSelected { .. } => "LanguageSelected",
            Self::SearchTermChanged { .. } => "SearchTermChanged",
            Self::SearchRequested => "SearchRequested",
            Self::HistoryEntrySelected { .. } => "HistoryEntrySelected",
            Self::GeocodeResponse { .. } => "GeocodeResponse",
            Self::AddFavorite { .. } => "AddFavorite",
            Self::RemoveFavorite { .. } => "RemoveFavorite",
            Self::FavoriteSelected { .. } => "FavoriteSelected",
            Self::MapFavoriteRequested { .. } => "MapFavoriteRequested",
            Self::ContactFieldChanged { .. } => "ContactFieldChanged",
            Self::ContactSubmitted => "ContactSubmitted",
            Self::ContactResponse(_) => "ContactResponse",
            Self::FollowUpOpened => "FollowUpOpened",
            Self::Persisted { .. } => "Persisted",
            Self::ToastDismissed => "ToastDismissed",
        }
    }

    pub fn is_capability_result(&self) -> bool {
        matches!(
            self,
            Self::LanguageLoaded(_)
                | Self::HistoryLoaded(_)
                | Self::FavoritesLoaded(_)
                | Self::GeocodeResponse { .. }
                | Self::ContactResponse(_)
                | Self::Persisted { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_size_is_reasonable() {
        let size = std::mem::size_of::<Event>();
        assert!(
            size <= 128,
            "Event enum is {} bytes, box more variants",
            size
        );
    }

    #[test]
    fn name_omits_payload() {
        let event = Event::ContactFieldChanged {
            field: ContactField::Email,
            value: "private@example.com".into(),
        };
        assert_eq!(event.name(), "ContactFieldChanged");

        let event = Event::Configure {
            json: r#"{"contact": {"bot_token": "1:secret"}}"#.into(),
        };
        assert_eq!(event.name(), "Configure");
    }

    #[test]
    fn capability_results_are_flagged() {
        assert!(Event::HistoryLoaded(Ok(None)).is_capability_result());
        assert!(Event::Persisted {
            slot: StorageSlot::Favorites,
            result: Ok(None),
        }
        .is_capability_result());
        assert!(!Event::SearchRequested.is_capability_result());
    }

    #[test]
    fn events_serialize_for_the_shell() {
        let event = Event::MapFavoriteRequested {
            marker_id: MarkerId::PointOfInterest(1),
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert!(matches!(
            back,
            Event::MapFavoriteRequested {
                marker_id: MarkerId::PointOfInterest(1)
            }
        ));
    }
}
