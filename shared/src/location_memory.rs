//! Search history, favorites and the currently selected location.
//!
//! Both collections are persisted as whole JSON arrays in their own storage
//! slot; every mutation rewrites the slot. Stored data read back at startup
//! is merged with anything recorded in the meantime.
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::warn;

use crate::capabilities::{KvError, KvResult, StorageSlot, TypedSlot};
use crate::model::Place;

pub const HISTORY_CAPACITY: usize = 5;

/// Most-recent-first list of distinct place names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SearchHistory(Vec<String>);

impl SearchHistory {
    /// Builds a history from stored entries, dropping repeats and overflow.
    pub fn from_entries(entries: impl IntoIterator<Item = String>) -> Self {
        let mut seen = HashSet::new();
        let entries = entries
            .into_iter()
            .filter(|entry| seen.insert(entry.clone()))
            .take(HISTORY_CAPACITY)
            .collect();
        Self(entries)
    }

    /// Moves `name` to the front, evicting the oldest entry past capacity.
    pub fn record(&mut self, name: &str) {
        self.0.retain(|entry| entry != name);
        self.0.insert(0, name.to_string());
        self.0.truncate(HISTORY_CAPACITY);
    }

    pub fn entries(&self) -> &[String] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Saved places, unique by name, in the order they were added.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Favorites(Vec<Place>);

impl Favorites {
    /// First record wins when stored data repeats a name.
    pub fn from_entries(entries: impl IntoIterator<Item = Place>) -> Self {
        let mut favorites = Self::default();
        for place in entries {
            favorites.add(place);
        }
        favorites
    }

    /// Appends `place` unless a favorite with the same name already exists.
    pub fn add(&mut self, place: Place) -> bool {
        if self.contains(&place.name) {
            return false;
        }
        self.0.push(place);
        true
    }

    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.0.len();
        self.0.retain(|place| place.name != name);
        self.0.len() != before
    }

    pub fn get(&self, name: &str) -> Option<&Place> {
        self.0.iter().find(|place| place.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Place> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocationMemory {
    history: SearchHistory,
    favorites: Favorites,
    selected: Option<Place>,
    focus: u32,
}

impl LocationMemory {
    pub fn history(&self) -> &SearchHistory {
        &self.history
    }

    pub fn favorites(&self) -> &Favorites {
        &self.favorites
    }

    pub fn selected(&self) -> Option<&Place> {
        self.selected.as_ref()
    }

    pub fn record_search(&mut self, name: &str) {
        self.history.record(name);
    }

    pub fn add_favorite(&mut self, place: Place) -> bool {
        self.favorites.add(place)
    }

    pub fn remove_favorite(&mut self, name: &str) -> bool {
        self.favorites.remove(name)
    }

    /// Focuses `place`, even when it is already the selection.
    pub fn select(&mut self, place: Place) {
        self.selected = Some(place);
        self.focus = self.focus.wrapping_add(1);
    }

    /// Number of selections so far; the map recenters whenever it changes.
    pub fn focus(&self) -> u32 {
        self.focus
    }

    pub fn history_write(&self) -> Result<Vec<u8>, KvError> {
        history_slot().encode(&self.history.0)
    }

    pub fn favorites_write(&self) -> Result<Vec<u8>, KvError> {
        favorites_slot().encode(&self.favorites.0)
    }

    /// Merges the stored history behind searches made since startup.
    /// Missing, unreadable or corrupt data keeps the in-memory history.
    pub fn restore_history(&mut self, result: KvResult) {
        let slot = history_slot();
        if let Some(stored) = read_slot(&slot, result) {
            let recent = std::mem::take(&mut self.history.0);
            self.history = SearchHistory::from_entries(recent.into_iter().chain(stored));
        }
    }

    /// Stored favorites come first, then ones added since startup. A name
    /// already stored keeps its stored coordinates.
    pub fn restore_favorites(&mut self, result: KvResult) {
        let slot = favorites_slot();
        if let Some(stored) = read_slot(&slot, result) {
            let added = std::mem::take(&mut self.favorites.0);
            self.favorites = Favorites::from_entries(stored.into_iter().chain(added));
        }
    }
}

fn history_slot() -> TypedSlot<Vec<String>> {
    TypedSlot::new(StorageSlot::SearchHistory)
}

fn favorites_slot() -> TypedSlot<Vec<Place>> {
    TypedSlot::new(StorageSlot::Favorites)
}

fn read_slot<T>(slot: &TypedSlot<T>, result: KvResult) -> Option<T>
where
    T: Serialize + serde::de::DeserializeOwned,
{
    match slot.parse_value(result) {
        Ok(value) => value,
        Err(KvError::Storage(e)) => {
            warn!(slot = slot.slot().name(), error = %e, "failed to read slot");
            None
        }
        Err(e) => {
            warn!(slot = slot.slot().name(), error = %e, "discarding unreadable slot data");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crux_kv::error::KeyValueError;

    fn names(history: &SearchHistory) -> Vec<&str> {
        history.iter().collect()
    }

    #[test]
    fn record_moves_to_front() {
        let mut history = SearchHistory::default();
        for name in ["A", "B", "C"] {
            history.record(name);
        }
        assert_eq!(names(&history), ["C", "B", "A"]);

        history.record("A");
        assert_eq!(names(&history), ["A", "C", "B"]);
    }

    #[test]
    fn record_evicts_oldest() {
        let mut history = SearchHistory::default();
        for name in ["A", "B", "C", "D", "E", "F"] {
            history.record(name);
        }
        assert_eq!(names(&history), ["F", "E", "D", "C", "B"]);
    }

    #[test]
    fn stored_history_is_normalised() {
        let history = SearchHistory::from_entries(
            ["A", "B", "A", "C", "D", "E", "F", "G"].map(String::from),
        );
        assert_eq!(names(&history), ["A", "B", "C", "D", "E"]);
    }

    #[test]
    fn favorite_first_write_wins() {
        let mut favorites = Favorites::default();
        assert!(favorites.add(Place::new("Dushanbe", 38.5598, 68.787)));
        assert!(!favorites.add(Place::new("Dushanbe", 0.0, 0.0)));
        assert_eq!(favorites.len(), 1);
        assert_eq!(favorites.get("Dushanbe").unwrap().lat, 38.5598);
    }

    #[test]
    fn favorite_remove_absent_is_noop() {
        let mut favorites = Favorites::from_entries([Place::new("Khujand", 40.2837, 69.6219)]);
        assert!(!favorites.remove("Dushanbe"));
        assert_eq!(favorites.len(), 1);
        assert!(favorites.remove("Khujand"));
        assert!(favorites.is_empty());
    }

    #[test]
    fn history_write_encodes_json_array() {
        let mut memory = LocationMemory::default();
        memory.record_search("Khujand");
        memory.record_search("Dushanbe");
        let value = memory.history_write().unwrap();
        assert_eq!(value, br#"["Dushanbe","Khujand"]"#.to_vec());
    }

    #[test]
    fn restore_round_trips_favorites() {
        let mut memory = LocationMemory::default();
        memory.add_favorite(Place::new("Pamir Mountains", 38.6772, 72.8696));
        let value = memory.favorites_write().unwrap();

        let mut restored = LocationMemory::default();
        restored.restore_favorites(Ok(Some(value)));
        assert_eq!(restored.favorites(), memory.favorites());
    }

    #[test]
    fn restore_merges_with_entries_made_before_it() {
        let mut memory = LocationMemory::default();
        memory.record_search("B");
        memory.add_favorite(Place::new("Hisor", 38.5263, 68.5514));
        memory.add_favorite(Place::new("Khujand", 0.0, 0.0));

        memory.restore_history(Ok(Some(br#"["A","B","C"]"#.to_vec())));
        assert_eq!(names(memory.history()), ["B", "A", "C"]);

        let stored = br#"[{"name":"Khujand","lat":40.2837,"lon":69.6219}]"#.to_vec();
        memory.restore_favorites(Ok(Some(stored)));
        let favorites: Vec<_> = memory.favorites().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(favorites, ["Khujand", "Hisor"]);
        assert_eq!(memory.favorites().get("Khujand").unwrap().lat, 40.2837);
    }

    #[test]
    fn selecting_bumps_focus() {
        let mut memory = LocationMemory::default();
        let place = Place::new("Kulob", 37.9146, 69.7845);
        memory.select(place.clone());
        memory.select(place);
        assert_eq!(memory.focus(), 2);
    }

    #[test]
    fn restore_tolerates_bad_data() {
        let mut memory = LocationMemory::default();
        memory.restore_history(Ok(Some(b"{oops".to_vec())));
        assert!(memory.history().is_empty());

        memory.restore_favorites(Err(KeyValueError::Io {
            message: "disk".into(),
        }));
        assert!(memory.favorites().is_empty());

        memory.record_search("Vahdat");
        memory.restore_history(Ok(None));
        assert_eq!(names(memory.history()), ["Vahdat"]);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn place_name() -> impl Strategy<Value = String> {
            "[a-e]{1,2}"
        }

        proptest! {
            #[test]
            fn history_stays_bounded_and_unique(searches in prop::collection::vec(place_name(), 0..40)) {
                let mut history = SearchHistory::default();
                for name in &searches {
                    history.record(name);
                    prop_assert_eq!(history.entries().first(), Some(name));
                }
                prop_assert!(history.len() <= HISTORY_CAPACITY);
                let unique: HashSet<_> = history.iter().collect();
                prop_assert_eq!(unique.len(), history.len());
            }

            #[test]
            fn history_keeps_most_recent_distinct(searches in prop::collection::vec(place_name(), 1..40)) {
                let mut history = SearchHistory::default();
                for name in &searches {
                    history.record(name);
                }
                let mut expected: Vec<&str> = Vec::new();
                for name in searches.iter().rev() {
                    if !expected.contains(&name.as_str()) {
                        expected.push(name);
                    }
                }
                expected.truncate(HISTORY_CAPACITY);
                prop_assert_eq!(names(&history), expected);
            }

            #[test]
            fn favorites_unique_by_name(ops in prop::collection::vec((any::<bool>(), place_name()), 0..60)) {
                let mut favorites = Favorites::default();
                for (add, name) in &ops {
                    if *add {
                        favorites.add(Place::new(name.clone(), 1.0, 2.0));
                    } else {
                        favorites.remove(name);
                        prop_assert!(!favorites.contains(name));
                    }
                }
                let unique: HashSet<_> = favorites.iter().map(|p| p.name.as_str()).collect();
                prop_assert_eq!(unique.len(), favorites.len());
            }
        }
    }
}
