use crux_kv::error::KeyValueError;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use thiserror::Error;

use super::AppKv;
use crate::event::Event;

pub const MAX_KEY_LENGTH: usize = 512;
pub const MAX_VALUE_SIZE: usize = 5 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KvKey(String);

impl KvKey {
    pub fn new(key: impl Into<String>) -> Result<Self, KvError> {
        let key = key.into();
        Self::validate_key(&key)?;
        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    fn validate_key(key: &str) -> Result<(), KvError> {
        if key.is_empty() {
            return Err(KvError::InvalidKey {
                key: key.to_string(),
                reason: "key cannot be empty".to_string(),
            });
        }

        if key.len() > MAX_KEY_LENGTH {
            return Err(KvError::InvalidKey {
                key: key.chars().take(50).collect::<String>() + "...",
                reason: format!("key exceeds maximum length of {} bytes", MAX_KEY_LENGTH),
            });
        }

        if key.trim().is_empty() {
            return Err(KvError::InvalidKey {
                key: key.to_string(),
                reason: "key cannot be only whitespace".to_string(),
            });
        }

        if key.chars().any(|c| c.is_control()) {
            return Err(KvError::InvalidKey {
                key: key.replace('\0', "\\0"),
                reason: "key contains control characters".to_string(),
            });
        }

        Ok(())
    }
}

impl fmt::Display for KvKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The named slots the core persists. Each is rewritten wholesale on change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StorageSlot {
    SearchHistory,
    Favorites,
    Language,
}

impl StorageSlot {
    pub const ALL: [StorageSlot; 3] = [Self::Language, Self::SearchHistory, Self::Favorites];

    pub const fn name(self) -> &'static str {
        match self {
            Self::SearchHistory => "searchHistory",
            Self::Favorites => "favorites",
            Self::Language => "language",
        }
    }

    pub fn key(self) -> KvKey {
        // slot names are static and always pass validation
        KvKey(self.name().to_string())
    }

    pub fn read<F>(self, kv: &AppKv, make_event: F)
    where
        F: FnOnce(KvResult) -> Event + Send + Sync + 'static,
    {
        kv.get(self.key().into_string(), make_event);
    }

    /// Replaces the slot's value. Oversized values never reach the shell.
    pub fn write<F>(self, kv: &AppKv, value: Vec<u8>, make_event: F) -> Result<(), KvError>
    where
        F: FnOnce(KvResult) -> Event + Send + Sync + 'static,
    {
        check_value_size(&value)?;
        kv.set(self.key().into_string(), value, make_event);
        Ok(())
    }
}

pub fn check_value_size(value: &[u8]) -> Result<(), KvError> {
    if value.len() > MAX_VALUE_SIZE {
        return Err(KvError::ValueTooLarge {
            size: value.len(),
            max: MAX_VALUE_SIZE,
        });
    }
    Ok(())
}

/// What a read hands back: the stored bytes, if any. Writes carry the value
/// they replaced.
pub type KvResult = Result<Option<Vec<u8>>, KeyValueError>;

#[derive(Debug, Error)]
pub enum KvError {
    #[error("invalid key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("value too large: {size} bytes exceeds maximum of {max} bytes")]
    ValueTooLarge { size: usize, max: usize },

    #[error("storage error: {0}")]
    Storage(#[from] KeyValueError),

    #[error("serialization error: {message}")]
    Serialization { message: String, key: Option<String> },
}

/// JSON view over one slot.
pub struct TypedSlot<T> {
    slot: StorageSlot,
    _phantom: PhantomData<T>,
}

impl<T: Serialize + DeserializeOwned> TypedSlot<T> {
    pub fn new(slot: StorageSlot) -> Self {
        Self {
            slot,
            _phantom: PhantomData,
        }
    }

    pub fn slot(&self) -> StorageSlot {
        self.slot
    }

    pub fn encode(&self, value: &T) -> Result<Vec<u8>, KvError> {
        let data = serde_json::to_vec(value).map_err(|e| KvError::Serialization {
            message: e.to_string(),
            key: Some(self.slot.name().to_string()),
        })?;
        check_value_size(&data)?;
        Ok(data)
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<T, KvError> {
        serde_json::from_slice(bytes).map_err(|e| KvError::Serialization {
            message: e.to_string(),
            key: Some(self.slot.name().to_string()),
        })
    }

    pub fn parse_value(&self, result: KvResult) -> Result<Option<T>, KvError> {
        match result? {
            Some(bytes) => self.decode(&bytes).map(Some),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_validation_empty() {
        let result = KvKey::new("");
        assert!(matches!(result, Err(KvError::InvalidKey { .. })));
    }

    #[test]
    fn test_key_validation_whitespace() {
        assert!(KvKey::new("   ").is_err());
    }

    #[test]
    fn test_key_validation_null_byte() {
        assert!(KvKey::new("key\0value").is_err());
    }

    #[test]
    fn test_key_validation_too_long() {
        let long_key = "a".repeat(MAX_KEY_LENGTH + 1);
        assert!(KvKey::new(long_key).is_err());
    }

    #[test]
    fn test_slot_keys_are_valid() {
        for slot in StorageSlot::ALL {
            assert_eq!(KvKey::new(slot.name()).unwrap(), slot.key());
        }
    }

    #[test]
    fn test_slot_names() {
        assert_eq!(StorageSlot::SearchHistory.name(), "searchHistory");
        assert_eq!(StorageSlot::Favorites.name(), "favorites");
        assert_eq!(StorageSlot::Language.name(), "language");
    }

    #[test]
    fn test_value_size_limit() {
        let large = vec![0u8; MAX_VALUE_SIZE + 1];
        assert!(matches!(
            check_value_size(&large),
            Err(KvError::ValueTooLarge { .. })
        ));
        assert!(check_value_size(b"[]").is_ok());
    }

    #[test]
    fn test_typed_slot() {
        let slot: TypedSlot<Vec<String>> = TypedSlot::new(StorageSlot::SearchHistory);
        let value = slot.encode(&vec!["Dushanbe".to_string()]).unwrap();
        assert_eq!(value, br#"["Dushanbe"]"#.to_vec());

        let parsed = slot.parse_value(Ok(Some(value))).unwrap();
        assert_eq!(parsed, Some(vec!["Dushanbe".to_string()]));
        assert_eq!(slot.parse_value(Ok(None)).unwrap(), None);
    }

    #[test]
    fn test_typed_slot_rejects_garbage() {
        let slot: TypedSlot<Vec<String>> = TypedSlot::new(StorageSlot::SearchHistory);
        let result = slot.parse_value(Ok(Some(b"{not json".to_vec())));
        assert!(matches!(result, Err(KvError::Serialization { .. })));

        let failed = slot.parse_value(Err(KeyValueError::Io {
            message: "disk".into(),
        }));
        assert!(matches!(failed, Err(KvError::Storage(_))));
    }
}
