//! Shell-side execution of key-value effects.
//!
//! The core asks for storage through `crux_kv`; a shell answers each
//! `KeyValueOperation` with [`execute`]. Native shells persist through
//! [`SqliteStore`]; tests and web shells that keep state elsewhere can use
//! [`MemoryStore`].
use crux_kv::error::KeyValueError;
use crux_kv::value::Value;
use crux_kv::{KeyValueOperation, KeyValueResponse, KeyValueResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, warn};

use crate::capabilities::{KvError, KvKey};

#[derive(Debug, Error)]
pub enum StoreError {
    #[cfg(all(feature = "sqlite", not(target_arch = "wasm32")))]
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    InvalidKey(#[from] KvError),

    #[error("operation not supported: {0}")]
    Unsupported(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageErrorCode {
    Unknown,
    InvalidInput,
    Corrupted,
    DiskFull,
    PermissionDenied,
    Busy,
    Locked,
    IoError,
}

impl StorageErrorCode {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageErrorCode::Busy | StorageErrorCode::Locked)
    }
}

impl StoreError {
    pub fn code(&self) -> StorageErrorCode {
        match self {
            #[cfg(all(feature = "sqlite", not(target_arch = "wasm32")))]
            Self::Sqlite(rusqlite::Error::SqliteFailure(failure, _)) => {
                use rusqlite::ErrorCode;
                match failure.code {
                    ErrorCode::DatabaseBusy => StorageErrorCode::Busy,
                    ErrorCode::DatabaseLocked => StorageErrorCode::Locked,
                    ErrorCode::DiskFull => StorageErrorCode::DiskFull,
                    ErrorCode::PermissionDenied | ErrorCode::ReadOnly => {
                        StorageErrorCode::PermissionDenied
                    }
                    ErrorCode::DatabaseCorrupt | ErrorCode::NotADatabase => {
                        StorageErrorCode::Corrupted
                    }
                    ErrorCode::SystemIoFailure | ErrorCode::CannotOpen => StorageErrorCode::IoError,
                    _ => StorageErrorCode::Unknown,
                }
            }
            #[cfg(all(feature = "sqlite", not(target_arch = "wasm32")))]
            Self::Sqlite(_) => StorageErrorCode::Unknown,
            Self::InvalidKey(_) | Self::Unsupported(_) => StorageErrorCode::InvalidInput,
            Self::Unavailable(_) => StorageErrorCode::IoError,
        }
    }
}

impl From<StoreError> for KeyValueError {
    fn from(e: StoreError) -> Self {
        match e.code() {
            StorageErrorCode::InvalidInput => KeyValueError::Other {
                message: e.to_string(),
            },
            code => KeyValueError::Io {
                message: format!("{e} ({code:?})"),
            },
        }
    }
}

pub trait KeyValueStore {
    fn get(&self, key: &KvKey) -> Result<Option<Vec<u8>>, StoreError>;
    fn set(&mut self, key: &KvKey, value: &[u8]) -> Result<(), StoreError>;
    /// Returns whether the key existed.
    fn delete(&mut self, key: &KvKey) -> Result<bool, StoreError>;
}

/// Answers one `crux_kv` operation from `store`. The result goes back to the
/// core through the request it came with.
pub fn execute<S: KeyValueStore + ?Sized>(
    store: &mut S,
    operation: &KeyValueOperation,
) -> KeyValueResult {
    match run(store, operation) {
        Ok(response) => KeyValueResult::Ok { response },
        Err(e) => {
            let code = e.code();
            warn!(
                ?code,
                retryable = code.is_retryable(),
                error = %e,
                "kv operation failed"
            );
            KeyValueResult::Err { error: e.into() }
        }
    }
}

fn run<S: KeyValueStore + ?Sized>(
    store: &mut S,
    operation: &KeyValueOperation,
) -> Result<KeyValueResponse, StoreError> {
    match operation {
        KeyValueOperation::Get { key } => {
            let key = KvKey::new(key.as_str())?;
            let value = store.get(&key)?;
            debug!(%key, found = value.is_some(), "kv get");
            Ok(KeyValueResponse::Get {
                value: to_value(value),
            })
        }
        KeyValueOperation::Set { key, value } => {
            let key = KvKey::new(key.as_str())?;
            let previous = store.get(&key)?;
            store.set(&key, value)?;
            debug!(%key, bytes = value.len(), "kv set");
            Ok(KeyValueResponse::Set {
                previous: to_value(previous),
            })
        }
        KeyValueOperation::Delete { key } => {
            let key = KvKey::new(key.as_str())?;
            let previous = store.get(&key)?;
            let existed = store.delete(&key)?;
            debug!(%key, existed, "kv delete");
            Ok(KeyValueResponse::Delete {
                previous: to_value(previous),
            })
        }
        other => Err(StoreError::Unsupported(format!("{other:?}"))),
    }
}

fn to_value(bytes: Option<Vec<u8>>) -> Value {
    bytes.map_or(Value::None, Value::Bytes)
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: HashMap<KvKey, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &KvKey) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &KvKey, value: &[u8]) -> Result<(), StoreError> {
        self.entries.insert(key.clone(), value.to_vec());
        Ok(())
    }

    fn delete(&mut self, key: &KvKey) -> Result<bool, StoreError> {
        Ok(self.entries.remove(key).is_some())
    }
}

#[cfg(all(feature = "sqlite", not(target_arch = "wasm32")))]
pub use self::sqlite::SqliteStore;

#[cfg(all(feature = "sqlite", not(target_arch = "wasm32")))]
mod sqlite {
    use rusqlite::{params, Connection, OptionalExtension};
    use std::path::Path;

    use super::{KeyValueStore, StoreError};
    use crate::capabilities::KvKey;

    const SCHEMA: &str = "
        PRAGMA journal_mode = WAL;
        CREATE TABLE IF NOT EXISTS kv (
            key   TEXT PRIMARY KEY NOT NULL,
            value BLOB NOT NULL
        );
    ";

    /// One table of key/blob rows. Each write commits on its own.
    pub struct SqliteStore {
        conn: Connection,
    }

    impl SqliteStore {
        pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
            Self::init(Connection::open(path)?)
        }

        pub fn open_in_memory() -> Result<Self, StoreError> {
            Self::init(Connection::open_in_memory()?)
        }

        fn init(conn: Connection) -> Result<Self, StoreError> {
            conn.execute_batch(SCHEMA)?;
            Ok(Self { conn })
        }
    }

    impl KeyValueStore for SqliteStore {
        fn get(&self, key: &KvKey) -> Result<Option<Vec<u8>>, StoreError> {
            let value = self
                .conn
                .query_row(
                    "SELECT value FROM kv WHERE key = ?1",
                    params![key.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(value)
        }

        fn set(&mut self, key: &KvKey, value: &[u8]) -> Result<(), StoreError> {
            self.conn.execute(
                "INSERT INTO kv (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key.as_str(), value],
            )?;
            Ok(())
        }

        fn delete(&mut self, key: &KvKey) -> Result<bool, StoreError> {
            let removed = self
                .conn
                .execute("DELETE FROM kv WHERE key = ?1", params![key.as_str()])?;
            Ok(removed > 0)
        }
    }
}
