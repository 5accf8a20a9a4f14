//! Translation resolver.
//!
//! Lookups never fail: a key missing from the active language (or mapped to
//! an empty string) resolves to the key itself, so an untranslated label
//! degrades to its symbolic name instead of breaking the page.
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};
use thiserror::Error;
use tracing::{debug, error};

const EN_SOURCE: &str = include_str!("../locales/en.json");
const RU_SOURCE: &str = include_str!("../locales/ru.json");
const TJ_SOURCE: &str = include_str!("../locales/tj.json");

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Ru,
    Tj,
}

impl Language {
    pub const ALL: [Language; 3] = [Language::En, Language::Ru, Language::Tj];

    pub const fn code(self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Ru => "ru",
            Self::Tj => "tj",
        }
    }

    pub const fn native_name(self) -> &'static str {
        match self {
            Self::En => "English",
            Self::Ru => "Русский",
            Self::Tj => "Тоҷикӣ",
        }
    }

    /// Exact match on the closed code set; no trimming or case folding.
    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|lang| lang.code() == code)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Language {
    type Err = I18nError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_code(s).ok_or_else(|| I18nError::UnsupportedLanguage(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum I18nError {
    #[error("unsupported language code '{0}'")]
    UnsupportedLanguage(String),

    #[error("invalid dictionary for '{language}': {message}")]
    InvalidDictionary { language: Language, message: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocaleDictionary {
    tables: HashMap<Language, HashMap<String, String>>,
}

impl LocaleDictionary {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parses one flat `{"key": "text"}` JSON object per language.
    pub fn from_json_sources(sources: &[(Language, &str)]) -> Result<Self, I18nError> {
        let mut tables = HashMap::with_capacity(sources.len());
        for (language, source) in sources {
            let table: HashMap<String, String> =
                serde_json::from_str(source).map_err(|e| I18nError::InvalidDictionary {
                    language: *language,
                    message: e.to_string(),
                })?;
            tables.insert(*language, table);
        }
        Ok(Self { tables })
    }

    /// The dictionaries compiled into the binary, parsed once per process.
    pub fn bundled() -> Arc<LocaleDictionary> {
        static BUNDLED: OnceLock<Arc<LocaleDictionary>> = OnceLock::new();
        BUNDLED
            .get_or_init(|| {
                let sources = [
                    (Language::En, EN_SOURCE),
                    (Language::Ru, RU_SOURCE),
                    (Language::Tj, TJ_SOURCE),
                ];
                let dictionary = Self::from_json_sources(&sources).unwrap_or_else(|e| {
                    error!(error = %e, "bundled locale data is invalid, falling back to keys");
                    Self::empty()
                });
                Arc::new(dictionary)
            })
            .clone()
    }

    pub fn lookup(&self, language: Language, key: &str) -> Option<&str> {
        self.tables
            .get(&language)
            .and_then(|table| table.get(key))
            .map(String::as_str)
            .filter(|text| !text.is_empty())
    }

    pub fn len(&self, language: Language) -> usize {
        self.tables.get(&language).map_or(0, HashMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.tables.values().all(HashMap::is_empty)
    }

    /// Keys some other language defines that `language` lacks, sorted.
    pub fn missing_keys(&self, language: Language) -> Vec<&str> {
        let own = self.tables.get(&language);
        let missing: BTreeSet<&str> = self
            .tables
            .iter()
            .filter(|(lang, _)| **lang != language)
            .flat_map(|(_, table)| table.keys())
            .filter(|key| !own.is_some_and(|table| table.contains_key(*key)))
            .map(String::as_str)
            .collect();
        missing.into_iter().collect()
    }
}

/// Explicit i18n context: the dictionary plus the active language.
#[derive(Clone)]
pub struct Translator {
    dictionary: Arc<LocaleDictionary>,
    active: Language,
}

impl Default for Translator {
    fn default() -> Self {
        Self::new(LocaleDictionary::bundled(), Language::default())
    }
}

impl fmt::Debug for Translator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Translator")
            .field("active", &self.active)
            .field("keys", &self.dictionary.len(self.active))
            .finish()
    }
}

impl Translator {
    pub fn new(dictionary: Arc<LocaleDictionary>, active: Language) -> Self {
        Self { dictionary, active }
    }

    pub fn resolve<'a>(&'a self, key: &'a str) -> &'a str {
        self.resolve_in(self.active, key)
    }

    pub fn resolve_in<'a>(&'a self, language: Language, key: &'a str) -> &'a str {
        self.dictionary.lookup(language, key).unwrap_or(key)
    }

    pub fn active_language(&self) -> Language {
        self.active
    }

    /// Returns `false` and leaves the selection alone for unsupported codes.
    pub fn set_active_language(&mut self, code: &str) -> bool {
        match Language::from_code(code) {
            Some(language) => {
                self.active = language;
                true
            }
            None => {
                debug!(code, "ignoring unsupported language code");
                false
            }
        }
    }

    pub fn dictionary(&self) -> &LocaleDictionary {
        &self.dictionary
    }
}
