// Page and Translation - the aggregate cached and passed between layers.
// Tree position is not held here; it lives in the closure table.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{AppError, AppResult};

/// Page identity, assigned by the relational store on first persist.
pub type PageId = i64;

/// Longest permalink, title, description or keywords value accepted.
pub const MAX_FIELD_LENGTH: usize = 255;

/// Lower-case slugs separated by `/`.
pub static PERMALINK_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9-/]+$").expect("permalink pattern is valid"));

pub fn is_valid_permalink(permalink: &str) -> bool {
    permalink.len() <= MAX_FIELD_LENGTH && PERMALINK_PATTERN.is_match(permalink)
}

/// Locale-specific structured fields of a page. An absent row is
/// represented by an empty translation, never by an error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Translation {
    pub page_id: Option<PageId>,
    pub locale: String,
    pub permalink: String,
    pub title: String,
    pub description: Option<String>,
    pub keywords: Option<String>,
    /// Body text. Lives in the content store, so it is only populated
    /// after an explicit content load or when set for a write.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl Translation {
    pub fn empty(locale: impl Into<String>) -> Self {
        Self {
            locale: locale.into(),
            ..Default::default()
        }
    }

    pub fn has_permalink(&self) -> bool {
        !self.permalink.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub id: Option<PageId>,
    pub is_locked: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub translations: BTreeMap<String, Translation>,
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}

impl Page {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: None,
            is_locked: false,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            translations: BTreeMap::new(),
        }
    }

    pub fn require_id(&self) -> AppResult<PageId> {
        self.id
            .ok_or_else(|| AppError::NotFound("page has not been persisted yet".to_string()))
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn translation(&self, locale: &str) -> Option<&Translation> {
        self.translations.get(locale)
    }

    /// Mutable handle on a locale's translation, materialising an empty one
    /// when the locale has none yet.
    pub fn translate_mut(&mut self, locale: &str) -> &mut Translation {
        self.translations
            .entry(locale.to_string())
            .or_insert_with(|| Translation::empty(locale))
    }

    pub fn permalink(&self, locale: &str) -> Option<&str> {
        self.translation(locale)
            .filter(|t| t.has_permalink())
            .map(|t| t.permalink.as_str())
    }

    pub fn title(&self, locale: &str) -> Option<&str> {
        self.translation(locale).map(|t| t.title.as_str())
    }

    pub fn has_permalink(&self, permalink: &str, locale: &str) -> bool {
        self.permalink(locale) == Some(permalink)
    }
}

/// One breadcrumb element: an ancestor's permalink and title in a locale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Crumb {
    pub permalink: String,
    pub title: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permalink_pattern() {
        assert!(is_valid_permalink("about"));
        assert!(is_valid_permalink("about-us/team-2"));
        assert!(!is_valid_permalink("Invalid Permalink!"));
        assert!(!is_valid_permalink("../etc/passwd"));
        assert!(!is_valid_permalink(""));
        assert!(!is_valid_permalink(&"a".repeat(MAX_FIELD_LENGTH + 1)));
    }

    #[test]
    fn test_translate_mut_materializes_empty_translation() {
        let mut page = Page::new();
        assert!(page.translation("fr").is_none());

        page.translate_mut("fr").permalink = "a-propos".to_string();

        assert_eq!(page.translation("fr").unwrap().locale, "fr");
        assert!(page.has_permalink("a-propos", "fr"));
        assert!(!page.has_permalink("a-propos", "en"));
    }

    #[test]
    fn test_empty_permalink_is_absent() {
        let mut page = Page::new();
        page.translate_mut("en");
        assert_eq!(page.permalink("en"), None);
        assert!(page.require_id().is_err());
    }
}
