// Page input as submitted by a form or API caller

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::PageId;

/// Flat `field path -> value` view consumed by the validation contract.
pub type FieldMap = BTreeMap<String, String>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationData {
    pub locale: Option<String>,
    pub permalink: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub keywords: Option<String>,
    pub content: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageData {
    pub parent_id: Option<PageId>,
    pub is_locked: Option<bool>,
    #[serde(default)]
    pub translation: BTreeMap<String, TranslationData>,
}

fn none_if_empty(value: &mut Option<String>) {
    if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
        *value = None;
    }
}

impl PageData {
    /// Empty strings are treated as absent values.
    pub fn normalized(mut self) -> Self {
        for translation in self.translation.values_mut() {
            none_if_empty(&mut translation.locale);
            none_if_empty(&mut translation.permalink);
            none_if_empty(&mut translation.title);
            none_if_empty(&mut translation.description);
            none_if_empty(&mut translation.keywords);
        }
        // A parent id of 0 is how forms say "no parent".
        if self.parent_id == Some(0) {
            self.parent_id = None;
        }
        self
    }

    pub fn fields(&self) -> FieldMap {
        let mut fields = FieldMap::new();
        for (locale, translation) in &self.translation {
            let mut put = |name: &str, value: &Option<String>| {
                if let Some(value) = value {
                    fields.insert(format!("translation.{}.{}", locale, name), value.clone());
                }
            };
            put("locale", &translation.locale);
            put("permalink", &translation.permalink);
            put("title", &translation.title);
            put("description", &translation.description);
            put("keywords", &translation.keywords);
        }
        fields
    }
}
