// Validation - rule generation for page input and the built-in rule validator

use async_trait::async_trait;
use regex::Regex;
use std::collections::BTreeMap;

use crate::error::{AppResult, FieldError, FieldErrors};
use crate::infrastructure::database::Database;
use crate::infrastructure::traits::Validator;
use crate::infrastructure::translation_store::TranslationStore;
use crate::models::page::{MAX_FIELD_LENGTH, PERMALINK_PATTERN};
use crate::models::page_data::FieldMap;
use crate::models::PageId;

#[derive(Debug, Clone)]
pub enum Rule {
    Required,
    Max(usize),
    Matches(Regex),
    /// Permalink not used by another live page in `locale`.
    UniquePermalink {
        locale: String,
        ignore: Option<PageId>,
    },
}

/// Rules per field path, evaluated in path order.
pub type RuleSet = BTreeMap<String, Vec<Rule>>;

/// Rules for page input: for every supported locale, `permalink`, `title`
/// and `locale` under `translation.{locale}`. `ignore` is the page being
/// updated, whose own permalinks do not count as taken.
pub fn page_rules(locales: &[String], ignore: Option<PageId>) -> RuleSet {
    let mut rules = RuleSet::new();
    for locale in locales {
        rules.insert(
            format!("translation.{}.permalink", locale),
            vec![
                Rule::Required,
                Rule::Max(MAX_FIELD_LENGTH),
                Rule::UniquePermalink {
                    locale: locale.clone(),
                    ignore,
                },
                Rule::Matches(PERMALINK_PATTERN.clone()),
            ],
        );
        rules.insert(
            format!("translation.{}.title", locale),
            vec![Rule::Required, Rule::Max(MAX_FIELD_LENGTH)],
        );
        rules.insert(format!("translation.{}.locale", locale), vec![Rule::Required]);
    }
    rules
}

/// Evaluates a [`RuleSet`] against field values, checking uniqueness
/// against the translation table.
#[derive(Debug, Clone)]
pub struct RuleValidator {
    db: Database,
    translations: TranslationStore,
}

impl RuleValidator {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            translations: TranslationStore::new(),
        }
    }
}

#[async_trait]
impl Validator for RuleValidator {
    async fn validate(&self, data: &FieldMap, rules: &RuleSet) -> AppResult<FieldErrors> {
        let mut errors = FieldErrors::default();

        for (field, field_rules) in rules {
            let value = data.get(field).map(String::as_str);

            for rule in field_rules {
                // Only `required` applies to a missing value.
                let failure = match (rule, value) {
                    (Rule::Required, None) => Some("This field is required.".to_string()),
                    (_, None) => None,
                    (Rule::Required, Some(_)) => None,
                    (Rule::Max(max), Some(v)) if v.chars().count() > *max => {
                        Some(format!("This field may not be greater than {} characters.", max))
                    }
                    (Rule::Max(_), Some(_)) => None,
                    (Rule::Matches(pattern), Some(v)) if !pattern.is_match(v) => {
                        Some("This field format is invalid.".to_string())
                    }
                    (Rule::Matches(_), Some(_)) => None,
                    (Rule::UniquePermalink { locale, ignore }, Some(v)) => {
                        let mut conn = self.db.acquire().await?;
                        if self
                            .translations
                            .permalink_taken(&mut conn, locale, v, *ignore)
                            .await?
                        {
                            Some("This permalink has already been taken.".to_string())
                        } else {
                            None
                        }
                    }
                };

                if let Some(message) = failure {
                    errors.push(FieldError::new(field.clone(), message));
                }
            }
        }

        Ok(errors)
    }
}
