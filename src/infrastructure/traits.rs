use async_trait::async_trait;
use std::time::Duration;

use crate::error::{AppResult, FieldErrors};
use crate::models::page_data::FieldMap;
use crate::services::validation::RuleSet;

/// Key/value cache with per-entry expiry.
#[async_trait]
pub trait CacheClient: Send + Sync {
    async fn get(&self, key: &str) -> AppResult<Option<Vec<u8>>>;
    async fn put(&self, key: &str, value: Vec<u8>, ttl: Duration) -> AppResult<()>;
    /// Evict `key`. Returns whether an entry was present.
    async fn forget(&self, key: &str) -> AppResult<bool>;
}

/// Receives the permalink pattern consumed by the HTTP routing layer.
pub trait RouteRegistrar: Send + Sync {
    /// `pattern` is a parenthesised alternation of escaped permalinks.
    fn register_page_route(&self, locale: &str, pattern: &str) -> AppResult<()>;
}

pub trait LocaleProvider: Send + Sync {
    fn current_locale(&self) -> String;
    fn base_locale(&self) -> String;
    fn supported_locales(&self) -> Vec<String>;
}

/// The validation contract: every failing rule is reported, not just the first.
#[async_trait]
pub trait Validator: Send + Sync {
    async fn validate(&self, data: &FieldMap, rules: &RuleSet) -> AppResult<FieldErrors>;
}
