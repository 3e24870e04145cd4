pub mod page_repository;   // Page rows, translations, tree position and content
pub mod page_service;      // Validation, invalidation and route registration
pub mod permalink_cache;   // Cached snapshot of live pages
pub mod validation;        // Page input rules and the rule validator

pub use page_repository::{Deleted, PageRepository, Placement};
pub use page_service::{PageService, PageServiceDeps};
pub use permalink_cache::PermalinkCache;
pub use validation::{page_rules, Rule, RuleSet, RuleValidator};
