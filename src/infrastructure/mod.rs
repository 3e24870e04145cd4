// Storage and collaborator infrastructure
pub mod database;              // SQLite pool and schema
pub mod closure_tree;          // Closure-table tree index
pub mod translation_store;     // Per-locale page translations
pub mod content_store;         // Page bodies on disk
pub mod cache;                 // LRU cache with TTL entries
pub mod locale;                // Configured locales
pub mod traits;                // Collaborator seams

pub use cache::{Cache, CacheEntry, MemoryCache};
pub use closure_tree::{ClosureEdge, ClosureTreeIndex};
pub use content_store::{ContentStore, FsContentStore};
pub use database::Database;
pub use locale::ConfigLocaleProvider;
pub use traits::{CacheClient, LocaleProvider, RouteRegistrar, Validator};
pub use translation_store::TranslationStore;
