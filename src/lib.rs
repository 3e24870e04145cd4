// Page Tree - hierarchical, localized pages over a closure table

// Runtime configuration and shared state
pub mod app_state;
pub mod config;

// Storage, caching and collaborator seams
pub mod infrastructure;

// Page and input models
pub mod models;

// Page repository and service
pub mod services;

// HTTP routing for published pages
pub mod http;

// Common utilities
pub mod error;

// Re-exports for convenience
pub use error::{AppError, AppResult};
