use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub cache: CacheConfig,
    pub content: ContentConfig,
    pub locales: LocaleConfig,
    pub environment: AppEnvironment,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub capacity: usize,
    pub ttl_secs: u64,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentConfig {
    pub root: PathBuf,
    pub extension: String,
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocaleConfig {
    pub supported: Vec<String>,
    pub base: String,
}

/// Execution context of the process. Route registration only happens
/// when serving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppEnvironment {
    Production,
    Testing,
    Console,
}

impl AppEnvironment {
    pub fn parse(value: &str) -> AppResult<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "production" | "local" | "serve" => Ok(AppEnvironment::Production),
            "test" | "testing" => Ok(AppEnvironment::Testing),
            "console" | "cli" => Ok(AppEnvironment::Console),
            other => Err(AppError::ConfigurationError(format!(
                "Unknown APP_ENV value '{}'",
                other
            ))),
        }
    }

    pub fn is_serving(self) -> bool {
        self == AppEnvironment::Production
    }
}

impl Config {
    pub fn from_env() -> AppResult<Self> {
        let supported: Vec<String> = env::var("SUPPORTED_LOCALES")
            .unwrap_or_else(|_| "en,fr".to_string())
            .split(',')
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect();

        let base = match env::var("BASE_LOCALE") {
            Ok(locale) => locale,
            Err(_) => supported.first().cloned().ok_or_else(|| {
                AppError::ConfigurationError("SUPPORTED_LOCALES is empty".to_string())
            })?,
        };

        let environment = match env::var("APP_ENV") {
            Ok(value) => AppEnvironment::parse(&value)?,
            Err(_) => AppEnvironment::Production,
        };

        let config = Self {
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "sqlite:data/pages.db".to_string()),
            },
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("SERVER_PORT")
                    .unwrap_or_else(|_| "3000".to_string())
                    .parse()
                    .unwrap_or(3000),
            },
            cache: CacheConfig {
                capacity: env::var("CACHE_CAPACITY")
                    .unwrap_or_else(|_| "64".to_string())
                    .parse()
                    .unwrap_or(64),
                ttl_secs: env::var("CACHE_TTL_SECS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .unwrap_or(5),
            },
            content: ContentConfig {
                root: env::var("CONTENT_ROOT")
                    .unwrap_or_else(|_| "storage/pages".to_string())
                    .into(),
                extension: env::var("CONTENT_EXTENSION").unwrap_or_else(|_| "html".to_string()),
                base_url: env::var("BASE_URL")
                    .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            },
            locales: LocaleConfig { supported, base },
            environment,
        };

        config.check()?;
        Ok(config)
    }

    /// Configuration for tests and embedded use: in-memory database, the
    /// given content root and the `Testing` environment.
    pub fn for_testing(content_root: impl Into<PathBuf>, locales: &[&str]) -> Self {
        let supported: Vec<String> = locales.iter().map(|l| l.to_string()).collect();
        let base = supported.first().cloned().unwrap_or_else(|| "en".to_string());
        Self {
            database: DatabaseConfig {
                url: "sqlite::memory:".to_string(),
            },
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            cache: CacheConfig {
                capacity: 16,
                ttl_secs: 5,
            },
            content: ContentConfig {
                root: content_root.into(),
                extension: "html".to_string(),
                base_url: "http://localhost".to_string(),
            },
            locales: LocaleConfig { supported, base },
            environment: AppEnvironment::Testing,
        }
    }

    fn check(&self) -> AppResult<()> {
        if !self.locales.supported.contains(&self.locales.base) {
            return Err(AppError::ConfigurationError(format!(
                "BASE_LOCALE '{}' is not one of the supported locales {:?}",
                self.locales.base, self.locales.supported
            )));
        }
        if self.cache.capacity == 0 {
            return Err(AppError::ConfigurationError(
                "CACHE_CAPACITY must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
