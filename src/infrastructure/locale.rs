use std::sync::RwLock;

use crate::config::LocaleConfig;
use crate::infrastructure::traits::LocaleProvider;

/// Locales from configuration; the current locale starts at the base
/// locale and can be switched per process.
#[derive(Debug)]
pub struct ConfigLocaleProvider {
    config: LocaleConfig,
    current: RwLock<String>,
}

impl ConfigLocaleProvider {
    pub fn new(config: LocaleConfig) -> Self {
        let current = RwLock::new(config.base.clone());
        Self { config, current }
    }

    /// Ignored for unsupported locales.
    pub fn set_current(&self, locale: &str) {
        if self.config.supported.iter().any(|l| l == locale) {
            let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
            *current = locale.to_string();
        }
    }
}

impl LocaleProvider for ConfigLocaleProvider {
    fn current_locale(&self) -> String {
        self.current.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn base_locale(&self) -> String {
        self.config.base.clone()
    }

    fn supported_locales(&self) -> Vec<String> {
        self.config.supported.clone()
    }
}
