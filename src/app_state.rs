use std::sync::Arc;

use crate::{
    config::Config,
    error::AppResult,
    http::RegexRouteRegistrar,
    infrastructure::{
        cache::MemoryCache, content_store::FsContentStore, database::Database,
        locale::ConfigLocaleProvider,
    },
    services::{
        page_repository::PageRepository,
        page_service::{PageService, PageServiceDeps},
        permalink_cache::PermalinkCache,
        validation::RuleValidator,
    },
};

#[derive(Clone)]
pub struct AppState {
    pub page_service: Arc<PageService>,
    pub routes: Arc<RegexRouteRegistrar>,
    pub locales: Arc<ConfigLocaleProvider>,
    pub config: Config,
}

impl AppState {
    pub async fn new(config: Config) -> AppResult<Self> {
        // Initialize database
        let database = Database::connect(&config.database.url).await?;

        let content = Arc::new(FsContentStore::new(
            config.content.root.clone(),
            config.content.extension.clone(),
        ));
        let repository = Arc::new(PageRepository::new(
            database.clone(),
            content,
            config.locales.supported.clone(),
            config.content.base_url.clone(),
        ));

        let cache = PermalinkCache::new(
            Arc::new(MemoryCache::new(config.cache.capacity)),
            config.cache.ttl(),
        );
        let routes = Arc::new(RegexRouteRegistrar::new());
        let locales = Arc::new(ConfigLocaleProvider::new(config.locales.clone()));

        let page_service = Arc::new(PageService::new(PageServiceDeps {
            repository,
            cache,
            validator: Arc::new(RuleValidator::new(database)),
            routes: routes.clone(),
            locales: locales.clone(),
            environment: config.environment,
        }));

        Ok(Self {
            page_service,
            routes,
            locales,
            config,
        })
    }
}
