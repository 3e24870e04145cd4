// Page Service - validation, persistence ordering, cache invalidation and
// route pattern registration. Public entry point for page mutation and lookup.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::config::AppEnvironment;
use crate::error::{AppError, AppResult};
use crate::infrastructure::content_store::ContentStore;
use crate::infrastructure::traits::{LocaleProvider, RouteRegistrar, Validator};
use crate::models::{Crumb, Page, PageData, PageId, TranslationData};
use crate::services::page_repository::{Deleted, PageRepository, Placement};
use crate::services::permalink_cache::PermalinkCache;
use crate::services::validation::{page_rules, RuleSet};

/// Collaborators injected into [`PageService`].
pub struct PageServiceDeps {
    pub repository: Arc<PageRepository>,
    pub cache: PermalinkCache,
    pub validator: Arc<dyn Validator>,
    pub routes: Arc<dyn RouteRegistrar>,
    pub locales: Arc<dyn LocaleProvider>,
    pub environment: AppEnvironment,
}

pub struct PageService {
    repository: Arc<PageRepository>,
    cache: PermalinkCache,
    validator: Arc<dyn Validator>,
    routes: Arc<dyn RouteRegistrar>,
    locales: Arc<dyn LocaleProvider>,
    environment: AppEnvironment,
}

impl PageService {
    pub fn new(deps: PageServiceDeps) -> Self {
        Self {
            repository: deps.repository,
            cache: deps.cache,
            validator: deps.validator,
            routes: deps.routes,
            locales: deps.locales,
            environment: deps.environment,
        }
    }

    pub fn repository(&self) -> &Arc<PageRepository> {
        &self.repository
    }

    fn content(&self) -> &Arc<dyn ContentStore> {
        self.repository.content_store()
    }

    // ------------------------------------------------------------------
    // Fetch
    // ------------------------------------------------------------------

    /// Every live page, served from the permalink cache.
    pub async fn cached_pages(&self) -> AppResult<Vec<Page>> {
        let repository = Arc::clone(&self.repository);
        self.cache
            .get_or_load(|| async move { repository.fetch_all_with_translations().await })
            .await
    }

    pub async fn find_by_id(&self, id: PageId) -> AppResult<Option<Page>> {
        self.repository.find_by_id(id, Deleted::Exclude).await
    }

    pub async fn find_by_id_with_deleted(&self, id: PageId) -> AppResult<Option<Page>> {
        self.repository.find_by_id(id, Deleted::Include).await
    }

    /// The live page whose `locale` permalink is `permalink`. `locale`
    /// defaults to the base locale.
    #[instrument(skip(self))]
    pub async fn find_by_permalink(&self, permalink: &str, locale: Option<&str>) -> AppResult<Option<Page>> {
        let locale = locale.map_or_else(|| self.locales.base_locale(), str::to_string);
        let pages = self.cached_pages().await?;
        Ok(first_matching(pages, |page| page.has_permalink(permalink, &locale)))
    }

    pub async fn pages_without_descendants(&self, page: &Page) -> AppResult<Vec<Page>> {
        self.repository.pages_without_descendants(page).await
    }

    /// Load every locale's body into `page`.
    pub async fn load_page_content(&self, page: &mut Page) -> AppResult<()> {
        self.repository.retrieve_content(page).await
    }

    /// Ancestors of `page` as `(permalink, title)` pairs in `locale`, root first.
    pub async fn breadcrumb(&self, page: &Page, locale: &str) -> AppResult<Vec<Crumb>> {
        let id = page.require_id()?;
        let ancestors = self.repository.ancestors(id).await?;
        Ok(ancestors
            .iter()
            .filter_map(|ancestor| {
                let translation = ancestor.translation(locale)?;
                Some(Crumb {
                    permalink: translation.permalink.clone(),
                    title: translation.title.clone(),
                })
            })
            .collect())
    }

    // ------------------------------------------------------------------
    // Creation and update
    // ------------------------------------------------------------------

    pub fn supported_locales(&self) -> Vec<String> {
        self.locales.supported_locales()
    }

    /// Validation rules for a new page, or for updating `page`.
    pub fn rules(&self, page: Option<&Page>) -> RuleSet {
        page_rules(&self.supported_locales(), page.and_then(|p| p.id))
    }

    async fn validate(&self, data: &PageData, page: Option<&Page>) -> AppResult<()> {
        let errors = self.validator.validate(&data.fields(), &self.rules(page)).await?;
        if errors.is_empty() {
            Ok(())
        } else {
            debug!("Page input rejected with {} field errors", errors.len());
            Err(AppError::Validation(errors))
        }
    }

    /// Copy submitted fields for supported locales onto `page`.
    fn fill_page(&self, page: &mut Page, data: &PageData) {
        if let Some(is_locked) = data.is_locked {
            page.is_locked = is_locked;
        }
        for locale in self.supported_locales() {
            if let Some(submitted) = data.translation.get(&locale) {
                fill_translation(page, &locale, submitted);
            }
        }
    }

    async fn placement(&self, parent_id: Option<PageId>) -> AppResult<Placement> {
        match parent_id {
            Some(parent_id) => match self.repository.find_by_id(parent_id, Deleted::Exclude).await? {
                Some(_) => Ok(Placement::ChildOf(parent_id)),
                None => {
                    debug!("Parent page {} not found, placing as root", parent_id);
                    Ok(Placement::Root)
                }
            },
            None => Ok(Placement::Root),
        }
    }

    #[instrument(skip(self, data))]
    pub async fn create(&self, data: PageData) -> AppResult<Page> {
        let data = data.normalized();
        self.validate(&data, None).await?;

        let mut page = Page::new();
        self.fill_page(&mut page, &data);
        let placement = self.placement(data.parent_id).await?;

        self.repository.store(&mut page, placement).await?;
        self.cache.invalidate().await?;

        info!("Created page {:?}", page.id);
        Ok(page)
    }

    /// Apply `data` to `page`. Bodies are written at the new permalinks,
    /// then blobs left at old permalinks are removed. A locale submitted
    /// without content keeps its stored body, placeholders intact.
    #[instrument(skip(self, page, data), fields(page_id = ?page.id))]
    pub async fn update(&self, page: &mut Page, data: PageData) -> AppResult<()> {
        let id = page.require_id()?;
        let data = data.normalized();

        let stored = self
            .repository
            .find_by_id(id, Deleted::Exclude)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Page {} not found", id)))?;
        if stored.is_locked && data.is_locked != Some(false) {
            return Err(AppError::Locked(id));
        }
        self.validate(&data, Some(page)).await?;

        let old_addresses: Vec<(String, String, PathBuf)> = page
            .translations
            .values()
            .filter(|t| t.has_permalink())
            .map(|t| {
                let address = self.content().address(&t.locale, &t.permalink);
                (t.locale.clone(), t.permalink.clone(), address)
            })
            .collect();

        let mut updated = page.clone();
        updated.is_locked = stored.is_locked;
        self.fill_page(&mut updated, &data);
        // In-memory bodies may be rendered; carry over the stored blob instead.
        for (locale, old_permalink, _) in &old_addresses {
            let submitted = data
                .translation
                .get(locale)
                .is_some_and(|t| t.content.is_some());
            if !submitted {
                updated.translate_mut(locale).content =
                    self.content().read(locale, old_permalink).await?;
            }
        }

        let placement = self.placement(data.parent_id).await?;
        self.repository.update(&mut updated, placement).await?;

        self.repository.store_content(&updated).await?;
        let new_addresses: HashSet<PathBuf> = updated
            .translations
            .values()
            .filter(|t| t.has_permalink())
            .map(|t| self.content().address(&t.locale, &t.permalink))
            .collect();
        for (locale, old_permalink, address) in &old_addresses {
            if !new_addresses.contains(address) {
                debug!("Removing stale content {}", address.display());
                self.content().delete(locale, old_permalink).await?;
            }
        }

        self.cache.invalidate().await?;
        *page = updated;

        info!("Updated page {}", id);
        Ok(())
    }

    #[instrument(skip(self, page), fields(page_id = ?page.id))]
    pub async fn delete(&self, page: &mut Page) -> AppResult<()> {
        let id = page.require_id()?;
        if page.is_locked {
            return Err(AppError::Locked(id));
        }

        // Locks across the stored subtree are checked inside the transaction.
        let destroyed = self.repository.destroy(page).await?;
        self.cache.invalidate().await?;

        info!("Deleted page {} and {} descendants", id, destroyed.len().saturating_sub(1));
        Ok(())
    }

    /// Physically remove a deleted page and its deleted subtree.
    pub async fn purge(&self, page: &Page) -> AppResult<Vec<PageId>> {
        let purged = self.repository.purge(page).await?;
        self.cache.invalidate().await?;
        Ok(purged)
    }

    // ------------------------------------------------------------------
    // Routes
    // ------------------------------------------------------------------

    /// Register the alternation of every live permalink in `locale`
    /// (default: the current locale). Skipped outside a serving process.
    #[instrument(skip(self))]
    pub async fn register_routes(&self, locale: Option<&str>) -> AppResult<Option<String>> {
        if !self.environment.is_serving() {
            debug!("Skipping page route registration in {:?}", self.environment);
            return Ok(None);
        }

        let locale = locale.map_or_else(|| self.locales.current_locale(), str::to_string);
        let pages = self.cached_pages().await?;
        let pattern = permalink_pattern(&pages, &locale);

        self.routes.register_page_route(&locale, &pattern)?;
        debug!("Registered {} page routes for {}", pages.len(), locale);
        Ok(Some(pattern))
    }

    // ------------------------------------------------------------------
    // URL helpers
    // ------------------------------------------------------------------

    /// `"{target}/{permalink in target}"` for the page found by `permalink`
    /// in `from_locale`.
    pub async fn permalink(
        &self,
        permalink: &str,
        target_locale: Option<&str>,
        from_locale: Option<&str>,
    ) -> AppResult<Option<String>> {
        let target = target_locale.map_or_else(|| self.locales.current_locale(), str::to_string);
        let page = match self.find_by_permalink(permalink, from_locale).await? {
            Some(page) => page,
            None => return Ok(None),
        };

        match page.permalink(&target) {
            Some(translated) => Ok(Some(format!("{}/{}", target, translated))),
            None => {
                warn!("Page {:?} has no {} permalink", page.id, target);
                Ok(None)
            }
        }
    }

    /// Absolute URL of the page found by `permalink`, in the current locale.
    pub async fn url(&self, permalink: &str) -> AppResult<Option<String>> {
        let base = self.repository.base_url().trim_end_matches('/').to_string();
        Ok(self
            .permalink(permalink, None, None)
            .await?
            .map(|path| format!("{}/{}", base, path)))
    }
}

fn fill_translation(page: &mut Page, locale: &str, submitted: &TranslationData) {
    let translation = page.translate_mut(locale);
    if let Some(title) = &submitted.title {
        translation.title = title.clone();
    }
    if let Some(permalink) = &submitted.permalink {
        translation.permalink = permalink.clone();
    }
    translation.description = submitted.description.clone();
    translation.keywords = submitted.keywords.clone();
    if submitted.content.is_some() {
        translation.content = submitted.content.clone();
    }
}

/// First page satisfying `predicate`, scanning in collection order.
fn first_matching<P>(pages: Vec<Page>, predicate: P) -> Option<Page>
where
    P: Fn(&Page) -> bool,
{
    pages.into_iter().find(|page| predicate(page))
}

/// `(a|b|...)` over the escaped permalinks of `pages` in `locale`.
pub fn permalink_pattern(pages: &[Page], locale: &str) -> String {
    let alternatives: Vec<String> = pages
        .iter()
        .filter_map(|page| page.permalink(locale))
        .map(regex::escape)
        .collect();
    format!("({})", alternatives.join("|"))
}
