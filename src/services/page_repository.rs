// Page Repository - page-level persistence over the relational store
// (page rows, translations, closure tree) and the content store.

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::error::{AppError, AppResult};
use crate::infrastructure::closure_tree::ClosureTreeIndex;
use crate::infrastructure::content_store::ContentStore;
use crate::infrastructure::database::{commit, Database};
use crate::infrastructure::translation_store::TranslationStore;
use crate::models::{Page, PageId};

/// Placeholder in stored bodies replaced by the site's base URL on load.
pub const BASE_URL_PLACEHOLDER: &str = "%BASE_URL%";

/// Where a page goes in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Root,
    ChildOf(PageId),
}

/// Row filter for page reads. Soft-deleted pages are only returned when
/// explicitly asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deleted {
    Exclude,
    Include,
}

const PAGE_COLUMNS: &str = "id, is_locked, created_at, updated_at, deleted_at";

fn page_from_row(row: &SqliteRow) -> Page {
    Page {
        id: Some(row.get("id")),
        is_locked: row.get("is_locked"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        deleted_at: row.get("deleted_at"),
        translations: BTreeMap::new(),
    }
}

pub struct PageRepository {
    db: Database,
    tree: ClosureTreeIndex,
    translations: TranslationStore,
    content: Arc<dyn ContentStore>,
    locales: Vec<String>,
    base_url: String,
}

impl PageRepository {
    pub fn new(
        db: Database,
        content: Arc<dyn ContentStore>,
        locales: Vec<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            db,
            tree: ClosureTreeIndex::new(),
            translations: TranslationStore::new(),
            content,
            locales,
            base_url: base_url.into(),
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn content_store(&self) -> &Arc<dyn ContentStore> {
        &self.content
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Pages (optionally restricted to `ids`) with their translations,
    /// ordered by id.
    async fn load_pages(
        &self,
        conn: &mut SqliteConnection,
        ids: Option<&[PageId]>,
        deleted: Deleted,
    ) -> AppResult<Vec<Page>> {
        if ids.is_some_and(|ids| ids.is_empty()) {
            return Ok(Vec::new());
        }

        let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM page WHERE 1 = 1", PAGE_COLUMNS));
        if deleted == Deleted::Exclude {
            qb.push(" AND deleted_at IS NULL");
        }
        if let Some(ids) = ids {
            qb.push(" AND id IN (");
            let mut separated = qb.separated(",");
            for id in ids {
                separated.push_bind(*id);
            }
            qb.push(")");
        }
        qb.push(" ORDER BY id");

        let rows = qb
            .build()
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to load pages: {}", e)))?;

        let mut pages: Vec<Page> = rows.iter().map(page_from_row).collect();
        let page_ids: Vec<PageId> = pages.iter().filter_map(|p| p.id).collect();
        let mut translations = self.translations.all_for_pages(conn, &page_ids).await?;

        for page in &mut pages {
            if let Some(id) = page.id {
                page.translations = translations.remove(&id).unwrap_or_default();
            }
        }
        Ok(pages)
    }

    /// Every live page with its translations: the permalink cache dataset.
    #[instrument(skip(self))]
    pub async fn fetch_all_with_translations(&self) -> AppResult<Vec<Page>> {
        let mut conn = self.db.acquire().await?;
        let pages = self.load_pages(&mut conn, None, Deleted::Exclude).await?;
        debug!("Loaded {} live pages", pages.len());
        Ok(pages)
    }

    pub async fn find_by_id(&self, id: PageId, deleted: Deleted) -> AppResult<Option<Page>> {
        let mut conn = self.db.acquire().await?;
        let mut pages = self.load_pages(&mut conn, Some(std::slice::from_ref(&id)), deleted).await?;
        Ok(pages.pop())
    }

    /// Live pages outside `page`'s subtree: the pages it may be moved under.
    pub async fn pages_without_descendants(&self, page: &Page) -> AppResult<Vec<Page>> {
        let id = page.require_id()?;
        let mut conn = self.db.acquire().await?;

        let mut excluded = vec![id];
        excluded.extend(self.tree.descendants(&mut conn, id).await?);

        let pages = self.load_pages(&mut conn, None, Deleted::Exclude).await?;
        Ok(pages
            .into_iter()
            .filter(|p| p.id.is_some_and(|pid| !excluded.contains(&pid)))
            .collect())
    }

    /// Live ancestors of `id`, root first.
    pub async fn ancestors(&self, id: PageId) -> AppResult<Vec<Page>> {
        let mut conn = self.db.acquire().await?;
        let chain = self.tree.ancestors(&mut conn, id).await?;
        let mut by_id: BTreeMap<PageId, Page> = self
            .load_pages(&mut conn, Some(chain.as_slice()), Deleted::Exclude)
            .await?
            .into_iter()
            .filter_map(|p| p.id.map(|pid| (pid, p)))
            .collect();

        Ok(chain.iter().filter_map(|pid| by_id.remove(pid)).collect())
    }

    pub async fn children(&self, id: PageId) -> AppResult<Vec<Page>> {
        let mut conn = self.db.acquire().await?;
        let ids = self.tree.children(&mut conn, id).await?;
        self.load_pages(&mut conn, Some(ids.as_slice()), Deleted::Exclude).await
    }

    pub async fn parent_id(&self, id: PageId) -> AppResult<Option<PageId>> {
        let mut conn = self.db.acquire().await?;
        self.tree.parent(&mut conn, id).await
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    async fn place(&self, conn: &mut SqliteConnection, id: PageId, placement: Placement) -> AppResult<()> {
        match placement {
            Placement::Root => self.tree.make_root(conn, id).await,
            Placement::ChildOf(parent) => self.tree.move_as_child_of(conn, id, parent).await,
        }
    }

    async fn save_translations(&self, conn: &mut SqliteConnection, page: &mut Page, id: PageId) -> AppResult<()> {
        for locale in &self.locales {
            let translation = page.translate_mut(locale);
            translation.page_id = Some(id);
            translation.locale = locale.clone();
            self.translations.save(conn, id, translation).await?;
        }
        Ok(())
    }

    /// Insert the page row, its translations for every supported locale and
    /// its tree position in one transaction, then write its content.
    #[instrument(skip(self, page))]
    pub async fn store(&self, page: &mut Page, placement: Placement) -> AppResult<()> {
        let now = Utc::now();
        let mut stored = page.clone();
        stored.created_at = now;
        stored.updated_at = now;
        stored.deleted_at = None;

        let mut tx = self.db.begin().await?;

        let id = sqlx::query("INSERT INTO page (is_locked, created_at, updated_at) VALUES (?, ?, ?)")
            .bind(stored.is_locked)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to insert page: {}", e)))?
            .last_insert_rowid();

        self.tree.insert_node(&mut tx, id).await?;
        self.save_translations(&mut tx, &mut stored, id).await?;
        self.place(&mut tx, id, placement).await?;

        commit(tx).await?;

        stored.id = Some(id);
        *page = stored;
        info!("Stored page {}", id);

        self.store_content(page).await?;
        Ok(())
    }

    /// Re-save the page row, its translations and its tree position in one
    /// transaction. Content relocation is left to the caller, which holds
    /// the pre-update permalinks.
    #[instrument(skip(self, page))]
    pub async fn update(&self, page: &mut Page, placement: Placement) -> AppResult<()> {
        let id = page.require_id()?;
        let now = Utc::now();
        let mut stored = page.clone();
        stored.updated_at = now;

        let mut tx = self.db.begin().await?;

        let locked: Option<bool> =
            sqlx::query_scalar("SELECT is_locked FROM page WHERE id = ? AND deleted_at IS NULL")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| AppError::DatabaseError(format!("Failed to read page {}: {}", id, e)))?;
        match locked {
            None => return Err(AppError::NotFound(format!("Page {} not found", id))),
            // A locked page may only be saved when the save unlocks it.
            Some(true) if stored.is_locked => return Err(AppError::Locked(id)),
            Some(_) => {}
        }

        let updated = sqlx::query(
            "UPDATE page SET is_locked = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(stored.is_locked)
        .bind(now)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to update page {}: {}", id, e)))?
        .rows_affected();

        if updated == 0 {
            return Err(AppError::NotFound(format!("Page {} not found", id)));
        }

        self.save_translations(&mut tx, &mut stored, id).await?;
        self.place(&mut tx, id, placement).await?;

        commit(tx).await?;

        *page = stored;
        info!("Updated page {}", id);
        Ok(())
    }

    /// Soft-delete the page and its whole subtree, then remove their
    /// content. Returns the pages that were deleted, `page` first. Refused
    /// with `Locked` when any page in the subtree is locked.
    #[instrument(skip(self, page))]
    pub async fn destroy(&self, page: &mut Page) -> AppResult<Vec<Page>> {
        let id = page.require_id()?;
        let now = Utc::now();

        let mut tx = self.db.begin().await?;

        let mut subtree = vec![id];
        subtree.extend(self.tree.descendants(&mut tx, id).await?);
        let mut destroyed = self.load_pages(&mut tx, Some(subtree.as_slice()), Deleted::Exclude).await?;
        if !destroyed.iter().any(|p| p.id == Some(id)) {
            return Err(AppError::NotFound(format!("Page {} not found", id)));
        }
        if let Some(locked) = destroyed.iter().find(|p| p.is_locked) {
            return Err(AppError::Locked(locked.id.unwrap_or(id)));
        }

        let mut qb = QueryBuilder::<Sqlite>::new("UPDATE page SET deleted_at = ");
        qb.push_bind(now);
        qb.push(" WHERE deleted_at IS NULL AND id IN (");
        let mut separated = qb.separated(",");
        for member in &subtree {
            separated.push_bind(*member);
        }
        qb.push(")");
        qb.build()
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to delete page {}: {}", id, e)))?;

        commit(tx).await?;

        for destroyed_page in &mut destroyed {
            destroyed_page.deleted_at = Some(now);
            self.destroy_content(destroyed_page).await?;
        }
        page.deleted_at = Some(now);
        info!("Deleted page {} ({} pages in subtree)", id, destroyed.len());
        Ok(destroyed)
    }

    /// Physically remove a soft-deleted page, its subtree, their
    /// translations and closure edges.
    #[instrument(skip(self, page))]
    pub async fn purge(&self, page: &Page) -> AppResult<Vec<PageId>> {
        let id = page.require_id()?;
        let mut tx = self.db.begin().await?;

        let mut subtree = vec![id];
        subtree.extend(self.tree.descendants(&mut tx, id).await?);
        let live = self.load_pages(&mut tx, Some(subtree.as_slice()), Deleted::Exclude).await?;
        if let Some(live_page) = live.first() {
            return Err(AppError::Conflict(format!(
                "Page {} is not deleted and cannot be purged",
                live_page.id.unwrap_or(id)
            )));
        }

        let members = self.tree.delete_subtree(&mut tx, id).await?;
        self.translations.delete_for_pages(&mut tx, &members).await?;

        let mut qb = QueryBuilder::<Sqlite>::new("DELETE FROM page WHERE id IN (");
        let mut separated = qb.separated(",");
        for member in &members {
            separated.push_bind(*member);
        }
        qb.push(")");
        qb.build()
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to purge page {}: {}", id, e)))?;

        commit(tx).await?;
        info!("Purged page {} ({} pages)", id, members.len());
        Ok(members)
    }

    // ------------------------------------------------------------------
    // Content
    // ------------------------------------------------------------------

    /// Write every translation's body at its current permalink.
    pub async fn store_content(&self, page: &Page) -> AppResult<()> {
        for translation in page.translations.values().filter(|t| t.has_permalink()) {
            let body = translation.content.as_deref().unwrap_or_default();
            self.content
                .write(&translation.locale, &translation.permalink, body)
                .await?;
        }
        Ok(())
    }

    /// Load every translation's body; a missing blob yields empty content.
    pub async fn retrieve_content(&self, page: &mut Page) -> AppResult<()> {
        for translation in page.translations.values_mut().filter(|t| t.has_permalink()) {
            let body = self
                .content
                .read(&translation.locale, &translation.permalink)
                .await?
                .unwrap_or_default();
            translation.content = Some(body.replace(BASE_URL_PLACEHOLDER, &self.base_url));
        }
        Ok(())
    }

    pub async fn destroy_content(&self, page: &Page) -> AppResult<()> {
        for translation in page.translations.values().filter(|t| t.has_permalink()) {
            self.content
                .delete(&translation.locale, &translation.permalink)
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::content_store::FsContentStore;
    use tempfile::{tempdir, TempDir};

    async fn repository() -> (PageRepository, TempDir) {
        let dir = tempdir().unwrap();
        let db = Database::new_in_memory().await.unwrap();
        let content = Arc::new(FsContentStore::new(dir.path(), "html"));
        let repo = PageRepository::new(
            db,
            content,
            vec!["en".to_string(), "fr".to_string()],
            "https://example.com",
        );
        (repo, dir)
    }

    fn page(slug: &str) -> Page {
        let mut page = Page::new();
        for locale in ["en", "fr"] {
            let t = page.translate_mut(locale);
            t.permalink = format!("{}-{}", slug, locale);
            t.title = format!("{} ({})", slug, locale);
            t.content = Some(format!("<p>{} %BASE_URL%</p>", slug));
        }
        page
    }

    #[tokio::test]
    async fn test_store_assigns_id_and_writes_content() {
        let (repo, _dir) = repository().await;
        let mut home = page("home");

        repo.store(&mut home, Placement::Root).await.unwrap();

        let id = home.id.unwrap();
        let found = repo.find_by_id(id, Deleted::Exclude).await.unwrap().unwrap();
        assert_eq!(found.translations.len(), 2);
        assert_eq!(found.permalink("fr"), Some("home-fr"));

        let mut loaded = found.clone();
        repo.retrieve_content(&mut loaded).await.unwrap();
        assert_eq!(
            loaded.translation("en").unwrap().content.as_deref(),
            Some("<p>home https://example.com</p>")
        );
    }

    #[tokio::test]
    async fn test_store_rejects_missing_locale_permalink() {
        let (repo, _dir) = repository().await;
        let mut only_en = Page::new();
        only_en.translate_mut("en").permalink = "solo".to_string();
        only_en.translate_mut("en").title = "Solo".to_string();

        // An empty permalink is rejected by the translation store.
        let err = repo.store(&mut only_en, Placement::Root).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(only_en.id.is_none());
        assert!(repo.fetch_all_with_translations().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_tree_queries() {
        let (repo, _dir) = repository().await;
        let mut root = page("root");
        repo.store(&mut root, Placement::Root).await.unwrap();
        let root_id = root.id.unwrap();

        let mut child = page("child");
        repo.store(&mut child, Placement::ChildOf(root_id)).await.unwrap();
        let mut grandchild = page("grandchild");
        repo.store(&mut grandchild, Placement::ChildOf(child.id.unwrap()))
            .await
            .unwrap();
        let mut other = page("other");
        repo.store(&mut other, Placement::Root).await.unwrap();

        let ancestors = repo.ancestors(grandchild.id.unwrap()).await.unwrap();
        let ids: Vec<_> = ancestors.iter().map(|p| p.id.unwrap()).collect();
        assert_eq!(ids, vec![root_id, child.id.unwrap()]);

        let candidates = repo.pages_without_descendants(&child).await.unwrap();
        let ids: Vec<_> = candidates.iter().map(|p| p.id.unwrap()).collect();
        assert_eq!(ids, vec![root_id, other.id.unwrap()]);

        assert_eq!(repo.parent_id(child.id.unwrap()).await.unwrap(), Some(root_id));
        assert_eq!(repo.children(root_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_update_with_cycle_changes_nothing() {
        let (repo, _dir) = repository().await;
        let mut parent = page("parent");
        repo.store(&mut parent, Placement::Root).await.unwrap();
        let mut child = page("child");
        repo.store(&mut child, Placement::ChildOf(parent.id.unwrap()))
            .await
            .unwrap();

        parent.translate_mut("en").title = "Renamed".to_string();
        let err = repo
            .update(&mut parent, Placement::ChildOf(child.id.unwrap()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Tree(_)));

        let stored = repo
            .find_by_id(parent.id.unwrap(), Deleted::Exclude)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.title("en"), Some("parent (en)"));
        assert_eq!(repo.parent_id(parent.id.unwrap()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_destroy_soft_deletes_subtree_then_purge() {
        let (repo, dir) = repository().await;
        let mut parent = page("parent");
        repo.store(&mut parent, Placement::Root).await.unwrap();
        let mut child = page("child");
        repo.store(&mut child, Placement::ChildOf(parent.id.unwrap()))
            .await
            .unwrap();

        let destroyed = repo.destroy(&mut parent).await.unwrap();
        assert_eq!(destroyed.len(), 2);
        assert!(parent.is_deleted());
        assert!(!dir.path().join("en").join("child-en.html").exists());
        assert!(repo.fetch_all_with_translations().await.unwrap().is_empty());

        let soft = repo
            .find_by_id(child.id.unwrap(), Deleted::Include)
            .await
            .unwrap()
            .unwrap();
        assert!(soft.is_deleted());

        let purged = repo.purge(&parent).await.unwrap();
        assert_eq!(purged.len(), 2);
        assert!(repo
            .find_by_id(child.id.unwrap(), Deleted::Include)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_destroy_refuses_subtree_with_locked_page() {
        let (repo, dir) = repository().await;
        let mut parent = page("parent");
        repo.store(&mut parent, Placement::Root).await.unwrap();
        let mut child = page("child");
        child.is_locked = true;
        repo.store(&mut child, Placement::ChildOf(parent.id.unwrap()))
            .await
            .unwrap();

        let err = repo.destroy(&mut parent).await.unwrap_err();
        assert!(matches!(err, AppError::Locked(id) if Some(id) == child.id));

        assert!(!parent.is_deleted());
        assert_eq!(repo.fetch_all_with_translations().await.unwrap().len(), 2);
        assert!(dir.path().join("en").join("child-en.html").exists());
    }

    #[tokio::test]
    async fn test_update_checks_stored_lock() {
        let (repo, _dir) = repository().await;
        let mut home = page("home");
        home.is_locked = true;
        repo.store(&mut home, Placement::Root).await.unwrap();

        // A stale copy that claims to be locked is still rejected.
        let mut copy = home.clone();
        copy.translate_mut("en").title = "Changed".to_string();
        let err = repo.update(&mut copy, Placement::Root).await.unwrap_err();
        assert!(matches!(err, AppError::Locked(_)));

        copy.is_locked = false;
        repo.update(&mut copy, Placement::Root).await.unwrap();
        let stored = repo
            .find_by_id(home.id.unwrap(), Deleted::Exclude)
            .await
            .unwrap()
            .unwrap();
        assert!(!stored.is_locked);
        assert_eq!(stored.title("en"), Some("Changed"));
    }

    #[tokio::test]
    async fn test_purge_refuses_live_pages() {
        let (repo, _dir) = repository().await;
        let mut live = page("live");
        repo.store(&mut live, Placement::Root).await.unwrap();

        let err = repo.purge(&live).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }
}
