// Translation Store - per-locale structured page fields keyed by (page_id, locale)

use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection};
use std::collections::BTreeMap;
use tracing::instrument;

use crate::error::{AppError, AppResult, FieldError, FieldErrors};
use crate::models::page::{is_valid_permalink, MAX_FIELD_LENGTH};
use crate::models::{PageId, Translation};

const TRANSLATION_COLUMNS: &str =
    "t.page_id, t.locale, t.permalink, t.title, t.description, t.keywords";

fn translation_from_row(row: &SqliteRow) -> Translation {
    Translation {
        page_id: Some(row.get("page_id")),
        locale: row.get("locale"),
        permalink: row.get("permalink"),
        title: row.get("title"),
        description: row.get("description"),
        keywords: row.get("keywords"),
        content: None,
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TranslationStore;

impl TranslationStore {
    pub fn new() -> Self {
        Self
    }

    /// The stored translation, or an empty one for a locale without a row.
    pub async fn get(
        &self,
        conn: &mut SqliteConnection,
        page_id: PageId,
        locale: &str,
    ) -> AppResult<Translation> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM page_translation t WHERE t.page_id = ? AND t.locale = ?",
            TRANSLATION_COLUMNS
        ))
        .bind(page_id)
        .bind(locale)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| {
            AppError::DatabaseError(format!(
                "Failed to get translation {} of page {}: {}",
                locale, page_id, e
            ))
        })?;

        Ok(match row {
            Some(row) => translation_from_row(&row),
            None => Translation {
                page_id: Some(page_id),
                ..Translation::empty(locale)
            },
        })
    }

    /// Whether a live page other than `ignore` already uses `permalink` in `locale`.
    pub async fn permalink_taken(
        &self,
        conn: &mut SqliteConnection,
        locale: &str,
        permalink: &str,
        ignore: Option<PageId>,
    ) -> AppResult<bool> {
        let row = sqlx::query(
            r#"
            SELECT 1 FROM page_translation t
            JOIN page p ON p.id = t.page_id
            WHERE t.locale = ? AND t.permalink = ? AND p.deleted_at IS NULL AND t.page_id <> ?
            LIMIT 1
            "#,
        )
        .bind(locale)
        .bind(permalink)
        .bind(ignore.unwrap_or(0))
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to check permalink uniqueness: {}", e)))?;
        Ok(row.is_some())
    }

    async fn check(
        &self,
        conn: &mut SqliteConnection,
        page_id: PageId,
        translation: &Translation,
    ) -> AppResult<()> {
        let field = |name: &str| format!("translation.{}.{}", translation.locale, name);
        let mut errors = FieldErrors::default();

        if !is_valid_permalink(&translation.permalink) {
            errors.push(FieldError::new(
                field("permalink"),
                "The permalink format is invalid.",
            ));
        } else if self
            .permalink_taken(conn, &translation.locale, &translation.permalink, Some(page_id))
            .await?
        {
            errors.push(FieldError::new(
                field("permalink"),
                "The permalink has already been taken.",
            ));
        }
        if translation.title.chars().count() > MAX_FIELD_LENGTH {
            errors.push(FieldError::new(field("title"), "The title is too long."));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(errors))
        }
    }

    /// Insert or update the row for `(page_id, translation.locale)`.
    #[instrument(skip(self, conn, translation), fields(locale = %translation.locale))]
    pub async fn save(
        &self,
        conn: &mut SqliteConnection,
        page_id: PageId,
        translation: &Translation,
    ) -> AppResult<()> {
        self.check(conn, page_id, translation).await?;

        sqlx::query(
            r#"
            INSERT INTO page_translation (page_id, locale, permalink, title, description, keywords)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (page_id, locale) DO UPDATE SET
                permalink = excluded.permalink,
                title = excluded.title,
                description = excluded.description,
                keywords = excluded.keywords
            "#,
        )
        .bind(page_id)
        .bind(&translation.locale)
        .bind(&translation.permalink)
        .bind(&translation.title)
        .bind(&translation.description)
        .bind(&translation.keywords)
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            AppError::DatabaseError(format!(
                "Failed to save translation {} of page {}: {}",
                translation.locale, page_id, e
            ))
        })?;
        Ok(())
    }

    pub async fn all_for_page(
        &self,
        conn: &mut SqliteConnection,
        page_id: PageId,
    ) -> AppResult<BTreeMap<String, Translation>> {
        let mut by_page = self.all_for_pages(conn, &[page_id]).await?;
        Ok(by_page.remove(&page_id).unwrap_or_default())
    }

    /// Translations of several pages at once, grouped by page then locale.
    pub async fn all_for_pages(
        &self,
        conn: &mut SqliteConnection,
        page_ids: &[PageId],
    ) -> AppResult<BTreeMap<PageId, BTreeMap<String, Translation>>> {
        let mut grouped: BTreeMap<PageId, BTreeMap<String, Translation>> = BTreeMap::new();
        if page_ids.is_empty() {
            return Ok(grouped);
        }

        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {} FROM page_translation t WHERE t.page_id IN (",
            TRANSLATION_COLUMNS
        ));
        let mut separated = qb.separated(",");
        for id in page_ids {
            separated.push_bind(*id);
        }
        qb.push(") ORDER BY t.page_id, t.locale");

        let rows = qb
            .build()
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to get translations: {}", e)))?;

        for row in rows {
            let translation = translation_from_row(&row);
            let page_id: PageId = row.get("page_id");
            grouped
                .entry(page_id)
                .or_default()
                .insert(translation.locale.clone(), translation);
        }
        Ok(grouped)
    }

    pub async fn delete_for_pages(&self, conn: &mut SqliteConnection, page_ids: &[PageId]) -> AppResult<u64> {
        if page_ids.is_empty() {
            return Ok(0);
        }
        let mut qb = QueryBuilder::<Sqlite>::new("DELETE FROM page_translation WHERE page_id IN (");
        let mut separated = qb.separated(",");
        for id in page_ids {
            separated.push_bind(*id);
        }
        qb.push(")");

        let result = qb
            .build()
            .execute(&mut *conn)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to delete translations: {}", e)))?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database::Database;

    async fn insert_page(conn: &mut SqliteConnection, deleted: bool) -> PageId {
        let deleted_at = if deleted { Some("2024-01-01T00:00:00Z") } else { None };
        sqlx::query("INSERT INTO page (is_locked, created_at, updated_at, deleted_at) VALUES (0, 'now', 'now', ?)")
            .bind(deleted_at)
            .execute(&mut *conn)
            .await
            .unwrap()
            .last_insert_rowid()
    }

    fn translation(locale: &str, permalink: &str) -> Translation {
        Translation {
            permalink: permalink.to_string(),
            title: format!("Title {}", permalink),
            ..Translation::empty(locale)
        }
    }

    #[tokio::test]
    async fn test_get_materializes_empty_translation() {
        let db = Database::new_in_memory().await.unwrap();
        let store = TranslationStore::new();
        let mut conn = db.acquire().await.unwrap();
        let page = insert_page(&mut conn, false).await;

        let t = store.get(&mut conn, page, "fr").await.unwrap();
        assert_eq!(t.locale, "fr");
        assert_eq!(t.page_id, Some(page));
        assert!(!t.has_permalink());
    }

    #[tokio::test]
    async fn test_save_upserts_single_row() {
        let db = Database::new_in_memory().await.unwrap();
        let store = TranslationStore::new();
        let mut conn = db.acquire().await.unwrap();
        let page = insert_page(&mut conn, false).await;

        store.save(&mut conn, page, &translation("en", "about")).await.unwrap();
        store.save(&mut conn, page, &translation("en", "about-us")).await.unwrap();
        store.save(&mut conn, page, &translation("fr", "a-propos")).await.unwrap();

        let all = store.all_for_page(&mut conn, page).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all["en"].permalink, "about-us");
        assert_eq!(all["fr"].permalink, "a-propos");
    }

    #[tokio::test]
    async fn test_save_rejects_invalid_and_duplicate_permalinks() {
        let db = Database::new_in_memory().await.unwrap();
        let store = TranslationStore::new();
        let mut conn = db.acquire().await.unwrap();
        let first = insert_page(&mut conn, false).await;
        let second = insert_page(&mut conn, false).await;

        store.save(&mut conn, first, &translation("en", "about")).await.unwrap();

        let err = store
            .save(&mut conn, second, &translation("en", "about"))
            .await
            .unwrap_err();
        match err {
            AppError::Validation(errors) => assert!(errors.has_field("translation.en.permalink")),
            other => panic!("Expected validation error, got {:?}", other),
        }

        let err = store
            .save(&mut conn, second, &translation("en", "Not Valid!"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        // Same permalink in another locale is fine.
        store.save(&mut conn, second, &translation("fr", "about")).await.unwrap();
        assert!(store.all_for_page(&mut conn, second).await.unwrap().contains_key("fr"));
    }

    #[tokio::test]
    async fn test_deleted_pages_release_their_permalinks() {
        let db = Database::new_in_memory().await.unwrap();
        let store = TranslationStore::new();
        let mut conn = db.acquire().await.unwrap();
        let gone = insert_page(&mut conn, true).await;
        let live = insert_page(&mut conn, false).await;

        sqlx::query("INSERT INTO page_translation (page_id, locale, permalink, title) VALUES (?, 'en', 'about', 'Old')")
            .bind(gone)
            .execute(&mut *conn)
            .await
            .unwrap();

        assert!(!store.permalink_taken(&mut conn, "en", "about", None).await.unwrap());
        store.save(&mut conn, live, &translation("en", "about")).await.unwrap();
        assert!(store.permalink_taken(&mut conn, "en", "about", None).await.unwrap());
        assert!(!store.permalink_taken(&mut conn, "en", "about", Some(live)).await.unwrap());

        assert_eq!(store.delete_for_pages(&mut conn, &[gone, live]).await.unwrap(), 2);
    }
}
