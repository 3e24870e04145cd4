// Closure Tree Index - ancestor/descendant/depth edges for the page forest
//
// Every node owns a self-edge (depth 0). A node N under parent P carries
// every ancestor edge of P with depth + 1 plus the direct edge (P, N, 1).
// Callers pass the connection to run on, so tree changes join the page-level
// transaction; each rewrite also opens its own savepoint.

use sqlx::{Connection, Row, SqliteConnection};
use tracing::{debug, instrument};

use crate::error::{AppError, AppResult, TreeError};
use crate::models::PageId;

/// One row of the closure table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClosureEdge {
    pub ancestor_id: PageId,
    pub descendant_id: PageId,
    pub depth: i64,
}

/// Removes every edge linking a member of `node`'s subtree to a node above
/// `node`. Edges inside the subtree are kept.
const DETACH_SUBTREE: &str = r#"
    DELETE FROM page_closure
    WHERE descendant_id IN (SELECT descendant_id FROM page_closure WHERE ancestor_id = ?1)
      AND ancestor_id NOT IN (SELECT descendant_id FROM page_closure WHERE ancestor_id = ?1)
"#;

/// Cross product of the new parent's ancestor chain (itself included) with
/// `node`'s subtree (itself included).
const ATTACH_SUBTREE: &str = r#"
    INSERT INTO page_closure (ancestor_id, descendant_id, depth)
    SELECT supertree.ancestor_id, subtree.descendant_id, supertree.depth + subtree.depth + 1
    FROM page_closure AS supertree
    CROSS JOIN page_closure AS subtree
    WHERE supertree.descendant_id = ?1
      AND subtree.ancestor_id = ?2
"#;

#[derive(Debug, Clone, Copy, Default)]
pub struct ClosureTreeIndex;

impl ClosureTreeIndex {
    pub fn new() -> Self {
        Self
    }

    /// Register a node as a fresh root (self-edge only). No-op if present.
    pub async fn insert_node(&self, conn: &mut SqliteConnection, node: PageId) -> AppResult<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO page_closure (ancestor_id, descendant_id, depth) VALUES (?, ?, 0)",
        )
        .bind(node)
        .bind(node)
        .execute(&mut *conn)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to insert tree node {}: {}", node, e)))?;
        Ok(())
    }

    pub async fn contains(&self, conn: &mut SqliteConnection, node: PageId) -> AppResult<bool> {
        let row = sqlx::query(
            "SELECT 1 FROM page_closure WHERE ancestor_id = ? AND descendant_id = ? AND depth = 0",
        )
        .bind(node)
        .bind(node)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to look up tree node {}: {}", node, e)))?;
        Ok(row.is_some())
    }

    async fn require_node(&self, conn: &mut SqliteConnection, node: PageId) -> AppResult<()> {
        if self.contains(conn, node).await? {
            Ok(())
        } else {
            Err(TreeError::NodeNotFound(node).into())
        }
    }

    /// Whether `descendant` sits in the subtree rooted at `ancestor`
    /// (a node is in its own subtree).
    pub async fn is_descendant(
        &self,
        conn: &mut SqliteConnection,
        ancestor: PageId,
        descendant: PageId,
    ) -> AppResult<bool> {
        let row = sqlx::query(
            "SELECT 1 FROM page_closure WHERE ancestor_id = ? AND descendant_id = ?",
        )
        .bind(ancestor)
        .bind(descendant)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to check ancestry: {}", e)))?;
        Ok(row.is_some())
    }

    /// Detach `node` (with its subtree) from any parent.
    #[instrument(skip(self, conn))]
    pub async fn make_root(&self, conn: &mut SqliteConnection, node: PageId) -> AppResult<()> {
        self.require_node(conn, node).await?;

        let mut tx = conn
            .begin()
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to open savepoint: {}", e)))?;

        let removed = sqlx::query(DETACH_SUBTREE)
            .bind(node)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to detach node {}: {}", node, e)))?
            .rows_affected();

        tx.commit()
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to release savepoint: {}", e)))?;

        debug!("Made node {} a root, removed {} ancestor edges", node, removed);
        Ok(())
    }

    /// Re-attach `node` and its whole subtree under `parent`.
    ///
    /// Fails with [`TreeError::CycleDetected`] when `parent` is `node` or one
    /// of its descendants; the edge set is left untouched in that case.
    #[instrument(skip(self, conn))]
    pub async fn move_as_child_of(
        &self,
        conn: &mut SqliteConnection,
        node: PageId,
        parent: PageId,
    ) -> AppResult<()> {
        if node == parent {
            return Err(TreeError::CycleDetected { node, parent }.into());
        }
        self.require_node(conn, node).await?;
        self.require_node(conn, parent).await?;
        if self.is_descendant(conn, node, parent).await? {
            return Err(TreeError::CycleDetected { node, parent }.into());
        }

        let mut tx = conn
            .begin()
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to open savepoint: {}", e)))?;

        sqlx::query(DETACH_SUBTREE)
            .bind(node)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to detach node {}: {}", node, e)))?;

        let added = sqlx::query(ATTACH_SUBTREE)
            .bind(parent)
            .bind(node)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!(
                    "Failed to attach node {} under {}: {}",
                    node, parent, e
                ))
            })?
            .rows_affected();

        tx.commit()
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to release savepoint: {}", e)))?;

        debug!("Moved node {} under {}, wrote {} edges", node, parent, added);
        Ok(())
    }

    /// Ancestors of `node`, root first, excluding `node` itself.
    pub async fn ancestors(&self, conn: &mut SqliteConnection, node: PageId) -> AppResult<Vec<PageId>> {
        let rows = sqlx::query(
            "SELECT ancestor_id FROM page_closure WHERE descendant_id = ? AND depth > 0 ORDER BY depth DESC",
        )
        .bind(node)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to get ancestors of {}: {}", node, e)))?;

        Ok(rows.into_iter().map(|row| row.get("ancestor_id")).collect())
    }

    /// All nodes below `node`, nearest first. Siblings are unordered beyond id.
    pub async fn descendants(&self, conn: &mut SqliteConnection, node: PageId) -> AppResult<Vec<PageId>> {
        let rows = sqlx::query(
            "SELECT descendant_id FROM page_closure WHERE ancestor_id = ? AND depth > 0 ORDER BY depth, descendant_id",
        )
        .bind(node)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to get descendants of {}: {}", node, e)))?;

        Ok(rows.into_iter().map(|row| row.get("descendant_id")).collect())
    }

    pub async fn children(&self, conn: &mut SqliteConnection, node: PageId) -> AppResult<Vec<PageId>> {
        let rows = sqlx::query(
            "SELECT descendant_id FROM page_closure WHERE ancestor_id = ? AND depth = 1 ORDER BY descendant_id",
        )
        .bind(node)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to get children of {}: {}", node, e)))?;

        Ok(rows.into_iter().map(|row| row.get("descendant_id")).collect())
    }

    pub async fn parent(&self, conn: &mut SqliteConnection, node: PageId) -> AppResult<Option<PageId>> {
        let row = sqlx::query(
            "SELECT ancestor_id FROM page_closure WHERE descendant_id = ? AND depth = 1",
        )
        .bind(node)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to get parent of {}: {}", node, e)))?;

        Ok(row.map(|row| row.get("ancestor_id")))
    }

    /// Distance from the root; roots have depth 0.
    pub async fn depth(&self, conn: &mut SqliteConnection, node: PageId) -> AppResult<i64> {
        let row = sqlx::query(
            "SELECT COALESCE(MAX(depth), 0) AS depth FROM page_closure WHERE descendant_id = ?",
        )
        .bind(node)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to get depth of {}: {}", node, e)))?;

        Ok(row.get("depth"))
    }

    /// Every edge touching `node`, as ancestor or descendant.
    pub async fn edges_of(&self, conn: &mut SqliteConnection, node: PageId) -> AppResult<Vec<ClosureEdge>> {
        let rows = sqlx::query(
            "SELECT ancestor_id, descendant_id, depth FROM page_closure WHERE ancestor_id = ?1 OR descendant_id = ?1 ORDER BY ancestor_id, descendant_id",
        )
        .bind(node)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to get edges of {}: {}", node, e)))?;

        Ok(rows
            .into_iter()
            .map(|row| ClosureEdge {
                ancestor_id: row.get("ancestor_id"),
                descendant_id: row.get("descendant_id"),
                depth: row.get("depth"),
            })
            .collect())
    }

    /// Remove `node`, its descendants and every edge they appear in.
    /// Returns the removed node ids, `node` first.
    #[instrument(skip(self, conn))]
    pub async fn delete_subtree(&self, conn: &mut SqliteConnection, node: PageId) -> AppResult<Vec<PageId>> {
        let mut members = vec![node];
        members.extend(self.descendants(conn, node).await?);

        let mut tx = conn
            .begin()
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to open savepoint: {}", e)))?;

        // Any edge where a member is the ancestor also has a member as the
        // descendant, so filtering on descendants covers both sides.
        sqlx::query(
            r#"
            DELETE FROM page_closure
            WHERE descendant_id IN (SELECT descendant_id FROM page_closure WHERE ancestor_id = ?1)
            "#,
        )
        .bind(node)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to delete subtree of {}: {}", node, e)))?;

        tx.commit()
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to release savepoint: {}", e)))?;

        debug!("Deleted subtree of {} ({} nodes)", node, members.len());
        Ok(members)
    }
}
