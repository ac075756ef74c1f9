//! CRUD for the `downloads` table.

use chrono::{DateTime, Utc};
use tracing::instrument;

use super::error::StoreError;
use super::models::Download;
use super::Store;

/// Fields accepted when registering a new download. Everything else
/// (timestamps, status, counters) takes its schema default.
#[derive(Debug, Clone)]
pub struct NewDownload {
    pub original_url: String,
    pub direct_url: String,
    pub filename: String,
    pub directory: String,
    pub file_size: i64,
    pub group_id: Option<String>,
    pub is_archive: bool,
}

/// Order for [`Store::search_downloads`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    CreatedAtDesc,
    CreatedAtAsc,
}

impl Store {
    /// Inserts a new row in `pending` and returns the assigned id.
    #[instrument(skip(self, new), fields(filename = %new.filename))]
    pub async fn create_download(&self, new: &NewDownload) -> Result<i64, StoreError> {
        let row = sqlx::query(
            "INSERT INTO downloads \
                (original_url, direct_url, filename, directory, file_size, group_id, is_archive) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&new.original_url)
        .bind(&new.direct_url)
        .bind(&new.filename)
        .bind(&new.directory)
        .bind(new.file_size)
        .bind(&new.group_id)
        .bind(new.is_archive)
        .execute(self.db.pool())
        .await?;

        Ok(row.last_insert_rowid())
    }

    /// Fetches a single row. `StoreError::NotFound` is a distinct kind from
    /// `StoreError::Database` so callers (the retry controller in
    /// particular) can tell "abandon silently" from "transient failure".
    #[instrument(skip(self))]
    pub async fn get_download(&self, id: i64) -> Result<Download, StoreError> {
        sqlx::query_as::<_, Download>("SELECT * FROM downloads WHERE id = ? AND deleted_at IS NULL")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?
            .ok_or(StoreError::NotFound(id))
    }

    /// Writes every mutable column back. A row that no longer exists (the
    /// user deleted it mid-transfer) is a no-op, not an error - this is what
    /// lets the retry controller's delete-race tolerance work without every
    /// caller special-casing "row vanished".
    #[instrument(skip(self, download), fields(id = download.id))]
    pub async fn update_download(&self, download: &Download) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE downloads SET \
                original_url = ?, direct_url = ?, filename = ?, directory = ?, \
                file_size = ?, downloaded_bytes = ?, progress_percent = ?, speed = ?, \
                retry_count = ?, error_message = ?, group_id = ?, is_archive = ?, \
                extracted_files_json = ?, updated_at = ?, started_at = ?, completed_at = ?, \
                paused_at = ?, total_paused_seconds = ?, status = ?, deleted_at = ? \
             WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(&download.original_url)
        .bind(&download.direct_url)
        .bind(&download.filename)
        .bind(&download.directory)
        .bind(download.file_size)
        .bind(download.downloaded_bytes)
        .bind(download.progress_percent)
        .bind(download.speed)
        .bind(download.retry_count)
        .bind(&download.error_message)
        .bind(&download.group_id)
        .bind(download.is_archive)
        .bind(&download.extracted_files_json)
        .bind(Utc::now())
        .bind(download.started_at)
        .bind(download.completed_at)
        .bind(download.paused_at)
        .bind(download.total_paused_seconds)
        .bind(download.status_str.as_str())
        .bind(download.deleted_at)
        .execute(self.db.pool())
        .await?;

        Ok(())
    }

    /// History view, newest first, stable ordering for equal timestamps.
    #[instrument(skip(self))]
    pub async fn list_downloads_newest_first(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Download>, StoreError> {
        let rows = sqlx::query_as::<_, Download>(
            "SELECT * FROM downloads WHERE deleted_at IS NULL \
             ORDER BY created_at DESC, id ASC LIMIT ? OFFSET ?",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows)
    }

    /// All members of a group, ordered oldest-first so batch position is stable.
    #[instrument(skip(self))]
    pub async fn list_downloads_by_group(&self, group_id: &str) -> Result<Vec<Download>, StoreError> {
        let rows = sqlx::query_as::<_, Download>(
            "SELECT * FROM downloads WHERE group_id = ? AND deleted_at IS NULL \
             ORDER BY created_at ASC, id ASC",
        )
        .bind(group_id)
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows)
    }

    /// Filename/URL substring search restricted to a status set, deterministic order.
    #[instrument(skip(self, statuses))]
    pub async fn search_downloads(
        &self,
        term: &str,
        statuses: &[&str],
        order: SortOrder,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Download>, StoreError> {
        let like = format!("%{term}%");
        let order_clause = match order {
            SortOrder::CreatedAtDesc => "created_at DESC, id ASC",
            SortOrder::CreatedAtAsc => "created_at ASC, id ASC",
        };

        if statuses.is_empty() {
            let sql = format!(
                "SELECT * FROM downloads WHERE deleted_at IS NULL \
                 AND (filename LIKE ? OR original_url LIKE ?) \
                 ORDER BY {order_clause} LIMIT ? OFFSET ?"
            );
            let rows = sqlx::query_as::<_, Download>(&sql)
                .bind(&like)
                .bind(&like)
                .bind(limit)
                .bind(offset)
                .fetch_all(self.db.pool())
                .await?;
            return Ok(rows);
        }

        let placeholders = statuses.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
        let sql = format!(
            "SELECT * FROM downloads WHERE deleted_at IS NULL \
             AND (filename LIKE ? OR original_url LIKE ?) \
             AND status IN ({placeholders}) \
             ORDER BY {order_clause} LIMIT ? OFFSET ?"
        );
        let mut query = sqlx::query_as::<_, Download>(&sql).bind(&like).bind(&like);
        for status in statuses {
            query = query.bind(*status);
        }
        let rows = query.bind(limit).bind(offset).fetch_all(self.db.pool()).await?;
        Ok(rows)
    }

    /// Soft-deletes a row. No-op if already gone.
    #[instrument(skip(self))]
    pub async fn delete_download(&self, id: i64) -> Result<(), StoreError> {
        sqlx::query("UPDATE downloads SET deleted_at = ? WHERE id = ? AND deleted_at IS NULL")
            .bind(Utc::now())
            .bind(id)
            .execute(self.db.pool())
            .await?;

        Ok(())
    }

    /// Soft-deletes every terminal (completed/failed) row older than `before`.
    /// Non-terminal rows are never touched regardless of age.
    #[instrument(skip(self))]
    pub async fn delete_downloads_older_than(
        &self,
        before: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE downloads SET deleted_at = ? \
             WHERE deleted_at IS NULL AND created_at < ? \
             AND status IN ('completed', 'failed')",
        )
        .bind(Utc::now())
        .bind(before)
        .execute(self.db.pool())
        .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::db::Database;

    async fn store_with_memory_db() -> Store {
        let db = Database::new_in_memory().await.unwrap();
        Store::new(db)
    }

    fn new_download(filename: &str) -> NewDownload {
        NewDownload {
            original_url: "https://host/x".to_string(),
            direct_url: "https://cdn/x".to_string(),
            filename: filename.to_string(),
            directory: "/downloads".to_string(),
            file_size: 0,
            group_id: None,
            is_archive: false,
        }
    }

    #[tokio::test]
    async fn test_create_and_get_download_roundtrip() {
        let store = store_with_memory_db().await;
        let id = store.create_download(&new_download("a.bin")).await.unwrap();

        let row = store.get_download(id).await.unwrap();
        assert_eq!(row.filename, "a.bin");
        assert_eq!(row.status(), crate::store::models::DownloadStatus::Pending);
        assert_eq!(row.downloaded_bytes, 0);
    }

    #[tokio::test]
    async fn test_get_download_not_found() {
        let store = store_with_memory_db().await;
        let err = store.get_download(999).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(999)));
    }

    #[tokio::test]
    async fn test_update_download_persists_mutable_columns() {
        let store = store_with_memory_db().await;
        let id = store.create_download(&new_download("b.bin")).await.unwrap();
        let mut row = store.get_download(id).await.unwrap();

        row.downloaded_bytes = 1024;
        row.progress_percent = 50.0;
        row.status_str = "downloading".to_string();
        store.update_download(&row).await.unwrap();

        let reloaded = store.get_download(id).await.unwrap();
        assert_eq!(reloaded.downloaded_bytes, 1024);
        assert_eq!(reloaded.status(), crate::store::models::DownloadStatus::Downloading);
    }

    #[tokio::test]
    async fn test_update_download_on_missing_row_is_noop_not_error() {
        let store = store_with_memory_db().await;
        let id = store.create_download(&new_download("c.bin")).await.unwrap();
        let mut row = store.get_download(id).await.unwrap();
        store.delete_download(id).await.unwrap();

        row.downloaded_bytes = 42;
        row.deleted_at = None;
        let result = store.update_download(&row).await;
        assert!(result.is_ok());

        // the row must stay soft-deleted, not get resurrected by the stale
        // in-memory copy's `deleted_at: None`
        let after = store.get_download(id).await;
        assert!(matches!(after, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_list_downloads_newest_first_orders_deterministically() {
        let store = store_with_memory_db().await;
        let first = store.create_download(&new_download("first.bin")).await.unwrap();
        let second = store.create_download(&new_download("second.bin")).await.unwrap();

        let rows = store.list_downloads_newest_first(10, 0).await.unwrap();
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        assert!(ids.contains(&first) && ids.contains(&second));
    }

    #[tokio::test]
    async fn test_list_downloads_by_group_filters_and_orders() {
        let store = store_with_memory_db().await;
        let mut a = new_download("a.rar");
        a.group_id = Some("g1".to_string());
        let mut b = new_download("b.rar");
        b.group_id = Some("g1".to_string());
        let solo = new_download("solo.bin");

        let id_a = store.create_download(&a).await.unwrap();
        let id_b = store.create_download(&b).await.unwrap();
        store.create_download(&solo).await.unwrap();

        let members = store.list_downloads_by_group("g1").await.unwrap();
        assert_eq!(members.len(), 2);
        let ids: Vec<i64> = members.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![id_a, id_b]);
    }

    #[tokio::test]
    async fn test_delete_download_is_soft_and_idempotent() {
        let store = store_with_memory_db().await;
        let id = store.create_download(&new_download("d.bin")).await.unwrap();

        store.delete_download(id).await.unwrap();
        assert!(matches!(store.get_download(id).await, Err(StoreError::NotFound(_))));

        // deleting again must not error
        store.delete_download(id).await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_downloads_older_than_only_touches_terminal_rows() {
        let store = store_with_memory_db().await;
        let pending_id = store.create_download(&new_download("still-pending.bin")).await.unwrap();
        let completed_id = store.create_download(&new_download("done.bin")).await.unwrap();

        let mut completed = store.get_download(completed_id).await.unwrap();
        completed.status_str = "completed".to_string();
        store.update_download(&completed).await.unwrap();

        let affected = store
            .delete_downloads_older_than(Utc::now() + chrono::Duration::seconds(60))
            .await
            .unwrap();

        assert_eq!(affected, 1);
        assert!(store.get_download(pending_id).await.is_ok());
        assert!(matches!(store.get_download(completed_id).await, Err(StoreError::NotFound(_))));
    }
}
