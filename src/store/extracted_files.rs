//! CRUD for the `extracted_files` table - the cleanup pipeline's audit trail.

use chrono::Utc;
use tracing::instrument;

use super::error::StoreError;
use super::models::ExtractedFile;
use super::Store;

impl Store {
    /// Records one path produced by extracting an archive.
    #[instrument(skip(self))]
    pub async fn insert_extracted_file(
        &self,
        download_id: i64,
        file_path: &str,
    ) -> Result<i64, StoreError> {
        let row = sqlx::query("INSERT INTO extracted_files (download_id, file_path) VALUES (?, ?)")
            .bind(download_id)
            .bind(file_path)
            .execute(self.db.pool())
            .await?;

        Ok(row.last_insert_rowid())
    }

    /// Every not-yet-deleted extracted file for a download, in insertion order.
    #[instrument(skip(self))]
    pub async fn list_extracted_files(&self, download_id: i64) -> Result<Vec<ExtractedFile>, StoreError> {
        let rows = sqlx::query_as::<_, ExtractedFile>(
            "SELECT * FROM extracted_files WHERE download_id = ? AND deleted_at IS NULL \
             ORDER BY id ASC",
        )
        .bind(download_id)
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows)
    }

    /// Soft-delete marker for cleanup bookkeeping. No-op if already marked
    /// or the row has vanished.
    #[instrument(skip(self))]
    pub async fn mark_extracted_file_deleted(&self, id: i64) -> Result<(), StoreError> {
        sqlx::query("UPDATE extracted_files SET deleted_at = ? WHERE id = ? AND deleted_at IS NULL")
            .bind(Utc::now())
            .bind(id)
            .execute(self.db.pool())
            .await?;

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::store::downloads::NewDownload;

    async fn store_with_memory_db() -> Store {
        let db = Database::new_in_memory().await.unwrap();
        Store::new(db)
    }

    async fn seed_download(store: &Store) -> i64 {
        store
            .create_download(&NewDownload {
                original_url: "https://host/x".to_string(),
                direct_url: "https://cdn/x".to_string(),
                filename: "a.rar".to_string(),
                directory: "/downloads".to_string(),
                file_size: 0,
                group_id: None,
                is_archive: true,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_list_extracted_files() {
        let store = store_with_memory_db().await;
        let download_id = seed_download(&store).await;

        store.insert_extracted_file(download_id, "/downloads/movie.mkv").await.unwrap();
        store.insert_extracted_file(download_id, "/downloads/movie.nfo").await.unwrap();

        let files = store.list_extracted_files(download_id).await.unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].file_path, "/downloads/movie.mkv");
    }

    #[tokio::test]
    async fn test_mark_extracted_file_deleted_excludes_from_list() {
        let store = store_with_memory_db().await;
        let download_id = seed_download(&store).await;
        let id = store.insert_extracted_file(download_id, "/downloads/movie.nfo").await.unwrap();

        store.mark_extracted_file_deleted(id).await.unwrap();

        let files = store.list_extracted_files(download_id).await.unwrap();
        assert!(files.is_empty());
    }

    #[tokio::test]
    async fn test_mark_extracted_file_deleted_on_missing_row_is_noop() {
        let store = store_with_memory_db().await;
        let result = store.mark_extracted_file_deleted(12345).await;
        assert!(result.is_ok());
    }
}
