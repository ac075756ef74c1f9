//! CRUD for the `download_groups` table.

use tracing::instrument;

use super::error::StoreError;
use super::models::DownloadGroup;
use super::Store;

impl Store {
    /// Registers a new group with a caller-supplied opaque id (e.g. a UUID)
    /// and a fixed member count.
    #[instrument(skip(self))]
    pub async fn create_group(&self, id: &str, total_downloads: i64) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO download_groups (id, total_downloads) VALUES (?, ?)")
            .bind(id)
            .bind(total_downloads)
            .execute(self.db.pool())
            .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn get_group(&self, id: &str) -> Result<DownloadGroup, StoreError> {
        sqlx::query_as::<_, DownloadGroup>("SELECT * FROM download_groups WHERE id = ?")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?
            .ok_or_else(|| StoreError::GroupNotFound(id.to_string()))
    }

    /// Writes `completed_downloads` and `status`/`processing_error` back.
    #[instrument(skip(self, group), fields(id = %group.id))]
    pub async fn update_group(&self, group: &DownloadGroup) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE download_groups SET completed_downloads = ?, status = ?, processing_error = ? \
             WHERE id = ?",
        )
        .bind(group.completed_downloads)
        .bind(group.status_str.as_str())
        .bind(&group.processing_error)
        .bind(&group.id)
        .execute(self.db.pool())
        .await?;

        Ok(())
    }

    /// Conditional transition `downloading -> processing`, used by the group
    /// barrier so that two concurrent notifications racing to spawn the
    /// post-processor only ever let one through. Returns `true` if this call
    /// won the race.
    #[instrument(skip(self))]
    pub async fn try_begin_processing(&self, id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE download_groups SET status = 'processing' \
             WHERE id = ? AND status = 'downloading'",
        )
        .bind(id)
        .execute(self.db.pool())
        .await?;

        Ok(result.rows_affected() == 1)
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

    #[tokio::test]
    async fn test_create_and_get_group_roundtrip() {
        let store = store_with_memory_db().await;
        store.create_group("g1", 3).await.unwrap();

        let group = store.get_group("g1").await.unwrap();
        assert_eq!(group.total_downloads, 3);
        assert_eq!(group.completed_downloads, 0);
        assert_eq!(group.status(), crate::store::models::GroupStatus::Downloading);
    }

    #[tokio::test]
    async fn test_get_group_not_found() {
        let store = store_with_memory_db().await;
        assert!(matches!(store.get_group("missing").await, Err(StoreError::GroupNotFound(_))));
    }

    #[tokio::test]
    async fn test_update_group_persists_completed_count() {
        let store = store_with_memory_db().await;
        store.create_group("g2", 2).await.unwrap();
        let mut group = store.get_group("g2").await.unwrap();
        group.completed_downloads = 2;
        store.update_group(&group).await.unwrap();

        let reloaded = store.get_group("g2").await.unwrap();
        assert_eq!(reloaded.completed_downloads, 2);
    }

    #[tokio::test]
    async fn test_try_begin_processing_is_idempotent() {
        let store = store_with_memory_db().await;
        store.create_group("g3", 1).await.unwrap();

        let first = store.try_begin_processing("g3").await.unwrap();
        let second = store.try_begin_processing("g3").await.unwrap();

        assert!(first, "first caller should win the race");
        assert!(!second, "second caller must observe it already transitioned");
    }
}
