//! CRUD for the `directory_mappings` table.
//!
//! The engine writes one row on every successful submit and never reads
//! this table itself - it exists purely for durability behind the
//! (out-of-scope) directory-suggestion collaborator.

use chrono::Utc;
use tracing::instrument;

use super::error::StoreError;
use super::models::DirectoryMapping;
use super::Store;

impl Store {
    /// Records a hint. Callers pick a pattern (commonly the filename's
    /// extension or host) themselves; this method does no inference.
    #[instrument(skip(self))]
    pub async fn record_directory_mapping(
        &self,
        filename_pattern: &str,
        original_url: &str,
        directory: &str,
    ) -> Result<i64, StoreError> {
        let row = sqlx::query(
            "INSERT INTO directory_mappings (filename_pattern, original_url, directory) \
             VALUES (?, ?, ?)",
        )
        .bind(filename_pattern)
        .bind(original_url)
        .bind(directory)
        .execute(self.db.pool())
        .await?;

        Ok(row.last_insert_rowid())
    }

    /// Bumps `use_count` and `last_used` for an existing mapping.
    #[instrument(skip(self))]
    pub async fn touch_directory_mapping(&self, id: i64) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE directory_mappings SET use_count = use_count + 1, last_used = ? WHERE id = ?",
        )
        .bind(Utc::now())
        .bind(id)
        .execute(self.db.pool())
        .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn list_directory_mappings(&self) -> Result<Vec<DirectoryMapping>, StoreError> {
        let rows =
            sqlx::query_as::<_, DirectoryMapping>("SELECT * FROM directory_mappings ORDER BY id ASC")
                .fetch_all(self.db.pool())
                .await?;

        Ok(rows)
    }
}
