//! Counts per-group completions; when all siblings are terminal, hands off
//! to post-processing.

use std::sync::Arc;

use tracing::{info, instrument};

use crate::postprocess::PostProcessor;
use crate::store::{DownloadStatus, Store, StoreError};

/// Idempotent gate into post-processing: two concurrent notifications can
/// both observe "all terminal", but only the first to win the conditional
/// `downloading -> processing` transition spawns the post-processor.
#[derive(Clone)]
pub struct GroupBarrier {
    store: Store,
    post_processor: Arc<PostProcessor>,
}

impl GroupBarrier {
    #[must_use]
    pub fn new(store: Store, post_processor: Arc<PostProcessor>) -> Self {
        Self { store, post_processor }
    }

    /// Called after every successful member completion.
    #[instrument(skip(self), fields(group_id = %group_id))]
    pub async fn notify(&self, group_id: &str) -> Result<(), StoreError> {
        let mut group = self.store.get_group(group_id).await?;
        let members = self.store.list_downloads_by_group(group_id).await?;

        let completed = members.iter().filter(|m| m.status() == DownloadStatus::Completed).count() as i64;
        group.completed_downloads = completed;
        self.store.update_group(&group).await?;

        let all_terminal = members.iter().all(|m| m.status().is_terminal());
        if !all_terminal {
            return Ok(());
        }

        if self.store.try_begin_processing(group_id).await? {
            info!(group_id, "group closed, spawning post-processor");
            let post_processor = Arc::clone(&self.post_processor);
            let group_id = group_id.to_string();
            tokio::spawn(async move {
                post_processor.process(&group_id).await;
            });
        }

        Ok(())
    }
}
