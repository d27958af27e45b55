pub mod azure;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};

use crate::error::ReportResult;
use crate::model::work_item::{WorkItemId, WorkItemRecord};

#[async_trait]
pub trait WorkItemSource: Send + Sync {
    fn name(&self) -> &str;
    /// Identifiers of every Epic, in whatever order the backend returns them.
    async fn list_epic_ids(&self) -> ReportResult<Vec<WorkItemId>>;
    async fn fetch_work_item(&self, id: WorkItemId) -> ReportResult<WorkItemRecord>;
}


/// Fetch the details for `ids` with at most `concurrency` requests in flight.
///
/// A failing ID is logged and skipped. The result follows the order of `ids`,
/// not completion order.
pub async fn fetch_records(
    source: &dyn WorkItemSource,
    ids: &[WorkItemId],
    concurrency: usize,
) -> Vec<WorkItemRecord> {
    let mut fetched: Vec<(usize, WorkItemRecord)> = stream::iter(ids.iter().copied().enumerate())
        .map(move |(idx, id)| async move { (idx, id, source.fetch_work_item(id).await) })
        .buffer_unordered(concurrency.max(1))
        .filter_map(move |(idx, id, result)| async move {
            match result {
                Ok(record) => Some((idx, record)),
                Err(e) => {
                    tracing::warn!(source = source.name(), id = %id, error = %e, "skipping work item");
                    None
                }
            }
        })
        .collect()
        .await;

    fetched.sort_by_key(|(idx, _)| *idx);

    tracing::info!(
        requested = ids.len(),
        fetched = fetched.len(),
        "fetched work item details"
    );
    fetched.into_iter().map(|(_, record)| record).collect()
}
