use crate::errors::LorelaiError;
use crate::model::{
    IndexedItem, IndexingRun, IndexingStatus, ItemDetails, ItemStatus, NewItem, Provider,
};
use crate::storage::indexing::ItemCounts;
use crate::storage::Store;
use serde::Serialize;

/// A run together with its items, as the history view renders it.
#[derive(Debug, Clone, Serialize)]
pub struct RunWithItems {
    #[serde(flatten)]
    pub run: IndexingRun,
    pub items: Vec<IndexedItem>,
}

/// Final status of a run given how its items ended.
pub fn aggregate_status(counts: &ItemCounts) -> IndexingStatus {
    let succeeded = counts.completed + counts.skipped;
    match (succeeded, counts.failed) {
        (_, 0) => IndexingStatus::Completed,
        (0, _) => IndexingStatus::Failed,
        _ => IndexingStatus::CompletedWithErrors,
    }
}

#[derive(Clone)]
pub struct IndexingService {
    store: Store,
}

impl IndexingService {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn start_run(&self, org_id: i64, source: Provider) -> anyhow::Result<IndexingRun> {
        if self.store.get_organisation(org_id)?.is_none() {
            return Err(LorelaiError::not_found(format!("organisation {}", org_id)).into());
        }
        let id = self.store.insert_indexing_run(org_id, source)?;
        tracing::info!(event = "indexing_run_started", run_id = id, org_id, source = %source);
        self.store
            .get_indexing_run(id)?
            .ok_or_else(|| LorelaiError::not_found(format!("indexing run {}", id)).into())
    }

    /// Records one item. A parent must belong to the same run and must not
    /// itself have a parent.
    pub fn record_item(&self, run_id: i64, item: &NewItem) -> anyhow::Result<IndexedItem> {
        let run = self
            .store
            .get_indexing_run(run_id)?
            .ok_or_else(|| LorelaiError::not_found(format!("indexing run {}", run_id)))?;
        if run.status != IndexingStatus::InProgress {
            return Err(LorelaiError::validation(format!(
                "indexing run {} is already {}",
                run_id,
                run.status.as_str()
            ))
            .into());
        }
        if item.item_type.trim().is_empty() || item.external_id.trim().is_empty() {
            return Err(
                LorelaiError::validation("item_type and external_id must not be empty").into(),
            );
        }

        if let Some(parent_id) = item.parent_item_id {
            let parent = self.store.get_item(parent_id)?.ok_or_else(|| {
                LorelaiError::validation(format!("parent item {} does not exist", parent_id))
            })?;
            if parent.run_id != run_id {
                return Err(LorelaiError::validation(format!(
                    "parent item {} belongs to another run",
                    parent_id
                ))
                .into());
            }
            if parent.parent_item_id.is_some() {
                return Err(LorelaiError::validation(format!(
                    "parent item {} is itself a child; items nest one level deep",
                    parent_id
                ))
                .into());
            }
        }

        let status = item.status.unwrap_or(if item.error.is_some() {
            ItemStatus::Failed
        } else {
            ItemStatus::Completed
        });
        let id = self.store.insert_item(run_id, item, status)?;
        if status == ItemStatus::Failed {
            tracing::debug!(event = "indexed_item_failed", run_id, item_id = id);
        }
        self.store
            .get_item(id)?
            .ok_or_else(|| LorelaiError::not_found(format!("item {}", id)).into())
    }

    /// Closes the run. `error` marks the whole run failed regardless of items.
    pub fn finish_run(&self, run_id: i64, error: Option<&str>) -> anyhow::Result<IndexingRun> {
        if self.store.get_indexing_run(run_id)?.is_none() {
            return Err(LorelaiError::not_found(format!("indexing run {}", run_id)).into());
        }
        let counts = self.store.item_counts(run_id)?;
        let status = match error {
            Some(_) => IndexingStatus::Failed,
            None => aggregate_status(&counts),
        };
        self.store.update_indexing_run(run_id, status, error)?;
        tracing::info!(
            event = "indexing_run_finished",
            run_id,
            status = status.as_str(),
            completed = counts.completed,
            failed = counts.failed,
            skipped = counts.skipped
        );
        self.store
            .get_indexing_run(run_id)?
            .ok_or_else(|| LorelaiError::not_found(format!("indexing run {}", run_id)).into())
    }

    pub fn list_runs(
        &self,
        org_id: i64,
        source: Option<Provider>,
        limit: u32,
    ) -> anyhow::Result<Vec<IndexingRun>> {
        self.store.list_indexing_runs(org_id, source, limit)
    }

    pub fn list_runs_with_items(
        &self,
        org_id: i64,
        source: Option<Provider>,
        limit: u32,
    ) -> anyhow::Result<Vec<RunWithItems>> {
        self.list_runs(org_id, source, limit)?
            .into_iter()
            .map(|run| {
                let items = self.store.list_items(run.id)?;
                Ok(RunWithItems { run, items })
            })
            .collect()
    }

    /// Items of a run owned by `org_id`; runs of other tenants look absent.
    pub fn list_items(&self, org_id: i64, run_id: i64) -> anyhow::Result<Vec<IndexedItem>> {
        match self.store.get_indexing_run(run_id)? {
            Some(run) if run.org_id == org_id => self.store.list_items(run_id),
            _ => Err(LorelaiError::not_found(format!("indexing run {}", run_id)).into()),
        }
    }

    pub fn item_details(&self, org_id: i64, item_id: i64) -> anyhow::Result<ItemDetails> {
        match self.store.item_details(item_id)? {
            Some((owner, details)) if owner == org_id => Ok(details),
            _ => Err(LorelaiError::not_found(format!("item {}", item_id)).into()),
        }
    }
}
