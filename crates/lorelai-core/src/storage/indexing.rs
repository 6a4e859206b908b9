use crate::model::{
    IndexedItem, IndexingRun, IndexingStatus, ItemDetails, ItemStatus, NewItem, Provider,
};
use crate::storage::{conversion_error, now_rfc3339};
use crate::storage::store::Store;
use rusqlite::{params, OptionalExtension, Row};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ItemCounts {
    pub completed: u64,
    pub failed: u64,
    pub skipped: u64,
}

const RUN_COLUMNS: &str = "id, org_id, source, status, error, started_at, finished_at";
const ITEM_COLUMNS: &str =
    "id, run_id, parent_item_id, item_type, external_id, name, status, error";

impl Store {
    pub fn insert_indexing_run(&self, org_id: i64, source: Provider) -> anyhow::Result<i64> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO indexing_runs(org_id, source, status, started_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                org_id,
                source.as_str(),
                IndexingStatus::InProgress.as_str(),
                now_rfc3339()
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_indexing_run(&self, run_id: i64) -> anyhow::Result<Option<IndexingRun>> {
        let conn = self.lock()?;
        let run = conn
            .query_row(
                &format!("SELECT {} FROM indexing_runs WHERE id = ?1", RUN_COLUMNS),
                params![run_id],
                run_from_row,
            )
            .optional()?;
        Ok(run)
    }

    pub fn list_indexing_runs(
        &self,
        org_id: i64,
        source: Option<Provider>,
        limit: u32,
    ) -> anyhow::Result<Vec<IndexingRun>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM indexing_runs
             WHERE org_id = ?1 AND (?2 IS NULL OR source = ?2)
             ORDER BY id DESC LIMIT ?3",
            RUN_COLUMNS
        ))?;
        let rows = stmt
            .query_map(
                params![org_id, source.map(|s| s.as_str()), limit],
                run_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn update_indexing_run(
        &self,
        run_id: i64,
        status: IndexingStatus,
        error: Option<&str>,
    ) -> anyhow::Result<()> {
        let conn = self.lock()?;
        let finished = (status != IndexingStatus::InProgress).then(now_rfc3339);
        conn.execute(
            "UPDATE indexing_runs SET status = ?1, error = ?2, finished_at = ?3 WHERE id = ?4",
            params![status.as_str(), error, finished, run_id],
        )?;
        Ok(())
    }

    pub fn insert_item(
        &self,
        run_id: i64,
        item: &NewItem,
        status: ItemStatus,
    ) -> anyhow::Result<i64> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO indexed_items(run_id, parent_item_id, item_type, external_id, name,
                                       status, error, extracted_text, log, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                run_id,
                item.parent_item_id,
                item.item_type,
                item.external_id,
                item.name,
                status.as_str(),
                item.error,
                item.extracted_text,
                item.log,
                now_rfc3339()
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_item(&self, item_id: i64) -> anyhow::Result<Option<IndexedItem>> {
        let conn = self.lock()?;
        let item = conn
            .query_row(
                &format!("SELECT {} FROM indexed_items WHERE id = ?1", ITEM_COLUMNS),
                params![item_id],
                item_from_row,
            )
            .optional()?;
        Ok(item)
    }

    pub fn list_items(&self, run_id: i64) -> anyhow::Result<Vec<IndexedItem>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM indexed_items WHERE run_id = ?1
             ORDER BY COALESCE(parent_item_id, id), parent_item_id IS NOT NULL, id",
            ITEM_COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![run_id], item_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn item_counts(&self, run_id: i64) -> anyhow::Result<ItemCounts> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT status, COUNT(*) FROM indexed_items WHERE run_id = ?1 GROUP BY status",
        )?;
        let mut rows = stmt.query(params![run_id])?;
        let mut counts = ItemCounts::default();
        while let Some(row) = rows.next()? {
            let status: String = row.get(0)?;
            let n = row.get::<_, i64>(1)? as u64;
            match ItemStatus::parse(&status)? {
                ItemStatus::Completed => counts.completed += n,
                ItemStatus::Failed => counts.failed += n,
                ItemStatus::Skipped => counts.skipped += n,
            }
        }
        Ok(counts)
    }

    /// Returns the owning organisation alongside the diagnostics so callers can
    /// enforce tenant boundaries.
    pub fn item_details(&self, item_id: i64) -> anyhow::Result<Option<(i64, ItemDetails)>> {
        let conn = self.lock()?;
        let found = conn
            .query_row(
                "SELECT r.org_id, i.extracted_text, i.log, i.error
                 FROM indexed_items i JOIN indexing_runs r ON r.id = i.run_id
                 WHERE i.id = ?1",
                params![item_id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        ItemDetails {
                            item_extractedtext: row.get(1)?,
                            item_log: row.get(2)?,
                            item_error: row.get(3)?,
                        },
                    ))
                },
            )
            .optional()?;
        Ok(found)
    }
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<IndexingRun> {
    let source: String = row.get(2)?;
    let source = Provider::parse(&source).map_err(|e| conversion_error(2, e))?;
    let status: String = row.get(3)?;
    Ok(IndexingRun {
        id: row.get(0)?,
        org_id: row.get(1)?,
        source,
        status: IndexingStatus::parse(&status).map_err(|e| conversion_error(3, e))?,
        error: row.get(4)?,
        started_at: row.get(5)?,
        finished_at: row.get(6)?,
    })
}

fn item_from_row(row: &Row<'_>) -> rusqlite::Result<IndexedItem> {
    let status: String = row.get(6)?;
    Ok(IndexedItem {
        id: row.get(0)?,
        run_id: row.get(1)?,
        parent_item_id: row.get(2)?,
        item_type: row.get(3)?,
        external_id: row.get(4)?,
        name: row.get(5)?,
        status: ItemStatus::parse(&status).map_err(|e| conversion_error(6, e))?,
        error: row.get(7)?,
    })
}
