//! SQLite-backed store of count rows and their sync flags.
//!
//! Every public operation takes the connection lock once and runs inside a
//! single statement or transaction, so a failed operation leaves the flags
//! exactly as they were.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::counter::CountEvent;
use crate::error::{StoreError, StoreResult};
use crate::store::models::{ClaimedBatch, HumanResult, ResultRow, TrafficResult};
use crate::store::schema;

const HUMAN_COLUMNS: &str = "id, from_zone, to_zone, gender, age, timestamp_ms, \
    is_synced, is_processing, created_at_ms, last_updated_ms";
const TRAFFIC_COLUMNS: &str = "id, from_zone, to_zone, vehicle_type, timestamp_ms, \
    is_synced, is_processing, created_at_ms, last_updated_ms";

const PENDING: &str = "is_synced = 0 AND is_processing = 0 AND created_at_ms <= ?1";

pub struct LocalStore {
    conn: Mutex<Connection>,
}

impl LocalStore {
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        conn.busy_timeout(Duration::from_secs(5))?;
        schema::migrate(&conn)?;
        info!(path = %path.display(), journal_mode = %mode, "Local store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        schema::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    pub fn insert_human(&self, row: &HumanResult) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute(
            &format!("INSERT INTO human_results ({HUMAN_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"),
            params![
                row.id.to_string(),
                row.from_zone,
                row.to_zone,
                row.gender,
                row.age,
                row.timestamp.timestamp_millis(),
                row.is_synced,
                row.is_processing,
                row.created_at.timestamp_millis(),
                row.last_updated.timestamp_millis(),
            ],
        )?;
        Ok(())
    }

    pub fn insert_traffic(&self, row: &TrafficResult) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute(
            &format!("INSERT INTO traffic_results ({TRAFFIC_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"),
            params![
                row.id.to_string(),
                row.from_zone,
                row.to_zone,
                row.vehicle_type,
                row.timestamp.timestamp_millis(),
                row.is_synced,
                row.is_processing,
                row.created_at.timestamp_millis(),
                row.last_updated.timestamp_millis(),
            ],
        )?;
        Ok(())
    }

    /// Persist a finalized count as a human or traffic row.
    pub fn insert_count_event(&self, event: &CountEvent, now: DateTime<Utc>) -> StoreResult<ResultRow> {
        let row = ResultRow::from_event(event, now)?;
        match &row {
            ResultRow::Human(r) => self.insert_human(r)?,
            ResultRow::Traffic(r) => self.insert_traffic(r)?,
        }
        debug!(id = %row.id(), route = %event.route, label = %event.class_label, "Count stored");
        Ok(row)
    }

    /// Rows that are unsynced, unclaimed and older than `grace`.
    pub fn pending_count(&self, now: DateTime<Utc>, grace: TimeDelta) -> StoreResult<usize> {
        let cutoff = (now - grace).timestamp_millis();
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            &format!(
                "SELECT (SELECT COUNT(*) FROM human_results WHERE {PENDING}) \
                 + (SELECT COUNT(*) FROM traffic_results WHERE {PENDING})"
            ),
            params![cutoff],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    pub fn unsynced_count(&self) -> StoreResult<usize> {
        self.count_where("is_synced = 0")
    }

    pub fn processing_count(&self) -> StoreResult<usize> {
        self.count_where("is_processing = 1")
    }

    fn count_where(&self, predicate: &str) -> StoreResult<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            &format!(
                "SELECT (SELECT COUNT(*) FROM human_results WHERE {predicate}) \
                 + (SELECT COUNT(*) FROM traffic_results WHERE {predicate})"
            ),
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Claim up to `limit` eligible rows, oldest first, in one transaction.
    ///
    /// Only rows created at least `grace` before `now` are eligible. Claimed
    /// rows get `is_processing = 1`; on any error nothing is claimed.
    pub fn claim_batch(
        &self,
        limit: usize,
        now: DateTime<Utc>,
        grace: TimeDelta,
    ) -> StoreResult<ClaimedBatch> {
        let cutoff = (now - grace).timestamp_millis();
        let now_ms = now.timestamp_millis();
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let picked: Vec<(String, String)> = {
            let mut stmt = tx.prepare(&format!(
                "SELECT kind, id FROM ( \
                    SELECT 'human' AS kind, id, timestamp_ms FROM human_results WHERE {PENDING} \
                    UNION ALL \
                    SELECT 'traffic' AS kind, id, timestamp_ms FROM traffic_results WHERE {PENDING} \
                 ) ORDER BY timestamp_ms ASC, id ASC LIMIT ?2"
            ))?;
            let rows = stmt.query_map(params![cutoff, limit as i64], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?;
            rows.collect::<Result<_, _>>()?
        };

        let mut batch = ClaimedBatch::default();
        for (kind, id) in picked {
            if kind == "human" {
                tx.execute(
                    "UPDATE human_results SET is_processing = 1, last_updated_ms = ?1 WHERE id = ?2",
                    params![now_ms, id],
                )?;
                let row = tx.query_row(
                    &format!("SELECT {HUMAN_COLUMNS} FROM human_results WHERE id = ?1"),
                    [&id],
                    human_from_row,
                )?;
                batch.human.push(row);
            } else {
                tx.execute(
                    "UPDATE traffic_results SET is_processing = 1, last_updated_ms = ?1 WHERE id = ?2",
                    params![now_ms, id],
                )?;
                let row = tx.query_row(
                    &format!("SELECT {TRAFFIC_COLUMNS} FROM traffic_results WHERE id = ?1"),
                    [&id],
                    traffic_from_row,
                )?;
                batch.traffic.push(row);
            }
        }

        tx.commit()?;
        Ok(batch)
    }

    /// Flip a claimed batch to synced.
    pub fn mark_synced(&self, batch: &ClaimedBatch, now: DateTime<Utc>) -> StoreResult<usize> {
        self.update_batch(
            batch,
            "SET is_synced = 1, is_processing = 0, last_updated_ms = ?1 WHERE id = ?2",
            now,
        )
    }

    /// Release a claimed batch without syncing it.
    pub fn release(&self, batch: &ClaimedBatch, now: DateTime<Utc>) -> StoreResult<usize> {
        self.update_batch(
            batch,
            "SET is_processing = 0, last_updated_ms = ?1 WHERE id = ?2 AND is_processing = 1",
            now,
        )
    }

    fn update_batch(&self, batch: &ClaimedBatch, assignment: &str, now: DateTime<Utc>) -> StoreResult<usize> {
        let now_ms = now.timestamp_millis();
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut changed = 0;
        for id in batch.human_ids() {
            changed += tx.execute(
                &format!("UPDATE human_results {assignment}"),
                params![now_ms, id.to_string()],
            )?;
        }
        for id in batch.traffic_ids() {
            changed += tx.execute(
                &format!("UPDATE traffic_results {assignment}"),
                params![now_ms, id.to_string()],
            )?;
        }
        tx.commit()?;
        Ok(changed)
    }

    /// Release claims held longer than `max_age`.
    pub fn release_stale(&self, now: DateTime<Utc>, max_age: TimeDelta) -> StoreResult<usize> {
        let cutoff = (now - max_age).timestamp_millis();
        let now_ms = now.timestamp_millis();
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut released = 0;
        for table in ["human_results", "traffic_results"] {
            released += tx.execute(
                &format!(
                    "UPDATE {table} SET is_processing = 0, last_updated_ms = ?1 \
                     WHERE is_processing = 1 AND last_updated_ms < ?2"
                ),
                params![now_ms, cutoff],
            )?;
        }
        tx.commit()?;
        Ok(released)
    }

    /// Delete synced rows whose timestamp is older than `retention`.
    pub fn purge_synced(&self, now: DateTime<Utc>, retention: TimeDelta) -> StoreResult<usize> {
        let cutoff = (now - retention).timestamp_millis();
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut purged = 0;
        for table in ["human_results", "traffic_results"] {
            purged += tx.execute(
                &format!("DELETE FROM {table} WHERE is_synced = 1 AND timestamp_ms < ?1"),
                params![cutoff],
            )?;
        }
        tx.commit()?;
        Ok(purged)
    }

    pub fn get_human(&self, id: Uuid) -> StoreResult<Option<HumanResult>> {
        let conn = self.lock()?;
        Ok(conn
            .query_row(
                &format!("SELECT {HUMAN_COLUMNS} FROM human_results WHERE id = ?1"),
                [id.to_string()],
                human_from_row,
            )
            .optional()?)
    }

    pub fn get_traffic(&self, id: Uuid) -> StoreResult<Option<TrafficResult>> {
        let conn = self.lock()?;
        Ok(conn
            .query_row(
                &format!("SELECT {TRAFFIC_COLUMNS} FROM traffic_results WHERE id = ?1"),
                [id.to_string()],
                traffic_from_row,
            )
            .optional()?)
    }

    pub fn list_traffic(&self) -> StoreResult<Vec<TrafficResult>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {TRAFFIC_COLUMNS} FROM traffic_results ORDER BY timestamp_ms, id"
        ))?;
        let rows = stmt.query_map([], traffic_from_row)?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    pub fn list_human(&self) -> StoreResult<Vec<HumanResult>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {HUMAN_COLUMNS} FROM human_results ORDER BY timestamp_ms, id"
        ))?;
        let rows = stmt.query_map([], human_from_row)?;
        Ok(rows.collect::<Result<_, _>>()?)
    }
}

fn uuid_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let text: String = row.get(idx)?;
    Uuid::parse_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn time_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let ms: i64 = row.get(idx)?;
    DateTime::from_timestamp_millis(ms).ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, ms))
}

fn human_from_row(row: &Row<'_>) -> rusqlite::Result<HumanResult> {
    Ok(HumanResult {
        id: uuid_column(row, 0)?,
        from_zone: row.get(1)?,
        to_zone: row.get(2)?,
        gender: row.get(3)?,
        age: row.get(4)?,
        timestamp: time_column(row, 5)?,
        is_synced: row.get(6)?,
        is_processing: row.get(7)?,
        created_at: time_column(row, 8)?,
        last_updated: time_column(row, 9)?,
    })
}

fn traffic_from_row(row: &Row<'_>) -> rusqlite::Result<TrafficResult> {
    Ok(TrafficResult {
        id: uuid_column(row, 0)?,
        from_zone: row.get(1)?,
        to_zone: row.get(2)?,
        vehicle_type: row.get(3)?,
        timestamp: time_column(row, 4)?,
        is_synced: row.get(5)?,
        is_processing: row.get(6)?,
        created_at: time_column(row, 7)?,
        last_updated: time_column(row, 8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter::ZoneRef;

    fn event(label: &str) -> CountEvent {
        CountEvent {
            track_id: "2_1".into(),
            route: "0->1".into(),
            class_label: label.into(),
            from_zone: ZoneRef::Zone(0),
            to_zone: ZoneRef::Zone(1),
        }
    }

    fn t(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_insert_and_get() {
        let store = LocalStore::open_in_memory().unwrap();
        let row = store.insert_count_event(&event("vehicle::car"), t(0)).unwrap();
        let stored = store.get_traffic(row.id()).unwrap().unwrap();
        assert_eq!(stored.vehicle_type, "car");
        assert_eq!(stored.from_zone, "0");
        assert_eq!(stored.timestamp, t(0));
        assert!(store.get_human(row.id()).unwrap().is_none());
        assert_eq!(store.unsynced_count().unwrap(), 1);
    }

    #[test]
    fn test_grace_period_hides_fresh_rows() {
        let store = LocalStore::open_in_memory().unwrap();
        store.insert_count_event(&event("vehicle::car"), t(0)).unwrap();
        let grace = TimeDelta::seconds(120);
        assert_eq!(store.pending_count(t(60), grace).unwrap(), 0);
        assert!(store.claim_batch(10, t(60), grace).unwrap().is_empty());
        assert_eq!(store.pending_count(t(120), grace).unwrap(), 1);
    }

    #[test]
    fn test_claim_is_oldest_first_across_tables() {
        let store = LocalStore::open_in_memory().unwrap();
        let a = store.insert_count_event(&event("vehicle::car"), t(2)).unwrap();
        let b = store.insert_count_event(&event("male::30_to_49"), t(1)).unwrap();
        let _c = store.insert_count_event(&event("vehicle::bus"), t(3)).unwrap();

        let batch = store.claim_batch(2, t(600), TimeDelta::seconds(120)).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.human[0].id, b.id());
        assert_eq!(batch.traffic[0].id, a.id());
        assert!(batch.traffic[0].is_processing);
        assert_eq!(store.processing_count().unwrap(), 2);
    }

    #[test]
    fn test_release_and_stale_release() {
        let store = LocalStore::open_in_memory().unwrap();
        store.insert_count_event(&event("vehicle::car"), t(0)).unwrap();
        store.insert_count_event(&event("vehicle::car"), t(1)).unwrap();
        let grace = TimeDelta::seconds(120);

        let first = store.claim_batch(1, t(200), grace).unwrap();
        assert_eq!(store.release(&first, t(201)).unwrap(), 1);
        assert_eq!(store.processing_count().unwrap(), 0);

        store.claim_batch(10, t(300), grace).unwrap();
        assert_eq!(store.processing_count().unwrap(), 2);
        let max_age = TimeDelta::minutes(60);
        assert_eq!(store.release_stale(t(300 + 1800), max_age).unwrap(), 0);
        assert_eq!(store.release_stale(t(300 + 3601), max_age).unwrap(), 2);
        assert_eq!(store.pending_count(t(4000), grace).unwrap(), 2);
    }

    #[test]
    fn test_purge_only_removes_old_synced_rows() {
        let store = LocalStore::open_in_memory().unwrap();
        store.insert_count_event(&event("vehicle::car"), t(0)).unwrap();
        store.insert_count_event(&event("female::18_to_29"), t(0)).unwrap();
        let batch = store.claim_batch(1, t(200), TimeDelta::seconds(120)).unwrap();
        store.mark_synced(&batch, t(201)).unwrap();

        let retention = TimeDelta::days(7);
        assert_eq!(store.purge_synced(t(3600), retention).unwrap(), 0);
        assert_eq!(store.purge_synced(t(8 * 86_400), retention).unwrap(), 1);
        assert_eq!(store.unsynced_count().unwrap(), 1);
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cityeye.db");
        let id = {
            let store = LocalStore::open(&path).unwrap();
            store.insert_count_event(&event("vehicle::truck"), t(0)).unwrap().id()
        };
        let store = LocalStore::open(&path).unwrap();
        assert_eq!(store.get_traffic(id).unwrap().unwrap().vehicle_type, "truck");
    }
}
