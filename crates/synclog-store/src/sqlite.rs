//! `SQLite` change-log store.

use crate::codec::{
    decode_properties, decode_revisions, decode_timestamp, encode_properties, encode_revisions,
    encode_timestamp, to_i64, to_u64,
};
use crate::error::StoreError;
use crate::store::{ChangeFilter, ChangeLogStore, ChangeScope, LogTransaction};
use rusqlite::{Connection, OptionalExtension, Row, Transaction};
use std::path::Path;
use synclog_core::{
    ChangeType, EventDraft, EventId, EventKind, ModificationEvent, ObjectChange, Revision,
    RevisionVector,
};

const EVENT_COLUMNS: &str =
    "id, is_baseline, replica_id, revision_number, global_count, created_at, model_version, revisions";

/// `SQLite`-backed change log.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open or create a `SQLite` database.
    ///
    /// # Errors
    ///
    /// Returns error if database cannot be opened or initialized.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.init_schema()?;
        tracing::debug!(path = %path.display(), "Opened SQLite change log");
        Ok(store)
    }

    /// Create an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns error if database cannot be created.
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// Initialize database schema.
    fn init_schema(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            r"
            PRAGMA foreign_keys = ON;

            -- Regular events and the single baseline
            CREATE TABLE IF NOT EXISTS events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                is_baseline INTEGER NOT NULL DEFAULT 0,
                replica_id TEXT,
                revision_number INTEGER,
                global_count INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                model_version TEXT NOT NULL,
                revisions BLOB NOT NULL
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_events_single_baseline
                ON events(is_baseline) WHERE is_baseline = 1;
            CREATE INDEX IF NOT EXISTS idx_events_order
                ON events(global_count, replica_id, revision_number);

            -- Object changes, owned by one event
            CREATE TABLE IF NOT EXISTS object_changes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                event_id INTEGER NOT NULL REFERENCES events(id) ON DELETE CASCADE,
                entity TEXT NOT NULL,
                object_id TEXT NOT NULL,
                change_type INTEGER NOT NULL,
                properties TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_object_changes_event ON object_changes(event_id);
            ",
        )?;

        Ok(())
    }
}

impl ChangeLogStore for SqliteStore {
    type Transaction<'a> = SqliteTransaction<'a>;

    fn begin(&mut self) -> Result<SqliteTransaction<'_>, StoreError> {
        Ok(SqliteTransaction {
            tx: self.conn.transaction()?,
        })
    }

    fn append(&mut self, draft: EventDraft) -> Result<EventId, StoreError> {
        let tx = self.conn.transaction()?;
        let id = insert_event(&tx, &draft)?;
        insert_changes(&tx, id, &draft.changes)?;
        tx.commit()?;
        Ok(id)
    }

    fn has_baseline(&self) -> Result<bool, StoreError> {
        Ok(fetch_baseline(&self.conn)?.is_some())
    }

    fn count_changes(&self, filter: ChangeFilter) -> Result<u64, StoreError> {
        count_changes(&self.conn, filter)
    }

    fn count_events(&self) -> Result<u64, StoreError> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM events WHERE is_baseline = 0", [], |row| {
                    row.get(0)
                })?;
        to_u64(count)
    }

    fn latest_revisions(&self) -> Result<RevisionVector, StoreError> {
        latest_revisions(&self.conn)
    }
}

/// Transaction over a `SqliteStore`; rolls back when dropped uncommitted.
pub struct SqliteTransaction<'a> {
    tx: Transaction<'a>,
}

impl LogTransaction for SqliteTransaction<'_> {
    fn fetch_baseline(&self) -> Result<Option<ModificationEvent>, StoreError> {
        fetch_baseline(&self.tx)
    }

    fn create_baseline(&mut self, model_version: &str) -> Result<ModificationEvent, StoreError> {
        if fetch_baseline(&self.tx)?.is_some() {
            return Err(StoreError::DuplicateBaseline);
        }

        let mut baseline = ModificationEvent::new_baseline(EventId(0), model_version);
        self.tx.execute(
            r"
            INSERT INTO events (is_baseline, global_count, created_at, model_version, revisions)
            VALUES (1, ?1, ?2, ?3, ?4)
            ",
            (
                to_i64(baseline.global_count)?,
                encode_timestamp(baseline.timestamp),
                &baseline.model_version,
                encode_revisions(&baseline.revisions)?,
            ),
        )?;
        baseline.id = EventId(to_u64(self.tx.last_insert_rowid())?);
        Ok(baseline)
    }

    fn latest_revisions(&self) -> Result<RevisionVector, StoreError> {
        latest_revisions(&self.tx)
    }

    fn fetch_events_up_to(&self, global_count: u64) -> Result<Vec<ModificationEvent>, StoreError> {
        let bound = i64::try_from(global_count).unwrap_or(i64::MAX);
        let mut stmt = self.tx.prepare(&format!(
            r"
            SELECT {EVENT_COLUMNS} FROM events
            WHERE is_baseline = 0 AND global_count <= ?1
            ORDER BY global_count ASC, replica_id ASC, revision_number ASC
            "
        ))?;

        let rows = stmt
            .query_map([bound], RawEvent::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter().map(RawEvent::into_event).collect()
    }

    fn fetch_changes(&self, events: &[EventId]) -> Result<Vec<ObjectChange>, StoreError> {
        let mut stmt = self.tx.prepare_cached(
            r"
            SELECT entity, object_id, change_type, properties FROM object_changes
            WHERE event_id = ?1
            ORDER BY id ASC
            ",
        )?;

        let mut changes = Vec::new();
        for id in events {
            let rows = stmt
                .query_map([to_i64(id.0)?], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            for (entity, object_id, code, properties) in rows {
                let change_type = ChangeType::from_code(code)
                    .ok_or_else(|| StoreError::InvalidData(format!("change type code {code}")))?;
                changes.push(ObjectChange::new(
                    entity,
                    object_id,
                    change_type,
                    decode_properties(&properties)?,
                ));
            }
        }

        Ok(changes)
    }

    fn update_baseline(
        &mut self,
        baseline: &ModificationEvent,
        changes: &[ObjectChange],
    ) -> Result<(), StoreError> {
        let id = to_i64(baseline.id.0)?;
        let updated = self.tx.execute(
            r"
            UPDATE events
            SET global_count = ?1, created_at = ?2, model_version = ?3, revisions = ?4
            WHERE id = ?5 AND is_baseline = 1
            ",
            (
                to_i64(baseline.global_count)?,
                encode_timestamp(baseline.timestamp),
                &baseline.model_version,
                encode_revisions(&baseline.revisions)?,
                id,
            ),
        )?;
        if updated == 0 {
            return Err(StoreError::MissingEvent(baseline.id));
        }

        self.tx
            .execute("DELETE FROM object_changes WHERE event_id = ?1", [id])?;
        insert_changes(&self.tx, baseline.id, changes)
    }

    fn delete_event(&mut self, id: EventId) -> Result<(), StoreError> {
        let deleted = self.tx.execute(
            "DELETE FROM events WHERE id = ?1 AND is_baseline = 0",
            [to_i64(id.0)?],
        )?;
        if deleted == 0 {
            return Err(StoreError::MissingEvent(id));
        }
        Ok(())
    }

    fn commit(self) -> Result<(), StoreError> {
        self.tx.commit()?;
        Ok(())
    }
}

/// An `events` row before column decoding.
struct RawEvent {
    id: i64,
    is_baseline: bool,
    replica_id: Option<String>,
    revision_number: Option<i64>,
    global_count: i64,
    created_at: i64,
    model_version: String,
    revisions: Vec<u8>,
}

impl RawEvent {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            is_baseline: row.get(1)?,
            replica_id: row.get(2)?,
            revision_number: row.get(3)?,
            global_count: row.get(4)?,
            created_at: row.get(5)?,
            model_version: row.get(6)?,
            revisions: row.get(7)?,
        })
    }

    fn into_event(self) -> Result<ModificationEvent, StoreError> {
        let global_count = to_u64(self.global_count)?;
        let kind = if self.is_baseline {
            EventKind::Baseline
        } else {
            match (self.replica_id, self.revision_number) {
                (Some(replica_id), Some(number)) => {
                    EventKind::Regular(Revision::new(replica_id, to_u64(number)?, global_count))
                }
                _ => {
                    return Err(StoreError::InvalidData(format!(
                        "regular event {} lacks a revision",
                        self.id
                    )))
                }
            }
        };

        Ok(ModificationEvent {
            id: EventId(to_u64(self.id)?),
            kind,
            global_count,
            timestamp: decode_timestamp(self.created_at)?,
            model_version: self.model_version,
            revisions: decode_revisions(&self.revisions)?,
        })
    }
}

fn fetch_baseline(conn: &Connection) -> Result<Option<ModificationEvent>, StoreError> {
    let raw = conn
        .query_row(
            &format!("SELECT {EVENT_COLUMNS} FROM events WHERE is_baseline = 1"),
            [],
            RawEvent::from_row,
        )
        .optional()?;

    raw.map(RawEvent::into_event).transpose()
}

fn latest_revisions(conn: &Connection) -> Result<RevisionVector, StoreError> {
    let mut stmt = conn.prepare("SELECT revisions FROM events")?;
    let blobs = stmt
        .query_map([], |row| row.get::<_, Vec<u8>>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut latest = RevisionVector::new();
    for blob in blobs {
        latest.merge(&decode_revisions(&blob)?);
    }
    Ok(latest)
}

fn count_changes(conn: &Connection, filter: ChangeFilter) -> Result<u64, StoreError> {
    let baseline_flag: Option<i64> = match filter.scope {
        ChangeScope::All => None,
        ChangeScope::BaselineOnly => Some(1),
        ChangeScope::ExcludeBaseline => Some(0),
    };
    let change_type = filter.change_type.map(ChangeType::code);

    let count: i64 = conn.query_row(
        r"
        SELECT COUNT(*) FROM object_changes c
        JOIN events e ON e.id = c.event_id
        WHERE (?1 IS NULL OR e.is_baseline = ?1)
          AND (?2 IS NULL OR c.change_type = ?2)
        ",
        (baseline_flag, change_type),
        |row| row.get(0),
    )?;
    to_u64(count)
}

fn insert_event(conn: &Connection, draft: &EventDraft) -> Result<EventId, StoreError> {
    conn.execute(
        r"
        INSERT INTO events
            (is_baseline, replica_id, revision_number, global_count, created_at, model_version, revisions)
        VALUES (0, ?1, ?2, ?3, ?4, ?5, ?6)
        ",
        (
            &draft.revision.replica_id,
            to_i64(draft.revision.revision_number)?,
            to_i64(draft.revision.global_count)?,
            encode_timestamp(draft.timestamp),
            &draft.model_version,
            encode_revisions(&draft.revisions)?,
        ),
    )?;
    Ok(EventId(to_u64(conn.last_insert_rowid())?))
}

fn insert_changes(
    conn: &Connection,
    event: EventId,
    changes: &[ObjectChange],
) -> Result<(), StoreError> {
    let mut stmt = conn.prepare_cached(
        r"
        INSERT INTO object_changes (event_id, entity, object_id, change_type, properties)
        VALUES (?1, ?2, ?3, ?4, ?5)
        ",
    )?;

    let event_id = to_i64(event.0)?;
    for change in changes {
        stmt.execute((
            event_id,
            &change.entity,
            &change.object_id,
            change.change_type.code(),
            encode_properties(&change.properties)?,
        ))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn draft(replica: &str, number: u64, changes: Vec<ObjectChange>) -> EventDraft {
        EventDraft::new(Revision::new(replica, number, number), "1", changes)
    }

    #[test]
    fn sqlite_store_basic_operations() {
        let mut store = SqliteStore::in_memory().unwrap();

        store
            .append(draft(
                "a",
                1,
                vec![ObjectChange::insert("Note", "n1", json!({"title": "x"}))],
            ))
            .unwrap();
        store
            .append(draft("b", 1, vec![ObjectChange::update("Note", "n1", json!({}))]))
            .unwrap();

        assert_eq!(store.count_events().unwrap(), 2);
        assert_eq!(store.count_changes(ChangeFilter::default()).unwrap(), 2);
        assert_eq!(
            store
                .count_of_non_baseline_changes_of_type(ChangeType::Update)
                .unwrap(),
            1
        );

        let latest = store.latest_revisions().unwrap();
        assert_eq!(latest.len(), 2);

        let tx = store.begin().unwrap();
        let events = tx.fetch_events_up_to(1).unwrap();
        assert_eq!(events.len(), 2);
        let changes = tx
            .fetch_changes(&events.iter().map(|e| e.id).collect::<Vec<_>>())
            .unwrap();
        assert_eq!(changes[0].properties, json!({"title": "x"}));
        assert_eq!(changes[1].change_type, ChangeType::Update);
    }

    #[test]
    fn baseline_update_and_cascading_delete() {
        let mut store = SqliteStore::in_memory().unwrap();
        let id = store
            .append(draft("a", 1, vec![ObjectChange::insert("Note", "n1", json!({}))]))
            .unwrap();

        let mut tx = store.begin().unwrap();
        let mut baseline = tx.create_baseline("1").unwrap();
        let changes = tx.fetch_changes(&[id]).unwrap();
        baseline.global_count = 1;
        baseline.revisions = RevisionVector::from_revisions([Revision::new("a", 1, 1)]);
        tx.update_baseline(&baseline, &changes).unwrap();
        tx.delete_event(id).unwrap();
        tx.commit().unwrap();

        assert!(store.has_baseline().unwrap());
        assert_eq!(store.count_events().unwrap(), 0);
        assert_eq!(store.count_of_baseline().unwrap(), 1);
        assert_eq!(store.count_changes(ChangeFilter::default()).unwrap(), 1);

        let mut tx = store.begin().unwrap();
        let stored = tx.fetch_baseline().unwrap().unwrap();
        assert_eq!(stored.global_count, 1);
        assert_eq!(stored.revisions, baseline.revisions);
        assert!(matches!(
            tx.delete_event(stored.id),
            Err(StoreError::MissingEvent(_))
        ));
    }

    #[test]
    fn dropped_transaction_rolls_back() {
        let mut store = SqliteStore::in_memory().unwrap();
        let id = store.append(draft("a", 1, vec![])).unwrap();

        {
            let mut tx = store.begin().unwrap();
            tx.create_baseline("1").unwrap();
            tx.delete_event(id).unwrap();
        }

        assert!(!store.has_baseline().unwrap());
        assert_eq!(store.count_events().unwrap(), 1);
    }

    #[test]
    fn single_baseline_enforced() {
        let mut store = SqliteStore::in_memory().unwrap();
        let mut tx = store.begin().unwrap();
        tx.create_baseline("1").unwrap();
        assert!(matches!(
            tx.create_baseline("1"),
            Err(StoreError::DuplicateBaseline)
        ));
    }

    #[test]
    fn reopen_persists_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.db");

        {
            let mut store = SqliteStore::open(&path).unwrap();
            store
                .append(draft("a", 1, vec![ObjectChange::delete("Note", "n1")]))
                .unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.count_events().unwrap(), 1);
        assert_eq!(
            store
                .count_of_non_baseline_changes_of_type(ChangeType::Delete)
                .unwrap(),
            1
        );
    }
}
