//! Database-backed Record Storage
//! Mission: Persist user-owned income and expense records with SQLite
//!
//! Every lookup folds the ownership check into the query predicate
//! (`WHERE id = ? AND created_by = ?`). A record owned by someone else is
//! indistinguishable from a record that does not exist, so no error path
//! can leak existence to another identity.

use crate::records::models::{
    ExpenseItem, ExpensePayload, ExpenseRecord, FileRef, IncomePayload, IncomeRecord,
};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;

CREATE TABLE IF NOT EXISTS incomes (
    id TEXT PRIMARY KEY,
    amount REAL NOT NULL,
    slip_json TEXT,
    notes TEXT,
    created_by TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS idx_incomes_owner_created
    ON incomes(created_by, created_at DESC);

CREATE TABLE IF NOT EXISTS expenses (
    id TEXT PRIMARY KEY,
    items_json TEXT NOT NULL,
    total_amount REAL NOT NULL,
    images_json TEXT NOT NULL,
    notes TEXT,
    created_by TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS idx_expenses_owner_created
    ON expenses(created_by, created_at DESC);
"#;

/// Record storage scoped by owning user
pub struct RecordStore {
    conn: Arc<Mutex<Connection>>,
}

impl RecordStore {
    /// Open the database and apply schema
    pub fn new(db_path: &str) -> Result<Self> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX; // We handle our own locking

        let conn = Connection::open_with_flags(db_path, flags)
            .with_context(|| format!("Failed to open database at {}", db_path))?;

        conn.execute_batch(SCHEMA_SQL)
            .context("Failed to initialize database schema")?;

        info!("Record database initialized at: {}", db_path);

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    // ===== Income =====

    pub fn create_income(
        &self,
        owner: &Uuid,
        payload: &IncomePayload,
        slip: Option<FileRef>,
    ) -> Result<IncomeRecord> {
        let now = now_millis();
        let record = IncomeRecord {
            id: Uuid::new_v4(),
            amount: payload.amount,
            slip,
            notes: payload.notes.clone(),
            created_by: *owner,
            created_at: now,
            updated_at: now,
        };

        // Pre-serialize outside the lock
        let slip_json = match &record.slip {
            Some(r) => Some(serde_json::to_string(r)?),
            None => None,
        };

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO incomes (id, amount, slip_json, notes, created_by, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.id.to_string(),
                record.amount,
                slip_json,
                record.notes,
                record.created_by.to_string(),
                record.created_at.timestamp_millis(),
                record.updated_at.timestamp_millis(),
            ],
        )
        .context("Failed to insert income record")?;

        Ok(record)
    }

    /// List the owner's incomes, newest first
    pub fn list_incomes(&self, owner: &Uuid) -> Result<Vec<IncomeRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, amount, slip_json, notes, created_by, created_at, updated_at
             FROM incomes WHERE created_by = ?1 ORDER BY created_at DESC",
        )?;

        let records = stmt
            .query_map(params![owner.to_string()], row_to_income)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(records)
    }

    /// Ownership-folded lookup: missing and not-owned are the same `None`
    pub fn get_income(&self, owner: &Uuid, id: &Uuid) -> Result<Option<IncomeRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, amount, slip_json, notes, created_by, created_at, updated_at
             FROM incomes WHERE id = ?1 AND created_by = ?2",
        )?;

        let result = stmt.query_row(params![id.to_string(), owner.to_string()], row_to_income);

        match result {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Replace mutable fields; a newly uploaded slip replaces the old one.
    /// `created_by` and `created_at` never change.
    pub fn update_income(
        &self,
        owner: &Uuid,
        id: &Uuid,
        payload: &IncomePayload,
        slip: Option<FileRef>,
    ) -> Result<Option<IncomeRecord>> {
        let slip_json = match &slip {
            Some(r) => Some(serde_json::to_string(r)?),
            None => None,
        };
        let now = now_millis();

        let conn = self.conn.lock();
        let changed = if slip_json.is_some() {
            conn.execute(
                "UPDATE incomes SET amount = ?1, notes = ?2, slip_json = ?3, updated_at = ?4
                 WHERE id = ?5 AND created_by = ?6",
                params![
                    payload.amount,
                    payload.notes,
                    slip_json,
                    now.timestamp_millis(),
                    id.to_string(),
                    owner.to_string(),
                ],
            )?
        } else {
            conn.execute(
                "UPDATE incomes SET amount = ?1, notes = ?2, updated_at = ?3
                 WHERE id = ?4 AND created_by = ?5",
                params![
                    payload.amount,
                    payload.notes,
                    now.timestamp_millis(),
                    id.to_string(),
                    owner.to_string(),
                ],
            )?
        };

        if changed == 0 {
            return Ok(None);
        }

        let mut stmt = conn.prepare(
            "SELECT id, amount, slip_json, notes, created_by, created_at, updated_at
             FROM incomes WHERE id = ?1 AND created_by = ?2",
        )?;
        let record = stmt.query_row(params![id.to_string(), owner.to_string()], row_to_income)?;
        Ok(Some(record))
    }

    /// Ownership-folded delete; returns false when absent or not owned
    pub fn delete_income(&self, owner: &Uuid, id: &Uuid) -> Result<bool> {
        let conn = self.conn.lock();
        let deleted = conn.execute(
            "DELETE FROM incomes WHERE id = ?1 AND created_by = ?2",
            params![id.to_string(), owner.to_string()],
        )?;
        Ok(deleted > 0)
    }

    // ===== Expense =====

    pub fn create_expense(
        &self,
        owner: &Uuid,
        payload: &ExpensePayload,
        images: Vec<FileRef>,
    ) -> Result<ExpenseRecord> {
        let now = now_millis();
        let record = ExpenseRecord {
            id: Uuid::new_v4(),
            items: payload.items.clone(),
            total_amount: payload.total_amount,
            images,
            notes: payload.notes.clone(),
            created_by: *owner,
            created_at: now,
            updated_at: now,
        };

        let items_json = serde_json::to_string(&record.items)?;
        let images_json = serde_json::to_string(&record.images)?;

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO expenses
             (id, items_json, total_amount, images_json, notes, created_by, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.id.to_string(),
                items_json,
                record.total_amount,
                images_json,
                record.notes,
                record.created_by.to_string(),
                record.created_at.timestamp_millis(),
                record.updated_at.timestamp_millis(),
            ],
        )
        .context("Failed to insert expense record")?;

        Ok(record)
    }

    /// List the owner's expenses, newest first
    pub fn list_expenses(&self, owner: &Uuid) -> Result<Vec<ExpenseRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, items_json, total_amount, images_json, notes, created_by, created_at, updated_at
             FROM expenses WHERE created_by = ?1 ORDER BY created_at DESC",
        )?;

        let records = stmt
            .query_map(params![owner.to_string()], row_to_expense)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(records)
    }

    /// Ownership-folded lookup
    pub fn get_expense(&self, owner: &Uuid, id: &Uuid) -> Result<Option<ExpenseRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, items_json, total_amount, images_json, notes, created_by, created_at, updated_at
             FROM expenses WHERE id = ?1 AND created_by = ?2",
        )?;

        let result = stmt.query_row(params![id.to_string(), owner.to_string()], row_to_expense);

        match result {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Replace mutable fields; newly uploaded images are appended to the
    /// existing sequence. `created_by` and `created_at` never change.
    pub fn update_expense(
        &self,
        owner: &Uuid,
        id: &Uuid,
        payload: &ExpensePayload,
        new_images: Vec<FileRef>,
    ) -> Result<Option<ExpenseRecord>> {
        let items_json = serde_json::to_string(&payload.items)?;
        let now = now_millis();

        let conn = self.conn.lock();

        // Folded predicate on the read and the write; the mutex serializes
        // the pair so both hit the same row or neither does.
        let mut stmt = conn.prepare(
            "SELECT id, items_json, total_amount, images_json, notes, created_by, created_at, updated_at
             FROM expenses WHERE id = ?1 AND created_by = ?2",
        )?;
        let existing =
            match stmt.query_row(params![id.to_string(), owner.to_string()], row_to_expense) {
                Ok(record) => record,
                Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
                Err(e) => return Err(e.into()),
            };

        let mut images = existing.images;
        images.extend(new_images);
        let images_json = serde_json::to_string(&images)?;

        conn.execute(
            "UPDATE expenses
             SET items_json = ?1, total_amount = ?2, images_json = ?3, notes = ?4, updated_at = ?5
             WHERE id = ?6 AND created_by = ?7",
            params![
                items_json,
                payload.total_amount,
                images_json,
                payload.notes,
                now.timestamp_millis(),
                id.to_string(),
                owner.to_string(),
            ],
        )?;

        Ok(Some(ExpenseRecord {
            id: existing.id,
            items: payload.items.clone(),
            total_amount: payload.total_amount,
            images,
            notes: payload.notes.clone(),
            created_by: existing.created_by,
            created_at: existing.created_at,
            updated_at: now,
        }))
    }

    /// Ownership-folded delete; returns false when absent or not owned
    pub fn delete_expense(&self, owner: &Uuid, id: &Uuid) -> Result<bool> {
        let conn = self.conn.lock();
        let deleted = conn.execute(
            "DELETE FROM expenses WHERE id = ?1 AND created_by = ?2",
            params![id.to_string(), owner.to_string()],
        )?;
        Ok(deleted > 0)
    }
}

/// Wall clock truncated to the millisecond precision the store persists,
/// so a freshly created record equals its later fetched form
fn now_millis() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::<Utc>::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}

fn millis_to_datetime(ms: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(ms).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Corrupt stored data is a persistence failure, surfaced as an error
/// rather than silently defaulted
fn parse_uuid(idx: usize, s: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn parse_json<T: serde::de::DeserializeOwned>(idx: usize, s: &str) -> rusqlite::Result<T> {
    serde_json::from_str(s).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn row_to_income(row: &rusqlite::Row<'_>) -> rusqlite::Result<IncomeRecord> {
    let id: String = row.get(0)?;
    let slip_json: Option<String> = row.get(2)?;
    let created_by: String = row.get(4)?;
    let created_at: i64 = row.get(5)?;
    let updated_at: i64 = row.get(6)?;

    let slip = match slip_json {
        Some(s) => Some(parse_json::<FileRef>(2, &s)?),
        None => None,
    };

    Ok(IncomeRecord {
        id: parse_uuid(0, &id)?,
        amount: row.get(1)?,
        slip,
        notes: row.get(3)?,
        created_by: parse_uuid(4, &created_by)?,
        created_at: millis_to_datetime(created_at),
        updated_at: millis_to_datetime(updated_at),
    })
}

fn row_to_expense(row: &rusqlite::Row<'_>) -> rusqlite::Result<ExpenseRecord> {
    let id: String = row.get(0)?;
    let items_json: String = row.get(1)?;
    let images_json: String = row.get(3)?;
    let created_by: String = row.get(5)?;
    let created_at: i64 = row.get(6)?;
    let updated_at: i64 = row.get(7)?;

    Ok(ExpenseRecord {
        id: parse_uuid(0, &id)?,
        items: parse_json::<Vec<ExpenseItem>>(1, &items_json)?,
        total_amount: row.get(2)?,
        images: parse_json::<Vec<FileRef>>(3, &images_json)?,
        notes: row.get(4)?,
        created_by: parse_uuid(5, &created_by)?,
        created_at: millis_to_datetime(created_at),
        updated_at: millis_to_datetime(updated_at),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    fn create_test_store() -> (RecordStore, NamedTempFile) {
        let temp_file = NamedTempFile::new().unwrap();
        let store = RecordStore::new(temp_file.path().to_str().unwrap()).unwrap();
        (store, temp_file)
    }

    fn income_payload(amount: f64, notes: Option<&str>) -> IncomePayload {
        IncomePayload {
            amount,
            notes: notes.map(|s| s.to_string()),
        }
    }

    fn coffee_payload() -> ExpensePayload {
        ExpensePayload {
            items: vec![ExpenseItem {
                description: "coffee".to_string(),
                amount: 3.5,
            }],
            total_amount: 3.5,
            notes: None,
        }
    }

    #[test]
    fn test_income_roundtrip() {
        let (store, _temp) = create_test_store();
        let owner = Uuid::new_v4();

        let slip = FileRef {
            path: "uploads/1700000000000-slip.png".to_string(),
            filename: "1700000000000-slip.png".to_string(),
        };
        let created = store
            .create_income(&owner, &income_payload(1500.0, Some("salary")), Some(slip.clone()))
            .unwrap();

        let fetched = store.get_income(&owner, &created.id).unwrap().unwrap();
        assert_eq!(fetched.amount, 1500.0);
        assert_eq!(fetched.slip, Some(slip));
        assert_eq!(fetched.notes.as_deref(), Some("salary"));
        assert_eq!(fetched.created_by, owner);
    }

    #[test]
    fn test_expense_roundtrip() {
        let (store, _temp) = create_test_store();
        let owner = Uuid::new_v4();

        let created = store.create_expense(&owner, &coffee_payload(), vec![]).unwrap();

        let fetched = store.get_expense(&owner, &created.id).unwrap().unwrap();
        assert_eq!(fetched.items, created.items);
        assert_eq!(fetched.total_amount, 3.5);
        assert!(fetched.images.is_empty());
    }

    #[test]
    fn test_other_owner_sees_nothing() {
        let (store, _temp) = create_test_store();
        let alice = Uuid::new_v4();
        let mallory = Uuid::new_v4();

        let income = store.create_income(&alice, &income_payload(10.0, None), None).unwrap();
        let expense = store.create_expense(&alice, &coffee_payload(), vec![]).unwrap();

        // Same None as a nonexistent id, for every operation
        assert!(store.get_income(&mallory, &income.id).unwrap().is_none());
        assert!(store.get_expense(&mallory, &expense.id).unwrap().is_none());
        assert!(store
            .update_income(&mallory, &income.id, &income_payload(99.0, None), None)
            .unwrap()
            .is_none());
        assert!(!store.delete_income(&mallory, &income.id).unwrap());
        assert!(!store.delete_expense(&mallory, &expense.id).unwrap());
        assert!(store.list_incomes(&mallory).unwrap().is_empty());

        // Owner still sees the untouched records
        let kept = store.get_income(&alice, &income.id).unwrap().unwrap();
        assert_eq!(kept.amount, 10.0);
    }

    #[test]
    fn test_list_incomes_newest_first() {
        let (store, _temp) = create_test_store();
        let owner = Uuid::new_v4();

        let first = store.create_income(&owner, &income_payload(1.0, None), None).unwrap();
        sleep(Duration::from_millis(5));
        let second = store.create_income(&owner, &income_payload(2.0, None), None).unwrap();
        sleep(Duration::from_millis(5));
        let third = store.create_income(&owner, &income_payload(3.0, None), None).unwrap();

        let listed = store.list_incomes(&owner).unwrap();
        let ids: Vec<Uuid> = listed.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![third.id, second.id, first.id]);
    }

    #[test]
    fn test_update_income_replaces_slip() {
        let (store, _temp) = create_test_store();
        let owner = Uuid::new_v4();

        let old_slip = FileRef {
            path: "uploads/a.png".to_string(),
            filename: "a.png".to_string(),
        };
        let created = store
            .create_income(&owner, &income_payload(5.0, None), Some(old_slip))
            .unwrap();

        // No new slip: existing reference kept
        let updated = store
            .update_income(&owner, &created.id, &income_payload(6.0, Some("fixed")), None)
            .unwrap()
            .unwrap();
        assert_eq!(updated.amount, 6.0);
        assert_eq!(updated.slip.as_ref().unwrap().filename, "a.png");

        // New slip replaces the old reference
        let new_slip = FileRef {
            path: "uploads/b.png".to_string(),
            filename: "b.png".to_string(),
        };
        let updated = store
            .update_income(&owner, &created.id, &income_payload(6.0, None), Some(new_slip))
            .unwrap()
            .unwrap();
        assert_eq!(updated.slip.as_ref().unwrap().filename, "b.png");
    }

    #[test]
    fn test_update_expense_appends_images() {
        let (store, _temp) = create_test_store();
        let owner = Uuid::new_v4();

        let first_image = FileRef {
            path: "uploads/r1.jpg".to_string(),
            filename: "r1.jpg".to_string(),
        };
        let created = store
            .create_expense(&owner, &coffee_payload(), vec![first_image])
            .unwrap();

        let second_image = FileRef {
            path: "uploads/r2.jpg".to_string(),
            filename: "r2.jpg".to_string(),
        };
        let updated = store
            .update_expense(&owner, &created.id, &coffee_payload(), vec![second_image])
            .unwrap()
            .unwrap();

        let filenames: Vec<&str> = updated.images.iter().map(|i| i.filename.as_str()).collect();
        assert_eq!(filenames, vec!["r1.jpg", "r2.jpg"]);

        // Persisted, not just returned
        let fetched = store.get_expense(&owner, &created.id).unwrap().unwrap();
        assert_eq!(fetched.images.len(), 2);
    }

    #[test]
    fn test_created_record_timestamps_survive_fetch() {
        let (store, _temp) = create_test_store();
        let owner = Uuid::new_v4();

        let income = store.create_income(&owner, &income_payload(10.0, None), None).unwrap();
        let fetched = store.get_income(&owner, &income.id).unwrap().unwrap();
        assert_eq!(fetched.created_at, income.created_at);
        assert_eq!(fetched.updated_at, income.updated_at);

        let expense = store.create_expense(&owner, &coffee_payload(), vec![]).unwrap();
        let fetched = store.get_expense(&owner, &expense.id).unwrap().unwrap();
        assert_eq!(fetched.created_at, expense.created_at);

        let updated = store
            .update_expense(&owner, &expense.id, &coffee_payload(), vec![])
            .unwrap()
            .unwrap();
        let fetched = store.get_expense(&owner, &expense.id).unwrap().unwrap();
        assert_eq!(fetched.updated_at, updated.updated_at);
    }

    #[test]
    fn test_corrupt_stored_data_surfaces_error() {
        let (store, temp) = create_test_store();
        let owner = Uuid::new_v4();

        let slip = FileRef {
            path: "uploads/s.png".to_string(),
            filename: "s.png".to_string(),
        };
        let income = store
            .create_income(&owner, &income_payload(1.0, None), Some(slip))
            .unwrap();

        // Damage the stored reference out-of-band
        let conn = Connection::open(temp.path()).unwrap();
        conn.execute("UPDATE incomes SET slip_json = 'not json'", []).unwrap();
        assert!(store.get_income(&owner, &income.id).is_err());

        // A corrupt stored id is an error, not a nil-uuid record
        conn.execute("UPDATE incomes SET slip_json = NULL, id = 'garbage'", [])
            .unwrap();
        assert!(store.list_incomes(&owner).is_err());
    }

    #[test]
    fn test_delete_twice_reports_not_found() {
        let (store, _temp) = create_test_store();
        let owner = Uuid::new_v4();

        let created = store.create_income(&owner, &income_payload(1.0, None), None).unwrap();

        assert!(store.delete_income(&owner, &created.id).unwrap());
        assert!(!store.delete_income(&owner, &created.id).unwrap());
        assert!(store.get_income(&owner, &created.id).unwrap().is_none());
    }
}
