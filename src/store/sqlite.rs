//! SQLite persistence backend.
//!
//! All stores share one `records` table keyed by `(store, key)`. The payload
//! lives in a JSON `data` column; the three lifecycle flags get their own
//! integer columns so flag queries never need to parse JSON. Secondary
//! indexes on payload fields go through `json_extract`.
//!
//! The connection is protected by a `parking_lot::ReentrantMutex<RefCell<..>>`
//! so `replace_key` can hold the lock across its transaction while helpers
//! re-acquire it.

use std::cell::RefCell;

use parking_lot::ReentrantMutex;
use rusqlite::{params, Connection};
use serde_json::Value;

use crate::error::StoreError;
use crate::types::{IndexValue, StoreSchema, StoredRecord};

use super::traits::{check_indexed, FlagField, StoreBackend, StoreResult};

const SELECT_COLS: &str =
    "SELECT key, data, is_on_server, is_posted, should_delete FROM records";

fn flag_column(flag: FlagField) -> &'static str {
    match flag {
        FlagField::IsOnServer => "is_on_server",
        FlagField::IsPosted => "is_posted",
        FlagField::ShouldDelete => "should_delete",
    }
}

fn index_value_to_sql(value: &IndexValue) -> rusqlite::types::Value {
    match value {
        IndexValue::Int(i) => rusqlite::types::Value::Integer(*i),
        IndexValue::Text(s) => rusqlite::types::Value::Text(s.clone()),
    }
}

/// SQLite backend over a single shared `records` table.
pub struct SqliteBackend {
    conn: ReentrantMutex<RefCell<Connection>>,
}

impl SqliteBackend {
    /// Open a file-backed database and prepare it for the given schemas.
    pub fn open(path: &str, schemas: &[StoreSchema]) -> StoreResult<Self> {
        let backend = Self {
            conn: ReentrantMutex::new(RefCell::new(Connection::open(path)?)),
        };
        backend.initialize(schemas)?;
        Ok(backend)
    }

    /// In-memory database, mostly for tests.
    pub fn open_in_memory(schemas: &[StoreSchema]) -> StoreResult<Self> {
        let backend = Self {
            conn: ReentrantMutex::new(RefCell::new(Connection::open_in_memory()?)),
        };
        backend.initialize(schemas)?;
        Ok(backend)
    }

    fn initialize(&self, schemas: &[StoreSchema]) -> StoreResult<()> {
        let guard = self.conn.lock();
        let conn = guard.borrow();

        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             PRAGMA busy_timeout=5000;",
        )?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS records (
                store         TEXT NOT NULL,
                key           TEXT NOT NULL,
                data          TEXT NOT NULL DEFAULT '{}',
                is_on_server  INTEGER NOT NULL DEFAULT 0,
                is_posted     INTEGER NOT NULL DEFAULT 0,
                should_delete INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (store, key)
            );
            CREATE INDEX IF NOT EXISTS idx_records_store ON records(store);",
        )?;

        for schema in schemas {
            for field in &schema.indices {
                let sql = match FlagField::parse(field) {
                    Some(flag) => format!(
                        "CREATE INDEX IF NOT EXISTS idx_{}_{} ON records (store, {})",
                        schema.name,
                        flag_column(flag),
                        flag_column(flag)
                    ),
                    None => format!(
                        "CREATE INDEX IF NOT EXISTS idx_{}_{} ON records \
                         (store, json_extract(data, '$.{}'))",
                        schema.name, field, field
                    ),
                };
                conn.execute_batch(&sql)?;
            }
        }

        Ok(())
    }

    fn with_conn<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T>,
    {
        let guard = self.conn.lock();
        let conn = guard.borrow();
        Ok(f(&conn)?)
    }

    fn row_to_record(schema: &StoreSchema, row: &rusqlite::Row<'_>) -> StoreResult<StoredRecord> {
        let key: String = row.get(0).map_err(StoreError::from)?;
        let data_str: String = row.get(1).map_err(StoreError::from)?;
        let is_on_server: i64 = row.get(2).map_err(StoreError::from)?;
        let is_posted: i64 = row.get(3).map_err(StoreError::from)?;
        let should_delete: i64 = row.get(4).map_err(StoreError::from)?;

        let data: Value =
            serde_json::from_str(&data_str).map_err(|e| StoreError::Corruption {
                store: schema.name.clone(),
                key: key.clone(),
                field: "data".to_string(),
                source: Box::new(e),
            })?;

        Ok(StoredRecord {
            key,
            data,
            is_on_server: is_on_server != 0,
            is_posted: is_posted != 0,
            should_delete: should_delete != 0,
        })
    }

    fn query_records(
        &self,
        schema: &StoreSchema,
        sql: &str,
        params: Vec<rusqlite::types::Value>,
    ) -> StoreResult<Vec<StoredRecord>> {
        let guard = self.conn.lock();
        let conn = guard.borrow();
        let mut stmt = conn.prepare_cached(sql)?;
        let mut rows = stmt.query(rusqlite::params_from_iter(params))?;

        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(Self::row_to_record(schema, row)?);
        }
        Ok(records)
    }

    fn execute_upsert(
        conn: &Connection,
        store: &str,
        record: &StoredRecord,
    ) -> rusqlite::Result<()> {
        conn.execute(
            "INSERT OR REPLACE INTO records \
             (store, key, data, is_on_server, is_posted, should_delete) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                store,
                record.key,
                record.data.to_string(),
                record.is_on_server as i64,
                record.is_posted as i64,
                record.should_delete as i64,
            ],
        )?;
        Ok(())
    }
}

impl StoreBackend for SqliteBackend {
    fn upsert(&self, schema: &StoreSchema, records: &[StoredRecord]) -> StoreResult<()> {
        let guard = self.conn.lock();
        let mut conn = guard.borrow_mut();
        let tx = conn.transaction()?;
        for record in records {
            Self::execute_upsert(&tx, &schema.name, record)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn get_by_key(&self, schema: &StoreSchema, key: &str) -> StoreResult<Option<StoredRecord>> {
        let guard = self.conn.lock();
        let conn = guard.borrow();
        let mut stmt = conn.prepare_cached(&format!(
            "{SELECT_COLS} WHERE store = ?1 AND key = ?2"
        ))?;
        let mut rows = stmt.query(params![schema.name, key])?;
        match rows.next()? {
            Some(row) => Ok(Some(Self::row_to_record(schema, row)?)),
            None => Ok(None),
        }
    }

    fn get_all(&self, schema: &StoreSchema) -> StoreResult<Vec<StoredRecord>> {
        self.query_records(
            schema,
            &format!("{SELECT_COLS} WHERE store = ?1"),
            vec![rusqlite::types::Value::Text(schema.name.clone())],
        )
    }

    fn get_by_index(
        &self,
        schema: &StoreSchema,
        field: &str,
        value: &IndexValue,
    ) -> StoreResult<Vec<StoredRecord>> {
        check_indexed(schema, field)?;

        let sql = match FlagField::parse(field) {
            Some(flag) => format!(
                "{SELECT_COLS} WHERE store = ?1 AND {} = ?2",
                flag_column(flag)
            ),
            None => format!(
                "{SELECT_COLS} WHERE store = ?1 AND json_extract(data, '$.{field}') = ?2"
            ),
        };

        self.query_records(
            schema,
            &sql,
            vec![
                rusqlite::types::Value::Text(schema.name.clone()),
                index_value_to_sql(value),
            ],
        )
    }

    fn remove(&self, schema: &StoreSchema, key: &str) -> StoreResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM records WHERE store = ?1 AND key = ?2",
                params![schema.name, key],
            )
            .map(|_| ())
        })
    }

    fn replace_key(
        &self,
        schema: &StoreSchema,
        record: &StoredRecord,
        old_key: &str,
    ) -> StoreResult<()> {
        let guard = self.conn.lock();
        let mut conn = guard.borrow_mut();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM records WHERE store = ?1 AND key = ?2",
            params![schema.name, old_key],
        )?;
        Self::execute_upsert(&tx, &schema.name, record)?;
        tx.commit()?;
        Ok(())
    }

    fn retain_newest(
        &self,
        schema: &StoreSchema,
        date_key: &str,
        limit: usize,
    ) -> StoreResult<usize> {
        self.with_conn(|conn| {
            conn.execute(
                &format!(
                    "DELETE FROM records WHERE store = ?1 AND key IN ( \
                       SELECT key FROM records WHERE store = ?1 \
                       ORDER BY json_extract(data, '$.{date_key}') DESC \
                       LIMIT -1 OFFSET ?2)"
                ),
                params![schema.name, limit as i64],
            )
        })
    }
}
