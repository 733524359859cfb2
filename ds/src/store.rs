//! SQLite-backed record store

use std::fs;
use std::path::Path;
use std::time::Duration;

use eyre::{Context, Result, eyre};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use tracing::{debug, info};

use crate::filter::Filter;
use crate::record::{Record, now_ms};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS records (
    collection TEXT NOT NULL,
    id TEXT NOT NULL,
    data TEXT NOT NULL,
    updated_at INTEGER NOT NULL,
    PRIMARY KEY (collection, id)
);
";

/// Record store over a single SQLite connection
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (or create) a store at the given database file path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Store::open: called");
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).context(format!("Failed to create {}", parent.display()))?;
        }

        let conn = Connection::open(path).context(format!("Failed to open store at {}", path.display()))?;
        // Several scheduler processes may share one file
        conn.busy_timeout(Duration::from_secs(5))?;
        let mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        debug!(%mode, "Store::open: journal mode set");

        let store = Self::init(conn)?;
        info!(path = %path.display(), "Store opened");
        Ok(store)
    }

    /// Open a private in-memory store
    pub fn open_in_memory() -> Result<Self> {
        debug!("Store::open_in_memory: called");
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA).context("Failed to create schema")?;
        Ok(Self { conn })
    }

    /// Insert a new record, failing if the id is already taken
    pub fn create<T: Record>(&mut self, record: T) -> Result<String> {
        debug!(collection = T::collection_name(), id = record.id(), "Store::create: called");
        if !self.insert_if_absent(&record)? {
            return Err(eyre!(
                "Record {}/{} already exists",
                T::collection_name(),
                record.id()
            ));
        }
        Ok(record.id().to_string())
    }

    /// Insert a record unless one with the same id exists. Returns true if inserted.
    pub fn insert_if_absent<T: Record>(&mut self, record: &T) -> Result<bool> {
        debug!(collection = T::collection_name(), id = record.id(), "Store::insert_if_absent: called");
        let data = serde_json::to_string(record)?;
        let rows = self.conn.execute(
            "INSERT INTO records (collection, id, data, updated_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(collection, id) DO NOTHING",
            params![T::collection_name(), record.id(), data, record.updated_at()],
        )?;
        Ok(rows == 1)
    }

    /// Insert or fully replace a record
    pub fn upsert<T: Record>(&mut self, record: &T) -> Result<()> {
        debug!(collection = T::collection_name(), id = record.id(), "Store::upsert: called");
        let data = serde_json::to_string(record)?;
        self.conn.execute(
            "INSERT INTO records (collection, id, data, updated_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(collection, id) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at",
            params![T::collection_name(), record.id(), data, record.updated_at()],
        )?;
        Ok(())
    }

    /// Fetch a record by id
    pub fn get<T: Record>(&self, id: &str) -> Result<Option<T>> {
        debug!(collection = T::collection_name(), %id, "Store::get: called");
        let data: Option<String> = self
            .conn
            .query_row(
                "SELECT data FROM records WHERE collection = ?1 AND id = ?2",
                params![T::collection_name(), id],
                |row| row.get(0),
            )
            .optional()?;

        match data {
            Some(data) => {
                let record = serde_json::from_str(&data)
                    .context(format!("Failed to decode {}/{}", T::collection_name(), id))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// List records matching all filters, in insertion order
    pub fn list<T: Record>(&self, filters: &[Filter]) -> Result<Vec<T>> {
        debug!(collection = T::collection_name(), filter_count = filters.len(), "Store::list: called");
        let (clause, params) = where_clause(T::collection_name(), filters);
        let sql = format!("SELECT data FROM records WHERE {} ORDER BY rowid", clause);

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(params), |row| row.get::<_, String>(0))?;

        let mut records = Vec::new();
        for data in rows {
            let data = data?;
            records.push(serde_json::from_str(&data).context(format!(
                "Failed to decode record in {}",
                T::collection_name()
            ))?);
        }
        Ok(records)
    }

    /// Count records matching all filters
    pub fn count<T: Record>(&self, filters: &[Filter]) -> Result<usize> {
        debug!(collection = T::collection_name(), filter_count = filters.len(), "Store::count: called");
        let (clause, params) = where_clause(T::collection_name(), filters);
        let sql = format!("SELECT COUNT(*) FROM records WHERE {}", clause);
        let count: i64 = self.conn.query_row(&sql, params_from_iter(params), |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Replace a record only if the stored document matches `guards`.
    /// Returns the number of rows affected (0 or 1).
    pub fn replace_where<T: Record>(&mut self, record: &T, guards: &[Filter]) -> Result<usize> {
        debug!(
            collection = T::collection_name(),
            id = record.id(),
            guard_count = guards.len(),
            "Store::replace_where: called"
        );
        let data = serde_json::to_string(record)?;
        let mut params = vec![
            SqlValue::Text(data),
            SqlValue::Integer(record.updated_at()),
            SqlValue::Text(T::collection_name().to_string()),
            SqlValue::Text(record.id().to_string()),
        ];
        let mut sql = String::from("UPDATE records SET data = ?, updated_at = ? WHERE collection = ? AND id = ?");
        for guard in guards {
            sql.push_str(" AND ");
            sql.push_str(&guard.to_sql(&mut params));
        }

        let rows = self.conn.execute(&sql, params_from_iter(params))?;
        Ok(rows)
    }

    /// Set individual top-level fields of one record in a single statement,
    /// only if the stored document matches `guards`.
    /// Returns the number of rows affected (0 or 1).
    pub fn update_fields<T: Record>(
        &mut self,
        id: &str,
        fields: &[(&str, serde_json::Value)],
        guards: &[Filter],
    ) -> Result<usize> {
        debug!(
            collection = T::collection_name(),
            %id,
            field_count = fields.len(),
            guard_count = guards.len(),
            "Store::update_fields: called"
        );
        if fields.is_empty() {
            return Err(eyre!("update_fields requires at least one field"));
        }

        let mut params = Vec::new();
        let mut setters = Vec::new();
        for (field, value) in fields {
            setters.push("?, json(?)");
            params.push(SqlValue::Text(format!("$.{}", field)));
            params.push(SqlValue::Text(value.to_string()));
        }
        params.push(SqlValue::Integer(now_ms()));
        params.push(SqlValue::Text(T::collection_name().to_string()));
        params.push(SqlValue::Text(id.to_string()));

        let mut sql = format!(
            "UPDATE records SET data = json_set(data, {}), updated_at = ? WHERE collection = ? AND id = ?",
            setters.join(", ")
        );
        for guard in guards {
            sql.push_str(" AND ");
            sql.push_str(&guard.to_sql(&mut params));
        }

        let rows = self.conn.execute(&sql, params_from_iter(params))?;
        debug!(%id, rows, "Store::update_fields: done");
        Ok(rows)
    }

    /// Delete a record only if the stored document matches `guards`.
    /// Returns the number of rows affected (0 or 1).
    pub fn delete_where<T: Record>(&mut self, id: &str, guards: &[Filter]) -> Result<usize> {
        debug!(
            collection = T::collection_name(),
            %id,
            guard_count = guards.len(),
            "Store::delete_where: called"
        );
        let mut params = vec![
            SqlValue::Text(T::collection_name().to_string()),
            SqlValue::Text(id.to_string()),
        ];
        let mut sql = String::from("DELETE FROM records WHERE collection = ? AND id = ?");
        for guard in guards {
            sql.push_str(" AND ");
            sql.push_str(&guard.to_sql(&mut params));
        }

        let rows = self.conn.execute(&sql, params_from_iter(params))?;
        Ok(rows)
    }
}

fn where_clause(collection: &str, filters: &[Filter]) -> (String, Vec<SqlValue>) {
    let mut params = vec![SqlValue::Text(collection.to_string())];
    let mut clause = String::from("collection = ?");
    for filter in filters {
        clause.push_str(" AND ");
        clause.push_str(&filter.to_sql(&mut params));
    }
    (clause, params)
}
