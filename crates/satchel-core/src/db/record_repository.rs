//! Record collection repository implementation

use crate::error::{Error, Result};
use crate::models::{IndexField, Record, RecordData, RecordId, RecordKind};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

/// Filter for snapshot reads of a collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordFilter {
    All,
    /// Records with local writes the remote has not accepted yet
    Unsynced,
    /// Equality on a secondary index
    Eq(IndexField, String),
}

impl RecordFilter {
    pub fn by(field: IndexField, value: impl Into<String>) -> Self {
        Self::Eq(field, value.into())
    }
}

/// How an upsert treats an existing row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertMode {
    /// Last write wins
    Overwrite,
    /// Leave rows with pending local writes untouched
    KeepPending,
}

/// Trait for record storage operations
pub trait RecordRepository {
    /// Insert or replace a record by id; returns whether a row was written
    fn upsert<T: RecordData>(&self, record: &Record<T>, mode: UpsertMode) -> Result<bool>;

    /// Get a record by id
    fn get<T: RecordData>(&self, id: &RecordId) -> Result<Option<Record<T>>>;

    /// Snapshot of a collection, most recently modified first
    fn list<T: RecordData>(&self, filter: &RecordFilter) -> Result<Vec<Record<T>>>;

    /// Delete a record by id; returns whether it existed
    fn delete(&self, kind: RecordKind, id: &RecordId) -> Result<bool>;

    /// Remove every record of a collection
    fn clear(&self, kind: RecordKind) -> Result<usize>;

    /// Flag the record as accepted by the remote if it is still at `version`
    fn mark_synced(&self, kind: RecordKind, id: &RecordId, version: i64) -> Result<bool>;

    /// Number of records in a collection
    fn count(&self, kind: RecordKind) -> Result<usize>;
}

/// `SQLite` implementation of `RecordRepository`
pub struct SqliteRecordRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteRecordRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse a record from a `SELECT id, synced, last_modified, offline_created, payload` row
    fn parse_record<T: RecordData>(row: &rusqlite::Row<'_>) -> rusqlite::Result<Record<T>> {
        let id: String = row.get(0)?;
        let payload: String = row.get(4)?;
        let data = serde_json::from_str::<T>(&payload).map_err(|error| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(error))
        })?;
        let id = id.parse::<RecordId>().map_err(|error| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(error))
        })?;

        Ok(Record {
            id,
            data,
            synced: row.get(1)?,
            last_modified: row.get(2)?,
            offline_created: row.get(3)?,
        })
    }

    fn check_filter(kind: RecordKind, filter: &RecordFilter) -> Result<()> {
        if let RecordFilter::Eq(field, _) = filter {
            if field.kind() != kind {
                return Err(Error::InvalidInput(format!(
                    "{} is not an index of {}",
                    field.column(),
                    kind.collection()
                )));
            }
        }
        Ok(())
    }
}

impl RecordRepository for SqliteRecordRepository<'_> {
    fn upsert<T: RecordData>(&self, record: &Record<T>, mode: UpsertMode) -> Result<bool> {
        let kind = T::KIND;
        let index_columns = kind
            .indexes()
            .iter()
            .map(|field| field.column())
            .collect::<Vec<_>>();

        let mut values = vec![Value::Text(record.id.to_string())];
        values.extend(
            kind.indexes()
                .iter()
                .map(|field| record.data.index_value(*field).map_or(Value::Null, Value::Text)),
        );
        values.push(Value::Integer(i64::from(record.synced)));
        values.push(Value::Integer(record.last_modified));
        values.push(Value::Integer(i64::from(record.offline_created)));
        values.push(Value::Text(serde_json::to_string(&record.data)?));

        let columns = std::iter::once("id")
            .chain(index_columns.iter().copied())
            .chain(["synced", "last_modified", "offline_created", "payload"])
            .collect::<Vec<_>>();
        let placeholders = (1..=columns.len())
            .map(|index| format!("?{index}"))
            .collect::<Vec<_>>()
            .join(", ");
        let updates = columns
            .iter()
            .skip(1)
            .map(|column| format!("{column} = excluded.{column}"))
            .collect::<Vec<_>>()
            .join(", ");
        let guard = match mode {
            UpsertMode::Overwrite => "",
            UpsertMode::KeepPending => " WHERE synced = 1",
        };

        let sql = format!(
            "INSERT INTO {table} ({columns}) VALUES ({placeholders})
             ON CONFLICT(id) DO UPDATE SET {updates}{guard}",
            table = kind.collection(),
            columns = columns.join(", "),
        );

        let written = self.conn.execute(&sql, params_from_iter(values))?;
        Ok(written > 0)
    }

    fn get<T: RecordData>(&self, id: &RecordId) -> Result<Option<Record<T>>> {
        let sql = format!(
            "SELECT id, synced, last_modified, offline_created, payload FROM {} WHERE id = ?1",
            T::KIND.collection()
        );
        let record = self
            .conn
            .query_row(&sql, params![id.as_str()], Self::parse_record::<T>)
            .optional()?;
        Ok(record)
    }

    fn list<T: RecordData>(&self, filter: &RecordFilter) -> Result<Vec<Record<T>>> {
        let kind = T::KIND;
        Self::check_filter(kind, filter)?;

        let (clause, values) = match filter {
            RecordFilter::All => (String::new(), Vec::new()),
            RecordFilter::Unsynced => (" WHERE synced = 0".to_string(), Vec::new()),
            RecordFilter::Eq(field, value) => (
                format!(" WHERE {} = ?1", field.column()),
                vec![Value::Text(value.clone())],
            ),
        };
        let sql = format!(
            "SELECT id, synced, last_modified, offline_created, payload
             FROM {}{clause}
             ORDER BY last_modified DESC, id ASC",
            kind.collection()
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let records = stmt
            .query_map(params_from_iter(values), Self::parse_record::<T>)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(records)
    }

    fn delete(&self, kind: RecordKind, id: &RecordId) -> Result<bool> {
        let sql = format!("DELETE FROM {} WHERE id = ?1", kind.collection());
        let rows = self.conn.execute(&sql, params![id.as_str()])?;
        Ok(rows > 0)
    }

    fn clear(&self, kind: RecordKind) -> Result<usize> {
        let sql = format!("DELETE FROM {}", kind.collection());
        Ok(self.conn.execute(&sql, [])?)
    }

    fn mark_synced(&self, kind: RecordKind, id: &RecordId, version: i64) -> Result<bool> {
        let sql = format!(
            "UPDATE {} SET synced = 1 WHERE id = ?1 AND last_modified = ?2",
            kind.collection()
        );
        let rows = self.conn.execute(&sql, params![id.as_str(), version])?;
        Ok(rows > 0)
    }

    fn count(&self, kind: RecordKind) -> Result<usize> {
        let sql = format!("SELECT COUNT(*) FROM {}", kind.collection());
        let count: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}
