use std::path::{Path, PathBuf};
use std::time::SystemTime;

use rusqlite::types::ValueRef;
use rusqlite::{params, Connection};

use super::{quote_ident, AttributeStore, Column, RawValue, TableData};
use crate::errors::Result;
use crate::utils::_modified_time;

/// Attribute store backed by an SQLite database file.
pub struct SqliteStore {
    conn: Connection,
    path: PathBuf,
}

impl SqliteStore {
    /// Opens (or creates) the database, creating parent directories.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<SqliteStore> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Ok(SqliteStore {
            conn,
            path: path.to_path_buf(),
        })
    }
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").field("path", &self.path).finish()
    }
}

impl AttributeStore for SqliteStore {
    fn execute(&self, sql: &str) -> Result<()> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    fn load_table(&self, table: &str) -> Result<TableData> {
        let mut columns = Vec::new();
        {
            let mut stmt = self
                .conn
                .prepare(&format!("PRAGMA table_info({})", quote_ident(table)))?;
            let mut rows = stmt.query([])?;
            while let Some(row) = rows.next()? {
                columns.push(Column {
                    name: row.get(1)?,
                    declared_type: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                });
            }
        }

        let select = columns
            .iter()
            .map(|c| quote_ident(&c.name))
            .collect::<Vec<_>>()
            .join(", ");
        let mut data = TableData {
            columns,
            rows: Vec::new(),
        };
        if data.columns.is_empty() {
            return Ok(data);
        }
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM {}", select, quote_ident(table)))?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(data.columns.len());
            for i in 0..data.columns.len() {
                values.push(match row.get_ref(i)? {
                    ValueRef::Null => RawValue::Null,
                    ValueRef::Integer(v) => RawValue::Integer(v),
                    ValueRef::Real(v) => RawValue::Real(v),
                    ValueRef::Text(v) | ValueRef::Blob(v) => RawValue::Text(v.to_vec()),
                });
            }
            data.rows.push(values);
        }
        Ok(data)
    }

    fn table_exists(&self, table: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT count(*) FROM sqlite_master WHERE type IN ('table', 'view') AND name = ?1",
            params![table],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn count_where(&self, table: &str, key: &str, cat: i32) -> Result<i64> {
        let sql = format!(
            "SELECT count(*) FROM {} WHERE {} = ?1",
            quote_ident(table),
            quote_ident(key)
        );
        Ok(self.conn.query_row(&sql, params![cat], |row| row.get(0))?)
    }

    fn last_modified(&self) -> Option<SystemTime> {
        _modified_time(&self.path)
    }
}
