//! Relational attribute storage linked to map layers.
//!
//! A map links each layer (category field) to a table through its `dbln`
//! file. Rows are keyed by category value in the link's key column.

use std::fs;
use std::path::Path;
use std::time::SystemTime;

use chrono::NaiveDate;
use tracing::warn;

use crate::errors::{GrassError, Result};
use crate::native::storage::DBLN_FILE;
use crate::utils::_decode_text;
use crate::vector::{FieldType, FieldValue};

mod sqlite;

pub use sqlite::SqliteStore;

/// Link between a layer and its attribute table, one line of `dbln`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldLink {
    pub field: i32,
    pub name: Option<String>,
    pub table: String,
    pub key: String,
    pub database: String,
    pub driver: String,
}

impl FieldLink {
    /// Parses one `dbln` line: `field[/name]|table|key|database|driver`.
    /// Whitespace separated lines are accepted too.
    pub fn parse(line: &str) -> Option<FieldLink> {
        let parts: Vec<&str> = if line.contains('|') {
            line.split('|').map(str::trim).collect()
        } else {
            line.split_whitespace().collect()
        };
        let [field, table, key, database, driver] = parts.as_slice() else {
            return None;
        };
        let (field, name) = match field.split_once('/') {
            Some((f, n)) => (f, Some(n.to_string())),
            None => (*field, None),
        };
        Some(FieldLink {
            field: field.parse().ok()?,
            name,
            table: table.to_string(),
            key: key.to_string(),
            database: database.to_string(),
            driver: driver.to_string(),
        })
    }

    pub fn to_line(&self) -> String {
        let field = match &self.name {
            Some(name) => format!("{}/{}", self.field, name),
            None => self.field.to_string(),
        };
        format!(
            "{}|{}|{}|{}|{}",
            field, self.table, self.key, self.database, self.driver
        )
    }
}

/// Reads all links of a map directory; a missing `dbln` means no links.
pub fn read_links(map_dir: &Path) -> Result<Vec<FieldLink>> {
    let text = match fs::read_to_string(map_dir.join(DBLN_FILE)) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .filter_map(|l| {
            let link = FieldLink::parse(l);
            if link.is_none() {
                warn!(line = l, "ignoring malformed dbln line");
            }
            link
        })
        .collect())
}

pub fn write_links(map_dir: &Path, links: &[FieldLink]) -> Result<()> {
    let mut text = String::new();
    for link in links {
        text.push_str(&link.to_line());
        text.push('\n');
    }
    fs::write(map_dir.join(DBLN_FILE), text)?;
    Ok(())
}

/// A value as stored in the database, before typing.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub declared_type: String,
}

impl Column {
    pub fn field_type(&self) -> FieldType {
        field_type_of(&self.declared_type)
    }
}

/// Result of a full table scan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableData {
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<RawValue>>,
}

/// The relational store behind a layer.
pub trait AttributeStore: Send {
    fn execute(&self, sql: &str) -> Result<()>;

    fn load_table(&self, table: &str) -> Result<TableData>;

    fn table_exists(&self, table: &str) -> Result<bool>;

    /// Number of rows whose key column equals `cat`.
    fn count_where(&self, table: &str, key: &str, cat: i32) -> Result<i64>;

    /// Last modification of the underlying storage, if known.
    fn last_modified(&self) -> Option<SystemTime>;
}

/// Opens the store of a link whose database path is already expanded.
pub fn open_store(driver: &str, database: &str) -> Result<Box<dyn AttributeStore>> {
    match driver {
        "sqlite" => Ok(Box::new(SqliteStore::open(database)?)),
        other => Err(GrassError::UnsupportedDriver(other.to_string())),
    }
}

/// Maps a declared SQL column type to a field type.
pub fn field_type_of(declared: &str) -> FieldType {
    let declared = declared.trim().to_ascii_uppercase();
    if declared.starts_with("BIGINT") || declared.starts_with("INT8") {
        FieldType::Integer64
    } else if declared.starts_with("INT") || declared == "SMALLINT" {
        FieldType::Integer
    } else if declared.starts_with("REAL")
        || declared.starts_with("DOUBLE")
        || declared.starts_with("FLOAT")
        || declared.starts_with("NUMERIC")
        || declared.starts_with("DECIMAL")
    {
        FieldType::Real
    } else if declared == "DATE" {
        FieldType::Date
    } else {
        FieldType::String
    }
}

/// Converts a raw value to the column's type. Values that do not fit are
/// logged and read as `Null`.
pub fn decode_value(column: &Column, raw: &RawValue) -> FieldValue {
    let field_type = column.field_type();
    let value = match (field_type, raw) {
        (_, RawValue::Null) => Some(FieldValue::Null),
        (FieldType::Integer, RawValue::Integer(i)) => i32::try_from(*i)
            .ok()
            .map(FieldValue::IntegerValue),
        (FieldType::Integer, RawValue::Real(r)) if r.fract() == 0.0 => {
            Some(FieldValue::IntegerValue(*r as i32))
        }
        (FieldType::Integer, RawValue::Text(t)) => _decode_text(t)
            .trim()
            .parse()
            .ok()
            .map(FieldValue::IntegerValue),
        (FieldType::Integer64, RawValue::Integer(i)) => Some(FieldValue::Integer64Value(*i)),
        (FieldType::Integer64, RawValue::Text(t)) => _decode_text(t)
            .trim()
            .parse()
            .ok()
            .map(FieldValue::Integer64Value),
        (FieldType::Real, RawValue::Real(r)) => Some(FieldValue::RealValue(*r)),
        (FieldType::Real, RawValue::Integer(i)) => Some(FieldValue::RealValue(*i as f64)),
        (FieldType::Real, RawValue::Text(t)) => _decode_text(t)
            .trim()
            .parse()
            .ok()
            .map(FieldValue::RealValue),
        (FieldType::Date, RawValue::Text(t)) => {
            NaiveDate::parse_from_str(_decode_text(t).trim(), "%Y-%m-%d")
                .ok()
                .map(FieldValue::DateValue)
        }
        (FieldType::String, RawValue::Text(t)) => Some(FieldValue::StringValue(_decode_text(t))),
        (FieldType::String, RawValue::Integer(i)) => Some(FieldValue::StringValue(i.to_string())),
        (FieldType::String, RawValue::Real(r)) => Some(FieldValue::StringValue(r.to_string())),
        _ => None,
    };
    value.unwrap_or_else(|| {
        let err = GrassError::SchemaMismatch {
            column: column.name.clone(),
            value: raw_to_string(raw),
            expected: field_type.name(),
        };
        warn!("{}", err);
        FieldValue::Null
    })
}

fn raw_to_string(raw: &RawValue) -> String {
    match raw {
        RawValue::Null => "NULL".to_string(),
        RawValue::Integer(i) => i.to_string(),
        RawValue::Real(r) => r.to_string(),
        RawValue::Text(t) => _decode_text(t),
    }
}

/// Quotes an SQL identifier.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
