use std::path::PathBuf;

use thiserror::Error;

use crate::native::LineType;

/// Severity of a failure reported by the native topology engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    None,
    Debug,
    Warning,
    Failure,
    Fatal,
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorClass::None => "none",
            ErrorClass::Debug => "debug",
            ErrorClass::Warning => "warning",
            ErrorClass::Failure => "failure",
            ErrorClass::Fatal => "fatal",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum GrassError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Cannot open vector map '{map}': {msg}")]
    Open { map: String, msg: String },
    #[error("Cannot start editing '{map}': {msg}")]
    EditSession { map: String, msg: String },
    #[error("Native call '{method_name}' failed: '{msg}'")]
    NativeCall {
        method_name: &'static str,
        msg: String,
    },
    #[error("Native id {id} is outside of the valid range 0..{size}")]
    MalformedId { id: i32, size: usize },
    #[error("Value '{value}' of column '{column}' cannot be read as {expected}")]
    SchemaMismatch {
        column: String,
        value: String,
        expected: &'static str,
    },

    #[error("Map '{0}' is not valid (closed or failed to open)")]
    InvalidMap(String),
    #[error("Map '{0}' is not opened for editing")]
    NotEditing(String),
    #[error("Line {lid} is not alive")]
    DeadLine { lid: i32 },
    #[error("Invalid layer name: '{0}'")]
    InvalidLayerName(String),
    #[error("Invalid field name '{field_name}' used on method {method_name}")]
    InvalidFieldName {
        field_name: String,
        method_name: &'static str,
    },
    #[error("Invalid field index {index} used on method {method_name}")]
    InvalidFieldIndex {
        index: usize,
        method_name: &'static str,
    },
    #[error("Layer {field} has no attribute table")]
    NoTable { field: i32 },
    #[error("Unsupported attribute driver: '{0}'")]
    UnsupportedDriver(String),
    #[error("Cannot store {line_type:?} with {points} points")]
    InvalidPrimitive { line_type: LineType, points: usize },
    #[error("Unsupported WKB geometry type code: {0}")]
    UnsupportedGeometry(u32),
    #[error("Malformed WKB: {0}")]
    MalformedWkb(String),
    #[error("Vector directory does not exist: {0}")]
    MissingDataset(PathBuf),
    #[error("Import failed: {0}")]
    ImportFailed(String),
    #[error("Bad argument: {0}")]
    BadArgument(String),
}

/// A convenient alias for `Result` with a [`GrassError`] error type.
pub type Result<T> = std::result::Result<T, GrassError>;
