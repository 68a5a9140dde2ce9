//! Runtime Configuration
//!
//! The crate can be configured at runtime using environment variables or by
//! using functions in this module. Options set by calling functions in this
//! module override options set in environment variables.
//!
//! ```
//! use grass_vector::config::*;
//!
//! // Refuse to build topology for maps opened without it
//! set_config_option("GRASS_BUILD_TOPOLOGY", "NO").unwrap();
//! assert_eq!(get_config_option("GRASS_BUILD_TOPOLOGY", "YES").unwrap(), "NO");
//!
//! clear_config_option("GRASS_BUILD_TOPOLOGY").unwrap();
//! ```
//!
//! Recognised options:
//!
//! * `GRASS_BUILD_TOPOLOGY` (`YES`/`NO`, default `YES`): whether a map that has
//!   no topology may be opened by building topology on the fly.
//! * `GRASS_VECTOR_ENCODING`: encoding of text stored in attribute tables.
//!   `UTF-8` (default) and `ISO-8859-1` are decoded, other values fall back to
//!   lossy UTF-8.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use crate::errors::{ErrorClass, GrassError, Result};

/// Answer to the "map has no topology, build it?" question.
pub const BUILD_TOPOLOGY: &str = "GRASS_BUILD_TOPOLOGY";
/// Text encoding of attribute tables.
pub const VECTOR_ENCODING: &str = "GRASS_VECTOR_ENCODING";

static CONFIG_OPTIONS: Mutex<Option<HashMap<String, String>>> = Mutex::new(None);

fn check_key(key: &str) -> Result<()> {
    if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(GrassError::BadArgument(format!(
            "Invalid characters in option name: '{}'",
            key
        )));
    }
    Ok(())
}

/// Set a configuration option.
pub fn set_config_option(key: &str, value: &str) -> Result<()> {
    check_key(key)?;
    if value.contains(['\0', '\n', '\r']) {
        return Err(GrassError::BadArgument(format!(
            "Invalid characters in value: '{}'",
            value
        )));
    }
    let mut options = CONFIG_OPTIONS
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    options
        .get_or_insert_with(HashMap::new)
        .insert(key.to_string(), value.to_string());
    Ok(())
}

/// Get the value of a configuration option.
///
/// Options set with [`set_config_option`] take precedence over environment
/// variables of the same name. If neither is found, `default` is returned.
pub fn get_config_option(key: &str, default: &str) -> Result<String> {
    check_key(key)?;
    let options = CONFIG_OPTIONS
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    if let Some(value) = options.as_ref().and_then(|o| o.get(key)) {
        return Ok(value.clone());
    }
    Ok(std::env::var(key).unwrap_or_else(|_| default.to_string()))
}

/// Clear the value of a configuration option.
pub fn clear_config_option(key: &str) -> Result<()> {
    check_key(key)?;
    let mut options = CONFIG_OPTIONS
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    if let Some(options) = options.as_mut() {
        options.remove(key);
    }
    Ok(())
}

/// Interpret a configuration option as a boolean (`YES`/`ON`/`TRUE`/`1`).
pub fn get_config_bool(key: &str, default: bool) -> bool {
    match get_config_option(key, "") {
        Ok(value) if !value.is_empty() => matches!(
            value.to_ascii_uppercase().as_str(),
            "YES" | "ON" | "TRUE" | "1"
        ),
        _ => default,
    }
}

type ErrorCallbackType = dyn FnMut(ErrorClass, &'static str, &str) + 'static + Send;

/// Static variable that holds the current error callback function
static ERROR_CALLBACK: Mutex<Option<Box<ErrorCallbackType>>> = Mutex::new(None);

/// Set a custom handler for failures of the native topology engine.
///
/// The callback receives the error class, the name of the failing native call
/// and the message. Without a handler, failures are reported through
/// `tracing::error!`.
pub fn set_error_handler<F>(callback: F)
where
    F: FnMut(ErrorClass, &'static str, &str) + 'static + Send,
{
    let mut callback_lock = ERROR_CALLBACK
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    callback_lock.replace(Box::new(callback));
}

/// Remove the custom error handler.
pub fn remove_error_handler() {
    let mut callback_lock = ERROR_CALLBACK
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    callback_lock.take();
}

pub(crate) fn report_error(class: ErrorClass, method_name: &'static str, msg: &str) {
    let mut callback_lock = ERROR_CALLBACK
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    match callback_lock.as_mut() {
        Some(callback) => callback(class, method_name, msg),
        None => tracing::error!(%class, method_name, "{}", msg),
    }
}
