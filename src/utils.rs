use std::path::Path;
use std::time::SystemTime;

use crate::config::{get_config_option, VECTOR_ENCODING};

/// Decodes text read from an attribute table using the configured
/// `GRASS_VECTOR_ENCODING`.
pub fn _decode_text(bytes: &[u8]) -> String {
    let encoding = get_config_option(VECTOR_ENCODING, "UTF-8").unwrap_or_default();
    match encoding.to_ascii_uppercase().as_str() {
        "ISO-8859-1" | "LATIN1" | "LATIN-1" => bytes.iter().map(|&b| char::from(b)).collect(),
        _ => String::from_utf8_lossy(bytes).into_owned(),
    }
}

/// Modification time of a file or directory, `None` if it does not exist.
pub fn _modified_time<P: AsRef<Path>>(path: P) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Expands `$GISDBASE`, `$LOCATION_NAME` and `$MAPSET` in a database path.
pub fn _expand_gis_vars(path: &str, gisdbase: &Path, location: &str, mapset: &str) -> String {
    path.replace("$GISDBASE", &gisdbase.to_string_lossy())
        .replace("$LOCATION_NAME", location)
        .replace("$MAPSET", mapset)
}
