//! On-disk layout of a native vector map directory.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::errors::{GrassError, Result};

pub(crate) const HEAD_FILE: &str = "head";
pub(crate) const COOR_FILE: &str = "coor";
pub(crate) const TOPO_FILE: &str = "topo";
pub(crate) const CIDX_FILE: &str = "cidx";
pub(crate) const DBLN_FILE: &str = "dbln";

/// Map header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Head {
    pub name: String,
    pub is_3d: bool,
    #[serde(default)]
    pub organization: String,
    #[serde(default)]
    pub comment: String,
}

impl Head {
    pub fn new(name: &str, is_3d: bool) -> Head {
        Head {
            name: name.to_string(),
            is_3d,
            organization: String::new(),
            comment: String::new(),
        }
    }
}

pub(crate) fn file_path(dir: &Path, file: &str) -> PathBuf {
    dir.join(file)
}

pub(crate) fn read_json<T: DeserializeOwned>(dir: &Path, file: &str) -> Result<T> {
    let bytes = fs::read(file_path(dir, file))?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Writes through a temporary file and a rename, so readers never see a
/// partially written file and the directory timestamp moves.
pub(crate) fn write_json<T: Serialize>(dir: &Path, file: &str, value: &T) -> Result<()> {
    let tmp = file_path(dir, &format!(".{file}.tmp"));
    fs::write(&tmp, serde_json::to_vec(value)?)?;
    fs::rename(&tmp, file_path(dir, file))?;
    Ok(())
}

pub(crate) fn remove_if_exists(dir: &Path, file: &str) -> Result<()> {
    match fs::remove_file(file_path(dir, file)) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Topology level available on disk: 2 with topology and category index,
/// 1 with primitives only.
pub(crate) fn available_level(dir: &Path) -> Result<i32> {
    if !dir.is_dir() {
        return Err(GrassError::MissingDataset(dir.to_path_buf()));
    }
    for required in [HEAD_FILE, COOR_FILE] {
        if !file_path(dir, required).is_file() {
            return Err(GrassError::Open {
                map: dir.display().to_string(),
                msg: format!("missing '{required}' file"),
            });
        }
    }
    let built = file_path(dir, TOPO_FILE).is_file() && file_path(dir, CIDX_FILE).is_file();
    Ok(if built { 2 } else { 1 })
}
