use std::fmt;
use std::path::{Path, PathBuf};

use crate::utils::_expand_gis_vars;

/// Location of a vector map: GIS database, location, mapset and map name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MapIdentity {
    pub gisdbase: PathBuf,
    pub location: String,
    pub mapset: String,
    pub name: String,
}

impl MapIdentity {
    pub fn new<P: AsRef<Path>>(gisdbase: P, location: &str, mapset: &str, name: &str) -> Self {
        MapIdentity {
            gisdbase: gisdbase.as_ref().to_path_buf(),
            location: location.to_string(),
            mapset: mapset.to_string(),
            name: name.to_string(),
        }
    }

    pub fn mapset_dir(&self) -> PathBuf {
        self.gisdbase.join(&self.location).join(&self.mapset)
    }

    /// Directory holding the map's files.
    pub fn map_dir(&self) -> PathBuf {
        self.mapset_dir().join("vector").join(&self.name)
    }

    /// Expands `$GISDBASE`, `$LOCATION_NAME` and `$MAPSET` in a path.
    pub fn expand(&self, path: &str) -> String {
        _expand_gis_vars(path, &self.gisdbase, &self.location, &self.mapset)
    }
}

impl fmt::Display for MapIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.mapset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths() {
        let identity = MapIdentity::new("/data/grass", "nc", "user1", "roads");
        assert_eq!(
            identity.map_dir(),
            PathBuf::from("/data/grass/nc/user1/vector/roads")
        );
        assert_eq!(identity.to_string(), "roads@user1");
        assert_eq!(
            identity.expand("$GISDBASE/$LOCATION_NAME/$MAPSET/sqlite/sqlite.db"),
            "/data/grass/nc/user1/sqlite/sqlite.db"
        );
    }
}
