//! Native topology engine.
//!
//! Stores vector maps as a directory of primitive, topology and category index
//! files and answers the primitive queries the feature layer is built on.
//!
//! The engine is not reentrant: every call made on a [`NativeMap`] must happen
//! while holding the process-wide guard returned by [`lock`], even for maps in
//! different directories.

use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::config::report_error;
use crate::errors::{ErrorClass, GrassError, Result};
use crate::options::OpenFlags;

mod cidx;
mod edit;
pub(crate) mod geom;
mod primitives;
mod select;
pub(crate) mod storage;
mod topology;

pub use cidx::CidxEntry;
pub use edit::TopoLevel;
pub use primitives::{BoundBox, Categories, Category, LineType, Vertex};
pub use storage::Head;

use cidx::CategoryIndex;
use primitives::LineRecord;
use storage::{CIDX_FILE, COOR_FILE, HEAD_FILE, TOPO_FILE};
use topology::Topology;

static NATIVE_LOCK: Mutex<()> = Mutex::new(());

/// Acquires the process-wide native engine lock.
pub fn lock() -> MutexGuard<'static, ()> {
    NATIVE_LOCK.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Runs a native call. Failures are reported to the error handler; a panic
/// inside the engine is reported as fatal and becomes
/// [`GrassError::NativeCall`].
pub(crate) fn call<T, F>(method_name: &'static str, f: F) -> Result<T>
where
    F: FnOnce() -> Result<T>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            report_error(ErrorClass::Failure, method_name, &e.to_string());
            Err(e)
        }
        Err(payload) => {
            let msg = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown fatal error".to_string());
            report_error(ErrorClass::Fatal, method_name, &msg);
            Err(GrassError::NativeCall { method_name, msg })
        }
    }
}

/// An open native vector map.
#[derive(Debug)]
pub struct NativeMap {
    dir: PathBuf,
    head: Head,
    lines: Vec<LineRecord>,
    topo: Option<Topology>,
    cidx: Option<CategoryIndex>,
    mode: OpenFlags,
    cidx_update: bool,
}

impl NativeMap {
    /// Checks that a map exists and returns the topology level it can be
    /// opened at, without loading it.
    pub fn open_old_head(dir: &Path) -> Result<i32> {
        storage::available_level(dir)
    }

    /// Opens a map read-only at the given level (1 or 2).
    pub fn open_old(dir: &Path, level: i32) -> Result<NativeMap> {
        let available = storage::available_level(dir)?;
        if level > available {
            return Err(GrassError::Open {
                map: dir.display().to_string(),
                msg: format!("topology level {level} is not available (level {available})"),
            });
        }
        let mut map = NativeMap::load(dir, available.min(level.max(1)))?;
        map.mode = OpenFlags::READ_ONLY;
        Ok(map)
    }

    /// Opens a map for writing at the best available level. The category
    /// index file is removed until the map is closed, which marks the map as
    /// being written for other readers.
    pub fn open_update(dir: &Path) -> Result<NativeMap> {
        let level = storage::available_level(dir)?;
        let mut map = NativeMap::load(dir, level)?;
        map.mode = OpenFlags::UPDATE;
        storage::remove_if_exists(dir, CIDX_FILE)?;
        Ok(map)
    }

    /// Creates a new empty map, replacing an existing one.
    pub fn open_new(dir: &Path, name: &str, is_3d: bool) -> Result<NativeMap> {
        std::fs::create_dir_all(dir)?;
        for file in [HEAD_FILE, COOR_FILE, TOPO_FILE, CIDX_FILE] {
            storage::remove_if_exists(dir, file)?;
        }
        let map = NativeMap {
            dir: dir.to_path_buf(),
            head: Head::new(name, is_3d),
            lines: Vec::new(),
            topo: None,
            cidx: None,
            mode: OpenFlags::UPDATE,
            cidx_update: false,
        };
        storage::write_json(dir, HEAD_FILE, &map.head)?;
        storage::write_json(dir, COOR_FILE, &map.lines)?;
        Ok(map)
    }

    fn load(dir: &Path, level: i32) -> Result<NativeMap> {
        let head: Head = storage::read_json(dir, HEAD_FILE)?;
        let lines: Vec<LineRecord> = storage::read_json(dir, COOR_FILE)?;
        let (topo, cidx) = if level >= 2 {
            (
                Some(storage::read_json::<Topology>(dir, TOPO_FILE)?),
                Some(storage::read_json::<CategoryIndex>(dir, CIDX_FILE)?),
            )
        } else {
            (None, None)
        };
        if let Some(topo) = &topo {
            if topo.lines.len() != lines.len() {
                return Err(GrassError::Open {
                    map: dir.display().to_string(),
                    msg: "topology does not match primitives, rebuild needed".to_string(),
                });
            }
        }
        Ok(NativeMap {
            dir: dir.to_path_buf(),
            head,
            lines,
            topo,
            cidx,
            mode: OpenFlags::READ_ONLY,
            cidx_update: false,
        })
    }

    /// Closes the map, persisting it when opened for writing.
    pub fn close(self) -> Result<()> {
        if !self.mode.contains(OpenFlags::UPDATE) {
            return Ok(());
        }
        storage::write_json(&self.dir, HEAD_FILE, &self.head)?;
        storage::write_json(&self.dir, COOR_FILE, &self.lines)?;
        match &self.topo {
            Some(topo) => storage::write_json(&self.dir, TOPO_FILE, topo)?,
            None => storage::remove_if_exists(&self.dir, TOPO_FILE)?,
        }
        // Written last: its presence tells readers the map is complete.
        if let Some(cidx) = &self.cidx {
            storage::write_json(&self.dir, CIDX_FILE, cidx)?;
        }
        Ok(())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn head(&self) -> &Head {
        &self.head
    }

    pub fn is_3d(&self) -> bool {
        self.head.is_3d
    }

    pub fn mode(&self) -> OpenFlags {
        self.mode
    }

    /// 2 when topology and category index are loaded, 1 otherwise.
    pub fn level(&self) -> i32 {
        if self.topo.is_some() && self.cidx.is_some() {
            2
        } else {
            1
        }
    }

    /// Keep the category index and topology current after every write.
    pub fn set_category_index_update(&mut self, update: bool) {
        self.cidx_update = update;
    }

    pub fn num_lines(&self) -> i32 {
        self.lines.len() as i32
    }

    pub fn num_areas(&self) -> i32 {
        self.topo.as_ref().map_or(0, |t| t.areas.len() as i32)
    }

    pub fn num_isles(&self) -> i32 {
        self.topo.as_ref().map_or(0, |t| t.isles.len() as i32)
    }

    pub fn num_nodes(&self) -> i32 {
        self.topo.as_ref().map_or(0, |t| t.nodes.len() as i32)
    }

    fn record(&self, lid: i32) -> Option<&LineRecord> {
        if lid < 1 {
            return None;
        }
        self.lines.get(lid as usize - 1)
    }

    fn line_topo(&self, lid: i32) -> Option<&topology::LineTopo> {
        if lid < 1 {
            return None;
        }
        self.topo.as_ref()?.lines.get(lid as usize - 1)
    }

    pub fn line_alive(&self, lid: i32) -> bool {
        self.record(lid).is_some_and(|l| l.alive)
    }

    pub fn area_alive(&self, aid: i32) -> bool {
        aid >= 1 && aid <= self.num_areas()
    }

    pub fn line_type(&self, lid: i32) -> Option<LineType> {
        self.record(lid).filter(|l| l.alive).map(|l| l.line_type)
    }

    /// Type, points and categories of a live line.
    pub fn read_line(&self, lid: i32) -> Result<(LineType, Vec<Vertex>, Categories)> {
        match self.record(lid) {
            Some(line) if line.alive => {
                Ok((line.line_type, line.points.clone(), line.cats.clone()))
            }
            _ => Err(GrassError::DeadLine { lid }),
        }
    }

    /// Categories of a live line.
    pub fn line_cats(&self, lid: i32) -> Option<&Categories> {
        self.record(lid).filter(|l| l.alive).map(|l| &l.cats)
    }

    /// Start and end node of a line or boundary.
    pub fn line_nodes(&self, lid: i32) -> Option<(i32, i32)> {
        self.line_topo(lid)
            .filter(|t| t.n1 > 0)
            .map(|t| (t.n1, t.n2))
    }

    /// Left and right side of a boundary: area (positive), isle (negative) or 0.
    pub fn line_areas(&self, lid: i32) -> Option<(i32, i32)> {
        self.line_topo(lid).map(|t| (t.left, t.right))
    }

    /// Area of the side of a boundary; an isle side resolves to the area
    /// enclosing the isle.
    pub fn side_area(&self, side: i32) -> i32 {
        self.topo.as_ref().map_or(0, |t| t.side_area(side))
    }

    pub fn node_coor(&self, nid: i32) -> Option<Vertex> {
        if nid < 1 {
            return None;
        }
        let node = self.topo.as_ref()?.nodes.get(nid as usize - 1)?;
        Some(Vertex::new(node.x, node.y, node.z))
    }

    /// Lines attached to a node, signed by direction, ordered by angle.
    pub fn node_lines(&self, nid: i32) -> Vec<i32> {
        if nid < 1 {
            return Vec::new();
        }
        self.topo
            .as_ref()
            .and_then(|t| t.nodes.get(nid as usize - 1))
            .map(|n| n.lines.clone())
            .unwrap_or_default()
    }

    /// Area of a centroid; negative for a duplicate centroid, 0 if outside.
    pub fn centroid_area(&self, lid: i32) -> i32 {
        self.line_topo(lid).map_or(0, |t| t.area)
    }

    fn area(&self, aid: i32) -> Option<&topology::Area> {
        if aid < 1 {
            return None;
        }
        self.topo.as_ref()?.areas.get(aid as usize - 1)
    }

    fn isle(&self, iid: i32) -> Option<&topology::Isle> {
        if iid < 1 {
            return None;
        }
        self.topo.as_ref()?.isles.get(iid as usize - 1)
    }

    /// Closed outer ring of an area, counter-clockwise.
    pub fn area_points(&self, aid: i32) -> Option<Vec<Vertex>> {
        self.area(aid)
            .map(|a| topology::ring_points(&self.lines, &a.boundaries))
    }

    pub fn area_isles(&self, aid: i32) -> Vec<i32> {
        self.area(aid).map(|a| a.isles.clone()).unwrap_or_default()
    }

    pub fn area_centroid(&self, aid: i32) -> i32 {
        self.area(aid).map_or(0, |a| a.centroid)
    }

    pub fn area_bbox(&self, aid: i32) -> Option<BoundBox> {
        self.area(aid).map(|a| a.bbox)
    }

    /// Closed ring of an isle, clockwise.
    pub fn isle_points(&self, iid: i32) -> Option<Vec<Vertex>> {
        self.isle(iid)
            .map(|i| topology::ring_points(&self.lines, &i.boundaries))
    }

    /// Area enclosing an isle, 0 for the outer face.
    pub fn isle_area(&self, iid: i32) -> i32 {
        self.isle(iid).map_or(0, |i| i.area)
    }

    /// Position of a field in the category index.
    pub fn cidx_field_index(&self, field: i32) -> Option<usize> {
        self.cidx.as_ref()?.field_index(field)
    }

    pub fn cidx_num_fields(&self) -> usize {
        self.cidx.as_ref().map_or(0, |c| c.num_fields())
    }

    pub fn cidx_field_number(&self, index: usize) -> Option<i32> {
        self.cidx.as_ref()?.field_number(index)
    }

    pub fn cidx_num_cats_by_index(&self, index: usize) -> usize {
        self.cidx.as_ref().map_or(0, |c| c.num_cats_by_index(index))
    }

    pub fn cidx_cat_by_index(&self, field_index: usize, cat_index: usize) -> Option<CidxEntry> {
        self.cidx.as_ref()?.cat_by_index(field_index, cat_index)
    }

    /// Whether a live object carries the category in the field.
    pub fn has_cat(&self, field: i32, cat: i32) -> bool {
        match &self.cidx {
            Some(cidx) => cidx.has_cat(field, cat),
            None => self
                .lines
                .iter()
                .any(|l| l.alive && l.cats.of_field(field).any(|c| c == cat)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_converts_panic() {
        let result: Result<()> = call("Vect_test", || panic!("segment out of range"));
        match result {
            Err(GrassError::NativeCall { method_name, msg }) => {
                assert_eq!(method_name, "Vect_test");
                assert_eq!(msg, "segment out of range");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(call("Vect_ok", || Ok(3)).unwrap(), 3);
    }

    #[test]
    fn test_new_map_levels_and_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roads");
        let _guard = lock();
        let mut map = NativeMap::open_new(&path, "roads", false).unwrap();
        assert_eq!(map.level(), 1);
        let lid = map
            .write_line(
                LineType::Line,
                vec![Vertex::xy(0.0, 0.0), Vertex::xy(1.0, 1.0)],
                Categories::single(1, 7),
            )
            .unwrap();
        assert_eq!(lid, 1);
        map.close().unwrap();
        assert_eq!(NativeMap::open_old_head(&path).unwrap(), 1);
        assert!(NativeMap::open_old(&path, 2).is_err());

        let mut map = NativeMap::open_update(&path).unwrap();
        map.build().unwrap();
        map.close().unwrap();
        assert_eq!(NativeMap::open_old_head(&path).unwrap(), 2);

        let map = NativeMap::open_old(&path, 2).unwrap();
        assert_eq!(map.level(), 2);
        assert_eq!(map.num_nodes(), 2);
        assert_eq!(map.line_nodes(1), Some((1, 2)));
        let field = map.cidx_field_index(1).unwrap();
        assert_eq!(map.cidx_num_cats_by_index(field), 1);
        let entry = map.cidx_cat_by_index(field, 0).unwrap();
        assert_eq!((entry.cat, entry.id), (7, 1));
        assert!(map.has_cat(1, 7));
        assert!(!map.has_cat(1, 8));
        assert!(map.read_line(2).is_err());
    }

    #[test]
    fn test_update_hides_category_index_until_close() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m");
        let _guard = lock();
        let mut map = NativeMap::open_new(&path, "m", false).unwrap();
        map.build().unwrap();
        map.close().unwrap();
        assert!(path.join(CIDX_FILE).is_file());

        let map = NativeMap::open_update(&path).unwrap();
        assert!(!path.join(CIDX_FILE).exists());
        map.close().unwrap();
        assert!(path.join(CIDX_FILE).is_file());
    }
}
