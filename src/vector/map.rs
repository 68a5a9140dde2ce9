//! Lifecycle of one open vector map.

use std::collections::HashMap;
use std::time::SystemTime;

use tracing::{debug, warn};

use crate::config::{get_config_bool, BUILD_TOPOLOGY};
use crate::errors::{GrassError, Result};
use crate::native::storage::{CIDX_FILE, DBLN_FILE};
use crate::native::{self, Categories, LineType, NativeMap, TopoLevel, Vertex};
use crate::utils::_modified_time;
use crate::vector::{
    GeometryBuilder, MapIdentity, MapLayer, NativeObject, TopoSymbol, Wkb, WkbType,
};

/// Line ids rewritten during an edit session.
///
/// Rewriting a line kills its id and stores the new geometry under a new id.
/// Features keep the id the line had when the session started, so readers
/// translate through this table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewriteTable {
    /// Original id to current id.
    new_lids: HashMap<i32, i32>,
    /// Current id to original id.
    old_lids: HashMap<i32, i32>,
}

impl RewriteTable {
    /// Records that the line currently stored as `lid` now lives at `new_lid`.
    pub fn record(&mut self, lid: i32, new_lid: i32) {
        let original = self.old_lids.remove(&lid).unwrap_or(lid);
        self.new_lids.insert(original, new_lid);
        self.old_lids.insert(new_lid, original);
    }

    /// Current id of an original id.
    pub fn new_lid(&self, lid: i32) -> i32 {
        self.new_lids.get(&lid).copied().unwrap_or(lid)
    }

    /// Original id of a current id.
    pub fn old_lid(&self, lid: i32) -> i32 {
        self.old_lids.get(&lid).copied().unwrap_or(lid)
    }

    /// Whether `lid` holds the rewritten geometry of another id, and so is
    /// reported under that id.
    pub fn is_rewrite_target(&self, lid: i32) -> bool {
        self.old_lids.get(&lid).is_some_and(|&old| old != lid)
    }

    pub fn len(&self) -> usize {
        self.new_lids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.new_lids.is_empty()
    }

    pub fn clear(&mut self) {
        self.new_lids.clear();
        self.old_lids.clear();
    }
}

/// An opened vector map and its layers.
///
/// Maps are shared through a [`MapRegistry`](crate::vector::MapRegistry);
/// every call that reaches the native engine takes the process-wide native
/// lock for its duration.
#[derive(Debug)]
pub struct VectorMap {
    identity: MapIdentity,
    native: Option<NativeMap>,
    valid: bool,
    frozen: bool,
    editing: bool,
    version: u64,
    is_3d: bool,
    old_num_lines: i32,
    rewrites: RewriteTable,
    /// Geometry of lines changed in this session, by original id.
    old_geometries: HashMap<i32, Wkb>,
    last_modified: Option<SystemTime>,
    last_attributes_modified: Option<SystemTime>,
    layers: Vec<MapLayer>,
}

impl VectorMap {
    pub fn new(identity: MapIdentity) -> VectorMap {
        VectorMap {
            identity,
            native: None,
            valid: false,
            frozen: false,
            editing: false,
            version: 0,
            is_3d: false,
            old_num_lines: 0,
            rewrites: RewriteTable::default(),
            old_geometries: HashMap::new(),
            last_modified: None,
            last_attributes_modified: None,
            layers: Vec::new(),
        }
    }

    pub fn identity(&self) -> &MapIdentity {
        &self.identity
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// A frozen map serves no features until it is thawed.
    pub fn set_frozen(&mut self, frozen: bool) {
        self.frozen = frozen;
    }

    pub fn is_editing(&self) -> bool {
        self.editing
    }

    /// Incremented whenever the map is reopened after a change.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn is_3d(&self) -> bool {
        self.is_3d
    }

    /// Number of lines when the current edit session started.
    pub fn old_num_lines(&self) -> i32 {
        self.old_num_lines
    }

    pub fn rewrites(&self) -> &RewriteTable {
        &self.rewrites
    }

    /// Geometry a line had before it was changed in this session.
    pub fn old_geometry(&self, lid: i32) -> Option<&Wkb> {
        self.old_geometries.get(&lid)
    }

    /// Opens the native map at level 2, building topology first for maps
    /// that have none if `GRASS_BUILD_TOPOLOGY` allows it.
    pub fn open(&mut self) -> Result<()> {
        if self.valid {
            return Ok(());
        }
        let _guard = native::lock();
        self.open_locked()
    }

    fn open_locked(&mut self) -> Result<()> {
        let dir = self.identity.map_dir();
        // Taken before opening: a map rewritten while it is being opened
        // must show as outdated.
        self.record_timestamps();

        let result = native::call("Vect_open_old", || {
            let level = NativeMap::open_old_head(&dir)?;
            if level < 2 {
                if !get_config_bool(BUILD_TOPOLOGY, true) {
                    return Err(GrassError::Open {
                        map: self.identity.to_string(),
                        msg: "map has no topology and building it is disabled".to_string(),
                    });
                }
                debug!(map = %self.identity, "building missing topology");
                let mut update = NativeMap::open_update(&dir)?;
                update.build()?;
                update.close()?;
            }
            NativeMap::open_old(&dir, 2).map(|map| (map, level))
        });

        match result {
            Ok((map, level)) => {
                if level < 2 {
                    self.record_timestamps();
                }
                self.is_3d = map.is_3d();
                self.native = Some(map);
                self.valid = true;
                debug!(map = %self.identity, level, "opened map");
                Ok(())
            }
            Err(e) => {
                self.native = None;
                self.valid = false;
                Err(match e {
                    e @ GrassError::Open { .. } => e,
                    other => GrassError::Open {
                        map: self.identity.to_string(),
                        msg: other.to_string(),
                    },
                })
            }
        }
    }

    fn record_timestamps(&mut self) {
        let dir = self.identity.map_dir();
        self.last_modified = _modified_time(&dir);
        self.last_attributes_modified = _modified_time(dir.join(DBLN_FILE));
    }

    /// Closes the native map. Failures are logged, the map ends invalid
    /// either way.
    pub fn close(&mut self) {
        let _guard = native::lock();
        self.close_locked();
    }

    fn close_locked(&mut self) {
        match self.native.take() {
            Some(map) => {
                if let Err(e) = native::call("Vect_close", || map.close()) {
                    warn!(map = %self.identity, "cannot close map: {e}");
                }
                debug!(map = %self.identity, "closed map");
            }
            None => debug!(map = %self.identity, "map is not open"),
        }
        self.valid = false;
    }

    /// Closes and reopens the map, e.g. after it was changed outside.
    pub fn update(&mut self) -> Result<()> {
        self.close();
        let result = self.open();
        self.version += 1;
        for layer in &mut self.layers {
            layer.load();
        }
        result
    }

    /// Whether the map directory changed since it was opened. A map whose
    /// category index is missing is being written by another process and is
    /// reported as current until the writer finishes.
    pub fn map_outdated(&self) -> bool {
        let dir = self.identity.map_dir();
        let modified = _modified_time(&dir);
        if modified <= self.last_modified {
            return false;
        }
        if !dir.join(CIDX_FILE).exists() {
            debug!(map = %self.identity, "map is being modified, not reloading yet");
            return false;
        }
        debug!(map = %self.identity, "map was modified");
        true
    }

    /// Whether the attribute links changed since the map was opened.
    pub fn attributes_outdated(&self) -> bool {
        let modified = _modified_time(self.identity.map_dir().join(DBLN_FILE));
        modified > self.last_attributes_modified
    }

    /// Reopens the map or reloads layers when they were changed outside.
    /// Returns whether anything was reloaded.
    pub fn refresh_if_outdated(&mut self) -> Result<bool> {
        if self.editing {
            return Ok(false);
        }
        if self.map_outdated() {
            self.update()?;
            return Ok(true);
        }
        let mut reloaded = false;
        if self.attributes_outdated() {
            self.last_attributes_modified =
                _modified_time(self.identity.map_dir().join(DBLN_FILE));
            for layer in &mut self.layers {
                layer.load();
            }
            reloaded = true;
        } else {
            for layer in &mut self.layers {
                reloaded |= layer.reload_if_outdated();
            }
        }
        Ok(reloaded)
    }

    /// Reopens the map for writing.
    ///
    /// If that fails the map is reopened read-only and stays usable, and
    /// [`GrassError::EditSession`] is returned.
    pub fn start_edit(&mut self) -> Result<()> {
        if !self.valid || self.editing {
            return Err(GrassError::EditSession {
                map: self.identity.to_string(),
                msg: if self.editing {
                    "map is already being edited".to_string()
                } else {
                    "map is not open".to_string()
                },
            });
        }
        let _guard = native::lock();
        self.close_locked();

        let dir = self.identity.map_dir();
        let failure = match native::call("Vect_open_update", || NativeMap::open_update(&dir)) {
            Ok(map) if map.level() >= 2 => {
                let mut map = map;
                map.set_category_index_update(true);
                self.old_num_lines = map.num_lines();
                self.native = Some(map);
                None
            }
            Ok(map) => {
                let level = map.level();
                if let Err(e) = native::call("Vect_close", || map.close()) {
                    warn!(map = %self.identity, "cannot close map: {e}");
                }
                Some(format!("map opened for update on level {level}"))
            }
            Err(e) => Some(e.to_string()),
        };

        if let Some(msg) = failure {
            warn!(map = %self.identity, "cannot open map for update: {msg}");
            if let Err(e) = self.open_locked() {
                warn!(map = %self.identity, "cannot reopen map: {e}");
            }
            return Err(GrassError::EditSession {
                map: self.identity.to_string(),
                msg,
            });
        }

        self.rewrites.clear();
        self.old_geometries.clear();
        self.editing = true;
        self.valid = true;
        for layer in &mut self.layers {
            layer.start_edit();
        }
        debug!(map = %self.identity, old_num_lines = self.old_num_lines, "editing started");
        Ok(())
    }

    /// Rebuilds topology, ends the session and reopens the map read-only.
    /// `Ok` when the reopened map is valid.
    pub fn close_edit(&mut self, new_map: bool) -> Result<()> {
        if !self.valid || !self.editing {
            return Err(GrassError::NotEditing(self.identity.to_string()));
        }
        {
            let _guard = native::lock();
            if let Some(map) = self.native.as_mut() {
                if let Err(e) =
                    native::call("Vect_build_partial", || map.build_partial(TopoLevel::None))
                {
                    warn!(map = %self.identity, "cannot reset topology: {e}");
                }
                if let Err(e) = native::call("Vect_build", || map.build()) {
                    warn!(map = %self.identity, "cannot build topology: {e}");
                }
            }
            self.editing = false;
            self.rewrites.clear();
            self.old_geometries.clear();
            self.close_locked();
            if let Err(e) = self.open_locked() {
                warn!(map = %self.identity, "cannot reopen map: {e}");
            }
        }
        self.version += 1;
        for layer in &mut self.layers {
            layer.close_edit();
        }
        debug!(map = %self.identity, new_map, version = self.version, "editing closed");
        if self.valid {
            Ok(())
        } else {
            Err(GrassError::InvalidMap(self.identity.to_string()))
        }
    }

    /// Runs `f` on the native map while holding the native lock.
    pub fn with_native<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&NativeMap) -> T,
    {
        let _guard = native::lock();
        let map = self.native_map()?;
        Ok(f(map))
    }

    /// The open native map. The caller holds the native lock.
    pub(crate) fn native_map(&self) -> Result<&NativeMap> {
        match &self.native {
            Some(map) if self.valid => Ok(map),
            _ => Err(GrassError::InvalidMap(self.identity.to_string())),
        }
    }

    fn native_map_mut(&mut self) -> Result<&mut NativeMap> {
        if !self.editing {
            return Err(GrassError::NotEditing(self.identity.to_string()));
        }
        self.native
            .as_mut()
            .ok_or_else(|| GrassError::InvalidMap(self.identity.to_string()))
    }

    pub fn num_lines(&self) -> i32 {
        self.with_native(|map| map.num_lines()).unwrap_or(0)
    }

    /// Writes a new line. Returns its id.
    pub fn write_line(
        &mut self,
        line_type: LineType,
        points: Vec<Vertex>,
        cats: Categories,
    ) -> Result<i32> {
        let _guard = native::lock();
        let map = self.native_map_mut()?;
        let lid = native::call("Vect_write_line", || map.write_line(line_type, points, cats))?;
        debug!(map = %self.identity, lid, "wrote line");
        Ok(lid)
    }

    /// Replaces the geometry and categories of a live line. The line gets a
    /// new id, which is returned; readers keep seeing it under its original
    /// id until the session ends.
    pub fn rewrite_line(
        &mut self,
        lid: i32,
        line_type: LineType,
        points: Vec<Vertex>,
        cats: Categories,
    ) -> Result<i32> {
        let _guard = native::lock();
        self.remember_geometry(lid)?;
        let map = self.native_map_mut()?;
        let new_lid = native::call("Vect_rewrite_line", || {
            map.rewrite_line(lid, line_type, points, cats)
        })?;
        self.rewrites.record(lid, new_lid);
        Ok(new_lid)
    }

    pub fn delete_line(&mut self, lid: i32) -> Result<()> {
        let _guard = native::lock();
        self.remember_geometry(lid)?;
        let map = self.native_map_mut()?;
        native::call("Vect_delete_line", || map.delete_line(lid))?;
        debug!(map = %self.identity, lid, "deleted line");
        Ok(())
    }

    /// Keeps the session's first geometry of a line. The caller holds the
    /// native lock.
    fn remember_geometry(&mut self, lid: i32) -> Result<()> {
        let original = self.rewrites.old_lid(lid);
        if self.old_geometries.contains_key(&original) {
            return Ok(());
        }
        let map = self.native_map_mut()?;
        let line_type = map.line_type(lid).ok_or(GrassError::DeadLine { lid })?;
        let wkb = GeometryBuilder::new(WkbType::LineString, true)
            .build(map, NativeObject::Line { lid, line_type })?;
        self.old_geometries.insert(original, wkb);
        Ok(())
    }

    /// Topology symbol of a live line.
    pub fn line_symbol(&self, lid: i32) -> Result<TopoSymbol> {
        let _guard = native::lock();
        let map = self.native_map()?;
        let line_type = map.line_type(lid).ok_or(GrassError::DeadLine { lid })?;
        Ok(TopoSymbol::of_line(map, lid, line_type))
    }

    pub fn node_symbol(&self, nid: i32) -> Result<TopoSymbol> {
        self.with_native(|map| TopoSymbol::of_node(map, nid))
    }

    /// Opens a layer for one more user, loading it on first use.
    pub(crate) fn open_layer(&mut self, field: i32) -> &mut MapLayer {
        let index = match self
            .layers
            .iter()
            .position(|l| l.field() == field && l.is_valid())
        {
            Some(index) => index,
            None => {
                self.layers.retain(|l| l.field() != field);
                let mut layer = MapLayer::new(self.identity.clone(), field);
                if self.editing {
                    layer.start_edit();
                }
                layer.load();
                self.layers.push(layer);
                self.layers.len() - 1
            }
        };
        let layer = &mut self.layers[index];
        layer.add_user();
        debug!(map = %self.identity, field, users = layer.user_count(), "opened layer");
        layer
    }

    /// Drops one user of a layer. Layers without users are removed.
    pub(crate) fn close_layer(&mut self, field: i32) {
        if let Some(index) = self.layers.iter().position(|l| l.field() == field) {
            self.layers[index].remove_user();
            if self.layers[index].user_count() == 0 {
                self.layers.remove(index);
            }
        }
    }

    /// Users summed over all layers.
    pub fn user_count(&self) -> usize {
        self.layers.iter().map(MapLayer::user_count).sum()
    }

    pub fn layer(&self, field: i32) -> Option<&MapLayer> {
        self.layers.iter().find(|l| l.field() == field)
    }

    pub fn layer_mut(&mut self, field: i32) -> Option<&mut MapLayer> {
        self.layers.iter_mut().find(|l| l.field() == field)
    }

    pub fn layers(&self) -> &[MapLayer] {
        &self.layers
    }

    fn layer_or_err(&mut self, field: i32) -> Result<&mut MapLayer> {
        let map = self.identity.to_string();
        self.layer_mut(field)
            .ok_or_else(|| GrassError::BadArgument(format!("layer {field} of {map} is not open")))
    }

    /// Categories of a field carried by live objects, ascending.
    pub fn field_cats(&self, field: i32) -> Result<Vec<i32>> {
        self.with_native(|map| {
            let Some(index) = map.cidx_field_index(field) else {
                return Vec::new();
            };
            let mut cats: Vec<i32> = (0..map.cidx_num_cats_by_index(index))
                .filter_map(|i| map.cidx_cat_by_index(index, i))
                .map(|e| e.cat)
                .collect();
            cats.dedup();
            cats
        })
    }

    /// Creates the attribute table of a layer with a row for each category
    /// in use.
    pub fn create_table(&mut self, field: i32, key: &str, columns: &str) -> Result<()> {
        let cats = self.field_cats(field)?;
        self.layer_or_err(field)?.create_table(key, columns, &cats)?;
        self.last_attributes_modified = _modified_time(self.identity.map_dir().join(DBLN_FILE));
        Ok(())
    }

    /// Adds a column to a layer's table, creating the table if needed.
    pub fn add_column(&mut self, field: i32, column: &crate::vector::Field) -> Result<()> {
        let cats = self.field_cats(field)?;
        self.layer_or_err(field)?.add_column(column, &cats)?;
        self.last_attributes_modified = _modified_time(self.identity.map_dir().join(DBLN_FILE));
        Ok(())
    }

    /// Whether a category has a row but no live object in a layer.
    pub fn is_orphan(&self, field: i32, cat: i32) -> Result<bool> {
        let layer = self.layer(field).ok_or_else(|| {
            GrassError::BadArgument(format!("layer {field} of {} is not open", self.identity))
        })?;
        let _guard = native::lock();
        layer.is_orphan(cat, self.native_map()?)
    }
}

impl Drop for VectorMap {
    fn drop(&mut self) {
        if self.native.is_some() {
            self.close();
        }
    }
}
