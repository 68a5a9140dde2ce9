//! Feature sources and iterators over a layer of a map.

use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::errors::Result;
use crate::native::{self, LineType, NativeMap};
use crate::options::RequestFlags;
use crate::vector::{
    cat_from_fid, lid_from_fid, make_feature_id, Feature, Field, FieldValue, GeometryBuilder,
    LayerHandle, LayerKind, LayerName, MapIdentity, MapLayer, MapRegistry, NativeObject,
    RewriteTable, Selection, TopoSymbol, VectorMap,
};

/// What features to read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureRequest {
    rect: Option<geo_types::Rect<f64>>,
    fid: Option<i64>,
    flags: RequestFlags,
    subset: Vec<usize>,
}

impl FeatureRequest {
    pub fn new() -> FeatureRequest {
        FeatureRequest::default()
    }

    /// Only features whose bounding box (or geometry, with
    /// [`RequestFlags::EXACT_INTERSECT`]) intersects `rect`.
    pub fn with_rect(mut self, rect: geo_types::Rect<f64>) -> FeatureRequest {
        self.rect = Some(rect);
        self
    }

    /// Only the feature with this id.
    pub fn with_fid(mut self, fid: i64) -> FeatureRequest {
        self.fid = Some(fid);
        self
    }

    pub fn with_flags(mut self, flags: RequestFlags) -> FeatureRequest {
        self.flags |= flags;
        self
    }

    /// Only fill the attributes at these field indexes.
    pub fn with_subset(mut self, subset: Vec<usize>) -> FeatureRequest {
        self.subset = subset;
        self.flags |= RequestFlags::SUBSET_OF_ATTRIBUTES;
        self
    }

    pub fn rect(&self) -> Option<&geo_types::Rect<f64>> {
        self.rect.as_ref()
    }

    pub fn fid(&self) -> Option<i64> {
        self.fid
    }

    pub fn flags(&self) -> RequestFlags {
        self.flags
    }
}

/// A readable layer of a map.
///
/// Schema and edit mode are those of the map at the time they are asked for;
/// each iterator takes its own copy when it is created.
#[derive(Debug)]
pub struct FeatureSource {
    handle: LayerHandle,
    identity: MapIdentity,
    name: LayerName,
}

impl FeatureSource {
    /// Opens a layer by name, e.g. `1_line` or `topo_node`.
    pub fn open(
        registry: &MapRegistry,
        identity: &MapIdentity,
        layer_name: &str,
    ) -> Result<FeatureSource> {
        let name: LayerName = layer_name.parse()?;
        let handle = registry.open_layer(identity, name.field)?;
        Ok(FeatureSource {
            handle,
            identity: identity.clone(),
            name,
        })
    }

    fn schema(&self, map: &VectorMap) -> Vec<Field> {
        match self.name.kind.topo_fields() {
            Some(fields) => fields,
            None => map
                .layer(self.name.field)
                .map(|l| l.fields().to_vec())
                .unwrap_or_default(),
        }
    }

    pub fn handle(&self) -> &LayerHandle {
        &self.handle
    }

    pub fn kind(&self) -> LayerKind {
        self.name.kind
    }

    pub fn field(&self) -> i32 {
        self.name.field
    }

    /// Current schema of the features.
    pub fn fields(&self) -> Vec<Field> {
        self.schema(&self.handle.map())
    }

    /// Whether the map is being edited. Topology layers are never read in
    /// edit mode.
    pub fn is_editing(&self) -> bool {
        self.handle.map().is_editing() && !self.kind().is_topo()
    }

    pub fn features(&self, request: FeatureRequest) -> FeatureIterator<'_> {
        FeatureIterator::new(self, request)
    }
}

/// One feature to be read: its id, category and native object.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    fid: i64,
    cat: i32,
    object: NativeObject,
}

/// Cursor over the features of a [`FeatureSource`].
///
/// The edit mode, schema, selection mask and rewrite table are taken when
/// the iterator is created. Each fetch locks the map and the native engine
/// for its own duration only.
#[derive(Debug)]
pub struct FeatureIterator<'a> {
    source: &'a FeatureSource,
    fields: Arc<[Field]>,
    editing: bool,
    request: FeatureRequest,
    selection: Selection,
    rewrites: RewriteTable,
    builder: GeometryBuilder,
    next_cidx: usize,
    next_lid: i32,
    fid_done: bool,
    closed: bool,
}

impl<'a> FeatureIterator<'a> {
    fn new(source: &'a FeatureSource, request: FeatureRequest) -> FeatureIterator<'a> {
        let kind = source.kind();
        let map = source.handle.map();
        let editing = map.is_editing() && !kind.is_topo();
        let mut iter = FeatureIterator {
            source,
            fields: source.schema(&map).into(),
            editing,
            selection: Selection::all(),
            rewrites: RewriteTable::default(),
            builder: GeometryBuilder::new(kind.wkb_type(), editing),
            next_cidx: 0,
            next_lid: 1,
            fid_done: false,
            closed: false,
            request,
        };

        if !map.is_valid() || map.is_frozen() {
            debug!(map = %source.identity, "map is not readable, no features");
            iter.closed = true;
            return iter;
        }
        iter.rewrites = map.rewrites().clone();
        if let Some(rect) = iter.request.rect {
            let exact = iter.request.flags.contains(RequestFlags::EXACT_INTERSECT);
            let selection =
                map.with_native(|native| Selection::build(native, kind, &rect, exact, editing));
            match selection {
                Ok(selection) => iter.selection = selection,
                Err(e) => {
                    warn!(map = %source.identity, "cannot build selection: {e}");
                    iter.closed = true;
                }
            }
        }
        iter
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Whether features are read the way they are while editing.
    pub fn is_editing(&self) -> bool {
        self.editing
    }

    /// Schema of the features of this iterator.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// A new feature with the iterator's schema, to pass to
    /// [`fetch_feature`](Self::fetch_feature).
    pub fn new_feature(&self) -> Feature {
        Feature::new(Arc::clone(&self.fields))
    }

    /// Reads the next feature into `feature`. Returns `false`, leaving the
    /// feature invalid, once there are no more features.
    pub fn fetch_feature(&mut self, feature: &mut Feature) -> bool {
        feature.reset();
        if self.closed {
            return false;
        }
        let source = self.source;
        let map = source.handle.map();
        if !map.is_valid() || map.is_frozen() {
            drop(map);
            self.close();
            return false;
        }
        let layer = map.layer(source.field());

        let _guard = native::lock();
        let native = match map.native_map() {
            Ok(native) => native,
            Err(e) => {
                warn!(map = %source.identity, "{e}");
                drop(_guard);
                drop(map);
                self.close();
                return false;
            }
        };

        loop {
            let Some(candidate) = self.next_candidate(native) else {
                break;
            };
            match self.populate(native, layer, &candidate, feature) {
                Ok(()) => {
                    trace!(fid = candidate.fid, cat = candidate.cat, "fetched feature");
                    return true;
                }
                Err(e) => {
                    warn!(map = %source.identity, fid = candidate.fid, "skipping feature: {e}");
                    feature.reset();
                }
            }
        }
        drop(_guard);
        drop(map);
        self.close();
        false
    }

    /// Restarts from the first feature. Fails on a closed iterator.
    pub fn rewind(&mut self) -> bool {
        if self.closed {
            return false;
        }
        self.next_cidx = 0;
        self.next_lid = 1;
        self.fid_done = false;
        true
    }

    /// Releases the selection. Closing twice does nothing.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.selection = Selection::all();
        self.rewrites.clear();
    }

    fn next_candidate(&mut self, map: &NativeMap) -> Option<Candidate> {
        let kind = self.source.kind();
        if let Some(fid) = self.request.fid {
            if self.fid_done {
                return None;
            }
            self.fid_done = true;
            return self.resolve_fid(map, fid);
        }
        if kind == LayerKind::TopoNode {
            self.next_topo_node(map)
        } else if kind.is_topo() {
            self.next_topo_line(map)
        } else if self.editing {
            self.next_edited(map)
        } else {
            self.next_indexed(map)
        }
    }

    fn resolve_fid(&self, map: &NativeMap, fid: i64) -> Option<Candidate> {
        let kind = self.source.kind();
        if kind.is_topo() {
            let id = i32::try_from(fid).ok()?;
            let object = if kind == LayerKind::TopoNode {
                if id < 1 || id > map.num_nodes() {
                    return None;
                }
                NativeObject::Node { nid: id }
            } else {
                let line_type = map.line_type(id)?;
                NativeObject::Line { lid: id, line_type }
            };
            return Some(Candidate { fid, cat: 0, object });
        }

        let (Some(id), Some(cat)) = (lid_from_fid(fid), cat_from_fid(fid)) else {
            warn!(fid, "malformed feature id");
            return None;
        };
        if kind == LayerKind::Polygon && !self.editing {
            if !map.area_alive(id) {
                return None;
            }
            return Some(Candidate {
                fid,
                cat,
                object: NativeObject::Area { aid: id },
            });
        }
        let lid = self.rewrites.new_lid(id);
        if lid != id {
            debug!(lid = id, real_lid = lid, "line was rewritten");
        }
        let line_type = map.line_type(lid)?;
        if self.editing && !(line_type.is_point_like() || line_type.is_line_like()) {
            return None;
        }
        Some(Candidate {
            fid,
            cat,
            object: NativeObject::Line { lid, line_type },
        })
    }

    /// Walks the category index of the layer's field.
    fn next_indexed(&mut self, map: &NativeMap) -> Option<Candidate> {
        let kind = self.source.kind();
        let field_index = map.cidx_field_index(self.source.field())?;
        let type_mask = kind.type_mask();
        while self.next_cidx < map.cidx_num_cats_by_index(field_index) {
            let entry = map.cidx_cat_by_index(field_index, self.next_cidx)?;
            self.next_cidx += 1;
            if !type_mask.intersects(entry.geometry_type()) {
                continue;
            }
            if !self.selection.contains(entry.id) {
                continue;
            }
            let object = if kind == LayerKind::Polygon {
                NativeObject::Area { aid: entry.id }
            } else {
                let Some(line_type) = map.line_type(entry.id) else {
                    continue;
                };
                NativeObject::Line {
                    lid: entry.id,
                    line_type,
                }
            };
            return Some(Candidate {
                fid: make_feature_id(entry.id, entry.cat),
                cat: entry.cat,
                object,
            });
        }
        None
    }

    /// Walks line ids as they were when editing started, one feature per
    /// category of the layer's field.
    fn next_edited(&mut self, map: &NativeMap) -> Option<Candidate> {
        let field = self.source.field();
        while self.next_lid <= map.num_lines() {
            let lid = self.next_lid;
            if self.rewrites.is_rewrite_target(lid) {
                self.advance_lid();
                continue;
            }
            let real_lid = self.rewrites.new_lid(lid);
            let line_type = match map.line_type(real_lid) {
                Some(t) if t.is_point_like() || t.is_line_like() => t,
                _ => {
                    self.advance_lid();
                    continue;
                }
            };
            if !self.selection.contains(real_lid) {
                self.advance_lid();
                continue;
            }
            let object = NativeObject::Line {
                lid: real_lid,
                line_type,
            };
            let cats = map.line_cats(real_lid)?;
            if cats.is_empty() {
                self.advance_lid();
                return Some(Candidate {
                    fid: make_feature_id(lid, 0),
                    cat: 0,
                    object,
                });
            }
            match cats.of_field(field).nth(self.next_cidx) {
                Some(cat) => {
                    self.next_cidx += 1;
                    return Some(Candidate {
                        fid: make_feature_id(lid, cat),
                        cat,
                        object,
                    });
                }
                None => self.advance_lid(),
            }
        }
        None
    }

    fn advance_lid(&mut self) {
        self.next_lid += 1;
        self.next_cidx = 0;
    }

    fn next_topo_line(&mut self, map: &NativeMap) -> Option<Candidate> {
        let type_mask = self.source.kind().type_mask();
        while self.next_lid <= map.num_lines() {
            let lid = self.next_lid;
            self.next_lid += 1;
            let Some(line_type) = map.line_type(lid) else {
                continue;
            };
            if !type_mask.intersects(line_type.flag()) || !self.selection.contains(lid) {
                continue;
            }
            return Some(Candidate {
                fid: i64::from(lid),
                cat: 0,
                object: NativeObject::Line { lid, line_type },
            });
        }
        None
    }

    fn next_topo_node(&mut self, map: &NativeMap) -> Option<Candidate> {
        while self.next_lid <= map.num_nodes() {
            let nid = self.next_lid;
            self.next_lid += 1;
            if !self.selection.contains(nid) {
                continue;
            }
            return Some(Candidate {
                fid: i64::from(nid),
                cat: 0,
                object: NativeObject::Node { nid },
            });
        }
        None
    }

    fn populate(
        &self,
        map: &NativeMap,
        layer: Option<&MapLayer>,
        candidate: &Candidate,
        feature: &mut Feature,
    ) -> Result<()> {
        feature.set_fid(candidate.fid);
        if !self.request.flags.contains(RequestFlags::NO_GEOMETRY) {
            feature.set_geometry(self.builder.build(map, candidate.object)?);
        }

        match (self.source.kind(), candidate.object) {
            (LayerKind::TopoNode, NativeObject::Node { nid }) => {
                let lines = map
                    .node_lines(nid)
                    .iter()
                    .map(i32::to_string)
                    .collect::<Vec<_>>()
                    .join(",");
                feature.set_attribute(0, FieldValue::IntegerValue(nid));
                feature.set_attribute(1, FieldValue::StringValue(lines));
            }
            (LayerKind::TopoPoint | LayerKind::TopoLine, NativeObject::Line { lid, line_type }) => {
                self.set_topo_line_attributes(map, lid, line_type, feature);
            }
            (_, object) => {
                if let Some(layer) = layer {
                    self.set_layer_attributes(layer, candidate.cat, feature);
                }
                if self.editing {
                    let symbol = match object {
                        NativeObject::Line { lid, line_type } => {
                            TopoSymbol::of_line(map, lid, line_type)
                        }
                        NativeObject::Node { nid } => TopoSymbol::of_node(map, nid),
                        NativeObject::Area { .. } => TopoSymbol::Undefined,
                    };
                    let index = self.fields.len().saturating_sub(1);
                    feature.set_attribute(index, FieldValue::IntegerValue(symbol.code()));
                }
            }
        }
        feature.set_valid(true);
        Ok(())
    }

    fn set_topo_line_attributes(
        &self,
        map: &NativeMap,
        lid: i32,
        line_type: LineType,
        feature: &mut Feature,
    ) {
        let topo_line = self.source.kind() == LayerKind::TopoLine;
        feature.set_attribute(0, FieldValue::IntegerValue(lid));
        feature.set_attribute(1, FieldValue::StringValue(line_type.name().to_string()));
        if let Some((n1, n2)) = map.line_nodes(lid) {
            feature.set_attribute(2, FieldValue::IntegerValue(n1));
            if topo_line {
                feature.set_attribute(3, FieldValue::IntegerValue(n2));
            }
        }
        if topo_line && line_type == LineType::Boundary {
            if let Some((left, right)) = map.line_areas(lid) {
                feature.set_attribute(4, FieldValue::IntegerValue(left));
                feature.set_attribute(5, FieldValue::IntegerValue(right));
            }
        }
    }

    /// Cached attributes of a category, limited to the requested subset.
    fn set_layer_attributes(&self, layer: &MapLayer, cat: i32, feature: &mut Feature) {
        // The symbol column is filled separately while editing.
        let count = if self.editing {
            self.fields.len().saturating_sub(1)
        } else {
            self.fields.len()
        };
        let wanted = |i: &usize| {
            *i < count
                && (!self.request.flags.contains(RequestFlags::SUBSET_OF_ATTRIBUTES)
                    || self.request.subset.contains(i))
        };
        for index in (0..count).filter(wanted) {
            feature.set_attribute(index, layer.attribute(cat, index));
        }
    }
}

impl<'a> Iterator for FeatureIterator<'a> {
    type Item = Feature;

    fn next(&mut self) -> Option<Feature> {
        let mut feature = self.new_feature();
        if self.fetch_feature(&mut feature) {
            Some(feature)
        } else {
            None
        }
    }
}

impl Drop for FeatureIterator<'_> {
    fn drop(&mut self) {
        self.close();
    }
}
