//! Vector Features
//!
//! Layers of a map are opened by name through a shared [`MapRegistry`]:
//! `<field>_<type>` for features of a category field (`1_line`,
//! `2_polygon`), `topo_point`, `topo_line` and `topo_node` for the raw
//! topology.
//!
//! ## Reading
//!
//! ```no_run
//! use grass_vector::vector::{FeatureRequest, FeatureSource, MapIdentity, MapRegistry};
//!
//! let registry = MapRegistry::new();
//! let roads = MapIdentity::new("/data/grassdata", "nc", "PERMANENT", "roads");
//! let source = FeatureSource::open(&registry, &roads, "1_line")?;
//! for feature in source.features(FeatureRequest::new()) {
//!     let name = feature.field("name")?;
//!     let geometry = feature.geometry().map(|wkb| wkb.len());
//!     println!("{} {:?} {:?}", feature.fid(), name.into_string(), geometry);
//! }
//! # Ok::<(), grass_vector::errors::GrassError>(())
//! ```
//!
//! ## Editing
//!
//! While a map is edited, features of its layers are read from the
//! primitives instead of the category index, carry ids from before the
//! session even for rewritten lines, and gain a `topo_symbol` column.

pub use crate::vector::feature::{
    cat_from_fid, lid_from_fid, make_feature_id, Feature, Field, FieldType, FieldValue,
    FID_FACTOR,
};
pub use crate::vector::geometry::{
    GeometryBuilder, NativeObject, Wkb, WkbType, WkbWriter, WKB_NDR, WKB_XDR,
};
pub use crate::vector::identity::MapIdentity;
pub use crate::vector::iterator::{FeatureIterator, FeatureRequest, FeatureSource};
pub use crate::vector::kind::{LayerKind, LayerName, TopoSymbol};
pub use crate::vector::layer::{MapLayer, DEFAULT_DATABASE, DEFAULT_DRIVER, TOPO_SYMBOL_FIELD};
pub use crate::vector::map::{RewriteTable, VectorMap};
pub use crate::vector::registry::{lock_map, LayerHandle, MapRef, MapRegistry};
pub use crate::vector::selection::Selection;

mod feature;
mod geometry;
mod identity;
mod iterator;
mod kind;
mod layer;
mod map;
mod registry;
mod selection;
mod wkb_to_geo;

#[cfg(test)]
mod tests;
