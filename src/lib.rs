//! Feature access to [GRASS](https://grass.osgeo.org/) vector maps.
//!
//! A map is a directory of native primitives (points, lines, boundaries,
//! centroids) with a topology built over them and an optional attribute
//! table per category field. This crate exposes each map as a set of layers
//! of simple features with stable ids, attributes and WKB geometries, and
//! keeps them readable while the map is edited.
//!
//! ## Use
//!
//! ```no_run
//! use grass_vector::{FeatureRequest, FeatureSource, MapIdentity, MapRegistry};
//!
//! let registry = MapRegistry::new();
//! let map = MapIdentity::new("/data/grassdata", "nc", "PERMANENT", "roads");
//! let roads = FeatureSource::open(&registry, &map, "1_line")?;
//! let bbox = geo_types::Rect::new((630_000.0, 215_000.0), (640_000.0, 225_000.0));
//! for feature in roads.features(FeatureRequest::new().with_rect(bbox)) {
//!     println!("{} {:?}", feature.fid(), feature.field("name")?.into_string());
//! }
//! # Ok::<(), grass_vector::GrassError>(())
//! ```
//!
//! Native calls are not reentrant. Everything touching a map serialises
//! through [`native::lock`], which the types of [`vector`] take for you.

#![crate_name = "grass_vector"]
#![crate_type = "lib"]

pub mod attributes;
pub mod config;
pub mod errors;
pub mod import;
pub mod native;
pub mod options;
pub mod utils;
pub mod vector;

pub use errors::{GrassError, Result};
pub use import::{ImportHandle, ImportHeader, ImportReader, ImportSummary, ImportWriter, VectorImport};
pub use options::{GeometryType, OpenFlags, RequestFlags};
pub use vector::{
    Feature, FeatureIterator, FeatureRequest, FeatureSource, Field, FieldType, FieldValue,
    LayerHandle, LayerKind, MapIdentity, MapLayer, MapRegistry, TopoSymbol, VectorMap, Wkb,
    WkbType,
};

#[cfg(test)]
mod test_utils;
