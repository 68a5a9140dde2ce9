use std::collections::HashSet;
use std::convert::TryFrom;

use super::{
    lid_from_fid, make_feature_id, Feature, FeatureRequest, FeatureSource, Field, FieldType,
    FieldValue, LayerKind, MapRegistry, Selection, TopoSymbol, VectorMap, WkbType,
    TOPO_SYMBOL_FIELD,
};
use crate::config::{clear_config_option, set_config_option, BUILD_TOPOLOGY};
use crate::errors::GrassError;
use crate::native::{BoundBox, Categories, LineType, Vertex};
use crate::options::{GeometryType, RequestFlags};
use crate::test_utils::{assert_near, write_line, TempMapset};

fn fids(source: &FeatureSource, request: FeatureRequest) -> Vec<i64> {
    source.features(request).map(|f| f.fid()).collect()
}

fn square() -> geo_types::Rect<f64> {
    geo_types::Rect::new((0.0, 0.0), (10.0, 10.0))
}

#[test]
fn test_selection_mask_matches_box_query() {
    let mapset = TempMapset::new();
    let identity = mapset.create_squares("squares");
    let mut map = VectorMap::new(identity);
    map.open().unwrap();
    for kind in [LayerKind::Boundary, LayerKind::Centroid, LayerKind::Polygon] {
        let (selection, selected, size) = map
            .with_native(|native| {
                let bbox = BoundBox::from_rect(&square());
                let selected = if kind == LayerKind::Polygon {
                    native.select_areas_by_box(&bbox)
                } else {
                    native.select_lines_by_box(&bbox, kind.type_mask())
                };
                let size = native.num_lines().max(native.num_areas());
                (
                    Selection::build(native, kind, &square(), false, false),
                    selected,
                    size,
                )
            })
            .unwrap();
        assert!(!selected.is_empty());
        assert_eq!(selection.len(), size as usize + 1);
        for id in 0..=size {
            assert_eq!(selection.contains(id), selected.contains(&id), "{kind:?} {id}");
        }
        assert!(!selection.contains(size + 1));
        assert!(!selection.contains(-1));
    }
    map.close();
}

#[test]
fn test_box_and_exact_intersection() {
    let mapset = TempMapset::new();
    let identity = mapset.create_lines("lines");
    let registry = MapRegistry::new();
    let source = FeatureSource::open(&registry, &identity, "1_line").unwrap();

    let all = fids(&source, FeatureRequest::new());
    assert_eq!(
        all,
        vec![
            make_feature_id(1, 1),
            make_feature_id(2, 2),
            make_feature_id(3, 3)
        ]
    );
    let by_box = fids(&source, FeatureRequest::new().with_rect(square()));
    assert_eq!(by_box, vec![make_feature_id(1, 1), make_feature_id(2, 2)]);
    let exact = fids(
        &source,
        FeatureRequest::new()
            .with_rect(square())
            .with_flags(RequestFlags::EXACT_INTERSECT),
    );
    assert_eq!(exact, vec![make_feature_id(2, 2)]);
}

#[test]
fn test_iteration_is_complete_without_duplicates() {
    let mapset = TempMapset::new();
    let identity = mapset.create_map("multi", true, |map| {
        let mut cats = Categories::single(1, 4);
        cats.add(1, 9);
        cats.add(2, 1);
        map.write_line(
            LineType::Line,
            vec![Vertex::xy(0.0, 0.0), Vertex::xy(1.0, 0.0)],
            cats,
        )
        .unwrap();
        for i in 0..5 {
            let x = f64::from(i);
            map.write_line(
                LineType::Point,
                vec![Vertex::xy(x, x)],
                Categories::single(1, 10 - i),
            )
            .unwrap();
        }
    });
    let registry = MapRegistry::new();
    let points = FeatureSource::open(&registry, &identity, "1_point").unwrap();
    let lines = FeatureSource::open(&registry, &identity, "1_line").unwrap();

    let mut iter = points.features(FeatureRequest::new());
    let mut feature = iter.new_feature();
    let mut seen = Vec::new();
    while iter.fetch_feature(&mut feature) {
        assert!(feature.is_valid());
        seen.push(feature.fid());
    }
    assert!(!feature.is_valid());
    assert!(!iter.fetch_feature(&mut feature));
    assert!(!iter.fetch_feature(&mut feature));
    assert!(iter.is_closed());
    assert!(!iter.rewind());

    assert_eq!(seen.len(), 5);
    let unique: HashSet<_> = seen.iter().copied().collect();
    assert_eq!(unique.len(), 5);
    // Category index order: ascending by category.
    assert_eq!(seen[0], make_feature_id(6, 6));
    assert_eq!(seen[4], make_feature_id(2, 10));

    // One feature per category of the field.
    assert_eq!(
        fids(&lines, FeatureRequest::new()),
        vec![make_feature_id(1, 4), make_feature_id(1, 9)]
    );
}

#[test]
fn test_rewind_restarts() {
    let mapset = TempMapset::new();
    let identity = mapset.create_points("pts", 3);
    let registry = MapRegistry::new();
    let source = FeatureSource::open(&registry, &identity, "1_point").unwrap();
    let mut iter = source.features(FeatureRequest::new());
    let first = iter.next().unwrap().fid();
    iter.next().unwrap();
    assert!(iter.rewind());
    assert_eq!(iter.next().unwrap().fid(), first);
    iter.close();
    iter.close();
    assert!(iter.next().is_none());
}

#[test]
fn test_fid_request() {
    let mapset = TempMapset::new();
    let identity = mapset.create_points("pts", 4);
    let registry = MapRegistry::new();
    let source = FeatureSource::open(&registry, &identity, "1_point").unwrap();

    let features: Vec<Feature> = source
        .features(FeatureRequest::new().with_fid(make_feature_id(3, 3)))
        .collect();
    assert_eq!(features.len(), 1);
    assert_eq!(
        features[0].field("cat").unwrap(),
        FieldValue::IntegerValue(3)
    );
    let geo = geo_types::Geometry::try_from(features[0].geometry().unwrap()).unwrap();
    assert_eq!(geo, geo_types::Geometry::Point(geo_types::Point::new(3.0, 3.0)));

    assert!(fids(&source, FeatureRequest::new().with_fid(make_feature_id(17, 1))).is_empty());

    let feature = source
        .features(
            FeatureRequest::new()
                .with_fid(make_feature_id(1, 1))
                .with_flags(RequestFlags::NO_GEOMETRY),
        )
        .next()
        .unwrap();
    assert!(feature.geometry().is_none());
}

#[test]
fn test_rewritten_line_keeps_feature_id() {
    let mapset = TempMapset::new();
    let identity = mapset.create_points("edited", 41);
    let registry = MapRegistry::new();
    let before = FeatureSource::open(&registry, &identity, "1_point").unwrap();
    assert!(!before.is_editing());

    {
        let mut map = before.handle().map();
        map.start_edit().unwrap();
        assert!(map.is_editing());
        assert_eq!(map.old_num_lines(), 41);
        let new_lid = map
            .rewrite_line(
                5,
                LineType::Point,
                vec![Vertex::xy(100.0, 100.0)],
                Categories::single(1, 5),
            )
            .unwrap();
        assert_eq!(new_lid, 42);
        assert_eq!(map.rewrites().new_lid(5), 42);
        assert!(map.old_geometry(5).is_some());
    }

    let editing = FeatureSource::open(&registry, &identity, "1_point").unwrap();
    assert!(editing.is_editing());
    assert_eq!(editing.fields().last().unwrap().name, TOPO_SYMBOL_FIELD);

    let feature = editing
        .features(FeatureRequest::new().with_fid(make_feature_id(5, 5)))
        .next()
        .unwrap();
    let geo = geo_types::Geometry::try_from(feature.geometry().unwrap()).unwrap();
    assert_eq!(
        geo,
        geo_types::Geometry::Point(geo_types::Point::new(100.0, 100.0))
    );
    assert_eq!(feature.field("cat").unwrap(), FieldValue::IntegerValue(5));
    assert_eq!(
        feature.field(TOPO_SYMBOL_FIELD).unwrap(),
        FieldValue::IntegerValue(TopoSymbol::Point.code())
    );

    let all = fids(&editing, FeatureRequest::new());
    assert_eq!(all.len(), 41);
    assert!(all.contains(&make_feature_id(5, 5)));
    assert!(all.iter().all(|&fid| lid_from_fid(fid) != Some(42)));

    {
        let mut map = editing.handle().map();
        map.close_edit(false).unwrap();
        assert!(!map.is_editing());
        assert!(map.rewrites().is_empty());
        assert_eq!(map.version(), 1);
        assert_eq!(map.layer(1).unwrap().fields().len(), 1);
    }

    let after = FeatureSource::open(&registry, &identity, "1_point").unwrap();
    let feature = after
        .features(FeatureRequest::new().with_fid(make_feature_id(42, 5)))
        .next()
        .unwrap();
    assert!(feature.is_valid());
    assert_eq!(fids(&after, FeatureRequest::new()).len(), 41);
}

#[test]
fn test_edit_session_rules() {
    let mapset = TempMapset::new();
    let identity = mapset.create_points("rules", 2);
    let mut map = VectorMap::new(identity);
    assert!(matches!(
        map.start_edit(),
        Err(GrassError::EditSession { .. })
    ));
    assert!(matches!(
        map.write_line(LineType::Point, vec![Vertex::xy(0.0, 0.0)], Categories::new()),
        Err(GrassError::NotEditing(_))
    ));
    map.open().unwrap();
    assert!(matches!(map.close_edit(false), Err(GrassError::NotEditing(_))));
    map.start_edit().unwrap();
    assert!(matches!(
        map.start_edit(),
        Err(GrassError::EditSession { .. })
    ));
    assert!(map.is_valid());

    let lid = map
        .write_line(LineType::Point, vec![Vertex::xy(9.0, 9.0)], Categories::single(1, 3))
        .unwrap();
    assert_eq!(lid, 3);
    map.delete_line(1).unwrap();
    assert!(map.old_geometry(1).is_some());
    assert!(matches!(
        map.delete_line(1),
        Err(GrassError::DeadLine { lid: 1 })
    ));
    map.close_edit(false).unwrap();
    assert_eq!(map.num_lines(), 3);
    assert!(map.with_native(|native| !native.line_alive(1)).unwrap());
    map.close();
}

#[test]
fn test_boundary_and_centroid_symbols() {
    let mapset = TempMapset::new();
    let identity = mapset.create_squares("squares");
    let mut map = VectorMap::new(identity);
    map.open().unwrap();
    let symbols: Vec<TopoSymbol> = (1..=6).map(|lid| map.line_symbol(lid).unwrap()).collect();
    assert_eq!(
        symbols,
        vec![
            TopoSymbol::Boundary1,
            TopoSymbol::Boundary2,
            TopoSymbol::Boundary1,
            TopoSymbol::CentroidIn,
            TopoSymbol::CentroidIn,
            TopoSymbol::Boundary0,
        ]
    );
    assert!(matches!(
        map.line_symbol(7),
        Err(GrassError::DeadLine { lid: 7 })
    ));
    map.close();
}

#[test]
fn test_polygon_layer() {
    let mapset = TempMapset::new();
    let identity = mapset.create_squares("squares");
    let registry = MapRegistry::new();
    let source = FeatureSource::open(&registry, &identity, "1_polygon").unwrap();
    assert_eq!(source.kind().wkb_type(), WkbType::Polygon);

    let features: Vec<Feature> = source.features(FeatureRequest::new()).collect();
    assert_eq!(features.len(), 2);
    for (feature, cat) in features.iter().zip([1, 2]) {
        assert_eq!(feature.field("cat").unwrap(), FieldValue::IntegerValue(cat));
        let wkb = feature.geometry().unwrap();
        assert_eq!(wkb.wkb_type().unwrap(), WkbType::Polygon);
        let geo_types::Geometry::Polygon(polygon) = geo_types::Geometry::try_from(wkb).unwrap()
        else {
            panic!("expected a polygon");
        };
        let n = polygon.exterior().0.len();
        assert_eq!(wkb.len(), 1 + 4 + 4 + 4 + 16 * n);
        assert!(polygon.interiors().is_empty());
        let area: f64 = polygon
            .exterior()
            .lines()
            .map(|l| l.start.x * l.end.y - l.end.x * l.start.y)
            .sum::<f64>()
            / 2.0;
        assert_near!(area.abs(), 100.0, 1e-9);
    }

    // The right square only.
    let right = geo_types::Rect::new((14.0, 1.0), (16.0, 2.0));
    let fids = fids(&source, FeatureRequest::new().with_rect(right));
    assert_eq!(fids.len(), 1);
    assert_eq!(fids[0] % 1_000_000_000, 2);
}

#[test]
fn test_topology_layers() {
    let mapset = TempMapset::new();
    let identity = mapset.create_squares("squares");
    let registry = MapRegistry::new();

    let lines = FeatureSource::open(&registry, &identity, "topo_line").unwrap();
    assert_eq!(lines.fields().len(), 6);
    let features: Vec<Feature> = lines.features(FeatureRequest::new()).collect();
    let ids: Vec<i64> = features.iter().map(Feature::fid).collect();
    assert_eq!(ids, vec![1, 2, 3, 6]);
    let shared = &features[1];
    assert_eq!(
        shared.field("type").unwrap(),
        FieldValue::StringValue("boundary".to_string())
    );
    let left = shared.field("left").unwrap().into_int().unwrap();
    let right = shared.field("right").unwrap().into_int().unwrap();
    assert!(left > 0 && right > 0 && left != right);
    assert!(features[3].field("left").unwrap() == FieldValue::IntegerValue(0));

    let points = FeatureSource::open(&registry, &identity, "topo_point").unwrap();
    assert_eq!(fids(&points, FeatureRequest::new()), vec![4, 5]);

    let nodes = FeatureSource::open(&registry, &identity, "topo_node").unwrap();
    let features: Vec<Feature> = nodes.features(FeatureRequest::new()).collect();
    assert_eq!(features.len(), 4);
    let junctions = features
        .iter()
        .filter(|f| {
            f.field("lines")
                .unwrap()
                .into_string()
                .is_some_and(|l| l.split(',').count() == 3)
        })
        .count();
    assert_eq!(junctions, 2);
    let node = nodes
        .features(FeatureRequest::new().with_fid(1))
        .next()
        .unwrap();
    assert_eq!(node.field("id").unwrap(), FieldValue::IntegerValue(1));

    // Node masks cover node ids.
    let corner = geo_types::Rect::new((29.0, 29.0), (31.0, 31.0));
    assert_eq!(fids(&nodes, FeatureRequest::new().with_rect(corner)).len(), 1);
}

#[test]
fn test_attributes_from_table() {
    let mapset = TempMapset::new();
    let identity = mapset.create_lines("roads");
    let registry = MapRegistry::new();
    let source = FeatureSource::open(&registry, &identity, "1_line").unwrap();
    {
        let mut map = source.handle().map();
        map.create_table(1, "cat", "name TEXT, width DOUBLE PRECISION")
            .unwrap();
        let layer = map.layer_mut(1).unwrap();
        layer
            .update_attributes(2, "name = 'main', width = 7.5")
            .unwrap();
        assert!(!map.is_orphan(1, 2).unwrap());
        map.layer_mut(1).unwrap().insert_attributes(8).unwrap();
        assert!(map.is_orphan(1, 8).unwrap());
        map.add_column(1, &Field::new("lanes", FieldType::Integer))
            .unwrap();
    }

    let source = FeatureSource::open(&registry, &identity, "1_line").unwrap();
    let fields = source.fields();
    let names: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["cat", "name", "width", "lanes"]);

    let feature = source
        .features(FeatureRequest::new().with_fid(make_feature_id(2, 2)))
        .next()
        .unwrap();
    assert_eq!(
        feature.field("name").unwrap(),
        FieldValue::StringValue("main".to_string())
    );
    assert_eq!(feature.field("width").unwrap(), FieldValue::RealValue(7.5));
    assert!(feature.field("lanes").unwrap().is_null());

    let subset = source
        .features(
            FeatureRequest::new()
                .with_fid(make_feature_id(2, 2))
                .with_subset(vec![2]),
        )
        .next()
        .unwrap();
    assert!(subset.field("name").unwrap().is_null());
    assert_eq!(subset.field("width").unwrap(), FieldValue::RealValue(7.5));
}

#[test]
fn test_registry_reference_counting() {
    let mapset = TempMapset::new();
    let identity = mapset.create_points("shared", 2);
    let registry = MapRegistry::new();

    let first = registry.open_layer(&identity, 1).unwrap();
    let second = registry.open_layer(&identity, 1).unwrap();
    let other = registry.open_layer(&identity, 2).unwrap();
    assert_eq!(registry.len(), 1);
    assert_eq!(first.map().user_count(), 3);
    assert_eq!(first.map().layer(1).unwrap().user_count(), 2);

    registry.close_layer(first);
    drop(other);
    let map = registry.get(&identity).unwrap();
    assert_eq!(super::lock_map(&map).user_count(), 1);
    assert!(super::lock_map(&map).layer(2).is_none());
    drop(second);
    assert!(registry.is_empty());
    assert!(!super::lock_map(&map).is_valid());

    let missing = mapset.identity("missing");
    assert!(matches!(
        registry.open_layer(&missing, 1),
        Err(GrassError::Open { .. })
    ));
    assert!(registry.is_empty());
}

#[test]
fn test_frozen_map_has_no_features() {
    let mapset = TempMapset::new();
    let identity = mapset.create_points("frozen", 3);
    let registry = MapRegistry::new();
    let source = FeatureSource::open(&registry, &identity, "1_point").unwrap();
    source.handle().map().set_frozen(true);
    assert!(fids(&source, FeatureRequest::new()).is_empty());
    source.handle().map().set_frozen(false);
    assert_eq!(fids(&source, FeatureRequest::new()).len(), 3);
}

#[test]
fn test_open_builds_missing_topology() {
    let mapset = TempMapset::new();
    let identity = mapset.create_map("raw", false, |map| {
        crate::test_utils::write_line(map, LineType::Line, &[(0.0, 0.0), (3.0, 4.0)], 1);
    });

    set_config_option(BUILD_TOPOLOGY, "NO").unwrap();
    let mut map = VectorMap::new(identity.clone());
    let refused = map.open();
    clear_config_option(BUILD_TOPOLOGY).unwrap();
    assert!(matches!(refused, Err(GrassError::Open { .. })));
    assert!(!map.is_valid());

    map.open().unwrap();
    assert!(map.is_valid());
    assert!(!map.map_outdated());
    let n = map
        .with_native(|native| {
            native.select_lines_by_box(
                &BoundBox::from_rect(&geo_types::Rect::new((0.0, 0.0), (1.0, 1.0))),
                GeometryType::LINE,
            )
        })
        .unwrap();
    assert_eq!(n, vec![1]);
    map.close();
}

#[test]
fn test_outdated_map_is_reopened() {
    let mapset = TempMapset::new();
    let identity = mapset.create_points("changing", 2);
    let mut map = VectorMap::new(identity.clone());
    map.open().unwrap();
    assert!(!map.map_outdated());
    assert!(!map.attributes_outdated());

    // Modification times may have a resolution of one second.
    std::thread::sleep(std::time::Duration::from_millis(1100));
    {
        let _guard = crate::native::lock();
        let mut writer = crate::native::NativeMap::open_update(&identity.map_dir()).unwrap();
        crate::test_utils::write_line(&mut writer, LineType::Point, &[(7.0, 7.0)], 3);
        // Without the category index the map is still being written.
        assert!(!map.map_outdated());
        writer.build().unwrap();
        writer.close().unwrap();
    }
    assert!(map.map_outdated());
    assert!(map.refresh_if_outdated().unwrap());
    assert_eq!(map.version(), 1);
    assert_eq!(map.num_lines(), 3);
    assert!(!map.map_outdated());
    map.close();
}

#[test]
fn test_edit_mode_rect_selects_points_and_lines() {
    let mapset = TempMapset::new();
    let identity = mapset.create_map("mixed", true, |map| {
        write_line(map, LineType::Point, &[(2.0, 2.0)], 1);
        write_line(map, LineType::Line, &[(1.0, 1.0), (3.0, 3.0)], 2);
    });
    let registry = MapRegistry::new();
    let lines = FeatureSource::open(&registry, &identity, "1_line").unwrap();
    let polygons = FeatureSource::open(&registry, &identity, "1_polygon").unwrap();
    lines.handle().map().start_edit().unwrap();

    let expected = vec![make_feature_id(1, 1), make_feature_id(2, 2)];
    let rect = geo_types::Rect::new((0.0, 0.0), (4.0, 4.0));
    for source in [&lines, &polygons] {
        assert!(source.is_editing());
        assert_eq!(fids(source, FeatureRequest::new()), expected);
        assert_eq!(fids(source, FeatureRequest::new().with_rect(rect)), expected);
        let exact = FeatureRequest::new()
            .with_rect(rect)
            .with_flags(RequestFlags::EXACT_INTERSECT);
        assert_eq!(fids(source, exact), expected);
        let away = geo_types::Rect::new((10.0, 10.0), (11.0, 11.0));
        assert!(fids(source, FeatureRequest::new().with_rect(away)).is_empty());
    }
}

#[test]
fn test_edit_mode_fid_matches_walk() {
    let mapset = TempMapset::new();
    let identity = mapset.create_squares("squares");
    let registry = MapRegistry::new();
    let source = FeatureSource::open(&registry, &identity, "1_polygon").unwrap();
    source.handle().map().start_edit().unwrap();

    let walked: Vec<Feature> = source.features(FeatureRequest::new()).collect();
    assert_eq!(walked.len(), 6);
    for feature in &walked {
        let found = source
            .features(FeatureRequest::new().with_fid(feature.fid()))
            .next()
            .unwrap();
        assert_eq!(found.fid(), feature.fid());
        assert_eq!(found.geometry(), feature.geometry());
    }
    let first = walked[0].geometry().unwrap();
    assert_eq!(walked[0].fid(), make_feature_id(1, 0));
    assert_eq!(first.wkb_type().unwrap(), WkbType::LineString);
}

#[test]
fn test_source_follows_edit_session() {
    let mapset = TempMapset::new();
    let identity = mapset.create_points("points", 4);
    let registry = MapRegistry::new();
    let source = FeatureSource::open(&registry, &identity, "1_point").unwrap();
    assert_eq!(source.fields().len(), 1);

    {
        let mut map = source.handle().map();
        map.start_edit().unwrap();
        let new_lid = map
            .rewrite_line(
                2,
                LineType::Point,
                vec![Vertex::xy(9.0, 9.0)],
                Categories::single(1, 2),
            )
            .unwrap();
        assert_eq!(new_lid, 5);
    }

    assert!(source.is_editing());
    assert_eq!(source.fields().len(), 2);
    let mut features = source.features(FeatureRequest::new());
    assert!(features.is_editing());
    assert_eq!(features.fields().len(), 2);
    let features: Vec<Feature> = features.by_ref().collect();
    let all: Vec<i64> = features.iter().map(|f| f.fid()).collect();
    assert!(all.contains(&make_feature_id(2, 2)));
    assert!(all.iter().all(|&fid| lid_from_fid(fid) != Some(5)));
    for feature in &features {
        assert_eq!(feature.attributes().len(), 2);
        assert_eq!(
            feature.field(TOPO_SYMBOL_FIELD).unwrap(),
            FieldValue::IntegerValue(TopoSymbol::Point.code())
        );
    }

    source.handle().map().close_edit(false).unwrap();
    assert!(!source.is_editing());
    assert_eq!(source.fields().len(), 1);
    let after = fids(&source, FeatureRequest::new());
    assert_eq!(after.len(), 4);
    assert!(after.contains(&make_feature_id(5, 2)));
}

#[test]
fn test_out_of_range_fid_matches_nothing() {
    let mapset = TempMapset::new();
    let identity = mapset.create_points("points", 4);
    let registry = MapRegistry::new();
    let source = FeatureSource::open(&registry, &identity, "1_point").unwrap();
    assert_eq!(
        fids(&source, FeatureRequest::new().with_fid(make_feature_id(3, 3))),
        vec![make_feature_id(3, 3)]
    );
    for fid in [4_294_967_299_000_000_003, -1, -3_000_000_003, i64::MAX] {
        assert!(
            fids(&source, FeatureRequest::new().with_fid(fid)).is_empty(),
            "{fid}"
        );
    }
}

#[test]
fn test_polygon_with_island() {
    let mapset = TempMapset::new();
    let identity = mapset.create_island("island");
    let registry = MapRegistry::new();
    let source = FeatureSource::open(&registry, &identity, "1_polygon").unwrap();

    let features: Vec<Feature> = source.features(FeatureRequest::new()).collect();
    assert_eq!(features.len(), 2);

    let outer = &features[0];
    assert_eq!(outer.field("cat").unwrap(), FieldValue::IntegerValue(1));
    let wkb = outer.geometry().unwrap();
    let geo_types::Geometry::Polygon(polygon) = geo_types::Geometry::try_from(wkb).unwrap()
    else {
        panic!("expected a polygon");
    };
    let k0 = polygon.exterior().0.len();
    assert_eq!(k0, 5);
    assert_eq!(polygon.interiors().len(), 1);
    let isles: usize = polygon
        .interiors()
        .iter()
        .map(|ring| 4 + 16 * ring.0.len())
        .sum();
    assert_eq!(wkb.len(), 1 + 4 + 4 + 4 + 16 * k0 + isles);

    // The first ring is the outer square, the second the island.
    assert!(polygon.exterior().0.iter().any(|c| c.x == 30.0));
    let island = &polygon.interiors()[0];
    assert_eq!(island.0.len(), 5);
    assert!(island
        .0
        .iter()
        .all(|c| (10.0..=20.0).contains(&c.x) && (10.0..=20.0).contains(&c.y)));

    let inner = &features[1];
    assert_eq!(inner.field("cat").unwrap(), FieldValue::IntegerValue(2));
    let wkb = inner.geometry().unwrap();
    let geo_types::Geometry::Polygon(polygon) = geo_types::Geometry::try_from(wkb).unwrap()
    else {
        panic!("expected a polygon");
    };
    assert!(polygon.interiors().is_empty());
    assert_eq!(wkb.len(), 1 + 4 + 4 + 4 + 16 * 5);
}

#[test]
fn test_invalid_map_is_reopened_on_next_layer() {
    let mapset = TempMapset::new();
    let identity = mapset.create_points("reopen", 3);
    let registry = MapRegistry::new();
    let first = FeatureSource::open(&registry, &identity, "1_point").unwrap();
    first.handle().map().close();
    assert!(!first.handle().map().is_valid());
    assert!(fids(&first, FeatureRequest::new()).is_empty());

    let second = FeatureSource::open(&registry, &identity, "1_point").unwrap();
    assert_eq!(registry.len(), 1);
    assert!(first.handle().map().is_valid());
    assert_eq!(fids(&second, FeatureRequest::new()).len(), 3);
    assert_eq!(fids(&first, FeatureRequest::new()).len(), 3);
}
