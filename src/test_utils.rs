use std::path::Path;

use crate::native::{self, Categories, LineType, NativeMap, Vertex};
use crate::vector::MapIdentity;

/// Asserts that two floats differ by less than a tolerance (default
/// `f64::EPSILON`).
macro_rules! assert_near {
    ($left:expr, $right:expr) => {
        assert_near!($left, $right, f64::EPSILON)
    };
    ($left:expr, $right:expr, $tol:expr) => {{
        let (left, right): (f64, f64) = ($left, $right);
        assert!(
            (left - right).abs() < $tol,
            "{} is not near {} (tolerance {})",
            left,
            right,
            $tol
        );
    }};
}
pub(crate) use assert_near;

pub const LOCATION: &str = "loc";
pub const MAPSET: &str = "PERMANENT";

/// A throwaway GIS database with one location and mapset.
///
/// The directory is removed when the value is dropped.
pub struct TempMapset {
    _temp_dir: tempfile::TempDir,
}

impl TempMapset {
    pub fn new() -> Self {
        let _temp_dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(_temp_dir.path().join(LOCATION).join(MAPSET).join("vector"))
            .unwrap();
        Self { _temp_dir }
    }

    pub fn gisdbase(&self) -> &Path {
        self._temp_dir.path()
    }

    pub fn identity(&self, name: &str) -> MapIdentity {
        MapIdentity::new(self.gisdbase(), LOCATION, MAPSET, name)
    }

    /// Creates a map, lets `write` add primitives and closes it, with
    /// topology when `build` is set.
    pub fn create_map<F>(&self, name: &str, build: bool, write: F) -> MapIdentity
    where
        F: FnOnce(&mut NativeMap),
    {
        let identity = self.identity(name);
        let _guard = native::lock();
        let mut map = NativeMap::open_new(&identity.map_dir(), name, false).unwrap();
        write(&mut map);
        if build {
            map.build().unwrap();
        }
        map.close().unwrap();
        identity
    }

    pub fn create_empty(&self, name: &str) -> MapIdentity {
        self.create_map(name, true, |_| {})
    }

    /// Three lines in field 1, cats 1..=3:
    /// (8,14)-(14,8), (1,1)-(5,5) and (20,20)-(30,30).
    ///
    /// The rectangle (0,0)-(10,10) overlaps the boxes of lines 1 and 2 but
    /// only line 2 itself.
    pub fn create_lines(&self, name: &str) -> MapIdentity {
        self.create_map(name, true, |map| {
            for (cat, (a, b)) in [
                ((8.0, 14.0), (14.0, 8.0)),
                ((1.0, 1.0), (5.0, 5.0)),
                ((20.0, 20.0), (30.0, 30.0)),
            ]
            .into_iter()
            .enumerate()
            {
                write_line(map, LineType::Line, &[a, b], cat as i32 + 1);
            }
        })
    }

    /// Two squares side by side sharing a boundary, with centroids of cats 1
    /// and 2, plus a boundary closing no area.
    ///
    /// Lines: 1 left square outline, 2 shared boundary, 3 right square
    /// outline, 4 and 5 centroids, 6 loose boundary.
    pub fn create_squares(&self, name: &str) -> MapIdentity {
        self.create_map(name, true, |map| {
            write_line(
                map,
                LineType::Boundary,
                &[(10.0, 0.0), (0.0, 0.0), (0.0, 10.0), (10.0, 10.0)],
                0,
            );
            write_line(map, LineType::Boundary, &[(10.0, 10.0), (10.0, 0.0)], 0);
            write_line(
                map,
                LineType::Boundary,
                &[(10.0, 10.0), (20.0, 10.0), (20.0, 0.0), (10.0, 0.0)],
                0,
            );
            write_line(map, LineType::Centroid, &[(5.0, 5.0)], 1);
            write_line(map, LineType::Centroid, &[(15.0, 5.0)], 2);
            write_line(map, LineType::Boundary, &[(30.0, 30.0), (40.0, 40.0)], 0);
        })
    }

    /// A 30x30 square (cat 1) with a 10x10 square island in its middle
    /// (cat 2).
    ///
    /// Lines: 1 outer boundary, 2 island boundary, 3 and 4 centroids.
    pub fn create_island(&self, name: &str) -> MapIdentity {
        self.create_map(name, true, |map| {
            write_line(
                map,
                LineType::Boundary,
                &[(0.0, 0.0), (30.0, 0.0), (30.0, 30.0), (0.0, 30.0), (0.0, 0.0)],
                0,
            );
            write_line(
                map,
                LineType::Boundary,
                &[(10.0, 10.0), (20.0, 10.0), (20.0, 20.0), (10.0, 20.0), (10.0, 10.0)],
                0,
            );
            write_line(map, LineType::Centroid, &[(5.0, 5.0)], 1);
            write_line(map, LineType::Centroid, &[(15.0, 15.0)], 2);
        })
    }

    /// `n` points on a diagonal, point `i` (1-based) with cat `i`.
    pub fn create_points(&self, name: &str, n: i32) -> MapIdentity {
        self.create_map(name, true, |map| {
            for i in 1..=n {
                let xy = f64::from(i);
                write_line(map, LineType::Point, &[(xy, xy)], i);
            }
        })
    }
}

/// Writes one primitive; `cat` 0 writes no category.
pub fn write_line(map: &mut NativeMap, line_type: LineType, points: &[(f64, f64)], cat: i32) -> i32 {
    let cats = if cat == 0 {
        Categories::new()
    } else {
        Categories::single(1, cat)
    };
    let points = points.iter().map(|&(x, y)| Vertex::xy(x, y)).collect();
    map.write_line(line_type, points, cats).unwrap()
}
