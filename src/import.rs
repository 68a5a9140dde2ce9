//! Bulk import of geometries into a new map.
//!
//! Geometries are staged as a binary stream: a big-endian header with the
//! extent, raster dimensions and the output geometry type, followed by
//! length-prefixed WKB frames and a terminating length of `0xFFFFFFFF`.
//! [`VectorImport`] consumes such a stream on a worker thread and writes a
//! map with topology.

use std::convert::TryFrom;
use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, trace, warn};

use crate::errors::{GrassError, Result};
use crate::native::geom::interior_point;
use crate::native::{self, Categories, LineType, NativeMap, Vertex};
use crate::vector::{MapIdentity, Wkb, WkbType};

/// Frame length marking the end of the stream.
pub const END_OF_STREAM: u32 = 0xFFFF_FFFF;

/// Size of the encoded header in bytes.
pub const HEADER_SIZE: usize = 4 * 8 + 3 * 4;

/// Field the imported categories are written to.
pub const IMPORT_FIELD: i32 = 1;

/// Stream header.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImportHeader {
    pub extent: geo_types::Rect<f64>,
    /// Raster columns and rows the geometries were derived from, 0 if none.
    pub cols: i32,
    pub rows: i32,
    pub wkb_type: WkbType,
}

impl ImportHeader {
    pub fn new(extent: geo_types::Rect<f64>, wkb_type: WkbType) -> ImportHeader {
        ImportHeader {
            extent,
            cols: 0,
            rows: 0,
            wkb_type,
        }
    }

    fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        let (min, max) = (self.extent.min(), self.extent.max());
        for (i, v) in [min.x, min.y, max.x, max.y].into_iter().enumerate() {
            out[i * 8..(i + 1) * 8].copy_from_slice(&v.to_be_bytes());
        }
        out[32..36].copy_from_slice(&self.cols.to_be_bytes());
        out[36..40].copy_from_slice(&self.rows.to_be_bytes());
        out[40..44].copy_from_slice(&(self.wkb_type.code() as i32).to_be_bytes());
        out
    }

    fn decode(raw: &[u8; HEADER_SIZE]) -> Result<ImportHeader> {
        let f = |i: usize| {
            let mut b = [0u8; 8];
            b.copy_from_slice(&raw[i * 8..(i + 1) * 8]);
            f64::from_be_bytes(b)
        };
        let i = |at: usize| {
            let mut b = [0u8; 4];
            b.copy_from_slice(&raw[at..at + 4]);
            i32::from_be_bytes(b)
        };
        let code = u32::try_from(i(40)).map_err(|_| GrassError::UnsupportedGeometry(0))?;
        Ok(ImportHeader {
            extent: geo_types::Rect::new((f(0), f(1)), (f(2), f(3))),
            cols: i(32),
            rows: i(36),
            wkb_type: WkbType::from_code(code)?,
        })
    }
}

/// Writes an import stream.
#[derive(Debug)]
pub struct ImportWriter<W: Write> {
    inner: W,
    frames: usize,
}

impl<W: Write> ImportWriter<W> {
    /// Writes the header.
    pub fn new(mut inner: W, header: &ImportHeader) -> Result<ImportWriter<W>> {
        inner.write_all(&header.encode())?;
        Ok(ImportWriter { inner, frames: 0 })
    }

    pub fn write_geometry(&mut self, wkb: &Wkb) -> Result<()> {
        let len = u32::try_from(wkb.len())
            .ok()
            .filter(|&len| len != END_OF_STREAM)
            .ok_or_else(|| GrassError::BadArgument(format!("geometry of {} bytes", wkb.len())))?;
        self.inner.write_all(&len.to_be_bytes())?;
        self.inner.write_all(wkb.as_bytes())?;
        self.frames += 1;
        Ok(())
    }

    /// Number of geometries written so far.
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Writes the terminator and returns the underlying writer.
    pub fn finish(mut self) -> Result<W> {
        self.inner.write_all(&END_OF_STREAM.to_be_bytes())?;
        self.inner.flush()?;
        Ok(self.inner)
    }
}

/// Reads an import stream. Iterating yields the geometries up to the
/// terminator.
#[derive(Debug)]
pub struct ImportReader<R: Read> {
    inner: R,
    header: ImportHeader,
    done: bool,
}

impl<R: Read> ImportReader<R> {
    /// Reads the header.
    pub fn new(mut inner: R) -> Result<ImportReader<R>> {
        let mut raw = [0u8; HEADER_SIZE];
        inner.read_exact(&mut raw).map_err(truncated("header"))?;
        let header = ImportHeader::decode(&raw)?;
        debug!(?header, "reading import stream");
        Ok(ImportReader {
            inner,
            header,
            done: false,
        })
    }

    pub fn header(&self) -> &ImportHeader {
        &self.header
    }

    /// Next geometry, `None` after the terminator.
    pub fn next_geometry(&mut self) -> Result<Option<Wkb>> {
        if self.done {
            return Ok(None);
        }
        let mut raw = [0u8; 4];
        self.inner
            .read_exact(&mut raw)
            .map_err(truncated("frame length"))?;
        let len = u32::from_be_bytes(raw);
        if len == END_OF_STREAM {
            self.done = true;
            return Ok(None);
        }
        let mut bytes = Vec::new();
        (&mut self.inner)
            .take(u64::from(len))
            .read_to_end(&mut bytes)?;
        if bytes.len() != len as usize {
            return Err(GrassError::ImportFailed(format!(
                "frame of {len} bytes truncated to {}",
                bytes.len()
            )));
        }
        Wkb::from_bytes(bytes).map(Some)
    }
}

impl<R: Read> Iterator for ImportReader<R> {
    type Item = Result<Wkb>;

    fn next(&mut self) -> Option<Result<Wkb>> {
        match self.next_geometry() {
            Ok(Some(wkb)) => Some(Ok(wkb)),
            Ok(None) => None,
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

fn truncated(what: &'static str) -> impl Fn(std::io::Error) -> GrassError {
    move |e| match e.kind() {
        ErrorKind::UnexpectedEof => {
            GrassError::ImportFailed(format!("stream ended while reading {what}"))
        }
        _ => GrassError::Io(e),
    }
}

/// Outcome of a finished import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSummary {
    /// Geometries written, each with its own category.
    pub features: usize,
    /// Geometries of unsupported types.
    pub skipped: usize,
    /// Primitives in the new map.
    pub lines: i32,
}

/// Runs imports on a worker thread.
pub struct VectorImport;

impl VectorImport {
    /// Starts importing `stream` into a new map at `target`, replacing an
    /// existing map of that name.
    ///
    /// Native calls are serialised through [`native::lock`] one write at a
    /// time, so readers of other maps keep going while the import runs.
    /// `on_finished` is called on the worker thread with the outcome before
    /// the handle reports completion.
    pub fn start<R, F>(target: MapIdentity, stream: R, on_finished: F) -> Result<ImportHandle>
    where
        R: Read + Send + 'static,
        F: FnOnce(&Result<ImportSummary>) + Send + 'static,
    {
        let finished = Arc::new(AtomicBool::new(false));
        let done = Arc::clone(&finished);
        let thread = thread::Builder::new()
            .name(format!("import-{}", target.name))
            .spawn(move || {
                let result = import(&target, stream).map_err(|e| match e {
                    GrassError::ImportFailed(_) => e,
                    other => GrassError::ImportFailed(other.to_string()),
                });
                match &result {
                    Ok(summary) => debug!(map = %target, ?summary, "import finished"),
                    Err(e) => warn!(map = %target, "import failed: {e}"),
                }
                on_finished(&result);
                done.store(true, Ordering::Release);
                result
            })?;
        Ok(ImportHandle {
            finished,
            thread,
        })
    }
}

/// A running import.
#[derive(Debug)]
pub struct ImportHandle {
    finished: Arc<AtomicBool>,
    thread: JoinHandle<Result<ImportSummary>>,
}

impl ImportHandle {
    /// Whether the worker is done and the callback has run.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Blocks until the import is done.
    pub fn wait(self) -> Result<ImportSummary> {
        self.thread
            .join()
            .unwrap_or_else(|_| Err(GrassError::ImportFailed("import worker panicked".into())))
    }
}

fn import<R: Read>(target: &MapIdentity, stream: R) -> Result<ImportSummary> {
    let reader = ImportReader::new(stream)?;
    let header = *reader.header();
    let mut map = {
        let _guard = native::lock();
        native::call("Vect_open_new", || {
            NativeMap::open_new(&target.map_dir(), &target.name, false)
        })?
    };

    let mut summary = ImportSummary {
        features: 0,
        skipped: 0,
        lines: 0,
    };
    for wkb in reader {
        let wkb = wkb?;
        let geometry = match geo_types::Geometry::try_from(&wkb) {
            Ok(geometry) => geometry,
            Err(e) => {
                warn!(map = %target, "skipping geometry: {e}");
                summary.skipped += 1;
                continue;
            }
        };
        if wkb.type_code() != header.wkb_type.code() {
            trace!(
                expected = ?header.wkb_type,
                found = wkb.type_code(),
                "geometry type differs from header"
            );
        }
        let cat = summary.features as i32 + 1;
        let _guard = native::lock();
        native::call("Vect_write_line", || write_geometry(&mut map, &geometry, cat))?;
        summary.features += 1;
    }

    let _guard = native::lock();
    summary.lines = map.num_lines();
    native::call("Vect_build", || map.build())?;
    native::call("Vect_close", || map.close())?;
    Ok(summary)
}

fn ring(line: &geo_types::LineString<f64>) -> Vec<Vertex> {
    line.0.iter().map(|&c| Vertex::from(c)).collect()
}

/// Writes one geometry with category `cat`. The caller holds the native
/// lock.
fn write_geometry(map: &mut NativeMap, geometry: &geo_types::Geometry<f64>, cat: i32) -> Result<()> {
    let cats = Categories::single(IMPORT_FIELD, cat);
    match geometry {
        geo_types::Geometry::Point(p) => {
            map.write_line(LineType::Point, vec![Vertex::from(p.0)], cats)?;
        }
        geo_types::Geometry::LineString(line) => {
            map.write_line(LineType::Line, ring(line), cats)?;
        }
        geo_types::Geometry::Polygon(polygon) => {
            let outer = ring(polygon.exterior());
            let holes: Vec<Vec<Vertex>> = polygon.interiors().iter().map(ring).collect();
            map.write_line(LineType::Boundary, outer.clone(), Categories::new())?;
            for hole in &holes {
                map.write_line(LineType::Boundary, hole.clone(), Categories::new())?;
            }
            match interior_point(&outer, &holes) {
                Some(centroid) => {
                    map.write_line(LineType::Centroid, vec![centroid], cats)?;
                }
                None => warn!(cat, "no interior point for polygon, centroid not written"),
            }
        }
        _ => return Err(GrassError::BadArgument("unsupported import geometry".into())),
    }
    Ok(())
}
