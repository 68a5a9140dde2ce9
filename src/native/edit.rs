use tracing::debug;

use super::cidx::CategoryIndex;
use super::primitives::{Categories, LineRecord, LineType, Vertex};
use super::topology::Topology;
use super::NativeMap;
use crate::errors::{GrassError, Result};
use crate::options::OpenFlags;

/// Topology level requested from [`NativeMap::build_partial`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopoLevel {
    /// Drop topology and category index.
    None,
    /// Nodes, areas, isles and the category index.
    All,
}

impl NativeMap {
    fn check_writable(&self) -> Result<()> {
        if self.mode.contains(OpenFlags::UPDATE) {
            Ok(())
        } else {
            Err(GrassError::NotEditing(self.head.name.clone()))
        }
    }

    fn check_primitive(line_type: LineType, points: &[Vertex]) -> Result<()> {
        if points.len() < line_type.min_points() {
            return Err(GrassError::InvalidPrimitive {
                line_type,
                points: points.len(),
            });
        }
        Ok(())
    }

    fn after_write(&mut self) {
        if self.topo.is_some() || self.cidx_update {
            self.topo = Some(Topology::build(&self.lines));
        }
        if self.cidx_update {
            self.cidx = Some(CategoryIndex::build(&self.lines, self.topo.as_ref()));
        }
    }

    /// Appends a new primitive and returns its id.
    pub fn write_line(
        &mut self,
        line_type: LineType,
        points: Vec<Vertex>,
        cats: Categories,
    ) -> Result<i32> {
        self.check_writable()?;
        Self::check_primitive(line_type, &points)?;
        self.lines.push(LineRecord {
            line_type,
            points,
            cats,
            alive: true,
        });
        self.after_write();
        Ok(self.lines.len() as i32)
    }

    /// Replaces a live primitive. The old id dies and the new primitive is
    /// appended under a new id, which is returned.
    pub fn rewrite_line(
        &mut self,
        lid: i32,
        line_type: LineType,
        points: Vec<Vertex>,
        cats: Categories,
    ) -> Result<i32> {
        self.check_writable()?;
        Self::check_primitive(line_type, &points)?;
        if !self.line_alive(lid) {
            return Err(GrassError::DeadLine { lid });
        }
        self.lines[lid as usize - 1].alive = false;
        self.lines.push(LineRecord {
            line_type,
            points,
            cats,
            alive: true,
        });
        self.after_write();
        let new_lid = self.lines.len() as i32;
        debug!(lid, new_lid, "rewrote line");
        Ok(new_lid)
    }

    pub fn delete_line(&mut self, lid: i32) -> Result<()> {
        self.check_writable()?;
        if !self.line_alive(lid) {
            return Err(GrassError::DeadLine { lid });
        }
        self.lines[lid as usize - 1].alive = false;
        self.after_write();
        Ok(())
    }

    /// Builds topology up to the requested level.
    pub fn build_partial(&mut self, level: TopoLevel) -> Result<()> {
        self.check_writable()?;
        match level {
            TopoLevel::None => {
                self.topo = None;
                self.cidx = None;
            }
            TopoLevel::All => {
                let topo = Topology::build(&self.lines);
                self.cidx = Some(CategoryIndex::build(&self.lines, Some(&topo)));
                self.topo = Some(topo);
                debug!(
                    map = %self.head.name,
                    nodes = self.num_nodes(),
                    areas = self.num_areas(),
                    isles = self.num_isles(),
                    "built topology"
                );
            }
        }
        Ok(())
    }

    pub fn build(&mut self) -> Result<()> {
        self.build_partial(TopoLevel::All)
    }
}
