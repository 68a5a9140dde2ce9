use serde::{Deserialize, Serialize};

use super::primitives::LineRecord;
use super::topology::Topology;
use crate::options::GeometryType;

/// One entry of the category index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CidxEntry {
    pub cat: i32,
    /// Single type bit: a primitive type or `AREA`.
    pub type_bits: u32,
    pub id: i32,
}

impl CidxEntry {
    pub fn geometry_type(&self) -> GeometryType {
        GeometryType::from_bits_truncate(self.type_bits)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct FieldIndex {
    pub field: i32,
    pub entries: Vec<CidxEntry>,
}

/// Category index: for every field, all (category, type, id) triples ordered
/// by category, then type, then id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct CategoryIndex {
    pub fields: Vec<FieldIndex>,
}

impl CategoryIndex {
    /// Builds the index from live primitives. Areas are indexed through the
    /// categories of their centroid when topology is available.
    pub fn build(lines: &[LineRecord], topo: Option<&Topology>) -> CategoryIndex {
        let mut fields: Vec<FieldIndex> = Vec::new();
        let mut push = |field: i32, entry: CidxEntry| {
            match fields.iter_mut().find(|f| f.field == field) {
                Some(index) => index.entries.push(entry),
                None => fields.push(FieldIndex {
                    field,
                    entries: vec![entry],
                }),
            }
        };

        for (i, line) in lines.iter().enumerate() {
            if !line.alive {
                continue;
            }
            let id = i as i32 + 1;
            for c in line.cats.iter() {
                push(
                    c.field,
                    CidxEntry {
                        cat: c.cat,
                        type_bits: line.line_type.flag().bits(),
                        id,
                    },
                );
            }
        }

        if let Some(topo) = topo {
            for (i, area) in topo.areas.iter().enumerate() {
                if area.centroid <= 0 {
                    continue;
                }
                let Some(centroid) = lines.get(area.centroid as usize - 1) else {
                    continue;
                };
                for c in centroid.cats.iter() {
                    push(
                        c.field,
                        CidxEntry {
                            cat: c.cat,
                            type_bits: GeometryType::AREA.bits(),
                            id: i as i32 + 1,
                        },
                    );
                }
            }
        }

        fields.sort_by_key(|f| f.field);
        for f in &mut fields {
            f.entries.sort();
        }
        CategoryIndex { fields }
    }

    /// Position of a field in the index.
    pub fn field_index(&self, field: i32) -> Option<usize> {
        self.fields.iter().position(|f| f.field == field)
    }

    pub fn num_fields(&self) -> usize {
        self.fields.len()
    }

    pub fn field_number(&self, index: usize) -> Option<i32> {
        self.fields.get(index).map(|f| f.field)
    }

    pub fn num_cats_by_index(&self, index: usize) -> usize {
        self.fields.get(index).map_or(0, |f| f.entries.len())
    }

    pub fn cat_by_index(&self, field_index: usize, cat_index: usize) -> Option<CidxEntry> {
        self.fields.get(field_index)?.entries.get(cat_index).copied()
    }

    /// Whether any entry of the field carries the category.
    pub fn has_cat(&self, field: i32, cat: i32) -> bool {
        self.field_index(field).is_some_and(|i| {
            let entries = &self.fields[i].entries;
            let pos = entries.partition_point(|e| e.cat < cat);
            entries.get(pos).is_some_and(|e| e.cat == cat)
        })
    }
}
