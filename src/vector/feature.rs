use std::sync::Arc;

use chrono::NaiveDate;

use crate::errors::{GrassError, Result};
use crate::vector::Wkb;

/// Factor separating the native id from the category in a feature id.
///
/// One native object carries several categories, so neither the native id nor
/// the category alone identifies a feature.
pub const FID_FACTOR: i64 = 1_000_000_000;

/// Feature id of the (native id, category) pair.
pub fn make_feature_id(lid: i32, cat: i32) -> i64 {
    i64::from(lid) * FID_FACTOR + i64::from(cat)
}

/// Native id encoded in a feature id, `None` for negative ids and ids
/// whose native part does not fit an `i32`.
pub fn lid_from_fid(fid: i64) -> Option<i32> {
    if fid < 0 {
        return None;
    }
    i32::try_from(fid / FID_FACTOR).ok()
}

/// Category encoded in a feature id, `None` for negative ids.
pub fn cat_from_fid(fid: i64) -> Option<i32> {
    if fid < 0 {
        return None;
    }
    i32::try_from(fid % FID_FACTOR).ok()
}

/// Type of an attribute column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Integer,
    Integer64,
    Real,
    String,
    Date,
}

impl FieldType {
    pub fn name(self) -> &'static str {
        match self {
            FieldType::Integer => "integer",
            FieldType::Integer64 => "integer64",
            FieldType::Real => "real",
            FieldType::String => "string",
            FieldType::Date => "date",
        }
    }

    /// Column type used when creating the column in SQL.
    pub fn sql_type(self) -> &'static str {
        match self {
            FieldType::Integer => "INTEGER",
            FieldType::Integer64 => "BIGINT",
            FieldType::Real => "DOUBLE PRECISION",
            FieldType::String => "TEXT",
            FieldType::Date => "DATE",
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            FieldType::Integer | FieldType::Integer64 | FieldType::Real
        )
    }
}

/// One column of a layer schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub field_type: FieldType,
}

impl Field {
    pub fn new(name: &str, field_type: FieldType) -> Field {
        Field {
            name: name.to_string(),
            field_type,
        }
    }
}

/// Value of a field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    IntegerValue(i32),
    Integer64Value(i64),
    RealValue(f64),
    StringValue(String),
    DateValue(NaiveDate),
    Null,
}

impl FieldValue {
    /// Interpret the value as `String`. Returns the value if it is a string.
    pub fn into_string(self) -> Option<String> {
        match self {
            FieldValue::StringValue(s) => Some(s),
            _ => None,
        }
    }

    /// Interpret the value as `i32`.
    pub fn into_int(self) -> Option<i32> {
        match self {
            FieldValue::IntegerValue(i) => Some(i),
            FieldValue::Integer64Value(i) => i32::try_from(i).ok(),
            _ => None,
        }
    }

    /// Interpret the value as `i64`.
    pub fn into_int64(self) -> Option<i64> {
        match self {
            FieldValue::IntegerValue(i) => Some(i64::from(i)),
            FieldValue::Integer64Value(i) => Some(i),
            _ => None,
        }
    }

    /// Interpret the value as `f64`. Integers are widened.
    pub fn into_real(self) -> Option<f64> {
        match self {
            FieldValue::RealValue(r) => Some(r),
            FieldValue::IntegerValue(i) => Some(f64::from(i)),
            FieldValue::Integer64Value(i) => Some(i as f64),
            _ => None,
        }
    }

    pub fn into_date(self) -> Option<NaiveDate> {
        match self {
            FieldValue::DateValue(d) => Some(d),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }
}

/// A feature produced by a [`FeatureIterator`](crate::vector::FeatureIterator).
///
/// The schema is shared with the iterator that produced the feature.
#[derive(Debug, Clone)]
pub struct Feature {
    fields: Arc<[Field]>,
    fid: i64,
    geometry: Option<Wkb>,
    attributes: Vec<FieldValue>,
    valid: bool,
}

impl Feature {
    pub fn new(fields: Arc<[Field]>) -> Feature {
        let attributes = vec![FieldValue::Null; fields.len()];
        Feature {
            fields,
            fid: -1,
            geometry: None,
            attributes,
            valid: false,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.fid = -1;
        self.geometry = None;
        self.attributes.clear();
        self.attributes.resize(self.fields.len(), FieldValue::Null);
        self.valid = false;
    }

    pub fn fid(&self) -> i64 {
        self.fid
    }

    pub(crate) fn set_fid(&mut self, fid: i64) {
        self.fid = fid;
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub(crate) fn set_valid(&mut self, valid: bool) {
        self.valid = valid;
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn geometry(&self) -> Option<&Wkb> {
        self.geometry.as_ref()
    }

    pub fn set_geometry(&mut self, geometry: Wkb) {
        self.geometry = Some(geometry);
    }

    /// Takes the geometry out of the feature.
    pub fn into_geometry(self) -> Option<Wkb> {
        self.geometry
    }

    pub fn attributes(&self) -> &[FieldValue] {
        &self.attributes
    }

    pub(crate) fn set_attribute(&mut self, index: usize, value: FieldValue) {
        if index >= self.attributes.len() {
            self.attributes.resize(index + 1, FieldValue::Null);
        }
        self.attributes[index] = value;
    }

    /// Get the value of a named field.
    pub fn field(&self, name: &str) -> Result<FieldValue> {
        let index = self
            .fields
            .iter()
            .position(|f| f.name == name)
            .ok_or_else(|| GrassError::InvalidFieldName {
                field_name: name.to_string(),
                method_name: "field",
            })?;
        Ok(self.attributes[index].clone())
    }

    pub fn field_by_index(&self, index: usize) -> Result<&FieldValue> {
        self.attributes
            .get(index)
            .ok_or(GrassError::InvalidFieldIndex {
                index,
                method_name: "field_by_index",
            })
    }
}
