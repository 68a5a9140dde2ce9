use std::collections::BTreeMap;
use std::time::SystemTime;

use tracing::{debug, warn};

use crate::attributes::{
    decode_value, open_store, quote_ident, read_links, write_links, AttributeStore, FieldLink,
};
use crate::errors::{GrassError, Result};
use crate::native::NativeMap;
use crate::vector::{Field, FieldType, FieldValue, MapIdentity};

/// Name of the column holding the topology symbol while a map is edited.
pub const TOPO_SYMBOL_FIELD: &str = "topo_symbol";

/// Database used for tables created by [`MapLayer::create_table`].
pub const DEFAULT_DATABASE: &str = "$GISDBASE/$LOCATION_NAME/$MAPSET/sqlite/sqlite.db";
pub const DEFAULT_DRIVER: &str = "sqlite";

/// One category field of a map with its cached attribute table.
pub struct MapLayer {
    identity: MapIdentity,
    field: i32,
    valid: bool,
    link: Option<FieldLink>,
    store: Option<Box<dyn AttributeStore>>,
    has_table: bool,
    key_column: usize,
    /// Columns of the table, without the topology symbol.
    table_fields: Vec<Field>,
    fields: Vec<Field>,
    attributes: BTreeMap<i32, Vec<FieldValue>>,
    min_max: Vec<Option<(f64, f64)>>,
    last_loaded: Option<SystemTime>,
    users: usize,
    editing: bool,
}

impl std::fmt::Debug for MapLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapLayer")
            .field("map", &self.identity.to_string())
            .field("field", &self.field)
            .field("has_table", &self.has_table)
            .field("fields", &self.fields)
            .field("rows", &self.attributes.len())
            .field("users", &self.users)
            .field("editing", &self.editing)
            .finish()
    }
}

impl MapLayer {
    pub(crate) fn new(identity: MapIdentity, field: i32) -> MapLayer {
        MapLayer {
            identity,
            field,
            valid: false,
            link: None,
            store: None,
            has_table: false,
            key_column: 0,
            table_fields: Vec::new(),
            fields: Vec::new(),
            attributes: BTreeMap::new(),
            min_max: Vec::new(),
            last_loaded: None,
            users: 0,
            editing: false,
        }
    }

    pub fn field(&self) -> i32 {
        self.field
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Current schema. While the map is edited the topology symbol column
    /// is appended.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn has_table(&self) -> bool {
        self.has_table
    }

    pub fn link(&self) -> Option<&FieldLink> {
        self.link.as_ref()
    }

    /// Index of the category key column in [`fields`](Self::fields).
    pub fn key_column(&self) -> usize {
        self.key_column
    }

    /// Minimum and maximum of each numeric column, `None` for other columns
    /// and for columns without values.
    pub fn min_max(&self) -> &[Option<(f64, f64)>] {
        &self.min_max
    }

    pub fn attributes(&self) -> &BTreeMap<i32, Vec<FieldValue>> {
        &self.attributes
    }

    pub fn user_count(&self) -> usize {
        self.users
    }

    pub fn last_loaded(&self) -> Option<SystemTime> {
        self.last_loaded
    }

    pub(crate) fn add_user(&mut self) {
        self.users += 1;
    }

    /// Drops one user; the cache is cleared when the last one leaves.
    pub(crate) fn remove_user(&mut self) {
        self.users = self.users.saturating_sub(1);
        if self.users == 0 {
            self.clear();
        }
    }

    /// Drops cached rows and the store connection.
    pub fn clear(&mut self) {
        self.attributes.clear();
        self.min_max.clear();
        self.store = None;
        self.valid = false;
    }

    /// Value of a column for a category. Without a table the category itself
    /// is the only attribute.
    pub fn attribute(&self, cat: i32, index: usize) -> FieldValue {
        if !self.has_table {
            return if index == 0 {
                FieldValue::IntegerValue(cat)
            } else {
                FieldValue::Null
            };
        }
        self.attributes
            .get(&cat)
            .and_then(|row| row.get(index))
            .cloned()
            .unwrap_or(FieldValue::Null)
    }

    /// Loads schema and rows from the linked table, or falls back to a
    /// single category column when there is none.
    pub fn load(&mut self) {
        self.clear();
        if let Err(e) = self.load_table() {
            warn!(map = %self.identity, field = self.field, "cannot load attributes: {e}");
            self.link = None;
            self.store = None;
            self.set_category_schema();
        }
        self.fields = self.table_fields.clone();
        if self.editing {
            self.fields
                .push(Field::new(TOPO_SYMBOL_FIELD, FieldType::Integer));
        }
        self.last_loaded = Some(SystemTime::now());
        self.valid = true;
        debug!(
            map = %self.identity,
            field = self.field,
            has_table = self.has_table,
            rows = self.attributes.len(),
            "loaded layer"
        );
    }

    fn set_category_schema(&mut self) {
        self.has_table = false;
        self.key_column = 0;
        self.table_fields = vec![Field::new("cat", FieldType::Integer)];
        self.attributes.clear();
        self.min_max = vec![None];
    }

    fn load_table(&mut self) -> Result<()> {
        let link = read_links(&self.identity.map_dir())?
            .into_iter()
            .find(|l| l.field == self.field);
        let Some(link) = link else {
            self.link = None;
            self.set_category_schema();
            return Ok(());
        };
        let store = open_store(&link.driver, &self.identity.expand(&link.database))?;
        if !store.table_exists(&link.table)? {
            warn!(map = %self.identity, table = %link.table, "linked table does not exist");
            self.link = Some(link);
            self.store = Some(store);
            self.set_category_schema();
            return Ok(());
        }

        let data = store.load_table(&link.table)?;
        let key_column = data
            .columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(&link.key))
            .ok_or_else(|| GrassError::InvalidFieldName {
                field_name: link.key.clone(),
                method_name: "load",
            })?;
        self.table_fields = data
            .columns
            .iter()
            .map(|c| Field::new(&c.name, c.field_type()))
            .collect();
        self.min_max = vec![None; data.columns.len()];

        for raw_row in &data.rows {
            let row: Vec<FieldValue> = data
                .columns
                .iter()
                .zip(raw_row)
                .map(|(column, raw)| decode_value(column, raw))
                .collect();
            for (i, value) in row.iter().enumerate() {
                if !self.table_fields[i].field_type.is_numeric() {
                    continue;
                }
                if let Some(v) = value.clone().into_real() {
                    let range = self.min_max[i].get_or_insert((v, v));
                    range.0 = range.0.min(v);
                    range.1 = range.1.max(v);
                }
            }
            match row[key_column].clone().into_int() {
                Some(cat) => {
                    self.attributes.insert(cat, row);
                }
                None => warn!(table = %link.table, "skipping row without a valid key"),
            }
        }
        self.key_column = key_column;
        self.has_table = true;
        self.link = Some(link);
        self.store = Some(store);
        Ok(())
    }

    /// Reloads when the store changed after the last load. Returns whether
    /// it reloaded.
    pub fn reload_if_outdated(&mut self) -> bool {
        let modified = self.store.as_ref().and_then(|s| s.last_modified());
        match (modified, self.last_loaded) {
            (Some(modified), Some(loaded)) if modified > loaded => {
                self.load();
                true
            }
            _ => false,
        }
    }

    pub(crate) fn start_edit(&mut self) {
        if self.editing {
            return;
        }
        self.editing = true;
        self.fields
            .push(Field::new(TOPO_SYMBOL_FIELD, FieldType::Integer));
    }

    pub(crate) fn close_edit(&mut self) {
        self.editing = false;
        self.load();
    }

    pub fn is_editing(&self) -> bool {
        self.editing
    }

    fn table(&self) -> Result<(&dyn AttributeStore, &FieldLink)> {
        match (&self.store, &self.link) {
            (Some(store), Some(link)) if self.has_table => Ok((store.as_ref(), link)),
            _ => Err(GrassError::NoTable { field: self.field }),
        }
    }

    /// Runs a statement against the layer's database and reloads the cache.
    pub fn execute_sql(&mut self, sql: &str) -> Result<()> {
        let store = self
            .store
            .as_ref()
            .ok_or(GrassError::NoTable { field: self.field })?;
        debug!(field = self.field, sql, "executing");
        let result = store.execute(sql);
        self.load();
        result
    }

    /// Updates the row of a category; `values` is an SQL assignment list
    /// such as `name = 'main', width = 3`.
    pub fn update_attributes(&mut self, cat: i32, values: &str) -> Result<()> {
        let (_, link) = self.table()?;
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = {}",
            quote_ident(&link.table),
            values,
            quote_ident(&link.key),
            cat
        );
        self.execute_sql(&sql)
    }

    /// Inserts a row holding only the category key. Existing rows are not
    /// checked.
    pub fn insert_attributes(&mut self, cat: i32) -> Result<()> {
        let (_, link) = self.table()?;
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(&link.table),
            quote_ident(&link.key),
            cat
        );
        self.execute_sql(&sql)
    }

    pub fn delete_attribute(&mut self, cat: i32) -> Result<()> {
        let (_, link) = self.table()?;
        let sql = format!(
            "DELETE FROM {} WHERE {} = {}",
            quote_ident(&link.table),
            quote_ident(&link.key),
            cat
        );
        self.execute_sql(&sql)
    }

    /// Whether a row exists for `cat` while no live object carries it. The
    /// caller holds the native lock.
    pub fn is_orphan(&self, cat: i32, map: &NativeMap) -> Result<bool> {
        let (store, link) = self.table()?;
        if store.count_where(&link.table, &link.key, cat)? == 0 {
            return Ok(false);
        }
        Ok(!map.has_cat(self.field, cat))
    }

    /// Creates and links a table for the layer. `columns` is an SQL column
    /// list without the key, e.g. `label VARCHAR(10), width INTEGER`. A row
    /// is inserted for each of `cats`.
    pub fn create_table(&mut self, key: &str, columns: &str, cats: &[i32]) -> Result<()> {
        if self.has_table {
            return Err(GrassError::BadArgument(format!(
                "layer {} of {} already has a table",
                self.field, self.identity
            )));
        }
        let table = if self.field == 1 {
            self.identity.name.clone()
        } else {
            format!("{}_{}", self.identity.name, self.field)
        };
        let link = FieldLink {
            field: self.field,
            name: None,
            table: table.clone(),
            key: key.to_string(),
            database: DEFAULT_DATABASE.to_string(),
            driver: DEFAULT_DRIVER.to_string(),
        };
        let store = open_store(&link.driver, &self.identity.expand(&link.database))?;

        let mut sql = format!(
            "CREATE TABLE {} ({} INTEGER",
            quote_ident(&table),
            quote_ident(key)
        );
        if !columns.trim().is_empty() {
            sql.push_str(", ");
            sql.push_str(columns);
        }
        sql.push_str(");\n");
        for cat in cats {
            sql.push_str(&format!(
                "INSERT INTO {} ({}) VALUES ({});\n",
                quote_ident(&table),
                quote_ident(key),
                cat
            ));
        }
        store.execute(&format!("BEGIN;\n{sql}COMMIT;"))?;

        let map_dir = self.identity.map_dir();
        let mut links = read_links(&map_dir)?;
        links.retain(|l| l.field != self.field);
        links.push(link);
        links.sort_by_key(|l| l.field);
        write_links(&map_dir, &links)?;
        debug!(map = %self.identity, field = self.field, table, "created table");
        self.load();
        Ok(())
    }

    /// Adds a column, creating the table (keyed by `cat`) when the layer has
    /// none yet.
    pub fn add_column(&mut self, field: &Field, cats: &[i32]) -> Result<()> {
        let column = format!("{} {}", quote_ident(&field.name), field.field_type.sql_type());
        if !self.has_table {
            return self.create_table("cat", &column, cats);
        }
        let (_, link) = self.table()?;
        let sql = format!("ALTER TABLE {} ADD COLUMN {}", quote_ident(&link.table), column);
        self.execute_sql(&sql)
    }

    /// Drops a column. The key column cannot be dropped.
    pub fn delete_column(&mut self, name: &str) -> Result<()> {
        let (_, link) = self.table()?;
        if name.eq_ignore_ascii_case(&link.key) {
            return Err(GrassError::BadArgument(format!(
                "cannot delete key column '{name}'"
            )));
        }
        if !self.table_fields.iter().any(|f| f.name == name) {
            return Err(GrassError::InvalidFieldName {
                field_name: name.to_string(),
                method_name: "delete_column",
            });
        }
        let sql = format!(
            "ALTER TABLE {} DROP COLUMN {}",
            quote_ident(&link.table),
            quote_ident(name)
        );
        self.execute_sql(&sql)
    }
}
