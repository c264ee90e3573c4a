// src/dataset/mod.rs
pub mod loader;
pub mod store;
pub mod taxonomy;

pub use loader::{load_csv, load_source, resolve_source, LoadOptions};
pub use store::DatasetStore;
pub use taxonomy::Taxonomy;

use chrono::{DateTime, Utc};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::{collections::HashMap, fmt, path::PathBuf, sync::Arc};

/// Placeholder rendered for missing values.
pub const PLACEHOLDER: &str = "—";

/// A single cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    /// `raw` is the cell as written; `value` is only used for JSON.
    Number { value: f64, raw: String },
    Missing,
}

impl Value {
    /// A numeric cell that keeps its source spelling.
    pub fn number(value: f64, raw: impl Into<String>) -> Self {
        Value::Number {
            value,
            raw: raw.into(),
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }

    /// The string used for searching: missing values are empty.
    pub fn search_text(&self) -> String {
        match self {
            Value::Missing => String::new(),
            other => other.to_string(),
        }
    }

    /// The string used in reports: missing values are the placeholder dash.
    pub fn display_or_placeholder(&self) -> String {
        match self {
            Value::Missing => PLACEHOLDER.to_string(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => f.write_str(s),
            Value::Number { raw, .. } => f.write_str(raw),
            Value::Missing => Ok(()),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Text(s) => serializer.serialize_str(s),
            Value::Number { value, .. } => serializer.serialize_f64(*value),
            Value::Missing => serializer.serialize_none(),
        }
    }
}

/// Ordered field names with a name → position index.
#[derive(Debug, Default)]
pub struct Schema {
    fields: Vec<String>,
    index: HashMap<String, usize>,
}

impl Schema {
    pub fn new(fields: Vec<String>) -> Self {
        let index = fields
            .iter()
            .enumerate()
            .map(|(i, f)| (f.clone(), i))
            .collect();
        Self { fields, index }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn position(&self, field: &str) -> Option<usize> {
        self.index.get(field).copied()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.index.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// One row of the source table, aligned to its schema.
#[derive(Debug, Clone)]
pub struct Record {
    schema: Arc<Schema>,
    values: Vec<Value>,
}

impl Record {
    /// `values` is padded with `Missing` or truncated to the schema width.
    pub fn new(schema: Arc<Schema>, mut values: Vec<Value>) -> Self {
        values.resize(schema.len(), Value::Missing);
        Self { schema, values }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.schema.position(field).map(|i| &self.values[i])
    }

    pub(crate) fn set(&mut self, field: &str, value: Value) {
        if let Some(i) = self.schema.position(field) {
            self.values[i] = value;
        }
    }

    /// `(field, value)` pairs in schema order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.schema
            .fields()
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (field, value) in self.iter() {
            map.serialize_entry(field, value)?;
        }
        map.end()
    }
}

/// The parsed source table. Immutable once built.
#[derive(Debug)]
pub struct Dataset {
    pub source: Option<PathBuf>,
    pub schema: Arc<Schema>,
    pub taxonomy: Taxonomy,
    pub records: Vec<Record>,
    pub display_field: String,
    pub loaded_at: DateTime<Utc>,
}

impl Dataset {
    /// A dataset with no source, no fields and no records.
    pub fn empty(display_field: &str) -> Self {
        Self {
            source: None,
            schema: Arc::new(Schema::default()),
            taxonomy: Taxonomy::default(),
            records: Vec::new(),
            display_field: display_field.to_string(),
            loaded_at: Utc::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn fields(&self) -> &[String] {
        self.schema.fields()
    }

    /// Display name of a record, falling back to its position.
    pub fn display_name(&self, idx: usize) -> String {
        match self.records[idx].get(&self.display_field) {
            Some(v) if !v.is_missing() => v.to_string(),
            _ => format!("Record {}", idx + 1),
        }
    }

    /// The field searched when the user has not picked one: the second column,
    /// or the first when there is only one.
    pub fn default_search_field(&self) -> Option<&str> {
        let fields = self.fields();
        fields.get(1).or_else(|| fields.first()).map(String::as_str)
    }
}
