//! Record capabilities used by the mapper and the reconciler.

use serde::{Serialize, Serializer, ser::SerializeMap};

use crate::{key, schema::RecordSchema, value::Value};

/// A record whose fields can be read in schema declaration order.
pub trait Record: Clone {
    /// Value of the declared field at `index`.
    fn value(&self, index: usize) -> Value;

    /// Key used to match this record against the other side.
    ///
    /// Defaults to the schema's [`KeyRule`](crate::schema::KeyRule). Types
    /// with their own notion of identity may override it, but the result must
    /// never be empty for a malformed record.
    fn derive_key(&self, schema: &RecordSchema) -> String {
        key::derive_key(schema, self)
    }
}

/// Construction of a record from mapped values, one per declared field.
pub trait FromValues: Sized {
    fn from_values(values: Vec<Value>) -> Self;
}

/// Schema-driven record holding one [`Value`] per declared field.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MappedRecord {
    values: Vec<Value>,
}

impl MappedRecord {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn get_by_name<'a>(&'a self, schema: &RecordSchema, name: &str) -> Option<&'a Value> {
        schema.field_index(name).and_then(|idx| self.values.get(idx))
    }
}

impl Record for MappedRecord {
    fn value(&self, index: usize) -> Value {
        self.values.get(index).cloned().unwrap_or_default()
    }
}

impl FromValues for MappedRecord {
    fn from_values(values: Vec<Value>) -> Self {
        Self::new(values)
    }
}

/// Field name/value view of any record, serialized as a map.
pub struct NamedRecord<'a> {
    schema: &'a RecordSchema,
    values: Vec<Value>,
}

impl<'a> NamedRecord<'a> {
    pub fn new<T: Record>(schema: &'a RecordSchema, record: &T) -> Self {
        let values = (0..schema.fields().len())
            .map(|idx| record.value(idx))
            .collect();
        Self { schema, values }
    }
}

impl Serialize for NamedRecord<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (field, value) in self.schema.fields().iter().zip(&self.values) {
            map.serialize_entry(&field.name, value)?;
        }
        map.end()
    }
}
