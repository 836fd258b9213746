//! Key derivation.
//!
//! The natural key is the key form of each key field
//! ([`Value::key_part`](crate::value::Value::key_part)) joined by the rule's
//! separator. When every key part is blank the record gets a synthesized key:
//! the fallback fields followed by a fresh UUID, so two malformed records never
//! collapse into one entry. A synthesized key can therefore never match a key
//! on the other side.

use itertools::Itertools;
use uuid::Uuid;

use crate::{record::Record, schema::RecordSchema};

pub fn derive_key<R>(schema: &RecordSchema, record: &R) -> String
where
    R: Record + ?Sized,
{
    let separator = schema.key().separator.as_str();
    let parts = schema
        .key_indices()
        .iter()
        .map(|idx| record.value(*idx).key_part())
        .collect::<Vec<_>>();
    if parts.iter().any(|part| !part.trim().is_empty()) {
        return parts.join(separator);
    }
    fallback_key(schema, record)
}

fn fallback_key<R>(schema: &RecordSchema, record: &R) -> String
where
    R: Record + ?Sized,
{
    let separator = schema.key().separator.as_str();
    let prefix = schema
        .fallback_indices()
        .iter()
        .map(|idx| record.value(*idx).key_part())
        .join(separator);
    format!("{prefix}{separator}{}", Uuid::new_v4().simple())
}
