//! Key-based classification of two record sequences.
//!
//! [`Reconciler::reconcile`] indexes both sides by derived key, then sorts
//! every record into one of four partitions: matched, left-only, right-only,
//! or changed (same key, at least one compared field differs).
//!
//! Keys are derived exactly once per record and call. When one side holds the
//! same key more than once, the last occurrence is the one the other side is
//! matched against; the number of such collisions is reported in
//! [`ReconciliationSummary`].

use std::collections::HashMap;

use chrono::TimeDelta;
use log::debug;
use serde::Serialize;

use crate::{
    record::Record,
    schema::RecordSchema,
    value::DEFAULT_TIMESTAMP_TOLERANCE,
};

/// A record present on both sides whose compared fields differ.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangedRecord<T> {
    pub key: String,
    pub left: T,
    pub right: T,
    /// Differing field names in declaration order.
    pub differing_fields: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationSummary {
    pub left_records: usize,
    pub right_records: usize,
    pub matched: usize,
    pub left_only: usize,
    pub right_only: usize,
    pub changed: usize,
    /// Left records whose key was already taken by an earlier left record.
    pub left_duplicate_keys: usize,
    pub right_duplicate_keys: usize,
}

impl ReconciliationSummary {
    pub fn has_differences(&self) -> bool {
        self.left_only + self.right_only + self.changed > 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReconciliationResult<T> {
    pub matched: Vec<T>,
    pub left_only: Vec<T>,
    pub right_only: Vec<T>,
    pub changed: Vec<ChangedRecord<T>>,
    pub summary: ReconciliationSummary,
}

pub struct Reconciler<'a> {
    schema: &'a RecordSchema,
    compared: Vec<usize>,
    timestamp_tolerance: TimeDelta,
}

impl<'a> Reconciler<'a> {
    pub fn new(schema: &'a RecordSchema) -> Self {
        Self {
            schema,
            compared: schema.compared_indices(),
            timestamp_tolerance: DEFAULT_TIMESTAMP_TOLERANCE,
        }
    }

    /// Timestamps closer than `tolerance` compare equal.
    pub fn with_timestamp_tolerance(mut self, tolerance: TimeDelta) -> Self {
        self.timestamp_tolerance = tolerance.abs();
        self
    }

    pub fn schema(&self) -> &RecordSchema {
        self.schema
    }

    pub fn reconcile<T: Record>(&self, left: &[T], right: &[T]) -> ReconciliationResult<T> {
        let left_keys = self.derive_keys(left);
        let right_keys = self.derive_keys(right);
        let (left_index, left_duplicate_keys) = index_by_key(&left_keys);
        let (right_index, right_duplicate_keys) = index_by_key(&right_keys);

        let mut matched = Vec::new();
        let mut left_only = Vec::new();
        let mut changed = Vec::new();
        for (record, key) in left.iter().zip(&left_keys) {
            let Some(&right_pos) = right_index.get(key.as_str()) else {
                left_only.push(record.clone());
                continue;
            };
            let counterpart = &right[right_pos];
            let differing_fields = self.differing_fields(record, counterpart);
            if differing_fields.is_empty() {
                matched.push(record.clone());
            } else {
                changed.push(ChangedRecord {
                    key: key.clone(),
                    left: record.clone(),
                    right: counterpart.clone(),
                    differing_fields,
                });
            }
        }

        let right_only = right
            .iter()
            .zip(&right_keys)
            .filter(|(_, key)| !left_index.contains_key(key.as_str()))
            .map(|(record, _)| record.clone())
            .collect::<Vec<_>>();

        let summary = ReconciliationSummary {
            left_records: left.len(),
            right_records: right.len(),
            matched: matched.len(),
            left_only: left_only.len(),
            right_only: right_only.len(),
            changed: changed.len(),
            left_duplicate_keys,
            right_duplicate_keys,
        };
        debug!("Reconciled '{}': {:?}", self.schema.name(), summary);

        ReconciliationResult {
            matched,
            left_only,
            right_only,
            changed,
            summary,
        }
    }

    /// Names of compared fields whose values differ, in declaration order.
    pub fn differing_fields<T: Record>(&self, left: &T, right: &T) -> Vec<String> {
        let fields = self.schema.fields();
        self.compared
            .iter()
            .filter(|idx| {
                !left
                    .value(**idx)
                    .matches(&right.value(**idx), self.timestamp_tolerance)
            })
            .map(|idx| fields[*idx].name.clone())
            .collect()
    }

    fn derive_keys<T: Record>(&self, records: &[T]) -> Vec<String> {
        records
            .iter()
            .map(|record| record.derive_key(self.schema))
            .collect()
    }
}

/// Position of the last record holding each key, plus the collision count.
fn index_by_key(keys: &[String]) -> (HashMap<&str, usize>, usize) {
    let mut index = HashMap::with_capacity(keys.len());
    let mut duplicates = 0;
    for (pos, key) in keys.iter().enumerate() {
        if index.insert(key.as_str(), pos).is_some() {
            duplicates += 1;
        }
    }
    (index, duplicates)
}
