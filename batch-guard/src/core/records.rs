//! Record collections and their batch partitioning.

use crate::error::{BatchError, Result};
use serde_json::Value as JsonValue;
use std::ops::Range;

/// An ordered, index-addressable collection of records.
///
/// The index of a record is its identity for failure attribution. The whole
/// collection is held as a JSON array so wildcard expansion can walk it from
/// the root (`*.email` enumerates record indices).
#[derive(Debug, Clone, PartialEq)]
pub struct RecordCollection {
    root: JsonValue,
}

impl RecordCollection {
    /// Creates a collection from individual records.
    pub fn new(records: Vec<JsonValue>) -> Self {
        Self {
            root: JsonValue::Array(records),
        }
    }

    /// Creates a collection from a JSON array.
    pub fn from_json(value: JsonValue) -> Result<Self> {
        match value {
            JsonValue::Array(_) => Ok(Self { root: value }),
            other => Err(BatchError::configuration(
                "records",
                format!("record collection must be a JSON array, got {}", json_kind(&other)),
            )),
        }
    }

    /// Returns the collection as a JSON document.
    pub fn as_json(&self) -> &JsonValue {
        &self.root
    }

    /// Returns the records as a slice.
    pub fn records(&self) -> &[JsonValue] {
        match &self.root {
            JsonValue::Array(items) => items,
            _ => &[],
        }
    }

    /// Returns the record at `index`.
    pub fn get(&self, index: usize) -> Option<&JsonValue> {
        self.records().get(index)
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records().len()
    }

    /// Returns true if there are no records.
    pub fn is_empty(&self) -> bool {
        self.records().is_empty()
    }

    /// Partitions the collection into consecutive batches of `size` records.
    ///
    /// Batches are produced in order and cover every record exactly once; the
    /// last batch may be shorter. `size` must be at least 1.
    pub fn batches(&self, size: usize) -> Result<impl Iterator<Item = Batch<'_>>> {
        if size == 0 {
            return Err(BatchError::configuration(
                "batch_size",
                "batch size must be at least 1",
            ));
        }
        Ok(self
            .records()
            .chunks(size)
            .enumerate()
            .map(move |(n, records)| Batch {
                offset: n * size,
                records,
            }))
    }
}

impl From<Vec<JsonValue>> for RecordCollection {
    fn from(records: Vec<JsonValue>) -> Self {
        Self::new(records)
    }
}

/// A contiguous slice of a [`RecordCollection`].
#[derive(Debug, Clone, Copy)]
pub struct Batch<'a> {
    offset: usize,
    records: &'a [JsonValue],
}

impl<'a> Batch<'a> {
    /// Absolute index of the first record in the batch.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Number of records in the batch.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true for an empty batch.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Absolute index range covered by the batch.
    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.records.len()
    }

    /// Returns true if the absolute `index` falls inside the batch.
    pub fn contains(&self, index: usize) -> bool {
        self.range().contains(&index)
    }

    /// Returns the record at absolute `index`, if it belongs to this batch.
    pub fn record(&self, index: usize) -> Option<&'a JsonValue> {
        index
            .checked_sub(self.offset)
            .and_then(|local| self.records.get(local))
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn numbered(n: usize) -> RecordCollection {
        RecordCollection::new((0..n).map(|i| json!({ "n": i })).collect())
    }

    #[test]
    fn test_batches_cover_collection_in_order() -> Result<()> {
        let records = numbered(23);
        let batches: Vec<_> = records.batches(10)?.collect();

        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].range(), 0..10);
        assert_eq!(batches[2].range(), 20..23);
        assert_eq!(batches[2].record(21), Some(&json!({ "n": 21 })));
        assert_eq!(batches[2].record(5), None);
        Ok(())
    }

    #[test]
    fn test_zero_batch_size_is_rejected() {
        let err = numbered(3).batches(0).err().unwrap();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_empty_collection_has_no_batches() -> Result<()> {
        assert_eq!(numbered(0).batches(10)?.count(), 0);
        Ok(())
    }

    #[test]
    fn test_from_json_requires_array() {
        assert!(RecordCollection::from_json(json!([{"a": 1}])).is_ok());
        assert!(RecordCollection::from_json(json!({"a": 1})).is_err());
    }
}
