//! Contacts fixtures for batch validation scenarios.
//!
//! Records are generated from a seeded RNG so every run sees the same data.
//! Document numbers and emails are unique within a generated collection; the
//! store side is a `contacts` table that can be seeded with copies of chosen
//! records to force collisions.

use crate::core::RecordCollection;
use crate::error::Result;
use crate::query::DataFusionStore;
use arrow::array::{Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;

/// Seed used when a test doesn't care about the data itself.
pub const DEFAULT_SEED: u64 = 42;

const FIRST_NAMES: &[&str] = &[
    "Ana", "Bruno", "Carla", "Diego", "Elena", "Fabio", "Gina", "Hugo", "Iris", "Joao",
];
const LAST_NAMES: &[&str] = &[
    "Silva", "Souza", "Costa", "Lima", "Rocha", "Alves", "Pereira", "Gomes",
];

/// Generates `count` contact records with unique document numbers and emails.
pub fn contact_records(count: usize, seed: u64) -> Vec<JsonValue> {
    let mut rng = StdRng::seed_from_u64(seed);
    let base: i64 = rng.random_range(10_000_000..90_000_000);

    (0..count)
        .map(|i| {
            let first = FIRST_NAMES[rng.random_range(0..FIRST_NAMES.len())];
            let last = LAST_NAMES[rng.random_range(0..LAST_NAMES.len())];
            json!({
                "document_number": base + i as i64 * 7,
                "name": format!("{first} {last}"),
                "email": format!("{}.{}{}@example.com", first.to_lowercase(), last.to_lowercase(), i),
                "phone": format!("+55 11 9{:04}-{:04}", rng.random_range(0..10_000), i % 10_000),
            })
        })
        .collect()
}

/// Same as [`contact_records`], wrapped in a [`RecordCollection`].
pub fn contact_collection(count: usize, seed: u64) -> RecordCollection {
    RecordCollection::new(contact_records(count, seed))
}

/// Schema of the `contacts` table.
pub fn contacts_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("document_number", DataType::Int64, false),
        Field::new("name", DataType::Utf8, true),
        Field::new("email", DataType::Utf8, true),
        Field::new("phone", DataType::Utf8, true),
        Field::new("deleted_at", DataType::Utf8, true),
    ]))
}

/// Builds a `contacts` batch from contact records; ids start at 1.
pub fn contacts_batch(rows: &[JsonValue]) -> Result<RecordBatch> {
    let text = |row: &JsonValue, key: &str| row.get(key).and_then(JsonValue::as_str).map(str::to_string);

    let ids: Vec<i64> = (1..=rows.len() as i64).collect();
    let documents: Vec<i64> = rows
        .iter()
        .map(|row| row.get("document_number").and_then(JsonValue::as_i64).unwrap_or_default())
        .collect();
    let names: Vec<Option<String>> = rows.iter().map(|row| text(row, "name")).collect();
    let emails: Vec<Option<String>> = rows.iter().map(|row| text(row, "email")).collect();
    let phones: Vec<Option<String>> = rows.iter().map(|row| text(row, "phone")).collect();
    let deleted: Vec<Option<String>> = rows.iter().map(|row| text(row, "deleted_at")).collect();

    Ok(RecordBatch::try_new(
        contacts_schema(),
        vec![
            Arc::new(Int64Array::from(ids)),
            Arc::new(Int64Array::from(documents)),
            Arc::new(StringArray::from(names)),
            Arc::new(StringArray::from(emails)),
            Arc::new(StringArray::from(phones)),
            Arc::new(StringArray::from(deleted)),
        ],
    )?)
}

/// A store whose default connection holds a `contacts` table with `rows`.
pub fn contacts_store(rows: &[JsonValue]) -> Result<DataFusionStore> {
    let store = DataFusionStore::new()?;
    store.register_batch(None, "contacts", contacts_batch(rows)?)?;
    Ok(store)
}

/// A contacts store pre-seeded with copies of `records` at `indices`.
pub fn contacts_store_with(records: &RecordCollection, indices: &[usize]) -> Result<DataFusionStore> {
    let rows: Vec<JsonValue> = indices
        .iter()
        .filter_map(|&i| records.get(i).cloned())
        .collect();
    contacts_store(&rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_records_are_deterministic_and_unique() {
        let a = contact_records(50, DEFAULT_SEED);
        let b = contact_records(50, DEFAULT_SEED);
        assert_eq!(a, b);

        let emails: HashSet<&str> = a.iter().filter_map(|r| r["email"].as_str()).collect();
        let documents: HashSet<i64> = a.iter().filter_map(|r| r["document_number"].as_i64()).collect();
        assert_eq!(emails.len(), 50);
        assert_eq!(documents.len(), 50);
    }

    #[test]
    fn test_contacts_batch_shape() -> Result<()> {
        let batch = contacts_batch(&contact_records(3, 7))?;
        assert_eq!(batch.num_rows(), 3);
        assert_eq!(batch.schema(), contacts_schema());
        Ok(())
    }

    #[test]
    fn test_store_with_selected_records() -> Result<()> {
        let records = contact_collection(10, 1);
        let store = contacts_store_with(&records, &[2, 99])?;
        assert!(store.context(None).is_ok());
        Ok(())
    }
}
