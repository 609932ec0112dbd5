//! End-to-end tests of batched store validation against in-memory DataFusion tables.

use batch_guard::prelude::*;
use batch_guard::query::QueryKind;
use batch_guard::test_fixtures::{
    contact_collection, contact_records, contacts_store, contacts_store_with, DEFAULT_SEED,
};
use datafusion::prelude::{col, lit};
use serde_json::json;
use std::sync::Arc;

fn contact_rules() -> RuleMap {
    rule_map([
        ("*.document_number", "unique:contacts,document_number"),
        ("*.email", "unique:contacts,email"),
    ])
}

fn validator(store: Arc<RecordingStore<DataFusionStore>>, config: BatchConfig) -> BatchValidator {
    BatchValidator::builder(store)
        .config(config)
        .build()
        .unwrap()
}

fn indices(outcome: &ValidationOutcome) -> Vec<usize> {
    outcome.failed_record_indices().into_iter().collect()
}

#[tokio::test]
async fn test_colliding_record_is_the_only_failure() -> Result<()> {
    let records = contact_collection(100, DEFAULT_SEED);
    let store = Arc::new(RecordingStore::new(contacts_store_with(&records, &[37])?));
    let validator = validator(store.clone(), BatchConfig::default());

    let outcome = validator.validate(&records, &contact_rules()).await?;

    assert!(outcome.fails());
    assert_eq!(indices(&outcome), vec![37]);
    assert_eq!(
        outcome.registry.keys().collect::<Vec<_>>(),
        vec!["37.document_number", "37.email"]
    );
    assert_eq!(store.query_count(), 20);
    Ok(())
}

#[tokio::test]
async fn test_query_count_is_one_per_batch() -> Result<()> {
    let records = contact_collection(100, DEFAULT_SEED);
    let store = Arc::new(RecordingStore::new(contacts_store(&[])?));
    let rules = rule_map([("*.email", "unique:contacts,email")]);

    for (batch_size, expected) in [(10, 10), (1, 100), (7, 15), (100, 1), (250, 1)] {
        store.reset();
        let validator = validator(store.clone(), BatchConfig::default().with_batch_size(batch_size));
        assert!(validator.validate(&records, &rules).await?.passes());
        assert_eq!(store.query_count(), expected, "batch size {batch_size}");
    }
    Ok(())
}

#[tokio::test]
async fn test_duplicates_all_fail() -> Result<()> {
    let mut rows = contact_records(30, 3);
    rows[3]["email"] = json!("shared@example.com");
    rows[15]["email"] = json!("shared@example.com");
    rows[16]["email"] = json!("shared@example.com");
    let records = RecordCollection::new(rows);

    let store = Arc::new(RecordingStore::new(contacts_store(&[
        json!({"document_number": 1, "email": "shared@example.com"}),
    ])?));
    let outcome = validator(store, BatchConfig::default())
        .validate(&records, &rule_map([("*.email", "unique:contacts,email")]))
        .await?;

    assert_eq!(indices(&outcome), vec![3, 15, 16]);
    Ok(())
}

#[tokio::test]
async fn test_failures_do_not_depend_on_batch_size() -> Result<()> {
    let records = contact_collection(60, 11);
    let expected: Vec<usize> = vec![0, 9, 10, 41, 59];

    for batch_size in [1, 3, 10, 17, 60] {
        let store = Arc::new(RecordingStore::new(contacts_store_with(&records, &expected)?));
        let outcome = validator(store, BatchConfig::default().with_batch_size(batch_size))
            .validate(&records, &contact_rules())
            .await?;
        assert_eq!(indices(&outcome), expected, "batch size {batch_size}");
        assert_eq!(outcome.registry.len(), expected.len() * 2);
    }
    Ok(())
}

#[tokio::test]
async fn test_stop_on_first_failure_stops_querying() -> Result<()> {
    let records = contact_collection(100, DEFAULT_SEED);
    let store = Arc::new(RecordingStore::new(contacts_store_with(&records, &[5, 50])?));
    let config = BatchConfig::default().with_stop_on_first_failure(true);

    let outcome = validator(store.clone(), config)
        .validate(&records, &contact_rules())
        .await?;

    assert_eq!(outcome.registry.keys().collect::<Vec<_>>(), vec!["5.document_number"]);
    assert_eq!(store.query_count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_nested_wildcards_expand_per_element() -> Result<()> {
    let records = RecordCollection::new(vec![
        json!({"order": "A", "items": [{"sku": "S-1"}, {"sku": "S-404"}]}),
        json!({"order": "B", "items": []}),
        json!({"order": "C", "items": [{"sku": "S-2"}, {"sku": "S-404"}, {"sku": null}]}),
        json!({"order": "D"}),
        json!({"order": "E", "items": [{"sku": "S-1"}]}),
    ]);
    let store = DataFusionStore::new()?;
    store.register_json_rows(
        None,
        "products",
        &[json!({"sku": "S-1"}), json!({"sku": "S-2"})],
    )?;
    let store = Arc::new(RecordingStore::new(store));
    let validator = validator(store.clone(), BatchConfig::default().with_batch_size(2));
    let rules = rule_map([("*.items.*.sku", "exists:products,sku"), ("*.order", "required")]);

    let classification = validator.classify(&rules, &records);
    assert_eq!(classification.expanded_count(), 6);
    assert_eq!(classification.implicit_attributes["*.items.*.sku"].len(), 6);
    assert!(classification.other_rules.contains_key("*.order"));

    let outcome = validator.validate(&records, &rules).await?;
    assert_eq!(
        outcome.registry.keys().collect::<Vec<_>>(),
        vec!["0.items.1.sku", "2.items.1.sku"]
    );
    // batches [0,1] [2,3] [4]
    assert_eq!(store.query_count(), 3);
    Ok(())
}

#[tokio::test]
async fn test_literal_dot_key_is_reported_unescaped() -> Result<()> {
    let records = RecordCollection::new(vec![
        json!({"billing.email": "free@example.com"}),
        json!({"billing.email": "taken@example.com"}),
        json!({"billing": {"email": "taken@example.com"}}),
    ]);
    let store = Arc::new(RecordingStore::new(contacts_store(&[
        json!({"document_number": 1, "email": "taken@example.com"}),
    ])?));

    let outcome = validator(store, BatchConfig::default())
        .validate(&records, &rule_map([(r"*.billing\.email", "unique:contacts,email")]))
        .await?;

    assert_eq!(outcome.registry.keys().collect::<Vec<_>>(), vec!["1.billing.email"]);
    Ok(())
}

#[tokio::test]
async fn test_exists_strategies_produce_same_failures() -> Result<()> {
    let records = contact_collection(25, 5);
    let known = contact_records(25, 5);
    let rules = rule_map([("*.email", "exists:contacts,email")]);

    let mut registries = Vec::new();
    for strategy in [ExistsStrategy::PresentSet, ExistsStrategy::PerValue] {
        let store = Arc::new(RecordingStore::new(contacts_store(&known[..20])?));
        let outcome = validator(store.clone(), BatchConfig::default().with_exists_strategy(strategy))
            .validate(&records, &rules)
            .await?;

        assert_eq!(indices(&outcome), (20..25).collect::<Vec<_>>());
        let expected_kind = match strategy {
            ExistsStrategy::PresentSet => QueryKind::Fetch,
            ExistsStrategy::PerValue => QueryKind::Count,
        };
        assert!(store.queries().iter().all(|q| q.kind == expected_kind));
        let expected_queries = match strategy {
            ExistsStrategy::PresentSet => 3,
            ExistsStrategy::PerValue => 25,
        };
        assert_eq!(store.query_count(), expected_queries);
        registries.push(outcome.registry);
    }
    assert_eq!(registries[0], registries[1]);
    Ok(())
}

#[tokio::test]
async fn test_extra_conditions_and_ignored_id() -> Result<()> {
    let records = RecordCollection::new(vec![
        json!({"email": "live@example.com"}),
        json!({"email": "deleted@example.com"}),
        json!({"email": "self@example.com"}),
    ]);
    let store = Arc::new(RecordingStore::new(contacts_store(&[
        json!({"document_number": 1, "email": "live@example.com"}),
        json!({"document_number": 2, "email": "deleted@example.com", "deleted_at": "2024-05-01"}),
        json!({"document_number": 3, "email": "self@example.com"}),
    ])?));
    let validator = validator(store, BatchConfig::default());

    let outcome = validator
        .validate(
            &records,
            &rule_map([("*.email", "unique:contacts,email,3,id,deleted_at,NULL")]),
        )
        .await?;
    assert_eq!(outcome.registry.keys().collect::<Vec<_>>(), vec!["0.email"]);
    let violation = &outcome.registry.get("0.email").unwrap()[0];
    assert_eq!(violation.rule, "unique");
    assert_eq!(violation.parameters[4..], ["deleted_at", "NULL"]);

    let outcome = validator
        .validate(
            &records,
            &rule_map([("*.email", "unique:contacts,email,NULL,id,deleted_at,NOT_NULL")]),
        )
        .await?;
    assert_eq!(outcome.registry.keys().collect::<Vec<_>>(), vec!["1.email"]);
    Ok(())
}

#[tokio::test]
async fn test_programmatic_spec_with_raw_predicate() -> Result<()> {
    let records = RecordCollection::new(vec![
        json!({"email": "one@example.com"}),
        json!({"email": "two@example.com"}),
    ]);
    let store = Arc::new(RecordingStore::new(contacts_store(&[
        json!({"document_number": 1, "email": "one@example.com"}),
        json!({"document_number": 2, "email": "two@example.com"}),
    ])?));

    let spec = RuleSpec::unique("contacts")
        .column("email")
        .where_raw("newer rows", || col("id").gt(lit(1_i64)));
    let outcome = validator(store, BatchConfig::default())
        .validate(&records, &rule_map([("*.email", spec)]))
        .await?;

    assert_eq!(outcome.registry.keys().collect::<Vec<_>>(), vec!["1.email"]);
    assert_eq!(
        outcome.registry.get("1.email").unwrap()[0].parameters.last().map(String::as_str),
        Some("<newer rows>")
    );
    Ok(())
}

#[tokio::test]
async fn test_named_connection_table() -> Result<()> {
    let mut store = DataFusionStore::new()?;
    store.add_connection("archive")?;
    store.register_json_rows(Some("archive"), "contacts", &[json!({"email": "old@example.com"})])?;
    let store = Arc::new(RecordingStore::new(store));

    let records = RecordCollection::new(vec![json!({"email": "old@example.com"})]);
    let outcome = validator(store.clone(), BatchConfig::default())
        .validate(&records, &rule_map([("*.email", "unique:archive.contacts")]))
        .await?;

    assert!(outcome.registry.contains_key("0.email"));
    assert_eq!(store.queries()[0].connection.as_deref(), Some("archive"));
    assert_eq!(store.queries()[0].column, "email");
    Ok(())
}

#[tokio::test]
async fn test_error_categories() -> Result<()> {
    let records = contact_collection(3, 1);
    let store = Arc::new(RecordingStore::new(contacts_store(&[])?));
    let validator = validator(store, BatchConfig::default());

    let err = validator
        .validate(&records, &rule_map([("*.email", "unique")]))
        .await
        .unwrap_err();
    assert!(err.is_configuration());
    assert!(!err.is_backend());

    let err = validator
        .validate(&records, &rule_map([("*.email", "unique:missing_table,email")]))
        .await
        .unwrap_err();
    assert!(err.is_backend());

    let err = validator
        .validate(&records, &rule_map([("*.email", "exists:nowhere.contacts,email")]))
        .await
        .unwrap_err();
    assert!(matches!(err, BatchError::ConnectionNotFound(_)));
    Ok(())
}

#[tokio::test]
async fn test_malformed_rules_are_ignored() -> Result<()> {
    let records = contact_collection(10, 1);
    let store = Arc::new(RecordingStore::new(contacts_store(&[])?));
    let outcome = validator(store.clone(), BatchConfig::default())
        .validate(&records, &rule_map([("*.email", ":unique,contacts|unique:contacts,email")]))
        .await?;

    assert!(outcome.passes());
    assert_eq!(store.query_count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_outcome_serializes() -> Result<()> {
    let records = contact_collection(10, DEFAULT_SEED);
    let store = Arc::new(RecordingStore::new(contacts_store_with(&records, &[4])?));
    let outcome = validator(store, BatchConfig::default())
        .validate(&records, &contact_rules())
        .await?;

    let json = serde_json::to_value(&outcome)?;
    assert_eq!(json["registry"]["4.email"][0]["rule"], "unique");
    assert_eq!(json["removed_attributes"], json!([]));
    Ok(())
}
