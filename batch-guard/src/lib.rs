//! # batch-guard - Batched store-backed validation
//!
//! batch-guard validates large record collections against rules that need a
//! backing table, such as `unique` and `exists`, without issuing one query per
//! record. Records are cut into fixed-size batches and each store rule runs a
//! single `column IN (...)` query per batch; offending values are then
//! attributed back to every record that holds them.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use batch_guard::prelude::*;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<()> {
//! let store = DataFusionStore::new()?;
//! store.register_json_rows(None, "contacts", &[json!({"id": 1, "email": "taken@example.com"})])?;
//!
//! let validator = BatchValidator::builder(Arc::new(store))
//!     .config(BatchConfig::default().with_batch_size(10))
//!     .build()?;
//!
//! let records = RecordCollection::new(vec![
//!     json!({"email": "new@example.com"}),
//!     json!({"email": "taken@example.com"}),
//! ]);
//! let rules = rule_map([("*.email", "required|email|unique:contacts,email")]);
//!
//! let outcome = validator.validate(&records, &rules).await?;
//! assert!(outcome.registry.contains_key("1.email"));
//! # Ok(())
//! # }
//! ```
//!
//! ## Rules
//!
//! Store rules use the familiar string grammar:
//!
//! - `unique:table[,column[,exceptId[,idColumn]]][,key,value]...`
//! - `exists:table[,column][,key,value]...`
//!
//! `table` may be qualified as `connection.table`. Extra `key,value` pairs add
//! conditions: `NULL` and `NOT_NULL` test for nulls, a `!` prefix negates.
//! The same rules can be built programmatically with [`rules::RuleSpec`],
//! which also accepts opaque DataFusion predicates.
//!
//! Attribute patterns may contain `*` wildcards (`*.items.*.sku`); a literal
//! dot inside a field name is written `\.`. Failures are reported under the
//! concrete, unescaped path, e.g. `3.items.0.sku`.
//!
//! ## Architecture
//!
//! - **`core`**: attribute paths, values, record batches, the failure registry
//!   and the per-run validation context
//! - **`rules`**: rule parsing, programmatic specs and classification into
//!   store and in-memory rules
//! - **`query`**: query conditions, the [`query::StoreBackend`] seam and its
//!   DataFusion implementation
//! - **`engine`**: evaluators, the batch coordinator and the
//!   [`engine::BatchValidator`] entry point
//! - **`config`**, **`logging`**, **`security`**, **`error`**: ambient concerns
//!
//! Non-store rules are not evaluated here; plug an
//! [`engine::InMemoryRuleEngine`] into the validator to run them against the
//! same failure registry.

pub mod config;
pub mod core;
pub mod engine;
pub mod error;
pub mod logging;
pub mod prelude;
pub mod query;
pub mod rules;
pub mod security;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_fixtures;
