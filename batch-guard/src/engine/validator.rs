//! The validation entry point.

use super::coordinator::BatchCoordinator;
use super::evaluators::{EvaluatorRegistry, RuleEvaluator};
use crate::config::BatchConfig;
use crate::core::{
    AttributePath, FailureRegistry, NoHooks, RecordCollection, SessionHooks, ValidationContext,
};
use crate::error::Result;
use crate::logging::LogConfig;
use crate::query::StoreBackend;
use crate::rules::{Classification, ImplicitAttributes, OtherRules, RuleClassifier, RuleMap};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, instrument};

/// The engine that evaluates every rule that doesn't need the store.
///
/// It runs before the store rules, shares the run's [`ValidationContext`] and
/// records its failures in the same registry.
pub trait InMemoryRuleEngine: Send + Sync {
    fn validate(
        &self,
        records: &RecordCollection,
        rules: &OtherRules,
        implicit_attributes: &ImplicitAttributes,
        ctx: &mut ValidationContext,
    ) -> Result<()>;
}

/// An in-memory engine that accepts everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRuleEngine;

impl InMemoryRuleEngine for NoopRuleEngine {
    fn validate(
        &self,
        _records: &RecordCollection,
        _rules: &OtherRules,
        _implicit_attributes: &ImplicitAttributes,
        _ctx: &mut ValidationContext,
    ) -> Result<()> {
        Ok(())
    }
}

/// Result of a validation run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationOutcome {
    /// Every failure, keyed `{index}.{attribute}`
    pub registry: FailureRegistry,
    /// Attributes dropped through conditional exclusion
    pub removed_attributes: Vec<AttributePath>,
}

impl ValidationOutcome {
    /// Returns true if nothing failed.
    pub fn passes(&self) -> bool {
        self.registry.is_empty()
    }

    /// Returns true if anything failed.
    pub fn fails(&self) -> bool {
        !self.passes()
    }

    /// Indices of records with at least one failure.
    pub fn failed_record_indices(&self) -> BTreeSet<usize> {
        self.registry.failed_record_indices()
    }
}

/// Validates record collections against a rule map, batching store rules.
///
/// # Examples
///
/// ```rust,ignore
/// use batch_guard::prelude::*;
/// use std::sync::Arc;
///
/// let store = DataFusionStore::new()?;
/// store.register_json_rows(None, "contacts", &existing)?;
///
/// let validator = BatchValidator::builder(Arc::new(store))
///     .config(BatchConfig::default().with_batch_size(10))
///     .build()?;
///
/// let outcome = validator
///     .validate(&records, &rule_map([("*.email", "required|unique:contacts,email")]))
///     .await?;
/// for (key, violations) in outcome.registry.iter() {
///     println!("{key}: {violations:?}");
/// }
/// ```
pub struct BatchValidator {
    store: Arc<dyn StoreBackend>,
    evaluators: EvaluatorRegistry,
    classifier: RuleClassifier,
    config: BatchConfig,
    engine: Arc<dyn InMemoryRuleEngine>,
    hooks: Arc<dyn SessionHooks>,
    log: LogConfig,
}

impl BatchValidator {
    /// Starts building a validator over `store`.
    pub fn builder(store: Arc<dyn StoreBackend>) -> BatchValidatorBuilder {
        BatchValidatorBuilder {
            store,
            config: BatchConfig::default(),
            engine: Arc::new(NoopRuleEngine),
            hooks: Arc::new(NoHooks),
            log: LogConfig::default(),
            extra_evaluators: Vec::new(),
        }
    }

    /// The configuration in use.
    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Registered store-rule names.
    pub fn store_rule_names(&self) -> Vec<&str> {
        self.evaluators.names().collect()
    }

    /// Classifies `rules` against `records` without evaluating anything.
    pub fn classify(&self, rules: &RuleMap, records: &RecordCollection) -> Classification {
        self.classifier.classify(rules, records)
    }

    /// Validates `records` against `rules`.
    ///
    /// Non-store rules go to the in-memory engine first; store rules are then
    /// evaluated in batches of [`BatchConfig::batch_size`]. Validation failures
    /// end up in the outcome; only configuration and backend problems are
    /// returned as errors.
    #[instrument(skip_all, fields(records = records.len(), attributes = rules.len()))]
    pub async fn validate(
        &self,
        records: &RecordCollection,
        rules: &RuleMap,
    ) -> Result<ValidationOutcome> {
        let Classification {
            mut store_rules,
            other_rules,
            implicit_attributes,
        } = self.classify(rules, records);

        let mut ctx = ValidationContext::new()
            .with_stop_on_first_failure(self.config.stop_on_first_failure)
            .with_hooks(Arc::clone(&self.hooks));

        self.engine
            .validate(records, &other_rules, &implicit_attributes, &mut ctx)?;

        BatchCoordinator::new(self.store.as_ref(), &self.evaluators, self.config.batch_size)
            .with_log_config(self.log.clone())
            .evaluate(records, &mut store_rules, &mut ctx)
            .await?;

        let (registry, removed_attributes) = ctx.into_parts();
        info!(
            failures = registry.len(),
            failed_records = registry.failed_record_indices().len(),
            "Validation finished"
        );
        Ok(ValidationOutcome {
            registry,
            removed_attributes,
        })
    }

    /// Convenience: returns true if `records` pass every rule.
    pub async fn passes(&self, records: &RecordCollection, rules: &RuleMap) -> Result<bool> {
        Ok(self.validate(records, rules).await?.passes())
    }
}

impl std::fmt::Debug for BatchValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchValidator")
            .field("evaluators", &self.evaluators)
            .field("config", &self.config)
            .finish()
    }
}

/// Builder for [`BatchValidator`].
pub struct BatchValidatorBuilder {
    store: Arc<dyn StoreBackend>,
    config: BatchConfig,
    engine: Arc<dyn InMemoryRuleEngine>,
    hooks: Arc<dyn SessionHooks>,
    log: LogConfig,
    extra_evaluators: Vec<Arc<dyn RuleEvaluator>>,
}

impl BatchValidatorBuilder {
    /// Sets the run configuration.
    pub fn config(mut self, config: BatchConfig) -> Self {
        self.config = config;
        self
    }

    /// Shorthand for setting only the batch size.
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.config.batch_size = batch_size;
        self
    }

    /// Shorthand for enabling global stop-on-first-failure.
    pub fn stop_on_first_failure(mut self, enabled: bool) -> Self {
        self.config.stop_on_first_failure = enabled;
        self
    }

    /// Sets the in-memory engine for non-store rules.
    pub fn engine(mut self, engine: Arc<dyn InMemoryRuleEngine>) -> Self {
        self.engine = engine;
        self
    }

    /// Sets the session hooks.
    pub fn hooks(mut self, hooks: Arc<dyn SessionHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Sets the logging switches.
    pub fn log_config(mut self, log: LogConfig) -> Self {
        self.log = log;
        self
    }

    /// Registers an additional store-backed rule, or replaces a built-in one.
    pub fn register_evaluator(mut self, evaluator: Arc<dyn RuleEvaluator>) -> Self {
        self.extra_evaluators.push(evaluator);
        self
    }

    /// Validates the configuration and builds the validator.
    pub fn build(self) -> Result<BatchValidator> {
        self.config.validate()?;

        let mut evaluators = EvaluatorRegistry::with_defaults(&self.config);
        for evaluator in self.extra_evaluators {
            evaluators.register(evaluator);
        }
        let classifier = RuleClassifier::new(evaluators.names());

        Ok(BatchValidator {
            store: self.store,
            evaluators,
            classifier,
            config: self.config,
            engine: self.engine,
            hooks: self.hooks,
            log: self.log,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{BailOnFailure, Violation};
    use crate::query::{RecordingStore, StoreQuery};
    use crate::core::ValueSet;
    use crate::rules::{rule_map, RuleItem};
    use async_trait::async_trait;
    use serde_json::json;

    struct EverythingTaken;

    #[async_trait]
    impl StoreBackend for EverythingTaken {
        async fn fetch_matching(&self, query: &StoreQuery) -> Result<ValueSet> {
            Ok(query.values.clone())
        }

        async fn count_matching(&self, query: &StoreQuery) -> Result<usize> {
            Ok(query.values.len())
        }
    }

    /// Fails `required` for records missing the attribute's field.
    struct RequiredEngine;

    impl InMemoryRuleEngine for RequiredEngine {
        fn validate(
            &self,
            records: &RecordCollection,
            rules: &OtherRules,
            _implicit_attributes: &ImplicitAttributes,
            ctx: &mut ValidationContext,
        ) -> Result<()> {
            for (key, items) in rules {
                if !items.contains(&RuleItem::from("required")) {
                    continue;
                }
                let field = AttributePath::parse(key).without_wildcards().to_string();
                for (index, record) in records.records().iter().enumerate() {
                    if record.get(&field).is_none() {
                        ctx.add_failure(format!("{index}.{field}"), Violation::new("required", vec![]));
                    }
                }
            }
            Ok(())
        }
    }

    fn records() -> RecordCollection {
        RecordCollection::new(vec![json!({"email": "a@x.io"}), json!({"name": "no email"})])
    }

    #[tokio::test]
    async fn test_in_memory_failures_share_registry() -> Result<()> {
        let store = Arc::new(RecordingStore::new(EverythingTaken));
        let validator = BatchValidator::builder(store.clone())
            .engine(Arc::new(RequiredEngine))
            .build()?;

        let outcome = validator
            .validate(&records(), &rule_map([("*.email", "required|unique:contacts,email")]))
            .await?;

        assert!(outcome.fails());
        assert_eq!(outcome.registry.keys().collect::<Vec<_>>(), vec!["1.email", "0.email"]);
        assert_eq!(store.query_count(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_stop_on_first_failure_after_in_memory_failure() -> Result<()> {
        let store = Arc::new(RecordingStore::new(EverythingTaken));
        let validator = BatchValidator::builder(store.clone())
            .engine(Arc::new(RequiredEngine))
            .stop_on_first_failure(true)
            .build()?;

        let outcome = validator
            .validate(&records(), &rule_map([("*.email", "required|unique:contacts,email")]))
            .await?;

        assert_eq!(outcome.registry.len(), 1);
        assert_eq!(store.query_count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_bail_hook_stops_later_rules() -> Result<()> {
        let store = Arc::new(RecordingStore::new(EverythingTaken));
        let validator = BatchValidator::builder(store.clone())
            .hooks(Arc::new(BailOnFailure))
            .build()?;

        let outcome = validator
            .validate(
                &records(),
                &rule_map([("*.email", "unique:contacts,email|exists:contacts,email")]),
            )
            .await?;

        assert_eq!(outcome.registry.violation_count(), 1);
        assert_eq!(store.query_count(), 1);
        Ok(())
    }

    #[test]
    fn test_build_rejects_zero_batch_size() {
        let err = BatchValidator::builder(Arc::new(EverythingTaken))
            .batch_size(0)
            .build()
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn test_contacts_end_to_end() -> Result<()> {
        use crate::test_fixtures::{contact_collection, contacts_store_with, DEFAULT_SEED};

        let records = contact_collection(100, DEFAULT_SEED);
        let store = Arc::new(RecordingStore::new(contacts_store_with(&records, &[62])?));
        let validator = BatchValidator::builder(store.clone()).build()?;

        let outcome = validator
            .validate(
                &records,
                &rule_map([
                    ("*.document_number", "unique:contacts,document_number"),
                    ("*.email", "unique:contacts,email"),
                ]),
            )
            .await?;

        assert_eq!(outcome.failed_record_indices().into_iter().collect::<Vec<_>>(), vec![62]);
        assert!(store.query_count() <= 20);
        Ok(())
    }

    #[tokio::test]
    async fn test_plain_key_checked_like_record_wildcard() -> Result<()> {
        let records = RecordCollection::new(vec![json!({"email": "taken@x.io"})]);
        let store = Arc::new(RecordingStore::new(EverythingTaken));
        let validator = BatchValidator::builder(store.clone()).build()?;

        let outcome = validator
            .validate(&records, &rule_map([("email", "unique:contacts,email")]))
            .await?;

        assert_eq!(outcome.registry.keys().collect::<Vec<_>>(), vec!["0.email"]);
        assert_eq!(store.query_count(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_configuration_error_surfaces() -> Result<()> {
        let validator = BatchValidator::builder(Arc::new(EverythingTaken)).build()?;
        let err = validator
            .validate(&records(), &rule_map([("*.email", "unique")]))
            .await
            .unwrap_err();
        assert!(err.is_configuration());
        Ok(())
    }
}
