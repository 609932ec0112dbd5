//! Store-backed rule evaluators and their registry.
//!
//! An evaluator turns one rule's parameters plus the distinct values a batch
//! holds for an attribute into the set of *offending* values: those that make
//! a record fail. Evaluators are looked up by rule name, so adding a new
//! store-backed rule is a registration.

use crate::config::{BatchConfig, ExistsStrategy};
use crate::core::{AttributePath, ValueSet};
use crate::error::{BatchError, Result};
use crate::query::{ConditionSet, StoreBackend, StoreQuery};
use crate::rules::{RuleParam, EXISTS, NULL_PARAM, UNIQUE};
use crate::security::SqlSecurity;
use async_trait::async_trait;
use indexmap::IndexMap;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Where a store rule looks: `connection.table.column` plus extra conditions.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreTarget {
    pub connection: Option<String>,
    pub table: String,
    pub column: String,
    pub conditions: ConditionSet,
}

impl StoreTarget {
    /// Reads `unique:table[,column[,exceptId[,idColumn]]][,key,value]...`.
    pub fn for_unique(
        attribute: &AttributePath,
        params: &[RuleParam],
        default_id_column: &str,
    ) -> Result<Self> {
        let (connection, table) = table_param(UNIQUE, params)?;
        let column = column_param(UNIQUE, params, attribute)?;

        let id_column = text_at(params, 3)
            .filter(|c| !c.is_empty() && *c != NULL_PARAM)
            .unwrap_or(default_id_column);
        let conditions = ConditionSet::new()
            .exclude_id(text_at(params, 2), id_column)
            .extend_from_params(params.get(4..).unwrap_or_default());

        Ok(Self {
            connection,
            table,
            column,
            conditions,
        })
    }

    /// Reads `exists:table[,column][,key,value]...`.
    pub fn for_exists(attribute: &AttributePath, params: &[RuleParam]) -> Result<Self> {
        let (connection, table) = table_param(EXISTS, params)?;
        let column = column_param(EXISTS, params, attribute)?;
        let conditions = ConditionSet::from_params(params.get(2..).unwrap_or_default());

        Ok(Self {
            connection,
            table,
            column,
            conditions,
        })
    }

    /// A query for `values` against this target.
    pub fn query(&self, values: ValueSet) -> StoreQuery {
        StoreQuery::new(self.table.clone(), self.column.clone(), values)
            .on_connection(self.connection.clone())
            .with_conditions(self.conditions.clone())
    }
}

fn text_at(params: &[RuleParam], index: usize) -> Option<&str> {
    params.get(index).and_then(RuleParam::as_text)
}

fn table_param(rule: &str, params: &[RuleParam]) -> Result<(Option<String>, String)> {
    let raw = match params.first() {
        Some(RuleParam::Text(raw)) if !raw.trim().is_empty() => raw.trim(),
        _ => return Err(BatchError::missing_parameter(rule, 1)),
    };
    Ok(split_table(raw))
}

/// Splits `connection.table` at the first unescaped dot; `\.` is a literal dot.
pub fn split_table(raw: &str) -> (Option<String>, String) {
    let mut connection = String::new();
    let mut current = String::new();
    let mut split = false;
    let mut chars = raw.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&'.') => {
                current.push('.');
                chars.next();
            }
            '.' if !split => {
                connection = std::mem::take(&mut current);
                split = true;
            }
            other => current.push(other),
        }
    }

    if split {
        (Some(connection), current)
    } else {
        (None, current)
    }
}

/// The queried column: the second parameter, or the attribute's field name.
///
/// A field name that is not a plain identifier (`billing.email` from
/// `*.billing\.email`) cannot stand in for a column; the rule must name one.
fn column_param(rule: &str, params: &[RuleParam], attribute: &AttributePath) -> Result<String> {
    match text_at(params, 1) {
        Some(column) if !column.trim().is_empty() && column != NULL_PARAM => {
            Ok(column.trim().to_string())
        }
        _ => {
            let guessed = guess_column(attribute);
            SqlSecurity::validate_identifier(&guessed).map_err(|_| {
                BatchError::configuration(
                    rule,
                    format!(
                        "Validation rule {rule} cannot use '{guessed}' from attribute {attribute} as a column; pass the column explicitly"
                    ),
                )
            })?;
            Ok(guessed)
        }
    }
}

fn guess_column(attribute: &AttributePath) -> String {
    attribute
        .last_key()
        .map(str::to_string)
        .unwrap_or_else(|| attribute.without_wildcards().to_string())
}

/// Evaluates one store-backed rule kind.
#[async_trait]
pub trait RuleEvaluator: Send + Sync {
    /// Rule name this evaluator handles, lowercase.
    fn name(&self) -> &str;

    /// Returns the values among `values` that fail the rule.
    ///
    /// `attribute` is the pattern being validated (used to default the
    /// column); `params` are the rule's substituted parameters.
    async fn offending_values(
        &self,
        attribute: &AttributePath,
        values: &ValueSet,
        params: &[RuleParam],
        store: &dyn StoreBackend,
    ) -> Result<ValueSet>;
}

/// `unique`: every candidate already present in the store offends.
#[derive(Debug, Clone)]
pub struct UniqueEvaluator {
    default_id_column: String,
}

impl UniqueEvaluator {
    pub fn new(default_id_column: impl Into<String>) -> Self {
        Self {
            default_id_column: default_id_column.into(),
        }
    }
}

impl Default for UniqueEvaluator {
    fn default() -> Self {
        Self::new("id")
    }
}

#[async_trait]
impl RuleEvaluator for UniqueEvaluator {
    fn name(&self) -> &str {
        UNIQUE
    }

    #[instrument(skip_all, fields(attribute = %attribute, candidates = values.len()))]
    async fn offending_values(
        &self,
        attribute: &AttributePath,
        values: &ValueSet,
        params: &[RuleParam],
        store: &dyn StoreBackend,
    ) -> Result<ValueSet> {
        let target = StoreTarget::for_unique(attribute, params, &self.default_id_column)?;
        if values.is_empty() {
            return Ok(ValueSet::new());
        }
        let present = store.fetch_matching(&target.query(values.clone())).await?;
        // the store may echo a value in another representation; report ours
        Ok(values.intersection(&present))
    }
}

/// `exists`: every candidate absent from the store offends.
#[derive(Debug, Clone, Default)]
pub struct ExistsEvaluator {
    strategy: ExistsStrategy,
}

impl ExistsEvaluator {
    pub fn new(strategy: ExistsStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> ExistsStrategy {
        self.strategy
    }
}

#[async_trait]
impl RuleEvaluator for ExistsEvaluator {
    fn name(&self) -> &str {
        EXISTS
    }

    #[instrument(skip_all, fields(attribute = %attribute, candidates = values.len(), strategy = %self.strategy))]
    async fn offending_values(
        &self,
        attribute: &AttributePath,
        values: &ValueSet,
        params: &[RuleParam],
        store: &dyn StoreBackend,
    ) -> Result<ValueSet> {
        let target = StoreTarget::for_exists(attribute, params)?;
        if values.is_empty() {
            return Ok(ValueSet::new());
        }

        match self.strategy {
            ExistsStrategy::PresentSet => {
                let present = store.fetch_matching(&target.query(values.clone())).await?;
                Ok(values.difference(&present))
            }
            ExistsStrategy::PerValue => {
                let query = target.query(ValueSet::new());
                let mut missing = ValueSet::new();
                for value in values {
                    if store.count_matching(&query.scoped_to(value)).await? == 0 {
                        missing.insert(value.clone());
                    }
                }
                Ok(missing)
            }
        }
    }
}

/// Store-backed evaluators keyed by rule name.
#[derive(Clone, Default)]
pub struct EvaluatorRegistry {
    evaluators: IndexMap<String, Arc<dyn RuleEvaluator>>,
}

impl EvaluatorRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with `unique` and `exists` configured from `config`.
    pub fn with_defaults(config: &BatchConfig) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(UniqueEvaluator::new(
            config.default_id_column.clone(),
        )));
        registry.register(Arc::new(ExistsEvaluator::new(config.exists_strategy)));
        registry
    }

    /// Registers an evaluator, replacing any with the same name.
    pub fn register(&mut self, evaluator: Arc<dyn RuleEvaluator>) {
        let name = evaluator.name().to_ascii_lowercase();
        debug!(rule = %name, "Registered store rule evaluator");
        self.evaluators.insert(name, evaluator);
    }

    /// Looks up the evaluator for `name`.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn RuleEvaluator>> {
        self.evaluators.get(name)
    }

    /// Registered rule names, in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.evaluators.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.evaluators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.evaluators.is_empty()
    }
}

impl std::fmt::Debug for EvaluatorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Value;
    use crate::query::{Condition, RecordingStore};
    use crate::rules::RuleSpec;
    use std::sync::Mutex;

    /// Answers from a fixed set of present values, ignoring conditions.
    struct FixedStore {
        present: ValueSet,
        seen: Mutex<Vec<StoreQuery>>,
    }

    impl FixedStore {
        fn new(present: &[&str]) -> Self {
            Self {
                present: present.iter().map(|v| Value::from(*v)).collect(),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl StoreBackend for FixedStore {
        async fn fetch_matching(&self, query: &StoreQuery) -> Result<ValueSet> {
            self.seen.lock().unwrap().push(query.clone());
            Ok(query.values.intersection(&self.present))
        }

        async fn count_matching(&self, query: &StoreQuery) -> Result<usize> {
            self.seen.lock().unwrap().push(query.clone());
            Ok(query.values.intersection(&self.present).len())
        }
    }

    fn texts(items: &[&str]) -> Vec<RuleParam> {
        items.iter().map(|s| RuleParam::from(*s)).collect()
    }

    fn values(items: &[&str]) -> ValueSet {
        items.iter().map(|v| Value::from(*v)).collect()
    }

    #[test]
    fn test_split_table() {
        assert_eq!(split_table("contacts"), (None, "contacts".to_string()));
        assert_eq!(
            split_table("archive.contacts"),
            (Some("archive".to_string()), "contacts".to_string())
        );
        assert_eq!(split_table(r"odd\.name"), (None, "odd.name".to_string()));
    }

    #[test]
    fn test_unique_target_parsing() -> Result<()> {
        let attribute = AttributePath::parse("*.email");
        let params = texts(&["archive.contacts", "NULL", "5", "NULL", "deleted_at", "NULL"]);
        let target = StoreTarget::for_unique(&attribute, &params, "id")?;

        assert_eq!(target.connection.as_deref(), Some("archive"));
        assert_eq!(target.table, "contacts");
        assert_eq!(target.column, "email");
        let conditions: Vec<_> = target.conditions.iter().cloned().collect();
        assert_eq!(
            conditions,
            vec![
                Condition::NotEquals { column: "id".into(), value: "5".into() },
                Condition::IsNull { column: "deleted_at".into() },
            ]
        );
        Ok(())
    }

    #[test]
    fn test_exists_extra_conditions_start_at_third_param() -> Result<()> {
        let attribute = AttributePath::parse("*.account_id");
        let target = StoreTarget::for_exists(&attribute, &texts(&["accounts", "id", "status", "!closed"]))?;
        assert_eq!(target.column, "id");
        assert_eq!(target.conditions.len(), 1);
        Ok(())
    }

    #[test]
    fn test_missing_table_is_configuration_error() {
        let attribute = AttributePath::parse("*.email");
        let err = StoreTarget::for_unique(&attribute, &[], "id").unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("requires at least 1 parameter"));

        let err = StoreTarget::for_exists(&attribute, &texts(&[" "])).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_literal_dot_attribute_needs_explicit_column() -> Result<()> {
        let attribute = AttributePath::parse(r"*.billing\.email");

        let err = StoreTarget::for_unique(&attribute, &texts(&["contacts"]), "id").unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("pass the column explicitly"));
        assert!(StoreTarget::for_exists(&attribute, &texts(&["contacts", "NULL"]))
            .unwrap_err()
            .is_configuration());

        let target = StoreTarget::for_unique(&attribute, &texts(&["contacts", "billing_email"]), "id")?;
        assert_eq!(target.column, "billing_email");
        Ok(())
    }

    #[tokio::test]
    async fn test_unique_reports_present_values() -> Result<()> {
        let store = FixedStore::new(&["taken@x.io"]);
        let offending = UniqueEvaluator::default()
            .offending_values(
                &AttributePath::parse("*.email"),
                &values(&["free@x.io", "taken@x.io"]),
                RuleSpec::unique("contacts").params(),
                &store,
            )
            .await?;
        assert_eq!(offending, values(&["taken@x.io"]));
        Ok(())
    }

    #[tokio::test]
    async fn test_exists_strategies_agree() -> Result<()> {
        let candidates = values(&["a", "b", "c"]);
        let params = texts(&["accounts", "code"]);
        let attribute = AttributePath::parse("*.code");

        let store = RecordingStore::new(FixedStore::new(&["b"]));
        let present_set = ExistsEvaluator::new(ExistsStrategy::PresentSet)
            .offending_values(&attribute, &candidates, &params, &store)
            .await?;
        assert_eq!(store.query_count(), 1);

        store.reset();
        let per_value = ExistsEvaluator::new(ExistsStrategy::PerValue)
            .offending_values(&attribute, &candidates, &params, &store)
            .await?;
        assert_eq!(store.query_count(), 3);

        assert_eq!(present_set, values(&["a", "c"]));
        assert_eq!(present_set, per_value);
        Ok(())
    }

    #[tokio::test]
    async fn test_no_candidates_no_query() -> Result<()> {
        let store = RecordingStore::new(FixedStore::new(&[]));
        let offending = UniqueEvaluator::default()
            .offending_values(&AttributePath::parse("*.email"), &ValueSet::new(), &texts(&["contacts"]), &store)
            .await?;
        assert!(offending.is_empty());
        assert_eq!(store.query_count(), 0);
        Ok(())
    }

    #[test]
    fn test_registry_defaults() {
        let registry = EvaluatorRegistry::with_defaults(&BatchConfig::default());
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["unique", "exists"]);
        assert!(registry.get("unique").is_some());
        assert!(registry.get("distinct").is_none());
    }
}
