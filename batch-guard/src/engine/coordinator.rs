//! Drives store-backed rules batch by batch.
//!
//! For each batch, attributes are visited in declaration order and each of
//! their rules is evaluated once per group of obligations that share the same
//! substituted parameters. For a plain `*.email` rule that is exactly one
//! store query per batch, however many records the batch holds.

use super::attributor::{attribute_failures, distinct_values, Obligation};
use super::evaluators::EvaluatorRegistry;
use crate::core::{AttributePath, Batch, RecordCollection, ValidationContext, ValueSet, Violation};
use crate::error::Result;
use crate::logging::{truncate_field, LogConfig};
use crate::query::StoreBackend;
use crate::rules::{RuleSpec, StoreRule, StoreRules};
use crate::{log_query, log_rule};
use indexmap::IndexMap;
use tracing::{debug, info, instrument, warn};

/// Obligations of one rule in one batch that resolve to the same parameters.
#[derive(Debug, Clone)]
pub struct ObligationGroup {
    /// The rule with parameters substituted for this group
    pub spec: RuleSpec,
    pub obligations: Vec<Obligation>,
}

/// Groups a rule's obligations inside `batch` by substituted parameters.
///
/// Groups keep the order of their first obligation, and obligations keep
/// record order inside a group.
pub fn group_obligations(batch: &Batch<'_>, rule: &StoreRule) -> Vec<ObligationGroup> {
    let mut groups: IndexMap<String, ObligationGroup> = IndexMap::new();
    for expansion in rule.expansions_in(batch.range()) {
        let Some(obligation) = Obligation::from_expansion(batch, expansion) else {
            continue;
        };
        groups
            .entry(expansion.spec.signature())
            .or_insert_with(|| ObligationGroup {
                spec: expansion.spec.clone(),
                obligations: Vec::new(),
            })
            .obligations
            .push(obligation);
    }
    groups.into_values().collect()
}

/// Evaluates store rules over a record collection in fixed-size batches.
pub struct BatchCoordinator<'a> {
    store: &'a dyn StoreBackend,
    evaluators: &'a EvaluatorRegistry,
    batch_size: usize,
    log: LogConfig,
}

impl<'a> BatchCoordinator<'a> {
    pub fn new(
        store: &'a dyn StoreBackend,
        evaluators: &'a EvaluatorRegistry,
        batch_size: usize,
    ) -> Self {
        Self {
            store,
            evaluators,
            batch_size,
            log: LogConfig::default(),
        }
    }

    /// Sets the logging switches.
    pub fn with_log_config(mut self, log: LogConfig) -> Self {
        self.log = log;
        self
    }

    /// Runs every store rule against every batch.
    ///
    /// Attributes excluded by the session hooks are removed from `store_rules`
    /// and noted in the context. Returns true if the registry is still empty.
    #[instrument(skip_all, fields(records = records.len(), batch_size = self.batch_size))]
    pub async fn evaluate(
        &self,
        records: &RecordCollection,
        store_rules: &mut StoreRules,
        ctx: &mut ValidationContext,
    ) -> Result<bool> {
        let mut batches_run = 0usize;
        let mut groups_run = 0usize;

        for batch in records.batches(self.batch_size)? {
            if ctx.should_halt() {
                info!(offset = batch.offset(), "Stopping on first failure");
                break;
            }
            groups_run += self.evaluate_batch(&batch, store_rules, ctx).await?;
            batches_run += 1;
        }

        debug!(
            batches = batches_run,
            rule_groups = groups_run,
            failures = ctx.registry().len(),
            "Store rule evaluation finished"
        );
        Ok(ctx.registry().is_empty())
    }

    /// Evaluates one batch. Returns the number of rule groups evaluated.
    async fn evaluate_batch(
        &self,
        batch: &Batch<'_>,
        store_rules: &mut StoreRules,
        ctx: &mut ValidationContext,
    ) -> Result<usize> {
        let keys: Vec<String> = store_rules.keys().cloned().collect();
        let mut groups_run = 0;

        for key in keys {
            let Some(attribute) = store_rules.get(&key) else {
                continue;
            };
            let pattern = attribute.pattern.clone();

            if ctx.should_exclude(&pattern) {
                self.remove_attribute(&key, &pattern, store_rules, ctx);
                continue;
            }
            if ctx.should_halt() {
                break;
            }

            // exclusion raised mid-attribute only ends this batch's rules; the
            // attribute is dropped by the check above on the next batch
            for rule in &attribute.rules {
                groups_run += self.evaluate_rule(batch, &pattern, rule, ctx).await?;

                if ctx.should_exclude(&pattern) {
                    log_rule!(self.log, attribute = %pattern, "Attribute excluded after rule");
                    break;
                }
                if ctx.should_stop_validating(&pattern) {
                    log_rule!(self.log, attribute = %pattern, "Stopped validating attribute");
                    break;
                }
            }
        }
        ctx.set_current_rule(None);
        Ok(groups_run)
    }

    async fn evaluate_rule(
        &self,
        batch: &Batch<'_>,
        pattern: &AttributePath,
        rule: &StoreRule,
        ctx: &mut ValidationContext,
    ) -> Result<usize> {
        ctx.set_current_rule(Some(rule.spec.to_string()));

        let Some(evaluator) = self.evaluators.get(rule.spec.name()) else {
            warn!(rule = %rule.spec.name(), "No evaluator registered for store rule");
            return Ok(0);
        };

        let groups = group_obligations(batch, rule);
        for group in &groups {
            let values = distinct_values(&group.obligations);
            log_query!(
                self.log,
                attribute = %pattern,
                rule = %group.spec,
                offset = batch.offset(),
                candidates = values.len(),
                preview = %preview(&values, self.log.max_field_length),
                "Evaluating store rule group"
            );

            let offending = evaluator
                .offending_values(pattern, &values, group.spec.params(), self.store)
                .await?;

            let violation = Violation::new(group.spec.name(), group.spec.text_params());
            let recorded = attribute_failures(&offending, &group.obligations, &violation, ctx);
            log_rule!(
                self.log,
                attribute = %pattern,
                rule = %group.spec.name(),
                offending = offending.len(),
                recorded,
                "Store rule group evaluated"
            );
        }
        Ok(groups.len())
    }

    fn remove_attribute(
        &self,
        key: &str,
        pattern: &AttributePath,
        store_rules: &mut StoreRules,
        ctx: &mut ValidationContext,
    ) {
        debug!(attribute = %pattern, "Attribute excluded, dropping its store rules");
        store_rules.shift_remove(key);
        ctx.mark_removed(pattern);
    }
}

fn preview(values: &ValueSet, max_length: usize) -> String {
    let joined = values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    truncate_field(&joined, max_length)
}
