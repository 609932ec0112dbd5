//! Evaluation of store-backed rules.
//!
//! - **[`BatchValidator`]**: entry point; classifies rules, runs the in-memory
//!   engine, then the store rules in batches
//! - **[`BatchCoordinator`]**: batch loop, exclusion and stop signals
//! - **[`RuleEvaluator`]**: one implementation per store rule kind, looked up
//!   in an [`EvaluatorRegistry`]
//! - failure attribution back to every record holding an offending value

mod attributor;
mod coordinator;
mod evaluators;
mod validator;

pub use attributor::{attribute_failures, distinct_values, Obligation};
pub use coordinator::{group_obligations, BatchCoordinator, ObligationGroup};
pub use evaluators::{
    split_table, EvaluatorRegistry, ExistsEvaluator, RuleEvaluator, StoreTarget, UniqueEvaluator,
};
pub use validator::{
    BatchValidator, BatchValidatorBuilder, InMemoryRuleEngine, NoopRuleEngine, ValidationOutcome,
};
