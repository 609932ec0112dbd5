//! Prelude for commonly used types and traits in batch-guard.

pub use crate::config::{BatchConfig, ExistsStrategy};
pub use crate::core::{
    AttributePath, BailOnFailure, FailureRegistry, NoHooks, PredicateHooks, RecordCollection,
    SessionHooks, ValidationContext, Value, ValueSet, Violation,
};
pub use crate::engine::{
    BatchValidator, EvaluatorRegistry, InMemoryRuleEngine, NoopRuleEngine, RuleEvaluator,
    ValidationOutcome,
};
pub use crate::error::{BatchError, ErrorContext, Result};
pub use crate::logging::LogConfig;
pub use crate::query::{DataFusionStore, RecordingStore, StoreBackend, StoreConfig, StoreQuery};
pub use crate::rules::{rule_map, RuleInput, RuleItem, RuleMap, RuleSpec};
