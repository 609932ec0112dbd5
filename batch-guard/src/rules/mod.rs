//! Rule declarations: parsing, programmatic specs and classification.

mod classifier;
mod parser;

pub use classifier::{
    Classification, ExpandedRule, ImplicitAttributes, OtherRules, RuleClassifier, StoreAttribute,
    StoreRule, StoreRules,
};
pub use parser::{
    rule_map, split_parameters, RawPredicate, RuleInput, RuleItem, RuleMap, RuleParam, RuleSpec,
    EXISTS, NULL_PARAM, UNIQUE,
};
