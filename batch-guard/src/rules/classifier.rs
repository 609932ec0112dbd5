//! Splits a rule map into store-backed rules and everything else.
//!
//! Store-backed rules (by default `unique` and `exists`) are pulled out of each
//! attribute's rule list, their wildcard patterns are expanded against the
//! records, and every concrete attribute gets its own parameter list with `*`
//! replaced by the keys that produced it. The remaining rules are handed
//! unchanged to the in-memory engine.

use super::parser::{RuleItem, RuleMap, RuleSpec};
use crate::core::{AttributePath, RecordCollection};
use indexmap::IndexMap;
use regex::Regex;
use tracing::debug;

/// One concrete attribute a store rule applies to.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpandedRule {
    /// Concrete path, e.g. `3.email`
    pub path: AttributePath,
    /// Index of the record the path belongs to
    pub record_index: usize,
    /// The rule with wildcard references substituted for this path
    pub spec: RuleSpec,
}

/// A store rule and its concrete applications, ordered by record index.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreRule {
    pub spec: RuleSpec,
    pub expansions: Vec<ExpandedRule>,
}

impl StoreRule {
    /// The applications whose record lies in `range`.
    pub fn expansions_in(&self, range: std::ops::Range<usize>) -> &[ExpandedRule] {
        let start = self
            .expansions
            .partition_point(|e| e.record_index < range.start);
        let end = self.expansions.partition_point(|e| e.record_index < range.end);
        &self.expansions[start..end]
    }
}

/// The store rules declared for one attribute pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreAttribute {
    pub pattern: AttributePath,
    pub rules: Vec<StoreRule>,
}

/// Store rules keyed by the pattern as written.
pub type StoreRules = IndexMap<String, StoreAttribute>;
/// Non-store rules keyed by the pattern as written.
pub type OtherRules = IndexMap<String, Vec<RuleItem>>;
/// Concrete attributes produced by each wildcard pattern.
pub type ImplicitAttributes = IndexMap<String, Vec<AttributePath>>;

/// Result of classifying a rule map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Classification {
    pub store_rules: StoreRules,
    pub other_rules: OtherRules,
    pub implicit_attributes: ImplicitAttributes,
}

impl Classification {
    /// Total number of concrete store-rule applications.
    pub fn expanded_count(&self) -> usize {
        self.store_rules
            .values()
            .flat_map(|attribute| &attribute.rules)
            .map(|rule| rule.expansions.len())
            .sum()
    }

    /// Returns true if no store rule survived classification.
    pub fn has_store_rules(&self) -> bool {
        self.store_rules.values().any(|a| !a.rules.is_empty())
    }
}

/// Classifies rules by name against the set of store-backed rule names.
#[derive(Debug, Clone)]
pub struct RuleClassifier {
    store_rule_names: Vec<String>,
    keyword: Option<Regex>,
}

impl RuleClassifier {
    /// Creates a classifier recognizing `names` as store-backed.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let store_rule_names: Vec<String> = names
            .into_iter()
            .map(|name| name.as_ref().trim().to_ascii_lowercase())
            .filter(|name| !name.is_empty())
            .collect();
        let keyword = if store_rule_names.is_empty() {
            None
        } else {
            let alternatives = store_rule_names
                .iter()
                .map(|name| regex::escape(name))
                .collect::<Vec<_>>()
                .join("|");
            Regex::new(&format!(r"(?i)\b({alternatives})\b")).ok()
        };
        Self {
            store_rule_names,
            keyword,
        }
    }

    /// Names recognized as store-backed.
    pub fn store_rule_names(&self) -> &[String] {
        &self.store_rule_names
    }

    /// Classifies `rules` and expands store-rule patterns against `records`.
    pub fn classify(&self, rules: &RuleMap, records: &RecordCollection) -> Classification {
        let mut classification = Classification::default();

        for (key, input) in rules {
            let mut store_specs = Vec::new();
            let mut others = Vec::new();

            for item in input.items() {
                match self.store_spec(&item) {
                    StoreMatch::Store(spec) => store_specs.push(spec),
                    StoreMatch::Other => others.push(item),
                    StoreMatch::Malformed => {
                        debug!(attribute = %key, rule = ?item, "Dropping unparseable store rule");
                    }
                }
            }

            if !others.is_empty() {
                classification.other_rules.insert(key.clone(), others);
            }
            if store_specs.is_empty() {
                continue;
            }

            let declared = AttributePath::parse(key);
            let pattern = declared.record_relative();
            let expansions = pattern.expand(records.as_json());
            if declared.has_wildcard() {
                classification.implicit_attributes.insert(
                    key.clone(),
                    expansions.iter().map(|e| e.path.clone()).collect(),
                );
            }

            let rules = store_specs
                .into_iter()
                .map(|spec| {
                    let expansions = expansions
                        .iter()
                        .filter_map(|expansion| {
                            let Some(record_index) = expansion.path.record_index() else {
                                debug!(
                                    attribute = %expansion.path,
                                    "Attribute does not address a record, skipping"
                                );
                                return None;
                            };
                            Some(ExpandedRule {
                                path: expansion.path.clone(),
                                record_index,
                                spec: spec.substitute_wildcards(&expansion.keys),
                            })
                        })
                        .collect();
                    StoreRule { spec, expansions }
                })
                .collect();

            classification
                .store_rules
                .insert(key.clone(), StoreAttribute { pattern, rules });
        }

        debug!(
            store_attributes = classification.store_rules.len(),
            expanded = classification.expanded_count(),
            other_attributes = classification.other_rules.len(),
            "Classified rules"
        );
        classification
    }

    fn is_store_name(&self, name: &str) -> bool {
        self.store_rule_names.iter().any(|n| n == name)
    }

    fn store_spec(&self, item: &RuleItem) -> StoreMatch {
        match item {
            RuleItem::Spec(spec) if self.is_store_name(spec.name()) => StoreMatch::Store(spec.clone()),
            RuleItem::Spec(_) => StoreMatch::Other,
            RuleItem::Text(text) => {
                let mentions_store_rule = self
                    .keyword
                    .as_ref()
                    .is_some_and(|keyword| keyword.is_match(text));
                if !mentions_store_rule {
                    return StoreMatch::Other;
                }
                match RuleSpec::parse(text) {
                    Some(spec) if self.is_store_name(spec.name()) => StoreMatch::Store(spec),
                    // the keyword only appeared inside another rule's parameters
                    Some(_) => StoreMatch::Other,
                    None => StoreMatch::Malformed,
                }
            }
        }
    }
}

enum StoreMatch {
    Store(RuleSpec),
    Other,
    Malformed,
}
