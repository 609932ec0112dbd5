//! Extra query conditions attached to store rules.
//!
//! Rule parameters after the positional slots come in `column,value` pairs:
//!
//! | value        | condition              |
//! |--------------|------------------------|
//! | `NULL`       | `column IS NULL`       |
//! | `NOT_NULL`   | `column IS NOT NULL`   |
//! | `!x`         | `column <> 'x'`        |
//! | anything else| `column = value`       |
//!
//! An opaque predicate may appear anywhere in the list and is applied as-is.

use crate::error::Result;
use crate::rules::{RawPredicate, RuleParam, NULL_PARAM};
use crate::security::SqlSecurity;
use datafusion::logical_expr::{ident, Expr};
use datafusion::prelude::lit;
use tracing::debug;

/// A single filter applied alongside the `IN (...)` candidate filter.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Equals { column: String, value: String },
    NotEquals { column: String, value: String },
    IsNull { column: String },
    IsNotNull { column: String },
    Raw(RawPredicate),
}

impl Condition {
    /// Interprets one `column,value` pair.
    pub fn from_pair(column: &str, value: &str) -> Self {
        let column = column.to_string();
        match value {
            NULL_PARAM => Condition::IsNull { column },
            "NOT_NULL" => Condition::IsNotNull { column },
            _ => match value.strip_prefix('!') {
                Some(rest) => Condition::NotEquals {
                    column,
                    value: rest.to_string(),
                },
                None => Condition::Equals {
                    column,
                    value: value.to_string(),
                },
            },
        }
    }

    /// The column this condition filters on, if it names one.
    pub fn column(&self) -> Option<&str> {
        match self {
            Condition::Equals { column, .. }
            | Condition::NotEquals { column, .. }
            | Condition::IsNull { column }
            | Condition::IsNotNull { column } => Some(column),
            Condition::Raw(_) => None,
        }
    }

    /// Builds the DataFusion filter expression.
    pub fn to_expr(&self) -> Expr {
        match self {
            Condition::Equals { column, value } => ident(column).eq(lit(value.as_str())),
            Condition::NotEquals { column, value } => ident(column).not_eq(lit(value.as_str())),
            Condition::IsNull { column } => ident(column).is_null(),
            Condition::IsNotNull { column } => ident(column).is_not_null(),
            Condition::Raw(predicate) => predicate.expr(),
        }
    }
}

/// An ordered conjunction of [`Condition`]s.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConditionSet {
    conditions: Vec<Condition>,
}

impl ConditionSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a set from the extra parameters of a rule.
    pub fn from_params(extra: &[RuleParam]) -> Self {
        Self::new().extend_from_params(extra)
    }

    /// Appends conditions parsed pairwise from `extra`.
    ///
    /// A trailing column with no value is ignored. A predicate in value
    /// position replaces the pair.
    pub fn extend_from_params(mut self, extra: &[RuleParam]) -> Self {
        let mut i = 0;
        while i < extra.len() {
            match (&extra[i], extra.get(i + 1)) {
                (RuleParam::Predicate(predicate), _) => {
                    self.conditions.push(Condition::Raw(predicate.clone()));
                    i += 1;
                }
                (RuleParam::Text(column), Some(RuleParam::Text(value))) => {
                    self.conditions.push(Condition::from_pair(column, value));
                    i += 2;
                }
                (RuleParam::Text(_), Some(RuleParam::Predicate(predicate))) => {
                    self.conditions.push(Condition::Raw(predicate.clone()));
                    i += 2;
                }
                (RuleParam::Text(column), None) => {
                    debug!(column = %column, "Ignoring extra condition without a value");
                    i += 1;
                }
            }
        }
        self
    }

    /// Excludes the row whose `id_column` equals `id`.
    ///
    /// `id` is unescaped first; an empty id or `NULL` adds nothing.
    pub fn exclude_id(mut self, id: Option<&str>, id_column: &str) -> Self {
        if let Some(id) = id.map(strip_slashes) {
            if !id.is_empty() && id != NULL_PARAM {
                self.conditions.push(Condition::NotEquals {
                    column: id_column.to_string(),
                    value: id,
                });
            }
        }
        self
    }

    /// Adds a condition.
    pub fn push(&mut self, condition: Condition) {
        self.conditions.push(condition);
    }

    /// Iterates conditions in order.
    pub fn iter(&self) -> impl Iterator<Item = &Condition> {
        self.conditions.iter()
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Checks every named column is a well-formed identifier.
    pub fn validate(&self) -> Result<()> {
        SqlSecurity::validate_all(self.conditions.iter().filter_map(Condition::column))
    }

    /// The conjunction of all conditions, or `None` for an empty set.
    pub fn to_expr(&self) -> Option<Expr> {
        self.conditions
            .iter()
            .map(Condition::to_expr)
            .reduce(|acc, expr| acc.and(expr))
    }
}

/// Removes backslash escapes: `\x` becomes `x`, `\\` becomes `\`.
pub fn strip_slashes(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}
