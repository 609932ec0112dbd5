//! Rule-string parsing and programmatic rule specs.
//!
//! Rules are written `name:param1,param2,...` and combined with `|`, or given
//! as a list. Parameters are split like a CSV line, so a double-quoted value
//! may contain commas. A rule whose name can't be read degrades to nothing
//! rather than failing the run.

use datafusion::logical_expr::Expr;
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

/// Name of the uniqueness rule.
pub const UNIQUE: &str = "unique";
/// Name of the existence rule.
pub const EXISTS: &str = "exists";

/// Literal meaning "no value" in positional rule parameters.
pub const NULL_PARAM: &str = "NULL";

/// An opaque predicate applied directly to a store query.
///
/// The closure builds a DataFusion [`Expr`] that is AND-ed into the query's
/// filter. Two predicates are equal only if they share the same closure.
#[derive(Clone)]
pub struct RawPredicate {
    label: String,
    build: Arc<dyn Fn() -> Expr + Send + Sync>,
}

impl RawPredicate {
    /// Creates a predicate with a label used in logs and failure descriptors.
    pub fn new<F>(label: impl Into<String>, build: F) -> Self
    where
        F: Fn() -> Expr + Send + Sync + 'static,
    {
        Self {
            label: label.into(),
            build: Arc::new(build),
        }
    }

    /// Builds the filter expression.
    pub fn expr(&self) -> Expr {
        (self.build)()
    }

    /// The predicate's label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Identity of the underlying closure, stable for the predicate's lifetime.
    pub fn identity(&self) -> String {
        format!("{:p}", Arc::as_ptr(&self.build))
    }
}

impl fmt::Debug for RawPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawPredicate({})", self.label)
    }
}

impl PartialEq for RawPredicate {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.build, &other.build)
    }
}

/// One positional rule parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleParam {
    Text(String),
    Predicate(RawPredicate),
}

impl RuleParam {
    /// Returns the text of a textual parameter.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            RuleParam::Text(text) => Some(text),
            RuleParam::Predicate(_) => None,
        }
    }

    /// Human-readable form used in failure descriptors.
    pub fn describe(&self) -> String {
        match self {
            RuleParam::Text(text) => text.clone(),
            RuleParam::Predicate(predicate) => format!("<{}>", predicate.label()),
        }
    }

    /// Key used to group parameter lists that produce identical queries.
    pub(crate) fn signature(&self) -> String {
        match self {
            RuleParam::Text(text) => text.clone(),
            RuleParam::Predicate(predicate) => format!("\u{0}{}", predicate.identity()),
        }
    }
}

impl From<&str> for RuleParam {
    fn from(text: &str) -> Self {
        RuleParam::Text(text.to_string())
    }
}

impl From<String> for RuleParam {
    fn from(text: String) -> Self {
        RuleParam::Text(text)
    }
}

/// A parsed rule: a lowercase name and its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleSpec {
    name: String,
    params: Vec<RuleParam>,
}

impl RuleSpec {
    /// Creates a spec from a name and parameters.
    pub fn new(name: impl Into<String>, params: Vec<RuleParam>) -> Self {
        Self {
            name: normalize_name(&name.into()),
            params,
        }
    }

    /// Parses `name:param1,param2`. Returns `None` when no rule name is present.
    ///
    /// ```rust
    /// use batch_guard::rules::RuleSpec;
    ///
    /// let spec = RuleSpec::parse("unique:contacts,email").unwrap();
    /// assert_eq!(spec.name(), "unique");
    /// assert_eq!(spec.text_params(), vec!["contacts", "email"]);
    /// assert!(RuleSpec::parse(":contacts").is_none());
    /// ```
    pub fn parse(text: &str) -> Option<Self> {
        let (name, raw_params) = match text.split_once(':') {
            Some((name, params)) => (name, Some(params)),
            None => (text, None),
        };
        let name = normalize_name(name);
        if name.is_empty() {
            return None;
        }
        let params = raw_params
            .map(split_parameters)
            .unwrap_or_default()
            .into_iter()
            .map(RuleParam::Text)
            .collect();
        Some(Self { name, params })
    }

    /// Starts a `unique` rule against `table` (optionally `connection.table`).
    pub fn unique(table: impl Into<String>) -> Self {
        Self::new(UNIQUE, vec![RuleParam::Text(table.into())])
    }

    /// Starts an `exists` rule against `table` (optionally `connection.table`).
    pub fn exists(table: impl Into<String>) -> Self {
        Self::new(EXISTS, vec![RuleParam::Text(table.into())])
    }

    /// Sets the column to query (defaults to the attribute's field name).
    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.set_param(1, column.into());
        self
    }

    /// Excludes the row whose `id_column` equals `id` (unique only).
    pub fn ignore(mut self, id: impl fmt::Display, id_column: impl Into<String>) -> Self {
        self.set_param(2, id.to_string());
        self.set_param(3, id_column.into());
        self
    }

    /// Adds `key = value`.
    pub fn where_eq(self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        self.push_condition(key.into(), value.to_string())
    }

    /// Adds `key <> value`.
    pub fn where_not(self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        self.push_condition(key.into(), format!("!{value}"))
    }

    /// Adds `key IS NULL`.
    pub fn where_null(self, key: impl Into<String>) -> Self {
        self.push_condition(key.into(), NULL_PARAM.to_string())
    }

    /// Adds `key IS NOT NULL`.
    pub fn where_not_null(self, key: impl Into<String>) -> Self {
        self.push_condition(key.into(), "NOT_NULL".to_string())
    }

    /// Adds an opaque predicate applied as-is to the query.
    pub fn where_raw<F>(mut self, label: impl Into<String>, build: F) -> Self
    where
        F: Fn() -> Expr + Send + Sync + 'static,
    {
        self.pad_positional();
        self.params
            .push(RuleParam::Predicate(RawPredicate::new(label, build)));
        self
    }

    /// The rule name, lowercase.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// All parameters.
    pub fn params(&self) -> &[RuleParam] {
        &self.params
    }

    /// Parameters rendered as text (predicates by label).
    pub fn text_params(&self) -> Vec<String> {
        self.params.iter().map(RuleParam::describe).collect()
    }

    /// Grouping key: equal signatures produce identical store queries.
    pub(crate) fn signature(&self) -> String {
        self.params
            .iter()
            .map(RuleParam::signature)
            .collect::<Vec<_>>()
            .join("\u{1f}")
    }

    /// Replaces `*` in textual parameters with the concrete wildcard keys of
    /// the attribute under validation, in order. Each parameter starts again
    /// from the first key.
    pub fn substitute_wildcards(&self, keys: &[String]) -> Self {
        if keys.is_empty() {
            return self.clone();
        }
        let params = self
            .params
            .iter()
            .map(|param| match param {
                RuleParam::Text(text) if text.contains('*') => {
                    let mut keys = keys.iter();
                    let mut out = String::with_capacity(text.len());
                    for c in text.chars() {
                        match (c, keys.as_slice().first()) {
                            ('*', Some(key)) => {
                                out.push_str(key);
                                keys.next();
                            }
                            (other, _) => out.push(other),
                        }
                    }
                    RuleParam::Text(out)
                }
                other => other.clone(),
            })
            .collect();
        Self {
            name: self.name.clone(),
            params,
        }
    }

    /// Number of positional slots before extra conditions begin.
    pub fn positional_len(&self) -> usize {
        if self.name == UNIQUE {
            4
        } else {
            2
        }
    }

    fn set_param(&mut self, index: usize, value: String) {
        while self.params.len() <= index {
            self.params.push(RuleParam::Text(self.default_slot(self.params.len())));
        }
        self.params[index] = RuleParam::Text(value);
    }

    fn pad_positional(&mut self) {
        while self.params.len() < self.positional_len() {
            self.params.push(RuleParam::Text(self.default_slot(self.params.len())));
        }
    }

    fn push_condition(mut self, key: String, value: String) -> Self {
        self.pad_positional();
        self.params.push(RuleParam::Text(key));
        self.params.push(RuleParam::Text(value));
        self
    }

    fn default_slot(&self, index: usize) -> String {
        match index {
            3 => "id".to_string(),
            _ => NULL_PARAM.to_string(),
        }
    }
}

impl fmt::Display for RuleSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.params.is_empty() {
            return f.write_str(&self.name);
        }
        write!(f, "{}:{}", self.name, self.text_params().join(","))
    }
}

/// One entry of a rule list: a rule string or a programmatic spec.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleItem {
    Text(String),
    Spec(RuleSpec),
}

impl From<&str> for RuleItem {
    fn from(text: &str) -> Self {
        RuleItem::Text(text.to_string())
    }
}

impl From<RuleSpec> for RuleItem {
    fn from(spec: RuleSpec) -> Self {
        RuleItem::Spec(spec)
    }
}

/// The rules attached to one attribute pattern.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleInput {
    /// `required|email|unique:contacts`
    Pipe(String),
    /// Already split rules, possibly including programmatic specs.
    List(Vec<RuleItem>),
}

impl RuleInput {
    /// Splits the input into individual rule items.
    pub fn items(&self) -> Vec<RuleItem> {
        match self {
            RuleInput::Pipe(text) => text
                .split('|')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(|part| RuleItem::Text(part.to_string()))
                .collect(),
            RuleInput::List(items) => items.clone(),
        }
    }
}

impl From<&str> for RuleInput {
    fn from(text: &str) -> Self {
        RuleInput::Pipe(text.to_string())
    }
}

impl From<String> for RuleInput {
    fn from(text: String) -> Self {
        RuleInput::Pipe(text)
    }
}

impl From<Vec<RuleItem>> for RuleInput {
    fn from(items: Vec<RuleItem>) -> Self {
        RuleInput::List(items)
    }
}

impl From<Vec<&str>> for RuleInput {
    fn from(items: Vec<&str>) -> Self {
        RuleInput::List(items.into_iter().map(RuleItem::from).collect())
    }
}

impl From<RuleSpec> for RuleInput {
    fn from(spec: RuleSpec) -> Self {
        RuleInput::List(vec![RuleItem::Spec(spec)])
    }
}

/// Attribute pattern to rules, in insertion order.
pub type RuleMap = IndexMap<String, RuleInput>;

/// Builds a [`RuleMap`] from `(pattern, rules)` pairs.
///
/// ```rust
/// use batch_guard::rules::rule_map;
///
/// let rules = rule_map([
///     ("*.document_number", "unique:contacts,document_number"),
///     ("*.email", "required|unique:contacts,email"),
/// ]);
/// assert_eq!(rules.len(), 2);
/// ```
pub fn rule_map<I, K, V>(entries: I) -> RuleMap
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<RuleInput>,
{
    entries
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

fn normalize_name(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}

/// Splits a parameter list like a CSV line.
pub fn split_parameters(raw: &str) -> Vec<String> {
    let mut params = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = raw.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => params.push(std::mem::take(&mut current)),
            other => current.push(other),
        }
    }
    params.push(current);
    params
}
