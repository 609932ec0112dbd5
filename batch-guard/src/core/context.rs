//! Per-run validation state.
//!
//! A [`ValidationContext`] is created for each run and passed by `&mut` through
//! the in-memory engine, the batch coordinator and the failure attributor. It
//! owns the [`FailureRegistry`] and carries the session signals the store
//! engine has to honour: conditional exclusion of an attribute, "stop
//! validating this attribute", and global stop-on-first-failure.

use super::path::AttributePath;
use super::registry::{FailureRegistry, Violation};
use std::fmt;
use std::sync::Arc;

/// Session signals consulted between rule evaluations.
pub trait SessionHooks: Send + Sync {
    /// Returns true if `attribute` is excluded from validation (conditional rules).
    fn should_exclude(&self, _attribute: &AttributePath, _registry: &FailureRegistry) -> bool {
        false
    }

    /// Returns true if no further rules should run for `attribute`.
    fn should_stop_validating(
        &self,
        _attribute: &AttributePath,
        _registry: &FailureRegistry,
    ) -> bool {
        false
    }
}

/// Hooks that never exclude and never stop.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl SessionHooks for NoHooks {}

/// Stops validating an attribute once any of its concrete paths has failed.
#[derive(Debug, Clone, Copy, Default)]
pub struct BailOnFailure;

impl SessionHooks for BailOnFailure {
    fn should_stop_validating(&self, attribute: &AttributePath, registry: &FailureRegistry) -> bool {
        registry.has_failure_matching(attribute)
    }
}

/// Predicate over an attribute pattern and the failures recorded so far.
pub type AttributePredicate = Arc<dyn Fn(&AttributePath, &FailureRegistry) -> bool + Send + Sync>;

/// Hooks built from closures.
#[derive(Clone, Default)]
pub struct PredicateHooks {
    exclude: Option<AttributePredicate>,
    stop: Option<AttributePredicate>,
}

impl PredicateHooks {
    /// Creates hooks with no predicates set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the exclusion predicate.
    pub fn exclude_when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&AttributePath, &FailureRegistry) -> bool + Send + Sync + 'static,
    {
        self.exclude = Some(Arc::new(predicate));
        self
    }

    /// Sets the stop-validating predicate.
    pub fn stop_when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&AttributePath, &FailureRegistry) -> bool + Send + Sync + 'static,
    {
        self.stop = Some(Arc::new(predicate));
        self
    }
}

impl fmt::Debug for PredicateHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PredicateHooks")
            .field("exclude", &self.exclude.is_some())
            .field("stop", &self.stop.is_some())
            .finish()
    }
}

impl SessionHooks for PredicateHooks {
    fn should_exclude(&self, attribute: &AttributePath, registry: &FailureRegistry) -> bool {
        self.exclude
            .as_ref()
            .is_some_and(|predicate| predicate(attribute, registry))
    }

    fn should_stop_validating(&self, attribute: &AttributePath, registry: &FailureRegistry) -> bool {
        self.stop
            .as_ref()
            .is_some_and(|predicate| predicate(attribute, registry))
    }
}

/// State of a single validation run.
pub struct ValidationContext {
    registry: FailureRegistry,
    stop_on_first_failure: bool,
    hooks: Arc<dyn SessionHooks>,
    current_rule: Option<String>,
    removed_attributes: Vec<AttributePath>,
}

impl ValidationContext {
    /// Creates a context with no hooks and stop-on-first-failure disabled.
    pub fn new() -> Self {
        Self {
            registry: FailureRegistry::new(),
            stop_on_first_failure: false,
            hooks: Arc::new(NoHooks),
            current_rule: None,
            removed_attributes: Vec::new(),
        }
    }

    /// Enables or disables global stop-on-first-failure.
    pub fn with_stop_on_first_failure(mut self, enabled: bool) -> Self {
        self.stop_on_first_failure = enabled;
        self
    }

    /// Replaces the session hooks.
    pub fn with_hooks(mut self, hooks: Arc<dyn SessionHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// The failures recorded so far.
    pub fn registry(&self) -> &FailureRegistry {
        &self.registry
    }

    /// Records a violation under an arbitrary key (used by in-memory engines).
    pub fn add_failure(&mut self, key: impl Into<String>, violation: Violation) {
        self.registry.add(key, violation);
    }

    /// Records a violation against a concrete attribute path.
    pub fn add_failure_for_path(&mut self, path: &AttributePath, violation: Violation) {
        self.registry.add_for_path(path, violation);
    }

    /// Returns true if stop-on-first-failure is enabled.
    pub fn stop_on_first_failure(&self) -> bool {
        self.stop_on_first_failure
    }

    /// Returns true when stop-on-first-failure is on and something already failed.
    pub fn should_halt(&self) -> bool {
        self.stop_on_first_failure && !self.registry.is_empty()
    }

    /// Asks the session hooks whether `attribute` is excluded.
    pub fn should_exclude(&self, attribute: &AttributePath) -> bool {
        self.hooks.should_exclude(attribute, &self.registry)
    }

    /// Asks the session hooks whether validation of `attribute` should stop.
    pub fn should_stop_validating(&self, attribute: &AttributePath) -> bool {
        self.hooks.should_stop_validating(attribute, &self.registry)
    }

    /// The rule currently being evaluated, if any.
    pub fn current_rule(&self) -> Option<&str> {
        self.current_rule.as_deref()
    }

    /// Sets the rule currently being evaluated.
    pub fn set_current_rule(&mut self, rule: Option<String>) {
        self.current_rule = rule;
    }

    /// Notes that `attribute` was excluded and its obligations dropped.
    pub fn mark_removed(&mut self, attribute: &AttributePath) {
        if !self.removed_attributes.contains(attribute) {
            self.removed_attributes.push(attribute.clone());
        }
    }

    /// Attributes removed through exclusion during this run.
    pub fn removed_attributes(&self) -> &[AttributePath] {
        &self.removed_attributes
    }

    /// Consumes the context, returning the registry and removed attributes.
    pub fn into_parts(self) -> (FailureRegistry, Vec<AttributePath>) {
        (self.registry, self.removed_attributes)
    }
}

impl Default for ValidationContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ValidationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationContext")
            .field("failures", &self.registry.len())
            .field("stop_on_first_failure", &self.stop_on_first_failure)
            .field("current_rule", &self.current_rule)
            .field("removed_attributes", &self.removed_attributes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn violation() -> Violation {
        Violation::new("unique", vec!["contacts".into()])
    }

    #[test]
    fn test_should_halt_only_with_flag_and_failure() {
        let mut ctx = ValidationContext::new();
        ctx.add_failure("0.email", violation());
        assert!(!ctx.should_halt());

        let mut ctx = ValidationContext::new().with_stop_on_first_failure(true);
        assert!(!ctx.should_halt());
        ctx.add_failure("0.email", violation());
        assert!(ctx.should_halt());
    }

    #[test]
    fn test_bail_on_failure_hook() {
        let mut ctx = ValidationContext::new().with_hooks(Arc::new(BailOnFailure));
        let email = AttributePath::parse("*.email");
        assert!(!ctx.should_stop_validating(&email));

        ctx.add_failure_for_path(&AttributePath::parse("3.email"), violation());
        assert!(ctx.should_stop_validating(&email));
        assert!(!ctx.should_stop_validating(&AttributePath::parse("*.phone")));
    }

    #[test]
    fn test_predicate_hooks() {
        let hooks = PredicateHooks::new()
            .exclude_when(|attribute, _| attribute.last_key() == Some("legacy_id"));
        let ctx = ValidationContext::new().with_hooks(Arc::new(hooks));

        assert!(ctx.should_exclude(&AttributePath::parse("*.legacy_id")));
        assert!(!ctx.should_exclude(&AttributePath::parse("*.email")));
        assert!(!ctx.should_stop_validating(&AttributePath::parse("*.email")));
    }

    #[test]
    fn test_mark_removed_is_idempotent() {
        let mut ctx = ValidationContext::new();
        let attribute = AttributePath::parse("*.email");
        ctx.mark_removed(&attribute);
        ctx.mark_removed(&attribute);
        assert_eq!(ctx.removed_attributes(), &[attribute]);
    }
}
