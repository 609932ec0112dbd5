//! Maps offending values back to the records that produced them.

use crate::core::{AttributePath, Batch, ValidationContext, Value, ValueSet, Violation};
use crate::rules::ExpandedRule;
use tracing::trace;

/// One concrete attribute in a batch that a store rule must check.
#[derive(Debug, Clone, PartialEq)]
pub struct Obligation {
    /// Absolute index of the record in the collection
    pub record_index: usize,
    /// Concrete path the failure is reported under
    pub path: AttributePath,
    /// The record's value at that path
    pub value: Value,
}

impl Obligation {
    /// Reads the value an expanded rule points at inside the batch.
    ///
    /// Returns `None` for records outside the batch, missing or null values
    /// and non-scalar values; none of those are sent to the store.
    pub fn from_expansion(batch: &Batch<'_>, expansion: &ExpandedRule) -> Option<Self> {
        let record = batch.record(expansion.record_index)?;
        let value = Value::from_json(expansion.path.tail().resolve(record)?)?;
        if value.is_null() {
            return None;
        }
        Some(Self {
            record_index: expansion.record_index,
            path: expansion.path.clone(),
            value,
        })
    }
}

/// Distinct values of a group of obligations, in first-seen order.
pub fn distinct_values(obligations: &[Obligation]) -> ValueSet {
    obligations.iter().map(|o| o.value.clone()).collect()
}

/// Records failures for every obligation whose value offends.
///
/// Every obligation is checked, so records sharing an offending value all
/// fail. Keys use the absolute record index. Returns the number of failures
/// recorded.
pub fn attribute_failures(
    offending: &ValueSet,
    obligations: &[Obligation],
    violation: &Violation,
    ctx: &mut ValidationContext,
) -> usize {
    if offending.is_empty() {
        return 0;
    }
    let mut recorded = 0;
    for obligation in obligations {
        if offending.contains(&obligation.value) {
            trace!(attribute = %obligation.path, value = %obligation.value, "Recording failure");
            ctx.add_failure_for_path(&obligation.path, violation.clone());
            recorded += 1;
        }
    }
    recorded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::RecordCollection;
    use crate::rules::RuleSpec;
    use serde_json::json;

    fn expansion(path: &str) -> ExpandedRule {
        let path = AttributePath::parse(path);
        ExpandedRule {
            record_index: path.record_index().unwrap(),
            path,
            spec: RuleSpec::unique("contacts"),
        }
    }

    #[test]
    fn test_obligation_reads_scalar_values_only() {
        let records = RecordCollection::new(vec![
            json!({"email": "a@x.io"}),
            json!({"email": null}),
            json!({"email": ["list"]}),
            json!({}),
        ]);
        let batch = records.batches(10).unwrap().next().unwrap();

        let first = Obligation::from_expansion(&batch, &expansion("0.email")).unwrap();
        assert_eq!(first.value, Value::from("a@x.io"));
        assert!(Obligation::from_expansion(&batch, &expansion("1.email")).is_none());
        assert!(Obligation::from_expansion(&batch, &expansion("2.email")).is_none());
        assert!(Obligation::from_expansion(&batch, &expansion("3.email")).is_none());
        assert!(Obligation::from_expansion(&batch, &expansion("12.email")).is_none());
    }

    #[test]
    fn test_every_duplicate_is_attributed() {
        let obligations: Vec<Obligation> = [(10, "dup@x.io"), (11, "ok@x.io"), (13, "dup@x.io")]
            .into_iter()
            .map(|(index, email)| Obligation {
                record_index: index,
                path: AttributePath::parse(&format!("{index}.email")),
                value: Value::from(email),
            })
            .collect();
        assert_eq!(distinct_values(&obligations).len(), 2);

        let offending: ValueSet = [Value::from("dup@x.io")].into_iter().collect();
        let violation = Violation::new("unique", vec!["contacts".into()]);
        let mut ctx = ValidationContext::new();

        let recorded = attribute_failures(&offending, &obligations, &violation, &mut ctx);
        assert_eq!(recorded, 2);
        assert_eq!(ctx.registry().keys().collect::<Vec<_>>(), vec!["10.email", "13.email"]);
    }
}
