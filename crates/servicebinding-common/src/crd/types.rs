//! Status and selector types shared by the ServiceBinding CRDs

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// =============================================================================
// Conditions
// =============================================================================

/// `True`, `False` or `Unknown`, as in `metav1.ConditionStatus`
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    /// The condition holds
    True,
    /// The condition does not hold
    False,
    /// Not evaluated yet
    #[default]
    Unknown,
}

/// One entry of `status.conditions`
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Condition type, e.g. `Ready`
    #[serde(rename = "type")]
    pub type_: String,

    /// Current status
    pub status: ConditionStatus,

    /// CamelCase reason for the last transition
    pub reason: String,

    /// Detail for humans; may be empty
    #[serde(default)]
    pub message: String,

    /// Binding generation the condition was computed for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// When `status` last changed
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    /// Condition stamped with the current time
    pub fn new(
        type_: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            type_: type_.into(),
            status,
            reason: reason.into(),
            message: message.into(),
            observed_generation: None,
            last_transition_time: Utc::now(),
        }
    }

    /// Record the generation this condition describes
    pub fn with_generation(mut self, generation: Option<i64>) -> Self {
        self.observed_generation = generation;
        self
    }
}

/// Insert or replace the condition of the same type
///
/// The previous `lastTransitionTime` is kept when the status did not change,
/// so re-reconciling a steady binding does not churn its status.
pub fn upsert_condition(conditions: &mut Vec<Condition>, mut condition: Condition) {
    match conditions.iter_mut().find(|c| c.type_ == condition.type_) {
        Some(existing) => {
            if existing.status == condition.status {
                condition.last_transition_time = existing.last_transition_time;
            }
            *existing = condition;
        }
        None => conditions.push(condition),
    }
}

// =============================================================================
// Label selection
// =============================================================================

/// Set-based selector operator
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum LabelSelectorOperator {
    /// Value is one of `values`
    In,
    /// Value is none of `values`, or the label is missing
    NotIn,
    /// Label is present
    Exists,
    /// Label is missing
    DoesNotExist,
}

/// One `matchExpressions` term
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelectorRequirement {
    /// Label key
    pub key: String,

    /// How `values` applies to the key
    pub operator: LabelSelectorOperator,

    /// Only meaningful for `In` and `NotIn`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

/// Workload label selector, shaped like `metav1.LabelSelector`
///
/// Selection itself happens on the API server; this type only needs to
/// render the `labelSelector` query parameter.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelector {
    /// Equality terms
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub match_labels: BTreeMap<String, String>,

    /// Set-based terms
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub match_expressions: Vec<LabelSelectorRequirement>,
}

impl LabelSelector {
    /// Render as a `labelSelector` query string (`a=b,c in (d,e),!f`)
    ///
    /// An empty selector renders as the empty string, which selects
    /// everything.
    pub fn to_selector_string(&self) -> String {
        let equality = self.match_labels.iter().map(|(k, v)| format!("{k}={v}"));
        let set_based = self.match_expressions.iter().map(|term| match term.operator {
            LabelSelectorOperator::In => format!("{} in ({})", term.key, term.values.join(",")),
            LabelSelectorOperator::NotIn => {
                format!("{} notin ({})", term.key, term.values.join(","))
            }
            LabelSelectorOperator::Exists => term.key.clone(),
            LabelSelectorOperator::DoesNotExist => format!("!{}", term.key),
        });
        equality.chain(set_based).collect::<Vec<_>>().join(",")
    }
}
