//! Policy rule aggregation.
//!
//! Rule conditions are opaque references resolved by a pluggable
//! [`PolicyEvaluator`]. Without an evaluator policy evaluation is *disabled*:
//! deny rules are then listed as unevaluated and the policy does not pass.

use crate::model::{Policy, Severity, TrustObject};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, warn};

/// Resolves a rule condition against a trust object.
pub trait PolicyEvaluator: Send + Sync {
    fn evaluate(&self, condition: &str, trust: &TrustObject) -> bool;
}

type Predicate = Box<dyn Fn(&TrustObject) -> bool + Send + Sync>;

/// Evaluator backed by a table of named predicates.
///
/// A condition with no registered predicate evaluates to `false`.
#[derive(Default)]
pub struct RuleTable {
    predicates: HashMap<String, Predicate>,
}

impl RuleTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<F>(&mut self, condition: impl Into<String>, predicate: F)
    where
        F: Fn(&TrustObject) -> bool + Send + Sync + 'static,
    {
        self.predicates.insert(condition.into(), Box::new(predicate));
    }

    pub fn with<F>(mut self, condition: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&TrustObject) -> bool + Send + Sync + 'static,
    {
        self.insert(condition, predicate);
        self
    }

    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }
}

impl fmt::Debug for RuleTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut conditions: Vec<&String> = self.predicates.keys().collect();
        conditions.sort();
        f.debug_struct("RuleTable")
            .field("conditions", &conditions)
            .finish()
    }
}

impl PolicyEvaluator for RuleTable {
    fn evaluate(&self, condition: &str, trust: &TrustObject) -> bool {
        match self.predicates.get(condition) {
            Some(predicate) => predicate(trust),
            None => {
                debug!(condition = %condition, "No predicate registered for condition");
                false
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyStatus {
    Evaluated,
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyOutcome {
    pub status: PolicyStatus,
    pub passed: bool,
    /// Deny rules whose condition was false
    pub failed_rules: Vec<String>,
    /// Warn rules whose condition was false
    pub warned_rules: Vec<String>,
    /// Rules not evaluated because evaluation is disabled
    pub unevaluated_rules: Vec<String>,
}

/// Aggregate rule results for `trust`.
pub fn evaluate_policy(trust: &TrustObject, evaluator: Option<&dyn PolicyEvaluator>) -> PolicyOutcome {
    let policy: &Policy = &trust.policy;

    let Some(evaluator) = evaluator else {
        let unevaluated_rules: Vec<String> = policy.rules.iter().map(|r| r.id.clone()).collect();
        let passed = policy.deny_rules().next().is_none();
        if !passed {
            warn!(
                identity = %trust.identity.id,
                "Policy has deny rules but evaluation is disabled"
            );
        }
        return PolicyOutcome {
            status: PolicyStatus::Disabled,
            passed,
            failed_rules: Vec::new(),
            warned_rules: Vec::new(),
            unevaluated_rules,
        };
    };

    let mut failed_rules = Vec::new();
    let mut warned_rules = Vec::new();
    for rule in &policy.rules {
        if evaluator.evaluate(&rule.condition, trust) {
            continue;
        }
        match rule.severity {
            Severity::Deny => {
                warn!(identity = %trust.identity.id, rule = %rule.id, "Deny rule failed");
                failed_rules.push(rule.id.clone());
            }
            Severity::Warn => warned_rules.push(rule.id.clone()),
            Severity::Info => {}
        }
    }

    PolicyOutcome {
        status: PolicyStatus::Evaluated,
        passed: failed_rules.is_empty(),
        failed_rules,
        warned_rules,
        unevaluated_rules: Vec::new(),
    }
}
