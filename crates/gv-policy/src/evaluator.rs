// evaluator.rs — Pure evaluation of a compiled policy against a fact snapshot.
//
// `evaluate` reads exactly two things: the PolicyDefinition and the
// FactSnapshot. It performs no I/O, touches no shared state and allocates
// only its result. Each clause is a finite tree walked once, so the cost is
// linear in the size of the policy no matter what the facts contain.
//
// Type policy: numbers compare with numbers, strings with strings, durations
// with durations and booleans only for (in)equality. A missing fact, a type
// mismatch or a NaN makes the predicate false; nothing here can fail.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::definition::{Action, Comparator, Condition, Literal, Operand, PolicyDefinition, Predicate};
use crate::facts::{FactSnapshot, FactValue};

/// What a policy asks for, given one snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationOutcome {
    pub policy: String,
    pub version: u32,
    /// Actions of every fired clause, clause order then declaration order.
    pub actions: Vec<Action>,
    /// Zero-based indices of the clauses whose condition held.
    pub fired_clauses: Vec<usize>,
}

impl EvaluationOutcome {
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn blocks(&self) -> bool {
        self.actions.iter().any(|a| matches!(a, Action::Block))
    }

    pub fn requires_approval(&self) -> bool {
        self.actions
            .iter()
            .any(|a| matches!(a, Action::RequireApproval))
    }

    pub fn warnings(&self) -> impl Iterator<Item = &str> {
        self.actions.iter().filter_map(|a| match a {
            Action::Warn(message) => Some(message.as_str()),
            _ => None,
        })
    }
}

/// How a single predicate came out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Matched,
    NotMatched,
    MissingFact,
    TypeMismatch,
    /// Not evaluated because the surrounding AND/OR was already decided.
    ShortCircuited,
}

/// One predicate visit, in evaluation order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationStep {
    pub clause: usize,
    /// The predicate in canonical source form.
    pub predicate: String,
    pub outcome: StepOutcome,
}

/// Full evaluation trace for explaining a decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationTrace {
    pub outcome: EvaluationOutcome,
    pub steps: Vec<EvaluationStep>,
}

/// Evaluate `policy` against `facts`.
pub fn evaluate(policy: &PolicyDefinition, facts: &FactSnapshot) -> EvaluationOutcome {
    Walker::new(policy, facts, false).run().outcome
}

/// Like [`evaluate`], additionally recording every predicate visit.
pub fn evaluate_with_trace(policy: &PolicyDefinition, facts: &FactSnapshot) -> EvaluationTrace {
    Walker::new(policy, facts, true).run()
}

struct Walker<'a> {
    policy: &'a PolicyDefinition,
    facts: &'a FactSnapshot,
    steps: Option<Vec<EvaluationStep>>,
    clause: usize,
}

impl<'a> Walker<'a> {
    fn new(policy: &'a PolicyDefinition, facts: &'a FactSnapshot, trace: bool) -> Self {
        Self {
            policy,
            facts,
            steps: trace.then(Vec::new),
            clause: 0,
        }
    }

    fn run(mut self) -> EvaluationTrace {
        let mut actions = Vec::new();
        let mut fired_clauses = Vec::new();

        for (index, clause) in self.policy.clauses().iter().enumerate() {
            self.clause = index;
            if self.condition(&clause.when) {
                fired_clauses.push(index);
                actions.extend(clause.then.iter().cloned());
            }
        }

        EvaluationTrace {
            outcome: EvaluationOutcome {
                policy: self.policy.name().to_string(),
                version: self.policy.version(),
                actions,
                fired_clauses,
            },
            steps: self.steps.unwrap_or_default(),
        }
    }

    fn condition(&mut self, condition: &Condition) -> bool {
        match condition {
            Condition::Predicate(p) => {
                let outcome = self.predicate(p);
                self.record(p, outcome);
                outcome == StepOutcome::Matched
            }
            Condition::And(l, r) => {
                if self.condition(l) {
                    self.condition(r)
                } else {
                    self.skip(r);
                    false
                }
            }
            Condition::Or(l, r) => {
                if self.condition(l) {
                    self.skip(r);
                    true
                } else {
                    self.condition(r)
                }
            }
        }
    }

    fn skip(&mut self, condition: &Condition) {
        if self.steps.is_none() {
            return;
        }
        match condition {
            Condition::Predicate(p) => self.record(p, StepOutcome::ShortCircuited),
            Condition::And(l, r) | Condition::Or(l, r) => {
                self.skip(l);
                self.skip(r);
            }
        }
    }

    fn record(&mut self, predicate: &Predicate, outcome: StepOutcome) {
        if let Some(steps) = self.steps.as_mut() {
            steps.push(EvaluationStep {
                clause: self.clause,
                predicate: predicate.to_string(),
                outcome,
            });
        }
    }

    fn fact(&self, metric: &str) -> Option<&'a FactValue> {
        self.facts.get(self.policy.resolve(metric))
    }

    fn predicate(&self, predicate: &Predicate) -> StepOutcome {
        match predicate {
            Predicate::Exists { metric } => match self.fact(metric) {
                Some(_) => StepOutcome::Matched,
                None => StepOutcome::NotMatched,
            },
            Predicate::Compare {
                metric,
                comparator,
                value,
            } => {
                let Some(left) = self.fact(metric) else {
                    return StepOutcome::MissingFact;
                };
                let right = match value {
                    Operand::Literal(lit) => Scalar::from_literal(lit),
                    Operand::Metric(other) => match self.fact(other) {
                        Some(fact) => match Scalar::from_fact(fact) {
                            Some(s) => s,
                            None => return StepOutcome::TypeMismatch,
                        },
                        None => return StepOutcome::MissingFact,
                    },
                };
                let Some(left) = Scalar::from_fact(left) else {
                    return StepOutcome::TypeMismatch;
                };
                match compare(left, *comparator, right) {
                    Some(true) => StepOutcome::Matched,
                    Some(false) => StepOutcome::NotMatched,
                    None => StepOutcome::TypeMismatch,
                }
            }
        }
    }
}

/// A comparable view over facts and literals.
#[derive(Debug, Clone, Copy)]
enum Scalar<'a> {
    Bool(bool),
    Number(f64),
    Text(&'a str),
    Duration(u64),
}

impl<'a> Scalar<'a> {
    fn from_fact(fact: &'a FactValue) -> Option<Self> {
        match fact {
            FactValue::Bool(b) => Some(Scalar::Bool(*b)),
            FactValue::Number(n) => Some(Scalar::Number(*n)),
            FactValue::Text(s) => Some(Scalar::Text(s)),
            FactValue::Duration { duration_ms } => Some(Scalar::Duration(*duration_ms)),
            FactValue::Other(_) => None,
        }
    }

    fn from_literal(lit: &'a Literal) -> Self {
        match lit {
            Literal::Bool(b) => Scalar::Bool(*b),
            Literal::Number(n) => Scalar::Number(*n),
            Literal::Text(s) => Scalar::Text(s),
            Literal::Duration(ms) => Scalar::Duration(*ms),
        }
    }
}

/// `None` means the two sides have different types.
fn compare(left: Scalar<'_>, comparator: Comparator, right: Scalar<'_>) -> Option<bool> {
    let ordering = match (left, right) {
        (Scalar::Number(a), Scalar::Number(b)) => a.partial_cmp(&b),
        (Scalar::Text(a), Scalar::Text(b)) => Some(a.cmp(b)),
        (Scalar::Duration(a), Scalar::Duration(b)) => Some(a.cmp(&b)),
        (Scalar::Bool(a), Scalar::Bool(b)) => {
            return Some(match comparator {
                Comparator::Eq => a == b,
                Comparator::Ne => a != b,
                _ => false,
            })
        }
        _ => return None,
    };
    // An unordered pair (NaN) satisfies no comparator, not even `!=`.
    Some(ordering.map_or(false, |ord| holds(comparator, ord)))
}

fn holds(comparator: Comparator, ord: Ordering) -> bool {
    match comparator {
        Comparator::Gt => ord == Ordering::Greater,
        Comparator::Ge => ord != Ordering::Less,
        Comparator::Lt => ord == Ordering::Less,
        Comparator::Le => ord != Ordering::Greater,
        Comparator::Eq => ord == Ordering::Equal,
        Comparator::Ne => ord != Ordering::Equal,
    }
}
