// definition.rs — The compiled, immutable policy model.
//
// A PolicyDefinition is produced only by `compile()` after the validator has
// accepted the AST. Fields are private: there is no setter and no way to
// build one from outside this crate, so a definition that exists has passed
// every language rule. A new version is a new object, never an edit.

use serde::{Deserialize, Serialize};

/// Where a policy applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Scope {
    Org,
    Project,
}

/// Declared policy mode. MONITOR may only warn or require approval;
/// ENFORCE may additionally block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Mode {
    Monitor,
    Enforce,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparator {
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
    Ne,
}

/// A literal value written in policy source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Literal {
    Number(f64),
    Text(String),
    Bool(bool),
    /// Milliseconds.
    Duration(u64),
}

/// Right-hand side of a comparison: a literal or another metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operand {
    Literal(Literal),
    Metric(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "predicate", rename_all = "snake_case")]
pub enum Predicate {
    Compare {
        metric: String,
        comparator: Comparator,
        value: Operand,
    },
    Exists {
        metric: String,
    },
}

/// Binary tree of predicates combined with AND / OR.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    Predicate(Predicate),
    And(Box<Condition>, Box<Condition>),
    Or(Box<Condition>, Box<Condition>),
}

impl Condition {
    /// Number of predicate leaves in this tree.
    pub fn predicate_count(&self) -> usize {
        match self {
            Condition::Predicate(_) => 1,
            Condition::And(l, r) | Condition::Or(l, r) => l.predicate_count() + r.predicate_count(),
        }
    }
}

/// The closed set of things a clause can do. Adding a variant here is a
/// compile error in every exhaustive match that handles actions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Warn(String),
    Block,
    RequireApproval,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clause {
    pub when: Condition,
    /// Actions in declaration order.
    pub then: Vec<Action>,
}

/// `metric <name> = <target>`, with `target` already resolved to a base
/// metric (never another alias).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricAlias {
    pub name: String,
    pub target: String,
}

/// A validated, compiled policy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolicyDefinition {
    name: String,
    version: u32,
    scope: Scope,
    mode: Mode,
    aliases: Vec<MetricAlias>,
    clauses: Vec<Clause>,
}

impl PolicyDefinition {
    pub(crate) fn new(
        name: String,
        version: u32,
        scope: Scope,
        mode: Mode,
        aliases: Vec<MetricAlias>,
        clauses: Vec<Clause>,
    ) -> Self {
        Self {
            name,
            version,
            scope,
            mode,
            aliases,
            clauses,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn aliases(&self) -> &[MetricAlias] {
        &self.aliases
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    /// Map a metric name through the alias table to the fact key to read.
    pub fn resolve<'a>(&'a self, metric: &'a str) -> &'a str {
        self.aliases
            .iter()
            .find(|a| a.name == metric)
            .map(|a| a.target.as_str())
            .unwrap_or(metric)
    }

    /// Whether any clause can produce a `Block`.
    pub fn can_block(&self) -> bool {
        self.clauses
            .iter()
            .any(|c| c.then.iter().any(|a| matches!(a, Action::Block)))
    }

    /// The canonical source text for this policy (see `canonical.rs`).
    pub fn canonical_source(&self) -> String {
        self.to_string()
    }
}
