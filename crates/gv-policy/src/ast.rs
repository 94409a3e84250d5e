// ast.rs — Parsed (not yet validated) policy structure.
//
// The AST keeps source locations on every node so the validator can point at
// the offending text. Constructs the language forbids are parsed into
// `Forbidden` nodes instead of failing the parse, which lets the validator
// report each one with its specific error code.

use crate::definition::{Comparator, Literal, Mode, Scope};
use crate::error::{ErrorCode, Location};

#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    pub value: T,
    pub location: Location,
}

impl<T> Spanned<T> {
    pub fn new(value: T, location: Location) -> Self {
        Self { value, location }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PolicyAst {
    pub name: Spanned<String>,
    /// Metadata fields are optional at parse time; the validator decides
    /// which absences are errors.
    pub version: Option<Spanned<i64>>,
    pub scope: Option<Spanned<Scope>>,
    pub mode: Option<Spanned<Mode>>,
    pub aliases: Vec<AliasNode>,
    pub clauses: Vec<ClauseNode>,
    /// Forbidden constructs found at statement level (outside clauses).
    pub forbidden: Vec<ForbiddenNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AliasNode {
    pub name: Spanned<String>,
    pub target: Spanned<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClauseNode {
    pub location: Location,
    pub condition: ConditionNode,
    pub actions: Vec<ActionNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConditionNode {
    Compare {
        metric: Spanned<String>,
        comparator: Comparator,
        value: ValueNode,
    },
    Exists {
        metric: Spanned<String>,
    },
    And(Box<ConditionNode>, Box<ConditionNode>),
    Or(Box<ConditionNode>, Box<ConditionNode>),
    Forbidden(ForbiddenNode),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValueNode {
    Literal(Literal),
    Metric(Spanned<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActionNode {
    Warn {
        message: String,
        location: Location,
    },
    Block {
        location: Location,
    },
    RequireApproval {
        location: Location,
    },
    Forbidden(ForbiddenNode),
}

/// Which language rule a forbidden construct breaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForbiddenClass {
    Execution,
    ControlFlow,
    SideEffect,
    Definition,
}

impl ForbiddenClass {
    pub fn code(&self) -> ErrorCode {
        match self {
            ForbiddenClass::Execution => ErrorCode::ExecutionPrimitive,
            ForbiddenClass::ControlFlow => ErrorCode::ControlFlow,
            ForbiddenClass::SideEffect => ErrorCode::SideEffect,
            ForbiddenClass::Definition => ErrorCode::FunctionDefinition,
        }
    }

    /// Classify a keyword, if it names a forbidden construct.
    pub fn of_keyword(word: &str) -> Option<ForbiddenClass> {
        const EXECUTION: &[&str] = &[
            "execute", "exec", "eval", "run", "spawn", "shell", "system", "invoke", "import",
            "load",
        ];
        const CONTROL_FLOW: &[&str] = &[
            "while", "for", "loop", "do", "if", "else", "goto", "repeat", "until", "break",
            "continue", "return", "foreach",
        ];
        const SIDE_EFFECT: &[&str] = &[
            "call", "webhook", "http", "fetch", "send", "post", "write", "notify", "email", "emit",
            "set", "assign", "delete", "update",
        ];
        const DEFINITION: &[&str] = &[
            "function",
            "fn",
            "def",
            "procedure",
            "proc",
            "macro",
            "lambda",
        ];

        let lower = word.to_ascii_lowercase();
        let word = lower.as_str();
        if EXECUTION.contains(&word) {
            Some(ForbiddenClass::Execution)
        } else if CONTROL_FLOW.contains(&word) {
            Some(ForbiddenClass::ControlFlow)
        } else if SIDE_EFFECT.contains(&word) {
            Some(ForbiddenClass::SideEffect)
        } else if DEFINITION.contains(&word) {
            Some(ForbiddenClass::Definition)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForbiddenNode {
    pub class: ForbiddenClass,
    /// The keyword or callee that introduced the construct.
    pub keyword: String,
    pub location: Location,
}
