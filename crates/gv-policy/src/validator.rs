// validator.rs — Semantic checks that turn a PolicyAst into a PolicyDefinition.
//
// Unlike syntax errors, semantic problems do not stop the walk: every
// violation in the policy is collected so the author sees all of them at
// once. A definition is only built when the list is empty.

use std::collections::{HashMap, HashSet};

use crate::ast::{ActionNode, ConditionNode, ForbiddenClass, ForbiddenNode, PolicyAst, ValueNode};
use crate::definition::{
    Action, Clause, Condition, MetricAlias, Mode, Operand, PolicyDefinition, Predicate, Scope,
};
use crate::error::{CompileErrors, Diagnostic, ErrorCode};

/// Validate a parsed policy.
pub fn validate(ast: PolicyAst) -> Result<PolicyDefinition, CompileErrors> {
    let mut v = Validator {
        diagnostics: Vec::new(),
        resolved: HashMap::new(),
        mode: ast.mode.as_ref().map(|m| m.value),
    };

    let version = v.check_version(&ast);
    if ast.mode.is_none() {
        v.report(
            ErrorCode::MissingMode,
            ast.name.location,
            format!("policy '{}' does not declare a mode", ast.name.value),
        );
    }

    for node in &ast.forbidden {
        v.forbidden(node);
    }

    let aliases = v.resolve_aliases(&ast);

    let mut clauses = Vec::with_capacity(ast.clauses.len());
    for clause in &ast.clauses {
        let when = v.lower_condition(&clause.condition);
        let then: Vec<Action> = clause
            .actions
            .iter()
            .filter_map(|a| v.lower_action(a))
            .collect();
        if let Some(when) = when {
            clauses.push(Clause { when, then });
        }
    }

    match (version, v.mode) {
        (Some(version), Some(mode)) if v.diagnostics.is_empty() => Ok(PolicyDefinition::new(
            ast.name.value,
            version,
            ast.scope.map(|s| s.value).unwrap_or(Scope::Project),
            mode,
            aliases,
            clauses,
        )),
        _ => Err(CompileErrors::new(v.diagnostics)),
    }
}

struct Validator {
    diagnostics: Vec<Diagnostic>,
    /// Alias name -> base metric, for aliases that resolved cleanly.
    resolved: HashMap<String, String>,
    mode: Option<Mode>,
}

impl Validator {
    fn report(
        &mut self,
        code: ErrorCode,
        location: crate::error::Location,
        message: impl Into<String>,
    ) {
        self.diagnostics.push(Diagnostic::new(code, location, message));
    }

    fn check_version(&mut self, ast: &PolicyAst) -> Option<u32> {
        match &ast.version {
            None => {
                self.report(
                    ErrorCode::MissingVersion,
                    ast.name.location,
                    format!("policy '{}' does not declare a version", ast.name.value),
                );
                None
            }
            Some(v) => match u32::try_from(v.value) {
                Ok(version) if version > 0 => Some(version),
                _ => {
                    self.report(
                        ErrorCode::MissingVersion,
                        v.location,
                        format!(
                            "version must be a positive integer no larger than {}, got {}",
                            u32::MAX,
                            v.value
                        ),
                    );
                    None
                }
            },
        }
    }

    fn forbidden(&mut self, node: &ForbiddenNode) {
        let what = match node.class {
            ForbiddenClass::Execution => "execution primitives are not allowed",
            ForbiddenClass::ControlFlow => "loops and control flow are not allowed",
            ForbiddenClass::SideEffect => "side-effecting operations are not allowed",
            ForbiddenClass::Definition => "function definitions are not allowed",
        };
        self.report(
            node.class.code(),
            node.location,
            format!("'{}': {}", node.keyword, what),
        );
    }

    /// Resolve every alias to a base metric. Chains are followed; a chain
    /// that revisits a name is a self-reference.
    fn resolve_aliases(&mut self, ast: &PolicyAst) -> Vec<MetricAlias> {
        let targets: HashMap<&str, &str> = ast
            .aliases
            .iter()
            .map(|a| (a.name.value.as_str(), a.target.value.as_str()))
            .collect();

        let mut out = Vec::with_capacity(ast.aliases.len());
        for alias in &ast.aliases {
            let mut seen: HashSet<&str> = HashSet::new();
            let mut current = alias.name.value.as_str();
            let mut cyclic = false;
            while let Some(next) = targets.get(current) {
                if !seen.insert(current) {
                    cyclic = true;
                    break;
                }
                current = next;
            }
            if cyclic {
                self.report(
                    ErrorCode::SelfReference,
                    alias.name.location,
                    format!("metric alias '{}' refers back to itself", alias.name.value),
                );
                continue;
            }
            self.resolved
                .insert(alias.name.value.clone(), current.to_string());
            out.push(MetricAlias {
                name: alias.name.value.clone(),
                target: current.to_string(),
            });
        }
        out
    }

    fn base_metric<'a>(&'a self, name: &'a str) -> &'a str {
        self.resolved.get(name).map(String::as_str).unwrap_or(name)
    }

    fn lower_condition(&mut self, node: &ConditionNode) -> Option<Condition> {
        match node {
            ConditionNode::Compare {
                metric,
                comparator,
                value,
            } => {
                let value = match value {
                    ValueNode::Literal(lit) => Operand::Literal(lit.clone()),
                    ValueNode::Metric(other) => {
                        if self.base_metric(&metric.value) == self.base_metric(&other.value) {
                            self.report(
                                ErrorCode::SelfReference,
                                metric.location,
                                format!(
                                    "'{}' is compared with itself through '{}'",
                                    metric.value, other.value
                                ),
                            );
                        }
                        Operand::Metric(other.value.clone())
                    }
                };
                Some(Condition::Predicate(Predicate::Compare {
                    metric: metric.value.clone(),
                    comparator: *comparator,
                    value,
                }))
            }
            ConditionNode::Exists { metric } => Some(Condition::Predicate(Predicate::Exists {
                metric: metric.value.clone(),
            })),
            ConditionNode::And(l, r) => {
                let l = self.lower_condition(l);
                let r = self.lower_condition(r);
                Some(Condition::And(Box::new(l?), Box::new(r?)))
            }
            ConditionNode::Or(l, r) => {
                let l = self.lower_condition(l);
                let r = self.lower_condition(r);
                Some(Condition::Or(Box::new(l?), Box::new(r?)))
            }
            ConditionNode::Forbidden(f) => {
                self.forbidden(f);
                None
            }
        }
    }

    fn lower_action(&mut self, node: &ActionNode) -> Option<Action> {
        match node {
            ActionNode::Warn { message, .. } => Some(Action::Warn(message.clone())),
            ActionNode::RequireApproval { .. } => Some(Action::RequireApproval),
            ActionNode::Block { location } => {
                if self.mode == Some(Mode::Monitor) {
                    self.report(
                        ErrorCode::BlockOutsideEnforce,
                        *location,
                        "'block' is only allowed in ENFORCE mode policies",
                    );
                }
                Some(Action::Block)
            }
            ActionNode::Forbidden(f) => {
                self.forbidden(f);
                None
            }
        }
    }
}
