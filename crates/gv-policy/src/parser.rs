// parser.rs — Recursive-descent parser producing a PolicyAst.
//
// Grammar:
//
//   Policy    := "policy" Name Meta* (Alias | Clause)+
//   Meta      := "version" Int | "scope" ("ORG"|"PROJECT") | "mode" ("MONITOR"|"ENFORCE")
//   Alias     := "metric" Name "=" Metric
//   Clause    := "when" Or "then" Action (";"? Action)*
//   Or        := And ("OR" And)*
//   And       := Primary ("AND" Primary)*
//   Primary   := "(" Or ")" | "exists" "(" Metric ")" | Metric Comparator Value
//   Action    := "warn" String | "block" | "require_approval"
//
// `;` is accepted as an optional separator anywhere between items.
//
// Parsing is total: it returns an AST or the first syntax error. Recursion
// only happens through parentheses, which are capped at MAX_GROUP_DEPTH, and
// every list is capped, so the parser's work and memory stay linear in the
// (already size-capped) token stream.

use tracing::{instrument, Level};

use crate::ast::{
    ActionNode, AliasNode, ClauseNode, ConditionNode, ForbiddenClass, ForbiddenNode, PolicyAst,
    Spanned, ValueNode,
};
use crate::definition::{Comparator, Literal, Mode, Scope};
use crate::error::{Location, SyntaxError};
use crate::lexer::{tokenize, Token, TokenKind};

pub const MAX_CLAUSES: usize = 256;
pub const MAX_PREDICATES_PER_CLAUSE: usize = 64;
pub const MAX_ACTIONS_PER_CLAUSE: usize = 16;
pub const MAX_GROUP_DEPTH: usize = 16;
pub const MAX_ALIASES: usize = 64;

/// Words that can never be used as metric names.
const RESERVED: &[&str] = &["policy", "metric", "when", "then", "exists", "and", "or"];

/// Parse policy source into an AST.
#[instrument(level = Level::TRACE, skip(source))]
pub fn parse(source: &str) -> Result<PolicyAst, SyntaxError> {
    let tokens = tokenize(source)?;
    Parser::new(tokens).policy()
}

/// Where a forbidden construct was found; decides which tokens end it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Context {
    Statement,
    Action,
    Condition,
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    predicates: usize,
    depth: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            predicates: 0,
            depth: 0,
        }
    }

    // ── Token helpers ──

    fn peek(&self) -> &Token {
        // tokenize() always ends the stream with Eof, and advance() never
        // moves past it.
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_nth(&self, n: usize) -> &TokenKind {
        let idx = (self.pos + n).min(self.tokens.len() - 1);
        &self.tokens[idx].kind
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        matches!(&self.peek().kind, TokenKind::Ident(w) if w == keyword)
    }

    fn at_and(&self) -> bool {
        matches!(&self.peek().kind, TokenKind::Ident(w) if w.eq_ignore_ascii_case("and"))
    }

    fn at_or(&self) -> bool {
        matches!(&self.peek().kind, TokenKind::Ident(w) if w.eq_ignore_ascii_case("or"))
    }

    fn skip_separators(&mut self) {
        while self.peek().kind == TokenKind::Semicolon {
            self.advance();
        }
    }

    fn unexpected(&self, expected: &str) -> SyntaxError {
        let token = self.peek();
        SyntaxError::new(
            token.location,
            format!("expected {}, found {}", expected, token.kind.describe()),
        )
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<Location, SyntaxError> {
        if self.at_keyword(keyword) {
            Ok(self.advance().location)
        } else {
            Err(self.unexpected(&format!("'{}'", keyword)))
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Location, SyntaxError> {
        if self.peek().kind == kind {
            Ok(self.advance().location)
        } else {
            Err(self.unexpected(&kind.describe()))
        }
    }

    /// An identifier usable as a policy or metric name.
    fn expect_name(&mut self, what: &str) -> Result<Spanned<String>, SyntaxError> {
        match &self.peek().kind {
            TokenKind::Ident(w) if !is_reserved(w) => {
                let token = self.advance();
                let TokenKind::Ident(name) = token.kind else {
                    return Err(self.unexpected(what));
                };
                Ok(Spanned::new(name, token.location))
            }
            _ => Err(self.unexpected(what)),
        }
    }

    // ── Policy ──

    fn policy(mut self) -> Result<PolicyAst, SyntaxError> {
        self.skip_separators();
        self.expect_keyword("policy")?;
        let name = self.expect_name("a policy name")?;

        let mut ast = PolicyAst {
            name,
            version: None,
            scope: None,
            mode: None,
            aliases: Vec::new(),
            clauses: Vec::new(),
            forbidden: Vec::new(),
        };
        self.metadata(&mut ast)?;

        loop {
            self.skip_separators();
            let token = self.peek().clone();
            match &token.kind {
                TokenKind::Eof => break,
                TokenKind::Ident(w) if w == "when" => {
                    if ast.clauses.len() == MAX_CLAUSES {
                        return Err(SyntaxError::new(
                            token.location,
                            format!("a policy may declare at most {} clauses", MAX_CLAUSES),
                        ));
                    }
                    let clause = self.clause()?;
                    ast.clauses.push(clause);
                }
                TokenKind::Ident(w) if w == "metric" => {
                    let alias = self.alias(&ast.aliases)?;
                    ast.aliases.push(alias);
                }
                TokenKind::Ident(w) => match ForbiddenClass::of_keyword(w) {
                    Some(class) => {
                        let node = self.forbidden(class, Context::Statement);
                        ast.forbidden.push(node);
                    }
                    None => return Err(self.unexpected("'when' or 'metric'")),
                },
                _ => return Err(self.unexpected("'when' or 'metric'")),
            }
        }

        if ast.clauses.is_empty() && ast.forbidden.is_empty() {
            return Err(self.unexpected("at least one 'when' clause"));
        }
        Ok(ast)
    }

    fn metadata(&mut self, ast: &mut PolicyAst) -> Result<(), SyntaxError> {
        loop {
            self.skip_separators();
            let token = self.peek().clone();
            let TokenKind::Ident(field) = &token.kind else {
                return Ok(());
            };
            match field.as_str() {
                "version" => {
                    if ast.version.is_some() {
                        return Err(duplicate(&token, "version"));
                    }
                    self.advance();
                    ast.version = Some(self.version_value()?);
                }
                "scope" => {
                    if ast.scope.is_some() {
                        return Err(duplicate(&token, "scope"));
                    }
                    self.advance();
                    let location = self.peek().location;
                    let scope = match &self.peek().kind {
                        TokenKind::Ident(w) if w.eq_ignore_ascii_case("org") => Scope::Org,
                        TokenKind::Ident(w) if w.eq_ignore_ascii_case("project") => Scope::Project,
                        _ => return Err(self.unexpected("ORG or PROJECT")),
                    };
                    self.advance();
                    ast.scope = Some(Spanned::new(scope, location));
                }
                "mode" => {
                    if ast.mode.is_some() {
                        return Err(duplicate(&token, "mode"));
                    }
                    self.advance();
                    let location = self.peek().location;
                    let mode = match &self.peek().kind {
                        TokenKind::Ident(w) if w.eq_ignore_ascii_case("monitor") => Mode::Monitor,
                        TokenKind::Ident(w) if w.eq_ignore_ascii_case("enforce") => Mode::Enforce,
                        _ => return Err(self.unexpected("MONITOR or ENFORCE")),
                    };
                    self.advance();
                    ast.mode = Some(Spanned::new(mode, location));
                }
                _ => return Ok(()),
            }
        }
    }

    fn version_value(&mut self) -> Result<Spanned<i64>, SyntaxError> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Number(n) if n.is_finite() && n.fract() == 0.0 => {
                self.advance();
                // `as` saturates; out-of-range values are rejected by the validator.
                Ok(Spanned::new(n as i64, token.location))
            }
            _ => Err(self.unexpected("an integer version")),
        }
    }

    fn alias(&mut self, existing: &[AliasNode]) -> Result<AliasNode, SyntaxError> {
        let location = self.expect_keyword("metric")?;
        if existing.len() == MAX_ALIASES {
            return Err(SyntaxError::new(
                location,
                format!("a policy may declare at most {} metric aliases", MAX_ALIASES),
            ));
        }
        let name = self.expect_name("a metric alias name")?;
        if existing.iter().any(|a| a.name.value == name.value) {
            return Err(SyntaxError::new(
                name.location,
                format!("metric '{}' is declared more than once", name.value),
            ));
        }
        self.expect(TokenKind::Assign)?;
        let target = self.expect_name("a metric name")?;
        Ok(AliasNode { name, target })
    }

    // ── Clauses ──

    fn clause(&mut self) -> Result<ClauseNode, SyntaxError> {
        let location = self.expect_keyword("when")?;
        self.predicates = 0;
        self.depth = 0;
        let condition = self.or_expr()?;
        self.expect_keyword("then")?;

        let mut actions = vec![self.action()?];
        loop {
            self.skip_separators();
            if !self.at_action_start() {
                break;
            }
            if actions.len() == MAX_ACTIONS_PER_CLAUSE {
                return Err(SyntaxError::new(
                    self.peek().location,
                    format!(
                        "a clause may declare at most {} actions",
                        MAX_ACTIONS_PER_CLAUSE
                    ),
                ));
            }
            actions.push(self.action()?);
        }

        Ok(ClauseNode {
            location,
            condition,
            actions,
        })
    }

    fn at_action_start(&self) -> bool {
        match &self.peek().kind {
            TokenKind::Ident(w) => {
                matches!(w.as_str(), "warn" | "block" | "require_approval")
                    || ForbiddenClass::of_keyword(w).is_some()
            }
            _ => false,
        }
    }

    fn action(&mut self) -> Result<ActionNode, SyntaxError> {
        let token = self.peek().clone();
        let TokenKind::Ident(word) = &token.kind else {
            return Err(self.unexpected("an action (warn, block or require_approval)"));
        };
        match word.as_str() {
            "warn" => {
                self.advance();
                match self.peek().kind.clone() {
                    TokenKind::Str(message) => {
                        self.advance();
                        Ok(ActionNode::Warn {
                            message,
                            location: token.location,
                        })
                    }
                    _ => Err(self.unexpected("a quoted warning message")),
                }
            }
            "block" => {
                self.advance();
                Ok(ActionNode::Block {
                    location: token.location,
                })
            }
            "require_approval" => {
                self.advance();
                Ok(ActionNode::RequireApproval {
                    location: token.location,
                })
            }
            other => match ForbiddenClass::of_keyword(other) {
                Some(class) => Ok(ActionNode::Forbidden(self.forbidden(class, Context::Action))),
                None => Err(SyntaxError::new(
                    token.location,
                    format!(
                        "unknown action '{}' (expected warn, block or require_approval)",
                        other
                    ),
                )),
            },
        }
    }

    // ── Conditions ──

    fn or_expr(&mut self) -> Result<ConditionNode, SyntaxError> {
        let mut left = self.and_expr()?;
        while self.at_or() {
            self.advance();
            let right = self.and_expr()?;
            left = ConditionNode::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<ConditionNode, SyntaxError> {
        let mut left = self.primary()?;
        while self.at_and() {
            self.advance();
            let right = self.primary()?;
            left = ConditionNode::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn primary(&mut self) -> Result<ConditionNode, SyntaxError> {
        let token = self.peek().clone();
        match &token.kind {
            TokenKind::LParen => {
                if self.depth == MAX_GROUP_DEPTH {
                    return Err(SyntaxError::new(
                        token.location,
                        format!(
                            "conditions may nest at most {} parentheses deep",
                            MAX_GROUP_DEPTH
                        ),
                    ));
                }
                self.depth += 1;
                self.advance();
                let inner = self.or_expr()?;
                self.expect(TokenKind::RParen)?;
                self.depth -= 1;
                Ok(inner)
            }
            TokenKind::Ident(w) if w == "exists" && *self.peek_nth(1) == TokenKind::LParen => {
                self.count_predicate(token.location)?;
                self.advance();
                self.advance();
                let metric = self.expect_name("a metric name")?;
                self.expect(TokenKind::RParen)?;
                Ok(ConditionNode::Exists { metric })
            }
            TokenKind::Ident(w) if *self.peek_nth(1) == TokenKind::LParen => {
                // Any other call syntax is an attempt to run something.
                let class = ForbiddenClass::of_keyword(w).unwrap_or(ForbiddenClass::Execution);
                Ok(ConditionNode::Forbidden(
                    self.forbidden(class, Context::Condition),
                ))
            }
            TokenKind::Ident(w)
                if ForbiddenClass::of_keyword(w) == Some(ForbiddenClass::ControlFlow) =>
            {
                Ok(ConditionNode::Forbidden(self.forbidden(
                    ForbiddenClass::ControlFlow,
                    Context::Condition,
                )))
            }
            TokenKind::Ident(_) => {
                self.count_predicate(token.location)?;
                let metric = self.expect_name("a metric name")?;
                let comparator = self.comparator()?;
                let value = self.value()?;
                Ok(ConditionNode::Compare {
                    metric,
                    comparator,
                    value,
                })
            }
            _ => Err(self.unexpected("a condition")),
        }
    }

    fn count_predicate(&mut self, location: Location) -> Result<(), SyntaxError> {
        self.predicates += 1;
        if self.predicates > MAX_PREDICATES_PER_CLAUSE {
            return Err(SyntaxError::new(
                location,
                format!(
                    "a condition may contain at most {} predicates",
                    MAX_PREDICATES_PER_CLAUSE
                ),
            ));
        }
        Ok(())
    }

    fn comparator(&mut self) -> Result<Comparator, SyntaxError> {
        let comparator = match self.peek().kind {
            TokenKind::Gt => Comparator::Gt,
            TokenKind::Ge => Comparator::Ge,
            TokenKind::Lt => Comparator::Lt,
            TokenKind::Le => Comparator::Le,
            TokenKind::EqEq => Comparator::Eq,
            TokenKind::NotEq => Comparator::Ne,
            TokenKind::Assign => {
                return Err(SyntaxError::new(
                    self.peek().location,
                    "assignment is not allowed in conditions; use '==' to compare",
                ))
            }
            _ => return Err(self.unexpected("a comparator (>, >=, <, <=, ==, !=)")),
        };
        self.advance();
        Ok(comparator)
    }

    fn value(&mut self) -> Result<ValueNode, SyntaxError> {
        let token = self.peek().clone();
        let value = match token.kind {
            TokenKind::Number(n) => ValueNode::Literal(Literal::Number(n)),
            TokenKind::Duration(ms) => ValueNode::Literal(Literal::Duration(ms)),
            TokenKind::Str(s) => ValueNode::Literal(Literal::Text(s)),
            TokenKind::Ident(ref w) if w == "true" => ValueNode::Literal(Literal::Bool(true)),
            TokenKind::Ident(ref w) if w == "false" => ValueNode::Literal(Literal::Bool(false)),
            TokenKind::Ident(ref w) if !is_reserved(w) => {
                ValueNode::Metric(Spanned::new(w.clone(), token.location))
            }
            _ => return Err(self.unexpected("a value")),
        };
        self.advance();
        Ok(value)
    }

    // ── Forbidden constructs ──

    /// Record a forbidden construct and skip past it.
    ///
    /// Skipping is a linear scan that tracks bracket depth so a construct's
    /// body cannot swallow the rest of the policy.
    fn forbidden(&mut self, class: ForbiddenClass, context: Context) -> ForbiddenNode {
        let token = self.advance();
        let keyword = match token.kind {
            TokenKind::Ident(w) => w,
            other => other.describe(),
        };

        let mut depth = 0usize;
        loop {
            let kind = &self.peek().kind;
            if *kind == TokenKind::Eof {
                break;
            }
            if depth == 0 && ends_construct(kind, context) {
                break;
            }
            match kind {
                TokenKind::LParen | TokenKind::LBrace => depth += 1,
                TokenKind::RParen | TokenKind::RBrace => depth = depth.saturating_sub(1),
                _ => {}
            }
            self.advance();
        }

        ForbiddenNode {
            class,
            keyword,
            location: token.location,
        }
    }
}

fn ends_construct(kind: &TokenKind, context: Context) -> bool {
    match kind {
        TokenKind::Semicolon => true,
        TokenKind::RParen => context == Context::Condition,
        TokenKind::Ident(w) => {
            let w = w.as_str();
            match context {
                Context::Statement => matches!(w, "when" | "metric"),
                Context::Action => {
                    matches!(w, "when" | "metric" | "warn" | "block" | "require_approval")
                }
                Context::Condition => {
                    matches!(w, "when" | "metric" | "then")
                        || w.eq_ignore_ascii_case("and")
                        || w.eq_ignore_ascii_case("or")
                }
            }
        }
        _ => false,
    }
}

fn is_reserved(word: &str) -> bool {
    RESERVED.iter().any(|r| r.eq_ignore_ascii_case(word))
}

fn duplicate(token: &Token, field: &str) -> SyntaxError {
    SyntaxError::new(
        token.location,
        format!("'{}' is declared more than once", field),
    )
}
