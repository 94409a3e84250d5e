// canonical.rs — Canonical source rendering.
//
// `Display` on the compiled model prints policy source in one fixed shape:
// metadata in grammar order, one alias per line, one clause per line,
// upper-case AND/OR and only the parentheses needed to keep the tree shape.
// Compiling the output again yields an equal PolicyDefinition.

use std::fmt;

use crate::definition::{
    Action, Clause, Comparator, Condition, Literal, Mode, Operand, PolicyDefinition, Predicate,
    Scope,
};

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Org => write!(f, "ORG"),
            Scope::Project => write!(f, "PROJECT"),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Monitor => write!(f, "MONITOR"),
            Mode::Enforce => write!(f, "ENFORCE"),
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Comparator::Gt => ">",
            Comparator::Ge => ">=",
            Comparator::Lt => "<",
            Comparator::Le => "<=",
            Comparator::Eq => "==",
            Comparator::Ne => "!=",
        };
        f.write_str(symbol)
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // f64 Display is the shortest text that parses back to the same value.
            Literal::Number(n) => write!(f, "{}", n),
            Literal::Text(s) => write_quoted(f, s),
            Literal::Bool(b) => write!(f, "{}", b),
            Literal::Duration(ms) => write_duration(f, *ms),
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Literal(lit) => lit.fmt(f),
            Operand::Metric(name) => f.write_str(name),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Compare {
                metric,
                comparator,
                value,
            } => write!(f, "{} {} {}", metric, comparator, value),
            Predicate::Exists { metric } => write!(f, "exists({})", metric),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Predicate(p) => p.fmt(f),
            Condition::And(l, r) => {
                write_grouped(f, l, matches!(**l, Condition::Or(..)))?;
                f.write_str(" AND ")?;
                write_grouped(f, r, !matches!(**r, Condition::Predicate(_)))
            }
            Condition::Or(l, r) => {
                write_grouped(f, l, false)?;
                f.write_str(" OR ")?;
                write_grouped(f, r, matches!(**r, Condition::Or(..)))
            }
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Warn(message) => {
                f.write_str("warn ")?;
                write_quoted(f, message)
            }
            Action::Block => f.write_str("block"),
            Action::RequireApproval => f.write_str("require_approval"),
        }
    }
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "when {} then ", self.when)?;
        for (i, action) in self.then.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            action.fmt(f)?;
        }
        Ok(())
    }
}

impl fmt::Display for PolicyDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "policy {} version {} scope {} mode {}",
            self.name(),
            self.version(),
            self.scope(),
            self.mode()
        )?;
        for alias in self.aliases() {
            writeln!(f, "metric {} = {}", alias.name, alias.target)?;
        }
        for clause in self.clauses() {
            writeln!(f, "{}", clause)?;
        }
        Ok(())
    }
}

fn write_grouped(f: &mut fmt::Formatter<'_>, cond: &Condition, parens: bool) -> fmt::Result {
    if parens {
        write!(f, "({})", cond)
    } else {
        write!(f, "{}", cond)
    }
}

fn write_quoted(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    f.write_str("\"")?;
    for c in s.chars() {
        match c {
            '"' => f.write_str("\\\"")?,
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            '\t' => f.write_str("\\t")?,
            other => write!(f, "{}", other)?,
        }
    }
    f.write_str("\"")
}

/// Largest unit that represents the value exactly.
fn write_duration(f: &mut fmt::Formatter<'_>, ms: u64) -> fmt::Result {
    const UNITS: &[(u64, &str)] = &[
        (86_400_000, "d"),
        (3_600_000, "h"),
        (60_000, "m"),
        (1_000, "s"),
    ];
    for (factor, unit) in UNITS {
        if ms != 0 && ms % factor == 0 {
            return write!(f, "{}{}", ms / factor, unit);
        }
    }
    write!(f, "{}ms", ms)
}

#[cfg(test)]
mod tests {
    use crate::compile;

    #[test]
    fn canonical_form_normalizes_layout() {
        let source = r#"
            policy Latency   mode MONITOR version 3
            when p99 > 90000ms and (region == "eu" or region == "us")
            then warn "slow";require_approval
        "#;
        let policy = compile(source).unwrap();
        assert_eq!(
            policy.canonical_source(),
            "policy Latency version 3 scope PROJECT mode MONITOR\n\
             when p99 > 90s AND (region == \"eu\" OR region == \"us\") then warn \"slow\"; require_approval\n"
        );
    }

    #[test]
    fn canonical_form_round_trips() {
        let sources = [
            "policy A version 1 scope ORG mode ENFORCE; when a > 1 AND b < 2 AND c == true then block",
            "policy B version 2 scope PROJECT mode MONITOR; when a > 1 AND (b < 2 AND c != 3) then warn \"x\"",
            "policy C version 7 scope ORG mode MONITOR; metric spend = finance.monthly_spend\n\
             when (spend >= 10 OR exists(override)) AND age <= 2h then warn \"quoted \\\"text\\\"\"",
            "policy D version 1 mode ENFORCE; when a_or_else > -0.25 OR b >= 1500ms OR c == \"z\" then require_approval; block",
        ];
        for source in sources {
            let first = compile(source).unwrap();
            let second = compile(&first.canonical_source()).unwrap();
            assert_eq!(first, second, "round trip changed {}", source);
            assert_eq!(first.canonical_source(), second.canonical_source());
        }
    }
}
