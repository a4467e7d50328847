use std::fmt;

use crate::utility::*;
use crate::elim::BranchKey;

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub enum Pattern {
    Binding(Var),
    Constructor {
        key: BranchKey,
        args: Vec<Pattern>
    },
    /// Absurd pattern `()`.
    Empty,
}

impl Pattern {
    pub fn con(con: DefId, args: Vec<Pattern>) -> Pattern {
        Pattern::Constructor { key: BranchKey::Con(con), args }
    }

    pub fn tuple(args: Vec<Pattern>) -> Pattern {
        Pattern::Constructor { key: BranchKey::Tuple(args.len()), args }
    }

    pub fn is_binding(&self) -> bool { matches!(self, Pattern::Binding(_)) }

    pub fn constructor(&self) -> Option<DefId> {
        match self {
            Pattern::Constructor { key: BranchKey::Con(con), .. } => Some(*con),
            _ => None
        }
    }

    /// Binding variables in left-to-right order.
    pub fn vars(&self) -> Vec<Var> {
        let mut result = vec![];
        self.collect_vars(&mut result);
        result
    }

    fn collect_vars(&self, out: &mut Vec<Var>) {
        match self {
            Pattern::Binding(var) => out.push(*var),
            Pattern::Constructor { args, .. } => {
                for arg in args {
                    arg.collect_vars(out);
                }
            }
            Pattern::Empty => { }
        }
    }

    fn is_atomic(&self) -> bool {
        match self {
            Pattern::Binding(_) | Pattern::Empty => true,
            Pattern::Constructor { key: BranchKey::Tuple(_), .. } => true,
            Pattern::Constructor { args, .. } => args.is_empty(),
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Binding(var) => write!(f, "{}", var),
            Pattern::Empty => write!(f, "()"),
            Pattern::Constructor { key: BranchKey::Tuple(_), args } => {
                write!(f, "(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 { write!(f, ", ")? }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            Pattern::Constructor { key, args } => {
                write!(f, "{}", key)?;
                for arg in args {
                    if arg.is_atomic() { write!(f, " {}", arg)? }
                    else { write!(f, " ({})", arg)? }
                }
                Ok(())
            }
        }
    }
}

/// Renders a row of patterns the way a clause would be written, one column
/// per comma.
pub fn display_row(patterns: &[Pattern]) -> String {
    patterns.iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(id: usize, name: &str) -> Var { Var { id, name: Symbol::from(name) } }

    #[test]
    fn nested_constructors_are_parenthesised() {
        let suc = DefId { index: 1, name: Symbol::from("suc") };
        let zero = DefId { index: 0, name: Symbol::from("zero") };
        let p = Pattern::con(suc, vec![Pattern::con(suc, vec![Pattern::Binding(var(0, "n"))])]);
        assert_eq!(p.to_string(), "suc (suc n)");
        let row = vec![Pattern::con(zero, vec![]), p.clone()];
        assert_eq!(display_row(&row), "zero, suc (suc n)");
        assert_eq!(p.vars(), vec![var(0, "n")]);
    }

    #[test]
    fn top_level_columns_are_not_parenthesised() {
        let suc = DefId { index: 1, name: Symbol::from("suc") };
        let row = vec![Pattern::con(suc, vec![Pattern::Binding(var(0, "n"))])];
        assert_eq!(display_row(&row), "suc n");
        assert_eq!(display_row(&[]), "");
    }

    #[test]
    fn tuples_render_with_commas() {
        let p = Pattern::tuple(vec![Pattern::Binding(var(0, "a")), Pattern::Empty]);
        assert_eq!(p.to_string(), "(a, ())");
    }
}
