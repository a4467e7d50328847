use std::fmt;

use crate::utility::*;
use crate::term::*;

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum BranchKey {
    Con(DefId),
    /// The single shape of a Sigma type with the given number of fields.
    Tuple(usize),
}

impl fmt::Display for BranchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BranchKey::Con(con) => write!(f, "{}", con),
            BranchKey::Tuple(arity) => write!(f, "tuple/{}", arity),
        }
    }
}

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum Endpoint {
    Left,
    Right
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Left => write!(f, "left"),
            Endpoint::Right => write!(f, "right"),
        }
    }
}

/// Bodies for the two endpoints of one interval parameter. Both bodies live in
/// the scope of the enclosing `Interval` parameters.
#[derive(Debug, Clone, Hash, PartialEq, Eq, Default)]
pub struct IntervalCase {
    pub left: Option<Term>,
    pub right: Option<Term>,
}

impl IntervalCase {
    pub fn get(&self, endpoint: Endpoint) -> Option<&Term> {
        match endpoint {
            Endpoint::Left => self.left.as_ref(),
            Endpoint::Right => self.right.as_ref(),
        }
    }

    pub fn is_empty(&self) -> bool { self.left.is_none() && self.right.is_none() }
}

/// Compiled pattern matching. `params` of a node bind the next arguments in
/// order; a `Branch` then inspects one more argument and replaces it by the
/// constructor's arguments. `Interval` only occurs at the root: its cases
/// belong to the last `cases.len()` parameters and `otherwise` is applied to
/// the same arguments from scratch.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub enum ElimTree {
    Leaf {
        params: Telescope,
        body: Term
    },
    Branch {
        params: Telescope,
        children: Vec<(BranchKey, ElimTree)>
    },
    Interval {
        params: Telescope,
        cases: Vec<IntervalCase>,
        otherwise: Option<Box<ElimTree>>
    },
}

impl ElimTree {
    pub fn params(&self) -> &Telescope {
        match self {
            ElimTree::Leaf { params, .. }
            | ElimTree::Branch { params, .. }
            | ElimTree::Interval { params, .. } => params
        }
    }

    pub fn child(&self, key: BranchKey) -> Option<&ElimTree> {
        match self {
            ElimTree::Branch { children, .. } => children.iter()
                .find(|(k, _)| match (k, key) {
                    (BranchKey::Tuple(_), BranchKey::Tuple(_)) => true,
                    (k, key) => *k == key
                })
                .map(|(_, tree)| tree),
            _ => None
        }
    }

    pub fn keys(&self) -> Vec<BranchKey> {
        match self {
            ElimTree::Branch { children, .. } => children.iter().map(|(k, _)| *k).collect(),
            _ => vec![]
        }
    }

    pub fn is_interval(&self) -> bool { matches!(self, ElimTree::Interval { .. }) }

    /// Every term stored in the tree, in no particular scope.
    pub fn terms(&self) -> Vec<&Term> {
        let mut result = vec![];
        self.collect_terms(&mut result);
        result
    }

    fn collect_terms<'a>(&'a self, out: &mut Vec<&'a Term>) {
        out.extend(self.params().iter().map(|link| &link.ty));
        match self {
            ElimTree::Leaf { body, .. } => out.push(body),
            ElimTree::Branch { children, .. } => {
                for (_, child) in children {
                    child.collect_terms(out);
                }
            }
            ElimTree::Interval { cases, otherwise, .. } => {
                for case in cases {
                    out.extend(case.left.iter());
                    out.extend(case.right.iter());
                }
                if let Some(otherwise) = otherwise {
                    otherwise.collect_terms(out);
                }
            }
        }
    }

    fn fmt_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let pad = "  ".repeat(depth);
        match self {
            ElimTree::Leaf { params, body } => writeln!(f, "{}[{}] => {}", pad, params, body),
            ElimTree::Branch { params, children } => {
                writeln!(f, "{}[{}] branch", pad, params)?;
                for (key, child) in children {
                    writeln!(f, "{}| {}", pad, key)?;
                    child.fmt_indented(f, depth + 1)?;
                }
                Ok(())
            }
            ElimTree::Interval { params, cases, otherwise } => {
                writeln!(f, "{}[{}] interval", pad, params)?;
                for case in cases {
                    let show = |t: &Option<Term>| t.as_ref().map_or("-".to_string(), |t| t.to_string());
                    writeln!(f, "{}| left => {}, right => {}", pad, show(&case.left), show(&case.right))?;
                }
                if let Some(otherwise) = otherwise {
                    writeln!(f, "{}otherwise", pad)?;
                    otherwise.fmt_indented(f, depth + 1)?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for ElimTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_indented(f, 0)
    }
}
