
use std::{ops, fmt, hash, cmp};
use internment::Intern;

/// Source offsets `(start, end)` of the syntax a term or clause came from.
pub type Span = (usize, usize);

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub struct Symbol(Intern<String>);

impl From<&str> for Symbol {
    fn from(s: &str) -> Self { Symbol(Intern::new(s.to_string())) }
}

impl From<String> for Symbol {
    fn from(s: String) -> Self { Symbol(Intern::new(s)) }
}

impl ops::Deref for Symbol {
    type Target = String;
    fn deref(&self) -> &Self::Target { self.0.deref() }
}

impl Default for Symbol {
    fn default() -> Self { Self::from("_") }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_str().fmt(f)
    }
}

/// A binding. The `id` is unique per database, the name is only for display.
#[derive(Debug, Clone, Copy)]
pub struct Var {
    pub id: usize,
    pub name: Symbol,
}

impl PartialEq for Var {
    fn eq(&self, other: &Self) -> bool { self.id == other.id }
}
impl Eq for Var { }

impl hash::Hash for Var {
    fn hash<H: hash::Hasher>(&self, state: &mut H) { self.id.hash(state) }
}

impl PartialOrd for Var {
    fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> { Some(self.cmp(other)) }
}

impl Ord for Var {
    fn cmp(&self, other: &Self) -> cmp::Ordering { self.id.cmp(&other.id) }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.name.fmt(f)
    }
}

/// Handle of a definition in the database.
#[derive(Debug, Clone, Copy)]
pub struct DefId {
    pub index: usize,
    pub name: Symbol,
}

impl PartialEq for DefId {
    fn eq(&self, other: &Self) -> bool { self.index == other.index }
}
impl Eq for DefId { }

impl hash::Hash for DefId {
    fn hash<H: hash::Hasher>(&self, state: &mut H) { self.index.hash(state) }
}

impl PartialOrd for DefId {
    fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> { Some(self.cmp(other)) }
}

impl Ord for DefId {
    fn cmp(&self, other: &Self) -> cmp::Ordering { self.index.cmp(&other.index) }
}

impl fmt::Display for DefId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.name.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct MetaId(usize);

impl ops::Deref for MetaId {
    type Target = usize;

    fn deref(&self) -> &Self::Target {
        let MetaId(result) = self;
        result
    }
}

impl From<usize> for MetaId {
    fn from(value: usize) -> Self { MetaId(value) }
}

impl fmt::Display for MetaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "?{}", self.0)
    }
}

#[derive(Debug, Hash, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Mode {
    Explicit,
    Implicit
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Explicit => write!(f, "Explicit"),
            Mode::Implicit => write!(f, "Implicit")
        }
    }
}

/// Direction of a comparison. `Le` reads "left is a subtype of right".
#[derive(Debug, Hash, Clone, Copy, PartialEq, Eq)]
pub enum Cmp {
    Le,
    Eq,
    Ge
}

impl Cmp {
    pub fn flip(self) -> Cmp {
        match self {
            Cmp::Le => Cmp::Ge,
            Cmp::Eq => Cmp::Eq,
            Cmp::Ge => Cmp::Le,
        }
    }
}

impl fmt::Display for Cmp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cmp::Le => write!(f, "<="),
            Cmp::Eq => write!(f, "=="),
            Cmp::Ge => write!(f, ">="),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vars_compare_by_identity() {
        let x = Var { id: 0, name: Symbol::from("x") };
        let also_x = Var { id: 1, name: Symbol::from("x") };
        assert_ne!(x, also_x);
        assert_eq!(x.to_string(), also_x.to_string());
    }

    #[test]
    fn flipping_twice_is_identity() {
        for cmp in [Cmp::Le, Cmp::Eq, Cmp::Ge] {
            assert_eq!(cmp.flip().flip(), cmp);
        }
    }
}
