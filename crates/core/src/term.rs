
use std::fmt;
use std::rc::Rc;

use crate::hc::*;
use crate::utility::*;
use crate::level::Sort;
use crate::elim::ElimTree;

pub type Term = Hc<TermData>;

#[derive(Debug, Hash, Clone, PartialEq, Eq)]
pub enum TermData {
    Ref {
        var: Var
    },
    Lambda {
        mode: Mode,
        var: Var,
        domain: Term,
        body: Term
    },
    Pi {
        mode: Mode,
        var: Var,
        domain: Term,
        codomain: Term
    },
    Sigma {
        params: Telescope
    },
    Tuple {
        fields: Vec<Term>,
        sigma: Term
    },
    Project {
        tuple: Term,
        field: usize
    },
    Universe {
        sort: Sort
    },
    App {
        fun: Term,
        arg: Term
    },
    FunCall {
        fun: DefId,
        levels: Sort,
        args: Vec<Term>
    },
    ConCall {
        con: DefId,
        levels: Sort,
        data_args: Vec<Term>,
        args: Vec<Term>
    },
    DataCall {
        data: DefId,
        levels: Sort,
        args: Vec<Term>
    },
    /// Implementations are kept sorted by field.
    ClassCall {
        class: DefId,
        levels: Sort,
        impls: Vec<(DefId, Term)>
    },
    FieldCall {
        field: DefId,
        levels: Sort,
        arg: Term
    },
    New {
        class_call: Term
    },
    Case {
        args: Vec<Term>,
        params: Telescope,
        result: Term,
        tree: ElimTree
    },
    Infer {
        meta: MetaId
    },
    Error {
        message: Symbol,
        expr: Option<Term>
    },
}

impl TermData {
    pub fn is_atomic(&self) -> bool {
        match self {
            TermData::Ref { .. }
            | TermData::Tuple { .. }
            | TermData::Project { .. }
            | TermData::Infer { .. }
            | TermData::Error { .. } => true,
            TermData::Universe { sort } => sort.is_closed(),
            TermData::FunCall { args, .. }
            | TermData::DataCall { args, .. } => args.is_empty(),
            TermData::ConCall { args, .. } => args.is_empty(),
            TermData::ClassCall { impls, .. } => impls.is_empty(),
            TermData::FieldCall { .. } => true,
            TermData::Lambda { .. }
            | TermData::Pi { .. }
            | TermData::Sigma { .. }
            | TermData::App { .. }
            | TermData::New { .. }
            | TermData::Case { .. } => false,
        }
    }

    pub fn is_error(&self) -> bool { matches!(self, TermData::Error { .. }) }

    pub fn as_meta(&self) -> Option<MetaId> {
        match self {
            TermData::Infer { meta } => Some(*meta),
            _ => None
        }
    }

    pub fn as_universe(&self) -> Option<Sort> {
        match self {
            TermData::Universe { sort } => Some(*sort),
            _ => None
        }
    }

    pub fn is_class_call(&self) -> bool { matches!(self, TermData::ClassCall { .. }) }

    /// Implementation of `field` inside a class call.
    pub fn implementation(&self, field: DefId) -> Option<&Term> {
        match self {
            TermData::ClassCall { impls, .. } => impls.iter()
                .find(|(f, _)| *f == field)
                .map(|(_, t)| t),
            _ => None
        }
    }
}

struct Arg<'a>(&'a Term);

impl fmt::Display for Arg<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_atomic() { write!(f, "{}", self.0) }
        else { write!(f, "({})", self.0) }
    }
}

fn write_args(f: &mut fmt::Formatter<'_>, args: &[Term]) -> fmt::Result {
    for arg in args {
        write!(f, " {}", Arg(arg))?;
    }
    Ok(())
}

impl fmt::Display for TermData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TermData::Ref { var } => write!(f, "{}", var),
            TermData::Lambda { mode, var, domain, body } => match mode {
                Mode::Explicit => write!(f, "\\lam ({} : {}) => {}", var, domain, body),
                Mode::Implicit => write!(f, "\\lam {{{} : {}}} => {}", var, domain, body),
            },
            TermData::Pi { mode, var, domain, codomain } => match mode {
                Mode::Explicit => write!(f, "\\Pi ({} : {}) -> {}", var, domain, codomain),
                Mode::Implicit => write!(f, "\\Pi {{{} : {}}} -> {}", var, domain, codomain),
            },
            TermData::Sigma { params } => {
                write!(f, "\\Sigma")?;
                for link in params.iter() {
                    write!(f, " ({} : {})", link.var, link.ty)?;
                }
                Ok(())
            }
            TermData::Tuple { fields, .. } => {
                write!(f, "(")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 { write!(f, ", ")? }
                    write!(f, "{}", field)?;
                }
                write!(f, ")")
            }
            TermData::Project { tuple, field } => write!(f, "{}.{}", Arg(tuple), field + 1),
            TermData::Universe { sort } => write!(f, "{}", sort),
            TermData::App { fun, arg } => {
                if matches!(**fun, TermData::App { .. }) || fun.is_atomic() {
                    write!(f, "{} {}", fun, Arg(arg))
                } else {
                    write!(f, "({}) {}", fun, Arg(arg))
                }
            }
            TermData::FunCall { fun, args, .. } => {
                write!(f, "{}", fun)?;
                write_args(f, args)
            }
            TermData::ConCall { con, args, .. } => {
                write!(f, "{}", con)?;
                write_args(f, args)
            }
            TermData::DataCall { data, args, .. } => {
                write!(f, "{}", data)?;
                write_args(f, args)
            }
            TermData::ClassCall { class, impls, .. } => {
                write!(f, "{}", class)?;
                if !impls.is_empty() {
                    write!(f, " {{")?;
                    for (field, value) in impls {
                        write!(f, " | {} => {}", field, value)?;
                    }
                    write!(f, " }}")?;
                }
                Ok(())
            }
            TermData::FieldCall { field, arg, .. } => write!(f, "{}.{}", Arg(arg), field),
            TermData::New { class_call } => write!(f, "\\new {}", class_call),
            TermData::Case { args, result, .. } => {
                write!(f, "\\case")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 { write!(f, ",")? }
                    write!(f, " {}", arg)?;
                }
                write!(f, " \\return {} \\with {{..}}", result)
            }
            TermData::Infer { meta } => write!(f, "{}", meta),
            TermData::Error { message, .. } => write!(f, "{{?error: {}}}", message),
        }
    }
}

/// A persistent, singly linked telescope. Prefix edits copy the prefix and share
/// the untouched tail.
#[derive(Debug, Clone, Hash, PartialEq, Eq, Default)]
pub struct Telescope(Option<Rc<Link>>);

#[derive(Debug, Hash, PartialEq, Eq)]
pub struct Link {
    pub mode: Mode,
    pub var: Var,
    pub ty: Term,
    pub next: Telescope,
}

impl Telescope {
    pub fn empty() -> Telescope { Telescope(None) }

    pub fn cons(mode: Mode, var: Var, ty: Term, next: Telescope) -> Telescope {
        Telescope(Some(Rc::new(Link { mode, var, ty, next })))
    }

    /// Explicit bindings in order.
    pub fn from_links(links: Vec<(Var, Term)>) -> Telescope {
        links.into_iter()
            .rev()
            .fold(Telescope::empty(), |next, (var, ty)| Telescope::cons(Mode::Explicit, var, ty, next))
    }

    pub fn from_params(params: Vec<(Mode, Var, Term)>) -> Telescope {
        params.into_iter()
            .rev()
            .fold(Telescope::empty(), |next, (mode, var, ty)| Telescope::cons(mode, var, ty, next))
    }

    pub fn first(&self) -> Option<&Link> { self.0.as_deref() }

    pub fn is_empty(&self) -> bool { self.0.is_none() }

    pub fn iter(&self) -> TelescopeIter<'_> { TelescopeIter { current: self.first() } }

    pub fn len(&self) -> usize { self.iter().count() }

    pub fn vars(&self) -> Vec<Var> { self.iter().map(|link| link.var).collect() }

    pub fn to_vec(&self) -> Vec<(Var, Term)> {
        self.iter().map(|link| (link.var, link.ty.clone())).collect()
    }

    pub fn to_params(&self) -> Vec<(Mode, Var, Term)> {
        self.iter().map(|link| (link.mode, link.var, link.ty.clone())).collect()
    }

    pub fn get(&self, index: usize) -> Option<&Link> { self.iter().nth(index) }

    /// The telescope after its first `n` links. Shares structure.
    pub fn skip(&self, n: usize) -> Telescope {
        let mut result = self.clone();
        for _ in 0..n {
            result = match result.first() {
                Some(link) => link.next.clone(),
                None => break
            };
        }
        result
    }

    /// `self` followed by `tail`; only the links of `self` are copied.
    pub fn append(&self, tail: &Telescope) -> Telescope {
        self.to_params()
            .into_iter()
            .rev()
            .fold(tail.clone(), |next, (mode, var, ty)| Telescope::cons(mode, var, ty, next))
    }

    /// True when both telescopes share the same allocation.
    pub fn ptr_eq(&self, other: &Telescope) -> bool {
        match (&self.0, &other.0) {
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            (None, None) => true,
            _ => false
        }
    }
}

pub struct TelescopeIter<'a> {
    current: Option<&'a Link>,
}

impl<'a> Iterator for TelescopeIter<'a> {
    type Item = &'a Link;

    fn next(&mut self) -> Option<Self::Item> {
        let link = self.current?;
        self.current = link.next.first();
        Some(link)
    }
}

impl fmt::Display for Telescope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, link) in self.iter().enumerate() {
            if i > 0 { write!(f, " ")? }
            match link.mode {
                Mode::Explicit => write!(f, "({} : {})", link.var, link.ty)?,
                Mode::Implicit => write!(f, "{{{} : {}}}", link.var, link.ty)?,
            }
        }
        Ok(())
    }
}
