
use std::fmt;

use ahash::AHashMap;
use colored::Colorize;
use imbl::Vector;

use crate::hc::*;
use crate::utility::*;
use crate::term::*;
use crate::level::*;
use crate::definition::*;

#[derive(Debug)]
pub enum DatabaseError {
    MetaAlreadySolved { meta: MetaId },
    UnknownMeta { meta: MetaId },
}

impl fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseError::MetaAlreadySolved { meta } => write!(f, "{} is already solved", meta),
            DatabaseError::UnknownMeta { meta } => write!(f, "{} does not exist", meta),
        }
    }
}

impl std::error::Error for DatabaseError { }

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaKind {
    Expression,
    /// Stands for an instance of the class; solved through the instance table.
    Instance { class: DefId },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetaState {
    Unsolved,
    Solved(Term),
}

#[derive(Debug, Clone)]
pub struct MetaData {
    pub name: Symbol,
    pub ty: Term,
    /// Bindings a solution may mention.
    pub scope: Vector<Var>,
    pub kind: MetaKind,
    pub state: MetaState,
    pub span: Span,
}

impl MetaData {
    pub fn solution(&self) -> Option<&Term> {
        match &self.state {
            MetaState::Solved(term) => Some(term),
            MetaState::Unsolved => None
        }
    }

    pub fn is_solved(&self) -> bool { matches!(self.state, MetaState::Solved(_)) }
}

#[derive(Debug)]
pub struct Database {
    pub term_data: HcFactory<TermData>,
    definitions: Vec<Definition>,
    names: Vec<Symbol>,
    instances: Vec<Instance>,
    metas: AHashMap<MetaId, MetaData>,
    next_var: usize,
    next_meta: usize,
    next_level: usize,
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}

impl Database {
    pub fn new() -> Database {
        Database {
            term_data: HcFactory::with_capacity(1024),
            definitions: Vec::new(),
            names: Vec::new(),
            instances: Vec::new(),
            metas: AHashMap::new(),
            next_var: 0,
            next_meta: 0,
            next_level: 0,
        }
    }

    pub fn make_term(&mut self, t: TermData) -> Term {
        self.term_data.make(t)
    }

    pub fn make_ref(&mut self, var: Var) -> Term {
        self.make_term(TermData::Ref { var })
    }

    pub fn make_universe(&mut self, sort: Sort) -> Term {
        self.make_term(TermData::Universe { sort })
    }

    pub fn make_error(&mut self, message: &str) -> Term {
        self.make_term(TermData::Error { message: Symbol::from(message), expr: None })
    }

    /// Non-dependent function type.
    pub fn make_arrow(&mut self, domain: Term, codomain: Term) -> Term {
        let var = self.fresh_var("_");
        self.make_term(TermData::Pi { mode: Mode::Explicit, var, domain, codomain })
    }

    pub fn fresh_var(&mut self, name: impl Into<Symbol>) -> Var {
        let id = self.next_var;
        self.next_var += 1;
        Var { id, name: name.into() }
    }

    /// A binding with the same name as `var` but a new identity.
    pub fn rename_var(&mut self, var: Var) -> Var {
        self.fresh_var(var.name)
    }

    pub fn fresh_level_var(&mut self, kind: LevelKind) -> LevelVar {
        let id = self.next_level;
        self.next_level += 1;
        LevelVar::Infer { id, kind }
    }

    /// Fresh inference variables `(?p, ?h)` used as a sort.
    pub fn fresh_sort(&mut self) -> Sort {
        let p = self.fresh_level_var(LevelKind::PLevel);
        let h = self.fresh_level_var(LevelKind::HLevel);
        Sort::new(Level::var(p), Level::var(h))
    }

    pub fn add_definition(&mut self, name: impl Into<Symbol>, def: Definition) -> DefId {
        let name = name.into();
        let index = self.definitions.len();
        self.definitions.push(def);
        self.names.push(name);
        DefId { index, name }
    }

    pub fn definition(&self, id: DefId) -> &Definition {
        &self.definitions[id.index]
    }

    pub fn set_definition(&mut self, id: DefId, def: Definition) {
        self.definitions[id.index] = def;
    }

    pub fn function(&self, id: DefId) -> Option<&FunctionDef> { self.definition(id).as_function() }

    pub fn function_mut(&mut self, id: DefId) -> Option<&mut FunctionDef> {
        match &mut self.definitions[id.index] {
            Definition::Function(def) => Some(def),
            _ => None
        }
    }

    pub fn data(&self, id: DefId) -> Option<&DataDef> { self.definition(id).as_data() }

    pub fn constructor(&self, id: DefId) -> Option<&ConstructorDef> { self.definition(id).as_constructor() }

    pub fn class(&self, id: DefId) -> Option<&ClassDef> { self.definition(id).as_class() }

    pub fn field(&self, id: DefId) -> Option<&FieldDef> { self.definition(id).as_field() }

    /// Most recent definition with the given name.
    pub fn lookup(&self, name: &str) -> Option<DefId> {
        self.names.iter()
            .enumerate()
            .rev()
            .find(|(_, n)| n.as_str() == name)
            .map(|(index, name)| DefId { index, name: *name })
    }

    pub fn add_instance(&mut self, instance: Instance) {
        self.instances.push(instance);
    }

    pub fn find_instance(&self, class: DefId, data: DefId) -> Option<Instance> {
        self.instances.iter()
            .rev()
            .find(|i| i.class == class && i.data == data)
            .copied()
    }

    pub fn fresh_meta(&mut self, name: impl Into<Symbol>, ty: Term, scope: Vector<Var>, kind: MetaKind, span: Span) -> MetaId {
        let id = MetaId::from(self.next_meta);
        self.next_meta += 1;
        let data = MetaData { name: name.into(), ty, scope, kind, state: MetaState::Unsolved, span };
        self.metas.insert(id, data);
        id
    }

    pub fn meta(&self, meta: MetaId) -> Option<&MetaData> {
        self.metas.get(&meta)
    }

    pub fn meta_solution(&self, meta: MetaId) -> Option<&Term> {
        self.metas.get(&meta).and_then(MetaData::solution)
    }

    pub fn solve_meta(&mut self, meta: MetaId, value: Term) -> Result<(), DatabaseError> {
        match self.metas.get_mut(&meta) {
            None => Err(DatabaseError::UnknownMeta { meta }),
            Some(MetaData { state: MetaState::Solved(_), .. }) => Err(DatabaseError::MetaAlreadySolved { meta }),
            Some(data) => {
                log::debug!("{} {} {}", meta, "solved to".green(), value);
                data.state = MetaState::Solved(value);
                Ok(())
            }
        }
    }

    pub fn unsolved_metas(&self) -> Vec<MetaId> {
        let mut result: Vec<_> = self.metas.iter()
            .filter(|(_, data)| !data.is_solved())
            .map(|(id, _)| *id)
            .collect();
        result.sort();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metas_are_solved_once() {
        let mut db = Database::new();
        let ty = db.make_universe(Sort::set(0));
        let meta = db.fresh_meta("x", ty.clone(), Vector::new(), MetaKind::Expression, (0, 0));
        assert!(db.solve_meta(meta, ty.clone()).is_ok());
        assert!(matches!(db.solve_meta(meta, ty), Err(DatabaseError::MetaAlreadySolved { .. })));
        assert!(db.unsolved_metas().is_empty());
    }

    #[test]
    fn lookup_finds_the_latest_definition() {
        let mut db = Database::new();
        let ty = db.make_universe(Sort::set(0));
        let make = || Definition::Function(FunctionDef {
            params: Telescope::empty(),
            result: ty.clone(),
            body: None,
            builtin: None,
            status: Status::Done
        });
        let first = db.add_definition("f", make());
        let second = db.add_definition("f", make());
        assert_ne!(first, second);
        assert_eq!(db.lookup("f"), Some(second));
        assert_eq!(db.lookup("g"), None);
    }
}
