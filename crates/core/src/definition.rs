use std::fmt;

use crate::utility::*;
use crate::term::*;
use crate::level::Sort;
use crate::elim::ElimTree;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// The header is known but the body is still being elaborated.
    InProgress,
    Done,
    HasErrors,
}

/// Functions whose reduction has an extra rule on top of their body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    /// `coe A a i` reduces to `a` when `A` is a constant family.
    Coe,
}

#[derive(Debug, Clone)]
pub enum FunctionBody {
    Term(Term),
    Elim(ElimTree),
}

#[derive(Debug, Clone)]
pub struct FunctionDef {
    pub params: Telescope,
    pub result: Term,
    pub body: Option<FunctionBody>,
    pub builtin: Option<Builtin>,
    pub status: Status,
}

#[derive(Debug, Clone)]
pub struct DataDef {
    pub params: Telescope,
    pub sort: Sort,
    pub constructors: Vec<DefId>,
    /// Declared with `\truncated`: elimination is only allowed into types of
    /// at most the declared h-level.
    pub truncated: bool,
    /// The interval type; its two constructors are `left` and `right` in that order.
    pub interval: bool,
}

#[derive(Debug, Clone)]
pub struct ConstructorDef {
    pub data: DefId,
    /// Arguments after the data type parameters, in scope of the data parameters.
    pub params: Telescope,
    /// Number of interval dimensions the constructor introduces.
    pub intervals: usize,
}

#[derive(Debug, Clone)]
pub struct ClassDef {
    pub fields: Vec<DefId>,
    pub classifying_field: Option<DefId>,
    pub sort: Sort,
}

#[derive(Debug, Clone)]
pub struct FieldDef {
    pub class: DefId,
    /// Binds the instance in `ty`.
    pub this: Var,
    pub ty: Term,
}

#[derive(Debug, Clone)]
pub enum Definition {
    Function(FunctionDef),
    Data(DataDef),
    Constructor(ConstructorDef),
    Class(ClassDef),
    Field(FieldDef),
}

impl Definition {
    pub fn as_function(&self) -> Option<&FunctionDef> {
        match self {
            Definition::Function(def) => Some(def),
            _ => None
        }
    }

    pub fn as_data(&self) -> Option<&DataDef> {
        match self {
            Definition::Data(def) => Some(def),
            _ => None
        }
    }

    pub fn as_constructor(&self) -> Option<&ConstructorDef> {
        match self {
            Definition::Constructor(def) => Some(def),
            _ => None
        }
    }

    pub fn as_class(&self) -> Option<&ClassDef> {
        match self {
            Definition::Class(def) => Some(def),
            _ => None
        }
    }

    pub fn as_field(&self) -> Option<&FieldDef> {
        match self {
            Definition::Field(def) => Some(def),
            _ => None
        }
    }
}

impl fmt::Display for Definition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Definition::Function(def) => {
                write!(f, "\\func {} : {}", def.params, def.result)?;
                match &def.body {
                    Some(FunctionBody::Term(body)) => write!(f, " => {}", body),
                    Some(FunctionBody::Elim(tree)) => write!(f, " \\with\n{}", tree),
                    None => Ok(())
                }
            }
            Definition::Data(def) => {
                if def.truncated { write!(f, "\\truncated ")? }
                write!(f, "\\data {} : {} | ", def.params, def.sort)?;
                for (i, con) in def.constructors.iter().enumerate() {
                    if i > 0 { write!(f, " | ")? }
                    write!(f, "{}", con)?;
                }
                Ok(())
            }
            Definition::Constructor(def) => write!(f, "\\cons {} of {}", def.params, def.data),
            Definition::Class(def) => {
                write!(f, "\\class {{")?;
                for field in def.fields.iter() {
                    write!(f, " | {}", field)?;
                }
                write!(f, " }}")
            }
            Definition::Field(def) => write!(f, "\\field {} of {}", def.ty, def.class),
        }
    }
}

/// A registered instance: `fun` (a function without parameters) is the
/// instance of `class` whose classifying field is implemented by `data`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instance {
    pub class: DefId,
    pub data: DefId,
    pub fun: DefId,
}
