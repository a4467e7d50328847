
use cubix_core::prelude::*;

/// Expressions after name resolution: local names are `Var`s, global ones
/// are `DefId`s reserved in the database.
#[derive(Debug, Clone)]
pub enum Expr {
    Var {
        span: Span,
        var: Var
    },
    /// A function, data type, constructor, class or field.
    Def {
        span: Span,
        id: DefId
    },
    App {
        span: Span,
        head: Box<Expr>,
        args: Vec<(Mode, Expr)>
    },
    Lambda {
        span: Span,
        params: Vec<LambdaParam>,
        body: Box<Expr>
    },
    Pi {
        span: Span,
        params: Vec<Param>,
        codomain: Box<Expr>
    },
    Sigma {
        span: Span,
        params: Vec<Param>
    },
    Tuple {
        span: Span,
        fields: Vec<Expr>
    },
    Project {
        span: Span,
        tuple: Box<Expr>,
        field: usize
    },
    /// `\Type`, `\Set n` or `\Prop`. Without a sort it is `\Type \lp \lh` in
    /// a signature and a fresh sort anywhere else.
    Universe {
        span: Span,
        sort: Option<Sort>
    },
    Hole {
        span: Span
    },
    Number {
        span: Span,
        value: usize
    },
    Case {
        span: Span,
        args: Vec<CaseArg>,
        result: Option<Box<Expr>>,
        clauses: Vec<Clause>
    },
    /// `C { | f => e }`
    ClassExt {
        span: Span,
        class: DefId,
        impls: Vec<(DefId, Expr)>
    },
    /// `\new C { | f => e }`
    New {
        span: Span,
        class: DefId,
        impls: Vec<(DefId, Expr)>
    },
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::Var { span, .. }
            | Expr::Def { span, .. }
            | Expr::App { span, .. }
            | Expr::Lambda { span, .. }
            | Expr::Pi { span, .. }
            | Expr::Sigma { span, .. }
            | Expr::Tuple { span, .. }
            | Expr::Project { span, .. }
            | Expr::Universe { span, .. }
            | Expr::Hole { span }
            | Expr::Number { span, .. }
            | Expr::Case { span, .. }
            | Expr::ClassExt { span, .. }
            | Expr::New { span, .. } => *span
        }
    }

    pub fn var(var: Var) -> Expr { Expr::Var { span: (0, 0), var } }

    pub fn def(id: DefId) -> Expr { Expr::Def { span: (0, 0), id } }

    pub fn number(value: usize) -> Expr { Expr::Number { span: (0, 0), value } }

    pub fn universe(sort: Option<Sort>) -> Expr { Expr::Universe { span: (0, 0), sort } }

    pub fn hole() -> Expr { Expr::Hole { span: (0, 0) } }

    /// Explicit application.
    pub fn apply(head: Expr, args: Vec<Expr>) -> Expr {
        let span = args.last().map_or(head.span(), |last| (head.span().0, last.span().1));
        Expr::App { span, head: Box::new(head), args: args.into_iter().map(|a| (Mode::Explicit, a)).collect() }
    }

    pub fn arrow(domain: Expr, codomain: Expr, var: Var) -> Expr {
        let span = (domain.span().0, codomain.span().1);
        let param = Param { span: domain.span(), mode: Mode::Explicit, var, ty: domain };
        Expr::Pi { span, params: vec![param], codomain: Box::new(codomain) }
    }

    pub fn with_span(mut self, new_span: Span) -> Expr {
        match &mut self {
            Expr::Var { span, .. }
            | Expr::Def { span, .. }
            | Expr::App { span, .. }
            | Expr::Lambda { span, .. }
            | Expr::Pi { span, .. }
            | Expr::Sigma { span, .. }
            | Expr::Tuple { span, .. }
            | Expr::Project { span, .. }
            | Expr::Universe { span, .. }
            | Expr::Hole { span }
            | Expr::Number { span, .. }
            | Expr::Case { span, .. }
            | Expr::ClassExt { span, .. }
            | Expr::New { span, .. } => *span = new_span
        }
        self
    }
}

#[derive(Debug, Clone)]
pub struct Param {
    pub span: Span,
    pub mode: Mode,
    pub var: Var,
    pub ty: Expr
}

impl Param {
    pub fn explicit(var: Var, ty: Expr) -> Param {
        Param { span: ty.span(), mode: Mode::Explicit, var, ty }
    }

    pub fn implicit(var: Var, ty: Expr) -> Param {
        Param { span: ty.span(), mode: Mode::Implicit, var, ty }
    }
}

/// A lambda binder; without a type the domain is inferred.
#[derive(Debug, Clone)]
pub struct LambdaParam {
    pub mode: Mode,
    pub var: Var,
    pub ty: Option<Expr>
}

/// `\case e \as x : T`
#[derive(Debug, Clone)]
pub struct CaseArg {
    pub expr: Expr,
    pub var: Option<Var>,
    pub ty: Option<Expr>
}

#[derive(Debug, Clone)]
pub enum Pat {
    Var(Var),
    Con {
        span: Span,
        con: DefId,
        args: Vec<Pat>
    },
    Tuple {
        span: Span,
        fields: Vec<Pat>
    },
    /// `()`
    Absurd {
        span: Span
    },
    /// Sugar for `suc (.. zero)`.
    Number {
        span: Span,
        value: usize
    },
}

impl Pat {
    pub fn con(con: DefId, args: Vec<Pat>) -> Pat { Pat::Con { span: (0, 0), con, args } }

    pub fn span(&self) -> Option<Span> {
        match self {
            Pat::Var(_) => None,
            Pat::Con { span, .. }
            | Pat::Tuple { span, .. }
            | Pat::Absurd { span }
            | Pat::Number { span, .. } => Some(*span)
        }
    }
}

#[derive(Debug, Clone)]
pub struct Clause {
    pub span: Span,
    pub patterns: Vec<Pat>,
    /// Absent for clauses with an absurd pattern.
    pub body: Option<Expr>
}

impl Clause {
    pub fn new(span: Span, patterns: Vec<Pat>, body: Option<Expr>) -> Clause {
        Clause { span, patterns, body }
    }
}

#[derive(Debug, Clone)]
pub enum BodyExpr {
    Term(Expr),
    /// `\elim x y` lists the eliminated parameters; without a list every
    /// explicit parameter is matched.
    Elim {
        elim: Option<Vec<Var>>,
        clauses: Vec<Clause>
    },
    Abstract,
}

#[derive(Debug, Clone)]
pub struct FunctionDecl {
    pub span: Span,
    pub id: DefId,
    pub params: Vec<Param>,
    pub result: Option<Expr>,
    pub body: BodyExpr
}

#[derive(Debug, Clone)]
pub struct ConstructorDecl {
    pub span: Span,
    pub id: DefId,
    pub params: Vec<Param>
}

#[derive(Debug, Clone)]
pub struct DataDecl {
    pub span: Span,
    pub id: DefId,
    pub params: Vec<Param>,
    pub sort: Option<Sort>,
    pub truncated: bool,
    pub constructors: Vec<ConstructorDecl>
}

#[derive(Debug, Clone)]
pub struct FieldDecl {
    pub span: Span,
    pub id: DefId,
    pub ty: Expr
}

/// Field types may mention earlier fields applied to `this`.
#[derive(Debug, Clone)]
pub struct ClassDecl {
    pub span: Span,
    pub id: DefId,
    pub this: Var,
    pub fields: Vec<FieldDecl>,
    pub classifying: Option<DefId>,
    pub sort: Option<Sort>
}
