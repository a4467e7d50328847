
use ahash::AHashMap;
use colored::Colorize;
use if_chain::if_chain;
use imbl::Vector;

use cubix_core::prelude::*;
use crate::compare::compare;
use crate::config::ElabConfig;
use crate::elim::*;
use crate::equations::Equations;
use crate::error::*;
use crate::levels::LevelSolution;
use crate::syntax::*;

#[derive(Debug, Clone, Default)]
pub struct Context {
    pub vars: Vector<Var>,
    pub types: Vector<Term>,
}

impl Context {
    pub fn new() -> Context { Context::default() }

    pub fn bind(&self, var: Var, ty: Term) -> Context {
        let mut result = self.clone();
        result.vars.push_back(var);
        result.types.push_back(ty);
        result
    }

    pub fn lookup(&self, var: Var) -> Option<&Term> {
        let index = self.vars.iter().rposition(|v| *v == var)?;
        self.types.get(index)
    }

    pub fn len(&self) -> usize { self.vars.len() }

    pub fn is_empty(&self) -> bool { self.vars.is_empty() }
}

/// Elaborates resolved declarations one at a time. Every definition gets its
/// own equation store, solved before the definition is stored.
pub struct Elaborator<'a> {
    db: &'a mut Database,
    lib: &'a CoreLibrary,
    config: ElabConfig,
    reporter: &'a mut dyn ErrorReporter,
    eqs: Equations,
    /// Inside a signature `\Type` means `\Type \lp \lh`.
    signature: bool,
    /// The class whose fields are being elaborated.
    current_class: Option<DefId>,
    errors: usize,
}

impl<'a> Elaborator<'a> {
    pub fn new(db: &'a mut Database, lib: &'a CoreLibrary, reporter: &'a mut dyn ErrorReporter) -> Self {
        Elaborator {
            db,
            lib,
            config: ElabConfig::default(),
            reporter,
            eqs: Equations::new(),
            signature: false,
            current_class: None,
            errors: 0,
        }
    }

    pub fn with_config(mut self, config: ElabConfig) -> Self {
        self.config = config;
        self
    }

    pub fn database(&mut self) -> &mut Database { self.db }

    pub fn fresh_var(&mut self, name: &str) -> Var { self.db.fresh_var(name) }

    pub fn declare_function(&mut self, name: &str) -> DefId {
        let result = self.db.make_error("declared");
        self.db.add_definition(name, Definition::Function(FunctionDef {
            params: Telescope::empty(),
            result,
            body: None,
            builtin: None,
            status: Status::InProgress
        }))
    }

    pub fn declare_data(&mut self, name: &str, constructors: &[&str]) -> (DefId, Vec<DefId>) {
        let header = |constructors| Definition::Data(DataDef {
            params: Telescope::empty(),
            sort: Sort::SET0,
            constructors,
            truncated: false,
            interval: false
        });
        let data = self.db.add_definition(name, header(vec![]));
        let ids: Vec<DefId> = constructors.iter()
            .map(|c| self.db.add_definition(*c, Definition::Constructor(ConstructorDef {
                data,
                params: Telescope::empty(),
                intervals: 0
            })))
            .collect();
        self.db.set_definition(data, header(ids.clone()));
        (data, ids)
    }

    pub fn declare_class(&mut self, name: &str, fields: &[&str]) -> (DefId, Vec<DefId>) {
        let class = self.db.add_definition(name, Definition::Class(ClassDef {
            fields: vec![],
            classifying_field: None,
            sort: Sort::SET0
        }));
        let this = self.db.fresh_var("this");
        let ids: Vec<DefId> = fields.iter()
            .map(|f| {
                let ty = self.db.make_error("declared");
                self.db.add_definition(*f, Definition::Field(FieldDef { class, this, ty }))
            })
            .collect();
        self.db.set_definition(class, Definition::Class(ClassDef {
            fields: ids.clone(),
            classifying_field: None,
            sort: Sort::SET0
        }));
        (class, ids)
    }

    fn begin(&mut self) {
        self.eqs = Equations::new();
        self.errors = 0;
        self.signature = false;
    }

    /// Solves the session's equations and forwards their diagnostics.
    fn finish(&mut self) -> LevelSolution {
        let solution = self.eqs.solve(self.db);
        log::debug!("{} {:?}", "levels".green(), solution.map());
        for error in self.eqs.take_errors() {
            self.report(error);
        }
        solution
    }

    fn conclude(&mut self, id: DefId) -> Result<DefId, CubixError> {
        if self.errors == 0 {
            log::info!("{} {}", id, "elaborated".green());
            Ok(id)
        } else {
            log::info!("{} {} {}", id, "has errors:".red(), self.errors);
            Err(CubixError::Definition { name: id.name, errors: self.errors })
        }
    }

    fn report(&mut self, error: ElabError) {
        if !error.is_warning() { self.errors += 1 }
        self.reporter.report(error);
    }

    fn fail(&mut self, error: ElabError) -> Term {
        let message = error.to_string();
        self.report(error);
        self.db.make_error(&message)
    }

    fn fail_pair(&mut self, error: ElabError) -> (Term, Term) {
        let term = self.fail(error);
        (term.clone(), term)
    }

    fn mismatch(&mut self, span: Span, expected: &Term, actual: &Term) -> ElabError {
        let expected = zonk(self.db, &AHashMap::new(), expected);
        let actual = zonk(self.db, &AHashMap::new(), actual);
        ElabError::mismatch(span, expected, actual)
    }

    fn zonk(&mut self, levels: &LevelSolution, term: &Term) -> Term {
        zonk(self.db, levels.map(), term)
    }

    fn zonk_telescope(&mut self, levels: &LevelSolution, tele: &Telescope) -> Telescope {
        let s = Subst::zonking().with_levels(levels.map());
        subst_telescope(self.db, &s, tele).0
    }

    fn zonk_tree(&mut self, levels: &LevelSolution, tree: &ElimTree) -> ElimTree {
        let s = Subst::zonking().with_levels(levels.map());
        subst_tree(self.db, &s, tree)
    }

    fn bind(&mut self, ctx: &Context, var: Var, ty: Term) -> Context {
        self.eqs.bind(var, ty.clone());
        ctx.bind(var, ty)
    }

    fn fresh_meta(&mut self, ctx: &Context, name: &str, ty: Term, span: Span) -> Term {
        self.eqs.fresh_meta(self.db, name, ty, ctx.vars.clone(), MetaKind::Expression, span)
    }

    fn fresh_type(&mut self, ctx: &Context, span: Span) -> Term {
        let sort = self.eqs.fresh_sort(self.db);
        let universe = self.db.make_universe(sort);
        self.fresh_meta(ctx, "T", universe, span)
    }

    /// An implicit argument; class-typed ones are left to instance search.
    fn implicit_arg(&mut self, ctx: &Context, var: Var, ty: Term, span: Span) -> Term {
        let head = whnf(self.db, &ty);
        let kind = match &*head {
            TermData::ClassCall { class, .. } if self.db.class(*class).and_then(|c| c.classifying_field).is_some() =>
                MetaKind::Instance { class: *class },
            _ => MetaKind::Expression
        };
        self.eqs.fresh_meta(self.db, &var.name, ty, ctx.vars.clone(), kind, span)
    }

    fn universe_sort(&mut self, sort: Option<Sort>) -> Sort {
        match sort {
            Some(sort) => sort,
            None if self.signature => Sort::std(),
            None => self.eqs.fresh_sort(self.db)
        }
    }

    /// Least sort above all of `sorts`, through a fresh one when the maximum
    /// needs two different variables.
    fn max_sort(&mut self, sorts: &[Sort], span: Span) -> Sort {
        let direct = sorts.iter().try_fold(Sort::prop(), |acc, s| acc.max(s));
        if let Some(sort) = direct { return sort }
        let fresh = self.eqs.fresh_sort(self.db);
        self.eqs.levels.set_span(span);
        for sort in sorts {
            sort.compare(&fresh, Cmp::Le, &mut self.eqs.levels);
        }
        fresh
    }

    fn pi_sort(&mut self, domain: &Sort, codomain: &Sort, span: Span) -> Sort {
        match pi_sort(domain, codomain) {
            Some(sort) => sort,
            None => self.max_sort(&[Sort::new(domain.p, codomain.h), *codomain], span)
        }
    }

    fn sort_of(&mut self, ty: &Term) -> Option<Sort> {
        sort_of_in(self.db, self.eqs.typing_context(), ty)
    }

    fn is_interval(&mut self, ty: &Term) -> bool {
        let ty = whnf(self.db, ty);
        match &*ty {
            TermData::DataCall { data, .. } => self.db.data(*data).map_or(false, |d| d.interval),
            _ => false
        }
    }

    /// Elaborates `expr` as a type and returns its sort.
    fn infer_type(&mut self, ctx: &Context, expr: &Expr) -> (Term, Sort) {
        let (term, ty) = self.infer(ctx, expr);
        let ty = whnf(self.db, &ty);
        if let Some(sort) = ty.as_universe() { return (term, sort) }
        if ty.is_error() { return (term, Sort::SET0) }
        let sort = self.eqs.fresh_sort(self.db);
        let universe = self.db.make_universe(sort);
        if compare(self.db, &mut self.eqs, &ty, &universe, Cmp::Le, expr.span()) {
            (term, sort)
        } else {
            let error = self.mismatch(expr.span(), &universe, &ty);
            (self.fail(error), sort)
        }
    }

    fn elaborate_params(&mut self, ctx: &Context, params: &[Param]) -> (Vec<(Mode, Var, Term)>, Context, Vec<Sort>) {
        let mut ctx = ctx.clone();
        let mut result = Vec::with_capacity(params.len());
        let mut sorts = Vec::with_capacity(params.len());
        for param in params {
            let (ty, sort) = self.infer_type(&ctx, &param.ty);
            ctx = self.bind(&ctx, param.var, ty.clone());
            result.push((param.mode, param.var, ty));
            sorts.push(sort);
        }
        (result, ctx, sorts)
    }

    fn check(&mut self, ctx: &Context, expr: &Expr, expected: &Term) -> Term {
        let (red_zone, grow) = (self.config.stack_red_zone, self.config.stack_grow);
        stacker::maybe_grow(red_zone, grow, || self.check_inner(ctx, expr, expected))
    }

    fn check_inner(&mut self, ctx: &Context, expr: &Expr, expected: &Term) -> Term {
        let ty = whnf(self.db, expected);
        log::trace!("{} {}", "check against".bright_blue(), ty);
        match (expr, &*ty) {
            (Expr::Lambda { span, params, body }, TermData::Pi { .. }) =>
                self.check_lambda(ctx, *span, params, body, &ty),
            (Expr::Tuple { span, fields }, TermData::Sigma { params }) => {
                let params = params.clone();
                self.check_tuple(ctx, *span, fields, &params, &ty)
            }
            (Expr::Hole { span }, _) => self.fresh_meta(ctx, "_", expected.clone(), *span),
            (Expr::Case { span, args, result, clauses }, _) =>
                self.elaborate_case(ctx, *span, args, result.as_deref(), clauses, Some(expected)).0,
            _ => {
                let span = expr.span();
                let (term, actual) = self.infer(ctx, expr);
                let (term, actual) = self.insert_implicits(ctx, span, term, actual, &ty);
                if compare(self.db, &mut self.eqs, &actual, expected, Cmp::Le, span) { term }
                else {
                    let error = self.mismatch(span, expected, &actual);
                    self.fail(error)
                }
            }
        }
    }

    /// Applies `term` to metavariables while its type is an implicit Pi and
    /// the expected type is not.
    fn insert_implicits(&mut self, ctx: &Context, span: Span, mut term: Term, mut ty: Term, expected: &Term) -> (Term, Term) {
        if matches!(&**expected, TermData::Pi { mode: Mode::Implicit, .. }) { return (term, ty) }
        loop {
            let head = whnf(self.db, &ty);
            match &*head {
                TermData::Pi { mode: Mode::Implicit, var, domain, codomain } => {
                    let arg = self.implicit_arg(ctx, *var, domain.clone(), span);
                    term = self.db.make_term(TermData::App { fun: term, arg: arg.clone() });
                    ty = subst_term(self.db, &Subst::single(*var, arg), codomain);
                }
                _ => return (term, ty)
            }
        }
    }

    fn check_lambda(&mut self, ctx: &Context, span: Span, params: &[LambdaParam], body: &Expr, expected: &Term) -> Term {
        let param = match params.first() {
            Some(param) => param,
            None => return self.check(ctx, body, expected)
        };
        let ty = whnf(self.db, expected);
        match &*ty {
            TermData::Pi { mode: Mode::Implicit, var, domain, codomain } if param.mode == Mode::Explicit => {
                let fresh = self.db.rename_var(*var);
                let inner = self.bind(ctx, fresh, domain.clone());
                let reference = self.db.make_ref(fresh);
                let codomain = subst_term(self.db, &Subst::single(*var, reference), codomain);
                let body = self.check_lambda(&inner, span, params, body, &codomain);
                self.db.make_term(TermData::Lambda { mode: Mode::Implicit, var: fresh, domain: domain.clone(), body })
            }
            TermData::Pi { mode, var, domain, codomain } => {
                if *mode != param.mode {
                    let actual = self.db.make_error(&format!("{} lambda", param.mode));
                    let error = self.mismatch(span, &ty, &actual);
                    return self.fail(error)
                }
                if let Some(annotation) = &param.ty {
                    let (annotation, _) = self.infer_type(ctx, annotation);
                    if !compare(self.db, &mut self.eqs, domain, &annotation, Cmp::Eq, span) {
                        let error = self.mismatch(span, domain, &annotation);
                        return self.fail(error)
                    }
                }
                let inner = self.bind(ctx, param.var, domain.clone());
                let reference = self.db.make_ref(param.var);
                let codomain = subst_term(self.db, &Subst::single(*var, reference), codomain);
                let body = self.check_lambda(&inner, span, &params[1..], body, &codomain);
                self.db.make_term(TermData::Lambda { mode: *mode, var: param.var, domain: domain.clone(), body })
            }
            _ if ty.is_error() => ty.clone(),
            _ => {
                let (term, actual) = self.infer_lambda(ctx, span, params, body);
                if compare(self.db, &mut self.eqs, &actual, &ty, Cmp::Le, span) { term }
                else {
                    let error = self.mismatch(span, &ty, &actual);
                    self.fail(error)
                }
            }
        }
    }

    fn infer_lambda(&mut self, ctx: &Context, span: Span, params: &[LambdaParam], body: &Expr) -> (Term, Term) {
        let mut inner = ctx.clone();
        let mut binders = Vec::with_capacity(params.len());
        for param in params {
            let domain = match &param.ty {
                Some(ty) => self.infer_type(&inner, ty).0,
                None => self.fresh_type(&inner, span)
            };
            inner = self.bind(&inner, param.var, domain.clone());
            binders.push((param.mode, param.var, domain));
        }
        let (mut term, mut ty) = self.infer(&inner, body);
        for (mode, var, domain) in binders.into_iter().rev() {
            term = self.db.make_term(TermData::Lambda { mode, var, domain: domain.clone(), body: term });
            ty = self.db.make_term(TermData::Pi { mode, var, domain, codomain: ty });
        }
        (term, ty)
    }

    fn check_tuple(&mut self, ctx: &Context, span: Span, fields: &[Expr], params: &Telescope, sigma: &Term) -> Term {
        if fields.len() != params.len() {
            let actual = self.db.make_error(&format!("a tuple of {} fields", fields.len()));
            let error = self.mismatch(span, sigma, &actual);
            return self.fail(error)
        }
        let mut s = Subst::new();
        let mut values = Vec::with_capacity(fields.len());
        for (field, link) in fields.iter().zip(params.iter()) {
            let ty = subst_term(self.db, &s, &link.ty);
            let value = self.check(ctx, field, &ty);
            s.add(link.var, value.clone());
            values.push(value);
        }
        self.db.make_term(TermData::Tuple { fields: values, sigma: sigma.clone() })
    }

    fn infer(&mut self, ctx: &Context, expr: &Expr) -> (Term, Term) {
        let (red_zone, grow) = (self.config.stack_red_zone, self.config.stack_grow);
        stacker::maybe_grow(red_zone, grow, || self.infer_inner(ctx, expr))
    }

    fn infer_inner(&mut self, ctx: &Context, expr: &Expr) -> (Term, Term) {
        match expr {
            Expr::Var { span, var } => match ctx.lookup(*var).cloned() {
                Some(ty) => (self.db.make_ref(*var), ty),
                None => self.fail_pair(ElabError::inference(*span, var, "not bound here"))
            },
            Expr::Def { span, id } => self.infer_call(ctx, *span, *id, &[]),
            Expr::App { span, head, args } => match &**head {
                Expr::Def { id, .. } => self.infer_call(ctx, *span, *id, args),
                _ => {
                    let (fun, ty) = self.infer(ctx, head);
                    self.apply(ctx, *span, fun, ty, args)
                }
            },
            Expr::Lambda { span, params, body } => self.infer_lambda(ctx, *span, params, body),
            Expr::Pi { span, params, codomain } => {
                let (params, inner, sorts) = self.elaborate_params(ctx, params);
                let (mut term, mut sort) = self.infer_type(&inner, codomain);
                for ((mode, var, domain), domain_sort) in params.into_iter().zip(sorts).rev() {
                    term = self.db.make_term(TermData::Pi { mode, var, domain, codomain: term });
                    sort = self.pi_sort(&domain_sort, &sort, *span);
                }
                let universe = self.db.make_universe(sort);
                (term, universe)
            }
            Expr::Sigma { span, params } => {
                let (params, _, sorts) = self.elaborate_params(ctx, params);
                let sort = self.max_sort(&sorts, *span);
                let sigma = self.db.make_term(TermData::Sigma { params: Telescope::from_params(params) });
                let universe = self.db.make_universe(sort);
                (sigma, universe)
            }
            Expr::Tuple { fields, .. } => {
                let mut values = Vec::with_capacity(fields.len());
                let mut links = Vec::with_capacity(fields.len());
                for field in fields {
                    let (value, ty) = self.infer(ctx, field);
                    values.push(value);
                    links.push((self.db.fresh_var("_"), ty));
                }
                let sigma = self.db.make_term(TermData::Sigma { params: Telescope::from_links(links) });
                (self.db.make_term(TermData::Tuple { fields: values, sigma: sigma.clone() }), sigma)
            }
            Expr::Project { span, tuple, field } => {
                let (tuple, ty) = self.infer(ctx, tuple);
                let head = whnf(self.db, &ty);
                let params = match &*head {
                    TermData::Sigma { params } if *field < params.len() => params.clone(),
                    _ => {
                        let expected = self.db.make_error(&format!("a tuple with field {}", field));
                        let error = self.mismatch(*span, &expected, &head);
                        return self.fail_pair(error)
                    }
                };
                let mut s = Subst::new();
                for (index, link) in params.iter().enumerate() {
                    if index == *field {
                        let ty = subst_term(self.db, &s, &link.ty);
                        return (self.db.make_term(TermData::Project { tuple, field: index }), ty)
                    }
                    let projection = self.db.make_term(TermData::Project { tuple: tuple.clone(), field: index });
                    s.add(link.var, projection);
                }
                self.fail_pair(ElabError::inference(*span, field, "no such field"))
            }
            Expr::Universe { sort, .. } => {
                let sort = self.universe_sort(*sort);
                (self.db.make_universe(sort), self.db.make_universe(sort.succ()))
            }
            Expr::Hole { span } => {
                let ty = self.fresh_type(ctx, *span);
                (self.fresh_meta(ctx, "_", ty.clone(), *span), ty)
            }
            Expr::Number { value, .. } => (self.lib.numeral(self.db, *value), self.lib.nat_type(self.db)),
            Expr::Case { span, args, result, clauses } =>
                self.elaborate_case(ctx, *span, args, result.as_deref(), clauses, None),
            Expr::ClassExt { span, class, impls } => self.class_ext(ctx, *span, *class, impls),
            Expr::New { span, class, impls } => {
                let (class_call, _) = self.class_ext(ctx, *span, *class, impls);
                if class_call.is_error() { return (class_call.clone(), class_call) }
                (self.db.make_term(TermData::New { class_call: class_call.clone() }), class_call)
            }
        }
    }

    fn apply(&mut self, ctx: &Context, span: Span, mut fun: Term, mut ty: Term, args: &[(Mode, Expr)]) -> (Term, Term) {
        for (mode, arg) in args {
            loop {
                let head = whnf(self.db, &ty);
                match &*head {
                    TermData::Pi { mode: Mode::Implicit, var, domain, codomain } if *mode == Mode::Explicit => {
                        let value = self.implicit_arg(ctx, *var, domain.clone(), span);
                        fun = self.db.make_term(TermData::App { fun, arg: value.clone() });
                        ty = subst_term(self.db, &Subst::single(*var, value), codomain);
                    }
                    TermData::Pi { mode: pi_mode, var, domain, codomain } if pi_mode == mode => {
                        let value = self.check(ctx, arg, domain);
                        fun = self.db.make_term(TermData::App { fun, arg: value.clone() });
                        ty = subst_term(self.db, &Subst::single(*var, value), codomain);
                        break
                    }
                    _ if head.is_error() => return (head.clone(), head.clone()),
                    _ => {
                        let expected = self.db.make_error("a function type");
                        let error = self.mismatch(arg.span(), &expected, &head);
                        return self.fail_pair(error)
                    }
                }
            }
        }
        (fun, ty)
    }

    /// Level argument for a call: a fresh sort when the definition mentions
    /// `\lp` or `\lh`, `\Set0` otherwise.
    fn call_levels(&mut self, terms: &[&Term], sorts: &[Sort]) -> Sort {
        let is_std = |v: &LevelVar| !v.is_inference();
        let polymorphic = terms.iter().any(|t| level_vars(t).iter().any(is_std))
            || sorts.iter().any(|s| s.p.get_var().iter().chain(s.h.get_var().iter()).any(is_std));
        if polymorphic { self.eqs.fresh_sort(self.db) } else { Sort::SET0 }
    }

    fn infer_call(&mut self, ctx: &Context, span: Span, id: DefId, args: &[(Mode, Expr)]) -> (Term, Term) {
        match self.db.definition(id).clone() {
            Definition::Function(def) => {
                let mut terms: Vec<&Term> = def.params.iter().map(|l| &l.ty).collect();
                terms.push(&def.result);
                let levels = self.call_levels(&terms, &[]);
                self.call(ctx, span, &def.params, levels, &def.result, args, |db, levels, args| {
                    db.make_term(TermData::FunCall { fun: id, levels, args })
                })
            }
            Definition::Data(def) => {
                let terms: Vec<&Term> = def.params.iter().map(|l| &l.ty).collect();
                let levels = self.call_levels(&terms, &[def.sort]);
                let result = self.db.make_universe(def.sort);
                self.call(ctx, span, &def.params, levels, &result, args, |db, levels, args| {
                    db.make_term(TermData::DataCall { data: id, levels, args })
                })
            }
            Definition::Constructor(con) => {
                let data = match self.db.data(con.data) {
                    Some(data) => data.clone(),
                    None => return self.fail_pair(ElabError::inference(span, id, "constructor without data type"))
                };
                let mut terms: Vec<&Term> = data.params.iter().map(|l| &l.ty).collect();
                terms.extend(con.params.iter().map(|l| &l.ty));
                let levels = self.call_levels(&terms, &[data.sort]);
                let data_arity = data.params.len();
                let params: Vec<(Mode, Var, Term)> = data.params.to_params().into_iter()
                    .map(|(_, var, ty)| (Mode::Implicit, var, ty))
                    .chain(con.params.to_params())
                    .collect();
                let data_refs = data.params.vars().into_iter().map(|v| self.db.make_ref(v)).collect();
                let result = self.db.make_term(TermData::DataCall { data: con.data, levels: Sort::std(), args: data_refs });
                self.call(ctx, span, &Telescope::from_params(params), levels, &result, args, move |db, levels, mut args| {
                    let rest = args.split_off(data_arity.min(args.len()));
                    db.make_term(TermData::ConCall { con: id, levels, data_args: args, args: rest })
                })
            }
            Definition::Field(field) => {
                let class = match self.db.class(field.class) {
                    Some(class) => class.clone(),
                    None => return self.fail_pair(ElabError::inference(span, id, "field without class"))
                };
                let levels = if self.current_class == Some(field.class) { Sort::std() }
                    else { self.call_levels(&[&field.ty], &[class.sort]) };
                let this_type = self.db.make_term(TermData::ClassCall { class: field.class, levels: Sort::std(), impls: vec![] });
                let params = Telescope::from_links(vec![(field.this, this_type)]);
                self.call(ctx, span, &params, levels, &field.ty, args, |db, levels, mut args| {
                    let arg = args.remove(0);
                    db.make_term(TermData::FieldCall { field: id, levels, arg })
                })
            }
            Definition::Class(class) => {
                let levels = if self.current_class == Some(id) { Sort::std() }
                    else { self.call_levels(&[], &[class.sort]) };
                let call = self.db.make_term(TermData::ClassCall { class: id, levels, impls: vec![] });
                let sort = Subst::std_levels(levels).sort(&class.sort);
                let universe = self.db.make_universe(sort);
                self.apply(ctx, span, call, universe, args)
            }
        }
    }

    /// Checks `args` against `params`, inserting implicit arguments, and
    /// eta-expands the call when arguments are missing.
    #[allow(clippy::too_many_arguments)]
    fn call(&mut self
        , ctx: &Context
        , span: Span
        , params: &Telescope
        , levels: Sort
        , result: &Term
        , args: &[(Mode, Expr)]
        , make: impl Fn(&mut Database, Sort, Vec<Term>) -> Term)
        -> (Term, Term)
    {
        let links = params.to_params();
        let mut s = Subst::std_levels(levels);
        let mut values = Vec::with_capacity(links.len());
        let mut given = args.iter().peekable();
        let mut index = 0;
        while index < links.len() {
            let (mode, var, ty) = &links[index];
            let ty = subst_term(self.db, &s, ty);
            let trailing_implicits = links[index..].iter().all(|(m, _, _)| *m == Mode::Implicit);
            let value = match (mode, given.peek().map(|(m, _)| *m)) {
                (Mode::Implicit, Some(Mode::Implicit)) | (Mode::Explicit, Some(Mode::Explicit)) => match given.next() {
                    Some((_, arg)) => self.check(ctx, arg, &ty),
                    None => break
                },
                (Mode::Implicit, Some(Mode::Explicit)) => self.implicit_arg(ctx, *var, ty, span),
                (Mode::Implicit, None) if trailing_implicits => self.implicit_arg(ctx, *var, ty, span),
                (Mode::Explicit, Some(Mode::Implicit)) => {
                    let arg_span = given.peek().map_or(span, |(_, arg)| arg.span());
                    let expected = self.db.make_error("an explicit argument");
                    let actual = self.db.make_error("an implicit argument");
                    let error = self.mismatch(arg_span, &expected, &actual);
                    return self.fail_pair(error)
                }
                (_, None) => break
            };
            s.add(*var, value.clone());
            values.push(value);
            index += 1;
        }

        if index < links.len() {
            let mut binders = Vec::with_capacity(links.len() - index);
            for (mode, var, ty) in links[index..].iter() {
                let ty = subst_term(self.db, &s, ty);
                let fresh = self.db.rename_var(*var);
                self.eqs.bind(fresh, ty.clone());
                let reference = self.db.make_ref(fresh);
                s.add(*var, reference.clone());
                values.push(reference);
                binders.push((*mode, fresh, ty));
            }
            let mut term = make(self.db, levels, values);
            let mut ty = subst_term(self.db, &s, result);
            for (mode, var, domain) in binders.into_iter().rev() {
                term = self.db.make_term(TermData::Lambda { mode, var, domain: domain.clone(), body: term });
                ty = self.db.make_term(TermData::Pi { mode, var, domain, codomain: ty });
            }
            log::trace!("{} {}", "eta-expanded".bright_blue(), term);
            return (term, ty)
        }

        let term = make(self.db, levels, values);
        let ty = subst_term(self.db, &s, result);
        let rest: Vec<(Mode, Expr)> = given.cloned().collect();
        if rest.is_empty() { (term, ty) } else { self.apply(ctx, span, term, ty, &rest) }
    }

    /// `C { | f => e }`: each implementation is checked against its field
    /// type with `this` standing for what is implemented so far.
    fn class_ext(&mut self, ctx: &Context, span: Span, class: DefId, impls: &[(DefId, Expr)]) -> (Term, Term) {
        let def = match self.db.class(class) {
            Some(def) => def.clone(),
            None => return self.fail_pair(ElabError::inference(span, class, "not a class"))
        };
        let levels = if self.current_class == Some(class) { Sort::std() }
            else { self.call_levels(&[], &[def.sort]) };
        if let Some((field, expr)) = impls.iter().find(|(f, _)| !def.fields.contains(f)) {
            let expected = self.db.make_error(&format!("a field of {}", class));
            let actual = self.db.make_error(&field.to_string());
            let error = self.mismatch(expr.span(), &expected, &actual);
            return self.fail_pair(error)
        }
        let mut done: Vec<(DefId, Term)> = vec![];
        for field in def.fields.iter() {
            let expr = match impls.iter().find(|(f, _)| f == field) {
                Some((_, expr)) => expr,
                None => continue
            };
            let field_def = match self.db.field(*field) {
                Some(field_def) => field_def.clone(),
                None => continue
            };
            let partial = self.db.make_term(TermData::ClassCall { class, levels, impls: done.clone() });
            let this = self.db.make_term(TermData::New { class_call: partial });
            let mut s = Subst::single(field_def.this, this);
            s.add_std_levels(levels);
            let ty = subst_term(self.db, &s, &field_def.ty);
            let value = self.check(ctx, expr, &ty);
            done.push((*field, value));
        }
        done.sort_by_key(|(field, _)| *field);
        let class_call = self.db.make_term(TermData::ClassCall { class, levels, impls: done });
        let sort = Subst::std_levels(levels).sort(&def.sort);
        (class_call, self.db.make_universe(sort))
    }

    fn compile(&mut self, span: Span, params: &Telescope, clauses: &[ElimClause], sort: Option<Sort>, mode: ElimMode) -> Option<ElimTree> {
        let mut errors: Vec<ElabError> = vec![];
        let tree = {
            let mut compiler = PatternCompiler::new(self.db, &self.config, &mut errors, &mut self.eqs.levels).mode(mode);
            if let Some(sort) = sort { compiler = compiler.result_sort(sort) }
            compiler.compile(span, params, clauses)
        };
        for error in errors {
            self.report(error);
        }
        tree
    }

    fn elaborate_case(&mut self
        , ctx: &Context
        , span: Span
        , args: &[CaseArg]
        , result: Option<&Expr>
        , clauses: &[Clause]
        , expected: Option<&Term>)
        -> (Term, Term)
    {
        let mut inner = ctx.clone();
        let mut s = Subst::new();
        let mut values = Vec::with_capacity(args.len());
        let mut links = Vec::with_capacity(args.len());
        for arg in args {
            let (value, ty) = match &arg.ty {
                Some(ty) => {
                    let (ty, _) = self.infer_type(&inner, ty);
                    let here = subst_term(self.db, &s, &ty);
                    (self.check(ctx, &arg.expr, &here), ty)
                }
                None => self.infer(ctx, &arg.expr)
            };
            let var = match arg.var {
                Some(var) => var,
                None => self.db.fresh_var("x")
            };
            inner = self.bind(&inner, var, ty.clone());
            s.add(var, value.clone());
            values.push(value);
            links.push((var, ty));
        }
        let params = Telescope::from_links(links);
        let result = match (result, expected) {
            (Some(result), _) => self.infer_type(&inner, result).0,
            (None, Some(expected)) => expected.clone(),
            (None, None) => self.fresh_type(ctx, span)
        };
        let sort = self.sort_of(&result);
        let clauses = self.check_clauses(ctx, span, &params, None, clauses, &result);
        let tree = match self.compile(span, &params, &clauses, sort, ElimMode::Case) {
            Some(tree) => tree,
            None => {
                let error = self.db.make_error("case");
                return (error.clone(), error)
            }
        };
        let ty = subst_term(self.db, &s, &result);
        let term = self.db.make_term(TermData::Case { args: values, params, result, tree });
        (term, ty)
    }

    /// Types the patterns of every clause against `params` and checks the
    /// bodies against `result` instantiated with the patterns.
    fn check_clauses(&mut self
        , ctx: &Context
        , span: Span
        , params: &Telescope
        , elim: Option<&[Var]>
        , clauses: &[Clause]
        , result: &Term)
        -> Vec<ElimClause>
    {
        let links = params.to_params();
        let matched: Vec<bool> = match elim {
            Some(vars) => {
                let mut last = None;
                for var in vars {
                    let position = links.iter().position(|(_, v, _)| v == var);
                    let in_order = match (position, last) {
                        (None, _) => false,
                        (Some(p), Some(l)) => p > l,
                        (Some(_), None) => true
                    };
                    if !in_order {
                        self.report(ElabError::ElimOrder { span: source_span(span), var: var.to_string() });
                        return vec![]
                    }
                    last = position;
                }
                links.iter().map(|(_, v, _)| vars.contains(v)).collect()
            }
            None => links.iter().map(|(mode, _, _)| *mode == Mode::Explicit).collect()
        };
        let expected = matched.iter().filter(|m| **m).count();

        let mut result_clauses = Vec::with_capacity(clauses.len());
        for clause in clauses {
            if clause.patterns.len() < expected {
                self.report(ElabError::NotEnoughPatterns { span: source_span(clause.span), expected });
                continue
            }
            if clause.patterns.len() > expected {
                self.report(ElabError::TooManyPatterns { span: source_span(clause.span), expected });
                continue
            }
            let mut inner = ctx.clone();
            let mut s = Subst::new();
            let mut patterns = Vec::with_capacity(links.len());
            let mut given = clause.patterns.iter();
            let mut ok = true;
            for ((_, var, ty), is_matched) in links.iter().zip(matched.iter()) {
                let ty = subst_term(self.db, &s, ty);
                let pattern = if *is_matched { given.next() } else { None };
                let typed = match pattern {
                    Some(pat) => self.check_pattern(&mut inner, pat, &ty, clause.span),
                    None => {
                        inner = self.bind(&inner, *var, ty.clone());
                        Some((Pattern::Binding(*var), self.db.make_ref(*var)))
                    }
                };
                match typed {
                    Some((pattern, term)) => {
                        s.add(*var, term);
                        patterns.push(pattern);
                    }
                    None => {
                        ok = false;
                        break
                    }
                }
            }
            if !ok { continue }
            let expected_type = subst_term(self.db, &s, result);
            let body = clause.body.as_ref().map(|body| self.check(&inner, body, &expected_type));
            result_clauses.push(ElimClause { span: clause.span, patterns, body });
        }
        result_clauses
    }

    fn check_pattern(&mut self, ctx: &mut Context, pat: &Pat, ty: &Term, clause_span: Span) -> Option<(Pattern, Term)> {
        let span = pat.span().unwrap_or(clause_span);
        match pat {
            Pat::Var(var) => {
                *ctx = self.bind(ctx, *var, ty.clone());
                Some((Pattern::Binding(*var), self.db.make_ref(*var)))
            }
            Pat::Absurd { .. } => Some((Pattern::Empty, self.db.make_error("absurd"))),
            Pat::Number { span, value } => {
                let mut desugared = Pat::Con { span: *span, con: self.lib.zero, args: vec![] };
                for _ in 0..*value {
                    desugared = Pat::Con { span: *span, con: self.lib.suc, args: vec![desugared] };
                }
                self.check_pattern(ctx, &desugared, ty, clause_span)
            }
            Pat::Con { con, args, .. } => {
                let head = whnf(self.db, ty);
                let found = if_chain! {
                    if let TermData::DataCall { data, levels, args: data_args } = &*head;
                    if let Some(con_def) = self.db.constructor(*con);
                    if con_def.data == *data;
                    if let Some(data_def) = self.db.data(*data);
                    then { Some((*levels, data_args.clone(), con_def.params.clone(), data_def.params.clone())) }
                    else { None }
                };
                let (levels, data_args, con_params, data_params) = match found {
                    Some(found) => found,
                    None => {
                        self.report(ElabError::ExpectedConstructor { span: source_span(span), pattern: con.to_string(), ty: head.to_string() });
                        return None
                    }
                };
                let arity = con_params.len();
                if args.len() != arity {
                    let error = if args.len() < arity {
                        ElabError::NotEnoughPatterns { span: source_span(span), expected: arity }
                    } else {
                        ElabError::TooManyPatterns { span: source_span(span), expected: arity }
                    };
                    self.report(error);
                    return None
                }
                let mut s = Subst::instantiate(&data_params, &data_args);
                s.add_std_levels(levels);
                let mut patterns = Vec::with_capacity(arity);
                let mut terms = Vec::with_capacity(arity);
                for (link, arg) in con_params.iter().zip(args.iter()) {
                    let arg_type = subst_term(self.db, &s, &link.ty);
                    let (pattern, term) = self.check_pattern(ctx, arg, &arg_type, clause_span)?;
                    s.add(link.var, term.clone());
                    patterns.push(pattern);
                    terms.push(term);
                }
                let term = self.db.make_term(TermData::ConCall { con: *con, levels, data_args, args: terms });
                Some((Pattern::con(*con, patterns), term))
            }
            Pat::Tuple { fields, .. } => {
                let head = whnf(self.db, ty);
                let params = match &*head {
                    TermData::Sigma { params } if params.len() == fields.len() => params.clone(),
                    _ => {
                        let pattern = format!("tuple of {} fields", fields.len());
                        self.report(ElabError::ExpectedConstructor { span: source_span(span), pattern, ty: head.to_string() });
                        return None
                    }
                };
                let mut s = Subst::new();
                let mut patterns = Vec::with_capacity(fields.len());
                let mut terms = Vec::with_capacity(fields.len());
                for (link, field) in params.iter().zip(fields.iter()) {
                    let field_type = subst_term(self.db, &s, &link.ty);
                    let (pattern, term) = self.check_pattern(ctx, field, &field_type, clause_span)?;
                    s.add(link.var, term.clone());
                    patterns.push(pattern);
                    terms.push(term);
                }
                let term = self.db.make_term(TermData::Tuple { fields: terms, sigma: head.clone() });
                Some((Pattern::tuple(patterns), term))
            }
        }
    }

    pub fn elaborate_function(&mut self, decl: &FunctionDecl) -> Result<DefId, CubixError> {
        self.begin();
        log::info!("{} {}", "elaborating".bright_blue(), decl.id);
        self.signature = true;
        let (params, ctx, _) = self.elaborate_params(&Context::new(), &decl.params);
        let params = Telescope::from_params(params);
        let declared = decl.result.as_ref().map(|result| self.infer_type(&ctx, result).0);
        self.signature = false;
        let result = match declared {
            Some(result) => result,
            None => self.fresh_type(&ctx, decl.span)
        };
        self.db.set_definition(decl.id, Definition::Function(FunctionDef {
            params: params.clone(),
            result: result.clone(),
            body: None,
            builtin: None,
            status: Status::InProgress
        }));

        let body = match &decl.body {
            BodyExpr::Term(expr) => Some(FunctionBody::Term(self.check(&ctx, expr, &result))),
            BodyExpr::Elim { elim, clauses } => {
                let clauses = self.check_clauses(&ctx, decl.span, &params, elim.as_deref(), clauses, &result);
                let sort = self.sort_of(&result);
                if self.errors == 0 {
                    self.compile(decl.span, &params, &clauses, sort, ElimMode::Top).map(FunctionBody::Elim)
                } else { None }
            }
            BodyExpr::Abstract => None
        };

        let levels = self.finish();
        let params = self.zonk_telescope(&levels, &params);
        let result = self.zonk(&levels, &result);
        let body = match body {
            Some(FunctionBody::Term(term)) => Some(FunctionBody::Term(self.zonk(&levels, &term))),
            Some(FunctionBody::Elim(tree)) => Some(FunctionBody::Elim(self.zonk_tree(&levels, &tree))),
            None => None
        };
        let status = if self.errors == 0 { Status::Done } else { Status::HasErrors };
        self.db.set_definition(decl.id, Definition::Function(FunctionDef { params, result, body, builtin: None, status }));
        log::debug!("{}", self.db.definition(decl.id));
        self.conclude(decl.id)
    }

    pub fn elaborate_data(&mut self, decl: &DataDecl) -> Result<DefId, CubixError> {
        self.begin();
        log::info!("{} {}", "elaborating".bright_blue(), decl.id);
        self.signature = true;
        let (params, ctx, _) = self.elaborate_params(&Context::new(), &decl.params);
        let params = Telescope::from_params(params);
        let sort = match decl.sort {
            Some(sort) => sort,
            None => self.eqs.fresh_sort(self.db)
        };
        let constructors: Vec<DefId> = decl.constructors.iter().map(|c| c.id).collect();
        self.db.set_definition(decl.id, Definition::Data(DataDef {
            params: params.clone(),
            sort,
            constructors: constructors.clone(),
            truncated: decl.truncated,
            interval: false
        }));
        if decl.sort.is_none() && constructors.len() > 1 {
            self.eqs.levels.set_span(decl.span);
            Sort::SET0.compare(&sort, Cmp::Le, &mut self.eqs.levels);
        }

        let mut elaborated = Vec::with_capacity(decl.constructors.len());
        for con in decl.constructors.iter() {
            let (con_params, _, sorts) = self.elaborate_params(&ctx, &con.params);
            if !decl.truncated {
                for arg_sort in sorts {
                    self.eqs.levels.set_span(con.span);
                    if !arg_sort.compare(&sort, Cmp::Le, &mut self.eqs.levels) {
                        let expected = self.db.make_universe(sort);
                        let actual = self.db.make_universe(arg_sort);
                        let error = self.mismatch(con.span, &expected, &actual);
                        self.report(error);
                    }
                }
            }
            let intervals = con_params.iter().filter(|(_, _, ty)| self.is_interval(ty)).count();
            elaborated.push((con.id, Telescope::from_params(con_params), intervals));
        }
        self.signature = false;

        let levels = self.finish();
        let params = self.zonk_telescope(&levels, &params);
        let sort = levels.sort(&sort);
        for (id, con_params, intervals) in elaborated {
            let con_params = self.zonk_telescope(&levels, &con_params);
            self.db.set_definition(id, Definition::Constructor(ConstructorDef { data: decl.id, params: con_params, intervals }));
        }
        self.db.set_definition(decl.id, Definition::Data(DataDef {
            params,
            sort,
            constructors,
            truncated: decl.truncated,
            interval: false
        }));
        log::debug!("{}", self.db.definition(decl.id));
        self.conclude(decl.id)
    }

    pub fn elaborate_class(&mut self, decl: &ClassDecl) -> Result<DefId, CubixError> {
        self.begin();
        log::info!("{} {}", "elaborating".bright_blue(), decl.id);
        self.current_class = Some(decl.id);
        self.signature = true;
        let fields: Vec<DefId> = decl.fields.iter().map(|f| f.id).collect();
        self.db.set_definition(decl.id, Definition::Class(ClassDef {
            fields: fields.clone(),
            classifying_field: decl.classifying,
            sort: decl.sort.unwrap_or(Sort::std())
        }));
        let this_type = self.db.make_term(TermData::ClassCall { class: decl.id, levels: Sort::std(), impls: vec![] });
        let ctx = self.bind(&Context::new(), decl.this, this_type);
        let mut sorts = Vec::with_capacity(decl.fields.len());
        for field in decl.fields.iter() {
            let (ty, sort) = self.infer_type(&ctx, &field.ty);
            sorts.push(sort);
            self.db.set_definition(field.id, Definition::Field(FieldDef { class: decl.id, this: decl.this, ty }));
        }
        self.signature = false;
        self.current_class = None;
        let sort = match decl.sort {
            Some(sort) => sort,
            None => self.max_sort(&sorts, decl.span)
        };

        let levels = self.finish();
        for field in decl.fields.iter() {
            let ty = match self.db.field(field.id) {
                Some(def) => def.ty.clone(),
                None => continue
            };
            let ty = self.zonk(&levels, &ty);
            self.db.set_definition(field.id, Definition::Field(FieldDef { class: decl.id, this: decl.this, ty }));
        }
        let sort = levels.sort(&sort);
        self.db.set_definition(decl.id, Definition::Class(ClassDef { fields, classifying_field: decl.classifying, sort }));
        self.conclude(decl.id)
    }

    /// Makes the parameterless function `fun` the instance of its result
    /// class for the data type implementing the classifying field.
    pub fn register_instance(&mut self, fun: DefId) -> Result<(), CubixError> {
        let result = match self.db.function(fun) {
            Some(def) => def.result.clone(),
            None => self.db.make_error("not a function")
        };
        let result = whnf(self.db, &result);
        let found = if_chain! {
            if let TermData::ClassCall { class, impls, .. } = &*result;
            if let Some(field) = self.db.class(*class).and_then(|c| c.classifying_field);
            if let Some((_, implementation)) = impls.iter().find(|(f, _)| *f == field);
            let implementation = whnf(self.db, implementation);
            if let TermData::DataCall { data, .. } = &*implementation;
            then { Some((*class, *data)) }
            else { None }
        };
        match found {
            Some((class, data)) => {
                log::debug!("{} {} {} {}", "instance".green(), fun, class, data);
                self.db.add_instance(Instance { class, data, fun });
                Ok(())
            }
            None => Err(CubixError::Elaborator(ElabError::InstanceNotFound {
                span: source_span((0, 0)),
                class: result.to_string(),
                data: fun.to_string()
            }))
        }
    }

    /// Elaborates a standalone expression, against `expected` when given,
    /// and returns it with its type, both fully solved.
    pub fn elaborate_expr(&mut self, expr: &Expr, expected: Option<&Expr>) -> Result<(Term, Term), CubixError> {
        self.begin();
        let ctx = Context::new();
        let (term, ty) = match expected {
            Some(expected) => {
                let (ty, _) = self.infer_type(&ctx, expected);
                (self.check(&ctx, expr, &ty), ty)
            }
            None => self.infer(&ctx, expr)
        };
        let levels = self.finish();
        let term = self.zonk(&levels, &term);
        let ty = self.zonk(&levels, &ty);
        if self.errors == 0 { Ok((term, ty)) }
        else { Err(CubixError::Definition { name: Symbol::from("expression"), errors: self.errors }) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Database, CoreLibrary) {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut db = Database::new();
        let lib = CoreLibrary::build(&mut db);
        (db, lib)
    }

    #[test]
    fn implicit_arguments_are_inserted() -> anyhow::Result<()> {
        let (mut db, lib) = setup();
        let mut errors = vec![];
        let mut elab = Elaborator::new(&mut db, &lib, &mut errors);
        let id = elab.declare_function("id");
        let a = elab.fresh_var("A");
        let x = elab.fresh_var("x");
        let decl = FunctionDecl {
            span: (0, 10),
            id,
            params: vec![Param::implicit(a, Expr::universe(None)), Param::explicit(x, Expr::var(a))],
            result: Some(Expr::var(a)),
            body: BodyExpr::Term(Expr::var(x))
        };
        elab.elaborate_function(&decl)?;
        let (term, ty) = elab.elaborate_expr(&Expr::apply(Expr::def(id), vec![Expr::number(2)]), None)?;
        assert_eq!(ty, lib.nat_type(&mut db));
        let value = normalize(&mut db, NormalizationMode::Nf, &term);
        assert_eq!(lib.as_numeral(&value), Some(2));
        Ok(())
    }

    #[test]
    fn partial_calls_are_eta_expanded() -> anyhow::Result<()> {
        let (mut db, lib) = setup();
        let mut errors = vec![];
        let mut elab = Elaborator::new(&mut db, &lib, &mut errors);
        let suc = Expr::def(lib.suc);
        let (term, ty) = elab.elaborate_expr(&suc, None)?;
        assert!(matches!(&*term, TermData::Lambda { .. }));
        assert!(matches!(&*ty, TermData::Pi { .. }));
        Ok(())
    }

    #[test]
    fn eliminated_parameters_must_be_in_order() {
        let (mut db, lib) = setup();
        let mut errors = vec![];
        {
            let mut elab = Elaborator::new(&mut db, &lib, &mut errors);
            let f = elab.declare_function("f");
            let n = elab.fresh_var("n");
            let m = elab.fresh_var("m");
            let nat = Expr::def(lib.nat);
            let decl = FunctionDecl {
                span: (0, 20),
                id: f,
                params: vec![Param::explicit(n, nat.clone()), Param::explicit(m, nat.clone())],
                result: Some(nat),
                body: BodyExpr::Elim { elim: Some(vec![m, n]), clauses: vec![] }
            };
            assert!(elab.elaborate_function(&decl).is_err());
        }
        assert!(matches!(errors.as_slice(), [ElabError::ElimOrder { .. }]));
    }

    #[test]
    fn case_expressions_compile_their_clauses() -> anyhow::Result<()> {
        let (mut db, lib) = setup();
        let mut errors = vec![];
        let mut elab = Elaborator::new(&mut db, &lib, &mut errors);
        let n = elab.fresh_var("n");
        let case = Expr::Case {
            span: (0, 30),
            args: vec![CaseArg { expr: Expr::number(3), var: None, ty: None }],
            result: Some(Box::new(Expr::def(lib.nat))),
            clauses: vec![
                Clause::new((5, 10), vec![Pat::con(lib.zero, vec![])], Some(Expr::number(0))),
                Clause::new((11, 20), vec![Pat::con(lib.suc, vec![Pat::Var(n)])], Some(Expr::var(n))),
            ]
        };
        let (term, _) = elab.elaborate_expr(&case, None)?;
        let value = normalize(&mut db, NormalizationMode::Nf, &term);
        assert_eq!(lib.as_numeral(&value), Some(2));
        Ok(())
    }

    #[test]
    fn mismatched_arguments_are_reported() {
        let (mut db, lib) = setup();
        let mut errors = vec![];
        {
            let mut elab = Elaborator::new(&mut db, &lib, &mut errors);
            let arg = Expr::universe(Some(Sort::SET0)).with_span((4, 9));
            let bad = Expr::apply(Expr::def(lib.suc), vec![arg]);
            assert!(elab.elaborate_expr(&bad, None).is_err());
        }
        match errors.as_slice() {
            [ElabError::TypeMismatch { span, .. }] => assert_eq!(span.offset(), 4),
            other => panic!("unexpected diagnostics {:?}", other)
        }
    }

    #[test]
    fn lambda_holes_take_the_expected_domain() -> anyhow::Result<()> {
        let (mut db, lib) = setup();
        let mut errors = vec![];
        let mut elab = Elaborator::new(&mut db, &lib, &mut errors);
        let x = elab.fresh_var("x");
        let y = elab.fresh_var("y");
        let nat = Expr::def(lib.nat);
        let expected = Expr::arrow(nat.clone(), nat, y);
        let lambda = Expr::Lambda {
            span: (0, 15),
            params: vec![LambdaParam { mode: Mode::Explicit, var: x, ty: Some(Expr::hole()) }],
            body: Box::new(Expr::apply(Expr::def(lib.suc), vec![Expr::var(x)]))
        };
        let (term, ty) = elab.elaborate_expr(&lambda, Some(&expected))?;
        assert!(matches!(&*ty, TermData::Pi { .. }));
        let four = lib.numeral(&mut db, 4);
        let applied = db.make_term(TermData::App { fun: term, arg: four });
        let value = normalize(&mut db, NormalizationMode::Nf, &applied);
        assert_eq!(lib.as_numeral(&value), Some(5));
        Ok(())
    }

    #[test]
    fn instances_are_found_through_their_classifying_field() -> anyhow::Result<()> {
        let (mut db, lib) = setup();
        let mut errors = vec![];
        let mut elab = Elaborator::new(&mut db, &lib, &mut errors);
        let (class, fields) = elab.declare_class("Pointed", &["E", "point"]);
        let this = elab.fresh_var("this");
        let carrier = fields[0];
        let point = fields[1];
        elab.elaborate_class(&ClassDecl {
            span: (0, 40),
            id: class,
            this,
            fields: vec![
                FieldDecl { span: (10, 20), id: carrier, ty: Expr::universe(Some(Sort::SET0)) },
                FieldDecl { span: (21, 30), id: point, ty: Expr::apply(Expr::def(carrier), vec![Expr::var(this)]) },
            ],
            classifying: Some(carrier),
            sort: None
        })?;

        let nat_pointed = elab.declare_function("NatPointed");
        let impls = vec![(carrier, Expr::def(lib.nat)), (point, Expr::number(7))];
        elab.elaborate_function(&FunctionDecl {
            span: (41, 60),
            id: nat_pointed,
            params: vec![],
            result: Some(Expr::ClassExt { span: (41, 50), class, impls: impls.clone() }),
            body: BodyExpr::Term(Expr::New { span: (51, 60), class, impls })
        })?;
        elab.register_instance(nat_pointed)?;

        // `\func pt {P : Pointed { | E => Nat }} : Nat => point P`
        let pt = elab.declare_function("pt");
        let p = elab.fresh_var("P");
        let bound = Expr::ClassExt { span: (61, 70), class, impls: vec![(carrier, Expr::def(lib.nat))] };
        elab.elaborate_function(&FunctionDecl {
            span: (61, 90),
            id: pt,
            params: vec![Param::implicit(p, bound)],
            result: Some(Expr::def(lib.nat)),
            body: BodyExpr::Term(Expr::apply(Expr::def(point), vec![Expr::var(p)]))
        })?;

        let (term, _) = elab.elaborate_expr(&Expr::def(pt), Some(&Expr::def(lib.nat)))?;
        let value = normalize(&mut db, NormalizationMode::Nf, &term);
        assert_eq!(lib.as_numeral(&value), Some(7));
        Ok(())
    }
}
