
use std::collections::BTreeSet;

use ahash::AHashMap;
use colored::Colorize;
use derive_more::{Deref, Display, From};
use if_chain::if_chain;
use imbl::Vector;

use cubix_core::prelude::*;
use crate::compare::compare;
use crate::error::*;
use crate::levels::*;

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, From, Deref, Display)]
pub struct EquationId(usize);

/// A deferred `left cmp right` waiting on a metavariable.
#[derive(Debug, Clone)]
pub struct Equation {
    pub left: Term,
    pub right: Term,
    pub cmp: Cmp,
    pub span: Span,
}

#[derive(Debug, Clone)]
struct ClassBound {
    meta: MetaId,
    class_call: Term,
    span: Span,
}

/// The equation store of one definition: deferred term equations, class call
/// bounds, metavariables forced into `\Prop`, and the level constraints.
#[derive(Debug, Default)]
pub struct Equations {
    equations: Vec<Option<Equation>>,
    listeners: AHashMap<MetaId, Vec<EquationId>>,
    worklist: BTreeSet<EquationId>,
    draining: bool,
    props: Vec<(MetaId, Span)>,
    lower_bounds: Vec<ClassBound>,
    upper_bounds: Vec<ClassBound>,
    pub levels: LevelEquations,
    metas: Vec<MetaId>,
    var_types: TypingContext,
    errors: Vec<ElabError>,
}

impl Equations {
    pub fn new() -> Equations { Equations::default() }

    /// Records the type of a bound variable, for type checking solutions.
    pub fn bind(&mut self, var: Var, ty: Term) {
        self.var_types.insert(var, ty);
    }

    pub fn typing_context(&self) -> &TypingContext { &self.var_types }

    pub fn fresh_meta(&mut self, db: &mut Database, name: &str, ty: Term, scope: Vector<Var>, kind: MetaKind, span: Span) -> Term {
        let meta = db.fresh_meta(name, ty, scope, kind, span);
        self.metas.push(meta);
        db.make_term(TermData::Infer { meta })
    }

    pub fn fresh_sort(&mut self, db: &mut Database) -> Sort {
        db.fresh_sort()
    }

    pub fn report(&mut self, error: ElabError) {
        log::debug!("{} {}", "equation error".red(), error);
        self.errors.push(error);
    }

    pub fn errors(&self) -> &[ElabError] { &self.errors }

    pub fn take_errors(&mut self) -> Vec<ElabError> { std::mem::take(&mut self.errors) }

    /// Deferred equations that have not been discharged yet.
    pub fn pending(&self) -> impl Iterator<Item = &Equation> {
        self.equations.iter().flatten()
    }

    /// `?meta cmp term`. Solves eagerly when `term` leaves only one choice,
    /// otherwise records a bound or defers.
    pub fn add_equation(&mut self, db: &mut Database, meta: MetaId, term: &Term, cmp: Cmp, span: Span) -> bool {
        let term = whnf(db, term);
        log::trace!("{} {} {}", meta, cmp.to_string().bright_blue(), term);
        if cmp != Cmp::Eq {
            match &*term {
                TermData::Universe { sort } if sort.is_prop() && cmp == Cmp::Le => {
                    self.props.push((meta, span));
                    return true
                }
                TermData::Universe { sort } => {
                    let fresh = self.fresh_sort(db);
                    let universe = db.make_universe(fresh);
                    if !self.solve_meta(db, meta, universe, span) { return false }
                    self.levels.set_span(span);
                    return fresh.compare(sort, cmp, &mut self.levels)
                }
                TermData::Pi { mode, var, domain, codomain } if Equations::is_cumulative(db, &term) => {
                    let mut scope = match db.meta(meta) {
                        Some(data) => data.scope.clone(),
                        None => return false
                    };
                    scope.push_back(*var);
                    self.bind(*var, domain.clone());
                    let sort = self.fresh_sort(db);
                    let universe = db.make_universe(sort);
                    let codomain_meta = self.fresh_meta(db, "codomain", universe, scope, MetaKind::Expression, span);
                    let pi = db.make_term(TermData::Pi {
                        mode: *mode,
                        var: *var,
                        domain: domain.clone(),
                        codomain: codomain_meta.clone()
                    });
                    if !self.solve_meta(db, meta, pi, span) { return false }
                    return compare(db, self, &codomain_meta, codomain, cmp, span)
                }
                TermData::ClassCall { .. } => {
                    let bound = ClassBound { meta, class_call: term.clone(), span };
                    if cmp == Cmp::Le { self.upper_bounds.push(bound) } else { self.lower_bounds.push(bound) }
                    return true
                }
                _ => if term.as_meta().is_some() || stuck_meta(db, &term).is_some() {
                    let left = db.make_term(TermData::Infer { meta });
                    self.defer(db, &left, &term, cmp, span);
                    return true
                }
            }
        }
        self.solve_meta(db, meta, term, span)
    }

    /// Whether `ty` ends, under its Pi codomains, in something a subtype can
    /// differ from: a universe, a class call, or a stuck term.
    fn is_cumulative(db: &mut Database, ty: &Term) -> bool {
        let mut current = whnf(db, ty);
        loop {
            let next = match &*current {
                TermData::Pi { codomain, .. } => whnf(db, codomain),
                TermData::Universe { .. } | TermData::ClassCall { .. } => return true,
                _ => return stuck_meta(db, &current).is_some()
            };
            current = next;
        }
    }

    /// Records `left cmp right` until one of the metavariables it is stuck on
    /// gets solved.
    pub fn defer(&mut self, db: &mut Database, left: &Term, right: &Term, cmp: Cmp, span: Span) {
        let id = EquationId::from(self.equations.len());
        let mut blockers: Vec<MetaId> = [left, right].iter()
            .filter_map(|t| stuck_meta(db, t))
            .collect();
        if blockers.is_empty() {
            blockers = metas_of(db, left);
            blockers.extend(metas_of(db, right));
        }
        blockers.sort();
        blockers.dedup();
        log::trace!("{} {} {} {} {}", "deferred".yellow(), id, left, cmp, right);
        for meta in blockers {
            self.listeners.entry(meta).or_default().push(id);
        }
        self.equations.push(Some(Equation { left: left.clone(), right: right.clone(), cmp, span }));
    }

    fn is_prop_forced(&self, meta: MetaId) -> bool {
        self.props.iter().any(|(m, _)| *m == meta)
    }

    /// Solves `meta := value` after the occurs, scope and type checks. A
    /// failed check solves the metavariable to an error term instead.
    pub fn solve_meta(&mut self, db: &mut Database, meta: MetaId, value: Term, span: Span) -> bool {
        if let Some(existing) = db.meta_solution(meta).cloned() {
            return compare(db, self, &existing, &value, Cmp::Eq, span)
        }
        let data = match db.meta(meta) {
            Some(data) => data.clone(),
            None => return false
        };
        let value = zonk(db, &AHashMap::new(), &value);
        if value.as_meta() == Some(meta) { return true }

        let problem = if self.is_prop_forced(meta) && value.as_universe().is_none() && value.as_meta().is_none() {
            Some(ElabError::mismatch(span, "\\Prop", &value))
        } else if occurs(db, meta, &value) {
            Some(ElabError::inference(span, &data.name, format!("{} occurs in its own solution {}", meta, value)))
        } else if let Some(var) = free_vars(&value).into_iter().find(|v| !data.scope.contains(v)) {
            Some(ElabError::inference(span, &data.name, format!("{} is not in scope", var)))
        } else {
            None
        };
        let problem = match problem {
            Some(problem) => Some(problem),
            None => match type_of_in(db, &self.var_types, &value) {
                Some(actual) if !compare(db, self, &actual, &data.ty, Cmp::Le, span) =>
                    Some(ElabError::mismatch(span, &data.ty, &actual)),
                _ => None
            }
        };

        let solved = problem.is_none();
        let value = match problem {
            None => value,
            Some(error) => {
                self.report(error);
                db.make_error("ill-typed solution")
            }
        };
        if let Err(e) = db.solve_meta(meta, value.clone()) {
            // the type check above solved it through its own type
            log::debug!("{}", e);
            return match db.meta_solution(meta).cloned() {
                Some(existing) => compare(db, self, &existing, &value, Cmp::Eq, span),
                None => false
            }
        }
        self.wake(db, meta);
        solved
    }

    fn wake(&mut self, db: &mut Database, meta: MetaId) {
        if let Some(ids) = self.listeners.remove(&meta) {
            self.worklist.extend(ids);
        }
        self.drain(db);
    }

    /// Replays woken equations in registration order.
    fn drain(&mut self, db: &mut Database) {
        if self.draining { return }
        self.draining = true;
        while let Some(id) = self.worklist.pop_first() {
            let equation = match self.equations.get_mut(*id).and_then(Option::take) {
                Some(equation) => equation,
                None => continue
            };
            log::trace!("{} {}", "replaying".yellow(), id);
            if !compare(db, self, &equation.left, &equation.right, equation.cmp, equation.span) {
                let error = ElabError::mismatch(equation.span, &equation.right, &equation.left);
                self.report(error);
            }
        }
        self.draining = false;
    }

    /// A fresh level solve over every recorded constraint.
    pub fn solve_levels(&self) -> Result<LevelSolution, LevelError> {
        self.levels.solve()
    }

    /// Runs the solver passes in order: metavariables forced into `\Prop`,
    /// a first level pass, class call bounds and instances, a second level
    /// pass, and finally reports whatever is still unsolved.
    pub fn solve(&mut self, db: &mut Database) -> LevelSolution {
        for (meta, span) in self.props.clone() {
            let prop = db.make_universe(Sort::prop());
            match db.meta_solution(meta).cloned() {
                None => { self.solve_meta(db, meta, prop, span); }
                Some(solution) => if !compare(db, self, &solution, &prop, Cmp::Le, span) {
                    self.report(ElabError::mismatch(span, &prop, &solution));
                }
            }
        }

        let first = self.solve_levels().unwrap_or_default();
        self.solve_instances(db);
        self.solve_class_calls(db, &first);

        let solution = match self.solve_levels() {
            Ok(solution) => solution,
            Err(error) => {
                self.report_level_error(error);
                LevelSolution::default()
            }
        };
        self.report_unsolved(db);
        solution
    }

    fn report_level_error(&mut self, error: LevelError) {
        let error = match error {
            LevelError::Unsolved(constraint) => ElabError::LevelEquationUnsolved {
                span: source_span(constraint.span),
                chain: constraint.to_string()
            },
            LevelError::Cycle(chain) => ElabError::Cycle {
                span: source_span(chain.first().map_or((0, 0), |c| c.span)),
                chain: render_chain(&chain)
            }
        };
        self.report(error);
    }

    fn solve_instances(&mut self, db: &mut Database) {
        for meta in self.metas.clone() {
            let data = match db.meta(meta) {
                Some(data) if !data.is_solved() => data.clone(),
                _ => continue
            };
            let class = match data.kind {
                MetaKind::Instance { class } => class,
                MetaKind::Expression => continue
            };
            let ty = whnf(db, &data.ty);
            let classifying = db.class(class).and_then(|c| c.classifying_field);
            let carrier = if_chain! {
                if let Some(field) = classifying;
                if let Some(implementation) = ty.implementation(field).cloned();
                let implementation = whnf(db, &implementation);
                if let TermData::DataCall { data, .. } = &*implementation;
                then { Some(*data) }
                else { None }
            };
            match carrier.and_then(|d| db.find_instance(class, d)) {
                Some(instance) => {
                    let value = db.make_term(TermData::FunCall { fun: instance.fun, levels: Sort::SET0, args: vec![] });
                    self.solve_meta(db, meta, value, data.span);
                }
                None => {
                    let data_name = carrier.map_or_else(|| "an unknown type".to_string(), |d| d.to_string());
                    self.report(ElabError::InstanceNotFound {
                        span: source_span(data.span),
                        class: class.to_string(),
                        data: data_name
                    });
                    let error = db.make_error("missing instance");
                    let _ = db.solve_meta(meta, error);
                    self.wake(db, meta);
                }
            }
        }
    }

    /// Solves metavariables bounded below by class calls to the merge of
    /// their bounds, propagated along deferred `?a <= ?b` equations, then
    /// checks the upper bounds.
    fn solve_class_calls(&mut self, db: &mut Database, levels: &LevelSolution) {
        let edges: Vec<(MetaId, MetaId)> = self.pending()
            .filter_map(|eq| {
                let left = eq.left.as_meta()?;
                let right = eq.right.as_meta()?;
                match eq.cmp {
                    Cmp::Le => Some((left, right)),
                    Cmp::Ge => Some((right, left)),
                    Cmp::Eq => None
                }
            })
            .collect();

        let mut bounds: AHashMap<MetaId, Vec<(Term, Span)>> = AHashMap::new();
        for bound in self.lower_bounds.clone() {
            let class_call = zonk(db, levels.map(), &bound.class_call);
            bounds.entry(bound.meta).or_default().push((class_call, bound.span));
        }
        loop {
            let mut changed = false;
            for (lower, upper) in edges.iter() {
                let from = bounds.get(lower).cloned().unwrap_or_default();
                let to = bounds.entry(*upper).or_default();
                for bound in from {
                    if !to.iter().any(|(t, _)| *t == bound.0) {
                        to.push(bound);
                        changed = true;
                    }
                }
            }
            if !changed { break }
        }

        let mut metas: Vec<MetaId> = bounds.keys().copied().collect();
        metas.sort();
        for meta in metas {
            if db.meta_solution(meta).is_some() { continue }
            let list = bounds.get(&meta).cloned().unwrap_or_default();
            let span = match list.first() {
                Some((_, span)) => *span,
                None => continue
            };
            if let Some(merged) = self.merge_bounds(db, &list) {
                self.solve_meta(db, meta, merged, span);
            }
        }

        for bound in self.upper_bounds.clone() {
            match db.meta_solution(bound.meta).cloned() {
                Some(solution) => if !compare(db, self, &solution, &bound.class_call, Cmp::Le, bound.span) {
                    self.report(ElabError::mismatch(bound.span, &bound.class_call, &solution));
                },
                None => { self.solve_meta(db, bound.meta, bound.class_call.clone(), bound.span); }
            }
        }
    }

    /// The least class call above every bound: same class, the common
    /// implementations, and the maximum of the levels.
    fn merge_bounds(&mut self, db: &mut Database, list: &[(Term, Span)]) -> Option<Term> {
        let (first, span) = list.first()?.clone();
        let (class, levels, mut impls) = match &*first {
            TermData::ClassCall { class, levels, impls } => (*class, *levels, impls.clone()),
            _ => return None
        };
        let mut sorts = vec![levels];
        for (other, _) in list.iter().skip(1) {
            let (other_levels, other_impls) = match &**other {
                TermData::ClassCall { class: c, levels, impls } if *c == class => (*levels, impls.clone()),
                _ => {
                    self.report(ElabError::ClassConflict {
                        span: source_span(span),
                        first: first.to_string(),
                        second: other.to_string()
                    });
                    return None
                }
            };
            sorts.push(other_levels);
            let mut kept = Vec::new();
            for (field, value) in impls {
                if let Some((_, theirs)) = other_impls.iter().find(|(f, _)| *f == field) {
                    if !compare(db, self, &value, theirs, Cmp::Eq, span) {
                        self.report(ElabError::ClassConflict {
                            span: source_span(span),
                            first: first.to_string(),
                            second: other.to_string()
                        });
                        return None
                    }
                    kept.push((field, value));
                }
            }
            impls = kept;
        }
        let levels = if sorts.iter().all(|s| *s == sorts[0]) { sorts[0] } else {
            let fresh = self.fresh_sort(db);
            self.levels.set_span(span);
            for sort in sorts {
                sort.compare(&fresh, Cmp::Le, &mut self.levels);
            }
            fresh
        };
        Some(db.make_term(TermData::ClassCall { class, levels, impls }))
    }

    fn report_unsolved(&mut self, db: &mut Database) {
        let remaining: Vec<Equation> = self.equations.iter_mut().filter_map(Option::take).collect();
        for equation in remaining {
            let left = zonk(db, &AHashMap::new(), &equation.left);
            let right = zonk(db, &AHashMap::new(), &equation.right);
            let vacuous = [&left, &right].iter()
                .any(|t| stuck_on(db, t).map_or(false, |s| s.is_error()));
            if vacuous { continue }
            let closed = metas_of(db, &left).is_empty() && metas_of(db, &right).is_empty();
            if closed && compare(db, self, &left, &right, equation.cmp, equation.span) { continue }
            self.report(ElabError::UnsolvedEquation {
                span: source_span(equation.span),
                left: left.to_string(),
                right: right.to_string(),
                cmp: equation.cmp
            });
        }
        for meta in self.metas.clone() {
            let data = match db.meta(meta) {
                Some(data) if !data.is_solved() => data.clone(),
                _ => continue
            };
            self.report(ElabError::inference(data.span, &data.name, "no equation determines it"));
            let error = db.make_error("unsolved");
            let _ = db.solve_meta(meta, error);
        }
    }
}
