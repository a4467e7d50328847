
use std::borrow::Cow;

use ahash::{AHashMap, AHashSet};

use crate::utility::*;
use crate::term::*;
use crate::level::*;
use crate::elim::*;
use crate::database::Database;

const RED_ZONE: usize = 64 * 1024;
const STACK_GROW: usize = 1024 * 1024;

/// Simultaneous substitution of terms for bindings and levels for level
/// variables. With `zonk` set, solved metavariables are replaced by their
/// solutions as well.
#[derive(Debug, Clone, Default)]
pub struct Subst {
    terms: AHashMap<Var, Term>,
    levels: AHashMap<LevelVar, Level>,
    range: AHashSet<Var>,
    zonk: bool,
}

impl Subst {
    pub fn new() -> Subst { Subst::default() }

    pub fn zonking() -> Subst {
        Subst { zonk: true, ..Subst::default() }
    }

    pub fn single(var: Var, term: Term) -> Subst {
        let mut result = Subst::new();
        result.add(var, term);
        result
    }

    /// Maps the bindings of `params` to `args` in order; extra bindings are left alone.
    pub fn instantiate(params: &Telescope, args: &[Term]) -> Subst {
        let mut result = Subst::new();
        for (link, arg) in params.iter().zip(args.iter()) {
            result.add(link.var, arg.clone());
        }
        result
    }

    /// Maps `\lp` and `\lh` to the components of `sort`.
    pub fn std_levels(sort: Sort) -> Subst {
        let mut result = Subst::new();
        result.add_std_levels(sort);
        result
    }

    pub fn add_std_levels(&mut self, sort: Sort) {
        self.add_level(LevelVar::Std(LevelKind::PLevel), sort.p);
        self.add_level(LevelVar::Std(LevelKind::HLevel), sort.h);
    }

    pub fn add(&mut self, var: Var, term: Term) {
        self.range.extend(free_vars(&term));
        self.terms.insert(var, term);
    }

    /// Drops the mapping for `var`, for use under a binder that shadows it.
    pub fn remove(&mut self, var: Var) {
        self.terms.remove(&var);
    }

    pub fn add_level(&mut self, var: LevelVar, level: Level) {
        self.levels.insert(var, level);
    }

    pub fn with_levels(mut self, levels: &AHashMap<LevelVar, Level>) -> Subst {
        self.levels.extend(levels.iter().map(|(k, v)| (*k, *v)));
        self
    }

    pub fn get(&self, var: Var) -> Option<&Term> { self.terms.get(&var) }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty() && self.levels.is_empty() && !self.zonk
    }

    pub fn level(&self, level: &Level) -> Level {
        if self.levels.is_empty() { return *level }
        level.subst(&|v| self.levels.get(&v).copied())
    }

    pub fn sort(&self, sort: &Sort) -> Sort {
        if self.levels.is_empty() { return *sort }
        sort.subst(&|v| self.levels.get(&v).copied())
    }

    fn captures(&self, var: Var) -> bool { self.range.contains(&var) }
}

pub fn subst_term(db: &mut Database, s: &Subst, term: &Term) -> Term {
    if s.is_empty() { return term.clone() }
    stacker::maybe_grow(RED_ZONE, STACK_GROW, || subst_inner(db, s, term))
}

fn subst_all(db: &mut Database, s: &Subst, terms: &[Term]) -> Vec<Term> {
    terms.iter().map(|t| subst_term(db, s, t)).collect()
}

fn subst_binder(db: &mut Database, s: &Subst, var: Var) -> (Var, Option<Subst>) {
    if s.captures(var) {
        let renamed = db.rename_var(var);
        let reference = db.make_ref(renamed);
        let mut extended = s.clone();
        extended.add(var, reference);
        (renamed, Some(extended))
    } else if s.get(var).is_some() {
        let mut shadowed = s.clone();
        shadowed.remove(var);
        (var, Some(shadowed))
    } else {
        (var, None)
    }
}

fn subst_inner(db: &mut Database, s: &Subst, term: &Term) -> Term {
    let data = match term.cloned() {
        TermData::Ref { var } => return s.get(var).cloned().unwrap_or_else(|| term.clone()),
        TermData::Lambda { mode, var, domain, body } => {
            let domain = subst_term(db, s, &domain);
            let (var, extended) = subst_binder(db, s, var);
            let body = subst_term(db, extended.as_ref().unwrap_or(s), &body);
            TermData::Lambda { mode, var, domain, body }
        }
        TermData::Pi { mode, var, domain, codomain } => {
            let domain = subst_term(db, s, &domain);
            let (var, extended) = subst_binder(db, s, var);
            let codomain = subst_term(db, extended.as_ref().unwrap_or(s), &codomain);
            TermData::Pi { mode, var, domain, codomain }
        }
        TermData::Sigma { params } => {
            let (params, _) = subst_telescope(db, s, &params);
            TermData::Sigma { params }
        }
        TermData::Tuple { fields, sigma } => TermData::Tuple {
            fields: subst_all(db, s, &fields),
            sigma: subst_term(db, s, &sigma)
        },
        TermData::Project { tuple, field } => TermData::Project {
            tuple: subst_term(db, s, &tuple),
            field
        },
        TermData::Universe { sort } => TermData::Universe { sort: s.sort(&sort) },
        TermData::App { fun, arg } => TermData::App {
            fun: subst_term(db, s, &fun),
            arg: subst_term(db, s, &arg)
        },
        TermData::FunCall { fun, levels, args } => TermData::FunCall {
            fun,
            levels: s.sort(&levels),
            args: subst_all(db, s, &args)
        },
        TermData::ConCall { con, levels, data_args, args } => TermData::ConCall {
            con,
            levels: s.sort(&levels),
            data_args: subst_all(db, s, &data_args),
            args: subst_all(db, s, &args)
        },
        TermData::DataCall { data, levels, args } => TermData::DataCall {
            data,
            levels: s.sort(&levels),
            args: subst_all(db, s, &args)
        },
        TermData::ClassCall { class, levels, impls } => TermData::ClassCall {
            class,
            levels: s.sort(&levels),
            impls: impls.iter().map(|(f, t)| (*f, subst_term(db, s, t))).collect()
        },
        TermData::FieldCall { field, levels, arg } => TermData::FieldCall {
            field,
            levels: s.sort(&levels),
            arg: subst_term(db, s, &arg)
        },
        TermData::New { class_call } => TermData::New { class_call: subst_term(db, s, &class_call) },
        TermData::Case { args, params, result, tree } => {
            let args = subst_all(db, s, &args);
            let (params, inner) = subst_telescope(db, s, &params);
            let result = subst_term(db, &inner, &result);
            let tree = subst_tree(db, s, &tree);
            TermData::Case { args, params, result, tree }
        }
        TermData::Infer { meta } => {
            if s.zonk {
                if let Some(solution) = db.meta_solution(meta).cloned() {
                    return subst_term(db, s, &solution)
                }
            }
            return term.clone()
        }
        TermData::Error { message, expr } => TermData::Error {
            message,
            expr: expr.map(|e| subst_term(db, s, &e))
        },
    };
    db.make_term(data)
}

/// Substitutes into the types of a telescope. Binders free in the range are
/// renamed; the returned substitution also covers the renamings and is meant
/// for everything in scope of the telescope. Unchanged tails are shared.
pub fn subst_telescope<'a>(db: &mut Database, s: &'a Subst, tele: &Telescope) -> (Telescope, Cow<'a, Subst>) {
    let mut scope = Cow::Borrowed(s);
    let mut links = vec![];
    let mut changed_at = None;
    for (i, link) in tele.iter().enumerate() {
        let ty = subst_term(db, &scope, &link.ty);
        let var = if scope.captures(link.var) {
            let renamed = db.rename_var(link.var);
            let reference = db.make_ref(renamed);
            scope.to_mut().add(link.var, reference);
            renamed
        } else {
            if scope.get(link.var).is_some() { scope.to_mut().remove(link.var) }
            link.var
        };
        if ty != link.ty || var != link.var { changed_at = Some(i) }
        links.push((link.mode, var, ty));
    }
    let result = match changed_at {
        None => tele.clone(),
        Some(last) => {
            let tail = tele.skip(last + 1);
            links.truncate(last + 1);
            links.into_iter()
                .rev()
                .fold(tail, |next, (mode, var, ty)| Telescope::cons(mode, var, ty, next))
        }
    };
    (result, scope)
}

pub fn subst_tree(db: &mut Database, s: &Subst, tree: &ElimTree) -> ElimTree {
    match tree {
        ElimTree::Leaf { params, body } => {
            let (params, inner) = subst_telescope(db, s, params);
            let body = subst_term(db, &inner, body);
            ElimTree::Leaf { params, body }
        }
        ElimTree::Branch { params, children } => {
            let (params, inner) = subst_telescope(db, s, params);
            let children = children.iter()
                .map(|(key, child)| (*key, subst_tree(db, &inner, child)))
                .collect();
            ElimTree::Branch { params, children }
        }
        ElimTree::Interval { params, cases, otherwise } => {
            let (new_params, inner) = subst_telescope(db, s, params);
            let cases = cases.iter()
                .map(|case| IntervalCase {
                    left: case.left.as_ref().map(|t| subst_term(db, &inner, t)),
                    right: case.right.as_ref().map(|t| subst_term(db, &inner, t)),
                })
                .collect();
            let otherwise = otherwise.as_ref().map(|t| Box::new(subst_tree(db, s, t)));
            ElimTree::Interval { params: new_params, cases, otherwise }
        }
    }
}

/// Replaces every solved metavariable by its solution and applies `levels`.
pub fn zonk(db: &mut Database, levels: &AHashMap<LevelVar, Level>, term: &Term) -> Term {
    let s = Subst::zonking().with_levels(levels);
    subst_term(db, &s, term)
}

pub fn free_vars(term: &Term) -> AHashSet<Var> {
    let mut result = AHashSet::new();
    collect_free(term, &mut AHashSet::new(), &mut result);
    result
}

fn collect_free(term: &Term, bound: &mut AHashSet<Var>, out: &mut AHashSet<Var>) {
    match &**term {
        TermData::Ref { var } => if !bound.contains(var) { out.insert(*var); },
        TermData::Lambda { var, domain, body: inner, .. }
        | TermData::Pi { var, domain, codomain: inner, .. } => {
            collect_free(domain, bound, out);
            let fresh = bound.insert(*var);
            collect_free(inner, bound, out);
            if fresh { bound.remove(var); }
        }
        TermData::Sigma { params } => {
            let added = collect_telescope(params, bound, out);
            for var in added { bound.remove(&var); }
        }
        TermData::Case { args, params, result, tree } => {
            for arg in args { collect_free(arg, bound, out) }
            let added = collect_telescope(params, bound, out);
            collect_free(result, bound, out);
            for var in added { bound.remove(&var); }
            collect_tree(tree, bound, out);
        }
        TermData::Infer { .. } | TermData::Universe { .. } => { }
        _ => {
            for child in children(term) {
                collect_free(child, bound, out);
            }
        }
    }
}

fn collect_telescope(tele: &Telescope, bound: &mut AHashSet<Var>, out: &mut AHashSet<Var>) -> Vec<Var> {
    let mut added = vec![];
    for link in tele.iter() {
        collect_free(&link.ty, bound, out);
        if bound.insert(link.var) { added.push(link.var) }
    }
    added
}

fn collect_tree(tree: &ElimTree, bound: &mut AHashSet<Var>, out: &mut AHashSet<Var>) {
    let added = collect_telescope(tree.params(), bound, out);
    match tree {
        ElimTree::Leaf { body, .. } => collect_free(body, bound, out),
        ElimTree::Branch { children, .. } => {
            for (_, child) in children { collect_tree(child, bound, out) }
        }
        ElimTree::Interval { cases, .. } => {
            for case in cases {
                if let Some(t) = &case.left { collect_free(t, bound, out) }
                if let Some(t) = &case.right { collect_free(t, bound, out) }
            }
        }
    }
    for var in added { bound.remove(&var); }
    if let ElimTree::Interval { otherwise: Some(otherwise), .. } = tree {
        collect_tree(otherwise, bound, out);
    }
}

/// Immediate subterms, binder types included, ignoring scoping.
pub fn children(term: &Term) -> Vec<&Term> {
    match &**term {
        TermData::Ref { .. } | TermData::Universe { .. } | TermData::Infer { .. } => vec![],
        TermData::Lambda { domain, body, .. } => vec![domain, body],
        TermData::Pi { domain, codomain, .. } => vec![domain, codomain],
        TermData::Sigma { params } => params.iter().map(|l| &l.ty).collect(),
        TermData::Tuple { fields, sigma } => fields.iter().chain(std::iter::once(sigma)).collect(),
        TermData::Project { tuple, .. } => vec![tuple],
        TermData::App { fun, arg } => vec![fun, arg],
        TermData::FunCall { args, .. } | TermData::DataCall { args, .. } => args.iter().collect(),
        TermData::ConCall { data_args, args, .. } => data_args.iter().chain(args.iter()).collect(),
        TermData::ClassCall { impls, .. } => impls.iter().map(|(_, t)| t).collect(),
        TermData::FieldCall { arg, .. } => vec![arg],
        TermData::New { class_call } => vec![class_call],
        TermData::Case { args, params, result, tree } => args.iter()
            .chain(params.iter().map(|l| &l.ty))
            .chain(std::iter::once(result))
            .chain(tree.terms())
            .collect(),
        TermData::Error { expr, .. } => expr.iter().collect(),
    }
}

/// Unsolved metavariables occurring in `term`, following solutions of solved ones.
pub fn metas_of(db: &Database, term: &Term) -> Vec<MetaId> {
    let mut result = vec![];
    let mut seen = AHashSet::new();
    collect_metas(db, term, &mut seen, &mut result);
    result
}

fn collect_metas(db: &Database, term: &Term, seen: &mut AHashSet<MetaId>, out: &mut Vec<MetaId>) {
    if let TermData::Infer { meta } = &**term {
        if !seen.insert(*meta) { return }
        match db.meta_solution(*meta) {
            Some(solution) => collect_metas(db, solution, seen, out),
            None => out.push(*meta)
        }
        return
    }
    for child in children(term) {
        collect_metas(db, child, seen, out);
    }
}

pub fn occurs(db: &Database, meta: MetaId, term: &Term) -> bool {
    metas_of(db, term).contains(&meta)
}

/// Level variables occurring in `term`.
pub fn level_vars(term: &Term) -> Vec<LevelVar> {
    let mut result = vec![];
    collect_levels(term, &mut result);
    result.sort();
    result.dedup();
    result
}

fn collect_levels(term: &Term, out: &mut Vec<LevelVar>) {
    let sort = match &**term {
        TermData::Universe { sort } => Some(*sort),
        TermData::FunCall { levels, .. }
        | TermData::ConCall { levels, .. }
        | TermData::DataCall { levels, .. }
        | TermData::ClassCall { levels, .. }
        | TermData::FieldCall { levels, .. } => Some(*levels),
        _ => None
    };
    if let Some(sort) = sort {
        out.extend(sort.p.get_var());
        out.extend(sort.h.get_var());
    }
    for child in children(term) {
        collect_levels(child, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MetaKind;

    #[test]
    fn identity_substitution_returns_the_same_node() {
        let mut db = Database::new();
        let x = db.fresh_var("x");
        let y = db.fresh_var("y");
        let set = db.make_universe(Sort::set(0));
        let x_ref = db.make_ref(x);
        let y_ref = db.make_ref(y);
        let body = db.make_term(TermData::App { fun: x_ref.clone(), arg: y_ref.clone() });
        let lam = db.make_term(TermData::Lambda { mode: Mode::Explicit, var: y, domain: set, body });
        let mut s = Subst::new();
        s.add(x, x_ref);
        let result = subst_term(&mut db, &s, &lam);
        assert_eq!(result, lam);
    }

    #[test]
    fn binders_are_renamed_only_on_capture() {
        let mut db = Database::new();
        let x = db.fresh_var("x");
        let y = db.fresh_var("y");
        let set = db.make_universe(Sort::set(0));
        let x_ref = db.make_ref(x);
        let y_ref = db.make_ref(y);
        let body = db.make_term(TermData::App { fun: x_ref, arg: y_ref.clone() });
        let lam = db.make_term(TermData::Lambda { mode: Mode::Explicit, var: y, domain: set, body });
        // x := y would capture
        let result = subst_term(&mut db, &Subst::single(x, y_ref.clone()), &lam);
        match &*result {
            TermData::Lambda { var, body, .. } => {
                assert_ne!(*var, y);
                assert!(free_vars(body).contains(&y));
                assert!(free_vars(&result).contains(&y));
            }
            _ => panic!("expected a lambda")
        }
    }

    #[test]
    fn bound_variables_are_shadowed() {
        let mut db = Database::new();
        let y = db.fresh_var("y");
        let z = db.fresh_var("z");
        let set = db.make_universe(Sort::set(0));
        let y_ref = db.make_ref(y);
        let lam = db.make_term(TermData::Lambda { mode: Mode::Explicit, var: y, domain: set.clone(), body: y_ref.clone() });
        let s = Subst::single(y, set.clone());
        assert_eq!(subst_term(&mut db, &s, &lam), lam);

        // the first link's type still sees the outer y
        let tele = Telescope::from_links(vec![(z, y_ref.clone()), (y, set.clone()), (z, y_ref)]);
        let (result, inner) = subst_telescope(&mut db, &s, &tele);
        let types: Vec<Term> = result.iter().map(|l| l.ty.clone()).collect();
        assert_eq!(types[0], set);
        assert_eq!(types[2], db.make_ref(y));
        assert!(inner.get(y).is_none());
    }

    #[test]
    fn telescope_substitution_shares_the_untouched_tail() {
        let mut db = Database::new();
        let a = db.fresh_var("A");
        let x = db.fresh_var("x");
        let n = db.fresh_var("n");
        let set = db.make_universe(Sort::set(0));
        let a_ref = db.make_ref(a);
        let tail = Telescope::from_links(vec![(n, set.clone())]);
        let tele = Telescope::cons(Mode::Explicit, x, a_ref, tail.clone());
        let nat = db.make_universe(Sort::set(1));
        let (result, _) = subst_telescope(&mut db, &Subst::single(a, nat.clone()), &tele);
        assert_eq!(result.first().map(|l| l.ty.clone()), Some(nat));
        assert!(result.skip(1).ptr_eq(&tail));
    }

    #[test]
    fn zonk_follows_solutions() {
        let mut db = Database::new();
        let set = db.make_universe(Sort::set(0));
        let meta = db.fresh_meta("m", set.clone(), imbl::Vector::new(), MetaKind::Expression, (0, 0));
        let hole = db.make_term(TermData::Infer { meta });
        let arrow = db.make_arrow(hole.clone(), hole);
        assert_eq!(metas_of(&db, &arrow), vec![meta]);
        let prop = db.make_universe(Sort::prop());
        assert!(db.solve_meta(meta, prop.clone()).is_ok());
        let zonked = zonk(&mut db, &AHashMap::new(), &arrow);
        match &*zonked {
            TermData::Pi { domain, codomain, .. } => {
                assert_eq!(*domain, prop);
                assert_eq!(*codomain, prop);
            }
            _ => panic!("expected a pi")
        }
        assert!(metas_of(&db, &arrow).is_empty());
    }
}
