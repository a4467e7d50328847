
use std::collections::VecDeque;

use if_chain::if_chain;

use crate::utility::*;
use crate::term::*;
use crate::level::Sort;
use crate::elim::*;
use crate::definition::*;
use crate::database::Database;
use crate::subst::*;

const RED_ZONE: usize = 64 * 1024;
const STACK_GROW: usize = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizationMode {
    Whnf,
    Nf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsWhnf {
    Definitely,
    DefinitelyNot,
    /// The head is a function whose body is still being elaborated.
    Unknown,
}

/// Outcome of running arguments through an elimination tree.
#[derive(Debug, Clone)]
pub enum Walk {
    Reduced(Term),
    /// Blocked on the given (weak-head normal) argument.
    Stuck(Term),
    /// A constructor with no branch: only reachable from absurd or incomplete matches.
    Missing,
}

pub fn normalize(db: &mut Database, mode: NormalizationMode, term: &Term) -> Term {
    match mode {
        NormalizationMode::Whnf => whnf(db, term),
        NormalizationMode::Nf => stacker::maybe_grow(RED_ZONE, STACK_GROW, || nf(db, term))
    }
}

pub fn whnf(db: &mut Database, term: &Term) -> Term {
    let mut current = term.clone();
    while let Some(next) = step(db, &current) {
        current = next;
    }
    current
}

/// One head reduction, if the head is a redex.
fn step(db: &mut Database, term: &Term) -> Option<Term> {
    match &**term {
        TermData::Infer { meta } => db.meta_solution(*meta).cloned(),
        TermData::App { fun, arg } => {
            let fun = whnf(db, fun);
            match &*fun {
                TermData::Lambda { var, body, .. } => {
                    let s = Subst::single(*var, arg.clone());
                    Some(subst_term(db, &s, body))
                }
                _ => None
            }
        }
        TermData::Project { tuple, field } => {
            let tuple = whnf(db, tuple);
            match &*tuple {
                TermData::Tuple { fields, .. } => fields.get(*field).cloned(),
                _ => None
            }
        }
        TermData::FieldCall { field, arg, .. } => {
            let arg = whnf(db, arg);
            match &*arg {
                TermData::New { class_call } => class_call.implementation(*field).cloned(),
                _ => None
            }
        }
        TermData::FunCall { fun, levels, args } => unfold(db, *fun, *levels, args),
        TermData::Case { args, tree, .. } => match walk_elim(db, tree, args) {
            Walk::Reduced(result) => Some(result),
            Walk::Stuck(_) | Walk::Missing => None
        },
        _ => None
    }
}

fn unfold(db: &mut Database, fun: DefId, levels: Sort, args: &[Term]) -> Option<Term> {
    let def = db.function(fun)?.clone();
    if def.params.len() != args.len() { return None }
    if def.builtin == Some(Builtin::Coe) {
        if let Some(result) = coe_constant_family(db, args) {
            return Some(result)
        }
    }
    match def.body? {
        FunctionBody::Term(body) => {
            let mut s = Subst::instantiate(&def.params, args);
            s.add_std_levels(levels);
            Some(subst_term(db, &s, &body))
        }
        FunctionBody::Elim(tree) => {
            let tree = subst_tree(db, &Subst::std_levels(levels), &tree);
            match walk_elim(db, &tree, args) {
                Walk::Reduced(result) => Some(result),
                Walk::Stuck(_) | Walk::Missing => None
            }
        }
    }
}

/// `coe (\lam _ => A) a i => a`
fn coe_constant_family(db: &mut Database, args: &[Term]) -> Option<Term> {
    let family = whnf(db, args.first()?);
    if_chain! {
        if let TermData::Lambda { var, body, .. } = &*family;
        if !free_vars(body).contains(var);
        then { args.get(1).cloned() }
        else { None }
    }
}

/// Which endpoint of the interval `term` is, after weak-head normalization.
pub fn endpoint(db: &mut Database, term: &Term) -> Option<Endpoint> {
    let term = whnf(db, term);
    match &*term {
        TermData::ConCall { con, .. } => constructor_endpoint(db, *con),
        _ => None
    }
}

pub fn constructor_endpoint(db: &Database, con: DefId) -> Option<Endpoint> {
    let data = db.constructor(con)?.data;
    let data = db.data(data)?;
    if !data.interval { return None }
    match data.constructors.iter().position(|c| *c == con) {
        Some(0) => Some(Endpoint::Left),
        Some(1) => Some(Endpoint::Right),
        _ => None
    }
}

/// Runs `args` through `tree`. The tree's parameters bind the arguments in order.
pub fn walk_elim(db: &mut Database, tree: &ElimTree, args: &[Term]) -> Walk {
    let mut s = Subst::new();
    let mut stack: VecDeque<Term> = args.iter().cloned().collect();
    let mut node = tree;
    loop {
        let params = node.params();
        if stack.len() < params.len() { return Walk::Missing }
        match node {
            ElimTree::Interval { cases, otherwise, .. } => {
                let bound: Vec<Term> = stack.iter().take(params.len()).cloned().collect();
                let first = params.len().saturating_sub(cases.len());
                let mut blocked = None;
                for (case, arg) in cases.iter().zip(bound[first..].iter()) {
                    if case.is_empty() { continue }
                    let arg = whnf(db, arg);
                    match endpoint(db, &arg) {
                        Some(side) => {
                            if let Some(body) = case.get(side) {
                                bind(&mut s, params, &bound);
                                let result = subst_term(db, &s, body);
                                return Walk::Reduced(apply_rest(db, result, stack.into_iter().skip(params.len())))
                            }
                        }
                        None => if blocked.is_none() { blocked = Some(arg) }
                    }
                }
                match otherwise {
                    Some(otherwise) => node = otherwise,
                    None => return blocked.map_or(Walk::Missing, Walk::Stuck)
                }
            }
            ElimTree::Leaf { body, .. } => {
                let bound: Vec<Term> = stack.drain(..params.len()).collect();
                bind(&mut s, params, &bound);
                let result = subst_term(db, &s, body);
                return Walk::Reduced(apply_rest(db, result, stack.into_iter()))
            }
            ElimTree::Branch { .. } => {
                let bound: Vec<Term> = stack.drain(..params.len()).collect();
                bind(&mut s, params, &bound);
                let scrutinee = match stack.pop_front() {
                    Some(arg) => whnf(db, &arg),
                    None => return Walk::Missing
                };
                let (key, fields) = match &*scrutinee {
                    TermData::ConCall { con, args, .. } => (BranchKey::Con(*con), args.clone()),
                    TermData::Tuple { fields, .. } => (BranchKey::Tuple(fields.len()), fields.clone()),
                    _ => return Walk::Stuck(scrutinee)
                };
                match node.child(key) {
                    Some(child) => {
                        for field in fields.into_iter().rev() {
                            stack.push_front(field);
                        }
                        node = child;
                    }
                    None => return Walk::Missing
                }
            }
        }
    }
}

fn apply_rest(db: &mut Database, fun: Term, rest: impl Iterator<Item = Term>) -> Term {
    rest.fold(fun, |fun, arg| db.make_term(TermData::App { fun, arg }))
}

fn bind(s: &mut Subst, params: &Telescope, args: &[Term]) {
    for (link, arg) in params.iter().zip(args.iter()) {
        s.add(link.var, arg.clone());
    }
}

fn nf(db: &mut Database, term: &Term) -> Term {
    let term = whnf(db, term);
    let data = match term.cloned() {
        TermData::Ref { .. } | TermData::Universe { .. } | TermData::Infer { .. } => return term,
        TermData::Lambda { mode, var, domain, body } => TermData::Lambda {
            mode, var,
            domain: normalize(db, NormalizationMode::Nf, &domain),
            body: normalize(db, NormalizationMode::Nf, &body)
        },
        TermData::Pi { mode, var, domain, codomain } => TermData::Pi {
            mode, var,
            domain: normalize(db, NormalizationMode::Nf, &domain),
            codomain: normalize(db, NormalizationMode::Nf, &codomain)
        },
        TermData::Sigma { params } => TermData::Sigma { params: nf_telescope(db, &params) },
        TermData::Tuple { fields, sigma } => TermData::Tuple {
            fields: nf_all(db, &fields),
            sigma: normalize(db, NormalizationMode::Nf, &sigma)
        },
        TermData::Project { tuple, field } => TermData::Project {
            tuple: normalize(db, NormalizationMode::Nf, &tuple),
            field
        },
        TermData::App { fun, arg } => TermData::App {
            fun: normalize(db, NormalizationMode::Nf, &fun),
            arg: normalize(db, NormalizationMode::Nf, &arg)
        },
        TermData::FunCall { fun, levels, args } => TermData::FunCall { fun, levels, args: nf_all(db, &args) },
        TermData::ConCall { con, levels, data_args, args } => TermData::ConCall {
            con, levels,
            data_args: nf_all(db, &data_args),
            args: nf_all(db, &args)
        },
        TermData::DataCall { data, levels, args } => TermData::DataCall { data, levels, args: nf_all(db, &args) },
        TermData::ClassCall { class, levels, impls } => TermData::ClassCall {
            class, levels,
            impls: impls.iter().map(|(f, t)| (*f, normalize(db, NormalizationMode::Nf, t))).collect()
        },
        TermData::FieldCall { field, levels, arg } => TermData::FieldCall {
            field, levels,
            arg: normalize(db, NormalizationMode::Nf, &arg)
        },
        TermData::New { class_call } => TermData::New { class_call: normalize(db, NormalizationMode::Nf, &class_call) },
        TermData::Case { args, params, result, tree } => TermData::Case {
            args: nf_all(db, &args),
            params,
            result,
            tree
        },
        TermData::Error { .. } => return term,
    };
    db.make_term(data)
}

fn nf_all(db: &mut Database, terms: &[Term]) -> Vec<Term> {
    terms.iter().map(|t| normalize(db, NormalizationMode::Nf, t)).collect()
}

fn nf_telescope(db: &mut Database, tele: &Telescope) -> Telescope {
    let params = tele.to_params()
        .into_iter()
        .map(|(mode, var, ty)| (mode, var, normalize(db, NormalizationMode::Nf, &ty)))
        .collect();
    Telescope::from_params(params)
}

pub fn is_whnf(db: &mut Database, term: &Term) -> IsWhnf {
    match &**term {
        TermData::Infer { meta } => {
            if db.meta_solution(*meta).is_some() { IsWhnf::DefinitelyNot } else { IsWhnf::Definitely }
        }
        TermData::App { fun, .. } => match &**fun {
            TermData::Lambda { .. } => IsWhnf::DefinitelyNot,
            _ => is_whnf(db, fun)
        },
        TermData::Project { tuple, .. } => match &**tuple {
            TermData::Tuple { .. } => IsWhnf::DefinitelyNot,
            _ => is_whnf(db, tuple)
        },
        TermData::FieldCall { arg, .. } => match &**arg {
            TermData::New { .. } => IsWhnf::DefinitelyNot,
            _ => is_whnf(db, arg)
        },
        TermData::FunCall { fun, .. } => {
            let in_progress = db.function(*fun).map_or(false, |def| def.status == Status::InProgress);
            if in_progress { return IsWhnf::Unknown }
            if step(db, term).is_some() { IsWhnf::DefinitelyNot } else { IsWhnf::Definitely }
        }
        TermData::Case { .. } => {
            if step(db, term).is_some() { IsWhnf::DefinitelyNot } else { IsWhnf::Definitely }
        }
        _ => IsWhnf::Definitely
    }
}

/// The subterm that blocks reduction of `term`: an unsolved metavariable, an
/// error, or the function call whose elimination has no matching branch.
pub fn stuck_on(db: &mut Database, term: &Term) -> Option<Term> {
    let term = whnf(db, term);
    match &*term {
        TermData::Infer { .. } | TermData::Error { .. } => Some(term.clone()),
        TermData::App { fun, .. } => stuck_on(db, fun),
        TermData::Project { tuple, .. } => stuck_on(db, tuple),
        TermData::FieldCall { arg, .. } => stuck_on(db, arg),
        TermData::FunCall { fun, levels, args } => {
            let def = db.function(*fun)?.clone();
            if def.builtin == Some(Builtin::Coe) {
                let interval = args.get(2).and_then(|i| stuck_on(db, i));
                return interval.or_else(|| args.first().and_then(|family| stuck_on(db, family)))
            }
            match def.body? {
                FunctionBody::Term(_) => None,
                FunctionBody::Elim(tree) => {
                    let tree = subst_tree(db, &Subst::std_levels(*levels), &tree);
                    stuck_on_walk(db, &term, &tree, args)
                }
            }
        }
        TermData::Case { args, tree, .. } => stuck_on_walk(db, &term, tree, args),
        _ => None
    }
}

fn stuck_on_walk(db: &mut Database, term: &Term, tree: &ElimTree, args: &[Term]) -> Option<Term> {
    match walk_elim(db, tree, args) {
        Walk::Reduced(_) => None,
        Walk::Stuck(arg) => stuck_on(db, &arg),
        Walk::Missing => Some(term.clone())
    }
}

/// The metavariable blocking `term`, if that is what blocks it.
pub fn stuck_meta(db: &mut Database, term: &Term) -> Option<MetaId> {
    stuck_on(db, term).and_then(|t| t.as_meta())
}
