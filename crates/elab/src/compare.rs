
use colored::Colorize;
use if_chain::if_chain;

use cubix_core::prelude::*;
use crate::equations::Equations;

const RED_ZONE: usize = 64 * 1024;
const STACK_GROW: usize = 1024 * 1024;

/// Decides `left cmp right` up to conversion, solving or deferring
/// metavariable constraints through `eqs`. `Le` is subtyping: universes are
/// cumulative and class calls with more implementations are smaller.
pub fn compare(db: &mut Database, eqs: &mut Equations, left: &Term, right: &Term, cmp: Cmp, span: Span) -> bool {
    stacker::maybe_grow(RED_ZONE, STACK_GROW, || compare_inner(db, eqs, left, right, cmp, span))
}

fn compare_inner(db: &mut Database, eqs: &mut Equations, left: &Term, right: &Term, cmp: Cmp, span: Span) -> bool {
    if left == right { return true }
    let left = whnf(db, left);
    let left = implemented_field(db, eqs, left);
    let right = whnf(db, right);
    let right = implemented_field(db, eqs, right);
    if left == right { return true }
    if left.is_error() || right.is_error() { return true }
    log::trace!("{} {} {}", left, cmp.to_string().bright_blue(), right);

    match (left.as_meta(), right.as_meta()) {
        (Some(meta), Some(_)) => {
            if cmp == Cmp::Eq { return eqs.add_equation(db, meta, &right, cmp, span) }
            eqs.defer(db, &left, &right, cmp, span);
            return true
        }
        (Some(meta), None) => return eqs.add_equation(db, meta, &right, cmp, span),
        (None, Some(meta)) => return eqs.add_equation(db, meta, &left, cmp.flip(), span),
        (None, None) => { }
    }
    if stuck_meta(db, &left).is_some() || stuck_meta(db, &right).is_some() {
        eqs.defer(db, &left, &right, cmp, span);
        return true
    }
    compare_whnf(db, eqs, &left, &right, cmp, span)
}

/// A field of a variable whose class call implements it.
fn implemented_field(db: &mut Database, eqs: &Equations, term: Term) -> Term {
    let implementation = if_chain! {
        if let TermData::FieldCall { field, arg, .. } = &*term;
        if let TermData::Ref { var } = &**arg;
        if let Some(ty) = eqs.typing_context().get(var).cloned();
        then { whnf(db, &ty).implementation(*field).cloned() }
        else { None }
    };
    match implementation {
        Some(implementation) => {
            let implementation = whnf(db, &implementation);
            implemented_field(db, eqs, implementation)
        }
        None => term
    }
}

fn compare_whnf(db: &mut Database, eqs: &mut Equations, left: &Term, right: &Term, cmp: Cmp, span: Span) -> bool {
    match (&**left, &**right) {
        (TermData::Universe { sort: s1 }, TermData::Universe { sort: s2 }) =>
            compare_sorts(eqs, s1, s2, cmp, span),
        (TermData::Pi { mode: m1, var: v1, domain: d1, codomain: c1 }
        , TermData::Pi { mode: m2, var: v2, domain: d2, codomain: c2 }) => {
            if m1 != m2 || !compare(db, eqs, d1, d2, Cmp::Eq, span) { return false }
            let c2 = rename(db, *v2, *v1, c2);
            eqs.bind(*v1, d1.clone());
            compare(db, eqs, c1, &c2, cmp, span)
        }
        (TermData::Lambda { var: v1, domain, body: b1, .. }, TermData::Lambda { var: v2, body: b2, .. }) => {
            let b2 = rename(db, *v2, *v1, b2);
            eqs.bind(*v1, domain.clone());
            compare(db, eqs, b1, &b2, Cmp::Eq, span)
        }
        (TermData::Lambda { var, domain, body, .. }, _) => {
            let applied = eta_apply(db, right, *var);
            eqs.bind(*var, domain.clone());
            compare(db, eqs, body, &applied, Cmp::Eq, span)
        }
        (_, TermData::Lambda { var, domain, body, .. }) => {
            let applied = eta_apply(db, left, *var);
            eqs.bind(*var, domain.clone());
            compare(db, eqs, &applied, body, Cmp::Eq, span)
        }
        (TermData::Sigma { params: p1 }, TermData::Sigma { params: p2 }) =>
            compare_telescopes(db, eqs, p1, p2, span),
        (TermData::Tuple { fields: f1, .. }, TermData::Tuple { fields: f2, .. }) =>
            compare_all(db, eqs, f1, f2, span),
        (TermData::Tuple { fields, .. }, _) => (0..fields.len()).all(|field| {
            let projection = db.make_term(TermData::Project { tuple: right.clone(), field });
            compare(db, eqs, &fields[field], &projection, Cmp::Eq, span)
        }),
        (_, TermData::Tuple { fields, .. }) => (0..fields.len()).all(|field| {
            let projection = db.make_term(TermData::Project { tuple: left.clone(), field });
            compare(db, eqs, &projection, &fields[field], Cmp::Eq, span)
        }),
        (TermData::Project { tuple: t1, field: f1 }, TermData::Project { tuple: t2, field: f2 }) =>
            f1 == f2 && compare(db, eqs, t1, t2, Cmp::Eq, span),
        (TermData::App { fun: f1, arg: a1 }, TermData::App { fun: f2, arg: a2 }) =>
            compare(db, eqs, f1, f2, Cmp::Eq, span) && compare(db, eqs, a1, a2, Cmp::Eq, span),
        (TermData::Ref { var: x }, TermData::Ref { var: y }) => x == y,
        (TermData::FunCall { fun: f1, levels: l1, args: a1 }, TermData::FunCall { fun: f2, levels: l2, args: a2 }) =>
            f1 == f2
                && compare_sorts(eqs, l1, l2, Cmp::Eq, span)
                && compare_all(db, eqs, a1, a2, span),
        (TermData::ConCall { con: c1, data_args: d1, args: a1, .. }
        , TermData::ConCall { con: c2, data_args: d2, args: a2, .. }) =>
            c1 == c2
                && compare_all(db, eqs, a1, a2, span)
                && compare_all(db, eqs, d1, d2, span),
        (TermData::DataCall { data: d1, levels: l1, args: a1 }, TermData::DataCall { data: d2, levels: l2, args: a2 }) =>
            d1 == d2
                && compare_sorts(eqs, l1, l2, cmp, span)
                && compare_all(db, eqs, a1, a2, span),
        (TermData::ClassCall { class: c1, levels: l1, impls: i1 }
        , TermData::ClassCall { class: c2, levels: l2, impls: i2 }) => {
            if c1 != c2 || !compare_sorts(eqs, l1, l2, cmp, span) { return false }
            match cmp {
                Cmp::Eq => i1.len() == i2.len() && implements(db, eqs, i1, i2, span),
                Cmp::Le => implements(db, eqs, i1, i2, span),
                Cmp::Ge => implements(db, eqs, i2, i1, span),
            }
        }
        (TermData::FieldCall { field: f1, arg: a1, .. }, TermData::FieldCall { field: f2, arg: a2, .. }) =>
            f1 == f2 && compare(db, eqs, a1, a2, Cmp::Eq, span),
        (TermData::New { class_call: c1 }, TermData::New { class_call: c2 }) =>
            compare(db, eqs, c1, c2, Cmp::Eq, span),
        (TermData::Case { args: a1, tree: t1, .. }, TermData::Case { args: a2, tree: t2, .. }) =>
            t1 == t2 && compare_all(db, eqs, a1, a2, span),
        _ => false
    }
}

fn compare_sorts(eqs: &mut Equations, left: &Sort, right: &Sort, cmp: Cmp, span: Span) -> bool {
    eqs.levels.set_span(span);
    left.compare(right, cmp, &mut eqs.levels)
}

fn compare_all(db: &mut Database, eqs: &mut Equations, left: &[Term], right: &[Term], span: Span) -> bool {
    left.len() == right.len()
        && left.iter().zip(right.iter()).all(|(l, r)| compare(db, eqs, l, r, Cmp::Eq, span))
}

/// Every implementation in `smaller` is also in `larger`, with an equal value.
fn implements(db: &mut Database, eqs: &mut Equations, larger: &[(DefId, Term)], smaller: &[(DefId, Term)], span: Span) -> bool {
    smaller.iter().all(|(field, value)| {
        match larger.iter().find(|(f, _)| f == field) {
            Some((_, other)) => compare(db, eqs, other, value, Cmp::Eq, span),
            None => false
        }
    })
}

fn compare_telescopes(db: &mut Database, eqs: &mut Equations, left: &Telescope, right: &Telescope, span: Span) -> bool {
    if left.len() != right.len() { return false }
    let mut s = Subst::new();
    for (l, r) in left.iter().zip(right.iter()) {
        let ty = subst_term(db, &s, &r.ty);
        if !compare(db, eqs, &l.ty, &ty, Cmp::Eq, span) { return false }
        let reference = db.make_ref(l.var);
        s.add(r.var, reference);
        eqs.bind(l.var, l.ty.clone());
    }
    true
}

fn rename(db: &mut Database, from: Var, to: Var, term: &Term) -> Term {
    if from == to { return term.clone() }
    let reference = db.make_ref(to);
    subst_term(db, &Subst::single(from, reference), term)
}

fn eta_apply(db: &mut Database, fun: &Term, var: Var) -> Term {
    let arg = db.make_ref(var);
    db.make_term(TermData::App { fun: fun.clone(), arg })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Database, CoreLibrary, Equations) {
        let mut db = Database::new();
        let lib = CoreLibrary::build(&mut db);
        (db, lib, Equations::new())
    }

    #[test]
    fn universes_are_cumulative() {
        let (mut db, _, mut eqs) = setup();
        let set0 = db.make_universe(Sort::set(0));
        let set1 = db.make_universe(Sort::set(1));
        let prop = db.make_universe(Sort::prop());
        assert!(compare(&mut db, &mut eqs, &set0, &set1, Cmp::Le, (0, 0)));
        assert!(!compare(&mut db, &mut eqs, &set1, &set0, Cmp::Le, (0, 0)));
        assert!(compare(&mut db, &mut eqs, &prop, &set0, Cmp::Le, (0, 0)));
        assert!(!compare(&mut db, &mut eqs, &set0, &set1, Cmp::Eq, (0, 0)));
    }

    #[test]
    fn functions_are_equal_up_to_eta() {
        let (mut db, lib, mut eqs) = setup();
        let nat = lib.nat_type(&mut db);
        let arrow = db.make_arrow(nat.clone(), nat.clone());
        let f = db.fresh_var("f");
        let x = db.fresh_var("x");
        eqs.bind(f, arrow);
        let f_ref = db.make_ref(f);
        let body = eta_apply(&mut db, &f_ref, x);
        let lam = db.make_term(TermData::Lambda { mode: Mode::Explicit, var: x, domain: nat, body });
        assert!(compare(&mut db, &mut eqs, &lam, &f_ref, Cmp::Eq, (0, 0)));
        assert!(compare(&mut db, &mut eqs, &f_ref, &lam, Cmp::Eq, (0, 0)));
    }

    #[test]
    fn pi_types_compare_up_to_renaming() {
        let (mut db, lib, mut eqs) = setup();
        let nat = lib.nat_type(&mut db);
        let x = db.fresh_var("x");
        let y = db.fresh_var("y");
        let x_ref = db.make_ref(x);
        let y_ref = db.make_ref(y);
        let cx = lib.eq_of(&mut db, nat.clone(), x_ref.clone(), x_ref);
        let cy = lib.eq_of(&mut db, nat.clone(), y_ref.clone(), y_ref);
        let px = db.make_term(TermData::Pi { mode: Mode::Explicit, var: x, domain: nat.clone(), codomain: cx });
        let py = db.make_term(TermData::Pi { mode: Mode::Explicit, var: y, domain: nat.clone(), codomain: cy });
        assert!(compare(&mut db, &mut eqs, &px, &py, Cmp::Eq, (0, 0)));
        let implicit = db.make_term(TermData::Pi { mode: Mode::Implicit, var: y, domain: nat, codomain: px.clone() });
        assert!(!compare(&mut db, &mut eqs, &px, &implicit, Cmp::Eq, (0, 0)));
    }

    #[test]
    fn stuck_sides_are_deferred() {
        let (mut db, lib, mut eqs) = setup();
        let nat = lib.nat_type(&mut db);
        let arrow = db.make_arrow(nat.clone(), nat);
        let hole = eqs.fresh_meta(&mut db, "f", arrow, imbl::Vector::new(), MetaKind::Expression, (0, 1));
        let one = lib.numeral(&mut db, 1);
        let two = lib.numeral(&mut db, 2);
        let app = db.make_term(TermData::App { fun: hole, arg: one });
        assert!(compare(&mut db, &mut eqs, &app, &two, Cmp::Eq, (0, 1)));
        assert_eq!(eqs.pending().count(), 1);
    }

    #[test]
    fn class_calls_with_more_implementations_are_smaller() {
        let (mut db, lib, mut eqs) = setup();
        let (class, carrier, unit) = crate::equations::tests::monoid(&mut db);
        let nat = lib.nat_type(&mut db);
        let zero = lib.numeral(&mut db, 0);
        let partial = db.make_term(TermData::ClassCall { class, levels: Sort::SET0, impls: vec![(carrier, nat.clone())] });
        let full = db.make_term(TermData::ClassCall { class, levels: Sort::SET0, impls: vec![(carrier, nat), (unit, zero)] });
        let bare = db.make_term(TermData::ClassCall { class, levels: Sort::SET0, impls: vec![] });
        assert!(compare(&mut db, &mut eqs, &full, &partial, Cmp::Le, (0, 0)));
        assert!(!compare(&mut db, &mut eqs, &partial, &full, Cmp::Le, (0, 0)));
        assert!(compare(&mut db, &mut eqs, &partial, &bare, Cmp::Le, (0, 0)));
        assert!(!compare(&mut db, &mut eqs, &partial, &full, Cmp::Eq, (0, 0)));
    }

    #[test]
    fn fields_of_implemented_variables_reduce() {
        let (mut db, lib, mut eqs) = setup();
        let (class, carrier, _) = crate::equations::tests::monoid(&mut db);
        let nat = lib.nat_type(&mut db);
        let bound = db.make_term(TermData::ClassCall { class, levels: Sort::SET0, impls: vec![(carrier, nat.clone())] });
        let m = db.fresh_var("M");
        eqs.bind(m, bound);
        let m_ref = db.make_ref(m);
        let carrier_of = db.make_term(TermData::FieldCall { field: carrier, levels: Sort::SET0, arg: m_ref });
        assert!(compare(&mut db, &mut eqs, &carrier_of, &nat, Cmp::Eq, (0, 0)));
    }
}
