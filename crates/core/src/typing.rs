
use ahash::AHashMap;

use crate::utility::*;
use crate::term::*;
use crate::level::*;
use crate::database::Database;
use crate::subst::*;
use crate::normalize::whnf;

/// Types of the bindings in scope.
pub type TypingContext = AHashMap<Var, Term>;

/// Type of a closed term, if it can be computed without inference.
pub fn type_of(db: &mut Database, term: &Term) -> Option<Term> {
    type_of_in(db, &TypingContext::new(), term)
}

pub fn type_of_in(db: &mut Database, ctx: &TypingContext, term: &Term) -> Option<Term> {
    match &**term {
        TermData::Ref { var } => ctx.get(var).cloned(),
        TermData::Lambda { mode, var, domain, body } => {
            let mut inner = ctx.clone();
            inner.insert(*var, domain.clone());
            let codomain = type_of_in(db, &inner, body)?;
            Some(db.make_term(TermData::Pi { mode: *mode, var: *var, domain: domain.clone(), codomain }))
        }
        TermData::Pi { var, domain, codomain, .. } => {
            let domain_sort = sort_of_in(db, ctx, domain)?;
            let mut inner = ctx.clone();
            inner.insert(*var, domain.clone());
            let codomain_sort = sort_of_in(db, &inner, codomain)?;
            let sort = pi_sort(&domain_sort, &codomain_sort)?;
            Some(db.make_universe(sort))
        }
        TermData::Sigma { params } => {
            let mut inner = ctx.clone();
            let mut sort = Sort::prop();
            for link in params.iter() {
                let link_sort = sort_of_in(db, &inner, &link.ty)?;
                sort = sort.max(&link_sort)?;
                inner.insert(link.var, link.ty.clone());
            }
            Some(db.make_universe(sort))
        }
        TermData::Tuple { sigma, .. } => Some(sigma.clone()),
        TermData::Project { tuple, field } => {
            let tuple_type = type_of_in(db, ctx, tuple)?;
            let tuple_type = whnf(db, &tuple_type);
            let params = match &*tuple_type {
                TermData::Sigma { params } => params.clone(),
                _ => return None
            };
            let mut s = Subst::new();
            for (index, link) in params.iter().enumerate() {
                if index == *field {
                    return Some(subst_term(db, &s, &link.ty))
                }
                let projection = db.make_term(TermData::Project { tuple: tuple.clone(), field: index });
                s.add(link.var, projection);
            }
            None
        }
        TermData::Universe { sort } => Some(db.make_universe(sort.succ())),
        TermData::App { fun, arg } => {
            let fun_type = type_of_in(db, ctx, fun)?;
            let fun_type = whnf(db, &fun_type);
            match &*fun_type {
                TermData::Pi { var, codomain, .. } => Some(subst_term(db, &Subst::single(*var, arg.clone()), codomain)),
                _ => None
            }
        }
        TermData::FunCall { fun, levels, args } => {
            let def = db.function(*fun)?.clone();
            let mut s = Subst::instantiate(&def.params, args);
            s.add_std_levels(*levels);
            Some(result_type(db, &s, &def.params, args, &def.result))
        }
        TermData::ConCall { con, levels, data_args, .. } => {
            let data = db.constructor(*con)?.data;
            Some(db.make_term(TermData::DataCall { data, levels: *levels, args: data_args.clone() }))
        }
        TermData::DataCall { data, levels, .. } => {
            let sort = db.data(*data)?.sort;
            let sort = Subst::std_levels(*levels).sort(&sort);
            Some(db.make_universe(sort))
        }
        TermData::ClassCall { class, levels, .. } => {
            let sort = db.class(*class)?.sort;
            let sort = Subst::std_levels(*levels).sort(&sort);
            Some(db.make_universe(sort))
        }
        TermData::FieldCall { field, levels, arg } => {
            let def = db.field(*field)?.clone();
            let mut s = Subst::single(def.this, arg.clone());
            s.add_std_levels(*levels);
            Some(subst_term(db, &s, &def.ty))
        }
        TermData::New { class_call } => Some(class_call.clone()),
        TermData::Case { args, params, result, .. } => {
            let s = Subst::instantiate(params, args);
            Some(subst_term(db, &s, result))
        }
        TermData::Infer { meta } => db.meta(*meta).map(|m| m.ty.clone()),
        TermData::Error { .. } => None,
    }
}

/// The result type of a definition applied to `args`; a partial application
/// gets the remaining parameters as a Pi type.
fn result_type(db: &mut Database, s: &Subst, params: &Telescope, args: &[Term], result: &Term) -> Term {
    let rest = params.skip(args.len());
    let (rest, inner) = subst_telescope(db, s, &rest);
    let mut body = subst_term(db, &inner, result);
    for (mode, var, ty) in rest.to_params().into_iter().rev() {
        body = db.make_term(TermData::Pi { mode, var, domain: ty, codomain: body });
    }
    body
}

pub fn sort_of_in(db: &mut Database, ctx: &TypingContext, ty: &Term) -> Option<Sort> {
    let universe = type_of_in(db, ctx, ty)?;
    whnf(db, &universe).as_universe()
}

/// A Pi type lives in the predicative maximum of its parts and in the
/// h-level of its codomain; a Pi into Prop is a Prop.
pub fn pi_sort(domain: &Sort, codomain: &Sort) -> Option<Sort> {
    if codomain.is_prop() { return Some(Sort::prop()) }
    let p = domain.p.max(&codomain.p)?;
    Some(Sort::new(p, codomain.h))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::CoreLibrary;

    #[test]
    fn constructors_have_their_data_type() {
        let mut db = Database::new();
        let lib = CoreLibrary::build(&mut db);
        let three = lib.numeral(&mut db, 3);
        let nat = lib.nat_type(&mut db);
        assert_eq!(type_of(&mut db, &three), Some(nat.clone()));
        let nat_type = type_of(&mut db, &nat).and_then(|t| t.as_universe());
        assert_eq!(nat_type, Some(Sort::SET0));
    }

    #[test]
    fn application_instantiates_the_codomain() {
        let mut db = Database::new();
        let lib = CoreLibrary::build(&mut db);
        let nat = lib.nat_type(&mut db);
        let x = db.fresh_var("x");
        let x_ref = db.make_ref(x);
        let body = lib.suc_of(&mut db, x_ref);
        let lam = db.make_term(TermData::Lambda { mode: Mode::Explicit, var: x, domain: nat.clone(), body });
        let zero = lib.numeral(&mut db, 0);
        let app = db.make_term(TermData::App { fun: lam.clone(), arg: zero });
        assert_eq!(type_of(&mut db, &app), Some(nat.clone()));
        let lam_type = type_of(&mut db, &lam).map(|t| t.to_string());
        assert_eq!(lam_type, Some("\\Pi (x : Nat) -> Nat".to_string()));
    }

    #[test]
    fn pi_into_prop_is_prop() {
        let set = Sort::set(2);
        assert_eq!(pi_sort(&set, &Sort::prop()), Some(Sort::prop()));
        assert_eq!(pi_sort(&set, &Sort::set(0)), Some(Sort::set(2)));
    }
}
