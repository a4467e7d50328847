
use crate::utility::*;
use crate::term::*;
use crate::level::*;
use crate::elim::*;
use crate::definition::*;
use crate::database::Database;

/// Built-in definitions the elaborator and normalizer refer to by identity.
/// Built once per database and passed to whoever needs it.
#[derive(Debug, Clone, Copy)]
pub struct CoreLibrary {
    pub nat: DefId,
    pub zero: DefId,
    pub suc: DefId,
    pub interval: DefId,
    pub left: DefId,
    pub right: DefId,
    pub path: DefId,
    pub path_con: DefId,
    pub eq: DefId,
    pub at: DefId,
    pub coe: DefId,
}

fn std_level(kind: LevelKind) -> Level { Level::var(LevelVar::Std(kind)) }

impl CoreLibrary {
    pub fn build(db: &mut Database) -> CoreLibrary {
        let (nat, zero, suc) = build_nat(db);
        let (interval, left, right) = build_interval(db);
        let mut lib = CoreLibrary {
            nat, zero, suc, interval, left, right,
            path: nat, path_con: nat, eq: nat, at: nat, coe: nat,
        };
        let (path, path_con) = build_path(db, &lib);
        lib.path = path;
        lib.path_con = path_con;
        lib.eq = build_eq(db, &lib);
        lib.at = build_at(db, &lib);
        lib.coe = build_coe(db, &lib);
        log::info!("core library ready: {} definitions", lib.coe.index + 1);
        lib
    }

    pub fn nat_type(&self, db: &mut Database) -> Term {
        db.make_term(TermData::DataCall { data: self.nat, levels: Sort::SET0, args: vec![] })
    }

    pub fn interval_type(&self, db: &mut Database) -> Term {
        db.make_term(TermData::DataCall { data: self.interval, levels: Sort::SET0, args: vec![] })
    }

    fn constant(&self, db: &mut Database, con: DefId, args: Vec<Term>) -> Term {
        db.make_term(TermData::ConCall { con, levels: Sort::SET0, data_args: vec![], args })
    }

    pub fn zero_of(&self, db: &mut Database) -> Term { self.constant(db, self.zero, vec![]) }

    pub fn suc_of(&self, db: &mut Database, n: Term) -> Term { self.constant(db, self.suc, vec![n]) }

    pub fn left_of(&self, db: &mut Database) -> Term { self.constant(db, self.left, vec![]) }

    pub fn right_of(&self, db: &mut Database) -> Term { self.constant(db, self.right, vec![]) }

    pub fn numeral(&self, db: &mut Database, n: usize) -> Term {
        let zero = self.zero_of(db);
        (0..n).fold(zero, |acc, _| self.suc_of(db, acc))
    }

    /// The value of a closed `suc (suc .. zero)` chain.
    pub fn as_numeral(&self, term: &Term) -> Option<usize> {
        let mut count = 0;
        let mut current = term.clone();
        loop {
            let next = match &*current {
                TermData::ConCall { con, .. } if *con == self.zero => return Some(count),
                TermData::ConCall { con, args, .. } if *con == self.suc => args.first().cloned()?,
                _ => return None
            };
            count += 1;
            current = next;
        }
    }

    /// `\lam (_ : I) => ty`
    pub fn constant_family(&self, db: &mut Database, ty: Term) -> Term {
        let var = db.fresh_var("_");
        let domain = self.interval_type(db);
        db.make_term(TermData::Lambda { mode: Mode::Explicit, var, domain, body: ty })
    }

    pub fn path_type(&self, db: &mut Database, family: Term, a: Term, a2: Term) -> Term {
        db.make_term(TermData::DataCall { data: self.path, levels: Sort::SET0, args: vec![family, a, a2] })
    }

    pub fn path_of(&self, db: &mut Database, family: Term, a: Term, a2: Term, f: Term) -> Term {
        db.make_term(TermData::ConCall {
            con: self.path_con,
            levels: Sort::SET0,
            data_args: vec![family, a, a2],
            args: vec![f]
        })
    }

    pub fn eq_of(&self, db: &mut Database, ty: Term, a: Term, a2: Term) -> Term {
        db.make_term(TermData::FunCall { fun: self.eq, levels: Sort::SET0, args: vec![ty, a, a2] })
    }

    pub fn at_of(&self, db: &mut Database, family: Term, a: Term, a2: Term, p: Term, i: Term) -> Term {
        db.make_term(TermData::FunCall { fun: self.at, levels: Sort::SET0, args: vec![family, a, a2, p, i] })
    }

    pub fn coe_of(&self, db: &mut Database, family: Term, a: Term, i: Term) -> Term {
        db.make_term(TermData::FunCall { fun: self.coe, levels: Sort::SET0, args: vec![family, a, i] })
    }

    pub fn is_interval(&self, data: DefId) -> bool { data == self.interval }
}

fn placeholder_data() -> Definition {
    Definition::Data(DataDef {
        params: Telescope::empty(),
        sort: Sort::SET0,
        constructors: vec![],
        truncated: false,
        interval: false,
    })
}

fn build_nat(db: &mut Database) -> (DefId, DefId, DefId) {
    let nat = db.add_definition("Nat", placeholder_data());
    let nat_type = db.make_term(TermData::DataCall { data: nat, levels: Sort::SET0, args: vec![] });
    let zero = db.add_definition("zero", Definition::Constructor(ConstructorDef {
        data: nat,
        params: Telescope::empty(),
        intervals: 0
    }));
    let n = db.fresh_var("n");
    let suc = db.add_definition("suc", Definition::Constructor(ConstructorDef {
        data: nat,
        params: Telescope::from_links(vec![(n, nat_type)]),
        intervals: 0
    }));
    db.set_definition(nat, Definition::Data(DataDef {
        params: Telescope::empty(),
        sort: Sort::SET0,
        constructors: vec![zero, suc],
        truncated: false,
        interval: false,
    }));
    (nat, zero, suc)
}

fn build_interval(db: &mut Database) -> (DefId, DefId, DefId) {
    let interval = db.add_definition("I", placeholder_data());
    let endpoint = |data| Definition::Constructor(ConstructorDef { data, params: Telescope::empty(), intervals: 0 });
    let left = db.add_definition("left", endpoint(interval));
    let right = db.add_definition("right", endpoint(interval));
    db.set_definition(interval, Definition::Data(DataDef {
        params: Telescope::empty(),
        sort: Sort::SET0,
        constructors: vec![left, right],
        truncated: false,
        interval: true,
    }));
    (interval, left, right)
}

/// `(A : I -> \Type \lp \lh) (a : A left) (a' : A right)` with fresh bindings.
fn path_params(db: &mut Database, lib: &CoreLibrary) -> (Telescope, Var, Var, Var) {
    let family = db.fresh_var("A");
    let a = db.fresh_var("a");
    let a2 = db.fresh_var("a'");
    let interval = lib.interval_type(db);
    let universe = db.make_universe(Sort::std());
    let family_type = db.make_arrow(interval, universe);
    let family_ref = db.make_ref(family);
    let left = lib.left_of(db);
    let right = lib.right_of(db);
    let a_type = db.make_term(TermData::App { fun: family_ref.clone(), arg: left });
    let a2_type = db.make_term(TermData::App { fun: family_ref, arg: right });
    let tele = Telescope::from_links(vec![(family, family_type), (a, a_type), (a2, a2_type)]);
    (tele, family, a, a2)
}

/// Sort of paths in a type of sort `\Type \lp \lh`.
fn path_sort() -> Sort {
    Sort::new(std_level(LevelKind::PLevel), Level::new(Some(LevelVar::Std(LevelKind::HLevel)), -1, None))
}

fn build_path(db: &mut Database, lib: &CoreLibrary) -> (DefId, DefId) {
    let path = db.add_definition("Path", placeholder_data());
    let (params, family, _, _) = path_params(db, lib);
    let i = db.fresh_var("i");
    let interval = lib.interval_type(db);
    let family_ref = db.make_ref(family);
    let i_ref = db.make_ref(i);
    let applied = db.make_term(TermData::App { fun: family_ref, arg: i_ref });
    let f_type = db.make_term(TermData::Pi { mode: Mode::Explicit, var: i, domain: interval, codomain: applied });
    let f = db.fresh_var("f");
    let path_con = db.add_definition("path", Definition::Constructor(ConstructorDef {
        data: path,
        params: Telescope::from_links(vec![(f, f_type)]),
        intervals: 0
    }));
    db.set_definition(path, Definition::Data(DataDef {
        params,
        sort: path_sort(),
        constructors: vec![path_con],
        truncated: false,
        interval: false,
    }));
    (path, path_con)
}

fn build_eq(db: &mut Database, lib: &CoreLibrary) -> DefId {
    let ty = db.fresh_var("A");
    let a = db.fresh_var("a");
    let a2 = db.fresh_var("a'");
    let universe = db.make_universe(Sort::std());
    let ty_ref = db.make_ref(ty);
    let params = Telescope::from_params(vec![
        (Mode::Implicit, ty, universe),
        (Mode::Explicit, a, ty_ref.clone()),
        (Mode::Explicit, a2, ty_ref.clone()),
    ]);
    let family = lib.constant_family(db, ty_ref);
    let a_ref = db.make_ref(a);
    let a2_ref = db.make_ref(a2);
    let body = db.make_term(TermData::DataCall {
        data: lib.path,
        levels: Sort::std(),
        args: vec![family, a_ref, a2_ref]
    });
    let result = db.make_universe(path_sort());
    db.add_definition("=", Definition::Function(FunctionDef {
        params,
        result,
        body: Some(FunctionBody::Term(body)),
        builtin: None,
        status: Status::Done
    }))
}

fn build_at(db: &mut Database, lib: &CoreLibrary) -> DefId {
    // outer signature
    let (path_tele, family, a, a2) = path_params(db, lib);
    let p = db.fresh_var("p");
    let i = db.fresh_var("i");
    let family_ref = db.make_ref(family);
    let a_ref = db.make_ref(a);
    let a2_ref = db.make_ref(a2);
    let path_type = db.make_term(TermData::DataCall {
        data: lib.path,
        levels: Sort::std(),
        args: vec![family_ref.clone(), a_ref.clone(), a2_ref.clone()]
    });
    let interval = lib.interval_type(db);
    let i_ref = db.make_ref(i);
    let result = db.make_term(TermData::App { fun: family_ref, arg: i_ref.clone() });
    let params = path_tele.append(&Telescope::from_links(vec![(p, path_type), (i, interval.clone())]));

    // `path f` case, over its own bindings
    let (branch_params, branch_family, _, _) = path_params(db, lib);
    let f = db.fresh_var("f");
    let j = db.fresh_var("i");
    let k = db.fresh_var("i");
    let branch_family_ref = db.make_ref(branch_family);
    let k_ref = db.make_ref(k);
    let codomain = db.make_term(TermData::App { fun: branch_family_ref, arg: k_ref });
    let f_type = db.make_term(TermData::Pi { mode: Mode::Explicit, var: k, domain: interval.clone(), codomain });
    let f_ref = db.make_ref(f);
    let j_ref = db.make_ref(j);
    let apply = db.make_term(TermData::App { fun: f_ref, arg: j_ref });
    let otherwise = ElimTree::Branch {
        params: branch_params,
        children: vec![(BranchKey::Con(lib.path_con), ElimTree::Leaf {
            params: Telescope::from_links(vec![(f, f_type), (j, interval)]),
            body: apply
        })]
    };
    let tree = ElimTree::Interval {
        params: params.clone(),
        cases: vec![IntervalCase { left: Some(a_ref), right: Some(a2_ref) }],
        otherwise: Some(Box::new(otherwise))
    };
    db.add_definition("@", Definition::Function(FunctionDef {
        params,
        result,
        body: Some(FunctionBody::Elim(tree)),
        builtin: None,
        status: Status::Done
    }))
}

fn build_coe(db: &mut Database, lib: &CoreLibrary) -> DefId {
    let (path_tele, family, a, _) = path_params(db, lib);
    // coe only needs `A` and `a`
    let family_link = path_tele.first().map(|l| (l.var, l.ty.clone()));
    let a_link = path_tele.get(1).map(|l| (l.var, l.ty.clone()));
    let i = db.fresh_var("i");
    let interval = lib.interval_type(db);
    let mut links: Vec<(Var, Term)> = family_link.into_iter().chain(a_link).collect();
    links.push((i, interval));
    let params = Telescope::from_links(links);
    let family_ref = db.make_ref(family);
    let i_ref = db.make_ref(i);
    let result = db.make_term(TermData::App { fun: family_ref, arg: i_ref });
    let a_ref = db.make_ref(a);
    let tree = ElimTree::Interval {
        params: params.clone(),
        cases: vec![IntervalCase { left: Some(a_ref), right: None }],
        otherwise: None
    };
    db.add_definition("coe", Definition::Function(FunctionDef {
        params,
        result,
        body: Some(FunctionBody::Elim(tree)),
        builtin: Some(Builtin::Coe),
        status: Status::Done
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::*;

    #[test]
    fn numerals_round_trip() {
        let mut db = Database::new();
        let lib = CoreLibrary::build(&mut db);
        let five = lib.numeral(&mut db, 5);
        assert_eq!(lib.as_numeral(&five), Some(5));
        assert_eq!(five.to_string(), "suc (suc (suc (suc (suc zero))))");
        let again = lib.numeral(&mut db, 5);
        assert_eq!(five, again);
    }

    #[test]
    fn equality_unfolds_to_a_path() {
        let mut db = Database::new();
        let lib = CoreLibrary::build(&mut db);
        let nat = lib.nat_type(&mut db);
        let zero = lib.numeral(&mut db, 0);
        let eq = lib.eq_of(&mut db, nat, zero.clone(), zero);
        let unfolded = whnf(&mut db, &eq);
        match &*unfolded {
            TermData::DataCall { data, args, .. } => {
                assert_eq!(*data, lib.path);
                assert_eq!(args.len(), 3);
            }
            _ => panic!("expected Path, found {}", unfolded)
        }
    }

    #[test]
    fn interval_constructors_are_endpoints() {
        let mut db = Database::new();
        let lib = CoreLibrary::build(&mut db);
        assert_eq!(constructor_endpoint(&db, lib.left), Some(Endpoint::Left));
        assert_eq!(constructor_endpoint(&db, lib.right), Some(Endpoint::Right));
        assert_eq!(constructor_endpoint(&db, lib.zero), None);
    }
}
