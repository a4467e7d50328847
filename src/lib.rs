
pub use cubix_core as core;
pub use cubix_elab as elab;

use anyhow::Context as _;
use colored::Colorize;
use cubix_core::prelude::*;
use cubix_elab::prelude::*;

#[derive(Debug, Clone)]
pub enum Declaration {
    Function(FunctionDecl),
    Data(DataDecl),
    Class(ClassDecl),
    /// A parameterless function whose result is a class call.
    Instance(DefId),
}

impl Declaration {
    pub fn id(&self) -> DefId {
        match self {
            Declaration::Function(decl) => decl.id,
            Declaration::Data(decl) => decl.id,
            Declaration::Class(decl) => decl.id,
            Declaration::Instance(id) => *id
        }
    }
}

/// A database with the core library loaded, collecting the diagnostics of
/// every declaration elaborated into it.
pub struct Session {
    pub db: Database,
    pub lib: CoreLibrary,
    config: ElabConfig,
    reporter: CollectingReporter,
}

impl Default for Session {
    fn default() -> Self { Session::new() }
}

impl Session {
    pub fn new() -> Session { Session::with_config(ElabConfig::default()) }

    pub fn with_config(config: ElabConfig) -> Session {
        let mut db = Database::new();
        let lib = CoreLibrary::build(&mut db);
        Session { db, lib, config, reporter: CollectingReporter::new() }
    }

    pub fn elaborator(&mut self) -> Elaborator<'_> {
        Elaborator::new(&mut self.db, &self.lib, &mut self.reporter).with_config(self.config)
    }

    pub fn declare(&mut self, decl: &Declaration) -> anyhow::Result<DefId> {
        let id = decl.id();
        let mut elab = self.elaborator();
        let result = match decl {
            Declaration::Function(decl) => elab.elaborate_function(decl),
            Declaration::Data(decl) => elab.elaborate_data(decl),
            Declaration::Class(decl) => elab.elaborate_class(decl),
            Declaration::Instance(fun) => elab.register_instance(*fun).map(|_| *fun)
        };
        result.with_context(|| format!("while elaborating {}", id))
    }

    /// Elaborates declarations in order, stopping at the first that fails.
    pub fn load(&mut self, decls: &[Declaration]) -> anyhow::Result<()> {
        for decl in decls {
            self.declare(decl)?;
        }
        self.log_diagnostics();
        Ok(())
    }

    /// Elaborates `expr` and returns its normal form.
    pub fn evaluate(&mut self, expr: &Expr) -> anyhow::Result<Term> {
        let (term, ty) = self.elaborator().elaborate_expr(expr, None)?;
        log::debug!("{} {} : {}", "evaluating".bright_blue(), term, ty);
        Ok(normalize(&mut self.db, NormalizationMode::Nf, &term))
    }

    pub fn diagnostics(&self) -> &[ElabError] { self.reporter.errors() }

    pub fn log_diagnostics(&self) {
        for error in self.reporter.errors() {
            if error.is_warning() { log::warn!("{} {}", "warning:".yellow(), error) }
            else { log::error!("{} {}", "error:".red(), error) }
        }
    }

    pub fn body(&self, id: DefId) -> Option<&FunctionBody> {
        self.db.function(id).and_then(|def| def.body.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use super::*;

    fn session() -> Session {
        let _ = env_logger::builder().is_test(true).try_init();
        Session::new()
    }

    fn nat(s: &Session) -> Expr { Expr::def(s.lib.nat) }

    fn succ(s: &Session, e: Expr) -> Expr { Expr::apply(Expr::def(s.lib.suc), vec![e]) }

    fn pred_with(s: &mut Session, name: &str, with_suc: bool, extra: Vec<Clause>) -> Declaration {
        let id = s.elaborator().declare_function(name);
        let x = s.db.fresh_var("x");
        let n = s.db.fresh_var("n");
        let mut clauses = vec![Clause::new((10, 20), vec![Pat::con(s.lib.zero, vec![])], Some(Expr::number(0)))];
        if with_suc {
            clauses.push(Clause::new((21, 30), vec![Pat::con(s.lib.suc, vec![Pat::Var(n)])], Some(Expr::var(n))));
        }
        clauses.extend(extra);
        Declaration::Function(FunctionDecl {
            span: (0, 40),
            id,
            params: vec![Param::explicit(x, nat(s))],
            result: Some(nat(s)),
            body: BodyExpr::Elim { elim: None, clauses }
        })
    }

    fn pred(s: &mut Session) -> Result<DefId> {
        let decl = pred_with(s, "pred", true, vec![]);
        s.declare(&decl)
    }

    // \func plus (a b : Nat) : Nat \elim b
    //   | zero => a
    //   | suc b' => suc (plus a b')
    fn plus(s: &mut Session) -> Result<DefId> {
        let id = s.elaborator().declare_function("plus");
        let (a, b, b2) = (s.db.fresh_var("a"), s.db.fresh_var("b"), s.db.fresh_var("b'"));
        let recursive = Expr::apply(Expr::def(id), vec![Expr::var(a), Expr::var(b2)]);
        let clauses = vec![
            Clause::new((30, 40), vec![Pat::con(s.lib.zero, vec![])], Some(Expr::var(a))),
            Clause::new((41, 60), vec![Pat::con(s.lib.suc, vec![Pat::Var(b2)])], Some(succ(s, recursive))),
        ];
        s.declare(&Declaration::Function(FunctionDecl {
            span: (0, 60),
            id,
            params: vec![Param::explicit(a, nat(s)), Param::explicit(b, nat(s))],
            result: Some(nat(s)),
            body: BodyExpr::Elim { elim: Some(vec![b]), clauses }
        }))
    }

    fn times(s: &mut Session) -> Result<DefId> {
        let plus = plus(s)?;
        let id = s.elaborator().declare_function("times");
        let (a, b, b2) = (s.db.fresh_var("a"), s.db.fresh_var("b"), s.db.fresh_var("b'"));
        let recursive = Expr::apply(Expr::def(id), vec![Expr::var(a), Expr::var(b2)]);
        let clauses = vec![
            Clause::new((30, 40), vec![Pat::Var(a), Pat::Number { span: (35, 36), value: 0 }], Some(Expr::number(0))),
            Clause::new((41, 60), vec![Pat::Var(a), Pat::con(s.lib.suc, vec![Pat::Var(b2)])],
                Some(Expr::apply(Expr::def(plus), vec![recursive, Expr::var(a)]))),
        ];
        s.declare(&Declaration::Function(FunctionDecl {
            span: (0, 60),
            id,
            params: vec![Param::explicit(a, nat(s)), Param::explicit(b, nat(s))],
            result: Some(nat(s)),
            body: BodyExpr::Elim { elim: None, clauses }
        }))
    }

    fn tree(s: &Session, id: DefId) -> Option<&ElimTree> {
        match s.body(id) {
            Some(FunctionBody::Elim(tree)) => Some(tree),
            _ => None
        }
    }

    macro_rules! normalizes_to {
        ($name:ident, $fun:ident ( $($arg:expr),* ) => $expected:expr) => {
            #[test]
            fn $name() -> Result<()> {
                let mut s = session();
                let fun = $fun(&mut s)?;
                let call = Expr::apply(Expr::def(fun), vec![$(Expr::number($arg)),*]);
                let value = s.evaluate(&call)?;
                assert_eq!(s.lib.as_numeral(&value), Some($expected));
                let again = normalize(&mut s.db, NormalizationMode::Nf, &value);
                assert_eq!(again, value);
                Ok(())
            }
        }
    }

    normalizes_to!(pred_of_five_is_four, pred(5) => 4);
    normalizes_to!(pred_of_zero_is_zero, pred(0) => 0);
    normalizes_to!(two_plus_three_is_five, plus(2, 3) => 5);
    normalizes_to!(three_times_four_is_twelve, times(3, 4) => 12);

    #[test]
    fn normalization_is_idempotent_under_binders() -> Result<()> {
        let mut s = session();
        let plus = plus(&mut s)?;
        let x = s.db.fresh_var("x");
        let lambda = Expr::Lambda {
            span: (0, 20),
            params: vec![LambdaParam { mode: Mode::Explicit, var: x, ty: Some(nat(&s)) }],
            body: Box::new(Expr::apply(Expr::def(plus), vec![Expr::var(x), Expr::number(2)]))
        };
        let once = s.evaluate(&lambda)?;
        let twice = normalize(&mut s.db, NormalizationMode::Nf, &once);
        assert_eq!(once, twice);
        Ok(())
    }

    #[test]
    fn identity_substitution_changes_nothing() -> Result<()> {
        let mut s = session();
        let plus = plus(&mut s)?;
        let y = s.db.fresh_var("y");
        let reference = s.db.make_ref(y);
        let two = s.lib.numeral(&mut s.db, 2);
        let call = s.db.make_term(TermData::FunCall { fun: plus, levels: Sort::SET0, args: vec![reference.clone(), two] });
        assert_eq!(subst_term(&mut s.db, &Subst::new(), &call), call);
        assert_eq!(subst_term(&mut s.db, &Subst::single(y, reference), &call), call);
        Ok(())
    }

    #[test]
    fn nat_clauses_give_two_branches() -> Result<()> {
        let mut s = session();
        let pred = pred(&mut s)?;
        let keys = tree(&s, pred).map(|t| t.keys()).unwrap_or_default();
        assert_eq!(keys, vec![BranchKey::Con(s.lib.zero), BranchKey::Con(s.lib.suc)]);
        Ok(())
    }

    #[test]
    fn a_missing_successor_is_reported() {
        let mut s = session();
        let decl = pred_with(&mut s, "partial", false, vec![]);
        assert!(s.declare(&decl).is_err());
        let examples: Vec<&Vec<String>> = s.diagnostics().iter()
            .filter_map(|e| match e { ElabError::MissingClauses { examples, .. } => Some(examples), _ => None })
            .collect();
        assert_eq!(examples, vec![&vec!["suc n".to_string()]]);
    }

    #[test]
    fn a_redundant_catch_all_is_only_a_warning() -> Result<()> {
        let mut s = session();
        let pred = pred(&mut s)?;
        let m = s.db.fresh_var("m");
        let catch_all = Clause::new((31, 39), vec![Pat::Var(m)], Some(Expr::number(0)));
        let decl = pred_with(&mut s, "pred'", true, vec![catch_all]);
        let redundant = s.declare(&decl)?;
        let warnings: Vec<_> = s.diagnostics().iter().filter(|e| e.is_warning()).collect();
        assert_eq!(warnings.len(), 1);
        assert!(matches!(warnings[0], ElabError::RedundantClause { .. }));
        let original = tree(&s, pred).map(|t| t.to_string());
        assert!(original.is_some());
        assert_eq!(tree(&s, redundant).map(|t| t.to_string()), original);
        Ok(())
    }

    fn on_interval(s: &mut Session, name: &str, endpoints: &[DefId]) -> Declaration {
        let id = s.elaborator().declare_function(name);
        let i = s.db.fresh_var("i");
        let clauses = endpoints.iter().enumerate()
            .map(|(index, e)| Clause::new((10 * index, 10 * index + 9), vec![Pat::con(*e, vec![])], Some(Expr::number(index))))
            .collect();
        Declaration::Function(FunctionDecl {
            span: (0, 40),
            id,
            params: vec![Param::explicit(i, Expr::def(s.lib.interval))],
            result: Some(nat(s)),
            body: BodyExpr::Elim { elim: None, clauses }
        })
    }

    #[test]
    fn both_endpoints_eliminate_the_interval() -> Result<()> {
        let mut s = session();
        let endpoints = [s.lib.left, s.lib.right];
        let decl = on_interval(&mut s, "ends", &endpoints);
        let id = s.declare(&decl)?;
        assert!(tree(&s, id).map_or(false, |t| t.is_interval()));
        Ok(())
    }

    #[test]
    fn a_missing_endpoint_is_named() {
        let mut s = session();
        let endpoints = [s.lib.left];
        let decl = on_interval(&mut s, "half", &endpoints);
        assert!(s.declare(&decl).is_err());
        let named = s.diagnostics().iter().any(|e| matches!(e,
            ElabError::MissingClauses { examples, .. } if examples == &vec!["right".to_string()]));
        assert!(named);
    }

    // \truncated \data Trunc : \Prop | inT Nat
    fn trunc(s: &mut Session) -> Result<(DefId, DefId)> {
        let (data, constructors) = s.elaborator().declare_data("Trunc", &["inT"]);
        let a = s.db.fresh_var("a");
        s.declare(&Declaration::Data(DataDecl {
            span: (0, 30),
            id: data,
            params: vec![],
            sort: Some(Sort::prop()),
            truncated: true,
            constructors: vec![ConstructorDecl { span: (20, 30), id: constructors[0], params: vec![Param::explicit(a, nat(s))] }]
        }))?;
        Ok((data, constructors[0]))
    }

    fn out_of_trunc(s: &mut Session, trunc: DefId, con: DefId, result: Expr, body: impl Fn(Expr) -> Expr) -> Declaration {
        let id = s.elaborator().declare_function("out");
        let (t, a) = (s.db.fresh_var("t"), s.db.fresh_var("a"));
        Declaration::Function(FunctionDecl {
            span: (40, 80),
            id,
            params: vec![Param::explicit(t, Expr::def(trunc))],
            result: Some(result),
            body: BodyExpr::Elim {
                elim: None,
                clauses: vec![Clause::new((60, 80), vec![Pat::con(con, vec![Pat::Var(a)])], Some(body(Expr::var(a))))]
            }
        })
    }

    #[test]
    fn truncated_data_cannot_be_matched_into_a_set() -> Result<()> {
        let mut s = session();
        let (trunc, con) = trunc(&mut s)?;
        let result = nat(&s);
        let decl = out_of_trunc(&mut s, trunc, con, result, |a| a);
        assert!(s.declare(&decl).is_err());
        assert!(s.diagnostics().iter().any(|e| matches!(e, ElabError::Truncation { .. })));
        Ok(())
    }

    #[test]
    fn truncated_data_can_be_matched_into_a_prop() -> Result<()> {
        let mut s = session();
        let (trunc, con) = trunc(&mut s)?;
        let decl = out_of_trunc(&mut s, trunc, con, Expr::def(trunc), |a| Expr::apply(Expr::def(con), vec![a]));
        s.declare(&decl)?;
        assert!(s.diagnostics().is_empty());
        Ok(())
    }

    // \truncated \data Bit : \Prop | t | f
    fn bit(s: &mut Session) -> Result<(DefId, DefId, DefId)> {
        let (data, constructors) = s.elaborator().declare_data("Bit", &["t", "f"]);
        s.declare(&Declaration::Data(DataDecl {
            span: (0, 30),
            id: data,
            params: vec![],
            sort: Some(Sort::prop()),
            truncated: true,
            constructors: vec![
                ConstructorDecl { span: (20, 23), id: constructors[0], params: vec![] },
                ConstructorDecl { span: (24, 27), id: constructors[1], params: vec![] },
            ]
        }))?;
        Ok((data, constructors[0], constructors[1]))
    }

    fn out_of_bit(s: &mut Session, bit: DefId, cons: [DefId; 2], result: Expr, bodies: [Expr; 2]) -> Declaration {
        let id = s.elaborator().declare_function("flip");
        let b = s.db.fresh_var("b");
        let [on_t, on_f] = bodies;
        Declaration::Function(FunctionDecl {
            span: (40, 90),
            id,
            params: vec![Param::explicit(b, Expr::def(bit))],
            result: Some(result),
            body: BodyExpr::Elim {
                elim: None,
                clauses: vec![
                    Clause::new((60, 70), vec![Pat::con(cons[0], vec![])], Some(on_t)),
                    Clause::new((71, 90), vec![Pat::con(cons[1], vec![])], Some(on_f)),
                ]
            }
        })
    }

    #[test]
    fn a_truncated_choice_cannot_pick_a_number() -> Result<()> {
        let mut s = session();
        let (bit, t, f) = bit(&mut s)?;
        let result = nat(&s);
        let decl = out_of_bit(&mut s, bit, [t, f], result, [Expr::number(0), Expr::number(1)]);
        assert!(s.declare(&decl).is_err());
        assert!(s.diagnostics().iter().any(|e| matches!(e, ElabError::Truncation { .. })));
        Ok(())
    }

    #[test]
    fn a_truncated_choice_can_be_flipped() -> Result<()> {
        let mut s = session();
        let (bit, t, f) = bit(&mut s)?;
        let decl = out_of_bit(&mut s, bit, [t, f], Expr::def(bit), [Expr::def(f), Expr::def(t)]);
        s.declare(&decl)?;
        assert!(s.diagnostics().is_empty());
        Ok(())
    }
}
