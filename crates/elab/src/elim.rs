
use colored::Colorize;

use cubix_core::prelude::*;
use crate::config::ElabConfig;
use crate::error::*;

/// One clause after its patterns were checked against the parameters. The
/// body lives in the scope of the pattern variables; it is absent exactly
/// when some pattern is absurd.
#[derive(Debug, Clone)]
pub struct ElimClause {
    pub span: Span,
    pub patterns: Vec<Pattern>,
    pub body: Option<Term>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElimMode {
    /// Clauses of a function definition; interval patterns are allowed.
    Top,
    /// Clauses of a `\case` expression.
    Case,
}

#[derive(Debug, Clone)]
struct Column {
    var: Var,
    ty: Term,
}

#[derive(Debug, Clone)]
struct Row {
    clause: usize,
    patterns: Vec<Pattern>,
    /// Pattern variables already matched, in terms of tree variables.
    subst: Subst,
}

/// How the arguments were taken apart on the way to a node. Read in order it
/// is a preorder listing of the patterns that reach the node.
#[derive(Debug, Clone, Copy)]
enum Step {
    Bind(Var),
    Split(BranchKey, usize),
}

fn telescope(columns: &[Column]) -> Telescope {
    Telescope::from_links(columns.iter().map(|c| (c.var, c.ty.clone())).collect())
}

fn unflatten(steps: &mut std::slice::Iter<'_, Step>) -> Option<Pattern> {
    match steps.next()? {
        Step::Bind(var) => Some(Pattern::Binding(*var)),
        Step::Split(key, arity) => {
            let args = (0..*arity).map(|_| unflatten(steps)).collect::<Option<Vec<_>>>()?;
            Some(Pattern::Constructor { key: *key, args })
        }
    }
}

/// Compiles checked clauses into an elimination tree, reporting coverage,
/// truncation and redundancy problems as it goes.
pub struct PatternCompiler<'a> {
    db: &'a mut Database,
    config: &'a ElabConfig,
    reporter: &'a mut dyn ErrorReporter,
    levels: &'a mut dyn LevelSink,
    mode: ElimMode,
    result_sort: Option<Sort>,
    used: Vec<bool>,
    missing: Vec<String>,
    missing_truncated: bool,
    failed: bool,
}

impl<'a> PatternCompiler<'a> {
    pub fn new(db: &'a mut Database, config: &'a ElabConfig, reporter: &'a mut dyn ErrorReporter, levels: &'a mut dyn LevelSink) -> Self {
        PatternCompiler {
            db,
            config,
            reporter,
            levels,
            mode: ElimMode::Top,
            result_sort: None,
            used: vec![],
            missing: vec![],
            missing_truncated: false,
            failed: false,
        }
    }

    /// `\case` clauses may not eliminate the interval.
    pub fn mode(mut self, mode: ElimMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sort of the result type; needed for eliminating truncated data.
    pub fn result_sort(mut self, sort: Sort) -> Self {
        self.result_sort = Some(sort);
        self
    }

    fn error(&mut self, error: ElabError) {
        if !error.is_warning() { self.failed = true }
        self.reporter.report(error);
    }

    pub fn compile(mut self, span: Span, params: &Telescope, clauses: &[ElimClause]) -> Option<ElimTree> {
        self.used = vec![false; clauses.len()];
        let arity = params.len();
        for clause in clauses {
            if clause.patterns.len() < arity {
                self.error(ElabError::NotEnoughPatterns { span: source_span(clause.span), expected: arity });
            } else if clause.patterns.len() > arity {
                self.error(ElabError::TooManyPatterns { span: source_span(clause.span), expected: arity });
            }
        }
        if self.failed { return None }

        let columns: Vec<Column> = params.iter().map(|l| Column { var: l.var, ty: l.ty.clone() }).collect();
        let intervals: Vec<bool> = columns.iter().map(|c| self.is_interval_type(&c.ty)).collect();
        let interval_clause = clauses.iter()
            .find_map(|c| c.patterns.iter().zip(intervals.iter())
                .find(|(p, interval)| **interval && p.constructor().is_some())
                .map(|(p, _)| (c.span, p.clone())));

        let tree = match interval_clause {
            Some((clause_span, pattern)) if self.mode == ElimMode::Case || !self.config.allow_interval_elimination => {
                self.error(ElabError::IntervalNotAllowed { span: source_span(clause_span), pattern: pattern.to_string() });
                return None
            }
            Some(_) => self.build_interval(clauses, &columns, &intervals),
            None => {
                let rows = (0..clauses.len())
                    .map(|clause| Row { clause, patterns: clauses[clause].patterns.clone(), subst: Subst::new() })
                    .collect();
                self.build(clauses, columns, rows, vec![])
            }
        };

        if !self.missing.is_empty() {
            let missing = std::mem::take(&mut self.missing);
            self.error(ElabError::missing_clauses(span, missing, self.missing_truncated));
        }
        if self.failed { return None }
        let tree = tree?;

        if self.config.report_redundant_clauses {
            for (clause, used) in clauses.iter().zip(self.used.iter()) {
                if !used {
                    self.reporter.report(ElabError::RedundantClause {
                        span: source_span(clause.span),
                        clause: display_row(&clause.patterns)
                    });
                }
            }
        }
        log::debug!("{}\n{}", "compiled".green(), tree);
        Some(tree)
    }

    fn is_interval_type(&mut self, ty: &Term) -> bool {
        let ty = whnf(self.db, ty);
        match &*ty {
            TermData::DataCall { data, .. } => self.db.data(*data).map_or(false, |d| d.interval),
            _ => false
        }
    }

    fn build(&mut self, clauses: &[ElimClause], columns: Vec<Column>, rows: Vec<Row>, path: Vec<Step>) -> Option<ElimTree> {
        let (red_zone, grow) = (self.config.stack_red_zone, self.config.stack_grow);
        stacker::maybe_grow(red_zone, grow, || {
            let first = match rows.first() {
                Some(first) => first,
                None => return self.uncovered(columns, path)
            };
            if first.patterns.iter().all(Pattern::is_binding) {
                return self.leaf(clauses, columns, first)
            }
            let split = (0..columns.len())
                .find(|i| rows.iter().any(|r| !r.patterns[*i].is_binding()))
                .unwrap_or(0);
            self.branch(clauses, columns, rows, path, split)
        })
    }

    fn leaf(&mut self, clauses: &[ElimClause], columns: Vec<Column>, row: &Row) -> Option<ElimTree> {
        let clause = &clauses[row.clause];
        let mut s = row.subst.clone();
        for (pattern, column) in row.patterns.iter().zip(columns.iter()) {
            if let Pattern::Binding(var) = pattern {
                if *var != column.var {
                    let reference = self.db.make_ref(column.var);
                    s.add(*var, reference);
                }
            }
        }
        self.used[row.clause] = true;
        let body = match &clause.body {
            Some(body) => subst_term(self.db, &s, body),
            None => {
                self.error(ElabError::ClauseWithoutBody { span: source_span(clause.span) });
                return None
            }
        };
        Some(ElimTree::Leaf { params: telescope(&columns), body })
    }

    /// No clause is left for these arguments. Fine if one of them has an
    /// empty type, otherwise a missing clause.
    fn uncovered(&mut self, columns: Vec<Column>, mut path: Vec<Step>) -> Option<ElimTree> {
        for (k, column) in columns.iter().enumerate() {
            let ty = whnf(self.db, &column.ty);
            if let TermData::DataCall { data, .. } = &*ty {
                if self.db.data(*data).map_or(false, |d| d.constructors.is_empty()) {
                    return Some(ElimTree::Branch { params: telescope(&columns[..k]), children: vec![] })
                }
            }
        }
        path.extend(columns.iter().map(|c| Step::Bind(c.var)));
        self.record_missing(&path);
        None
    }

    fn record_missing(&mut self, path: &[Step]) {
        if self.missing.len() >= self.config.missing_clauses_limit {
            self.missing_truncated = true;
            return
        }
        let mut steps = path.iter();
        let mut patterns = vec![];
        while let Some(pattern) = unflatten(&mut steps) {
            patterns.push(pattern);
        }
        let example = display_row(&patterns);
        log::trace!("{} {}", "missing".yellow(), example);
        self.missing.push(example);
    }

    /// Fresh copies of `links` with `s` applied to their types.
    fn freshen(&mut self, links: Vec<(Var, Term)>, s: &Subst) -> Vec<Column> {
        let mut s = s.clone();
        let mut result = Vec::with_capacity(links.len());
        for (var, ty) in links {
            let ty = subst_term(self.db, &s, &ty);
            let fresh = self.db.rename_var(var);
            let reference = self.db.make_ref(fresh);
            s.add(var, reference);
            result.push(Column { var: fresh, ty });
        }
        result
    }

    fn branch(&mut self, clauses: &[ElimClause], columns: Vec<Column>, rows: Vec<Row>, mut path: Vec<Step>, k: usize) -> Option<ElimTree> {
        path.extend(columns[..k].iter().map(|c| Step::Bind(c.var)));
        let column = columns[k].clone();
        let rest = &columns[k + 1..];
        let rows: Vec<Row> = rows.into_iter()
            .map(|mut row| {
                for (pattern, c) in row.patterns[..k].iter().zip(columns.iter()) {
                    if let Pattern::Binding(var) = pattern {
                        if *var != c.var {
                            let reference = self.db.make_ref(c.var);
                            row.subst.add(*var, reference);
                        }
                    }
                }
                row.patterns.drain(..k);
                row
            })
            .collect();
        let params = telescope(&columns[..k]);

        let ty = whnf(self.db, &column.ty);
        let mut children = vec![];
        let mut complete = true;
        match &*ty {
            TermData::DataCall { data, levels, args } => {
                let def = self.db.data(*data).cloned()?;
                if let Some(row) = rows.iter().find(|r| r.patterns[0].constructor().is_some() && def.interval) {
                    let clause = &clauses[row.clause];
                    self.error(ElabError::IntervalNotAllowed { span: source_span(clause.span), pattern: row.patterns[0].to_string() });
                    return None
                }
                let level = self.truncation_level(clauses, &rows, &def, &ty)?;
                let live: Vec<DefId> = def.constructors.iter()
                    .copied()
                    .filter(|con| match (level, self.db.constructor(*con)) {
                        (Some(level), Some(con)) => (con.intervals as i32) <= level,
                        _ => true
                    })
                    .collect();

                if let Some(row) = rows.iter().find(|r| matches!(r.patterns[0], Pattern::Empty)) {
                    if live.is_empty() {
                        self.used[row.clause] = true;
                        return Some(ElimTree::Branch { params, children: vec![] })
                    }
                    let clause = &clauses[row.clause];
                    self.error(ElabError::ImpossibleEmptyPattern { span: source_span(clause.span), ty: ty.to_string() });
                    return None
                }
                for row in rows.iter() {
                    let bad = match &row.patterns[0] {
                        Pattern::Constructor { key: BranchKey::Con(con), .. } => !def.constructors.contains(con),
                        Pattern::Constructor { key: BranchKey::Tuple(_), .. } => true,
                        _ => false
                    };
                    if bad {
                        let clause = &clauses[row.clause];
                        self.error(ElabError::ExpectedConstructor {
                            span: source_span(clause.span),
                            pattern: row.patterns[0].to_string(),
                            ty: ty.to_string()
                        });
                        return None
                    }
                }

                for con in live {
                    let con_def = match self.db.constructor(con) {
                        Some(con_def) => con_def.clone(),
                        None => continue
                    };
                    let mut s = Subst::instantiate(&def.params, args);
                    s.add_std_levels(*levels);
                    let fields = self.freshen(con_def.params.to_vec(), &s);
                    let refs = fields.iter().map(|f| self.db.make_ref(f.var)).collect();
                    let con_term = self.db.make_term(TermData::ConCall { con, levels: *levels, data_args: args.clone(), args: refs });
                    let key = BranchKey::Con(con);
                    match self.split(clauses, fields, con_term, key, &column, rest, &rows, path.clone()) {
                        Some(child) => children.push((key, child)),
                        None => complete = false
                    }
                }
            }
            TermData::Sigma { params: sigma } => {
                if let Some(row) = rows.iter().find(|r| match &r.patterns[0] {
                    Pattern::Constructor { key, .. } => *key != BranchKey::Tuple(sigma.len()),
                    Pattern::Empty => true,
                    Pattern::Binding(_) => false
                }) {
                    let clause = &clauses[row.clause];
                    self.error(ElabError::ExpectedConstructor {
                        span: source_span(clause.span),
                        pattern: row.patterns[0].to_string(),
                        ty: ty.to_string()
                    });
                    return None
                }
                let fields = self.freshen(sigma.to_vec(), &Subst::new());
                let refs = fields.iter().map(|f| self.db.make_ref(f.var)).collect();
                let tuple = self.db.make_term(TermData::Tuple { fields: refs, sigma: ty.clone() });
                let key = BranchKey::Tuple(fields.len());
                match self.split(clauses, fields, tuple, key, &column, rest, &rows, path) {
                    Some(child) => children.push((key, child)),
                    None => complete = false
                }
            }
            _ => {
                if let Some(row) = rows.iter().find(|r| !r.patterns[0].is_binding()) {
                    let clause = &clauses[row.clause];
                    self.error(ElabError::ExpectedConstructor {
                        span: source_span(clause.span),
                        pattern: row.patterns[0].to_string(),
                        ty: ty.to_string()
                    });
                }
                return None
            }
        }
        if !complete { return None }
        Some(ElimTree::Branch { params, children })
    }

    /// The rows that continue into the branch for `key`, with the inspected
    /// column replaced by the constructor's fields.
    #[allow(clippy::too_many_arguments)]
    fn split(&mut self, clauses: &[ElimClause], fields: Vec<Column>, con_term: Term, key: BranchKey, column: &Column, rest: &[Column], rows: &[Row], mut path: Vec<Step>) -> Option<ElimTree> {
        let s = Subst::single(column.var, con_term.clone());
        let mut columns = fields.clone();
        for c in rest {
            let ty = subst_term(self.db, &s, &c.ty);
            columns.push(Column { var: c.var, ty });
        }
        let rows: Vec<Row> = rows.iter()
            .filter_map(|row| {
                let tail = row.patterns[1..].iter().cloned();
                match &row.patterns[0] {
                    Pattern::Constructor { key: k, args } if *k == key => Some(Row {
                        clause: row.clause,
                        patterns: args.iter().cloned().chain(tail).collect(),
                        subst: row.subst.clone()
                    }),
                    Pattern::Binding(var) => {
                        let mut subst = row.subst.clone();
                        subst.add(*var, con_term.clone());
                        let wildcards = fields.iter().map(|f| Pattern::Binding(f.var));
                        Some(Row { clause: row.clause, patterns: wildcards.chain(tail).collect(), subst })
                    }
                    _ => None
                }
            })
            .collect();
        for row in rows.iter() {
            if row.patterns.len() != columns.len() {
                let clause = &clauses[row.clause];
                let expected = columns.len() - rest.len();
                let error = if row.patterns.len() < columns.len() {
                    ElabError::NotEnoughPatterns { span: source_span(clause.span), expected }
                } else {
                    ElabError::TooManyPatterns { span: source_span(clause.span), expected }
                };
                self.error(error);
                return None
            }
        }
        path.push(Step::Split(key, fields.len()));
        self.build(clauses, columns, rows, path)
    }

    /// For truncated data: checks that the result may eliminate it and returns
    /// the highest number of interval dimensions a constructor still needs.
    fn truncation_level(&mut self, clauses: &[ElimClause], rows: &[Row], def: &DataDef, ty: &Term) -> Option<Option<i32>> {
        if !def.truncated { return Some(None) }
        let result = match self.result_sort {
            Some(result) => result,
            None => return Some(None)
        };
        let level = match result.h {
            Level::Finite { var: None, constant, .. } => Some(constant + 1),
            _ => None
        };
        let data_level = match def.sort.h {
            Level::Finite { var: None, constant, .. } => Some(constant + 1),
            _ => None
        };
        let fits = match (level, data_level) {
            (Some(level), Some(data_level)) if level <= data_level => true,
            _ => result.h.compare(&def.sort.h, Cmp::Le, self.levels)
        };
        if !fits {
            let span = rows.first().map_or((0, 0), |r| clauses[r.clause].span);
            let universe = self.db.make_universe(result);
            self.error(ElabError::Truncation { span: source_span(span), data: ty.to_string(), result: universe.to_string() });
            return None
        }
        Some(level)
    }

    fn build_interval(&mut self, clauses: &[ElimClause], columns: &[Column], intervals: &[bool]) -> Option<ElimTree> {
        let mut interval_rows = vec![];
        let mut other_rows = vec![];
        for (index, clause) in clauses.iter().enumerate() {
            let matched: Vec<usize> = (0..columns.len()).filter(|j| !clause.patterns[*j].is_binding()).collect();
            let interval_at: Vec<usize> = matched.iter()
                .copied()
                .filter(|j| intervals[*j] && clause.patterns[*j].constructor().is_some())
                .collect();
            if interval_at.is_empty() {
                other_rows.push(index);
            } else if matched.len() > 1 {
                self.error(ElabError::SingleIntervalPattern { span: source_span(clause.span) });
            } else {
                interval_rows.push((index, interval_at[0]));
            }
        }
        let first = interval_rows.iter().map(|(_, j)| *j).min()?;
        for index in other_rows.iter() {
            let clause = &clauses[*index];
            if let Some(pattern) = clause.patterns[first..].iter().find(|p| !p.is_binding()) {
                self.error(ElabError::DataAfterInterval { span: source_span(clause.span), pattern: pattern.to_string() });
            }
        }
        if self.failed { return None }

        let mut cases = vec![IntervalCase::default(); columns.len() - first];
        for (index, j) in interval_rows {
            let clause = &clauses[index];
            let side = match clause.patterns[j].constructor().and_then(|con| constructor_endpoint(self.db, con)) {
                Some(side) => side,
                None => continue
            };
            if cases[j - first].get(side).is_some() { continue }
            let mut s = Subst::new();
            for (pattern, column) in clause.patterns.iter().zip(columns.iter()) {
                if let Pattern::Binding(var) = pattern {
                    let reference = self.db.make_ref(column.var);
                    s.add(*var, reference);
                }
            }
            let body = match &clause.body {
                Some(body) => subst_term(self.db, &s, body),
                None => {
                    self.error(ElabError::ClauseWithoutBody { span: source_span(clause.span) });
                    continue
                }
            };
            self.used[index] = true;
            match side {
                Endpoint::Left => cases[j - first].left = Some(body),
                Endpoint::Right => cases[j - first].right = Some(body),
            }
        }

        let otherwise = if other_rows.is_empty() {
            if !cases.iter().any(|c| c.left.is_some() && c.right.is_some()) {
                self.missing_endpoints(columns, first, &cases);
            }
            None
        } else {
            let links = columns.iter().map(|c| (c.var, c.ty.clone())).collect();
            let fresh = self.freshen(links, &Subst::new());
            let rows = other_rows.iter()
                .map(|index| Row { clause: *index, patterns: clauses[*index].patterns.clone(), subst: Subst::new() })
                .collect();
            self.build(clauses, fresh, rows, vec![]).map(Box::new)
        };
        if self.failed || !self.missing.is_empty() { return None }

        let skip = cases.iter().take_while(|c| c.is_empty()).count();
        let cases = cases.split_off(skip);
        Some(ElimTree::Interval { params: telescope(columns), cases, otherwise })
    }

    fn missing_endpoints(&mut self, columns: &[Column], first: usize, cases: &[IntervalCase]) {
        for (offset, case) in cases.iter().enumerate() {
            if case.is_empty() { continue }
            let column = first + offset;
            let ty = whnf(self.db, &columns[column].ty);
            let constructors = match &*ty {
                TermData::DataCall { data, .. } => self.db.data(*data).map(|d| d.constructors.clone()).unwrap_or_default(),
                _ => continue
            };
            for (side, con) in [Endpoint::Left, Endpoint::Right].into_iter().zip(constructors) {
                if case.get(side).is_some() { continue }
                let path: Vec<Step> = columns.iter()
                    .enumerate()
                    .map(|(j, c)| if j == column { Step::Split(BranchKey::Con(con), 0) } else { Step::Bind(c.var) })
                    .collect();
                self.record_missing(&path);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        db: Database,
        lib: CoreLibrary,
        config: ElabConfig,
    }

    impl Fixture {
        fn new() -> Fixture {
            let _ = env_logger::builder().is_test(true).try_init();
            let mut db = Database::new();
            let lib = CoreLibrary::build(&mut db);
            Fixture { db, lib, config: ElabConfig::default() }
        }

        fn compile(&mut self, params: &Telescope, clauses: &[ElimClause]) -> (Option<ElimTree>, Vec<ElabError>) {
            self.compile_at(params, clauses, None, ElimMode::Top)
        }

        fn compile_at(&mut self, params: &Telescope, clauses: &[ElimClause], sort: Option<Sort>, mode: ElimMode) -> (Option<ElimTree>, Vec<ElabError>) {
            let mut errors = vec![];
            let mut levels = NoLevelEquations;
            let mut compiler = PatternCompiler::new(&mut self.db, &self.config, &mut errors, &mut levels).mode(mode);
            if let Some(sort) = sort { compiler = compiler.result_sort(sort) }
            let tree = compiler.compile((0, 10), params, clauses);
            (tree, errors)
        }

        fn nat_param(&mut self, name: &str) -> (Var, Telescope) {
            let var = self.db.fresh_var(name);
            let nat = self.lib.nat_type(&mut self.db);
            (var, Telescope::from_links(vec![(var, nat)]))
        }

        fn zero(&self) -> Pattern { Pattern::con(self.lib.zero, vec![]) }

        fn suc(&self, arg: Pattern) -> Pattern { Pattern::con(self.lib.suc, vec![arg]) }

        fn numeral(&mut self, n: usize) -> Term { self.lib.numeral(&mut self.db, n) }
    }

    fn clause(span: usize, patterns: Vec<Pattern>, body: Option<Term>) -> ElimClause {
        ElimClause { span: (span, span + 1), patterns, body }
    }

    #[test]
    fn nat_clauses_give_two_branches() {
        let mut fx = Fixture::new();
        let (_, params) = fx.nat_param("x");
        let n = fx.db.fresh_var("n");
        let zero = fx.numeral(0);
        let n_ref = fx.db.make_ref(n);
        let clauses = vec![
            clause(0, vec![fx.zero()], Some(zero)),
            clause(1, vec![fx.suc(Pattern::Binding(n))], Some(n_ref)),
        ];
        let (tree, errors) = fx.compile(&params, &clauses);
        assert!(errors.is_empty());
        let tree = tree.unwrap();
        assert_eq!(tree.keys(), vec![BranchKey::Con(fx.lib.zero), BranchKey::Con(fx.lib.suc)]);
        match tree.child(BranchKey::Con(fx.lib.suc)) {
            Some(ElimTree::Leaf { params, body }) => {
                assert_eq!(params.len(), 1);
                assert!(matches!(&**body, TermData::Ref { var } if Some(*var) == params.first().map(|l| l.var)));
            }
            other => panic!("expected a leaf, found {:?}", other)
        }
    }

    #[test]
    fn a_missing_successor_clause_is_named() {
        let mut fx = Fixture::new();
        let (_, params) = fx.nat_param("x");
        let zero = fx.numeral(0);
        let clauses = vec![clause(0, vec![fx.zero()], Some(zero))];
        let (tree, errors) = fx.compile(&params, &clauses);
        assert!(tree.is_none());
        match errors.as_slice() {
            [ElabError::MissingClauses { examples, truncated, .. }] => {
                assert_eq!(examples, &vec!["suc n".to_string()]);
                assert!(!truncated);
            }
            other => panic!("unexpected errors {:?}", other)
        }
    }

    #[test]
    fn missing_examples_are_capped() {
        let mut fx = Fixture::new();
        fx.config.missing_clauses_limit = 1;
        let x = fx.db.fresh_var("x");
        let y = fx.db.fresh_var("y");
        let nat = fx.lib.nat_type(&mut fx.db);
        let params = Telescope::from_links(vec![(x, nat.clone()), (y, nat)]);
        let zero = fx.numeral(0);
        let clauses = vec![clause(0, vec![fx.zero(), fx.zero()], Some(zero))];
        let (_, errors) = fx.compile(&params, &clauses);
        match errors.as_slice() {
            [ElabError::MissingClauses { examples, truncated, .. }] => {
                assert_eq!(examples.len(), 1);
                assert!(truncated);
            }
            other => panic!("unexpected errors {:?}", other)
        }
    }

    #[test]
    fn a_redundant_catch_all_leaves_the_tree_alone() {
        let mut fx = Fixture::new();
        let (_, params) = fx.nat_param("x");
        let n = fx.db.fresh_var("n");
        let m = fx.db.fresh_var("m");
        let zero = fx.numeral(0);
        let n_ref = fx.db.make_ref(n);
        let m_ref = fx.db.make_ref(m);
        let mut clauses = vec![
            clause(0, vec![fx.zero()], Some(zero)),
            clause(1, vec![fx.suc(Pattern::Binding(n))], Some(n_ref)),
        ];
        let (without, _) = fx.compile(&params, &clauses);
        clauses.push(clause(2, vec![Pattern::Binding(m)], Some(m_ref)));
        let (with, errors) = fx.compile(&params, &clauses);
        match errors.as_slice() {
            [ElabError::RedundantClause { clause, .. }] => assert_eq!(clause, "m"),
            other => panic!("unexpected errors {:?}", other)
        }
        assert_eq!(without.unwrap().to_string(), with.unwrap().to_string());
    }

    #[test]
    fn nested_patterns_split_twice() {
        let mut fx = Fixture::new();
        let (_, params) = fx.nat_param("x");
        let n = fx.db.fresh_var("n");
        let k = fx.db.fresh_var("k");
        let n_ref = fx.db.make_ref(n);
        let zero = fx.numeral(0);
        let one = fx.numeral(1);
        let clauses = vec![
            clause(0, vec![fx.suc(fx.suc(Pattern::Binding(n)))], Some(n_ref)),
            clause(1, vec![fx.suc(Pattern::Binding(k))], Some(one)),
            clause(2, vec![fx.zero()], Some(zero)),
        ];
        let (tree, errors) = fx.compile(&params, &clauses);
        assert!(errors.is_empty());
        let tree = tree.unwrap();
        let inner = tree.child(BranchKey::Con(fx.lib.suc)).unwrap();
        assert_eq!(inner.keys(), vec![BranchKey::Con(fx.lib.zero), BranchKey::Con(fx.lib.suc)]);
    }

    #[test]
    fn absurd_patterns_need_empty_types() {
        let mut fx = Fixture::new();
        let empty = fx.db.add_definition("Empty", Definition::Data(DataDef {
            params: Telescope::empty(),
            sort: Sort::prop(),
            constructors: vec![],
            truncated: false,
            interval: false
        }));
        let empty_type = fx.db.make_term(TermData::DataCall { data: empty, levels: Sort::SET0, args: vec![] });
        let e = fx.db.fresh_var("e");
        let params = Telescope::from_links(vec![(e, empty_type)]);
        let (tree, errors) = fx.compile(&params, &[clause(0, vec![Pattern::Empty], None)]);
        assert!(errors.is_empty());
        assert!(matches!(tree, Some(ElimTree::Branch { ref children, .. }) if children.is_empty()));

        let (_, params) = fx.nat_param("x");
        let (tree, errors) = fx.compile(&params, &[clause(0, vec![Pattern::Empty], None)]);
        assert!(tree.is_none());
        assert!(matches!(errors.as_slice(), [ElabError::ImpossibleEmptyPattern { .. }]));
    }

    #[test]
    fn clauses_without_bodies_are_rejected() {
        let mut fx = Fixture::new();
        let (x, params) = fx.nat_param("x");
        let (tree, errors) = fx.compile(&params, &[clause(0, vec![Pattern::Binding(x)], None)]);
        assert!(tree.is_none());
        assert!(matches!(errors.as_slice(), [ElabError::ClauseWithoutBody { .. }]));
    }

    #[test]
    fn tuples_are_split_by_their_fields() {
        let mut fx = Fixture::new();
        let a = fx.db.fresh_var("a");
        let b = fx.db.fresh_var("b");
        let nat = fx.lib.nat_type(&mut fx.db);
        let sigma = fx.db.make_term(TermData::Sigma { params: Telescope::from_links(vec![(a, nat.clone()), (b, nat)]) });
        let p = fx.db.fresh_var("p");
        let params = Telescope::from_links(vec![(p, sigma)]);
        let u = fx.db.fresh_var("u");
        let v = fx.db.fresh_var("v");
        let v_ref = fx.db.make_ref(v);
        let clauses = vec![clause(0, vec![Pattern::tuple(vec![Pattern::Binding(u), Pattern::Binding(v)])], Some(v_ref))];
        let (tree, errors) = fx.compile(&params, &clauses);
        assert!(errors.is_empty());
        assert_eq!(tree.unwrap().keys(), vec![BranchKey::Tuple(2)]);

        let (tree, errors) = fx.compile(&params, &[clause(0, vec![fx.zero()], None)]);
        assert!(tree.is_none());
        assert!(matches!(errors.as_slice(), [ElabError::ExpectedConstructor { .. }]));
    }

    fn interval_params(fx: &mut Fixture) -> Telescope {
        let i = fx.db.fresh_var("i");
        let interval = fx.lib.interval_type(&mut fx.db);
        Telescope::from_links(vec![(i, interval)])
    }

    #[test]
    fn both_endpoints_give_an_interval_elimination() {
        let mut fx = Fixture::new();
        let params = interval_params(&mut fx);
        let zero = fx.numeral(0);
        let one = fx.numeral(1);
        let left = Pattern::con(fx.lib.left, vec![]);
        let right = Pattern::con(fx.lib.right, vec![]);
        let clauses = vec![clause(0, vec![left], Some(zero)), clause(1, vec![right], Some(one))];
        let (tree, errors) = fx.compile(&params, &clauses);
        assert!(errors.is_empty());
        match tree {
            Some(ElimTree::Interval { cases, otherwise, .. }) => {
                assert_eq!(cases.len(), 1);
                assert!(cases[0].left.is_some() && cases[0].right.is_some());
                assert!(otherwise.is_none());
            }
            other => panic!("expected an interval elimination, found {:?}", other)
        }
    }

    #[test]
    fn a_missing_endpoint_is_named() {
        let mut fx = Fixture::new();
        let params = interval_params(&mut fx);
        let zero = fx.numeral(0);
        let left = Pattern::con(fx.lib.left, vec![]);
        let (tree, errors) = fx.compile(&params, &[clause(0, vec![left], Some(zero))]);
        assert!(tree.is_none());
        match errors.as_slice() {
            [ElabError::MissingClauses { examples, .. }] => assert_eq!(examples, &vec!["right".to_string()]),
            other => panic!("unexpected errors {:?}", other)
        }
    }

    #[test]
    fn interval_patterns_are_restricted() {
        let mut fx = Fixture::new();
        let i = fx.db.fresh_var("i");
        let x = fx.db.fresh_var("x");
        let interval = fx.lib.interval_type(&mut fx.db);
        let nat = fx.lib.nat_type(&mut fx.db);
        let params = Telescope::from_links(vec![(i, interval), (x, nat)]);
        let zero = fx.numeral(0);
        let left = Pattern::con(fx.lib.left, vec![]);

        let mixed = vec![clause(0, vec![left.clone(), fx.zero()], Some(zero.clone()))];
        let (_, errors) = fx.compile(&params, &mixed);
        assert!(matches!(errors.as_slice(), [ElabError::SingleIntervalPattern { .. }]));

        let j = fx.db.fresh_var("j");
        let after = vec![
            clause(0, vec![left.clone(), Pattern::Binding(x)], Some(zero.clone())),
            clause(1, vec![Pattern::Binding(j), fx.zero()], Some(zero.clone())),
        ];
        let (_, errors) = fx.compile(&params, &after);
        assert!(matches!(errors.as_slice(), [ElabError::DataAfterInterval { .. }]));

        let params = interval_params(&mut fx);
        let (_, errors) = fx.compile_at(&params, &[clause(0, vec![left], Some(zero))], None, ElimMode::Case);
        assert!(matches!(errors.as_slice(), [ElabError::IntervalNotAllowed { .. }]));
    }

    /// `\truncated \data Trunc \Prop | inT Nat`
    fn truncated_data(fx: &mut Fixture) -> (DefId, DefId) {
        let trunc = fx.db.add_definition("Trunc", Definition::Data(DataDef {
            params: Telescope::empty(),
            sort: Sort::prop(),
            constructors: vec![],
            truncated: true,
            interval: false
        }));
        let a = fx.db.fresh_var("a");
        let nat = fx.lib.nat_type(&mut fx.db);
        let in_t = fx.db.add_definition("inT", Definition::Constructor(ConstructorDef {
            data: trunc,
            params: Telescope::from_links(vec![(a, nat)]),
            intervals: 0
        }));
        fx.db.set_definition(trunc, Definition::Data(DataDef {
            params: Telescope::empty(),
            sort: Sort::prop(),
            constructors: vec![in_t],
            truncated: true,
            interval: false
        }));
        (trunc, in_t)
    }

    #[test]
    fn truncated_data_eliminates_only_into_its_level() {
        let mut fx = Fixture::new();
        let (trunc, in_t) = truncated_data(&mut fx);
        let t = fx.db.fresh_var("t");
        let ty = fx.db.make_term(TermData::DataCall { data: trunc, levels: Sort::SET0, args: vec![] });
        let params = Telescope::from_links(vec![(t, ty)]);
        let a = fx.db.fresh_var("a");
        let body = fx.numeral(0);
        let clauses = vec![clause(0, vec![Pattern::con(in_t, vec![Pattern::Binding(a)])], Some(body))];

        let (tree, errors) = fx.compile_at(&params, &clauses, Some(Sort::SET0), ElimMode::Top);
        assert!(tree.is_none());
        assert!(matches!(errors.as_slice(), [ElabError::Truncation { .. }]));

        let (tree, errors) = fx.compile_at(&params, &clauses, Some(Sort::prop()), ElimMode::Top);
        assert!(errors.is_empty());
        assert_eq!(tree.unwrap().keys(), vec![BranchKey::Con(in_t)]);
    }

    #[test]
    fn wrong_pattern_counts_are_reported() {
        let mut fx = Fixture::new();
        let (x, params) = fx.nat_param("x");
        let body = fx.numeral(0);
        let (_, errors) = fx.compile(&params, &[clause(0, vec![], Some(body.clone()))]);
        assert!(matches!(errors.as_slice(), [ElabError::NotEnoughPatterns { expected: 1, .. }]));
        let (_, errors) = fx.compile(&params, &[clause(0, vec![Pattern::Binding(x), Pattern::Binding(x)], Some(body))]);
        assert!(matches!(errors.as_slice(), [ElabError::TooManyPatterns { expected: 1, .. }]));
    }
}
