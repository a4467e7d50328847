
use std::fmt;

use ahash::{AHashMap, AHashSet};
use colored::Colorize;

use cubix_core::prelude::*;

/// `left <= right`, with an inference variable on at least one side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelConstraint {
    pub left: Level,
    pub right: Level,
    pub span: Span,
}

impl LevelConstraint {
    fn vars(&self) -> impl Iterator<Item = LevelVar> {
        self.left.get_var().into_iter().chain(self.right.get_var())
    }

    fn kind(&self) -> Option<LevelKind> {
        self.vars().find(|v| v.is_inference()).map(LevelVar::kind)
    }
}

impl fmt::Display for LevelConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <= {}", self.left, self.right)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LevelError {
    Unsolved(LevelConstraint),
    /// Constraints that keep raising each other, in propagation order.
    Cycle(Vec<LevelConstraint>),
}

/// Solved inference variables. A solution is `max(\lp + k, c)` (or the
/// `\lh` form), a constant, or infinity.
#[derive(Debug, Clone, Default)]
pub struct LevelSolution {
    values: AHashMap<LevelVar, Level>,
}

impl LevelSolution {
    pub fn get(&self, var: LevelVar) -> Option<Level> { self.values.get(&var).copied() }

    pub fn map(&self) -> &AHashMap<LevelVar, Level> { &self.values }

    pub fn len(&self) -> usize { self.values.len() }

    pub fn is_empty(&self) -> bool { self.values.is_empty() }

    pub fn level(&self, level: &Level) -> Level {
        level.subst(&|v| self.get(v))
    }

    pub fn sort(&self, sort: &Sort) -> Sort {
        sort.subst(&|v| self.get(v))
    }

    pub fn satisfies(&self, constraint: &LevelConstraint) -> bool {
        let left = self.level(&constraint.left);
        let right = self.level(&constraint.right);
        left.compare(&right, Cmp::Le, &mut NoLevelEquations)
    }

    /// Variables whose value differs in `other`.
    pub fn changes(&self, other: &LevelSolution) -> Vec<LevelVar> {
        let mut result: Vec<_> = self.values.keys()
            .chain(other.values.keys())
            .filter(|v| self.get(**v) != other.get(**v))
            .copied()
            .collect();
        result.sort();
        result.dedup();
        result
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Value {
    Finite { based: Option<i32>, free: i32 },
    Infinity,
}

impl Value {
    fn to_level(self, kind: LevelKind) -> Level {
        match self {
            Value::Infinity => Level::Infinity,
            Value::Finite { based: None, free } => Level::constant(free),
            Value::Finite { based: Some(k), free } => Level::new(Some(LevelVar::Std(kind)), k, Some(free)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Based,
    Free,
}

/// Level constraints of one definition. Nothing is ever removed, so the
/// constraint list doubles as the record of everything that was asked.
#[derive(Debug, Clone, Default)]
pub struct LevelEquations {
    constraints: Vec<LevelConstraint>,
    span: Span,
}

impl LevelEquations {
    pub fn new() -> LevelEquations { LevelEquations::default() }

    pub fn set_span(&mut self, span: Span) { self.span = span; }

    pub fn constraints(&self) -> &[LevelConstraint] { &self.constraints }

    fn push(&mut self, left: Level, right: Level) {
        let constraint = LevelConstraint { left, right, span: self.span };
        log::trace!("{} {}", "level".bright_blue(), constraint);
        self.constraints.push(constraint);
    }

    /// Least solution of every constraint recorded so far. Based parts (the
    /// offsets from `\lp`/`\lh`) are propagated before free constants. The
    /// p-level of a sort that turned out to be Prop is solved like any other,
    /// it only ends up at its floor when nothing raises it.
    pub fn solve(&self) -> Result<LevelSolution, LevelError> {
        let h_values = self.solve_kind(LevelKind::HLevel)?;
        let p_values = self.solve_kind(LevelKind::PLevel)?;

        let mut values = AHashMap::new();
        for (var, value) in h_values.into_iter().chain(p_values) {
            values.insert(var, value.to_level(var.kind()));
        }
        let solution = LevelSolution { values };
        for constraint in self.constraints.iter() {
            if !solution.satisfies(constraint) {
                return Err(LevelError::Unsolved(*constraint))
            }
        }
        for (var, level) in solution.values.iter() {
            log::debug!("{} {} {}", var, ":=".green(), level);
        }
        Ok(solution)
    }

    fn solve_kind(&self, kind: LevelKind) -> Result<AHashMap<LevelVar, Value>, LevelError> {
        let constraints: Vec<(usize, &LevelConstraint)> = self.constraints.iter()
            .enumerate()
            .filter(|(_, c)| c.kind() == Some(kind))
            .collect();
        let mut values = AHashMap::new();
        for (_, c) in constraints.iter() {
            for var in c.vars().filter(|v| v.is_inference()) {
                values.insert(var, Value::Finite { based: None, free: var.floor() });
            }
        }
        let mut reasons = AHashMap::new();
        for phase in [Phase::Based, Phase::Free] {
            let rounds = values.len() + 1;
            let mut changed = vec![];
            for _ in 0..=rounds {
                changed.clear();
                for (index, c) in constraints.iter() {
                    if let Some(var) = relax(c, phase, &mut values) {
                        reasons.insert(var, *index);
                        changed.push(var);
                    }
                }
                if changed.is_empty() { break }
            }
            if let Some(var) = changed.first() {
                return Err(LevelError::Cycle(self.chain(*var, &reasons)))
            }
        }
        if kind == LevelKind::PLevel {
            for (index, c) in constraints.iter() {
                let infinite = c.vars().any(|v| values.get(&v) == Some(&Value::Infinity));
                if infinite { return Err(LevelError::Unsolved(self.constraints[*index])) }
            }
        }
        Ok(values)
    }

    /// Follows the constraints that last raised each variable back from `start`.
    fn chain(&self, start: LevelVar, reasons: &AHashMap<LevelVar, usize>) -> Vec<LevelConstraint> {
        let mut result = vec![];
        let mut seen = AHashSet::new();
        let mut current = start;
        while seen.insert(current) {
            let index = match reasons.get(&current) {
                Some(index) => *index,
                None => break
            };
            let constraint = self.constraints[index];
            result.push(constraint);
            match constraint.left.get_var() {
                Some(var) if var.is_inference() => current = var,
                _ => break
            }
        }
        result.reverse();
        result
    }
}

/// Raises the right-hand variable of `c` to satisfy it, returning the variable
/// if it changed.
fn relax(c: &LevelConstraint, phase: Phase, values: &mut AHashMap<LevelVar, Value>) -> Option<LevelVar> {
    let (target, offset, cap) = match c.right {
        Level::Finite { var: Some(var), constant, max_constant } if var.is_inference() => (var, constant, max_constant),
        _ => return None
    };
    let current = *values.get(&target)?;
    let (based, free) = match current {
        Value::Infinity => return None,
        Value::Finite { based, free } => (based, free)
    };
    let demand = match c.left {
        Level::Infinity => Some(Value::Infinity),
        Level::Finite { var, constant, max_constant } => {
            let mut need_based = None;
            let mut need_free = max_constant.filter(|m| cap.map_or(true, |cap| *m > cap)).map(|m| m - offset);
            match var {
                None => {
                    if cap.map_or(true, |cap| constant > cap) { need_free = Some(constant - offset) }
                }
                Some(LevelVar::Std(_)) => need_based = Some(constant - offset),
                Some(var) => match values.get(&var) {
                    Some(Value::Infinity) => return set(values, target, Value::Infinity),
                    Some(Value::Finite { based: b, free: f }) => {
                        need_based = b.map(|b| b + constant - offset);
                        if cap.map_or(true, |cap| f + constant > cap) {
                            let n = f + constant - offset;
                            need_free = Some(need_free.map_or(n, |m: i32| m.max(n)));
                        }
                    }
                    None => { }
                }
            }
            let based = match (phase, need_based) {
                (Phase::Based, Some(n)) => Some(based.map_or(n, |b| b.max(n))),
                _ => based
            };
            let free = match (phase, need_free) {
                (Phase::Free, Some(n)) => free.max(n),
                _ => free
            };
            Some(Value::Finite { based, free })
        }
    };
    match demand {
        Some(value) if value != current => set(values, target, value),
        _ => None
    }
}

fn set(values: &mut AHashMap<LevelVar, Value>, var: LevelVar, value: Value) -> Option<LevelVar> {
    if values.get(&var) == Some(&value) { return None }
    values.insert(var, value);
    Some(var)
}

impl LevelSink for LevelEquations {
    fn add_level_equation(&mut self, left: &Level, right: &Level, cmp: Cmp) -> bool {
        match cmp {
            Cmp::Le => self.push(*left, *right),
            Cmp::Ge => self.push(*right, *left),
            Cmp::Eq => {
                self.push(*left, *right);
                self.push(*right, *left);
            }
        }
        true
    }
}

pub fn render_chain(chain: &[LevelConstraint]) -> String {
    chain.iter().map(|c| c.to_string()).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn infer(id: usize, kind: LevelKind) -> LevelVar { LevelVar::Infer { id, kind } }

    fn lp() -> Level { Level::var(LevelVar::Std(LevelKind::PLevel)) }

    #[test]
    fn least_solution_satisfies_every_constraint() {
        let mut eqs = LevelEquations::new();
        let x = Level::var(infer(0, LevelKind::PLevel));
        let y = Level::var(infer(1, LevelKind::PLevel));
        let z = Level::var(infer(2, LevelKind::PLevel));
        assert!(Level::constant(2).compare(&x, Cmp::Le, &mut eqs));
        assert!(x.succ().compare(&y, Cmp::Le, &mut eqs));
        assert!(lp().compare(&z, Cmp::Le, &mut eqs));
        assert!(y.compare(&z, Cmp::Le, &mut eqs));
        let solution = eqs.solve().unwrap();
        assert_eq!(solution.get(infer(0, LevelKind::PLevel)), Some(Level::constant(2)));
        assert_eq!(solution.get(infer(1, LevelKind::PLevel)), Some(Level::constant(3)));
        assert_eq!(
            solution.get(infer(2, LevelKind::PLevel)),
            Some(Level::new(Some(LevelVar::Std(LevelKind::PLevel)), 0, Some(3)))
        );
        assert!(eqs.constraints().iter().all(|c| solution.satisfies(c)));
        let again = eqs.solve().unwrap();
        assert!(solution.changes(&again).is_empty());
    }

    #[test]
    fn upper_bounds_are_checked() {
        let mut eqs = LevelEquations::new();
        let x = Level::var(infer(0, LevelKind::PLevel));
        assert!(Level::constant(3).compare(&x, Cmp::Le, &mut eqs));
        assert!(x.compare(&Level::constant(1), Cmp::Le, &mut eqs));
        assert!(matches!(eqs.solve(), Err(LevelError::Unsolved(_))));
    }

    #[test]
    fn positive_cycles_are_reported_as_chains() {
        let mut eqs = LevelEquations::new();
        let x = Level::var(infer(0, LevelKind::PLevel));
        let y = Level::var(infer(1, LevelKind::PLevel));
        assert!(x.succ().compare(&y, Cmp::Le, &mut eqs));
        assert!(y.compare(&x, Cmp::Le, &mut eqs));
        match eqs.solve() {
            Err(LevelError::Cycle(chain)) => {
                assert!(!chain.is_empty());
                assert!(render_chain(&chain).contains("<="));
            }
            other => panic!("expected a cycle, found {:?}", other)
        }
    }

    #[test]
    fn prop_sorts_keep_their_predicative_constraints() {
        let mut eqs = LevelEquations::new();
        let p = infer(0, LevelKind::PLevel);
        let h = infer(1, LevelKind::HLevel);
        let q = infer(2, LevelKind::PLevel);
        let sort = Sort::new(Level::var(p), Level::var(h));
        assert!(sort.compare(&Sort::new(Level::constant(0), Level::prop()), Cmp::Le, &mut eqs));
        assert!(Level::constant(4).compare(&Level::var(p), Cmp::Le, &mut eqs));
        assert!(Level::var(p).succ().compare(&Level::var(q), Cmp::Le, &mut eqs));
        let solution = eqs.solve().unwrap();
        assert_eq!(solution.get(h), Some(Level::prop()));
        assert_eq!(solution.get(p), Some(Level::constant(4)));
        assert_eq!(solution.get(q), Some(Level::constant(5)));
        assert!(eqs.constraints().iter().all(|c| solution.satisfies(c)));
    }

    #[test]
    fn unconstrained_h_levels_default_to_prop() {
        let mut eqs = LevelEquations::new();
        let h = Level::var(infer(0, LevelKind::HLevel));
        let k = Level::var(infer(1, LevelKind::HLevel));
        assert!(h.compare(&k, Cmp::Le, &mut eqs));
        let solution = eqs.solve().unwrap();
        assert_eq!(solution.get(infer(0, LevelKind::HLevel)), Some(Level::prop()));
    }

    #[test]
    fn infinity_propagates_along_h_levels() {
        let mut eqs = LevelEquations::new();
        let h = Level::var(infer(0, LevelKind::HLevel));
        let k = Level::var(infer(1, LevelKind::HLevel));
        assert!(Level::Infinity.compare(&h, Cmp::Le, &mut eqs));
        assert!(h.compare(&k, Cmp::Le, &mut eqs));
        let solution = eqs.solve().unwrap();
        assert_eq!(solution.get(infer(1, LevelKind::HLevel)), Some(Level::Infinity));
    }
}
