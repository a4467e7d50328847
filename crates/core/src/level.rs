use std::fmt;

use crate::utility::Cmp;

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum LevelKind {
    PLevel,
    HLevel
}

impl LevelKind {
    /// The least value a variable of this kind may take. Inference h-levels may go
    /// down to Prop (-1); the definition's own `\lh` starts at sets.
    pub fn floor(self, inference: bool) -> i32 {
        match self {
            LevelKind::PLevel => 0,
            LevelKind::HLevel => if inference { -1 } else { 0 }
        }
    }
}

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum LevelVar {
    /// `\lp` or `\lh` of the definition being elaborated.
    Std(LevelKind),
    Infer { id: usize, kind: LevelKind },
}

impl LevelVar {
    pub fn kind(self) -> LevelKind {
        match self {
            LevelVar::Std(kind) => kind,
            LevelVar::Infer { kind, .. } => kind
        }
    }

    pub fn is_inference(self) -> bool { matches!(self, LevelVar::Infer { .. }) }

    pub fn floor(self) -> i32 { self.kind().floor(self.is_inference()) }
}

impl fmt::Display for LevelVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LevelVar::Std(LevelKind::PLevel) => write!(f, "\\lp"),
            LevelVar::Std(LevelKind::HLevel) => write!(f, "\\lh"),
            LevelVar::Infer { id, kind: LevelKind::PLevel } => write!(f, "?p{}", id),
            LevelVar::Infer { id, kind: LevelKind::HLevel } => write!(f, "?h{}", id),
        }
    }
}

/// `max(var + constant, max_constant)`, or just `constant` without a variable.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum Level {
    Finite {
        var: Option<LevelVar>,
        constant: i32,
        max_constant: Option<i32>
    },
    Infinity,
}

/// Receiver of level constraints that cannot be decided on the spot.
pub trait LevelSink {
    fn add_level_equation(&mut self, left: &Level, right: &Level, cmp: Cmp) -> bool;
}

/// Accepts nothing: only closed comparisons succeed.
pub struct NoLevelEquations;

impl LevelSink for NoLevelEquations {
    fn add_level_equation(&mut self, _left: &Level, _right: &Level, _cmp: Cmp) -> bool { false }
}

impl Level {
    pub fn new(var: Option<LevelVar>, constant: i32, max_constant: Option<i32>) -> Level {
        let max_constant = match var {
            None => None,
            Some(var) => max_constant.filter(|m| *m > var.floor() + constant)
        };
        Level::Finite { var, constant, max_constant }
    }

    pub fn constant(constant: i32) -> Level {
        Level::Finite { var: None, constant, max_constant: None }
    }

    pub fn var(var: LevelVar) -> Level {
        Level::Finite { var: Some(var), constant: 0, max_constant: None }
    }

    pub fn prop() -> Level { Level::constant(-1) }

    pub fn is_infinity(&self) -> bool { matches!(self, Level::Infinity) }

    pub fn is_closed(&self) -> bool {
        matches!(self, Level::Finite { var: None, .. })
    }

    pub fn is_prop(&self) -> bool {
        matches!(self, Level::Finite { var: None, constant: -1, .. })
    }

    pub fn get_var(&self) -> Option<LevelVar> {
        match self {
            Level::Finite { var, .. } => *var,
            Level::Infinity => None
        }
    }

    pub fn get_constant(&self) -> Option<i32> {
        match self {
            Level::Finite { constant, .. } => Some(*constant),
            Level::Infinity => None
        }
    }

    pub fn get_max_constant(&self) -> Option<i32> {
        match self {
            Level::Finite { max_constant, .. } => *max_constant,
            Level::Infinity => None
        }
    }

    pub fn has_inference_var(&self) -> bool {
        self.get_var().map_or(false, LevelVar::is_inference)
    }

    pub fn add(&self, n: i32) -> Level {
        match *self {
            Level::Finite { var, constant, max_constant } =>
                Level::new(var, constant + n, max_constant.map(|m| m + n)),
            Level::Infinity => Level::Infinity
        }
    }

    pub fn succ(&self) -> Level { self.add(1) }

    /// Value of the level when its variable takes the value `x`.
    fn value_at(&self, x: i32) -> Option<i32> {
        match *self {
            Level::Finite { var: None, constant, .. } => Some(constant),
            Level::Finite { var: Some(_), constant, max_constant } =>
                Some(max_constant.map_or(x + constant, |m| m.max(x + constant))),
            Level::Infinity => None
        }
    }

    /// Least upper bound, if it can be expressed with at most one variable.
    pub fn max(&self, other: &Level) -> Option<Level> {
        match (*self, *other) {
            (Level::Infinity, _) | (_, Level::Infinity) => Some(Level::Infinity),
            (Level::Finite { var: None, constant: c1, .. }, Level::Finite { var: None, constant: c2, .. }) =>
                Some(Level::constant(c1.max(c2))),
            (Level::Finite { var: Some(v), constant, max_constant }, Level::Finite { var: None, constant: k, .. })
            | (Level::Finite { var: None, constant: k, .. }, Level::Finite { var: Some(v), constant, max_constant }) => {
                let m = max_constant.map_or(k, |m| m.max(k));
                Some(Level::new(Some(v), constant, Some(m)))
            }
            (Level::Finite { var: Some(v1), constant: c1, max_constant: m1 }
            , Level::Finite { var: Some(v2), constant: c2, max_constant: m2 }) => {
                if v1 != v2 { return None }
                let m = match (m1, m2) {
                    (Some(a), Some(b)) => Some(a.max(b)),
                    (a, b) => a.or(b)
                };
                Some(Level::new(Some(v1), c1.max(c2), m))
            }
        }
    }

    pub fn subst(&self, f: &impl Fn(LevelVar) -> Option<Level>) -> Level {
        match *self {
            Level::Finite { var: Some(var), constant, max_constant } => match f(var) {
                Some(Level::Infinity) => Level::Infinity,
                Some(Level::Finite { var: inner, constant: c, max_constant: m }) => {
                    let shifted = m.map(|m| m + constant);
                    let max = match (shifted, max_constant) {
                        (Some(a), Some(b)) => Some(a.max(b)),
                        (a, b) => a.or(b)
                    };
                    match inner {
                        Some(_) => Level::new(inner, c + constant, max),
                        None => Level::constant(max.map_or(c + constant, |m| m.max(c + constant)))
                    }
                }
                None => *self
            },
            _ => *self
        }
    }

    /// Decides `self cmp other`, handing constraints over inference variables to `sink`.
    pub fn compare(&self, other: &Level, cmp: Cmp, sink: &mut dyn LevelSink) -> bool {
        match cmp {
            Cmp::Ge => other.compare(self, Cmp::Le, sink),
            Cmp::Eq => {
                if self == other { return true }
                if self.has_inference_var() || other.has_inference_var() {
                    return sink.add_level_equation(self, other, Cmp::Eq)
                }
                self.compare(other, Cmp::Le, sink) && other.compare(self, Cmp::Le, sink)
            }
            Cmp::Le => {
                if self == other { return true }
                match (self, other) {
                    (_, Level::Infinity) => true,
                    (Level::Infinity, _) => other.has_inference_var()
                        && sink.add_level_equation(self, other, Cmp::Le),
                    _ if self.has_inference_var() || other.has_inference_var() =>
                        sink.add_level_equation(self, other, Cmp::Le),
                    _ => self.closed_le(other)
                }
            }
        }
    }

    /// `self <= other` for levels whose only variables are `\lp`/`\lh`.
    fn closed_le(&self, other: &Level) -> bool {
        match (self.get_var(), other.get_var()) {
            (Some(_), None) => false,
            (Some(v1), Some(v2)) if v1 != v2 => false,
            (var1, var2) => {
                let floor = var1.or(var2).map_or(0, LevelVar::floor);
                let slope_ok = match (var1, self.get_constant(), other.get_constant()) {
                    (Some(_), Some(c1), Some(c2)) => c1 <= c2,
                    _ => true
                };
                let floor_ok = match (self.value_at(floor), other.value_at(floor)) {
                    (Some(a), Some(b)) => a <= b,
                    _ => false
                };
                slope_ok && floor_ok
            }
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Infinity => write!(f, "\\oo"),
            Level::Finite { var: None, constant, .. } => write!(f, "{}", constant),
            Level::Finite { var: Some(var), constant, max_constant } => {
                let base = match constant {
                    0 => var.to_string(),
                    c if *c > 0 => format!("{} + {}", var, c),
                    c => format!("{} - {}", var, -c),
                };
                match max_constant {
                    Some(m) => write!(f, "max({}, {})", base, m),
                    None => write!(f, "{}", base)
                }
            }
        }
    }
}

/// Universe index: predicative level and homotopy level.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub struct Sort {
    pub p: Level,
    pub h: Level,
}

impl Sort {
    /// `\Set0`; also the level argument of calls to definitions without level parameters.
    pub const SET0: Sort = Sort {
        p: Level::Finite { var: None, constant: 0, max_constant: None },
        h: Level::Finite { var: None, constant: 0, max_constant: None },
    };

    /// The predicative level must be finite; only `h` may be infinity.
    pub fn new(p: Level, h: Level) -> Sort {
        debug_assert!(!p.is_infinity(), "infinite predicative level");
        Sort { p, h }
    }

    pub fn prop() -> Sort { Sort::new(Level::constant(0), Level::prop()) }

    pub fn set(p: i32) -> Sort { Sort::new(Level::constant(p), Level::constant(0)) }

    /// `\Type \lp \lh`
    pub fn std() -> Sort {
        Sort::new(Level::var(LevelVar::Std(LevelKind::PLevel)), Level::var(LevelVar::Std(LevelKind::HLevel)))
    }

    pub fn is_prop(&self) -> bool { self.h.is_prop() }

    pub fn is_omega(&self) -> bool { self.h.is_infinity() }

    pub fn is_closed(&self) -> bool {
        self.p.is_closed() && (self.h.is_closed() || self.h.is_infinity())
    }

    /// Sort of the universe `\Type self`.
    pub fn succ(&self) -> Sort {
        if self.is_prop() { Sort::set(0) }
        else { Sort::new(self.p.succ(), self.h.succ()) }
    }

    pub fn max(&self, other: &Sort) -> Option<Sort> {
        if self.is_prop() { return Some(*other) }
        if other.is_prop() { return Some(*self) }
        Some(Sort::new(self.p.max(&other.p)?, self.h.max(&other.h)?))
    }

    pub fn subst(&self, f: &impl Fn(LevelVar) -> Option<Level>) -> Sort {
        Sort::new(self.p.subst(f), self.h.subst(f))
    }

    pub fn compare(&self, other: &Sort, cmp: Cmp, sink: &mut dyn LevelSink) -> bool {
        if cmp == Cmp::Ge { return other.compare(self, Cmp::Le, sink) }
        if self.is_prop() {
            return cmp == Cmp::Le || other.is_prop()
                || other.h.compare(&Level::prop(), Cmp::Eq, sink)
        }
        if other.is_prop() {
            return self.h.compare(&Level::prop(), Cmp::Le, sink)
        }
        self.p.compare(&other.p, cmp, sink) && self.h.compare(&other.h, cmp, sink)
    }
}

impl fmt::Display for Sort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_prop() { return write!(f, "\\Prop") }
        match (self.p, self.h) {
            (Level::Finite { var: None, constant: p, .. }, Level::Finite { var: None, constant: 0, .. }) =>
                write!(f, "\\Set{}", p),
            (p, Level::Infinity) => write!(f, "\\oo-Type ({})", p),
            (p, h) => write!(f, "\\Type ({}) ({})", p, h)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lp() -> Level { Level::var(LevelVar::Std(LevelKind::PLevel)) }

    #[test]
    fn closed_levels_compare_by_value() {
        let mut sink = NoLevelEquations;
        assert!(Level::constant(1).compare(&Level::constant(2), Cmp::Le, &mut sink));
        assert!(!Level::constant(3).compare(&Level::constant(2), Cmp::Le, &mut sink));
        assert!(Level::constant(2).compare(&Level::constant(2), Cmp::Eq, &mut sink));
    }

    #[test]
    fn std_variable_is_unbounded() {
        let mut sink = NoLevelEquations;
        assert!(lp().compare(&lp().succ(), Cmp::Le, &mut sink));
        assert!(!lp().succ().compare(&lp(), Cmp::Le, &mut sink));
        assert!(!lp().compare(&Level::constant(100), Cmp::Le, &mut sink));
        assert!(Level::constant(0).compare(&lp(), Cmp::Le, &mut sink));
        let bumped = Level::new(Some(LevelVar::Std(LevelKind::PLevel)), 0, Some(3));
        assert!(Level::constant(3).compare(&bumped, Cmp::Le, &mut sink));
        assert!(!Level::constant(4).compare(&bumped, Cmp::Le, &mut sink));
    }

    #[test]
    fn infinity_only_bounds_from_above() {
        let mut sink = NoLevelEquations;
        assert!(Level::constant(7).compare(&Level::Infinity, Cmp::Le, &mut sink));
        assert!(!Level::Infinity.compare(&Level::constant(7), Cmp::Le, &mut sink));
    }

    #[test]
    fn prop_collapses_the_predicative_axis() {
        let mut sink = NoLevelEquations;
        let big_prop = Sort::new(Level::constant(5), Level::prop());
        assert!(big_prop.compare(&Sort::set(0), Cmp::Le, &mut sink));
        assert!(Sort::prop().compare(&big_prop, Cmp::Eq, &mut sink));
        assert!(!Sort::set(0).compare(&Sort::prop(), Cmp::Le, &mut sink));
    }

    #[test]
    fn max_is_componentwise() {
        let a = Sort::new(Level::constant(1), Level::constant(0));
        let b = Sort::new(Level::constant(0), Level::constant(2));
        let m = a.max(&b).unwrap();
        assert_eq!(m, Sort::new(Level::constant(1), Level::constant(2)));
        assert_eq!(Sort::prop().max(&a), Some(a));
        let var = Sort::new(lp(), Level::constant(0));
        let with_var = var.max(&a).unwrap();
        assert_eq!(with_var.p, Level::new(Some(LevelVar::Std(LevelKind::PLevel)), 0, Some(1)));
    }

    #[test]
    fn substitution_composes_offsets() {
        let x = LevelVar::Infer { id: 0, kind: LevelKind::PLevel };
        let level = Level::new(Some(x), 2, Some(5));
        let to_closed = level.subst(&|_| Some(Level::constant(1)));
        assert_eq!(to_closed, Level::constant(5));
        let to_std = level.subst(&|_| Some(lp().succ()));
        assert_eq!(to_std, Level::new(Some(LevelVar::Std(LevelKind::PLevel)), 3, Some(5)));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "infinite predicative level")]
    fn predicative_levels_are_never_infinite() {
        let _ = Sort::new(Level::Infinity, Level::constant(0));
    }
}
