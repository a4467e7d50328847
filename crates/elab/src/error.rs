
use std::fmt;
use std::error::Error;

use colored::Colorize;
use thiserror::Error;
use miette::{Diagnostic, GraphicalReportHandler, GraphicalTheme, SourceSpan};

use cubix_core::prelude::*;

pub fn source_span(span: Span) -> SourceSpan {
    let (start, end) = span;
    SourceSpan::new(start.into(), end.saturating_sub(start).into())
}

#[derive(Debug, Error, Diagnostic)]
pub enum ElabError {
    #[error("Type Mismatch")]
    #[diagnostic()]
    TypeMismatch {
        #[label("expected {expected} but found {actual}")]
        span: SourceSpan,
        expected: String,
        actual: String
    },
    #[error("Cannot infer {meta}")]
    #[diagnostic(help("{reason}"))]
    ArgInference {
        #[label("while elaborating this")]
        span: SourceSpan,
        meta: String,
        reason: String
    },
    #[error("Unsolved Equation")]
    #[diagnostic()]
    UnsolvedEquation {
        #[label("{left} {cmp} {right}")]
        span: SourceSpan,
        left: String,
        right: String,
        cmp: Cmp
    },
    #[error("Unsolved Level Equation")]
    #[diagnostic(help("{chain}"))]
    LevelEquationUnsolved {
        #[label("universe levels do not fit")]
        span: SourceSpan,
        chain: String
    },
    #[error("Cycle")]
    #[diagnostic(help("{chain}"))]
    Cycle {
        #[label("level constraints form a cycle")]
        span: SourceSpan,
        chain: String
    },
    #[error("Class Conflict")]
    #[diagnostic()]
    ClassConflict {
        #[label("lower bounds {first} and {second} cannot be merged")]
        span: SourceSpan,
        first: String,
        second: String
    },
    #[error("Missing Clauses")]
    #[diagnostic(help("missing: {listing}"))]
    MissingClauses {
        #[label("patterns are not exhaustive")]
        span: SourceSpan,
        examples: Vec<String>,
        truncated: bool,
        listing: String
    },
    #[error("Not Enough Patterns")]
    #[diagnostic()]
    NotEnoughPatterns {
        #[label("expected {expected} patterns")]
        span: SourceSpan,
        expected: usize
    },
    #[error("Too Many Patterns")]
    #[diagnostic()]
    TooManyPatterns {
        #[label("expected {expected} patterns")]
        span: SourceSpan,
        expected: usize
    },
    #[error("Eliminated parameters must be listed in order")]
    #[diagnostic()]
    ElimOrder {
        #[label("{var} is out of order")]
        span: SourceSpan,
        var: String
    },
    #[error("A clause may match only one interval pattern")]
    #[diagnostic()]
    SingleIntervalPattern {
        #[label("other patterns of this clause must be variables")]
        span: SourceSpan
    },
    #[error("Data patterns cannot follow interval patterns")]
    #[diagnostic()]
    DataAfterInterval {
        #[label("matches {pattern}")]
        span: SourceSpan,
        pattern: String
    },
    #[error("Interval elimination is not allowed here")]
    #[diagnostic()]
    IntervalNotAllowed {
        #[label("matches {pattern}")]
        span: SourceSpan,
        pattern: String
    },
    #[error("Expected Constructor")]
    #[diagnostic()]
    ExpectedConstructor {
        #[label("{pattern} is not a constructor of {ty}")]
        span: SourceSpan,
        pattern: String,
        ty: String
    },
    #[error("Impossible Empty Pattern")]
    #[diagnostic()]
    ImpossibleEmptyPattern {
        #[label("{ty} has constructors")]
        span: SourceSpan,
        ty: String
    },
    #[error("Clause Without Body")]
    #[diagnostic()]
    ClauseWithoutBody {
        #[label("needs a body or an absurd pattern")]
        span: SourceSpan
    },
    #[error("Truncation")]
    #[diagnostic(help("the result lives in {result}"))]
    Truncation {
        #[label("{data} is truncated")]
        span: SourceSpan,
        data: String,
        result: String
    },
    #[error("Redundant Clause")]
    #[diagnostic(severity(Warning))]
    RedundantClause {
        #[label("this clause is never reached")]
        span: SourceSpan,
        clause: String
    },
    #[error("Instance Not Found")]
    #[diagnostic()]
    InstanceNotFound {
        #[label("no instance of {class} for {data}")]
        span: SourceSpan,
        class: String,
        data: String
    },
}

impl ElabError {
    pub fn mismatch(span: Span, expected: impl fmt::Display, actual: impl fmt::Display) -> ElabError {
        ElabError::TypeMismatch { span: source_span(span), expected: expected.to_string(), actual: actual.to_string() }
    }

    pub fn inference(span: Span, meta: impl fmt::Display, reason: impl Into<String>) -> ElabError {
        ElabError::ArgInference { span: source_span(span), meta: meta.to_string(), reason: reason.into() }
    }

    pub fn missing_clauses(span: Span, examples: Vec<String>, truncated: bool) -> ElabError {
        let mut listing = examples.join("; ");
        if truncated { listing.push_str("; ...") }
        ElabError::MissingClauses { span: source_span(span), examples, truncated, listing }
    }

    pub fn is_warning(&self) -> bool { matches!(self, ElabError::RedundantClause { .. }) }
}

/// Receives the diagnostics of an elaboration session in order.
pub trait ErrorReporter {
    fn report(&mut self, error: ElabError);
}

impl ErrorReporter for Vec<ElabError> {
    fn report(&mut self, error: ElabError) { self.push(error) }
}

#[derive(Debug, Default)]
pub struct CollectingReporter {
    errors: Vec<ElabError>,
}

impl CollectingReporter {
    pub fn new() -> CollectingReporter { CollectingReporter::default() }

    pub fn errors(&self) -> &[ElabError] { &self.errors }

    /// Number of reports that are not warnings.
    pub fn error_count(&self) -> usize {
        self.errors.iter().filter(|e| !e.is_warning()).count()
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ElabError> {
        self.errors.iter().filter(|e| e.is_warning())
    }

    pub fn into_result(self) -> Result<(), CubixError> {
        if self.error_count() == 0 { Ok(()) }
        else { Err(CubixError::Collection(self.errors.into_iter().map(CubixError::from).collect())) }
    }
}

impl ErrorReporter for CollectingReporter {
    fn report(&mut self, error: ElabError) {
        log::debug!("{} {}", "reported".red(), error);
        self.errors.push(error);
    }
}

#[derive(Debug)]
pub enum CubixError {
    Elaborator(ElabError),
    Database(DatabaseError),
    /// The definition was stored with errors; the diagnostics went to the reporter.
    Definition { name: Symbol, errors: usize },
    External(Box<dyn Error + Send + Sync>),
    Collection(Vec<CubixError>)
}

impl fmt::Display for CubixError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CubixError::Elaborator(e) => {
                let mut out = String::new();
                GraphicalReportHandler::new_themed(GraphicalTheme::unicode())
                    .with_width(80)
                    .render_report(&mut out, e)?;
                out.fmt(f)
            }
            CubixError::Database(e) => e.fmt(f),
            CubixError::Definition { name, errors } =>
                write!(f, "{} has {} error(s)", name, errors),
            CubixError::External(e) => e.fmt(f),
            CubixError::Collection(list) => {
                for e in list.iter() {
                    e.fmt(f)?;
                    writeln!(f)?;
                }
                Ok(())
            }
        }
    }
}

impl Error for CubixError { }

impl From<ElabError> for CubixError {
    fn from(error: ElabError) -> Self { CubixError::Elaborator(error) }
}

impl From<DatabaseError> for CubixError {
    fn from(error: DatabaseError) -> Self { CubixError::Database(error) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warnings_do_not_fail_a_collection() {
        let mut reporter = CollectingReporter::new();
        reporter.report(ElabError::RedundantClause { span: source_span((4, 9)), clause: "n".into() });
        assert_eq!(reporter.error_count(), 0);
        assert_eq!(reporter.warnings().count(), 1);
        assert!(reporter.into_result().is_ok());
    }

    #[test]
    fn missing_clauses_render_their_examples() {
        let mut reporter = CollectingReporter::new();
        reporter.report(ElabError::missing_clauses((0, 3), vec!["suc n".into()], false));
        let rendered = match reporter.into_result() {
            Err(e) => e.to_string(),
            Ok(()) => String::new()
        };
        assert!(rendered.contains("Missing Clauses"));
        assert!(rendered.contains("suc n"));
    }
}
