
pub mod config;
pub mod error;
pub mod levels;
pub mod equations;
pub mod compare;
pub mod elim;
pub mod syntax;
pub mod elaborator;

pub mod prelude {
    pub use crate::{
        config::*,
        error::*,
        levels::*,
        equations::*,
        compare::*,
        elim::*,
        syntax::*,
        elaborator::*,
    };
}
