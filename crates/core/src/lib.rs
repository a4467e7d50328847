
pub mod hc;
pub mod utility;
pub mod level;
pub mod term;
pub mod elim;
pub mod pattern;
pub mod definition;
pub mod database;
pub mod subst;
pub mod normalize;
pub mod typing;
pub mod library;

pub mod prelude {
    pub use crate::{
        hc::*,
        utility::*,
        level::*,
        term::*,
        elim::*,
        pattern::*,
        definition::*,
        database::*,
        subst::*,
        normalize::*,
        typing::*,
        library::*,
    };
}
