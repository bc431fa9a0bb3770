mod collection;
mod comparison;
mod error;
mod model;
mod ngram;
mod readers;
mod util;

pub use collection::*;
pub use comparison::*;
pub use error::*;
pub use model::config::*;
pub use model::melody::*;
pub use model::note::*;
pub use model::rest::*;
pub use ngram::*;
pub use readers::*;
pub use util::*;
