//! pymake build

pub mod compile;
pub mod depfile;
pub mod dict;
pub mod document;
pub mod guard;
pub mod paths;
pub mod plan;
pub mod resolve;
mod run;
pub use run::*;
