pub mod ast;
mod lexer;
#[allow(clippy::module_inception)]
mod parser;

pub use ast::{Command, Pipeline};
pub use parser::parse;
