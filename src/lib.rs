//! Front end for a tiny expression language with numeric functions.
//!
//! - `source` supplies characters, from a string or any reader.
//! - `lexer` pulls tokens out of a source one at a time.
//! - `parser` builds the syntax tree with recursive descent and precedence
//!   climbing for binary operators.
//! - `codegen` lowers the tree through any [`backend::Backend`].
//! - `ir` is the in-crate backend, which can print and run what it builds.
//! - `llvm` (feature `llvm`) lowers to LLVM IR and runs it with the JIT.
//! - `pipeline` ties the stages together per translation unit.

pub mod ast;
pub mod backend;
pub mod codegen;
pub mod error;
pub mod ir;
pub mod lexer;
#[cfg(feature = "llvm")]
pub mod llvm;
pub mod parser;
pub mod pipeline;
pub mod source;

pub use error::{Error, Result};

use ir::{exec::Executor, Module};
use pipeline::{Kind, Pipeline};
use source::StrSource;

/// Compile `input` with the in-crate backend and evaluate its last top-level
/// expression. Any parse, lowering or execution failure is an error.
pub fn eval_str(input: &str) -> Result<Option<f64>> {
    let mut pipeline = Pipeline::new(parser::Parser::default(), Module::new("kiln"));
    let lowered = pipeline.compile(StrSource::new(input)).into_result()?;
    let last = lowered
        .into_iter()
        .filter(|(kind, _)| *kind == Kind::TopLevel)
        .map(|(_, func)| func)
        .last();
    match last {
        Some(func) => Ok(Some(Executor::new(pipeline.backend()).call(func, &[])?)),
        None => Ok(None),
    }
}
