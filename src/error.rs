use crate::codegen::CodegenError;
use crate::ir::exec::ExecError;
use crate::parser::ParserError;

/// Top-level error for anything that can go wrong between source text and
/// a computed value.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("parse error: {0}")]
    Parse(#[from] ParserError),
    #[error("codegen error: {0}")]
    Codegen(#[from] CodegenError),
    #[error("execution error: {0}")]
    Exec(#[from] ExecError),
    #[cfg(feature = "llvm")]
    #[error("llvm error: {0}")]
    Llvm(#[from] crate::llvm::LlvmError),
}

pub type Result<T> = std::result::Result<T, Error>;
