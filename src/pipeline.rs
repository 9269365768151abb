use std::fmt;

use crate::ast::ASTNode;
use crate::backend::Backend;
use crate::codegen::{Codegen, CodegenError};
use crate::error::Error;
use crate::parser::{Parser, ParserError};
use crate::source::CharSource;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Kind {
    Definition,
    Extern,
    TopLevel,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kind::Definition => write!(f, "function definition"),
            Kind::Extern => write!(f, "extern"),
            Kind::TopLevel => write!(f, "top level expr"),
        }
    }
}

/// What became of one top-level construct.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome<F> {
    pub kind: Kind,
    /// The construct as parsed, for diagnostics.
    pub source: String,
    pub result: Result<F, CodegenError>,
}

/// Everything produced from one translation unit. A parse error stops the
/// unit; the constructs before it keep their outcomes.
#[derive(Debug, Clone, PartialEq)]
pub struct Unit<F> {
    pub outcomes: Vec<Outcome<F>>,
    pub parse_error: Option<ParserError>,
}

impl<F> Unit<F> {
    /// Lowered functions in order, or the first failure of any kind.
    pub fn into_result(self) -> Result<Vec<(Kind, F)>, Error> {
        if let Some(e) = self.parse_error {
            return Err(e.into());
        }
        self.outcomes
            .into_iter()
            .map(|o| {
                let kind = o.kind;
                o.result.map(|f| (kind, f)).map_err(Error::from)
            })
            .collect()
    }
}

pub struct Pipeline<B: Backend> {
    parser: Parser,
    codegen: Codegen<B>,
}

impl<B: Backend> Pipeline<B> {
    pub fn new(parser: Parser, backend: B) -> Self {
        Pipeline {
            parser,
            codegen: Codegen::new(backend),
        }
    }

    pub fn backend(&self) -> &B {
        &self.codegen.backend
    }

    /// Parse and lower constructs one at a time. A construct that fails to
    /// lower is recorded and skipped, the next one is still compiled.
    pub fn compile<S: CharSource>(&mut self, source: S) -> Unit<B::Function> {
        let mut outcomes = Vec::new();
        for node in self.parser.session(source) {
            let node = match node {
                Ok(node) => node,
                Err(e) => {
                    return Unit {
                        outcomes,
                        parse_error: Some(e),
                    }
                }
            };
            let kind = match &node {
                ASTNode::Extern(_) => Kind::Extern,
                ASTNode::Function(func) if func.prototype.is_anonymous() => Kind::TopLevel,
                ASTNode::Function(_) => Kind::Definition,
            };
            outcomes.push(Outcome {
                kind,
                source: node.to_string(),
                result: self.codegen.compile_node(&node),
            });
        }
        Unit {
            outcomes,
            parse_error: None,
        }
    }
}
