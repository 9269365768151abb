use std::collections::HashMap;

use crate::ast::{ASTNode, Expression, Function, Prototype};
use crate::backend::Backend;

#[derive(Debug, PartialEq, Clone, thiserror::Error)]
pub enum CodegenError {
    #[error("unbound identifier {0}")]
    UnboundIdentifier(String),
    #[error("unhandled operator {0}")]
    UnhandledOperator(char),
    #[error("invalid number of args in call {callee} expected {expected} found {found}")]
    ArityMismatch {
        callee: String,
        expected: usize,
        found: usize,
    },
    #[error("definition of {name} takes {defined} args but it was declared with {declared}")]
    SignatureMismatch {
        name: String,
        declared: usize,
        defined: usize,
    },
    #[error("function {0} cannot be redefined")]
    Redefinition(String),
    #[error("failed to verify function {0}")]
    InvalidFunction(String),
}

/// Parameter bindings visible while lowering one function body.
pub type SymbolTable<V> = HashMap<String, V>;

pub struct Codegen<B: Backend> {
    pub backend: B,
}

impl<B: Backend> Codegen<B> {
    pub fn new(backend: B) -> Self {
        Codegen { backend }
    }

    pub fn into_backend(self) -> B {
        self.backend
    }

    fn codegen_expr(
        &mut self,
        expr: &Expression,
        named_values: &SymbolTable<B::Value>,
    ) -> Result<B::Value, CodegenError> {
        match expr {
            Expression::Literal(value) => Ok(self.backend.const_float(*value)),
            Expression::Variable(name) => match named_values.get(name) {
                Some(var) => Ok(*var),
                None => Err(CodegenError::UnboundIdentifier(name.clone())),
            },
            Expression::Binary(op, left, right) => {
                let lhs = self.codegen_expr(left, named_values)?;
                let rhs = self.codegen_expr(right, named_values)?;

                match op {
                    '+' => Ok(self.backend.build_float_add(lhs, rhs, "addtmp")),
                    '-' => Ok(self.backend.build_float_sub(lhs, rhs, "subtmp")),
                    '*' => Ok(self.backend.build_float_mul(lhs, rhs, "multmp")),
                    '<' => {
                        let cmp = self.backend.build_float_ult(lhs, rhs, "cmptmp");
                        Ok(self.backend.build_bool_to_float(cmp, "booltmp"))
                    }
                    _ => Err(CodegenError::UnhandledOperator(*op)),
                }
            }
            Expression::Call(callee, args) => match self.backend.get_function(callee) {
                Some(func) => {
                    let expected = self.backend.params(func).len();
                    if expected != args.len() {
                        return Err(CodegenError::ArityMismatch {
                            callee: callee.clone(),
                            expected,
                            found: args.len(),
                        });
                    }

                    let mut gened_args = Vec::with_capacity(args.len());
                    for arg in args {
                        gened_args.push(self.codegen_expr(arg, named_values)?);
                    }

                    Ok(self.backend.build_call(func, &gened_args, "calltmp"))
                }
                None => Err(CodegenError::UnboundIdentifier(callee.clone())),
            },
        }
    }

    /// Declare the prototype's signature and register it under its name.
    pub fn compile_proto(&mut self, proto: &Prototype) -> B::Function {
        let fn_val = self.backend.declare_function(&proto.name, proto.args.len());
        for (i, arg) in proto.args.iter().enumerate() {
            self.backend.set_param_name(fn_val, i, arg);
        }
        fn_val
    }

    /// Lower a whole function. On failure nothing of the attempt is left
    /// behind: a fresh declaration is deleted and a reused one goes back to
    /// being a bare declaration.
    pub fn compile_fn(&mut self, function: &Function) -> Result<B::Function, CodegenError> {
        let Function {
            prototype: proto,
            body,
        } = function;

        let existing = if proto.is_anonymous() {
            None
        } else {
            self.backend.get_function(&proto.name)
        };

        let (func, reused) = match existing {
            Some(func) => {
                if self.backend.has_body(func) {
                    return Err(CodegenError::Redefinition(proto.name.clone()));
                }
                let declared = self.backend.params(func).len();
                if declared != proto.args.len() {
                    return Err(CodegenError::SignatureMismatch {
                        name: proto.name.clone(),
                        declared,
                        defined: proto.args.len(),
                    });
                }
                for (i, arg) in proto.args.iter().enumerate() {
                    self.backend.set_param_name(func, i, arg);
                }
                (func, true)
            }
            None => (self.compile_proto(proto), false),
        };

        let entry = self.backend.append_basic_block(func, "entry");
        self.backend.position_at_end(entry);

        // a repeated parameter name refers to its first occurrence
        let mut named_values = SymbolTable::with_capacity(proto.args.len());
        for (name, value) in proto.args.iter().zip(self.backend.params(func)) {
            named_values.entry(name.clone()).or_insert(value);
        }

        let result = match self.codegen_expr(body, &named_values) {
            Ok(body) => {
                self.backend.build_return(body);
                if self.backend.verify_function(func) {
                    Ok(func)
                } else {
                    Err(CodegenError::InvalidFunction(proto.name.clone()))
                }
            }
            Err(e) => Err(e),
        };

        if result.is_err() {
            if reused {
                self.backend.clear_body(func);
            } else {
                self.backend.delete_function(func);
            }
        }
        result
    }

    pub fn compile_node(&mut self, node: &ASTNode) -> Result<B::Function, CodegenError> {
        match node {
            ASTNode::Function(func) => self.compile_fn(func),
            ASTNode::Extern(proto) => Ok(self.compile_proto(proto)),
        }
    }

    pub fn codegen(&mut self, ast_nodes: &[ASTNode]) -> Result<Vec<B::Function>, CodegenError> {
        ast_nodes.iter().map(|node| self.compile_node(node)).collect()
    }
}
