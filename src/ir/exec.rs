//! Direct execution of lowered modules.
//!
//! Functions with a body are interpreted; bare declarations are served by
//! host functions registered by name, like symbols resolved by a JIT.

use std::collections::HashMap;

use super::{FunctionDef, FunctionId, Instruction, Module, Value};

pub type HostFn = fn(&[f64]) -> f64;

/// Calls nested deeper than this fail instead of overflowing the stack.
pub const DEFAULT_MAX_DEPTH: usize = 256;

#[derive(Debug, PartialEq, Clone, thiserror::Error)]
pub enum ExecError {
    #[error("function {0} has no body and no host implementation")]
    MissingBody(String),
    #[error("no function with id {0:?}")]
    UnknownFunction(FunctionId),
    #[error("no function named {0}")]
    UnknownName(String),
    #[error("invalid number of args to {name} expected {expected} found {found}")]
    ArityMismatch {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("call depth exceeded {0}")]
    CallDepthExceeded(usize),
    #[error("function {0} is malformed")]
    Malformed(String),
}

struct Host {
    arity: usize,
    func: HostFn,
}

pub struct Executor<'m> {
    module: &'m Module,
    hosts: HashMap<String, Host>,
    max_depth: usize,
}

impl<'m> Executor<'m> {
    /// An executor with the standard maths functions available to `extern`.
    pub fn new(module: &'m Module) -> Self {
        Self::bare(module)
            .with_host("sin", 1, |a| a[0].sin())
            .with_host("cos", 1, |a| a[0].cos())
            .with_host("tan", 1, |a| a[0].tan())
            .with_host("sqrt", 1, |a| a[0].sqrt())
            .with_host("exp", 1, |a| a[0].exp())
            .with_host("log", 1, |a| a[0].ln())
            .with_host("fabs", 1, |a| a[0].abs())
            .with_host("floor", 1, |a| a[0].floor())
            .with_host("ceil", 1, |a| a[0].ceil())
            .with_host("pow", 2, |a| a[0].powf(a[1]))
    }

    /// An executor with no host functions.
    pub fn bare(module: &'m Module) -> Self {
        Executor {
            module,
            hosts: HashMap::new(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_host(mut self, name: &str, arity: usize, func: HostFn) -> Self {
        self.hosts.insert(name.to_string(), Host { arity, func });
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn call_named(&self, name: &str, args: &[f64]) -> Result<f64, ExecError> {
        match self.module.lookup(name) {
            Some(id) => self.call(id, args),
            None => Err(ExecError::UnknownName(name.to_string())),
        }
    }

    pub fn call(&self, id: FunctionId, args: &[f64]) -> Result<f64, ExecError> {
        self.call_at_depth(id, args, 0)
    }

    fn call_at_depth(&self, id: FunctionId, args: &[f64], depth: usize) -> Result<f64, ExecError> {
        if depth >= self.max_depth {
            return Err(ExecError::CallDepthExceeded(self.max_depth));
        }
        let def = self
            .module
            .function(id)
            .ok_or(ExecError::UnknownFunction(id))?;
        if def.params.len() != args.len() {
            return Err(ExecError::ArityMismatch {
                name: def.name.clone(),
                expected: def.params.len(),
                found: args.len(),
            });
        }

        if !def.has_body() {
            return match self.hosts.get(&def.name) {
                Some(host) if host.arity == args.len() => Ok((host.func)(args)),
                Some(host) => Err(ExecError::ArityMismatch {
                    name: def.name.clone(),
                    expected: host.arity,
                    found: args.len(),
                }),
                None => Err(ExecError::MissingBody(def.name.clone())),
            };
        }

        self.run_body(def, args, depth)
    }

    fn run_body(&self, def: &FunctionDef, args: &[f64], depth: usize) -> Result<f64, ExecError> {
        let malformed = || ExecError::Malformed(def.name.clone());
        let mut slots = vec![0.0; def.insts.len()];
        let read = |slots: &[f64], value: Value| match value {
            Value::Const(v) => Ok(v),
            Value::Param(i) => args.get(i).copied().ok_or_else(malformed),
            Value::Inst(i) => slots.get(i).copied().ok_or_else(malformed),
            Value::Undef => Err(malformed()),
        };

        // no branches exist, so control never leaves the entry block
        let entry = def.blocks.first().ok_or_else(malformed)?;
        for &index in &entry.insts {
            let result = match &def.insts[index].kind {
                Instruction::FAdd(a, b) => read(&slots, *a)? + read(&slots, *b)?,
                Instruction::FSub(a, b) => read(&slots, *a)? - read(&slots, *b)?,
                Instruction::FMul(a, b) => read(&slots, *a)? * read(&slots, *b)?,
                Instruction::FCmpUlt(a, b) => {
                    let (a, b) = (read(&slots, *a)?, read(&slots, *b)?);
                    // unordered: true when either side is NaN
                    if a < b || a.is_nan() || b.is_nan() {
                        1.0
                    } else {
                        0.0
                    }
                }
                Instruction::UiToFp(v) => read(&slots, *v)?,
                Instruction::Call(callee, call_args) => {
                    let values = call_args
                        .iter()
                        .map(|&v| read(&slots, v))
                        .collect::<Result<Vec<_>, _>>()?;
                    self.call_at_depth(*callee, &values, depth + 1)?
                }
                Instruction::Ret(v) => return read(&slots, *v),
            };
            slots[index] = result;
        }
        Err(malformed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::Codegen;
    use crate::parser::Parser;
    use pretty_assertions::assert_eq;

    fn module(source: &str) -> Module {
        let ast = Parser::default().parse_str(source).unwrap();
        let mut codegen = Codegen::new(Module::new("test"));
        codegen.codegen(&ast).unwrap();
        codegen.into_backend()
    }

    #[test]
    fn externs_use_host_functions() {
        let module = module("extern sqrt(x); extern pow(a b); def f(x) sqrt(x) + pow(2, 3)");
        let exec = Executor::new(&module);
        assert_eq!(exec.call_named("f", &[16.0]).unwrap(), 12.0);
    }

    #[test]
    fn extern_without_host_fails() {
        let module = module("extern mystery(x); def f(x) mystery(x)");
        let exec = Executor::new(&module);
        assert_eq!(
            exec.call_named("f", &[1.0]),
            Err(ExecError::MissingBody("mystery".to_string()))
        );

        let exec = Executor::bare(&module).with_host("mystery", 1, |a| a[0] * 10.0);
        assert_eq!(exec.call_named("f", &[1.5]).unwrap(), 15.0);
    }

    #[test]
    fn host_arity_must_match_declaration() {
        let module = module("extern sin(a b); def f(x) sin(x, x)");
        assert_eq!(
            Executor::new(&module).call_named("f", &[1.0]),
            Err(ExecError::ArityMismatch {
                name: "sin".to_string(),
                expected: 1,
                found: 2,
            })
        );
    }

    #[test]
    fn call_depth_limit_is_configurable() {
        let module = module("extern f(x); def g(x) f(x)");
        let exec = Executor::bare(&module)
            .with_host("f", 1, |a| a[0])
            .with_max_depth(1);
        assert_eq!(exec.call_named("g", &[1.0]), Err(ExecError::CallDepthExceeded(1)));
    }

    #[test]
    fn self_recursion_hits_depth_limit() {
        let module = module("extern loop(x); def loop(x) loop(x)");
        assert_eq!(
            Executor::new(&module).call_named("loop", &[0.0]),
            Err(ExecError::CallDepthExceeded(DEFAULT_MAX_DEPTH))
        );
    }

    #[test]
    fn wrong_argument_count() {
        let module = module("def f(a b) a*b");
        assert_eq!(
            Executor::new(&module).call_named("f", &[1.0]),
            Err(ExecError::ArityMismatch {
                name: "f".to_string(),
                expected: 2,
                found: 1,
            })
        );
        assert_eq!(
            Executor::new(&module).call_named("g", &[]),
            Err(ExecError::UnknownName("g".to_string()))
        );
    }

    #[test]
    fn unordered_compare_with_nan() {
        let module = module("def lt(a b) a < b");
        let exec = Executor::new(&module);
        assert_eq!(exec.call_named("lt", &[f64::NAN, 1.0]).unwrap(), 1.0);
        assert_eq!(exec.call_named("lt", &[3.0, 1.0]).unwrap(), 0.0);
    }
}
