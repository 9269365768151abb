//! LLVM backend, enabled with the `llvm` feature.

use inkwell::{
    basic_block::BasicBlock,
    builder::Builder,
    context::Context,
    execution_engine::{FunctionLookupError, JitFunction},
    module::Module,
    types::BasicTypeEnum,
    values::{BasicValueEnum, FunctionValue},
    FloatPredicate, OptimizationLevel,
};

use crate::backend::Backend;

type EntryFunc = unsafe extern "C" fn() -> f64;

#[derive(Debug, thiserror::Error)]
pub enum LlvmError {
    #[error("failed to create execution engine: {0}")]
    Jit(String),
    #[error("jit lookup failed: {0}")]
    Lookup(#[from] FunctionLookupError),
    #[error("only functions without parameters can be run, {0} takes {1}")]
    NotNullary(String, usize),
}

pub struct LlvmBackend<'a> {
    pub context: &'a Context,
    pub module: Module<'a>,
    pub builder: Builder<'a>,
    anonymous: usize,
}

impl<'a> LlvmBackend<'a> {
    pub fn new(context: &'a Context, name: &str) -> LlvmBackend<'a> {
        LlvmBackend {
            context,
            module: context.create_module(name),
            builder: context.create_builder(),
            anonymous: 0,
        }
    }

    pub fn print_to_string(&self) -> String {
        self.module.print_to_string().to_string_lossy().into_owned()
    }

    pub fn print_function(&self, function: FunctionValue<'a>) -> String {
        function.print_to_string().to_string_lossy().into_owned()
    }

    /// JIT the module as it stands and call a parameterless function.
    ///
    /// The module is cloned for every run so it stays open for further
    /// definitions.
    pub fn run(&self, function: FunctionValue<'a>) -> Result<f64, LlvmError> {
        let name = function.get_name().to_string_lossy().into_owned();
        let params = function.count_params() as usize;
        if params != 0 {
            return Err(LlvmError::NotNullary(name, params));
        }

        let module = self.module.clone();
        let ee = module
            .create_jit_execution_engine(OptimizationLevel::None)
            .map_err(|e| LlvmError::Jit(e.to_string_lossy().into_owned()))?;
        let entry: JitFunction<EntryFunc> = unsafe { ee.get_function(&name) }?;
        Ok(unsafe { entry.call() })
    }
}

impl<'a> Backend for LlvmBackend<'a> {
    type Value = BasicValueEnum<'a>;
    type Function = FunctionValue<'a>;
    type Block = BasicBlock<'a>;

    fn const_float(&mut self, value: f64) -> Self::Value {
        self.context.f64_type().const_float(value).into()
    }

    fn build_float_add(&mut self, lhs: Self::Value, rhs: Self::Value, name: &str) -> Self::Value {
        self.builder
            .build_float_add(lhs.into_float_value(), rhs.into_float_value(), name)
            .into()
    }

    fn build_float_sub(&mut self, lhs: Self::Value, rhs: Self::Value, name: &str) -> Self::Value {
        self.builder
            .build_float_sub(lhs.into_float_value(), rhs.into_float_value(), name)
            .into()
    }

    fn build_float_mul(&mut self, lhs: Self::Value, rhs: Self::Value, name: &str) -> Self::Value {
        self.builder
            .build_float_mul(lhs.into_float_value(), rhs.into_float_value(), name)
            .into()
    }

    fn build_float_ult(&mut self, lhs: Self::Value, rhs: Self::Value, name: &str) -> Self::Value {
        self.builder
            .build_float_compare(
                FloatPredicate::ULT,
                lhs.into_float_value(),
                rhs.into_float_value(),
                name,
            )
            .into()
    }

    fn build_bool_to_float(&mut self, value: Self::Value, name: &str) -> Self::Value {
        self.builder
            .build_unsigned_int_to_float(value.into_int_value(), self.context.f64_type(), name)
            .into()
    }

    fn build_call(
        &mut self,
        callee: Self::Function,
        args: &[Self::Value],
        name: &str,
    ) -> Self::Value {
        match self.builder.build_call(callee, args, name).try_as_basic_value().left() {
            Some(value) => value,
            None => self.context.f64_type().get_undef().into(),
        }
    }

    fn build_return(&mut self, value: Self::Value) {
        self.builder.build_return(Some(&value));
    }

    fn declare_function(&mut self, name: &str, param_count: usize) -> Self::Function {
        let f64_type = self.context.f64_type();
        let args_types: Vec<BasicTypeEnum> = vec![f64_type.into(); param_count];
        let fn_type = f64_type.fn_type(&args_types, false);

        // unnamed functions can't be looked up by the JIT, so they get a name
        // no identifier can spell
        let name = if name.is_empty() {
            self.anonymous += 1;
            format!("__anon_expr{}", self.anonymous - 1)
        } else {
            name.to_string()
        };
        self.module.add_function(&name, fn_type, None)
    }

    fn get_function(&self, name: &str) -> Option<Self::Function> {
        if name.is_empty() {
            return None;
        }
        self.module.get_function(name)
    }

    fn params(&self, function: Self::Function) -> Vec<Self::Value> {
        function.get_params()
    }

    fn set_param_name(&mut self, function: Self::Function, index: usize, name: &str) {
        if let Some(param) = function.get_nth_param(index as u32) {
            param.into_float_value().set_name(name);
        }
    }

    fn has_body(&self, function: Self::Function) -> bool {
        function.count_basic_blocks() > 0
    }

    fn append_basic_block(&mut self, function: Self::Function, name: &str) -> Self::Block {
        self.context.append_basic_block(function, name)
    }

    fn position_at_end(&mut self, block: Self::Block) {
        self.builder.position_at_end(block);
    }

    fn verify_function(&self, function: Self::Function) -> bool {
        function.verify(false)
    }

    fn clear_body(&mut self, function: Self::Function) {
        for block in function.get_basic_blocks() {
            unsafe {
                let _ = block.delete();
            }
        }
    }

    fn delete_function(&mut self, function: Self::Function) {
        unsafe {
            function.delete();
        }
    }
}

#[cfg(test)]
mod tests {
    use inkwell::context::Context;
    use pretty_assertions::assert_eq;

    use super::{LlvmBackend, LlvmError};
    use crate::error::Error;
    use crate::codegen::Codegen;
    use crate::parser::Parser;

    #[test]
    fn codegen_works() {
        let parser = Parser::default();
        let ast = parser
            .parse_str("extern sin(x); def thing(x) sin(x) * x; thing(0) + 1*2")
            .unwrap();
        let context = Context::create();
        let mut codegen = Codegen::new(LlvmBackend::new(&context, "kiln"));
        let funcs = codegen.codegen(&ast).unwrap();

        let ir = codegen.backend.print_to_string();
        assert!(ir.contains("declare double @sin(double)"), "{}", ir);
        assert!(ir.contains("define double @thing(double %x)"), "{}", ir);

        assert_eq!(codegen.backend.run(funcs[2]).unwrap(), 2.0);
    }

    #[test]
    fn only_nullary_functions_run() {
        let ast = Parser::default().parse_str("def id(x) x").unwrap();
        let context = Context::create();
        let mut codegen = Codegen::new(LlvmBackend::new(&context, "kiln"));
        let funcs = codegen.codegen(&ast).unwrap();

        let err: Error = codegen.backend.run(funcs[0]).unwrap_err().into();
        match err {
            Error::Llvm(LlvmError::NotNullary(name, 1)) => assert_eq!(name, "id"),
            other => panic!("unexpected {:?}", other),
        }
    }
}
