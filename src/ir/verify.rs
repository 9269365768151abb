use super::{FunctionDef, Instruction, Module, Type, Value};

#[derive(Debug, PartialEq, Clone, thiserror::Error)]
pub enum VerifyError {
    #[error("block {0} is empty")]
    EmptyBlock(String),
    #[error("block {0} does not end in a return")]
    MissingTerminator(String),
    #[error("return in the middle of block {0}")]
    EarlyTerminator(String),
    #[error("undefined value used by {0}")]
    UndefinedValue(String),
    #[error("operand of {0} has the wrong type")]
    TypeMismatch(String),
    #[error("call {0} targets a missing function or has the wrong number of args")]
    BadCall(String),
}

/// Structural checks on a finished function. Declarations always pass.
pub fn verify(module: &Module, def: &FunctionDef) -> Result<(), VerifyError> {
    for block in &def.blocks {
        let (last, body) = match block.insts.split_last() {
            Some(split) => split,
            None => return Err(VerifyError::EmptyBlock(block.label.clone())),
        };
        if !matches!(def.insts[*last].kind, Instruction::Ret(_)) {
            return Err(VerifyError::MissingTerminator(block.label.clone()));
        }
        if body
            .iter()
            .any(|&i| matches!(def.insts[i].kind, Instruction::Ret(_)))
        {
            return Err(VerifyError::EarlyTerminator(block.label.clone()));
        }

        for &index in &block.insts {
            let inst = &def.insts[index];
            let what = if inst.name.is_empty() {
                "ret".to_string()
            } else {
                format!("%{}", inst.name)
            };

            for operand in inst.kind.operands() {
                let defined = match operand {
                    Value::Const(_) => true,
                    Value::Param(i) => i < def.params.len(),
                    Value::Inst(i) => i < index && def.insts[i].kind.result_type().is_some(),
                    Value::Undef => false,
                };
                if !defined {
                    return Err(VerifyError::UndefinedValue(what));
                }
            }

            let wanted = match inst.kind {
                Instruction::UiToFp(_) => Type::Bool,
                _ => Type::Double,
            };
            if inst
                .kind
                .operands()
                .into_iter()
                .any(|v| def.value_type(v) != Some(wanted))
            {
                return Err(VerifyError::TypeMismatch(what));
            }

            if let Instruction::Call(callee, args) = &inst.kind {
                let arity = module.function(*callee).map(|f| f.params.len());
                if arity != Some(args.len()) {
                    return Err(VerifyError::BadCall(what));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Backend;
    use pretty_assertions::assert_eq;

    fn function_with_entry(module: &mut Module) -> crate::ir::FunctionId {
        let f = module.declare_function("f", 1);
        let entry = module.append_basic_block(f, "entry");
        module.position_at_end(entry);
        f
    }

    fn check(module: &Module, f: crate::ir::FunctionId) -> Result<(), VerifyError> {
        verify(module, module.function(f).unwrap())
    }

    #[test]
    fn declaration_passes() {
        let mut module = Module::new("test");
        let f = module.declare_function("f", 3);
        assert_eq!(check(&module, f), Ok(()));
    }

    #[test]
    fn missing_return_fails() {
        let mut module = Module::new("test");
        let f = function_with_entry(&mut module);
        assert_eq!(check(&module, f), Err(VerifyError::EmptyBlock("entry".to_string())));

        module.build_float_add(Value::Param(0), Value::Const(1.0), "addtmp");
        assert_eq!(
            check(&module, f),
            Err(VerifyError::MissingTerminator("entry".to_string()))
        );
    }

    #[test]
    fn bool_must_be_converted_before_return() {
        let mut module = Module::new("test");
        let f = function_with_entry(&mut module);
        let cmp = module.build_float_ult(Value::Param(0), Value::Const(1.0), "cmptmp");
        module.build_return(cmp);
        assert_eq!(check(&module, f), Err(VerifyError::TypeMismatch("ret".to_string())));
    }

    #[test]
    fn undef_and_bad_params_fail() {
        let mut module = Module::new("test");
        let f = function_with_entry(&mut module);
        let sum = module.build_float_add(Value::Param(3), Value::Const(1.0), "addtmp");
        module.build_return(sum);
        assert_eq!(
            check(&module, f),
            Err(VerifyError::UndefinedValue("%addtmp".to_string()))
        );

        let g = module.declare_function("g", 0);
        let entry = module.append_basic_block(g, "entry");
        module.position_at_end(entry);
        module.build_return(Value::Undef);
        assert_eq!(check(&module, g), Err(VerifyError::UndefinedValue("ret".to_string())));
    }

    #[test]
    fn call_arity_checked() {
        let mut module = Module::new("test");
        let callee = module.declare_function("callee", 2);
        let f = function_with_entry(&mut module);
        let call = module.build_call(callee, &[Value::Param(0)], "calltmp");
        module.build_return(call);
        assert_eq!(check(&module, f), Err(VerifyError::BadCall("%calltmp".to_string())));
    }
}
