use std::fmt;

use super::{FunctionDef, FunctionId, Instruction, Module, Value};

fn float(f: &mut fmt::Formatter<'_>, value: f64) -> fmt::Result {
    write!(f, "{:?}", value)
}

impl Module {
    fn function_ref(&self, id: FunctionId) -> String {
        match self.function(id) {
            Some(def) if !def.name.is_empty() => format!("@{}", def.name),
            _ => format!("@{}", self.anonymous_index(id)),
        }
    }

    fn write_value(
        &self,
        f: &mut fmt::Formatter<'_>,
        def: &FunctionDef,
        value: Value,
    ) -> fmt::Result {
        match value {
            Value::Const(v) => float(f, v),
            Value::Param(i) => match def.params.get(i) {
                Some(name) => write!(f, "%{}", name),
                None => write!(f, "undef"),
            },
            Value::Inst(i) => match def.insts.get(i) {
                Some(inst) => write!(f, "%{}", inst.name),
                None => write!(f, "undef"),
            },
            Value::Undef => write!(f, "undef"),
        }
    }

    fn write_binary(
        &self,
        f: &mut fmt::Formatter<'_>,
        def: &FunctionDef,
        op: &str,
        lhs: Value,
        rhs: Value,
    ) -> fmt::Result {
        write!(f, "{} double ", op)?;
        self.write_value(f, def, lhs)?;
        write!(f, ", ")?;
        self.write_value(f, def, rhs)
    }

    fn write_function(
        &self,
        f: &mut fmt::Formatter<'_>,
        id: FunctionId,
        def: &FunctionDef,
    ) -> fmt::Result {
        let params = def
            .params
            .iter()
            .map(|p| format!("double %{}", p))
            .collect::<Vec<_>>()
            .join(", ");
        let keyword = if def.has_body() { "define" } else { "declare" };
        write!(f, "{} double {}({})", keyword, self.function_ref(id), params)?;
        if !def.has_body() {
            return writeln!(f);
        }

        writeln!(f, " {{")?;
        for (i, block) in def.blocks.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            writeln!(f, "{}:", block.label)?;
            for &index in &block.insts {
                let inst = &def.insts[index];
                write!(f, "  ")?;
                if !inst.name.is_empty() {
                    write!(f, "%{} = ", inst.name)?;
                }
                match &inst.kind {
                    Instruction::FAdd(a, b) => self.write_binary(f, def, "fadd", *a, *b)?,
                    Instruction::FSub(a, b) => self.write_binary(f, def, "fsub", *a, *b)?,
                    Instruction::FMul(a, b) => self.write_binary(f, def, "fmul", *a, *b)?,
                    Instruction::FCmpUlt(a, b) => self.write_binary(f, def, "fcmp ult", *a, *b)?,
                    Instruction::UiToFp(v) => {
                        write!(f, "uitofp i1 ")?;
                        self.write_value(f, def, *v)?;
                        write!(f, " to double")?;
                    }
                    Instruction::Call(callee, args) => {
                        write!(f, "call double {}(", self.function_ref(*callee))?;
                        for (i, arg) in args.iter().enumerate() {
                            if i > 0 {
                                write!(f, ", ")?;
                            }
                            write!(f, "double ")?;
                            self.write_value(f, def, *arg)?;
                        }
                        write!(f, ")")?;
                    }
                    Instruction::Ret(v) => {
                        write!(f, "ret double ")?;
                        self.write_value(f, def, *v)?;
                    }
                }
                writeln!(f)?;
            }
        }
        writeln!(f, "}}")
    }

    /// Text of a single function, as it appears in the module listing.
    pub fn print_function(&self, id: FunctionId) -> String {
        struct One<'m>(&'m Module, FunctionId);

        impl fmt::Display for One<'_> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self.0.function(self.1) {
                    Some(def) => self.0.write_function(f, self.1, def),
                    None => Ok(()),
                }
            }
        }

        One(self, id).to_string()
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "; ModuleID = '{}'", self.name)?;
        for (id, def) in self.functions() {
            writeln!(f)?;
            self.write_function(f, id, def)?;
        }
        Ok(())
    }
}
