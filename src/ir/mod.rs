//! In-crate SSA backend.
//!
//! A `Module` holds functions made of basic blocks of instructions, every
//! value is either a double or (for comparison results) a boolean. It prints
//! as LLVM-flavoured text and can be run with [`exec::Executor`].

pub mod exec;
mod print;
mod verify;

use std::collections::{HashMap, HashSet};

use crate::backend::Backend;

pub use verify::VerifyError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockId {
    function: FunctionId,
    index: usize,
}

/// Operand of an instruction. Parameters and instruction results are local to
/// the function being built.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Const(f64),
    Param(usize),
    Inst(usize),
    /// Produced when there is nowhere to insert; never passes verification.
    Undef,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Type {
    Double,
    Bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    FAdd(Value, Value),
    FSub(Value, Value),
    FMul(Value, Value),
    FCmpUlt(Value, Value),
    UiToFp(Value),
    Call(FunctionId, Vec<Value>),
    Ret(Value),
}

impl Instruction {
    pub fn result_type(&self) -> Option<Type> {
        match self {
            Instruction::FCmpUlt(..) => Some(Type::Bool),
            Instruction::Ret(_) => None,
            _ => Some(Type::Double),
        }
    }

    pub fn operands(&self) -> Vec<Value> {
        match self {
            Instruction::FAdd(a, b)
            | Instruction::FSub(a, b)
            | Instruction::FMul(a, b)
            | Instruction::FCmpUlt(a, b) => vec![*a, *b],
            Instruction::UiToFp(v) | Instruction::Ret(v) => vec![*v],
            Instruction::Call(_, args) => args.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Inst {
    pub name: String,
    pub kind: Instruction,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub label: String,
    /// Indices into the owning function's instruction arena.
    pub insts: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    /// Empty for anonymous functions.
    pub name: String,
    pub params: Vec<String>,
    pub blocks: Vec<Block>,
    pub insts: Vec<Inst>,
    // value and block names already handed out in this function
    used_names: HashSet<String>,
    next_unnamed: usize,
}

impl FunctionDef {
    fn new(name: &str, param_count: usize) -> Self {
        let mut def = FunctionDef {
            name: name.to_string(),
            params: Vec::with_capacity(param_count),
            blocks: Vec::new(),
            insts: Vec::new(),
            used_names: HashSet::new(),
            next_unnamed: 0,
        };
        for _ in 0..param_count {
            let name = def.unique_name("");
            def.params.push(name);
        }
        def
    }

    pub fn has_body(&self) -> bool {
        !self.blocks.is_empty()
    }

    pub fn value_type(&self, value: Value) -> Option<Type> {
        match value {
            Value::Const(_) | Value::Param(_) => Some(Type::Double),
            Value::Inst(i) => self.insts.get(i).and_then(|inst| inst.kind.result_type()),
            Value::Undef => None,
        }
    }

    /// `base` if it is still free, otherwise `base` with the first free
    /// numeric suffix. An empty base gets a plain number.
    fn unique_name(&mut self, base: &str) -> String {
        let name = if base.is_empty() {
            loop {
                let candidate = self.next_unnamed.to_string();
                self.next_unnamed += 1;
                if !self.used_names.contains(&candidate) {
                    break candidate;
                }
            }
        } else if !self.used_names.contains(base) {
            base.to_string()
        } else {
            (1..)
                .map(|n| format!("{}{}", base, n))
                .find(|candidate| !self.used_names.contains(candidate))
                .unwrap_or_default()
        };
        self.used_names.insert(name.clone());
        name
    }

    fn forget_name(&mut self, name: &str) {
        self.used_names.remove(name);
    }
}

#[derive(Debug, Clone)]
pub struct Module {
    pub name: String,
    functions: Vec<Option<FunctionDef>>,
    registry: HashMap<String, FunctionId>,
    cursor: Option<BlockId>,
}

impl Module {
    pub fn new(name: &str) -> Self {
        Module {
            name: name.to_string(),
            functions: Vec::new(),
            registry: HashMap::new(),
            cursor: None,
        }
    }

    /// The visible function registered under `name`.
    pub fn lookup(&self, name: &str) -> Option<FunctionId> {
        self.registry.get(name).copied()
    }

    /// `None` once the function has been deleted.
    pub fn function(&self, id: FunctionId) -> Option<&FunctionDef> {
        self.functions.get(id.0).and_then(Option::as_ref)
    }

    /// Structural check of one function; a deleted function is reported as
    /// its (empty) declaration.
    pub fn verify(&self, id: FunctionId) -> Result<(), VerifyError> {
        match self.function(id) {
            Some(def) => verify::verify(self, def),
            None => Ok(()),
        }
    }

    fn function_mut(&mut self, id: FunctionId) -> Option<&mut FunctionDef> {
        self.functions.get_mut(id.0).and_then(Option::as_mut)
    }

    /// Live functions in declaration order.
    pub fn functions(&self) -> impl Iterator<Item = (FunctionId, &FunctionDef)> {
        self.functions
            .iter()
            .enumerate()
            .filter_map(|(i, f)| f.as_ref().map(|f| (FunctionId(i), f)))
    }

    /// Names of the live, named functions in declaration order.
    pub fn function_names(&self) -> Vec<&str> {
        self.functions()
            .filter(|(_, f)| !f.name.is_empty())
            .map(|(_, f)| f.name.as_str())
            .collect()
    }

    /// Ordinal used to print an anonymous function, counted among the
    /// anonymous functions declared before it.
    fn anonymous_index(&self, id: FunctionId) -> usize {
        self.functions
            .iter()
            .take(id.0)
            .filter(|f| matches!(f, Some(f) if f.name.is_empty()))
            .count()
    }

    fn push(&mut self, kind: Instruction, name: &str) -> Value {
        let BlockId { function, index } = match self.cursor {
            Some(block) => block,
            None => return Value::Undef,
        };
        let def = match self.function_mut(function) {
            Some(def) => def,
            None => return Value::Undef,
        };
        if index >= def.blocks.len() {
            return Value::Undef;
        }
        let name = match kind.result_type() {
            Some(_) => def.unique_name(name),
            None => String::new(),
        };
        let inst = def.insts.len();
        def.insts.push(Inst { name, kind });
        def.blocks[index].insts.push(inst);
        Value::Inst(inst)
    }
}

impl Backend for Module {
    type Value = Value;
    type Function = FunctionId;
    type Block = BlockId;

    fn const_float(&mut self, value: f64) -> Value {
        Value::Const(value)
    }

    fn build_float_add(&mut self, lhs: Value, rhs: Value, name: &str) -> Value {
        self.push(Instruction::FAdd(lhs, rhs), name)
    }

    fn build_float_sub(&mut self, lhs: Value, rhs: Value, name: &str) -> Value {
        self.push(Instruction::FSub(lhs, rhs), name)
    }

    fn build_float_mul(&mut self, lhs: Value, rhs: Value, name: &str) -> Value {
        self.push(Instruction::FMul(lhs, rhs), name)
    }

    fn build_float_ult(&mut self, lhs: Value, rhs: Value, name: &str) -> Value {
        self.push(Instruction::FCmpUlt(lhs, rhs), name)
    }

    fn build_bool_to_float(&mut self, value: Value, name: &str) -> Value {
        self.push(Instruction::UiToFp(value), name)
    }

    fn build_call(&mut self, callee: FunctionId, args: &[Value], name: &str) -> Value {
        self.push(Instruction::Call(callee, args.to_vec()), name)
    }

    fn build_return(&mut self, value: Value) {
        self.push(Instruction::Ret(value), "");
    }

    fn declare_function(&mut self, name: &str, param_count: usize) -> FunctionId {
        let id = FunctionId(self.functions.len());
        self.functions.push(Some(FunctionDef::new(name, param_count)));
        if !name.is_empty() {
            self.registry.insert(name.to_string(), id);
        }
        id
    }

    fn get_function(&self, name: &str) -> Option<FunctionId> {
        self.lookup(name)
    }

    fn params(&self, function: FunctionId) -> Vec<Value> {
        let count = self.function(function).map_or(0, |def| def.params.len());
        (0..count).map(Value::Param).collect()
    }

    fn set_param_name(&mut self, function: FunctionId, index: usize, name: &str) {
        if let Some(def) = self.function_mut(function) {
            if let Some(old) = def.params.get(index).cloned() {
                def.forget_name(&old);
                let name = def.unique_name(name);
                def.params[index] = name;
            }
        }
    }

    fn has_body(&self, function: FunctionId) -> bool {
        self.function(function).map_or(false, FunctionDef::has_body)
    }

    fn append_basic_block(&mut self, function: FunctionId, name: &str) -> BlockId {
        let index = match self.function_mut(function) {
            Some(def) => {
                let label = def.unique_name(name);
                def.blocks.push(Block {
                    label,
                    insts: Vec::new(),
                });
                def.blocks.len() - 1
            }
            None => usize::MAX,
        };
        BlockId { function, index }
    }

    fn position_at_end(&mut self, block: BlockId) {
        self.cursor = Some(block);
    }

    fn verify_function(&self, function: FunctionId) -> bool {
        match self.function(function) {
            Some(def) => verify::verify(self, def).is_ok(),
            None => false,
        }
    }

    fn clear_body(&mut self, function: FunctionId) {
        if let Some(def) = self.function_mut(function) {
            let name = def.name.clone();
            let params = def.params.clone();
            *def = FunctionDef::new(&name, 0);
            for param in params {
                let name = def.unique_name(&param);
                def.params.push(name);
            }
        }
        if matches!(self.cursor, Some(b) if b.function == function) {
            self.cursor = None;
        }
    }

    fn delete_function(&mut self, function: FunctionId) {
        let removed = match self.functions.get_mut(function.0) {
            Some(slot) => slot.take(),
            None => None,
        };
        if let Some(def) = removed {
            if self.registry.get(&def.name) == Some(&function) {
                self.registry.remove(&def.name);
            }
        }
        if matches!(self.cursor, Some(b) if b.function == function) {
            self.cursor = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn duplicate_names_get_suffixes() {
        let mut module = Module::new("test");
        let f = module.declare_function("f", 2);
        module.set_param_name(f, 0, "x");
        module.set_param_name(f, 1, "x");
        let entry = module.append_basic_block(f, "entry");
        module.position_at_end(entry);
        let a = module.build_float_add(Value::Param(0), Value::Param(1), "addtmp");
        let b = module.build_float_add(a, a, "addtmp");
        module.build_return(b);

        let def = module.function(f).unwrap();
        assert_eq!(def.params, vec!["x", "x1"]);
        assert_eq!(def.insts[0].name, "addtmp");
        assert_eq!(def.insts[1].name, "addtmp1");
        assert!(module.verify_function(f));
    }

    #[test]
    fn redeclaring_shadows_older_declaration() {
        let mut module = Module::new("test");
        let first = module.declare_function("f", 1);
        let second = module.declare_function("f", 2);
        assert_ne!(first, second);
        assert_eq!(module.lookup("f"), Some(second));
        assert_eq!(module.function_names(), vec!["f", "f"]);
    }

    #[test]
    fn anonymous_functions_are_not_registered() {
        let mut module = Module::new("test");
        let anon = module.declare_function("", 0);
        assert_eq!(module.lookup(""), None);
        assert_eq!(module.function(anon).unwrap().name, "");
        assert!(module.function_names().is_empty());
    }

    #[test]
    fn building_without_insertion_point_yields_undef() {
        let mut module = Module::new("test");
        assert_eq!(module.build_float_mul(Value::Const(1.0), Value::Const(2.0), "m"), Value::Undef);
    }

    #[test]
    fn delete_and_clear() {
        let mut module = Module::new("test");
        let f = module.declare_function("f", 1);
        module.set_param_name(f, 0, "a");
        let entry = module.append_basic_block(f, "entry");
        module.position_at_end(entry);
        module.build_return(Value::Param(0));
        assert!(module.has_body(f));

        module.clear_body(f);
        assert!(!module.has_body(f));
        assert_eq!(module.function(f).unwrap().params, vec!["a"]);
        assert_eq!(module.lookup("f"), Some(f));

        module.delete_function(f);
        assert_eq!(module.lookup("f"), None);
        assert!(module.function(f).is_none());
    }
}
