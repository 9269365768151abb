//! The set of IR construction capabilities the code generator relies on.
//!
//! Every value in the language is a double, so signatures are described by
//! their parameter count alone. Names passed to the builder methods are only
//! there to make the emitted IR readable.

pub trait Backend {
    /// An SSA value: a constant, a parameter or an instruction result.
    type Value: Copy;
    type Function: Copy;
    type Block: Copy;

    fn const_float(&mut self, value: f64) -> Self::Value;

    fn build_float_add(&mut self, lhs: Self::Value, rhs: Self::Value, name: &str) -> Self::Value;
    fn build_float_sub(&mut self, lhs: Self::Value, rhs: Self::Value, name: &str) -> Self::Value;
    fn build_float_mul(&mut self, lhs: Self::Value, rhs: Self::Value, name: &str) -> Self::Value;
    /// Unordered less-than; yields a boolean value.
    fn build_float_ult(&mut self, lhs: Self::Value, rhs: Self::Value, name: &str) -> Self::Value;
    /// Boolean to 0.0 / 1.0.
    fn build_bool_to_float(&mut self, value: Self::Value, name: &str) -> Self::Value;
    fn build_call(
        &mut self,
        callee: Self::Function,
        args: &[Self::Value],
        name: &str,
    ) -> Self::Value;
    fn build_return(&mut self, value: Self::Value);

    /// Declare `double name(double, ...)`. An empty name declares an anonymous
    /// function that `get_function` never returns. Which declaration
    /// `get_function` sees after a name is declared twice is up to the
    /// backend.
    fn declare_function(&mut self, name: &str, param_count: usize) -> Self::Function;
    fn get_function(&self, name: &str) -> Option<Self::Function>;
    fn params(&self, function: Self::Function) -> Vec<Self::Value>;
    fn set_param_name(&mut self, function: Self::Function, index: usize, name: &str);
    /// Whether the function already has a body rather than being a bare declaration.
    fn has_body(&self, function: Self::Function) -> bool;

    fn append_basic_block(&mut self, function: Self::Function, name: &str) -> Self::Block;
    fn position_at_end(&mut self, block: Self::Block);

    fn verify_function(&self, function: Self::Function) -> bool;
    /// Drop the body, leaving a bare declaration.
    fn clear_body(&mut self, function: Self::Function);
    /// Remove the function entirely.
    fn delete_function(&mut self, function: Self::Function);
}
