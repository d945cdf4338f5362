pub mod binding;
pub mod compilation_scope;
pub mod compiler;
pub mod op_code;
pub mod symbol_scope;
pub mod symbol_table;

#[cfg(test)]
mod op_code_test;
