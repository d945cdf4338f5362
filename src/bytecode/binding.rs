use std::rc::Rc;

use crate::bytecode::symbol_scope::SymbolScope;

#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub name: Rc<str>,
    pub symbol_scope: SymbolScope,
    pub index: usize,
}

impl Binding {
    pub fn new(name: Rc<str>, symbol_scope: SymbolScope, index: usize) -> Self {
        Self {
            name,
            symbol_scope,
            index,
        }
    }
}
