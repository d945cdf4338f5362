use std::collections::HashMap;
use std::rc::Rc;

use crate::bytecode::{binding::Binding, symbol_scope::SymbolScope};

/// Names visible while compiling one function.
///
/// Block scopes share the function's slot numbering; slots are reused once a
/// block ends. Names not found in any enclosing function resolve to builtins
/// and then to globals.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    pub outer: Option<Box<SymbolTable>>,
    store: Vec<Binding>,
    blocks: Vec<(usize, usize)>,
    pub num_definitions: usize,
    pub max_definitions: usize,
    pub free_symbols: Vec<Binding>,
    function_name: Option<Rc<str>>,
    builtins: HashMap<Rc<str>, usize>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_enclosed(outer: SymbolTable) -> Self {
        Self {
            outer: Some(Box::new(outer)),
            ..Self::default()
        }
    }

    pub fn define_builtin(&mut self, index: usize, name: &str) {
        self.builtins.insert(Rc::from(name), index);
    }

    /// Lets the function body refer to itself by `name`.
    pub fn define_function_name(&mut self, name: Rc<str>) {
        self.function_name = Some(name);
    }

    pub fn define(&mut self, name: Rc<str>) -> Binding {
        let binding = Binding::new(name, SymbolScope::Local, self.num_definitions);
        self.num_definitions += 1;
        self.max_definitions = self.max_definitions.max(self.num_definitions);
        self.store.push(binding.clone());
        binding
    }

    pub fn enter_block(&mut self) {
        self.blocks.push((self.store.len(), self.num_definitions));
    }

    pub fn leave_block(&mut self) {
        if let Some((visible, slots)) = self.blocks.pop() {
            self.store.truncate(visible);
            self.num_definitions = slots;
        }
    }

    pub fn resolve(&mut self, name: &str) -> Binding {
        if let Some(binding) = self.store.iter().rev().find(|b| &*b.name == name) {
            return binding.clone();
        }
        if let Some(function_name) = &self.function_name
            && &**function_name == name
        {
            return Binding::new(function_name.clone(), SymbolScope::Function, 0);
        }
        if let Some(index) = self.free_symbols.iter().position(|b| &*b.name == name) {
            return Binding::new(self.free_symbols[index].name.clone(), SymbolScope::Free, index);
        }

        match &mut self.outer {
            Some(outer) => {
                let binding = outer.resolve(name);
                match binding.symbol_scope {
                    SymbolScope::Global | SymbolScope::Builtin => binding,
                    _ => self.define_free(binding),
                }
            }
            None => match self.builtins.get(name) {
                Some(index) => Binding::new(Rc::from(name), SymbolScope::Builtin, *index),
                None => Binding::new(Rc::from(name), SymbolScope::Global, 0),
            },
        }
    }

    fn define_free(&mut self, original: Binding) -> Binding {
        let name = original.name.clone();
        self.free_symbols.push(original);
        Binding::new(name, SymbolScope::Free, self.free_symbols.len() - 1)
    }
}
