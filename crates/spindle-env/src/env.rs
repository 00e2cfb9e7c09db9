//! The shared execution environment and its mark/rollback mechanism.

use crate::{
    Func, FuncSignature, HostImportDelegate, Index, Memory, Module, Table, TypedValue, ValueType,
};
use std::collections::HashMap;

/// A global variable instance owned by the environment.
#[derive(Debug, Clone)]
pub struct Global {
    /// Declared value type.
    pub ty: ValueType,
    pub value: TypedValue,
    pub mutable: bool,
}

impl Default for Global {
    fn default() -> Global {
        Global {
            ty: ValueType::I32,
            value: TypedValue::I32(0),
            mutable: false,
        }
    }
}

/// The process-wide execution environment.
///
/// Translators append to every sequence here; nothing already present is
/// mutated until a translation's deferred element/data commit, which only
/// runs once the whole module has validated. All sequences are append-only
/// between a mark and the matching rollback, which is what makes
/// [`Environment::reset_to_mark`] a pure truncation.
#[derive(Debug, Default)]
pub struct Environment {
    pub sigs: Vec<FuncSignature>,
    pub funcs: Vec<Func>,
    pub tables: Vec<Table>,
    pub memories: Vec<Memory>,
    pub globals: Vec<Global>,
    pub modules: Vec<Module>,
    /// Registered module name -> index into `modules`.
    pub registered: HashMap<String, usize>,
    /// The shared bytecode stream all defined modules' code lives in.
    pub istream: Vec<u8>,
}

/// Snapshot of the environment's append-only state.
#[derive(Debug, Clone, Copy)]
pub struct EnvironmentMark {
    sigs: usize,
    funcs: usize,
    tables: usize,
    memories: usize,
    globals: usize,
    modules: usize,
    istream: usize,
}

impl Environment {
    pub fn new() -> Environment {
        Environment::default()
    }

    /// Take a snapshot of the current sequence lengths.
    pub fn mark(&self) -> EnvironmentMark {
        EnvironmentMark {
            sigs: self.sigs.len(),
            funcs: self.funcs.len(),
            tables: self.tables.len(),
            memories: self.memories.len(),
            globals: self.globals.len(),
            modules: self.modules.len(),
            istream: self.istream.len(),
        }
    }

    /// Discard everything appended since `mark`, including name registrations
    /// that point at discarded modules.
    pub fn reset_to_mark(&mut self, mark: EnvironmentMark) {
        self.sigs.truncate(mark.sigs);
        self.funcs.truncate(mark.funcs);
        self.tables.truncate(mark.tables);
        self.memories.truncate(mark.memories);
        self.globals.truncate(mark.globals);
        self.modules.truncate(mark.modules);
        self.istream.truncate(mark.istream);
        self.registered.retain(|_, &mut index| index < mark.modules);
    }

    /// Bind a module under a name so later translations can import from it.
    pub fn register_module(&mut self, name: &str, module_index: usize) {
        self.modules[module_index].name = Some(name.to_string());
        self.registered.insert(name.to_string(), module_index);
    }

    /// Create a host module served by `delegate` and register it under `name`.
    pub fn add_host_module(
        &mut self,
        name: &str,
        delegate: Box<dyn HostImportDelegate>,
    ) -> usize {
        let index = self.modules.len();
        self.modules.push(Module::host(delegate));
        self.register_module(name, index);
        index
    }

    pub fn registered_module(&self, name: &str) -> Option<usize> {
        self.registered.get(name).copied()
    }

    /// Structural equality of two signatures by environment index.
    pub fn sigs_equal(&self, a: Index, b: Index) -> bool {
        self.sigs[a as usize] == self.sigs[b as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DefinedFunc, Limits};

    #[test]
    fn mark_and_rollback_truncate_everything() {
        let mut env = Environment::new();
        env.sigs.push(FuncSignature::default());
        env.istream.extend_from_slice(&[1, 2, 3]);

        let mark = env.mark();

        env.sigs.push(FuncSignature::new(vec![ValueType::I32], vec![]));
        env.funcs.push(Func::Defined(DefinedFunc::new(0)));
        env.tables.push(Table::new(Limits::new(2, None)));
        env.memories.push(Memory::new(Limits::new(1, None)));
        env.globals.push(Global::default());
        env.modules.push(Module::defined(3));
        env.register_module("scratch", 0);
        env.istream.extend_from_slice(&[4, 5]);

        env.reset_to_mark(mark);

        assert_eq!(env.sigs.len(), 1);
        assert!(env.funcs.is_empty());
        assert!(env.tables.is_empty());
        assert!(env.memories.is_empty());
        assert!(env.globals.is_empty());
        assert!(env.modules.is_empty());
        assert!(env.registered.is_empty());
        assert_eq!(env.istream, vec![1, 2, 3]);
    }

    #[test]
    fn rollback_keeps_registrations_before_mark() {
        let mut env = Environment::new();
        env.modules.push(Module::defined(0));
        env.register_module("keep", 0);

        let mark = env.mark();
        env.modules.push(Module::defined(0));
        env.register_module("drop", 1);
        env.reset_to_mark(mark);

        assert_eq!(env.registered_module("keep"), Some(0));
        assert_eq!(env.registered_module("drop"), None);
    }

    #[test]
    fn sigs_equal_is_structural() {
        let mut env = Environment::new();
        env.sigs
            .push(FuncSignature::new(vec![ValueType::I32], vec![ValueType::I32]));
        env.sigs
            .push(FuncSignature::new(vec![ValueType::I32], vec![ValueType::I32]));
        env.sigs
            .push(FuncSignature::new(vec![ValueType::I64], vec![ValueType::I32]));
        assert!(env.sigs_equal(0, 1));
        assert!(!env.sigs_equal(0, 2));
    }
}
