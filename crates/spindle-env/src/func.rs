//! Function signatures and the defined/host function split.

use crate::{Index, TypedValue, ValueType};
use std::fmt;

/// A function signature: parameter and result types.
///
/// Signatures live in the environment's `sigs` sequence and are compared
/// structurally (import resolution checks signature equality, not index
/// equality).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FuncSignature {
    pub param_types: Vec<ValueType>,
    pub result_types: Vec<ValueType>,
}

impl FuncSignature {
    pub fn new(param_types: Vec<ValueType>, result_types: Vec<ValueType>) -> FuncSignature {
        FuncSignature {
            param_types,
            result_types,
        }
    }
}

/// A function known to the environment: either defined by a translated
/// module's code section, or supplied by a host module's import delegate.
///
/// Only the bytecode emitter distinguishes the two (`Call` vs `CallHost`);
/// index mapping treats them uniformly.
pub enum Func {
    Defined(DefinedFunc),
    Host(HostFunc),
}

impl Func {
    pub fn sig_index(&self) -> Index {
        match self {
            Func::Defined(f) => f.sig_index,
            Func::Host(f) => f.sig_index,
        }
    }

    pub fn is_host(&self) -> bool {
        matches!(self, Func::Host(_))
    }

    pub fn as_defined(&self) -> Option<&DefinedFunc> {
        match self {
            Func::Defined(f) => Some(f),
            Func::Host(_) => None,
        }
    }

    pub fn as_defined_mut(&mut self) -> Option<&mut DefinedFunc> {
        match self {
            Func::Defined(f) => Some(f),
            Func::Host(_) => None,
        }
    }
}

impl fmt::Debug for Func {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Func::Defined(d) => f.debug_tuple("Defined").field(d).finish(),
            Func::Host(h) => f.debug_tuple("Host").field(h).finish(),
        }
    }
}

/// A function whose body is supplied by a translated module.
#[derive(Debug, Clone)]
pub struct DefinedFunc {
    /// Environment-global signature index.
    pub sig_index: Index,
    /// Istream offset of the function's entry point. Starts at the invalid
    /// sentinel and is resolved when the body is translated; calls emitted
    /// before that record fixups against it.
    pub offset: u32,
    /// Number of local declaration groups in the body.
    pub local_decl_count: u32,
    /// Total number of declared locals (sum over all groups).
    pub local_count: u32,
    /// Parameter types followed by declared local types, in index order.
    pub param_and_local_types: Vec<ValueType>,
}

impl DefinedFunc {
    pub fn new(sig_index: Index) -> DefinedFunc {
        DefinedFunc {
            sig_index,
            offset: u32::MAX,
            local_decl_count: 0,
            local_count: 0,
            param_and_local_types: Vec::new(),
        }
    }
}

/// Handler installed by a host import delegate; the interpreter invokes it
/// when a `CallHost` opcode is dispatched.
pub type HostFuncHandler = Box<dyn FnMut(&[TypedValue]) -> Result<Vec<TypedValue>, String>>;

/// A function supplied by a host module.
pub struct HostFunc {
    pub module_name: String,
    pub field_name: String,
    pub sig_index: Index,
    pub handler: HostFuncHandler,
}

impl fmt::Debug for HostFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostFunc")
            .field("module_name", &self.module_name)
            .field("field_name", &self.field_name)
            .field("sig_index", &self.sig_index)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signatures_compare_structurally() {
        let a = FuncSignature::new(vec![ValueType::I32], vec![ValueType::I32]);
        let b = FuncSignature::new(vec![ValueType::I32], vec![ValueType::I32]);
        let c = FuncSignature::new(vec![ValueType::I64], vec![ValueType::I32]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn defined_func_starts_unresolved() {
        let f = DefinedFunc::new(3);
        assert_eq!(f.offset, u32::MAX);
        assert_eq!(f.local_count, 0);
        assert!(f.param_and_local_types.is_empty());
    }

    #[test]
    fn func_kind_accessors() {
        let f = Func::Defined(DefinedFunc::new(0));
        assert!(!f.is_host());
        assert!(f.as_defined().is_some());
        assert_eq!(f.sig_index(), 0);
    }
}
