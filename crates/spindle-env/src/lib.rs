//! `spindle-env` — shared execution environment for the spindle interpreter.
//!
//! An [`Environment`] is the process-wide home of everything modules share:
//! signatures, functions, tables, memories, globals, translated modules, the
//! registered-name map, and the istream buffer the translator appends to.
//! Translation is made atomic by [`Environment::mark`] /
//! [`Environment::reset_to_mark`]: the translator takes a mark before it
//! starts, and on any error the caller rolls the environment back so no
//! partial module is observable.

/// WebAssembly page size: 64 KiB per the Wasm specification.
pub const PAGE_SIZE: usize = 65536;

/// Index into one of the environment's sequences (signatures, functions, ...).
pub type Index = u32;

/// Reserved table slot value for "no function installed".
pub const INVALID_INDEX: Index = u32::MAX;

mod env;
pub use env::{Environment, EnvironmentMark, Global};

mod func;
pub use func::{DefinedFunc, Func, FuncSignature, HostFunc, HostFuncHandler};

mod memory;
pub use memory::Memory;

mod module;
pub use module::{
    DefinedModule, Export, ExternalKind, HostImportDelegate, HostModule, Import, ImportDesc,
    Module, ModuleKind,
};

mod table;
pub use table::Table;

mod value;
pub use value::{Limits, TypedValue, ValueType};
