//! Translation errors and the error reporting interface.
//!
//! Every error is fatal to the current translation: callbacks short-circuit,
//! the driver reports the rendered diagnostic through the [`ErrorHandler`],
//! and the environment is rolled back to its pre-translation mark.

use spindle_env::{ExternalKind, Index, ValueType};
use thiserror::Error;

/// Everything that can go wrong while translating a module.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TranslateError {
    #[error("unknown import module \"{module}\"")]
    UnknownImportModule { module: String },

    #[error("unknown module field \"{field}\"")]
    UnknownImportField { field: String },

    #[error("expected import \"{module}.{field}\" to have kind {expected}, not {actual}")]
    ImportKindMismatch {
        module: String,
        field: String,
        expected: ExternalKind,
        actual: ExternalKind,
    },

    #[error("import signature mismatch")]
    ImportSignatureMismatch,

    #[error("global import \"{field}\" type mismatch: expected {expected}, got {actual}")]
    GlobalImportTypeMismatch {
        field: String,
        expected: ValueType,
        actual: ValueType,
    },

    #[error("global import \"{field}\" mutability mismatch")]
    GlobalImportMutabilityMismatch { field: String },

    #[error("actual size ({actual}) smaller than declared ({declared})")]
    LimitsInitialTooSmall { actual: u64, declared: u64 },

    #[error("max size (unspecified) larger than declared ({declared})")]
    LimitsMaxUnspecified { declared: u64 },

    #[error("max size ({actual}) larger than declared ({declared})")]
    LimitsMaxTooLarge { actual: u64, declared: u64 },

    #[error("duplicate export \"{name}\"")]
    DuplicateExport { name: String },

    #[error("mutable globals cannot be exported")]
    MutableGlobalExport,

    #[error("can't set_global on immutable global at index {index}")]
    ImmutableGlobalWrite { index: Index },

    #[error("type mismatch in {context}, expected {expected} but got {actual}")]
    InitTypeMismatch {
        context: &'static str,
        expected: String,
        actual: String,
    },

    #[error("initializer expression can only reference an imported global")]
    InitReferencesNonImportedGlobal,

    #[error("initializer expression cannot reference a mutable global")]
    InitReferencesMutableGlobal,

    #[error("only one table allowed")]
    DuplicateTable,

    #[error("only one memory allowed")]
    DuplicateMemory,

    #[error("{opcode} requires an imported or defined memory")]
    MissingMemory { opcode: String },

    #[error("found call_indirect operator, but no table")]
    MissingTable,

    #[error("elem segment requires a table")]
    ElemSegmentWithoutTable,

    #[error("data segment requires a memory")]
    DataSegmentWithoutMemory,

    #[error("alignment must not be larger than natural alignment ({natural})")]
    AlignmentTooLarge { natural: u32 },

    #[error("invalid local_index: {index} (max {max})")]
    InvalidLocalIndex { index: Index, max: Index },

    #[error("invalid global_index: {index} (max {max})")]
    InvalidGlobalIndex { index: Index, max: Index },

    #[error("invalid func_index: {index} (max {max})")]
    InvalidFuncIndex { index: Index, max: Index },

    #[error("invalid signature index: {index} (max {max})")]
    InvalidSignatureIndex { index: Index, max: Index },

    #[error("elem segment offset is out of bounds: {offset} >= max value {max}")]
    ElementOutOfBounds { offset: u32, max: usize },

    #[error("data segment is out of bounds: [{address}, {end}) >= max value {max}")]
    DataOutOfBounds { address: u32, end: u64, max: usize },

    #[error("start function must be nullary")]
    StartFunctionMustBeNullary,

    #[error("start function must not return anything")]
    StartFunctionMustNotReturn,

    /// A host import delegate rejected an import.
    #[error("{0}")]
    HostImport(String),

    /// Diagnostic from the stack type checker, passed through verbatim.
    #[error("{0}")]
    TypeCheck(String),

    /// The binary uses a feature outside the MVP subset this translator
    /// accepts.
    #[error("{0}")]
    Unsupported(String),

    /// The binary is structurally malformed.
    #[error("{0}")]
    Malformed(String),
}

/// Result alias used throughout the translator.
pub type TranslateResult<T = ()> = std::result::Result<T, TranslateError>;

impl From<wasmparser::BinaryReaderError> for TranslateError {
    fn from(err: wasmparser::BinaryReaderError) -> TranslateError {
        TranslateError::Malformed(err.message().to_string())
    }
}

impl From<crate::typecheck::TcError> for TranslateError {
    fn from(err: crate::typecheck::TcError) -> TranslateError {
        TranslateError::TypeCheck(err.0)
    }
}

/// Receives rendered diagnostics during translation.
///
/// The return value tells the decoder whether to keep going after a
/// non-fatal report; the translator itself always fails the translation
/// regardless.
pub trait ErrorHandler {
    fn on_error(&mut self, offset: Option<usize>, message: &str) -> bool;
}

/// Prints diagnostics to stderr. Used by the CLI.
#[derive(Debug, Default)]
pub struct StderrErrorHandler;

impl ErrorHandler for StderrErrorHandler {
    fn on_error(&mut self, offset: Option<usize>, message: &str) -> bool {
        match offset {
            Some(offset) => eprintln!("error: {message} (at offset {offset:#x})"),
            None => eprintln!("error: {message}"),
        }
        true
    }
}

/// Collects diagnostics into a vector. Used by tests.
#[derive(Debug, Default)]
pub struct CollectingErrorHandler {
    pub errors: Vec<String>,
}

impl ErrorHandler for CollectingErrorHandler {
    fn on_error(&mut self, _offset: Option<usize>, message: &str) -> bool {
        self.errors.push(message.to_string());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_out_of_bounds_message_includes_range() {
        let err = TranslateError::DataOutOfBounds {
            address: 65536,
            end: 65537,
            max: 65536,
        };
        assert_eq!(
            err.to_string(),
            "data segment is out of bounds: [65536, 65537) >= max value 65536"
        );
    }

    #[test]
    fn import_kind_mismatch_message() {
        let err = TranslateError::ImportKindMismatch {
            module: "m".to_string(),
            field: "f".to_string(),
            expected: ExternalKind::Func,
            actual: ExternalKind::Global,
        };
        assert_eq!(
            err.to_string(),
            "expected import \"m.f\" to have kind func, not global"
        );
    }

    #[test]
    fn collecting_handler_stores_messages() {
        let mut handler = CollectingErrorHandler::default();
        assert!(handler.on_error(Some(4), "boom"));
        assert_eq!(handler.errors, vec!["boom".to_string()]);
    }
}
