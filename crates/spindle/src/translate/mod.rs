//! # Translator
//!
//! The single-pass validator and code generator. The binary reader drives it
//! through one callback per structural event, in document order; every
//! callback validates its preconditions, advances the type checker, and
//! appends bytecode to the istream.
//!
//! ## Pipeline overview
//!
//! ```text
//! reader (wasmparser adapter)
//!      │ one callback per event
//!      ▼
//! Translator
//!      ├── index mapping        module-local ──► environment-global
//!      │     sig_index_mapping / func_index_mapping / global_index_mapping
//!      ├── type checking        TypeChecker (lockstep with emission)
//!      ├── label & fixup        label_stack / depth_fixups / func_fixups
//!      └── emission             IstreamWriter ──► env.istream
//!
//! deferred until EndModule: element writes, data copies
//! on any error: caller rolls the environment back to its mark
//! ```
//!
//! ## Architecture
//!
//! | Module       | Responsibility                                            |
//! |--------------|-----------------------------------------------------------|
//! | [`mod@self`] | `Translator` state, index translation, shared checks      |
//! | `emit`       | Emission primitives, drop/keep lowering, labels, fixups   |
//! | `sections`   | Section-level callbacks (types, imports, globals, ...)    |
//! | `body`       | Function-body callbacks (control flow, calls, memory ops) |
//!
//! Branch targets inside structured constructs are not known until the
//! construct's `end`, and callee entry points are not known until the callee's
//! body is reached. Both are handled by back-patching: each pending reference
//! records the exact istream offset where a 4-byte target must land, keyed by
//! what it waits on (absolute label depth, or defined-function index).

mod body;
mod emit;
mod sections;

use crate::error::{TranslateError, TranslateResult};
use crate::istream::IstreamWriter;
use crate::typecheck::TypeChecker;
use spindle_env::{
    DefinedFunc, DefinedModule, Environment, ExternalKind, Index, Limits, Module, TypedValue,
};

/// A control-flow label: one per active structured construct, including the
/// implicit function-body label.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Label {
    /// Istream offset a branch to this label jumps to. Valid immediately for
    /// loops; the invalid sentinel for blocks/ifs until their `end`.
    pub offset: u32,
    /// Extra patch site used by `if`/`else` for the conditional branch.
    pub fixup_offset: u32,
}

/// A deferred element-segment write.
#[derive(Debug, Clone, Copy)]
struct ElemSegmentInfo {
    table_index: Index,
    /// Destination slot in the table's function-index array.
    dst_offset: u32,
    func_env_index: Index,
}

/// A deferred data-segment copy.
#[derive(Debug, Clone)]
struct DataSegmentInfo {
    memory_index: Index,
    address: u32,
    data: Vec<u8>,
}

/// Where the import currently being resolved points.
#[derive(Debug, Clone, Copy)]
enum ImportTarget {
    /// No import in flight.
    None,
    /// A host module; the kind is unknown until the kind-specific callback.
    Host { module_index: usize },
    /// An export of a registered defined module.
    Registered { kind: ExternalKind, env_index: Index },
}

/// The translator. Owns the istream writer for its lifetime; the buffer is
/// handed back through [`Translator::finish`].
pub struct Translator<'env> {
    pub(crate) env: &'env mut Environment,
    pub(crate) module_index: usize,
    pub(crate) writer: IstreamWriter,
    pub(crate) tc: TypeChecker,

    pub(crate) label_stack: Vec<Label>,
    /// Pending branch patch sites, indexed by absolute label depth from the
    /// function root (0 = outermost).
    pub(crate) depth_fixups: Vec<Vec<u32>>,
    /// Pending call patch sites, indexed by defined-function index within
    /// this module.
    pub(crate) func_fixups: Vec<Vec<u32>>,

    sig_index_mapping: Vec<Index>,
    func_index_mapping: Vec<Index>,
    global_index_mapping: Vec<Index>,
    num_func_imports: u32,
    num_global_imports: u32,

    elem_segment_infos: Vec<ElemSegmentInfo>,
    data_segment_infos: Vec<DataSegmentInfo>,

    /// Constant being assembled for a global initializer or segment offset.
    init_expr_value: Option<TypedValue>,
    /// Running slot index while an element segment's entries arrive.
    table_offset: u32,
    import_target: ImportTarget,
    /// Environment index of the function whose body is being translated.
    current_func: Option<Index>,
}

impl<'env> Translator<'env> {
    /// `module_index` must refer to a defined module already appended to the
    /// environment; `istream` is the environment's buffer, ownership of which
    /// transfers to the translator until [`Translator::finish`].
    pub fn new(env: &'env mut Environment, module_index: usize, istream: Vec<u8>) -> Self {
        Translator {
            env,
            module_index,
            writer: IstreamWriter::new(istream),
            tc: TypeChecker::new(),
            label_stack: Vec::new(),
            depth_fixups: Vec::new(),
            func_fixups: Vec::new(),
            sig_index_mapping: Vec::new(),
            func_index_mapping: Vec::new(),
            global_index_mapping: Vec::new(),
            num_func_imports: 0,
            num_global_imports: 0,
            elem_segment_infos: Vec::new(),
            data_segment_infos: Vec::new(),
            init_expr_value: None,
            table_offset: 0,
            import_target: ImportTarget::None,
            current_func: None,
        }
    }

    /// Release the istream buffer back to the caller.
    pub fn finish(self) -> Vec<u8> {
        self.writer.into_inner()
    }

    pub(crate) fn num_func_imports(&self) -> u32 {
        self.num_func_imports
    }

    pub(crate) fn num_global_imports(&self) -> u32 {
        self.num_global_imports
    }

    // === Index translation (module-local -> environment-global) ===

    pub(crate) fn translate_sig_to_env(&self, sig_index: u32) -> TranslateResult<Index> {
        self.sig_index_mapping.get(sig_index as usize).copied().ok_or(
            TranslateError::InvalidSignatureIndex {
                index: sig_index,
                max: self.sig_index_mapping.len() as Index,
            },
        )
    }

    pub(crate) fn translate_func_to_env(&self, func_index: u32) -> TranslateResult<Index> {
        self.func_index_mapping.get(func_index as usize).copied().ok_or(
            TranslateError::InvalidFuncIndex {
                index: func_index,
                max: self.func_index_mapping.len() as Index,
            },
        )
    }

    pub(crate) fn translate_global_to_env(&self, global_index: u32) -> TranslateResult<Index> {
        self.global_index_mapping
            .get(global_index as usize)
            .copied()
            .ok_or(TranslateError::InvalidGlobalIndex {
                index: global_index,
                max: self.global_index_mapping.len() as Index,
            })
    }

    /// Defined-function index of a module-local function index.
    pub(crate) fn translate_module_func_to_defined(
        &self,
        func_index: u32,
    ) -> TranslateResult<u32> {
        func_index
            .checked_sub(self.num_func_imports)
            .ok_or_else(|| TranslateError::Malformed(
                "code entry refers to an imported function".to_string(),
            ))
    }

    // === Accessors ===

    pub(crate) fn module(&self) -> &Module {
        &self.env.modules[self.module_index]
    }

    pub(crate) fn module_mut(&mut self) -> &mut Module {
        &mut self.env.modules[self.module_index]
    }

    pub(crate) fn defined_module_mut(&mut self) -> TranslateResult<&mut DefinedModule> {
        self.env.modules[self.module_index]
            .as_defined_mut()
            .ok_or_else(|| {
                TranslateError::Malformed("translation target is not a defined module".to_string())
            })
    }

    /// The defined function whose body is currently being translated.
    pub(crate) fn current_func(&self) -> TranslateResult<&DefinedFunc> {
        let env_index = self.current_func.ok_or_else(no_current_func)?;
        self.env.funcs[env_index as usize]
            .as_defined()
            .ok_or_else(no_current_func)
    }

    pub(crate) fn current_func_mut(&mut self) -> TranslateResult<&mut DefinedFunc> {
        let env_index = self.current_func.ok_or_else(no_current_func)?;
        self.env.funcs[env_index as usize]
            .as_defined_mut()
            .ok_or_else(no_current_func)
    }

    // === Shared validation checks ===

    pub(crate) fn check_local(&self, local_index: u32) -> TranslateResult {
        let max = self.current_func()?.param_and_local_types.len() as Index;
        if local_index >= max {
            return Err(TranslateError::InvalidLocalIndex {
                index: local_index,
                max,
            });
        }
        Ok(())
    }

    pub(crate) fn check_global(&self, global_index: u32) -> TranslateResult {
        let max = self.global_index_mapping.len() as Index;
        if global_index >= max {
            return Err(TranslateError::InvalidGlobalIndex {
                index: global_index,
                max,
            });
        }
        Ok(())
    }

    /// Memory ops require the module to declare or import a memory. Returns
    /// the environment-global memory index.
    pub(crate) fn check_has_memory(&self, opcode: crate::opcode::Opcode) -> TranslateResult<Index> {
        self.module()
            .memory_index
            .ok_or_else(|| TranslateError::MissingMemory {
                opcode: format!("{opcode:?}"),
            })
    }

    pub(crate) fn check_align(&self, alignment_log2: u32, natural: u32) -> TranslateResult {
        if alignment_log2 >= 32 || (1u64 << alignment_log2) > u64::from(natural) {
            return Err(TranslateError::AlignmentTooLarge { natural });
        }
        Ok(())
    }

    /// Declared import limits may not be looser than what the provider
    /// actually has.
    pub(crate) fn check_import_limits(declared: &Limits, actual: &Limits) -> TranslateResult {
        if actual.initial < declared.initial {
            return Err(TranslateError::LimitsInitialTooSmall {
                actual: actual.initial,
                declared: declared.initial,
            });
        }
        if let Some(declared_max) = declared.max {
            match actual.max {
                None => {
                    return Err(TranslateError::LimitsMaxUnspecified {
                        declared: declared_max,
                    });
                }
                Some(actual_max) if actual_max > declared_max => {
                    return Err(TranslateError::LimitsMaxTooLarge {
                        actual: actual_max,
                        declared: declared_max,
                    });
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// Append an export to `module_index`, rejecting duplicate names.
    pub(crate) fn append_export_to(
        &mut self,
        module_index: usize,
        kind: ExternalKind,
        item_index: Index,
        name: String,
    ) -> TranslateResult {
        let module = &mut self.env.modules[module_index];
        if module.export_bindings.contains_key(&name) {
            return Err(TranslateError::DuplicateExport { name });
        }
        module.push_export(kind, item_index, name);
        Ok(())
    }

    /// Auto-export a host-materialized import on its host module under the
    /// import's field name. Repeated imports of the same field keep the
    /// first binding.
    pub(crate) fn append_host_export(
        &mut self,
        module_index: usize,
        kind: ExternalKind,
        item_index: Index,
        name: String,
    ) {
        let module = &mut self.env.modules[module_index];
        if !module.export_bindings.contains_key(&name) {
            module.push_export(kind, item_index, name);
        }
    }
}

fn no_current_func() -> TranslateError {
    TranslateError::Malformed("code section entry without matching function declaration".to_string())
}
