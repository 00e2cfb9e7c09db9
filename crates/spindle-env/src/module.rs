//! Module containers — translated (defined) and host modules.
//!
//! A defined module records where its bytecode lives in the istream and how
//! its single optional table/memory map into the environment. A host module
//! owns an import delegate that materializes functions, tables, memories,
//! and globals on demand when other modules import from it.

use crate::{
    FuncSignature, HostFuncHandler, Index, Limits, Memory, Table, TypedValue, ValueType,
};
use std::collections::HashMap;
use std::fmt;

/// What kind of item an export or import refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalKind {
    Func,
    Table,
    Memory,
    Global,
}

impl fmt::Display for ExternalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExternalKind::Func => "func",
            ExternalKind::Table => "table",
            ExternalKind::Memory => "memory",
            ExternalKind::Global => "global",
        };
        f.write_str(name)
    }
}

/// An export: a name bound to an environment-global index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Export {
    pub name: String,
    pub kind: ExternalKind,
    pub index: Index,
}

/// Kind-specific detail recorded for a resolved import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportDesc {
    Func { sig_index: Index },
    Table { limits: Limits },
    Memory { limits: Limits },
    Global { ty: ValueType, mutable: bool },
}

/// An import declared by a defined module.
///
/// `kind` is cached from the provider's export when the two-part import
/// callback sequence begins; host imports leave it unset until the
/// kind-specific callback arrives.
#[derive(Debug, Clone)]
pub struct Import {
    pub module_name: String,
    pub field_name: String,
    pub kind: Option<ExternalKind>,
    pub desc: Option<ImportDesc>,
}

impl Import {
    pub fn new(module_name: String, field_name: String) -> Import {
        Import {
            module_name,
            field_name,
            kind: None,
            desc: None,
        }
    }
}

/// Delegate installed on a host module; resolves imports against the host.
///
/// Each method receives the import descriptor and returns the populated
/// artifact, or an error message that is reported through the translation
/// error handler.
pub trait HostImportDelegate {
    fn import_func(
        &mut self,
        import: &Import,
        sig: &FuncSignature,
    ) -> Result<HostFuncHandler, String>;

    fn import_table(&mut self, import: &Import, limits: &Limits) -> Result<Table, String>;

    fn import_memory(&mut self, import: &Import, limits: &Limits) -> Result<Memory, String>;

    fn import_global(
        &mut self,
        import: &Import,
        ty: ValueType,
        mutable: bool,
    ) -> Result<TypedValue, String>;
}

/// State specific to a defined (translated) module.
#[derive(Debug, Clone, Default)]
pub struct DefinedModule {
    pub imports: Vec<Import>,
    /// Range of this module's bytecode in the environment istream.
    pub istream_start: u32,
    pub istream_end: u32,
    /// Environment-global index of the start function, if declared.
    pub start_func_index: Option<Index>,
}

/// State specific to a host module.
pub struct HostModule {
    pub delegate: Box<dyn HostImportDelegate>,
}

impl fmt::Debug for HostModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostModule").finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub enum ModuleKind {
    Defined(DefinedModule),
    Host(HostModule),
}

/// A module known to the environment.
#[derive(Debug)]
pub struct Module {
    pub name: Option<String>,
    pub exports: Vec<Export>,
    /// Export name -> index into `exports`.
    pub export_bindings: HashMap<String, usize>,
    /// The module's single table/memory, as environment-global indices.
    pub table_index: Option<Index>,
    pub memory_index: Option<Index>,
    pub kind: ModuleKind,
}

impl Module {
    pub fn defined(istream_start: u32) -> Module {
        Module {
            name: None,
            exports: Vec::new(),
            export_bindings: HashMap::new(),
            table_index: None,
            memory_index: None,
            kind: ModuleKind::Defined(DefinedModule {
                istream_start,
                istream_end: istream_start,
                ..DefinedModule::default()
            }),
        }
    }

    pub fn host(delegate: Box<dyn HostImportDelegate>) -> Module {
        Module {
            name: None,
            exports: Vec::new(),
            export_bindings: HashMap::new(),
            table_index: None,
            memory_index: None,
            kind: ModuleKind::Host(HostModule { delegate }),
        }
    }

    pub fn is_host(&self) -> bool {
        matches!(self.kind, ModuleKind::Host(_))
    }

    pub fn as_defined(&self) -> Option<&DefinedModule> {
        match &self.kind {
            ModuleKind::Defined(m) => Some(m),
            ModuleKind::Host(_) => None,
        }
    }

    pub fn as_defined_mut(&mut self) -> Option<&mut DefinedModule> {
        match &mut self.kind {
            ModuleKind::Defined(m) => Some(m),
            ModuleKind::Host(_) => None,
        }
    }

    pub fn export_by_name(&self, name: &str) -> Option<&Export> {
        self.export_bindings.get(name).map(|&i| &self.exports[i])
    }

    /// Append an export and bind its name. The caller is responsible for
    /// rejecting duplicate names first.
    pub fn push_export(&mut self, kind: ExternalKind, index: Index, name: String) {
        self.export_bindings
            .insert(name.clone(), self.exports.len());
        self.exports.push(Export { name, kind, index });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_lookup_by_name() {
        let mut module = Module::defined(0);
        module.push_export(ExternalKind::Func, 7, "run".to_string());
        module.push_export(ExternalKind::Memory, 0, "mem".to_string());

        let export = module.export_by_name("run").unwrap();
        assert_eq!(export.kind, ExternalKind::Func);
        assert_eq!(export.index, 7);
        assert!(module.export_by_name("missing").is_none());
    }

    #[test]
    fn defined_module_accessors() {
        let mut module = Module::defined(16);
        assert!(!module.is_host());
        assert_eq!(module.as_defined().unwrap().istream_start, 16);
        module.as_defined_mut().unwrap().istream_end = 64;
        assert_eq!(module.as_defined().unwrap().istream_end, 64);
    }
}
