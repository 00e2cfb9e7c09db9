//! Section-level callbacks: types, imports, function/table/memory/global
//! declarations, exports, the start function, and element/data segments.
//!
//! Everything here resolves module-local indices against the environment and
//! defers table/memory mutation into the segment-info logs, which are only
//! applied by [`Translator::end_module`] once the whole module has validated.

use super::{DataSegmentInfo, ElemSegmentInfo, ImportTarget, Translator};
use crate::error::{TranslateError, TranslateResult};
use spindle_env::{
    DefinedFunc, Func, FuncSignature, Global, HostFunc, Import, ImportDesc, Index, Limits, Memory,
    ModuleKind, Table, TypedValue, ValueType,
};

impl Translator<'_> {
    // === Types ===

    /// Reserve `count` environment signature slots and map this module's
    /// type indices onto them.
    pub(crate) fn on_type_count(&mut self, count: u32) -> TranslateResult {
        let first = self.env.sigs.len();
        self.sig_index_mapping = (0..count).map(|i| (first + i as usize) as Index).collect();
        self.env
            .sigs
            .resize_with(first + count as usize, FuncSignature::default);
        Ok(())
    }

    pub(crate) fn on_type(
        &mut self,
        index: u32,
        param_types: Vec<ValueType>,
        result_types: Vec<ValueType>,
    ) -> TranslateResult {
        let env_index = self.translate_sig_to_env(index)?;
        self.env.sigs[env_index as usize] = FuncSignature::new(param_types, result_types);
        Ok(())
    }

    // === Imports ===

    pub(crate) fn on_import_count(&mut self, count: u32) -> TranslateResult {
        self.defined_module_mut()?.imports.reserve(count as usize);
        Ok(())
    }

    /// First half of an import: resolve the provider module. For host
    /// modules the kind is not known yet; for registered modules the named
    /// export must exist and its kind is cached for the second half.
    pub(crate) fn on_import(&mut self, module_name: &str, field_name: &str) -> TranslateResult {
        let mut import = Import::new(module_name.to_string(), field_name.to_string());

        let provider = self.env.registered_module(module_name).ok_or_else(|| {
            TranslateError::UnknownImportModule {
                module: module_name.to_string(),
            }
        })?;

        if self.env.modules[provider].is_host() {
            // The host module materializes imports on demand; whether this
            // field exists is decided by the delegate in the second half.
            self.import_target = ImportTarget::Host {
                module_index: provider,
            };
        } else {
            let export = self.env.modules[provider]
                .export_by_name(field_name)
                .ok_or_else(|| TranslateError::UnknownImportField {
                    field: field_name.to_string(),
                })?;
            import.kind = Some(export.kind);
            self.import_target = ImportTarget::Registered {
                kind: export.kind,
                env_index: export.index,
            };
        }

        self.defined_module_mut()?.imports.push(import);
        Ok(())
    }

    fn current_import(&self) -> TranslateResult<Import> {
        self.module()
            .as_defined()
            .and_then(|m| m.imports.last())
            .cloned()
            .ok_or_else(|| {
                TranslateError::Malformed("import descriptor without import header".to_string())
            })
    }

    fn set_current_import_desc(&mut self, desc: ImportDesc) -> TranslateResult {
        if let Some(import) = self.defined_module_mut()?.imports.last_mut() {
            import.desc = Some(desc);
        }
        Ok(())
    }

    fn check_import_kind(
        &self,
        import: &Import,
        expected: spindle_env::ExternalKind,
    ) -> TranslateResult {
        match self.import_target {
            ImportTarget::Registered { kind, .. } if kind != expected => {
                Err(TranslateError::ImportKindMismatch {
                    module: import.module_name.clone(),
                    field: import.field_name.clone(),
                    expected,
                    actual: kind,
                })
            }
            _ => Ok(()),
        }
    }

    pub(crate) fn on_import_func(&mut self, sig_index: u32) -> TranslateResult {
        let sig_env_index = self.translate_sig_to_env(sig_index)?;
        let import = self.current_import()?;

        let func_env_index = match self.import_target {
            ImportTarget::Host { module_index } => {
                let env = &mut *self.env;
                let sig = &env.sigs[sig_env_index as usize];
                let host = match &mut env.modules[module_index].kind {
                    ModuleKind::Host(host) => host,
                    ModuleKind::Defined(_) => {
                        return Err(TranslateError::Malformed(
                            "host import against a defined module".to_string(),
                        ));
                    }
                };
                let handler = host
                    .delegate
                    .import_func(&import, sig)
                    .map_err(TranslateError::HostImport)?;
                env.funcs.push(Func::Host(HostFunc {
                    module_name: import.module_name.clone(),
                    field_name: import.field_name.clone(),
                    sig_index: sig_env_index,
                    handler,
                }));
                let func_env_index = (env.funcs.len() - 1) as Index;
                self.append_host_export(
                    module_index,
                    spindle_env::ExternalKind::Func,
                    func_env_index,
                    import.field_name.clone(),
                );
                func_env_index
            }
            ImportTarget::Registered { env_index, .. } => {
                self.check_import_kind(&import, spindle_env::ExternalKind::Func)?;
                let func = &self.env.funcs[env_index as usize];
                if !self.env.sigs_equal(sig_env_index, func.sig_index()) {
                    return Err(TranslateError::ImportSignatureMismatch);
                }
                env_index
            }
            ImportTarget::None => {
                return Err(TranslateError::Malformed(
                    "import descriptor without import header".to_string(),
                ));
            }
        };

        self.set_current_import_desc(ImportDesc::Func {
            sig_index: sig_env_index,
        })?;
        self.func_index_mapping.push(func_env_index);
        self.num_func_imports += 1;
        Ok(())
    }

    pub(crate) fn on_import_table(&mut self, elem_limits: Limits) -> TranslateResult {
        if self.module().table_index.is_some() {
            return Err(TranslateError::DuplicateTable);
        }
        let import = self.current_import()?;

        let table_env_index = match self.import_target {
            ImportTarget::Host { module_index } => {
                let env = &mut *self.env;
                let host = match &mut env.modules[module_index].kind {
                    ModuleKind::Host(host) => host,
                    ModuleKind::Defined(_) => {
                        return Err(TranslateError::Malformed(
                            "host import against a defined module".to_string(),
                        ));
                    }
                };
                let table = host
                    .delegate
                    .import_table(&import, &elem_limits)
                    .map_err(TranslateError::HostImport)?;
                Self::check_import_limits(&elem_limits, &table.limits)?;
                env.tables.push(table);
                let table_env_index = (env.tables.len() - 1) as Index;
                self.append_host_export(
                    module_index,
                    spindle_env::ExternalKind::Table,
                    table_env_index,
                    import.field_name.clone(),
                );
                table_env_index
            }
            ImportTarget::Registered { env_index, .. } => {
                self.check_import_kind(&import, spindle_env::ExternalKind::Table)?;
                let table = &self.env.tables[env_index as usize];
                Self::check_import_limits(&elem_limits, &table.limits)?;
                env_index
            }
            ImportTarget::None => {
                return Err(TranslateError::Malformed(
                    "import descriptor without import header".to_string(),
                ));
            }
        };

        self.set_current_import_desc(ImportDesc::Table {
            limits: elem_limits,
        })?;
        self.module_mut().table_index = Some(table_env_index);
        Ok(())
    }

    pub(crate) fn on_import_memory(&mut self, page_limits: Limits) -> TranslateResult {
        if self.module().memory_index.is_some() {
            return Err(TranslateError::DuplicateMemory);
        }
        let import = self.current_import()?;

        let memory_env_index = match self.import_target {
            ImportTarget::Host { module_index } => {
                let env = &mut *self.env;
                let host = match &mut env.modules[module_index].kind {
                    ModuleKind::Host(host) => host,
                    ModuleKind::Defined(_) => {
                        return Err(TranslateError::Malformed(
                            "host import against a defined module".to_string(),
                        ));
                    }
                };
                let memory = host
                    .delegate
                    .import_memory(&import, &page_limits)
                    .map_err(TranslateError::HostImport)?;
                Self::check_import_limits(&page_limits, &memory.page_limits)?;
                env.memories.push(memory);
                let memory_env_index = (env.memories.len() - 1) as Index;
                self.append_host_export(
                    module_index,
                    spindle_env::ExternalKind::Memory,
                    memory_env_index,
                    import.field_name.clone(),
                );
                memory_env_index
            }
            ImportTarget::Registered { env_index, .. } => {
                self.check_import_kind(&import, spindle_env::ExternalKind::Memory)?;
                let memory = &self.env.memories[env_index as usize];
                Self::check_import_limits(&page_limits, &memory.page_limits)?;
                env_index
            }
            ImportTarget::None => {
                return Err(TranslateError::Malformed(
                    "import descriptor without import header".to_string(),
                ));
            }
        };

        self.set_current_import_desc(ImportDesc::Memory {
            limits: page_limits,
        })?;
        self.module_mut().memory_index = Some(memory_env_index);
        Ok(())
    }

    pub(crate) fn on_import_global(&mut self, ty: ValueType, mutable: bool) -> TranslateResult {
        let import = self.current_import()?;

        let global_env_index = match self.import_target {
            ImportTarget::Host { module_index } => {
                let env = &mut *self.env;
                let host = match &mut env.modules[module_index].kind {
                    ModuleKind::Host(host) => host,
                    ModuleKind::Defined(_) => {
                        return Err(TranslateError::Malformed(
                            "host import against a defined module".to_string(),
                        ));
                    }
                };
                let value = host
                    .delegate
                    .import_global(&import, ty, mutable)
                    .map_err(TranslateError::HostImport)?;
                // The delegate's value is adopted verbatim; the declared type
                // is not enforced against host-provided globals.
                env.globals.push(Global {
                    ty: value.ty(),
                    value,
                    mutable,
                });
                let global_env_index = (env.globals.len() - 1) as Index;
                self.append_host_export(
                    module_index,
                    spindle_env::ExternalKind::Global,
                    global_env_index,
                    import.field_name.clone(),
                );
                global_env_index
            }
            ImportTarget::Registered { env_index, .. } => {
                self.check_import_kind(&import, spindle_env::ExternalKind::Global)?;
                let global = &self.env.globals[env_index as usize];
                if global.ty != ty {
                    return Err(TranslateError::GlobalImportTypeMismatch {
                        field: import.field_name.clone(),
                        expected: ty,
                        actual: global.ty,
                    });
                }
                if global.mutable != mutable {
                    return Err(TranslateError::GlobalImportMutabilityMismatch {
                        field: import.field_name.clone(),
                    });
                }
                env_index
            }
            ImportTarget::None => {
                return Err(TranslateError::Malformed(
                    "import descriptor without import header".to_string(),
                ));
            }
        };

        self.set_current_import_desc(ImportDesc::Global { ty, mutable })?;
        self.global_index_mapping.push(global_env_index);
        self.num_global_imports += 1;
        Ok(())
    }

    // === Declarations ===

    pub(crate) fn on_function_count(&mut self, count: u32) -> TranslateResult {
        let first = self.env.funcs.len();
        for i in 0..count as usize {
            self.func_index_mapping.push((first + i) as Index);
        }
        self.env.funcs.reserve(count as usize);
        self.func_fixups.resize(count as usize, Vec::new());
        Ok(())
    }

    pub(crate) fn on_function(&mut self, _index: u32, sig_index: u32) -> TranslateResult {
        let sig_env_index = self.translate_sig_to_env(sig_index)?;
        self.env
            .funcs
            .push(Func::Defined(DefinedFunc::new(sig_env_index)));
        Ok(())
    }

    pub(crate) fn on_table(&mut self, elem_limits: Limits) -> TranslateResult {
        if self.module().table_index.is_some() {
            return Err(TranslateError::DuplicateTable);
        }
        self.env.tables.push(Table::new(elem_limits));
        self.module_mut().table_index = Some((self.env.tables.len() - 1) as Index);
        Ok(())
    }

    pub(crate) fn on_memory(&mut self, page_limits: Limits) -> TranslateResult {
        if self.module().memory_index.is_some() {
            return Err(TranslateError::DuplicateMemory);
        }
        self.env.memories.push(Memory::new(page_limits));
        self.module_mut().memory_index = Some((self.env.memories.len() - 1) as Index);
        Ok(())
    }

    // === Globals and initializer expressions ===

    pub(crate) fn on_global_count(&mut self, count: u32) -> TranslateResult {
        let first = self.env.globals.len();
        for i in 0..count as usize {
            self.global_index_mapping.push((first + i) as Index);
        }
        self.env
            .globals
            .resize_with(first + count as usize, Global::default);
        Ok(())
    }

    pub(crate) fn begin_global(
        &mut self,
        index: u32,
        ty: ValueType,
        mutable: bool,
    ) -> TranslateResult {
        let env_index = self.translate_global_to_env(index)?;
        let global = &mut self.env.globals[env_index as usize];
        global.ty = ty;
        global.value = TypedValue::zero(ty);
        global.mutable = mutable;
        self.init_expr_value = None;
        Ok(())
    }

    pub(crate) fn end_global_init_expr(&mut self, index: u32) -> TranslateResult {
        let env_index = self.translate_global_to_env(index)?;
        let global = &self.env.globals[env_index as usize];
        let value = match self.init_expr_value {
            Some(value) if value.ty() == global.ty => value,
            other => {
                return Err(TranslateError::InitTypeMismatch {
                    context: "global",
                    expected: global.ty.to_string(),
                    actual: init_type_name(other),
                });
            }
        };
        self.env.globals[env_index as usize].value = value;
        Ok(())
    }

    pub(crate) fn on_init_expr_i32_const(&mut self, value: u32) -> TranslateResult {
        self.init_expr_value = Some(TypedValue::I32(value));
        Ok(())
    }

    pub(crate) fn on_init_expr_i64_const(&mut self, value: u64) -> TranslateResult {
        self.init_expr_value = Some(TypedValue::I64(value));
        Ok(())
    }

    pub(crate) fn on_init_expr_f32_const(&mut self, value_bits: u32) -> TranslateResult {
        self.init_expr_value = Some(TypedValue::F32(value_bits));
        Ok(())
    }

    pub(crate) fn on_init_expr_f64_const(&mut self, value_bits: u64) -> TranslateResult {
        self.init_expr_value = Some(TypedValue::F64(value_bits));
        Ok(())
    }

    /// `get_global` initializers may only reference an imported, immutable
    /// global, whose value is known at translation time.
    pub(crate) fn on_init_expr_get_global(&mut self, global_index: u32) -> TranslateResult {
        if global_index >= self.num_global_imports {
            return Err(TranslateError::InitReferencesNonImportedGlobal);
        }
        let env_index = self.translate_global_to_env(global_index)?;
        let global = &self.env.globals[env_index as usize];
        if global.mutable {
            return Err(TranslateError::InitReferencesMutableGlobal);
        }
        self.init_expr_value = Some(global.value);
        Ok(())
    }

    // === Exports and the start function ===

    pub(crate) fn on_export(
        &mut self,
        kind: spindle_env::ExternalKind,
        item_index: u32,
        name: &str,
    ) -> TranslateResult {
        use spindle_env::ExternalKind;

        let env_index = match kind {
            ExternalKind::Func => self.translate_func_to_env(item_index)?,
            ExternalKind::Table => self.module().table_index.ok_or_else(|| {
                TranslateError::Malformed(format!(
                    "export \"{name}\" references an undeclared table"
                ))
            })?,
            ExternalKind::Memory => self.module().memory_index.ok_or_else(|| {
                TranslateError::Malformed(format!(
                    "export \"{name}\" references an undeclared memory"
                ))
            })?,
            ExternalKind::Global => {
                let env_index = self.translate_global_to_env(item_index)?;
                if self.env.globals[env_index as usize].mutable {
                    return Err(TranslateError::MutableGlobalExport);
                }
                env_index
            }
        };
        self.append_export_to(self.module_index, kind, env_index, name.to_string())
    }

    pub(crate) fn on_start_function(&mut self, func_index: u32) -> TranslateResult {
        let env_index = self.translate_func_to_env(func_index)?;
        let sig_index = self.env.funcs[env_index as usize].sig_index();
        let sig = &self.env.sigs[sig_index as usize];
        if !sig.param_types.is_empty() {
            return Err(TranslateError::StartFunctionMustBeNullary);
        }
        if !sig.result_types.is_empty() {
            return Err(TranslateError::StartFunctionMustNotReturn);
        }
        self.defined_module_mut()?.start_func_index = Some(env_index);
        Ok(())
    }

    // === Element and data segments ===

    pub(crate) fn end_elem_segment_init_expr(&mut self) -> TranslateResult {
        match self.init_expr_value {
            Some(TypedValue::I32(offset)) => {
                self.table_offset = offset;
                Ok(())
            }
            other => Err(TranslateError::InitTypeMismatch {
                context: "elem segment",
                expected: "i32".to_string(),
                actual: init_type_name(other),
            }),
        }
    }

    /// Validate one element entry and log the deferred table write.
    pub(crate) fn on_elem_segment_function_index(&mut self, func_index: u32) -> TranslateResult {
        let table_index = self
            .module()
            .table_index
            .ok_or(TranslateError::ElemSegmentWithoutTable)?;
        let table = &self.env.tables[table_index as usize];
        if self.table_offset as usize >= table.func_indexes.len() {
            return Err(TranslateError::ElementOutOfBounds {
                offset: self.table_offset,
                max: table.func_indexes.len(),
            });
        }
        let func_env_index = self.translate_func_to_env(func_index)?;
        self.elem_segment_infos.push(ElemSegmentInfo {
            table_index,
            dst_offset: self.table_offset,
            func_env_index,
        });
        self.table_offset += 1;
        Ok(())
    }

    /// Validate one data segment against the memory bounds and log the
    /// deferred copy. Empty segments validate but contribute no effect.
    pub(crate) fn on_data_segment_data(&mut self, data: &[u8]) -> TranslateResult {
        let memory_index = self
            .module()
            .memory_index
            .ok_or(TranslateError::DataSegmentWithoutMemory)?;
        let memory = &self.env.memories[memory_index as usize];
        let address = match self.init_expr_value {
            Some(TypedValue::I32(address)) => address,
            other => {
                return Err(TranslateError::InitTypeMismatch {
                    context: "data segment",
                    expected: "i32".to_string(),
                    actual: init_type_name(other),
                });
            }
        };
        let end_address = u64::from(address) + data.len() as u64;
        if end_address > memory.data.len() as u64 {
            return Err(TranslateError::DataOutOfBounds {
                address,
                end: end_address,
                max: memory.data.len(),
            });
        }
        if !data.is_empty() {
            self.data_segment_infos.push(DataSegmentInfo {
                memory_index,
                address,
                data: data.to_vec(),
            });
        }
        Ok(())
    }

    /// Commit the deferred side effects. Runs only when every prior callback
    /// succeeded, so a failed translation leaves tables and memories
    /// untouched.
    pub(crate) fn end_module(&mut self) -> TranslateResult {
        for info in &self.elem_segment_infos {
            let table = &mut self.env.tables[info.table_index as usize];
            table.func_indexes[info.dst_offset as usize] = info.func_env_index;
        }
        for info in &self.data_segment_infos {
            let memory = &mut self.env.memories[info.memory_index as usize];
            let start = info.address as usize;
            memory.data[start..start + info.data.len()].copy_from_slice(&info.data);
        }
        Ok(())
    }
}

fn init_type_name(value: Option<TypedValue>) -> String {
    match value {
        Some(value) => value.ty().to_string(),
        None => "void".to_string(),
    }
}
