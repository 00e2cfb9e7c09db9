//! The decoder adapter.
//!
//! Walks a binary module with `wasmparser` and drives the translator's
//! callback surface in document order, one call per structural event. The
//! terminal `end` opcode of each function body is consumed here rather than
//! forwarded; the implicit function label is closed by `end_function_body`.

use crate::error::{ErrorHandler, TranslateError, TranslateResult};
use crate::opcode::Opcode;
use crate::translate::Translator;
use spindle_env::{ExternalKind, Limits, ValueType};
use wasmparser::{
    BlockType, CompositeInnerType, ConstExpr, DataKind, ElementItems, ElementKind, FunctionBody,
    MemArg, Operator, Parser, Payload, RefType, TypeRef, ValType,
};

/// Drive `translator` over `wasm`. On failure the diagnostic is reported
/// through `handler` with the closest known binary offset before the error
/// is returned.
pub(crate) fn read_module(
    translator: &mut Translator<'_>,
    wasm: &[u8],
    handler: &mut dyn ErrorHandler,
) -> TranslateResult {
    let mut reader = Reader {
        translator,
        offset: 0,
        code_index: 0,
    };
    match reader.run(wasm) {
        Ok(()) => Ok(()),
        Err(err) => {
            handler.on_error(Some(reader.offset), &err.to_string());
            Err(err)
        }
    }
}

struct Reader<'a, 'env> {
    translator: &'a mut Translator<'env>,
    /// Closest known offset into the binary, for error reporting.
    offset: usize,
    /// Number of code-section entries seen so far.
    code_index: u32,
}

fn value_type(ty: ValType) -> TranslateResult<ValueType> {
    match ty {
        ValType::I32 => Ok(ValueType::I32),
        ValType::I64 => Ok(ValueType::I64),
        ValType::F32 => Ok(ValueType::F32),
        ValType::F64 => Ok(ValueType::F64),
        other => Err(TranslateError::Unsupported(format!(
            "value type {other} not supported"
        ))),
    }
}

fn block_sig(blockty: BlockType) -> TranslateResult<Vec<ValueType>> {
    match blockty {
        BlockType::Empty => Ok(Vec::new()),
        BlockType::Type(ty) => Ok(vec![value_type(ty)?]),
        BlockType::FuncType(_) => Err(TranslateError::Unsupported(
            "multi-value blocks not supported".to_string(),
        )),
    }
}

fn external_kind(kind: wasmparser::ExternalKind) -> TranslateResult<ExternalKind> {
    match kind {
        wasmparser::ExternalKind::Func => Ok(ExternalKind::Func),
        wasmparser::ExternalKind::Table => Ok(ExternalKind::Table),
        wasmparser::ExternalKind::Memory => Ok(ExternalKind::Memory),
        wasmparser::ExternalKind::Global => Ok(ExternalKind::Global),
        wasmparser::ExternalKind::Tag => Err(TranslateError::Unsupported(
            "exception tags not supported".to_string(),
        )),
    }
}

fn table_limits(ty: &wasmparser::TableType) -> TranslateResult<Limits> {
    if ty.element_type != RefType::FUNCREF {
        return Err(TranslateError::Unsupported(
            "non-funcref tables not supported".to_string(),
        ));
    }
    if ty.table64 {
        return Err(TranslateError::Unsupported(
            "64-bit tables not supported".to_string(),
        ));
    }
    Ok(Limits::new(ty.initial, ty.maximum))
}

fn memory_limits(ty: &wasmparser::MemoryType) -> TranslateResult<Limits> {
    if ty.memory64 || ty.shared {
        return Err(TranslateError::Unsupported(
            "64-bit and shared memories not supported".to_string(),
        ));
    }
    Ok(Limits::new(ty.initial, ty.maximum))
}

fn mem_access(memarg: &MemArg) -> TranslateResult<(u32, u64)> {
    if memarg.memory != 0 {
        return Err(TranslateError::Unsupported(
            "multi-memory accesses not supported".to_string(),
        ));
    }
    Ok((u32::from(memarg.align), memarg.offset))
}

impl Reader<'_, '_> {
    fn run(&mut self, wasm: &[u8]) -> TranslateResult {
        for payload in Parser::new(0).parse_all(wasm) {
            let payload = payload?;
            match payload {
                Payload::Version { .. } => {}

                Payload::TypeSection(reader) => {
                    self.offset = reader.range().start;
                    self.translator.on_type_count(reader.count())?;
                    let mut type_index = 0;
                    for rec_group in reader {
                        for sub_type in rec_group?.types() {
                            let func_ty = match &sub_type.composite_type.inner {
                                CompositeInnerType::Func(func_ty) => func_ty,
                                _ => {
                                    return Err(TranslateError::Unsupported(
                                        "non-function types not supported".to_string(),
                                    ));
                                }
                            };
                            let params = func_ty
                                .params()
                                .iter()
                                .map(|&ty| value_type(ty))
                                .collect::<TranslateResult<Vec<_>>>()?;
                            let results = func_ty
                                .results()
                                .iter()
                                .map(|&ty| value_type(ty))
                                .collect::<TranslateResult<Vec<_>>>()?;
                            if results.len() > 1 {
                                return Err(TranslateError::Unsupported(
                                    "multiple results not supported".to_string(),
                                ));
                            }
                            self.translator.on_type(type_index, params, results)?;
                            type_index += 1;
                        }
                    }
                }

                Payload::ImportSection(reader) => {
                    self.offset = reader.range().start;
                    self.translator.on_import_count(reader.count())?;
                    for import in reader {
                        let import = import?;
                        self.translator.on_import(import.module, import.name)?;
                        match import.ty {
                            TypeRef::Func(sig_index) => {
                                self.translator.on_import_func(sig_index)?;
                            }
                            TypeRef::Table(ty) => {
                                self.translator.on_import_table(table_limits(&ty)?)?;
                            }
                            TypeRef::Memory(ty) => {
                                self.translator.on_import_memory(memory_limits(&ty)?)?;
                            }
                            TypeRef::Global(ty) => {
                                self.translator
                                    .on_import_global(value_type(ty.content_type)?, ty.mutable)?;
                            }
                            TypeRef::Tag(_) => {
                                return Err(TranslateError::Unsupported(
                                    "exception tags not supported".to_string(),
                                ));
                            }
                        }
                    }
                }

                Payload::FunctionSection(reader) => {
                    self.offset = reader.range().start;
                    self.translator.on_function_count(reader.count())?;
                    for (i, sig_index) in reader.into_iter().enumerate() {
                        self.translator.on_function(i as u32, sig_index?)?;
                    }
                }

                Payload::TableSection(reader) => {
                    self.offset = reader.range().start;
                    for table in reader {
                        let table = table?;
                        if !matches!(table.init, wasmparser::TableInit::RefNull) {
                            return Err(TranslateError::Unsupported(
                                "table initializer expressions not supported".to_string(),
                            ));
                        }
                        self.translator.on_table(table_limits(&table.ty)?)?;
                    }
                }

                Payload::MemorySection(reader) => {
                    self.offset = reader.range().start;
                    for memory in reader {
                        self.translator.on_memory(memory_limits(&memory?)?)?;
                    }
                }

                Payload::GlobalSection(reader) => {
                    self.offset = reader.range().start;
                    self.translator.on_global_count(reader.count())?;
                    for (i, global) in reader.into_iter().enumerate() {
                        let global = global?;
                        let index = self.translator.num_global_imports() + i as u32;
                        self.translator.begin_global(
                            index,
                            value_type(global.ty.content_type)?,
                            global.ty.mutable,
                        )?;
                        self.init_expr(&global.init_expr)?;
                        self.translator.end_global_init_expr(index)?;
                    }
                }

                Payload::ExportSection(reader) => {
                    self.offset = reader.range().start;
                    for export in reader {
                        let export = export?;
                        self.translator.on_export(
                            external_kind(export.kind)?,
                            export.index,
                            export.name,
                        )?;
                    }
                }

                Payload::StartSection { func, range } => {
                    self.offset = range.start;
                    self.translator.on_start_function(func)?;
                }

                Payload::ElementSection(reader) => {
                    self.offset = reader.range().start;
                    for element in reader {
                        let element = element?;
                        match element.kind {
                            ElementKind::Active {
                                table_index,
                                offset_expr,
                            } => {
                                if table_index.unwrap_or(0) != 0 {
                                    return Err(TranslateError::Unsupported(
                                        "multi-table element segments not supported".to_string(),
                                    ));
                                }
                                self.init_expr(&offset_expr)?;
                                self.translator.end_elem_segment_init_expr()?;
                                match element.items {
                                    ElementItems::Functions(funcs) => {
                                        for func_index in funcs {
                                            self.translator
                                                .on_elem_segment_function_index(func_index?)?;
                                        }
                                    }
                                    ElementItems::Expressions(..) => {
                                        return Err(TranslateError::Unsupported(
                                            "expression element segments not supported"
                                                .to_string(),
                                        ));
                                    }
                                }
                            }
                            // Passive and declared segments only matter to the
                            // bulk-memory instructions, which are outside the
                            // accepted subset; they map to nothing here.
                            ElementKind::Passive | ElementKind::Declared => {}
                        }
                    }
                }

                Payload::CodeSectionStart { range, .. } => {
                    self.offset = range.start;
                }

                Payload::CodeSectionEntry(body) => {
                    self.code_entry(body)?;
                }

                Payload::DataSection(reader) => {
                    self.offset = reader.range().start;
                    for data in reader {
                        let data = data?;
                        match data.kind {
                            DataKind::Active {
                                memory_index,
                                offset_expr,
                            } => {
                                if memory_index != 0 {
                                    return Err(TranslateError::Unsupported(
                                        "multi-memory data segments not supported".to_string(),
                                    ));
                                }
                                self.init_expr(&offset_expr)?;
                                self.translator.on_data_segment_data(data.data)?;
                            }
                            // Passive data segments need memory.init; outside
                            // the accepted subset.
                            DataKind::Passive => {}
                        }
                    }
                }

                Payload::CustomSection(_) => {}

                Payload::End(_) => {
                    self.translator.end_module()?;
                }

                other => {
                    return Err(TranslateError::Unsupported(format!(
                        "unsupported section: {other:?}"
                    )));
                }
            }
        }
        Ok(())
    }

    /// An initializer expression is a single constant-producing instruction
    /// followed by `end`; the constant lands in the translator's init-expr
    /// scratch.
    fn init_expr(&mut self, expr: &ConstExpr) -> TranslateResult {
        let mut ops = expr.get_operators_reader();
        self.offset = ops.original_position();
        match ops.read()? {
            Operator::I32Const { value } => {
                self.translator.on_init_expr_i32_const(value as u32)?;
            }
            Operator::I64Const { value } => {
                self.translator.on_init_expr_i64_const(value as u64)?;
            }
            Operator::F32Const { value } => {
                self.translator.on_init_expr_f32_const(value.bits())?;
            }
            Operator::F64Const { value } => {
                self.translator.on_init_expr_f64_const(value.bits())?;
            }
            Operator::GlobalGet { global_index } => {
                self.translator.on_init_expr_get_global(global_index)?;
            }
            other => {
                return Err(TranslateError::Unsupported(format!(
                    "unsupported initializer operator: {other:?}"
                )));
            }
        }
        match ops.read()? {
            Operator::End => Ok(()),
            _ => Err(TranslateError::Malformed(
                "expected end of initializer expression".to_string(),
            )),
        }
    }

    fn code_entry(&mut self, body: FunctionBody<'_>) -> TranslateResult {
        let func_index = self.translator.num_func_imports() + self.code_index;
        self.code_index += 1;
        self.offset = body.range().start;

        self.translator.begin_function_body(func_index)?;

        let locals_reader = body.get_locals_reader()?;
        self.translator.on_local_decl_count(locals_reader.get_count())?;
        for (decl_index, local) in locals_reader.into_iter().enumerate() {
            let (count, ty) = local?;
            self.translator
                .on_local_decl(decl_index as u32, count, value_type(ty)?)?;
        }

        let mut ops = body.get_operators_reader()?;
        loop {
            self.offset = ops.original_position();
            let op = ops.read()?;
            if ops.eof() {
                // The terminal `end` closes the implicit function label via
                // end_function_body, not through the end callback.
                match op {
                    Operator::End => break,
                    _ => {
                        return Err(TranslateError::Malformed(
                            "function body must end with end opcode".to_string(),
                        ));
                    }
                }
            }
            self.operator(op)?;
        }

        self.translator.end_function_body()
    }

    /// Map one operator to its translator callback, with each operator's
    /// interpreter opcode and type signature spelled at the call site.
    fn operator(&mut self, op: Operator<'_>) -> TranslateResult {
        use spindle_env::ValueType::*;
        use Opcode as O;

        let t = &mut *self.translator;
        match op {
            // Control flow
            Operator::Unreachable => t.on_unreachable_expr()?,
            Operator::Nop => t.on_nop_expr()?,
            Operator::Block { blockty } => t.on_block_expr(&block_sig(blockty)?)?,
            Operator::Loop { blockty } => t.on_loop_expr(&block_sig(blockty)?)?,
            Operator::If { blockty } => t.on_if_expr(&block_sig(blockty)?)?,
            Operator::Else => t.on_else_expr()?,
            Operator::End => t.on_end_expr()?,
            Operator::Br { relative_depth } => t.on_br_expr(relative_depth)?,
            Operator::BrIf { relative_depth } => t.on_br_if_expr(relative_depth)?,
            Operator::BrTable { targets } => {
                let depths = targets
                    .targets()
                    .collect::<Result<Vec<_>, _>>()?;
                t.on_br_table_expr(&depths, targets.default())?;
            }
            Operator::Return => t.on_return_expr()?,
            Operator::Call { function_index } => t.on_call_expr(function_index)?,
            Operator::CallIndirect {
                type_index,
                table_index,
            } => {
                if table_index != 0 {
                    return Err(TranslateError::Unsupported(
                        "multi-table calls not supported".to_string(),
                    ));
                }
                t.on_call_indirect_expr(type_index)?;
            }
            Operator::Drop => t.on_drop_expr()?,
            Operator::Select => t.on_select_expr()?,

            // Locals and globals
            Operator::LocalGet { local_index } => t.on_get_local_expr(local_index)?,
            Operator::LocalSet { local_index } => t.on_set_local_expr(local_index)?,
            Operator::LocalTee { local_index } => t.on_tee_local_expr(local_index)?,
            Operator::GlobalGet { global_index } => t.on_get_global_expr(global_index)?,
            Operator::GlobalSet { global_index } => t.on_set_global_expr(global_index)?,

            // Constants
            Operator::I32Const { value } => t.on_i32_const_expr(value as u32)?,
            Operator::I64Const { value } => t.on_i64_const_expr(value as u64)?,
            Operator::F32Const { value } => t.on_f32_const_expr(value.bits())?,
            Operator::F64Const { value } => t.on_f64_const_expr(value.bits())?,

            // Memory loads
            Operator::I32Load { memarg } => {
                let (align, offset) = mem_access(&memarg)?;
                t.on_load_expr(O::I32Load, I32, 4, align, offset)?;
            }
            Operator::I64Load { memarg } => {
                let (align, offset) = mem_access(&memarg)?;
                t.on_load_expr(O::I64Load, I64, 8, align, offset)?;
            }
            Operator::F32Load { memarg } => {
                let (align, offset) = mem_access(&memarg)?;
                t.on_load_expr(O::F32Load, F32, 4, align, offset)?;
            }
            Operator::F64Load { memarg } => {
                let (align, offset) = mem_access(&memarg)?;
                t.on_load_expr(O::F64Load, F64, 8, align, offset)?;
            }
            Operator::I32Load8S { memarg } => {
                let (align, offset) = mem_access(&memarg)?;
                t.on_load_expr(O::I32Load8S, I32, 1, align, offset)?;
            }
            Operator::I32Load8U { memarg } => {
                let (align, offset) = mem_access(&memarg)?;
                t.on_load_expr(O::I32Load8U, I32, 1, align, offset)?;
            }
            Operator::I32Load16S { memarg } => {
                let (align, offset) = mem_access(&memarg)?;
                t.on_load_expr(O::I32Load16S, I32, 2, align, offset)?;
            }
            Operator::I32Load16U { memarg } => {
                let (align, offset) = mem_access(&memarg)?;
                t.on_load_expr(O::I32Load16U, I32, 2, align, offset)?;
            }
            Operator::I64Load8S { memarg } => {
                let (align, offset) = mem_access(&memarg)?;
                t.on_load_expr(O::I64Load8S, I64, 1, align, offset)?;
            }
            Operator::I64Load8U { memarg } => {
                let (align, offset) = mem_access(&memarg)?;
                t.on_load_expr(O::I64Load8U, I64, 1, align, offset)?;
            }
            Operator::I64Load16S { memarg } => {
                let (align, offset) = mem_access(&memarg)?;
                t.on_load_expr(O::I64Load16S, I64, 2, align, offset)?;
            }
            Operator::I64Load16U { memarg } => {
                let (align, offset) = mem_access(&memarg)?;
                t.on_load_expr(O::I64Load16U, I64, 2, align, offset)?;
            }
            Operator::I64Load32S { memarg } => {
                let (align, offset) = mem_access(&memarg)?;
                t.on_load_expr(O::I64Load32S, I64, 4, align, offset)?;
            }
            Operator::I64Load32U { memarg } => {
                let (align, offset) = mem_access(&memarg)?;
                t.on_load_expr(O::I64Load32U, I64, 4, align, offset)?;
            }

            // Memory stores
            Operator::I32Store { memarg } => {
                let (align, offset) = mem_access(&memarg)?;
                t.on_store_expr(O::I32Store, I32, 4, align, offset)?;
            }
            Operator::I64Store { memarg } => {
                let (align, offset) = mem_access(&memarg)?;
                t.on_store_expr(O::I64Store, I64, 8, align, offset)?;
            }
            Operator::F32Store { memarg } => {
                let (align, offset) = mem_access(&memarg)?;
                t.on_store_expr(O::F32Store, F32, 4, align, offset)?;
            }
            Operator::F64Store { memarg } => {
                let (align, offset) = mem_access(&memarg)?;
                t.on_store_expr(O::F64Store, F64, 8, align, offset)?;
            }
            Operator::I32Store8 { memarg } => {
                let (align, offset) = mem_access(&memarg)?;
                t.on_store_expr(O::I32Store8, I32, 1, align, offset)?;
            }
            Operator::I32Store16 { memarg } => {
                let (align, offset) = mem_access(&memarg)?;
                t.on_store_expr(O::I32Store16, I32, 2, align, offset)?;
            }
            Operator::I64Store8 { memarg } => {
                let (align, offset) = mem_access(&memarg)?;
                t.on_store_expr(O::I64Store8, I64, 1, align, offset)?;
            }
            Operator::I64Store16 { memarg } => {
                let (align, offset) = mem_access(&memarg)?;
                t.on_store_expr(O::I64Store16, I64, 2, align, offset)?;
            }
            Operator::I64Store32 { memarg } => {
                let (align, offset) = mem_access(&memarg)?;
                t.on_store_expr(O::I64Store32, I64, 4, align, offset)?;
            }

            // Memory size
            Operator::MemorySize { mem, .. } => {
                if mem != 0 {
                    return Err(TranslateError::Unsupported(
                        "multi-memory accesses not supported".to_string(),
                    ));
                }
                t.on_current_memory_expr()?;
            }
            Operator::MemoryGrow { mem, .. } => {
                if mem != 0 {
                    return Err(TranslateError::Unsupported(
                        "multi-memory accesses not supported".to_string(),
                    ));
                }
                t.on_grow_memory_expr()?;
            }

            // i32 comparisons
            Operator::I32Eqz => t.on_unary_expr(O::I32Eqz, I32, I32)?,
            Operator::I32Eq => t.on_binary_expr(O::I32Eq, I32, I32, I32)?,
            Operator::I32Ne => t.on_binary_expr(O::I32Ne, I32, I32, I32)?,
            Operator::I32LtS => t.on_binary_expr(O::I32LtS, I32, I32, I32)?,
            Operator::I32LtU => t.on_binary_expr(O::I32LtU, I32, I32, I32)?,
            Operator::I32GtS => t.on_binary_expr(O::I32GtS, I32, I32, I32)?,
            Operator::I32GtU => t.on_binary_expr(O::I32GtU, I32, I32, I32)?,
            Operator::I32LeS => t.on_binary_expr(O::I32LeS, I32, I32, I32)?,
            Operator::I32LeU => t.on_binary_expr(O::I32LeU, I32, I32, I32)?,
            Operator::I32GeS => t.on_binary_expr(O::I32GeS, I32, I32, I32)?,
            Operator::I32GeU => t.on_binary_expr(O::I32GeU, I32, I32, I32)?,

            // i64 comparisons
            Operator::I64Eqz => t.on_unary_expr(O::I64Eqz, I64, I32)?,
            Operator::I64Eq => t.on_binary_expr(O::I64Eq, I64, I64, I32)?,
            Operator::I64Ne => t.on_binary_expr(O::I64Ne, I64, I64, I32)?,
            Operator::I64LtS => t.on_binary_expr(O::I64LtS, I64, I64, I32)?,
            Operator::I64LtU => t.on_binary_expr(O::I64LtU, I64, I64, I32)?,
            Operator::I64GtS => t.on_binary_expr(O::I64GtS, I64, I64, I32)?,
            Operator::I64GtU => t.on_binary_expr(O::I64GtU, I64, I64, I32)?,
            Operator::I64LeS => t.on_binary_expr(O::I64LeS, I64, I64, I32)?,
            Operator::I64LeU => t.on_binary_expr(O::I64LeU, I64, I64, I32)?,
            Operator::I64GeS => t.on_binary_expr(O::I64GeS, I64, I64, I32)?,
            Operator::I64GeU => t.on_binary_expr(O::I64GeU, I64, I64, I32)?,

            // f32 comparisons
            Operator::F32Eq => t.on_binary_expr(O::F32Eq, F32, F32, I32)?,
            Operator::F32Ne => t.on_binary_expr(O::F32Ne, F32, F32, I32)?,
            Operator::F32Lt => t.on_binary_expr(O::F32Lt, F32, F32, I32)?,
            Operator::F32Gt => t.on_binary_expr(O::F32Gt, F32, F32, I32)?,
            Operator::F32Le => t.on_binary_expr(O::F32Le, F32, F32, I32)?,
            Operator::F32Ge => t.on_binary_expr(O::F32Ge, F32, F32, I32)?,

            // f64 comparisons
            Operator::F64Eq => t.on_binary_expr(O::F64Eq, F64, F64, I32)?,
            Operator::F64Ne => t.on_binary_expr(O::F64Ne, F64, F64, I32)?,
            Operator::F64Lt => t.on_binary_expr(O::F64Lt, F64, F64, I32)?,
            Operator::F64Gt => t.on_binary_expr(O::F64Gt, F64, F64, I32)?,
            Operator::F64Le => t.on_binary_expr(O::F64Le, F64, F64, I32)?,
            Operator::F64Ge => t.on_binary_expr(O::F64Ge, F64, F64, I32)?,

            // i32 arithmetic
            Operator::I32Clz => t.on_unary_expr(O::I32Clz, I32, I32)?,
            Operator::I32Ctz => t.on_unary_expr(O::I32Ctz, I32, I32)?,
            Operator::I32Popcnt => t.on_unary_expr(O::I32Popcnt, I32, I32)?,
            Operator::I32Add => t.on_binary_expr(O::I32Add, I32, I32, I32)?,
            Operator::I32Sub => t.on_binary_expr(O::I32Sub, I32, I32, I32)?,
            Operator::I32Mul => t.on_binary_expr(O::I32Mul, I32, I32, I32)?,
            Operator::I32DivS => t.on_binary_expr(O::I32DivS, I32, I32, I32)?,
            Operator::I32DivU => t.on_binary_expr(O::I32DivU, I32, I32, I32)?,
            Operator::I32RemS => t.on_binary_expr(O::I32RemS, I32, I32, I32)?,
            Operator::I32RemU => t.on_binary_expr(O::I32RemU, I32, I32, I32)?,
            Operator::I32And => t.on_binary_expr(O::I32And, I32, I32, I32)?,
            Operator::I32Or => t.on_binary_expr(O::I32Or, I32, I32, I32)?,
            Operator::I32Xor => t.on_binary_expr(O::I32Xor, I32, I32, I32)?,
            Operator::I32Shl => t.on_binary_expr(O::I32Shl, I32, I32, I32)?,
            Operator::I32ShrS => t.on_binary_expr(O::I32ShrS, I32, I32, I32)?,
            Operator::I32ShrU => t.on_binary_expr(O::I32ShrU, I32, I32, I32)?,
            Operator::I32Rotl => t.on_binary_expr(O::I32Rotl, I32, I32, I32)?,
            Operator::I32Rotr => t.on_binary_expr(O::I32Rotr, I32, I32, I32)?,

            // i64 arithmetic
            Operator::I64Clz => t.on_unary_expr(O::I64Clz, I64, I64)?,
            Operator::I64Ctz => t.on_unary_expr(O::I64Ctz, I64, I64)?,
            Operator::I64Popcnt => t.on_unary_expr(O::I64Popcnt, I64, I64)?,
            Operator::I64Add => t.on_binary_expr(O::I64Add, I64, I64, I64)?,
            Operator::I64Sub => t.on_binary_expr(O::I64Sub, I64, I64, I64)?,
            Operator::I64Mul => t.on_binary_expr(O::I64Mul, I64, I64, I64)?,
            Operator::I64DivS => t.on_binary_expr(O::I64DivS, I64, I64, I64)?,
            Operator::I64DivU => t.on_binary_expr(O::I64DivU, I64, I64, I64)?,
            Operator::I64RemS => t.on_binary_expr(O::I64RemS, I64, I64, I64)?,
            Operator::I64RemU => t.on_binary_expr(O::I64RemU, I64, I64, I64)?,
            Operator::I64And => t.on_binary_expr(O::I64And, I64, I64, I64)?,
            Operator::I64Or => t.on_binary_expr(O::I64Or, I64, I64, I64)?,
            Operator::I64Xor => t.on_binary_expr(O::I64Xor, I64, I64, I64)?,
            Operator::I64Shl => t.on_binary_expr(O::I64Shl, I64, I64, I64)?,
            Operator::I64ShrS => t.on_binary_expr(O::I64ShrS, I64, I64, I64)?,
            Operator::I64ShrU => t.on_binary_expr(O::I64ShrU, I64, I64, I64)?,
            Operator::I64Rotl => t.on_binary_expr(O::I64Rotl, I64, I64, I64)?,
            Operator::I64Rotr => t.on_binary_expr(O::I64Rotr, I64, I64, I64)?,

            // f32 arithmetic
            Operator::F32Abs => t.on_unary_expr(O::F32Abs, F32, F32)?,
            Operator::F32Neg => t.on_unary_expr(O::F32Neg, F32, F32)?,
            Operator::F32Ceil => t.on_unary_expr(O::F32Ceil, F32, F32)?,
            Operator::F32Floor => t.on_unary_expr(O::F32Floor, F32, F32)?,
            Operator::F32Trunc => t.on_unary_expr(O::F32Trunc, F32, F32)?,
            Operator::F32Nearest => t.on_unary_expr(O::F32Nearest, F32, F32)?,
            Operator::F32Sqrt => t.on_unary_expr(O::F32Sqrt, F32, F32)?,
            Operator::F32Add => t.on_binary_expr(O::F32Add, F32, F32, F32)?,
            Operator::F32Sub => t.on_binary_expr(O::F32Sub, F32, F32, F32)?,
            Operator::F32Mul => t.on_binary_expr(O::F32Mul, F32, F32, F32)?,
            Operator::F32Div => t.on_binary_expr(O::F32Div, F32, F32, F32)?,
            Operator::F32Min => t.on_binary_expr(O::F32Min, F32, F32, F32)?,
            Operator::F32Max => t.on_binary_expr(O::F32Max, F32, F32, F32)?,
            Operator::F32Copysign => t.on_binary_expr(O::F32Copysign, F32, F32, F32)?,

            // f64 arithmetic
            Operator::F64Abs => t.on_unary_expr(O::F64Abs, F64, F64)?,
            Operator::F64Neg => t.on_unary_expr(O::F64Neg, F64, F64)?,
            Operator::F64Ceil => t.on_unary_expr(O::F64Ceil, F64, F64)?,
            Operator::F64Floor => t.on_unary_expr(O::F64Floor, F64, F64)?,
            Operator::F64Trunc => t.on_unary_expr(O::F64Trunc, F64, F64)?,
            Operator::F64Nearest => t.on_unary_expr(O::F64Nearest, F64, F64)?,
            Operator::F64Sqrt => t.on_unary_expr(O::F64Sqrt, F64, F64)?,
            Operator::F64Add => t.on_binary_expr(O::F64Add, F64, F64, F64)?,
            Operator::F64Sub => t.on_binary_expr(O::F64Sub, F64, F64, F64)?,
            Operator::F64Mul => t.on_binary_expr(O::F64Mul, F64, F64, F64)?,
            Operator::F64Div => t.on_binary_expr(O::F64Div, F64, F64, F64)?,
            Operator::F64Min => t.on_binary_expr(O::F64Min, F64, F64, F64)?,
            Operator::F64Max => t.on_binary_expr(O::F64Max, F64, F64, F64)?,
            Operator::F64Copysign => t.on_binary_expr(O::F64Copysign, F64, F64, F64)?,

            // Conversions
            Operator::I32WrapI64 => t.on_unary_expr(O::I32WrapI64, I64, I32)?,
            Operator::I32TruncF32S => t.on_unary_expr(O::I32TruncF32S, F32, I32)?,
            Operator::I32TruncF32U => t.on_unary_expr(O::I32TruncF32U, F32, I32)?,
            Operator::I32TruncF64S => t.on_unary_expr(O::I32TruncF64S, F64, I32)?,
            Operator::I32TruncF64U => t.on_unary_expr(O::I32TruncF64U, F64, I32)?,
            Operator::I64ExtendI32S => t.on_unary_expr(O::I64ExtendI32S, I32, I64)?,
            Operator::I64ExtendI32U => t.on_unary_expr(O::I64ExtendI32U, I32, I64)?,
            Operator::I64TruncF32S => t.on_unary_expr(O::I64TruncF32S, F32, I64)?,
            Operator::I64TruncF32U => t.on_unary_expr(O::I64TruncF32U, F32, I64)?,
            Operator::I64TruncF64S => t.on_unary_expr(O::I64TruncF64S, F64, I64)?,
            Operator::I64TruncF64U => t.on_unary_expr(O::I64TruncF64U, F64, I64)?,
            Operator::F32ConvertI32S => t.on_unary_expr(O::F32ConvertI32S, I32, F32)?,
            Operator::F32ConvertI32U => t.on_unary_expr(O::F32ConvertI32U, I32, F32)?,
            Operator::F32ConvertI64S => t.on_unary_expr(O::F32ConvertI64S, I64, F32)?,
            Operator::F32ConvertI64U => t.on_unary_expr(O::F32ConvertI64U, I64, F32)?,
            Operator::F32DemoteF64 => t.on_unary_expr(O::F32DemoteF64, F64, F32)?,
            Operator::F64ConvertI32S => t.on_unary_expr(O::F64ConvertI32S, I32, F64)?,
            Operator::F64ConvertI32U => t.on_unary_expr(O::F64ConvertI32U, I32, F64)?,
            Operator::F64ConvertI64S => t.on_unary_expr(O::F64ConvertI64S, I64, F64)?,
            Operator::F64ConvertI64U => t.on_unary_expr(O::F64ConvertI64U, I64, F64)?,
            Operator::F64PromoteF32 => t.on_unary_expr(O::F64PromoteF32, F32, F64)?,
            Operator::I32ReinterpretF32 => t.on_unary_expr(O::I32ReinterpretF32, F32, I32)?,
            Operator::I64ReinterpretF64 => t.on_unary_expr(O::I64ReinterpretF64, F64, I64)?,
            Operator::F32ReinterpretI32 => t.on_unary_expr(O::F32ReinterpretI32, I32, F32)?,
            Operator::F64ReinterpretI64 => t.on_unary_expr(O::F64ReinterpretI64, I64, F64)?,

            other => {
                return Err(TranslateError::Unsupported(format!(
                    "unsupported operator: {other:?}"
                )));
            }
        }
        Ok(())
    }
}
