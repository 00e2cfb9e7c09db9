//! Function-body callbacks: the per-instruction emitter.
//!
//! Each callback validates its preconditions, advances the type checker, and
//! emits the interpreter opcode plus immediates. The ordering between the
//! checker call and the emission matters wherever drop/keep counts or
//! translated local indices are read off the checker's stack height; those
//! spots are commented.

use super::Translator;
use crate::error::{TranslateError, TranslateResult};
use crate::istream::{INVALID_ISTREAM_OFFSET, TABLE_ENTRY_SIZE};
use crate::opcode::Opcode;
use crate::typecheck::LabelKind;
use spindle_env::ValueType;

impl Translator<'_> {
    // === Function prologue and epilogue ===

    /// Start translating the body of module-local function `index`. Records
    /// the entry offset, resolves calls that were waiting on it, and pushes
    /// the implicit function label.
    pub(crate) fn begin_function_body(&mut self, index: u32) -> TranslateResult {
        let env_index = self.translate_func_to_env(index)?;
        let defined_index = self.translate_module_func_to_defined(index)?;
        let entry_offset = self.offset();

        let sig_index = {
            let func = self.env.funcs[env_index as usize]
                .as_defined_mut()
                .ok_or_else(|| {
                    TranslateError::Malformed("code entry for a host function".to_string())
                })?;
            func.offset = entry_offset;
            func.local_decl_count = 0;
            func.local_count = 0;
            func.param_and_local_types.clear();
            func.sig_index
        };

        self.current_func = Some(env_index);
        self.depth_fixups.clear();
        self.label_stack.clear();

        // Calls emitted before this body was reached recorded fixups against
        // the defined-function index; all of them resolve to here.
        if let Some(fixups) = self.func_fixups.get_mut(defined_index as usize) {
            for fixup in std::mem::take(fixups) {
                self.writer.patch_u32(fixup, entry_offset);
            }
        }

        let sig = self.env.sigs[sig_index as usize].clone();
        self.current_func_mut()?
            .param_and_local_types
            .extend_from_slice(&sig.param_types);

        self.tc.begin_function(&sig.result_types);
        // Implicit function label; a branch to it is a return.
        self.push_label(INVALID_ISTREAM_OFFSET, INVALID_ISTREAM_OFFSET);
        Ok(())
    }

    pub(crate) fn end_function_body(&mut self) -> TranslateResult {
        self.fixup_top_label();
        let (drop_count, keep_count) = self.get_return_drop_keep_count()?;
        self.tc.end_function()?;
        self.emit_drop_keep(drop_count, keep_count);
        self.writer.emit_opcode(Opcode::Return);
        self.pop_label();
        self.current_func = None;
        Ok(())
    }

    pub(crate) fn on_local_decl_count(&mut self, count: u32) -> TranslateResult {
        self.current_func_mut()?.local_decl_count = count;
        if count == 0 {
            // No declaration groups will arrive; the prologue still reserves
            // its (empty) local region.
            self.writer.emit_opcode(Opcode::Alloca);
            self.writer.emit_u32(0);
        }
        Ok(())
    }

    pub(crate) fn on_local_decl(
        &mut self,
        decl_index: u32,
        count: u32,
        ty: ValueType,
    ) -> TranslateResult {
        let func = self.current_func_mut()?;
        func.local_count += count;
        for _ in 0..count {
            func.param_and_local_types.push(ty);
        }
        if decl_index + 1 == func.local_decl_count {
            // Last declaration group: reserve stack slots for all locals.
            let local_count = func.local_count;
            self.writer.emit_opcode(Opcode::Alloca);
            self.writer.emit_u32(local_count);
        }
        Ok(())
    }

    // === Structured control flow ===

    pub(crate) fn on_block_expr(&mut self, sig: &[ValueType]) -> TranslateResult {
        self.tc.on_block(sig)?;
        self.push_label(INVALID_ISTREAM_OFFSET, INVALID_ISTREAM_OFFSET);
        Ok(())
    }

    pub(crate) fn on_loop_expr(&mut self, sig: &[ValueType]) -> TranslateResult {
        self.tc.on_loop(sig)?;
        // Branches to a loop jump to its top, which is the current offset.
        self.push_label(self.offset(), INVALID_ISTREAM_OFFSET);
        Ok(())
    }

    pub(crate) fn on_if_expr(&mut self, sig: &[ValueType]) -> TranslateResult {
        self.tc.on_if(sig)?;
        self.writer.emit_opcode(Opcode::BrUnless);
        let fixup_offset = self.offset();
        self.writer.emit_u32(INVALID_ISTREAM_OFFSET);
        self.push_label(INVALID_ISTREAM_OFFSET, fixup_offset);
        Ok(())
    }

    pub(crate) fn on_else_expr(&mut self) -> TranslateResult {
        self.tc.on_else()?;
        // The true arm jumps over the else arm; the if's conditional branch
        // lands just past this jump.
        let fixup_cond_offset = self.top_label_mut().fixup_offset;
        self.writer.emit_opcode(Opcode::Br);
        let fixup_br_offset = self.offset();
        self.top_label_mut().fixup_offset = fixup_br_offset;
        self.writer.emit_u32(INVALID_ISTREAM_OFFSET);
        let here = self.offset();
        self.writer.patch_u32(fixup_cond_offset, here);
        Ok(())
    }

    pub(crate) fn on_end_expr(&mut self) -> TranslateResult {
        let label_kind = self.tc.get_label(0)?.kind;
        self.tc.on_end()?;
        if label_kind == LabelKind::If || label_kind == LabelKind::Else {
            let fixup = self.top_label_mut().fixup_offset;
            let here = self.offset();
            self.writer.patch_u32(fixup, here);
        }
        self.fixup_top_label();
        self.pop_label();
        Ok(())
    }

    pub(crate) fn on_br_expr(&mut self, depth: u32) -> TranslateResult {
        // Counts read the pre-branch stack; the checker then validates and
        // marks the code unreachable.
        let (drop_count, keep_count) = self.get_br_drop_keep_count(depth)?;
        self.tc.on_br(depth)?;
        self.emit_br(depth, drop_count, keep_count);
        Ok(())
    }

    pub(crate) fn on_br_if_expr(&mut self, depth: u32) -> TranslateResult {
        // The condition pops before the counts are taken.
        self.tc.on_br_if(depth)?;
        let (drop_count, keep_count) = self.get_br_drop_keep_count(depth)?;
        // Flipped so a true condition falls into the drop-keep + branch and a
        // false condition skips past them.
        self.writer.emit_opcode(Opcode::BrUnless);
        let fixup_br_offset = self.offset();
        self.writer.emit_u32(INVALID_ISTREAM_OFFSET);
        self.emit_br(depth, drop_count, keep_count);
        let here = self.offset();
        self.writer.patch_u32(fixup_br_offset, here);
        Ok(())
    }

    pub(crate) fn on_br_table_expr(
        &mut self,
        target_depths: &[u32],
        default_depth: u32,
    ) -> TranslateResult {
        let num_targets = target_depths.len() as u32;
        self.tc.begin_br_table()?;
        self.writer.emit_opcode(Opcode::BrTable);
        self.writer.emit_u32(num_targets);
        let fixup_table_offset = self.offset();
        self.writer.emit_u32(INVALID_ISTREAM_OFFSET);
        // The payload length marker is for disassemblers; the interpreter
        // jumps straight to the table via the patched offset.
        self.writer.emit_opcode(Opcode::Data);
        self.writer.emit_u32((num_targets + 1) * TABLE_ENTRY_SIZE);
        let table_start = self.offset();
        self.writer.patch_u32(fixup_table_offset, table_start);

        for i in 0..=num_targets as usize {
            let depth = if i != num_targets as usize {
                target_depths[i]
            } else {
                default_depth
            };
            self.tc.on_br_table_target(depth)?;
            self.emit_br_table_offset(depth)?;
        }

        self.tc.end_br_table()?;
        Ok(())
    }

    pub(crate) fn on_return_expr(&mut self) -> TranslateResult {
        let (drop_count, keep_count) = self.get_return_drop_keep_count()?;
        self.tc.on_return()?;
        self.emit_drop_keep(drop_count, keep_count);
        self.writer.emit_opcode(Opcode::Return);
        Ok(())
    }

    pub(crate) fn on_unreachable_expr(&mut self) -> TranslateResult {
        self.tc.on_unreachable()?;
        self.writer.emit_opcode(Opcode::Unreachable);
        Ok(())
    }

    pub(crate) fn on_nop_expr(&mut self) -> TranslateResult {
        Ok(())
    }

    // === Calls ===

    pub(crate) fn on_call_expr(&mut self, func_index: u32) -> TranslateResult {
        let env_index = self.translate_func_to_env(func_index)?;
        let func = &self.env.funcs[env_index as usize];
        let is_host = func.is_host();
        let callee_offset = func.as_defined().map(|f| f.offset);
        let sig = self.env.sigs[func.sig_index() as usize].clone();
        self.tc.on_call(&sig.param_types, &sig.result_types)?;

        if is_host {
            self.writer.emit_opcode(Opcode::CallHost);
            self.writer.emit_u32(env_index);
        } else {
            self.writer.emit_opcode(Opcode::Call);
            // callee_offset is Some for defined functions by construction.
            self.emit_func_offset(
                func_index,
                callee_offset.unwrap_or(INVALID_ISTREAM_OFFSET),
            )?;
        }
        Ok(())
    }

    pub(crate) fn on_call_indirect_expr(&mut self, sig_index: u32) -> TranslateResult {
        let table_index = self.module().table_index.ok_or(TranslateError::MissingTable)?;
        let sig_env_index = self.translate_sig_to_env(sig_index)?;
        let sig = self.env.sigs[sig_env_index as usize].clone();
        self.tc
            .on_call_indirect(&sig.param_types, &sig.result_types)?;

        self.writer.emit_opcode(Opcode::CallIndirect);
        self.writer.emit_u32(table_index);
        self.writer.emit_u32(sig_env_index);
        Ok(())
    }

    // === Locals and globals ===

    /// Locals live below the operand stack in the interpreter's value stack
    /// frame, so the emitted index counts down from the top of the combined
    /// operand+locals region.
    fn translate_local_index(&self, local_index: u32) -> TranslateResult<u32> {
        let param_and_local_count = self.current_func()?.param_and_local_types.len() as u32;
        Ok(self.tc.type_stack_height() as u32 + param_and_local_count - local_index)
    }

    fn local_type(&self, local_index: u32) -> TranslateResult<ValueType> {
        Ok(self.current_func()?.param_and_local_types[local_index as usize])
    }

    pub(crate) fn on_get_local_expr(&mut self, local_index: u32) -> TranslateResult {
        self.check_local(local_index)?;
        let ty = self.local_type(local_index)?;
        // Translate before the checker pushes: the index is relative to the
        // stack height the interpreter sees before the get executes.
        let translated = self.translate_local_index(local_index)?;
        self.tc.on_get_local(ty)?;
        self.writer.emit_opcode(Opcode::GetLocal);
        self.writer.emit_u32(translated);
        Ok(())
    }

    pub(crate) fn on_set_local_expr(&mut self, local_index: u32) -> TranslateResult {
        self.check_local(local_index)?;
        let ty = self.local_type(local_index)?;
        // Translate after the pop: the set executes with the operand already
        // consumed.
        self.tc.on_set_local(ty)?;
        let translated = self.translate_local_index(local_index)?;
        self.writer.emit_opcode(Opcode::SetLocal);
        self.writer.emit_u32(translated);
        Ok(())
    }

    pub(crate) fn on_tee_local_expr(&mut self, local_index: u32) -> TranslateResult {
        self.check_local(local_index)?;
        let ty = self.local_type(local_index)?;
        // Height is unchanged by tee; translate up front for uniformity.
        let translated = self.translate_local_index(local_index)?;
        self.tc.on_tee_local(ty)?;
        self.writer.emit_opcode(Opcode::TeeLocal);
        self.writer.emit_u32(translated);
        Ok(())
    }

    pub(crate) fn on_get_global_expr(&mut self, global_index: u32) -> TranslateResult {
        self.check_global(global_index)?;
        let env_index = self.translate_global_to_env(global_index)?;
        let ty = self.env.globals[env_index as usize].ty;
        self.tc.on_get_global(ty)?;
        self.writer.emit_opcode(Opcode::GetGlobal);
        self.writer.emit_u32(env_index);
        Ok(())
    }

    pub(crate) fn on_set_global_expr(&mut self, global_index: u32) -> TranslateResult {
        self.check_global(global_index)?;
        let env_index = self.translate_global_to_env(global_index)?;
        let global = &self.env.globals[env_index as usize];
        if !global.mutable {
            return Err(TranslateError::ImmutableGlobalWrite {
                index: global_index,
            });
        }
        self.tc.on_set_global(global.ty)?;
        self.writer.emit_opcode(Opcode::SetGlobal);
        self.writer.emit_u32(env_index);
        Ok(())
    }

    // === Constants ===

    pub(crate) fn on_i32_const_expr(&mut self, value: u32) -> TranslateResult {
        self.tc.on_const(ValueType::I32)?;
        self.writer.emit_opcode(Opcode::I32Const);
        self.writer.emit_u32(value);
        Ok(())
    }

    pub(crate) fn on_i64_const_expr(&mut self, value: u64) -> TranslateResult {
        self.tc.on_const(ValueType::I64)?;
        self.writer.emit_opcode(Opcode::I64Const);
        self.writer.emit_u64(value);
        Ok(())
    }

    pub(crate) fn on_f32_const_expr(&mut self, value_bits: u32) -> TranslateResult {
        self.tc.on_const(ValueType::F32)?;
        self.writer.emit_opcode(Opcode::F32Const);
        self.writer.emit_u32(value_bits);
        Ok(())
    }

    pub(crate) fn on_f64_const_expr(&mut self, value_bits: u64) -> TranslateResult {
        self.tc.on_const(ValueType::F64)?;
        self.writer.emit_opcode(Opcode::F64Const);
        self.writer.emit_u64(value_bits);
        Ok(())
    }

    // === Memory ===

    pub(crate) fn on_load_expr(
        &mut self,
        opcode: Opcode,
        result: ValueType,
        natural_alignment: u32,
        alignment_log2: u32,
        offset: u64,
    ) -> TranslateResult {
        let memory_index = self.check_has_memory(opcode)?;
        self.check_align(alignment_log2, natural_alignment)?;
        let offset = u32::try_from(offset).map_err(|_| {
            TranslateError::Unsupported("64-bit memory offsets not supported".to_string())
        })?;
        self.tc.on_load(result, opcode)?;
        self.writer.emit_opcode(opcode);
        self.writer.emit_u32(memory_index);
        self.writer.emit_u32(offset);
        Ok(())
    }

    pub(crate) fn on_store_expr(
        &mut self,
        opcode: Opcode,
        operand: ValueType,
        natural_alignment: u32,
        alignment_log2: u32,
        offset: u64,
    ) -> TranslateResult {
        let memory_index = self.check_has_memory(opcode)?;
        self.check_align(alignment_log2, natural_alignment)?;
        let offset = u32::try_from(offset).map_err(|_| {
            TranslateError::Unsupported("64-bit memory offsets not supported".to_string())
        })?;
        self.tc.on_store(operand, opcode)?;
        self.writer.emit_opcode(opcode);
        self.writer.emit_u32(memory_index);
        self.writer.emit_u32(offset);
        Ok(())
    }

    pub(crate) fn on_current_memory_expr(&mut self) -> TranslateResult {
        let memory_index = self.check_has_memory(Opcode::CurrentMemory)?;
        self.tc.on_current_memory()?;
        self.writer.emit_opcode(Opcode::CurrentMemory);
        self.writer.emit_u32(memory_index);
        Ok(())
    }

    pub(crate) fn on_grow_memory_expr(&mut self) -> TranslateResult {
        let memory_index = self.check_has_memory(Opcode::GrowMemory)?;
        self.tc.on_grow_memory()?;
        self.writer.emit_opcode(Opcode::GrowMemory);
        self.writer.emit_u32(memory_index);
        Ok(())
    }

    // === Plain operators ===

    pub(crate) fn on_unary_expr(
        &mut self,
        opcode: Opcode,
        operand: ValueType,
        result: ValueType,
    ) -> TranslateResult {
        self.tc.on_unary(operand, result, opcode)?;
        self.writer.emit_opcode(opcode);
        Ok(())
    }

    pub(crate) fn on_binary_expr(
        &mut self,
        opcode: Opcode,
        lhs: ValueType,
        rhs: ValueType,
        result: ValueType,
    ) -> TranslateResult {
        self.tc.on_binary(lhs, rhs, result, opcode)?;
        self.writer.emit_opcode(opcode);
        Ok(())
    }

    pub(crate) fn on_drop_expr(&mut self) -> TranslateResult {
        self.tc.on_drop()?;
        self.writer.emit_opcode(Opcode::Drop);
        Ok(())
    }

    pub(crate) fn on_select_expr(&mut self) -> TranslateResult {
        self.tc.on_select()?;
        self.writer.emit_opcode(Opcode::Select);
        Ok(())
    }
}
