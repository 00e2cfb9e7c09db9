//! Emission helpers: drop/keep lowering, the label stack, and fixups.

use super::{Label, Translator};
use crate::error::TranslateResult;
use crate::istream::INVALID_ISTREAM_OFFSET;
use crate::opcode::Opcode;

impl Translator<'_> {
    pub(crate) fn offset(&self) -> u32 {
        self.writer.offset()
    }

    // === Labels ===

    pub(crate) fn push_label(&mut self, offset: u32, fixup_offset: u32) {
        self.label_stack.push(Label {
            offset,
            fixup_offset,
        });
    }

    /// Pop the top label. `depth_fixups` may have grown past the label stack
    /// (a fixup list can exist before its label is pushed) but must not
    /// outlive the label, so it is truncated alongside.
    pub(crate) fn pop_label(&mut self) {
        self.label_stack.pop();
        if self.depth_fixups.len() > self.label_stack.len() {
            self.depth_fixups.truncate(self.label_stack.len());
        }
    }

    pub(crate) fn label(&self, depth: u32) -> Label {
        self.label_stack[self.label_stack.len() - depth as usize - 1]
    }

    pub(crate) fn top_label_mut(&mut self) -> &mut Label {
        let top = self.label_stack.len() - 1;
        &mut self.label_stack[top]
    }

    // === Fixups ===

    /// Record the current offset as a pending patch site in `fixups[index]`.
    fn append_fixup(fixups: &mut Vec<Vec<u32>>, index: usize, offset: u32) {
        if index >= fixups.len() {
            fixups.resize(index + 1, Vec::new());
        }
        fixups[index].push(offset);
    }

    /// Emit a 4-byte branch target. If the target is still unresolved, record
    /// a fixup keyed by the absolute depth of the label (0 = function root);
    /// the sentinel is overwritten when the label resolves.
    pub(crate) fn emit_br_offset(&mut self, depth: u32, offset: u32) {
        if offset == INVALID_ISTREAM_OFFSET {
            let abs_depth = self.label_stack.len() - 1 - depth as usize;
            let at = self.offset();
            Self::append_fixup(&mut self.depth_fixups, abs_depth, at);
        }
        self.writer.emit_u32(offset);
    }

    /// The top label's target is now the current offset: patch every branch
    /// that was emitted against it.
    pub(crate) fn fixup_top_label(&mut self) {
        let offset = self.offset();
        let Some(top) = self.label_stack.len().checked_sub(1) else {
            return;
        };
        if top >= self.depth_fixups.len() {
            return;
        }
        for fixup in std::mem::take(&mut self.depth_fixups[top]) {
            self.writer.patch_u32(fixup, offset);
        }
    }

    /// Emit a 4-byte callee entry offset. If the callee's body has not been
    /// translated yet, record a fixup keyed by its defined-function index.
    /// An unresolved offset can only belong to a function of this module, so
    /// the defined-index translation only happens on that path.
    pub(crate) fn emit_func_offset(
        &mut self,
        func_index: u32,
        callee_offset: u32,
    ) -> crate::error::TranslateResult {
        if callee_offset == INVALID_ISTREAM_OFFSET {
            let defined_index = self.translate_module_func_to_defined(func_index)?;
            let at = self.offset();
            Self::append_fixup(&mut self.func_fixups, defined_index as usize, at);
        }
        self.writer.emit_u32(callee_offset);
        Ok(())
    }

    // === Drop/keep accounting ===

    /// Stack-effect counts for a branch to `depth`: how many operand slots
    /// to discard and how many result slots to carry. In unreachable code the
    /// stack height is formally bottom, so the drop count is forced to zero.
    pub(crate) fn get_br_drop_keep_count(&self, depth: u32) -> TranslateResult<(u32, u32)> {
        let label = self.tc.get_label(depth)?;
        let keep_count = label.br_sig().len() as u32;
        let drop_count = if self.tc.is_unreachable() {
            0
        } else {
            // The checker validates the branch right after this and fails the
            // callback before anything is emitted, so saturation never leaks
            // into the stream.
            (self.tc.type_stack_height() as u32)
                .saturating_sub(label.type_stack_limit as u32)
                .saturating_sub(keep_count)
        };
        Ok((drop_count, keep_count))
    }

    /// Drop/keep for a return: the outermost label's counts, plus the
    /// function's params and locals, which live below the operand stack and
    /// must be popped on the way out.
    pub(crate) fn get_return_drop_keep_count(&self) -> TranslateResult<(u32, u32)> {
        let depth = (self.label_stack.len() as u32)
            .checked_sub(1)
            .ok_or_else(|| {
                crate::error::TranslateError::Malformed(
                    "function body closed more labels than it opened".to_string(),
                )
            })?;
        let (mut drop_count, keep_count) = self.get_br_drop_keep_count(depth)?;
        drop_count += self.current_func()?.param_and_local_types.len() as u32;
        Ok((drop_count, keep_count))
    }

    /// Lower a drop/keep pair. `keep` is at most 1 in the MVP.
    pub(crate) fn emit_drop_keep(&mut self, drop: u32, keep: u32) {
        debug_assert!(keep <= 1);
        debug_assert!(drop != u32::MAX);
        if drop == 0 {
            return;
        }
        if drop == 1 && keep == 0 {
            self.writer.emit_opcode(Opcode::Drop);
        } else {
            self.writer.emit_opcode(Opcode::DropKeep);
            self.writer.emit_u32(drop);
            self.writer.emit_u8(keep as u8);
        }
    }

    /// Drop/keep, then `Br` with its (possibly pending) target.
    pub(crate) fn emit_br(&mut self, depth: u32, drop_count: u32, keep_count: u32) {
        self.emit_drop_keep(drop_count, keep_count);
        self.writer.emit_opcode(Opcode::Br);
        self.emit_br_offset(depth, self.label(depth).offset);
    }

    /// One br_table payload entry: target, drop count, keep count.
    pub(crate) fn emit_br_table_offset(&mut self, depth: u32) -> TranslateResult {
        let (drop_count, keep_count) = self.get_br_drop_keep_count(depth)?;
        self.emit_br_offset(depth, self.label(depth).offset);
        self.writer.emit_u32(drop_count);
        self.writer.emit_u8(keep_count as u8);
        Ok(())
    }
}
