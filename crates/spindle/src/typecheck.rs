//! The stack-polymorphic type checker for function bodies.
//!
//! The checker simulates WebAssembly's operand stack one instruction at a
//! time. Each structured construct (the implicit function body, `block`,
//! `loop`, `if`, `else`) owns a [`Label`] recording its result signature and
//! the stack height at entry (`type_stack_limit`). After a `br`, `return`,
//! `br_table`, or `unreachable` the current label enters unreachable mode:
//! the stack is truncated to the label's limit and pops below the limit
//! produce the polymorphic `any` type, which matches everything.
//!
//! The translator drives the checker in lockstep with code emission and also
//! reads it back: the stack height and per-label limits feed the drop/keep
//! accounting that lowers structured branches onto the flat istream.

use crate::opcode::Opcode;
use spindle_env::ValueType;
use std::fmt;

/// What kind of construct a label belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelKind {
    Func,
    Block,
    Loop,
    If,
    Else,
}

/// One entry of the checker's label stack.
#[derive(Debug, Clone)]
pub struct Label {
    pub kind: LabelKind,
    /// Result types of the construct.
    pub sig: Vec<ValueType>,
    /// Operand stack height when the construct was entered.
    pub type_stack_limit: usize,
    /// Set once control past this point cannot be reached.
    pub unreachable: bool,
}

impl Label {
    /// The types a branch to this label carries: a branch to a loop jumps to
    /// its top and carries nothing, every other label carries its results.
    pub fn br_sig(&self) -> &[ValueType] {
        if self.kind == LabelKind::Loop {
            &[]
        } else {
            &self.sig
        }
    }
}

/// A type checking failure; rendered verbatim into the translation error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcError(pub String);

impl fmt::Display for TcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

type TcResult = Result<(), TcError>;

/// A slot on the simulated operand stack; `None` is the polymorphic `any`
/// produced in unreachable code.
type StackType = Option<ValueType>;

#[derive(Debug, Default)]
pub struct TypeChecker {
    type_stack: Vec<StackType>,
    label_stack: Vec<Label>,
    /// Branch signature of the first br_table target; every other target
    /// must agree.
    br_table_sig: Option<Vec<ValueType>>,
}

impl TypeChecker {
    pub fn new() -> TypeChecker {
        TypeChecker::default()
    }

    /// Current operand stack height, including polymorphic slots.
    pub fn type_stack_height(&self) -> usize {
        self.type_stack.len()
    }

    /// Whether the innermost label is in unreachable mode.
    pub fn is_unreachable(&self) -> bool {
        self.label_stack.last().is_some_and(|l| l.unreachable)
    }

    /// Label at `depth` (0 = innermost).
    pub fn get_label(&self, depth: u32) -> Result<&Label, TcError> {
        let len = self.label_stack.len();
        if (depth as usize) < len {
            Ok(&self.label_stack[len - depth as usize - 1])
        } else {
            Err(TcError(format!("invalid depth: {depth} (max {len})")))
        }
    }

    fn top_label(&self) -> Result<&Label, TcError> {
        self.get_label(0)
    }

    fn top_label_mut(&mut self) -> Result<&mut Label, TcError> {
        self.label_stack
            .last_mut()
            .ok_or_else(|| TcError("label stack empty".to_string()))
    }

    fn push_label(&mut self, kind: LabelKind, sig: Vec<ValueType>) {
        self.label_stack.push(Label {
            kind,
            sig,
            type_stack_limit: self.type_stack.len(),
            unreachable: false,
        });
    }

    fn set_unreachable(&mut self) -> TcResult {
        let label = self.top_label_mut()?;
        label.unreachable = true;
        let limit = label.type_stack_limit;
        self.type_stack.truncate(limit);
        Ok(())
    }

    fn push_type(&mut self, ty: StackType) {
        self.type_stack.push(ty);
    }

    fn push_types(&mut self, sig: &[ValueType]) {
        for &ty in sig {
            self.push_type(Some(ty));
        }
    }

    /// Type at `depth` slots below the top; `any` below the limit of an
    /// unreachable label, an underflow error below the limit otherwise.
    fn peek_type(&self, depth: usize, desc: &str) -> Result<StackType, TcError> {
        let label = self.top_label()?;
        if self.type_stack.len() <= label.type_stack_limit + depth {
            if label.unreachable {
                Ok(None)
            } else {
                Err(TcError(format!("type stack underflow in {desc}")))
            }
        } else {
            Ok(self.type_stack[self.type_stack.len() - depth - 1])
        }
    }

    fn check_type(actual: StackType, expected: ValueType, desc: &str) -> TcResult {
        match actual {
            None => Ok(()),
            Some(ty) if ty == expected => Ok(()),
            Some(ty) => Err(TcError(format!(
                "type mismatch in {desc}, expected {expected} but got {ty}"
            ))),
        }
    }

    fn peek_and_check(&self, depth: usize, expected: ValueType, desc: &str) -> TcResult {
        Self::check_type(self.peek_type(depth, desc)?, expected, desc)
    }

    /// Remove `count` slots, stopping at an unreachable label's limit.
    fn drop_types(&mut self, count: usize, desc: &str) -> TcResult {
        let label = self.top_label()?;
        let limit = label.type_stack_limit;
        if self.type_stack.len() < limit + count {
            if label.unreachable {
                self.type_stack.truncate(limit);
                return Ok(());
            }
            return Err(TcError(format!("type stack underflow in {desc}")));
        }
        let new_len = self.type_stack.len() - count;
        self.type_stack.truncate(new_len);
        Ok(())
    }

    fn pop_and_check_1(&mut self, expected: ValueType, desc: &str) -> TcResult {
        self.peek_and_check(0, expected, desc)?;
        self.drop_types(1, desc)
    }

    fn pop_and_check_2(&mut self, e1: ValueType, e2: ValueType, desc: &str) -> TcResult {
        self.peek_and_check(1, e1, desc)?;
        self.peek_and_check(0, e2, desc)?;
        self.drop_types(2, desc)
    }

    /// Check the signature's types are on top of the stack without popping.
    fn check_signature(&self, sig: &[ValueType], desc: &str) -> TcResult {
        for (i, &ty) in sig.iter().enumerate() {
            self.peek_and_check(sig.len() - i - 1, ty, desc)?;
        }
        Ok(())
    }

    fn pop_and_check_signature(&mut self, sig: &[ValueType], desc: &str) -> TcResult {
        self.check_signature(sig, desc)?;
        self.drop_types(sig.len(), desc)
    }

    /// Close the innermost label: its results must be exactly what is on the
    /// stack above its limit; they are replaced by the label's signature for
    /// the enclosing scope.
    fn end_label(&mut self, desc: &str) -> TcResult {
        let label = self.top_label()?.clone();
        self.pop_and_check_signature(&label.sig, desc)?;
        if self.type_stack.len() != label.type_stack_limit {
            return Err(TcError(format!(
                "type stack at end of {} is {}, expected {}",
                desc,
                self.type_stack.len(),
                label.type_stack_limit
            )));
        }
        self.push_types(&label.sig);
        self.label_stack.pop();
        Ok(())
    }

    fn label_desc(kind: LabelKind) -> &'static str {
        match kind {
            LabelKind::Func => "function",
            LabelKind::Block => "block",
            LabelKind::Loop => "loop",
            LabelKind::If => "if true branch",
            LabelKind::Else => "if false branch",
        }
    }

    pub fn begin_function(&mut self, result_types: &[ValueType]) {
        self.type_stack.clear();
        self.label_stack.clear();
        self.br_table_sig = None;
        self.push_label(LabelKind::Func, result_types.to_vec());
    }

    pub fn end_function(&mut self) -> TcResult {
        if self.top_label()?.kind != LabelKind::Func {
            return Err(TcError("unexpected end of function".to_string()));
        }
        self.end_label("function")
    }

    pub fn on_block(&mut self, sig: &[ValueType]) -> TcResult {
        self.push_label(LabelKind::Block, sig.to_vec());
        Ok(())
    }

    pub fn on_loop(&mut self, sig: &[ValueType]) -> TcResult {
        self.push_label(LabelKind::Loop, sig.to_vec());
        Ok(())
    }

    pub fn on_if(&mut self, sig: &[ValueType]) -> TcResult {
        self.pop_and_check_1(ValueType::I32, "if")?;
        self.push_label(LabelKind::If, sig.to_vec());
        Ok(())
    }

    pub fn on_else(&mut self) -> TcResult {
        let label = self.top_label()?.clone();
        if label.kind != LabelKind::If {
            return Err(TcError("unexpected else".to_string()));
        }
        self.pop_and_check_signature(&label.sig, "if true branch")?;
        if self.type_stack.len() != label.type_stack_limit {
            return Err(TcError(format!(
                "type stack at end of if true branch is {}, expected {}",
                self.type_stack.len(),
                label.type_stack_limit
            )));
        }
        let label = self.top_label_mut()?;
        label.kind = LabelKind::Else;
        label.unreachable = false;
        Ok(())
    }

    pub fn on_end(&mut self) -> TcResult {
        let label = self.top_label()?;
        if label.kind == LabelKind::If && !label.sig.is_empty() {
            return Err(TcError(
                "if without else cannot have type signature".to_string(),
            ));
        }
        let desc = Self::label_desc(label.kind);
        self.end_label(desc)
    }

    pub fn on_br(&mut self, depth: u32) -> TcResult {
        let sig = self.get_label(depth)?.br_sig().to_vec();
        self.check_signature(&sig, "br")?;
        self.set_unreachable()
    }

    pub fn on_br_if(&mut self, depth: u32) -> TcResult {
        self.pop_and_check_1(ValueType::I32, "br_if")?;
        let sig = self.get_label(depth)?.br_sig().to_vec();
        // The branch carries the values; the fall-through path keeps them.
        self.pop_and_check_signature(&sig, "br_if")?;
        self.push_types(&sig);
        Ok(())
    }

    pub fn begin_br_table(&mut self) -> TcResult {
        self.br_table_sig = None;
        self.pop_and_check_1(ValueType::I32, "br_table")
    }

    pub fn on_br_table_target(&mut self, depth: u32) -> TcResult {
        let sig = self.get_label(depth)?.br_sig().to_vec();
        match &self.br_table_sig {
            None => self.br_table_sig = Some(sig.clone()),
            Some(expected) if *expected != sig => {
                return Err(TcError(
                    "br_table labels have inconsistent types".to_string(),
                ));
            }
            Some(_) => {}
        }
        self.check_signature(&sig, "br_table")
    }

    pub fn end_br_table(&mut self) -> TcResult {
        self.set_unreachable()
    }

    pub fn on_call(&mut self, param_types: &[ValueType], result_types: &[ValueType]) -> TcResult {
        self.pop_and_check_signature(param_types, "call")?;
        self.push_types(result_types);
        Ok(())
    }

    pub fn on_call_indirect(
        &mut self,
        param_types: &[ValueType],
        result_types: &[ValueType],
    ) -> TcResult {
        self.pop_and_check_1(ValueType::I32, "call_indirect")?;
        self.pop_and_check_signature(param_types, "call_indirect")?;
        self.push_types(result_types);
        Ok(())
    }

    pub fn on_const(&mut self, ty: ValueType) -> TcResult {
        self.push_type(Some(ty));
        Ok(())
    }

    pub fn on_get_local(&mut self, ty: ValueType) -> TcResult {
        self.push_type(Some(ty));
        Ok(())
    }

    pub fn on_set_local(&mut self, ty: ValueType) -> TcResult {
        self.pop_and_check_1(ty, "set_local")
    }

    pub fn on_tee_local(&mut self, ty: ValueType) -> TcResult {
        self.pop_and_check_1(ty, "tee_local")?;
        self.push_type(Some(ty));
        Ok(())
    }

    pub fn on_get_global(&mut self, ty: ValueType) -> TcResult {
        self.push_type(Some(ty));
        Ok(())
    }

    pub fn on_set_global(&mut self, ty: ValueType) -> TcResult {
        self.pop_and_check_1(ty, "set_global")
    }

    pub fn on_unary(&mut self, operand: ValueType, result: ValueType, opcode: Opcode) -> TcResult {
        self.pop_and_check_1(operand, &format!("{opcode:?}"))?;
        self.push_type(Some(result));
        Ok(())
    }

    pub fn on_binary(
        &mut self,
        lhs: ValueType,
        rhs: ValueType,
        result: ValueType,
        opcode: Opcode,
    ) -> TcResult {
        self.pop_and_check_2(lhs, rhs, &format!("{opcode:?}"))?;
        self.push_type(Some(result));
        Ok(())
    }

    pub fn on_load(&mut self, result: ValueType, opcode: Opcode) -> TcResult {
        self.pop_and_check_1(ValueType::I32, &format!("{opcode:?}"))?;
        self.push_type(Some(result));
        Ok(())
    }

    pub fn on_store(&mut self, operand: ValueType, opcode: Opcode) -> TcResult {
        self.pop_and_check_2(ValueType::I32, operand, &format!("{opcode:?}"))
    }

    pub fn on_current_memory(&mut self) -> TcResult {
        self.push_type(Some(ValueType::I32));
        Ok(())
    }

    pub fn on_grow_memory(&mut self) -> TcResult {
        self.pop_and_check_1(ValueType::I32, "memory.grow")?;
        self.push_type(Some(ValueType::I32));
        Ok(())
    }

    pub fn on_drop(&mut self) -> TcResult {
        self.peek_type(0, "drop")?;
        self.drop_types(1, "drop")
    }

    pub fn on_select(&mut self) -> TcResult {
        self.peek_and_check(0, ValueType::I32, "select")?;
        let t1 = self.peek_type(1, "select")?;
        let t2 = self.peek_type(2, "select")?;
        let result = match (t1, t2) {
            (None, other) | (other, None) => other,
            (Some(a), Some(b)) if a == b => Some(a),
            (Some(a), Some(b)) => {
                return Err(TcError(format!(
                    "type mismatch in select, expected {b} but got {a}"
                )));
            }
        };
        self.drop_types(3, "select")?;
        self.push_type(result);
        Ok(())
    }

    pub fn on_return(&mut self) -> TcResult {
        let sig = self
            .label_stack
            .first()
            .ok_or_else(|| TcError("label stack empty".to_string()))?
            .sig
            .clone();
        self.pop_and_check_signature(&sig, "return")?;
        self.set_unreachable()
    }

    pub fn on_unreachable(&mut self) -> TcResult {
        self.set_unreachable()
    }

    #[cfg(test)]
    fn stack_types(&self) -> &[StackType] {
        &self.type_stack
    }
}
