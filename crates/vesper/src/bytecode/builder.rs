//! Builder for emitting instructions during compilation.
//!
//! The compiler emits jumps against label strings; `assemble` indexes the
//! LABEL pseudo-instructions and rewrites every jump's `second` field to the
//! resolved integer program counter. Labels are retained in the output so
//! instruction indices stay stable between assembly and execution.

use std::rc::Rc;

use ahash::AHashMap;

use super::op::{Instruction, Opcode};
use crate::{error::CompileError, value::Value};

/// Accumulates instructions for one code block.
#[derive(Debug, Default)]
pub(crate) struct CodeBuilder {
    instructions: Vec<Instruction>,
}

impl CodeBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an instruction.
    pub fn emit(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    /// Appends a LABEL pseudo-instruction for `label`.
    pub fn emit_label(&mut self, label: &Rc<str>) {
        self.emit(Instruction::unary(Opcode::Label, Value::Str(Rc::clone(label))));
    }

    /// Appends a jump instruction targeting `label`.
    pub fn emit_jump(&mut self, op: Opcode, label: &Rc<str>) {
        debug_assert!(op.is_jump());
        self.emit(Instruction::unary(op, Value::Str(Rc::clone(label))));
    }

    /// Resolves labels and returns the finished instruction list.
    ///
    /// Every jump's `second` field is rewritten to the integer program
    /// counter of its target label; a jump to a label that was never
    /// emitted is a compile error.
    pub fn assemble(self) -> Result<Vec<Instruction>, CompileError> {
        let mut targets: AHashMap<Rc<str>, usize> = AHashMap::new();
        for (pc, instruction) in self.instructions.iter().enumerate() {
            if instruction.op == Opcode::Label
                && let Value::Str(name) = &instruction.first
            {
                targets.insert(Rc::clone(name), pc);
            }
        }
        let mut instructions = self.instructions;
        for instruction in &mut instructions {
            if !instruction.op.is_jump() {
                continue;
            }
            let Value::Str(name) = &instruction.first else {
                continue;
            };
            let Some(&target) = targets.get(name) else {
                return Err(CompileError::UnresolvedLabel(name.to_string()));
            };
            instruction.second = Value::Int(i32::try_from(target).expect("code block exceeds i32 instructions"));
        }
        Ok(instructions)
    }
}
