//! Opcode and instruction definitions.

use std::{fmt, rc::Rc};

use strum::{Display, EnumString, IntoStaticStr};

use crate::value::Value;

/// Opcodes of the virtual machine.
///
/// The strum derives give the canonical SCREAMING_SNAKE_CASE names used by
/// the disassembler (`PUSH_CONST`, `JMP_IF_FALSE`, …).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Opcode {
    /// Pseudo-instruction marking a jump target; no-op at run time.
    Label,
    /// Push the constant in `first`.
    PushConst,
    /// Push the local at `(first, second)` = (frame, slot).
    LocalGet,
    /// Store the stack top (no pop) into the local at `(first, second)`.
    LocalSet,
    /// Push the global binding of the symbol in `first` (nil if unbound).
    GlobalGet,
    /// Bind the stack top (no pop) to the symbol in `first`; nil unbinds.
    GlobalSet,
    /// Discard the stack top.
    StackPop,
    /// Push a copy of the stack top.
    Duplicate,
    /// Pop; jump to the label if truthy.
    JmpIfTrue,
    /// Pop; jump to the label if falsy.
    JmpIfFalse,
    /// Unconditional jump to the label.
    JmpToLabel,
    /// Push a return address resuming at the label.
    SaveReturn,
    /// Pop the callee and transfer to it; `first` is the argument count.
    JmpClosure,
    /// Return the stack top through the return address below it, or finish.
    ReturnVal,
    /// Bind exactly `first` arguments into a fresh frame.
    MakeEnv,
    /// Bind `first`−1 fixed arguments and collect the surplus into a list.
    MakeEnvdot,
    /// Instantiate the closure template in `first` over the current environment.
    MakeClosure,
    /// Call the primitive named in `first` with the current argument count.
    CallPrimop,
}

impl Opcode {
    /// True for instructions whose `second` field is rewritten to a resolved
    /// program counter during assembly.
    #[must_use]
    pub fn is_jump(self) -> bool {
        matches!(
            self,
            Self::JmpIfTrue | Self::JmpIfFalse | Self::JmpToLabel | Self::SaveReturn
        )
    }
}

/// One VM instruction: opcode plus two value operands whose meaning depends
/// on the opcode, and an optional debug annotation.
///
/// Jump instructions carry an assembly-time label string in `first`; after
/// assembly `second` holds the resolved integer program-counter target.
#[derive(Debug, Clone)]
pub struct Instruction {
    /// The opcode.
    pub op: Opcode,
    /// First operand.
    pub first: Value,
    /// Second operand.
    pub second: Value,
    /// Optional annotation shown by the disassembler.
    pub debug: Option<Rc<str>>,
}

impl Instruction {
    /// An instruction with no operands.
    #[must_use]
    pub fn nullary(op: Opcode) -> Self {
        Self {
            op,
            first: Value::Nil,
            second: Value::Nil,
            debug: None,
        }
    }

    /// An instruction with one operand.
    #[must_use]
    pub fn unary(op: Opcode, first: Value) -> Self {
        Self {
            op,
            first,
            second: Value::Nil,
            debug: None,
        }
    }

    /// An instruction with both operands.
    #[must_use]
    pub fn binary(op: Opcode, first: Value, second: Value) -> Self {
        Self {
            op,
            first,
            second,
            debug: None,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<12}", self.op.to_string())?;
        if !matches!(self.first, Value::Nil) || !matches!(self.second, Value::Nil) {
            write!(f, " {}", self.first)?;
        }
        if !matches!(self.second, Value::Nil) {
            write!(f, " {}", self.second)?;
        }
        if let Some(debug) = &self.debug {
            write!(f, " ; {debug}")?;
        }
        Ok(())
    }
}
