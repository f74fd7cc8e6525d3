//! Handle-addressed store of compiled code blocks.
//!
//! Blocks are append-only so closures can hold stable handles for the life
//! of a Context; removing a block leaves a hole rather than reshuffling.

use std::rc::Rc;

use super::op::Instruction;

/// Stable handle of a code block in a [`CodeStore`].
///
/// Handle 0 is reserved as invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CodeHandle(u32);

impl CodeHandle {
    /// The reserved invalid handle.
    pub const INVALID: Self = Self(0);

    /// Raw value, for diagnostics.
    #[must_use]
    pub fn value(self) -> u32 {
        self.0
    }

    fn index(self) -> usize {
        self.0 as usize
    }
}

/// An assembled instruction sequence with a debug name.
#[derive(Debug, Clone)]
pub struct CodeBlock {
    handle: CodeHandle,
    instructions: Rc<[Instruction]>,
    debug: String,
}

impl CodeBlock {
    /// The block's handle in its store.
    #[must_use]
    pub fn handle(&self) -> CodeHandle {
        self.handle
    }

    /// Shared view of the instructions. The `Rc` lets the VM keep running a
    /// block while the store itself stays mutable (compile-time reentrancy).
    #[must_use]
    pub fn instructions(&self) -> Rc<[Instruction]> {
        Rc::clone(&self.instructions)
    }

    /// The debug name given at registration.
    #[must_use]
    pub fn debug_name(&self) -> &str {
        &self.debug
    }

    /// Pretty-prints the block, one instruction per line with its index.
    #[must_use]
    pub fn disassemble(&self) -> String {
        use std::fmt::Write as _;
        let mut out = format!(";; block {} ({})\n", self.handle.value(), self.debug);
        for (pc, instruction) in self.instructions.iter().enumerate() {
            let _ = writeln!(out, "{pc:4}  {instruction}");
        }
        out
    }
}

/// Handle-indexed vector of code blocks; slot 0 is permanently vacant.
#[derive(Debug, Default)]
pub struct CodeStore {
    blocks: Vec<Option<CodeBlock>>,
}

impl CodeStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self { blocks: vec![None] }
    }

    /// Registers an assembled block and returns its stable handle.
    pub fn register(&mut self, instructions: Vec<Instruction>, debug: String) -> CodeHandle {
        let handle = CodeHandle(u32::try_from(self.blocks.len()).expect("code store exceeds u32"));
        self.blocks.push(Some(CodeBlock {
            handle,
            instructions: Rc::from(instructions),
            debug,
        }));
        handle
    }

    /// Looks up a block by handle.
    #[must_use]
    pub fn get(&self, handle: CodeHandle) -> Option<&CodeBlock> {
        self.blocks.get(handle.index()).and_then(Option::as_ref)
    }

    /// Removes a block, leaving a hole so other handles stay valid.
    pub fn remove(&mut self, handle: CodeHandle) -> Option<CodeBlock> {
        self.blocks.get_mut(handle.index()).and_then(Option::take)
    }

    /// Iterates the live blocks in handle order.
    pub fn iter(&self) -> impl Iterator<Item = &CodeBlock> {
        self.blocks.iter().filter_map(Option::as_ref)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::Opcode;

    #[test]
    fn handles_start_at_one_and_are_stable() {
        let mut store = CodeStore::new();
        let a = store.register(vec![Instruction::nullary(Opcode::ReturnVal)], "a".into());
        let b = store.register(vec![Instruction::nullary(Opcode::ReturnVal)], "b".into());
        assert_eq!(a.value(), 1);
        assert_eq!(b.value(), 2);
        assert!(store.get(CodeHandle::INVALID).is_none());

        store.remove(a);
        assert!(store.get(a).is_none(), "removed block leaves a hole");
        assert_eq!(store.get(b).map(CodeBlock::handle), Some(b), "other handles survive");
    }
}
