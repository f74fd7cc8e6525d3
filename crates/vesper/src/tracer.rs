//! VM execution tracing hooks.
//!
//! A [`VmTracer`] installed on the Context is called before each opcode
//! dispatch and around call/return transfers. The default is no tracer at
//! all; [`CollectingTracer`] gathers counters that tests use to check
//! properties like "tail recursion runs in constant stack depth".

use std::{cell::RefCell, rc::Rc};

use crate::bytecode::Opcode;

/// Trait for VM execution tracing.
///
/// All methods have default no-op implementations, so implementations only
/// override the hooks they care about.
pub trait VmTracer: std::fmt::Debug {
    /// Called before each opcode dispatch.
    ///
    /// This is the hottest hook — called for every single instruction.
    /// Implementations should be as lightweight as possible.
    fn on_instruction(&mut self, _pc: usize, _op: Opcode, _stack_depth: usize) {}

    /// Called when JMP_CLOSURE transfers into a closure.
    fn on_enter(&mut self, _name: Option<&str>) {}

    /// Called when RETURN_VAL resumes a saved return address.
    fn on_return(&mut self) {}
}

/// Tracer that does nothing; handy as an explicit placeholder.
#[derive(Debug, Default)]
pub struct NoopTracer;

impl VmTracer for NoopTracer {}

/// Counters gathered by [`CollectingTracer`].
#[derive(Debug, Default, Clone)]
pub struct TraceStats {
    /// Total opcodes dispatched.
    pub instructions: usize,
    /// Deepest value stack observed.
    pub max_stack_depth: usize,
    /// Closure transfers observed.
    pub calls: usize,
    /// Return-address resumptions observed.
    pub returns: usize,
}

/// Tracer that accumulates [`TraceStats`] behind a shared handle.
///
/// The Context owns the tracer as a boxed trait object, so the stats live
/// in an `Rc<RefCell<…>>` the host keeps a clone of.
#[derive(Debug, Default)]
pub struct CollectingTracer {
    stats: Rc<RefCell<TraceStats>>,
}

impl CollectingTracer {
    /// Creates a tracer with fresh counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A shared handle to the counters; reads stay valid after the tracer
    /// itself moves into a Context.
    #[must_use]
    pub fn stats(&self) -> Rc<RefCell<TraceStats>> {
        Rc::clone(&self.stats)
    }
}

impl VmTracer for CollectingTracer {
    fn on_instruction(&mut self, _pc: usize, _op: Opcode, stack_depth: usize) {
        let mut stats = self.stats.borrow_mut();
        stats.instructions += 1;
        stats.max_stack_depth = stats.max_stack_depth.max(stack_depth);
    }

    fn on_enter(&mut self, _name: Option<&str>) {
        self.stats.borrow_mut().calls += 1;
    }

    fn on_return(&mut self) {
        self.stats.borrow_mut().returns += 1;
    }
}
