//! The stack-based virtual machine.
//!
//! `execute` pushes the arguments, installs the closure's code and
//! environment, and runs the dispatch loop to completion. The loop is flat
//! Rust — recursion into `execute` happens only through primitives (`map`,
//! macro expansion), so tail calls emitted as bare JMP_CLOSURE transfer
//! control without growing either the value stack or the host stack.

use smallvec::SmallVec;

use super::op::{Instruction, Opcode};
use crate::{
    context::Context,
    env::Env,
    error::LanguageError,
    value::{Closure, ReturnAddress, Value},
};
use std::rc::Rc;

/// Runs `closure` on `args` to completion, returning its value.
///
/// Reentrant: primitives and the compiler's macro expansion may call this
/// again on the same Context mid-run.
pub(crate) fn execute(ctx: &mut Context, closure: &Closure, args: &[Value]) -> Result<Value, LanguageError> {
    let code = fetch_code(ctx, closure)?;
    let mut vm = Vm {
        ctx,
        stack: args.to_vec(),
        closure: closure.clone(),
        code,
        pc: 0,
        env: closure.env().cloned(),
        arg_count: args.len(),
    };
    vm.run()
}

fn fetch_code(ctx: &Context, closure: &Closure) -> Result<Rc<[Instruction]>, LanguageError> {
    ctx.code
        .get(closure.code())
        .map(super::code::CodeBlock::instructions)
        .ok_or(LanguageError::InvalidCodeHandle(closure.code().value()))
}

struct Vm<'a> {
    ctx: &'a mut Context,
    stack: Vec<Value>,
    closure: Closure,
    code: Rc<[Instruction]>,
    pc: usize,
    env: Option<Rc<Env>>,
    /// Set by the most recent JMP_CLOSURE (or by `execute` itself); consumed
    /// by MAKE_ENV / MAKE_ENVDOT / CALL_PRIMOP.
    arg_count: usize,
}

impl Vm<'_> {
    fn run(&mut self) -> Result<Value, LanguageError> {
        loop {
            if self.pc >= self.code.len() {
                return Err(LanguageError::RunawayProgram {
                    pc: self.pc,
                    len: self.code.len(),
                });
            }
            let instruction = self.code[self.pc].clone();
            if let Some(tracer) = self.ctx.tracer.as_deref_mut() {
                tracer.on_instruction(self.pc, instruction.op, self.stack.len());
            }
            match instruction.op {
                Opcode::Label => {}
                Opcode::PushConst => self.stack.push(instruction.first),
                Opcode::LocalGet => {
                    let (frame, slot) = local_operands(&instruction)?;
                    let value = self.local_frame(frame)?.get(slot).ok_or(LanguageError::LocalOutOfRange {
                        frame,
                        slot,
                    })?;
                    self.stack.push(value);
                }
                Opcode::LocalSet => {
                    let (frame, slot) = local_operands(&instruction)?;
                    let value = self.peek()?.clone();
                    if !self.local_frame(frame)?.set(slot, value) {
                        return Err(LanguageError::LocalOutOfRange { frame, slot });
                    }
                }
                Opcode::GlobalGet => {
                    let Value::Symbol(sym) = &instruction.first else {
                        return Err(LanguageError::TypeMismatch {
                            expected: "symbol operand",
                            got: instruction.first.to_string(),
                        });
                    };
                    let value = self.ctx.packages.value_of(sym).unwrap_or(Value::Nil);
                    self.stack.push(value);
                }
                Opcode::GlobalSet => {
                    let Value::Symbol(sym) = &instruction.first else {
                        return Err(LanguageError::TypeMismatch {
                            expected: "symbol operand",
                            got: instruction.first.to_string(),
                        });
                    };
                    let value = self.peek()?.clone();
                    self.ctx.packages.set_value(sym, value);
                }
                Opcode::StackPop => {
                    self.pop()?;
                }
                Opcode::Duplicate => {
                    let top = self.peek()?.clone();
                    self.stack.push(top);
                }
                Opcode::JmpIfTrue => {
                    let condition = self.pop()?;
                    if condition.is_truthy() {
                        self.pc = jump_target(&instruction)?;
                        continue;
                    }
                }
                Opcode::JmpIfFalse => {
                    let condition = self.pop()?;
                    if !condition.is_truthy() {
                        self.pc = jump_target(&instruction)?;
                        continue;
                    }
                }
                Opcode::JmpToLabel => {
                    self.pc = jump_target(&instruction)?;
                    continue;
                }
                Opcode::SaveReturn => {
                    let label = match &instruction.first {
                        Value::Str(label) => Rc::clone(label),
                        _ => Rc::from(""),
                    };
                    self.stack.push(Value::ReturnAddress(Rc::new(ReturnAddress {
                        closure: self.closure.clone(),
                        pc: jump_target(&instruction)?,
                        env: self.env.clone(),
                        label,
                    })));
                }
                Opcode::JmpClosure => {
                    let count = int_operand(&instruction.first)?;
                    let callee = self.pop()?;
                    let Value::Closure(callee) = callee else {
                        return Err(LanguageError::NotAClosure(callee.to_string()));
                    };
                    if let Some(tracer) = self.ctx.tracer.as_deref_mut() {
                        tracer.on_enter(callee.name());
                    }
                    // The caller's frame is discarded; the callee brings its
                    // own captured chain and binds a fresh frame on entry.
                    self.arg_count = count;
                    self.env = callee.env().cloned();
                    self.code = fetch_code(self.ctx, &callee)?;
                    self.closure = callee;
                    self.pc = 0;
                    continue;
                }
                Opcode::ReturnVal => {
                    let value = self.pop()?;
                    if self.stack.is_empty() {
                        return Ok(value);
                    }
                    let address = self.pop()?;
                    let Value::ReturnAddress(address) = address else {
                        return Err(LanguageError::ExpectedReturnAddress(address.to_string()));
                    };
                    if let Some(tracer) = self.ctx.tracer.as_deref_mut() {
                        tracer.on_return();
                    }
                    self.stack.push(value);
                    self.closure = address.closure.clone();
                    self.env = address.env.clone();
                    self.code = fetch_code(self.ctx, &address.closure)?;
                    self.pc = address.pc;
                    continue;
                }
                Opcode::MakeEnv => {
                    let slots = int_operand(&instruction.first)?;
                    if self.arg_count != slots {
                        return Err(LanguageError::ArityMismatch {
                            expected: slots,
                            got: self.arg_count,
                        });
                    }
                    let mut values = vec![Value::Nil; slots];
                    for slot in (0..slots).rev() {
                        values[slot] = self.pop()?;
                    }
                    let symbols = param_symbols(&instruction.second);
                    self.env = Some(Env::new(symbols, values, self.env.take()));
                }
                Opcode::MakeEnvdot => {
                    let slots = int_operand(&instruction.first)?;
                    let fixed = slots - 1;
                    if self.arg_count < fixed {
                        return Err(LanguageError::ArityMismatch {
                            expected: fixed,
                            got: self.arg_count,
                        });
                    }
                    // Cons the surplus into a fresh list; popping from the
                    // top naturally builds it back-to-front.
                    let mut rest = Value::Nil;
                    for _ in 0..(self.arg_count - fixed) {
                        let value = self.pop()?;
                        rest = Value::cons(value, rest);
                    }
                    let mut values = vec![Value::Nil; slots];
                    values[fixed] = rest;
                    for slot in (0..fixed).rev() {
                        values[slot] = self.pop()?;
                    }
                    let symbols = param_symbols(&instruction.second);
                    self.env = Some(Env::new(symbols, values, self.env.take()));
                }
                Opcode::MakeClosure => {
                    let Value::Closure(template) = &instruction.first else {
                        return Err(LanguageError::TypeMismatch {
                            expected: "closure operand",
                            got: instruction.first.to_string(),
                        });
                    };
                    self.stack.push(Value::Closure(template.with_env(self.env.clone())));
                }
                Opcode::CallPrimop => {
                    let Value::Str(name) = &instruction.first else {
                        return Err(LanguageError::TypeMismatch {
                            expected: "primitive name operand",
                            got: instruction.first.to_string(),
                        });
                    };
                    let Some(primitive) = self.ctx.primitives.lookup(name.as_ref(), self.arg_count) else {
                        return Err(LanguageError::UnknownPrimitive {
                            name: name.to_string(),
                            argc: self.arg_count,
                        });
                    };
                    let func = primitive.func;
                    let mut args: SmallVec<[Value; 4]> = SmallVec::with_capacity(self.arg_count);
                    for _ in 0..self.arg_count {
                        args.push(self.pop()?);
                    }
                    args.reverse();
                    let result = func(self.ctx, args)?;
                    self.stack.push(result);
                }
            }
            self.pc += 1;
        }
    }

    fn pop(&mut self) -> Result<Value, LanguageError> {
        self.stack.pop().ok_or(LanguageError::StackUnderflow)
    }

    fn peek(&self) -> Result<&Value, LanguageError> {
        self.stack.last().ok_or(LanguageError::StackUnderflow)
    }

    fn local_frame(&self, depth: usize) -> Result<Rc<Env>, LanguageError> {
        self.env
            .as_ref()
            .and_then(|env| Env::frame_at(env, depth))
            .ok_or(LanguageError::LocalOutOfRange { frame: depth, slot: 0 })
    }
}

fn int_operand(value: &Value) -> Result<usize, LanguageError> {
    match value {
        Value::Int(i) if *i >= 0 => Ok(*i as usize),
        _ => Err(LanguageError::TypeMismatch {
            expected: "non-negative integer operand",
            got: value.to_string(),
        }),
    }
}

fn jump_target(instruction: &Instruction) -> Result<usize, LanguageError> {
    int_operand(&instruction.second)
}

/// Extracts the frame symbols from a MAKE_ENV / MAKE_ENVDOT parameter-list
/// operand. The compiler validated the shape; anything unexpected simply
/// yields fewer debug symbols.
fn param_symbols(params: &Value) -> Vec<crate::package::Symbol> {
    let mut symbols = Vec::new();
    let mut node = params.clone();
    loop {
        match node {
            Value::Symbol(rest) => {
                symbols.push(rest);
                return symbols;
            }
            Value::Cons(cell) => {
                if let Value::Symbol(sym) = &cell.first {
                    symbols.push(sym.clone());
                }
                node = cell.rest.clone();
            }
            _ => return symbols,
        }
    }
}

fn local_operands(instruction: &Instruction) -> Result<(usize, usize), LanguageError> {
    Ok((int_operand(&instruction.first)?, int_operand(&instruction.second)?))
}
