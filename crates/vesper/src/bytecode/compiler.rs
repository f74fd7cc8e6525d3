//! Compiles parsed forms into instruction lists.
//!
//! Every recursive call carries a `State { keep, tail }` pair driving
//! tail-call elimination and pop/return emission: `keep` says whether the
//! form's value is consumed, `tail` says the value is the whole function's
//! return value. Special forms are recognized by symbol identity against
//! the reserved words; anything else is macro-expanded (head position, to a
//! fixed point) and then compiled as an application.
//!
//! Macros execute at compile time on the same VM: the compiler invokes
//! `vm::execute` mid-compilation with the unevaluated argument forms.

use std::rc::Rc;

use super::{
    builder::CodeBuilder,
    code::CodeHandle,
    op::{Instruction, Opcode},
    vm,
};
use crate::{
    context::Context,
    env::Env,
    error::{CompileError, Error, LanguageError},
    package::{Macro, PackageId, RESERVED_NAMES, Reserved, Symbol},
    value::{Closure, Value},
};

/// Compilation state: what the enclosing context does with the value.
///
/// `keep == false` means the result is discarded; `tail == true` means the
/// result is the whole function's return value. Discarded-and-tail is
/// impossible.
#[derive(Debug, Clone, Copy)]
struct State {
    keep: bool,
    tail: bool,
}

impl State {
    /// Result discarded, more code follows (middle of a `begin`).
    const DISCARD: Self = Self { keep: false, tail: false };
    /// Result consumed by an enclosing expression.
    const KEEP: Self = Self { keep: true, tail: false };
    /// Result is the function's return value (tail position).
    const TAIL: Self = Self { keep: true, tail: true };
}

/// One compilation run over a single top-level form.
///
/// Label names come from a monotone counter so they are unique within every
/// block the run assembles; freshly registered code handles are collected
/// for the host's compilation summary.
pub(crate) struct Compiler<'a> {
    ctx: &'a mut Context,
    labels: usize,
    new_blocks: Vec<CodeHandle>,
}

impl<'a> Compiler<'a> {
    pub fn new(ctx: &'a mut Context) -> Self {
        Self {
            ctx,
            labels: 0,
            new_blocks: Vec::new(),
        }
    }

    /// Compiles one top-level form as the body of a zero-argument function.
    ///
    /// Returns the entry closure plus the handles of every code block this
    /// compilation registered (the entry block and any nested lambdas).
    pub fn compile_toplevel(mut self, form: &Value) -> Result<(Closure, Vec<CodeHandle>), Error> {
        let closure = self.compile_function(&Value::Nil, std::slice::from_ref(form), None, Some("top-level"))?;
        // Nested lambdas register before their enclosing block; report the
        // entry block first.
        let entry = closure.code();
        self.new_blocks.retain(|handle| *handle != entry);
        self.new_blocks.insert(0, entry);
        Ok((closure, self.new_blocks))
    }

    fn make_label(&mut self) -> Rc<str> {
        let label = format!("L{}", self.labels);
        self.labels += 1;
        Rc::from(label)
    }

    /// Compiles a function body into a fresh code block and returns the
    /// closure template (captured environment attached later, at run time,
    /// by MAKE_CLOSURE).
    fn compile_function(
        &mut self,
        params: &Value,
        body: &[Value],
        parent: Option<Rc<Env>>,
        name: Option<&str>,
    ) -> Result<Closure, Error> {
        let (fixed, rest) = parse_params(params)?;
        let mut symbols = fixed;
        let dotted = rest.is_some();
        if let Some(rest) = rest {
            symbols.push(rest);
        }
        let slots = symbols.len();
        let count = Value::Int(i32::try_from(slots).expect("parameter count exceeds i32"));
        let frame = Env::new(symbols, vec![Value::Nil; slots], parent);

        let mut builder = CodeBuilder::new();
        let bind = if dotted { Opcode::MakeEnvdot } else { Opcode::MakeEnv };
        builder.emit(Instruction::binary(bind, count, params.clone()));
        match body {
            [] => emit_constant(&Value::Nil, State::TAIL, &mut builder),
            [init @ .., last] => {
                for form in init {
                    self.compile(form, &frame, State::DISCARD, &mut builder)?;
                }
                self.compile(last, &frame, State::TAIL, &mut builder)?;
            }
        }

        let instructions = builder.assemble()?;
        let handle = self.ctx.code.register(instructions, name.unwrap_or("lambda").to_owned());
        self.new_blocks.push(handle);
        Ok(Closure::new(handle, None, params.clone(), name.map(Rc::from)))
    }

    fn compile(&mut self, form: &Value, env: &Rc<Env>, st: State, b: &mut CodeBuilder) -> Result<(), Error> {
        debug_assert!(st.keep || !st.tail, "a discarded value cannot be in tail position");
        match form {
            Value::Symbol(sym) => {
                // Keywords evaluate to themselves.
                if sym.package() == PackageId::KEYWORDS {
                    emit_constant(form, st, b);
                    return Ok(());
                }
                if !st.keep {
                    return Ok(());
                }
                match Env::lookup(env, sym) {
                    Some(pos) => {
                        let frame = Value::Int(i32::try_from(pos.frame).expect("frame depth exceeds i32"));
                        let slot = Value::Int(i32::try_from(pos.slot).expect("slot index exceeds i32"));
                        let mut get = Instruction::binary(Opcode::LocalGet, frame, slot);
                        get.debug = Some(sym.name_rc());
                        b.emit(get);
                    }
                    None => b.emit(Instruction::unary(Opcode::GlobalGet, form.clone())),
                }
                if st.tail {
                    b.emit(Instruction::nullary(Opcode::ReturnVal));
                }
                Ok(())
            }
            Value::Cons(_) => self.compile_cons(form, env, st, b),
            _ => {
                emit_constant(form, st, b);
                Ok(())
            }
        }
    }

    fn compile_cons(&mut self, form: &Value, env: &Rc<Env>, st: State, b: &mut CodeBuilder) -> Result<(), Error> {
        let cell = form.as_cons().expect("compile_cons is given a cons");
        if let Value::Symbol(head) = &cell.first {
            let r = self.ctx.packages.reserved().clone();
            if is_special(head, &r) {
                let items = cell
                    .rest
                    .proper_list_items()
                    .ok_or_else(|| CompileError::ImproperCall(form.to_string()))?;
                if head.ptr_eq(&r.quote) {
                    return compile_quote(&items, st, b);
                }
                if head.ptr_eq(&r.begin) {
                    return self.compile_begin(&items, env, st, b);
                }
                if head.ptr_eq(&r.set_bang) {
                    return self.compile_set(&items, env, st, b);
                }
                if head.ptr_eq(&r.if_sym) {
                    return self.compile_if(&items, env, st, b);
                }
                if head.ptr_eq(&r.if_star) {
                    return self.compile_if_star(&items, env, st, b);
                }
                if head.ptr_eq(&r.while_sym) {
                    return self.compile_while(&items, env, st, b);
                }
                if head.ptr_eq(&r.lambda) {
                    return self.compile_lambda(&items, env, st, b);
                }
                debug_assert!(head.ptr_eq(&r.defmacro));
                return self.compile_defmacro(&items, st, b);
            }
            if self.ctx.packages.macro_of(head).is_some() {
                let expanded = self.expand_macros(form)?;
                return self.compile(&expanded, env, st, b);
            }
        }
        self.compile_application(form, env, st, b)
    }

    /// Expands head-position macros to a fixed point.
    fn expand_macros(&mut self, form: &Value) -> Result<Value, Error> {
        let mut current = form.clone();
        loop {
            let (mac, args) = {
                let Value::Cons(cell) = &current else { return Ok(current) };
                let Value::Symbol(head) = &cell.first else { return Ok(current) };
                let Some(mac) = self.ctx.packages.macro_of(head) else {
                    return Ok(current);
                };
                let args = cell
                    .rest
                    .proper_list_items()
                    .ok_or_else(|| CompileError::ImproperCall(current.to_string()))?;
                (mac, args)
            };
            current = vm::execute(self.ctx, &mac.body, &args)?;
        }
    }

    fn compile_begin(&mut self, forms: &[Value], env: &Rc<Env>, st: State, b: &mut CodeBuilder) -> Result<(), Error> {
        match forms {
            [] => {
                emit_constant(&Value::Nil, st, b);
                Ok(())
            }
            [init @ .., last] => {
                for form in init {
                    self.compile(form, env, State::DISCARD, b)?;
                }
                self.compile(last, env, st, b)
            }
        }
    }

    fn compile_set(&mut self, items: &[Value], env: &Rc<Env>, st: State, b: &mut CodeBuilder) -> Result<(), Error> {
        let [target, expr] = items else {
            return Err(CompileError::SpecialFormArity {
                form: "set!",
                expected: "a symbol and a value",
            }
            .into());
        };
        let Value::Symbol(sym) = target else {
            return Err(CompileError::InvalidLValue(target.to_string()).into());
        };
        if RESERVED_NAMES.contains(&sym.name()) {
            return Err(CompileError::ReservedName(sym.name().to_owned()).into());
        }
        if self.ctx.packages.macro_of(sym).is_some() {
            return Err(CompileError::MacroRedefinition(sym.to_string()).into());
        }
        self.compile(expr, env, State::KEEP, b)?;
        match Env::lookup(env, sym) {
            Some(pos) => {
                let frame = Value::Int(i32::try_from(pos.frame).expect("frame depth exceeds i32"));
                let slot = Value::Int(i32::try_from(pos.slot).expect("slot index exceeds i32"));
                let mut set = Instruction::binary(Opcode::LocalSet, frame, slot);
                set.debug = Some(sym.name_rc());
                b.emit(set);
            }
            None => b.emit(Instruction::unary(Opcode::GlobalSet, target.clone())),
        }
        if !st.keep {
            b.emit(Instruction::nullary(Opcode::StackPop));
        }
        if st.tail {
            b.emit(Instruction::nullary(Opcode::ReturnVal));
        }
        Ok(())
    }

    fn compile_if(&mut self, items: &[Value], env: &Rc<Env>, st: State, b: &mut CodeBuilder) -> Result<(), Error> {
        let (pred, then_form, else_form) = match items {
            [pred, then_form] => (pred, then_form, None),
            [pred, then_form, else_form] => (pred, then_form, Some(else_form)),
            _ => {
                return Err(CompileError::SpecialFormArity {
                    form: "if",
                    expected: "a predicate, a then-form, and an optional else-form",
                }
                .into());
            }
        };
        // Literal predicates pick the live branch at compile time.
        if matches!(pred, Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::Str(_)) {
            if pred.is_truthy() {
                return self.compile(then_form, env, st, b);
            }
            return match else_form {
                Some(form) => self.compile(form, env, st, b),
                None => {
                    emit_constant(&Value::Nil, st, b);
                    Ok(())
                }
            };
        }
        // (if p x x) collapses to (begin p x).
        if let Some(else_form) = else_form
            && then_form == else_form
        {
            self.compile(pred, env, State::DISCARD, b)?;
            return self.compile(then_form, env, st, b);
        }

        self.compile(pred, env, State::KEEP, b)?;
        let l_else = self.make_label();
        b.emit_jump(Opcode::JmpIfFalse, &l_else);
        self.compile(then_form, env, st, b)?;
        if st.tail {
            b.emit_label(&l_else);
            match else_form {
                Some(form) => self.compile(form, env, st, b)?,
                None => emit_constant(&Value::Nil, st, b),
            }
        } else {
            let l_end = self.make_label();
            b.emit_jump(Opcode::JmpToLabel, &l_end);
            b.emit_label(&l_else);
            match else_form {
                Some(form) => self.compile(form, env, st, b)?,
                None => emit_constant(&Value::Nil, st, b),
            }
            b.emit_label(&l_end);
        }
        Ok(())
    }

    fn compile_if_star(&mut self, items: &[Value], env: &Rc<Env>, st: State, b: &mut CodeBuilder) -> Result<(), Error> {
        let [pred, else_form] = items else {
            return Err(CompileError::SpecialFormArity {
                form: "if*",
                expected: "a predicate and an else-form",
            }
            .into());
        };
        self.compile(pred, env, State::KEEP, b)?;
        let l_done = self.make_label();
        b.emit(Instruction::nullary(Opcode::Duplicate));
        b.emit_jump(Opcode::JmpIfTrue, &l_done);
        b.emit(Instruction::nullary(Opcode::StackPop));
        self.compile(else_form, env, State::KEEP, b)?;
        b.emit_label(&l_done);
        if !st.keep {
            b.emit(Instruction::nullary(Opcode::StackPop));
        }
        if st.tail {
            b.emit(Instruction::nullary(Opcode::ReturnVal));
        }
        Ok(())
    }

    fn compile_while(&mut self, items: &[Value], env: &Rc<Env>, st: State, b: &mut CodeBuilder) -> Result<(), Error> {
        let Some((pred, body)) = items.split_first() else {
            return Err(CompileError::SpecialFormArity {
                form: "while",
                expected: "a predicate and a body",
            }
            .into());
        };
        // The loop's running value; replaced by each iteration's body value.
        b.emit(Instruction::unary(Opcode::PushConst, Value::Nil));
        let l_start = self.make_label();
        let l_end = self.make_label();
        b.emit_label(&l_start);
        self.compile(pred, env, State::KEEP, b)?;
        b.emit_jump(Opcode::JmpIfFalse, &l_end);
        b.emit(Instruction::nullary(Opcode::StackPop));
        match body {
            [] => b.emit(Instruction::unary(Opcode::PushConst, Value::Nil)),
            [init @ .., last] => {
                for form in init {
                    self.compile(form, env, State::DISCARD, b)?;
                }
                self.compile(last, env, State::KEEP, b)?;
            }
        }
        b.emit_jump(Opcode::JmpToLabel, &l_start);
        b.emit_label(&l_end);
        if !st.keep {
            b.emit(Instruction::nullary(Opcode::StackPop));
        }
        if st.tail {
            b.emit(Instruction::nullary(Opcode::ReturnVal));
        }
        Ok(())
    }

    fn compile_lambda(&mut self, items: &[Value], env: &Rc<Env>, st: State, b: &mut CodeBuilder) -> Result<(), Error> {
        let Some((params, body)) = items.split_first() else {
            return Err(CompileError::SpecialFormArity {
                form: "lambda",
                expected: "a parameter list and a body",
            }
            .into());
        };
        let template = self.compile_function(params, body, Some(Rc::clone(env)), None)?;
        if st.keep {
            b.emit(Instruction::unary(Opcode::MakeClosure, Value::Closure(template)));
            if st.tail {
                b.emit(Instruction::nullary(Opcode::ReturnVal));
            }
        }
        Ok(())
    }

    fn compile_defmacro(&mut self, items: &[Value], st: State, b: &mut CodeBuilder) -> Result<(), Error> {
        let [name, params, body @ ..] = items else {
            return Err(CompileError::SpecialFormArity {
                form: "defmacro",
                expected: "a name, a parameter list, and a body",
            }
            .into());
        };
        let Value::Symbol(sym) = name else {
            return Err(CompileError::InvalidLValue(name.to_string()).into());
        };
        if RESERVED_NAMES.contains(&sym.name()) {
            return Err(CompileError::ReservedName(sym.name().to_owned()).into());
        }
        // Macro bodies run outside any runtime environment, so they compile
        // against an empty scope and resolve free names globally.
        let template = self.compile_function(params, body, None, Some(sym.name()))?;
        self.ctx.packages.set_macro(
            sym,
            Macro {
                name: sym.clone(),
                params: params.clone(),
                body: template.clone(),
            },
        );
        emit_constant(&Value::Closure(template), st, b);
        Ok(())
    }

    fn compile_application(
        &mut self,
        form: &Value,
        env: &Rc<Env>,
        st: State,
        b: &mut CodeBuilder,
    ) -> Result<(), Error> {
        let items = form
            .proper_list_items()
            .ok_or_else(|| CompileError::ImproperCall(form.to_string()))?;
        let (callee, args) = items.split_first().expect("a cons chain has a head");

        // ((lambda () body)) compiles the body in place.
        let r = self.ctx.packages.reserved().clone();
        if args.is_empty()
            && let Some(body) = zero_arg_lambda_body(callee, &r)
        {
            return self.compile_begin(&body, env, st, b);
        }

        let count = Value::Int(i32::try_from(args.len()).expect("argument count exceeds i32"));
        if st.tail {
            for arg in args {
                self.compile(arg, env, State::KEEP, b)?;
            }
            self.compile(callee, env, State::KEEP, b)?;
            b.emit(Instruction::unary(Opcode::JmpClosure, count));
        } else {
            let l_return = self.make_label();
            b.emit_jump(Opcode::SaveReturn, &l_return);
            for arg in args {
                self.compile(arg, env, State::KEEP, b)?;
            }
            self.compile(callee, env, State::KEEP, b)?;
            b.emit(Instruction::unary(Opcode::JmpClosure, count));
            b.emit_label(&l_return);
            if !st.keep {
                b.emit(Instruction::nullary(Opcode::StackPop));
            }
        }
        Ok(())
    }
}

/// Emits a constant per the compilation state: nothing when the value is
/// discarded, PUSH_CONST (+ RETURN_VAL in tail position) otherwise.
fn emit_constant(value: &Value, st: State, b: &mut CodeBuilder) {
    if !st.keep {
        return;
    }
    b.emit(Instruction::unary(Opcode::PushConst, value.clone()));
    if st.tail {
        b.emit(Instruction::nullary(Opcode::ReturnVal));
    }
}

fn compile_quote(items: &[Value], st: State, b: &mut CodeBuilder) -> Result<(), Error> {
    let [quoted] = items else {
        return Err(CompileError::SpecialFormArity {
            form: "quote",
            expected: "exactly 1 argument",
        }
        .into());
    };
    emit_constant(quoted, st, b);
    Ok(())
}

fn is_special(head: &Symbol, r: &Reserved) -> bool {
    head.ptr_eq(&r.quote)
        || head.ptr_eq(&r.begin)
        || head.ptr_eq(&r.set_bang)
        || head.ptr_eq(&r.if_sym)
        || head.ptr_eq(&r.if_star)
        || head.ptr_eq(&r.while_sym)
        || head.ptr_eq(&r.lambda)
        || head.ptr_eq(&r.defmacro)
}

/// If `callee` is `(lambda () …)`, returns the body forms.
fn zero_arg_lambda_body(callee: &Value, r: &Reserved) -> Option<Vec<Value>> {
    let cell = callee.as_cons()?;
    let Value::Symbol(head) = &cell.first else {
        return None;
    };
    if !head.ptr_eq(&r.lambda) {
        return None;
    }
    let items = cell.rest.proper_list_items()?;
    let (params, body) = items.split_first()?;
    if matches!(params, Value::Nil) {
        Some(body.to_vec())
    } else {
        None
    }
}

/// Splits a formal parameter list into fixed parameters and an optional
/// rest parameter. `(a b c)` → 3 fixed; `(a b . rest)` → 2 fixed + rest;
/// a bare symbol collects everything.
fn parse_params(params: &Value) -> Result<(Vec<Symbol>, Option<Symbol>), CompileError> {
    let mut fixed = Vec::new();
    let mut node = params.clone();
    loop {
        match node {
            Value::Nil => return Ok((fixed, None)),
            Value::Symbol(rest) => return Ok((fixed, Some(rest))),
            Value::Cons(cell) => {
                let Value::Symbol(sym) = &cell.first else {
                    return Err(CompileError::InvalidParameterList(params.to_string()));
                };
                fixed.push(sym.clone());
                node = cell.rest.clone();
            }
            _ => return Err(CompileError::InvalidParameterList(params.to_string())),
        }
    }
}

/// One macro-expansion step on head position: if the form's head symbol has
/// a macro, runs it on the unevaluated argument forms. Returns the
/// (possibly unchanged) form and whether an expansion happened.
pub(crate) fn macro_expand_once(ctx: &mut Context, form: &Value) -> Result<(Value, bool), LanguageError> {
    let (mac, args) = {
        let Value::Cons(cell) = form else {
            return Ok((form.clone(), false));
        };
        let Value::Symbol(head) = &cell.first else {
            return Ok((form.clone(), false));
        };
        let Some(mac) = ctx.packages.macro_of(head) else {
            return Ok((form.clone(), false));
        };
        let Some(args) = cell.rest.proper_list_items() else {
            return Ok((form.clone(), false));
        };
        (mac, args)
    };
    let expanded = vm::execute(ctx, &mac.body, &args)?;
    Ok((expanded, true))
}

/// Full macro expansion: head position to a fixed point, then recursively
/// into sub-forms. Quote bodies are left untouched.
pub(crate) fn macro_expand_full(ctx: &mut Context, form: &Value) -> Result<Value, LanguageError> {
    let mut current = form.clone();
    loop {
        let (next, changed) = macro_expand_once(ctx, &current)?;
        if !changed {
            break;
        }
        current = next;
    }
    let Value::Cons(cell) = &current else { return Ok(current) };
    if let Value::Symbol(head) = &cell.first
        && head.ptr_eq(&ctx.packages.reserved().quote)
    {
        return Ok(current);
    }
    let mut items = Vec::new();
    let mut node = current.clone();
    let tail = loop {
        match node {
            Value::Cons(cell) => {
                items.push(cell.first.clone());
                node = cell.rest.clone();
            }
            other => break other,
        }
    };
    let mut out = match tail {
        Value::Nil => Value::Nil,
        other => macro_expand_full(ctx, &other)?,
    };
    let mut expanded = Vec::with_capacity(items.len());
    for item in &items {
        expanded.push(macro_expand_full(ctx, item)?);
    }
    for item in expanded.into_iter().rev() {
        out = Value::cons(item, out);
    }
    Ok(out)
}
