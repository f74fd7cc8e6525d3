//! Compiler-reflection primitives: macro expansion, gensym, trace.

use smallvec::SmallVec;

use super::{Arity, Primitive, support::want_string};
use crate::{
    bytecode::{macro_expand_full, macro_expand_once},
    context::Context,
    error::LanguageError,
    value::Value,
};

pub(crate) const DEFS: &[Primitive] = &[
    Primitive {
        name: "mx1",
        min_args: 1,
        arity: Arity::Exact,
        side_effects: true,
        func: prim_mx1,
    },
    Primitive {
        name: "mx",
        min_args: 1,
        arity: Arity::Exact,
        side_effects: true,
        func: prim_mx,
    },
    Primitive {
        name: "gensym",
        min_args: 0,
        arity: Arity::Exact,
        side_effects: true,
        func: prim_gensym,
    },
    Primitive {
        name: "gensym",
        min_args: 1,
        arity: Arity::Exact,
        side_effects: true,
        func: prim_gensym,
    },
    Primitive {
        name: "trace",
        min_args: 0,
        arity: Arity::VarArgs,
        side_effects: true,
        func: prim_trace,
    },
];

/// One macro-expansion step on head position; non-macro forms come back
/// unchanged.
fn prim_mx1(ctx: &mut Context, args: SmallVec<[Value; 4]>) -> Result<Value, LanguageError> {
    let (expanded, _) = macro_expand_once(ctx, &args[0])?;
    Ok(expanded)
}

/// Fixed point of iterated expansion, recursing into sub-forms.
fn prim_mx(ctx: &mut Context, args: SmallVec<[Value; 4]>) -> Result<Value, LanguageError> {
    macro_expand_full(ctx, &args[0])
}

/// Interns a fresh, never-before-seen symbol in the current package.
fn prim_gensym(ctx: &mut Context, args: SmallVec<[Value; 4]>) -> Result<Value, LanguageError> {
    let prefix = match args.first() {
        Some(value) => want_string(value)?.to_string(),
        None => "gensym-".to_owned(),
    };
    let current = ctx.packages.current();
    loop {
        let name = format!("{prefix}{}", ctx.gensym_counter);
        ctx.gensym_counter += 1;
        if !ctx.packages.is_interned(current, &name) {
            return Ok(Value::Symbol(ctx.packages.intern(current, &name)));
        }
    }
}

/// Writes the printed arguments, space-separated and newline-terminated,
/// through the Context's log sink.
fn prim_trace(ctx: &mut Context, args: SmallVec<[Value; 4]>) -> Result<Value, LanguageError> {
    for (i, value) in args.iter().enumerate() {
        if i > 0 {
            ctx.log.log_push(' ');
        }
        ctx.log.log_write(&value.to_string());
    }
    ctx.log.log_push('\n');
    Ok(Value::Nil)
}
