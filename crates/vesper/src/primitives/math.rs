//! Arithmetic and numeric comparison primitives.
//!
//! Promotion rule: `int op int → int`; if either side is a float, both
//! promote to float. Integer overflow wraps; integer division by zero is a
//! language error.

use std::cmp::Ordering;

use smallvec::SmallVec;

use super::{Arity, Primitive, support::mismatch};
use crate::{context::Context, error::LanguageError, value::Value};

pub(crate) const DEFS: &[Primitive] = &[
    Primitive {
        name: "+",
        min_args: 2,
        arity: Arity::VarArgs,
        side_effects: false,
        func: prim_add,
    },
    Primitive {
        name: "-",
        min_args: 2,
        arity: Arity::Exact,
        side_effects: false,
        func: prim_sub,
    },
    Primitive {
        name: "*",
        min_args: 2,
        arity: Arity::VarArgs,
        side_effects: false,
        func: prim_mul,
    },
    Primitive {
        name: "/",
        min_args: 2,
        arity: Arity::Exact,
        side_effects: false,
        func: prim_div,
    },
    Primitive {
        name: "=",
        min_args: 2,
        arity: Arity::Exact,
        side_effects: false,
        func: prim_num_eq,
    },
    Primitive {
        name: "!=",
        min_args: 2,
        arity: Arity::Exact,
        side_effects: false,
        func: prim_num_ne,
    },
    Primitive {
        name: "<",
        min_args: 2,
        arity: Arity::Exact,
        side_effects: false,
        func: prim_lt,
    },
    Primitive {
        name: "<=",
        min_args: 2,
        arity: Arity::Exact,
        side_effects: false,
        func: prim_le,
    },
    Primitive {
        name: ">",
        min_args: 2,
        arity: Arity::Exact,
        side_effects: false,
        func: prim_gt,
    },
    Primitive {
        name: ">=",
        min_args: 2,
        arity: Arity::Exact,
        side_effects: false,
        func: prim_ge,
    },
];

/// A number unpacked from a value.
#[derive(Debug, Clone, Copy)]
enum Num {
    Int(i32),
    Float(f32),
}

fn want_number(value: &Value) -> Result<Num, LanguageError> {
    match value {
        Value::Int(i) => Ok(Num::Int(*i)),
        Value::Float(x) => Ok(Num::Float(*x)),
        _ => Err(mismatch("number", value)),
    }
}

/// Applies `ints`/`floats` to a promoted operand pair.
fn combine(
    a: &Value,
    b: &Value,
    ints: impl Fn(i32, i32) -> Result<i32, LanguageError>,
    floats: impl Fn(f32, f32) -> f32,
) -> Result<Value, LanguageError> {
    match (want_number(a)?, want_number(b)?) {
        (Num::Int(a), Num::Int(b)) => Ok(Value::Int(ints(a, b)?)),
        (Num::Int(a), Num::Float(b)) => Ok(Value::Float(floats(a as f32, b))),
        (Num::Float(a), Num::Int(b)) => Ok(Value::Float(floats(a, b as f32))),
        (Num::Float(a), Num::Float(b)) => Ok(Value::Float(floats(a, b))),
    }
}

fn prim_add(_ctx: &mut Context, args: SmallVec<[Value; 4]>) -> Result<Value, LanguageError> {
    let mut acc = args[0].clone();
    for next in &args[1..] {
        acc = combine(&acc, next, |a, b| Ok(a.wrapping_add(b)), |a, b| a + b)?;
    }
    Ok(acc)
}

fn prim_sub(_ctx: &mut Context, args: SmallVec<[Value; 4]>) -> Result<Value, LanguageError> {
    combine(&args[0], &args[1], |a, b| Ok(a.wrapping_sub(b)), |a, b| a - b)
}

fn prim_mul(_ctx: &mut Context, args: SmallVec<[Value; 4]>) -> Result<Value, LanguageError> {
    let mut acc = args[0].clone();
    for next in &args[1..] {
        acc = combine(&acc, next, |a, b| Ok(a.wrapping_mul(b)), |a, b| a * b)?;
    }
    Ok(acc)
}

fn prim_div(_ctx: &mut Context, args: SmallVec<[Value; 4]>) -> Result<Value, LanguageError> {
    combine(
        &args[0],
        &args[1],
        |a, b| {
            if b == 0 {
                Err(LanguageError::DivideByZero)
            } else {
                Ok(a.wrapping_div(b))
            }
        },
        |a, b| a / b,
    )
}

/// Promoted comparison; `None` means unordered (NaN involved).
fn numeric_cmp(a: &Value, b: &Value) -> Result<Option<Ordering>, LanguageError> {
    match (want_number(a)?, want_number(b)?) {
        (Num::Int(a), Num::Int(b)) => Ok(Some(a.cmp(&b))),
        (Num::Int(a), Num::Float(b)) => Ok((a as f32).partial_cmp(&b)),
        (Num::Float(a), Num::Int(b)) => Ok(a.partial_cmp(&(b as f32))),
        (Num::Float(a), Num::Float(b)) => Ok(a.partial_cmp(&b)),
    }
}

fn prim_num_eq(_ctx: &mut Context, args: SmallVec<[Value; 4]>) -> Result<Value, LanguageError> {
    Ok(Value::Bool(numeric_cmp(&args[0], &args[1])? == Some(Ordering::Equal)))
}

fn prim_num_ne(_ctx: &mut Context, args: SmallVec<[Value; 4]>) -> Result<Value, LanguageError> {
    Ok(Value::Bool(numeric_cmp(&args[0], &args[1])? != Some(Ordering::Equal)))
}

fn prim_lt(_ctx: &mut Context, args: SmallVec<[Value; 4]>) -> Result<Value, LanguageError> {
    Ok(Value::Bool(numeric_cmp(&args[0], &args[1])? == Some(Ordering::Less)))
}

fn prim_le(_ctx: &mut Context, args: SmallVec<[Value; 4]>) -> Result<Value, LanguageError> {
    Ok(Value::Bool(matches!(
        numeric_cmp(&args[0], &args[1])?,
        Some(Ordering::Less | Ordering::Equal)
    )))
}

fn prim_gt(_ctx: &mut Context, args: SmallVec<[Value; 4]>) -> Result<Value, LanguageError> {
    Ok(Value::Bool(numeric_cmp(&args[0], &args[1])? == Some(Ordering::Greater)))
}

fn prim_ge(_ctx: &mut Context, args: SmallVec<[Value; 4]>) -> Result<Value, LanguageError> {
    Ok(Value::Bool(matches!(
        numeric_cmp(&args[0], &args[1])?,
        Some(Ordering::Greater | Ordering::Equal)
    )))
}
