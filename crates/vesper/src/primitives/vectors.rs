//! Vector primitives.

use std::{cell::RefCell, rc::Rc};

use smallvec::SmallVec;

use super::{
    Arity, Primitive,
    support::{mismatch, want_int},
};
use crate::{context::Context, error::LanguageError, value::Value};

pub(crate) const DEFS: &[Primitive] = &[
    Primitive {
        name: "vector",
        min_args: 0,
        arity: Arity::VarArgs,
        side_effects: false,
        func: prim_vector,
    },
    Primitive {
        name: "vector-get",
        min_args: 2,
        arity: Arity::Exact,
        side_effects: false,
        func: prim_vector_get,
    },
    Primitive {
        name: "vector-set!",
        min_args: 3,
        arity: Arity::Exact,
        side_effects: true,
        func: prim_vector_set,
    },
    Primitive {
        name: "vector-length",
        min_args: 1,
        arity: Arity::Exact,
        side_effects: false,
        func: prim_vector_length,
    },
];

fn want_vector(value: &Value) -> Result<Rc<RefCell<Vec<Value>>>, LanguageError> {
    match value {
        Value::Vector(v) => Ok(Rc::clone(v)),
        _ => Err(mismatch("vector", value)),
    }
}

fn checked_index(index: i32, len: usize) -> Result<usize, LanguageError> {
    usize::try_from(index)
        .ok()
        .filter(|i| *i < len)
        .ok_or(LanguageError::IndexOutOfBounds { index, len })
}

fn prim_vector(_ctx: &mut Context, args: SmallVec<[Value; 4]>) -> Result<Value, LanguageError> {
    Ok(Value::Vector(Rc::new(RefCell::new(args.into_vec()))))
}

fn prim_vector_get(_ctx: &mut Context, args: SmallVec<[Value; 4]>) -> Result<Value, LanguageError> {
    let vector = want_vector(&args[0])?;
    let index = want_int(&args[1])?;
    let vector = vector.borrow();
    let slot = checked_index(index, vector.len())?;
    Ok(vector[slot].clone())
}

/// Stores a value, returning the stored value.
fn prim_vector_set(_ctx: &mut Context, args: SmallVec<[Value; 4]>) -> Result<Value, LanguageError> {
    let vector = want_vector(&args[0])?;
    let index = want_int(&args[1])?;
    let mut vector = vector.borrow_mut();
    let slot = checked_index(index, vector.len())?;
    vector[slot] = args[2].clone();
    Ok(args[2].clone())
}

fn prim_vector_length(_ctx: &mut Context, args: SmallVec<[Value; 4]>) -> Result<Value, LanguageError> {
    let vector = want_vector(&args[0])?;
    let len = vector.borrow().len();
    Ok(Value::Int(i32::try_from(len).expect("vector length exceeds i32")))
}
