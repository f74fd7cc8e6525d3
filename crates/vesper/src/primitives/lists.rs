//! List construction and access primitives.

use std::rc::Rc;

use smallvec::SmallVec;

use super::{
    Arity, Primitive,
    support::{mismatch, want_closure, want_int, want_list_items},
};
use crate::{
    bytecode,
    context::Context,
    error::LanguageError,
    value::{Cons, Value},
};

pub(crate) const DEFS: &[Primitive] = &[
    Primitive {
        name: "cons",
        min_args: 2,
        arity: Arity::Exact,
        side_effects: false,
        func: prim_cons,
    },
    Primitive {
        name: "list",
        min_args: 0,
        arity: Arity::VarArgs,
        side_effects: false,
        func: prim_list,
    },
    Primitive {
        name: "append",
        min_args: 0,
        arity: Arity::VarArgs,
        side_effects: false,
        func: prim_append,
    },
    Primitive {
        name: "length",
        min_args: 1,
        arity: Arity::Exact,
        side_effects: false,
        func: prim_length,
    },
    Primitive {
        name: "car",
        min_args: 1,
        arity: Arity::Exact,
        side_effects: false,
        func: prim_car,
    },
    Primitive {
        name: "cdr",
        min_args: 1,
        arity: Arity::Exact,
        side_effects: false,
        func: prim_cdr,
    },
    Primitive {
        name: "first",
        min_args: 1,
        arity: Arity::Exact,
        side_effects: false,
        func: prim_car,
    },
    Primitive {
        name: "rest",
        min_args: 1,
        arity: Arity::Exact,
        side_effects: false,
        func: prim_cdr,
    },
    Primitive {
        name: "cadr",
        min_args: 1,
        arity: Arity::Exact,
        side_effects: false,
        func: prim_cadr,
    },
    Primitive {
        name: "cddr",
        min_args: 1,
        arity: Arity::Exact,
        side_effects: false,
        func: prim_cddr,
    },
    Primitive {
        name: "caddr",
        min_args: 1,
        arity: Arity::Exact,
        side_effects: false,
        func: prim_caddr,
    },
    Primitive {
        name: "cdddr",
        min_args: 1,
        arity: Arity::Exact,
        side_effects: false,
        func: prim_cdddr,
    },
    Primitive {
        name: "nth",
        min_args: 2,
        arity: Arity::Exact,
        side_effects: false,
        func: prim_nth,
    },
    Primitive {
        name: "nth-tail",
        min_args: 2,
        arity: Arity::Exact,
        side_effects: false,
        func: prim_nth_tail,
    },
    Primitive {
        name: "nth-cons",
        min_args: 2,
        arity: Arity::Exact,
        side_effects: false,
        func: prim_nth_cons,
    },
    Primitive {
        name: "map",
        min_args: 2,
        arity: Arity::Exact,
        side_effects: true,
        func: prim_map,
    },
];

fn prim_cons(_ctx: &mut Context, mut args: SmallVec<[Value; 4]>) -> Result<Value, LanguageError> {
    let rest = args.pop().expect("arity checked");
    let first = args.pop().expect("arity checked");
    Ok(Value::cons(first, rest))
}

fn prim_list(_ctx: &mut Context, args: SmallVec<[Value; 4]>) -> Result<Value, LanguageError> {
    Ok(Value::list(args.into_iter().collect::<Vec<_>>()))
}

/// Concatenates lists, copying all but the last argument; the last argument
/// becomes the terminal tail verbatim, so `(append '(a) 'b)` is `(a . b)`.
fn prim_append(_ctx: &mut Context, args: SmallVec<[Value; 4]>) -> Result<Value, LanguageError> {
    let Some((last, heads)) = args.split_last() else {
        return Ok(Value::Nil);
    };
    let mut collected = Vec::new();
    for head in heads {
        collected.extend(want_list_items(head)?);
    }
    let mut out = last.clone();
    for item in collected.into_iter().rev() {
        out = Value::cons(item, out);
    }
    Ok(out)
}

fn prim_length(_ctx: &mut Context, args: SmallVec<[Value; 4]>) -> Result<Value, LanguageError> {
    let items = want_list_items(&args[0])?;
    Ok(Value::Int(i32::try_from(items.len()).expect("list length exceeds i32")))
}

fn car_of(value: &Value) -> Result<Value, LanguageError> {
    value.as_cons().map(|c| c.first.clone()).ok_or_else(|| mismatch("cons", value))
}

fn cdr_of(value: &Value) -> Result<Value, LanguageError> {
    value.as_cons().map(|c| c.rest.clone()).ok_or_else(|| mismatch("cons", value))
}

fn prim_car(_ctx: &mut Context, args: SmallVec<[Value; 4]>) -> Result<Value, LanguageError> {
    car_of(&args[0])
}

fn prim_cdr(_ctx: &mut Context, args: SmallVec<[Value; 4]>) -> Result<Value, LanguageError> {
    cdr_of(&args[0])
}

fn prim_cadr(_ctx: &mut Context, args: SmallVec<[Value; 4]>) -> Result<Value, LanguageError> {
    car_of(&cdr_of(&args[0])?)
}

fn prim_cddr(_ctx: &mut Context, args: SmallVec<[Value; 4]>) -> Result<Value, LanguageError> {
    cdr_of(&cdr_of(&args[0])?)
}

fn prim_caddr(_ctx: &mut Context, args: SmallVec<[Value; 4]>) -> Result<Value, LanguageError> {
    car_of(&cdr_of(&cdr_of(&args[0])?)?)
}

fn prim_cdddr(_ctx: &mut Context, args: SmallVec<[Value; 4]>) -> Result<Value, LanguageError> {
    cdr_of(&cdr_of(&cdr_of(&args[0])?)?)
}

/// Number of cons cells before the chain ends (by nil or a dotted tail).
fn chain_length(list: &Value) -> usize {
    let mut node = list;
    let mut count = 0;
    while let Value::Cons(cell) = node {
        count += 1;
        node = &cell.rest;
    }
    count
}

/// The `n`-th cons cell of a chain, zero-based.
fn nth_cell(list: &Value, n: i32) -> Result<Rc<Cons>, LanguageError> {
    let out_of_bounds = || LanguageError::IndexOutOfBounds {
        index: n,
        len: chain_length(list),
    };
    let mut remaining = usize::try_from(n).map_err(|_| out_of_bounds())?;
    let mut node = list.clone();
    loop {
        let Value::Cons(cell) = node else {
            return Err(out_of_bounds());
        };
        if remaining == 0 {
            return Ok(cell);
        }
        remaining -= 1;
        node = cell.rest.clone();
    }
}

fn prim_nth(_ctx: &mut Context, args: SmallVec<[Value; 4]>) -> Result<Value, LanguageError> {
    Ok(nth_cell(&args[0], want_int(&args[1])?)?.first.clone())
}

fn prim_nth_tail(_ctx: &mut Context, args: SmallVec<[Value; 4]>) -> Result<Value, LanguageError> {
    Ok(nth_cell(&args[0], want_int(&args[1])?)?.rest.clone())
}

fn prim_nth_cons(_ctx: &mut Context, args: SmallVec<[Value; 4]>) -> Result<Value, LanguageError> {
    Ok(Value::Cons(nth_cell(&args[0], want_int(&args[1])?)?))
}

/// Calls the closure on each element, collecting the results. Re-enters the
/// VM once per element.
fn prim_map(ctx: &mut Context, args: SmallVec<[Value; 4]>) -> Result<Value, LanguageError> {
    let func = want_closure(&args[0])?;
    let items = want_list_items(&args[1])?;
    let mut results = Vec::with_capacity(items.len());
    for item in items {
        results.push(bytecode::execute(ctx, &func, &[item])?);
    }
    Ok(Value::list(results))
}
