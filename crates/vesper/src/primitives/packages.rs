//! Package-control primitives.

use smallvec::SmallVec;

use super::{
    Arity, Primitive,
    support::{mismatch, want_string, want_symbol},
};
use crate::{
    context::Context,
    error::LanguageError,
    package::PackageId,
    value::Value,
};

pub(crate) const DEFS: &[Primitive] = &[
    Primitive {
        name: "package-set",
        min_args: 1,
        arity: Arity::Exact,
        side_effects: true,
        func: prim_package_set,
    },
    Primitive {
        name: "package-get",
        min_args: 0,
        arity: Arity::Exact,
        side_effects: true,
        func: prim_package_get,
    },
    Primitive {
        name: "package-import",
        min_args: 1,
        arity: Arity::VarArgs,
        side_effects: true,
        func: prim_package_import,
    },
    Primitive {
        name: "package-imports",
        min_args: 0,
        arity: Arity::Exact,
        side_effects: true,
        func: prim_package_imports,
    },
    Primitive {
        name: "package-export",
        min_args: 0,
        arity: Arity::VarArgs,
        side_effects: true,
        func: prim_package_export,
    },
    Primitive {
        name: "package-exports",
        min_args: 0,
        arity: Arity::Exact,
        side_effects: true,
        func: prim_package_exports,
    },
];

/// `(package-set name)` switches the current package (creating it if
/// needed) and returns its name; `(package-set ())` switches back to the
/// global package and returns nil.
fn prim_package_set(ctx: &mut Context, args: SmallVec<[Value; 4]>) -> Result<Value, LanguageError> {
    match &args[0] {
        Value::Nil => {
            ctx.packages.set_current(PackageId::GLOBAL);
            Ok(Value::Nil)
        }
        Value::Str(name) => {
            let id = ctx.packages.find_or_create(name);
            ctx.packages.set_current(id);
            Ok(args[0].clone())
        }
        other => Err(mismatch("package name string or nil", other)),
    }
}

fn prim_package_get(ctx: &mut Context, _args: SmallVec<[Value; 4]>) -> Result<Value, LanguageError> {
    Ok(match ctx.packages.name_of(ctx.packages.current()) {
        Some(name) => Value::string(name),
        None => Value::Nil,
    })
}

/// Adds the named packages to the current package's import list.
fn prim_package_import(ctx: &mut Context, args: SmallVec<[Value; 4]>) -> Result<Value, LanguageError> {
    let current = ctx.packages.current();
    for arg in &args {
        let name = want_string(arg)?;
        let dep = ctx.packages.find_or_create(&name);
        ctx.packages.add_import(current, dep);
    }
    Ok(Value::Nil)
}

fn prim_package_imports(ctx: &mut Context, _args: SmallVec<[Value; 4]>) -> Result<Value, LanguageError> {
    let current = ctx.packages.current();
    let names: Vec<Value> = ctx
        .packages
        .imports_of(current)
        .iter()
        .map(|dep| match ctx.packages.name_of(*dep) {
            Some(name) => Value::string(name),
            None => Value::Nil,
        })
        .collect();
    Ok(Value::list(names))
}

/// Marks the given symbols as exported from their owning packages.
fn prim_package_export(_ctx: &mut Context, args: SmallVec<[Value; 4]>) -> Result<Value, LanguageError> {
    for arg in &args {
        want_symbol(arg)?.set_exported(true);
    }
    Ok(Value::Nil)
}

fn prim_package_exports(ctx: &mut Context, _args: SmallVec<[Value; 4]>) -> Result<Value, LanguageError> {
    let current = ctx.packages.current();
    let symbols: Vec<Value> = ctx
        .packages
        .exported_symbols(current)
        .into_iter()
        .map(Value::Symbol)
        .collect();
    Ok(Value::list(symbols))
}
