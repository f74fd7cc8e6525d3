#![doc = include_str!("../../../README.md")]
#![expect(clippy::cast_sign_loss, reason = "sign-changing casts are range-checked at the cast site")]
#![expect(clippy::needless_pass_by_value, reason = "primitive signatures pass argument buffers by value")]
#![expect(clippy::unnecessary_wraps, reason = "primitive and dispatch signatures are uniform")]

mod bytecode;
mod context;
mod env;
mod error;
mod io;
mod package;
mod parse;
mod primitives;
mod stream;
mod tracer;
mod value;

pub use crate::{
    bytecode::{CodeBlock, CodeHandle, CodeStore, Instruction, Opcode},
    context::{CompilationResult, Context, EvalResult},
    env::{Env, VarPos},
    error::{CompileError, Error, LanguageError, ParseError},
    io::{CollectStringLog, LogWriter, NoLog, StdLog},
    package::{Macro, PackageId, Packages, Symbol},
    parse::{ParsedForm, Parser},
    primitives::{Arity, Primitive, PrimitiveFn},
    stream::InputStream,
    tracer::{CollectingTracer, NoopTracer, TraceStats, VmTracer},
    value::{Closure, Cons, NativeObject, ReturnAddress, Value},
};
