//! The embedding surface: one `Context` owns one instance of the whole
//! pipeline (packages, code store, primitives, parser) plus the log sink
//! and optional tracer, and drives source text through
//! parse → compile → execute one top-level form at a time.

use std::time::{Duration, Instant};

use crate::{
    bytecode::{self, CodeBlock, CodeHandle, CodeStore, Compiler},
    error::{Error, LanguageError},
    io::{LogWriter, NoLog},
    package::{PackageId, Packages},
    parse::Parser,
    primitives::Primitives,
    tracer::VmTracer,
    value::{Closure, Value},
};

/// In-language standard library, fed through the Context's own pipeline at
/// construction.
const LIBRARY: &str = include_str!("library.lisp");

/// Compilation summary for one top-level form.
#[derive(Debug, Clone)]
pub struct CompilationResult {
    /// Handles of the code blocks this compilation registered, entry block
    /// first.
    pub blocks: Vec<CodeHandle>,
}

/// Result of compiling and executing one top-level form.
#[derive(Debug)]
pub struct EvalResult {
    /// The source text of the form.
    pub input: String,
    /// Compilation summary.
    pub comp: CompilationResult,
    /// The value the form returned.
    pub value: Value,
    /// Wall-clock execution time (excluding parse and compile).
    pub elapsed: Duration,
}

/// An isolated instance of the language: packages, code store, primitives,
/// parser, and the hooks a host can install.
///
/// A Context is single-threaded; independent Contexts share nothing and may
/// run on separate threads.
#[derive(Debug)]
pub struct Context {
    pub(crate) packages: Packages,
    pub(crate) code: CodeStore,
    pub(crate) primitives: Primitives,
    parser: Parser,
    pub(crate) log: Box<dyn LogWriter>,
    pub(crate) tracer: Option<Box<dyn VmTracer>>,
    pub(crate) gensym_counter: u32,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    /// Creates a Context with the standard library loaded.
    ///
    /// # Panics
    /// Panics if the embedded standard library fails to load, which would be
    /// a bug in the library source.
    #[must_use]
    pub fn new() -> Self {
        let mut ctx = Self::seeded();
        ctx.load_library();
        ctx
    }

    /// Creates a Context with primitives only, suppressing the standard
    /// library (no `let`, `define`, `cond`, …).
    #[must_use]
    pub fn bare() -> Self {
        Self::seeded()
    }

    /// Creates a Context with the given log sink, then loads the library.
    #[must_use]
    pub fn with_log(log: Box<dyn LogWriter>) -> Self {
        let mut ctx = Self::seeded();
        ctx.log = log;
        ctx.load_library();
        ctx
    }

    fn seeded() -> Self {
        let mut packages = Packages::new();
        let mut code = CodeStore::new();
        let primitives = Primitives::standard();
        primitives.install(&mut packages, &mut code);
        Self {
            packages,
            code,
            primitives,
            parser: Parser::new(),
            log: Box::new(NoLog),
            tracer: None,
            gensym_counter: 0,
        }
    }

    /// The standard library is compiled into the core package so every user
    /// package sees its macros and functions through the import chain.
    /// Only bound names are exported; the library's incidental parameter
    /// symbols stay private to core.
    fn load_library(&mut self) {
        self.packages.set_current(PackageId::CORE);
        let result = self.compile_and_execute(LIBRARY);
        self.packages.export_bound(PackageId::CORE);
        self.packages.set_current(PackageId::GLOBAL);
        result.expect("the standard library must compile and load");
    }

    /// Replaces the log sink the `trace` primitive writes through.
    pub fn set_log(&mut self, log: Box<dyn LogWriter>) {
        self.log = log;
    }

    /// Installs an execution tracer called on every instruction dispatch.
    pub fn set_tracer(&mut self, tracer: Box<dyn VmTracer>) {
        self.tracer = Some(tracer);
    }

    /// Removes and returns the installed tracer, if any.
    pub fn clear_tracer(&mut self) -> Option<Box<dyn VmTracer>> {
        self.tracer.take()
    }

    /// Feeds source text through the pipeline, returning one result per
    /// complete top-level form.
    ///
    /// Forms are parsed, compiled, and executed strictly in order, so a
    /// form's side effects (package switches, macro definitions, interned
    /// symbols) are visible to the forms after it. Input that ends mid-form
    /// stays buffered for the next call.
    pub fn compile_and_execute(&mut self, source: &str) -> Result<Vec<EvalResult>, Error> {
        self.parser.add(source);
        let mut results = Vec::new();
        while let Some(form) = self.parser.parse_next(&mut self.packages)? {
            let (closure, blocks) = Compiler::new(self).compile_toplevel(&form.value)?;
            let started = Instant::now();
            let value = bytecode::execute(self, &closure, &[])?;
            results.push(EvalResult {
                input: form.source,
                comp: CompilationResult { blocks },
                value,
                elapsed: started.elapsed(),
            });
        }
        Ok(results)
    }

    /// Convenience wrapper: runs `source` and returns the last form's value
    /// (nil when the source held no complete form).
    pub fn eval(&mut self, source: &str) -> Result<Value, Error> {
        Ok(self
            .compile_and_execute(source)?
            .into_iter()
            .last()
            .map_or(Value::Nil, |r| r.value))
    }

    /// Calls a closure obtained from evaluated code with the given
    /// arguments.
    pub fn execute_closure(&mut self, closure: &Closure, args: &[Value]) -> Result<Value, LanguageError> {
        bytecode::execute(self, closure, args)
    }

    /// Iterates all live code blocks, for debugging.
    pub fn code_blocks(&self) -> impl Iterator<Item = &CodeBlock> {
        self.code.iter()
    }

    /// Pretty-printed disassembly of one code block.
    #[must_use]
    pub fn disassemble(&self, handle: CodeHandle) -> Option<String> {
        self.code.get(handle).map(CodeBlock::disassemble)
    }

    /// Drops buffered input left behind by an incomplete or erroneous form.
    pub fn discard_pending_input(&mut self) {
        self.parser.clear();
    }

    /// Read access to the package registry.
    #[must_use]
    pub fn packages(&self) -> &Packages {
        &self.packages
    }

    /// Mutable access to the package registry.
    pub fn packages_mut(&mut self) -> &mut Packages {
        &mut self.packages
    }

    /// Returns the Context to its just-constructed state: baseline
    /// packages, fresh code store, primitives re-seeded, library reloaded.
    pub fn reinitialize(&mut self) {
        self.packages.reinitialize();
        self.code = CodeStore::new();
        self.primitives.install(&mut self.packages, &mut self.code);
        self.parser.clear();
        self.gensym_counter = 0;
        self.load_library();
    }
}
