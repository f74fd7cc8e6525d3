//! Output sink for the `trace` primitive.
//!
//! Implement [`LogWriter`] to capture or redirect trace output from embedded
//! code. The default sink is [`NoLog`]; a REPL-style host would install
//! [`StdLog`], and tests use [`CollectStringLog`].

use std::{
    cell::RefCell,
    io::{self, Write as _},
    rc::Rc,
};

/// Trait for handling output produced by the `trace` primitive.
pub trait LogWriter: std::fmt::Debug {
    /// Called with the formatted text of one trace argument.
    ///
    /// Separators and the final newline are emitted via [`log_push`].
    ///
    /// [`log_push`]: LogWriter::log_push
    fn log_write(&mut self, text: &str);

    /// Adds a single separator or terminator character.
    fn log_push(&mut self, end: char);
}

/// `LogWriter` that writes to stdout, flushing per line.
#[derive(Debug, Default)]
pub struct StdLog;

impl LogWriter for StdLog {
    fn log_write(&mut self, text: &str) {
        let _ = io::stdout().write_all(text.as_bytes());
    }

    fn log_push(&mut self, end: char) {
        let mut buf = [0u8; 4];
        let _ = io::stdout().write_all(end.encode_utf8(&mut buf).as_bytes());
        if end == '\n' {
            let _ = io::stdout().flush();
        }
    }
}

/// `LogWriter` that collects all output into a shared string buffer.
///
/// Clones share the same buffer, so a host can hand one clone to the
/// Context and keep another to read what `trace` produced. Useful for
/// testing or capturing trace output programmatically.
#[derive(Debug, Clone, Default)]
pub struct CollectStringLog(Rc<RefCell<String>>);

impl CollectStringLog {
    /// Creates a new empty `CollectStringLog`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the collected output.
    ///
    /// # Panics
    /// Panics if the shared buffer is currently borrowed mutably.
    #[must_use]
    pub fn output(&self) -> String {
        self.0.borrow().clone()
    }
}

impl LogWriter for CollectStringLog {
    fn log_write(&mut self, text: &str) {
        self.0.borrow_mut().push_str(text);
    }

    fn log_push(&mut self, end: char) {
        self.0.borrow_mut().push(end);
    }
}

/// `LogWriter` that ignores all output.
#[derive(Debug, Default)]
pub struct NoLog;

impl LogWriter for NoLog {
    fn log_write(&mut self, _text: &str) {}

    fn log_push(&mut self, _end: char) {}
}
