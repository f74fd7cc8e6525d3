//! The three error kinds, and that none of them poison the Context.

use vesper::{CompileError, Context, Error, LanguageError, ParseError};

fn eval_err(ctx: &mut Context, source: &str) -> Error {
    ctx.eval(source)
        .err()
        .unwrap_or_else(|| panic!("evaluation of {source:?} should fail"))
}

#[test]
fn parse_errors_surface_and_do_not_consume() {
    let mut ctx = Context::new();
    assert!(matches!(
        eval_err(&mut ctx, ")"),
        Error::Parse(ParseError::UnexpectedClose)
    ));
    // The offending text is still buffered; a retry hits it again.
    assert!(matches!(
        eval_err(&mut ctx, ""),
        Error::Parse(ParseError::UnexpectedClose)
    ));
    ctx.discard_pending_input();
    assert_eq!(ctx.eval("(+ 1 1)").expect("context recovered").to_string(), "2");
}

#[test]
fn unquote_outside_backquote() {
    let mut ctx = Context::new();
    assert!(matches!(
        eval_err(&mut ctx, ",x"),
        Error::Parse(ParseError::UnquoteOutsideBackquote)
    ));
    ctx.discard_pending_input();
}

#[test]
fn misplaced_dot() {
    let mut ctx = Context::new();
    assert!(matches!(
        eval_err(&mut ctx, "(1 . 2 3)"),
        Error::Parse(ParseError::MisplacedDot)
    ));
}

#[test]
fn compile_errors_abort_only_the_offending_form() {
    let mut ctx = Context::new();
    ctx.eval("(set! a 1)").expect("first form runs");
    assert!(matches!(
        eval_err(&mut ctx, "(set! 5 5)"),
        Error::Compile(CompileError::InvalidLValue(_))
    ));
    // Earlier forms remain in effect.
    assert_eq!(ctx.eval("a").expect("context usable").to_string(), "1");
}

#[test]
fn special_form_arity_errors() {
    let mut ctx = Context::new();
    assert!(matches!(
        eval_err(&mut ctx, "(quote)"),
        Error::Compile(CompileError::SpecialFormArity { form: "quote", .. })
    ));
    assert!(matches!(
        eval_err(&mut ctx, "(if)"),
        Error::Compile(CompileError::SpecialFormArity { form: "if", .. })
    ));
    assert!(matches!(
        eval_err(&mut ctx, "(set! x)"),
        Error::Compile(CompileError::SpecialFormArity { form: "set!", .. })
    ));
    assert!(matches!(
        eval_err(&mut ctx, "(lambda)"),
        Error::Compile(CompileError::SpecialFormArity { form: "lambda", .. })
    ));
    assert!(matches!(
        eval_err(&mut ctx, "(while)"),
        Error::Compile(CompileError::SpecialFormArity { form: "while", .. })
    ));
}

#[test]
fn invalid_parameter_lists() {
    let mut ctx = Context::new();
    assert!(matches!(
        eval_err(&mut ctx, "(lambda (1) 1)"),
        Error::Compile(CompileError::InvalidParameterList(_))
    ));
    assert!(matches!(
        eval_err(&mut ctx, "(lambda \"ps\" 1)"),
        Error::Compile(CompileError::InvalidParameterList(_))
    ));
}

#[test]
fn improper_call_forms() {
    let mut ctx = Context::new();
    assert!(matches!(
        eval_err(&mut ctx, "(car . 5)"),
        Error::Compile(CompileError::ImproperCall(_))
    ));
}

#[test]
fn redefining_a_macro_as_a_function_is_reported() {
    let mut ctx = Context::new();
    ctx.eval("(defmacro twice (x) `(+ ,x ,x))").expect("macro defined");
    assert!(matches!(
        eval_err(&mut ctx, "(set! twice (lambda (x) (* 2 x)))"),
        Error::Compile(CompileError::MacroRedefinition(_))
    ));
    // Library macros are covered by the same rule.
    assert!(matches!(
        eval_err(&mut ctx, "(set! let 5)"),
        Error::Compile(CompileError::MacroRedefinition(_))
    ));
}

#[test]
fn reserved_words_cannot_be_rebound() {
    let mut ctx = Context::new();
    assert!(matches!(
        eval_err(&mut ctx, "(set! if 5)"),
        Error::Compile(CompileError::ReservedName(_))
    ));
    assert!(matches!(
        eval_err(&mut ctx, "(defmacro while (x) x)"),
        Error::Compile(CompileError::ReservedName(_))
    ));
}

#[test]
fn calling_a_non_closure() {
    let mut ctx = Context::new();
    assert!(matches!(
        eval_err(&mut ctx, "(5 6)"),
        Error::Language(LanguageError::NotAClosure(_))
    ));
    assert!(matches!(
        eval_err(&mut ctx, "(no-such-function 1)"),
        Error::Language(LanguageError::NotAClosure(_)),
    ));
}

#[test]
fn arity_mismatch_at_call_time() {
    let mut ctx = Context::new();
    assert!(matches!(
        eval_err(&mut ctx, "((lambda (x) x))"),
        Error::Language(LanguageError::ArityMismatch { expected: 1, got: 0 })
    ));
    assert!(matches!(
        eval_err(&mut ctx, "((lambda (x) x) 1 2)"),
        Error::Language(LanguageError::ArityMismatch { expected: 1, got: 2 })
    ));
    // Dotted parameter lists set a minimum, not an exact count.
    assert!(matches!(
        eval_err(&mut ctx, "((lambda (a b . r) r) 1)"),
        Error::Language(LanguageError::ArityMismatch { expected: 2, got: 1 })
    ));
}

#[test]
fn primitive_type_errors() {
    let mut ctx = Context::new();
    assert!(matches!(
        eval_err(&mut ctx, "(+ 1 \"two\")"),
        Error::Language(LanguageError::TypeMismatch { expected: "number", .. })
    ));
    assert!(matches!(
        eval_err(&mut ctx, "(car 5)"),
        Error::Language(LanguageError::TypeMismatch { expected: "cons", .. })
    ));
    assert!(matches!(
        eval_err(&mut ctx, "(car '())"),
        Error::Language(LanguageError::TypeMismatch { expected: "cons", .. })
    ));
}

#[test]
fn division_by_integer_zero() {
    let mut ctx = Context::new();
    assert!(matches!(
        eval_err(&mut ctx, "(/ 1 0)"),
        Error::Language(LanguageError::DivideByZero)
    ));
    // Float division by zero follows IEEE instead.
    assert_eq!(ctx.eval("(/ 1.0 0)").expect("float division").to_string(), "inf");
}

#[test]
fn out_of_bounds_list_access() {
    let mut ctx = Context::new();
    assert!(matches!(
        eval_err(&mut ctx, "(nth '(1 2) 5)"),
        Error::Language(LanguageError::IndexOutOfBounds { index: 5, len: 2 })
    ));
    assert!(matches!(
        eval_err(&mut ctx, "(vector-get (vector 1) 3)"),
        Error::Language(LanguageError::IndexOutOfBounds { index: 3, len: 1 })
    ));
}

#[test]
fn unknown_primitive_arity() {
    let mut ctx = Context::new();
    // The division stub exists, but no registered arity matches 3 arguments.
    assert!(matches!(
        eval_err(&mut ctx, "(/ 1 2 3)"),
        Error::Language(LanguageError::UnknownPrimitive { argc: 3, .. })
    ));
}

#[test]
fn runtime_errors_leave_the_context_usable() {
    let mut ctx = Context::new();
    ctx.eval("(set! keep 7)").expect("binding set");
    let _ = eval_err(&mut ctx, "(car 5)");
    assert_eq!(ctx.eval("keep").expect("context usable").to_string(), "7");
    assert_eq!(ctx.eval("(+ 2 2)").expect("context usable").to_string(), "4");
}

#[test]
fn errors_format_readably() {
    let mut ctx = Context::new();
    let message = eval_err(&mut ctx, "(car 5)").to_string();
    assert!(message.contains("expected cons"), "{message}");
    let message = eval_err(&mut ctx, "((lambda (x) x))").to_string();
    assert!(message.contains("expected 1 argument"), "{message}");
}
