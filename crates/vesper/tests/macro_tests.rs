//! Macro definition, expansion, and the in-language standard library.

use pretty_assertions::assert_eq;
use vesper::{CollectStringLog, Context};

fn eval(ctx: &mut Context, source: &str) -> String {
    ctx.eval(source)
        .unwrap_or_else(|e| panic!("evaluation of {source:?} failed: {e}"))
        .to_string()
}

#[test]
fn defmacro_defines_and_expands() {
    let mut ctx = Context::new();
    let ack = eval(&mut ctx, "(defmacro inc1 (x) `(+ ,x 1))");
    assert!(ack.starts_with("[Closure"), "defmacro acknowledges with a closure: {ack}");
    assert_eq!(eval(&mut ctx, "(inc1 (inc1 (inc1 1)))"), "4");
}

#[test]
fn mx1_is_a_single_step() {
    let mut ctx = Context::new();
    eval(&mut ctx, "(defmacro inc1 (x) `(+ ,x 1))");
    assert_eq!(eval(&mut ctx, "(mx1 '(inc1 5))"), "(core:+ 5 1)");
    assert_eq!(eval(&mut ctx, "(mx1 '(inc1 (inc1 5)))"), "(core:+ (inc1 5) 1)");
    // Non-macro forms come back unchanged.
    assert_eq!(eval(&mut ctx, "(mx1 '(car x))"), "(core:car x)");
    assert_eq!(eval(&mut ctx, "(mx1 5)"), "5");
}

#[test]
fn mx_reaches_the_fixed_point() {
    let mut ctx = Context::new();
    eval(&mut ctx, "(defmacro inc1 (x) `(+ ,x 1))");
    assert_eq!(eval(&mut ctx, "(mx '(inc1 (inc1 5)))"), "(core:+ (core:+ 5 1) 1)");
    // mx is the fixed point of iterated mx1.
    assert_eq!(
        eval(&mut ctx, "(mx (mx '(inc1 (inc1 5))))"),
        eval(&mut ctx, "(mx '(inc1 (inc1 5)))")
    );
}

#[test]
fn macros_with_rest_parameters() {
    let mut ctx = Context::new();
    eval(&mut ctx, "(defmacro firstof forms (car forms))");
    assert_eq!(eval(&mut ctx, "(firstof (+ 1 2) unbound-thing)"), "3");
}

#[test]
fn let_binds_in_parallel() {
    let mut ctx = Context::new();
    assert_eq!(eval(&mut ctx, "(let ((a 1) (b 2)) (+ a b))"), "3");
    assert_eq!(eval(&mut ctx, "(let () 42)"), "42");
    // Parallel, not sequential: inner a refers to the outer binding.
    assert_eq!(eval(&mut ctx, "(let ((a 1)) (let ((a 2) (b a)) b))"), "1");
}

#[test]
fn let_star_binds_sequentially() {
    let mut ctx = Context::new();
    assert_eq!(eval(&mut ctx, "(let* ((a 1) (b (+ a 1)) (c (* b 2))) c)"), "4");
    assert_eq!(eval(&mut ctx, "(let* () 9)"), "9");
}

#[test]
fn letrec_supports_mutual_recursion() {
    let mut ctx = Context::new();
    let source = "(letrec ((even? (lambda (n) (if (= n 0) #t (odd? (- n 1)))))
                           (odd?  (lambda (n) (if (= n 0) #f (even? (- n 1))))))
                    (even? 10))";
    assert_eq!(eval(&mut ctx, source), "#t");
}

#[test]
fn define_sugar() {
    let mut ctx = Context::new();
    assert_eq!(eval(&mut ctx, "(begin (define answer 42) answer)"), "42");
    eval(&mut ctx, "(define (double n) (* n 2))");
    assert_eq!(eval(&mut ctx, "(double 21)"), "42");
    eval(&mut ctx, "(define (weird a . rest) (cons a rest))");
    assert_eq!(eval(&mut ctx, "(weird 1 2 3)"), "(1 2 3)");
}

#[test]
fn and_or_short_circuit() {
    let mut ctx = Context::new();
    assert_eq!(eval(&mut ctx, "(and)"), "#t");
    assert_eq!(eval(&mut ctx, "(and 1 2 3)"), "3");
    assert_eq!(eval(&mut ctx, "(and 1 #f 3)"), "#f");
    assert_eq!(eval(&mut ctx, "(or)"), "#f");
    assert_eq!(eval(&mut ctx, "(or #f 4)"), "4");
    assert_eq!(eval(&mut ctx, "(or #f #f)"), "#f");
    // The right-hand sides must not evaluate once the answer is known.
    assert_eq!(eval(&mut ctx, "(begin (set! hits 0) (or 1 (set! hits 99)) hits)"), "0");
    assert_eq!(eval(&mut ctx, "(begin (and #f (set! hits 99)) hits)"), "0");
}

#[test]
fn cond_clauses() {
    let mut ctx = Context::new();
    assert_eq!(eval(&mut ctx, "(cond (#f 1) (#t 2) (else 3))"), "2");
    assert_eq!(eval(&mut ctx, "(cond (#f 1) (else 3))"), "3");
    assert_eq!(eval(&mut ctx, "(cond)"), "()");
    // A clause with no body yields the test's value.
    assert_eq!(eval(&mut ctx, "(cond (#f) (7))"), "7");
}

#[test]
fn case_dispatches_on_eq() {
    let mut ctx = Context::new();
    eval(&mut ctx, "(define (name n) (case n (1 \"one\") (2 \"two\") (else \"many\")))");
    assert_eq!(eval(&mut ctx, "(name 1)"), "\"one\"");
    assert_eq!(eval(&mut ctx, "(name 2)"), "\"two\"");
    assert_eq!(eval(&mut ctx, "(name 9)"), "\"many\"");
    eval(&mut ctx, "(define (kind s) (case s (a 1) (b 2) (else 0)))");
    assert_eq!(eval(&mut ctx, "(kind 'b)"), "2");
}

#[test]
fn dotimes_and_for() {
    let mut ctx = Context::new();
    assert_eq!(
        eval(&mut ctx, "(begin (set! total 0) (dotimes (i 5) (set! total (+ total i))) total)"),
        "10"
    );
    assert_eq!(
        eval(&mut ctx, "(begin (set! total 0) (for (i 2 5) (set! total (+ total i))) total)"),
        "9"
    );
}

#[test]
fn library_list_utilities() {
    let mut ctx = Context::new();
    assert_eq!(eval(&mut ctx, "(second '(1 2 3))"), "2");
    assert_eq!(eval(&mut ctx, "(third '(1 2 3))"), "3");
    assert_eq!(eval(&mut ctx, "(reverse '(1 2 3))"), "(3 2 1)");
    assert_eq!(eval(&mut ctx, "(reverse '())"), "()");
    assert_eq!(eval(&mut ctx, "(reduce + 0 '(1 2 3 4))"), "10");
    assert_eq!(eval(&mut ctx, "(reduce (lambda (acc x) (cons x acc)) '() '(1 2))"), "(2 1)");
}

#[test]
fn gensym_returns_fresh_symbols() {
    let mut ctx = Context::new();
    assert_eq!(eval(&mut ctx, "(eq? (gensym) (gensym))"), "#f");
    assert_eq!(eval(&mut ctx, "(symbol? (gensym))"), "#t");
    let named = eval(&mut ctx, "(gensym \"tmp-\")");
    assert!(named.starts_with("tmp-"), "prefix is honored: {named}");
}

#[test]
fn trace_writes_through_the_log_sink() {
    let log = CollectStringLog::new();
    let mut ctx = Context::with_log(Box::new(log.clone()));
    assert_eq!(eval(&mut ctx, "(trace 1 \"two\" '(3))"), "()");
    assert_eq!(log.output(), "1 \"two\" (3)\n");
}

#[test]
fn macros_capture_symbols_unhygienically() {
    let mut ctx = Context::new();
    // A macro that intentionally reaches for the caller's binding of `it`.
    eval(&mut ctx, "(defmacro with-it (v . body) `(let ((it ,v)) ,@body))");
    assert_eq!(eval(&mut ctx, "(with-it 7 (+ it 1))"), "8");
}

#[test]
fn bare_context_has_no_library() {
    let mut ctx = Context::bare();
    assert_eq!(eval(&mut ctx, "(+ 1 2)"), "3", "primitives exist without the library");
    // `let` is not defined, so it reads as an unbound global and the call fails.
    assert!(ctx.eval("(let ((a 1)) a)").is_err());
}
