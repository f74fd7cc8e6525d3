//! The reader: characters in, tagged values out.
//!
//! `parse_next` reads one complete top-level form per call. When the buffer
//! runs out mid-form the stream is restored to the pre-attempt position and
//! the EOF sentinel (`Ok(None)`) is returned so the host can feed more text
//! and retry. Structural violations with input present (a stray `)`, `,`
//! outside a backquote, a misplaced `.`) are errors, also reported with the
//! stream restored so the offending text is not consumed.
//!
//! Quote and quasiquote are rewritten at read time: `'X` becomes
//! `(quote X)`, and backquote templates compile into explicit
//! `append`/`list`/`quote` constructions per the usual algebra, with an
//! all-`list` `append` collapsed into a single `list` call.

use crate::{
    error::ParseError,
    package::{PackageId, Packages, RESERVED_NAMES, Symbol},
    stream::InputStream,
    value::Value,
};

/// One parsed top-level form plus the source text it was read from.
#[derive(Debug, Clone)]
pub struct ParsedForm {
    /// The parsed value.
    pub value: Value,
    /// The exact source text consumed for this form.
    pub source: String,
}

/// Incremental s-expression reader over an [`InputStream`].
#[derive(Debug, Default)]
pub struct Parser {
    stream: InputStream,
}

impl Parser {
    /// Creates a parser with an empty input buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends source text to the input buffer.
    pub fn add(&mut self, text: &str) {
        self.stream.add(text);
    }

    /// Discards all pending input.
    pub fn clear(&mut self) {
        self.stream.clear();
    }

    /// Reads the next complete form, or `Ok(None)` when none is available.
    ///
    /// New symbols intern into the current package of `packages`; bare names
    /// resolve through its import chain.
    pub fn parse_next(&mut self, packages: &mut Packages) -> Result<Option<ParsedForm>, ParseError> {
        skip_atmosphere(&mut self.stream);
        if self.stream.at_eof() {
            self.stream.trim();
            return Ok(None);
        }
        if self.stream.peek() == Some(';') {
            // An unterminated trailing comment; wait for the newline.
            return Ok(None);
        }
        self.stream.save();
        let start = self.stream.cursor();
        match parse_form(&mut self.stream, packages, 0) {
            Ok(value) => {
                let source = self.stream.slice(start, self.stream.cursor()).to_owned();
                self.stream.trim();
                Ok(Some(ParsedForm { value, source }))
            }
            Err(ParseError::Incomplete) => {
                self.stream.restore();
                Ok(None)
            }
            Err(e) => {
                self.stream.restore();
                Err(e)
            }
        }
    }
}

/// Consumes whitespace and line comments. An unterminated comment is left
/// unconsumed so the reader can resume once the newline arrives.
fn skip_atmosphere(stream: &mut InputStream) {
    loop {
        while let Some(ch) = stream.peek() {
            if ch.is_whitespace() {
                stream.read();
            } else {
                break;
            }
        }
        if stream.peek() != Some(';') {
            return;
        }
        let mark = stream.cursor();
        loop {
            match stream.read() {
                Some('\n') => break,
                Some(_) => {}
                None => {
                    stream.set_cursor(mark);
                    return;
                }
            }
        }
    }
}

fn parse_form(stream: &mut InputStream, packages: &mut Packages, depth: u32) -> Result<Value, ParseError> {
    skip_atmosphere(stream);
    let Some(ch) = stream.peek() else {
        return Err(ParseError::Incomplete);
    };
    match ch {
        ';' => Err(ParseError::Incomplete),
        '(' => parse_list(stream, packages, depth),
        ')' => Err(ParseError::UnexpectedClose),
        '"' => parse_string(stream),
        '\'' => {
            stream.read();
            let form = parse_form(stream, packages, depth)?;
            let quote = packages.reserved().quote.clone();
            Ok(Value::list([Value::Symbol(quote), form]))
        }
        '`' => {
            stream.read();
            let template = parse_form(stream, packages, depth + 1)?;
            expand_template(&template, packages)
        }
        ',' => {
            stream.read();
            if depth == 0 {
                return Err(ParseError::UnquoteOutsideBackquote);
            }
            let marker = if stream.peek() == Some('@') {
                stream.read();
                packages.reserved().splice.clone()
            } else {
                packages.reserved().unquote.clone()
            };
            let form = parse_form(stream, packages, depth - 1)?;
            Ok(Value::list([Value::Symbol(marker), form]))
        }
        _ => parse_token(stream, packages),
    }
}

fn parse_list(stream: &mut InputStream, packages: &mut Packages, depth: u32) -> Result<Value, ParseError> {
    stream.read(); // consume '('
    let dot = packages.reserved().dot.clone();
    let mut items: Vec<Value> = Vec::new();
    let mut tail = Value::Nil;
    let mut seen_dot = false;
    let mut after_dot = 0usize;
    loop {
        skip_atmosphere(stream);
        match stream.peek() {
            None | Some(';') => return Err(ParseError::Incomplete),
            Some(')') => {
                stream.read();
                break;
            }
            Some(_) => {
                let form = parse_form(stream, packages, depth)?;
                if matches!(&form, Value::Symbol(s) if s.ptr_eq(&dot)) {
                    if items.is_empty() || seen_dot {
                        return Err(ParseError::MisplacedDot);
                    }
                    seen_dot = true;
                } else if seen_dot {
                    after_dot += 1;
                    if after_dot > 1 {
                        return Err(ParseError::MisplacedDot);
                    }
                    tail = form;
                } else {
                    items.push(form);
                }
            }
        }
    }
    if seen_dot && after_dot != 1 {
        return Err(ParseError::MisplacedDot);
    }
    let mut out = tail;
    for item in items.into_iter().rev() {
        out = Value::cons(item, out);
    }
    Ok(out)
}

fn parse_string(stream: &mut InputStream) -> Result<Value, ParseError> {
    stream.read(); // consume opening '"'
    let mut text = String::new();
    loop {
        match stream.read() {
            None => return Err(ParseError::Incomplete),
            // A backslash escapes any following character verbatim.
            Some('\\') => match stream.read() {
                None => return Err(ParseError::Incomplete),
                Some(escaped) => text.push(escaped),
            },
            Some('"') => break,
            Some(ch) => text.push(ch),
        }
    }
    Ok(Value::string(&text))
}

/// True for characters that terminate a token.
fn is_structural(ch: char) -> bool {
    ch.is_whitespace() || matches!(ch, '(' | ')' | '"' | ';' | '\'' | '`' | ',')
}

fn parse_token(stream: &mut InputStream, packages: &mut Packages) -> Result<Value, ParseError> {
    let mut token = String::new();
    while let Some(ch) = stream.peek() {
        if is_structural(ch) {
            break;
        }
        token.push(ch);
        stream.read();
    }
    classify_token(&token, packages)
}

fn classify_token(token: &str, packages: &mut Packages) -> Result<Value, ParseError> {
    if let Some(rest) = token.strip_prefix('#') {
        return Ok(Value::Bool(rest == "t" || rest == "T"));
    }
    let first = token.chars().next().expect("token is never empty");
    if first == '+' || first == '-' || first.is_ascii_digit() {
        if let Ok(i) = token.parse::<i32>() {
            return Ok(Value::Int(i));
        }
        if token.contains('.')
            && let Ok(x) = token.parse::<f32>()
        {
            return Ok(Value::Float(x));
        }
    }
    parse_symbol(token, packages)
}

fn parse_symbol(token: &str, packages: &mut Packages) -> Result<Value, ParseError> {
    // Reserved words always live in the global package.
    if RESERVED_NAMES.contains(&token) {
        return Ok(Value::Symbol(packages.intern(PackageId::GLOBAL, token)));
    }
    if let Some(name) = token.strip_prefix(':') {
        if name.is_empty() || name.contains(':') {
            return Err(ParseError::MalformedSymbol(token.to_owned()));
        }
        return Ok(Value::Symbol(packages.intern(PackageId::KEYWORDS, name)));
    }
    if let Some(split) = token.find(':') {
        let pkg_name = &token[..split];
        let name = &token[split + 1..];
        if name.is_empty() || name.contains(':') {
            return Err(ParseError::MalformedSymbol(token.to_owned()));
        }
        let pkg = packages.find_or_create(pkg_name);
        return Ok(Value::Symbol(packages.intern(pkg, name)));
    }
    Ok(Value::Symbol(packages.resolve_bare(token)))
}

/// Rewrites a backquote template into `append`/`list`/`quote` construction.
fn expand_template(template: &Value, packages: &Packages) -> Result<Value, ParseError> {
    let r = packages.reserved();
    let Value::Cons(_) = template else {
        // `atom → (quote atom)
        return Ok(Value::list([Value::Symbol(r.quote.clone()), template.clone()]));
    };
    if let Some(inner) = marker_payload(template, &r.unquote) {
        // `(,X) → X
        return Ok(inner);
    }
    if marker_payload(template, &r.splice).is_some() {
        return Err(ParseError::SpliceOutsideList);
    }

    let mut args: Vec<Value> = Vec::new();
    let mut node = template.clone();
    loop {
        match node {
            Value::Nil => break,
            Value::Cons(ref cell) => {
                // A trailing marker form is a dotted unquote: `(a . ,b)
                if let Some(inner) = marker_payload(&node, &r.unquote) {
                    args.push(inner);
                    break;
                }
                if marker_payload(&node, &r.splice).is_some() {
                    return Err(ParseError::SpliceOutsideList);
                }
                let element = cell.first.clone();
                if let Some(inner) = marker_payload(&element, &r.unquote) {
                    args.push(Value::list([Value::Symbol(r.list.clone()), inner]));
                } else if let Some(inner) = marker_payload(&element, &r.splice) {
                    args.push(inner);
                } else {
                    let expanded = expand_template(&element, packages)?;
                    args.push(Value::list([Value::Symbol(r.list.clone()), expanded]));
                }
                node = cell.rest.clone();
            }
            ref atom => {
                // Dotted literal tail becomes the final append argument.
                args.push(expand_template(atom, packages)?);
                break;
            }
        }
    }
    Ok(collapse_append(args, packages))
}

/// `(append (list a) (list b) …)` collapses into `(list a b …)`.
fn collapse_append(args: Vec<Value>, packages: &Packages) -> Value {
    let r = packages.reserved();
    if args.iter().all(|a| is_call_to(a, &r.list)) {
        let mut elements = vec![Value::Symbol(r.list.clone())];
        for arg in &args {
            let items = arg.proper_list_items().expect("list call is a proper list");
            elements.extend(items.into_iter().skip(1));
        }
        Value::list(elements)
    } else {
        let mut elements = vec![Value::Symbol(r.append.clone())];
        elements.extend(args);
        Value::list(elements)
    }
}

fn is_call_to(form: &Value, sym: &Symbol) -> bool {
    match form {
        Value::Cons(c) => matches!(&c.first, Value::Symbol(s) if s.ptr_eq(sym)) && form.is_proper_list(),
        _ => false,
    }
}

/// If `form` is a two-element list `(marker X)`, returns `X`.
fn marker_payload(form: &Value, marker: &Symbol) -> Option<Value> {
    let cell = form.as_cons()?;
    let Value::Symbol(head) = &cell.first else {
        return None;
    };
    if !head.ptr_eq(marker) {
        return None;
    }
    let rest = cell.rest.as_cons()?;
    if !matches!(rest.rest, Value::Nil) {
        return None;
    }
    Some(rest.first.clone())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn parse_one(source: &str) -> Value {
        let mut packages = Packages::new();
        parse_one_in(source, &mut packages)
    }

    fn parse_one_in(source: &str, packages: &mut Packages) -> Value {
        let mut parser = Parser::new();
        parser.add(source);
        parser
            .parse_next(packages)
            .expect("parse should succeed")
            .expect("a complete form should be present")
            .value
    }

    fn parse_err(source: &str) -> ParseError {
        let mut packages = Packages::new();
        let mut parser = Parser::new();
        parser.add(source);
        parser.parse_next(&mut packages).expect_err("parse should fail")
    }

    #[test]
    fn atoms() {
        assert_eq!(parse_one("42"), Value::Int(42));
        assert_eq!(parse_one("-7"), Value::Int(-7));
        assert_eq!(parse_one("+3"), Value::Int(3));
        assert_eq!(parse_one("2.5"), Value::Float(2.5));
        assert_eq!(parse_one("-0.5"), Value::Float(-0.5));
        assert_eq!(parse_one("#t"), Value::Bool(true));
        assert_eq!(parse_one("#T"), Value::Bool(true));
        assert_eq!(parse_one("#f"), Value::Bool(false));
        assert_eq!(parse_one("#anything"), Value::Bool(false));
        assert_eq!(parse_one("\"hi\""), Value::string("hi"));
        assert_eq!(parse_one("()"), Value::Nil);
    }

    #[test]
    fn sign_tokens_are_symbols() {
        assert_eq!(parse_one("+").to_string(), "+");
        assert_eq!(parse_one("-").to_string(), "-");
        assert_eq!(parse_one("1.5.2").to_string(), "1.5.2");
    }

    #[test]
    fn string_escapes_are_verbatim() {
        assert_eq!(parse_one(r#""a\"b""#), Value::string("a\"b"));
        assert_eq!(parse_one(r#""a\\b""#), Value::string("a\\b"));
        // \n is the character 'n', not a newline
        assert_eq!(parse_one(r#""a\nb""#), Value::string("anb"));
    }

    #[test]
    fn lists_and_dotted_pairs() {
        assert_eq!(parse_one("(1 2 3)").to_string(), "(1 2 3)");
        assert_eq!(parse_one("(1 . 2)").to_string(), "(1 . 2)");
        assert_eq!(parse_one("(1 2 . 3)").to_string(), "(1 2 . 3)");
        assert_eq!(parse_one("((1 2) (3))").to_string(), "((1 2) (3))");
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(parse_one("; a comment\n42"), Value::Int(42));
        assert_eq!(parse_one("(1 ; inline\n 2)").to_string(), "(1 2)");
    }

    #[test]
    fn quote_rewrites() {
        assert_eq!(parse_one("'x").to_string(), "(quote x)");
        assert_eq!(parse_one("'(1 2)").to_string(), "(quote (1 2))");
    }

    #[test]
    fn parse_roundtrips_printed_values() {
        for source in ["42", "2.5", "#t", "#f", "\"hi\"", "(1 2 3)", "(1 . 2)", "()"] {
            let value = parse_one(source);
            assert_eq!(parse_one(&value.to_string()).to_string(), value.to_string());
        }
    }

    #[test]
    fn backquote_atom_is_quoted() {
        assert_eq!(parse_one("`x").to_string(), "(quote x)");
        assert_eq!(parse_one("`()").to_string(), "(quote ())");
    }

    #[test]
    fn backquote_unquote_alone_is_identity() {
        assert_eq!(parse_one("`,x").to_string(), "x");
    }

    #[test]
    fn backquote_list_collapses_to_list_call() {
        assert_eq!(parse_one("`(a b)").to_string(), "(core:list (quote a) (quote b))");
        assert_eq!(parse_one("`(a ,x)").to_string(), "(core:list (quote a) x)");
    }

    #[test]
    fn backquote_splice_keeps_append() {
        assert_eq!(
            parse_one("`(1 ,@(f) 2)").to_string(),
            "(core:append (core:list (quote 1)) (f) (core:list (quote 2)))"
        );
    }

    #[test]
    fn backquote_nested_list_recurses() {
        assert_eq!(
            parse_one("`(a (b ,x))").to_string(),
            "(core:list (quote a) (core:list (quote b) x))"
        );
    }

    #[test]
    fn backquote_dotted_tail() {
        assert_eq!(
            parse_one("`(a . b)").to_string(),
            "(core:append (core:list (quote a)) (quote b))"
        );
        assert_eq!(
            parse_one("`(a . ,x)").to_string(),
            "(core:append (core:list (quote a)) x)"
        );
    }

    #[test]
    fn unquote_outside_backquote_is_an_error() {
        assert_eq!(parse_err(",x"), ParseError::UnquoteOutsideBackquote);
        assert_eq!(parse_err(",@x"), ParseError::UnquoteOutsideBackquote);
    }

    #[test]
    fn stray_close_and_misplaced_dot_are_errors() {
        assert_eq!(parse_err(")"), ParseError::UnexpectedClose);
        assert_eq!(parse_err("(. 1)"), ParseError::MisplacedDot);
        assert_eq!(parse_err("(1 . 2 3)"), ParseError::MisplacedDot);
        assert_eq!(parse_err("(1 . )"), ParseError::MisplacedDot);
    }

    #[test]
    fn incomplete_form_returns_eof_and_restores() {
        let mut packages = Packages::new();
        let mut parser = Parser::new();
        parser.add("(1 2");
        assert!(parser.parse_next(&mut packages).unwrap().is_none());
        // Re-feed the rest; the earlier text must still be there.
        parser.add(" 3)");
        let form = parser.parse_next(&mut packages).unwrap().unwrap();
        assert_eq!(form.value.to_string(), "(1 2 3)");
        assert_eq!(form.source, "(1 2 3)");
    }

    #[test]
    fn unterminated_string_waits_for_more_input() {
        let mut packages = Packages::new();
        let mut parser = Parser::new();
        parser.add("\"abc");
        assert!(parser.parse_next(&mut packages).unwrap().is_none());
        parser.add("def\"");
        let form = parser.parse_next(&mut packages).unwrap().unwrap();
        assert_eq!(form.value, Value::string("abcdef"));
    }

    #[test]
    fn error_does_not_consume_the_offending_form() {
        let mut packages = Packages::new();
        let mut parser = Parser::new();
        parser.add(")");
        assert_eq!(
            parser.parse_next(&mut packages).unwrap_err(),
            ParseError::UnexpectedClose
        );
        // Still there on the next attempt.
        assert_eq!(
            parser.parse_next(&mut packages).unwrap_err(),
            ParseError::UnexpectedClose
        );
    }

    #[test]
    fn multiple_forms_parse_in_sequence() {
        let mut packages = Packages::new();
        let mut parser = Parser::new();
        parser.add("1 2 (3)");
        assert_eq!(parser.parse_next(&mut packages).unwrap().unwrap().value, Value::Int(1));
        assert_eq!(parser.parse_next(&mut packages).unwrap().unwrap().value, Value::Int(2));
        assert_eq!(
            parser.parse_next(&mut packages).unwrap().unwrap().value.to_string(),
            "(3)"
        );
        assert!(parser.parse_next(&mut packages).unwrap().is_none());
    }

    #[test]
    fn symbols_intern_per_package() {
        let mut packages = Packages::new();
        let a = parse_one_in("x", &mut packages);
        let b = parse_one_in("x", &mut packages);
        assert_eq!(a, b, "same name in same package is the same symbol");
        assert_eq!(parse_one_in("foo:y", &mut packages).to_string(), "foo:y");
        assert_eq!(parse_one_in(":kw", &mut packages).to_string(), ":kw");
        assert!(packages.find("foo").is_some(), "prefixed symbol creates the package");
    }

    #[test]
    fn reserved_words_go_to_the_global_package() {
        let mut packages = Packages::new();
        let foo = packages.find_or_create("foo");
        packages.set_current(foo);
        let value = parse_one_in("lambda", &mut packages);
        let sym = value.as_symbol().expect("a symbol");
        assert_eq!(sym.package(), PackageId::GLOBAL);
        // A non-reserved bare name interns into the current package.
        let value = parse_one_in("banana", &mut packages);
        assert_eq!(value.as_symbol().expect("a symbol").package(), foo);
    }

    #[test]
    fn malformed_symbols_are_errors() {
        assert!(matches!(parse_err(":"), ParseError::MalformedSymbol(_)));
        assert!(matches!(parse_err("a:b:c"), ParseError::MalformedSymbol(_)));
        assert!(matches!(parse_err("pkg:"), ParseError::MalformedSymbol(_)));
    }
}
