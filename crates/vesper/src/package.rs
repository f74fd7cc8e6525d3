//! Interned symbols, packages, and the process-scoped package registry.
//!
//! A package guarantees a unique [`Symbol`] per name, so symbol equality is
//! pointer identity. Packages are stored centrally in [`Packages`] and
//! addressed by a copyable [`PackageId`] instead of shared pointers; since
//! scope relationships are known wherever a symbol is in hand, a plain index
//! into central storage avoids reference cycles between symbols and their
//! owning packages.

use std::{cell::Cell, fmt, rc::Rc};

use ahash::AHashMap;
use indexmap::IndexMap;

use crate::value::{Closure, Value};

/// Unique identifier of a package inside a [`Packages`] registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PackageId(u32);

impl PackageId {
    /// The unnamed global package.
    pub const GLOBAL: Self = Self(0);
    /// The keywords package (its name is the empty string, prefix `:`).
    pub const KEYWORDS: Self = Self(1);
    /// The core package holding primitives; auto-imported by user packages.
    pub const CORE: Self = Self(2);

    fn index(self) -> usize {
        self.0 as usize
    }
}

/// An interned name: `(name, package, exported?)`.
///
/// Cheap to clone; two symbols interned in the same package under the same
/// name are the same allocation, so [`ptr_eq`](Self::ptr_eq) is the equality.
#[derive(Clone)]
pub struct Symbol(Rc<SymbolData>);

struct SymbolData {
    name: Rc<str>,
    package: PackageId,
    /// Printed package prefix: `None` for the global package, `Some("")`
    /// for keywords, otherwise the package name.
    prefix: Option<Rc<str>>,
    exported: Cell<bool>,
}

impl Symbol {
    fn new(name: &str, package: PackageId, prefix: Option<Rc<str>>, exported: bool) -> Self {
        Self(Rc::new(SymbolData {
            name: Rc::from(name),
            package,
            prefix,
            exported: Cell::new(exported),
        }))
    }

    /// The symbol's bare name, without any package prefix.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub(crate) fn name_rc(&self) -> Rc<str> {
        Rc::clone(&self.0.name)
    }

    /// The package that interned this symbol.
    #[must_use]
    pub fn package(&self) -> PackageId {
        self.0.package
    }

    /// Whether import-chain lookup from other packages may see this symbol.
    #[must_use]
    pub fn is_exported(&self) -> bool {
        self.0.exported.get()
    }

    /// Sets the exported flag (mutable post-creation by design).
    pub fn set_exported(&self, exported: bool) {
        self.0.exported.set(exported);
    }

    /// Identity comparison; sound because symbols are interned.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.prefix.as_deref() {
            None => write!(f, "{}", self.0.name),
            Some("") => write!(f, ":{}", self.0.name),
            Some(pkg) => write!(f, "{pkg}:{}", self.0.name),
        }
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({self})")
    }
}

/// A compiled macro: name, formal parameters, and the body closure executed
/// at compile time on unevaluated argument forms.
#[derive(Debug, Clone)]
pub struct Macro {
    /// The symbol the macro is installed under.
    pub name: Symbol,
    /// Formal parameter list (possibly dotted).
    pub params: Value,
    /// Compiled body.
    pub body: Closure,
}

/// One package: interning table, value bindings, macro table, import list.
#[derive(Debug)]
struct Package {
    /// `None` only for the global package.
    name: Option<Rc<str>>,
    interned: AHashMap<Rc<str>, Symbol>,
    bindings: AHashMap<Rc<str>, Value>,
    macros: AHashMap<Rc<str>, Macro>,
    imports: Vec<PackageId>,
}

impl Package {
    fn new(name: Option<Rc<str>>) -> Self {
        Self {
            name,
            interned: AHashMap::new(),
            bindings: AHashMap::new(),
            macros: AHashMap::new(),
            imports: Vec::new(),
        }
    }
}

/// Symbols for the reserved words and rewrite helpers, interned once at
/// registry construction so the parser and compiler can compare by identity.
#[derive(Debug, Clone)]
pub(crate) struct Reserved {
    pub quote: Symbol,
    pub begin: Symbol,
    pub set_bang: Symbol,
    pub if_sym: Symbol,
    pub if_star: Symbol,
    pub lambda: Symbol,
    pub defmacro: Symbol,
    pub dot: Symbol,
    pub while_sym: Symbol,
    /// `,` marker produced while reading backquote templates.
    pub unquote: Symbol,
    /// `,@` marker produced while reading backquote templates.
    pub splice: Symbol,
    /// `core:list`, referenced by the quasiquote rewrite.
    pub list: Symbol,
    /// `core:append`, referenced by the quasiquote rewrite.
    pub append: Symbol,
}

/// Names that always intern into the global package, whatever the current
/// package is.
pub(crate) const RESERVED_NAMES: &[&str] = &[
    "quote", "begin", "set!", "if", "if*", "lambda", "defmacro", ".", "while",
];

/// Process-scoped registry of packages plus the *current* package cursor.
///
/// Holds at minimum the unnamed global package, the keywords package, and
/// the core package. Every user package (and global) implicitly imports
/// core.
#[derive(Debug)]
pub struct Packages {
    list: Vec<Package>,
    by_name: IndexMap<String, PackageId>,
    current: PackageId,
    reserved: Reserved,
}

impl Default for Packages {
    fn default() -> Self {
        Self::new()
    }
}

impl Packages {
    /// Creates the baseline registry: global, keywords, core.
    #[must_use]
    pub fn new() -> Self {
        let mut list = vec![
            Package::new(None),
            Package::new(Some(Rc::from(""))),
            Package::new(Some(Rc::from("core"))),
        ];
        list[PackageId::GLOBAL.index()].imports.push(PackageId::CORE);

        let mut by_name = IndexMap::new();
        by_name.insert(String::new(), PackageId::KEYWORDS);
        by_name.insert("core".to_owned(), PackageId::CORE);

        let reserved = Reserved {
            quote: Self::intern_raw(&mut list, PackageId::GLOBAL, "quote"),
            begin: Self::intern_raw(&mut list, PackageId::GLOBAL, "begin"),
            set_bang: Self::intern_raw(&mut list, PackageId::GLOBAL, "set!"),
            if_sym: Self::intern_raw(&mut list, PackageId::GLOBAL, "if"),
            if_star: Self::intern_raw(&mut list, PackageId::GLOBAL, "if*"),
            lambda: Self::intern_raw(&mut list, PackageId::GLOBAL, "lambda"),
            defmacro: Self::intern_raw(&mut list, PackageId::GLOBAL, "defmacro"),
            dot: Self::intern_raw(&mut list, PackageId::GLOBAL, "."),
            while_sym: Self::intern_raw(&mut list, PackageId::GLOBAL, "while"),
            unquote: Self::intern_raw(&mut list, PackageId::GLOBAL, ","),
            splice: Self::intern_raw(&mut list, PackageId::GLOBAL, ",@"),
            list: Self::intern_raw(&mut list, PackageId::CORE, "list"),
            append: Self::intern_raw(&mut list, PackageId::CORE, "append"),
        };

        Self {
            list,
            by_name,
            current: PackageId::GLOBAL,
            reserved,
        }
    }

    fn intern_raw(list: &mut [Package], id: PackageId, name: &str) -> Symbol {
        if let Some(sym) = list[id.index()].interned.get(name) {
            return sym.clone();
        }
        let prefix = list[id.index()].name.clone();
        let exported = id == PackageId::KEYWORDS;
        let sym = Symbol::new(name, id, prefix, exported);
        list[id.index()].interned.insert(sym.name_rc(), sym.clone());
        sym
    }

    /// Restores the registry to the baseline state (global, keywords, core;
    /// current = global). All user packages, bindings, and macros are gone.
    pub fn reinitialize(&mut self) {
        *self = Self::new();
    }

    pub(crate) fn reserved(&self) -> &Reserved {
        &self.reserved
    }

    /// Looks up a package by name. The global package has no name and is
    /// never returned here.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<PackageId> {
        self.by_name.get(name).copied()
    }

    /// Looks up a package by name, creating it if absent. New packages
    /// implicitly import core.
    pub fn find_or_create(&mut self, name: &str) -> PackageId {
        if let Some(id) = self.by_name.get(name) {
            return *id;
        }
        let id = PackageId(u32::try_from(self.list.len()).expect("package registry exceeds u32"));
        let mut package = Package::new(Some(Rc::from(name)));
        package.imports.push(PackageId::CORE);
        self.list.push(package);
        self.by_name.insert(name.to_owned(), id);
        id
    }

    /// The current package, which the reader interns new bare symbols into.
    #[must_use]
    pub fn current(&self) -> PackageId {
        self.current
    }

    /// Switches the current package.
    pub fn set_current(&mut self, id: PackageId) {
        self.current = id;
    }

    /// The package's name; `None` for the global package.
    #[must_use]
    pub fn name_of(&self, id: PackageId) -> Option<&str> {
        self.list[id.index()].name.as_deref()
    }

    /// Interns `name` in the given package, returning the unique symbol.
    /// Keyword symbols are born exported so they are visible everywhere.
    pub fn intern(&mut self, id: PackageId, name: &str) -> Symbol {
        Self::intern_raw(&mut self.list, id, name)
    }

    /// True if the package has already interned `name`.
    #[must_use]
    pub fn is_interned(&self, id: PackageId, name: &str) -> bool {
        self.list[id.index()].interned.contains_key(name)
    }

    /// Resolves a bare (unprefixed) name against the current package.
    ///
    /// The current package's own table wins; otherwise the import chain is
    /// walked in order, accepting only exported symbols; otherwise the name
    /// is interned fresh in the current package. Import resolution happens
    /// here, at read time — a symbol's bindings always live in its owning
    /// package.
    pub fn resolve_bare(&mut self, name: &str) -> Symbol {
        let current = self.current;
        if let Some(sym) = self.list[current.index()].interned.get(name) {
            return sym.clone();
        }
        for import in self.list[current.index()].imports.clone() {
            if let Some(sym) = self.list[import.index()].interned.get(name)
                && sym.is_exported()
            {
                return sym.clone();
            }
        }
        self.intern(current, name)
    }

    /// Adds `dep` to `id`'s import list (idempotent).
    pub fn add_import(&mut self, id: PackageId, dep: PackageId) {
        let imports = &mut self.list[id.index()].imports;
        if !imports.contains(&dep) {
            imports.push(dep);
        }
    }

    /// The ordered import list of a package.
    #[must_use]
    pub fn imports_of(&self, id: PackageId) -> &[PackageId] {
        &self.list[id.index()].imports
    }

    /// The value bound to `sym` in its owning package, if any.
    #[must_use]
    pub fn value_of(&self, sym: &Symbol) -> Option<Value> {
        self.list[sym.package().index()].bindings.get(sym.name()).cloned()
    }

    /// Binds `value` to `sym` in its owning package; binding nil unbinds.
    pub fn set_value(&mut self, sym: &Symbol, value: Value) {
        let bindings = &mut self.list[sym.package().index()].bindings;
        if matches!(value, Value::Nil) {
            bindings.remove(sym.name());
        } else {
            bindings.insert(sym.name_rc(), value);
        }
    }

    /// The macro installed under `sym` in its owning package, if any.
    #[must_use]
    pub fn macro_of(&self, sym: &Symbol) -> Option<Macro> {
        self.list[sym.package().index()].macros.get(sym.name()).cloned()
    }

    /// Installs a macro under `sym` in its owning package.
    pub fn set_macro(&mut self, sym: &Symbol, mac: Macro) {
        self.list[sym.package().index()].macros.insert(sym.name_rc(), mac);
    }

    /// All exported symbols of a package, sorted by name for determinism.
    #[must_use]
    pub fn exported_symbols(&self, id: PackageId) -> Vec<Symbol> {
        let mut symbols: Vec<Symbol> = self.list[id.index()]
            .interned
            .values()
            .filter(|s| s.is_exported())
            .cloned()
            .collect();
        symbols.sort_by(|a, b| a.name().cmp(b.name()));
        symbols
    }

    /// Marks every symbol interned in the package as exported.
    pub fn export_all(&mut self, id: PackageId) {
        for sym in self.list[id.index()].interned.values() {
            sym.set_exported(true);
        }
    }

    /// Marks every symbol that carries a value binding or a macro as
    /// exported. Symbols interned only incidentally (parameter names,
    /// quoted data) stay private, so they do not shadow other packages'
    /// bare names through the import chain.
    pub fn export_bound(&mut self, id: PackageId) {
        let package = &self.list[id.index()];
        for sym in package.interned.values() {
            if package.bindings.contains_key(sym.name()) || package.macros.contains_key(sym.name()) {
                sym.set_exported(true);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_returns_the_same_symbol() {
        let mut packages = Packages::new();
        let a = packages.intern(PackageId::GLOBAL, "x");
        let b = packages.intern(PackageId::GLOBAL, "x");
        assert!(a.ptr_eq(&b));
    }

    #[test]
    fn symbols_in_different_packages_are_distinct() {
        let mut packages = Packages::new();
        let foo = packages.find_or_create("foo");
        let a = packages.intern(PackageId::GLOBAL, "x");
        let b = packages.intern(foo, "x");
        assert!(!a.ptr_eq(&b));
    }

    #[test]
    fn symbol_printing_by_package() {
        let mut packages = Packages::new();
        let global = packages.intern(PackageId::GLOBAL, "x");
        let keyword = packages.intern(PackageId::KEYWORDS, "k");
        let core = packages.intern(PackageId::CORE, "car");
        let foo = packages.find_or_create("foo");
        let qualified = packages.intern(foo, "y");
        assert_eq!(global.to_string(), "x");
        assert_eq!(keyword.to_string(), ":k");
        assert_eq!(core.to_string(), "core:car");
        assert_eq!(qualified.to_string(), "foo:y");
    }

    #[test]
    fn bare_resolution_prefers_current_then_exported_imports() {
        let mut packages = Packages::new();
        let plus = packages.intern(PackageId::CORE, "+");
        plus.set_exported(true);
        // Global imports core, so a bare `+` resolves to the core symbol.
        let resolved = packages.resolve_bare("+");
        assert!(resolved.ptr_eq(&plus));
        // An unexported core symbol is invisible; a fresh global symbol is interned.
        let hidden = packages.intern(PackageId::CORE, "hidden");
        let resolved = packages.resolve_bare("hidden");
        assert!(!resolved.ptr_eq(&hidden));
        assert_eq!(resolved.package(), PackageId::GLOBAL);
    }

    #[test]
    fn binding_nil_unbinds() {
        let mut packages = Packages::new();
        let sym = packages.intern(PackageId::GLOBAL, "x");
        packages.set_value(&sym, Value::Int(5));
        assert_eq!(packages.value_of(&sym), Some(Value::Int(5)));
        packages.set_value(&sym, Value::Nil);
        assert_eq!(packages.value_of(&sym), None);
    }

    #[test]
    fn new_packages_import_core() {
        let mut packages = Packages::new();
        let foo = packages.find_or_create("foo");
        assert_eq!(packages.imports_of(foo), &[PackageId::CORE]);
    }

    #[test]
    fn export_bound_skips_incidental_symbols() {
        let mut packages = Packages::new();
        let bound = packages.intern(PackageId::CORE, "bound-fn");
        packages.set_value(&bound, Value::Int(1));
        let incidental = packages.intern(PackageId::CORE, "scratch");
        packages.export_bound(PackageId::CORE);
        assert!(bound.is_exported());
        assert!(!incidental.is_exported(), "unbound symbols stay private");
        packages.export_all(PackageId::CORE);
        assert!(incidental.is_exported());
    }

    #[test]
    fn reinitialize_restores_baseline() {
        let mut packages = Packages::new();
        let foo = packages.find_or_create("foo");
        packages.set_current(foo);
        packages.reinitialize();
        assert_eq!(packages.current(), PackageId::GLOBAL);
        assert!(packages.find("foo").is_none());
        assert!(packages.find("core").is_some());
    }
}
