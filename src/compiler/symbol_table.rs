use core::fmt;
use std::collections::HashMap;

use arbitrary::Arbitrary;
use lasso::{Rodeo, Spur};

/// Storage classification of a declared name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Arbitrary)]
pub enum Kind {
    Static,
    Field,
    Argument,
    Local,
}

impl Kind {
    fn slot(self) -> usize {
        match self {
            Self::Static => 0,
            Self::Field => 1,
            Self::Argument => 2,
            Self::Local => 3,
        }
    }

    /// Static and field names live as long as the class does
    pub fn is_class_scoped(self) -> bool {
        matches!(self, Self::Static | Self::Field)
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Static => "static",
            Self::Field => "field",
            Self::Argument => "argument",
            Self::Local => "local",
        })
    }
}

#[derive(Debug, Clone, Copy)]
struct Symbol {
    ty: Spur,
    kind: Kind,
    index: u16,
}

/// A name that resolved to a declared variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Variable<'t> {
    pub kind: Kind,
    pub ty: &'t str,
    pub index: u16,
}

/// Outcome of looking a name up in both scopes.
///
/// A name that is not declared anywhere is taken to be a class name, which is
/// how qualified calls like `Math.abs(x)` are told apart from `ball.move()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution<'t> {
    Variable(Variable<'t>),
    ClassReference,
}

/// Two-level scope: a class scope holding statics and fields, and a
/// subroutine scope holding arguments and locals that is reset for every
/// subroutine. Lookups search the subroutine scope first.
#[derive(Debug, Default)]
pub struct SymbolTable {
    names: Rodeo,
    class_scope: HashMap<Spur, Symbol>,
    subroutine_scope: HashMap<Spur, Symbol>,
    counts: [u16; 4],
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears the subroutine scope and restarts argument and local numbering.
    /// The class scope is left alone.
    pub fn start_subroutine(&mut self) {
        self.subroutine_scope.clear();
        self.counts[Kind::Argument.slot()] = 0;
        self.counts[Kind::Local.slot()] = 0;
    }

    /// Binds `name` to the next free index of `kind`, returning that index,
    /// or `None` once `kind` has run out of indices.
    ///
    /// Redeclaring a name in the same scope replaces the old binding, but the
    /// index it held stays allocated.
    pub fn define(&mut self, name: &str, ty: &str, kind: Kind) -> Option<u16> {
        let count = &mut self.counts[kind.slot()];
        let index = *count;
        // the count itself has to fit the `function` header
        *count = count.checked_add(1)?;

        let symbol = Symbol {
            ty: self.names.get_or_intern(ty),
            kind,
            index,
        };
        let name_key = self.names.get_or_intern(name);
        let scope = if kind.is_class_scoped() {
            &mut self.class_scope
        } else {
            &mut self.subroutine_scope
        };
        if scope.insert(name_key, symbol).is_some() {
            log::warn!("`{name}` redeclared as {kind} {index}");
        }

        Some(index)
    }

    /// Number of names of `kind` allocated in the current scope lifetime
    pub fn var_count(&self, kind: Kind) -> u16 {
        self.counts[kind.slot()]
    }

    fn lookup(&self, name: &str) -> Option<&Symbol> {
        // A name never interned was never defined
        let key = self.names.get(name)?;
        self.subroutine_scope
            .get(&key)
            .or_else(|| self.class_scope.get(&key))
    }

    pub fn resolve(&self, name: &str) -> Resolution<'_> {
        match self.lookup(name) {
            Some(symbol) => Resolution::Variable(Variable {
                kind: symbol.kind,
                ty: self.names.resolve(&symbol.ty),
                index: symbol.index,
            }),
            None => Resolution::ClassReference,
        }
    }

    pub fn kind_of(&self, name: &str) -> Option<Kind> {
        self.lookup(name).map(|s| s.kind)
    }

    pub fn type_of(&self, name: &str) -> Option<&str> {
        self.lookup(name).map(|s| self.names.resolve(&s.ty))
    }

    pub fn index_of(&self, name: &str) -> Option<u16> {
        self.lookup(name).map(|s| s.index)
    }
}
