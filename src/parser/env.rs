use std::collections::HashMap;

use super::ctype::{CType, FuncSig};

/// What an identifier resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Symbol {
    Var { ctype: CType },
    Func(FuncSig),
}

/// Lexically scoped symbol environment.
///
/// A chain of frames rooted at the global scope; lookups walk from the
/// innermost frame outwards. A fresh frame is pushed on entry to a function
/// body or a nested compound statement and popped on exit.
#[derive(Debug, Clone, Default)]
pub struct Env {
    scopes: Vec<HashMap<String, Symbol>>,
}

impl Env {
    pub fn push(&mut self) {
        self.scopes.push(HashMap::default());
    }

    pub fn pop(&mut self) {
        self.scopes.pop();
    }

    /// Find a symbol, walking the scope chain from the inside out.
    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    pub fn contains_in_current_scope(&self, name: &str) -> bool {
        self.scopes
            .last()
            .map(|scope| scope.contains_key(name))
            .unwrap_or(false)
    }

    /// Bind a name in the innermost scope.
    pub fn insert(&mut self, name: &str, symbol: Symbol) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_owned(), symbol);
        }
    }

    /// Bind a name in the global scope, regardless of the current depth.
    pub fn insert_global(&mut self, name: &str, symbol: Symbol) {
        if let Some(scope) = self.scopes.first_mut() {
            scope.insert(name.to_owned(), symbol);
        }
    }
}

/// Create the global environment, pre-populated with the built-in prototypes
/// for `puts(const char *)` and the variadic `printf(const char *, ...)`.
pub fn setup_env() -> Env {
    let mut env = Env::default();
    env.push();

    env.insert(
        "puts",
        Symbol::Func(FuncSig {
            ret: CType::Int,
            params: vec![CType::Char.pointer_to()],
            variadic: false,
        }),
    );
    env.insert(
        "printf",
        Symbol::Func(FuncSig {
            ret: CType::Int,
            params: vec![CType::Char.pointer_to()],
            variadic: true,
        }),
    );

    env
}
