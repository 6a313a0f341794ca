use std::collections::HashMap;

/// Round `m` up to the next multiple of `n`.
pub fn align(m: i64, n: i64) -> i64 {
    let rem = m % n;
    if rem == 0 {
        m
    } else {
        m - rem + n
    }
}

/// Scoped map from variable name to its frame offset; a variable lives at
/// `-offset(%rbp)`. Scopes mirror the compound-statement nesting the parser
/// already validated, so lookups always resolve to the innermost binding.
#[derive(Debug, Default)]
pub struct Frame {
    scopes: Vec<HashMap<String, i64>>,
}

impl Frame {
    pub fn push(&mut self) {
        self.scopes.push(HashMap::default());
    }

    pub fn pop(&mut self) {
        self.scopes.pop();
    }

    pub fn insert(&mut self, name: &str, offset: i64) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_owned(), offset);
        }
    }

    pub fn lookup(&self, name: &str) -> i64 {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).copied())
            .unwrap_or_else(|| unreachable!("'{name}' was resolved by the parser"))
    }
}
