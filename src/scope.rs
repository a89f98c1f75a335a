//! Layered variable store with a fixed seven-level priority chain.
//!
//! Scopes are owned by a small arena and reference their parent by index, so
//! the chain is acyclic by construction. Variable names are matched
//! case-sensitively; values are typed and stringified on template expansion.

use std::collections::HashMap;

/// The seven scope levels, highest priority first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeType {
    Request,
    File,
    Runtime,
    Environment,
    ScriptGlobal,
    Dynamic,
    System,
}

impl ScopeType {
    /// Resolution priority; a higher value wins over a lower one.
    #[must_use]
    pub const fn priority(self) -> u8 {
        match self {
            Self::Request => 7,
            Self::File => 6,
            Self::Runtime => 5,
            Self::Environment => 4,
            Self::ScriptGlobal => 3,
            Self::Dynamic => 2,
            Self::System => 1,
        }
    }
}

/// A typed variable value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Number(f64),
    Bool(bool),
}

impl Value {
    /// Stringification used on template expansion: `true`/`false`, integers
    /// without a decimal point, floats in shortest round-trip form.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::String(s) => s.clone(),
            Self::Bool(b) => b.to_string(),
            Self::Number(n) => {
                #[allow(clippy::cast_possible_truncation)]
                if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    n.to_string()
                }
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// Index of a scope in its [`ScopeArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeId(usize);

#[derive(Debug)]
struct Scope {
    scope_type: ScopeType,
    parent: Option<ScopeId>,
    values: HashMap<String, Value>,
}

/// Arena owning all scopes of a run.
#[derive(Debug, Default)]
pub struct ScopeArena {
    scopes: Vec<Scope>,
}

impl ScopeArena {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a scope with the given type and optional parent.
    pub fn alloc(&mut self, scope_type: ScopeType, parent: Option<ScopeId>) -> ScopeId {
        let id = ScopeId(self.scopes.len());
        self.scopes.push(Scope {
            scope_type,
            parent,
            values: HashMap::new(),
        });
        id
    }

    #[must_use]
    pub fn scope_type(&self, id: ScopeId) -> ScopeType {
        self.scopes[id.0].scope_type
    }

    pub fn set(&mut self, id: ScopeId, key: impl Into<String>, value: impl Into<Value>) {
        self.scopes[id.0].values.insert(key.into(), value.into());
    }

    /// Reads from this scope only, without walking parents.
    #[must_use]
    pub fn get(&self, id: ScopeId, key: &str) -> Option<&Value> {
        self.scopes[id.0].values.get(key)
    }

    #[must_use]
    pub fn has(&self, id: ScopeId, key: &str) -> bool {
        self.scopes[id.0].values.contains_key(key)
    }

    /// Walks up the parent chain and returns the first hit.
    #[must_use]
    pub fn resolve(&self, id: ScopeId, key: &str) -> Option<&Value> {
        let mut current = Some(id);
        while let Some(scope_id) = current {
            let scope = &self.scopes[scope_id.0];
            if let Some(value) = scope.values.get(key) {
                return Some(value);
            }
            current = scope.parent;
        }
        None
    }

    /// Flattened merge of the chain; entries closer to `id` override parent
    /// entries of the same name.
    #[must_use]
    pub fn resolve_all(&self, id: ScopeId) -> HashMap<String, Value> {
        // Collect the chain root-first so children overwrite on insert.
        let mut chain = Vec::new();
        let mut current = Some(id);
        while let Some(scope_id) = current {
            chain.push(scope_id);
            current = self.scopes[scope_id.0].parent;
        }

        let mut merged = HashMap::new();
        for scope_id in chain.into_iter().rev() {
            for (k, v) in &self.scopes[scope_id.0].values {
                merged.insert(k.clone(), v.clone());
            }
        }
        merged
    }

    pub fn clear(&mut self, id: ScopeId) {
        self.scopes[id.0].values.clear();
    }

    pub fn delete(&mut self, id: ScopeId, key: &str) -> Option<Value> {
        self.scopes[id.0].values.remove(key)
    }
}

/// The standing chain created once per run. A fresh Request scope is produced
/// per request via [`ScopeChain::fresh_request_scope`] and discarded (cleared)
/// on completion.
#[derive(Debug)]
pub struct ScopeChain {
    pub system: ScopeId,
    pub dynamic: ScopeId,
    pub script_global: ScopeId,
    pub environment: ScopeId,
    pub runtime: ScopeId,
    pub file: ScopeId,
}

impl ScopeChain {
    /// Builds the File scope and everything below it, parent-linked in
    /// priority order.
    pub fn standard(arena: &mut ScopeArena) -> Self {
        let system = arena.alloc(ScopeType::System, None);
        let dynamic = arena.alloc(ScopeType::Dynamic, Some(system));
        let script_global = arena.alloc(ScopeType::ScriptGlobal, Some(dynamic));
        let environment = arena.alloc(ScopeType::Environment, Some(script_global));
        let runtime = arena.alloc(ScopeType::Runtime, Some(environment));
        let file = arena.alloc(ScopeType::File, Some(runtime));
        Self {
            system,
            dynamic,
            script_global,
            environment,
            runtime,
            file,
        }
    }

    /// Allocates a Request scope on top of the File scope.
    pub fn fresh_request_scope(&self, arena: &mut ScopeArena) -> ScopeId {
        arena.alloc(ScopeType::Request, Some(self.file))
    }
}
