//! `{{name}}` template substitution against the scope chain, dynamic
//! generators, and named-response references.
//!
//! Expansion is nested (a substituted value is itself expanded) up to a fixed
//! depth bound. Circular references are detected with a set of names
//! currently being expanded, passed by value through the recursion; on
//! detection the inner reference is left verbatim and the outer expansion
//! completes with that partial.

pub mod dynamic;

use crate::constants;
use crate::model::NamedResponseStore;
use crate::scope::{ScopeArena, ScopeId};
use dynamic::DynamicResolver;
use std::collections::HashSet;

/// Template expansion context for one request.
pub struct TemplateEngine<'a> {
    arena: &'a ScopeArena,
    scope: ScopeId,
    store: &'a NamedResponseStore,
    dynamic: &'a DynamicResolver,
}

impl<'a> TemplateEngine<'a> {
    #[must_use]
    pub const fn new(
        arena: &'a ScopeArena,
        scope: ScopeId,
        store: &'a NamedResponseStore,
        dynamic: &'a DynamicResolver,
    ) -> Self {
        Self {
            arena,
            scope,
            store,
            dynamic,
        }
    }

    /// Expands every `{{name}}` token in `text`. Unresolvable tokens — empty
    /// names, malformed openers, missing variables — are left verbatim.
    #[must_use]
    pub fn expand(&self, text: &str) -> String {
        self.expand_inner(text, &HashSet::new(), 0)
    }

    fn expand_inner(&self, text: &str, expanding: &HashSet<String>, depth: usize) -> String {
        if depth >= constants::TEMPLATE_MAX_DEPTH {
            return text.to_string();
        }

        let mut result = String::with_capacity(text.len());
        let mut remaining = text;

        while let Some(start) = remaining.find(constants::TEMPLATE_OPEN) {
            result.push_str(&remaining[..start]);
            let after_open = &remaining[start + 2..];

            let Some(end) = after_open.find(constants::TEMPLATE_CLOSE) else {
                // Unclosed opener stays verbatim.
                result.push_str(constants::TEMPLATE_OPEN);
                remaining = after_open;
                continue;
            };

            let raw = &after_open[..end];
            // `{` inside a name means this opener never closes properly.
            if raw.contains('{') {
                result.push_str(constants::TEMPLATE_OPEN);
                remaining = after_open;
                continue;
            }

            let name = raw.trim();
            match self.resolve_token(name, expanding, depth) {
                Some(value) => result.push_str(&value),
                None => {
                    result.push_str(constants::TEMPLATE_OPEN);
                    result.push_str(raw);
                    result.push_str(constants::TEMPLATE_CLOSE);
                }
            }
            remaining = &after_open[end + 2..];
        }

        result.push_str(remaining);
        result
    }

    /// Resolves one token name; `None` leaves it verbatim.
    fn resolve_token(
        &self,
        name: &str,
        expanding: &HashSet<String>,
        depth: usize,
    ) -> Option<String> {
        if name.is_empty() {
            return None;
        }
        if let Some(directive) = name.strip_prefix('$') {
            return self.dynamic.generate(directive);
        }
        if name.contains('.') {
            return self.resolve_response_reference(name);
        }
        if expanding.contains(name) {
            // Cycle: break by leaving the inner reference verbatim.
            return None;
        }
        let value = self.arena.resolve(self.scope, name)?;
        let mut expanding = expanding.clone();
        expanding.insert(name.to_string());
        Some(self.expand_inner(&value.render(), &expanding, depth + 1))
    }

    /// `{{id.response.body.path}}` / `.status` / `.headers.Name` lookups.
    fn resolve_response_reference(&self, name: &str) -> Option<String> {
        let mut segments = name.split('.');
        let id = segments.next()?;
        if segments.next()? != "response" {
            return None;
        }
        let response = self.store.get(id)?;

        let rest: Vec<&str> = segments.collect();
        match rest.split_first() {
            None => None,
            Some((&"status", [])) => Some(response.status.to_string()),
            Some((&"headers", tail)) if !tail.is_empty() => {
                response.headers.get(&tail.join(".")).map(String::from)
            }
            Some((&"body", tail)) => {
                let json = response.data.as_json()?;
                let selected = if tail.is_empty() {
                    json.clone()
                } else {
                    crate::jsonpath::select(json, &format!("$.{}", tail.join("."))).ok()?
                };
                Some(json_to_template_string(&selected))
            }
            _ => None,
        }
    }
}

/// Strings are emitted raw; everything else is compact JSON.
fn json_to_template_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Headers, Response, ResponseData};
    use crate::scope::ScopeChain;
    use serde_json::json;
    use std::time::Duration;

    struct Fixture {
        arena: ScopeArena,
        scope: ScopeId,
        store: NamedResponseStore,
        dynamic: DynamicResolver,
    }

    impl Fixture {
        fn new() -> Self {
            let mut arena = ScopeArena::new();
            let chain = ScopeChain::standard(&mut arena);
            let scope = chain.fresh_request_scope(&mut arena);
            Self {
                arena,
                scope,
                store: NamedResponseStore::new(),
                dynamic: DynamicResolver::default(),
            }
        }

        fn set(&mut self, key: &str, value: &str) {
            self.arena.set(self.scope, key, value);
        }

        fn expand(&self, text: &str) -> String {
            TemplateEngine::new(&self.arena, self.scope, &self.store, &self.dynamic).expand(text)
        }
    }

    fn json_response(body: serde_json::Value) -> Response {
        let mut headers = Headers::new();
        headers.insert("Content-Type", "application/json");
        Response {
            status: 200,
            status_text: "OK".into(),
            headers,
            data: ResponseData::Json(body),
            execution_time: Duration::from_millis(3),
        }
    }

    #[test]
    fn simple_variable_expansion() {
        let mut fx = Fixture::new();
        fx.set("host", "http://x");
        assert_eq!(fx.expand("GET {{host}}/u"), "GET http://x/u");
    }

    #[test]
    fn whitespace_inside_braces_is_trimmed() {
        let mut fx = Fixture::new();
        fx.set("name", "v");
        assert_eq!(fx.expand("{{ name }}"), "v");
    }

    #[test]
    fn missing_variable_is_verbatim() {
        let fx = Fixture::new();
        assert_eq!(fx.expand("x={{missing}}"), "x={{missing}}");
    }

    #[test]
    fn empty_name_is_verbatim() {
        let fx = Fixture::new();
        assert_eq!(fx.expand("a{{}}b"), "a{{}}b");
    }

    #[test]
    fn malformed_opener_is_verbatim() {
        let fx = Fixture::new();
        assert_eq!(fx.expand("{{x}/path"), "{{x}/path");
    }

    #[test]
    fn nested_expansion() {
        let mut fx = Fixture::new();
        fx.set("inner", "world");
        fx.set("outer", "hello {{inner}}");
        assert_eq!(fx.expand("{{outer}}"), "hello world");
    }

    #[test]
    fn cycle_terminates_with_partial_text() {
        let mut fx = Fixture::new();
        fx.set("a", "{{b}}");
        fx.set("b", "{{a}}");
        let result = fx.expand("{{a}}");
        assert!(result == "{{a}}" || result == "{{b}}", "got {result}");
    }

    #[test]
    fn self_reference_terminates() {
        let mut fx = Fixture::new();
        fx.set("a", "{{a}}");
        assert_eq!(fx.expand("{{a}}"), "{{a}}");
    }

    #[test]
    fn expansion_is_idempotent_once_resolved() {
        let mut fx = Fixture::new();
        fx.set("host", "http://x");
        let once = fx.expand("{{host}}/{{missing}}");
        let twice = fx.expand(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn response_body_field_reference() {
        let mut fx = Fixture::new();
        fx.store
            .insert("first", json_response(json!({"id": 42, "name": "a"})));
        assert_eq!(
            fx.expand("/users/{{first.response.body.id}}"),
            "/users/42"
        );
    }

    #[test]
    fn response_body_without_path_is_whole_structure() {
        let mut fx = Fixture::new();
        fx.store.insert("first", json_response(json!({"id": 1})));
        assert_eq!(fx.expand("{{first.response.body}}"), r#"{"id":1}"#);
    }

    #[test]
    fn response_status_and_header_references() {
        let mut fx = Fixture::new();
        fx.store.insert("first", json_response(json!({})));
        assert_eq!(fx.expand("{{first.response.status}}"), "200");
        assert_eq!(
            fx.expand("{{first.response.headers.content-type}}"),
            "application/json"
        );
    }

    #[test]
    fn unknown_request_id_is_verbatim() {
        let fx = Fixture::new();
        assert_eq!(
            fx.expand("{{nobody.response.body.id}}"),
            "{{nobody.response.body.id}}"
        );
    }

    #[test]
    fn dynamic_token_is_delegated() {
        let fx = Fixture::new();
        let out = fx.expand("n={{$randomInt 3 3}}");
        assert_eq!(out, "n=3");
    }
}
