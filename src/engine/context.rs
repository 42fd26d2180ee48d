//! Restricted execution context.
//!
//! The context is an allow-list: only the names assembled here resolve inside
//! a variant. It is NOT a sandbox. `open`, `os` and `Path` touch the real
//! filesystem, and nothing bounds CPU or memory use.
//!
//! Layers are kept separate so precedence can be inspected. From lowest to
//! highest:
//!
//! 1. allow-listed primitives and exception kinds
//! 2. invocation proxies, one per tool operation
//! 3. ambient bindings: `session_id`, `output_dir`, `inputs`, `globals_schema`
//! 4. prior bindings, each key spliced in at top level
//! 5. variant globals supplied by the caller
//!
//! Names the variant binds itself shadow every layer.

use super::builtins::{ALLOW_LIST, EXCEPTION_KINDS};
use super::value::{Dict, Module, Value};
use crate::tools::ProxyTable;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Layer {
    AllowList,
    Proxies,
    Ambient,
    PriorBindings,
    VariantGlobals,
}

pub type JsonMap = serde_json::Map<String, serde_json::Value>;

/// Name -> value for one variant attempt. Built fresh per attempt.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// Lowest precedence first.
    layers: Vec<(Layer, HashMap<String, Value>)>,
}

impl ExecutionContext {
    pub fn builder(proxies: &ProxyTable) -> ContextBuilder<'_> {
        ContextBuilder {
            proxies,
            session_id: String::new(),
            output_dir: String::new(),
            prior_bindings: JsonMap::new(),
            inputs: JsonMap::new(),
            variant_globals: JsonMap::new(),
        }
    }

    /// Highest-precedence binding for `name`.
    pub fn lookup(&self, name: &str) -> Option<&Value> {
        self.layers
            .iter()
            .rev()
            .find_map(|(_, names)| names.get(name))
    }

    /// Which layer `name` resolves from.
    pub fn layer_of(&self, name: &str) -> Option<Layer> {
        self.layers
            .iter()
            .rev()
            .find(|(_, names)| names.contains_key(name))
            .map(|(layer, _)| *layer)
    }

    /// Proxy names that still resolve to their proxy after layering.
    pub fn visible_proxy_names(&self) -> BTreeSet<String> {
        let Some((_, proxies)) = self.layers.iter().find(|(l, _)| *l == Layer::Proxies) else {
            return BTreeSet::new();
        };
        proxies
            .keys()
            .filter(|name| self.layer_of(name) == Some(Layer::Proxies))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.layers.iter().map(|(_, names)| names.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct ContextBuilder<'a> {
    proxies: &'a ProxyTable,
    session_id: String,
    output_dir: String,
    prior_bindings: JsonMap,
    inputs: JsonMap,
    variant_globals: JsonMap,
}

impl<'a> ContextBuilder<'a> {
    pub fn session(mut self, session_id: &str, output_dir: &Path) -> Self {
        self.session_id = session_id.to_string();
        self.output_dir = output_dir.display().to_string();
        self
    }

    pub fn prior_bindings(mut self, bindings: &JsonMap) -> Self {
        self.prior_bindings = bindings.clone();
        self
    }

    pub fn inputs(mut self, inputs: &JsonMap) -> Self {
        self.inputs = inputs.clone();
        self
    }

    pub fn variant_globals(mut self, globals: &JsonMap) -> Self {
        self.variant_globals = globals.clone();
        self
    }

    pub fn build(self) -> ExecutionContext {
        let mut allow = HashMap::new();
        for (name, builtin) in ALLOW_LIST {
            allow.insert(name.to_string(), Value::Builtin(*builtin));
        }
        for kind in EXCEPTION_KINDS {
            allow.insert(kind.as_str().to_string(), Value::ExceptionType(*kind));
        }
        allow.insert("json".to_string(), Value::Module(Module::Json));
        allow.insert("os".to_string(), Value::Module(Module::Os));

        let proxies = self
            .proxies
            .names()
            .map(|name| (name.to_string(), Value::Proxy(name.to_string())))
            .collect();

        let as_dict = |map: &JsonMap| {
            Value::Dict(Dict::from_str_map(
                map.iter().map(|(k, v)| (k.clone(), Value::from_json(v))),
            ))
        };
        let mut ambient = HashMap::new();
        ambient.insert("session_id".to_string(), Value::Str(self.session_id));
        ambient.insert("output_dir".to_string(), Value::Str(self.output_dir));
        ambient.insert("inputs".to_string(), as_dict(&self.inputs));
        ambient.insert("globals_schema".to_string(), as_dict(&self.prior_bindings));

        let splice = |map: &JsonMap| {
            map.iter()
                .map(|(k, v)| (k.clone(), Value::from_json(v)))
                .collect::<HashMap<_, _>>()
        };

        ExecutionContext {
            layers: vec![
                (Layer::AllowList, allow),
                (Layer::Proxies, proxies),
                (Layer::Ambient, ambient),
                (Layer::PriorBindings, splice(&self.prior_bindings)),
                (Layer::VariantGlobals, splice(&self.variant_globals)),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolSet;
    use serde_json::json;
    use std::sync::Arc;

    fn map(value: serde_json::Value) -> JsonMap {
        match value {
            serde_json::Value::Object(m) => m,
            _ => panic!("expected object"),
        }
    }

    fn proxies() -> ProxyTable {
        let tools = ToolSet::new()
            .with_tool("search", |_| Ok(json!(null)))
            .with_tool("summarize", |_| Ok(json!(null)));
        ProxyTable::from_provider(Arc::new(tools))
    }

    #[test]
    fn test_layers_resolve_most_specific_first() {
        let table = proxies();
        let ctx = ExecutionContext::builder(&table)
            .session("s1", Path::new("/tmp/out/s1"))
            .prior_bindings(&map(json!({"session_id": "upstream", "rows": [1, 2]})))
            .variant_globals(&map(json!({"rows": []})))
            .build();

        assert_eq!(ctx.layer_of("len"), Some(Layer::AllowList));
        assert_eq!(ctx.layer_of("search"), Some(Layer::Proxies));
        assert_eq!(ctx.layer_of("output_dir"), Some(Layer::Ambient));
        assert_eq!(ctx.layer_of("session_id"), Some(Layer::PriorBindings));
        assert_eq!(ctx.lookup("session_id").unwrap().to_display(), "upstream");
        assert_eq!(ctx.lookup("rows").unwrap().repr(), "[]");
        assert!(ctx.lookup("__import__").is_none());
    }

    #[test]
    fn test_shadowed_proxies_are_not_visible() {
        let table = proxies();
        let ctx = ExecutionContext::builder(&table)
            .prior_bindings(&map(json!({"summarize": "cached text"})))
            .build();
        let visible: Vec<String> = ctx.visible_proxy_names().into_iter().collect();
        assert_eq!(visible, vec!["search".to_string()]);
    }

    #[test]
    fn test_exception_kinds_are_enumerated() {
        let ctx = ExecutionContext::builder(&ProxyTable::empty()).build();
        assert!(matches!(ctx.lookup("KeyError"), Some(Value::ExceptionType(_))));
        assert!(ctx.lookup("NameError").is_none());
    }
}
