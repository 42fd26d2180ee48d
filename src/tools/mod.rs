//! Capability registry
//!
//! A [`ToolProvider`] exposes named operations. [`ProxyTable::from_provider`]
//! turns its current operation list into one [`InvocationProxy`] per
//! operation. The table is rebuilt for every invocation and never persisted.

mod toolset;

pub use toolset::ToolSet;

use anyhow::Result;
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Future returned by a tool operation.
pub type ToolFuture<'a> = Pin<Box<dyn Future<Output = Result<serde_json::Value>> + Send + 'a>>;

/// The external collaborator that owns the actual operations.
pub trait ToolProvider: Send + Sync {
    /// Operations available right now.
    fn tool_names(&self) -> Vec<String>;

    /// Run one operation to completion. Errors propagate to the caller unchanged.
    fn call_tool<'a>(&'a self, name: &'a str, args: Vec<serde_json::Value>) -> ToolFuture<'a>;
}

/// Suspending callable standing in for one named operation.
#[derive(Clone)]
pub struct InvocationProxy {
    name: String,
    provider: Arc<dyn ToolProvider>,
}

impl InvocationProxy {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Suspend until the provider finishes the operation. No retry, no timeout.
    pub async fn invoke(&self, args: Vec<serde_json::Value>) -> Result<serde_json::Value> {
        self.provider.call_tool(&self.name, args).await
    }
}

impl std::fmt::Debug for InvocationProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvocationProxy")
            .field("name", &self.name)
            .finish()
    }
}

/// Operation name -> proxy.
#[derive(Debug, Clone, Default)]
pub struct ProxyTable {
    proxies: BTreeMap<String, InvocationProxy>,
}

impl ProxyTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Enumerate the provider's operations. Does not invoke any of them.
    pub fn from_provider(provider: Arc<dyn ToolProvider>) -> Self {
        let proxies = provider
            .tool_names()
            .into_iter()
            .map(|name| {
                let proxy = InvocationProxy {
                    name: name.clone(),
                    provider: Arc::clone(&provider),
                };
                (name, proxy)
            })
            .collect();
        Self { proxies }
    }

    pub fn get(&self, name: &str) -> Option<&InvocationProxy> {
        self.proxies.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.proxies.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_registry_builds_one_proxy_per_operation() {
        let tools = ToolSet::new()
            .with_tool("search", |args| Ok(json!({"query": args[0]})))
            .with_tool("fetch", |_| Ok(json!("page")));
        let table = ProxyTable::from_provider(Arc::new(tools));

        assert_eq!(table.names().collect::<Vec<_>>(), vec!["fetch", "search"]);
        let reply = table.get("search").unwrap().invoke(vec![json!("x")]).await.unwrap();
        assert_eq!(reply, json!({"query": "x"}));
    }

    #[tokio::test]
    async fn test_provider_errors_propagate_unchanged() {
        let tools = ToolSet::new().with_tool("boom", |_| Err(anyhow::anyhow!("quota exceeded")));
        let table = ProxyTable::from_provider(Arc::new(tools));
        let err = table.get("boom").unwrap().invoke(vec![]).await.unwrap_err();
        assert_eq!(err.to_string(), "quota exceeded");
    }
}
