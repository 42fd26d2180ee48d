use super::{ToolFuture, ToolProvider};
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::sync::Arc;

type Handler = Arc<dyn Fn(Vec<serde_json::Value>) -> Result<serde_json::Value> + Send + Sync>;

/// In-process tool provider backed by closures or canned replies.
#[derive(Clone, Default)]
pub struct ToolSet {
    handlers: BTreeMap<String, Handler>,
}

impl ToolSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tool<F>(mut self, name: &str, handler: F) -> Self
    where
        F: Fn(Vec<serde_json::Value>) -> Result<serde_json::Value> + Send + Sync + 'static,
    {
        self.register(name, handler);
        self
    }

    pub fn register<F>(&mut self, name: &str, handler: F)
    where
        F: Fn(Vec<serde_json::Value>) -> Result<serde_json::Value> + Send + Sync + 'static,
    {
        self.handlers.insert(name.to_string(), Arc::new(handler));
    }

    /// Every operation answers with a fixed reply regardless of arguments.
    pub fn from_canned(replies: serde_json::Map<String, serde_json::Value>) -> Self {
        let mut tools = Self::new();
        for (name, reply) in replies {
            tools.register(&name, move |_| Ok(reply.clone()));
        }
        tools
    }

    /// Parse `{"operation": reply, ...}`.
    pub fn from_canned_json(text: &str) -> Result<Self> {
        let value: serde_json::Value =
            serde_json::from_str(text).context("Failed to parse canned tool replies")?;
        match value {
            serde_json::Value::Object(map) => Ok(Self::from_canned(map)),
            other => Err(anyhow::anyhow!(
                "Canned tool replies must be a JSON object, got {}",
                other
            )),
        }
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl ToolProvider for ToolSet {
    fn tool_names(&self) -> Vec<String> {
        self.handlers.keys().cloned().collect()
    }

    fn call_tool<'a>(&'a self, name: &'a str, args: Vec<serde_json::Value>) -> ToolFuture<'a> {
        Box::pin(async move {
            let handler = self
                .handlers
                .get(name)
                .ok_or_else(|| anyhow::anyhow!("Unknown tool: {}", name))?;
            // Every call suspends at least once.
            tokio::task::yield_now().await;
            handler(args)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_canned_replies_ignore_arguments() {
        let tools = ToolSet::from_canned_json(r#"{"weather": {"temp": 21}}"#).unwrap();
        let reply = tools.call_tool("weather", vec![json!("Paris")]).await.unwrap();
        assert_eq!(reply, json!({"temp": 21}));
    }

    #[test]
    fn test_canned_replies_must_be_an_object() {
        assert!(ToolSet::from_canned_json("[1, 2]").is_err());
        assert!(ToolSet::from_canned_json("{not json").is_err());
    }

    #[tokio::test]
    async fn test_unknown_tool_is_an_error() {
        let err = ToolSet::new().call_tool("nope", vec![]).await.unwrap_err();
        assert!(err.to_string().contains("Unknown tool"));
    }
}
