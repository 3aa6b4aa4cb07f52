//! Built-in tool handlers that run in-process.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::error::GatewayError;
use crate::domain::{LOCAL_OWNER, ToolInfo, tool_name};

/// A tool implemented inside the gateway process.
#[async_trait]
pub trait LocalToolHandler: Send + Sync {
    /// Descriptor for this tool. The name is normalized at registration.
    fn info(&self) -> ToolInfo;

    /// Run the tool with already-validated arguments.
    async fn call(&self, arguments: Value) -> anyhow::Result<Value>;
}

#[derive(Clone)]
struct Registered {
    info: ToolInfo,
    handler: Arc<dyn LocalToolHandler>,
}

/// Canonical name → local handler.
#[derive(Clone, Default)]
pub struct LocalToolRegistry {
    tools: BTreeMap<String, Registered>,
}

impl std::fmt::Debug for LocalToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalToolRegistry")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl LocalToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under the canonical form of its name.
    pub fn register(&mut self, handler: Arc<dyn LocalToolHandler>) -> Result<(), GatewayError> {
        let mut info = handler.info();
        let canonical = tool_name::normalize(&info.name).ok_or_else(|| {
            GatewayError::InvalidConfig("local tool registered with an empty name".to_string())
        })?;

        if self.tools.contains_key(&canonical) {
            return Err(GatewayError::InvalidConfig(format!(
                "local tool '{canonical}' registered twice"
            )));
        }

        info.name.clone_from(&canonical);
        info.owner = LOCAL_OWNER.to_string();
        self.tools.insert(canonical, Registered { info, handler });
        Ok(())
    }

    /// Builder-style [`Self::register`].
    pub fn with(mut self, handler: Arc<dyn LocalToolHandler>) -> Result<Self, GatewayError> {
        self.register(handler)?;
        Ok(self)
    }

    pub fn get(&self, canonical: &str) -> Option<(&ToolInfo, Arc<dyn LocalToolHandler>)> {
        self.tools
            .get(canonical)
            .map(|r| (&r.info, Arc::clone(&r.handler)))
    }

    pub fn contains(&self, canonical: &str) -> bool {
        self.tools.contains_key(canonical)
    }

    /// Canonical names of every registered tool.
    pub fn names(&self) -> BTreeSet<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn tools(&self) -> impl Iterator<Item = &ToolInfo> {
        self.tools.values().map(|r| &r.info)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Named(&'static str);

    #[async_trait]
    impl LocalToolHandler for Named {
        fn info(&self) -> ToolInfo {
            ToolInfo::local(self.0)
        }

        async fn call(&self, arguments: Value) -> anyhow::Result<Value> {
            Ok(arguments)
        }
    }

    #[test]
    fn test_names_are_normalized_on_registration() {
        let registry = LocalToolRegistry::new()
            .with(Arc::new(Named("write_file")))
            .unwrap()
            .with(Arc::new(Named("time_now")))
            .unwrap();

        assert!(registry.contains("fs.writeFile"));
        assert!(registry.contains("time.now"));
        let (info, _) = registry.get("fs.writeFile").unwrap();
        assert_eq!(info.name, "fs.writeFile");
        assert!(info.is_local());
    }

    #[test]
    fn test_duplicate_canonical_names_are_rejected() {
        let mut registry = LocalToolRegistry::new();
        registry.register(Arc::new(Named("fs.writeFile"))).unwrap();
        let err = registry.register(Arc::new(Named("fs_writeFile"))).unwrap_err();
        assert!(matches!(err, GatewayError::InvalidConfig(_)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_empty_name_is_rejected() {
        let mut registry = LocalToolRegistry::new();
        assert!(registry.register(Arc::new(Named("__"))).is_err());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_handler_is_callable_through_registry() {
        let registry = LocalToolRegistry::new().with(Arc::new(Named("echo"))).unwrap();
        let (_, handler) = registry.get("echo").unwrap();
        let out = handler.call(json!({ "x": 1 })).await.unwrap();
        assert_eq!(out, json!({ "x": 1 }));
    }
}
