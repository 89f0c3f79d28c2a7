// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message-type to action lookup.

use std::collections::HashMap;
use std::sync::Arc;

use courier_core::InboxAction;

/// Actions keyed by message type, filled in at startup.
///
/// Types with no registered action resolve to the fallback, if any.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    actions: HashMap<String, Arc<dyn InboxAction>>,
    fallback: Option<Arc<dyn InboxAction>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `action` for `message_type`, replacing any earlier one.
    pub fn register(
        &mut self,
        message_type: impl Into<String>,
        action: Arc<dyn InboxAction>,
    ) -> &mut Self {
        self.actions.insert(message_type.into(), action);
        self
    }

    pub fn with_fallback(mut self, action: Arc<dyn InboxAction>) -> Self {
        self.fallback = Some(action);
        self
    }

    pub fn resolve(&self, message_type: &str) -> Option<Arc<dyn InboxAction>> {
        self.actions
            .get(message_type)
            .or(self.fallback.as_ref())
            .cloned()
    }

    pub fn message_types(&self) -> impl Iterator<Item = &str> {
        self.actions.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty() && self.fallback.is_none()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<_> = self.message_types().collect();
        types.sort_unstable();
        f.debug_struct("HandlerRegistry")
            .field("message_types", &types)
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::InboundMessage;
    use courier_test_utils::MockAction;

    #[tokio::test]
    async fn resolves_by_type_then_fallback() {
        let orders = Arc::new(MockAction::new());
        let fallback = Arc::new(MockAction::new());
        let mut registry = HandlerRegistry::new();
        registry.register("OrderCreated", orders.clone());

        assert!(registry.resolve("Unknown").is_none());
        let registry = registry.with_fallback(fallback.clone());

        let message = InboundMessage::new("m-1", "OrderCreated", "{}");
        registry
            .resolve("OrderCreated")
            .unwrap()
            .invoke(&message)
            .await
            .unwrap();
        registry.resolve("Unknown").unwrap().invoke(&message).await.unwrap();

        assert_eq!(orders.invocation_count(), 1);
        assert_eq!(fallback.invocation_count(), 1);
    }

    #[test]
    fn empty_registry_is_empty() {
        assert!(HandlerRegistry::new().is_empty());
        let mut registry = HandlerRegistry::new();
        registry.register("T", Arc::new(MockAction::new()));
        assert!(!registry.is_empty());
        assert_eq!(format!("{registry:?}"), r#"HandlerRegistry { message_types: ["T"], fallback: false }"#);
    }
}
