// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock inbox action for deterministic processor tests.

use std::sync::Mutex;

use async_trait::async_trait;
use courier_core::{DeliveryError, InboundMessage, InboxAction, MessageId};

use crate::lock;
use crate::script::{Outcome, Script};

/// An inbox action that records every message it is invoked with.
pub struct MockAction {
    script: Script,
    invocations: Mutex<Vec<InboundMessage>>,
}

impl MockAction {
    pub fn new() -> Self {
        Self {
            script: Script::new(),
            invocations: Mutex::new(Vec::new()),
        }
    }

    pub fn always(outcome: Outcome) -> Self {
        let action = Self::new();
        action.script.set_fallback(outcome);
        action
    }

    pub fn push(&self, outcome: Outcome) {
        self.script.push(outcome);
    }

    pub fn set_fallback(&self, outcome: Outcome) {
        self.script.set_fallback(outcome);
    }

    pub fn invocations(&self) -> Vec<InboundMessage> {
        lock(&self.invocations).clone()
    }

    pub fn invocation_count(&self) -> usize {
        lock(&self.invocations).len()
    }

    /// How many times the action ran for `id`.
    pub fn count_for(&self, id: &MessageId) -> usize {
        lock(&self.invocations)
            .iter()
            .filter(|m| &m.id == id)
            .count()
    }
}

impl Default for MockAction {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InboxAction for MockAction {
    async fn invoke(&self, message: &InboundMessage) -> Result<(), DeliveryError> {
        lock(&self.invocations).push(message.clone());
        self.script.next().play().await
    }
}
