// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock dispatch sink for deterministic publisher tests.

use std::sync::Mutex;

use async_trait::async_trait;
use courier_core::{DeliveryError, DispatchSink, Envelope};
use uuid::Uuid;

use crate::lock;
use crate::script::{Outcome, Script};

/// A dispatch sink that records every envelope it is handed.
///
/// Outcomes are popped from a FIFO script; once it is empty every call uses
/// the fallback outcome (success unless changed).
pub struct MockSink {
    script: Script,
    sent: Mutex<Vec<Envelope>>,
}

impl MockSink {
    pub fn new() -> Self {
        Self {
            script: Script::new(),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// A sink whose every call ends with `outcome`.
    pub fn always(outcome: Outcome) -> Self {
        let sink = Self::new();
        sink.script.set_fallback(outcome);
        sink
    }

    /// Queue the outcome of the next unscripted call.
    pub fn push(&self, outcome: Outcome) {
        self.script.push(outcome);
    }

    pub fn set_fallback(&self, outcome: Outcome) {
        self.script.set_fallback(outcome);
    }

    /// Every envelope handed to the sink, including failed attempts.
    pub fn sent(&self) -> Vec<Envelope> {
        lock(&self.sent).clone()
    }

    pub fn sent_ids(&self) -> Vec<Uuid> {
        lock(&self.sent).iter().map(|e| e.id).collect()
    }

    pub fn send_count(&self) -> usize {
        lock(&self.sent).len()
    }
}

impl Default for MockSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DispatchSink for MockSink {
    async fn send(&self, envelope: &Envelope) -> Result<(), DeliveryError> {
        lock(&self.sent).push(envelope.clone());
        self.script.next().play().await
    }
}
