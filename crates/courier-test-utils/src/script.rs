// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scripted outcomes shared by the mock sink and mock action.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use courier_core::DeliveryError;

use crate::lock;

/// What a mock collaborator does on one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Succeed,
    /// Fail in a way the worker retries.
    Transient(String),
    /// Fail in a way the worker discards immediately.
    Permanent(String),
    /// Sleep before succeeding; used to trip the per-call timeout.
    Stall(Duration),
}

impl Outcome {
    pub(crate) async fn play(self) -> Result<(), DeliveryError> {
        match self {
            Self::Succeed => Ok(()),
            Self::Transient(message) => Err(DeliveryError::transient(message)),
            Self::Permanent(message) => Err(DeliveryError::permanent(message)),
            Self::Stall(duration) => {
                tokio::time::sleep(duration).await;
                Ok(())
            }
        }
    }
}

/// FIFO of scripted outcomes with a fallback once the queue runs dry.
pub(crate) struct Script {
    queue: Mutex<VecDeque<Outcome>>,
    fallback: Mutex<Outcome>,
}

impl Script {
    pub(crate) fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(Outcome::Succeed),
        }
    }

    pub(crate) fn push(&self, outcome: Outcome) {
        lock(&self.queue).push_back(outcome);
    }

    pub(crate) fn set_fallback(&self, outcome: Outcome) {
        *lock(&self.fallback) = outcome;
    }

    pub(crate) fn next(&self) -> Outcome {
        lock(&self.queue)
            .pop_front()
            .unwrap_or_else(|| lock(&self.fallback).clone())
    }
}
