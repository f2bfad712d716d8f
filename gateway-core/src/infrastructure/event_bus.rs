// Copyright (c) 2026 Tollgate Systems
// SPDX-License-Identifier: AGPL-3.0
//! In-process event fan-out for decision and approval outcomes. Scoped to
//! the two events that matter to an external watcher; this gateway has no
//! agent-lifecycle or learning events to fan out, so no broader event
//! taxonomy is modeled here. `DecisionPipeline` publishes `DecisionCommitted`
//! once per `propose()` exit and `ApprovalController` publishes
//! `ApprovalResolved` when an approve/deny genuinely wins its transition;
//! `GET /events` fans both out to subscribers as an SSE stream.

use tokio::sync::broadcast;

use crate::domain::decision::ToolDecision;
use crate::domain::ids::ToolCallId;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub enum GatewayEvent {
    DecisionCommitted(ToolDecision),
    ApprovalResolved { tool_call_id: ToolCallId, approved: bool },
}

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<GatewayEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.sender.subscribe()
    }

    /// Publishing never fails the caller: an event with no subscribers is
    /// simply dropped.
    pub fn publish(&self, event: GatewayEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
