//! Ordered event emission for external observers.
//!
//! Mirrors the `EventHandler` pattern used elsewhere in this toolkit for
//! agent/orchestration observability: a single trait with an async `push`
//! method, wrapped in `Arc<dyn EventPusher>` and shared across the engine.
//! Unlike that pattern there is no per-kind default no-op — every event here
//! carries protocol meaning, so a pusher is expected to forward all of them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::ids::generate_id;

/// Wire-format tags for the event taxonomy (§6). `ExecutionProgress` and
/// `EchoReceived` are reserved: no engine code path emits them yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    #[serde(rename = "formulation.ready")]
    FormulationReady,
    #[serde(rename = "resonance.activated")]
    ResonanceActivated,
    #[serde(rename = "offer.received")]
    OfferReceived,
    #[serde(rename = "barrier.complete")]
    BarrierComplete,
    #[serde(rename = "center.tool_call")]
    CenterToolCall,
    #[serde(rename = "plan.ready")]
    PlanReady,
    #[serde(rename = "sub_negotiation.started")]
    SubNegotiationStarted,
    #[serde(rename = "execution.progress")]
    ExecutionProgress,
    #[serde(rename = "echo.received")]
    EchoReceived,
}

impl EventType {
    /// The literal wire tag, e.g. `"plan.ready"`.
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::FormulationReady => "formulation.ready",
            EventType::ResonanceActivated => "resonance.activated",
            EventType::OfferReceived => "offer.received",
            EventType::BarrierComplete => "barrier.complete",
            EventType::CenterToolCall => "center.tool_call",
            EventType::PlanReady => "plan.ready",
            EventType::SubNegotiationStarted => "sub_negotiation.started",
            EventType::ExecutionProgress => "execution.progress",
            EventType::EchoReceived => "echo.received",
        }
    }
}

/// One observable record of protocol progress.
///
/// Serialises as `{event_type, negotiation_id, timestamp, event_id, data}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NegotiationEvent {
    pub event_type: EventType,
    pub negotiation_id: String,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
    pub event_id: String,
}

impl NegotiationEvent {
    fn new(event_type: EventType, negotiation_id: impl Into<String>, data: Value) -> Self {
        Self {
            event_type,
            negotiation_id: negotiation_id.into(),
            data,
            timestamp: Utc::now(),
            event_id: generate_id("evt"),
        }
    }

    pub fn formulation_ready(
        negotiation_id: impl Into<String>,
        raw_intent: &str,
        formulated_text: &str,
        enrichments: Value,
    ) -> Self {
        Self::new(
            EventType::FormulationReady,
            negotiation_id,
            json!({
                "raw_intent": raw_intent,
                "formulated_text": formulated_text,
                "enrichments": enrichments,
            }),
        )
    }

    pub fn resonance_activated(
        negotiation_id: impl Into<String>,
        activated_count: usize,
        agents: Value,
    ) -> Self {
        Self::new(
            EventType::ResonanceActivated,
            negotiation_id,
            json!({ "activated_count": activated_count, "agents": agents }),
        )
    }

    pub fn offer_received(
        negotiation_id: impl Into<String>,
        agent_id: &str,
        display_name: &str,
        content: &str,
        capabilities: &[String],
    ) -> Self {
        Self::new(
            EventType::OfferReceived,
            negotiation_id,
            json!({
                "agent_id": agent_id,
                "display_name": display_name,
                "content": content,
                "capabilities": capabilities,
            }),
        )
    }

    pub fn barrier_complete(
        negotiation_id: impl Into<String>,
        total_participants: usize,
        offers_received: usize,
        exited_count: usize,
    ) -> Self {
        Self::new(
            EventType::BarrierComplete,
            negotiation_id,
            json!({
                "total_participants": total_participants,
                "offers_received": offers_received,
                "exited_count": exited_count,
            }),
        )
    }

    pub fn center_tool_call(
        negotiation_id: impl Into<String>,
        tool_name: &str,
        tool_args: &Value,
        round_number: u32,
    ) -> Self {
        Self::new(
            EventType::CenterToolCall,
            negotiation_id,
            json!({
                "tool_name": tool_name,
                "tool_args": tool_args,
                "round_number": round_number,
            }),
        )
    }

    pub fn plan_ready(
        negotiation_id: impl Into<String>,
        plan_text: &str,
        center_rounds: u32,
        participating_agents: &[String],
    ) -> Self {
        Self::new(
            EventType::PlanReady,
            negotiation_id,
            json!({
                "plan_text": plan_text,
                "center_rounds": center_rounds,
                "participating_agents": participating_agents,
            }),
        )
    }

    pub fn sub_negotiation_started(
        negotiation_id: impl Into<String>,
        sub_negotiation_id: &str,
        gap_description: &str,
    ) -> Self {
        Self::new(
            EventType::SubNegotiationStarted,
            negotiation_id,
            json!({
                "sub_negotiation_id": sub_negotiation_id,
                "gap_description": gap_description,
            }),
        )
    }
}

/// Trait for receiving the engine's event stream.
///
/// Implementations are shared across the engine and any concurrently
/// running offer tasks via `Arc<dyn EventPusher>`, so they must be
/// `Send + Sync`. A failing push is logged and swallowed by the engine
/// (§4.7) — the protocol never depends on observability succeeding.
#[async_trait]
pub trait EventPusher: Send + Sync {
    async fn push(&self, event: NegotiationEvent) -> Result<(), String>;

    /// Push a batch in order. The default pushes one at a time and stops at
    /// the first failure; overriding is only useful for pushers with a
    /// genuine batch API.
    async fn push_many(&self, events: Vec<NegotiationEvent>) -> Result<(), String> {
        for event in events {
            self.push(event).await?;
        }
        Ok(())
    }
}

/// Discards every event. Used as the builder's default when no pusher is
/// configured.
pub struct NullEventPusher;

#[async_trait]
impl EventPusher for NullEventPusher {
    async fn push(&self, _event: NegotiationEvent) -> Result<(), String> {
        Ok(())
    }
}

/// Logs every event at `info` level via the `log` facade. A reasonable
/// default for applications that want visibility without wiring a real
/// sink.
pub struct LoggingEventPusher;

#[async_trait]
impl EventPusher for LoggingEventPusher {
    async fn push(&self, event: NegotiationEvent) -> Result<(), String> {
        log::info!(
            "event [{}] {}: {}",
            event.negotiation_id,
            event.event_type.as_str(),
            event.data
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_pusher_discards_silently() {
        let pusher = NullEventPusher;
        let event = NegotiationEvent::plan_ready("neg_1", "plan text", 1, &[]);
        assert!(pusher.push(event).await.is_ok());
    }

    #[test]
    fn event_type_wire_tags_match_spec() {
        assert_eq!(EventType::FormulationReady.as_str(), "formulation.ready");
        assert_eq!(EventType::PlanReady.as_str(), "plan.ready");
        assert_eq!(EventType::SubNegotiationStarted.as_str(), "sub_negotiation.started");
    }
}
