//! Core data model: sessions, participants, offers, demand snapshots, and
//! the optional diagnostic trace.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::generate_id;

/// Free-form metadata bag used throughout the data model.
pub type Metadata = HashMap<String, Value>;

/// A user's request, carried as `raw_intent` and enriched to `formulated_text`.
///
/// Immutable except for `formulated_text` and `metadata`, both of which are
/// populated by the Formulation stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemandSnapshot {
    pub raw_intent: String,
    pub formulated_text: Option<String>,
    pub user_id: Option<String>,
    pub scene_id: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl DemandSnapshot {
    /// Create a snapshot from a raw intent string; all other fields start empty.
    pub fn new(raw_intent: impl Into<String>) -> Self {
        Self {
            raw_intent: raw_intent.into(),
            formulated_text: None,
            user_id: None,
            scene_id: None,
            metadata: Metadata::new(),
        }
    }

    /// The text the rest of the pipeline should treat as "the demand": the
    /// formulated text if Formulation has run, otherwise the raw intent.
    pub fn effective_text(&self) -> &str {
        self.formulated_text
            .as_deref()
            .unwrap_or(&self.raw_intent)
    }
}

/// An agent's response to a formulated demand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Offer {
    pub agent_id: String,
    pub content: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Metadata,
}

/// Participant lifecycle state within a single negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentState {
    Active,
    Replied,
    Exited,
}

/// One candidate agent selected by Resonance for a negotiation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentParticipant {
    pub agent_id: String,
    pub display_name: String,
    pub resonance_score: f64,
    pub state: AgentState,
    pub offer: Option<Offer>,
}

impl AgentParticipant {
    pub fn new(agent_id: impl Into<String>, display_name: impl Into<String>, resonance_score: f64) -> Self {
        Self {
            agent_id: agent_id.into(),
            display_name: display_name.into(),
            resonance_score,
            state: AgentState::Active,
            offer: None,
        }
    }
}

/// A session's position in the engine state machine (§4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NegotiationState {
    Created,
    Formulating,
    Formulated,
    Encoding,
    Offering,
    BarrierWaiting,
    Synthesizing,
    Completed,
}

impl NegotiationState {
    /// Whether `to` is a legal transition target from `self`, per the
    /// transition graph in §4.1. `Completed` is reachable from every
    /// non-terminal state (fatal short-circuit) and is itself terminal.
    pub fn can_transition_to(self, to: NegotiationState) -> bool {
        use NegotiationState::*;
        if to == Completed {
            return self != Completed;
        }
        matches!(
            (self, to),
            (Created, Formulating)
                | (Formulating, Formulated)
                | (Formulated, Encoding)
                | (Encoding, Offering)
                | (Offering, BarrierWaiting)
                | (BarrierWaiting, Synthesizing)
                | (Synthesizing, Synthesizing)
        )
    }
}

/// One entry in a [`TraceChain`], recording a single major engine step for
/// diagnostics. Never consulted for control flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEntry {
    pub step: String,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: Option<f64>,
    pub input_summary: Option<String>,
    pub output_summary: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

/// An optional diagnostic trail attached to a session. Purely observational;
/// absence must never change engine behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceChain {
    pub negotiation_id: String,
    pub entries: Vec<TraceEntry>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TraceChain {
    pub fn new(negotiation_id: impl Into<String>) -> Self {
        Self {
            negotiation_id: negotiation_id.into(),
            entries: Vec::new(),
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Append a step. `duration_ms`/summaries are left to the caller to fill
    /// in after timing the step.
    pub fn add_entry(&mut self, step: impl Into<String>) -> &mut TraceEntry {
        self.entries.push(TraceEntry {
            step: step.into(),
            timestamp: Utc::now(),
            duration_ms: None,
            input_summary: None,
            output_summary: None,
            metadata: Metadata::new(),
        });
        self.entries.last_mut().expect("just pushed")
    }
}

/// The central entity: one negotiation from demand to plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NegotiationSession {
    pub negotiation_id: String,
    pub demand: DemandSnapshot,
    pub state: NegotiationState,
    pub participants: Vec<AgentParticipant>,
    pub center_rounds: u32,
    pub max_center_rounds: u32,
    pub plan_output: Option<String>,
    pub parent_negotiation_id: Option<String>,
    pub depth: u32,
    pub sub_session_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub trace: Option<TraceChain>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl NegotiationSession {
    /// Create a fresh root session (depth 0) in state `Created`.
    pub fn new(demand: DemandSnapshot) -> Self {
        let negotiation_id = generate_id("neg");
        Self {
            trace: Some(TraceChain::new(negotiation_id.clone())),
            negotiation_id,
            demand,
            state: NegotiationState::Created,
            participants: Vec::new(),
            center_rounds: 0,
            max_center_rounds: 2,
            plan_output: None,
            parent_negotiation_id: None,
            depth: 0,
            sub_session_ids: Vec::new(),
            created_at: Utc::now(),
            completed_at: None,
            metadata: Metadata::new(),
        }
    }

    /// Create a child session one depth level below `parent`, with
    /// `raw_intent` as its demand. Per §4.5, recursion is bounded to depth 1
    /// so the caller is expected to have already rejected `parent.depth >= 1`.
    pub fn child_of(parent: &NegotiationSession, raw_intent: impl Into<String>) -> Self {
        let mut child = Self::new(DemandSnapshot::new(raw_intent));
        child.parent_negotiation_id = Some(parent.negotiation_id.clone());
        child.depth = parent.depth + 1;
        child.max_center_rounds = parent.max_center_rounds;
        child
    }

    pub fn active_participants(&self) -> Vec<&AgentParticipant> {
        self.participants
            .iter()
            .filter(|p| p.state == AgentState::Active)
            .collect()
    }

    pub fn collected_offers(&self) -> Vec<&Offer> {
        self.participants
            .iter()
            .filter_map(|p| p.offer.as_ref())
            .collect()
    }

    pub fn is_barrier_met(&self) -> bool {
        self.participants
            .iter()
            .all(|p| matches!(p.state, AgentState::Replied | AgentState::Exited))
    }

    pub fn tools_restricted(&self) -> bool {
        self.center_rounds >= self.max_center_rounds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_text_falls_back_to_raw_intent() {
        let demand = DemandSnapshot::new("move a piano");
        assert_eq!(demand.effective_text(), "move a piano");
    }

    #[test]
    fn effective_text_prefers_formulated_text() {
        let mut demand = DemandSnapshot::new("move a piano");
        demand.formulated_text = Some("relocate an upright piano".to_string());
        assert_eq!(demand.effective_text(), "relocate an upright piano");
    }

    #[test]
    fn transition_graph_matches_spec() {
        use NegotiationState::*;
        assert!(Created.can_transition_to(Formulating));
        assert!(Created.can_transition_to(Completed));
        assert!(Synthesizing.can_transition_to(Synthesizing));
        assert!(!Completed.can_transition_to(Formulating));
        assert!(!Created.can_transition_to(Encoding));
        assert!(!Formulated.can_transition_to(Offering));
    }

    #[test]
    fn collected_offers_tracks_replied_participants_only() {
        let mut session = NegotiationSession::new(DemandSnapshot::new("x"));
        let mut p1 = AgentParticipant::new("a1", "Agent One", 0.9);
        p1.state = AgentState::Replied;
        p1.offer = Some(Offer {
            agent_id: "a1".into(),
            content: "ok".into(),
            capabilities: vec![],
            confidence: 0.5,
            created_at: Utc::now(),
            metadata: Metadata::new(),
        });
        let mut p2 = AgentParticipant::new("a2", "Agent Two", 0.5);
        p2.state = AgentState::Exited;
        session.participants.push(p1);
        session.participants.push(p2);

        assert_eq!(session.collected_offers().len(), 1);
        assert!(session.is_barrier_met());
    }

    #[test]
    fn child_session_depth_is_parent_plus_one() {
        let parent = NegotiationSession::new(DemandSnapshot::new("x"));
        let child = NegotiationSession::child_of(&parent, "gap-fill");
        assert_eq!(child.depth, parent.depth + 1);
        assert_eq!(child.parent_negotiation_id.as_deref(), Some(parent.negotiation_id.as_str()));
    }
}
