//! Capability interfaces for pluggable collaborators.
//!
//! Each external dependency the engine needs — the embedding model, the
//! resonance detector, the per-agent chat adapter, the synthesis LLM, and
//! the skills — is expressed as a small `Send + Sync` trait rather than a
//! duck-typed object, so callers compose a concrete engine at construction
//! time (via [`EngineBuilder`](crate::builder::EngineBuilder)) instead of
//! relying on a process-wide singleton.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::NegotiationError;
use crate::models::{AgentParticipant, DemandSnapshot, NegotiationSession, Offer};

/// A dense embedding. Stored as `f32` for the usual encoder output shape;
/// magnitude and dimensionality are entirely up to the `Encoder`
/// implementation, the [`ResonanceDetector`] only assumes two vectors of
/// matching length.
pub type Vector = Vec<f32>;

/// Turns text into a vector for Resonance to compare against agent vectors.
#[async_trait]
pub trait Encoder: Send + Sync {
    async fn encode(&self, text: &str) -> Result<Vector, NegotiationError>;

    /// Default batch implementation encodes sequentially; encoders with a
    /// genuine batch API should override this.
    async fn batch_encode(&self, texts: &[String]) -> Result<Vec<Vector>, NegotiationError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.encode(text).await?);
        }
        Ok(out)
    }
}

/// Selects the top-`k_star` agents by similarity to the demand vector.
#[async_trait]
pub trait ResonanceDetector: Send + Sync {
    /// Returns `(agent_id, score)` pairs, sorted descending by score,
    /// truncated to `k_star`. Ties broken by the order `agent_vectors` is
    /// given in — callers that care about tie-break order should build the
    /// pool in that order (the sort used is stable).
    async fn detect(
        &self,
        demand_vector: &Vector,
        agent_vectors: &[(String, Vector)],
        k_star: i64,
    ) -> Vec<(String, f64)>;
}

/// The per-agent chat adapter: fetches a profile and simulates an agent's
/// response. Out of scope for this crate beyond the interface — callers
/// supply a real implementation (e.g. backed by another LLM call per agent,
/// or a fixture in tests).
#[async_trait]
pub trait AgentAdapter: Send + Sync {
    async fn get_profile(&self, agent_id: &str) -> Result<Value, NegotiationError>;

    async fn chat(
        &self,
        agent_id: &str,
        messages: &[(String, String)],
        system_prompt: Option<&str>,
    ) -> Result<String, NegotiationError>;
}

/// Structured result of an [`LLMClient::chat`] call.
#[derive(Debug, Clone, Default)]
pub struct LlmResponse {
    pub content: Option<String>,
    pub tool_calls: Option<Vec<LlmToolCall>>,
    pub stop_reason: Option<String>,
}

/// One tool call as requested by the synthesis LLM.
#[derive(Debug, Clone)]
pub struct LlmToolCall {
    pub name: String,
    pub arguments: Value,
}

/// A single chat message passed to [`LLMClient::chat`].
#[derive(Debug, Clone)]
pub struct LlmMessage {
    pub role: String,
    pub content: String,
}

/// The LLM provider used for synthesis and enrichment. Out of scope beyond
/// the interface.
#[async_trait]
pub trait LLMClient: Send + Sync {
    async fn chat(
        &self,
        messages: &[LlmMessage],
        system_prompt: Option<&str>,
        tools: Option<&[Value]>,
    ) -> Result<LlmResponse, NegotiationError>;
}

/// Everything a [`Skill`] might need from its caller.
///
/// Skills are stateless: rather than a duck-typed dict (as in the source
/// this was distilled from), each field the §4.6 contexts use is named and
/// typed here, with irrelevant fields left `None`. `llm_client` cannot be
/// carried through a plain data map since it is a trait object, which is
/// why this is a struct rather than `serde_json::Value`.
#[derive(Clone)]
pub struct SkillContext {
    pub demand: Option<DemandSnapshot>,
    pub profile: Option<Value>,
    pub offers: Option<Vec<Offer>>,
    pub participants: Option<Vec<AgentParticipant>>,
    pub round_number: Option<u32>,
    pub history: Option<Vec<Value>>,
    pub tools_restricted: Option<bool>,
    pub gap_description: Option<String>,
    pub agent_a: Option<AgentParticipant>,
    pub agent_b: Option<AgentParticipant>,
    pub reason: Option<String>,
    pub llm_client: Option<Arc<dyn LLMClient>>,
    /// Names of engine-registered custom tool handlers, offered to Center
    /// alongside the built-ins when not `tools_restricted`.
    pub custom_tool_names: Option<Vec<String>>,
}

impl Default for SkillContext {
    fn default() -> Self {
        Self {
            demand: None,
            profile: None,
            offers: None,
            participants: None,
            round_number: None,
            history: None,
            tools_restricted: None,
            gap_description: None,
            agent_a: None,
            agent_b: None,
            reason: None,
            llm_client: None,
            custom_tool_names: None,
        }
    }
}

/// A stateless, LLM-backed transformation with a defined input context and
/// output schema (§4.6). Skills do not hold state between calls; all
/// context flows through [`SkillContext`].
#[async_trait]
pub trait Skill: Send + Sync {
    /// Stable identifier, e.g. `"formulation"`, `"center_coordinator"`.
    fn name(&self) -> &str;

    async fn execute(&self, context: &SkillContext) -> Result<Value, NegotiationError>;
}

/// A handler for a custom (non-built-in) Center tool.
#[async_trait]
pub trait CenterToolHandler: Send + Sync {
    /// Must not collide with a built-in tool name; registering `output_plan`
    /// (or any other built-in) is rejected by
    /// [`NegotiationEngine::register_tool_handler`](crate::engine::NegotiationEngine::register_tool_handler).
    fn tool_name(&self) -> &str;

    async fn handle(
        &self,
        session: &NegotiationSession,
        tool_args: &Value,
        context: &Value,
    ) -> Result<Option<Value>, NegotiationError>;
}
