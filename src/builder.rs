//! Fluent assembly of a [`NegotiationEngine`] from pluggable collaborators,
//! mirroring this toolkit's usual builder-over-constructor convention.
//!
//! Unlike the source this was distilled from, there is no default
//! `Encoder`: its reference implementation is backed by a concrete
//! embedding model dependency this crate does not carry, so `build()`
//! returns a [`NegotiationError::Config`] if one was never supplied rather
//! than silently degrading Resonance to a no-op. `adapter` and `llm_client`
//! are likewise required — both are genuinely external collaborators with
//! no reasonable default.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::EngineLimits;
use crate::errors::NegotiationError;
use crate::events::{EventPusher, NullEventPusher};
use crate::models::NegotiationSession;
use crate::protocols::{AgentAdapter, CenterToolHandler, Encoder, LLMClient, ResonanceDetector, Skill, Vector};
use crate::resonance::CosineResonanceDetector;
use crate::skills::{CenterCoordinatorSkill, FormulationSkill, GapRecursionSkill, OfferSkill, SubNegotiationSkill};
use crate::NegotiationEngine;

/// Per-negotiation inputs that don't belong on the engine itself: the
/// Resonance candidate pool, display names, and the sub-negotiation
/// registration hook. Returned alongside the engine by [`EngineBuilder::build`]
/// so callers have a ready-made bundle to pass into
/// [`NegotiationEngine::start_negotiation`].
pub struct BuildExtras {
    pub agent_vectors: Vec<(String, Vector)>,
    pub k_star: i64,
    pub display_names: Option<HashMap<String, String>>,
    pub register_session: Option<Arc<dyn Fn(&NegotiationSession) + Send + Sync>>,
}

/// Builder for [`NegotiationEngine`]. Construct with [`EngineBuilder::new`],
/// chain `with_*` calls, then [`EngineBuilder::build`].
pub struct EngineBuilder {
    encoder: Option<Arc<dyn Encoder>>,
    resonance_detector: Arc<dyn ResonanceDetector>,
    event_pusher: Arc<dyn EventPusher>,
    adapter: Option<Arc<dyn AgentAdapter>>,
    llm_client: Option<Arc<dyn LLMClient>>,
    formulation_skill: Arc<dyn Skill>,
    offer_skill: Arc<dyn Skill>,
    center_skill: Arc<dyn Skill>,
    sub_negotiation_skill: Arc<dyn Skill>,
    gap_recursion_skill: Arc<dyn Skill>,
    tool_handlers: Vec<Arc<dyn CenterToolHandler>>,
    limits: EngineLimits,
    agent_vectors: Vec<(String, Vector)>,
    k_star: i64,
    display_names: Option<HashMap<String, String>>,
    register_session: Option<Arc<dyn Fn(&NegotiationSession) + Send + Sync>>,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self {
            encoder: None,
            resonance_detector: Arc::new(CosineResonanceDetector),
            event_pusher: Arc::new(NullEventPusher),
            adapter: None,
            llm_client: None,
            formulation_skill: Arc::new(FormulationSkill),
            offer_skill: Arc::new(OfferSkill),
            center_skill: Arc::new(CenterCoordinatorSkill),
            sub_negotiation_skill: Arc::new(SubNegotiationSkill),
            gap_recursion_skill: Arc::new(GapRecursionSkill),
            tool_handlers: Vec::new(),
            limits: EngineLimits::default(),
            agent_vectors: Vec::new(),
            k_star: 5,
            display_names: None,
            register_session: None,
        }
    }
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_encoder(mut self, encoder: Arc<dyn Encoder>) -> Self {
        self.encoder = Some(encoder);
        self
    }

    pub fn with_resonance_detector(mut self, detector: Arc<dyn ResonanceDetector>) -> Self {
        self.resonance_detector = detector;
        self
    }

    pub fn with_event_pusher(mut self, pusher: Arc<dyn EventPusher>) -> Self {
        self.event_pusher = pusher;
        self
    }

    pub fn with_adapter(mut self, adapter: Arc<dyn AgentAdapter>) -> Self {
        self.adapter = Some(adapter);
        self
    }

    pub fn with_llm_client(mut self, llm_client: Arc<dyn LLMClient>) -> Self {
        self.llm_client = Some(llm_client);
        self
    }

    pub fn with_formulation_skill(mut self, skill: Arc<dyn Skill>) -> Self {
        self.formulation_skill = skill;
        self
    }

    pub fn with_offer_skill(mut self, skill: Arc<dyn Skill>) -> Self {
        self.offer_skill = skill;
        self
    }

    pub fn with_center_skill(mut self, skill: Arc<dyn Skill>) -> Self {
        self.center_skill = skill;
        self
    }

    pub fn with_sub_negotiation_skill(mut self, skill: Arc<dyn Skill>) -> Self {
        self.sub_negotiation_skill = skill;
        self
    }

    pub fn with_gap_recursion_skill(mut self, skill: Arc<dyn Skill>) -> Self {
        self.gap_recursion_skill = skill;
        self
    }

    pub fn with_tool_handler(mut self, handler: Arc<dyn CenterToolHandler>) -> Self {
        self.tool_handlers.push(handler);
        self
    }

    pub fn offer_timeout(mut self, seconds: f64) -> Self {
        self.limits.offer_timeout_s = seconds;
        self
    }

    pub fn confirmation_timeout(mut self, seconds: f64) -> Self {
        self.limits.confirmation_timeout_s = seconds;
        self
    }

    pub fn with_agent_vectors(mut self, agent_vectors: Vec<(String, Vector)>) -> Self {
        self.agent_vectors = agent_vectors;
        self
    }

    pub fn with_k_star(mut self, k_star: i64) -> Self {
        self.k_star = k_star;
        self
    }

    pub fn with_display_names(mut self, display_names: HashMap<String, String>) -> Self {
        self.display_names = Some(display_names);
        self
    }

    pub fn with_register_session(
        mut self,
        callback: Arc<dyn Fn(&NegotiationSession) + Send + Sync>,
    ) -> Self {
        self.register_session = Some(callback);
        self
    }

    /// Assemble the engine. Fails if `encoder`, `adapter`, or `llm_client`
    /// was never supplied, or if two registered tool handlers share a name
    /// (including collision with a built-in).
    pub fn build(self) -> Result<(NegotiationEngine, BuildExtras), NegotiationError> {
        let encoder = self
            .encoder
            .ok_or_else(|| NegotiationError::Config("an Encoder is required".into()))?;
        let adapter = self
            .adapter
            .ok_or_else(|| NegotiationError::Config("an AgentAdapter is required".into()))?;
        let llm_client = self
            .llm_client
            .ok_or_else(|| NegotiationError::Config("an LLMClient is required".into()))?;

        let mut tool_handlers = HashMap::new();
        for handler in self.tool_handlers {
            let name = handler.tool_name().to_string();
            if crate::skills::center::all_tool_names().contains(&name.as_str()) {
                return Err(NegotiationError::Config(format!(
                    "tool name '{}' collides with a built-in",
                    name
                )));
            }
            if tool_handlers.insert(name.clone(), handler).is_some() {
                return Err(NegotiationError::Config(format!(
                    "duplicate tool handler registration for '{}'",
                    name
                )));
            }
        }

        let engine = NegotiationEngine::new(
            encoder,
            self.resonance_detector,
            self.event_pusher,
            adapter,
            llm_client,
            self.formulation_skill,
            self.offer_skill,
            self.center_skill,
            self.sub_negotiation_skill,
            self.gap_recursion_skill,
            tool_handlers,
            self.limits,
        );

        let extras = BuildExtras {
            agent_vectors: self.agent_vectors,
            k_star: self.k_star,
            display_names: self.display_names,
            register_session: self.register_session,
        };

        Ok((engine, extras))
    }
}
