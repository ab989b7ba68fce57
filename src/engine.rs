//! The negotiation engine: drives one [`NegotiationSession`] through the
//! state machine in §4.1 of the design — Formulation, an optional
//! confirmation rendezvous, Encoding & Resonance, the concurrent offer
//! barrier, and the bounded Center synthesis loop with tool dispatch and
//! bounded recursion into sub-negotiations.
//!
//! Collaborators (encoder, resonance detector, adapter, LLM client, skills,
//! event pusher) are wired in once at construction time through
//! [`EngineBuilder`](crate::builder::EngineBuilder) rather than threaded
//! through every call, unlike the source this was distilled from.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Value};
use tokio::sync::Notify;

use crate::config::EngineLimits;
use crate::errors::NegotiationError;
use crate::events::{EventPusher, NegotiationEvent};
use crate::models::{AgentParticipant, AgentState, NegotiationSession, NegotiationState, Offer};
use crate::protocols::{
    AgentAdapter, CenterToolHandler, Encoder, LLMClient, ResonanceDetector, Skill, SkillContext,
    Vector,
};
use crate::skills::center::{
    all_tool_names, TOOL_ASK_AGENT, TOOL_CREATE_MACHINE, TOOL_CREATE_SUB_DEMAND,
    TOOL_OUTPUT_PLAN, TOOL_START_DISCOVERY,
};

struct ConfirmationSlot {
    notify: Notify,
    text: Mutex<Option<String>>,
}

/// Drives negotiations from CREATED to COMPLETED.
///
/// Cheap to clone via `Arc<NegotiationEngine>` — all collaborators are
/// themselves `Arc`-wrapped trait objects, and the only interior mutable
/// state (tool handlers, confirmation rendezvous slots) is behind a
/// `std::sync::Mutex` that is never held across an `.await`.
pub struct NegotiationEngine {
    encoder: Arc<dyn Encoder>,
    resonance_detector: Arc<dyn ResonanceDetector>,
    event_pusher: Arc<dyn EventPusher>,
    adapter: Arc<dyn AgentAdapter>,
    llm_client: Arc<dyn LLMClient>,
    formulation_skill: Arc<dyn Skill>,
    offer_skill: Arc<dyn Skill>,
    center_skill: Arc<dyn Skill>,
    sub_negotiation_skill: Arc<dyn Skill>,
    gap_recursion_skill: Arc<dyn Skill>,
    tool_handlers: Mutex<HashMap<String, Arc<dyn CenterToolHandler>>>,
    confirmations: Mutex<HashMap<String, Arc<ConfirmationSlot>>>,
    limits: EngineLimits,
}

impl NegotiationEngine {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        encoder: Arc<dyn Encoder>,
        resonance_detector: Arc<dyn ResonanceDetector>,
        event_pusher: Arc<dyn EventPusher>,
        adapter: Arc<dyn AgentAdapter>,
        llm_client: Arc<dyn LLMClient>,
        formulation_skill: Arc<dyn Skill>,
        offer_skill: Arc<dyn Skill>,
        center_skill: Arc<dyn Skill>,
        sub_negotiation_skill: Arc<dyn Skill>,
        gap_recursion_skill: Arc<dyn Skill>,
        tool_handlers: HashMap<String, Arc<dyn CenterToolHandler>>,
        limits: EngineLimits,
    ) -> Self {
        Self {
            encoder,
            resonance_detector,
            event_pusher,
            adapter,
            llm_client,
            formulation_skill,
            offer_skill,
            center_skill,
            sub_negotiation_skill,
            gap_recursion_skill,
            tool_handlers: Mutex::new(tool_handlers),
            confirmations: Mutex::new(HashMap::new()),
            limits,
        }
    }

    /// Drive `session` from its current state to COMPLETED.
    ///
    /// `agent_vectors` maps candidate agent ids to embeddings for Resonance;
    /// `k_star` bounds how many are activated. `display_names` supplies a
    /// human-readable label per agent id, falling back to the id itself.
    /// `register_session` is invoked synchronously whenever a sub-negotiation
    /// spawns a child session, so the caller can persist it before recursion
    /// proceeds. `await_confirmation` opts into the §4.2 rendezvous.
    pub fn start_negotiation(
        &self,
        mut session: NegotiationSession,
        agent_vectors: Vec<(String, Vector)>,
        k_star: i64,
        display_names: Option<HashMap<String, String>>,
        register_session: Option<Arc<dyn Fn(&NegotiationSession) + Send + Sync>>,
        await_confirmation: bool,
    ) -> Pin<Box<dyn Future<Output = Result<NegotiationSession, NegotiationError>> + Send + '_>>
    {
        Box::pin(async move {
            self.run_formulation(&mut session).await?;
            if await_confirmation {
                self.run_confirmation(&mut session).await;
            }
            self.run_resonance(&mut session, &agent_vectors, k_star, display_names.as_ref())
                .await?;
            self.run_offer_barrier(&mut session).await?;
            self.run_synthesis(&mut session, register_session).await?;
            Ok(session)
        })
    }

    /// Register a handler for a custom Center tool. Rejects collisions with
    /// a built-in name or a previously registered custom tool.
    pub fn register_tool_handler(
        &self,
        handler: Arc<dyn CenterToolHandler>,
    ) -> Result<(), NegotiationError> {
        let name = handler.tool_name().to_string();
        if all_tool_names().contains(&name.as_str()) {
            return Err(NegotiationError::Config(format!(
                "tool name '{}' collides with a built-in",
                name
            )));
        }
        let mut handlers = self.tool_handlers.lock().unwrap();
        if handlers.contains_key(&name) {
            return Err(NegotiationError::Config(format!(
                "tool handler '{}' is already registered",
                name
            )));
        }
        handlers.insert(name, handler);
        Ok(())
    }

    /// Fire the confirmation rendezvous for `negotiation_id`, optionally
    /// replacing the formulated text. Returns `false` if no rendezvous is
    /// currently registered (no awaiting call, or it already timed out).
    pub fn confirm_formulation(&self, negotiation_id: &str, confirmed_text: Option<String>) -> bool {
        let slots = self.confirmations.lock().unwrap();
        match slots.get(negotiation_id) {
            Some(slot) => {
                if let Some(text) = confirmed_text {
                    *slot.text.lock().unwrap() = Some(text);
                }
                slot.notify.notify_one();
                true
            }
            None => false,
        }
    }

    pub fn is_awaiting_confirmation(&self, negotiation_id: &str) -> bool {
        self.confirmations.lock().unwrap().contains_key(negotiation_id)
    }

    fn transition(
        &self,
        session: &mut NegotiationSession,
        to: NegotiationState,
    ) -> Result<(), NegotiationError> {
        if !session.state.can_transition_to(to) {
            return Err(NegotiationError::InvalidStateTransition(format!(
                "{:?} -> {:?}",
                session.state, to
            )));
        }
        log::debug!(
            "negotiation {} transition {:?} -> {:?}",
            session.negotiation_id,
            session.state,
            to
        );
        session.state = to;
        if to == NegotiationState::Completed {
            let now = Utc::now();
            session.completed_at = Some(now);
            if let Some(trace) = session.trace.as_mut() {
                trace.completed_at = Some(now);
            }
        }
        Ok(())
    }

    async fn emit(&self, event: NegotiationEvent) {
        if let Err(e) = self.event_pusher.push(event).await {
            log::warn!("event push failed: {}", e);
        }
    }

    async fn run_formulation(&self, session: &mut NegotiationSession) -> Result<(), NegotiationError> {
        self.transition(session, NegotiationState::Formulating)?;

        // Formulation is enhancement, not gate: a failure anywhere in this
        // block — profile fetch included — falls back to the raw intent
        // with no enrichments rather than failing the negotiation.
        let (formulated_text, enrichments) = match self.try_formulate(session).await {
            Ok(result) => result,
            Err(e) => {
                log::warn!(
                    "formulation degraded for negotiation {}: {}",
                    session.negotiation_id,
                    e
                );
                (session.demand.raw_intent.clone(), json!({}))
            }
        };

        session.demand.formulated_text = Some(formulated_text.clone());
        session
            .demand
            .metadata
            .insert("enrichments".to_string(), enrichments.clone());
        self.transition(session, NegotiationState::Formulated)?;
        self.emit(NegotiationEvent::formulation_ready(
            &session.negotiation_id,
            &session.demand.raw_intent,
            &formulated_text,
            enrichments,
        ))
        .await;
        Ok(())
    }

    async fn try_formulate(
        &self,
        session: &NegotiationSession,
    ) -> Result<(String, Value), NegotiationError> {
        let profile = match &session.demand.user_id {
            Some(user_id) => Some(self.adapter.get_profile(user_id).await?),
            None => None,
        };

        let context = SkillContext {
            demand: Some(session.demand.clone()),
            profile,
            llm_client: Some(self.llm_client.clone()),
            ..Default::default()
        };

        let value = self.formulation_skill.execute(&context).await?;
        let text = value
            .get("formulated_text")
            .and_then(Value::as_str)
            .unwrap_or(&session.demand.raw_intent)
            .to_string();
        let enrichments = value.get("enrichments").cloned().unwrap_or_else(|| json!({}));
        Ok((text, enrichments))
    }

    async fn run_confirmation(&self, session: &mut NegotiationSession) {
        let slot = Arc::new(ConfirmationSlot {
            notify: Notify::new(),
            text: Mutex::new(None),
        });
        {
            let mut slots = self.confirmations.lock().unwrap();
            slots.insert(session.negotiation_id.clone(), slot.clone());
        }

        let timeout_dur = Duration::from_secs_f64(self.limits.confirmation_timeout_s);
        tokio::select! {
            _ = slot.notify.notified() => {
                log::debug!("negotiation {} confirmed", session.negotiation_id);
            }
            _ = tokio::time::sleep(timeout_dur) => {
                log::warn!(
                    "negotiation {} confirmation timed out, proceeding with current text",
                    session.negotiation_id
                );
            }
        }

        self.confirmations.lock().unwrap().remove(&session.negotiation_id);
        let confirmed_text = slot.text.lock().unwrap().clone();
        if let Some(text) = confirmed_text {
            session.demand.formulated_text = Some(text);
        }
    }

    async fn run_resonance(
        &self,
        session: &mut NegotiationSession,
        agent_vectors: &[(String, Vector)],
        k_star: i64,
        display_names: Option<&HashMap<String, String>>,
    ) -> Result<(), NegotiationError> {
        self.transition(session, NegotiationState::Encoding)?;

        let text = session.demand.effective_text().to_string();
        let vector = match self.encoder.encode(&text).await {
            Ok(vector) => vector,
            Err(e) => {
                log::error!(
                    "encoding failed for negotiation {}: {}",
                    session.negotiation_id,
                    e
                );
                self.transition(session, NegotiationState::Completed)?;
                return Err(e);
            }
        };

        let scored = self.resonance_detector.detect(&vector, agent_vectors, k_star).await;
        for (agent_id, score) in &scored {
            let display_name = display_names
                .and_then(|m| m.get(agent_id))
                .cloned()
                .unwrap_or_else(|| agent_id.clone());
            session
                .participants
                .push(AgentParticipant::new(agent_id.clone(), display_name, *score));
        }

        self.transition(session, NegotiationState::Offering)?;
        let agents: Vec<Value> = scored
            .iter()
            .map(|(id, score)| json!({ "agent_id": id, "score": score }))
            .collect();
        self.emit(NegotiationEvent::resonance_activated(
            &session.negotiation_id,
            scored.len(),
            json!(agents),
        ))
        .await;
        Ok(())
    }

    async fn run_offer_barrier(&self, session: &mut NegotiationSession) -> Result<(), NegotiationError> {
        let negotiation_id = session.negotiation_id.clone();
        let demand = session.demand.clone();
        let timeout_dur = Duration::from_secs_f64(self.limits.offer_timeout_s);
        let display_names: HashMap<String, String> = session
            .participants
            .iter()
            .map(|p| (p.agent_id.clone(), p.display_name.clone()))
            .collect();
        let participant_ids: Vec<String> =
            session.participants.iter().map(|p| p.agent_id.clone()).collect();

        // `offer_received` is emitted from inside each task, as soon as it
        // resolves, so observers see completion order rather than the
        // participant order these tasks were launched in.
        let futures = participant_ids.into_iter().map(|agent_id| {
            let adapter = self.adapter.clone();
            let skill = self.offer_skill.clone();
            let llm_client = self.llm_client.clone();
            let demand = demand.clone();
            let negotiation_id = negotiation_id.clone();
            let display_name = display_names.get(&agent_id).cloned().unwrap_or_else(|| agent_id.clone());
            async move {
                let outcome = tokio::time::timeout(timeout_dur, async {
                    let profile = adapter.get_profile(&agent_id).await?;
                    let context = SkillContext {
                        demand: Some(demand),
                        profile: Some(profile),
                        llm_client: Some(llm_client),
                        ..Default::default()
                    };
                    skill.execute(&context).await
                })
                .await;

                let value = match outcome {
                    Err(_) => {
                        log::warn!(
                            "offer timed out for agent {} in negotiation {}",
                            agent_id,
                            negotiation_id
                        );
                        return (agent_id, None);
                    }
                    Ok(Err(e)) => {
                        log::warn!(
                            "offer failed for agent {} in negotiation {}: {}",
                            agent_id,
                            negotiation_id,
                            e
                        );
                        return (agent_id, None);
                    }
                    Ok(Ok(value)) => value,
                };

                let content = value.get("content").and_then(Value::as_str).unwrap_or("").to_string();
                let capabilities: Vec<String> = value
                    .get("capabilities")
                    .and_then(Value::as_array)
                    .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
                    .unwrap_or_default();
                let confidence = value.get("confidence").and_then(Value::as_f64).unwrap_or(0.5);
                let offer = Offer {
                    agent_id: agent_id.clone(),
                    content: content.clone(),
                    capabilities: capabilities.clone(),
                    confidence,
                    created_at: Utc::now(),
                    metadata: Default::default(),
                };

                self.emit(NegotiationEvent::offer_received(
                    &negotiation_id,
                    &agent_id,
                    &display_name,
                    &content,
                    &capabilities,
                ))
                .await;

                (agent_id, Some(offer))
            }
        });

        let results = futures_util::future::join_all(futures).await;

        let mut offers_received = 0usize;
        let mut exited_count = 0usize;

        for (agent_id, offer) in results {
            match offer {
                Some(offer) => {
                    offers_received += 1;
                    if let Some(p) = session.participants.iter_mut().find(|p| p.agent_id == agent_id) {
                        p.state = AgentState::Replied;
                        p.offer = Some(offer);
                    }
                }
                None => {
                    exited_count += 1;
                    if let Some(p) = session.participants.iter_mut().find(|p| p.agent_id == agent_id) {
                        p.state = AgentState::Exited;
                    }
                }
            }
        }

        let total_participants = session.participants.len();
        self.transition(session, NegotiationState::BarrierWaiting)?;
        self.emit(NegotiationEvent::barrier_complete(
            &negotiation_id,
            total_participants,
            offers_received,
            exited_count,
        ))
        .await;
        Ok(())
    }

    async fn run_synthesis(
        &self,
        session: &mut NegotiationSession,
        register_session: Option<Arc<dyn Fn(&NegotiationSession) + Send + Sync>>,
    ) -> Result<(), NegotiationError> {
        self.transition(session, NegotiationState::Synthesizing)?;
        let negotiation_id = session.negotiation_id.clone();
        let mut history: Vec<Value> = Vec::new();

        loop {
            let tools_restricted = session.tools_restricted();
            session.center_rounds += 1;
            let round_number = session.center_rounds;

            let custom_tool_names: Vec<String> = if tools_restricted {
                Vec::new()
            } else {
                self.tool_handlers.lock().unwrap().keys().cloned().collect()
            };

            let context = SkillContext {
                demand: Some(session.demand.clone()),
                offers: Some(session.collected_offers().into_iter().cloned().collect()),
                participants: Some(session.participants.clone()),
                round_number: Some(round_number),
                history: Some(history.clone()),
                tools_restricted: Some(tools_restricted),
                llm_client: Some(self.llm_client.clone()),
                custom_tool_names: Some(custom_tool_names),
                ..Default::default()
            };

            let output = match self.center_skill.execute(&context).await {
                Ok(output) => output,
                Err(e) => {
                    log::error!(
                        "center synthesis fatal for negotiation {} at round {}: {}",
                        negotiation_id,
                        round_number,
                        e
                    );
                    self.transition(session, NegotiationState::Completed)?;
                    return Err(e);
                }
            };

            let tool_calls = output
                .get("tool_calls")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();

            for call in tool_calls {
                let name = call.get("name").and_then(Value::as_str).unwrap_or("").to_string();
                let arguments = call.get("arguments").cloned().unwrap_or_else(|| json!({}));

                self.emit(NegotiationEvent::center_tool_call(
                    &negotiation_id,
                    &name,
                    &arguments,
                    round_number,
                ))
                .await;

                match name.as_str() {
                    TOOL_OUTPUT_PLAN => {
                        let plan_text = arguments
                            .get("plan_text")
                            .and_then(Value::as_str)
                            .unwrap_or("")
                            .to_string();
                        session.plan_output = Some(plan_text.clone());
                        self.transition(session, NegotiationState::Completed)?;
                        let agents: Vec<String> =
                            session.participants.iter().map(|p| p.agent_id.clone()).collect();
                        self.emit(NegotiationEvent::plan_ready(
                            &negotiation_id,
                            &plan_text,
                            session.center_rounds,
                            &agents,
                        ))
                        .await;
                        return Ok(());
                    }
                    TOOL_ASK_AGENT => {
                        self.dispatch_ask_agent(session, &arguments, &mut history, &negotiation_id)
                            .await;
                    }
                    TOOL_START_DISCOVERY => {
                        self.dispatch_start_discovery(session, &arguments, &mut history, &negotiation_id)
                            .await;
                    }
                    TOOL_CREATE_SUB_DEMAND => {
                        self.dispatch_create_sub_demand(
                            session,
                            &arguments,
                            &negotiation_id,
                            register_session.clone(),
                        )
                        .await;
                    }
                    TOOL_CREATE_MACHINE => {
                        log::debug!("create_machine invoked (no-op) in negotiation {}", negotiation_id);
                    }
                    other => {
                        self.dispatch_custom_tool(session, other, &arguments, &mut history, &negotiation_id)
                            .await;
                    }
                }
            }

            // `tools_restricted` reflects the state at the top of this round: once
            // Center has already been offered only the restricted set and still
            // didn't terminate, one restricted attempt is all it gets.
            if tools_restricted {
                break;
            }
        }

        session.plan_output = Some("no plan generated".to_string());
        self.transition(session, NegotiationState::Completed)?;
        let agents: Vec<String> = session.participants.iter().map(|p| p.agent_id.clone()).collect();
        self.emit(NegotiationEvent::plan_ready(
            &negotiation_id,
            "no plan generated",
            session.center_rounds,
            &agents,
        ))
        .await;
        Ok(())
    }

    async fn dispatch_ask_agent(
        &self,
        session: &NegotiationSession,
        arguments: &Value,
        history: &mut Vec<Value>,
        negotiation_id: &str,
    ) {
        let agent_id = arguments.get("agent_id").and_then(Value::as_str).unwrap_or("").to_string();
        let question = arguments.get("question").and_then(Value::as_str).unwrap_or("").to_string();

        if !session.participants.iter().any(|p| p.agent_id == agent_id) {
            log::warn!(
                "ask_agent: unknown participant '{}' in negotiation {}",
                agent_id,
                negotiation_id
            );
            return;
        }

        let response = match self
            .adapter
            .chat(&agent_id, &[("user".to_string(), question.clone())], None)
            .await
        {
            Ok(text) => text,
            Err(e) => format!("[Error: {}]", e),
        };
        history.push(json!({
            "type": "agent_reply",
            "agent_id": agent_id,
            "question": question,
            "response": response,
        }));
    }

    async fn dispatch_start_discovery(
        &self,
        session: &NegotiationSession,
        arguments: &Value,
        history: &mut Vec<Value>,
        negotiation_id: &str,
    ) {
        let agent_a_id = arguments.get("agent_a").and_then(Value::as_str).unwrap_or("").to_string();
        let agent_b_id = arguments.get("agent_b").and_then(Value::as_str).unwrap_or("").to_string();
        let reason = arguments.get("reason").and_then(Value::as_str).unwrap_or("").to_string();

        let agent_a = session.participants.iter().find(|p| p.agent_id == agent_a_id).cloned();
        let agent_b = session.participants.iter().find(|p| p.agent_id == agent_b_id).cloned();

        let (agent_a, agent_b) = match (agent_a, agent_b) {
            (Some(a), Some(b)) => (a, b),
            _ => {
                log::warn!(
                    "start_discovery: unknown participant pair ({}, {}) in negotiation {}",
                    agent_a_id,
                    agent_b_id,
                    negotiation_id
                );
                return;
            }
        };

        let context = SkillContext {
            agent_a: Some(agent_a),
            agent_b: Some(agent_b),
            reason: Some(reason),
            llm_client: Some(self.llm_client.clone()),
            ..Default::default()
        };

        match self.sub_negotiation_skill.execute(&context).await {
            Ok(report) => history.push(json!({
                "type": "discovery",
                "agent_a": agent_a_id,
                "agent_b": agent_b_id,
                "report": report,
            })),
            Err(e) => log::warn!("start_discovery failed in negotiation {}: {}", negotiation_id, e),
        }
    }

    async fn dispatch_create_sub_demand(
        &self,
        session: &mut NegotiationSession,
        arguments: &Value,
        negotiation_id: &str,
        register_session: Option<Arc<dyn Fn(&NegotiationSession) + Send + Sync>>,
    ) {
        if session.depth >= 1 {
            log::warn!(
                "create_sub_demand refused at depth {} in negotiation {}",
                session.depth,
                negotiation_id
            );
            return;
        }

        let gap_description = arguments
            .get("gap_description")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();

        let context = SkillContext {
            gap_description: Some(gap_description.clone()),
            llm_client: Some(self.llm_client.clone()),
            ..Default::default()
        };

        let sub_demand_text = match self.gap_recursion_skill.execute(&context).await {
            Ok(value) => value
                .get("sub_demand_text")
                .and_then(Value::as_str)
                .unwrap_or(&gap_description)
                .to_string(),
            Err(e) => {
                log::warn!(
                    "create_sub_demand: gap recursion failed in negotiation {}: {}",
                    negotiation_id,
                    e
                );
                return;
            }
        };

        let child = NegotiationSession::child_of(session, sub_demand_text);
        if let Some(cb) = &register_session {
            cb(&child);
        }
        session.sub_session_ids.push(child.negotiation_id.clone());
        self.emit(NegotiationEvent::sub_negotiation_started(
            negotiation_id,
            &child.negotiation_id,
            &gap_description,
        ))
        .await;

        let child_result = self
            .start_negotiation(child, Vec::new(), 0, None, register_session, false)
            .await;
        if let Err(e) = child_result {
            log::warn!("sub-negotiation failed under negotiation {}: {}", negotiation_id, e);
        }
    }

    async fn dispatch_custom_tool(
        &self,
        session: &NegotiationSession,
        tool_name: &str,
        arguments: &Value,
        history: &mut Vec<Value>,
        negotiation_id: &str,
    ) {
        let handler = self.tool_handlers.lock().unwrap().get(tool_name).cloned();
        let handler = match handler {
            Some(handler) => handler,
            None => {
                log::warn!(
                    "no handler registered for custom tool '{}' in negotiation {}",
                    tool_name,
                    negotiation_id
                );
                return;
            }
        };

        match handler.handle(session, arguments, &json!({ "history": history })).await {
            Ok(result) => history.push(json!({
                "type": "custom_tool",
                "tool": tool_name,
                "args": arguments,
                "result": result,
            })),
            Err(e) => log::warn!(
                "custom tool '{}' failed in negotiation {}: {}",
                tool_name,
                negotiation_id,
                e
            ),
        }
    }
}
