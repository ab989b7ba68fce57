//! End-to-end negotiation scenarios driven through hand-written mock
//! collaborators, no mocking framework.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use negotiant::builder::EngineBuilder;
use negotiant::errors::NegotiationError;
use negotiant::events::{EventPusher, EventType, NegotiationEvent};
use negotiant::models::{DemandSnapshot, NegotiationSession, NegotiationState};
use negotiant::protocols::{AgentAdapter, Encoder, LLMClient, LlmMessage, LlmResponse, LlmToolCall, Vector};
use serde_json::{json, Value};

struct UnitEncoder;

#[async_trait]
impl Encoder for UnitEncoder {
    async fn encode(&self, _text: &str) -> Result<Vector, NegotiationError> {
        Ok(vec![1.0, 0.0, 0.0])
    }
}

struct StubAdapter;

#[async_trait]
impl AgentAdapter for StubAdapter {
    async fn get_profile(&self, agent_id: &str) -> Result<Value, NegotiationError> {
        Ok(json!({ "agent_id": agent_id }))
    }

    async fn chat(
        &self,
        agent_id: &str,
        _messages: &[(String, String)],
        _system_prompt: Option<&str>,
    ) -> Result<String, NegotiationError> {
        Ok(format!("{} acknowledges", agent_id))
    }
}

struct FailingProfileAdapter;

#[async_trait]
impl AgentAdapter for FailingProfileAdapter {
    async fn get_profile(&self, _agent_id: &str) -> Result<Value, NegotiationError> {
        Err(NegotiationError::Adapter("profile service unreachable".into()))
    }

    async fn chat(
        &self,
        agent_id: &str,
        _messages: &[(String, String)],
        _system_prompt: Option<&str>,
    ) -> Result<String, NegotiationError> {
        Ok(format!("{} acknowledges", agent_id))
    }
}

/// Returns a scripted sequence of Center responses (one per call with
/// `tools` set) and a canned Formulation/Offer response otherwise. An
/// optional slow agent id delays its Offer call past any configured
/// timeout.
struct ScriptedLlmClient {
    center_script: Mutex<Vec<Value>>,
    slow_agent_id: Option<String>,
    slow_delay: Duration,
}

impl ScriptedLlmClient {
    fn new(center_script: Vec<Value>) -> Self {
        Self {
            center_script: Mutex::new(center_script),
            slow_agent_id: None,
            slow_delay: Duration::from_millis(0),
        }
    }

    fn with_slow_agent(mut self, agent_id: &str, delay: Duration) -> Self {
        self.slow_agent_id = Some(agent_id.to_string());
        self.slow_delay = delay;
        self
    }
}

#[async_trait]
impl LLMClient for ScriptedLlmClient {
    async fn chat(
        &self,
        messages: &[LlmMessage],
        _system_prompt: Option<&str>,
        tools: Option<&[Value]>,
    ) -> Result<LlmResponse, NegotiationError> {
        let joined: String = messages.iter().map(|m| m.content.as_str()).collect::<Vec<_>>().join("\n");

        if tools.is_some() {
            let mut script = self.center_script.lock().unwrap();
            if script.is_empty() {
                return Ok(LlmResponse { content: None, tool_calls: None, stop_reason: None });
            }
            let next = script.remove(0);
            let tool_calls = next.get("tool_calls").and_then(Value::as_array).map(|arr| {
                arr.iter()
                    .map(|tc| LlmToolCall {
                        name: tc["name"].as_str().unwrap_or_default().to_string(),
                        arguments: tc["arguments"].clone(),
                    })
                    .collect()
            });
            let content = next.get("content").and_then(Value::as_str).map(str::to_string);
            return Ok(LlmResponse { content, tool_calls, stop_reason: None });
        }

        if joined.contains("## Raw intent") {
            return Ok(LlmResponse {
                content: Some(json!({ "formulated_text": "enriched demand" }).to_string()),
                tool_calls: None,
                stop_reason: None,
            });
        }

        if let Some(slow_id) = &self.slow_agent_id {
            if joined.contains(slow_id.as_str()) && !self.slow_delay.is_zero() {
                tokio::time::sleep(self.slow_delay).await;
            }
        }

        Ok(LlmResponse {
            content: Some(json!({"content": "I can help", "capabilities": ["lifting"], "confidence": 0.9}).to_string()),
            tool_calls: None,
            stop_reason: None,
        })
    }
}

struct RecordingEventPusher {
    events: Mutex<Vec<NegotiationEvent>>,
}

impl RecordingEventPusher {
    fn new() -> Self {
        Self { events: Mutex::new(Vec::new()) }
    }

    fn tags(&self) -> Vec<EventType> {
        self.events.lock().unwrap().iter().map(|e| e.event_type).collect()
    }

    /// `agent_id` of each `offer.received` event, in emission order.
    fn offer_event_agent_ids(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.event_type == EventType::OfferReceived)
            .map(|e| e.data["agent_id"].as_str().unwrap_or_default().to_string())
            .collect()
    }
}

#[async_trait]
impl EventPusher for RecordingEventPusher {
    async fn push(&self, event: NegotiationEvent) -> Result<(), String> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

fn one_agent_vectors(id: &str) -> Vec<(String, Vector)> {
    vec![(id.to_string(), vec![1.0, 0.0, 0.0])]
}

#[tokio::test]
async fn single_agent_happy_path() {
    let pusher = std::sync::Arc::new(RecordingEventPusher::new());
    let llm = std::sync::Arc::new(ScriptedLlmClient::new(vec![
        json!({"tool_calls": [{"name": "output_plan", "arguments": {"plan_text": "P"}}]}),
    ]));

    let (engine, _extras) = EngineBuilder::new()
        .with_encoder(std::sync::Arc::new(UnitEncoder))
        .with_adapter(std::sync::Arc::new(StubAdapter))
        .with_llm_client(llm)
        .with_event_pusher(pusher.clone())
        .build()
        .unwrap();

    let session = NegotiationSession::new(DemandSnapshot::new("move a piano"));
    let result = engine
        .start_negotiation(session, one_agent_vectors("a1"), 1, None, None, false)
        .await
        .unwrap();

    assert_eq!(result.state, NegotiationState::Completed);
    assert_eq!(result.plan_output.as_deref(), Some("P"));
    assert_eq!(result.participants.len(), 1);

    let tags = pusher.tags();
    assert_eq!(
        tags,
        vec![
            EventType::FormulationReady,
            EventType::ResonanceActivated,
            EventType::OfferReceived,
            EventType::BarrierComplete,
            EventType::CenterToolCall,
            EventType::PlanReady,
        ]
    );
}

#[tokio::test]
async fn profile_fetch_failure_degrades_formulation_instead_of_failing() {
    let pusher = std::sync::Arc::new(RecordingEventPusher::new());
    let llm = std::sync::Arc::new(ScriptedLlmClient::new(vec![
        json!({"tool_calls": [{"name": "output_plan", "arguments": {"plan_text": "P"}}]}),
    ]));

    let (engine, _extras) = EngineBuilder::new()
        .with_encoder(std::sync::Arc::new(UnitEncoder))
        .with_adapter(std::sync::Arc::new(FailingProfileAdapter))
        .with_llm_client(llm)
        .with_event_pusher(pusher.clone())
        .build()
        .unwrap();

    let mut demand = DemandSnapshot::new("move a piano");
    demand.user_id = Some("u1".to_string());
    let session = NegotiationSession::new(demand);

    let result = engine
        .start_negotiation(session, one_agent_vectors("a1"), 1, None, None, false)
        .await
        .unwrap();

    assert_eq!(result.state, NegotiationState::Completed);
    assert_eq!(result.demand.formulated_text.as_deref(), Some("move a piano"));
    assert!(pusher.tags().contains(&EventType::FormulationReady));
}

#[tokio::test]
async fn mixed_timeout_marks_slow_agent_exited() {
    let llm = std::sync::Arc::new(
        ScriptedLlmClient::new(vec![json!({"tool_calls": [{"name": "output_plan", "arguments": {"plan_text": "P"}}]})])
            .with_slow_agent("a2", Duration::from_millis(200)),
    );

    let agent_vectors = vec![
        ("a1".to_string(), vec![1.0, 0.0, 0.0]),
        ("a2".to_string(), vec![1.0, 0.0, 0.0]),
        ("a3".to_string(), vec![1.0, 0.0, 0.0]),
    ];

    let (engine, _extras) = EngineBuilder::new()
        .with_encoder(std::sync::Arc::new(UnitEncoder))
        .with_adapter(std::sync::Arc::new(StubAdapter))
        .with_llm_client(llm)
        .offer_timeout(0.05)
        .build()
        .unwrap();

    let session = NegotiationSession::new(DemandSnapshot::new("move a piano"));
    let result = engine
        .start_negotiation(session, agent_vectors, 3, None, None, false)
        .await
        .unwrap();

    let a2 = result.participants.iter().find(|p| p.agent_id == "a2").unwrap();
    assert_eq!(a2.state, negotiant::models::AgentState::Exited);
    assert!(a2.offer.is_none());

    let replied = result
        .participants
        .iter()
        .filter(|p| p.state == negotiant::models::AgentState::Replied)
        .count();
    assert_eq!(replied, 2);
    assert_eq!(result.plan_output.as_deref(), Some("P"));
}

#[tokio::test]
async fn offer_events_are_emitted_in_completion_order_not_participant_order() {
    let pusher = std::sync::Arc::new(RecordingEventPusher::new());
    let llm = std::sync::Arc::new(
        ScriptedLlmClient::new(vec![
            json!({"tool_calls": [{"name": "output_plan", "arguments": {"plan_text": "P"}}]}),
        ])
        .with_slow_agent("a1", Duration::from_millis(100)),
    );

    let agent_vectors = vec![
        ("a1".to_string(), vec![1.0, 0.0, 0.0]),
        ("a2".to_string(), vec![1.0, 0.0, 0.0]),
        ("a3".to_string(), vec![1.0, 0.0, 0.0]),
    ];

    let (engine, _extras) = EngineBuilder::new()
        .with_encoder(std::sync::Arc::new(UnitEncoder))
        .with_adapter(std::sync::Arc::new(StubAdapter))
        .with_llm_client(llm)
        .with_event_pusher(pusher.clone())
        .build()
        .unwrap();

    let session = NegotiationSession::new(DemandSnapshot::new("move a piano"));
    engine
        .start_negotiation(session, agent_vectors, 3, None, None, false)
        .await
        .unwrap();

    // a1 is listed and launched first but resolves last; the observed
    // order should reflect that, not launch order.
    let order = pusher.offer_event_agent_ids();
    assert_eq!(order.len(), 3);
    assert_eq!(order.last(), Some(&"a1".to_string()));
}

#[tokio::test]
async fn restricted_tools_after_max_center_rounds() {
    let llm = std::sync::Arc::new(ScriptedLlmClient::new(vec![
        json!({"tool_calls": [{"name": "ask_agent", "arguments": {"agent_id": "a1", "question": "when?"}}]}),
        json!({"tool_calls": [{"name": "output_plan", "arguments": {"plan_text": "Q"}}]}),
    ]));

    let (engine, _extras) = EngineBuilder::new()
        .with_encoder(std::sync::Arc::new(UnitEncoder))
        .with_adapter(std::sync::Arc::new(StubAdapter))
        .with_llm_client(llm)
        .build()
        .unwrap();

    let mut session = NegotiationSession::new(DemandSnapshot::new("move a piano"));
    session.max_center_rounds = 1;

    let result = engine
        .start_negotiation(session, one_agent_vectors("a1"), 1, None, None, false)
        .await
        .unwrap();

    assert_eq!(result.plan_output.as_deref(), Some("Q"));
    assert_eq!(result.center_rounds, 2);
}

#[tokio::test]
async fn sub_demand_recursion_is_bounded_to_depth_one() {
    let llm = std::sync::Arc::new(ScriptedLlmClient::new(vec![
        json!({"tool_calls": [{"name": "create_sub_demand", "arguments": {"gap_description": "need a crane"}}]}),
        json!({"tool_calls": [{"name": "create_sub_demand", "arguments": {"gap_description": "need a crane again"}}]}),
        json!({"tool_calls": [{"name": "output_plan", "arguments": {"plan_text": "child plan"}}]}),
        json!({"tool_calls": [{"name": "output_plan", "arguments": {"plan_text": "parent plan"}}]}),
    ]));

    let (engine, _extras) = EngineBuilder::new()
        .with_encoder(std::sync::Arc::new(UnitEncoder))
        .with_adapter(std::sync::Arc::new(StubAdapter))
        .with_llm_client(llm)
        .build()
        .unwrap();

    let session = NegotiationSession::new(DemandSnapshot::new("move a piano"));
    let result = engine
        .start_negotiation(session, one_agent_vectors("a1"), 1, None, None, false)
        .await
        .unwrap();

    assert_eq!(result.plan_output.as_deref(), Some("parent plan"));
    assert_eq!(result.sub_session_ids.len(), 1);
    assert_eq!(result.depth, 0);
}

#[tokio::test]
async fn unknown_tool_name_terminates_without_plan_ready() {
    let llm = std::sync::Arc::new(ScriptedLlmClient::new(vec![
        json!({"tool_calls": [{"name": "frobnicate", "arguments": {}}]}),
    ]));

    let pusher = std::sync::Arc::new(RecordingEventPusher::new());
    let (engine, _extras) = EngineBuilder::new()
        .with_encoder(std::sync::Arc::new(UnitEncoder))
        .with_adapter(std::sync::Arc::new(StubAdapter))
        .with_llm_client(llm)
        .with_event_pusher(pusher.clone())
        .build()
        .unwrap();

    let session = NegotiationSession::new(DemandSnapshot::new("move a piano"));
    let result = engine
        .start_negotiation(session, one_agent_vectors("a1"), 1, None, None, false)
        .await;

    assert!(matches!(result, Err(NegotiationError::Skill(_))));
    assert!(!pusher.tags().contains(&EventType::PlanReady));
}

#[tokio::test]
async fn degraded_center_output_synthesizes_output_plan() {
    let llm = std::sync::Arc::new(ScriptedLlmClient::new(vec![json!({"content": "just text"})]));
    let pusher = std::sync::Arc::new(RecordingEventPusher::new());

    let (engine, _extras) = EngineBuilder::new()
        .with_encoder(std::sync::Arc::new(UnitEncoder))
        .with_adapter(std::sync::Arc::new(StubAdapter))
        .with_llm_client(llm)
        .with_event_pusher(pusher.clone())
        .build()
        .unwrap();

    let session = NegotiationSession::new(DemandSnapshot::new("move a piano"));
    let result = engine
        .start_negotiation(session, one_agent_vectors("a1"), 1, None, None, false)
        .await
        .unwrap();

    assert_eq!(result.plan_output.as_deref(), Some("just text"));
    let tags = pusher.tags();
    assert_eq!(tags.last(), Some(&EventType::PlanReady));
    assert!(tags.contains(&EventType::CenterToolCall));
}
