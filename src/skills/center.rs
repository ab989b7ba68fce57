//! Center: the synthesis skill. Reasons over collected offers and emits
//! tool calls (§4.5's dispatch table). The only skill whose output can
//! raise a fatal [`NegotiationError::Skill`] purely from malformed tool
//! names, since it is the one skill the engine cannot meaningfully degrade
//! around.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::errors::NegotiationError;
use crate::protocols::{LlmMessage, Skill, SkillContext};
use crate::skills::base::{detect_cjk, strip_think_tags};

/// Tool name constant: terminates the negotiation with a plan.
pub const TOOL_OUTPUT_PLAN: &str = "output_plan";
/// Tool name constant: follow-up question to one participant.
pub const TOOL_ASK_AGENT: &str = "ask_agent";
/// Tool name constant: discovery dialogue between two participants.
pub const TOOL_START_DISCOVERY: &str = "start_discovery";
/// Tool name constant: spawn a bounded sub-negotiation for an unmet gap.
pub const TOOL_CREATE_SUB_DEMAND: &str = "create_sub_demand";
/// Tool name constant: reserved, currently a no-op placeholder.
pub const TOOL_CREATE_MACHINE: &str = "create_machine";

fn tool_schema(name: &str, description: &str, properties: Value, required: Value) -> Value {
    json!({
        "name": name,
        "description": description,
        "input_schema": {
            "type": "object",
            "properties": properties,
            "required": required,
        },
    })
}

/// The five built-in tool schemas, in dispatch-table order.
pub fn all_tool_schemas() -> Vec<Value> {
    vec![
        tool_schema(
            TOOL_OUTPUT_PLAN,
            "Output a text plan. This terminates the negotiation.",
            json!({"plan_text": {"type": "string", "description": "The complete plan text."}}),
            json!(["plan_text"]),
        ),
        tool_schema(
            TOOL_ASK_AGENT,
            "Ask a specific agent a follow-up question.",
            json!({
                "agent_id": {"type": "string"},
                "question": {"type": "string"},
            }),
            json!(["agent_id", "question"]),
        ),
        tool_schema(
            TOOL_START_DISCOVERY,
            "Trigger a discovery dialogue between two agents.",
            json!({
                "agent_a": {"type": "string"},
                "agent_b": {"type": "string"},
                "reason": {"type": "string"},
            }),
            json!(["agent_a", "agent_b", "reason"]),
        ),
        tool_schema(
            TOOL_CREATE_SUB_DEMAND,
            "Create a sub-demand for a gap the current participants cannot fill.",
            json!({"gap_description": {"type": "string"}}),
            json!(["gap_description"]),
        ),
        tool_schema(
            TOOL_CREATE_MACHINE,
            "Reserved. Not implemented.",
            json!({"machine_json": {"type": "string"}}),
            json!(["machine_json"]),
        ),
    ]
}

/// Tool names available when `tools_restricted` is true (degraded mode
/// after `max_center_rounds`).
pub fn restricted_tool_names() -> Vec<&'static str> {
    vec![TOOL_OUTPUT_PLAN, TOOL_CREATE_MACHINE]
}

/// All built-in tool names.
pub fn all_tool_names() -> Vec<&'static str> {
    vec![
        TOOL_OUTPUT_PLAN,
        TOOL_ASK_AGENT,
        TOOL_START_DISCOVERY,
        TOOL_CREATE_SUB_DEMAND,
        TOOL_CREATE_MACHINE,
    ]
}

const SYSTEM_PROMPT_EN: &str = "\
You are a multi-party resource coordination planner.

## Role
You receive a demand and responses (offers) from multiple participants. Your task is to find \
the optimal resource combination plan.

## Actions
Use the provided tools to take action.
- Use output_plan when you have enough information to propose a plan.
- Use ask_agent when you need more information from a specific participant.
- Use start_discovery when two participants might have hidden complementarities.
- Use create_sub_demand when there's a gap that current participants cannot fill.
";

const SYSTEM_PROMPT_ZH: &str = "\
你是一个多方资源协调规划者。

## 角色
你收到一个需求和多个参与者的响应（offer）。你的任务是找到最优的资源组合方案。

## 行动
使用提供的工具采取行动。
- 当你有足够信息提出方案时，使用 output_plan。
- 当你需要向某个参与者追问时，使用 ask_agent。
- 当两个参与者可能有隐藏的互补性时，使用 start_discovery。
- 当当前参与者无法填补某个缺口时，使用 create_sub_demand。
";

/// The default Center coordination skill.
pub struct CenterCoordinatorSkill;

#[async_trait]
impl Skill for CenterCoordinatorSkill {
    fn name(&self) -> &str {
        "center_coordinator"
    }

    async fn execute(&self, context: &SkillContext) -> Result<Value, NegotiationError> {
        let demand = context
            .demand
            .as_ref()
            .ok_or_else(|| NegotiationError::Skill("demand is required".into()))?;
        let offers = context
            .offers
            .as_ref()
            .ok_or_else(|| NegotiationError::Skill("offers is required".into()))?;
        let llm_client = context
            .llm_client
            .as_ref()
            .ok_or_else(|| NegotiationError::Skill("llm_client is required".into()))?;
        let tools_restricted = context.tools_restricted.unwrap_or(false);
        let round_number = context.round_number.unwrap_or(1);

        let demand_text = demand.effective_text();
        let system = if detect_cjk(demand_text) {
            SYSTEM_PROMPT_ZH
        } else {
            SYSTEM_PROMPT_EN
        };

        let mut user_content = format!("## Demand\n{}\n\n## Offers (round {})\n", demand_text, round_number);
        for offer in offers {
            user_content.push_str(&format!(
                "\n- {} (confidence {:.2}): {}",
                offer.agent_id, offer.confidence, offer.content
            ));
        }
        if let Some(history) = &context.history {
            if !history.is_empty() {
                user_content.push_str("\n\n## History\n");
                for entry in history {
                    user_content.push_str(&format!("\n- {}", entry));
                }
            }
        }

        let custom_names: Vec<String> = context.custom_tool_names.clone().unwrap_or_default();

        let mut tools: Vec<Value> = if tools_restricted {
            all_tool_schemas()
                .into_iter()
                .filter(|t| {
                    restricted_tool_names().contains(&t["name"].as_str().unwrap_or_default())
                })
                .collect()
        } else {
            all_tool_schemas()
        };
        if !tools_restricted {
            for name in &custom_names {
                tools.push(tool_schema(
                    name,
                    "Registered custom tool.",
                    json!({}),
                    json!([]),
                ));
            }
        }

        let messages = vec![LlmMessage {
            role: "user".to_string(),
            content: user_content,
        }];

        let response = llm_client.chat(&messages, Some(system), Some(&tools)).await?;
        let mut valid_names: Vec<&str> = if tools_restricted {
            restricted_tool_names()
        } else {
            all_tool_names()
        };
        if !tools_restricted {
            valid_names.extend(custom_names.iter().map(String::as_str));
        }
        self.validate_output(response, &valid_names)
    }
}

impl CenterCoordinatorSkill {
    fn validate_output(
        &self,
        response: crate::protocols::LlmResponse,
        valid_names: &[&str],
    ) -> Result<Value, NegotiationError> {
        match response.tool_calls {
            None => {
                let content = response
                    .content
                    .map(|c| strip_think_tags(&c).trim().to_string())
                    .filter(|c| !c.is_empty());
                match content {
                    Some(text) => Ok(json!({
                        "tool_calls": [{"name": TOOL_OUTPUT_PLAN, "arguments": {"plan_text": text}}],
                    })),
                    None => Err(NegotiationError::Skill(
                        "center_coordinator: no tool calls and no content in response".into(),
                    )),
                }
            }
            Some(tool_calls) if tool_calls.is_empty() => {
                let content = response
                    .content
                    .map(|c| strip_think_tags(&c).trim().to_string())
                    .filter(|c| !c.is_empty());
                match content {
                    Some(text) => Ok(json!({
                        "tool_calls": [{"name": TOOL_OUTPUT_PLAN, "arguments": {"plan_text": text}}],
                    })),
                    None => Err(NegotiationError::Skill(
                        "center_coordinator: no tool calls and no content in response".into(),
                    )),
                }
            }
            Some(tool_calls) => {
                let mut validated = Vec::with_capacity(tool_calls.len());
                for tc in tool_calls {
                    if !valid_names.contains(&tc.name.as_str()) {
                        return Err(NegotiationError::Skill(format!(
                            "center_coordinator: invalid tool name '{}'",
                            tc.name
                        )));
                    }
                    validated.push(json!({ "name": tc.name, "arguments": tc.arguments }));
                }
                let mut result = json!({ "tool_calls": validated });
                if let Some(content) = response.content {
                    let stripped = strip_think_tags(&content).trim().to_string();
                    if !stripped.is_empty() {
                        result["content"] = json!(stripped);
                    }
                }
                Ok(result)
            }
        }
    }
}
