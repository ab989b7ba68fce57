//! Formulation: enriches a raw user intent into `formulated_text` plus
//! free-form enrichments, using the caller's profile for context.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::errors::NegotiationError;
use crate::protocols::{LlmMessage, Skill, SkillContext};
use crate::skills::base::{detect_cjk, strip_code_fence, strip_think_tags};

const SYSTEM_PROMPT_EN: &str = "You enrich a user's raw request into a clear, complete demand \
statement. Consider the user's profile when present. Respond with a JSON object: \
{\"formulated_text\": \"...\", \"enrichments\": {...}}.";

const SYSTEM_PROMPT_ZH: &str = "你负责把用户的原始请求完善为一条清晰、完整的需求陈述。\
如果提供了用户档案，请结合其内容。请以 JSON 对象回复：\
{\"formulated_text\": \"...\", \"enrichments\": {...}}。";

/// The default Formulation skill.
pub struct FormulationSkill;

#[async_trait]
impl Skill for FormulationSkill {
    fn name(&self) -> &str {
        "formulation"
    }

    async fn execute(&self, context: &SkillContext) -> Result<Value, NegotiationError> {
        let demand = context
            .demand
            .as_ref()
            .ok_or_else(|| NegotiationError::Skill("demand is required".into()))?;
        let llm_client = context
            .llm_client
            .as_ref()
            .ok_or_else(|| NegotiationError::Skill("llm_client is required".into()))?;

        let raw_intent = &demand.raw_intent;
        let system = if detect_cjk(raw_intent) {
            SYSTEM_PROMPT_ZH
        } else {
            SYSTEM_PROMPT_EN
        };

        let mut user_content = format!("## Raw intent\n{}", raw_intent);
        if let Some(profile) = &context.profile {
            user_content.push_str(&format!("\n\n## User profile\n{}", profile));
        }

        let messages = vec![LlmMessage {
            role: "user".to_string(),
            content: user_content,
        }];

        let response = llm_client.chat(&messages, Some(system), None).await?;
        let raw = response.content.unwrap_or_default();
        Ok(self.validate_output(&raw))
    }
}

impl FormulationSkill {
    fn validate_output(&self, raw: &str) -> Value {
        let cleaned = strip_think_tags(&strip_code_fence(raw));
        match serde_json::from_str::<Value>(&cleaned) {
            Ok(parsed) => {
                let formulated_text = parsed
                    .get("formulated_text")
                    .and_then(Value::as_str)
                    .filter(|s| !s.trim().is_empty());
                match formulated_text {
                    Some(text) => json!({
                        "formulated_text": text,
                        "enrichments": parsed.get("enrichments").cloned().unwrap_or_else(|| json!({})),
                    }),
                    None => json!({ "formulated_text": cleaned, "enrichments": {} }),
                }
            }
            Err(_) => json!({ "formulated_text": cleaned, "enrichments": {} }),
        }
    }
}
