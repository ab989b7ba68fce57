//! GapRecursion: turns a gap description into a sub-demand's raw intent
//! text, for the child session `create_sub_demand` spawns.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::errors::NegotiationError;
use crate::protocols::{LlmMessage, Skill, SkillContext};
use crate::skills::base::strip_code_fence;

const SYSTEM_PROMPT: &str = "Turn the described resource gap into a standalone demand statement \
that a fresh negotiation can be run against. Respond with a JSON object: \
{\"sub_demand_text\": \"...\", \"context\": {...}}.";

/// The default GapRecursion skill.
pub struct GapRecursionSkill;

#[async_trait]
impl Skill for GapRecursionSkill {
    fn name(&self) -> &str {
        "gap_recursion"
    }

    async fn execute(&self, context: &SkillContext) -> Result<Value, NegotiationError> {
        let gap_description = context
            .gap_description
            .as_ref()
            .ok_or_else(|| NegotiationError::Skill("gap_description is required".into()))?;
        let llm_client = context
            .llm_client
            .as_ref()
            .ok_or_else(|| NegotiationError::Skill("llm_client is required".into()))?;

        let user_content = format!("## Gap\n{}", gap_description);
        let messages = vec![LlmMessage {
            role: "user".to_string(),
            content: user_content,
        }];

        let response = llm_client.chat(&messages, Some(SYSTEM_PROMPT), None).await?;
        let raw = response.content.unwrap_or_default();
        self.validate_output(&raw, gap_description)
    }
}

impl GapRecursionSkill {
    fn validate_output(&self, raw: &str, gap_description: &str) -> Result<Value, NegotiationError> {
        let cleaned = strip_code_fence(raw);
        let parsed: Value = serde_json::from_str(&cleaned).unwrap_or(json!({}));

        let sub_demand_text = parsed
            .get("sub_demand_text")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string);

        let sub_demand_text = match sub_demand_text {
            Some(text) => text,
            None => {
                if cleaned.trim().is_empty() {
                    return Err(NegotiationError::Skill(
                        "gap_recursion: no sub_demand_text produced".into(),
                    ));
                }
                cleaned.trim().to_string()
            }
        };

        Ok(json!({
            "sub_demand_text": sub_demand_text,
            "context": parsed.get("context").cloned().unwrap_or_else(|| json!({ "gap_description": gap_description })),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_output() {
        let skill = GapRecursionSkill;
        let result = skill
            .validate_output(r#"{"sub_demand_text": "need a crane operator"}"#, "lifting")
            .unwrap();
        assert_eq!(result["sub_demand_text"], "need a crane operator");
    }

    #[test]
    fn degrades_to_raw_text_when_unparseable() {
        let skill = GapRecursionSkill;
        let result = skill.validate_output("we need a crane operator", "lifting").unwrap();
        assert_eq!(result["sub_demand_text"], "we need a crane operator");
    }

    #[test]
    fn empty_output_is_fatal() {
        let skill = GapRecursionSkill;
        assert!(skill.validate_output("", "lifting").is_err());
    }
}
