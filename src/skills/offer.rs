//! Offer: asks a single agent (through its profile and the Formulation's
//! demand text) to produce a response with declared capabilities and a
//! self-reported confidence.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::errors::NegotiationError;
use crate::protocols::{LlmMessage, Skill, SkillContext};
use crate::skills::base::{strip_code_fence, strip_think_tags};

const SYSTEM_PROMPT: &str = "You are responding to a demand on behalf of an agent with the given \
profile. Respond with a JSON object: {\"content\": \"...\", \"capabilities\": [...], \
\"confidence\": 0.0-1.0}.";

/// The default Offer skill.
pub struct OfferSkill;

#[async_trait]
impl Skill for OfferSkill {
    fn name(&self) -> &str {
        "offer"
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

        let mut user_content = format!("## Demand\n{}", demand.effective_text());
        if let Some(profile) = &context.profile {
            user_content.push_str(&format!("\n\n## Your profile\n{}", profile));
        }

        let messages = vec![LlmMessage {
            role: "user".to_string(),
            content: user_content,
        }];

        let response = llm_client.chat(&messages, Some(SYSTEM_PROMPT), None).await?;
        let raw = response.content.unwrap_or_default();
        Ok(self.validate_output(&raw))
    }
}

impl OfferSkill {
    fn validate_output(&self, raw: &str) -> Value {
        let cleaned = strip_think_tags(&strip_code_fence(raw));
        match serde_json::from_str::<Value>(&cleaned) {
            Ok(parsed) => {
                let content = parsed
                    .get("content")
                    .and_then(Value::as_str)
                    .filter(|s| !s.trim().is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(|| cleaned.clone());
                let capabilities = parsed
                    .get("capabilities")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                let confidence = parsed
                    .get("confidence")
                    .and_then(Value::as_f64)
                    .map(|c| c.clamp(0.0, 1.0))
                    .unwrap_or(0.5);
                json!({ "content": content, "capabilities": capabilities, "confidence": confidence })
            }
            Err(_) => json!({ "content": cleaned, "capabilities": [], "confidence": 0.5 }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_offer() {
        let skill = OfferSkill;
        let result = skill.validate_output(
            r#"{"content": "I can help", "capabilities": ["lifting"], "confidence": 0.9}"#,
        );
        assert_eq!(result["content"], "I can help");
        assert_eq!(result["confidence"], 0.9);
    }

    #[test]
    fn clamps_out_of_range_confidence() {
        let skill = OfferSkill;
        let result = skill.validate_output(r#"{"content": "x", "confidence": 3.5}"#);
        assert_eq!(result["confidence"], 1.0);
    }

    #[test]
    fn degrades_to_default_confidence_when_unparseable() {
        let skill = OfferSkill;
        let result = skill.validate_output("sure, I can help with that");
        assert_eq!(result["content"], "sure, I can help with that");
        assert_eq!(result["confidence"], 0.5);
        assert_eq!(result["capabilities"], json!([]));
    }
}
