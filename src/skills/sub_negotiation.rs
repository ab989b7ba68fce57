//! SubNegotiation: a discovery dialogue between two participants, looking
//! for complementarities neither offer surfaced on its own.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::errors::NegotiationError;
use crate::protocols::{LlmMessage, Skill, SkillContext};
use crate::skills::base::strip_code_fence;

const SYSTEM_PROMPT: &str = "Two participants may have hidden complementarities. Produce a JSON \
object: {\"discovery_report\": {\"new_associations\": [...], \"coordination\": \"...\", \
\"additional_contributions\": [...], \"summary\": \"...\"}}.";

/// The default SubNegotiation (discovery dialogue) skill.
pub struct SubNegotiationSkill;

#[async_trait]
impl Skill for SubNegotiationSkill {
    fn name(&self) -> &str {
        "sub_negotiation"
    }

    async fn execute(&self, context: &SkillContext) -> Result<Value, NegotiationError> {
        let agent_a = context
            .agent_a
            .as_ref()
            .ok_or_else(|| NegotiationError::Skill("agent_a is required".into()))?;
        let agent_b = context
            .agent_b
            .as_ref()
            .ok_or_else(|| NegotiationError::Skill("agent_b is required".into()))?;
        let llm_client = context
            .llm_client
            .as_ref()
            .ok_or_else(|| NegotiationError::Skill("llm_client is required".into()))?;
        let reason = context.reason.as_deref().unwrap_or("unspecified");

        let user_content = format!(
            "## Participant A\n{} ({})\nOffer: {}\n\n## Participant B\n{} ({})\nOffer: {}\n\n## Reason\n{}",
            agent_a.display_name,
            agent_a.agent_id,
            agent_a.offer.as_ref().map(|o| o.content.as_str()).unwrap_or(""),
            agent_b.display_name,
            agent_b.agent_id,
            agent_b.offer.as_ref().map(|o| o.content.as_str()).unwrap_or(""),
            reason,
        );

        let messages = vec![LlmMessage {
            role: "user".to_string(),
            content: user_content,
        }];

        let response = llm_client.chat(&messages, Some(SYSTEM_PROMPT), None).await?;
        let raw = response.content.unwrap_or_default();
        self.validate_output(&raw)
    }
}

impl SubNegotiationSkill {
    fn validate_output(&self, raw: &str) -> Result<Value, NegotiationError> {
        let cleaned = strip_code_fence(raw);
        let parsed: Value = serde_json::from_str(&cleaned).unwrap_or(json!({}));
        let report = parsed.get("discovery_report").cloned().unwrap_or(json!({}));

        let summary = report.get("summary").and_then(Value::as_str).unwrap_or("");
        let associations = report
            .get("new_associations")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        if summary.trim().is_empty() && associations.is_empty() {
            return Err(NegotiationError::Skill(
                "sub_negotiation: discovery report has neither summary nor associations".into(),
            ));
        }

        Ok(json!({
            "discovery_report": {
                "new_associations": associations,
                "coordination": report.get("coordination").and_then(Value::as_str).unwrap_or(""),
                "additional_contributions": report.get("additional_contributions").and_then(Value::as_array).cloned().unwrap_or_default(),
                "summary": summary,
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_report_with_summary_only() {
        let skill = SubNegotiationSkill;
        let result = skill
            .validate_output(r#"{"discovery_report": {"summary": "they overlap on logistics"}}"#)
            .unwrap();
        assert_eq!(result["discovery_report"]["summary"], "they overlap on logistics");
    }

    #[test]
    fn rejects_report_with_neither_summary_nor_associations() {
        let skill = SubNegotiationSkill;
        let err = skill.validate_output(r#"{"discovery_report": {}}"#).unwrap_err();
        assert!(matches!(err, NegotiationError::Skill(_)));
    }
}
