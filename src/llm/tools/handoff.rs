//! Coordinator绑定的交接能力：只用于识别意图，不会被实际执行

use rig::completion::ToolDefinition;
use serde::Deserialize;

use crate::types::ToolInvocation;

pub const HANDOFF_TO_PLANNER: &str = "handoff_to_planner";

/// 交接参数
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HandoffArgs {
    #[serde(default)]
    pub research_topic: String,
    #[serde(default)]
    pub locale: String,
}

pub fn handoff_to_planner_definition() -> ToolDefinition {
    ToolDefinition {
        name: HANDOFF_TO_PLANNER.to_string(),
        description: "Handoff to planner agent to do plan.".to_string(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "research_topic": {
                    "type": "string",
                    "description": "The topic of the research task to be handed off."
                },
                "locale": {
                    "type": "string",
                    "description": "The user's detected language locale (e.g., en-US, zh-CN)."
                }
            },
            "required": ["research_topic", "locale"]
        }),
    }
}

/// 解析交接调用；只有主题和语言都给出时才采用
pub fn parse_handoff(invocation: &ToolInvocation) -> Option<HandoffArgs> {
    if invocation.name != HANDOFF_TO_PLANNER {
        return None;
    }
    serde_json::from_value::<HandoffArgs>(invocation.arguments.clone())
        .ok()
        .filter(|args| !args.research_topic.is_empty() && !args.locale.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_handoff_requires_both_fields() {
        let full = ToolInvocation::new(
            "1",
            HANDOFF_TO_PLANNER,
            json!({"research_topic": "rust", "locale": "en-US"}),
        );
        assert_eq!(
            parse_handoff(&full),
            Some(HandoffArgs {
                research_topic: "rust".to_string(),
                locale: "en-US".to_string()
            })
        );

        let partial = ToolInvocation::new("2", HANDOFF_TO_PLANNER, json!({"research_topic": "rust"}));
        assert!(parse_handoff(&partial).is_none());

        let other = ToolInvocation::new("3", "other", json!({"research_topic": "rust", "locale": "en-US"}));
        assert!(parse_handoff(&other).is_none());
    }
}
