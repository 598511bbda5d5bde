//! Mock LLM 客户端（用于测试与离线运行，无需 API）
//!
//! 总是回复 `complete` 决策，探索会在第一轮自愿结束。

use async_trait::async_trait;

use crate::llm::{LlmClient, Message, Role};

/// Mock 客户端：立即结束探索
#[derive(Debug, Default)]
pub struct MockLlmClient;

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        let has_context = messages.iter().any(|m| m.role == Role::User);
        let reasoning = if has_context {
            "Mock backend: no model configured, ending exploration"
        } else {
            "Mock backend: empty context"
        };
        Ok(serde_json::json!({
            "action": "complete",
            "selector": null,
            "value": null,
            "reasoning": reasoning,
            "confidence": 0.0,
            "observations": "",
        })
        .to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_replies_complete() {
        let reply = MockLlmClient
            .complete(&[Message::system("sys"), Message::user("page")])
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&reply).unwrap();
        assert_eq!(value["action"], "complete");
    }
}
