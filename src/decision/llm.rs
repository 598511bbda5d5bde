//! 基于 LLM 的决策提供方
//!
//! 把 DecisionContext 渲染为 user 消息（开启 vision 时附带页面截图），与 system prompt 一起发给 LlmClient，
//! 再从回复中提取 JSON（```json 代码块、纯 JSON 或夹在文字中的 {...}）解析为 Decision。

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;

use crate::core::{DecisionContext, DecisionError};
use crate::decision::{Decision, DecisionKind, DecisionProvider};
use crate::executor::ActionKind;
use crate::llm::{LlmClient, Message};

static CODE_BLOCK_RE: OnceLock<Option<Regex>> = OnceLock::new();
static JSON_OBJECT_RE: OnceLock<Option<Regex>> = OnceLock::new();

/// LLM 回复的原始 JSON 结构
#[derive(Debug, Deserialize)]
struct RawDecision {
    #[serde(default = "default_action")]
    action: String,
    #[serde(default)]
    selector: Option<String>,
    /// 滑块等场景下模型常给数字
    #[serde(default)]
    value: Option<serde_json::Value>,
    #[serde(default)]
    reasoning: String,
    #[serde(default = "default_confidence")]
    confidence: f64,
    #[serde(default)]
    observations: String,
    #[serde(default, alias = "next_targets")]
    next_exploration_targets: Option<Vec<String>>,
}

fn default_action() -> String {
    "wait".to_string()
}

fn default_confidence() -> f64 {
    0.5
}

fn extract_json(reply: &str) -> Option<serde_json::Value> {
    let code_block = CODE_BLOCK_RE
        .get_or_init(|| Regex::new(r"```(?:json)?\s*([\s\S]*?)```").ok())
        .as_ref()
        .and_then(|re| re.captures(reply))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim());

    let candidate = code_block.unwrap_or_else(|| reply.trim());
    if let Ok(v) = serde_json::from_str::<serde_json::Value>(candidate) {
        return Some(v);
    }

    JSON_OBJECT_RE
        .get_or_init(|| Regex::new(r"\{[\s\S]*\}").ok())
        .as_ref()
        .and_then(|re| re.find(reply))
        .and_then(|m| serde_json::from_str(m.as_str()).ok())
}

/// 解析 LLM 回复为 Decision
pub fn parse_decision(reply: &str) -> Result<Decision, DecisionError> {
    let value = extract_json(reply).ok_or_else(|| {
        let preview: String = reply.chars().take(200).collect();
        DecisionError::Malformed(format!("no JSON object in reply: {}", preview))
    })?;
    let raw: RawDecision =
        serde_json::from_value(value).map_err(|e| DecisionError::Malformed(e.to_string()))?;

    let kind = match raw.action.trim().to_lowercase().as_str() {
        "complete" => DecisionKind::Complete,
        other => DecisionKind::Perform(
            other
                .parse::<ActionKind>()
                .map_err(|_| DecisionError::UnknownAction(raw.action.clone()))?,
        ),
    };

    let value = raw.value.and_then(|v| match v {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s),
        other => Some(other.to_string()),
    });

    Ok(Decision {
        kind,
        selector: raw.selector.filter(|s| !s.trim().is_empty()),
        value,
        reasoning: raw.reasoning,
        confidence: raw.confidence.clamp(0.0, 1.0),
        observations: raw.observations,
        next_targets: raw.next_exploration_targets,
    })
}

/// LLM 决策提供方
pub struct LlmDecisionProvider {
    llm: Arc<dyn LlmClient>,
    vision: bool,
}

impl LlmDecisionProvider {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm, vision: true }
    }

    /// 是否把页面截图作为图片发给模型
    pub fn with_vision(mut self, vision: bool) -> Self {
        self.vision = vision;
        self
    }

    fn messages(&self, system_prompt: &str, context: &DecisionContext) -> [Message; 2] {
        let mut user = Message::user(context.render());
        if self.vision {
            if let Some(shot) = &context.snapshot {
                user = user.with_image(shot.to_data_url());
            }
        }
        [Message::system(system_prompt), user]
    }
}

#[async_trait]
impl DecisionProvider for LlmDecisionProvider {
    fn token_usage(&self) -> Option<(u64, u64, u64)> {
        Some(self.llm.token_usage())
    }

    async fn decide(
        &self,
        system_prompt: &str,
        context: &DecisionContext,
    ) -> Result<Decision, DecisionError> {
        let messages = self.messages(system_prompt, context);
        let reply = self
            .llm
            .complete(&messages)
            .await
            .map_err(DecisionError::Transport)?;

        let decision = parse_decision(&reply)?;
        let reasoning_preview: String = decision.reasoning.chars().take(100).collect();
        tracing::info!(
            action = ?decision.kind,
            selector = ?decision.selector,
            confidence = decision.confidence,
            reasoning = %reasoning_preview,
            "LLM decided action"
        );
        Ok(decision)
    }
}
