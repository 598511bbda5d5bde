//! 决策层：根据当前上下文选出下一步动作
//!
//! 编排器只依赖 DecisionProvider trait；失败以 DecisionError 返回，由编排器替换为兜底的 wait 动作。

pub mod llm;
pub mod prompts;

use async_trait::async_trait;
use serde::Serialize;

use crate::core::{DecisionContext, DecisionError};
use crate::executor::ActionKind;

pub use llm::{parse_decision, LlmDecisionProvider};
pub use prompts::{load_system_prompt, SYSTEM_PROMPT};

/// 决策类型：执行某个动作，或宣布探索结束
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionKind {
    Perform(ActionKind),
    Complete,
}

/// 一次决策
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Decision {
    pub kind: DecisionKind,
    pub selector: Option<String>,
    pub value: Option<String>,
    pub reasoning: String,
    /// 决策方自报的把握（0~1），与会话置信度无关
    pub confidence: f64,
    pub observations: String,
    pub next_targets: Option<Vec<String>>,
}

impl Decision {
    pub fn perform(kind: ActionKind, selector: Option<&str>, reasoning: impl Into<String>) -> Self {
        Self {
            kind: DecisionKind::Perform(kind),
            selector: selector.map(String::from),
            value: None,
            reasoning: reasoning.into(),
            confidence: 0.5,
            observations: String::new(),
            next_targets: None,
        }
    }

    pub fn complete(reasoning: impl Into<String>) -> Self {
        Self {
            kind: DecisionKind::Complete,
            selector: None,
            value: None,
            reasoning: reasoning.into(),
            confidence: 1.0,
            observations: String::new(),
            next_targets: None,
        }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// 决策失败时的安全动作：等待 1 秒，置信度 0，理由记录错误
    pub fn fallback(error: &DecisionError) -> Self {
        Self {
            kind: DecisionKind::Perform(ActionKind::Wait),
            selector: None,
            value: Some("1".to_string()),
            reasoning: format!("Error occurred: {}. Waiting before retry.", error),
            confidence: 0.0,
            observations: String::new(),
            next_targets: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.kind == DecisionKind::Complete
    }
}

/// 决策提供方 trait
#[async_trait]
pub trait DecisionProvider: Send + Sync {
    async fn decide(
        &self,
        system_prompt: &str,
        context: &DecisionContext,
    ) -> Result<Decision, DecisionError>;

    /// 累计 token 使用 (prompt, completion, total)；不走 LLM 的实现返回 None
    fn token_usage(&self) -> Option<(u64, u64, u64)> {
        None
    }
}
