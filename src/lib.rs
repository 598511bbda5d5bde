//! Scout - 置信度驱动的网站探索 Agent
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型、循环阶段、决策上下文、报告与主控循环
//! - **decision**: 决策提供方抽象与基于 LLM 的实现
//! - **executor**: 动作执行器抽象与 Chrome 实现（feature `browser`）
//! - **learning**: 置信度模型与模式记忆
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）
//! - **notify**: 完成 / 错误通知
//! - **session**: 会话记录与 JSON 存储

pub mod config;
pub mod core;
pub mod decision;
pub mod executor;
pub mod learning;
pub mod llm;
pub mod notify;
pub mod observability;
pub mod session;

pub use crate::core::{build_orchestrator, LearningResult, Orchestrator, ScoutError};
pub use config::{load_config, AppConfig};
