//! 组装：按配置选择 LLM 后端、执行器与通知，构建编排器
//!
//! 后端只在这里选择一次，之后都以 trait 对象传递。

use std::sync::Arc;

use crate::config::AppConfig;
use crate::core::{Orchestrator, ScoutError};
use crate::decision::LlmDecisionProvider;
use crate::executor::ActionExecutor;
use crate::llm::{create_deepseek_client, LlmClient, MockLlmClient, OpenAiClient};
use crate::notify::{self, NotificationSink};

/// 按 provider 与可用的 API Key 选择 LLM；没有 Key 时回落到 Mock
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    let deepseek_key = std::env::var("DEEPSEEK_API_KEY").ok();
    let openai_key = std::env::var("OPENAI_API_KEY").ok();

    match (provider.as_str(), deepseek_key, openai_key) {
        ("mock", _, _) => {
            tracing::info!("Using Mock LLM");
            Arc::new(MockLlmClient)
        }
        ("deepseek", Some(key), _) | ("deepseek", None, Some(key)) => {
            let model = cfg.llm.deepseek.model.as_deref();
            Arc::new(create_deepseek_client(model, &key))
        }
        ("openai", _, Some(key)) => {
            let model = cfg
                .llm
                .openai
                .model
                .clone()
                .unwrap_or_else(|| cfg.llm.model.clone());
            tracing::info!(model = %model, "Using OpenAI decision backend");
            Arc::new(OpenAiClient::new(
                cfg.llm.base_url.as_deref(),
                &model,
                Some(key.as_str()),
            ))
        }
        _ => {
            tracing::warn!(provider = %provider, "No API key set or provider unknown, using Mock LLM");
            Arc::new(MockLlmClient)
        }
    }
}

pub fn create_notifier_from_config(cfg: &AppConfig) -> Arc<dyn NotificationSink> {
    let notifier = notify::from_config(&cfg.notify);
    tracing::info!(notifier = notifier.name(), "Notification sink selected");
    notifier
}

#[cfg(feature = "browser")]
pub fn create_executor_from_config(cfg: &AppConfig) -> Result<Arc<dyn ActionExecutor>, ScoutError> {
    let screenshots = if cfg.browser.capture_screenshots {
        let dir = cfg.screenshots_dir();
        std::fs::create_dir_all(&dir)
            .map_err(|e| ScoutError::Config(format!("cannot create {}: {}", dir.display(), e)))?;
        Some(dir)
    } else {
        None
    };
    Ok(Arc::new(crate::executor::ChromeExecutor::new(
        cfg.browser.clone(),
        screenshots,
        cfg.learning.dom_excerpt_chars,
    )))
}

#[cfg(not(feature = "browser"))]
pub fn create_executor_from_config(_cfg: &AppConfig) -> Result<Arc<dyn ActionExecutor>, ScoutError> {
    Err(ScoutError::Config(
        "built without the `browser` feature; no action executor available".to_string(),
    ))
}

/// 截图输入只发给支持图片的后端（deepseek-chat 不支持）
pub fn vision_enabled(cfg: &AppConfig) -> bool {
    cfg.llm.vision && !cfg.llm.provider.eq_ignore_ascii_case("deepseek")
}

/// 按配置构建完整的编排器
pub fn build_orchestrator(cfg: AppConfig) -> Result<Orchestrator, ScoutError> {
    let executor = create_executor_from_config(&cfg)?;
    let decider = Arc::new(
        LlmDecisionProvider::new(create_llm_from_config(&cfg)).with_vision(vision_enabled(&cfg)),
    );
    let notifier = create_notifier_from_config(&cfg);
    Orchestrator::new(cfg, executor, decider, notifier)
}
