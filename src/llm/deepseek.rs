//! DeepSeek 客户端（OpenAI 兼容格式）
//!
//! - Base URL: https://api.deepseek.com
//! - 决策场景默认 deepseek-chat；该模型不接收图片，构建时关闭截图输入

use crate::llm::OpenAiClient;

pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";
pub const DEEPSEEK_CHAT: &str = "deepseek-chat";

/// 创建 DeepSeek 客户端
///
/// 模型优先级：参数 > `DEEPSEEK_MODEL` 环境变量 > deepseek-chat。
/// API Key 由调用方传入（通常来自 `DEEPSEEK_API_KEY`）。
pub fn create_deepseek_client(model: Option<&str>, api_key: &str) -> OpenAiClient {
    let model = model
        .map(String::from)
        .or_else(|| std::env::var("DEEPSEEK_MODEL").ok())
        .unwrap_or_else(|| DEEPSEEK_CHAT.to_string());

    tracing::info!(model = %model, "Using DeepSeek decision backend");
    OpenAiClient::new(Some(DEEPSEEK_BASE_URL), &model, Some(api_key))
}
