//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `SCOUT__*` 覆盖（双下划线表示嵌套，如 `SCOUT__LEARNING__MAX_ITERATIONS=50`）。
//! 配置在进程启动时构建一次，CLI 参数覆盖后只读地传入编排器。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub browser: BrowserSection,
    pub learning: LearningSection,
    pub notify: NotifySection,
}

impl AppConfig {
    pub fn sessions_dir(&self) -> PathBuf {
        self.app.data_dir.join("sessions")
    }

    pub fn patterns_dir(&self) -> PathBuf {
        self.app.data_dir.join("learned_patterns")
    }

    pub fn screenshots_dir(&self) -> PathBuf {
        self.app.data_dir.join("screenshots")
    }
}

/// [app] 段：数据目录（sessions / learned_patterns / screenshots 均在其下）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub data_dir: PathBuf,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
        }
    }
}

/// [llm] 段：决策后端选择
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// openai / deepseek / mock；无 API Key 时回落到 mock
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    /// 每轮决策附带页面截图（需要支持图片输入的模型）
    #[serde(default = "default_vision")]
    pub vision: bool,
    #[serde(default)]
    pub deepseek: LlmDeepSeekSection,
    #[serde(default)]
    pub openai: LlmOpenAiSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            vision: default_vision(),
            deepseek: LlmDeepSeekSection::default(),
            openai: LlmOpenAiSection::default(),
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_vision() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LlmDeepSeekSection {
    pub model: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LlmOpenAiSection {
    pub model: Option<String>,
}

/// [browser] 段：无头模式、视口、单动作超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserSection {
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub timeout_ms: u64,
    pub capture_screenshots: bool,
}

impl Default for BrowserSection {
    fn default() -> Self {
        Self {
            headless: false,
            viewport_width: 1280,
            viewport_height: 720,
            timeout_ms: 30_000,
            capture_screenshots: true,
        }
    }
}

/// [learning] 段：迭代预算、置信度阈值、节流与上下文规模
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LearningSection {
    pub max_iterations: usize,
    pub confidence_threshold: f64,
    /// 每轮结束后的礼貌等待
    pub action_delay_ms: u64,
    /// 决策上下文中最多列出的元素数
    pub max_context_elements: usize,
    /// 决策上下文中最多列出的已学模式数
    pub max_context_patterns: usize,
    pub dom_excerpt_chars: usize,
}

impl Default for LearningSection {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            confidence_threshold: 0.85,
            action_delay_ms: 500,
            max_context_elements: 30,
            max_context_patterns: 10,
            dom_excerpt_chars: 8000,
        }
    }
}

impl LearningSection {
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(format!(
                "confidence_threshold must be within [0, 1], got {}",
                self.confidence_threshold
            ));
        }
        Ok(())
    }
}

/// [notify] 段：通知后端（log / webhook / resend / none）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotifySection {
    pub provider: String,
    /// 收件人（resend）或透传给 webhook 的目标标识
    pub recipient: Option<String>,
    pub webhook_url: Option<String>,
    pub api_key: Option<String>,
    pub from: String,
    pub timeout_secs: u64,
}

impl Default for NotifySection {
    fn default() -> Self {
        Self {
            provider: "log".to_string(),
            recipient: None,
            webhook_url: None,
            api_key: None,
            from: "Scout <noreply@scout.local>".to_string(),
            timeout_secs: 15,
        }
    }
}

/// 从 config 目录加载配置，环境变量 SCOUT__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 SCOUT__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("SCOUT")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
