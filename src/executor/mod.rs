//! 动作执行器：对页面执行单个交互并回报结果
//!
//! 编排器只依赖 ActionExecutor trait。单个动作失败（找不到元素、超时）以 ActionResult { success: false } 返回；
//! 只有执行器本身不可用时才返回 Err，编排器据此终止本次运行。

#[cfg(feature = "browser")]
pub mod chrome;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::ExecutorError;

#[cfg(feature = "browser")]
pub use chrome::ChromeExecutor;

/// 可执行的交互类型
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Click,
    Type,
    Scroll,
    Hover,
    Wait,
    Navigate,
}

impl ActionKind {
    pub const ALL: [ActionKind; 6] = [
        ActionKind::Click,
        ActionKind::Type,
        ActionKind::Scroll,
        ActionKind::Hover,
        ActionKind::Wait,
        ActionKind::Navigate,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Click => "click",
            ActionKind::Type => "type",
            ActionKind::Scroll => "scroll",
            ActionKind::Hover => "hover",
            ActionKind::Wait => "wait",
            ActionKind::Navigate => "navigate",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        ActionKind::ALL
            .into_iter()
            .find(|k| k.as_str() == lower)
            .ok_or_else(|| format!("unknown action kind: {}", s))
    }
}

/// 一次动作的结果
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ActionResult {
    pub success: bool,
    pub message: String,
    pub new_url: Option<String>,
    pub error: Option<String>,
}

impl ActionResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            success: false,
            message: format!("Action failed: {}", error),
            new_url: None,
            error: Some(error),
        }
    }

    pub fn with_new_url(mut self, url: Option<String>) -> Self {
        self.new_url = url;
        self
    }
}

/// 页面上的可交互元素
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InteractiveElement {
    pub tag: String,
    pub selector: String,
    pub text: String,
    /// button / link / input / slider ...
    pub kind: String,
}

impl fmt::Display for InteractiveElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let preview: String = self.text.chars().take(50).collect();
        let ellipsis = if self.text.chars().count() > 50 { "..." } else { "" };
        write!(
            f,
            "[{}] {} `{}`: {}{}",
            self.kind, self.tag, self.selector, preview, ellipsis
        )
    }
}

/// 页面截图的 PNG 字节；克隆只增加引用计数
#[derive(Clone, PartialEq, Eq)]
pub struct PngSnapshot(Arc<[u8]>);

impl PngSnapshot {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// `data:image/png;base64,...`，可直接作为 image_url 发给模型
    pub fn to_data_url(&self) -> String {
        format!("data:image/png;base64,{}", STANDARD.encode(&self.0))
    }
}

impl fmt::Debug for PngSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PngSnapshot({} bytes)", self.0.len())
    }
}

/// 当前页面的观察快照
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Observation {
    pub url: String,
    pub title: String,
    /// 简化后的 DOM 结构
    pub dom: String,
    pub elements: Vec<InteractiveElement>,
    /// 截图文件路径
    pub screenshot: Option<PathBuf>,
    /// 截图内容，只在内存中传给决策方
    #[serde(skip)]
    pub snapshot: Option<PngSnapshot>,
    pub captured_at: DateTime<Utc>,
}

impl Observation {
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            dom: String::new(),
            elements: Vec::new(),
            screenshot: None,
            snapshot: None,
            captured_at: Utc::now(),
        }
    }

    pub fn with_elements(mut self, elements: Vec<InteractiveElement>) -> Self {
        self.elements = elements;
        self
    }

    pub fn with_dom(mut self, dom: impl Into<String>) -> Self {
        self.dom = dom.into();
        self
    }

    pub fn with_snapshot(mut self, png: Vec<u8>) -> Self {
        self.snapshot = Some(PngSnapshot::new(png));
        self
    }

    /// 按选择器查元素类型（模式记忆用）
    pub fn element_kind(&self, selector: &str) -> Option<&str> {
        self.elements
            .iter()
            .find(|e| e.selector == selector)
            .map(|e| e.kind.as_str())
    }

    pub fn screenshot_ref(&self) -> Option<String> {
        self.screenshot.as_ref().map(|p| p.display().to_string())
    }
}

/// 动作执行器 trait：launch / navigate / observe / execute / close
///
/// 调用方保证 launch 之后无论成功失败都会 close。
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn launch(&self) -> Result<(), ExecutorError>;

    /// 打开 URL 并返回加载后的观察
    async fn navigate(&self, url: &str) -> Result<Observation, ExecutorError>;

    async fn observe(&self) -> Result<Observation, ExecutorError>;

    async fn execute(
        &self,
        kind: ActionKind,
        selector: Option<&str>,
        value: Option<&str>,
    ) -> Result<ActionResult, ExecutorError>;

    async fn close(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_kind_parse() {
        assert_eq!("click".parse::<ActionKind>(), Ok(ActionKind::Click));
        assert_eq!(" Navigate ".parse::<ActionKind>(), Ok(ActionKind::Navigate));
        assert!("complete".parse::<ActionKind>().is_err());
        assert!("drag".parse::<ActionKind>().is_err());
    }

    #[test]
    fn test_action_kind_serde_lowercase() {
        let json = serde_json::to_string(&ActionKind::Hover).unwrap();
        assert_eq!(json, "\"hover\"");
    }

    #[test]
    fn test_element_display_truncates() {
        let el = InteractiveElement {
            tag: "button".into(),
            selector: "#go".into(),
            text: "x".repeat(80),
            kind: "button".into(),
        };
        let shown = el.to_string();
        assert!(shown.starts_with("[button] button `#go`: "));
        assert!(shown.ends_with("..."));
    }

    #[test]
    fn test_snapshot_data_url_and_debug() {
        let obs = Observation::new("https://example.com", "Example").with_snapshot(b"\x89PNG".to_vec());
        let shot = obs.snapshot.as_ref().unwrap();
        assert_eq!(shot.to_data_url(), "data:image/png;base64,iVBORw==");
        assert_eq!(format!("{:?}", shot), "PngSnapshot(4 bytes)");

        // 截图字节不写入持久化的 JSON
        let value = serde_json::to_value(&obs).unwrap();
        assert!(value.get("snapshot").is_none());
    }

    #[test]
    fn test_failed_result() {
        let r = ActionResult::failed("no such element");
        assert!(!r.success);
        assert_eq!(r.error.as_deref(), Some("no such element"));
    }
}
