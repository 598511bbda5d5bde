//! Headless Chrome 执行器
//!
//! 需启用 feature "browser" 且系统已安装 Chrome/Chromium。
//! headless_chrome 是同步 API，所有 CDP 调用都放在 spawn_blocking 中执行；
//! 浏览器与当前 Tab 存放在 Arc<Mutex<Option<..>>> 中，launch 时创建、close 时释放。
//!
//! 选择器支持三种写法：CSS（默认）、XPath（以 `//` 或 `(//` 开头）、`text="..."`（按可见文本匹配）。

use std::borrow::Cow;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use headless_chrome::{Browser, Element, LaunchOptions, Tab};
use regex::Regex;
use serde_json::Value;

use crate::config::BrowserSection;
use crate::core::ExecutorError;
use crate::executor::{
    ActionExecutor, ActionKind, ActionResult, InteractiveElement, Observation, PngSnapshot,
};

/// 滚动步长（像素）
const SCROLL_STEP_PX: i64 = 500;
/// wait 动作的最长等待（秒）
const MAX_WAIT_SECS: f64 = 10.0;
/// 键盘拖动滑块的最多按键次数
const MAX_SLIDER_STEPS: usize = 300;

static CONTAINS_RE: OnceLock<Option<Regex>> = OnceLock::new();

/// 收集可见的可交互元素，并为每个元素生成尽量稳定的 CSS 选择器
const EXTRACT_ELEMENTS_JS: &str = r##"
(() => {
    const nodes = document.querySelectorAll(
        'a[href], button, input, select, textarea, [role="button"], [role="link"], ' +
        '[role="slider"], [role="checkbox"], [role="radio"], [role="tab"], [onclick]'
    );
    const cssPath = (el) => {
        if (el.id) return '#' + CSS.escape(el.id);
        const name = el.getAttribute('name');
        if (name) return el.tagName.toLowerCase() + '[name="' + name + '"]';
        const parts = [];
        let node = el;
        while (node && node.nodeType === 1 && node !== document.body) {
            if (node.id) { parts.unshift('#' + CSS.escape(node.id)); break; }
            let part = node.tagName.toLowerCase();
            const parent = node.parentElement;
            if (parent) {
                const same = Array.from(parent.children).filter(c => c.tagName === node.tagName);
                if (same.length > 1) part += ':nth-of-type(' + (same.indexOf(node) + 1) + ')';
            }
            parts.unshift(part);
            node = parent;
        }
        return (parts.length && parts[0].startsWith('#') ? '' : 'body > ') + parts.join(' > ');
    };
    const seen = new Set();
    const out = [];
    for (const el of nodes) {
        const rect = el.getBoundingClientRect();
        if (rect.width === 0 && rect.height === 0) continue;
        const selector = cssPath(el);
        if (seen.has(selector)) continue;
        seen.add(selector);
        const tag = el.tagName.toLowerCase();
        const kind = el.getAttribute('role')
            || (tag === 'input' ? (el.type || 'text') : (tag === 'a' ? 'link' : tag));
        const text = (el.innerText || el.value || el.getAttribute('aria-label')
            || el.getAttribute('placeholder') || '').trim();
        out.push({ tag, selector, text: text.slice(0, 120), kind });
    }
    return JSON.stringify(out);
})()
"##;

/// 去掉脚本/样式后的 body 结构
const SIMPLIFIED_DOM_JS: &str = r##"
(() => {
    if (!document.body) return '';
    const clone = document.body.cloneNode(true);
    clone.querySelectorAll('script, style, noscript, svg, iframe, link, meta').forEach(n => n.remove());
    return clone.outerHTML.replace(/\s+/g, ' ');
})()
"##;

/// 通过原生 setter 写入 value 并派发 input/change，兼容受控组件与 range 滑块
const SET_VALUE_JS: &str = r##"
function(v) {
    this.scrollIntoView({ block: 'center' });
    this.focus();
    const proto = this.tagName === 'TEXTAREA' ? HTMLTextAreaElement.prototype
        : (this.tagName === 'INPUT' ? HTMLInputElement.prototype
        : (this.tagName === 'SELECT' ? HTMLSelectElement.prototype : null));
    const desc = proto ? Object.getOwnPropertyDescriptor(proto, 'value') : null;
    if (desc && desc.set) {
        desc.set.call(this, v);
    } else if (this.isContentEditable) {
        this.textContent = v;
    } else {
        return false;
    }
    this.dispatchEvent(new Event('input', { bubbles: true }));
    this.dispatchEvent(new Event('change', { bubbles: true }));
    return true;
}
"##;

/// 非原生 input 的 [role=slider]（Radix 等），只能用方向键驱动
const IS_ARIA_SLIDER_JS: &str = r##"
function() {
    return this.getAttribute('role') === 'slider' && this.tagName !== 'INPUT';
}
"##;

const ARIA_VALUE_JS: &str = r##"
function() {
    return this.getAttribute('aria-valuenow');
}
"##;

/// 运行中的浏览器与当前 Tab
struct ChromeSession {
    // Browser 被 drop 时结束 Chrome 进程
    _browser: Browser,
    tab: Arc<Tab>,
}

/// Headless Chrome 实现的 ActionExecutor
pub struct ChromeExecutor {
    options: BrowserSection,
    screenshots_dir: Option<PathBuf>,
    dom_chars: usize,
    session: Arc<Mutex<Option<ChromeSession>>>,
}

impl ChromeExecutor {
    pub fn new(options: BrowserSection, screenshots_dir: Option<PathBuf>, dom_chars: usize) -> Self {
        Self {
            options,
            screenshots_dir,
            dom_chars,
            session: Arc::new(Mutex::new(None)),
        }
    }

    /// 在阻塞线程池中对当前 Tab 执行 f
    async fn with_tab<T, F>(&self, f: F) -> Result<T, ExecutorError>
    where
        T: Send + 'static,
        F: FnOnce(&Arc<Tab>) -> Result<T, ExecutorError> + Send + 'static,
    {
        let session = Arc::clone(&self.session);
        tokio::task::spawn_blocking(move || {
            let guard = session
                .lock()
                .map_err(|e| ExecutorError::Unavailable(e.to_string()))?;
            let active = guard.as_ref().ok_or(ExecutorError::NotLaunched)?;
            f(&active.tab)
        })
        .await
        .map_err(|e| ExecutorError::Unavailable(format!("Task join: {}", e)))?
    }

    fn capture_fn(
        &self,
    ) -> impl FnOnce(&Arc<Tab>) -> Result<Observation, ExecutorError> + Send + 'static {
        let screenshots_dir = if self.options.capture_screenshots {
            self.screenshots_dir.clone()
        } else {
            None
        };
        let dom_chars = self.dom_chars;
        move |tab| capture(tab, screenshots_dir, dom_chars)
    }
}

/// 读取 URL、标题、元素清单、简化 DOM，并按需截图
fn capture(
    tab: &Arc<Tab>,
    screenshots_dir: Option<PathBuf>,
    dom_chars: usize,
) -> Result<Observation, ExecutorError> {
    let url = tab.get_url();
    let title = tab
        .get_title()
        .map_err(|e| ExecutorError::Observation(format!("Get title failed: {}", e)))?;

    let elements = match evaluate_string(tab, EXTRACT_ELEMENTS_JS)? {
        Some(raw) => serde_json::from_str::<Vec<InteractiveElement>>(&raw)
            .map_err(|e| ExecutorError::Observation(format!("Element inventory: {}", e)))?,
        None => Vec::new(),
    };

    let dom: String = evaluate_string(tab, SIMPLIFIED_DOM_JS)?
        .unwrap_or_default()
        .chars()
        .take(dom_chars)
        .collect();

    let (screenshot, snapshot) = match screenshots_dir {
        Some(dir) => match take_screenshot(tab) {
            Ok(png) => {
                let path = save_screenshot(&png, dir)
                    .map_err(|e| tracing::warn!(error = %e, "Screenshot save failed"))
                    .ok();
                (path, Some(PngSnapshot::new(png)))
            }
            Err(e) => {
                tracing::warn!(error = %e, "Screenshot capture failed");
                (None, None)
            }
        },
        None => (None, None),
    };

    Ok(Observation {
        url,
        title,
        dom,
        elements,
        screenshot,
        snapshot,
        captured_at: Utc::now(),
    })
}

fn evaluate_string(tab: &Arc<Tab>, js: &str) -> Result<Option<String>, ExecutorError> {
    let result = tab
        .evaluate(js, false)
        .map_err(|e| ExecutorError::Observation(format!("Evaluate failed: {}", e)))?;
    Ok(match result.value {
        Some(Value::String(s)) => Some(s),
        _ => None,
    })
}

fn take_screenshot(tab: &Arc<Tab>) -> Result<Vec<u8>, String> {
    tab.capture_screenshot(CaptureScreenshotFormatOption::Png, None, None, true)
        .map_err(|e| e.to_string())
}

fn save_screenshot(png: &[u8], dir: PathBuf) -> Result<PathBuf, String> {
    std::fs::create_dir_all(&dir).map_err(|e| e.to_string())?;
    let path = dir.join(format!("screenshot_{}.png", Utc::now().format("%Y%m%d_%H%M%S_%3f")));
    std::fs::write(&path, png).map_err(|e| e.to_string())?;
    Ok(path)
}

/// wait 的秒数：非数字、NaN、无穷都按 1 秒，上限 MAX_WAIT_SECS
fn wait_duration(value: Option<&str>) -> Duration {
    let secs = value
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|s| s.is_finite())
        .unwrap_or(1.0)
        .clamp(0.0, MAX_WAIT_SECS);
    Duration::from_secs_f64(secs)
}

/// 把 `tag:contains("Text")` 改写为等价 XPath；其他选择器原样返回
fn normalize_selector(selector: &str) -> Cow<'_, str> {
    if !selector.contains(":contains(") {
        return Cow::Borrowed(selector);
    }
    let rewritten = CONTAINS_RE
        .get_or_init(|| {
            Regex::new(r#"^\s*([A-Za-z][A-Za-z0-9-]*)?\s*:contains\(\s*["']?(.*?)["']?\s*\)\s*$"#).ok()
        })
        .as_ref()
        .and_then(|re| re.captures(selector))
        .map(|c| {
            let tag = c.get(1).map_or("*", |m| m.as_str());
            let text = c.get(2).map_or("", |m| m.as_str()).replace('"', "");
            format!("//{}[contains(normalize-space(.), \"{}\")]", tag, text)
        });
    match rewritten {
        Some(xpath) => {
            tracing::debug!(selector, xpath = %xpath, "Rewrote :contains selector");
            Cow::Owned(xpath)
        }
        None => Cow::Borrowed(selector),
    }
}

/// 第一次按键之后还需按几次：按实测步长计算，步长为 0 时按 1，封顶 MAX_SLIDER_STEPS
fn remaining_slider_steps(before: f64, after_one: f64, target: f64) -> usize {
    let step = (after_one - before).abs();
    let step = if step > 0.0 && step.is_finite() { step } else { 1.0 };
    let remaining = ((target - after_one).abs() / step).floor();
    if !remaining.is_finite() {
        return 0;
    }
    (remaining as usize).min(MAX_SLIDER_STEPS)
}

fn aria_value(element: &Element<'_>) -> Option<f64> {
    match element.call_js_fn(ARIA_VALUE_JS, vec![], false).ok()?.value? {
        Value::String(s) => s.trim().parse().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

/// 聚焦滑块，按一次方向键测出步长，再按剩余次数逼近目标，返回最终值
fn step_slider(tab: &Arc<Tab>, element: &Element<'_>, target: f64) -> Result<f64, String> {
    element
        .focus()
        .map_err(|e| format!("Slider focus failed: {}", e))?;
    let current = aria_value(element).unwrap_or(0.0);
    if current == target {
        return Ok(current);
    }

    let key = if target > current { "ArrowRight" } else { "ArrowLeft" };
    tab.press_key(key)
        .map_err(|e| format!("Slider key press failed: {}", e))?;
    std::thread::sleep(Duration::from_millis(50));
    let after_one = aria_value(element).unwrap_or(current);

    let steps = remaining_slider_steps(current, after_one, target);
    tracing::debug!(current, after_one, target, steps, key, "Stepping slider");
    for _ in 0..steps {
        tab.press_key(key)
            .map_err(|e| format!("Slider key press failed: {}", e))?;
        std::thread::sleep(Duration::from_millis(15));
    }
    Ok(aria_value(element).unwrap_or(after_one))
}

/// 按选择器定位元素：text="..." / XPath / CSS
fn locate<'a>(tab: &'a Arc<Tab>, selector: &str) -> Result<Element<'a>, String> {
    let selector = normalize_selector(selector);
    let selector = selector.as_ref();
    let found = if let Some(text) = selector.strip_prefix("text=") {
        let text = text.trim().trim_matches('"').trim_matches('\'');
        tab.wait_for_xpath(&format!("//*[normalize-space(text())=\"{}\"]", text))
    } else if selector.starts_with("//") || selector.starts_with("(//") {
        tab.wait_for_xpath(selector)
    } else {
        tab.wait_for_element(selector)
    };
    found.map_err(|e| format!("Element not found ({}): {}", selector, e))
}

/// 执行单个动作；动作层面的错误以 Err(String) 返回，由调用方转为失败结果
fn perform(
    tab: &Arc<Tab>,
    kind: ActionKind,
    selector: Option<&str>,
    value: Option<&str>,
) -> Result<String, String> {
    match kind {
        ActionKind::Click => {
            let selector = selector.ok_or("click requires a selector")?;
            locate(tab, selector)?
                .click()
                .map_err(|e| format!("Click failed: {}", e))?;
            Ok(format!("Clicked {}", selector))
        }
        ActionKind::Type => {
            let selector = selector.ok_or("type requires a selector")?;
            let text = value.unwrap_or("");
            let element = locate(tab, selector)?;

            let is_aria_slider = element
                .call_js_fn(IS_ARIA_SLIDER_JS, vec![], false)
                .map(|r| r.value == Some(Value::Bool(true)))
                .unwrap_or(false);
            if is_aria_slider {
                let target = text
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .filter(|t| t.is_finite())
                    .ok_or_else(|| format!("Slider {} needs a numeric value, got \"{}\"", selector, text))?;
                let reached = step_slider(tab, &element, target)?;
                return Ok(format!("Set slider {} to {} (target: {})", selector, reached, target));
            }

            let accepted = element
                .call_js_fn(SET_VALUE_JS, vec![Value::String(text.to_string())], false)
                .map_err(|e| format!("Type failed: {}", e))?
                .value;
            if accepted == Some(Value::Bool(false)) {
                return Err(format!("Element {} does not accept text", selector));
            }
            Ok(format!("Typed \"{}\" into {}", text, selector))
        }
        ActionKind::Scroll => {
            let delta = match value.map(str::trim) {
                Some("up") => -SCROLL_STEP_PX,
                Some(v) => v.parse::<i64>().unwrap_or(SCROLL_STEP_PX),
                None => SCROLL_STEP_PX,
            };
            if let Some(selector) = selector {
                locate(tab, selector)?
                    .scroll_into_view()
                    .map_err(|e| format!("Scroll failed: {}", e))?;
                return Ok(format!("Scrolled {} into view", selector));
            }
            tab.evaluate(&format!("window.scrollBy(0, {})", delta), false)
                .map_err(|e| format!("Scroll failed: {}", e))?;
            Ok(format!("Scrolled by {}px", delta))
        }
        ActionKind::Hover => {
            let selector = selector.ok_or("hover requires a selector")?;
            locate(tab, selector)?
                .move_mouse_over()
                .map_err(|e| format!("Hover failed: {}", e))?;
            Ok(format!("Hovered {}", selector))
        }
        ActionKind::Wait => {
            let duration = wait_duration(value);
            std::thread::sleep(duration);
            Ok(format!("Waited {:.1}s", duration.as_secs_f64()))
        }
        ActionKind::Navigate => {
            let url = value
                .or(selector)
                .ok_or("navigate requires a url value")?;
            tab.navigate_to(url)
                .and_then(|t| t.wait_until_navigated())
                .map_err(|e| format!("Navigate failed: {}", e))?;
            Ok(format!("Navigated to {}", url))
        }
    }
}

#[async_trait]
impl ActionExecutor for ChromeExecutor {
    async fn launch(&self) -> Result<(), ExecutorError> {
        let options = self.options.clone();
        let session = Arc::clone(&self.session);
        tracing::info!(headless = options.headless, "Launching browser");

        tokio::task::spawn_blocking(move || {
            let launch = LaunchOptions::default_builder()
                .headless(options.headless)
                .window_size(Some((options.viewport_width, options.viewport_height)))
                .build()
                .map_err(|e| ExecutorError::Launch(e.to_string()))?;
            let browser = Browser::new(launch)
                .map_err(|e| ExecutorError::Launch(format!("Chrome launch failed: {}", e)))?;
            let tab = browser
                .new_tab()
                .map_err(|e| ExecutorError::Launch(format!("Browser tab failed: {}", e)))?;
            tab.set_default_timeout(Duration::from_millis(options.timeout_ms));

            let mut guard = session
                .lock()
                .map_err(|e| ExecutorError::Unavailable(e.to_string()))?;
            *guard = Some(ChromeSession {
                _browser: browser,
                tab,
            });
            Ok(())
        })
        .await
        .map_err(|e| ExecutorError::Launch(format!("Task join: {}", e)))?
    }

    async fn navigate(&self, url: &str) -> Result<Observation, ExecutorError> {
        let url = url.to_string();
        let capture = self.capture_fn();
        tracing::info!(url = %url, "Navigating");
        self.with_tab(move |tab| {
            tab.navigate_to(&url)
                .and_then(|t| t.wait_until_navigated())
                .map_err(|e| ExecutorError::Navigation(format!("{}: {}", url, e)))?;
            capture(tab)
        })
        .await
    }

    async fn observe(&self) -> Result<Observation, ExecutorError> {
        let capture = self.capture_fn();
        self.with_tab(capture).await
    }

    async fn execute(
        &self,
        kind: ActionKind,
        selector: Option<&str>,
        value: Option<&str>,
    ) -> Result<ActionResult, ExecutorError> {
        let selector = selector.map(String::from);
        let value = value.map(String::from);
        self.with_tab(move |tab| {
            let before = tab.get_url();
            let result = match perform(tab, kind, selector.as_deref(), value.as_deref()) {
                Ok(message) => ActionResult::ok(message),
                Err(e) => ActionResult::failed(e),
            };
            let after = tab.get_url();
            Ok(result.with_new_url((after != before).then_some(after)))
        })
        .await
    }

    async fn close(&self) {
        let session = Arc::clone(&self.session);
        let closed = tokio::task::spawn_blocking(move || {
            session
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take()
                .is_some()
        })
        .await
        .unwrap_or(false);
        if closed {
            tracing::info!("Browser closed");
        }
    }
}
