//! 通知：运行完成 / 出错时对外报告
//!
//! 后端：log（仅日志）、webhook（POST JSON）、resend（邮件 API）、none。
//! 发送失败只记日志并返回 false，不影响探索结果。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::config::NotifySection;
use crate::learning::ConfidenceMetrics;
use crate::session::Session;

const RESEND_API_URL: &str = "https://api.resend.com/emails";

/// 通知 trait
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// 后端名（log / none / webhook / resend）
    fn name(&self) -> &'static str;

    async fn notify_complete(&self, session: &Session, metrics: &ConfidenceMetrics, report: &str) -> bool;

    async fn notify_error(&self, session: &Session, error: &str) -> bool;
}

/// 按配置选择后端；缺少必要字段时回落到 log
pub fn from_config(cfg: &NotifySection) -> Arc<dyn NotificationSink> {
    let timeout = Duration::from_secs(cfg.timeout_secs.max(1));
    match cfg.provider.to_lowercase().as_str() {
        "none" => Arc::new(NoopNotifier),
        "webhook" => match &cfg.webhook_url {
            Some(url) => Arc::new(WebhookNotifier::new(url.clone(), timeout)),
            None => {
                tracing::warn!("notify.provider = webhook but notify.webhook_url is unset, using log notifier");
                Arc::new(LogNotifier)
            }
        },
        "resend" => {
            let api_key = cfg
                .api_key
                .clone()
                .or_else(|| std::env::var("RESEND_API_KEY").ok());
            match (api_key, &cfg.recipient) {
                (Some(key), Some(to)) => Arc::new(ResendNotifier::new(
                    key,
                    cfg.from.clone(),
                    to.clone(),
                    timeout,
                )),
                _ => {
                    tracing::warn!("Resend notifier needs an API key and a recipient, using log notifier");
                    Arc::new(LogNotifier)
                }
            }
        }
        "log" => Arc::new(LogNotifier),
        other => {
            tracing::warn!(provider = other, "Unknown notify provider, using log notifier");
            Arc::new(LogNotifier)
        }
    }
}

/// 只写日志
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl NotificationSink for LogNotifier {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn notify_complete(&self, session: &Session, metrics: &ConfidenceMetrics, report: &str) -> bool {
        tracing::info!(
            session_id = %session.id(),
            confidence = metrics.weighted_score(),
            "Learning complete\n{}",
            report
        );
        true
    }

    async fn notify_error(&self, session: &Session, error: &str) -> bool {
        tracing::error!(session_id = %session.id(), error, "Learning failed");
        true
    }
}

/// 丢弃所有通知
#[derive(Debug, Default)]
pub struct NoopNotifier;

#[async_trait]
impl NotificationSink for NoopNotifier {
    fn name(&self) -> &'static str {
        "none"
    }

    async fn notify_complete(&self, _: &Session, _: &ConfidenceMetrics, _: &str) -> bool {
        false
    }

    async fn notify_error(&self, _: &Session, _: &str) -> bool {
        false
    }
}

/// Webhook 负载
#[derive(Debug, Serialize)]
pub struct WebhookPayload<'a> {
    pub event: &'static str,
    pub session_id: &'a str,
    pub target_url: &'a str,
    pub status: &'static str,
    pub actions: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'a str>,
}

impl<'a> WebhookPayload<'a> {
    pub fn complete(session: &'a Session, metrics: &ConfidenceMetrics, report: &'a str) -> Self {
        Self {
            event: "learning_complete",
            session_id: session.id(),
            target_url: session.target_url(),
            status: session.status().as_str(),
            actions: session.actions().len(),
            confidence: Some(metrics.weighted_score()),
            report: Some(report),
            error: None,
        }
    }

    pub fn error(session: &'a Session, error: &'a str) -> Self {
        Self {
            event: "learning_error",
            session_id: session.id(),
            target_url: session.target_url(),
            status: session.status().as_str(),
            actions: session.actions().len(),
            confidence: None,
            report: None,
            error: Some(error),
        }
    }
}

/// POST JSON 到任意 URL
pub struct WebhookNotifier {
    url: String,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: String, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { url, client }
    }

    async fn post(&self, payload: &WebhookPayload<'_>) -> bool {
        match post_json(&self.client, &self.url, None, payload).await {
            Ok(()) => {
                tracing::info!(url = %self.url, event = payload.event, "Webhook delivered");
                true
            }
            Err(e) => {
                tracing::error!(url = %self.url, error = %e, "Failed to deliver webhook");
                false
            }
        }
    }
}

#[async_trait]
impl NotificationSink for WebhookNotifier {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn notify_complete(&self, session: &Session, metrics: &ConfidenceMetrics, report: &str) -> bool {
        self.post(&WebhookPayload::complete(session, metrics, report)).await
    }

    async fn notify_error(&self, session: &Session, error: &str) -> bool {
        self.post(&WebhookPayload::error(session, error)).await
    }
}

/// 邮件请求体
#[derive(Debug, Serialize)]
pub struct EmailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// Resend 邮件 API
pub struct ResendNotifier {
    api_key: String,
    from: String,
    to: String,
    client: reqwest::Client,
}

impl ResendNotifier {
    pub fn new(api_key: String, from: String, to: String, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            api_key,
            from,
            to,
            client,
        }
    }

    pub fn complete_email(&self, session: &Session, metrics: &ConfidenceMetrics, report: &str) -> EmailMessage {
        let html = format!(
            "<h1>Learning Complete</h1>\
             <p><strong>Target URL:</strong> <a href=\"{url}\">{url}</a></p>\
             <p><strong>Session ID:</strong> <code>{id}</code></p>\
             <table>\
             <tr><td>Total Actions</td><td>{actions}</td></tr>\
             <tr><td>Success Rate</td><td>{success:.0}%</td></tr>\
             <tr><td>Coverage</td><td>{coverage:.0}%</td></tr>\
             <tr><td>Final Confidence</td><td>{confidence:.0}%</td></tr>\
             <tr><td>Duration</td><td>{duration:.0} seconds</td></tr>\
             </table>\
             <pre>{report}</pre>",
            url = escape_html(session.target_url()),
            id = session.id(),
            actions = session.actions().len(),
            success = metrics.success_rate * 100.0,
            coverage = metrics.coverage * 100.0,
            confidence = metrics.weighted_score() * 100.0,
            duration = session.duration_seconds(),
            report = escape_html(report),
        );
        EmailMessage {
            from: self.from.clone(),
            to: self.to.clone(),
            subject: format!("[Scout] Learning Complete: {}", crate::core::domain_of(session.target_url())),
            html,
        }
    }

    pub fn error_email(&self, session: &Session, error: &str) -> EmailMessage {
        let html = format!(
            "<h1>Learning Error</h1>\
             <p><strong>Target URL:</strong> <a href=\"{url}\">{url}</a></p>\
             <p><strong>Session ID:</strong> <code>{id}</code></p>\
             <pre>{error}</pre>\
             <p>Actions completed before error: {actions}</p>",
            url = escape_html(session.target_url()),
            id = session.id(),
            error = escape_html(error),
            actions = session.actions().len(),
        );
        EmailMessage {
            from: self.from.clone(),
            to: self.to.clone(),
            subject: format!("[Scout] Error: {}", crate::core::domain_of(session.target_url())),
            html,
        }
    }

    async fn send(&self, email: &EmailMessage) -> bool {
        match post_json(&self.client, RESEND_API_URL, Some(&self.api_key), email).await {
            Ok(()) => {
                tracing::info!(to = %email.to, subject = %email.subject, "Email sent");
                true
            }
            Err(e) => {
                tracing::error!(to = %email.to, error = %e, "Failed to send email");
                false
            }
        }
    }
}

#[async_trait]
impl NotificationSink for ResendNotifier {
    fn name(&self) -> &'static str {
        "resend"
    }

    async fn notify_complete(&self, session: &Session, metrics: &ConfidenceMetrics, report: &str) -> bool {
        self.send(&self.complete_email(session, metrics, report)).await
    }

    async fn notify_error(&self, session: &Session, error: &str) -> bool {
        self.send(&self.error_email(session, error)).await
    }
}

async fn post_json<T: Serialize + ?Sized>(
    client: &reqwest::Client,
    url: &str,
    bearer: Option<&str>,
    body: &T,
) -> anyhow::Result<()> {
    let mut req = client.post(url).json(body);
    if let Some(token) = bearer {
        req = req.bearer_auth(token);
    }
    let resp = req.send().await?;
    if !resp.status().is_success() {
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        anyhow::bail!("HTTP {}: {}", status, text);
    }
    Ok(())
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
