//! 会话与动作记录
//!
//! Session 是一次探索运行的追加式记录：动作序列只增不改，状态只能从 active 走向终态一次。

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::executor::ActionKind;

/// 会话状态：active → completed | failed，终态不可回退
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, SessionStatus::Active)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单个动作的不可变事实记录
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub timestamp: DateTime<Utc>,
    pub action_kind: ActionKind,
    pub selector: Option<String>,
    pub value: Option<String>,
    pub reasoning: String,
    pub success: bool,
    /// 执行动作时所在页面
    pub page_url: String,
    /// 观察产物（截图路径）
    pub observation_ref: Option<String>,
}

impl ActionRecord {
    pub fn new(
        action_kind: ActionKind,
        selector: Option<String>,
        value: Option<String>,
        reasoning: impl Into<String>,
        success: bool,
        page_url: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            action_kind,
            selector,
            value,
            reasoning: reasoning.into(),
            success,
            page_url: page_url.into(),
            observation_ref: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_observation_ref(mut self, observation_ref: Option<String>) -> Self {
        self.observation_ref = observation_ref;
        self
    }
}

/// 一次探索运行
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Session {
    id: String,
    target_url: String,
    created_at: DateTime<Utc>,
    status: SessionStatus,
    actions: Vec<ActionRecord>,
    confidence_score: f64,
    total_elements_found: usize,
    elements_explored: usize,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Session {
    /// 新会话：状态 active，动作为空
    pub fn create(url: impl Into<String>) -> Self {
        let id = uuid::Uuid::new_v4().simple().to_string();
        Self {
            id: id[..8].to_string(),
            target_url: url.into(),
            created_at: Utc::now(),
            status: SessionStatus::Active,
            actions: Vec::new(),
            confidence_score: 0.0,
            total_elements_found: 0,
            elements_explored: 0,
            metadata: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn target_url(&self) -> &str {
        &self.target_url
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn actions(&self) -> &[ActionRecord] {
        &self.actions
    }

    pub fn confidence_score(&self) -> f64 {
        self.confidence_score
    }

    pub fn total_elements_found(&self) -> usize {
        self.total_elements_found
    }

    pub fn elements_explored(&self) -> usize {
        self.elements_explored
    }

    /// 唯一的动作序列修改入口
    pub fn add_action(&mut self, record: ActionRecord) {
        self.actions.push(record);
    }

    pub(crate) fn set_confidence_score(&mut self, score: f64) {
        self.confidence_score = score;
    }

    /// 只在观察到更多可交互元素时增长
    pub fn observe_elements(&mut self, count: usize) {
        self.total_elements_found = self.total_elements_found.max(count);
    }

    pub fn set_elements_explored(&mut self, count: usize) {
        self.elements_explored = self.elements_explored.max(count);
    }

    /// 进入终态；已是终态时拒绝并返回 false
    pub fn finish(&mut self, status: SessionStatus) -> bool {
        if self.status.is_terminal() || !status.is_terminal() {
            return false;
        }
        self.status = status;
        true
    }

    pub fn success_rate(&self) -> f64 {
        if self.actions.is_empty() {
            return 0.0;
        }
        let successful = self.actions.iter().filter(|a| a.success).count();
        successful as f64 / self.actions.len() as f64
    }

    /// 首尾动作的时间差；少于两个动作时为 0
    pub fn duration_seconds(&self) -> f64 {
        match (self.actions.first(), self.actions.last()) {
            (Some(first), Some(last)) if self.actions.len() >= 2 => {
                (last.timestamp - first.timestamp).num_milliseconds() as f64 / 1000.0
            }
            _ => 0.0,
        }
    }

    pub fn unique_page_urls(&self) -> HashSet<&str> {
        self.actions.iter().map(|a| a.page_url.as_str()).collect()
    }

    pub fn unique_selectors(&self) -> HashSet<&str> {
        self.actions
            .iter()
            .filter_map(|a| a.selector.as_deref())
            .collect()
    }

    pub fn distinct_action_kinds(&self) -> HashSet<ActionKind> {
        self.actions.iter().map(|a| a.action_kind).collect()
    }

    /// 最近 n 条动作（按时间顺序）
    pub fn recent_actions(&self, n: usize) -> &[ActionRecord] {
        &self.actions[self.actions.len().saturating_sub(n)..]
    }

    /// 各动作类型的次数
    pub fn action_breakdown(&self) -> BTreeMap<ActionKind, usize> {
        let mut counts = BTreeMap::new();
        for a in &self.actions {
            *counts.entry(a.action_kind).or_insert(0) += 1;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(kind: ActionKind, selector: Option<&str>, success: bool, url: &str) -> ActionRecord {
        ActionRecord::new(
            kind,
            selector.map(String::from),
            None,
            "testing",
            success,
            url,
        )
    }

    #[test]
    fn test_session_creation() {
        let session = Session::create("https://example.com");
        assert_eq!(session.id().len(), 8);
        assert_eq!(session.target_url(), "https://example.com");
        assert_eq!(session.status(), SessionStatus::Active);
        assert!(session.actions().is_empty());
        assert_ne!(Session::create("https://example.com").id(), session.id());
    }

    #[test]
    fn test_empty_session_rates() {
        let session = Session::create("https://example.com");
        assert_eq!(session.success_rate(), 0.0);
        assert_eq!(session.duration_seconds(), 0.0);
    }

    #[test]
    fn test_single_action_duration_is_zero() {
        let mut session = Session::create("https://example.com");
        session.add_action(record(ActionKind::Click, Some("#button"), true, "https://example.com"));
        assert_eq!(session.success_rate(), 1.0);
        assert_eq!(session.duration_seconds(), 0.0);
    }

    #[test]
    fn test_duration_between_first_and_last() {
        let mut session = Session::create("https://example.com");
        let start = Utc::now();
        session.add_action(record(ActionKind::Click, None, true, "a").with_timestamp(start));
        session.add_action(
            record(ActionKind::Scroll, None, false, "a").with_timestamp(start + Duration::seconds(3)),
        );
        session.add_action(
            record(ActionKind::Hover, None, true, "a").with_timestamp(start + Duration::milliseconds(7500)),
        );
        assert!((session.duration_seconds() - 7.5).abs() < 1e-9);
        assert!((session.success_rate() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_status_is_monotonic() {
        let mut session = Session::create("https://example.com");
        assert!(!session.finish(SessionStatus::Active));
        assert!(session.finish(SessionStatus::Completed));
        assert!(!session.finish(SessionStatus::Failed));
        assert_eq!(session.status(), SessionStatus::Completed);
    }

    #[test]
    fn test_counters_never_decrease() {
        let mut session = Session::create("https://example.com");
        session.observe_elements(12);
        session.observe_elements(7);
        assert_eq!(session.total_elements_found(), 12);
        session.set_elements_explored(3);
        session.set_elements_explored(2);
        assert_eq!(session.elements_explored(), 3);
    }

    #[test]
    fn test_distinct_views() {
        let mut session = Session::create("https://example.com");
        session.add_action(record(ActionKind::Click, Some("#a"), true, "p1"));
        session.add_action(record(ActionKind::Click, Some("#a"), true, "p2"));
        session.add_action(record(ActionKind::Type, Some("#b"), true, "p2"));
        session.add_action(record(ActionKind::Wait, None, true, "p2"));

        assert_eq!(session.unique_page_urls().len(), 2);
        assert_eq!(session.unique_selectors().len(), 2);
        assert_eq!(session.distinct_action_kinds().len(), 3);
        assert_eq!(session.recent_actions(2).len(), 2);
        assert_eq!(session.recent_actions(2)[1].action_kind, ActionKind::Wait);
        assert_eq!(session.recent_actions(10).len(), 4);
        assert_eq!(session.action_breakdown().get(&ActionKind::Click), Some(&2));
    }
}
