//! 决策上下文：当前页面 + 会话进度 + 已学模式，渲染为发给决策方的文本
//!
//! 页面截图不进入文本，由决策方按需作为图片附带。

use std::collections::HashSet;
use std::fmt::Write;

use crate::config::LearningSection;
use crate::executor::{InteractiveElement, Observation, PngSnapshot};
use crate::learning::LearnedPattern;
use crate::session::{ActionRecord, Session};

/// 上下文中展示的最近动作数
pub const RECENT_ACTIONS: usize = 5;

/// 元素清单中的一项
#[derive(Clone, Debug)]
pub struct ContextElement {
    pub element: InteractiveElement,
    pub explored: bool,
}

/// 一轮决策所需的全部输入（自有数据，不借用会话）
#[derive(Clone, Debug)]
pub struct DecisionContext {
    pub url: String,
    pub title: String,
    /// 截断后的元素清单
    pub elements: Vec<ContextElement>,
    /// 页面上的元素总数（截断前）
    pub element_count: usize,
    pub dom_excerpt: String,
    pub action_count: usize,
    pub elements_explored: usize,
    pub total_elements: usize,
    pub confidence: f64,
    pub recent_actions: Vec<ActionRecord>,
    pub patterns: Vec<LearnedPattern>,
    pub screenshot: Option<String>,
    pub snapshot: Option<PngSnapshot>,
}

impl DecisionContext {
    pub fn build(
        session: &Session,
        observation: &Observation,
        explored: &HashSet<String>,
        patterns: &[&LearnedPattern],
        limits: &LearningSection,
    ) -> Self {
        let elements = observation
            .elements
            .iter()
            .take(limits.max_context_elements)
            .map(|e| ContextElement {
                explored: explored.contains(&e.selector),
                element: e.clone(),
            })
            .collect();

        Self {
            url: observation.url.clone(),
            title: observation.title.clone(),
            elements,
            element_count: observation.elements.len(),
            dom_excerpt: observation.dom.chars().take(limits.dom_excerpt_chars).collect(),
            action_count: session.actions().len(),
            elements_explored: session.elements_explored(),
            total_elements: session.total_elements_found(),
            confidence: session.confidence_score(),
            recent_actions: session.recent_actions(RECENT_ACTIONS).to_vec(),
            patterns: patterns.iter().map(|p| (*p).clone()).collect(),
            screenshot: observation.screenshot_ref(),
            snapshot: observation.snapshot.clone(),
        }
    }

    /// 渲染为 user 消息
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "## Current Page State\n");
        let _ = writeln!(out, "**URL:** {}", self.url);
        let _ = writeln!(out, "**Title:** {}", self.title);
        if let Some(shot) = &self.screenshot {
            let _ = writeln!(out, "**Screenshot:** {}", shot);
        }

        let _ = writeln!(out, "\n## Interactive Elements Found ({} total)", self.element_count);
        if self.elements.is_empty() {
            let _ = writeln!(out, "No interactive elements found");
        }
        for item in &self.elements {
            let marker = if item.explored { "✓ " } else { "  " };
            let _ = writeln!(out, "{}{}", marker, item.element);
        }

        let _ = writeln!(out, "\n## Simplified DOM Structure\n```html\n{}\n```", self.dom_excerpt);

        let _ = writeln!(out, "\n## Session Context");
        let _ = writeln!(out, "- Actions taken so far: {}", self.action_count);
        let _ = writeln!(
            out,
            "- Elements explored: {}/{}",
            self.elements_explored, self.total_elements
        );
        let _ = writeln!(out, "- Current confidence: {:.2}", self.confidence);

        let _ = writeln!(out, "\n## Your Previous Actions");
        if self.recent_actions.is_empty() {
            let _ = writeln!(out, "No actions taken yet");
        }
        for a in &self.recent_actions {
            let status = if a.success { "✓" } else { "✗" };
            let _ = writeln!(
                out,
                "{} {}: {}",
                status,
                a.action_kind,
                a.selector.as_deref().unwrap_or("N/A")
            );
        }

        if !self.patterns.is_empty() {
            let _ = writeln!(out, "\n## Learned Patterns For This Site");
            for p in &self.patterns {
                let _ = writeln!(
                    out,
                    "- [{}] `{}` reliability {:.0}% ({} uses)",
                    p.element_kind,
                    p.selector_pattern,
                    p.reliability() * 100.0,
                    p.observations()
                );
            }
        }

        let _ = writeln!(
            out,
            "\n## Instructions\nAnalyze the current page state and decide your next action. Focus on:\n\
             1. Elements you haven't interacted with yet\n\
             2. Exploring different sections of the site\n\
             3. Understanding the site's navigation structure\n\n\
             Respond with your next action in JSON format."
        );
        out
    }
}
