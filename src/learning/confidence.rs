//! 置信度模型：把会话历史折算为 [0,1] 的综合分数，并给出停止判定
//!
//! 四个分项：覆盖率、成功率、模式稳定性、探索深度，按 0.30 / 0.25 / 0.25 / 0.20 加权。
//! 停止规则是两段式的：唯一页面数不足 MIN_UNIQUE_PAGES 时一律不停，否则综合分 >= 阈值才停。

use serde::Serialize;

use crate::session::Session;

const WEIGHT_COVERAGE: f64 = 0.30;
const WEIGHT_SUCCESS_RATE: f64 = 0.25;
const WEIGHT_PATTERN_STABILITY: f64 = 0.25;
const WEIGHT_EXPLORATION_DEPTH: f64 = 0.20;

/// 单页高分不算学会整个站点
pub const MIN_UNIQUE_PAGES: usize = 4;
pub const DEFAULT_THRESHOLD: f64 = 0.85;

/// 动作数不足时的稳定性常量
const LOW_EVIDENCE_STABILITY: f64 = 0.3;
const MIN_ACTIONS_FOR_STABILITY: usize = 5;
const STABILITY_WINDOW: usize = 10;
const MAX_VARIETY_BONUS: f64 = 0.3;

/// 各分项分数（每项都在 [0,1]）
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct ConfidenceMetrics {
    pub coverage: f64,
    pub success_rate: f64,
    pub pattern_stability: f64,
    pub exploration_depth: f64,
}

impl ConfidenceMetrics {
    /// 分项被截断到 [0,1]，保证综合分有界
    pub fn new(coverage: f64, success_rate: f64, pattern_stability: f64, exploration_depth: f64) -> Self {
        Self {
            coverage: unit(coverage),
            success_rate: unit(success_rate),
            pattern_stability: unit(pattern_stability),
            exploration_depth: unit(exploration_depth),
        }
    }

    /// 加权综合分
    pub fn weighted_score(&self) -> f64 {
        self.coverage * WEIGHT_COVERAGE
            + self.success_rate * WEIGHT_SUCCESS_RATE
            + self.pattern_stability * WEIGHT_PATTERN_STABILITY
            + self.exploration_depth * WEIGHT_EXPLORATION_DEPTH
    }
}

fn unit(x: f64) -> f64 {
    if x.is_nan() {
        0.0
    } else {
        x.clamp(0.0, 1.0)
    }
}

/// 置信度模型：无状态，阈值在构造时给定
#[derive(Clone, Debug)]
pub struct ConfidenceModel {
    threshold: f64,
}

impl Default for ConfidenceModel {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

impl ConfidenceModel {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// 从会话重新计算全部分项
    pub fn evaluate(&self, session: &Session) -> ConfidenceMetrics {
        let metrics = ConfidenceMetrics::new(
            coverage(session),
            session.success_rate(),
            pattern_stability(session),
            exploration_depth(session),
        );
        tracing::info!(
            session_id = %session.id(),
            weighted_score = metrics.weighted_score(),
            coverage = metrics.coverage,
            success_rate = metrics.success_rate,
            pattern_stability = metrics.pattern_stability,
            exploration_depth = metrics.exploration_depth,
            "Confidence updated"
        );
        metrics
    }

    /// 停止规则
    pub fn is_learning_complete(&self, metrics: &ConfidenceMetrics, unique_pages: usize) -> bool {
        if unique_pages < MIN_UNIQUE_PAGES {
            return false;
        }
        let complete = metrics.weighted_score() >= self.threshold;
        if complete {
            tracing::info!(
                final_score = metrics.weighted_score(),
                threshold = self.threshold,
                unique_pages,
                "Learning complete"
            );
        }
        complete
    }
}

fn coverage(session: &Session) -> f64 {
    if session.total_elements_found() == 0 {
        return 0.0;
    }
    (session.elements_explored() as f64 / session.total_elements_found() as f64).min(1.0)
}

/// 最近窗口的成功率 + 动作种类奖励（防止只重复一个必然成功的动作刷分）
fn pattern_stability(session: &Session) -> f64 {
    if session.actions().len() < MIN_ACTIONS_FOR_STABILITY {
        return LOW_EVIDENCE_STABILITY;
    }
    let recent = session.recent_actions(STABILITY_WINDOW);
    let recent_success = recent.iter().filter(|a| a.success).count() as f64 / recent.len() as f64;
    let variety_bonus = (session.distinct_action_kinds().len() as f64 / 4.0).min(MAX_VARIETY_BONUS);
    (recent_success + variety_bonus).min(1.0)
}

/// 页面广度与元素广度各占一半
fn exploration_depth(session: &Session) -> f64 {
    let url_score = (session.unique_page_urls().len() as f64 / 5.0).min(0.5);
    let selector_score = (session.unique_selectors().len() as f64 / 20.0).min(0.5);
    url_score + selector_score
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ActionKind;
    use crate::session::ActionRecord;

    fn push(session: &mut Session, kind: ActionKind, selector: Option<&str>, success: bool, url: &str) {
        session.add_action(ActionRecord::new(
            kind,
            selector.map(String::from),
            None,
            "test",
            success,
            url,
        ));
    }

    #[test]
    fn test_weighted_score_linear_combination() {
        let metrics = ConfidenceMetrics::new(0.8, 0.9, 0.7, 0.6);
        // 0.24 + 0.225 + 0.175 + 0.12 = 0.76
        assert!((metrics.weighted_score() - 0.76).abs() < 1e-9);
    }

    #[test]
    fn test_weighted_score_bounded() {
        let grid = [0.0, 0.25, 0.5, 1.0];
        for &a in &grid {
            for &b in &grid {
                for &c in &grid {
                    for &d in &grid {
                        let s = ConfidenceMetrics::new(a, b, c, d).weighted_score();
                        assert!((0.0..=1.0 + 1e-12).contains(&s));
                    }
                }
            }
        }
        let clamped = ConfidenceMetrics::new(4.0, -1.0, f64::NAN, 2.0);
        assert!((clamped.weighted_score() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_page_floor_blocks_completion() {
        let model = ConfidenceModel::default();
        let perfect = ConfidenceMetrics::new(1.0, 1.0, 1.0, 1.0);
        assert!(!model.is_learning_complete(&perfect, 1));
        assert!(!model.is_learning_complete(&perfect, 3));
        assert!(model.is_learning_complete(&perfect, 4));
    }

    #[test]
    fn test_threshold_gate() {
        let model = ConfidenceModel::new(0.85);
        assert!(!model.is_learning_complete(&ConfidenceMetrics::new(0.8, 0.9, 0.7, 0.6), 10));
        let lenient = ConfidenceModel::new(0.7);
        assert!(lenient.is_learning_complete(&ConfidenceMetrics::new(0.8, 0.9, 0.7, 0.6), 10));
    }

    #[test]
    fn test_empty_session_metrics() {
        let model = ConfidenceModel::default();
        let session = Session::create("https://example.com");
        let m = model.evaluate(&session);
        assert_eq!(m.coverage, 0.0);
        assert_eq!(m.success_rate, 0.0);
        assert_eq!(m.pattern_stability, LOW_EVIDENCE_STABILITY);
        assert_eq!(m.exploration_depth, 0.0);
    }

    #[test]
    fn test_stability_needs_five_actions() {
        let model = ConfidenceModel::default();
        let mut session = Session::create("https://example.com");
        for i in 0..4 {
            push(&mut session, ActionKind::Click, Some(&format!("#b{}", i)), true, "p1");
        }
        assert_eq!(model.evaluate(&session).pattern_stability, 0.3);

        push(&mut session, ActionKind::Click, Some("#b4"), true, "p1");
        // 1.0 + min(1/4, 0.3) 封顶 1.0
        assert_eq!(model.evaluate(&session).pattern_stability, 1.0);
    }

    #[test]
    fn test_stability_uses_recent_window() {
        let model = ConfidenceModel::default();
        let mut session = Session::create("https://example.com");
        // 前 10 次失败，后 10 次中一半成功
        for _ in 0..10 {
            push(&mut session, ActionKind::Click, None, false, "p1");
        }
        for i in 0..10 {
            push(&mut session, ActionKind::Click, None, i % 2 == 0, "p1");
        }
        // 0.5 + min(1/4, 0.3) = 0.75
        assert!((model.evaluate(&session).pattern_stability - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_coverage_capped() {
        let model = ConfidenceModel::default();
        let mut session = Session::create("https://example.com");
        session.observe_elements(2);
        session.set_elements_explored(5);
        assert_eq!(model.evaluate(&session).coverage, 1.0);
    }

    #[test]
    fn test_end_to_end_scenario() {
        // 4 个页面、25 个元素中探索 20 个、成功率 0.9、最近 10 次全部成功、4 种动作
        let mut session = Session::create("https://example.com");
        session.observe_elements(25);
        let kinds = [ActionKind::Click, ActionKind::Type, ActionKind::Hover, ActionKind::Scroll];
        let pages = ["p1", "p2", "p3", "p4"];
        for i in 0..2 {
            push(&mut session, ActionKind::Click, Some(&format!("#s{}", i)), false, pages[0]);
        }
        for i in 2..20 {
            let kind = kinds[i % kinds.len()];
            push(&mut session, kind, Some(&format!("#s{}", i)), true, pages[i % pages.len()]);
        }
        session.set_elements_explored(session.unique_selectors().len());

        let model = ConfidenceModel::default();
        let m = model.evaluate(&session);
        assert!((m.coverage - 0.8).abs() < 1e-9);
        assert!((m.success_rate - 0.9).abs() < 1e-9);
        assert_eq!(m.pattern_stability, 1.0);
        assert_eq!(m.exploration_depth, 1.0);
        assert!((m.weighted_score() - 0.915).abs() < 1e-9);
        assert!(model.is_learning_complete(&m, session.unique_page_urls().len()));
    }
}
