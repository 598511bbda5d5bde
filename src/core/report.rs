//! 运行总结报告（纯文本），用于 CLI 输出与完成通知

use std::fmt::Write;

use crate::learning::ConfidenceMetrics;
use crate::session::Session;

/// 生成总结报告
pub fn summary_report(session: &Session, metrics: &ConfidenceMetrics) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Learning Session Summary");
    let _ = writeln!(out, "========================");
    let _ = writeln!(out, "Target: {}", session.target_url());
    let _ = writeln!(out, "Session ID: {}", session.id());
    let _ = writeln!(out, "Status: {}", session.status());
    let _ = writeln!(out, "Duration: {:.0} seconds", session.duration_seconds());
    if let Some(from) = session.metadata.get("resumed_from") {
        let _ = writeln!(out, "Resumed From: {}", from);
    }

    let _ = writeln!(out, "\nMetrics:");
    let _ = writeln!(out, "- Total Actions: {}", session.actions().len());
    let _ = writeln!(out, "- Success Rate: {}", percent(metrics.success_rate));
    let _ = writeln!(out, "- Coverage: {}", percent(metrics.coverage));
    let _ = writeln!(out, "- Confidence: {}", percent(metrics.weighted_score()));

    let _ = writeln!(out, "\nExploration:");
    let _ = writeln!(out, "- Unique Pages Visited: {}", session.unique_page_urls().len());
    let _ = writeln!(
        out,
        "- Elements Explored: {}/{}",
        session.elements_explored(),
        session.total_elements_found()
    );

    let _ = writeln!(out, "\nAction Breakdown:");
    let breakdown = session.action_breakdown();
    if breakdown.is_empty() {
        let _ = writeln!(out, "- (none)");
    }
    for (kind, count) in breakdown {
        let _ = writeln!(out, "- {}: {}", kind, count);
    }
    out.trim_end().to_string()
}

fn percent(x: f64) -> String {
    format!("{:.0}%", x * 100.0)
}
