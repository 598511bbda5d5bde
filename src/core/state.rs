//! 探索循环的阶段与终止原因

use std::fmt;

use serde::Serialize;

/// 单次运行的阶段
///
/// Launching → Observing → Deciding → Executing → Recording → Scoring → {Observing | 终止}
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum LoopPhase {
    Idle,
    Launching,
    Observing,
    Deciding,
    Executing,
    Recording,
    Scoring,
    Finished,
}

impl LoopPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            LoopPhase::Idle => "idle",
            LoopPhase::Launching => "launching",
            LoopPhase::Observing => "observing",
            LoopPhase::Deciding => "deciding",
            LoopPhase::Executing => "executing",
            LoopPhase::Recording => "recording",
            LoopPhase::Scoring => "scoring",
            LoopPhase::Finished => "finished",
        }
    }
}

impl fmt::Display for LoopPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 运行结束的原因
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum Termination {
    /// 决策方给出 complete
    Voluntary,
    /// 满足停止规则
    Converged,
    /// 迭代预算用完
    Exhausted,
    /// 基础设施故障
    Failed(String),
}

impl Termination {
    pub fn as_str(&self) -> &'static str {
        match self {
            Termination::Voluntary => "voluntary",
            Termination::Converged => "converged",
            Termination::Exhausted => "exhausted",
            Termination::Failed(_) => "failed",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Termination::Failed(_))
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::Failed(reason) => write!(f, "failed: {}", reason),
            other => f.write_str(other.as_str()),
        }
    }
}
