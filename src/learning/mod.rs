//! 学习层：置信度模型（何时停止）与模式记忆（跨运行的交互可靠性）

pub mod confidence;
pub mod patterns;

pub use confidence::{ConfidenceMetrics, ConfidenceModel, MIN_UNIQUE_PAGES};
pub use patterns::{pattern_id, LearnedPattern, PatternMemory};
