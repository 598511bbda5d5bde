//! 核心编排层：错误、循环阶段、决策上下文、报告与主控循环

pub mod builder;
pub mod context;
pub mod error;
pub mod orchestrator;
pub mod report;
pub mod state;

pub use builder::{build_orchestrator, create_llm_from_config};
pub use context::DecisionContext;
pub use error::{DecisionError, ExecutorError, ScoutError, StoreError};
pub use orchestrator::{domain_of, LearningResult, Orchestrator};
pub use report::summary_report;
pub use state::{LoopPhase, Termination};
