//! 错误类型
//!
//! 按传播策略划分：只有 ExecutorError 中的基础设施故障会中止一次探索；
//! DecisionError 由编排器替换为兜底动作，StoreError 返回给具体的保存调用方。

use std::path::PathBuf;

use thiserror::Error;

/// 编排器对外暴露的错误（CLI 以非零退出码呈现）
#[derive(Error, Debug)]
pub enum ScoutError {
    /// 执行器无法启动或在执行中失联
    #[error("Infrastructure failure: {0}")]
    Infrastructure(#[from] ExecutorError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Config error: {0}")]
    Config(String),
}

/// 会话 / 模式记录的持久化错误
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed record {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// 执行器故障。单个动作失败（元素不存在、超时）不走这里，而是 ActionResult { success: false }
#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("Executor launch failed: {0}")]
    Launch(String),

    #[error("Executor not launched")]
    NotLaunched,

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Observation failed: {0}")]
    Observation(String),

    #[error("Executor unavailable: {0}")]
    Unavailable(String),
}

/// 决策提供方的失败：传输错误、无法解析的回复、未知动作
#[derive(Error, Debug)]
pub enum DecisionError {
    #[error("Decision transport error: {0}")]
    Transport(String),

    #[error("Malformed decision: {0}")]
    Malformed(String),

    #[error("Unknown action kind: {0}")]
    UnknownAction(String),
}
