//! 统一错误处理系统 for CrossQuery
//!
//! ## 设计理念
//!
//! 1. **按关注点拆分**：续传令牌、查询形状/调用契约、后端拉取失败各自独立成枚举
//! 2. **分层转换**：子错误通过 `#[from]` 汇总到 `PipelineError`，外部错误（serde_json）转换为字符串
//! 3. **统一接口**：`PipelineResult<T>` 作为整个流水线的返回类型

use thiserror::Error;

pub mod fetch;
pub mod query;
pub mod token;

pub use fetch::FetchFailure;
pub use query::{QueryError, QueryResult};
pub use token::{ContinuationTokenError, TokenResult};

/// 流水线统一错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("续传令牌错误: {0}")]
    ContinuationToken(#[from] ContinuationTokenError),

    #[error("查询错误: {0}")]
    Query(#[from] QueryError),

    /// 分区拉取失败，在拉取时缓存，在消费端重放
    #[error("分区拉取失败: {0}")]
    Fetch(#[from] FetchFailure),

    #[error("序列化错误: {0}")]
    Serialization(String),
}

/// 统一的结果类型
pub type PipelineResult<T> = Result<T, PipelineError>;

impl PipelineError {
    /// 调用方是否需要丢弃续传令牌并从头重新执行查询
    pub fn requires_restart(&self) -> bool {
        matches!(
            self,
            PipelineError::ContinuationToken(ContinuationTokenError::Malformed { .. })
                | PipelineError::ContinuationToken(ContinuationTokenError::Unsupported { .. })
        )
    }

    /// 是否为协作式取消
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PipelineError::Query(QueryError::Cancelled))
    }

    /// 便捷构造：调用契约被违反
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        PipelineError::Query(QueryError::InvalidOperation(message.into()))
    }

    /// 便捷构造：不支持的查询形状
    pub fn unsupported_query(message: impl Into<String>) -> Self {
        PipelineError::Query(QueryError::UnsupportedQueryShape(message.into()))
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::Serialization(err.to_string())
    }
}
