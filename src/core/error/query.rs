//! 查询层错误类型
//!
//! 涵盖查询形状校验、调用契约违反以及取消

use thiserror::Error;

/// 查询操作结果类型别名
pub type QueryResult<T> = Result<T, QueryError>;

/// 查询层错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    /// 查询形状不受支持，在组件构造时立即报告
    #[error("不支持的查询形状: {0}")]
    UnsupportedQueryShape(String),

    /// 编程契约被违反（例如当前页未耗尽就切换页）
    #[error("无效操作: {0}")]
    InvalidOperation(String),

    #[error("无效参数: {0}")]
    InvalidArgument(String),

    /// 数据源返回了违反接口约定的响应
    #[error("数据源违反契约: {0}")]
    ContractViolation(String),

    #[error("查询已被取消")]
    Cancelled,
}
