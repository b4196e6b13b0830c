//! 续传令牌错误类型
//!
//! 结构性解析失败、来自更高版本的令牌、以及不再支持的令牌

use thiserror::Error;

use crate::query::continuation::Version;

/// 续传令牌操作结果类型别名
pub type TokenResult<T> = Result<T, ContinuationTokenError>;

/// 续传令牌错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ContinuationTokenError {
    /// 令牌结构损坏：缺少必需字段或版本无法解析
    #[error("续传令牌格式错误{}: {reason}; 原始令牌: {raw}", field_suffix(.field))]
    Malformed {
        field: Option<String>,
        raw: String,
        reason: String,
    },

    /// 令牌版本高于当前代码已知的最高版本
    #[error("续传令牌来自更新版本 {version} (已知最高版本 {max_known}); 原始令牌: {raw}")]
    FromFuture {
        version: Version,
        max_known: Version,
        raw: String,
    },

    /// 令牌版本已不受支持
    #[error("续传令牌不受支持: {reason}")]
    Unsupported { reason: String },
}

fn field_suffix(field: &Option<String>) -> String {
    match field {
        Some(name) => format!(" (字段 '{}')", name),
        None => String::new(),
    }
}

impl ContinuationTokenError {
    pub fn malformed(field: Option<&str>, raw: &str, reason: impl Into<String>) -> Self {
        ContinuationTokenError::Malformed {
            field: field.map(str::to_string),
            raw: raw.to_string(),
            reason: reason.into(),
        }
    }

    pub fn missing_field(field: &str, raw: &str) -> Self {
        Self::malformed(Some(field), raw, "缺少必需字段")
    }
}
