//! 装饰器续传令牌层的公共解析与序列化
//!
//! 每个装饰器把自身状态和源组件令牌包装成一层 JSON，例如 `{"top": 3, "sourceToken": "..."}`。

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::core::error::{ContinuationTokenError, PipelineError, PipelineResult, TokenResult};
use crate::query::executor::traits::ContinuationState;

pub fn parse_layer<T: DeserializeOwned>(raw: &str) -> TokenResult<T> {
    serde_json::from_str(raw).map_err(|e| ContinuationTokenError::malformed(None, raw, e.to_string()))
}

pub fn serialize_layer<T: Serialize>(layer: &T) -> ContinuationState {
    match serde_json::to_string(layer) {
        Ok(token) => ContinuationState::Token(token),
        Err(e) => ContinuationState::Unsupported(format!("续传令牌序列化失败: {}", e)),
    }
}

/// 校验计数类令牌字段：不能为负，也不能超过查询本身给定的值
///
/// 令牌结构合法但计数越界属于无效操作，而不是令牌损坏。
pub fn checked_count(field: &str, value: i64, original: u64) -> PipelineResult<u64> {
    if value < 0 {
        return Err(PipelineError::invalid_operation(format!(
            "续传令牌字段 {} 不能为负数: {}",
            field, value
        )));
    }
    let value = value as u64;
    if value > original {
        return Err(PipelineError::invalid_operation(format!(
            "续传令牌字段 {} 的值 {} 超过查询给定的 {}",
            field, value, original
        )));
    }
    Ok(value)
}
