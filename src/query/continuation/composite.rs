//! 分区级续传令牌
//!
//! 记录一个分区范围及其后端续传令牌。`token` 为 null 表示该范围尚未开始拉取。

use serde::{Deserialize, Serialize};

use crate::core::error::{ContinuationTokenError, TokenResult};
use crate::query::range::PartitionRange;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositeContinuationToken {
    pub token: Option<String>,
    pub range: PartitionRange,
}

impl CompositeContinuationToken {
    pub fn new(token: Option<String>, range: PartitionRange) -> Self {
        Self { token, range }
    }
}

/// 解析并行续传令牌：一个非空的 composite 数组
pub fn parse_composite_tokens(raw: &str) -> TokenResult<Vec<CompositeContinuationToken>> {
    let tokens: Vec<CompositeContinuationToken> = serde_json::from_str(raw)
        .map_err(|e| ContinuationTokenError::malformed(None, raw, e.to_string()))?;
    if tokens.is_empty() {
        return Err(ContinuationTokenError::malformed(
            None,
            raw,
            "composite 续传令牌数组为空",
        ));
    }
    for token in &tokens {
        if token.range.is_empty() {
            return Err(ContinuationTokenError::malformed(
                Some("range"),
                raw,
                format!("分区范围 {} 为空", token.range),
            ));
        }
    }
    Ok(tokens)
}

pub fn serialize_composite_tokens(tokens: &[CompositeContinuationToken]) -> String {
    // 字段只有字符串，序列化不会失败
    serde_json::to_string(tokens).unwrap_or_else(|_| "[]".to_string())
}
