//! DISTINCT 组件
//!
//! 以结构哈希作为去重键：
//! - 有序 DISTINCT：源按排序输出，只需与上一条的哈希比较，续传令牌记录该哈希
//! - 无序 DISTINCT：记录所有已见哈希，无法压缩进令牌，因此不支持续传

use std::collections::HashSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::error::{ContinuationTokenError, PipelineResult, TokenResult};
use crate::core::{structural_hash, CancellationToken, Element};
use crate::query::executor::token_layer::{parse_layer, serialize_layer};
use crate::query::executor::traits::{
    ComponentBase, ContinuationState, ExecutionComponent, QueryResponse,
};
use crate::query::plan::DistinctType;

#[derive(Debug, Serialize, Deserialize)]
struct DistinctToken {
    #[serde(rename = "lastHash")]
    last_hash: Option<String>,
    #[serde(rename = "sourceToken")]
    source_token: String,
}

/// 去重表
#[derive(Debug, Clone)]
pub enum DistinctMap {
    Ordered { last_hash: Option<u128> },
    Unordered { seen: HashSet<u128> },
}

impl DistinctMap {
    pub fn new(distinct_type: DistinctType, last_hash: Option<u128>) -> Self {
        match distinct_type {
            DistinctType::Unordered => DistinctMap::Unordered {
                seen: HashSet::new(),
            },
            _ => DistinctMap::Ordered { last_hash },
        }
    }

    /// 去重键；GROUP BY 的分组键也由这里计算
    pub fn key_of(element: &Element) -> u128 {
        structural_hash(Some(element))
    }

    /// 元素首次出现时返回 true
    pub fn add(&mut self, element: &Element) -> bool {
        let hash = Self::key_of(element);
        match self {
            DistinctMap::Ordered { last_hash } => {
                if *last_hash == Some(hash) {
                    false
                } else {
                    *last_hash = Some(hash);
                    true
                }
            }
            DistinctMap::Unordered { seen } => seen.insert(hash),
        }
    }
}

pub struct DistinctComponent {
    base: ComponentBase,
    map: DistinctMap,
}

impl DistinctComponent {
    pub fn new(
        source: Box<dyn ExecutionComponent>,
        distinct_type: DistinctType,
        last_hash: Option<u128>,
    ) -> Self {
        Self {
            base: ComponentBase::new(source),
            map: DistinctMap::new(distinct_type, last_hash),
        }
    }

    /// 解析本层续传令牌，返回上一条结果的哈希与源组件令牌
    pub fn resume_state(
        distinct_type: DistinctType,
        raw: Option<&str>,
    ) -> TokenResult<(Option<u128>, Option<String>)> {
        let Some(raw) = raw else {
            return Ok((None, None));
        };
        if distinct_type == DistinctType::Unordered {
            return Err(ContinuationTokenError::Unsupported {
                reason: "无序 DISTINCT 查询不支持续传令牌".to_string(),
            });
        }
        let token: DistinctToken = parse_layer(raw)?;
        let last_hash = match token.last_hash {
            None => None,
            Some(hex) => Some(u128::from_str_radix(&hex, 16).map_err(|e| {
                ContinuationTokenError::malformed(Some("lastHash"), raw, e.to_string())
            })?),
        };
        Ok((last_hash, Some(token.source_token)))
    }
}

#[async_trait]
impl ExecutionComponent for DistinctComponent {
    fn is_done(&self) -> bool {
        self.base.is_done()
    }

    async fn drain(
        &mut self,
        max_elements: usize,
        cancellation: &CancellationToken,
    ) -> PipelineResult<QueryResponse> {
        cancellation.check()?;
        if self.is_done() {
            return Ok(QueryResponse::default());
        }
        self.base.state.begin_drain();

        let mut response = self.base.source.drain(max_elements, cancellation).await?;
        let before = response.items.len();
        let map = &mut self.map;
        response.items.retain(|item| map.add(item));
        log::trace!("DISTINCT 过滤: {} -> {}", before, response.items.len());
        Ok(response)
    }

    fn stop(&mut self) {
        self.base.stop();
    }

    fn continuation_token(&self) -> ContinuationState {
        if self.is_done() {
            return ContinuationState::Done;
        }
        let last_hash = match &self.map {
            DistinctMap::Ordered { last_hash } => last_hash.map(|h| format!("{:032x}", h)),
            DistinctMap::Unordered { .. } => {
                return ContinuationState::Unsupported(
                    "无序 DISTINCT 查询不支持续传令牌".to_string(),
                )
            }
        };
        self.base
            .source
            .continuation_token()
            .map_token(|source_token| {
                serialize_layer(&DistinctToken {
                    last_hash,
                    source_token,
                })
            })
    }
}
