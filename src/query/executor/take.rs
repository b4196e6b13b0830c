//! TOP / LIMIT 组件
//!
//! 维护剩余条数，截断超出部分；剩余为 0 时停止源组件，之后不再发起任何拉取。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::error::PipelineResult;
use crate::core::CancellationToken;
use crate::query::executor::token_layer::{checked_count, parse_layer, serialize_layer};
use crate::query::executor::traits::{
    ComponentBase, ContinuationState, ExecutionComponent, QueryResponse,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TakeKind {
    Top,
    Limit,
}

impl TakeKind {
    fn field(&self) -> &'static str {
        match self {
            TakeKind::Top => "top",
            TakeKind::Limit => "limit",
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct TopToken {
    top: i64,
    #[serde(rename = "sourceToken")]
    source_token: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct LimitToken {
    limit: i64,
    #[serde(rename = "sourceToken")]
    source_token: String,
}

pub struct TakeComponent {
    base: ComponentBase,
    kind: TakeKind,
    remaining: u64,
}

impl TakeComponent {
    pub fn new(source: Box<dyn ExecutionComponent>, kind: TakeKind, remaining: u64) -> Self {
        let mut component = Self {
            base: ComponentBase::new(source),
            kind,
            remaining,
        };
        if remaining == 0 {
            component.base.stop();
        }
        component
    }

    /// 解析本层续传令牌，返回剩余条数和源组件令牌
    pub fn resume_state(
        kind: TakeKind,
        original: u64,
        raw: Option<&str>,
    ) -> PipelineResult<(u64, Option<String>)> {
        let Some(raw) = raw else {
            return Ok((original, None));
        };
        let (count, source_token) = match kind {
            TakeKind::Top => {
                let token: TopToken = parse_layer(raw)?;
                (token.top, token.source_token)
            }
            TakeKind::Limit => {
                let token: LimitToken = parse_layer(raw)?;
                (token.limit, token.source_token)
            }
        };
        let remaining = checked_count(kind.field(), count, original)?;
        Ok((remaining, Some(source_token)))
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }
}

#[async_trait]
impl ExecutionComponent for TakeComponent {
    fn is_done(&self) -> bool {
        self.remaining == 0 || self.base.is_done()
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

        let budget = usize::try_from(self.remaining).unwrap_or(usize::MAX);
        let mut response = self
            .base
            .source
            .drain(max_elements.min(budget), cancellation)
            .await?;
        if response.items.len() > budget {
            response.items.truncate(budget);
        }
        self.remaining -= response.items.len() as u64;

        if self.remaining == 0 {
            log::debug!("{} 已取满, 停止源组件", self.kind.field());
            self.base.stop();
        }
        Ok(response)
    }

    fn stop(&mut self) {
        self.base.stop();
    }

    fn continuation_token(&self) -> ContinuationState {
        if self.is_done() {
            return ContinuationState::Done;
        }
        let remaining = self.remaining as i64;
        self.base
            .source
            .continuation_token()
            .map_token(|source_token| match self.kind {
                TakeKind::Top => serialize_layer(&TopToken {
                    top: remaining,
                    source_token,
                }),
                TakeKind::Limit => serialize_layer(&LimitToken {
                    limit: remaining,
                    source_token,
                }),
            })
    }
}
