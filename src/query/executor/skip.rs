//! OFFSET 组件：跨页丢弃前 n 条结果

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::error::PipelineResult;
use crate::core::CancellationToken;
use crate::query::executor::token_layer::{checked_count, parse_layer, serialize_layer};
use crate::query::executor::traits::{
    ComponentBase, ContinuationState, ExecutionComponent, QueryResponse,
};

#[derive(Debug, Serialize, Deserialize)]
struct OffsetToken {
    #[serde(rename = "offsetCount")]
    offset_count: i64,
    #[serde(rename = "sourceToken")]
    source_token: String,
}

pub struct SkipComponent {
    base: ComponentBase,
    skip_count: u64,
}

impl SkipComponent {
    pub fn new(source: Box<dyn ExecutionComponent>, skip_count: u64) -> Self {
        Self {
            base: ComponentBase::new(source),
            skip_count,
        }
    }

    pub fn resume_state(original: u64, raw: Option<&str>) -> PipelineResult<(u64, Option<String>)> {
        let Some(raw) = raw else {
            return Ok((original, None));
        };
        let token: OffsetToken = parse_layer(raw)?;
        let remaining = checked_count("offsetCount", token.offset_count, original)?;
        Ok((remaining, Some(token.source_token)))
    }
}

#[async_trait]
impl ExecutionComponent for SkipComponent {
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
        let skipped = usize::try_from(self.skip_count)
            .unwrap_or(usize::MAX)
            .min(response.items.len());
        if skipped > 0 {
            response.items.drain(..skipped);
            self.skip_count -= skipped as u64;
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
        let offset_count = self.skip_count as i64;
        self.base
            .source
            .continuation_token()
            .map_token(|source_token| {
                serialize_layer(&OffsetToken {
                    offset_count,
                    source_token,
                })
            })
    }
}
