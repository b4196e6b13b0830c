//! 并行（无序）跨分区上下文
//!
//! 按分区范围顺序逐个耗尽分区，每次 drain 输出第一个仍有结果的分区的一整页。
//! 续传令牌是仍有结果的分区的 composite 令牌数组。

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::error::PipelineResult;
use crate::core::{CancellationToken, Element};
use crate::query::continuation::{
    parse_composite_tokens, serialize_composite_tokens, CompositeContinuationToken,
};
use crate::query::executor::{ComponentState, ContinuationState, ExecutionComponent, QueryResponse};
use crate::query::orchestrator::cross_partition::{assign_tokens, ContextParams, CrossPartitionContext};
use crate::query::range::PartitionKeyRange;

pub struct ParallelContext {
    context: CrossPartitionContext,
    state: ComponentState,
}

impl ParallelContext {
    pub fn create(
        params: ContextParams,
        ranges: Vec<PartitionKeyRange>,
        continuation: Option<&str>,
    ) -> PipelineResult<Self> {
        let assignments = match continuation {
            Some(raw) => {
                let tokens = parse_composite_tokens(raw)?;
                assign_tokens(ranges, &tokens)?
            }
            None => ranges.into_iter().map(|range| (range, None)).collect(),
        };
        let context = CrossPartitionContext::new(
            params,
            Arc::new(|a: &Element, b: &Element| a == b),
            assignments,
        );
        let mut state = ComponentState::Active;
        if !context.has_more_results() {
            state.finish();
        }
        Ok(Self { context, state })
    }

    pub fn context(&self) -> &CrossPartitionContext {
        &self.context
    }
}

#[async_trait]
impl ExecutionComponent for ParallelContext {
    fn is_done(&self) -> bool {
        self.state.is_done() || !self.context.has_more_results()
    }

    async fn drain(
        &mut self,
        _max_elements: usize,
        cancellation: &CancellationToken,
    ) -> PipelineResult<QueryResponse> {
        cancellation.check()?;
        if self.is_done() {
            return Ok(self.context.take_response(Vec::new()));
        }
        self.state.begin_drain();
        self.context.prefetch(cancellation).await?;

        let mut items = Vec::new();
        loop {
            let next = self
                .context
                .producers()
                .iter()
                .position(|p| p.has_more_results());
            let Some(index) = next else {
                break;
            };
            if !self.context.move_next_page(index, cancellation).await? {
                continue;
            }
            let Some(producer) = self.context.producer(index) else {
                break;
            };
            while producer.try_move_next_document_within_page() {
                if let Some(item) = producer.current() {
                    items.push(item);
                }
            }
            break;
        }

        if !self.context.has_more_results() {
            log::debug!("并行查询的所有分区均已耗尽");
            self.state.finish();
        }
        Ok(self.context.take_response(items))
    }

    fn stop(&mut self) {
        self.context.stop();
    }

    fn continuation_token(&self) -> ContinuationState {
        if self.is_done() {
            return ContinuationState::Done;
        }
        if self.context.is_stopped() {
            return ContinuationState::Unsupported("查询已停止, 剩余结果无法续传".to_string());
        }
        let tokens: Vec<CompositeContinuationToken> = self
            .context
            .producers()
            .iter()
            .filter(|p| p.has_more_results())
            .map(|p| CompositeContinuationToken::new(p.current_continuation_token(), p.range().range()))
            .collect();
        ContinuationState::Token(serialize_composite_tokens(&tokens))
    }
}
