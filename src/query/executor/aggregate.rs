//! 聚合组件
//!
//! 处理不带 GROUP BY 的 `SELECT VALUE <AGG>(...)`。每个分区返回 `{"item": 部分结果}`，
//! 组件一次性耗尽源组件，合并后最多产出一行。

use async_trait::async_trait;

use crate::core::error::{PipelineError, PipelineResult};
use crate::core::CancellationToken;
use crate::query::executor::aggregators::Aggregator;
use crate::query::executor::traits::{
    ComponentBase, ContinuationState, ExecutionComponent, QueryResponse,
};
use crate::query::plan::AggregateOperator;

pub struct AggregateComponent {
    base: ComponentBase,
    aggregator: Aggregator,
}

impl AggregateComponent {
    pub fn new(
        source: Box<dyn ExecutionComponent>,
        aggregates: &[AggregateOperator],
    ) -> PipelineResult<Self> {
        let operator = match aggregates {
            [operator] => *operator,
            _ => {
                return Err(PipelineError::unsupported_query(format!(
                    "聚合组件需要恰好一个聚合函数, 实际为 {:?}",
                    aggregates
                )))
            }
        };
        Ok(Self {
            base: ComponentBase::new(source),
            aggregator: Aggregator::new(operator),
        })
    }
}

#[async_trait]
impl ExecutionComponent for AggregateComponent {
    fn is_done(&self) -> bool {
        self.base.state.is_done()
    }

    async fn drain(
        &mut self,
        _max_elements: usize,
        cancellation: &CancellationToken,
    ) -> PipelineResult<QueryResponse> {
        cancellation.check()?;
        if self.is_done() {
            return Ok(QueryResponse::default());
        }
        self.base.state.begin_drain();

        let mut response = QueryResponse::default();
        while !self.base.source.is_done() {
            let page = self.base.source.drain(usize::MAX, cancellation).await?;
            for row in &page.items {
                self.aggregator.add(row.unwrap_item());
            }
            response.absorb_stats(page);
        }

        self.base.state.finish();
        let result = self.aggregator.result();
        log::debug!(
            "{:?} 聚合完成, 结果{}",
            self.aggregator.operator(),
            if result.is_some() { "已定义" } else { "为 undefined" }
        );
        Ok(response.with_items(result.into_iter().collect()))
    }

    fn stop(&mut self) {
        self.base.stop();
    }

    fn continuation_token(&self) -> ContinuationState {
        if self.is_done() {
            ContinuationState::Done
        } else {
            ContinuationState::Unsupported("聚合查询不支持续传令牌".to_string())
        }
    }
}
