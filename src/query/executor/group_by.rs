//! GROUP BY 组件
//!
//! 改写后的每一行形如 `{"groupByItems": [...], "payload": ...}`。
//!
//! 执行分两个阶段：
//! 1. 分组阶段：每次 drain 从源组件取一批行并写入分组表，只返回空页（带费用统计）
//! 2. 输出阶段：源组件耗尽后，按分组键哈希的稳定顺序分页输出分组结果
//!
//! 分组键与 DISTINCT 使用同一个去重键 ([`DistinctMap::key_of`])。
//!
//! 分组表需要完整物化，因此整个过程都不支持续传令牌。

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, VecDeque};

use async_trait::async_trait;

use crate::core::error::{PipelineResult, QueryError};
use crate::core::{CancellationToken, Element};
use crate::query::executor::aggregators::SingleGroupAggregator;
use crate::query::executor::distinct::DistinctMap;
use crate::query::executor::traits::{
    ComponentBase, ContinuationState, ExecutionComponent, QueryResponse,
};
use crate::query::plan::{AggregateOperator, QueryInfo};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Grouping,
    Emitting,
}

/// 创建新分组所需的查询形状
#[derive(Debug, Clone)]
struct GroupShape {
    aggregates: Vec<AggregateOperator>,
    alias_to_aggregate: BTreeMap<String, Option<AggregateOperator>>,
    ordered_aliases: Vec<String>,
    has_select_value: bool,
}

pub struct GroupByComponent {
    base: ComponentBase,
    shape: GroupShape,
    table: BTreeMap<u128, SingleGroupAggregator>,
    results: VecDeque<Element>,
    phase: Phase,
}

impl GroupByComponent {
    pub fn new(source: Box<dyn ExecutionComponent>, info: &QueryInfo) -> PipelineResult<Self> {
        let shape = GroupShape {
            aggregates: info.aggregates.clone(),
            alias_to_aggregate: info.group_by_alias_to_aggregate_type.clone(),
            ordered_aliases: info.group_by_aliases.clone(),
            has_select_value: info.has_select_value,
        };
        // 提前校验查询形状，避免在第一行到达时才报错
        shape.new_group()?;
        Ok(Self {
            base: ComponentBase::new(source),
            shape,
            table: BTreeMap::new(),
            results: VecDeque::new(),
            phase: Phase::Grouping,
        })
    }

    pub fn group_count(&self) -> usize {
        self.table.len()
    }

    fn add_row(&mut self, row: &Element) -> PipelineResult<()> {
        let group_by_items = match row.get("groupByItems") {
            Some(items @ Element::Array(_)) => items,
            _ => {
                return Err(QueryError::InvalidArgument(
                    "GROUP BY 行缺少 groupByItems 数组".to_string(),
                )
                .into())
            }
        };
        let key = DistinctMap::key_of(group_by_items);
        let group = match self.table.entry(key) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(self.shape.new_group()?),
        };
        group.add_values(row.get("payload"))?;
        Ok(())
    }

    fn finish_grouping(&mut self) {
        self.results = self
            .table
            .values()
            .filter_map(SingleGroupAggregator::result)
            .collect();
        self.phase = Phase::Emitting;
        log::debug!(
            "GROUP BY 分组完成: {} 个分组, {} 行结果",
            self.table.len(),
            self.results.len()
        );
    }
}

impl GroupShape {
    fn new_group(&self) -> PipelineResult<SingleGroupAggregator> {
        Ok(SingleGroupAggregator::create(
            &self.aggregates,
            &self.alias_to_aggregate,
            &self.ordered_aliases,
            self.has_select_value,
        )?)
    }
}

#[async_trait]
impl ExecutionComponent for GroupByComponent {
    fn is_done(&self) -> bool {
        self.base.state.is_done()
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

        match self.phase {
            Phase::Grouping => {
                let mut response = QueryResponse::default();
                if !self.base.source.is_done() {
                    let page = self.base.source.drain(usize::MAX, cancellation).await?;
                    for row in &page.items {
                        self.add_row(row)?;
                    }
                    response.absorb_stats(page);
                }
                if self.base.source.is_done() {
                    self.finish_grouping();
                }
                Ok(response)
            }
            Phase::Emitting => {
                let take = max_elements.max(1).min(self.results.len());
                let items: Vec<Element> = self.results.drain(..take).collect();
                if self.results.is_empty() {
                    self.base.state.finish();
                }
                Ok(QueryResponse::new(items))
            }
        }
    }

    fn stop(&mut self) {
        self.base.stop();
    }

    fn continuation_token(&self) -> ContinuationState {
        if self.is_done() {
            ContinuationState::Done
        } else {
            ContinuationState::Unsupported("GROUP BY 查询不支持续传令牌".to_string())
        }
    }
}
