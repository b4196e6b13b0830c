//! ORDER BY 跨分区归并上下文
//!
//! 改写后的每一行形如 `{"orderByItems": [{"item": v}, ...], "payload": p}`，各分区内部已排好序。
//! 每一步选出当前行排序键最小的分区（同键时分区范围 `min` 较小者优先），输出其 `payload`。
//!
//! ## 续传
//!
//! 令牌记录最后输出的排序键、输出它的分区范围（目标分区）、目标分区当前页中已输出的同键条数，
//! 以及每个仍有结果的分区重新拉取当前页所需的 composite 令牌。恢复时在客户端过滤：
//! - 目标分区左侧的分区只保留排序键 `>` 记录值的行
//! - 目标分区跳过 `<` 记录值的行，以及前 `skipCount` 条 `==` 记录值的行
//! - 目标分区右侧的分区保留 `>=` 记录值的行

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::error::{ContinuationTokenError, PipelineResult, QueryError, TokenResult};
use crate::core::{CancellationToken, Element, ItemComparer};
use crate::query::continuation::CompositeContinuationToken;
use crate::query::executor::token_layer::{parse_layer, serialize_layer};
use crate::query::executor::{ComponentState, ContinuationState, ExecutionComponent, QueryResponse};
use crate::query::orchestrator::cross_partition::{assign_tokens, ContextParams, CrossPartitionContext};
use crate::query::plan::SortOrder;
use crate::query::producer::ItemProducer;
use crate::query::range::{PartitionKeyRange, PartitionRange};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderByToken {
    composite_tokens: Vec<CompositeContinuationToken>,
    order_by_items: Vec<Element>,
    target_range: PartitionRange,
    skip_count: u64,
}

/// 最近一次输出的位置
#[derive(Debug, Clone)]
struct EmitRecord {
    order_by_items: Vec<Element>,
    range: PartitionRange,
    skip_count: u64,
    page_index: u64,
}

/// 分区相对目标分区的位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RelativePosition {
    Left,
    Target,
    Right,
}

/// 恢复时的过滤条件
#[derive(Debug, Clone)]
struct ResumeFilter {
    order_by_items: Vec<Element>,
    target_range: PartitionRange,
    skip_count: u64,
}

impl ResumeFilter {
    fn position_of(&self, range: &PartitionRange) -> RelativePosition {
        if range.max <= self.target_range.min {
            RelativePosition::Left
        } else if range.min >= self.target_range.max {
            RelativePosition::Right
        } else {
            RelativePosition::Target
        }
    }
}

/// 单个分区的过滤进度；一旦有行通过过滤，之后的行都不再需要过滤
#[derive(Debug, Clone, Copy)]
struct FilterProgress {
    passed: bool,
    skip_remaining: u64,
}

pub struct OrderByContext {
    context: CrossPartitionContext,
    sort_orders: Arc<Vec<SortOrder>>,
    state: ComponentState,
    last_emit: Option<EmitRecord>,
    resume: Option<ResumeFilter>,
    filter_progress: HashMap<PartitionRange, FilterProgress>,
}

impl OrderByContext {
    pub fn create(
        params: ContextParams,
        ranges: Vec<PartitionKeyRange>,
        sort_orders: Vec<SortOrder>,
        continuation: Option<&str>,
    ) -> PipelineResult<Self> {
        if sort_orders.is_empty() {
            return Err(QueryError::UnsupportedQueryShape(
                "ORDER BY 上下文需要至少一个排序列".to_string(),
            )
            .into());
        }
        let sort_orders = Arc::new(sort_orders);

        let (assignments, resume) = match continuation {
            None => (ranges.into_iter().map(|range| (range, None)).collect(), None),
            Some(raw) => {
                let token = parse_order_by_token(raw, sort_orders.len())?;
                let assignments = assign_tokens(ranges, &token.composite_tokens)?;
                let resume = if token.order_by_items.is_empty() {
                    None
                } else {
                    Some(ResumeFilter {
                        order_by_items: token.order_by_items,
                        target_range: token.target_range,
                        skip_count: token.skip_count,
                    })
                };
                (assignments, resume)
            }
        };

        let equality_orders = sort_orders.clone();
        let context = CrossPartitionContext::new(
            params,
            Arc::new(move |a: &Element, b: &Element| {
                match (order_by_items(a), order_by_items(b)) {
                    (Some(a), Some(b)) => compare_keys(a, b, &equality_orders) == Ordering::Equal,
                    _ => false,
                }
            }),
            assignments,
        );

        // 恢复后的第一次输出若仍是目标分区的同键行，计数从令牌中的值继续
        let last_emit = resume.as_ref().map(|filter| EmitRecord {
            order_by_items: filter.order_by_items.clone(),
            range: filter.target_range.clone(),
            skip_count: filter.skip_count,
            page_index: 1,
        });

        let mut state = ComponentState::Active;
        if !context.has_more_results() {
            state.finish();
        }
        Ok(Self {
            context,
            sort_orders,
            state,
            last_emit,
            resume,
            filter_progress: HashMap::new(),
        })
    }

    /// 让指定分区的游标停在下一条通过恢复过滤的行上
    async fn position(&mut self, index: usize, cancellation: &CancellationToken) -> PipelineResult<()> {
        loop {
            let Some(producer) = self.context.producer(index) else {
                return Ok(());
            };
            match producer.current() {
                Some(row) => {
                    if self.passes_resume_filter(&producer, &row)? {
                        return Ok(());
                    }
                    producer.try_move_next_document_within_page();
                }
                None => {
                    if producer.try_move_next_document_within_page() {
                        continue;
                    }
                    if !producer.has_more_results() {
                        return Ok(());
                    }
                    if !self.context.move_next_page(index, cancellation).await? {
                        return Ok(());
                    }
                }
            }
        }
    }

    fn passes_resume_filter(&mut self, producer: &ItemProducer, row: &Element) -> PipelineResult<bool> {
        let Some(filter) = &self.resume else {
            return Ok(true);
        };
        let range = producer.range().range();
        if !self.filter_progress.contains_key(&range) {
            let inherited = inherited_progress(&self.filter_progress, &range, filter.skip_count);
            self.filter_progress.insert(range.clone(), inherited);
        }
        let Some(progress) = self.filter_progress.get_mut(&range) else {
            return Ok(true);
        };
        if progress.passed {
            return Ok(true);
        }

        let items = require_order_by_items(row)?;
        let ordering = compare_keys(items, &filter.order_by_items, &self.sort_orders);
        let passes = match filter.position_of(&range) {
            RelativePosition::Left => ordering == Ordering::Greater,
            RelativePosition::Right => ordering != Ordering::Less,
            RelativePosition::Target => match ordering {
                Ordering::Less => false,
                Ordering::Equal if progress.skip_remaining > 0 => {
                    progress.skip_remaining -= 1;
                    false
                }
                _ => true,
            },
        };
        if passes {
            progress.passed = true;
        } else {
            log::trace!("分区 {} 恢复过滤跳过一行", range);
        }
        Ok(passes)
    }

    /// 在已定位的分区中选出排序最靠前的一个
    fn select_next(&self) -> PipelineResult<Option<(usize, Element)>> {
        let mut best: Option<(usize, Element)> = None;
        for (index, producer) in self.context.producers().iter().enumerate() {
            let Some(row) = producer.current() else {
                continue;
            };
            let replace = match &best {
                None => true,
                Some((_, best_row)) => {
                    let candidate = require_order_by_items(&row)?;
                    let current = require_order_by_items(best_row)?;
                    compare_keys(candidate, current, &self.sort_orders) == Ordering::Less
                }
            };
            if replace {
                best = Some((index, row));
            }
        }
        Ok(best)
    }

    fn record_emit(&mut self, producer: &ItemProducer, row: &Element) -> PipelineResult<()> {
        let items = require_order_by_items(row)?.to_vec();
        let range = producer.range().range();
        let page_index = producer.page_index();
        let continues_run = match &self.last_emit {
            Some(last) => {
                last.range == range
                    && last.page_index == page_index
                    && !producer.is_at_beginning_of_page()
                    && compare_keys(&last.order_by_items, &items, &self.sort_orders)
                        == Ordering::Equal
            }
            None => false,
        };
        let skip_count = match (&self.last_emit, continues_run) {
            (Some(last), true) => last.skip_count + 1,
            _ => 1,
        };
        self.last_emit = Some(EmitRecord {
            order_by_items: items,
            range,
            skip_count,
            page_index,
        });
        Ok(())
    }

    fn composite_token_for(&self, producer: &ItemProducer) -> CompositeContinuationToken {
        // 游标停在某行上时需要重新拉取当前页，否则从下一页开始
        let token = if producer.current().is_some() {
            producer.previous_continuation_token()
        } else {
            producer.current_continuation_token()
        };
        CompositeContinuationToken::new(token, producer.range().range())
    }
}

#[async_trait]
impl ExecutionComponent for OrderByContext {
    fn is_done(&self) -> bool {
        self.state.is_done() || !self.context.has_more_results()
    }

    async fn drain(
        &mut self,
        max_elements: usize,
        cancellation: &CancellationToken,
    ) -> PipelineResult<QueryResponse> {
        cancellation.check()?;
        if self.is_done() {
            return Ok(self.context.take_response(Vec::new()));
        }
        self.state.begin_drain();
        self.context.prefetch(cancellation).await?;

        let mut items = Vec::new();
        while items.len() < max_elements.max(1) {
            cancellation.check()?;
            let mut index = 0;
            while index < self.context.len() {
                self.position(index, cancellation).await?;
                index += 1;
            }

            let Some((index, row)) = self.select_next()? else {
                break;
            };
            let Some(producer) = self.context.producer(index) else {
                break;
            };
            self.record_emit(&producer, &row)?;
            match row.get("payload") {
                Some(payload) => items.push(payload.clone()),
                None => log::trace!("分区 {} 的行没有 payload, 按 undefined 跳过", producer.range().id),
            }
            producer.try_move_next_document_within_page();
        }

        if !self.context.has_more_results() {
            log::debug!("ORDER BY 查询的所有分区均已耗尽");
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
        let composite_tokens: Vec<CompositeContinuationToken> = self
            .context
            .producers()
            .iter()
            .filter(|p| p.has_more_results())
            .map(|p| self.composite_token_for(p))
            .collect();

        let token = match &self.last_emit {
            None => OrderByToken {
                composite_tokens,
                order_by_items: Vec::new(),
                target_range: self
                    .context
                    .producers()
                    .first()
                    .map(|p| p.range().range())
                    .unwrap_or_else(PartitionRange::full),
                skip_count: 0,
            },
            Some(last) => {
                let target = self
                    .context
                    .producers()
                    .iter()
                    .find(|p| p.range().range() == last.range);
                // 目标分区仍停在输出时所在的页上，恢复时才需要跳过同键行
                let skip_count = match target {
                    Some(p) if p.page_index() == 0 => last.skip_count,
                    Some(p) if p.page_index() == last.page_index && p.current().is_some() => {
                        last.skip_count
                    }
                    _ => 0,
                };
                OrderByToken {
                    composite_tokens,
                    order_by_items: last.order_by_items.clone(),
                    target_range: last.range.clone(),
                    skip_count,
                }
            }
        };
        serialize_layer(&token)
    }
}

/// 拆分出的子分区沿用包含它的父分区的过滤进度
fn inherited_progress(
    progress: &HashMap<PartitionRange, FilterProgress>,
    range: &PartitionRange,
    skip_count: u64,
) -> FilterProgress {
    progress
        .iter()
        .filter(|(parent, _)| *parent != range && parent.contains(range))
        .fold(
            FilterProgress {
                passed: false,
                skip_remaining: skip_count,
            },
            |acc, (_, parent)| FilterProgress {
                passed: acc.passed || parent.passed,
                skip_remaining: acc.skip_remaining.min(parent.skip_remaining),
            },
        )
}

fn parse_order_by_token(raw: &str, columns: usize) -> TokenResult<OrderByToken> {
    let token: OrderByToken = parse_layer(raw)?;
    if token.composite_tokens.is_empty() {
        return Err(ContinuationTokenError::malformed(
            Some("compositeTokens"),
            raw,
            "composite 令牌数组为空",
        ));
    }
    if !token.order_by_items.is_empty() && token.order_by_items.len() != columns {
        return Err(ContinuationTokenError::malformed(
            Some("orderByItems"),
            raw,
            format!(
                "排序键有 {} 列, 查询有 {} 个排序列",
                token.order_by_items.len(),
                columns
            ),
        ));
    }
    if token.target_range.is_empty() {
        return Err(ContinuationTokenError::malformed(
            Some("targetRange"),
            raw,
            "目标分区范围为空",
        ));
    }
    Ok(token)
}

fn order_by_items(row: &Element) -> Option<&[Element]> {
    row.get("orderByItems").and_then(Element::as_array)
}

fn require_order_by_items(row: &Element) -> PipelineResult<&[Element]> {
    order_by_items(row).ok_or_else(|| {
        QueryError::InvalidArgument("ORDER BY 行缺少 orderByItems 数组".to_string()).into()
    })
}

/// 按各列排序方向比较两行的排序键，每列是 `{"item": v}`
fn compare_keys(left: &[Element], right: &[Element], sort_orders: &[SortOrder]) -> Ordering {
    for (index, order) in sort_orders.iter().enumerate() {
        let a = left.get(index).and_then(Element::unwrap_item);
        let b = right.get(index).and_then(Element::unwrap_item);
        let ordering = ItemComparer::compare(a, b);
        let ordering = match order {
            SortOrder::Ascending => ordering,
            SortOrder::Descending => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}
