//! 跨分区上下文
//!
//! 持有按分区范围 `min` 排序的拉取器列表，负责：
//! - 带背压的并发预取（信号量限制同时在途的拉取数）
//! - 汇总拉取完成回调中的请求费用与诊断信息
//! - 分区拆分恢复：用子分区拉取器替换已失效的分区
//! - 把续传令牌中的分区范围映射到当前分区映射

use std::sync::Arc;

use futures::future::join_all;
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use crate::config::PipelineConfig;
use crate::core::error::{
    ContinuationTokenError, FetchFailure, PipelineError, PipelineResult, TokenResult,
};
use crate::core::{CancellationToken, Element};
use crate::query::continuation::CompositeContinuationToken;
use crate::query::executor::QueryResponse;
use crate::query::plan::QuerySpec;
use crate::query::producer::{
    ElementEquality, FetchCompletion, ItemProducer, PageSizePolicy, PartitionMapResolver,
    QueryDataSource, QueryPageDiagnostics,
};
use crate::query::range::PartitionKeyRange;

/// 构造跨分区上下文所需的外部依赖
#[derive(Clone)]
pub struct ContextParams {
    pub config: PipelineConfig,
    pub query: QuerySpec,
    pub collection: String,
    pub data_source: Arc<dyn QueryDataSource>,
    pub resolver: Arc<dyn PartitionMapResolver>,
}

/// 一次 drain 期间累计的费用统计
#[derive(Debug, Default)]
struct ChargeTracker {
    request_charge: f64,
    response_bytes: i64,
    diagnostics: Vec<QueryPageDiagnostics>,
}

impl ChargeTracker {
    fn record(&mut self, completion: FetchCompletion) {
        self.request_charge += completion.request_charge;
        self.response_bytes += completion.response_bytes;
        self.diagnostics.push(completion.diagnostics);
    }
}

pub struct CrossPartitionContext {
    query: QuerySpec,
    collection: String,
    data_source: Arc<dyn QueryDataSource>,
    resolver: Arc<dyn PartitionMapResolver>,
    page_size_policy: PageSizePolicy,
    max_buffered_item_count: usize,
    semaphore: Arc<Semaphore>,
    equality: ElementEquality,
    tracker: Arc<Mutex<ChargeTracker>>,
    producers: Vec<Arc<ItemProducer>>,
    stopped: bool,
}

impl CrossPartitionContext {
    pub fn new(
        params: ContextParams,
        equality: ElementEquality,
        assignments: Vec<(PartitionKeyRange, Option<String>)>,
    ) -> Self {
        let mut context = Self {
            page_size_policy: PageSizePolicy::from(&params.config),
            max_buffered_item_count: params.config.max_buffered_item_count,
            semaphore: Arc::new(Semaphore::new(params.config.max_concurrency.max(1))),
            query: params.query,
            collection: params.collection,
            data_source: params.data_source,
            resolver: params.resolver,
            equality,
            tracker: Arc::new(Mutex::new(ChargeTracker::default())),
            producers: Vec::with_capacity(assignments.len()),
            stopped: false,
        };
        let producers: Vec<Arc<ItemProducer>> = assignments
            .into_iter()
            .map(|(range, token)| context.create_producer(range, token))
            .collect();
        context.producers = producers;
        context
            .producers
            .sort_by(|a, b| a.range().range().cmp_by_min(&b.range().range()));
        log::debug!("跨分区上下文创建完成, {} 个分区", context.producers.len());
        context
    }

    fn create_producer(&self, range: PartitionKeyRange, token: Option<String>) -> Arc<ItemProducer> {
        let tracker = self.tracker.clone();
        let producer = Arc::new(ItemProducer::new(
            range,
            self.query.clone(),
            self.data_source.clone(),
            token,
            self.page_size_policy,
            Arc::new(move |completion: FetchCompletion| tracker.lock().record(completion)),
            self.equality.clone(),
        ));
        if self.stopped {
            producer.stop();
        }
        producer
    }

    /// 停止所有拉取器的后续拉取，已缓存的页继续可用
    pub fn stop(&mut self) {
        self.stopped = true;
        for producer in &self.producers {
            producer.stop();
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn producers(&self) -> &[Arc<ItemProducer>] {
        &self.producers
    }

    pub fn producer(&self, index: usize) -> Option<Arc<ItemProducer>> {
        self.producers.get(index).cloned()
    }

    pub fn len(&self) -> usize {
        self.producers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.producers.is_empty()
    }

    pub fn has_more_results(&self) -> bool {
        self.producers.iter().any(|p| p.has_more_results())
    }

    pub fn total_buffered_item_count(&self) -> i64 {
        self.producers.iter().map(|p| p.buffered_item_count()).sum()
    }

    /// 为缓冲区为空且仍有后端结果的拉取器并发预取一页
    ///
    /// 总缓冲条数达到上限时跳过本轮预取。
    pub async fn prefetch(&self, cancellation: &CancellationToken) -> PipelineResult<()> {
        cancellation.check()?;
        if self.stopped {
            return Ok(());
        }
        let buffered = self.total_buffered_item_count();
        if buffered >= self.max_buffered_item_count as i64 {
            log::trace!(
                "已缓冲 {} 条结果, 达到上限 {}, 跳过预取",
                buffered,
                self.max_buffered_item_count
            );
            return Ok(());
        }

        let candidates: Vec<&Arc<ItemProducer>> = self
            .producers
            .iter()
            .filter(|p| {
                p.has_more_results()
                    && p.has_more_backend_results()
                    && p.buffered_page_count() == 0
                    && !p.has_hit_failure()
            })
            .collect();
        if candidates.is_empty() {
            return Ok(());
        }

        let semaphore = &self.semaphore;
        let results = join_all(candidates.into_iter().map(|producer| async move {
            let _permit = match semaphore.acquire().await {
                Ok(permit) => permit,
                Err(e) => {
                    return Err(PipelineError::invalid_operation(format!(
                        "预取信号量已关闭: {}",
                        e
                    )))
                }
            };
            producer.buffer_more(cancellation).await
        }))
        .await;
        results.into_iter().collect()
    }

    /// 让指定拉取器切换到下一页，遇到分区拆分时替换为子分区后重试
    ///
    /// 拆分后 `index` 位置是第一个子分区。
    pub async fn move_next_page(
        &mut self,
        index: usize,
        cancellation: &CancellationToken,
    ) -> PipelineResult<bool> {
        loop {
            let Some(producer) = self.producer(index) else {
                return Ok(false);
            };
            match producer.try_move_next_page(cancellation).await {
                Err(PipelineError::Fetch(failure)) if failure.is_partition_gone() => {
                    self.split(index, failure).await?;
                }
                other => return other,
            }
        }
    }

    async fn split(&mut self, index: usize, failure: FetchFailure) -> PipelineResult<()> {
        let Some(parent) = self.producer(index) else {
            return Err(failure.into());
        };
        let parent_range = parent.range().clone();
        let mut children = self
            .resolver
            .resolve_overlapping_ranges(&self.collection, &parent_range.range())
            .await?;
        children.sort_by(|a, b| a.range().cmp_by_min(&b.range()));

        let unchanged = children.is_empty()
            || (children.len() == 1 && children[0].range() == parent_range.range());
        if unchanged {
            log::warn!(
                "分区 {} 已失效, 但分区映射中没有新的子分区",
                parent_range.id
            );
            return Err(failure.into());
        }

        let token = parent.backend_continuation_token();
        log::info!(
            "分区 {} {} 已拆分为 {:?}, 子分区从续传令牌 {:?} 继续",
            parent_range.id,
            parent_range.range(),
            children.iter().map(|c| c.id.as_str()).collect::<Vec<_>>(),
            token
        );
        let replacements: Vec<Arc<ItemProducer>> = children
            .into_iter()
            .map(|child| self.create_producer(child, token.clone()))
            .collect();
        self.producers.splice(index..=index, replacements);
        Ok(())
    }

    /// 取出并清零本次 drain 期间累计的费用与诊断
    pub fn take_response(&self, items: Vec<Element>) -> QueryResponse {
        let tracker = std::mem::take(&mut *self.tracker.lock());
        QueryResponse {
            items,
            request_charge: tracker.request_charge,
            response_length_bytes: tracker.response_bytes,
            diagnostics: tracker.diagnostics,
        }
    }
}

/// 把续传令牌中的分区范围映射到当前分区
///
/// - 当前分区被某个令牌范围包含（未变化或拆分后的子分区）时继承该令牌
/// - 当前分区与令牌范围相交但不被包含时说明发生了合并，无法恢复
/// - 与所有令牌范围都不相交的分区在上次执行中已完成
pub fn assign_tokens(
    ranges: Vec<PartitionKeyRange>,
    tokens: &[CompositeContinuationToken],
) -> TokenResult<Vec<(PartitionKeyRange, Option<String>)>> {
    let mut assignments = Vec::new();
    for range in ranges {
        let current = range.range();
        if let Some(token) = tokens.iter().find(|t| t.range.contains(&current)) {
            assignments.push((range, token.token.clone()));
            continue;
        }
        if let Some(token) = tokens.iter().find(|t| t.range.overlaps(&current)) {
            return Err(ContinuationTokenError::Unsupported {
                reason: format!(
                    "分区 {} 横跨续传令牌范围 {}, 合并后的分区无法恢复",
                    current, token.range
                ),
            });
        }
    }
    Ok(assignments)
}
