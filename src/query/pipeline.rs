//! 查询流水线
//!
//! 对外入口。创建流程：
//! 1. 解析续传令牌（先检查是否来自更高版本），升级到最新版本
//! 2. 查询计划优先使用调用方提供的，否则从令牌中恢复
//! 3. 校验查询形状，解析分区映射并按查询范围过滤
//! 4. 由外向内剥离各组件的令牌层，再由内向外构建组件链：
//!    叶子上下文 (Parallel | OrderBy) → Aggregate | GroupBy → Distinct → Skip → Limit → Top

use std::sync::Arc;

use crate::config::PipelineConfig;
use crate::core::error::{ContinuationTokenError, PipelineResult, QueryError};
use crate::core::{CancellationToken, Element};
use crate::query::continuation::{LatestContinuationToken, PipelineContinuationToken};
use crate::query::executor::{
    AggregateComponent, ContinuationState, DistinctComponent, ExecutionComponent,
    GroupByComponent, SkipComponent, TakeComponent, TakeKind,
};
use crate::query::orchestrator::{ContextParams, OrderByContext, ParallelContext};
use crate::query::plan::{QueryPlan, QuerySpec};
use crate::query::producer::{PartitionMapResolver, QueryDataSource, QueryPageDiagnostics};
use crate::query::range::filter_overlapping;

/// 返回给调用方的一页结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedResponse {
    pub items: Vec<Element>,
    pub request_charge: f64,
    pub response_length_bytes: i64,
    pub diagnostics: Vec<QueryPageDiagnostics>,
    /// 为 None 时要么已没有更多结果，要么当前阶段不支持续传（见 `disallow_continuation_reason`）
    pub continuation_token: Option<String>,
    pub disallow_continuation_reason: Option<String>,
}

pub struct QueryPipeline {
    root: Box<dyn ExecutionComponent>,
    query_plan: QueryPlan,
    config: PipelineConfig,
    cancellation: CancellationToken,
}

impl std::fmt::Debug for QueryPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryPipeline")
            .field("query_info", &self.query_plan.query_info)
            .field("is_done", &self.root.is_done())
            .finish()
    }
}

impl QueryPipeline {
    pub async fn create(
        config: &PipelineConfig,
        query: QuerySpec,
        query_plan: Option<QueryPlan>,
        data_source: Arc<dyn QueryDataSource>,
        resolver: Arc<dyn PartitionMapResolver>,
        collection: &str,
        continuation: Option<&str>,
    ) -> PipelineResult<Self> {
        let (query_plan, source_token) = match continuation.filter(|raw| !raw.is_empty()) {
            None => (query_plan, None),
            Some(raw) => {
                let token =
                    PipelineContinuationToken::parse_with_max_version(raw, config.max_known_token_version)?;
                log::debug!("续传令牌版本 {}", token.version());
                let latest = token.upgrade_to_latest();
                let source = Some(latest.source).filter(|s| !s.is_empty());
                (query_plan.or(latest.query_plan), source)
            }
        };
        let query_plan = query_plan.ok_or_else(|| {
            QueryError::InvalidArgument("既没有提供查询计划, 续传令牌中也没有".to_string())
        })?;
        let info = &query_plan.query_info;
        info.validate()?;

        let ranges = resolver.resolve_ranges(collection).await?;
        let ranges = filter_overlapping(ranges, &query_plan.query_ranges);
        log::info!(
            "创建跨分区查询流水线: collection={}, 分区数={}, order_by={}, aggregates={:?}, resumed={}",
            collection,
            ranges.len(),
            info.has_order_by(),
            info.aggregates,
            source_token.is_some()
        );

        // 由外向内剥离令牌层
        let (top, token) = match info.top {
            Some(top) => {
                let (remaining, inner) =
                    TakeComponent::resume_state(TakeKind::Top, top, source_token.as_deref())?;
                (Some(remaining), inner)
            }
            None => (None, source_token),
        };
        let (limit, token) = match info.limit {
            Some(limit) => {
                let (remaining, inner) =
                    TakeComponent::resume_state(TakeKind::Limit, limit, token.as_deref())?;
                (Some(remaining), inner)
            }
            None => (None, token),
        };
        let (offset, token) = match info.offset {
            Some(offset) => {
                let (remaining, inner) = SkipComponent::resume_state(offset, token.as_deref())?;
                (Some(remaining), inner)
            }
            None => (None, token),
        };
        let (last_hash, token) = if info.has_distinct() {
            DistinctComponent::resume_state(info.distinct_type, token.as_deref())?
        } else {
            (None, token)
        };
        if token.is_some() && (info.has_aggregates() || info.has_group_by()) {
            return Err(ContinuationTokenError::Unsupported {
                reason: "聚合与 GROUP BY 查询不支持续传令牌".to_string(),
            }
            .into());
        }

        // 由内向外构建组件链
        let params = ContextParams {
            config: config.clone(),
            query: query_plan.partition_query(&query),
            collection: collection.to_string(),
            data_source,
            resolver,
        };
        let mut root: Box<dyn ExecutionComponent> = if info.has_order_by() {
            Box::new(OrderByContext::create(
                params,
                ranges,
                info.order_by.clone(),
                token.as_deref(),
            )?)
        } else {
            Box::new(ParallelContext::create(params, ranges, token.as_deref())?)
        };

        if info.has_group_by() {
            root = Box::new(GroupByComponent::new(root, info)?);
        } else if info.has_aggregates() {
            root = Box::new(AggregateComponent::new(root, &info.aggregates)?);
        }
        if info.has_distinct() {
            root = Box::new(DistinctComponent::new(root, info.distinct_type, last_hash));
        }
        if let Some(offset) = offset {
            root = Box::new(SkipComponent::new(root, offset));
        }
        if let Some(limit) = limit {
            root = Box::new(TakeComponent::new(root, TakeKind::Limit, limit));
        }
        if let Some(top) = top {
            root = Box::new(TakeComponent::new(root, TakeKind::Top, top));
        }

        Ok(Self {
            root,
            query_plan,
            config: config.clone(),
            cancellation: CancellationToken::new(),
        })
    }

    /// 取下一页结果；可能返回空页（例如 GROUP BY 分组阶段），调用方应以 `has_more_results` 判断是否结束
    pub async fn next_page(&mut self) -> PipelineResult<FeedResponse> {
        let response = self
            .root
            .drain(self.config.max_item_count, &self.cancellation)
            .await?;

        let (continuation_token, disallow_continuation_reason) = match self.root.continuation_token() {
            ContinuationState::Token(source) => {
                let token = LatestContinuationToken::new(Some(self.query_plan.clone()), source);
                (
                    Some(token.serialize(self.config.continuation_token_size_limit_bytes)),
                    None,
                )
            }
            ContinuationState::Done => (None, None),
            ContinuationState::Unsupported(reason) => (None, Some(reason)),
        };

        log::debug!(
            "返回 {} 条结果, 费用 {:.2}, 有续传令牌={}",
            response.items.len(),
            response.request_charge,
            continuation_token.is_some()
        );
        Ok(FeedResponse {
            items: response.items,
            request_charge: response.request_charge,
            response_length_bytes: response.response_length_bytes,
            diagnostics: response.diagnostics,
            continuation_token,
            disallow_continuation_reason,
        })
    }

    pub fn has_more_results(&self) -> bool {
        !self.root.is_done()
    }

    /// 可从其他任务取消本流水线
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    pub fn query_plan(&self) -> &QueryPlan {
        &self.query_plan
    }

    /// 停止流水线，不再发起新的拉取
    pub fn stop(&mut self) {
        self.root.stop();
    }
}
