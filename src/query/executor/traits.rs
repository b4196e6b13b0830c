//! 执行组件 trait 定义
//!
//! 所有执行组件（跨分区编排器与各装饰器）都实现 `ExecutionComponent`。
//! 装饰器持有一个 `source`，把 `stop` 与完成状态转发给它。

use async_trait::async_trait;

use crate::core::error::PipelineResult;
use crate::core::{CancellationToken, Element};
use crate::query::producer::QueryPageDiagnostics;

/// 一次 drain 的结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResponse {
    pub items: Vec<Element>,
    pub request_charge: f64,
    pub response_length_bytes: i64,
    pub diagnostics: Vec<QueryPageDiagnostics>,
}

impl QueryResponse {
    pub fn new(items: Vec<Element>) -> Self {
        Self {
            items,
            ..Default::default()
        }
    }

    /// 累加另一个响应的费用与诊断信息，不合并结果条目
    pub fn absorb_stats(&mut self, other: QueryResponse) {
        self.request_charge += other.request_charge;
        self.response_length_bytes += other.response_length_bytes;
        self.diagnostics.extend(other.diagnostics);
    }

    /// 用新的条目替换结果，保留统计信息
    pub fn with_items(mut self, items: Vec<Element>) -> Self {
        self.items = items;
        self
    }
}

/// 组件的续传状态
#[derive(Debug, Clone, PartialEq)]
pub enum ContinuationState {
    /// 可以从该令牌恢复
    Token(String),
    /// 已没有更多结果
    Done,
    /// 当前阶段无法生成续传令牌，附带原因
    Unsupported(String),
}

impl ContinuationState {
    /// 用当前组件的令牌层包装源组件令牌
    pub fn map_token<F>(self, wrap: F) -> ContinuationState
    where
        F: FnOnce(String) -> ContinuationState,
    {
        match self {
            ContinuationState::Token(token) => wrap(token),
            other => other,
        }
    }
}

/// 组件状态机：Active → Draining → Done，单向推进
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentState {
    Active,
    Draining,
    Done,
}

impl ComponentState {
    pub fn begin_drain(&mut self) {
        if *self == ComponentState::Active {
            *self = ComponentState::Draining;
        }
    }

    pub fn finish(&mut self) {
        *self = ComponentState::Done;
    }

    pub fn is_done(&self) -> bool {
        *self == ComponentState::Done
    }
}

/// 执行组件
#[async_trait]
pub trait ExecutionComponent: Send {
    /// 是否已不会再产出结果
    fn is_done(&self) -> bool;

    /// 取出最多 `max_elements` 条结果（聚合类组件可以忽略该上限）
    async fn drain(
        &mut self,
        max_elements: usize,
        cancellation: &CancellationToken,
    ) -> PipelineResult<QueryResponse>;

    /// 停止继续拉取；单向操作，已缓存的结果不丢弃
    fn stop(&mut self);

    /// 当前位置的续传状态
    fn continuation_token(&self) -> ContinuationState;
}

/// 装饰器共用的源组件与状态
pub struct ComponentBase {
    pub source: Box<dyn ExecutionComponent>,
    pub state: ComponentState,
}

impl ComponentBase {
    pub fn new(source: Box<dyn ExecutionComponent>) -> Self {
        Self {
            source,
            state: ComponentState::Active,
        }
    }

    pub fn is_done(&self) -> bool {
        self.state.is_done() || self.source.is_done()
    }

    /// 只停止上游拉取，源组件中已缓存的结果仍会被取出
    pub fn stop(&mut self) {
        self.source.stop();
    }
}
