//! 跨分区查询执行
//!
//! - 分区范围与查询计划 (`range.rs`, `plan.rs`)
//! - 续传令牌模型 (`continuation/`)
//! - 分区拉取层 (`producer/`)
//! - 执行组件 (`executor/`)
//! - 跨分区编排 (`orchestrator/`)
//! - 对外入口 (`pipeline.rs`)

pub mod continuation;
pub mod executor;
pub mod orchestrator;
pub mod pipeline;
pub mod plan;
pub mod producer;
pub mod range;

pub use continuation::{
    CompositeContinuationToken, LatestContinuationToken, PipelineContinuationToken, Version,
};
pub use pipeline::{FeedResponse, QueryPipeline};
pub use plan::{AggregateOperator, DistinctType, QueryInfo, QueryPlan, QuerySpec, SortOrder};
pub use producer::{PartitionMapResolver, QueryDataSource, QueryPage, QueryPageDiagnostics};
pub use range::{PartitionKeyRange, PartitionRange, QueryRange};
