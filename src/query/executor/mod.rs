//! 执行组件
//!
//! 跨分区编排器之上的装饰器链：
//! - 聚合 (`aggregate.rs`) 与累加器 (`aggregators.rs`)
//! - 分组 (`group_by.rs`)
//! - 去重 (`distinct.rs`)
//! - OFFSET (`skip.rs`) 与 TOP/LIMIT (`take.rs`)

pub mod aggregate;
pub mod aggregators;
pub mod distinct;
pub mod group_by;
pub mod skip;
pub mod take;
pub mod token_layer;
pub mod traits;

pub use aggregate::AggregateComponent;
pub use aggregators::{AggregateValue, Aggregator, SingleGroupAggregator};
pub use distinct::{DistinctComponent, DistinctMap};
pub use group_by::GroupByComponent;
pub use skip::SkipComponent;
pub use take::{TakeComponent, TakeKind};
pub use traits::{
    ComponentBase, ComponentState, ContinuationState, ExecutionComponent, QueryResponse,
};
