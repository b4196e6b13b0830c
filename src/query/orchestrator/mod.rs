//! 跨分区编排
//!
//! - 共享的分区拉取器集合、预取与拆分恢复 (`cross_partition.rs`)
//! - 无序并行上下文 (`parallel.rs`)
//! - ORDER BY 归并上下文 (`order_by.rs`)

pub mod cross_partition;
pub mod order_by;
pub mod parallel;

pub use cross_partition::{assign_tokens, ContextParams, CrossPartitionContext};
pub use order_by::OrderByContext;
pub use parallel::ParallelContext;
