//! CrossQuery - 跨分区查询执行流水线
//!
//! 把一个逻辑查询扇出到多个后端分区，按分区缓冲并重排结果，合并与聚合部分结果，
//! 并把可恢复的执行状态编码进带版本的续传令牌。
//!
//! 后端查询执行和分区映射解析由调用方通过 [`query::QueryDataSource`] 与
//! [`query::PartitionMapResolver`] 提供。

pub mod config;
pub mod core;
pub mod query;
pub mod utils;

pub use crate::config::{Config, PipelineConfig};
pub use crate::core::{CancellationToken, Element, PipelineError, PipelineResult};
pub use crate::query::{FeedResponse, QueryPipeline};
