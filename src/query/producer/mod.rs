//! 分区拉取层
//!
//! - 外部数据源与分区映射接口 (`data_source.rs`)
//! - 结果页队列 (`page_queue.rs`)
//! - 分区拉取器 (`item_producer.rs`)

pub mod data_source;
pub mod item_producer;
pub mod page_queue;

pub use data_source::{PartitionMapResolver, QueryDataSource, QueryPage, QueryPageDiagnostics};
pub use item_producer::{
    ElementEquality, FetchCompletion, FetchCompletionCallback, ItemProducer, PageSizePolicy,
};
pub use page_queue::PageQueue;
