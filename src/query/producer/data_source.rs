//! 外部协作方接口
//!
//! 后端查询执行与分区映射解析都由调用方提供。传输层重试在数据源内部完成，
//! 到达这里的失败对本次拉取而言是终态。

use async_trait::async_trait;

use crate::core::error::FetchFailure;
use crate::core::Element;
use crate::query::plan::QuerySpec;
use crate::query::range::{PartitionKeyRange, PartitionRange};

/// 一次后端往返返回的结果页
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPage {
    pub documents: Vec<Element>,
    /// 请求费用，必须非负
    pub request_charge: f64,
    pub activity_id: String,
    /// 响应字节数，必须非负
    pub response_bytes: i64,
    /// 为 None 表示该分区已耗尽，这是唯一权威的结束信号
    pub continuation_token: Option<String>,
    /// 后端返回的执行指标，原样透传
    pub execution_info: Option<String>,
}

impl QueryPage {
    pub fn new(documents: Vec<Element>, continuation_token: Option<String>) -> Self {
        Self {
            documents,
            request_charge: 0.0,
            activity_id: String::new(),
            response_bytes: 0,
            continuation_token,
            execution_info: None,
        }
    }

    pub fn with_request_charge(mut self, request_charge: f64) -> Self {
        self.request_charge = request_charge;
        self
    }

    pub fn with_activity_id(mut self, activity_id: impl Into<String>) -> Self {
        self.activity_id = activity_id.into();
        self
    }

    pub fn with_response_bytes(mut self, response_bytes: i64) -> Self {
        self.response_bytes = response_bytes;
        self
    }

    /// 检查响应是否违反接口约定
    pub fn contract_violation(&self) -> Option<String> {
        if !(self.request_charge >= 0.0) {
            return Some(format!("请求费用为负数或非数值: {}", self.request_charge));
        }
        if self.response_bytes < 0 {
            return Some(format!("响应字节数为负数: {}", self.response_bytes));
        }
        None
    }
}

/// 单页拉取的诊断信息
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPageDiagnostics {
    pub partition_range_id: String,
    pub activity_id: String,
    pub request_charge: f64,
    pub item_count: usize,
    pub response_bytes: i64,
}

/// 查询数据源
#[async_trait]
pub trait QueryDataSource: Send + Sync {
    /// 在一个分区范围上执行一次查询往返
    async fn execute_query(
        &self,
        query: &QuerySpec,
        continuation: Option<&str>,
        range: &PartitionKeyRange,
        page_size: usize,
    ) -> Result<QueryPage, FetchFailure>;
}

/// 分区映射解析器
#[async_trait]
pub trait PartitionMapResolver: Send + Sync {
    /// 集合当前的完整分区映射
    async fn resolve_ranges(&self, collection: &str) -> Result<Vec<PartitionKeyRange>, FetchFailure>;

    /// 与给定范围相交的当前分区（拆分后用于查找子分区）
    async fn resolve_overlapping_ranges(
        &self,
        collection: &str,
        range: &PartitionRange,
    ) -> Result<Vec<PartitionKeyRange>, FetchFailure> {
        let ranges = self.resolve_ranges(collection).await?;
        Ok(ranges
            .into_iter()
            .filter(|pk| pk.range().overlaps(range))
            .collect())
    }
}
