//! 集成测试共享工具模块
//!
//! 提供内存中的数据源与分区映射，以及构造查询计划和结果行的辅助函数

#![allow(dead_code)]

pub mod assertions;
pub mod fixtures;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crossquery::config::PipelineConfig;
use crossquery::core::{Element, FetchFailure};
use crossquery::query::{
    PartitionKeyRange, PartitionMapResolver, QueryDataSource, QueryPage, QuerySpec,
};

/// 数据源收到的一次请求
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub range_id: String,
    pub continuation: Option<String>,
    pub page_size: usize,
}

/// 内存数据源
///
/// 每条文档带一个有效分区键，分区范围 `[min, max)` 内的文档按键排序后分页返回。
/// 续传令牌就是上一页最后一条文档的键，因此拆分后的子分区可以直接沿用父分区的令牌。
pub struct MockDataSource {
    documents: Mutex<BTreeMap<String, Element>>,
    page_limit: Mutex<Option<usize>>,
    failures: Mutex<HashMap<(String, Option<String>), FetchFailure>>,
    requests: Mutex<Vec<RecordedRequest>>,
    charge_per_page: f64,
}

impl MockDataSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            documents: Mutex::new(BTreeMap::new()),
            page_limit: Mutex::new(None),
            failures: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
            charge_per_page: 2.5,
        })
    }

    /// 以分区键 `key` 写入一条文档
    pub fn insert(&self, key: &str, document: Element) {
        self.documents.lock().insert(key.to_string(), document);
    }

    /// 限制每页最多返回的条数（与请求的页大小取较小值）
    pub fn set_page_limit(&self, limit: usize) {
        *self.page_limit.lock() = Some(limit);
    }

    /// 下一次以 `continuation` 请求 `range_id` 时返回失败，只生效一次
    pub fn fail_once(&self, range_id: &str, continuation: Option<&str>, failure: FetchFailure) {
        self.failures.lock().insert(
            (range_id.to_string(), continuation.map(str::to_string)),
            failure,
        );
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    pub fn requests_for(&self, range_id: &str) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.range_id == range_id)
            .cloned()
            .collect()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn charge_per_page(&self) -> f64 {
        self.charge_per_page
    }
}

#[async_trait]
impl QueryDataSource for MockDataSource {
    async fn execute_query(
        &self,
        _query: &QuerySpec,
        continuation: Option<&str>,
        range: &PartitionKeyRange,
        page_size: usize,
    ) -> Result<QueryPage, FetchFailure> {
        self.requests.lock().push(RecordedRequest {
            range_id: range.id.clone(),
            continuation: continuation.map(str::to_string),
            page_size,
        });

        let failure_key = (range.id.clone(), continuation.map(str::to_string));
        if let Some(failure) = self.failures.lock().remove(&failure_key) {
            return Err(failure);
        }

        let limit = match *self.page_limit.lock() {
            Some(limit) => limit.min(page_size),
            None => page_size,
        };
        let documents = self.documents.lock();
        let remaining: Vec<(&String, &Element)> = documents
            .iter()
            .filter(|(key, _)| {
                key.as_str() >= range.min_inclusive.as_str()
                    && key.as_str() < range.max_exclusive.as_str()
                    && continuation.map(|c| key.as_str() > c).unwrap_or(true)
            })
            .collect();

        let page: Vec<(&String, &Element)> = remaining.iter().take(limit).cloned().collect();
        let next = if remaining.len() > page.len() {
            page.last().map(|(key, _)| (*key).clone())
        } else {
            None
        };
        let bytes = page.len() as i64 * 64;
        Ok(QueryPage::new(
            page.into_iter().map(|(_, doc)| doc.clone()).collect(),
            next,
        )
        .with_request_charge(self.charge_per_page)
        .with_activity_id(format!("activity-{}", range.id))
        .with_response_bytes(bytes))
    }
}

/// 可在测试中替换的分区映射
pub struct MockResolver {
    ranges: Mutex<Vec<PartitionKeyRange>>,
}

impl MockResolver {
    pub fn new(ranges: Vec<PartitionKeyRange>) -> Arc<Self> {
        Arc::new(Self {
            ranges: Mutex::new(ranges),
        })
    }

    pub fn set_ranges(&self, ranges: Vec<PartitionKeyRange>) {
        *self.ranges.lock() = ranges;
    }
}

#[async_trait]
impl PartitionMapResolver for MockResolver {
    async fn resolve_ranges(&self, _collection: &str) -> Result<Vec<PartitionKeyRange>, FetchFailure> {
        Ok(self.ranges.lock().clone())
    }
}

/// 两个分区：`["", "80")` 与 `["80", "FF")`
pub fn two_ranges() -> Vec<PartitionKeyRange> {
    vec![
        PartitionKeyRange::new("0", "", "80"),
        PartitionKeyRange::new("1", "80", "FF"),
    ]
}

/// 三个分区：`["", "55")`、`["55", "AA")` 与 `["AA", "FF")`
pub fn three_ranges() -> Vec<PartitionKeyRange> {
    vec![
        PartitionKeyRange::new("0", "", "55"),
        PartitionKeyRange::new("1", "55", "AA"),
        PartitionKeyRange::new("2", "AA", "FF"),
    ]
}

/// 测试用配置：并发度固定，便于断言
pub fn test_config() -> PipelineConfig {
    PipelineConfig {
        max_concurrency: 4,
        ..PipelineConfig::default()
    }
}
