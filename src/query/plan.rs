//! 查询计划
//!
//! 网关返回的分区查询执行信息（camelCase JSON），以及调用方提交的查询文本与参数。
//! 查询的解析与改写不在本 crate 内完成，这里只消费结果。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::error::{QueryError, QueryResult};
use crate::core::Element;
use crate::query::range::QueryRange;

/// 查询参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryParameter {
    pub name: String,
    pub value: Element,
}

/// 提交给每个分区的查询
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySpec {
    pub query_text: String,
    #[serde(default)]
    pub parameters: Vec<QueryParameter>,
}

impl QuerySpec {
    pub fn new(query_text: impl Into<String>) -> Self {
        Self {
            query_text: query_text.into(),
            parameters: Vec::new(),
        }
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: Element) -> Self {
        self.parameters.push(QueryParameter {
            name: name.into(),
            value,
        });
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DistinctType {
    #[default]
    None,
    Ordered,
    Unordered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregateOperator {
    Average,
    Count,
    Max,
    Min,
    Sum,
}

/// 查询形状信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryInfo {
    pub distinct_type: DistinctType,
    pub top: Option<u64>,
    pub offset: Option<u64>,
    pub limit: Option<u64>,
    pub order_by: Vec<SortOrder>,
    pub order_by_expressions: Vec<String>,
    pub group_by_expressions: Vec<String>,
    pub group_by_aliases: Vec<String>,
    pub aggregates: Vec<AggregateOperator>,
    pub group_by_alias_to_aggregate_type: BTreeMap<String, Option<AggregateOperator>>,
    pub rewritten_query: Option<String>,
    pub has_select_value: bool,
}

impl QueryInfo {
    pub fn has_order_by(&self) -> bool {
        !self.order_by.is_empty()
    }

    pub fn has_aggregates(&self) -> bool {
        !self.aggregates.is_empty()
    }

    pub fn has_group_by(&self) -> bool {
        !self.group_by_expressions.is_empty()
    }

    pub fn has_distinct(&self) -> bool {
        self.distinct_type != DistinctType::None
    }

    /// 拒绝执行层无法正确处理的查询形状
    pub fn validate(&self) -> QueryResult<()> {
        if self.has_order_by() && self.has_aggregates() && !self.has_group_by() {
            return Err(QueryError::UnsupportedQueryShape(
                "ORDER BY 不能与聚合函数同时使用".to_string(),
            ));
        }
        if !self.has_group_by() && self.aggregates.len() > 1 {
            return Err(QueryError::UnsupportedQueryShape(format!(
                "跨分区查询只支持一个聚合函数, 实际为 {:?}",
                self.aggregates
            )));
        }
        if !self.has_group_by() && self.has_aggregates() && !self.has_select_value {
            return Err(QueryError::UnsupportedQueryShape(
                "不带 GROUP BY 的聚合查询必须使用 SELECT VALUE".to_string(),
            ));
        }
        if !self.order_by_expressions.is_empty()
            && self.order_by_expressions.len() != self.order_by.len()
        {
            return Err(QueryError::UnsupportedQueryShape(
                "ORDER BY 表达式数量与排序方向数量不一致".to_string(),
            ));
        }
        if self.group_by_aliases.len() > self.group_by_alias_to_aggregate_type.len()
            && !self.group_by_alias_to_aggregate_type.is_empty()
        {
            return Err(QueryError::UnsupportedQueryShape(
                "GROUP BY 别名缺少聚合类型映射".to_string(),
            ));
        }
        Ok(())
    }
}

/// 分区查询执行信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct QueryPlan {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partitioned_query_execution_info_version: Option<u32>,
    #[serde(default)]
    pub query_info: QueryInfo,
    #[serde(default)]
    pub query_ranges: Vec<QueryRange>,
}

impl QueryPlan {
    pub fn new(query_info: QueryInfo) -> Self {
        Self {
            partitioned_query_execution_info_version: None,
            query_info,
            query_ranges: Vec::new(),
        }
    }

    /// 每个分区实际执行的查询文本：有改写查询时使用改写结果
    pub fn partition_query(&self, original: &QuerySpec) -> QuerySpec {
        match &self.query_info.rewritten_query {
            Some(rewritten) if !rewritten.is_empty() => QuerySpec {
                query_text: rewritten.clone(),
                parameters: original.parameters.clone(),
            },
            _ => original.clone(),
        }
    }
}
