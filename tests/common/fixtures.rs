//! 测试数据构造

use std::collections::BTreeMap;
use std::sync::Arc;

use crossquery::core::{Element, PipelineResult};
use crossquery::query::{
    AggregateOperator, QueryInfo, QueryPipeline, QueryPlan, QuerySpec, SortOrder,
};
use crossquery::config::PipelineConfig;

use super::{MockDataSource, MockResolver};

pub const COLLECTION: &str = "orders";

/// 普通文档 `{"id": key, "v": value}`
pub fn doc(key: &str, value: i64) -> Element {
    Element::object([("id", Element::string(key)), ("v", Element::integer(value))])
}

/// ORDER BY 改写后的行
pub fn order_by_row(key: &str, value: i64) -> Element {
    Element::object([
        (
            "orderByItems",
            Element::Array(vec![Element::wrap_item(Some(Element::integer(value)))]),
        ),
        ("payload", doc(key, value)),
    ])
}

/// GROUP BY 改写后的行：按 team 分组，total 为 COUNT 的部分结果
pub fn group_by_row(team: &str, count: i64) -> Element {
    Element::object([
        (
            "groupByItems",
            Element::Array(vec![Element::wrap_item(Some(Element::string(team)))]),
        ),
        (
            "payload",
            Element::object([
                ("team", Element::string(team)),
                ("total", Element::wrap_item(Some(Element::integer(count)))),
            ]),
        ),
    ])
}

pub fn parallel_plan() -> QueryPlan {
    QueryPlan::new(QueryInfo::default())
}

pub fn order_by_plan(order: SortOrder) -> QueryPlan {
    QueryPlan::new(QueryInfo {
        order_by: vec![order],
        order_by_expressions: vec!["c.v".to_string()],
        ..Default::default()
    })
}

pub fn top_plan(top: u64) -> QueryPlan {
    QueryPlan::new(QueryInfo {
        top: Some(top),
        ..Default::default()
    })
}

pub fn value_aggregate_plan(op: AggregateOperator) -> QueryPlan {
    QueryPlan::new(QueryInfo {
        aggregates: vec![op],
        has_select_value: true,
        ..Default::default()
    })
}

pub fn team_group_by_plan() -> QueryPlan {
    let mut alias_map = BTreeMap::new();
    alias_map.insert("team".to_string(), None);
    alias_map.insert("total".to_string(), Some(AggregateOperator::Count));
    QueryPlan::new(QueryInfo {
        group_by_expressions: vec!["c.team".to_string()],
        group_by_aliases: vec!["team".to_string(), "total".to_string()],
        aggregates: vec![AggregateOperator::Count],
        group_by_alias_to_aggregate_type: alias_map,
        ..Default::default()
    })
}

/// 以给定参数创建流水线
pub async fn create_pipeline(
    config: &PipelineConfig,
    plan: Option<QueryPlan>,
    source: &Arc<MockDataSource>,
    resolver: &Arc<MockResolver>,
    continuation: Option<&str>,
) -> PipelineResult<QueryPipeline> {
    QueryPipeline::create(
        config,
        QuerySpec::new("SELECT * FROM c"),
        plan,
        source.clone(),
        resolver.clone(),
        COLLECTION,
        continuation,
    )
    .await
}

/// 一直取到没有更多结果，返回所有条目
pub async fn drain_all(pipeline: &mut QueryPipeline) -> Vec<Element> {
    let mut items = Vec::new();
    while pipeline.has_more_results() {
        let page = pipeline.next_page().await.expect("Failed to fetch next page");
        items.extend(page.items);
    }
    items
}

/// 每取一页就用续传令牌重建流水线，返回所有条目和经过的令牌
pub async fn drain_with_resume(
    config: &PipelineConfig,
    plan: QueryPlan,
    source: &Arc<MockDataSource>,
    resolver: &Arc<MockResolver>,
) -> (Vec<Element>, Vec<String>) {
    resume_from(config, plan, source, resolver, None).await
}

/// 从给定令牌开始，每页之后重建流水线，直到没有续传令牌
pub async fn resume_from(
    config: &PipelineConfig,
    plan: QueryPlan,
    source: &Arc<MockDataSource>,
    resolver: &Arc<MockResolver>,
    mut continuation: Option<String>,
) -> (Vec<Element>, Vec<String>) {
    let mut items = Vec::new();
    let mut tokens = Vec::new();
    loop {
        let mut pipeline = create_pipeline(
            config,
            Some(plan.clone()),
            source,
            resolver,
            continuation.as_deref(),
        )
        .await
        .expect("Failed to create pipeline");
        if !pipeline.has_more_results() {
            break;
        }
        let page = pipeline.next_page().await.expect("Failed to fetch next page");
        items.extend(page.items);
        match page.continuation_token {
            Some(token) => {
                tokens.push(token.clone());
                continuation = Some(token);
            }
            None => break,
        }
    }
    (items, tokens)
}

/// 取出文档的 id 字段
pub fn ids(items: &[Element]) -> Vec<String> {
    items
        .iter()
        .map(|item| {
            item.get("id")
                .and_then(Element::as_str)
                .unwrap_or_default()
                .to_string()
        })
        .collect()
}

/// 以 `(分区键, 值)` 写入普通文档
pub fn seed_docs(source: &MockDataSource, entries: &[(&str, i64)]) {
    for (key, value) in entries {
        source.insert(key, doc(key, *value));
    }
}

/// 以 `(分区键, 排序值)` 写入 ORDER BY 改写后的行
pub fn seed_order_by_rows(source: &MockDataSource, entries: &[(&str, i64)]) {
    for (key, value) in entries {
        source.insert(key, order_by_row(key, *value));
    }
}

/// 连续的分区键 `prefix00`、`prefix01`...
pub fn sequential_keys(prefix: &str, count: usize) -> Vec<String> {
    (0..count).map(|i| format!("{}{:02X}", prefix, i)).collect()
}
