//! 聚合累加器
//!
//! 每个分区返回的是部分聚合结果，这里负责把部分结果合并为全局结果：
//!
//! | 聚合 | 部分结果 | 合并规则 |
//! |------|----------|----------|
//! | COUNT | 数值 | 求和，始终产出数值 |
//! | SUM | 数值 | 求和；出现非数值时结果为 undefined |
//! | AVG | `{"sum": n, "count": n}` | 分别求和后相除 |
//! | MIN/MAX | 任意值 | 按 `ItemComparer` 取极值；数组/对象使结果为 undefined |
//!
//! undefined（`None`）的部分结果表示该分区没有值，直接忽略。

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::core::error::{QueryError, QueryResult};
use crate::core::{Element, ElementType, ItemComparer};
use crate::query::plan::AggregateOperator;

/// 单个聚合函数的累加状态
#[derive(Debug, Clone)]
pub enum Aggregator {
    Count(CountState),
    Sum(SumState),
    Average(AverageState),
    Min(ExtremumState),
    Max(ExtremumState),
}

#[derive(Debug, Clone, Default)]
pub struct CountState {
    count: i64,
}

#[derive(Debug, Clone, Default)]
pub struct SumState {
    /// 所有输入都是整数时保持精确整数和；中间结果可以超出 i64
    exact: Option<i128>,
    total: f64,
    seen: bool,
    poisoned: bool,
}

#[derive(Debug, Clone, Default)]
pub struct AverageState {
    sum: f64,
    count: i64,
    poisoned: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ExtremumState {
    value: Option<Element>,
    poisoned: bool,
}

impl Aggregator {
    pub fn new(operator: AggregateOperator) -> Self {
        match operator {
            AggregateOperator::Count => Aggregator::Count(CountState::default()),
            AggregateOperator::Sum => Aggregator::Sum(SumState {
                exact: Some(0),
                ..Default::default()
            }),
            AggregateOperator::Average => Aggregator::Average(AverageState::default()),
            AggregateOperator::Min => Aggregator::Min(ExtremumState::default()),
            AggregateOperator::Max => Aggregator::Max(ExtremumState::default()),
        }
    }

    pub fn operator(&self) -> AggregateOperator {
        match self {
            Aggregator::Count(_) => AggregateOperator::Count,
            Aggregator::Sum(_) => AggregateOperator::Sum,
            Aggregator::Average(_) => AggregateOperator::Average,
            Aggregator::Min(_) => AggregateOperator::Min,
            Aggregator::Max(_) => AggregateOperator::Max,
        }
    }

    /// 合并一个分区的部分结果
    pub fn add(&mut self, partial: Option<&Element>) {
        let Some(partial) = partial else {
            return;
        };
        match self {
            Aggregator::Count(state) => {
                if let Some(number) = partial.as_number() {
                    let local = number
                        .as_integer()
                        .unwrap_or_else(|| number.as_f64() as i64);
                    state.count = state.count.saturating_add(local);
                }
            }
            Aggregator::Sum(state) => state.add(partial),
            Aggregator::Average(state) => state.add(partial),
            Aggregator::Min(state) => state.add(partial, Ordering::Less),
            Aggregator::Max(state) => state.add(partial, Ordering::Greater),
        }
    }

    /// 最终结果；None 表示 undefined
    pub fn result(&self) -> Option<Element> {
        match self {
            Aggregator::Count(state) => Some(Element::integer(state.count)),
            Aggregator::Sum(state) => state.result(),
            Aggregator::Average(state) => state.result(),
            Aggregator::Min(state) | Aggregator::Max(state) => state.result(),
        }
    }
}

impl SumState {
    fn add(&mut self, partial: &Element) {
        if self.poisoned {
            return;
        }
        let Some(number) = partial.as_number() else {
            self.poisoned = true;
            return;
        };
        self.seen = true;
        self.total += number.as_f64();
        self.exact = match (self.exact, number.as_integer()) {
            (Some(acc), Some(value)) => acc.checked_add(i128::from(value)),
            _ => None,
        };
    }

    fn result(&self) -> Option<Element> {
        if self.poisoned || !self.seen {
            return None;
        }
        // 整数还是浮点只由最终的和决定，与部分结果的到达顺序无关
        Some(match self.exact {
            Some(exact) => match i64::try_from(exact) {
                Ok(exact) => Element::integer(exact),
                Err(_) => Element::double(exact as f64),
            },
            None => Element::double(self.total),
        })
    }
}

impl AverageState {
    fn add(&mut self, partial: &Element) {
        if self.poisoned {
            return;
        }
        let count = partial
            .get("count")
            .and_then(Element::as_number)
            .map(|n| n.as_integer().unwrap_or_else(|| n.as_f64() as i64));
        let Some(count) = count else {
            self.poisoned = true;
            return;
        };
        if count == 0 {
            return;
        }
        match partial.get("sum").and_then(Element::as_number) {
            Some(sum) => {
                self.sum += sum.as_f64();
                self.count += count;
            }
            None => self.poisoned = true,
        }
    }

    fn result(&self) -> Option<Element> {
        if self.poisoned || self.count == 0 {
            return None;
        }
        Some(Element::double(self.sum / self.count as f64))
    }
}

impl ExtremumState {
    /// `keep` 为新值胜出时比较器应给出的结果
    fn add(&mut self, partial: &Element, keep: Ordering) {
        if self.poisoned {
            return;
        }
        if matches!(
            partial.element_type(),
            Some(ElementType::Array) | Some(ElementType::Object)
        ) {
            self.poisoned = true;
            self.value = None;
            return;
        }
        let replace = match &self.value {
            None => true,
            Some(current) => ItemComparer::compare(Some(partial), Some(current)) == keep,
        };
        if replace {
            self.value = Some(partial.clone());
        }
    }

    fn result(&self) -> Option<Element> {
        if self.poisoned {
            None
        } else {
            self.value.clone()
        }
    }
}

/// 分组中某一列的值：聚合列合并部分结果，非聚合列保留首次出现的值
#[derive(Debug, Clone)]
pub enum AggregateValue {
    Aggregate(Aggregator),
    Scalar {
        initialized: bool,
        value: Option<Element>,
    },
}

impl AggregateValue {
    pub fn new(operator: Option<AggregateOperator>) -> Self {
        match operator {
            Some(op) => AggregateValue::Aggregate(Aggregator::new(op)),
            None => AggregateValue::Scalar {
                initialized: false,
                value: None,
            },
        }
    }

    /// 聚合列的部分结果按 `{"item": value}` 包装
    pub fn add(&mut self, value: Option<&Element>) {
        match self {
            AggregateValue::Aggregate(aggregator) => {
                aggregator.add(value.and_then(Element::unwrap_item))
            }
            AggregateValue::Scalar { initialized, value: slot } => {
                if !*initialized {
                    *slot = value.cloned();
                    *initialized = true;
                }
            }
        }
    }

    pub fn result(&self) -> Option<Element> {
        match self {
            AggregateValue::Aggregate(aggregator) => aggregator.result(),
            AggregateValue::Scalar { value, .. } => value.clone(),
        }
    }
}

/// 单个分组的聚合器
#[derive(Debug, Clone)]
pub enum SingleGroupAggregator {
    /// `SELECT VALUE`：整个 payload 是一个值
    SelectValue(AggregateValue),
    /// `SELECT a, b`：payload 是别名到值的对象
    SelectList(Vec<(String, AggregateValue)>),
}

impl SingleGroupAggregator {
    /// 根据查询形状创建分组聚合器
    ///
    /// 别名顺序优先使用 `ordered_aliases`，否则按映射表的键序。
    pub fn create(
        aggregates: &[AggregateOperator],
        alias_to_aggregate: &BTreeMap<String, Option<AggregateOperator>>,
        ordered_aliases: &[String],
        has_select_value: bool,
    ) -> QueryResult<Self> {
        if has_select_value {
            if aggregates.len() > 1 {
                return Err(QueryError::UnsupportedQueryShape(format!(
                    "SELECT VALUE 只能包含一个聚合函数, 实际为 {:?}",
                    aggregates
                )));
            }
            return Ok(SingleGroupAggregator::SelectValue(AggregateValue::new(
                aggregates.first().copied(),
            )));
        }

        let aliases: Vec<String> = if ordered_aliases.is_empty() {
            alias_to_aggregate.keys().cloned().collect()
        } else {
            ordered_aliases.to_vec()
        };
        let columns = aliases
            .into_iter()
            .map(|alias| {
                let operator = alias_to_aggregate.get(&alias).copied().flatten();
                (alias, AggregateValue::new(operator))
            })
            .collect();
        Ok(SingleGroupAggregator::SelectList(columns))
    }

    /// 合并一行的 payload
    pub fn add_values(&mut self, payload: Option<&Element>) -> QueryResult<()> {
        match self {
            SingleGroupAggregator::SelectValue(value) => {
                value.add(payload);
                Ok(())
            }
            SingleGroupAggregator::SelectList(columns) => {
                let object = match payload {
                    Some(Element::Object(map)) => map,
                    other => {
                        return Err(QueryError::InvalidArgument(format!(
                            "GROUP BY 的 payload 应为对象, 实际为 {:?}",
                            other.and_then(Element::element_type)
                        )))
                    }
                };
                for (alias, column) in columns.iter_mut() {
                    column.add(object.get(alias));
                }
                Ok(())
            }
        }
    }

    /// 分组结果；undefined 的列不出现在结果对象中
    pub fn result(&self) -> Option<Element> {
        match self {
            SingleGroupAggregator::SelectValue(value) => value.result(),
            SingleGroupAggregator::SelectList(columns) => Some(Element::Object(
                columns
                    .iter()
                    .filter_map(|(alias, column)| column.result().map(|v| (alias.clone(), v)))
                    .collect(),
            )),
        }
    }
}
