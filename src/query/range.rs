//! 分区范围
//!
//! 分区键空间上的半开区间 `[min, max)`，边界为十六进制有效分区键字符串，
//! 按字节序比较。`""` 是键空间下界，`"FF"` 是上界。

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// 有效分区键的最小值
pub const MIN_EFFECTIVE_KEY: &str = "";
/// 有效分区键的最大值
pub const MAX_EFFECTIVE_KEY: &str = "FF";

/// 半开区间 `[min, max)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartitionRange {
    pub min: String,
    pub max: String,
}

impl PartitionRange {
    pub fn new(min: impl Into<String>, max: impl Into<String>) -> Self {
        Self {
            min: min.into(),
            max: max.into(),
        }
    }

    /// 覆盖整个键空间的范围
    pub fn full() -> Self {
        Self::new(MIN_EFFECTIVE_KEY, MAX_EFFECTIVE_KEY)
    }

    pub fn is_empty(&self) -> bool {
        self.min >= self.max
    }

    /// 两个半开区间是否相交
    pub fn overlaps(&self, other: &PartitionRange) -> bool {
        !self.is_empty() && !other.is_empty() && self.min < other.max && other.min < self.max
    }

    /// 是否完全包含另一个范围
    pub fn contains(&self, other: &PartitionRange) -> bool {
        self.min <= other.min && other.max <= self.max
    }

    /// 按 `min` 排序，`min` 相同时按 `max`
    pub fn cmp_by_min(&self, other: &PartitionRange) -> Ordering {
        self.min.cmp(&other.min).then_with(|| self.max.cmp(&other.max))
    }
}

impl fmt::Display for PartitionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.min, self.max)
    }
}

/// 分区映射中的一个物理分区范围
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionKeyRange {
    pub id: String,
    pub min_inclusive: String,
    pub max_exclusive: String,
}

impl PartitionKeyRange {
    pub fn new(
        id: impl Into<String>,
        min_inclusive: impl Into<String>,
        max_exclusive: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            min_inclusive: min_inclusive.into(),
            max_exclusive: max_exclusive.into(),
        }
    }

    pub fn range(&self) -> PartitionRange {
        PartitionRange::new(self.min_inclusive.clone(), self.max_exclusive.clone())
    }
}

/// 查询计划给出的查询范围（网关 JSON 形状）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRange {
    pub min: String,
    pub max: String,
    #[serde(default = "default_true")]
    pub is_min_inclusive: bool,
    #[serde(default)]
    pub is_max_inclusive: bool,
}

fn default_true() -> bool {
    true
}

impl QueryRange {
    /// 与分区范围 `[min, max)` 是否相交，考虑边界的开闭
    pub fn overlaps(&self, range: &PartitionRange) -> bool {
        let lower_ok = if self.is_max_inclusive {
            range.min <= self.max
        } else {
            range.min < self.max
        };
        // 分区上界本身是开的，下界开闭不影响判定
        lower_ok && self.min < range.max
    }
}

/// 按 `min` 排序后只保留与任一查询范围相交的分区
pub fn filter_overlapping(
    mut ranges: Vec<PartitionKeyRange>,
    query_ranges: &[QueryRange],
) -> Vec<PartitionKeyRange> {
    ranges.sort_by(|a, b| a.range().cmp_by_min(&b.range()));
    if query_ranges.is_empty() {
        return ranges;
    }
    ranges
        .into_iter()
        .filter(|pk| {
            let range = pk.range();
            query_ranges.iter().any(|q| q.overlaps(&range))
        })
        .collect()
}
