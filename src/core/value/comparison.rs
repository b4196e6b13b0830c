//! 元素全序比较
//!
//! 规则依次为：哨兵 (MinValue 最小、MaxValue 最大)，undefined 小于一切已定义元素，
//! 不同类型按类型序比较，同类型按值比较。数值先比较精确数值，再以子类型序打破平局。

use std::cmp::Ordering;

use super::hash::structural_hash;
use super::types::{Element, Number};

/// 元素比较器
///
/// 对 `Option<Element>` 给出全序，`None` 表示 undefined。
#[derive(Debug, Clone, Copy, Default)]
pub struct ItemComparer;

impl ItemComparer {
    pub fn compare(left: Option<&Element>, right: Option<&Element>) -> Ordering {
        match (left, right) {
            (None, None) => Ordering::Equal,
            (Some(Element::MinValue), Some(Element::MinValue)) => Ordering::Equal,
            (Some(Element::MaxValue), Some(Element::MaxValue)) => Ordering::Equal,
            (Some(Element::MinValue), _) => Ordering::Less,
            (_, Some(Element::MinValue)) => Ordering::Greater,
            (Some(Element::MaxValue), _) => Ordering::Greater,
            (_, Some(Element::MaxValue)) => Ordering::Less,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(a), Some(b)) => Self::compare_defined(a, b),
        }
    }

    /// 两个已定义、非哨兵元素的比较
    fn compare_defined(a: &Element, b: &Element) -> Ordering {
        let (rank_a, rank_b) = match (a.element_type(), b.element_type()) {
            (Some(x), Some(y)) => (x.rank(), y.rank()),
            _ => return Ordering::Equal,
        };
        if rank_a != rank_b {
            return rank_a.cmp(&rank_b);
        }

        match (a, b) {
            (Element::Null, Element::Null) => Ordering::Equal,
            (Element::Boolean(x), Element::Boolean(y)) => x.cmp(y),
            (Element::Number(x), Element::Number(y)) => Self::compare_numbers(x, y),
            (Element::String(x), Element::String(y)) => Self::compare_strings(x, y),
            (Element::Guid(x), Element::Guid(y)) => x.as_u128().cmp(&y.as_u128()),
            (Element::Binary(x), Element::Binary(y)) => x.cmp(y),
            // 数组与对象按结构哈希排序
            (Element::Array(_), Element::Array(_)) | (Element::Object(_), Element::Object(_)) => {
                structural_hash(Some(a)).cmp(&structural_hash(Some(b)))
            }
            _ => Ordering::Equal,
        }
    }

    /// 数值比较：先比较精确数值，再按子类型序
    pub fn compare_numbers(a: &Number, b: &Number) -> Ordering {
        match compare_numeric_value(a, b) {
            Ordering::Equal => a.subtype_rank().cmp(&b.subtype_rank()),
            other => other,
        }
    }

    /// 序数比较：按 UTF-16 码元逐个比较
    pub fn compare_strings(a: &str, b: &str) -> Ordering {
        a.encode_utf16().cmp(b.encode_utf16())
    }
}

fn compare_numeric_value(a: &Number, b: &Number) -> Ordering {
    match (a.as_integer(), b.as_integer()) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(x), None) => compare_i64_f64(x, b.as_f64()),
        (None, Some(y)) => compare_i64_f64(y, a.as_f64()).reverse(),
        (None, None) => compare_f64(a.as_f64(), b.as_f64()),
    }
}

/// NaN 视为最小的数值，且各 NaN 之间相等
fn compare_f64(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

/// 整数与浮点数的精确比较，不经过有损转换
fn compare_i64_f64(i: i64, f: f64) -> Ordering {
    if f.is_nan() {
        return Ordering::Greater;
    }
    // i64 的取值范围是 [-2^63, 2^63)
    const TWO_POW_63: f64 = 9_223_372_036_854_775_808.0;
    if f >= TWO_POW_63 {
        return Ordering::Less;
    }
    if f < -TWO_POW_63 {
        return Ordering::Greater;
    }
    let truncated = f.trunc();
    // 此处 truncated 落在 i64 范围内，转换是精确的
    let whole = truncated as i64;
    match i.cmp(&whole) {
        Ordering::Equal => {
            let fraction = f - truncated;
            if fraction > 0.0 {
                Ordering::Less
            } else if fraction < 0.0 {
                Ordering::Greater
            } else {
                Ordering::Equal
            }
        }
        other => other,
    }
}

impl PartialEq for Element {
    fn eq(&self, other: &Self) -> bool {
        ItemComparer::compare(Some(self), Some(other)) == Ordering::Equal
    }
}

impl Eq for Element {}

impl PartialOrd for Element {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Element {
    fn cmp(&self, other: &Self) -> Ordering {
        ItemComparer::compare(Some(self), Some(other))
    }
}

impl std::hash::Hash for Element {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        structural_hash(Some(self)).hash(state);
    }
}
