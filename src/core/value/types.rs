use std::collections::BTreeMap;

use uuid::Uuid;

/// 元素类型定义枚举
///
/// 判别值即跨类型比较时使用的类型序。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ElementType {
    Null = 0,
    Boolean = 1,
    Number = 2,
    String = 3,
    Array = 4,
    Object = 5,
    Guid = 6,
    Binary = 7,
}

impl ElementType {
    pub fn rank(self) -> u8 {
        self as u8
    }
}

/// 通用 64 位数值
///
/// 后端 JSON 数值的"十进制安全"表示：整数保持精确，其余按双精度存储。
#[derive(Debug, Clone, Copy)]
pub enum Number64 {
    Integer(i64),
    Double(f64),
}

impl Number64 {
    pub fn is_integer(&self) -> bool {
        matches!(self, Number64::Integer(_))
    }

    pub fn as_f64(&self) -> f64 {
        match self {
            Number64::Integer(i) => *i as f64,
            Number64::Double(d) => *d,
        }
    }
}

impl From<i64> for Number64 {
    fn from(value: i64) -> Self {
        Number64::Integer(value)
    }
}

impl From<f64> for Number64 {
    fn from(value: f64) -> Self {
        Number64::Double(value)
    }
}

/// 数值元素，按数值宽度细分
#[derive(Debug, Clone, Copy)]
pub enum Number {
    Number64(Number64),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    UInt32(u32),
    Float32(f32),
    Float64(f64),
}

impl Number {
    /// 带显式宽度的数值子类型排在通用 Number64 之后，仅用于同值时打破平局
    pub fn subtype_rank(&self) -> u8 {
        match self {
            Number::Number64(_) => 0,
            Number::Int8(_) => 1,
            Number::Int16(_) => 2,
            Number::Int32(_) => 3,
            Number::Int64(_) => 4,
            Number::UInt32(_) => 5,
            Number::Float32(_) => 6,
            Number::Float64(_) => 7,
        }
    }

    pub fn has_explicit_width(&self) -> bool {
        !matches!(self, Number::Number64(_))
    }

    /// 整数值（无损），浮点子类型返回 None
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Number::Number64(Number64::Integer(i)) => Some(*i),
            Number::Number64(Number64::Double(_)) => None,
            Number::Int8(v) => Some(i64::from(*v)),
            Number::Int16(v) => Some(i64::from(*v)),
            Number::Int32(v) => Some(i64::from(*v)),
            Number::Int64(v) => Some(*v),
            Number::UInt32(v) => Some(i64::from(*v)),
            Number::Float32(_) | Number::Float64(_) => None,
        }
    }

    /// 浮点值；f32 到 f64 的转换是精确的
    pub fn as_f64(&self) -> f64 {
        match self {
            Number::Number64(n) => n.as_f64(),
            Number::Float32(v) => f64::from(*v),
            Number::Float64(v) => *v,
            other => other.as_integer().map(|i| i as f64).unwrap_or(f64::NAN),
        }
    }

    pub fn is_integer(&self) -> bool {
        self.as_integer().is_some()
    }
}

/// 查询结果元素
///
/// 封闭的标签联合。`MinValue`/`MaxValue` 是仅供比较器使用的哨兵，永远不会被序列化；
/// "undefined"（属性缺失）不在联合内，用 `Option<Element>` 的 `None` 表示。
#[derive(Debug, Clone)]
pub enum Element {
    MinValue,
    Null,
    Boolean(bool),
    Number(Number),
    String(String),
    Array(Vec<Element>),
    Object(BTreeMap<String, Element>),
    Guid(Uuid),
    Binary(Vec<u8>),
    MaxValue,
}

impl Element {
    pub fn integer(value: i64) -> Self {
        Element::Number(Number::Number64(Number64::Integer(value)))
    }

    pub fn double(value: f64) -> Self {
        Element::Number(Number::Number64(Number64::Double(value)))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Element::String(value.into())
    }

    /// 由键值对构造对象
    pub fn object<K, I>(pairs: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Element)>,
    {
        Element::Object(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// 元素类型；哨兵返回 None
    pub fn element_type(&self) -> Option<ElementType> {
        match self {
            Element::MinValue | Element::MaxValue => None,
            Element::Null => Some(ElementType::Null),
            Element::Boolean(_) => Some(ElementType::Boolean),
            Element::Number(_) => Some(ElementType::Number),
            Element::String(_) => Some(ElementType::String),
            Element::Array(_) => Some(ElementType::Array),
            Element::Object(_) => Some(ElementType::Object),
            Element::Guid(_) => Some(ElementType::Guid),
            Element::Binary(_) => Some(ElementType::Binary),
        }
    }

    pub fn is_sentinel(&self) -> bool {
        matches!(self, Element::MinValue | Element::MaxValue)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Element::Null)
    }

    pub fn as_number(&self) -> Option<&Number> {
        match self {
            Element::Number(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Element::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Element]> {
        match self {
            Element::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, Element>> {
        match self {
            Element::Object(map) => Some(map),
            _ => None,
        }
    }

    /// 读取对象属性；非对象或属性缺失时返回 None（undefined）
    pub fn get(&self, property: &str) -> Option<&Element> {
        self.as_object().and_then(|map| map.get(property))
    }

    /// 按 `{"item": value}` 约定包装
    pub fn wrap_item(value: Option<Element>) -> Element {
        let mut map = BTreeMap::new();
        if let Some(value) = value {
            map.insert("item".to_string(), value);
        }
        Element::Object(map)
    }

    /// 解开 `{"item": value}`；`item` 缺失时为 undefined
    pub fn unwrap_item(&self) -> Option<&Element> {
        self.get("item")
    }
}

impl From<bool> for Element {
    fn from(value: bool) -> Self {
        Element::Boolean(value)
    }
}

impl From<i64> for Element {
    fn from(value: i64) -> Self {
        Element::integer(value)
    }
}

impl From<f64> for Element {
    fn from(value: f64) -> Self {
        Element::double(value)
    }
}

impl From<&str> for Element {
    fn from(value: &str) -> Self {
        Element::String(value.to_string())
    }
}

impl From<String> for Element {
    fn from(value: String) -> Self {
        Element::String(value)
    }
}

impl From<Uuid> for Element {
    fn from(value: Uuid) -> Self {
        Element::Guid(value)
    }
}

impl From<Vec<Element>> for Element {
    fn from(value: Vec<Element>) -> Self {
        Element::Array(value)
    }
}

impl From<Number> for Element {
    fn from(value: Number) -> Self {
        Element::Number(value)
    }
}
