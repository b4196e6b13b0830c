//! 元素与 JSON 之间的转换
//!
//! 后端返回 JSON 文档，流水线内部以 `Element` 处理。整数在 i64 范围内保持精确，
//! 其余数值按双精度处理。Guid 序列化为带连字符的字符串，二进制序列化为 base64 字符串。
//! 哨兵元素与非有限浮点数无法序列化。

use std::collections::BTreeMap;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::de::Deserializer;
use serde::ser::{Error as _, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::types::{Element, Number, Number64};
use crate::core::error::{PipelineError, PipelineResult};

impl From<JsonValue> for Element {
    fn from(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => Element::Null,
            JsonValue::Bool(b) => Element::Boolean(b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Element::integer(i),
                None => Element::double(n.as_f64().unwrap_or(f64::NAN)),
            },
            JsonValue::String(s) => Element::String(s),
            JsonValue::Array(items) => Element::Array(items.into_iter().map(Element::from).collect()),
            JsonValue::Object(map) => Element::Object(
                map.into_iter()
                    .map(|(k, v)| (k, Element::from(v)))
                    .collect::<BTreeMap<_, _>>(),
            ),
        }
    }
}

impl From<&JsonValue> for Element {
    fn from(value: &JsonValue) -> Self {
        Element::from(value.clone())
    }
}

impl Element {
    /// 转换为 JSON 值
    pub fn to_json(&self) -> PipelineResult<JsonValue> {
        match self {
            Element::MinValue | Element::MaxValue => Err(PipelineError::Serialization(
                "哨兵元素不能被序列化".to_string(),
            )),
            Element::Null => Ok(JsonValue::Null),
            Element::Boolean(b) => Ok(JsonValue::Bool(*b)),
            Element::Number(n) => number_to_json(n),
            Element::String(s) => Ok(JsonValue::String(s.clone())),
            Element::Array(items) => items
                .iter()
                .map(Element::to_json)
                .collect::<PipelineResult<Vec<_>>>()
                .map(JsonValue::Array),
            Element::Object(map) => {
                let mut object = serde_json::Map::with_capacity(map.len());
                for (key, value) in map {
                    object.insert(key.clone(), value.to_json()?);
                }
                Ok(JsonValue::Object(object))
            }
            Element::Guid(guid) => Ok(JsonValue::String(guid.hyphenated().to_string())),
            Element::Binary(bytes) => Ok(JsonValue::String(STANDARD.encode(bytes))),
        }
    }

    /// 解析 JSON 文本
    pub fn from_json_str(text: &str) -> PipelineResult<Element> {
        let value: JsonValue = serde_json::from_str(text)?;
        Ok(Element::from(value))
    }

    /// 序列化为紧凑 JSON 文本
    pub fn to_json_string(&self) -> PipelineResult<String> {
        Ok(serde_json::to_string(&self.to_json()?)?)
    }
}

fn number_to_json(number: &Number) -> PipelineResult<JsonValue> {
    if let Some(i) = number.as_integer() {
        return Ok(JsonValue::from(i));
    }
    let f = number.as_f64();
    serde_json::Number::from_f64(f)
        .map(JsonValue::Number)
        .ok_or_else(|| PipelineError::Serialization(format!("非有限数值 {} 不能被序列化", f)))
}

impl Serialize for Element {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json()
            .map_err(|e| S::Error::custom(e.to_string()))?
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Element {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        JsonValue::deserialize(deserializer).map(Element::from)
    }
}

impl From<Number64> for Element {
    fn from(value: Number64) -> Self {
        Element::Number(Number::Number64(value))
    }
}
