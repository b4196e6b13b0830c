//! 流水线续传令牌
//!
//! 最外层的带版本令牌。没有 `Version` 字段（或根本不是 JSON 对象）的令牌被视为 V0，
//! 即原始后端令牌。版本检测与字段解释分离：先读版本，来自未来的版本在解释任何字段之前就被报告。

use serde_json::{Map, Value as JsonValue};

use super::version::Version;
use crate::core::error::{ContinuationTokenError, TokenResult};
use crate::query::plan::QueryPlan;

const PROPERTY_VERSION: &str = "Version";
const PROPERTY_QUERY_PLAN: &str = "QueryPlan";
const PROPERTY_SOURCE: &str = "SourceContinuationToken";

/// 带版本的流水线续传令牌
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineContinuationToken {
    V0 {
        source: String,
    },
    V1 {
        source: String,
    },
    V1_1 {
        query_plan: Option<QueryPlan>,
        source: String,
    },
    V2 {
        query_plan: Option<QueryPlan>,
        source: String,
    },
}

/// 升级到最新版本后的令牌
#[derive(Debug, Clone, PartialEq)]
pub struct LatestContinuationToken {
    pub query_plan: Option<QueryPlan>,
    pub source: String,
}

impl From<LatestContinuationToken> for PipelineContinuationToken {
    fn from(token: LatestContinuationToken) -> Self {
        PipelineContinuationToken::V2 {
            query_plan: token.query_plan,
            source: token.source,
        }
    }
}

impl PipelineContinuationToken {
    /// 以最新已知版本为上限解析
    pub fn parse(raw: &str) -> TokenResult<Self> {
        Self::parse_with_max_version(raw, Version::LATEST)
    }

    /// 解析令牌；版本高于 `max_known` 时返回 `FromFuture`
    pub fn parse_with_max_version(raw: &str, max_known: Version) -> TokenResult<Self> {
        let object = match as_versioned_object(raw) {
            Some(object) => object,
            None => {
                return Ok(PipelineContinuationToken::V0 {
                    source: raw.to_string(),
                })
            }
        };

        let version = read_version(&object, raw)?;
        if version > max_known {
            return Err(ContinuationTokenError::FromFuture {
                version,
                max_known,
                raw: raw.to_string(),
            });
        }

        match version {
            Version::V1_0 => Ok(PipelineContinuationToken::V1 {
                source: read_source(&object, raw)?,
            }),
            Version::V1_1 => Ok(PipelineContinuationToken::V1_1 {
                query_plan: read_query_plan(&object, raw)?,
                source: read_source(&object, raw)?,
            }),
            Version::V2_0 => Ok(PipelineContinuationToken::V2 {
                query_plan: read_query_plan(&object, raw)?,
                source: read_source(&object, raw)?,
            }),
            other => Err(ContinuationTokenError::malformed(
                Some(PROPERTY_VERSION),
                raw,
                format!("没有对应格式的续传令牌版本 {}", other),
            )),
        }
    }

    /// 只读取版本号，不解释其余字段
    pub fn detect_version(raw: &str) -> TokenResult<Version> {
        match as_versioned_object(raw) {
            Some(object) => read_version(&object, raw),
            None => Ok(Version::V0),
        }
    }

    pub fn version(&self) -> Version {
        match self {
            PipelineContinuationToken::V0 { .. } => Version::V0,
            PipelineContinuationToken::V1 { .. } => Version::V1_0,
            PipelineContinuationToken::V1_1 { .. } => Version::V1_1,
            PipelineContinuationToken::V2 { .. } => Version::V2_0,
        }
    }

    pub fn is_from_future(&self, max_known: Version) -> bool {
        self.version() > max_known
    }

    pub fn source(&self) -> &str {
        match self {
            PipelineContinuationToken::V0 { source }
            | PipelineContinuationToken::V1 { source }
            | PipelineContinuationToken::V1_1 { source, .. }
            | PipelineContinuationToken::V2 { source, .. } => source,
        }
    }

    pub fn query_plan(&self) -> Option<&QueryPlan> {
        match self {
            PipelineContinuationToken::V1_1 { query_plan, .. }
            | PipelineContinuationToken::V2 { query_plan, .. } => query_plan.as_ref(),
            _ => None,
        }
    }

    /// 升级一个版本；已是最新版本时返回 None
    pub fn upgrade(self) -> Option<Self> {
        self.step().ok()
    }

    /// 沿 V0 → V1 → V1.1 → V2 依次升级
    pub fn upgrade_to_latest(self) -> LatestContinuationToken {
        let mut current = self;
        loop {
            match current.step() {
                Ok(next) => current = next,
                Err(latest) => return latest,
            }
        }
    }

    fn step(self) -> Result<Self, LatestContinuationToken> {
        match self {
            PipelineContinuationToken::V0 { source } => Ok(PipelineContinuationToken::V1 { source }),
            PipelineContinuationToken::V1 { source } => Ok(PipelineContinuationToken::V1_1 {
                query_plan: None,
                source,
            }),
            PipelineContinuationToken::V1_1 { query_plan, source } => {
                Ok(PipelineContinuationToken::V2 { query_plan, source })
            }
            PipelineContinuationToken::V2 { query_plan, source } => {
                Err(LatestContinuationToken { query_plan, source })
            }
        }
    }

    /// 序列化为字符串；携带查询计划后超过 `size_budget_bytes` 时省略计划
    pub fn serialize(&self, size_budget_bytes: usize) -> String {
        match self {
            PipelineContinuationToken::V0 { source } => source.clone(),
            PipelineContinuationToken::V1 { source } => {
                render(Version::V1_0, None, source).unwrap_or_default()
            }
            PipelineContinuationToken::V1_1 { query_plan, source } => {
                render_with_budget(Version::V1_1, query_plan.as_ref(), source, size_budget_bytes)
            }
            PipelineContinuationToken::V2 { query_plan, source } => {
                render_with_budget(Version::V2_0, query_plan.as_ref(), source, size_budget_bytes)
            }
        }
    }
}

impl LatestContinuationToken {
    pub fn new(query_plan: Option<QueryPlan>, source: impl Into<String>) -> Self {
        Self {
            query_plan,
            source: source.into(),
        }
    }

    pub fn serialize(&self, size_budget_bytes: usize) -> String {
        render_with_budget(
            Version::LATEST,
            self.query_plan.as_ref(),
            &self.source,
            size_budget_bytes,
        )
    }
}

/// 仅当令牌是带 `Version` 字段的 JSON 对象时返回该对象
fn as_versioned_object(raw: &str) -> Option<Map<String, JsonValue>> {
    match serde_json::from_str::<JsonValue>(raw) {
        Ok(JsonValue::Object(object)) if object.contains_key(PROPERTY_VERSION) => Some(object),
        _ => None,
    }
}

fn read_version(object: &Map<String, JsonValue>, raw: &str) -> TokenResult<Version> {
    match object.get(PROPERTY_VERSION) {
        Some(JsonValue::String(text)) => Version::parse(text).ok_or_else(|| {
            ContinuationTokenError::malformed(
                Some(PROPERTY_VERSION),
                raw,
                format!("无法解析版本号 '{}'", text),
            )
        }),
        Some(_) => Err(ContinuationTokenError::malformed(
            Some(PROPERTY_VERSION),
            raw,
            "版本号必须是字符串",
        )),
        None => Err(ContinuationTokenError::missing_field(PROPERTY_VERSION, raw)),
    }
}

fn read_source(object: &Map<String, JsonValue>, raw: &str) -> TokenResult<String> {
    match object.get(PROPERTY_SOURCE) {
        Some(JsonValue::String(source)) => Ok(source.clone()),
        Some(JsonValue::Null) | None => {
            Err(ContinuationTokenError::missing_field(PROPERTY_SOURCE, raw))
        }
        // 嵌套的 JSON 源令牌按紧凑文本保存
        Some(other) => Ok(other.to_string()),
    }
}

fn read_query_plan(object: &Map<String, JsonValue>, raw: &str) -> TokenResult<Option<QueryPlan>> {
    match object.get(PROPERTY_QUERY_PLAN) {
        None | Some(JsonValue::Null) => Ok(None),
        Some(plan) => serde_json::from_value(plan.clone()).map(Some).map_err(|e| {
            ContinuationTokenError::malformed(Some(PROPERTY_QUERY_PLAN), raw, e.to_string())
        }),
    }
}

fn render(version: Version, query_plan: Option<&QueryPlan>, source: &str) -> Option<String> {
    let mut object = Map::new();
    object.insert(
        PROPERTY_VERSION.to_string(),
        JsonValue::String(version.to_string()),
    );
    if let Some(plan) = query_plan {
        object.insert(PROPERTY_QUERY_PLAN.to_string(), serde_json::to_value(plan).ok()?);
    }
    object.insert(
        PROPERTY_SOURCE.to_string(),
        JsonValue::String(source.to_string()),
    );
    serde_json::to_string(&JsonValue::Object(object)).ok()
}

fn render_with_budget(
    version: Version,
    query_plan: Option<&QueryPlan>,
    source: &str,
    size_budget_bytes: usize,
) -> String {
    if query_plan.is_some() {
        if let Some(text) = render(version, query_plan, source) {
            if text.len() <= size_budget_bytes {
                return text;
            }
            log::debug!(
                "续传令牌携带查询计划后为 {} 字节, 超过上限 {}, 省略查询计划",
                text.len(),
                size_budget_bytes
            );
        }
    }
    render(version, None, source).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::plan::{QueryInfo, SortOrder};

    fn sample_plan() -> QueryPlan {
        QueryPlan::new(QueryInfo {
            order_by: vec![SortOrder::Ascending],
            order_by_expressions: vec!["c.name".to_string()],
            ..Default::default()
        })
    }

    #[test]
    fn test_raw_backend_token_is_v0() {
        for raw in ["opaque-backend-token", "[{\"token\":null}]", "{\"other\":1}", "42"] {
            let token = PipelineContinuationToken::parse(raw).expect("Failed to parse token");
            assert_eq!(token.version(), Version::V0);
            assert_eq!(token.source(), raw);
        }
    }

    #[test]
    fn test_parse_versioned_tokens() {
        let v1 = PipelineContinuationToken::parse(r#"{"Version":"1.0","SourceContinuationToken":"abc"}"#)
            .expect("Failed to parse V1 token");
        assert_eq!(v1, PipelineContinuationToken::V1 { source: "abc".to_string() });

        let v2 = PipelineContinuationToken::parse(r#"{"Version":"2.0","QueryPlan":null,"SourceContinuationToken":"x"}"#)
            .expect("Failed to parse V2 token");
        assert_eq!(v2.version(), Version::V2_0);
        assert!(v2.query_plan().is_none());
    }

    #[test]
    fn test_missing_source_is_malformed() {
        let raw = r#"{"Version":"1.1","QueryPlan":null}"#;
        let err = PipelineContinuationToken::parse(raw).expect_err("Expected malformed token");
        match err {
            ContinuationTokenError::Malformed { field, raw: echoed, .. } => {
                assert_eq!(field.as_deref(), Some(PROPERTY_SOURCE));
                assert_eq!(echoed, raw);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_unparseable_version_is_malformed() {
        let err = PipelineContinuationToken::parse(r#"{"Version":"abc","SourceContinuationToken":"x"}"#)
            .expect_err("Expected malformed token");
        assert!(matches!(err, ContinuationTokenError::Malformed { .. }));
    }

    #[test]
    fn test_unknown_past_version_is_malformed() {
        for raw in [
            r#"{"Version":"1.5","SourceContinuationToken":"x"}"#,
            r#"{"Version":"0.0","SourceContinuationToken":"x"}"#,
        ] {
            let err = PipelineContinuationToken::parse(raw).expect_err("Expected malformed token");
            match err {
                ContinuationTokenError::Malformed { ref field, .. } => {
                    assert_eq!(field.as_deref(), Some(PROPERTY_VERSION));
                }
                ref other => panic!("unexpected error {:?}", other),
            }
            assert!(crate::core::PipelineError::from(err).requires_restart());
        }
    }

    #[test]
    fn test_future_token_detected_before_interpretation() {
        // 没有 SourceContinuationToken 字段，但版本检查先于字段解释
        let raw = r#"{"Version":"99.0","Whatever":true}"#;
        let err = PipelineContinuationToken::parse_with_max_version(raw, Version::V1_1)
            .expect_err("Expected future token error");
        assert_eq!(
            err,
            ContinuationTokenError::FromFuture {
                version: Version::new(99, 0),
                max_known: Version::V1_1,
                raw: raw.to_string(),
            }
        );
        assert_eq!(
            PipelineContinuationToken::detect_version(raw).expect("Failed to detect version"),
            Version::new(99, 0)
        );
    }

    #[test]
    fn test_v2_token_rejected_by_older_reader() {
        let latest = LatestContinuationToken::new(None, "src").serialize(16 * 1024);
        let err = PipelineContinuationToken::parse_with_max_version(&latest, Version::V1_1)
            .expect_err("Expected future token error");
        assert!(matches!(err, ContinuationTokenError::FromFuture { .. }));
        let token = PipelineContinuationToken::V2 { query_plan: None, source: "src".into() };
        assert!(token.is_from_future(Version::V1_1));
        assert!(!token.is_from_future(Version::LATEST));
    }

    #[test]
    fn test_upgrade_chain() {
        let token = PipelineContinuationToken::V0 { source: "raw".to_string() };
        let upgraded = token.upgrade().expect("Expected V1");
        assert_eq!(upgraded.version(), Version::V1_0);
        let latest = upgraded.upgrade_to_latest();
        assert_eq!(latest, LatestContinuationToken::new(None, "raw"));
        assert!(PipelineContinuationToken::from(latest).upgrade().is_none());
    }

    #[test]
    fn test_roundtrip_every_variant() {
        let variants = vec![
            PipelineContinuationToken::V0 { source: "backend".to_string() },
            PipelineContinuationToken::V1 { source: "s1".to_string() },
            PipelineContinuationToken::V1_1 { query_plan: Some(sample_plan()), source: "s2".to_string() },
            PipelineContinuationToken::V2 { query_plan: None, source: "[1,2]".to_string() },
        ];
        for token in variants {
            let latest = PipelineContinuationToken::from(token.upgrade_to_latest());
            let text = latest.serialize(16 * 1024);
            let parsed = PipelineContinuationToken::parse(&text).expect("Failed to reparse token");
            assert_eq!(parsed, latest);
        }
    }

    #[test]
    fn test_plan_elided_over_budget() {
        let token = PipelineContinuationToken::V1_1 {
            query_plan: Some(sample_plan()),
            source: "s".to_string(),
        };
        let full = token.serialize(16 * 1024);
        assert!(full.contains(PROPERTY_QUERY_PLAN));

        let trimmed = token.serialize(10);
        assert!(!trimmed.contains(PROPERTY_QUERY_PLAN));
        let parsed = PipelineContinuationToken::parse(&trimmed).expect("Failed to parse trimmed token");
        assert_eq!(parsed.source(), "s");
        assert!(parsed.query_plan().is_none());
    }
}
