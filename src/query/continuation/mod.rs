//! 续传令牌模型
//!
//! - 版本号 (`version.rs`)
//! - 最外层带版本的流水线令牌 (`pipeline_token.rs`)
//! - 分区级 composite 令牌 (`composite.rs`)
//!
//! 各执行组件自己的令牌层（Top/Limit/Offset/Distinct/OrderBy）与组件放在一起。

pub mod composite;
pub mod pipeline_token;
pub mod version;

pub use composite::{parse_composite_tokens, serialize_composite_tokens, CompositeContinuationToken};
pub use pipeline_token::{LatestContinuationToken, PipelineContinuationToken};
pub use version::Version;
