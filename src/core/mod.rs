pub mod cancellation;
pub mod error;
pub mod murmur;
pub mod value;

// 错误和结果类型
pub use error::{
    ContinuationTokenError, FetchFailure, PipelineError, PipelineResult, QueryError, QueryResult,
    TokenResult,
};

// 核心数据类型
pub use cancellation::CancellationToken;
pub use value::{structural_hash, Element, ElementType, ItemComparer, Number, Number64};
