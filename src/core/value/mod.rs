//! Element 模块 - 查询结果元素类型系统
//!
//! - 类型定义 (`types.rs`)
//! - 全序比较 (`comparison.rs`)
//! - 结构哈希 (`hash.rs`)
//! - JSON 转换 (`conversion.rs`)

pub mod comparison;
pub mod conversion;
pub mod hash;
pub mod types;

pub use comparison::ItemComparer;
pub use hash::structural_hash;
pub use types::*;
