//! 协作式取消

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::core::error::{PipelineResult, QueryError};

/// 取消令牌，克隆后共享同一个取消标志
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// 已取消时返回 `QueryError::Cancelled`
    pub fn check(&self) -> PipelineResult<()> {
        if self.is_cancelled() {
            Err(QueryError::Cancelled.into())
        } else {
            Ok(())
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}
