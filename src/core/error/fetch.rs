//! 后端拉取失败
//!
//! 数据源在自身重试耗尽后返回的终态失败。分区拉取器会把它连同成功页一起缓存，
//! 消费端在排到该位置时才观察到它。

use thiserror::Error;

/// HTTP 410 Gone
pub const STATUS_GONE: u16 = 410;
/// HTTP 429 Too Many Requests
pub const STATUS_THROTTLED: u16 = 429;
/// 分区范围已不存在（拆分/合并）的子状态码
pub const SUB_STATUS_PARTITION_RANGE_GONE: u32 = 1002;

/// 分区拉取失败
#[derive(Error, Debug, Clone, PartialEq)]
#[error("[{status_code}{}] {message}", sub_status_suffix(.sub_status_code))]
pub struct FetchFailure {
    pub status_code: u16,
    pub sub_status_code: Option<u32>,
    pub message: String,
    pub activity_id: Option<String>,
}

fn sub_status_suffix(sub_status: &Option<u32>) -> String {
    match sub_status {
        Some(code) => format!("/{}", code),
        None => String::new(),
    }
}

impl FetchFailure {
    pub fn new(status_code: u16, message: impl Into<String>) -> Self {
        Self {
            status_code,
            sub_status_code: None,
            message: message.into(),
            activity_id: None,
        }
    }

    /// 分区范围已拆分或合并，需要重新解析分区映射
    pub fn partition_range_gone(message: impl Into<String>) -> Self {
        Self {
            status_code: STATUS_GONE,
            sub_status_code: Some(SUB_STATUS_PARTITION_RANGE_GONE),
            message: message.into(),
            activity_id: None,
        }
    }

    pub fn with_sub_status(mut self, sub_status_code: u32) -> Self {
        self.sub_status_code = Some(sub_status_code);
        self
    }

    pub fn with_activity_id(mut self, activity_id: impl Into<String>) -> Self {
        self.activity_id = Some(activity_id.into());
        self
    }

    pub fn is_partition_gone(&self) -> bool {
        self.status_code == STATUS_GONE
            && self.sub_status_code == Some(SUB_STATUS_PARTITION_RANGE_GONE)
    }

    pub fn is_throttled(&self) -> bool {
        self.status_code == STATUS_THROTTLED
    }
}
