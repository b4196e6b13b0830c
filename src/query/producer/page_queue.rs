//! 线程安全的结果页队列
//!
//! 成功页与拉取失败按到达顺序一起排队，失败在排到它时才被消费端观察到。

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::core::error::PipelineResult;
use crate::query::producer::data_source::QueryPage;

#[derive(Debug, Default)]
pub struct PageQueue {
    pages: Mutex<VecDeque<PipelineResult<QueryPage>>>,
}

impl PageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, page: PipelineResult<QueryPage>) {
        self.pages.lock().push_back(page);
    }

    pub fn pop(&self) -> Option<PipelineResult<QueryPage>> {
        self.pages.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.pages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.lock().is_empty()
    }
}
