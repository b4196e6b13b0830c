//! 分区拉取器
//!
//! 每个分区范围对应一个 `ItemProducer`：从数据源拉取结果页并缓存，对外提供带页边界感知的文档游标。
//!
//! ## 并发约定
//!
//! - 同一时刻最多一个拉取在途（`fetch_lock`），不同拉取器之间可并发
//! - 拉取失败不抛出，而是作为失败项进入页队列；出现失败后不再发起新的拉取
//! - 计数器使用原子变量，游标状态由短临界区保护
//!
//! ## 游标约定
//!
//! `try_move_next_page` 切换到下一页后，第一次 `try_move_next_document_within_page` 只是让游标指向首个文档，
//! 之后每次移动都消耗一个文档。当前页没有消耗完之前切换页是调用错误。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::PipelineConfig;
use crate::core::error::{PipelineError, PipelineResult, QueryError};
use crate::core::{CancellationToken, Element};
use crate::query::plan::QuerySpec;
use crate::query::producer::data_source::{QueryDataSource, QueryPage, QueryPageDiagnostics};
use crate::query::producer::page_queue::PageQueue;
use crate::query::range::PartitionKeyRange;

/// 一次成功拉取的统计
#[derive(Debug, Clone, PartialEq)]
pub struct FetchCompletion {
    pub item_count: usize,
    pub request_charge: f64,
    pub diagnostics: QueryPageDiagnostics,
    pub response_bytes: i64,
}

/// 拉取完成回调
pub type FetchCompletionCallback = Arc<dyn Fn(FetchCompletion) + Send + Sync>;

/// 判断两个相邻文档是否"相同"，用于维护 `is_active`
pub type ElementEquality = Arc<dyn Fn(&Element, &Element) -> bool + Send + Sync>;

/// 页大小参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSizePolicy {
    pub initial: usize,
    pub max: usize,
    pub growth_factor: f64,
}

impl PageSizePolicy {
    pub fn next(&self, current: usize) -> usize {
        let grown = (current as f64 * self.growth_factor) as usize;
        grown.max(current).min(self.max).max(1)
    }
}

impl From<&PipelineConfig> for PageSizePolicy {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            initial: config.initial_page_size.min(config.max_item_count),
            max: config.max_item_count,
            growth_factor: config.page_size_growth_factor,
        }
    }
}

#[derive(Debug)]
struct FetchProgress {
    backend_token: Option<String>,
    has_started_fetching: bool,
    hit_failure: bool,
    activity_id: Option<String>,
}

impl FetchProgress {
    fn has_more_backend_results(&self) -> bool {
        !self.has_started_fetching
            || self
                .backend_token
                .as_deref()
                .map(|token| !token.is_empty())
                .unwrap_or(false)
    }
}

#[derive(Debug)]
struct Cursor {
    page: VecDeque<Element>,
    current: Option<Element>,
    has_page: bool,
    primed: bool,
    at_beginning_of_page: bool,
    previous_token: Option<String>,
    current_token: Option<String>,
    is_active: bool,
    has_more_results: bool,
}

/// 分区拉取器
pub struct ItemProducer {
    range: PartitionKeyRange,
    query: QuerySpec,
    data_source: Arc<dyn QueryDataSource>,
    pages: PageQueue,
    fetch_lock: tokio::sync::Mutex<()>,
    progress: Mutex<FetchProgress>,
    cursor: Mutex<Cursor>,
    buffered_item_count: AtomicI64,
    items_left_in_current_page: AtomicI64,
    page_size: AtomicUsize,
    page_index: AtomicU64,
    stopped: AtomicBool,
    page_size_policy: PageSizePolicy,
    on_complete: FetchCompletionCallback,
    equality: ElementEquality,
}

impl std::fmt::Debug for ItemProducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ItemProducer")
            .field("range", &self.range)
            .field("buffered_item_count", &self.buffered_item_count())
            .field("items_left_in_current_page", &self.items_left_in_current_page())
            .field("has_more_results", &self.has_more_results())
            .finish()
    }
}

impl ItemProducer {
    pub fn new(
        range: PartitionKeyRange,
        query: QuerySpec,
        data_source: Arc<dyn QueryDataSource>,
        initial_token: Option<String>,
        page_size_policy: PageSizePolicy,
        on_complete: FetchCompletionCallback,
        equality: ElementEquality,
    ) -> Self {
        let resumed = initial_token
            .as_deref()
            .map(|token| !token.is_empty())
            .unwrap_or(false);

        Self {
            range,
            query,
            data_source,
            pages: PageQueue::new(),
            fetch_lock: tokio::sync::Mutex::new(()),
            progress: Mutex::new(FetchProgress {
                backend_token: initial_token.clone(),
                has_started_fetching: resumed,
                hit_failure: false,
                activity_id: None,
            }),
            cursor: Mutex::new(Cursor {
                page: VecDeque::new(),
                current: None,
                has_page: false,
                primed: false,
                at_beginning_of_page: false,
                previous_token: initial_token.clone(),
                current_token: initial_token,
                is_active: resumed,
                has_more_results: true,
            }),
            buffered_item_count: AtomicI64::new(0),
            items_left_in_current_page: AtomicI64::new(0),
            page_size: AtomicUsize::new(page_size_policy.initial.max(1)),
            page_index: AtomicU64::new(0),
            stopped: AtomicBool::new(false),
            page_size_policy,
            on_complete,
            equality,
        }
    }

    /// 缓冲区为空时拉取一页
    pub async fn buffer_more_if_empty(&self, cancellation: &CancellationToken) -> PipelineResult<()> {
        cancellation.check()?;
        if self.pages.is_empty() {
            self.buffer_more(cancellation).await?;
        }
        Ok(())
    }

    /// 拉取一页并放入缓冲区
    ///
    /// 只有取消会以错误返回；后端失败与契约违反会被缓存，在消费端排到时重放。
    /// 停止后不再拉取。
    pub async fn buffer_more(&self, cancellation: &CancellationToken) -> PipelineResult<()> {
        cancellation.check()?;
        if self.is_stopped() {
            return Ok(());
        }
        let _fetch_guard = self.fetch_lock.lock().await;
        if self.is_stopped() {
            return Ok(());
        }

        let backend_token = {
            let progress = self.progress.lock();
            if !progress.has_more_backend_results() || progress.hit_failure {
                return Ok(());
            }
            progress.backend_token.clone()
        };
        let page_size = self.page_size.load(Ordering::SeqCst);

        log::debug!(
            "分区 {} 开始拉取: page_size={}, continuation={:?}",
            self.range.id,
            page_size,
            backend_token
        );
        let result = self
            .data_source
            .execute_query(&self.query, backend_token.as_deref(), &self.range, page_size)
            .await;

        match result {
            Err(failure) => {
                {
                    let mut progress = self.progress.lock();
                    progress.has_started_fetching = true;
                    progress.hit_failure = true;
                    progress.activity_id = failure.activity_id.clone();
                }
                log::warn!("分区 {} 拉取失败, 已缓存: {}", self.range.id, failure);
                self.pages.push(Err(failure.into()));
            }
            Ok(page) => self.accept_page(page),
        }
        Ok(())
    }

    fn accept_page(&self, page: QueryPage) {
        if let Some(reason) = page.contract_violation() {
            {
                let mut progress = self.progress.lock();
                progress.has_started_fetching = true;
                progress.hit_failure = true;
            }
            log::warn!("分区 {} 返回的结果页违反契约: {}", self.range.id, reason);
            self.pages
                .push(Err(QueryError::ContractViolation(reason).into()));
            return;
        }

        {
            let mut progress = self.progress.lock();
            progress.has_started_fetching = true;
            progress.backend_token = page.continuation_token.clone();
            progress.activity_id = Some(page.activity_id.clone());
        }

        let item_count = page.documents.len();
        let completion = FetchCompletion {
            item_count,
            request_charge: page.request_charge,
            response_bytes: page.response_bytes,
            diagnostics: QueryPageDiagnostics {
                partition_range_id: self.range.id.clone(),
                activity_id: page.activity_id.clone(),
                request_charge: page.request_charge,
                item_count,
                response_bytes: page.response_bytes,
            },
        };

        self.buffered_item_count
            .fetch_add(item_count as i64, Ordering::SeqCst);
        self.pages.push(Ok(page));

        let current = self.page_size.load(Ordering::SeqCst);
        self.page_size
            .store(self.page_size_policy.next(current), Ordering::SeqCst);

        log::trace!(
            "分区 {} 缓存了 {} 条结果, 费用 {}",
            self.range.id,
            item_count,
            completion.request_charge
        );
        (self.on_complete)(completion);
    }

    /// 切换到下一个缓存页
    ///
    /// 返回 `Ok(false)` 表示没有更多页。缓存的拉取失败在这里重放。
    pub async fn try_move_next_page(&self, cancellation: &CancellationToken) -> PipelineResult<bool> {
        cancellation.check()?;
        let items_left = self.items_left_in_current_page();
        if items_left != 0 {
            return Err(PipelineError::invalid_operation(format!(
                "分区 {} 的当前页还剩 {} 条结果, 不能切换到下一页",
                self.range.id, items_left
            )));
        }

        self.buffer_more_if_empty(cancellation).await?;

        match self.pages.pop() {
            None => {
                self.cursor.lock().has_more_results = false;
                Ok(false)
            }
            Some(Err(err)) => {
                self.cursor.lock().has_more_results = false;
                Err(err)
            }
            Some(Ok(page)) => {
                let count = page.documents.len();
                {
                    let mut cursor = self.cursor.lock();
                    cursor.previous_token = cursor.current_token.take();
                    cursor.current_token = page.continuation_token;
                    cursor.page = page.documents.into();
                    cursor.current = None;
                    cursor.has_page = true;
                    cursor.primed = false;
                    cursor.at_beginning_of_page = false;
                }
                self.items_left_in_current_page
                    .store(count as i64, Ordering::SeqCst);
                self.page_index.fetch_add(1, Ordering::SeqCst);
                Ok(true)
            }
        }
    }

    /// 在当前页内移动到下一个文档
    pub fn try_move_next_document_within_page(&self) -> bool {
        let mut cursor = self.cursor.lock();
        if !cursor.has_page {
            return false;
        }

        let original = cursor.current.take();
        cursor.current = cursor.page.pop_front();
        let moved = cursor.current.is_some();

        let changed = match (&original, &cursor.current) {
            (Some(before), Some(after)) => !(self.equality)(before, after),
            (Some(_), None) => true,
            _ => false,
        };
        if !moved || changed {
            cursor.is_active = false;
        }

        if !cursor.primed {
            cursor.at_beginning_of_page = true;
            cursor.primed = true;
        } else {
            // 只有离开一个文档时才算消耗；页已耗尽后重复调用不改变计数
            if original.is_some() {
                self.buffered_item_count.fetch_sub(1, Ordering::SeqCst);
                self.items_left_in_current_page
                    .fetch_sub(1, Ordering::SeqCst);
            }
            cursor.at_beginning_of_page = false;
        }

        if !moved && cursor.current_token.is_none() {
            cursor.has_more_results = false;
        }
        moved
    }

    /// 不再发起新的拉取，已缓存的页仍可消费
    pub fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            log::debug!("分区 {} 已停止拉取", self.range.id);
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn range(&self) -> &PartitionKeyRange {
        &self.range
    }

    pub fn current(&self) -> Option<Element> {
        self.cursor.lock().current.clone()
    }

    /// 在不克隆的情况下读取当前文档
    pub fn with_current<R>(&self, f: impl FnOnce(Option<&Element>) -> R) -> R {
        let cursor = self.cursor.lock();
        f(cursor.current.as_ref())
    }

    /// 拉取当前页所用的续传令牌
    pub fn previous_continuation_token(&self) -> Option<String> {
        self.cursor.lock().previous_token.clone()
    }

    /// 当前页之后的续传令牌
    pub fn current_continuation_token(&self) -> Option<String> {
        self.cursor.lock().current_token.clone()
    }

    /// 最近一次成功拉取返回的续传令牌，拆分后子分区从这里继续
    pub fn backend_continuation_token(&self) -> Option<String> {
        self.progress.lock().backend_token.clone()
    }

    pub fn is_active(&self) -> bool {
        self.cursor.lock().is_active
    }

    pub fn is_at_beginning_of_page(&self) -> bool {
        self.cursor.lock().at_beginning_of_page
    }

    /// 停止后只有仍缓存在游标或页队列中的结果才算
    pub fn has_more_results(&self) -> bool {
        let cursor = self.cursor.lock();
        if !cursor.has_more_results {
            return false;
        }
        if !self.is_stopped() {
            return true;
        }
        cursor.current.is_some() || !cursor.page.is_empty() || !self.pages.is_empty()
    }

    pub fn has_more_backend_results(&self) -> bool {
        self.progress.lock().has_more_backend_results()
    }

    pub fn has_hit_failure(&self) -> bool {
        self.progress.lock().hit_failure
    }

    pub fn activity_id(&self) -> Option<String> {
        self.progress.lock().activity_id.clone()
    }

    pub fn items_left_in_current_page(&self) -> i64 {
        self.items_left_in_current_page.load(Ordering::SeqCst)
    }

    pub fn buffered_item_count(&self) -> i64 {
        self.buffered_item_count.load(Ordering::SeqCst)
    }

    pub fn buffered_page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn page_size(&self) -> usize {
        self.page_size.load(Ordering::SeqCst)
    }

    /// 已切换过的页数，用于判断游标是否离开了某一页
    pub fn page_index(&self) -> u64 {
        self.page_index.load(Ordering::SeqCst)
    }
}
