//! 后台分块导出任务
//!
//! 状态流转：`Idle → Triggered → Running → Completed`
//!
//! - 触发：已有进行中的任务或等待中的触发时忽略请求，同一时间最多一个任务
//! - 启动：防抖延迟后执行一次发现，快照URL列表并写入进度记录，按固定大小分块调度
//! - 分块：按列表顺序逐个 抓取 → 改写 → 写入 → 标记完成；失败的URL跳过，不标记完成
//! - 完成：每个分块结束后检查，全部完成时删除进度记录
//!
//! 进度记录长时间没有更新时可以通过 [`JobRunner::recover_stale`] 重新调度剩余URL。

// 标准库导入
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

// 第三方crate导入
use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

// 本地模块导入
use crate::config::{ExportSettings, JobConfig};
use crate::constants::export_config;
use crate::error::Result;
use crate::orchestrator::Exporter;
use crate::progress::{ProgressRecord, ProgressTracker};
use crate::scheduler::Scheduler;

/// 防抖触发使用的调度键
const TRIGGER_KEY: &str = "static_page_export";

/// 任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Idle,
    Triggered,
    Running,
    Completed,
}

/// 单个分块的执行结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkReport {
    pub saved: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// 后台任务执行器
#[derive(Clone)]
pub struct JobRunner {
    inner: Arc<RunnerInner>,
}

struct RunnerInner {
    exporter: Exporter,
    tracker: ProgressTracker,
    scheduler: Scheduler,
    chunk_size: usize,
    debounce: Duration,
    stale_after: chrono::Duration,
    completed: AtomicBool,
}

impl JobRunner {
    pub fn new(exporter: Exporter, tracker: ProgressTracker) -> Self {
        Self {
            inner: Arc::new(RunnerInner {
                exporter,
                tracker,
                scheduler: Scheduler::new(),
                chunk_size: export_config::DEFAULT_CHUNK_SIZE,
                debounce: Duration::from_secs(export_config::DEFAULT_DEBOUNCE_SECONDS),
                stale_after: chrono::Duration::seconds(export_config::DEFAULT_STALE_AFTER_SECONDS),
                completed: AtomicBool::new(false),
            }),
        }
    }

    /// 按导出设置创建执行器
    pub fn from_settings(settings: &ExportSettings, exporter: Exporter, tracker: ProgressTracker) -> Self {
        Self::with_options(
            exporter,
            tracker,
            settings.chunk_size(),
            settings.debounce(),
            settings.stale_after(),
        )
    }

    pub fn with_options(
        exporter: Exporter,
        tracker: ProgressTracker,
        chunk_size: usize,
        debounce: Duration,
        stale_after: chrono::Duration,
    ) -> Self {
        Self {
            inner: Arc::new(RunnerInner {
                exporter,
                tracker,
                scheduler: Scheduler::new(),
                chunk_size: chunk_size.max(1),
                debounce,
                stale_after,
                completed: AtomicBool::new(false),
            }),
        }
    }

    pub fn exporter(&self) -> &Exporter {
        &self.inner.exporter
    }

    pub fn tracker(&self) -> &ProgressTracker {
        &self.inner.tracker
    }

    /// 当前状态
    pub async fn state(&self) -> Result<JobState> {
        if self.inner.scheduler.is_pending(TRIGGER_KEY) {
            return Ok(JobState::Triggered);
        }
        if self.inner.tracker.is_active().await? {
            return Ok(JobState::Running);
        }
        if self.inner.completed.load(Ordering::Acquire) {
            return Ok(JobState::Completed);
        }
        Ok(JobState::Idle)
    }

    /// 请求一次导出
    ///
    /// 返回false表示已有任务在等待或执行，本次请求被忽略。
    pub async fn trigger(&self, config: JobConfig) -> Result<bool> {
        if self.inner.tracker.is_active().await? {
            info!("⏭️  已有导出任务进行中，忽略本次触发");
            return Ok(false);
        }

        let runner = self.clone();
        let scheduled = self.inner.scheduler.schedule(TRIGGER_KEY, self.inner.debounce, async move {
            if let Err(e) = runner.start_job(config).await {
                error!("❌ 启动导出任务失败: {}", e);
            }
        });

        if scheduled {
            self.inner.completed.store(false, Ordering::Release);
            info!("⏰ 导出任务已触发，{:?} 后开始", self.inner.debounce);
        } else {
            info!("⏭️  导出任务已在等待中，忽略本次触发");
        }
        Ok(scheduled)
    }

    /// 发现URL、创建进度记录并调度全部分块，返回分块数量
    pub async fn start_job(&self, config: JobConfig) -> Result<usize> {
        if self.inner.tracker.is_active().await? {
            warn!("⚠️  已有进行中的导出任务，不再启动新任务");
            return Ok(0);
        }

        let urls = self.inner.exporter.discover_urls(&config);
        let record = self.inner.tracker.create(urls, config).await?;
        self.inner.completed.store(false, Ordering::Release);

        if record.urls.is_empty() {
            self.finish_if_done().await?;
            return Ok(0);
        }

        Ok(self.enqueue(record.urls, record.config))
    }

    /// 把URL按分块大小切分并逐块调度
    fn enqueue(&self, urls: Vec<String>, config: JobConfig) -> usize {
        let mut scheduled = 0;
        for chunk in urls.chunks(self.inner.chunk_size) {
            let key = format!("chunk:{}:{}", chunk[0], chunk.len());
            let runner = self.clone();
            let chunk = chunk.to_vec();
            let config = config.clone();

            let accepted = self.inner.scheduler.schedule(&key, Duration::ZERO, async move {
                match runner.run_chunk(&chunk, &config).await {
                    Ok(report) => debug!("分块完成: {:?}", report),
                    Err(e) => error!("❌ 分块执行失败: {}", e),
                }
            });
            if accepted {
                scheduled += 1;
            }
        }

        info!("📦 已调度 {} 个分块 (共 {} 个URL)", scheduled, urls.len());
        scheduled
    }

    /// 执行一个分块
    ///
    /// 单个URL失败不会中断分块；已完成的URL会被跳过。
    pub async fn run_chunk(&self, urls: &[String], config: &JobConfig) -> Result<ChunkReport> {
        let mut report = ChunkReport::default();
        let done = match self.inner.tracker.load().await? {
            Some(record) => record.done_urls,
            None => {
                debug!("进度记录不存在，跳过分块");
                report.skipped = urls.len();
                return Ok(report);
            }
        };

        for url in urls {
            if done.contains(url) {
                report.skipped += 1;
                continue;
            }

            match self.inner.exporter.export_page(url, config).await {
                Ok(_) => {
                    self.inner.tracker.mark_done(url).await?;
                    report.saved += 1;
                }
                Err(e) => {
                    warn!("⚠️  跳过 {}: {}", url, e);
                    report.failed += 1;
                }
            }
        }

        self.finish_if_done().await?;
        Ok(report)
    }

    async fn finish_if_done(&self) -> Result<bool> {
        let finished = self.inner.tracker.complete_if_done().await?;
        if finished {
            self.inner.completed.store(true, Ordering::Release);
        }
        Ok(finished)
    }

    /// 重新调度未完成任务的剩余URL，返回分块数量
    pub async fn resume(&self) -> Result<usize> {
        let Some(record) = self.inner.tracker.touch().await? else {
            info!("没有未完成的导出任务");
            return Ok(0);
        };

        let remaining = record.remaining();
        if remaining.is_empty() {
            self.finish_if_done().await?;
            return Ok(0);
        }

        info!("🔄 恢复导出任务: 剩余 {}/{} 个URL", remaining.len(), record.urls.len());
        Ok(self.enqueue(remaining, record.config))
    }

    /// 进度记录超过阈值没有更新时重新调度
    pub async fn recover_stale(&self, now: DateTime<Utc>) -> Result<usize> {
        match self.inner.tracker.load().await? {
            Some(record) if record.is_stale(now, self.inner.stale_after) => {
                warn!(
                    "⚠️  导出任务已停滞 (最后更新 {})，重新调度剩余URL",
                    record.updated_at.to_rfc3339()
                );
                self.resume().await
            }
            _ => Ok(0),
        }
    }

    /// 内容被删除时移除对应的静态文件
    ///
    /// 文件不存在只记录警告，返回false。
    pub async fn on_content_removed(&self, url: &str, config: &JobConfig) -> Result<bool> {
        match self.inner.exporter.persister().remove(url, config).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => {
                warn!("⚠️  静态文件不存在，无需删除: {}", url);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// 当前进度记录
    pub async fn progress(&self) -> Result<Option<ProgressRecord>> {
        self.inner.tracker.load().await
    }

    /// 等待所有已调度的工作结束
    pub async fn wait_idle(&self) {
        self.inner.scheduler.wait_idle().await;
    }
}
