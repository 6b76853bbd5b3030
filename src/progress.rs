//! 导出进度模块
//!
//! 进度记录是后台分块之间唯一共享的可变状态：
//! - `urls` 在任务创建时快照，之后不再变化
//! - `done_urls` 由各分块追加，永远是 `urls` 的子集且不重复
//! - 记录不存在表示当前没有进行中的导出
//!
//! 所有读-改-写都经过 [`ProgressTracker`] 内部的锁串行化，并发分块的追加不会互相覆盖。

// 标准库导入
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

// 第三方crate导入
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

// 本地模块导入
use crate::config::JobConfig;
use crate::constants::progress_config::PROGRESS_KEY;
use crate::discovery::dedup_preserving_order;
use crate::error::Result;

/// 单个导出任务的进度记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub config: JobConfig,
    pub urls: Vec<String>,
    #[serde(default)]
    pub done_urls: Vec<String>,
}

impl ProgressRecord {
    pub fn new(urls: Vec<String>, config: JobConfig, now: DateTime<Utc>) -> Self {
        Self {
            started_at: now,
            updated_at: now,
            config,
            urls: dedup_preserving_order(urls),
            done_urls: Vec::new(),
        }
    }

    /// 尚未完成的URL，保持原始顺序
    pub fn remaining(&self) -> Vec<String> {
        let done: HashSet<&str> = self.done_urls.iter().map(String::as_str).collect();
        self.urls
            .iter()
            .filter(|url| !done.contains(url.as_str()))
            .cloned()
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.done_urls.len() >= self.urls.len()
    }

    /// 超过阈值没有任何进展
    pub fn is_stale(&self, now: DateTime<Utc>, threshold: chrono::Duration) -> bool {
        now - self.updated_at > threshold
    }

    /// 追加已完成URL，返回是否真的发生了变化
    fn mark_done(&mut self, url: &str, now: DateTime<Utc>) -> bool {
        if !self.urls.iter().any(|u| u == url) || self.done_urls.iter().any(|u| u == url) {
            return false;
        }
        self.done_urls.push(url.to_string());
        self.updated_at = now;
        true
    }
}

/// 持久化的键值进度存储
#[async_trait]
pub trait ProgressStore: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<ProgressRecord>>;

    async fn save(&self, key: &str, record: &ProgressRecord) -> Result<()>;

    /// 删除记录，记录不存在不视为错误
    async fn delete(&self, key: &str) -> Result<()>;
}

/// 内存进度存储
#[derive(Debug, Default)]
pub struct MemoryProgressStore {
    records: Mutex<HashMap<String, ProgressRecord>>,
}

impl MemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProgressStore for MemoryProgressStore {
    async fn load(&self, key: &str) -> Result<Option<ProgressRecord>> {
        Ok(self.records.lock().await.get(key).cloned())
    }

    async fn save(&self, key: &str, record: &ProgressRecord) -> Result<()> {
        self.records.lock().await.insert(key.to_string(), record.clone());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.records.lock().await.remove(key);
        Ok(())
    }
}

/// 文件进度存储
///
/// 每个键对应状态目录下的一个JSON文件，写入先落到临时文件再原子重命名。
#[derive(Debug, Clone)]
pub struct FileProgressStore {
    dir: PathBuf,
}

impl FileProgressStore {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

#[async_trait]
impl ProgressStore for FileProgressStore {
    async fn load(&self, key: &str) -> Result<Option<ProgressRecord>> {
        let path = self.record_path(key);
        match tokio::fs::read_to_string(&path).await {
            Ok(json) => {
                let record = serde_json::from_str(&json).map_err(|e| {
                    crate::export_error!(progress, "解析", format!("{}: {}", path.display(), e))
                })?;
                Ok(Some(record))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(crate::export_error!(progress, "读取", format!("{}: {}", path.display(), e))),
        }
    }

    async fn save(&self, key: &str, record: &ProgressRecord) -> Result<()> {
        let to_error = |e: std::io::Error| crate::export_error!(progress, "写入", e);

        tokio::fs::create_dir_all(&self.dir).await.map_err(to_error)?;

        let path = self.record_path(key);
        let temp_path = self.dir.join(format!(".{}.json.tmp", key));
        let json = serde_json::to_string_pretty(record)?;

        tokio::fs::write(&temp_path, json).await.map_err(to_error)?;
        tokio::fs::rename(&temp_path, &path).await.map_err(to_error)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match tokio::fs::remove_file(self.record_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(crate::export_error!(progress, "删除", e)),
        }
    }
}

/// 进度跟踪器
///
/// 同一进程内对同一个键的所有读-改-写都在锁内完成。
pub struct ProgressTracker {
    store: Arc<dyn ProgressStore>,
    key: String,
    lock: Mutex<()>,
}

impl ProgressTracker {
    pub fn new(store: Arc<dyn ProgressStore>) -> Self {
        Self::with_key(store, PROGRESS_KEY)
    }

    pub fn with_key(store: Arc<dyn ProgressStore>, key: &str) -> Self {
        Self {
            store,
            key: key.to_string(),
            lock: Mutex::new(()),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// 读取当前记录
    pub async fn load(&self) -> Result<Option<ProgressRecord>> {
        let _guard = self.lock.lock().await;
        self.store.load(&self.key).await
    }

    /// 是否有进行中的导出
    pub async fn is_active(&self) -> Result<bool> {
        Ok(self.load().await?.is_some())
    }

    /// 创建新任务的进度记录
    ///
    /// 已有记录时返回错误，同一时间最多一个任务。
    pub async fn create(&self, urls: Vec<String>, config: JobConfig) -> Result<ProgressRecord> {
        let _guard = self.lock.lock().await;
        if self.store.load(&self.key).await?.is_some() {
            return Err(crate::export_error!(progress, "创建", "已有进行中的导出任务"));
        }

        let record = ProgressRecord::new(urls, config, Utc::now());
        self.store.save(&self.key, &record).await?;
        info!("📝 创建进度记录: {} 个URL", record.urls.len());
        Ok(record)
    }

    /// 标记URL已完成
    ///
    /// 返回是否新增；记录不存在、URL不属于任务或已完成时返回false。
    pub async fn mark_done(&self, url: &str) -> Result<bool> {
        let _guard = self.lock.lock().await;
        let Some(mut record) = self.store.load(&self.key).await? else {
            return Ok(false);
        };

        if !record.mark_done(url, Utc::now()) {
            return Ok(false);
        }
        self.store.save(&self.key, &record).await?;
        debug!("进度 {}/{}: {}", record.done_urls.len(), record.urls.len(), url);
        Ok(true)
    }

    /// 刷新更新时间，恢复任务时使用
    pub async fn touch(&self) -> Result<Option<ProgressRecord>> {
        let _guard = self.lock.lock().await;
        let Some(mut record) = self.store.load(&self.key).await? else {
            return Ok(None);
        };
        record.updated_at = Utc::now();
        self.store.save(&self.key, &record).await?;
        Ok(Some(record))
    }

    /// 全部完成时删除记录，返回是否已删除
    pub async fn complete_if_done(&self) -> Result<bool> {
        let _guard = self.lock.lock().await;
        match self.store.load(&self.key).await? {
            Some(record) if record.is_complete() => {
                self.store.delete(&self.key).await?;
                info!("✅ 导出任务完成: {} 个URL", record.urls.len());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// 未完成的URL
    pub async fn remaining(&self) -> Result<Vec<String>> {
        Ok(self.load().await?.map(|r| r.remaining()).unwrap_or_default())
    }

    /// 丢弃当前记录
    pub async fn clear(&self) -> Result<()> {
        let _guard = self.lock.lock().await;
        self.store.delete(&self.key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExportError;

    fn urls(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("http://example.com/p{}/", i)).collect()
    }

    /// 读写之间主动让出调度的存储，用于暴露未加锁的读-改-写
    #[derive(Default)]
    struct YieldingStore {
        inner: MemoryProgressStore,
    }

    #[async_trait]
    impl ProgressStore for YieldingStore {
        async fn load(&self, key: &str) -> Result<Option<ProgressRecord>> {
            let record = self.inner.load(key).await;
            tokio::task::yield_now().await;
            record
        }

        async fn save(&self, key: &str, record: &ProgressRecord) -> Result<()> {
            tokio::task::yield_now().await;
            self.inner.save(key, record).await
        }

        async fn delete(&self, key: &str) -> Result<()> {
            self.inner.delete(key).await
        }
    }

    #[test]
    fn test_record_invariants() {
        let now = Utc::now();
        let mut record = ProgressRecord::new(
            vec!["a".into(), "b".into(), "a".into()],
            JobConfig::default(),
            now,
        );
        assert_eq!(record.urls, vec!["a", "b"]);

        assert!(record.mark_done("a", now));
        assert!(!record.mark_done("a", now));
        assert!(!record.mark_done("zzz", now));
        assert_eq!(record.remaining(), vec!["b"]);
        assert!(!record.is_complete());

        assert!(record.mark_done("b", now));
        assert!(record.is_complete());
    }

    #[test]
    fn test_record_staleness() {
        let now = Utc::now();
        let record = ProgressRecord::new(urls(1), JobConfig::default(), now - chrono::Duration::hours(2));
        assert!(record.is_stale(now, chrono::Duration::hours(1)));
        assert!(!record.is_stale(now, chrono::Duration::hours(3)));
    }

    #[tokio::test]
    async fn test_concurrent_appends_are_not_lost() {
        let tracker = Arc::new(ProgressTracker::new(Arc::new(YieldingStore::default())));
        let all = urls(64);
        tracker.create(all.clone(), JobConfig::default()).await.unwrap();

        let handles: Vec<_> = all
            .iter()
            .cloned()
            .map(|url| {
                let tracker = tracker.clone();
                tokio::spawn(async move { tracker.mark_done(&url).await.unwrap() })
            })
            .collect();
        for handle in handles {
            assert!(handle.await.unwrap());
        }

        let record = tracker.load().await.unwrap().unwrap();
        assert_eq!(record.done_urls.len(), 64);
        assert!(record.is_complete());
        assert!(tracker.complete_if_done().await.unwrap());
        assert!(!tracker.is_active().await.unwrap());
    }

    #[tokio::test]
    async fn test_only_one_job_at_a_time() {
        let tracker = ProgressTracker::new(Arc::new(MemoryProgressStore::new()));
        tracker.create(urls(2), JobConfig::default()).await.unwrap();
        let err = tracker.create(urls(3), JobConfig::default()).await.unwrap_err();
        assert!(
            matches!(&err, ExportError::ProgressStore { operation, .. } if operation == "创建"),
            "意外的错误: {}",
            err
        );
    }

    #[tokio::test]
    async fn test_mark_done_without_record_is_noop() {
        let tracker = ProgressTracker::new(Arc::new(MemoryProgressStore::new()));
        assert!(!tracker.mark_done("http://example.com/").await.unwrap());
        assert!(!tracker.complete_if_done().await.unwrap());
        assert!(tracker.remaining().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_incomplete_job_keeps_record() {
        let tracker = ProgressTracker::new(Arc::new(MemoryProgressStore::new()));
        let all = urls(3);
        tracker.create(all.clone(), JobConfig::default()).await.unwrap();
        tracker.mark_done(&all[0]).await.unwrap();

        assert!(!tracker.complete_if_done().await.unwrap());
        assert_eq!(tracker.remaining().await.unwrap(), all[1..].to_vec());
    }

    #[tokio::test]
    async fn test_file_store_round_trip_and_resume() {
        let dir = tempfile::tempdir().unwrap();
        let config = JobConfig::new(Some("staging".to_string()));
        let all = urls(3);

        {
            let tracker = ProgressTracker::new(Arc::new(FileProgressStore::new(dir.path())));
            tracker.create(all.clone(), config.clone()).await.unwrap();
            tracker.mark_done(&all[1]).await.unwrap();
        }

        // 新进程读取同一目录
        let tracker = ProgressTracker::new(Arc::new(FileProgressStore::new(dir.path())));
        let record = tracker.load().await.unwrap().unwrap();
        assert_eq!(record.config, config);
        assert_eq!(record.done_urls, vec![all[1].clone()]);
        assert_eq!(tracker.remaining().await.unwrap(), vec![all[0].clone(), all[2].clone()]);

        assert!(dir.path().join(format!("{}.json", PROGRESS_KEY)).exists());
        tracker.clear().await.unwrap();
        assert!(!dir.path().join(format!("{}.json", PROGRESS_KEY)).exists());
        // 重复删除不报错
        tracker.clear().await.unwrap();
    }

    #[tokio::test]
    async fn test_file_store_rejects_corrupt_record() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.json"), "{not json").unwrap();

        let store = FileProgressStore::new(dir.path());
        assert!(store.load("broken").await.is_err());
        assert!(store.load("missing").await.unwrap().is_none());
    }
}
