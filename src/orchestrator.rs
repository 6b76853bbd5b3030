//! 交互式导出编排模块
//!
//! 两种同步模式：
//! - 一次性模式：抓取全部 → 过滤失败 → 改写全部 → 写入全部
//! - 并发模式：每个URL一个工作任务，独立完成抓取、改写、写入
//!
//! 单个URL失败只会记录在报告中，不会中断整个批次；
//! 只有工作任务本身异常退出才是致命错误。

// 标准库导入
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

// 第三方crate导入
use futures::stream::{self, StreamExt};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

// 本地模块导入
use crate::config::{ExportSettings, JobConfig};
use crate::content_store::ContentStore;
use crate::discovery::Discovery;
use crate::error::{ExportError, Result};
use crate::fetcher::{FetchResult, FetchedPage, FetcherConfig, PageFetcher};
use crate::mapper::DestinationMapper;
use crate::persister::Persister;
use crate::transformer::ContentTransformer;

/// 单个页面的导出结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageOutcome {
    pub url: String,
    pub path: PathBuf,
    pub bytes: usize,
}

/// 单个URL的失败记录
#[derive(Debug)]
pub struct UrlFailure {
    pub url: String,
    pub error: ExportError,
}

/// 一次导出的汇总报告
#[derive(Debug, Default)]
pub struct ExportReport {
    pub saved: Vec<PageOutcome>,
    pub failed: Vec<UrlFailure>,
    pub fetch_time: Duration,
    pub transform_time: Duration,
    pub persist_time: Duration,
}

impl ExportReport {
    pub fn total(&self) -> usize {
        self.saved.len() + self.failed.len()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn bytes_written(&self) -> usize {
        self.saved.iter().map(|outcome| outcome.bytes).sum()
    }

    /// 成功写入的URL，保持处理顺序
    pub fn saved_urls(&self) -> Vec<&str> {
        self.saved.iter().map(|outcome| outcome.url.as_str()).collect()
    }

    fn record_failure(&mut self, url: &str, error: ExportError) {
        warn!("⚠️  跳过 {}: {}", url, error);
        self.failed.push(UrlFailure {
            url: url.to_string(),
            error,
        });
    }
}

/// 静态资源复制报告
#[derive(Debug, Default)]
pub struct AssetReport {
    pub copied: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, ExportError)>,
}

/// 导出器：组合发现、抓取、改写和持久化
#[derive(Clone)]
pub struct Exporter {
    store: Arc<dyn ContentStore>,
    discovery: Discovery,
    fetcher: PageFetcher,
    transformer: ContentTransformer,
    persister: Persister,
}

impl Exporter {
    pub fn new(
        store: Arc<dyn ContentStore>,
        fetcher: PageFetcher,
        transformer: ContentTransformer,
        persister: Persister,
    ) -> Self {
        Self {
            store,
            discovery: Discovery::new(),
            fetcher,
            transformer,
            persister,
        }
    }

    /// 按导出设置组装默认组件
    pub fn from_settings(settings: &ExportSettings, store: Arc<dyn ContentStore>) -> Result<Self> {
        let fetcher = PageFetcher::new(FetcherConfig::from(settings))?;

        let mut transformer = ContentTransformer::new();
        if settings.relative_urls() {
            transformer = transformer.with_relative_urls(settings.site_url().clone());
        }

        let mapper = DestinationMapper::new(settings.site_url().clone(), settings.destination_root());
        let mut persister = Persister::new(mapper);
        if let Some(root) = settings.asset_source_root() {
            persister = persister.with_asset_source_root(root);
        }

        Ok(Self::new(store, fetcher, transformer, persister))
    }

    pub fn with_discovery(mut self, discovery: Discovery) -> Self {
        self.discovery = discovery;
        self
    }

    pub fn with_fetcher(mut self, fetcher: PageFetcher) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn with_transformer(mut self, transformer: ContentTransformer) -> Self {
        self.transformer = transformer;
        self
    }

    pub fn with_persister(mut self, persister: Persister) -> Self {
        self.persister = persister;
        self
    }

    pub fn discovery(&self) -> &Discovery {
        &self.discovery
    }

    pub fn fetcher(&self) -> &PageFetcher {
        &self.fetcher
    }

    pub fn transformer(&self) -> &ContentTransformer {
        &self.transformer
    }

    pub fn persister(&self) -> &Persister {
        &self.persister
    }

    /// 计算全部URL
    pub fn discover_urls(&self, config: &JobConfig) -> Vec<String> {
        self.discovery.discover(self.store.as_ref(), config)
    }

    /// 抓取并改写单个页面，不写入
    pub async fn render(&self, url: &str, config: &JobConfig) -> Result<String> {
        let page = self.fetcher.fetch(url, config).await.into_result()?;
        self.transformer.transform(page.body, config)
    }

    /// 抓取、改写并写入单个页面
    pub async fn export_page(&self, url: &str, config: &JobConfig) -> Result<PageOutcome> {
        let content = self.render(url, config).await?;
        let path = self.persister.persist(&content, url, config).await?;
        Ok(PageOutcome {
            url: url.to_string(),
            path,
            bytes: content.len(),
        })
    }

    /// 抓取全部URL，结果顺序与输入一致
    pub async fn fetch_all(&self, urls: &[String], config: &JobConfig, concurrency: usize) -> Vec<FetchResult> {
        stream::iter(urls.iter())
            .map(|url| self.fetcher.fetch(url, config))
            .buffered(concurrency.max(1))
            .collect()
            .await
    }

    /// 一次性模式
    ///
    /// 抓取失败的URL在改写之前被过滤掉；改写或写入失败只影响对应URL。
    pub async fn run_one_shot(&self, urls: &[String], config: &JobConfig, concurrency: usize) -> ExportReport {
        let mut report = ExportReport::default();
        info!("🚀 开始导出 {} 个URL", urls.len());

        let started = Instant::now();
        let results = self.fetch_all(urls, config, concurrency).await;
        report.fetch_time = started.elapsed();

        let mut pages: Vec<FetchedPage> = Vec::with_capacity(results.len());
        for result in results {
            match result {
                FetchResult::Content(page) => pages.push(page),
                FetchResult::Error(failure) => {
                    let url = failure.url.clone();
                    report.record_failure(&url, failure.into());
                }
            }
        }
        debug!("抓取成功 {} 个, 失败 {} 个", pages.len(), report.failed.len());

        let started = Instant::now();
        let mut transformed = Vec::with_capacity(pages.len());
        for page in pages {
            match self.transformer.transform(page.body, config) {
                Ok(content) => transformed.push((page.url, content)),
                Err(e) => report.record_failure(&page.url, e),
            }
        }
        report.transform_time = started.elapsed();

        let started = Instant::now();
        for (url, content) in transformed {
            match self.persister.persist(&content, &url, config).await {
                Ok(path) => report.saved.push(PageOutcome {
                    url,
                    path,
                    bytes: content.len(),
                }),
                Err(e) => report.record_failure(&url, e),
            }
        }
        report.persist_time = started.elapsed();

        info!("✅ 导出完成: 成功 {} 个, 失败 {} 个", report.saved.len(), report.failed.len());
        report
    }

    /// 并发模式
    ///
    /// 每个URL在独立任务中完成全部步骤，同时运行的任务数不超过 `concurrency`。
    /// 等待全部任务结束后才返回；某个任务异常退出不会取消其他任务，但整体返回致命错误。
    pub async fn run_concurrent(&self, urls: &[String], config: &JobConfig, concurrency: usize) -> Result<ExportReport> {
        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
        let started = Instant::now();
        info!("🚀 并发导出 {} 个URL (并发数 {})", urls.len(), concurrency.max(1));

        let mut handles = Vec::with_capacity(urls.len());
        for url in urls {
            let exporter = self.clone();
            let semaphore = semaphore.clone();
            let url = url.clone();
            let config = config.clone();

            handles.push(tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| crate::export_error!(worker, e))?;
                let outcome = exporter.export_page(&url, &config).await;
                Ok::<_, ExportError>((url, outcome))
            }));
        }

        let mut report = ExportReport::default();
        let mut fatal = None;
        for (index, handle) in handles.into_iter().enumerate() {
            match handle.await {
                Ok(Ok((_, Ok(outcome)))) => report.saved.push(outcome),
                Ok(Ok((url, Err(e)))) => report.record_failure(&url, e),
                Ok(Err(e)) => {
                    error!("❌ 工作任务失败: {}", e);
                    fatal.get_or_insert(e);
                }
                Err(join_error) => {
                    error!("❌ 工作任务异常退出 ({}): {}", urls[index], join_error);
                    fatal.get_or_insert(crate::export_error!(
                        worker,
                        format!("{}: {}", urls[index], join_error)
                    ));
                }
            }
        }
        report.fetch_time = started.elapsed();

        if let Some(e) = fatal {
            return Err(e);
        }

        info!("✅ 导出完成: 成功 {} 个, 失败 {} 个", report.saved.len(), report.failed.len());
        Ok(report)
    }

    /// 复制全部静态资源
    pub async fn copy_assets(&self, source_root: &Path, config: &JobConfig) -> Result<AssetReport> {
        let assets = self.discovery.discover_assets(source_root, config)?;
        let mut report = AssetReport::default();

        for asset in assets {
            match self.persister.copy_asset(&asset, config).await {
                Ok(destination) => report.copied.push(destination),
                Err(e) => {
                    warn!("⚠️  静态资源复制失败 {}: {}", asset.display(), e);
                    report.failed.push((asset, e));
                }
            }
        }

        info!("📦 复制静态资源: 成功 {} 个, 失败 {} 个", report.copied.len(), report.failed.len());
        Ok(report)
    }
}
