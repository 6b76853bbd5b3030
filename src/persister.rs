//! 持久化模块
//!
//! 此模块负责：
//! - 把改写后的页面写入映射出的目标路径，自动创建中间目录
//! - 删除URL对应的静态文件（与写入使用完全相同的路径规则）
//! - 把静态资源从源根目录复制到目标根目录
//! - 写入或删除成功后广播通知，供缓存失效等协作方消费
//!
//! 每次写入都会构造独立的 [`ObjectMeta`]，存储后端的标注只作用于这一次写入。

// 标准库导入
use std::path::{Path, PathBuf};
use std::sync::Arc;

// 第三方crate导入
use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

// 本地模块导入
use crate::config::JobConfig;
use crate::constants::persist_config::{EVENT_CHANNEL_CAPACITY, HTML_CONTENT_TYPE};
use crate::error::{ExportError, Result};
use crate::mapper::DestinationMapper;
use crate::pipeline::Pipeline;

/// 单次写入的对象元数据
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    /// 目标路径
    pub path: PathBuf,
    pub content_type: Option<String>,
    /// 后端特定的附加参数（例如对象存储的Cache-Control）
    pub params: Vec<(String, String)>,
}

impl ObjectMeta {
    pub fn new(path: PathBuf, content_type: Option<&str>) -> Self {
        Self {
            path,
            content_type: content_type.map(str::to_string),
            params: Vec::new(),
        }
    }

    pub fn with_param(mut self, key: &str, value: &str) -> Self {
        self.params.push((key.to_string(), value.to_string()));
        self
    }
}

/// 存储后端
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// 创建目录（已存在不报错）
    async fn ensure_dir(&self, dir: &Path) -> Result<()>;

    /// 写入内容
    async fn put(&self, meta: &ObjectMeta, body: &[u8]) -> Result<()>;

    /// 删除文件
    async fn delete(&self, path: &Path) -> Result<()>;

    /// 原样复制文件，返回复制字节数
    async fn copy(&self, source: &Path, meta: &ObjectMeta) -> Result<u64>;
}

/// 本地文件系统后端
#[derive(Debug, Clone, Default)]
pub struct LocalFsBackend;

#[async_trait]
impl StorageBackend for LocalFsBackend {
    async fn ensure_dir(&self, dir: &Path) -> Result<()> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| ExportError::persist_io(dir, "创建目录", e))
    }

    async fn put(&self, meta: &ObjectMeta, body: &[u8]) -> Result<()> {
        tokio::fs::write(&meta.path, body)
            .await
            .map_err(|e| ExportError::persist_io(&meta.path, "写入", e))
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        tokio::fs::remove_file(path)
            .await
            .map_err(|e| ExportError::persist_io(path, "删除", e))
    }

    async fn copy(&self, source: &Path, meta: &ObjectMeta) -> Result<u64> {
        let to_error =
            |e: std::io::Error| crate::export_error!(asset_copy, source.display(), meta.path.display(), e);

        if let Some(parent) = meta.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(to_error)?;
        }
        tokio::fs::copy(source, &meta.path).await.map_err(to_error)
    }
}

/// 持久化通知
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportEvent {
    /// 页面已写入
    Persisted { path: PathBuf, config: JobConfig },
    /// 页面已删除
    Removed { path: PathBuf, config: JobConfig },
}

/// 页面与静态资源持久化器
#[derive(Clone)]
pub struct Persister {
    mapper: DestinationMapper,
    backend: Arc<dyn StorageBackend>,
    annotator: Pipeline<ObjectMeta>,
    asset_source_root: Option<PathBuf>,
    asset_destination_stage: Pipeline<PathBuf>,
    events: broadcast::Sender<ExportEvent>,
}

impl Persister {
    /// 使用本地文件系统后端创建持久化器
    pub fn new(mapper: DestinationMapper) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            mapper,
            backend: Arc::new(LocalFsBackend),
            annotator: Pipeline::new(),
            asset_source_root: None,
            asset_destination_stage: Pipeline::new(),
            events,
        }
    }

    /// 替换路径映射器
    pub fn with_mapper(mut self, mapper: DestinationMapper) -> Self {
        self.mapper = mapper;
        self
    }

    /// 替换存储后端
    pub fn with_backend(mut self, backend: Arc<dyn StorageBackend>) -> Self {
        self.backend = backend;
        self
    }

    /// 设置写入标注阶段
    pub fn with_annotator(mut self, annotator: Pipeline<ObjectMeta>) -> Self {
        self.annotator = annotator;
        self
    }

    /// 设置静态资源源根目录
    pub fn with_asset_source_root<P: Into<PathBuf>>(mut self, root: P) -> Self {
        self.asset_source_root = Some(root.into());
        self
    }

    /// 设置静态资源目标路径覆盖阶段
    pub fn with_asset_destination_stage(mut self, stage: Pipeline<PathBuf>) -> Self {
        self.asset_destination_stage = stage;
        self
    }

    pub fn mapper(&self) -> &DestinationMapper {
        &self.mapper
    }

    /// 订阅持久化通知
    pub fn subscribe(&self) -> broadcast::Receiver<ExportEvent> {
        self.events.subscribe()
    }

    /// 写入页面内容，返回写入的文件路径
    pub async fn persist(&self, content: &str, url: &str, config: &JobConfig) -> Result<PathBuf> {
        let destination = self.mapper.map(url, config)?;

        if content.is_empty() {
            warn!("⚠️  写入空内容: {} -> {}（上游抓取或改写可能有问题）", url, destination.file.display());
        }

        self.backend.ensure_dir(&destination.directory).await?;

        let meta = self.annotator.apply(
            ObjectMeta::new(destination.file.clone(), Some(HTML_CONTENT_TYPE)),
            config,
        );
        self.backend.put(&meta, content.as_bytes()).await?;
        debug!("写入完成: {} ({} 字节)", destination.file.display(), content.len());

        self.notify(ExportEvent::Persisted {
            path: destination.file.clone(),
            config: config.clone(),
        });

        Ok(destination.file)
    }

    /// 删除URL对应的静态文件
    ///
    /// 从未写入过的路径会返回 `is_not_found()` 为真的错误，调用方应当容忍。
    pub async fn remove(&self, url: &str, config: &JobConfig) -> Result<PathBuf> {
        let destination = self.mapper.map(url, config)?;
        self.backend.delete(&destination.file).await?;
        info!("🗑️  已删除: {}", destination.file.display());

        self.notify(ExportEvent::Removed {
            path: destination.file.clone(),
            config: config.clone(),
        });

        Ok(destination.file)
    }

    /// 计算静态资源的目标路径
    ///
    /// 把源根目录前缀替换为目标根目录，再经过覆盖阶段。
    pub fn asset_destination(&self, source: &Path, config: &JobConfig) -> Result<PathBuf> {
        let source_root = self
            .asset_source_root
            .as_ref()
            .ok_or_else(|| crate::export_error!(config, "assets_root", "未配置静态资源源根目录"))?;

        let relative = source.strip_prefix(source_root).map_err(|_| {
            crate::export_error!(
                asset_copy,
                source.display(),
                "",
                format!("不在源根目录之下: {}", source_root.display())
            )
        })?;

        let destination = self.mapper.resolve_root(config).join(relative);
        Ok(self.asset_destination_stage.apply(destination, config))
    }

    /// 原样复制静态资源，返回目标路径
    pub async fn copy_asset(&self, source: &Path, config: &JobConfig) -> Result<PathBuf> {
        let destination = self.asset_destination(source, config)?;
        let meta = self.annotator.apply(
            ObjectMeta::new(destination.clone(), guess_content_type(source)),
            config,
        );

        let bytes = self.backend.copy(source, &meta).await?;
        debug!("复制静态资源: {} -> {} ({} 字节)", source.display(), destination.display(), bytes);

        Ok(destination)
    }

    fn notify(&self, event: ExportEvent) {
        // 没有订阅者时发送失败是正常情况
        let _ = self.events.send(event);
    }
}

/// 根据扩展名推断静态资源的内容类型
pub fn guess_content_type(path: &Path) -> Option<&'static str> {
    mime_guess::from_path(path).first_raw()
}
