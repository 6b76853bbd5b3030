//! 内容存储模块
//!
//! 导出流程只通过 [`ContentStore`] 读取站点数据：已发布内容的规范链接，
//! 以及公开分类法下的所有分类项链接。命令行使用JSON站点清单作为实现。

// 标准库导入
use std::path::Path;

// 第三方crate导入
use serde::{Deserialize, Serialize};
use tracing::debug;

// 本地模块导入
use crate::error::{ExportError, Result};

/// 公开可见的内容状态
pub const PUBLISHED_STATUS: &str = "publish";

/// 内容条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: u64,
    /// 内容类型（post、page或自定义类型）
    #[serde(default = "default_post_type")]
    pub post_type: String,
    #[serde(default = "default_status")]
    pub status: String,
    /// 规范链接
    pub permalink: String,
}

fn default_post_type() -> String {
    "post".to_string()
}

fn default_status() -> String {
    PUBLISHED_STATUS.to_string()
}

impl ContentItem {
    pub fn is_public(&self) -> bool {
        self.status == PUBLISHED_STATUS
    }
}

/// 分类项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Term {
    pub slug: String,
    /// 分类项链接
    pub link: String,
}

/// 分类法
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Taxonomy {
    pub name: String,
    /// 是否允许公开查询
    #[serde(default = "default_public")]
    pub public: bool,
    #[serde(default)]
    pub terms: Vec<Term>,
}

fn default_public() -> bool {
    true
}

/// 站点内容来源
pub trait ContentStore: Send + Sync {
    /// 站点根地址
    fn site_url(&self) -> &str;

    /// 所有公开可见的内容条目（任意内容类型，不分页）
    fn published_items(&self) -> Vec<ContentItem>;

    /// 所有公开分类法的名称
    fn public_taxonomies(&self) -> Vec<String>;

    /// 指定分类法下的全部分类项
    fn terms(&self, taxonomy: &str) -> Vec<Term>;
}

/// JSON站点清单
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SiteManifest {
    pub site_url: String,
    #[serde(default)]
    pub items: Vec<ContentItem>,
    #[serde(default)]
    pub taxonomies: Vec<Taxonomy>,
}

/// 基于JSON清单的内容存储
#[derive(Debug, Clone)]
pub struct JsonContentStore {
    manifest: SiteManifest,
}

impl JsonContentStore {
    /// 从内存中的清单创建
    pub fn new(manifest: SiteManifest) -> Self {
        Self { manifest }
    }

    /// 从文件加载清单
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ExportError::persist_io(path, "读取", e))?;
        let manifest: SiteManifest = serde_json::from_str(&raw).map_err(|e| {
            ExportError::Configuration {
                field: path.display().to_string(),
                reason: format!("站点清单格式错误: {}", e),
            }
        })?;

        debug!(
            "加载站点清单: {} 个内容条目, {} 个分类法",
            manifest.items.len(),
            manifest.taxonomies.len()
        );

        Ok(Self::new(manifest))
    }

    /// 覆盖清单中的站点地址
    pub fn with_site_url(mut self, site_url: &str) -> Self {
        self.manifest.site_url = site_url.to_string();
        self
    }

    pub fn manifest(&self) -> &SiteManifest {
        &self.manifest
    }
}

impl ContentStore for JsonContentStore {
    fn site_url(&self) -> &str {
        &self.manifest.site_url
    }

    fn published_items(&self) -> Vec<ContentItem> {
        self.manifest
            .items
            .iter()
            .filter(|item| item.is_public())
            .cloned()
            .collect()
    }

    fn public_taxonomies(&self) -> Vec<String> {
        self.manifest
            .taxonomies
            .iter()
            .filter(|t| t.public)
            .map(|t| t.name.clone())
            .collect()
    }

    fn terms(&self, taxonomy: &str) -> Vec<Term> {
        self.manifest
            .taxonomies
            .iter()
            .find(|t| t.name == taxonomy)
            .map(|t| t.terms.clone())
            .unwrap_or_default()
    }
}
