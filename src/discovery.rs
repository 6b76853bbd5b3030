//! URL发现模块
//!
//! 此模块负责：
//! - 从内容存储计算所有需要生成静态页面的URL
//! - 扫描静态资源目录，列出需要复制的脚本、样式、图片和字体
//! - 通过扩展点管道允许按环境增删、重排结果
//!
//! 发现过程不产生网络请求，只对内容存储做纯计算。

// 标准库导入
use std::collections::HashSet;
use std::path::{Path, PathBuf};

// 第三方crate导入
use regex::Regex;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

// 本地模块导入
use crate::config::JobConfig;
use crate::constants::is_asset_extension;
use crate::content_store::ContentStore;
use crate::error::Result;
use crate::pipeline::Pipeline;

/// URL与静态资源发现器
#[derive(Debug, Clone, Default)]
pub struct Discovery {
    /// 在查询分类项之前调整分类法列表
    taxonomy_stage: Pipeline<Vec<String>>,
    /// 调整最终的URL列表
    url_stage: Pipeline<Vec<String>>,
    /// 调整最终的静态资源列表
    asset_stage: Pipeline<Vec<PathBuf>>,
}

impl Discovery {
    /// 创建没有任何扩展阶段的发现器
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置分类法扩展阶段
    pub fn with_taxonomy_stage(mut self, stage: Pipeline<Vec<String>>) -> Self {
        self.taxonomy_stage = stage;
        self
    }

    /// 设置URL列表扩展阶段
    pub fn with_url_stage(mut self, stage: Pipeline<Vec<String>>) -> Self {
        self.url_stage = stage;
        self
    }

    /// 设置静态资源扩展阶段
    pub fn with_asset_stage(mut self, stage: Pipeline<Vec<PathBuf>>) -> Self {
        self.asset_stage = stage;
        self
    }

    /// 计算站点全部URL
    ///
    /// 顺序：站点根地址、所有已发布内容、所有公开分类项。
    /// 结果经过扩展阶段后去重，保留首次出现的位置。
    pub fn discover(&self, store: &dyn ContentStore, config: &JobConfig) -> Vec<String> {
        let mut urls = vec![site_root(store.site_url())];

        let items = store.published_items();
        debug!("已发布内容: {} 项", items.len());
        urls.extend(items.into_iter().map(|item| item.permalink));

        let taxonomies = self.taxonomy_stage.apply(store.public_taxonomies(), config);
        for taxonomy in &taxonomies {
            let terms = store.terms(taxonomy);
            debug!("分类法 {}: {} 个分类项", taxonomy, terms.len());
            urls.extend(terms.into_iter().map(|term| term.link));
        }

        let urls = self.url_stage.apply(urls, config);
        let total = urls.len();
        let urls = dedup_preserving_order(urls);

        if urls.len() != total {
            debug!("去除重复URL: {} -> {}", total, urls.len());
        }
        info!("🔍 发现 {} 个URL", urls.len());

        urls
    }

    /// 扫描静态资源
    ///
    /// 遍历源根目录下所有扩展名属于静态资源的文件，结果按路径排序。
    pub fn discover_assets(&self, source_root: &Path, config: &JobConfig) -> Result<Vec<PathBuf>> {
        if !source_root.is_dir() {
            return Err(crate::export_error!(
                config,
                "assets_root",
                format!("静态资源目录不存在: {}", source_root.display())
            ));
        }

        let mut assets = Vec::new();
        for entry in WalkDir::new(source_root).follow_links(false) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("⚠️  跳过无法读取的路径: {}", e);
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let is_asset = entry
                .path()
                .extension()
                .map(|ext| is_asset_extension(&ext.to_string_lossy()))
                .unwrap_or(false);

            if is_asset {
                assets.push(entry.into_path());
            }
        }
        assets.sort();

        let assets = self.asset_stage.apply(assets, config);
        info!("🔍 发现 {} 个静态资源", assets.len());

        Ok(assets)
    }
}

/// 站点根地址，总是以 `/` 结尾
pub fn site_root(site_url: &str) -> String {
    format!("{}/", site_url.trim_end_matches('/'))
}

/// 去重并保留首次出现顺序
pub fn dedup_preserving_order(urls: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::with_capacity(urls.len());
    urls.into_iter()
        .filter(|url| seen.insert(url.clone()))
        .collect()
}

/// 构造按正则白名单过滤静态资源的阶段
pub fn include_assets_matching(pattern: &str) -> Result<Pipeline<Vec<PathBuf>>> {
    let regex = Regex::new(pattern).map_err(|e| {
        crate::export_error!(input_validation, pattern, format!("无效的正则表达式: {}", e))
    })?;

    Ok(Pipeline::new().with_stage("include", move |assets: Vec<PathBuf>, _| {
        assets
            .into_iter()
            .filter(|path| regex.is_match(&path.to_string_lossy()))
            .collect()
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content_store::{ContentItem, JsonContentStore, SiteManifest, Taxonomy, Term};

    fn item(id: u64, permalink: &str) -> ContentItem {
        ContentItem {
            id,
            post_type: "post".to_string(),
            status: "publish".to_string(),
            permalink: permalink.to_string(),
        }
    }

    fn store() -> JsonContentStore {
        JsonContentStore::new(SiteManifest {
            site_url: "http://example.com".to_string(),
            items: vec![
                item(1, "http://example.com/post-1/"),
                item(2, "http://example.com/about"),
                item(3, "http://example.com/news/"),
            ],
            taxonomies: vec![
                Taxonomy {
                    name: "category".to_string(),
                    public: true,
                    terms: vec![
                        // 与页面链接冲突
                        Term { slug: "news".to_string(), link: "http://example.com/news/".to_string() },
                        Term { slug: "misc".to_string(), link: "http://example.com/category/misc/".to_string() },
                    ],
                },
                Taxonomy {
                    name: "post_tag".to_string(),
                    public: true,
                    terms: vec![Term { slug: "rust".to_string(), link: "http://example.com/tag/rust/".to_string() }],
                },
            ],
        })
    }

    #[test]
    fn test_discover_includes_root_items_and_terms() {
        let urls = Discovery::new().discover(&store(), &JobConfig::default());
        assert_eq!(
            urls,
            vec![
                "http://example.com/",
                "http://example.com/post-1/",
                "http://example.com/about",
                "http://example.com/news/",
                "http://example.com/category/misc/",
                "http://example.com/tag/rust/",
            ]
        );
    }

    #[test]
    fn test_discover_never_returns_duplicates() {
        let discovery = Discovery::new().with_url_stage(Pipeline::new().with_stage(
            "duplicate",
            |mut urls: Vec<String>, _| {
                let copy = urls.clone();
                urls.extend(copy);
                urls
            },
        ));

        let urls = discovery.discover(&store(), &JobConfig::default());
        let unique: HashSet<_> = urls.iter().collect();
        assert_eq!(unique.len(), urls.len());
        assert_eq!(urls.len(), 6);
    }

    #[test]
    fn test_taxonomy_stage_can_drop_taxonomies() {
        let discovery = Discovery::new().with_taxonomy_stage(Pipeline::new().with_stage(
            "no_tags",
            |taxonomies: Vec<String>, _| taxonomies.into_iter().filter(|t| t != "post_tag").collect(),
        ));

        let urls = discovery.discover(&store(), &JobConfig::default());
        assert!(!urls.contains(&"http://example.com/tag/rust/".to_string()));
    }

    #[test]
    fn test_url_stage_receives_job_config() {
        let discovery = Discovery::new().with_url_stage(Pipeline::new().with_stage(
            "env",
            |mut urls: Vec<String>, config: &JobConfig| {
                if config.token() == Some("staging") {
                    urls.push("http://example.com/staging-only/".to_string());
                }
                urls
            },
        ));

        let staging = discovery.discover(&store(), &JobConfig::new(Some("staging".to_string())));
        let prod = discovery.discover(&store(), &JobConfig::default());
        assert_eq!(staging.len(), prod.len() + 1);
    }

    #[test]
    fn test_site_root_normalisation() {
        assert_eq!(site_root("http://example.com"), "http://example.com/");
        assert_eq!(site_root("http://example.com/"), "http://example.com/");
        assert_eq!(site_root("http://example.com/blog/"), "http://example.com/blog/");
    }

    #[test]
    fn test_discover_assets_filters_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("themes/base/css")).unwrap();
        std::fs::write(root.join("themes/base/css/site.css"), "body{}").unwrap();
        std::fs::write(root.join("themes/base/app.js"), "1").unwrap();
        std::fs::write(root.join("themes/base/functions.php"), "<?php").unwrap();
        std::fs::write(root.join("logo.PNG"), [0u8; 4]).unwrap();

        let assets = Discovery::new().discover_assets(root, &JobConfig::default()).unwrap();
        assert_eq!(assets.len(), 3);
        assert!(assets.iter().all(|p| !p.to_string_lossy().ends_with(".php")));
    }

    #[test]
    fn test_include_regex_stage() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::write(root.join("a.css"), "").unwrap();
        std::fs::write(root.join("b.js"), "").unwrap();

        let discovery = Discovery::new().with_asset_stage(include_assets_matching(r"\.css$").unwrap());
        let assets = discovery.discover_assets(root, &JobConfig::default()).unwrap();
        assert_eq!(assets, vec![root.join("a.css")]);

        assert!(include_assets_matching("(").is_err());
    }

    #[test]
    fn test_discover_assets_missing_root() {
        let result = Discovery::new().discover_assets(Path::new("/definitely/not/here"), &JobConfig::default());
        assert!(result.is_err());
    }
}
