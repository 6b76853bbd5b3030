//! 目标路径映射模块
//!
//! 把站点URL确定性地映射为目标目录树中的文件路径：
//! 1. 解析目标根目录（可由扩展阶段按任务配置覆盖）
//! 2. 统一协议并剥离站点自身的源地址，得到站内相对路径
//! 3. 拼接根目录与相对路径
//!
//! 以 `/` 结尾的路径表示目录，实际写入 `<路径>/index.html`；
//! 其他路径直接作为文件，只需要创建父目录。写入和删除共用同一套规则。

// 标准库导入
use std::path::{Path, PathBuf};

// 第三方crate导入
use tracing::debug;
use url::Url;

// 本地模块导入
use crate::config::JobConfig;
use crate::constants::export_config::INDEX_FILE_NAME;
use crate::error::{ExportError, Result};
use crate::pipeline::Pipeline;

/// 映射结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    /// 最终写入的文件
    pub file: PathBuf,
    /// 写入前需要存在的目录
    pub directory: PathBuf,
    /// 是否为目录型URL（以 `/` 结尾）
    pub is_index: bool,
}

impl Destination {
    /// 确保目录存在
    ///
    /// 多个工作者可能同时创建同一个父目录，已存在不视为错误。
    pub async fn ensure_directory(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.directory)
            .await
            .map_err(|e| ExportError::persist_io(&self.directory, "创建目录", e))
    }
}

/// URL到目标路径的映射器
#[derive(Debug, Clone)]
pub struct DestinationMapper {
    site_url: Url,
    root: PathBuf,
    root_stage: Pipeline<PathBuf>,
}

impl DestinationMapper {
    pub fn new<P: Into<PathBuf>>(site_url: Url, root: P) -> Self {
        Self {
            site_url,
            root: root.into(),
            root_stage: Pipeline::new(),
        }
    }

    /// 设置目标根目录扩展阶段
    pub fn with_root_stage(mut self, stage: Pipeline<PathBuf>) -> Self {
        self.root_stage = stage;
        self
    }

    /// 用固定目录覆盖目标根目录
    pub fn override_root<P: Into<PathBuf>>(mut self, root: P) -> Self {
        let root = root.into();
        self.root_stage
            .push("destination_override", move |_, _| root.clone());
        self
    }

    pub fn site_url(&self) -> &Url {
        &self.site_url
    }

    /// 解析当前任务的目标根目录
    pub fn resolve_root(&self, config: &JobConfig) -> PathBuf {
        self.root_stage.apply(self.root.clone(), config)
    }

    /// 计算站内相对路径，结果总是以 `/` 开头
    ///
    /// 只去掉协议和主机部分。查询串和片段会被丢弃；不同协议（http/https）的同一主机视为站内地址。
    pub fn relative_path(&self, url: &str) -> Result<String> {
        let parsed = match Url::parse(url) {
            Ok(parsed) => parsed,
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                self.site_url.join(url).map_err(|e| invalid_url(url, &e.to_string()))?
            }
            Err(e) => return Err(invalid_url(url, &e.to_string())),
        };

        if parsed.host_str() != self.site_url.host_str() || parsed.port() != self.site_url.port() {
            return Err(invalid_url(url, "不属于当前站点"));
        }

        // 保留完整路径，子目录站点的前缀由根目录阶段决定是否去掉
        let mut segments = Vec::new();
        for segment in parsed.path().split('/') {
            let decoded = urlencoding::decode(segment)
                .map_err(|e| invalid_url(url, &e.to_string()))?;
            if decoded == ".." || decoded == "." || decoded.contains('/') || decoded.contains('\\') {
                return Err(invalid_url(url, "包含非法路径片段"));
            }
            segments.push(decoded.into_owned());
        }

        Ok(segments.join("/"))
    }

    /// 把URL映射为目标文件
    ///
    /// 纯计算，不触碰文件系统；同一URL和配置总是得到同一结果。
    pub fn map(&self, url: &str, config: &JobConfig) -> Result<Destination> {
        let root = self.resolve_root(config);
        let relative = self.relative_path(url)?;
        let destination = join_relative(&root, &relative);

        debug!("映射 {} -> {}", url, destination.file.display());
        Ok(destination)
    }
}

/// 按目录规则拼接根目录与相对路径
fn join_relative(root: &Path, relative: &str) -> Destination {
    let trimmed = relative.trim_start_matches('/');

    if relative.ends_with('/') {
        let directory = match trimmed.trim_end_matches('/') {
            "" => root.to_path_buf(),
            dir => root.join(dir),
        };
        Destination {
            file: directory.join(INDEX_FILE_NAME),
            directory,
            is_index: true,
        }
    } else {
        let file = root.join(trimmed);
        let directory = file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| root.to_path_buf());
        Destination {
            file,
            directory,
            is_index: false,
        }
    }
}

fn invalid_url(url: &str, reason: &str) -> ExportError {
    crate::export_error!(input_validation, url, reason)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapper(site: &str) -> DestinationMapper {
        DestinationMapper::new(Url::parse(site).unwrap(), "/srv/mirror")
    }

    #[test]
    fn test_trailing_slash_maps_to_index_file() {
        let m = mapper("http://example.com");
        let dest = m.map("http://example.com/post-1/", &JobConfig::default()).unwrap();
        assert_eq!(dest.file, PathBuf::from("/srv/mirror/post-1/index.html"));
        assert_eq!(dest.directory, PathBuf::from("/srv/mirror/post-1"));
        assert!(dest.is_index);
    }

    #[test]
    fn test_site_root_maps_to_root_index() {
        let m = mapper("http://example.com");
        let dest = m.map("http://example.com/", &JobConfig::default()).unwrap();
        assert_eq!(dest.file, PathBuf::from("/srv/mirror/index.html"));
        assert_eq!(dest.directory, PathBuf::from("/srv/mirror"));
    }

    #[test]
    fn test_non_slash_url_maps_to_file() {
        let m = mapper("http://example.com");
        let dest = m.map("http://example.com/about", &JobConfig::default()).unwrap();
        assert_eq!(dest.file, PathBuf::from("/srv/mirror/about"));
        assert_eq!(dest.directory, PathBuf::from("/srv/mirror"));
        assert!(!dest.is_index);

        let dest = m.map("http://example.com/feed/atom.xml", &JobConfig::default()).unwrap();
        assert_eq!(dest.file, PathBuf::from("/srv/mirror/feed/atom.xml"));
        assert_eq!(dest.directory, PathBuf::from("/srv/mirror/feed"));
    }

    #[test]
    fn test_scheme_is_normalised() {
        let m = mapper("http://example.com");
        let a = m.map("https://example.com/post-1/", &JobConfig::default()).unwrap();
        let b = m.map("http://example.com/post-1/", &JobConfig::default()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_site_relative_urls() {
        let m = mapper("http://example.com");
        let dest = m.map("/about", &JobConfig::default()).unwrap();
        assert_eq!(dest.file, PathBuf::from("/srv/mirror/about"));
        let dest = m.map("/", &JobConfig::default()).unwrap();
        assert_eq!(dest.file, PathBuf::from("/srv/mirror/index.html"));
    }

    #[test]
    fn test_site_in_subdirectory_keeps_full_path() {
        let m = mapper("http://example.com/blog");
        let config = JobConfig::default();

        let dest = m.map("http://example.com/blog/post-1/", &config).unwrap();
        assert_eq!(dest.file, PathBuf::from("/srv/mirror/blog/post-1/index.html"));

        let dest = m.map("http://example.com/blog", &config).unwrap();
        assert_eq!(dest.file, PathBuf::from("/srv/mirror/blog"));
        assert!(!dest.is_index);

        // 站点路径之外的同主机页面同样按完整路径落盘
        let dest = m.map("http://example.com/category/news/", &config).unwrap();
        assert_eq!(dest.file, PathBuf::from("/srv/mirror/category/news/index.html"));
        let dest = m.map("http://example.com/about", &config).unwrap();
        assert_eq!(dest.file, PathBuf::from("/srv/mirror/about"));
    }

    #[test]
    fn test_subdirectory_prefix_is_left_to_root_stage() {
        let m = mapper("http://example.com/blog")
            .override_root("/srv/other");
        let dest = m.map("http://example.com/blog/post-1/", &JobConfig::default()).unwrap();
        assert_eq!(dest.file, PathBuf::from("/srv/other/blog/post-1/index.html"));
    }

    #[test]
    fn test_query_and_fragment_are_dropped() {
        let m = mapper("http://example.com");
        let dest = m.map("http://example.com/post-1/?replytocom=4#respond", &JobConfig::default()).unwrap();
        assert_eq!(dest.file, PathBuf::from("/srv/mirror/post-1/index.html"));
    }

    #[test]
    fn test_percent_encoded_segments_are_decoded() {
        let m = mapper("http://example.com");
        let dest = m.map("http://example.com/caf%C3%A9/", &JobConfig::default()).unwrap();
        assert_eq!(dest.file, PathBuf::from("/srv/mirror/café/index.html"));
        assert!(m.map("http://example.com/a%2Fb/", &JobConfig::default()).is_err());
    }

    #[test]
    fn test_foreign_origin_is_rejected() {
        let m = mapper("http://example.com");
        let err = m.map("http://other.com/post/", &JobConfig::default()).unwrap_err();
        assert!(matches!(
            &err,
            ExportError::InputValidation { input, .. } if input == "http://other.com/post/"
        ));
        assert!(m.map("http://example.com:8080/post/", &JobConfig::default()).is_err());
    }

    #[test]
    fn test_map_is_deterministic() {
        let m = mapper("http://example.com");
        let config = JobConfig::new(Some("x".to_string()));
        for url in ["http://example.com/", "http://example.com/a/b/", "http://example.com/c"] {
            assert_eq!(m.map(url, &config).unwrap(), m.map(url, &config).unwrap());
        }
    }

    #[test]
    fn test_root_stage_uses_job_config() {
        let m = mapper("http://example.com").with_root_stage(Pipeline::new().with_stage(
            "per_env",
            |root: PathBuf, config: &JobConfig| match config.token() {
                Some(env) => root.join(env),
                None => root,
            },
        ));

        let dest = m.map("http://example.com/about", &JobConfig::new(Some("staging".to_string()))).unwrap();
        assert_eq!(dest.file, PathBuf::from("/srv/mirror/staging/about"));
    }

    #[test]
    fn test_override_root() {
        let m = mapper("http://example.com").override_root("/tmp/elsewhere");
        let dest = m.map("http://example.com/", &JobConfig::default()).unwrap();
        assert_eq!(dest.file, PathBuf::from("/tmp/elsewhere/index.html"));
    }

    #[tokio::test]
    async fn test_ensure_directory_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let m = DestinationMapper::new(Url::parse("http://example.com").unwrap(), dir.path());
        let dest = m.map("http://example.com/a/b/c/", &JobConfig::default()).unwrap();

        dest.ensure_directory().await.unwrap();
        dest.ensure_directory().await.unwrap();
        assert!(dir.path().join("a/b/c").is_dir());
    }
}
