//! 配置管理模块
//!
//! 提供CLI参数解析、导出设置和任务级配置

// 标准库导入
use std::path::PathBuf;
use std::time::Duration;

// 第三方crate导入
use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use url::Url;

// 本地模块导入
use crate::constants::{export_config, fetch_config, progress_config};
use crate::error::{ExportError, Result};

/// 任务级配置
///
/// 不透明的配置令牌，原样传递给发现、抓取、改写、持久化的每一个阶段，
/// 使不同环境（例如预发布、生产）可以有不同的导出行为。
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobConfig {
    token: Option<String>,
}

impl JobConfig {
    pub fn new(token: Option<String>) -> Self {
        Self { token }
    }

    /// 配置令牌
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }
}

/// 导出设置
///
/// 支持Builder模式进行链式配置。
///
/// # Examples
///
/// ```rust
/// use static_page::config::ExportSettings;
///
/// let settings = ExportSettings::new("https://example.com")
///     .unwrap()
///     .with_destination_root("/tmp/mirror")
///     .with_chunk_size(20)
///     .with_concurrency(4);
///
/// assert_eq!(settings.chunk_size(), 20);
/// ```
#[derive(Debug, Clone)]
pub struct ExportSettings {
    /// 站点地址（用于剥离自身域名）
    site_url: Url,
    /// 目标根目录
    destination_root: PathBuf,
    /// 静态资源源根目录
    asset_source_root: Option<PathBuf>,
    /// 分块大小
    chunk_size: usize,
    /// 并发工作者数量
    concurrency: usize,
    /// 触发防抖延迟
    debounce: Duration,
    /// 单次请求超时
    request_timeout: Duration,
    /// User-Agent
    user_agent: String,
    /// 传输层失败重试次数
    max_retries: u32,
    /// 进度记录目录
    state_dir: PathBuf,
    /// 进度记录失效阈值
    stale_after: chrono::Duration,
    /// 是否把站内绝对URL改写为相对URL
    relative_urls: bool,
}

impl ExportSettings {
    /// 创建新的设置实例
    ///
    /// 站点地址必须是http或https URL，其余字段使用默认值。
    pub fn new(site_url: &str) -> Result<Self> {
        let site_url = Url::parse(site_url).map_err(|e| ExportError::Configuration {
            field: "site_url".to_string(),
            reason: format!("{}: {}", site_url, e),
        })?;

        if site_url.scheme() != "http" && site_url.scheme() != "https" {
            return Err(ExportError::Configuration {
                field: "site_url".to_string(),
                reason: format!("站点地址必须以http://或https://开头: {}", site_url),
            });
        }

        Ok(Self {
            site_url,
            destination_root: std::env::temp_dir().join(export_config::DEFAULT_DESTINATION_DIR),
            asset_source_root: None,
            chunk_size: export_config::DEFAULT_CHUNK_SIZE,
            concurrency: export_config::DEFAULT_CONCURRENCY,
            debounce: Duration::from_secs(export_config::DEFAULT_DEBOUNCE_SECONDS),
            request_timeout: Duration::from_secs(fetch_config::REQUEST_TIMEOUT_SECONDS),
            user_agent: fetch_config::DEFAULT_USER_AGENT.to_string(),
            max_retries: fetch_config::MAX_TRANSPORT_RETRIES,
            state_dir: PathBuf::from(progress_config::DEFAULT_STATE_DIR),
            stale_after: chrono::Duration::seconds(export_config::DEFAULT_STALE_AFTER_SECONDS),
            relative_urls: false,
        })
    }

    pub fn site_url(&self) -> &Url {
        &self.site_url
    }

    pub fn destination_root(&self) -> &PathBuf {
        &self.destination_root
    }

    pub fn asset_source_root(&self) -> Option<&PathBuf> {
        self.asset_source_root.as_ref()
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn state_dir(&self) -> &PathBuf {
        &self.state_dir
    }

    pub fn stale_after(&self) -> chrono::Duration {
        self.stale_after
    }

    pub fn relative_urls(&self) -> bool {
        self.relative_urls
    }

    /// 设置目标根目录
    pub fn with_destination_root<P: Into<PathBuf>>(mut self, root: P) -> Self {
        self.destination_root = root.into();
        self
    }

    /// 设置静态资源源根目录
    pub fn with_asset_source_root<P: Into<PathBuf>>(mut self, root: P) -> Self {
        self.asset_source_root = Some(root.into());
        self
    }

    /// 设置分块大小（0会被替换为默认值）
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = crate::constants::get_chunk_size(Some(size));
        self
    }

    /// 设置并发数量（至少为1）
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: &str) -> Self {
        self.user_agent = user_agent.to_string();
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_state_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.state_dir = dir.into();
        self
    }

    pub fn with_stale_after(mut self, stale_after: chrono::Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    pub fn with_relative_urls(mut self, enable: bool) -> Self {
        self.relative_urls = enable;
        self
    }
}

/// CLI参数结构
#[derive(Parser)]
#[command(author, version, about = "静态页面导出工具 - 把动态站点导出为可直接托管的静态镜像", long_about = None)]
pub struct Cli {
    /// 站点清单文件（JSON），提供已发布内容和分类项
    #[arg(long, global = true, value_name = "FILE", default_value = "site.json")]
    pub site: PathBuf,

    /// 覆盖清单中的站点地址
    #[arg(long, global = true, value_name = "URL")]
    pub site_url: Option<String>,

    /// 目标根目录
    #[arg(long, global = true, value_name = "DIR")]
    pub destination: Option<PathBuf>,

    /// 静态资源源根目录
    #[arg(long, global = true, value_name = "DIR")]
    pub assets_root: Option<PathBuf>,

    /// 进度记录目录
    #[arg(long, global = true, value_name = "DIR", default_value = progress_config::DEFAULT_STATE_DIR)]
    pub state_dir: PathBuf,

    /// 把站内绝对URL改写为根相对URL
    #[arg(long, global = true)]
    pub relative_urls: bool,

    /// 抓取超时时间（秒）
    #[arg(long, global = true, default_value = "30")]
    pub timeout: u64,

    /// 自定义User-Agent字符串
    #[arg(long, global = true)]
    pub user_agent: Option<String>,

    /// 详细输出模式
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// 静默模式 (仅输出错误)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// 显示导出统计
    #[arg(long, global = true)]
    pub stats: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// 所有子命令共享的任务参数
#[derive(Args, Debug, Clone, Default)]
pub struct JobArgs {
    /// 任务级配置令牌
    #[arg(long = "config", value_name = "CONFIG")]
    pub config: Option<String>,
}

impl JobArgs {
    pub fn job_config(&self) -> JobConfig {
        JobConfig::new(self.config.clone())
    }
}

/// 字面量替换参数
#[derive(Args, Debug, Clone, Default)]
pub struct ReplaceArgs {
    /// 待替换的字符串
    #[arg(long, value_name = "FROM")]
    pub replace_from: Option<String>,

    /// 替换为的字符串
    #[arg(long, value_name = "TO", default_value = "")]
    pub replace_to: String,
}

/// 子命令
#[derive(Subcommand)]
pub enum Command {
    /// 列出所有将被导出的URL
    Urls {
        #[command(flatten)]
        job: JobArgs,
    },

    /// 列出所有将被复制的静态资源
    Assets {
        #[command(flatten)]
        job: JobArgs,

        /// 资源白名单正则
        #[arg(long, value_name = "REGEX")]
        include: Option<String>,
    },

    /// 输出页面改写后的内容
    Output {
        #[command(flatten)]
        job: JobArgs,

        #[command(flatten)]
        replace: ReplaceArgs,

        /// 只输出指定URL
        url: Option<String>,
    },

    /// 同步导出所有页面到目标目录
    Save {
        #[command(flatten)]
        job: JobArgs,

        #[command(flatten)]
        replace: ReplaceArgs,

        /// 覆盖目标根目录
        path: Option<PathBuf>,

        /// 只导出指定URL
        #[arg(long, value_name = "URL")]
        page_url: Option<String>,

        /// 并发工作者数量（1表示顺序执行）
        #[arg(long, default_value = "1")]
        concurrency: usize,
    },

    /// 同步复制静态资源到目标目录
    SaveAssets {
        #[command(flatten)]
        job: JobArgs,

        /// 覆盖目标根目录
        path: Option<PathBuf>,

        /// 资源白名单正则
        #[arg(long, value_name = "REGEX")]
        include: Option<String>,
    },

    /// 以分块后台任务方式导出，并等待全部完成
    Export {
        #[command(flatten)]
        job: JobArgs,

        #[command(flatten)]
        replace: ReplaceArgs,

        /// 分块大小
        #[arg(long, default_value = "50")]
        chunk_size: usize,

        /// 防抖延迟（秒）
        #[arg(long, default_value = "0")]
        debounce: u64,
    },

    /// 重新调度未完成任务的剩余URL
    Resume {
        #[command(flatten)]
        replace: ReplaceArgs,

        /// 分块大小
        #[arg(long, default_value = "50")]
        chunk_size: usize,
    },

    /// 查看当前导出进度
    Status,

    /// 删除URL对应的静态文件
    Remove {
        #[command(flatten)]
        job: JobArgs,

        /// 要删除的URL
        url: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_defaults() {
        let settings = ExportSettings::new("https://example.com").unwrap();
        assert_eq!(settings.site_url().as_str(), "https://example.com/");
        assert_eq!(settings.chunk_size(), export_config::DEFAULT_CHUNK_SIZE);
        assert_eq!(settings.concurrency(), export_config::DEFAULT_CONCURRENCY);
        assert_eq!(settings.max_retries(), fetch_config::MAX_TRANSPORT_RETRIES);
        assert!(settings.asset_source_root().is_none());
        assert!(!settings.relative_urls());
    }

    #[test]
    fn test_settings_builder() {
        let settings = ExportSettings::new("http://example.com/blog")
            .unwrap()
            .with_destination_root("/srv/mirror")
            .with_asset_source_root("/srv/wp-content")
            .with_chunk_size(0)
            .with_concurrency(0)
            .with_user_agent("test-agent")
            .with_relative_urls(true);

        assert_eq!(settings.destination_root(), &PathBuf::from("/srv/mirror"));
        assert_eq!(settings.asset_source_root(), Some(&PathBuf::from("/srv/wp-content")));
        assert_eq!(settings.chunk_size(), export_config::DEFAULT_CHUNK_SIZE);
        assert_eq!(settings.concurrency(), 1);
        assert_eq!(settings.user_agent(), "test-agent");
        assert!(settings.relative_urls());
    }

    #[test]
    fn test_settings_rejects_invalid_site_url() {
        assert!(ExportSettings::new("not a url").is_err());
        assert!(ExportSettings::new("ftp://example.com").is_err());
    }

    #[test]
    fn test_cli_parses_save_command() {
        let cli = Cli::try_parse_from([
            "static-page",
            "save",
            "/tmp/out",
            "--config",
            "staging",
            "--replace-from",
            "http://old",
            "--replace-to",
            "http://new",
            "--concurrency",
            "4",
        ])
        .unwrap();

        match cli.command {
            Command::Save { job, replace, path, page_url, concurrency } => {
                assert_eq!(job.job_config().token(), Some("staging"));
                assert_eq!(replace.replace_from.as_deref(), Some("http://old"));
                assert_eq!(replace.replace_to, "http://new");
                assert_eq!(path, Some(PathBuf::from("/tmp/out")));
                assert!(page_url.is_none());
                assert_eq!(concurrency, 4);
            },
            _ => panic!("Wrong command"),
        }
    }
}
