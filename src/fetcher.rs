//! 页面抓取模块
//!
//! 此模块负责：
//! - 通过HTTP获取每个URL渲染后的页面内容
//! - 在请求前应用URL改写和请求选项两个扩展阶段
//! - 把响应严格分类为成功（仅200）或失败，不会把失败降级为空内容
//!
//! 每次抓取都会构造独立的 [`RequestContext`]，不读写任何进程级的可变状态，
//! 因此可以在多个工作者之间安全并发。

// 标准库导入
use std::time::Duration;

// 第三方crate导入
use reqwest::{Client, StatusCode};
use tracing::{debug, info, warn};

// 本地模块导入
use crate::config::{ExportSettings, JobConfig};
use crate::constants::fetch_config;
use crate::error::{ExportError, Result};
use crate::pipeline::Pipeline;

/// 抓取器配置结构体
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// 用户代理字符串
    pub user_agent: String,
    /// 单次请求超时
    pub timeout: Duration,
    /// 传输层失败的重试次数
    pub max_retries: u32,
    /// 重试延迟基数
    pub retry_delay: Duration,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            user_agent: fetch_config::DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(fetch_config::REQUEST_TIMEOUT_SECONDS),
            max_retries: fetch_config::MAX_TRANSPORT_RETRIES,
            retry_delay: Duration::from_millis(fetch_config::RETRY_DELAY_BASE_MS),
        }
    }
}

impl From<&ExportSettings> for FetcherConfig {
    fn from(settings: &ExportSettings) -> Self {
        Self {
            user_agent: settings.user_agent().to_string(),
            timeout: settings.request_timeout(),
            max_retries: settings.max_retries(),
            ..Default::default()
        }
    }
}

/// 请求选项（请求头、认证、超时）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOptions {
    pub headers: Vec<(String, String)>,
    pub basic_auth: Option<(String, Option<String>)>,
    pub bearer_token: Option<String>,
    /// 覆盖默认超时
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    /// 追加请求头
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

/// 单次抓取的隔离上下文
///
/// 每次抓取从头构造，抓取结束即丢弃，不同URL之间不共享任何可变状态。
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// 原始URL
    pub source_url: String,
    /// 经过改写阶段后实际请求的URL
    pub request_url: String,
    pub options: RequestOptions,
    pub config: JobConfig,
}

/// 抓取成功的页面
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    /// 原始URL（用于映射目标路径）
    pub url: String,
    pub body: String,
    pub metadata: ResponseMetadata,
}

/// 响应元数据
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseMetadata {
    pub status: u16,
    pub content_type: Option<String>,
    /// 跟随重定向后的最终地址
    pub final_url: String,
}

/// 抓取失败类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    /// 网络层失败
    Transport,
    /// 非200状态码
    Status(u16),
}

/// 抓取失败详情
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchFailure {
    pub url: String,
    pub kind: FetchErrorKind,
    pub message: String,
}

/// 抓取结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchResult {
    Content(FetchedPage),
    Error(FetchFailure),
}

impl FetchResult {
    pub fn is_content(&self) -> bool {
        matches!(self, FetchResult::Content(_))
    }

    /// 转换为 `Result`，失败映射为对应的 [`ExportError`]
    pub fn into_result(self) -> Result<FetchedPage> {
        match self {
            FetchResult::Content(page) => Ok(page),
            FetchResult::Error(failure) => Err(failure.into()),
        }
    }
}

impl From<FetchFailure> for ExportError {
    fn from(failure: FetchFailure) -> Self {
        match failure.kind {
            FetchErrorKind::Status(code) => crate::export_error!(status, failure.url, code),
            FetchErrorKind::Transport => crate::export_error!(transport, failure.url, failure.message),
        }
    }
}

/// 页面抓取器
///
/// # Features
///
/// - URL改写阶段：例如把公网地址改成内部回环地址
/// - 请求选项阶段：例如注入内部密钥请求头
/// - 重试机制：仅对传输层失败重试，线性退避
#[derive(Clone)]
pub struct PageFetcher {
    client: Client,
    config: FetcherConfig,
    url_stage: Pipeline<String>,
    options_stage: Pipeline<RequestOptions>,
}

impl PageFetcher {
    /// 创建新的抓取器实例
    pub fn new(config: FetcherConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout)
            .build()
            .map_err(|e| crate::export_error!(config, "http_client", format!("创建HTTP客户端失败: {}", e)))?;

        Ok(Self {
            client,
            config,
            url_stage: Pipeline::new(),
            options_stage: Pipeline::new(),
        })
    }

    /// 使用默认配置创建抓取器
    pub fn with_defaults() -> Result<Self> {
        Self::new(FetcherConfig::default())
    }

    /// 设置URL改写阶段
    pub fn with_url_stage(mut self, stage: Pipeline<String>) -> Self {
        self.url_stage = stage;
        self
    }

    /// 设置请求选项阶段
    pub fn with_options_stage(mut self, stage: Pipeline<RequestOptions>) -> Self {
        self.options_stage = stage;
        self
    }

    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }

    /// 为一次抓取构造独立上下文
    pub fn request_context(&self, url: &str, config: &JobConfig) -> RequestContext {
        RequestContext {
            source_url: url.to_string(),
            request_url: self.url_stage.apply(url.to_string(), config),
            options: self.options_stage.apply(RequestOptions::default(), config),
            config: config.clone(),
        }
    }

    /// 抓取单个URL
    pub async fn fetch(&self, url: &str, config: &JobConfig) -> FetchResult {
        let context = self.request_context(url, config);
        debug!("抓取 {} (请求地址 {})", context.source_url, context.request_url);

        let attempts = self.config.max_retries + 1;
        let mut attempt = 1;
        loop {
            let result = self.fetch_once(&context).await;
            match &result {
                FetchResult::Error(failure)
                    if failure.kind == FetchErrorKind::Transport && attempt < attempts =>
                {
                    warn!("❌ 抓取失败 (尝试 {}/{}): {}", attempt, attempts, failure.message);
                    let delay = self.config.retry_delay * attempt;
                    debug!("⏳ 等待 {:?} 后重试...", delay);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                _ => {
                    if attempt > 1 && result.is_content() {
                        info!("✅ 重试成功: {}", url);
                    }
                    return result;
                }
            }
        }
    }

    /// 执行一次请求并分类结果
    async fn fetch_once(&self, context: &RequestContext) -> FetchResult {
        let mut request = self.client.get(&context.request_url);
        for (name, value) in &context.options.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some((user, password)) = &context.options.basic_auth {
            request = request.basic_auth(user, password.as_ref());
        }
        if let Some(token) = &context.options.bearer_token {
            request = request.bearer_auth(token);
        }
        if let Some(timeout) = context.options.timeout {
            request = request.timeout(timeout);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => return transport_failure(context, e),
        };

        let status = response.status();
        if status != StatusCode::OK {
            return FetchResult::Error(FetchFailure {
                url: context.source_url.clone(),
                kind: FetchErrorKind::Status(status.as_u16()),
                message: format!("响应状态 {}", status),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let final_url = response.url().to_string();

        match response.text().await {
            Ok(body) => {
                debug!("✅ 抓取完成 {}，大小: {} 字节", context.source_url, body.len());
                FetchResult::Content(FetchedPage {
                    url: context.source_url.clone(),
                    body,
                    metadata: ResponseMetadata {
                        status: status.as_u16(),
                        content_type,
                        final_url,
                    },
                })
            }
            Err(e) => transport_failure(context, e),
        }
    }
}

fn transport_failure(context: &RequestContext, error: reqwest::Error) -> FetchResult {
    FetchResult::Error(FetchFailure {
        url: context.source_url.clone(),
        kind: FetchErrorKind::Transport,
        message: error.to_string(),
    })
}
