/// 静态导出常量配置
///
/// 该文件定义了导出流程中所有默认值，方便统一管理和维护

/// 导出任务默认配置
pub mod export_config {
    /// 每个分块包含的URL数量
    pub const DEFAULT_CHUNK_SIZE: usize = 50;

    /// 并发工作者数量上限
    pub const DEFAULT_CONCURRENCY: usize = 8;

    /// 内容变更触发后的防抖延迟（秒）
    pub const DEFAULT_DEBOUNCE_SECONDS: u64 = 5;

    /// 进度记录多久未更新视为失效（秒）
    pub const DEFAULT_STALE_AFTER_SECONDS: i64 = 60 * 60;

    /// 默认目标根目录名
    pub const DEFAULT_DESTINATION_DIR: &str = "static-page";

    /// 目录型URL对应的索引文件名
    pub const INDEX_FILE_NAME: &str = "index.html";
}

/// 页面抓取配置
pub mod fetch_config {
    /// 请求超时时间（秒）
    pub const REQUEST_TIMEOUT_SECONDS: u64 = 30;

    /// 默认User-Agent
    pub const DEFAULT_USER_AGENT: &str = "static-page-cli/0.1.0 (Static Mirror Exporter)";

    /// 传输层失败的最大重试次数
    pub const MAX_TRANSPORT_RETRIES: u32 = 2;

    /// 重试延迟基数（毫秒）
    pub const RETRY_DELAY_BASE_MS: u64 = 500;
}

/// 进度存储配置
pub mod progress_config {
    /// 进度记录的固定键名
    pub const PROGRESS_KEY: &str = "static_page_export_progress";

    /// 默认状态目录名
    pub const DEFAULT_STATE_DIR: &str = ".static-page-state";
}

/// 持久化配置
pub mod persist_config {
    /// 页面写入时标注的内容类型
    pub const HTML_CONTENT_TYPE: &str = "text/html";

    /// 可作为静态资源复制的文件扩展名
    pub const ASSET_EXTENSIONS: &[&str] = &[
        "js", "css", "map",
        "png", "jpg", "jpeg", "gif", "svg", "webp", "ico", "avif",
        "woff", "woff2", "ttf", "otf", "eot",
    ];

    /// 广播通道容量
    pub const EVENT_CHANNEL_CAPACITY: usize = 256;
}

/// 判断扩展名是否属于静态资源
pub fn is_asset_extension(ext: &str) -> bool {
    let lower = ext.to_ascii_lowercase();
    persist_config::ASSET_EXTENSIONS.contains(&lower.as_str())
}

/// 获取分块大小，0视为使用默认值
pub fn get_chunk_size(custom_size: Option<usize>) -> usize {
    match custom_size {
        Some(size) if size > 0 => size,
        _ => export_config::DEFAULT_CHUNK_SIZE,
    }
}
