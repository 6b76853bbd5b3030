use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::warn;
use url::Url;

/// 初始化日志系统
pub fn init_logging(verbose: bool, quiet: bool) {
    if quiet {
        return;
    }

    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

/// 把命令行给出的页面地址规范为站点下的绝对URL
///
/// 接受绝对URL（必须属于站点主机）或以 `/` 开头的站内路径。
pub fn resolve_page_url(input: &str, site_url: &Url) -> Result<String> {
    let resolved = match Url::parse(input) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            if !input.starts_with('/') {
                anyhow::bail!("页面地址必须是绝对URL或以/开头的路径: {}", input);
            }
            site_url.join(input.trim_start_matches('/'))?
        }
        Err(e) => anyhow::bail!("无效的页面地址 {}: {}", input, e),
    };

    if resolved.scheme() != "http" && resolved.scheme() != "https" {
        anyhow::bail!("页面地址必须以http://或https://开头: {}", input);
    }
    if resolved.host_str() != site_url.host_str() {
        warn!("⚠️  页面地址不属于站点 {}: {}", site_url, input);
    }

    Ok(resolved.to_string())
}

/// 把相对路径转换为基于当前目录的绝对路径
pub fn absolute_path(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}
