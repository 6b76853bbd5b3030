//! Static Page - 动态站点静态镜像导出库
//!
//! 这个库提供了URL发现、页面抓取、内容改写、目标路径映射、文件持久化，
//! 以及分块可恢复的后台导出任务等核心功能。

pub mod config;
pub mod constants;
pub mod content_store;
pub mod discovery;
pub mod error;
pub mod fetcher;
pub mod html_processor;
pub mod job;
pub mod mapper;
pub mod orchestrator;
pub mod persister;
pub mod pipeline;
pub mod progress;
pub mod scheduler;
pub mod stats;
pub mod transformer;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use config::{ExportSettings, JobConfig};
pub use error::{ExportError, Result};
pub use job::{JobRunner, JobState};
pub use orchestrator::{ExportReport, Exporter};
