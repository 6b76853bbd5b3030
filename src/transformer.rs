//! 内容改写模块
//!
//! 抓取到的内容依次经过注册的改写阶段，前一阶段的输出作为下一阶段的输入。
//! 空内容是合法输入，任何阶段都不应因此报错。

// 标准库导入
use std::fmt;
use std::sync::Arc;

// 第三方crate导入
use tracing::debug;
use url::Url;

// 本地模块导入
use crate::config::JobConfig;
use crate::error::{ExportError, Result};
use crate::html_processor::rewrite_site_urls;

type TransformFn = Arc<dyn Fn(String, &JobConfig) -> Result<String> + Send + Sync>;

/// 内容改写管道
#[derive(Clone, Default)]
pub struct ContentTransformer {
    stages: Vec<(String, TransformFn)>,
}

impl fmt::Debug for ContentTransformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentTransformer")
            .field("stages", &self.stage_names())
            .finish()
    }
}

impl ContentTransformer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加改写阶段
    pub fn with_stage<F>(mut self, name: &str, stage: F) -> Self
    where
        F: Fn(String, &JobConfig) -> Result<String> + Send + Sync + 'static,
    {
        self.stages.push((name.to_string(), Arc::new(stage)));
        self
    }

    /// 追加字面量替换阶段
    ///
    /// `from` 为空时不注册任何阶段。
    pub fn with_literal_replace(self, from: &str, to: &str) -> Self {
        if from.is_empty() {
            return self;
        }
        let (from, to) = (from.to_string(), to.to_string());
        self.with_stage("replace_literal", move |content, _| {
            Ok(content.replace(&from, &to))
        })
    }

    /// 追加站内绝对URL转根相对URL阶段
    pub fn with_relative_urls(self, site_url: Url) -> Self {
        self.with_stage("relative_urls", move |content, _| {
            rewrite_site_urls(&content, &site_url)
        })
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// 依次执行所有阶段
    ///
    /// 某个阶段失败时停止，并在错误中标明失败阶段。
    pub fn transform(&self, content: String, config: &JobConfig) -> Result<String> {
        let mut current = content;
        for (name, stage) in &self.stages {
            current = stage(current, config).map_err(|e| match e {
                ExportError::Transform { .. } => e,
                other => ExportError::Transform {
                    stage: name.clone(),
                    details: other.to_string(),
                },
            })?;
        }
        debug!("内容改写完成: {} 个阶段, {} 字节", self.stages.len(), current.len());
        Ok(current)
    }
}
