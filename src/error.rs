//! 统一错误处理模块
//!
//! 提供静态导出流程的统一错误类型定义和处理机制

// 标准库导入
use std::fmt;
use std::io;

// 第三方crate导入
use anyhow::Error as AnyhowError;

/// 静态导出统一错误类型
///
/// 抓取错误按URL记录，不会中断整个批次；只有`WorkerFailed`属于致命错误。
#[derive(Debug)]
pub enum ExportError {
    /// 网络连接失败（DNS、连接被拒、超时等）
    FetchTransport {
        /// 请求的URL
        url: String,
        /// 错误消息
        message: String,
    },

    /// 响应状态码不是200
    FetchStatus {
        /// 请求的URL
        url: String,
        /// HTTP状态码
        status_code: u16,
    },

    /// 内容改写阶段失败
    Transform {
        /// 阶段名称
        stage: String,
        /// 具体错误信息
        details: String,
    },

    /// 目录或文件的创建、写入、删除失败
    PersistIo {
        /// 文件路径
        path: String,
        /// 操作类型（写入、创建目录、删除等）
        operation: String,
        /// 底层IO错误类型
        kind: io::ErrorKind,
        /// 底层错误信息
        source: String,
    },

    /// 静态资源复制失败
    AssetCopy {
        /// 源路径
        source_path: String,
        /// 目标路径
        destination: String,
        /// 底层错误信息
        details: String,
    },

    /// 配置相关错误
    Configuration {
        /// 配置项名称
        field: String,
        /// 错误原因
        reason: String,
    },

    /// 输入验证错误
    InputValidation {
        /// 输入值
        input: String,
        /// 验证失败原因
        reason: String,
    },

    /// 进度存储读写失败
    ProgressStore {
        /// 操作类型
        operation: String,
        /// 错误详情
        details: String,
    },

    /// 工作任务无法启动或异常退出
    WorkerFailed {
        /// 错误详情
        details: String,
    },

    /// 内部处理错误（包装anyhow::Error）
    Internal {
        /// 包装的错误
        source: AnyhowError,
    },
}

impl ExportError {
    /// 是否为“文件不存在”类错误，删除未写入过的路径时调用方需要容忍
    ///
    /// 路径中间某一级是普通文件时（例如 `/about` 已写成文件，再删除 `/about/index.html`）
    /// 系统返回 `NotADirectory`，同样表示目标不存在。
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ExportError::PersistIo {
                kind: io::ErrorKind::NotFound | io::ErrorKind::NotADirectory,
                ..
            }
        )
    }

    /// 是否属于抓取阶段的错误
    pub fn is_fetch_error(&self) -> bool {
        matches!(
            self,
            ExportError::FetchTransport { .. } | ExportError::FetchStatus { .. }
        )
    }

    /// 是否为致命错误（应立即终止交互式导出）
    pub fn is_fatal(&self) -> bool {
        matches!(self, ExportError::WorkerFailed { .. })
    }

    /// 从IO错误构造持久化错误，保留错误类型
    pub fn persist_io(path: impl AsRef<std::path::Path>, operation: &str, error: io::Error) -> Self {
        ExportError::PersistIo {
            path: path.as_ref().display().to_string(),
            operation: operation.to_string(),
            kind: error.kind(),
            source: error.to_string(),
        }
    }
}

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportError::FetchTransport { url, message } => {
                write!(f, "页面抓取失败 [{}]: {}", url, message)
            },
            ExportError::FetchStatus { url, status_code } => {
                write!(f, "页面返回异常状态 [{}] {}", status_code, url)
            },
            ExportError::Transform { stage, details } => {
                write!(f, "内容改写失败 [{}]: {}", stage, details)
            },
            ExportError::PersistIo { path, operation, source, .. } => {
                write!(f, "文件{}操作失败 [{}]: {}", operation, path, source)
            },
            ExportError::AssetCopy { source_path, destination, details } => {
                write!(f, "静态资源复制失败 [{} -> {}]: {}", source_path, destination, details)
            },
            ExportError::Configuration { field, reason } => {
                write!(f, "配置错误 [{}]: {}", field, reason)
            },
            ExportError::InputValidation { input, reason } => {
                write!(f, "输入验证失败 [{}]: {}", input, reason)
            },
            ExportError::ProgressStore { operation, details } => {
                write!(f, "进度记录{}失败: {}", operation, details)
            },
            ExportError::WorkerFailed { details } => {
                write!(f, "工作任务异常终止: {}", details)
            },
            ExportError::Internal { source } => {
                write!(f, "内部处理错误: {}", source)
            },
        }
    }
}

impl std::error::Error for ExportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExportError::Internal { source } => Some(source.as_ref()),
            _ => None,
        }
    }
}

/// 静态导出结果类型别名
pub type Result<T> = std::result::Result<T, ExportError>;

/// 便捷的错误创建宏
#[macro_export]
macro_rules! export_error {
    (transport, $url:expr, $msg:expr) => {
        $crate::error::ExportError::FetchTransport {
            url: $url.to_string(),
            message: $msg.to_string(),
        }
    };
    (status, $url:expr, $code:expr) => {
        $crate::error::ExportError::FetchStatus {
            url: $url.to_string(),
            status_code: $code,
        }
    };
    (transform, $stage:expr, $details:expr) => {
        $crate::error::ExportError::Transform {
            stage: $stage.to_string(),
            details: $details.to_string(),
        }
    };
    (asset_copy, $src:expr, $dest:expr, $details:expr) => {
        $crate::error::ExportError::AssetCopy {
            source_path: $src.to_string(),
            destination: $dest.to_string(),
            details: $details.to_string(),
        }
    };
    (config, $field:expr, $reason:expr) => {
        $crate::error::ExportError::Configuration {
            field: $field.to_string(),
            reason: $reason.to_string(),
        }
    };
    (input_validation, $input:expr, $reason:expr) => {
        $crate::error::ExportError::InputValidation {
            input: $input.to_string(),
            reason: $reason.to_string(),
        }
    };
    (progress, $op:expr, $details:expr) => {
        $crate::error::ExportError::ProgressStore {
            operation: $op.to_string(),
            details: $details.to_string(),
        }
    };
    (worker, $details:expr) => {
        $crate::error::ExportError::WorkerFailed {
            details: $details.to_string(),
        }
    };
}

/// 从anyhow::Error转换为ExportError
impl From<AnyhowError> for ExportError {
    fn from(error: AnyhowError) -> Self {
        ExportError::Internal { source: error }
    }
}

/// 从reqwest::Error转换为ExportError
impl From<reqwest::Error> for ExportError {
    fn from(error: reqwest::Error) -> Self {
        let url = error
            .url()
            .map(|u| u.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        match error.status() {
            Some(status) => ExportError::FetchStatus {
                url,
                status_code: status.as_u16(),
            },
            None => ExportError::FetchTransport {
                url,
                message: error.to_string(),
            },
        }
    }
}

/// 从std::io::Error转换为ExportError
impl From<io::Error> for ExportError {
    fn from(error: io::Error) -> Self {
        ExportError::PersistIo {
            path: "unknown".to_string(),
            operation: "io".to_string(),
            kind: error.kind(),
            source: error.to_string(),
        }
    }
}

/// 从serde_json::Error转换为ExportError
impl From<serde_json::Error> for ExportError {
    fn from(error: serde_json::Error) -> Self {
        ExportError::ProgressStore {
            operation: "序列化".to_string(),
            details: error.to_string(),
        }
    }
}
