//! 测试共用工具：捕获 tracing 日志输出

// 标准库导入
use std::future::Future;
use std::io;
use std::sync::{Arc, Mutex};

// 第三方crate导入
use tracing::instrument::WithSubscriber;
use tracing_subscriber::fmt::MakeWriter;

/// 收集格式化日志的内存缓冲区
#[derive(Clone, Default)]
pub(crate) struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub(crate) fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = LogBuffer;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// 在独立的订阅者下运行 future，返回结果和期间输出的日志
///
/// 只捕获当前任务内的日志，`tokio::spawn` 出去的任务不在范围内。
pub(crate) async fn capture_logs<F: Future>(future: F) -> (F::Output, String) {
    let buffer = LogBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(buffer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();

    let output = future.with_subscriber(subscriber).await;
    (output, buffer.contents())
}
