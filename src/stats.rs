use std::time::Duration;

use crate::orchestrator::{AssetReport, ExportReport};

/// 导出统计结构
#[derive(Debug, Default)]
pub struct ExportStats {
    pub discovery_time: Duration,
    pub fetch_time: Duration,
    pub transform_time: Duration,
    pub persist_time: Duration,
    pub urls_discovered: usize,
    pub pages_saved: usize,
    pub pages_failed: usize,
    pub assets_copied: usize,
    pub assets_failed: usize,
    pub bytes_written: usize,
}

impl ExportStats {
    /// 合并页面导出报告
    pub fn record_pages(&mut self, report: &ExportReport) {
        self.fetch_time += report.fetch_time;
        self.transform_time += report.transform_time;
        self.persist_time += report.persist_time;
        self.pages_saved += report.saved.len();
        self.pages_failed += report.failed.len();
        self.bytes_written += report.bytes_written();
    }

    /// 合并静态资源复制报告
    pub fn record_assets(&mut self, report: &AssetReport) {
        self.assets_copied += report.copied.len();
        self.assets_failed += report.failed.len();
    }

    /// 页面成功率
    pub fn success_rate(&self) -> Option<f64> {
        let total = self.pages_saved + self.pages_failed;
        if total == 0 {
            None
        } else {
            Some(self.pages_saved as f64 / total as f64)
        }
    }
}

/// 打印导出统计
pub fn print_export_stats(stats: &ExportStats, total_duration: Duration) {
    println!("\n📊 导出统计报告:");
    println!("═══════════════════════════════════════");

    // 时间分解
    println!("⏱️  时间分解:");
    println!("   URL发现: {}", format_duration(stats.discovery_time));
    println!("   页面抓取: {}", format_duration(stats.fetch_time));
    println!("   内容改写: {}", format_duration(stats.transform_time));
    println!("   文件写入: {}", format_duration(stats.persist_time));
    println!("   总耗时: {}", format_duration(total_duration));

    // 页面统计
    println!("\n📄 页面统计:");
    println!("   发现URL: {} 个", stats.urls_discovered);
    println!("   写入成功: {} 个", stats.pages_saved);
    println!("   失败跳过: {} 个", stats.pages_failed);
    if let Some(rate) = stats.success_rate() {
        println!("   成功率: {:.1}%", rate * 100.0);
    }
    println!(
        "   写入大小: {} 字节 ({:.1} KB)",
        stats.bytes_written,
        stats.bytes_written as f64 / 1024.0
    );

    if stats.assets_copied + stats.assets_failed > 0 {
        println!("\n📦 静态资源:");
        println!("   复制成功: {} 个", stats.assets_copied);
        println!("   复制失败: {} 个", stats.assets_failed);
    }

    let secs = total_duration.as_secs_f64();
    if secs > 0.0 && stats.pages_saved > 0 {
        println!("\n🚀 性能指标:");
        println!("   处理速度: {:.1} 页/秒", stats.pages_saved as f64 / secs);
    }
}

/// 格式化持续时间
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis < 1000 {
        format!("{}ms", millis)
    } else {
        format!("{:.3}s", duration.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::PageOutcome;
    use std::path::PathBuf;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.500s");
    }

    #[test]
    fn test_record_pages() {
        let report = ExportReport {
            saved: vec![PageOutcome {
                url: "http://example.com/".to_string(),
                path: PathBuf::from("/tmp/index.html"),
                bytes: 2048,
            }],
            fetch_time: Duration::from_millis(30),
            ..Default::default()
        };

        let mut stats = ExportStats::default();
        stats.record_pages(&report);
        stats.record_pages(&report);

        assert_eq!(stats.pages_saved, 2);
        assert_eq!(stats.bytes_written, 4096);
        assert_eq!(stats.fetch_time, Duration::from_millis(60));
        assert_eq!(stats.success_rate(), Some(1.0));
        assert_eq!(ExportStats::default().success_rate(), None);
    }
}
