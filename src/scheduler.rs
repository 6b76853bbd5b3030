//! 延迟任务调度模块
//!
//! 语义：在某个时间点之后执行一次任务；同一个键已在等待中时，新的调度请求被忽略。
//! 键在任务开始执行时释放，因此正在执行的任务可以再次调度同一个键。

// 标准库导入
use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// 第三方crate导入
use tokio::sync::Notify;
use tracing::debug;

/// 基于tokio的延迟任务调度器
#[derive(Clone, Default)]
pub struct Scheduler {
    pending: Arc<Mutex<HashSet<String>>>,
    in_flight: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

/// 任务结束（包括panic）时递减计数
struct InFlightGuard {
    in_flight: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// 在 `delay` 之后执行 `task`
    ///
    /// 返回false表示同一个键已在等待中，本次请求被忽略。
    pub fn schedule<F>(&self, key: &str, delay: Duration, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            if !pending.insert(key.to_string()) {
                debug!("任务已在等待中，忽略: {}", key);
                return false;
            }
        }

        self.in_flight.fetch_add(1, Ordering::AcqRel);
        let guard = InFlightGuard {
            in_flight: self.in_flight.clone(),
            idle: self.idle.clone(),
        };
        let pending = self.pending.clone();
        let key = key.to_string();

        debug!("调度任务: {} (延迟 {:?})", key, delay);
        tokio::spawn(async move {
            let _guard = guard;
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            pending.lock().unwrap_or_else(|e| e.into_inner()).remove(&key);
            task.await;
        });

        true
    }

    /// 键是否在等待执行
    pub fn is_pending(&self, key: &str) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(key)
    }

    /// 已调度但尚未结束的任务数量
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// 等待所有任务结束，包括任务执行过程中新调度的任务
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_duplicate_key_is_ignored_while_pending() {
        let scheduler = Scheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let c = counter.clone();
        assert!(scheduler.schedule("export", Duration::from_millis(20), async move {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        let c = counter.clone();
        assert!(!scheduler.schedule("export", Duration::from_millis(20), async move {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        assert!(scheduler.is_pending("export"));

        scheduler.wait_idle().await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_pending("export"));
    }

    #[tokio::test]
    async fn test_distinct_keys_all_run() {
        let scheduler = Scheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));

        for i in 0..5 {
            let c = counter.clone();
            assert!(scheduler.schedule(&format!("chunk-{}", i), Duration::ZERO, async move {
                c.fetch_add(1, Ordering::SeqCst);
            }));
        }

        scheduler.wait_idle().await;
        assert_eq!(counter.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_wait_idle_covers_nested_scheduling() {
        let scheduler = Scheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let inner_scheduler = scheduler.clone();
        let c = counter.clone();
        scheduler.schedule("outer", Duration::ZERO, async move {
            let c2 = c.clone();
            inner_scheduler.schedule("inner", Duration::from_millis(10), async move {
                c2.fetch_add(1, Ordering::SeqCst);
            });
            c.fetch_add(1, Ordering::SeqCst);
        });

        scheduler.wait_idle().await;
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(scheduler.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_panicking_task_does_not_block_idle() {
        let scheduler = Scheduler::new();
        scheduler.schedule("boom", Duration::ZERO, async {
            panic!("task failed");
        });

        scheduler.wait_idle().await;
        assert_eq!(scheduler.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_wait_idle_without_tasks_returns() {
        Scheduler::new().wait_idle().await;
    }
}
