//! 扩展点管道模块
//!
//! 每个扩展点都是一组按注册顺序组合的命名阶段，形如 `(value, config) -> value`。
//! 管道在构造时组装完成，运行期间不会被修改，因此可以在并发任务之间安全共享。

// 标准库导入
use std::fmt;
use std::sync::Arc;

// 本地模块导入
use crate::config::JobConfig;

type StageFn<T> = Arc<dyn Fn(T, &JobConfig) -> T + Send + Sync>;

/// 单个命名阶段
pub struct Stage<T> {
    name: String,
    func: StageFn<T>,
}

impl<T> Clone for Stage<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            func: Arc::clone(&self.func),
        }
    }
}

impl<T> Stage<T> {
    /// 阶段名称
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// 有序阶段管道
///
/// # Examples
///
/// ```rust
/// use static_page::config::JobConfig;
/// use static_page::pipeline::Pipeline;
///
/// let pipeline = Pipeline::new()
///     .with_stage("double", |n: u32, _| n * 2)
///     .with_stage("plus_one", |n: u32, _| n + 1);
///
/// assert_eq!(pipeline.apply(3, &JobConfig::default()), 7);
/// ```
pub struct Pipeline<T> {
    stages: Vec<Stage<T>>,
}

impl<T> Clone for Pipeline<T> {
    fn clone(&self) -> Self {
        Self {
            stages: self.stages.clone(),
        }
    }
}

impl<T> Default for Pipeline<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Pipeline<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.names())
            .finish()
    }
}

impl<T> Pipeline<T> {
    /// 创建空管道（恒等变换）
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    /// 追加阶段（链式）
    pub fn with_stage<F>(mut self, name: &str, func: F) -> Self
    where
        F: Fn(T, &JobConfig) -> T + Send + Sync + 'static,
    {
        self.push(name, func);
        self
    }

    /// 追加阶段
    pub fn push<F>(&mut self, name: &str, func: F)
    where
        F: Fn(T, &JobConfig) -> T + Send + Sync + 'static,
    {
        self.stages.push(Stage {
            name: name.to_string(),
            func: Arc::new(func),
        });
    }

    /// 按注册顺序依次应用所有阶段
    pub fn apply(&self, value: T, config: &JobConfig) -> T {
        self.stages
            .iter()
            .fold(value, |acc, stage| (stage.func)(acc, config))
    }

    /// 已注册阶段名称
    pub fn names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}
