//! 目标源实现

use aop_abstractions::{NamePattern, TargetSource, TargetSourceCreator};
use infrastructure_common::{AopResult, ComponentType, Instance};
use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// 按组件键提供目标实例的函数
pub type TargetSupplier = Arc<dyn Fn(&str) -> AopResult<Instance> + Send + Sync>;

/// 静态目标源，总是返回同一个实例
#[derive(Clone)]
pub struct SingletonTargetSource {
    target: Instance,
}

impl SingletonTargetSource {
    /// 包装已有实例
    pub fn new(target: Instance) -> Self {
        Self { target }
    }
}

impl TargetSource for SingletonTargetSource {
    fn is_static(&self) -> bool {
        true
    }

    fn get_target(&self) -> AopResult<Instance> {
        Ok(self.target.clone())
    }
}

impl fmt::Debug for SingletonTargetSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingletonTargetSource").finish_non_exhaustive()
    }
}

/// 延迟初始化目标源，第一次调用时才创建目标
pub struct LazyInitTargetSource {
    key: String,
    supplier: TargetSupplier,
    target: OnceCell<Instance>,
}

impl LazyInitTargetSource {
    /// 创建延迟目标源
    pub fn new(key: impl Into<String>, supplier: TargetSupplier) -> Self {
        Self {
            key: key.into(),
            supplier,
            target: OnceCell::new(),
        }
    }

    /// 目标是否已创建
    pub fn is_initialized(&self) -> bool {
        self.target.get().is_some()
    }
}

impl TargetSource for LazyInitTargetSource {
    fn get_target(&self) -> AopResult<Instance> {
        self.target
            .get_or_try_init(|| {
                debug!("延迟创建代理目标: {}", self.key);
                (self.supplier)(&self.key)
            })
            .cloned()
    }
}

impl fmt::Debug for LazyInitTargetSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyInitTargetSource")
            .field("key", &self.key)
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

/// 原型目标源，每次调用都创建新目标
pub struct PrototypeTargetSource {
    key: String,
    supplier: TargetSupplier,
    created: AtomicU64,
}

impl PrototypeTargetSource {
    /// 创建原型目标源
    pub fn new(key: impl Into<String>, supplier: TargetSupplier) -> Self {
        Self {
            key: key.into(),
            supplier,
            created: AtomicU64::new(0),
        }
    }

    /// 已创建的目标数量
    pub fn created_count(&self) -> u64 {
        self.created.load(Ordering::Relaxed)
    }
}

impl TargetSource for PrototypeTargetSource {
    fn get_target(&self) -> AopResult<Instance> {
        let target = (self.supplier)(&self.key)?;
        self.created.fetch_add(1, Ordering::Relaxed);
        Ok(target)
    }
}

impl fmt::Debug for PrototypeTargetSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrototypeTargetSource")
            .field("key", &self.key)
            .field("created", &self.created_count())
            .finish()
    }
}

struct KeyPatterns(Vec<NamePattern>);

impl KeyPatterns {
    fn compile(patterns: &[&str]) -> AopResult<Self> {
        patterns
            .iter()
            .map(|pattern| NamePattern::new(pattern))
            .collect::<AopResult<Vec<_>>>()
            .map(Self)
    }

    fn matches(&self, key: &str) -> bool {
        self.0.iter().any(|pattern| pattern.matches(key))
    }
}

/// 为匹配的组件创建 [`LazyInitTargetSource`]
pub struct LazyInitTargetSourceCreator {
    patterns: KeyPatterns,
    supplier: TargetSupplier,
}

impl LazyInitTargetSourceCreator {
    /// `patterns` 为组件键的通配模式
    pub fn new(patterns: &[&str], supplier: TargetSupplier) -> AopResult<Self> {
        Ok(Self {
            patterns: KeyPatterns::compile(patterns)?,
            supplier,
        })
    }
}

impl TargetSourceCreator for LazyInitTargetSourceCreator {
    fn create_target_source(
        &self,
        key: &str,
        _component_type: &ComponentType,
    ) -> Option<Arc<dyn TargetSource>> {
        self.patterns.matches(key).then(|| {
            Arc::new(LazyInitTargetSource::new(key, self.supplier.clone())) as Arc<dyn TargetSource>
        })
    }
}

/// 为匹配的组件创建 [`PrototypeTargetSource`]
pub struct PrototypeTargetSourceCreator {
    patterns: KeyPatterns,
    supplier: TargetSupplier,
}

impl PrototypeTargetSourceCreator {
    /// `patterns` 为组件键的通配模式
    pub fn new(patterns: &[&str], supplier: TargetSupplier) -> AopResult<Self> {
        Ok(Self {
            patterns: KeyPatterns::compile(patterns)?,
            supplier,
        })
    }
}

impl TargetSourceCreator for PrototypeTargetSourceCreator {
    fn create_target_source(
        &self,
        key: &str,
        _component_type: &ComponentType,
    ) -> Option<Arc<dyn TargetSource>> {
        self.patterns.matches(key).then(|| {
            Arc::new(PrototypeTargetSource::new(key, self.supplier.clone())) as Arc<dyn TargetSource>
        })
    }
}
