//! 单例注册表抽象接口
//!
//! 注册表维护三级缓存：
//!
//! 1. 已完成的单例
//! 2. 已被他人取走的早期引用
//! 3. 尚未被调用的早期引用工厂
//!
//! 同一时刻一个键只存在于其中一级。注册表还记录组件之间的依赖关系，
//! 销毁时据此保证依赖方先于被依赖方销毁。

use infrastructure_common::{
    BoxError, ComponentState, DependencyResult, Instance, LifecycleError,
};
use std::sync::Arc;

/// 一次性的单例创建函数
pub type ObjectFactory<'a> = Box<dyn FnOnce() -> DependencyResult<Instance> + 'a>;

/// 早期引用工厂
///
/// 可能在其他组件的创建过程中被调用，但每个键最多只会成功调用一次。
pub type EarlyReferenceFactory = Box<dyn Fn() -> DependencyResult<Instance> + Send + Sync>;

/// 可销毁组件
pub trait DisposableComponent: Send + Sync {
    /// 执行销毁回调
    fn destroy(&self) -> Result<(), BoxError>;
}

impl<F> DisposableComponent for F
where
    F: Fn() -> Result<(), BoxError> + Send + Sync,
{
    fn destroy(&self) -> Result<(), BoxError> {
        self()
    }
}

/// 销毁报告
#[derive(Debug, Default)]
pub struct DestructionReport {
    /// 按执行顺序记录的、销毁回调成功执行的组件
    pub destroyed: Vec<String>,
    /// 销毁回调失败的组件
    pub failures: Vec<LifecycleError>,
}

impl DestructionReport {
    /// 是否全部销毁成功
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// 合并另一份报告
    pub fn merge(&mut self, other: Self) {
        self.destroyed.extend(other.destroyed);
        self.failures.extend(other.failures);
    }
}

/// 单例注册表 trait
pub trait SingletonRegistry: Send + Sync {
    /// 获取已完成的单例，不会创建，也不会暴露早期引用
    fn get_singleton(&self, key: &str) -> Option<Instance>;

    /// 获取或创建单例
    ///
    /// 若其他线程正在创建同一个键，当前线程会等待其完成；
    /// 若当前线程已在创建该键，返回循环依赖错误。
    fn get_or_create(&self, key: &str, factory: ObjectFactory<'_>) -> DependencyResult<Instance>;

    /// 获取早期引用
    ///
    /// 已完成时返回完成的实例；正在创建时返回早期引用，必要时调用早期引用工厂；
    /// 其余情况返回 `None`。
    fn get_early_reference(&self, key: &str) -> DependencyResult<Option<Instance>>;

    /// 只查看已完成实例或已暴露的早期引用，不调用任何工厂
    fn peek_early_reference(&self, key: &str) -> Option<Instance>;

    /// 登记早期引用工厂，键已完成时忽略
    fn register_pending_factory(&self, key: &str, factory: EarlyReferenceFactory);

    /// 直接注册一个已构造好的单例
    fn register_singleton(&self, key: &str, instance: Instance) -> DependencyResult<()>;

    /// 是否已存在完成的单例
    fn contains_singleton(&self, key: &str) -> bool;

    /// 按注册顺序返回所有已登记的单例键
    fn singleton_names(&self) -> Vec<String>;

    /// 已登记的单例数量
    fn singleton_count(&self) -> usize;

    /// 键是否正在创建（任意线程）
    fn is_currently_in_creation(&self, key: &str) -> bool;

    /// 键是否正在由当前线程创建
    fn is_in_creation_on_current_thread(&self, key: &str) -> bool;

    /// 调整创建中标记的排除集合，`in_creation = false` 表示排除
    fn set_currently_in_creation(&self, key: &str, in_creation: bool);

    /// 记录创建过程中被抑制的错误
    fn on_suppressed_error(&self, error: BoxError);

    /// 组件在注册表中的状态
    fn state_of(&self, key: &str) -> ComponentState;

    /// 登记销毁回调
    fn register_disposable(&self, key: &str, disposable: Arc<dyn DisposableComponent>);

    /// 记录 `dependent` 依赖于 `key`
    fn register_dependent(&self, key: &str, dependent: &str);

    /// 记录 `contained` 是 `containing` 的内部组件
    fn register_contained(&self, contained: &str, containing: &str);

    /// `dependent` 是否（传递地）依赖于 `key`
    fn is_dependent(&self, key: &str, dependent: &str) -> bool;

    /// 直接依赖于 `key` 的组件
    fn dependents_of(&self, key: &str) -> Vec<String>;

    /// `key` 直接依赖的组件
    fn dependencies_of(&self, key: &str) -> Vec<String>;

    /// 销毁单个单例，依赖方会先被销毁
    fn destroy_singleton(&self, key: &str) -> DestructionReport;

    /// 按注册的逆序销毁全部单例
    fn destroy_all(&self) -> DestructionReport;
}
