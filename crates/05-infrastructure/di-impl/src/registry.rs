//! 单例注册表实现
//!
//! 所有状态由一把互斥锁保护，缓存之间的迁移（早期引用工厂 -> 早期引用 -> 完成实例）
//! 都在同一个临界区内完成，其他线程看不到中间状态。
//!
//! 用户代码（创建函数、早期引用工厂、销毁回调）始终在锁外执行。

use di_abstractions::{
    DestructionReport, DisposableComponent, EarlyReferenceFactory, ObjectFactory,
    SingletonRegistry,
};
use indexmap::{IndexMap, IndexSet};
use infrastructure_common::{
    BoxError, ComponentState, DependencyError, DependencyResult, Instance, LifecycleError,
    SharedError,
};
use once_cell::sync::OnceCell;
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use tracing::{debug, info, trace, warn};

/// 尚未被调用的早期引用工厂
///
/// `OnceCell` 保证即便多个调用方同时取早期引用，工厂也只会成功执行一次。
struct PendingFactory {
    factory: EarlyReferenceFactory,
    value: OnceCell<Instance>,
}

#[derive(Default)]
struct RegistryState {
    finished: HashMap<String, Instance>,
    early_exposed: HashMap<String, Instance>,
    pending: HashMap<String, Arc<PendingFactory>>,
    registered: IndexSet<String>,
    in_creation: HashMap<String, ThreadId>,
    exclusions: HashSet<String>,
    creation_stacks: HashMap<ThreadId, Vec<String>>,
    suppressed: HashMap<ThreadId, Vec<SharedError>>,
    waiting_on: HashMap<ThreadId, String>,
    in_destruction: bool,
    destroyed: HashSet<String>,
    disposables: IndexMap<String, Arc<dyn DisposableComponent>>,
    contained: HashMap<String, IndexSet<String>>,
    dependents: HashMap<String, IndexSet<String>>,
    dependencies: HashMap<String, IndexSet<String>>,
}

impl RegistryState {
    fn add_singleton(&mut self, key: &str, instance: Instance) {
        self.finished.insert(key.to_string(), instance);
        self.early_exposed.remove(key);
        self.pending.remove(key);
        self.registered.insert(key.to_string());
        self.destroyed.remove(key);
    }

    fn remove_singleton(&mut self, key: &str) {
        let existed = self.finished.remove(key).is_some()
            | self.early_exposed.remove(key).is_some()
            | self.pending.remove(key).is_some()
            | self.registered.shift_remove(key);
        if existed {
            self.destroyed.insert(key.to_string());
        }
    }

    /// 创建失败后清理该键的中间状态
    fn purge_partial(&mut self, key: &str) {
        if !self.finished.contains_key(key) {
            self.early_exposed.remove(key);
            self.pending.remove(key);
            self.registered.shift_remove(key);
        }
    }

    /// 离开创建，返回最外层创建需要附加的被抑制错误
    fn leave_creation(&mut self, thread: ThreadId, key: &str, excluded: bool) -> Vec<SharedError> {
        if !excluded && self.in_creation.get(key) == Some(&thread) {
            self.in_creation.remove(key);
        }
        let mut outermost = false;
        if let Some(stack) = self.creation_stacks.get_mut(&thread) {
            if let Some(position) = stack.iter().rposition(|k| k == key) {
                stack.remove(position);
            }
            if stack.is_empty() {
                self.creation_stacks.remove(&thread);
                outermost = true;
            }
        }
        if outermost {
            self.suppressed.remove(&thread).unwrap_or_default()
        } else {
            Vec::new()
        }
    }

    /// 当前线程重入创建同一个键时的循环链
    fn cycle_on_thread(&self, thread: ThreadId, key: &str) -> Vec<String> {
        let stack = self
            .creation_stacks
            .get(&thread)
            .map(Vec::as_slice)
            .unwrap_or_default();
        let start = stack.iter().position(|k| k == key).unwrap_or(stack.len());
        let mut cycle: Vec<String> = stack[start..].to_vec();
        if cycle.is_empty() {
            cycle.push(key.to_string());
        }
        cycle.push(key.to_string());
        cycle
    }

    /// 沿等待图查找跨线程死锁
    ///
    /// 当前线程准备等待 `owner` 完成 `key`；如果 `owner`（或它等待的线程）
    /// 最终又在等待当前线程持有的键，则等待永远不会结束。
    fn wait_cycle(&self, current: ThreadId, owner: ThreadId, key: &str) -> Option<Vec<String>> {
        let mut chain: Vec<String> = self
            .creation_stacks
            .get(&current)
            .and_then(|stack| stack.last().cloned())
            .into_iter()
            .collect();
        chain.push(key.to_string());

        let mut thread = owner;
        let limit = self.in_creation.len() + 1;
        for _ in 0..limit {
            let waiting_key = self.waiting_on.get(&thread)?;
            chain.push(waiting_key.clone());
            thread = *self.in_creation.get(waiting_key)?;
            if thread == current {
                return Some(chain);
            }
        }
        None
    }

    fn state_of(&self, key: &str) -> ComponentState {
        if self.finished.contains_key(key) {
            ComponentState::Created
        } else if self.in_creation.contains_key(key) {
            if self.early_exposed.contains_key(key) {
                ComponentState::EarlyExposed
            } else {
                ComponentState::InCreation
            }
        } else if self.destroyed.contains(key) {
            ComponentState::Destroyed
        } else {
            ComponentState::Absent
        }
    }
}

/// 默认单例注册表
pub struct DefaultSingletonRegistry {
    state: Mutex<RegistryState>,
    creation_finished: Condvar,
}

impl DefaultSingletonRegistry {
    /// 创建新的注册表
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            creation_finished: Condvar::new(),
        }
    }

    fn destroy_into(&self, key: &str, report: &mut DestructionReport) {
        let (disposable, dependents) = {
            let mut state = self.state.lock();
            state.remove_singleton(key);
            let disposable = state.disposables.shift_remove(key);
            let dependents = state.dependents.remove(key);
            (disposable, dependents)
        };

        // 依赖方必须先于被依赖方销毁
        for dependent in dependents.into_iter().flatten() {
            self.destroy_into(&dependent, report);
        }

        if let Some(disposable) = disposable {
            debug!("执行组件销毁回调: {}", key);
            match disposable.destroy() {
                Ok(()) => report.destroyed.push(key.to_string()),
                Err(source) => {
                    let failure = LifecycleError::DestructionFailed {
                        key: key.to_string(),
                        source,
                    };
                    warn!("组件销毁回调执行失败: {}", failure);
                    report.failures.push(failure);
                }
            }
        }

        let contained = self.state.lock().contained.remove(key);
        for inner in contained.into_iter().flatten() {
            self.destroy_into(&inner, report);
        }

        let mut state = self.state.lock();
        state.dependents.retain(|_, set| {
            set.shift_remove(key);
            !set.is_empty()
        });
        state.dependencies.remove(key);
    }
}

impl Default for DefaultSingletonRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// 创建守卫
///
/// 正常路径下由 [`CreationGuard::complete`] 收尾；创建函数 panic 时由 `Drop` 清理标记，
/// 避免等待该键的其他线程永远阻塞。
struct CreationGuard<'a> {
    registry: &'a DefaultSingletonRegistry,
    key: &'a str,
    thread: ThreadId,
    excluded: bool,
    completed: bool,
}

impl CreationGuard<'_> {
    fn complete(mut self, outcome: DependencyResult<Instance>) -> DependencyResult<Instance> {
        let result = {
            let mut state = self.registry.state.lock();
            self.completed = true;
            match outcome {
                Ok(instance) => {
                    let instance = match state.finished.get(self.key) {
                        // 被排除的键可能已在嵌套创建中先行完成
                        Some(existing) => existing.clone(),
                        None => {
                            state.add_singleton(self.key, instance.clone());
                            instance
                        }
                    };
                    // 成功路径上不再需要被抑制的错误
                    let _ = state.leave_creation(self.thread, self.key, self.excluded);
                    info!("单例组件创建完成: {}", self.key);
                    Ok(instance)
                }
                Err(error) => {
                    let related = state.leave_creation(self.thread, self.key, self.excluded);
                    state.purge_partial(self.key);
                    warn!("单例组件创建失败: {}, 原因: {}", self.key, error);
                    Err(error.with_related_causes(self.key, related))
                }
            }
        };
        self.registry.creation_finished.notify_all();
        result
    }
}

impl Drop for CreationGuard<'_> {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        {
            let mut state = self.registry.state.lock();
            let _ = state.leave_creation(self.thread, self.key, self.excluded);
            state.purge_partial(self.key);
        }
        warn!("单例组件创建被中断: {}", self.key);
        self.registry.creation_finished.notify_all();
    }
}

impl SingletonRegistry for DefaultSingletonRegistry {
    fn get_singleton(&self, key: &str) -> Option<Instance> {
        self.state.lock().finished.get(key).cloned()
    }

    fn get_or_create(&self, key: &str, factory: ObjectFactory<'_>) -> DependencyResult<Instance> {
        let current = thread::current().id();
        let excluded = {
            let mut state = self.state.lock();
            let excluded = loop {
                if let Some(instance) = state.finished.get(key) {
                    trace!("命中单例缓存: {}", key);
                    return Ok(instance.clone());
                }
                if state.in_destruction {
                    return Err(DependencyError::CreationNotAllowed {
                        key: key.to_string(),
                        message: "注册表正在销毁单例".to_string(),
                    });
                }
                if state.exclusions.contains(key) {
                    break true;
                }
                match state.in_creation.get(key).copied() {
                    None => break false,
                    Some(owner) if owner == current => {
                        let cycle = state.cycle_on_thread(current, key);
                        return Err(DependencyError::circular(cycle));
                    }
                    Some(owner) => {
                        if let Some(cycle) = state.wait_cycle(current, owner, key) {
                            warn!("检测到跨线程循环等待: {}", cycle.join(" -> "));
                            return Err(DependencyError::circular(cycle));
                        }
                        debug!("等待其他线程完成组件创建: {}", key);
                        state.waiting_on.insert(current, key.to_string());
                        self.creation_finished.wait(&mut state);
                        state.waiting_on.remove(&current);
                    }
                }
            };
            if !excluded {
                state.in_creation.insert(key.to_string(), current);
            }
            state
                .creation_stacks
                .entry(current)
                .or_default()
                .push(key.to_string());
            excluded
        };

        debug!("开始创建单例组件: {}", key);
        let guard = CreationGuard {
            registry: self,
            key,
            thread: current,
            excluded,
            completed: false,
        };
        let outcome = factory();
        guard.complete(outcome)
    }

    fn get_early_reference(&self, key: &str) -> DependencyResult<Option<Instance>> {
        let pending = {
            let state = self.state.lock();
            if let Some(instance) = state.finished.get(key) {
                return Ok(Some(instance.clone()));
            }
            if !state.in_creation.contains_key(key) {
                return Ok(None);
            }
            if let Some(instance) = state.early_exposed.get(key) {
                return Ok(Some(instance.clone()));
            }
            match state.pending.get(key) {
                Some(pending) => pending.clone(),
                None => return Ok(None),
            }
        };

        let produced = pending.value.get_or_try_init(|| (pending.factory)())?.clone();

        let mut state = self.state.lock();
        if let Some(instance) = state.finished.get(key) {
            return Ok(Some(instance.clone()));
        }
        let still_pending = state
            .pending
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, &pending));
        if still_pending {
            state.pending.remove(key);
            state.early_exposed.insert(key.to_string(), produced.clone());
            debug!("暴露早期引用: {}", key);
        }
        Ok(Some(
            state
                .early_exposed
                .get(key)
                .cloned()
                .unwrap_or(produced),
        ))
    }

    fn peek_early_reference(&self, key: &str) -> Option<Instance> {
        let state = self.state.lock();
        state
            .finished
            .get(key)
            .or_else(|| state.early_exposed.get(key))
            .cloned()
    }

    fn register_pending_factory(&self, key: &str, factory: EarlyReferenceFactory) {
        let mut state = self.state.lock();
        if state.finished.contains_key(key) {
            debug!("单例已完成，忽略早期引用工厂: {}", key);
            return;
        }
        state.pending.insert(
            key.to_string(),
            Arc::new(PendingFactory {
                factory,
                value: OnceCell::new(),
            }),
        );
        state.early_exposed.remove(key);
        state.registered.insert(key.to_string());
        trace!("登记早期引用工厂: {}", key);
    }

    fn register_singleton(&self, key: &str, instance: Instance) -> DependencyResult<()> {
        let mut state = self.state.lock();
        if state.finished.contains_key(key) {
            return Err(DependencyError::AlreadyRegistered {
                key: key.to_string(),
            });
        }
        state.add_singleton(key, instance);
        info!("注册单例组件: {}", key);
        Ok(())
    }

    fn contains_singleton(&self, key: &str) -> bool {
        self.state.lock().finished.contains_key(key)
    }

    fn singleton_names(&self) -> Vec<String> {
        self.state.lock().registered.iter().cloned().collect()
    }

    fn singleton_count(&self) -> usize {
        self.state.lock().registered.len()
    }

    fn is_currently_in_creation(&self, key: &str) -> bool {
        let state = self.state.lock();
        !state.exclusions.contains(key) && state.in_creation.contains_key(key)
    }

    fn is_in_creation_on_current_thread(&self, key: &str) -> bool {
        let current = thread::current().id();
        self.state.lock().in_creation.get(key) == Some(&current)
    }

    fn set_currently_in_creation(&self, key: &str, in_creation: bool) {
        let mut state = self.state.lock();
        if in_creation {
            state.exclusions.remove(key);
        } else {
            state.exclusions.insert(key.to_string());
        }
    }

    fn on_suppressed_error(&self, error: BoxError) {
        let current = thread::current().id();
        let mut state = self.state.lock();
        if state.creation_stacks.contains_key(&current) {
            state
                .suppressed
                .entry(current)
                .or_default()
                .push(Arc::from(error));
        }
    }

    fn state_of(&self, key: &str) -> ComponentState {
        self.state.lock().state_of(key)
    }

    fn register_disposable(&self, key: &str, disposable: Arc<dyn DisposableComponent>) {
        self.state
            .lock()
            .disposables
            .insert(key.to_string(), disposable);
    }

    fn register_dependent(&self, key: &str, dependent: &str) {
        let mut state = self.state.lock();
        let inserted = state
            .dependents
            .entry(key.to_string())
            .or_default()
            .insert(dependent.to_string());
        if inserted {
            state
                .dependencies
                .entry(dependent.to_string())
                .or_default()
                .insert(key.to_string());
            trace!("记录依赖关系: {} -> {}", dependent, key);
        }
    }

    fn register_contained(&self, contained: &str, containing: &str) {
        let inserted = self
            .state
            .lock()
            .contained
            .entry(containing.to_string())
            .or_default()
            .insert(contained.to_string());
        if inserted {
            self.register_dependent(contained, containing);
        }
    }

    fn is_dependent(&self, key: &str, dependent: &str) -> bool {
        let state = self.state.lock();
        let mut seen = HashSet::new();
        let mut pending = vec![key.to_string()];
        while let Some(current) = pending.pop() {
            if !seen.insert(current.clone()) {
                continue;
            }
            if let Some(direct) = state.dependents.get(&current) {
                if direct.contains(dependent) {
                    return true;
                }
                pending.extend(direct.iter().cloned());
            }
        }
        false
    }

    fn dependents_of(&self, key: &str) -> Vec<String> {
        self.state
            .lock()
            .dependents
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn dependencies_of(&self, key: &str) -> Vec<String> {
        self.state
            .lock()
            .dependencies
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn destroy_singleton(&self, key: &str) -> DestructionReport {
        let mut report = DestructionReport::default();
        self.destroy_into(key, &mut report);
        report
    }

    fn destroy_all(&self) -> DestructionReport {
        let names: Vec<String> = {
            let mut state = self.state.lock();
            state.in_destruction = true;
            state.disposables.keys().cloned().collect()
        };
        info!("开始销毁单例组件, 共 {} 个销毁回调", names.len());

        let mut report = DestructionReport::default();
        for name in names.iter().rev() {
            self.destroy_into(name, &mut report);
        }

        {
            let mut state = self.state.lock();
            let remaining: Vec<String> = state.registered.iter().cloned().collect();
            for key in remaining {
                state.remove_singleton(&key);
            }
            state.contained.clear();
            state.dependents.clear();
            state.dependencies.clear();
            state.in_destruction = false;
        }
        self.creation_finished.notify_all();

        if report.is_clean() {
            info!("单例组件销毁完成: {} 个", report.destroyed.len());
        } else {
            warn!(
                "单例组件销毁完成, {} 个成功, {} 个失败",
                report.destroyed.len(),
                report.failures.len()
            );
        }
        report
    }
}
