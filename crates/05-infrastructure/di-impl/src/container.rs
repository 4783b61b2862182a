//! 组件容器实现
//!
//! 编排单个组件的创建流程：
//!
//! 1. 实例化前短路（后处理器可直接给出实例）
//! 2. 实例化
//! 3. 允许循环引用时，登记早期引用工厂
//! 4. 属性填充
//! 5. 初始化前后处理与初始化回调
//! 6. 早期引用一致性检查
//! 7. 登记销毁回调

use crate::registry::DefaultSingletonRegistry;
use di_abstractions::{
    ComponentContainer, ComponentDefinition, ComponentPostProcessor, ComponentResolver,
    ContainerConfig, ContainerStats, DestructionReport, ResolutionPath, SingletonRegistry,
};
use indexmap::IndexMap;
use infrastructure_common::{
    same_instance, BoxError, ComponentType, DependencyError, DependencyResult, Instance, Lifetime,
};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use tracing::{debug, info, trace, warn};

#[derive(Default)]
struct ThreadFrames {
    path: ResolutionPath,
    transients: Vec<String>,
}

/// 默认组件容器
pub struct DefaultComponentContainer {
    registry: Arc<DefaultSingletonRegistry>,
    definitions: RwLock<IndexMap<String, Arc<ComponentDefinition>>>,
    post_processors: RwLock<Vec<Arc<dyn ComponentPostProcessor>>>,
    frames: Mutex<HashMap<ThreadId, ThreadFrames>>,
    config: ContainerConfig,
    resolved: AtomicUsize,
    transients_created: AtomicUsize,
    errors: AtomicUsize,
}

/// 解析帧守卫，离开作用域时弹出当前线程的解析路径
struct ResolutionFrame<'a> {
    container: &'a DefaultComponentContainer,
    thread: ThreadId,
    requester: Option<String>,
}

impl Drop for ResolutionFrame<'_> {
    fn drop(&mut self) {
        let mut frames = self.container.frames.lock();
        if let Some(thread_frames) = frames.get_mut(&self.thread) {
            thread_frames.path.pop();
            if thread_frames.path.is_empty() && thread_frames.transients.is_empty() {
                frames.remove(&self.thread);
            }
        }
    }
}

/// 瞬时组件创建守卫
struct TransientFrame<'a> {
    container: &'a DefaultComponentContainer,
    thread: ThreadId,
}

impl Drop for TransientFrame<'_> {
    fn drop(&mut self) {
        let mut frames = self.container.frames.lock();
        if let Some(thread_frames) = frames.get_mut(&self.thread) {
            thread_frames.transients.pop();
        }
    }
}

impl DefaultComponentContainer {
    /// 使用默认配置创建容器
    pub fn new() -> Self {
        Self::with_config(ContainerConfig::default())
    }

    /// 使用指定配置创建容器
    pub fn with_config(config: ContainerConfig) -> Self {
        Self::with_registry(config, Arc::new(DefaultSingletonRegistry::new()))
    }

    /// 使用已有的注册表创建容器
    pub fn with_registry(config: ContainerConfig, registry: Arc<DefaultSingletonRegistry>) -> Self {
        Self {
            registry,
            definitions: RwLock::new(IndexMap::new()),
            post_processors: RwLock::new(Vec::new()),
            frames: Mutex::new(HashMap::new()),
            config,
            resolved: AtomicUsize::new(0),
            transients_created: AtomicUsize::new(0),
            errors: AtomicUsize::new(0),
        }
    }

    /// 单例注册表
    pub fn registry(&self) -> &Arc<DefaultSingletonRegistry> {
        &self.registry
    }

    /// 容器配置
    pub fn config(&self) -> &ContainerConfig {
        &self.config
    }

    /// 查找组件定义
    pub fn definition(&self, key: &str) -> Option<Arc<ComponentDefinition>> {
        self.definitions.read().get(key).cloned()
    }

    fn post_processors_snapshot(&self) -> Vec<Arc<dyn ComponentPostProcessor>> {
        self.post_processors.read().clone()
    }

    fn enter_resolution(&self, key: &str) -> DependencyResult<ResolutionFrame<'_>> {
        let thread = thread::current().id();
        let mut frames = self.frames.lock();
        let thread_frames = frames.entry(thread).or_default();
        thread_frames
            .path
            .push(key, self.config.max_resolution_depth)?;
        let requester = thread_frames.path.requester().map(ToString::to_string);
        Ok(ResolutionFrame {
            container: self,
            thread,
            requester,
        })
    }

    fn resolve(&self, key: &str) -> DependencyResult<Instance> {
        let frame = self.enter_resolution(key)?;

        if let Some(instance) = self.registry.get_singleton(key) {
            trace!("命中单例缓存: {}", key);
            self.record_dependent(key, &frame);
            return Ok(instance);
        }

        // 只有创建该组件的线程自身的调用栈才能拿到早期引用
        if self.registry.is_in_creation_on_current_thread(key) {
            if let Some(early) = self.registry.get_early_reference(key)? {
                debug!("使用早期引用解决循环引用: {}", key);
                self.record_dependent(key, &frame);
                return Ok(early);
            }
        }

        let definition = self
            .definition(key)
            .ok_or_else(|| DependencyError::not_registered(key))?;

        for dependency in &definition.descriptor.depends_on {
            if self.registry.is_dependent(key, dependency) {
                return Err(DependencyError::circular([key, dependency.as_str(), key]));
            }
            self.registry.register_dependent(dependency, key);
            self.get_component(dependency)?;
        }

        let instance = match definition.descriptor.lifetime {
            Lifetime::Singleton => self.registry.get_or_create(
                key,
                Box::new(|| {
                    self.discard_on_failure(key, self.create_component(key, &definition, true))
                }),
            )?,
            Lifetime::Transient => self.create_transient(key, &definition)?,
        };
        self.record_dependent(key, &frame);
        Ok(instance)
    }

    fn record_dependent(&self, key: &str, frame: &ResolutionFrame<'_>) {
        if let Some(requester) = frame.requester.as_deref() {
            if requester != key {
                self.registry.register_dependent(key, requester);
            }
        }
    }

    fn create_transient(
        &self,
        key: &str,
        definition: &ComponentDefinition,
    ) -> DependencyResult<Instance> {
        let thread = thread::current().id();
        {
            let mut frames = self.frames.lock();
            let thread_frames = frames.entry(thread).or_default();
            if thread_frames.transients.iter().any(|k| k == key) {
                return Err(DependencyError::circular(thread_frames.path.cycle_from(key)));
            }
            thread_frames.transients.push(key.to_string());
        }
        let _frame = TransientFrame {
            container: self,
            thread,
        };
        let instance =
            self.discard_on_failure(key, self.create_component(key, definition, false))?;
        self.transients_created.fetch_add(1, Ordering::Relaxed);
        Ok(instance)
    }

    /// 只在本线程创建失败时通知后处理器，等待方检测到的循环不影响创建方
    fn discard_on_failure(
        &self,
        key: &str,
        outcome: DependencyResult<Instance>,
    ) -> DependencyResult<Instance> {
        if outcome.is_err() {
            self.notify_discarded(key);
        }
        outcome
    }

    fn notify_discarded(&self, key: &str) {
        for processor in &self.post_processors_snapshot() {
            processor.component_discarded(key);
        }
    }

    fn create_component(
        &self,
        key: &str,
        definition: &ComponentDefinition,
        singleton: bool,
    ) -> DependencyResult<Instance> {
        let component_type = definition.descriptor.component_type.clone();

        if let Some(instance) = self.resolve_before_instantiation(key, &component_type)? {
            debug!("后处理器在实例化前给出了组件: {}", key);
            return Ok(instance);
        }

        let raw = (definition.instantiate)(self)?;

        let early_exposure = singleton
            && self.config.allow_circular_references
            && self.registry.is_currently_in_creation(key);
        if early_exposure {
            let processors = self.post_processors_snapshot();
            let early_raw = raw.clone();
            let early_key = key.to_string();
            let early_type = component_type.clone();
            self.registry.register_pending_factory(
                key,
                Box::new(move || {
                    let mut exposed = early_raw.clone();
                    for processor in &processors {
                        exposed = processor.early_reference(&early_key, &early_type, exposed)?;
                    }
                    Ok(exposed)
                }),
            );
        }

        if let Some(populate) = &definition.populate {
            populate(&raw, self)?;
        }

        let mut exposed = self.initialize_component(key, definition, &component_type, &raw)?;

        if early_exposure {
            if let Some(early) = self.registry.peek_early_reference(key) {
                if same_instance(&exposed, &raw) {
                    exposed = early;
                } else if !same_instance(&exposed, &early)
                    && !self.config.allow_raw_injection_despite_wrapping
                {
                    let dependents = self.registry.dependents_of(key);
                    if !dependents.is_empty() {
                        return Err(DependencyError::EarlyReferenceMismatch {
                            key: key.to_string(),
                            dependents,
                        });
                    }
                }
            }
        }

        if singleton {
            self.register_disposable_if_necessary(key, definition, &component_type, &raw)?;
        }
        Ok(exposed)
    }

    fn resolve_before_instantiation(
        &self,
        key: &str,
        component_type: &Arc<ComponentType>,
    ) -> DependencyResult<Option<Instance>> {
        let processors = self.post_processors_snapshot();
        for processor in &processors {
            if let Some(instance) =
                processor.post_process_before_instantiation(key, component_type)?
            {
                let mut current = instance;
                for after in &processors {
                    current = after.post_process_after_initialization(key, component_type, current)?;
                }
                return Ok(Some(current));
            }
        }
        Ok(None)
    }

    fn initialize_component(
        &self,
        key: &str,
        definition: &ComponentDefinition,
        component_type: &Arc<ComponentType>,
        raw: &Instance,
    ) -> DependencyResult<Instance> {
        let processors = self.post_processors_snapshot();
        let mut current = raw.clone();
        for processor in &processors {
            current = processor.post_process_before_initialization(key, component_type, current)?;
        }

        if let Some(method) = &definition.descriptor.init_method {
            debug!("执行初始化方法: {}.{}", key, method);
            let callback = lookup_lifecycle_method(key, component_type, method)?;
            callback(raw).map_err(|source| DependencyError::creation_failed(key, source))?;
        }

        for processor in &processors {
            current = processor.post_process_after_initialization(key, component_type, current)?;
        }
        Ok(current)
    }

    fn register_disposable_if_necessary(
        &self,
        key: &str,
        definition: &ComponentDefinition,
        component_type: &Arc<ComponentType>,
        raw: &Instance,
    ) -> DependencyResult<()> {
        let Some(method) = &definition.descriptor.destroy_method else {
            return Ok(());
        };
        let callback = lookup_lifecycle_method(key, component_type, method)?.clone();
        let target = raw.clone();
        self.registry.register_disposable(
            key,
            Arc::new(move || -> Result<(), BoxError> { callback(&target) }),
        );
        Ok(())
    }
}

fn lookup_lifecycle_method<'a>(
    key: &str,
    component_type: &'a ComponentType,
    method: &str,
) -> DependencyResult<&'a infrastructure_common::LifecycleMethod> {
    component_type
        .lifecycle_method(method)
        .ok_or_else(|| DependencyError::UnknownLifecycleMethod {
            key: key.to_string(),
            method: method.to_string(),
        })
}

impl Default for DefaultComponentContainer {
    fn default() -> Self {
        Self::new()
    }
}

impl ComponentResolver for DefaultComponentContainer {
    fn get_component(&self, key: &str) -> DependencyResult<Instance> {
        match self.resolve(key) {
            Ok(instance) => {
                self.resolved.fetch_add(1, Ordering::Relaxed);
                Ok(instance)
            }
            Err(error) => {
                self.errors.fetch_add(1, Ordering::Relaxed);
                Err(error)
            }
        }
    }

    fn component_type(&self, key: &str) -> Option<Arc<ComponentType>> {
        self.definitions
            .read()
            .get(key)
            .map(|definition| definition.descriptor.component_type.clone())
    }

    fn contains_component(&self, key: &str) -> bool {
        self.definitions.read().contains_key(key) || self.registry.contains_singleton(key)
    }
}

impl ComponentContainer for DefaultComponentContainer {
    fn register_definition(&self, definition: ComponentDefinition) {
        let key = definition.key().to_string();
        info!(
            "注册组件: {} ({})",
            key,
            definition.component_type().info().module_path
        );
        let previous = self
            .definitions
            .write()
            .insert(key.clone(), Arc::new(definition));
        if previous.is_some() {
            warn!("组件定义被覆盖: {}", key);
        }
    }

    fn register_singleton(&self, key: &str, instance: Instance) -> DependencyResult<()> {
        self.registry.register_singleton(key, instance)
    }

    fn add_post_processor(&self, processor: Arc<dyn ComponentPostProcessor>) {
        info!("注册后处理器: {} (order = {})", processor.name(), processor.order());
        let mut processors = self.post_processors.write();
        processors.push(processor);
        processors.sort_by_key(|processor| processor.order());
    }

    fn definition_names(&self) -> Vec<String> {
        self.definitions.read().keys().cloned().collect()
    }

    fn pre_instantiate_singletons(&self) -> DependencyResult<usize> {
        let eager: Vec<String> = self
            .definitions
            .read()
            .values()
            .filter(|definition| {
                definition.descriptor.is_singleton() && !definition.descriptor.lazy_init
            })
            .map(|definition| definition.key().to_string())
            .collect();
        info!("预先创建单例组件: {} 个", eager.len());
        for key in &eager {
            self.get_component(key)?;
        }
        Ok(eager.len())
    }

    fn destroy_singletons(&self) -> DestructionReport {
        let names = self.registry.singleton_names();
        let report = self.registry.destroy_all();
        for name in &names {
            self.notify_discarded(name);
        }
        report
    }

    fn stats(&self) -> ContainerStats {
        ContainerStats {
            registered_components: self.definitions.read().len(),
            resolved_components: self.resolved.load(Ordering::Relaxed),
            active_singletons: self.registry.singleton_count(),
            transient_instances: self.transients_created.load(Ordering::Relaxed),
            resolution_errors: self.errors.load(Ordering::Relaxed),
        }
    }
}
