//! 代理构建与方法调度
//!
//! Rust 无法在运行时为任意类型生成子类，因此代理是一个泛型包装 [`Proxy<T>`]：
//! 组件类型通过 [`ProxySupport`] 声明自己可被代理，并为 `Proxy<T>` 注册与原始类型相同的契约视图。
//! 契约的实现（通常为 `impl Contract for Proxy<T>`）把每个方法转发到 [`Proxy::invoke`]。

use crate::chain::{build_chain, InterceptorChain};
use crate::matcher::AdviceMatcher;
use aop_abstractions::{Advisor, JoinPoint, MatchTarget, ReturnValue, TargetSource};
use dashmap::DashMap;
use infrastructure_common::{
    AopError, AopResult, BoxError, ComponentType, ContractInfo, Instance, MethodSignature,
};
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// 代理记录
///
/// 保存代理的目标描述、通知器列表与每个方法的拦截器链缓存。
pub struct AdvisedSupport {
    component_key: Option<String>,
    component_type: Arc<ComponentType>,
    exposed_surface: Vec<ContractInfo>,
    advisors: RwLock<Vec<Arc<Advisor>>>,
    frozen: AtomicBool,
    matcher: Arc<AdviceMatcher>,
    chains: DashMap<String, Arc<InterceptorChain>>,
}

impl AdvisedSupport {
    /// 创建代理记录，`advisors` 的顺序即拦截器由外到内的嵌套顺序
    pub fn new(
        component_key: Option<&str>,
        component_type: Arc<ComponentType>,
        exposed_surface: Vec<ContractInfo>,
        advisors: Vec<Arc<Advisor>>,
        matcher: Arc<AdviceMatcher>,
    ) -> Self {
        Self {
            component_key: component_key.map(ToString::to_string),
            component_type,
            exposed_surface,
            advisors: RwLock::new(advisors),
            frozen: AtomicBool::new(false),
            matcher,
            chains: DashMap::new(),
        }
    }

    /// 组件键
    pub fn component_key(&self) -> Option<&str> {
        self.component_key.as_deref()
    }

    /// 组件类型
    pub fn component_type(&self) -> &Arc<ComponentType> {
        &self.component_type
    }

    /// 代理对外暴露的契约
    pub fn exposed_surface(&self) -> &[ContractInfo] {
        &self.exposed_surface
    }

    /// 当前通知器列表
    pub fn advisors(&self) -> Vec<Arc<Advisor>> {
        self.advisors.read().clone()
    }

    /// 冻结代理配置
    pub fn freeze(&self) {
        self.frozen.store(true, Ordering::Release);
    }

    /// 是否已冻结
    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }

    /// 追加通知器，新通知器位于链的最内层
    ///
    /// 已在执行中的调用继续使用旧的链，后续调用使用新的链。
    pub fn add_advisor(&self, advisor: Arc<Advisor>) -> AopResult<()> {
        if self.is_frozen() {
            return Err(AopError::ChainFrozen {
                advisor: advisor.qualified_name(),
            });
        }
        let mut advisors = self.advisors.write();
        debug!("追加通知器: {}", advisor.qualified_name());
        advisors.push(advisor);
        self.chains.clear();
        Ok(())
    }

    /// 获取方法的拦截器链，未声明的方法得到空链
    pub fn chain_for(&self, method: &str) -> Arc<InterceptorChain> {
        let advisors = self.advisors.read();
        if let Some(chain) = self.chains.get(method) {
            return chain.clone();
        }
        let chain = match self.component_type.method(method) {
            Some(signature) => {
                let target = MatchTarget::new(self.component_key(), &self.component_type);
                Arc::new(build_chain(&self.matcher, &advisors, &target, signature))
            }
            None => Arc::new(InterceptorChain::empty()),
        };
        self.chains
            .entry(method.to_string())
            .or_insert(chain)
            .clone()
    }
}

impl fmt::Debug for AdvisedSupport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdvisedSupport")
            .field("component_key", &self.component_key)
            .field("component_type", &self.component_type.name())
            .field("advisors", &self.advisors.read().len())
            .field("frozen", &self.is_frozen())
            .finish_non_exhaustive()
    }
}

/// 代理目标
pub enum ProxyTarget<T> {
    /// 固定的目标实例
    Static(Arc<T>),
    /// 每次调用时从目标源获取
    Dynamic(Arc<dyn TargetSource>),
}

/// 代理
pub struct Proxy<T: Send + Sync + 'static> {
    target: ProxyTarget<T>,
    advised: Arc<AdvisedSupport>,
}

impl<T: Send + Sync + 'static> Proxy<T> {
    /// 创建代理
    pub fn new(target: ProxyTarget<T>, advised: Arc<AdvisedSupport>) -> Self {
        Self { target, advised }
    }

    /// 代理记录
    pub fn advised(&self) -> &Arc<AdvisedSupport> {
        &self.advised
    }

    /// 固定的目标实例
    pub fn static_target(&self) -> Option<&Arc<T>> {
        match &self.target {
            ProxyTarget::Static(target) => Some(target),
            ProxyTarget::Dynamic(_) => None,
        }
    }

    /// 调用目标方法，途经该方法的拦截器链
    ///
    /// `method` 必须是组件类型上声明的方法名，未声明的方法直接调用目标。
    pub fn invoke<R, E, F>(&self, method: &str, args: &[&dyn fmt::Debug], call: F) -> AopResult<R>
    where
        R: Send + 'static,
        E: Into<BoxError>,
        F: Fn(&T) -> Result<R, E>,
    {
        let (target, lease) = self.acquire_target()?;
        let chain = self.advised.chain_for(method);

        let outcome = if chain.is_empty() {
            call(&target).map_err(AopError::target)
        } else {
            let component_type = self.advised.component_type();
            let signature = component_type
                .method(method)
                .cloned()
                .unwrap_or_else(|| MethodSignature::new(method));
            let join_point = JoinPoint::new(
                self.advised.component_key().map(ToString::to_string),
                component_type.name(),
                signature,
                args.iter().map(|arg| format!("{arg:?}")).collect(),
            );
            let invoke_target = || {
                call(&target)
                    .map(|value| Box::new(value) as ReturnValue)
                    .map_err(AopError::target)
            };
            chain.invoke(&join_point, &invoke_target).and_then(|value| {
                value
                    .downcast::<R>()
                    .map(|value| *value)
                    .map_err(|_| AopError::ReturnTypeMismatch {
                        method: method.to_string(),
                        expected: std::any::type_name::<R>(),
                    })
            })
        };

        self.release_target(lease);
        outcome
    }

    /// 调用不会失败的目标方法
    pub fn invoke_infallible<R, F>(
        &self,
        method: &str,
        args: &[&dyn fmt::Debug],
        call: F,
    ) -> AopResult<R>
    where
        R: Send + 'static,
        F: Fn(&T) -> R,
    {
        self.invoke(method, args, |target| {
            Ok::<R, std::convert::Infallible>(call(target))
        })
    }

    fn acquire_target(&self) -> AopResult<(Arc<T>, Option<Instance>)> {
        match &self.target {
            ProxyTarget::Static(target) => Ok((target.clone(), None)),
            ProxyTarget::Dynamic(source) => {
                let instance = source.get_target()?;
                let typed = instance.clone().downcast::<T>().map_err(|_| {
                    AopError::TargetUnavailable {
                        message: format!(
                            "目标源返回的实例不是 {}",
                            std::any::type_name::<T>()
                        ),
                    }
                })?;
                Ok((typed, Some(instance)))
            }
        }
    }

    fn release_target(&self, lease: Option<Instance>) {
        if let (ProxyTarget::Dynamic(source), Some(instance)) = (&self.target, lease) {
            source.release_target(instance);
        }
    }
}

fn source_address(source: &Arc<dyn TargetSource>) -> usize {
    Arc::as_ptr(source).cast::<()>() as usize
}

impl<T: PartialEq + Send + Sync + 'static> PartialEq for Proxy<T> {
    fn eq(&self, other: &Self) -> bool {
        match (&self.target, &other.target) {
            (ProxyTarget::Static(a), ProxyTarget::Static(b)) => a == b,
            (ProxyTarget::Dynamic(a), ProxyTarget::Dynamic(b)) => {
                source_address(a) == source_address(b)
            }
            _ => false,
        }
    }
}

impl<T: Hash + Send + Sync + 'static> Hash for Proxy<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match &self.target {
            ProxyTarget::Static(target) => target.hash(state),
            ProxyTarget::Dynamic(source) => source_address(source).hash(state),
        }
    }
}

impl<T: Send + Sync + 'static> fmt::Debug for Proxy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proxy")
            .field("target", &std::any::type_name::<T>())
            .field("advised", &self.advised)
            .finish()
    }
}

/// 类型擦除的代理构造器，作为扩展数据挂在组件类型上
#[derive(Clone, Copy)]
pub struct ProxyConstructor {
    target_type: TypeId,
    proxy_type: TypeId,
    target_type_name: &'static str,
    wrap_static: fn(Instance, Arc<AdvisedSupport>) -> Option<Instance>,
    wrap_dynamic: fn(Arc<dyn TargetSource>, Arc<AdvisedSupport>) -> Instance,
}

impl ProxyConstructor {
    /// 为具体类型创建代理构造器
    pub fn of<T: Send + Sync + 'static>() -> Self {
        Self {
            target_type: TypeId::of::<T>(),
            proxy_type: TypeId::of::<Proxy<T>>(),
            target_type_name: std::any::type_name::<T>(),
            wrap_static: wrap_static::<T>,
            wrap_dynamic: wrap_dynamic::<T>,
        }
    }

    /// 目标类型
    pub fn target_type(&self) -> TypeId {
        self.target_type
    }

    /// 代理类型
    pub fn proxy_type(&self) -> TypeId {
        self.proxy_type
    }
}

impl fmt::Debug for ProxyConstructor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyConstructor")
            .field("target", &self.target_type_name)
            .finish_non_exhaustive()
    }
}

fn wrap_static<T: Send + Sync + 'static>(
    target: Instance,
    advised: Arc<AdvisedSupport>,
) -> Option<Instance> {
    target
        .downcast::<T>()
        .ok()
        .map(|target| Arc::new(Proxy::new(ProxyTarget::Static(target), advised)) as Instance)
}

fn wrap_dynamic<T: Send + Sync + 'static>(
    source: Arc<dyn TargetSource>,
    advised: Arc<AdvisedSupport>,
) -> Instance {
    Arc::new(Proxy::<T>::new(ProxyTarget::Dynamic(source), advised))
}

/// 组件类型的代理声明
pub trait ProxySupport {
    /// 声明组件可被代理
    #[must_use]
    fn proxyable<T: Send + Sync + 'static>(self) -> Self;

    /// 声明组件可被代理，并注册代理到契约的视图
    #[must_use]
    fn proxied_as<T, C>(self, contract: &str, cast: fn(Arc<Proxy<T>>) -> Arc<C>) -> Self
    where
        T: Send + Sync + 'static,
        C: ?Sized + Send + Sync + 'static;
}

impl ProxySupport for ComponentType {
    fn proxyable<T: Send + Sync + 'static>(self) -> Self {
        self.with_extension(ProxyConstructor::of::<T>())
    }

    fn proxied_as<T, C>(self, contract: &str, cast: fn(Arc<Proxy<T>>) -> Arc<C>) -> Self
    where
        T: Send + Sync + 'static,
        C: ?Sized + Send + Sync + 'static,
    {
        self.proxyable::<T>().with_view::<Proxy<T>, C>(contract, cast)
    }
}

/// 代理工厂
#[derive(Debug, Clone)]
pub struct ProxyFactory {
    matcher: Arc<AdviceMatcher>,
    freeze_proxies: bool,
}

impl ProxyFactory {
    /// 创建代理工厂
    pub fn new(matcher: Arc<AdviceMatcher>) -> Self {
        Self {
            matcher,
            freeze_proxies: false,
        }
    }

    /// 创建的代理是否冻结
    #[must_use]
    pub fn with_frozen(mut self, frozen: bool) -> Self {
        self.freeze_proxies = frozen;
        self
    }

    /// 通知匹配器
    pub fn matcher(&self) -> &Arc<AdviceMatcher> {
        &self.matcher
    }

    /// 为单个方法构建拦截器链
    pub fn build_chain(
        &self,
        ordered: &[Arc<Advisor>],
        target: &MatchTarget<'_>,
        method: &MethodSignature,
    ) -> InterceptorChain {
        build_chain(&self.matcher, ordered, target, method)
    }

    /// 为固定的目标实例创建代理
    pub fn create_proxy(
        &self,
        component_key: Option<&str>,
        component_type: &Arc<ComponentType>,
        target: Instance,
        advisors: Vec<Arc<Advisor>>,
        exposed_surface: &[ContractInfo],
    ) -> AopResult<Instance> {
        let (constructor, advised) =
            self.prepare(component_key, component_type, advisors, exposed_surface)?;
        let source_type = Any::type_id(&*target);
        (constructor.wrap_static)(target, advised).ok_or_else(|| AopError::ProxyConstruction {
            component: describe(component_key, component_type),
            contract: format!(
                "{} (目标实例类型 {:?} 不符)",
                constructor.target_type_name, source_type
            ),
        })
    }

    /// 为目标源创建代理
    pub fn create_proxy_for_source(
        &self,
        component_key: Option<&str>,
        component_type: &Arc<ComponentType>,
        source: Arc<dyn TargetSource>,
        advisors: Vec<Arc<Advisor>>,
        exposed_surface: &[ContractInfo],
    ) -> AopResult<Instance> {
        let (constructor, advised) =
            self.prepare(component_key, component_type, advisors, exposed_surface)?;
        Ok((constructor.wrap_dynamic)(source, advised))
    }

    fn prepare(
        &self,
        component_key: Option<&str>,
        component_type: &Arc<ComponentType>,
        advisors: Vec<Arc<Advisor>>,
        exposed_surface: &[ContractInfo],
    ) -> AopResult<(Arc<ProxyConstructor>, Arc<AdvisedSupport>)> {
        let constructor = component_type
            .extension::<ProxyConstructor>()
            .ok_or_else(|| AopError::ProxyConstruction {
                component: describe(component_key, component_type),
                contract: format!("Proxy<{}>", component_type.name()),
            })?;

        if let Some(missing) = exposed_surface
            .iter()
            .find(|contract| !component_type.has_view(contract.id, constructor.proxy_type))
        {
            return Err(AopError::ProxyConstruction {
                component: describe(component_key, component_type),
                contract: missing.name.clone(),
            });
        }

        info!(
            "创建代理: {} ({} 个通知器)",
            describe(component_key, component_type),
            advisors.len()
        );
        let advised = Arc::new(AdvisedSupport::new(
            component_key,
            component_type.clone(),
            exposed_surface.to_vec(),
            advisors,
            self.matcher.clone(),
        ));
        if self.freeze_proxies {
            advised.freeze();
        }
        Ok((constructor, advised))
    }
}

fn describe(component_key: Option<&str>, component_type: &ComponentType) -> String {
    component_key.map_or_else(|| component_type.name().to_string(), ToString::to_string)
}
