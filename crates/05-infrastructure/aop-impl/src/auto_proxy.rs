//! 自动代理
//!
//! [`AutoProxyDecider`] 决定组件是否需要代理；[`AutoProxyCreator`] 以后处理器的形式接入容器，
//! 在三个时机创建代理：
//!
//! 1. 实例化之前，若配置了目标源，则由目标源完全替代常规创建
//! 2. 早期引用被取走时，循环依赖中的依赖方拿到的就是代理
//! 3. 初始化之后，代理成为缓存中的最终实例
//!
//! 同一个原始实例只会得到一个代理，第二次请求命中缓存。缓存只持有代理的弱引用，
//! 组件销毁或创建失败后对应记录被移除。

use crate::matcher::AdviceMatcher;
use crate::proxy::ProxyFactory;
use aop_abstractions::{
    Advisor, AdvisorCatalog, MatchTarget, NamePattern, ProxyConfig, TargetSourceCreator,
};
use dashmap::{DashMap, DashSet};
use di_abstractions::ComponentPostProcessor;
use infrastructure_common::{
    instance_address, AopResult, ComponentRole, ComponentType, ContractInfo, DependencyResult,
    Instance,
};
use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

/// 自动代理处理器的排序值，在其他后处理器之后执行
pub const AUTO_PROXY_ORDER: i32 = i32::MAX;

/// 不代理的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoProxyReason {
    /// 被排除策略排除
    Excluded,
    /// 没有配置任何通知器
    NoAdvisorsConfigured,
    /// 有通知器，但没有一个作用于该组件
    NoMatchingAdvisors,
}

/// 代理计划
#[derive(Debug, Clone)]
pub struct ProxyPlan {
    /// 拦截器嵌套顺序，由外到内
    pub advisors: Vec<Arc<Advisor>>,
    /// 代理对外暴露的契约
    pub exposed_surface: Vec<ContractInfo>,
}

/// 代理决策
#[derive(Debug, Clone)]
pub enum ProxyDecision {
    /// 需要代理
    Proxy(ProxyPlan),
    /// 不需要代理
    NoProxy(NoProxyReason),
}

impl ProxyDecision {
    /// 是否需要代理
    pub fn is_proxy(&self) -> bool {
        matches!(self, Self::Proxy(_))
    }

    /// 代理计划
    pub fn plan(&self) -> Option<&ProxyPlan> {
        match self {
            Self::Proxy(plan) => Some(plan),
            Self::NoProxy(_) => None,
        }
    }
}

/// 自动代理决策器
///
/// 决策按组件键缓存，同一个键总是得到同样的结论。
pub struct AutoProxyDecider {
    matcher: Arc<AdviceMatcher>,
    skip_patterns: Vec<NamePattern>,
    exclude_infrastructure: bool,
    common_advisors: Vec<String>,
    common_first: bool,
    decisions: DashMap<String, ProxyDecision>,
}

impl AutoProxyDecider {
    /// 按代理配置创建决策器
    pub fn new(matcher: Arc<AdviceMatcher>, config: &ProxyConfig) -> AopResult<Self> {
        let skip_patterns = config
            .skip_components
            .iter()
            .map(|pattern| NamePattern::new(pattern))
            .collect::<AopResult<Vec<_>>>()?;
        Ok(Self {
            matcher,
            skip_patterns,
            exclude_infrastructure: config.exclude_infrastructure,
            common_advisors: config.common_advisors.clone(),
            common_first: config.apply_common_advisors_first,
            decisions: DashMap::new(),
        })
    }

    /// 通知匹配器
    pub fn matcher(&self) -> &Arc<AdviceMatcher> {
        &self.matcher
    }

    /// 组件是否被排除策略排除
    pub fn is_excluded(&self, key: &str, component_type: &ComponentType) -> bool {
        (self.exclude_infrastructure && component_type.role() == ComponentRole::Infrastructure)
            || self.skip_patterns.iter().any(|pattern| pattern.matches(key))
    }

    /// 为候选组件做出代理决策
    pub fn decide_for_candidate(
        &self,
        key: &str,
        component_type: &ComponentType,
        catalog: &dyn AdvisorCatalog,
    ) -> ProxyDecision {
        if let Some(decision) = self.decisions.get(key) {
            return decision.clone();
        }
        let decision = self.decide(key, component_type, catalog);
        match &decision {
            ProxyDecision::Proxy(plan) => {
                debug!("组件需要代理: {} ({} 个通知器)", key, plan.advisors.len());
            }
            ProxyDecision::NoProxy(reason) => {
                debug!("组件不需要代理: {} ({:?})", key, reason);
            }
        }
        self.decisions
            .entry(key.to_string())
            .or_insert(decision)
            .clone()
    }

    /// 已缓存的决策数量
    pub fn cached_decisions(&self) -> usize {
        self.decisions.len()
    }

    fn decide(
        &self,
        key: &str,
        component_type: &ComponentType,
        catalog: &dyn AdvisorCatalog,
    ) -> ProxyDecision {
        if self.is_excluded(key, component_type) {
            return ProxyDecision::NoProxy(NoProxyReason::Excluded);
        }
        let candidates = catalog.advisors();
        if candidates.is_empty() {
            return ProxyDecision::NoProxy(NoProxyReason::NoAdvisorsConfigured);
        }

        let common = self.resolve_common_advisors(catalog);
        let common_ids: HashSet<u64> = common.iter().map(|advisor| advisor.id()).collect();
        let specific: Vec<Arc<Advisor>> = self
            .matcher
            .find_eligible(&candidates, &MatchTarget::new(Some(key), component_type))
            .into_iter()
            .filter(|advisor| !common_ids.contains(&advisor.id()))
            .collect();
        if specific.is_empty() {
            return ProxyDecision::NoProxy(NoProxyReason::NoMatchingAdvisors);
        }

        let advisors = if self.common_first {
            common.into_iter().chain(specific).collect()
        } else {
            specific.into_iter().chain(common).collect()
        };
        ProxyDecision::Proxy(ProxyPlan {
            advisors,
            exposed_surface: component_type.contracts().to_vec(),
        })
    }

    fn resolve_common_advisors(&self, catalog: &dyn AdvisorCatalog) -> Vec<Arc<Advisor>> {
        self.common_advisors
            .iter()
            .filter_map(|name| {
                let advisor = catalog.advisor_named(name);
                if advisor.is_none() {
                    warn!("公共通知器不存在: {}", name);
                }
                advisor
            })
            .collect()
    }
}

impl fmt::Debug for AutoProxyDecider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutoProxyDecider")
            .field("skip_patterns", &self.skip_patterns)
            .field("exclude_infrastructure", &self.exclude_infrastructure)
            .field("common_advisors", &self.common_advisors)
            .field("decisions", &self.decisions.len())
            .finish_non_exhaustive()
    }
}

/// 自动代理后处理器
pub struct AutoProxyCreator {
    catalog: Arc<dyn AdvisorCatalog>,
    decider: AutoProxyDecider,
    factory: ProxyFactory,
    creators: RwLock<Vec<Arc<dyn TargetSourceCreator>>>,
    proxies: DashMap<String, (usize, Weak<dyn Any + Send + Sync>)>,
    created: AtomicUsize,
    early_proxy_references: DashMap<String, usize>,
    target_sourced: DashSet<String>,
}

impl AutoProxyCreator {
    /// 创建自动代理处理器
    pub fn new(catalog: Arc<dyn AdvisorCatalog>, config: &ProxyConfig) -> AopResult<Self> {
        let matcher = Arc::new(AdviceMatcher::new());
        Ok(Self {
            catalog,
            decider: AutoProxyDecider::new(matcher.clone(), config)?,
            factory: ProxyFactory::new(matcher).with_frozen(config.frozen),
            creators: RwLock::new(Vec::new()),
            proxies: DashMap::new(),
            created: AtomicUsize::new(0),
            early_proxy_references: DashMap::new(),
            target_sourced: DashSet::new(),
        })
    }

    /// 添加目标源创建器
    pub fn add_target_source_creator(&self, creator: Arc<dyn TargetSourceCreator>) {
        self.creators.write().push(creator);
    }

    /// 代理决策器
    pub fn decider(&self) -> &AutoProxyDecider {
        &self.decider
    }

    /// 代理工厂
    pub fn factory(&self) -> &ProxyFactory {
        &self.factory
    }

    /// 仍然存活的组件的代理数量
    pub fn proxy_count(&self) -> usize {
        self.proxies.len() + self.target_sourced.len()
    }

    /// 累计创建的代理数量
    pub fn proxies_created(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }

    fn wrap_if_necessary(
        &self,
        key: &str,
        component_type: &Arc<ComponentType>,
        instance: Instance,
    ) -> DependencyResult<Instance> {
        if self.target_sourced.contains(key) {
            return Ok(instance);
        }
        let address = instance_address(&instance);
        // 代理持有原始实例，弱引用仍可升级时地址不会被复用
        let cached = self
            .proxies
            .get(key)
            .filter(|entry| entry.0 == address)
            .and_then(|entry| entry.1.upgrade());
        if let Some(proxy) = cached {
            debug!("代理缓存命中: {}", key);
            return Ok(proxy);
        }

        let ProxyDecision::Proxy(plan) =
            self.decider
                .decide_for_candidate(key, component_type, self.catalog.as_ref())
        else {
            return Ok(instance);
        };
        let proxy = self.factory.create_proxy(
            Some(key),
            component_type,
            instance,
            plan.advisors,
            &plan.exposed_surface,
        )?;
        self.proxies
            .insert(key.to_string(), (address, Arc::downgrade(&proxy)));
        self.created.fetch_add(1, Ordering::Relaxed);
        Ok(proxy)
    }
}

impl ComponentPostProcessor for AutoProxyCreator {
    fn name(&self) -> &str {
        "auto-proxy-creator"
    }

    fn order(&self) -> i32 {
        AUTO_PROXY_ORDER
    }

    fn post_process_before_instantiation(
        &self,
        key: &str,
        component_type: &Arc<ComponentType>,
    ) -> DependencyResult<Option<Instance>> {
        let creators = self.creators.read().clone();
        let Some(source) = creators
            .iter()
            .find_map(|creator| creator.create_target_source(key, component_type))
        else {
            return Ok(None);
        };

        let ProxyDecision::Proxy(plan) =
            self.decider
                .decide_for_candidate(key, component_type, self.catalog.as_ref())
        else {
            return Ok(None);
        };
        info!("组件由目标源提供: {}", key);
        let proxy = self.factory.create_proxy_for_source(
            Some(key),
            component_type,
            source,
            plan.advisors,
            &plan.exposed_surface,
        )?;
        self.target_sourced.insert(key.to_string());
        self.created.fetch_add(1, Ordering::Relaxed);
        Ok(Some(proxy))
    }

    fn early_reference(
        &self,
        key: &str,
        component_type: &Arc<ComponentType>,
        instance: Instance,
    ) -> DependencyResult<Instance> {
        self.early_proxy_references
            .insert(key.to_string(), instance_address(&instance));
        self.wrap_if_necessary(key, component_type, instance)
    }

    fn post_process_after_initialization(
        &self,
        key: &str,
        component_type: &Arc<ComponentType>,
        instance: Instance,
    ) -> DependencyResult<Instance> {
        if let Some((_, early)) = self.early_proxy_references.remove(key) {
            if early == instance_address(&instance) {
                // 早期引用已经代理过，容器会以早期引用作为最终实例
                return Ok(instance);
            }
        }
        self.wrap_if_necessary(key, component_type, instance)
    }

    fn component_discarded(&self, key: &str) {
        let proxied = self.proxies.remove(key).is_some();
        let sourced = self.target_sourced.remove(key).is_some();
        self.early_proxy_references.remove(key);
        if proxied || sourced {
            debug!("移除代理记录: {}", key);
        }
    }
}

impl fmt::Debug for AutoProxyCreator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutoProxyCreator")
            .field("decider", &self.decider)
            .field("proxies", &self.proxies.len())
            .field("target_sourced", &self.target_sourced.len())
            .field("created", &self.proxies_created())
            .finish_non_exhaustive()
    }
}
