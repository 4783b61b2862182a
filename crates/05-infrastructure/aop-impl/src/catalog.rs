//! 切面声明与通知器目录

use aop_abstractions::{
    Advice, AdvisorCatalog, Advisor, InvocationResult, JoinPoint, Pointcut, ProceedingJoinPoint,
};
use indexmap::IndexMap;
use infrastructure_common::{AopError, BoxError};
use parking_lot::RwLock;
use std::any::Any;
use std::sync::Arc;
use tracing::{debug, info};

/// 构建完成的切面
#[derive(Debug, Clone)]
pub struct AspectDefinition {
    name: String,
    order: Option<i32>,
    advisors: Vec<Arc<Advisor>>,
}

impl AspectDefinition {
    /// 切面名称
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 切面排序值
    pub fn order(&self) -> Option<i32> {
        self.order
    }

    /// 切面中的通知器，按声明顺序
    pub fn advisors(&self) -> &[Arc<Advisor>] {
        &self.advisors
    }
}

/// 切面构建器
///
/// ```ignore
/// let aspect = AspectBuilder::new("audit")
///     .with_order(10)
///     .before("logCall", Pointcut::component_named("auditedSvc")?, |jp| {
///         tracing::info!("调用: {}", jp.short_description());
///         Ok(())
///     })
///     .build();
/// ```
pub struct AspectBuilder {
    name: String,
    order: Option<i32>,
    entries: Vec<(String, Pointcut, Advice)>,
}

impl AspectBuilder {
    /// 创建切面构建器
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            order: None,
            entries: Vec::new(),
        }
    }

    /// 设置切面排序值，作用于切面内的全部通知器
    #[must_use]
    pub fn with_order(mut self, order: i32) -> Self {
        self.order = Some(order);
        self
    }

    /// 声明通知，声明顺序按调用次序递增
    #[must_use]
    pub fn advice(mut self, name: impl Into<String>, pointcut: Pointcut, advice: Advice) -> Self {
        self.entries.push((name.into(), pointcut, advice));
        self
    }

    /// 前置通知
    #[must_use]
    pub fn before<F>(self, name: impl Into<String>, pointcut: Pointcut, body: F) -> Self
    where
        F: Fn(&JoinPoint) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.advice(name, pointcut, Advice::before(body))
    }

    /// 后置通知
    #[must_use]
    pub fn after<F>(self, name: impl Into<String>, pointcut: Pointcut, body: F) -> Self
    where
        F: Fn(&JoinPoint) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.advice(name, pointcut, Advice::after(body))
    }

    /// 返回后通知
    #[must_use]
    pub fn after_returning<F>(self, name: impl Into<String>, pointcut: Pointcut, body: F) -> Self
    where
        F: Fn(&JoinPoint, &(dyn Any + Send)) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.advice(name, pointcut, Advice::after_returning(body))
    }

    /// 异常后通知
    #[must_use]
    pub fn after_throwing<F>(self, name: impl Into<String>, pointcut: Pointcut, body: F) -> Self
    where
        F: Fn(&JoinPoint, &AopError) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.advice(name, pointcut, Advice::after_throwing(body))
    }

    /// 环绕通知
    #[must_use]
    pub fn around<F>(self, name: impl Into<String>, pointcut: Pointcut, body: F) -> Self
    where
        F: Fn(&ProceedingJoinPoint<'_>) -> InvocationResult + Send + Sync + 'static,
    {
        self.advice(name, pointcut, Advice::around(body))
    }

    /// 构建切面
    pub fn build(self) -> AspectDefinition {
        let order = self.order;
        let aspect = self.name;
        let advisors = self
            .entries
            .into_iter()
            .enumerate()
            .map(|(index, (name, pointcut, advice))| {
                let advisor = Advisor::new(aspect.as_str(), name, pointcut, advice)
                    .with_declaration_order(index);
                Arc::new(match order {
                    Some(order) => advisor.with_order(order),
                    None => advisor,
                })
            })
            .collect();
        AspectDefinition {
            name: aspect,
            order,
            advisors,
        }
    }
}

#[derive(Default)]
struct CatalogState {
    aspects: IndexMap<String, AspectDefinition>,
    standalone: Vec<Arc<Advisor>>,
    flattened: Option<Vec<Arc<Advisor>>>,
}

/// 内存通知器目录
///
/// 展开后的通知器列表会被缓存，注册新的切面或通知器时失效。
#[derive(Default)]
pub struct InMemoryAdvisorCatalog {
    state: RwLock<CatalogState>,
}

impl InMemoryAdvisorCatalog {
    /// 创建空目录
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册切面，同名切面会被替换
    pub fn register_aspect(&self, aspect: AspectDefinition) {
        let mut state = self.state.write();
        info!("注册切面: {} ({} 个通知)", aspect.name, aspect.advisors.len());
        if let Some(previous) = state.aspects.insert(aspect.name.clone(), aspect) {
            debug!("切面被替换: {}", previous.name);
        }
        state.flattened = None;
    }

    /// 注册单独的通知器
    pub fn register_advisor(&self, advisor: Arc<Advisor>) {
        let mut state = self.state.write();
        debug!("注册通知器: {}", advisor.qualified_name());
        state.standalone.push(advisor);
        state.flattened = None;
    }

    /// 切面名称
    pub fn aspect_names(&self) -> Vec<String> {
        self.state.read().aspects.keys().cloned().collect()
    }

    /// 通知器总数
    pub fn len(&self) -> usize {
        let state = self.state.read();
        state
            .aspects
            .values()
            .map(|aspect| aspect.advisors.len())
            .sum::<usize>()
            + state.standalone.len()
    }

    /// 目录是否为空
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AdvisorCatalog for InMemoryAdvisorCatalog {
    fn advisors(&self) -> Vec<Arc<Advisor>> {
        if let Some(cached) = &self.state.read().flattened {
            return cached.clone();
        }
        let mut state = self.state.write();
        let flattened: Vec<Arc<Advisor>> = state
            .aspects
            .values()
            .flat_map(|aspect| aspect.advisors.iter().cloned())
            .chain(state.standalone.iter().cloned())
            .collect();
        state.flattened = Some(flattened.clone());
        flattened
    }
}

impl std::fmt::Debug for InMemoryAdvisorCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryAdvisorCatalog")
            .field("aspects", &self.aspect_names())
            .field("advisors", &self.len())
            .finish()
    }
}
