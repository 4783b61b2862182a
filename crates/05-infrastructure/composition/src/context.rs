//! 组件上下文
//!
//! 上下文持有容器、通知器目录与自动代理处理器，负责刷新（预先创建单例）与关闭（销毁单例）。

use crate::builder::ContextBuilder;
use crate::settings::ContextSettings;
use aop_impl::{AutoProxyCreator, InMemoryAdvisorCatalog};
use di_abstractions::{
    ComponentContainer, ComponentResolver, ContainerStats, DestructionReport, ResolverExt,
};
use di_impl::DefaultComponentContainer;
use infrastructure_common::{
    Instance, InfrastructureError, InfrastructureResult, LifecycleError,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// 组件上下文
pub struct ComponentContext {
    /// 上下文标识
    id: Uuid,
    /// 组件容器
    container: Arc<DefaultComponentContainer>,
    /// 通知器目录
    catalog: Arc<InMemoryAdvisorCatalog>,
    /// 自动代理处理器
    auto_proxy: Arc<AutoProxyCreator>,
    /// 生效的配置
    settings: ContextSettings,
    /// 运行状态
    status: RwLock<ContextStatus>,
    /// 统计信息
    metrics: RwLock<ContextMetrics>,
}

impl ComponentContext {
    /// 创建上下文构建器
    pub fn builder() -> ContextBuilder {
        ContextBuilder::new()
    }

    pub(crate) fn new(
        container: Arc<DefaultComponentContainer>,
        catalog: Arc<InMemoryAdvisorCatalog>,
        auto_proxy: Arc<AutoProxyCreator>,
        settings: ContextSettings,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            container,
            catalog,
            auto_proxy,
            settings,
            status: RwLock::new(ContextStatus::Initialized),
            metrics: RwLock::new(ContextMetrics::default()),
        }
    }

    /// 刷新上下文，按配置预先创建所有非延迟单例
    pub fn refresh(&self) -> InfrastructureResult<usize> {
        {
            let mut status = self.status.write();
            if !matches!(*status, ContextStatus::Initialized | ContextStatus::Failed) {
                return Err(LifecycleError::InvalidState {
                    message: format!("上下文处于 {status:?} 状态，不能刷新"),
                }
                .into());
            }
            *status = ContextStatus::Starting;
        }
        info!("刷新组件上下文: {}", self.id);

        let created = if self.settings.container.pre_instantiate_singletons {
            match self.container.pre_instantiate_singletons() {
                Ok(created) => created,
                Err(e) => {
                    error!("预先创建单例失败: {}", e);
                    *self.status.write() = ContextStatus::Failed;
                    return Err(e.into());
                }
            }
        } else {
            0
        };

        {
            let mut metrics = self.metrics.write();
            metrics.start_time = Some(chrono::Utc::now());
            metrics.pre_instantiated = created;
        }
        *self.status.write() = ContextStatus::Running;
        info!("组件上下文刷新完成: 预先创建 {} 个单例", created);
        Ok(created)
    }

    /// 关闭上下文，销毁全部单例
    ///
    /// 销毁失败只记录日志并汇总到报告中，不会中断关闭过程。
    pub fn close(&self) -> DestructionReport {
        {
            let mut status = self.status.write();
            if *status == ContextStatus::Stopped {
                return DestructionReport::default();
            }
            *status = ContextStatus::Stopping;
        }
        info!("关闭组件上下文: {}", self.id);

        let report = self.container.destroy_singletons();
        for failure in &report.failures {
            warn!("组件销毁失败: {}", failure);
        }

        {
            let mut metrics = self.metrics.write();
            metrics.stop_time = Some(chrono::Utc::now());
            metrics.destroyed += report.destroyed.len();
            metrics.destruction_failures += report.failures.len();
        }
        *self.status.write() = ContextStatus::Stopped;
        info!(
            "组件上下文已关闭: 销毁 {} 个组件, {} 个失败",
            report.destroyed.len(),
            report.failures.len()
        );
        report
    }

    /// 在阻塞线程上刷新上下文
    pub async fn start(self: &Arc<Self>) -> InfrastructureResult<usize> {
        let context = Arc::clone(self);
        tokio::task::spawn_blocking(move || context.refresh())
            .await
            .map_err(|e| InfrastructureError::BootstrapFailed {
                message: format!("刷新任务异常退出: {e}"),
            })?
    }

    /// 在阻塞线程上关闭上下文
    pub async fn stop(self: &Arc<Self>) -> InfrastructureResult<DestructionReport> {
        let context = Arc::clone(self);
        tokio::task::spawn_blocking(move || context.close())
            .await
            .map_err(|e| InfrastructureError::ShutdownFailed {
                message: format!("关闭任务异常退出: {e}"),
            })
    }

    /// 按键获取组件
    pub fn get(&self, key: &str) -> InfrastructureResult<Instance> {
        self.ensure_open()?;
        Ok(self.container.get_component(key)?)
    }

    /// 按契约获取组件，原始实例与代理都可以
    pub fn get_as<C>(&self, key: &str) -> InfrastructureResult<Arc<C>>
    where
        C: ?Sized + Send + Sync + 'static,
    {
        self.ensure_open()?;
        Ok(self.container.get_as::<C>(key)?)
    }

    /// 按具体类型获取组件
    pub fn get_concrete<T>(&self, key: &str) -> InfrastructureResult<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        self.ensure_open()?;
        Ok(self.container.get_concrete::<T>(key)?)
    }

    /// 是否存在组件
    pub fn contains(&self, key: &str) -> bool {
        self.container.contains_component(key)
    }

    /// 上下文标识
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// 生效的配置
    pub fn settings(&self) -> &ContextSettings {
        &self.settings
    }

    /// 组件容器
    pub fn container(&self) -> &Arc<DefaultComponentContainer> {
        &self.container
    }

    /// 通知器目录
    pub fn catalog(&self) -> &Arc<InMemoryAdvisorCatalog> {
        &self.catalog
    }

    /// 自动代理处理器
    pub fn auto_proxy(&self) -> &Arc<AutoProxyCreator> {
        &self.auto_proxy
    }

    /// 运行状态
    pub fn status(&self) -> ContextStatus {
        *self.status.read()
    }

    /// 统计信息快照
    pub fn metrics(&self) -> ContextMetrics {
        let mut metrics = self.metrics.read().clone();
        metrics.proxies_created = self.auto_proxy.proxies_created();
        metrics.container = self.container.stats();
        metrics
    }

    fn ensure_open(&self) -> InfrastructureResult<()> {
        match self.status() {
            ContextStatus::Stopping | ContextStatus::Stopped => Err(LifecycleError::InvalidState {
                message: format!("上下文已关闭: {}", self.id),
            }
            .into()),
            _ => Ok(()),
        }
    }
}

impl std::fmt::Debug for ComponentContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentContext")
            .field("id", &self.id)
            .field("status", &self.status())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// 上下文运行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContextStatus {
    /// 已初始化
    Initialized,
    /// 启动中
    Starting,
    /// 运行中
    Running,
    /// 停止中
    Stopping,
    /// 已停止
    Stopped,
    /// 失败
    Failed,
}

/// 上下文统计信息
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextMetrics {
    /// 启动时间
    pub start_time: Option<chrono::DateTime<chrono::Utc>>,
    /// 停止时间
    pub stop_time: Option<chrono::DateTime<chrono::Utc>>,
    /// 刷新时预先创建的单例数量
    pub pre_instantiated: usize,
    /// 已销毁的组件数量
    pub destroyed: usize,
    /// 销毁失败数量
    pub destruction_failures: usize,
    /// 已创建的代理数量
    pub proxies_created: usize,
    /// 容器统计
    pub container: ContainerStats,
}

impl ContextMetrics {
    /// 计算运行时间
    pub fn uptime(&self) -> Option<chrono::Duration> {
        match (self.start_time, self.stop_time) {
            (Some(start), Some(stop)) => Some(stop - start),
            (Some(start), None) => Some(chrono::Utc::now() - start),
            _ => None,
        }
    }
}
