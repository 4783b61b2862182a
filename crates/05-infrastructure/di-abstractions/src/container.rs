//! 依赖注入容器抽象接口
//!
//! 提供容器的核心抽象、配置与统计信息

use crate::factory::ComponentDefinition;
use crate::processor::ComponentPostProcessor;
use crate::registry::DestructionReport;
use crate::resolver::ComponentResolver;
use infrastructure_common::{DependencyResult, Instance};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// 依赖注入容器 trait
pub trait ComponentContainer: ComponentResolver {
    /// 注册组件定义，同名定义会被覆盖
    fn register_definition(&self, definition: ComponentDefinition);

    /// 注册已构造好的单例
    fn register_singleton(&self, key: &str, instance: Instance) -> DependencyResult<()>;

    /// 添加后处理器
    fn add_post_processor(&self, processor: Arc<dyn ComponentPostProcessor>);

    /// 所有已注册的组件定义键（按注册顺序）
    fn definition_names(&self) -> Vec<String>;

    /// 预先创建所有非延迟单例，返回创建的数量
    fn pre_instantiate_singletons(&self) -> DependencyResult<usize>;

    /// 销毁全部单例
    fn destroy_singletons(&self) -> DestructionReport;

    /// 统计信息
    fn stats(&self) -> ContainerStats;
}

/// 容器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    /// 是否允许通过早期引用解决 setter 注入产生的循环引用
    pub allow_circular_references: bool,
    /// 原始实例已被注入他处、最终却暴露了包装实例时是否仍然放行
    pub allow_raw_injection_despite_wrapping: bool,
    /// 最大解析深度
    pub max_resolution_depth: usize,
    /// 刷新时是否预先创建非延迟单例
    pub pre_instantiate_singletons: bool,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            allow_circular_references: true,
            allow_raw_injection_despite_wrapping: false,
            max_resolution_depth: 100,
            pre_instantiate_singletons: true,
        }
    }
}

/// 容器统计信息
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerStats {
    /// 已注册组件定义数量
    pub registered_components: usize,
    /// 成功解析次数
    pub resolved_components: usize,
    /// 活跃单例数量
    pub active_singletons: usize,
    /// 创建的瞬时实例数量
    pub transient_instances: usize,
    /// 解析错误数量
    pub resolution_errors: usize,
}
