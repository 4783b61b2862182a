//! 组件后处理器
//!
//! 后处理器按 [`ComponentPostProcessor::order`] 升序执行，参与组件创建的四个阶段：
//!
//! 1. 实例化之前，可直接返回替代实例以跳过常规创建
//! 2. 早期引用被取走时，可对早期引用进行包装
//! 3. 初始化回调之前
//! 4. 初始化回调之后，可返回包装后的实例
//!
//! 组件被销毁或创建失败时，容器调用 [`ComponentPostProcessor::component_discarded`]，
//! 处理器应丢弃为该组件保存的状态。

use infrastructure_common::{ComponentType, DependencyResult, Instance};
use std::sync::Arc;

/// 默认排序值
pub const DEFAULT_PROCESSOR_ORDER: i32 = 1000;

/// 组件后处理器 trait
pub trait ComponentPostProcessor: Send + Sync {
    /// 处理器名称
    fn name(&self) -> &str;

    /// 排序值，越小越先执行
    fn order(&self) -> i32 {
        DEFAULT_PROCESSOR_ORDER
    }

    /// 实例化之前调用，返回 `Some` 时跳过常规创建
    fn post_process_before_instantiation(
        &self,
        _key: &str,
        _component_type: &Arc<ComponentType>,
    ) -> DependencyResult<Option<Instance>> {
        Ok(None)
    }

    /// 早期引用被取走时调用
    fn early_reference(
        &self,
        _key: &str,
        _component_type: &Arc<ComponentType>,
        instance: Instance,
    ) -> DependencyResult<Instance> {
        Ok(instance)
    }

    /// 初始化回调之前调用
    fn post_process_before_initialization(
        &self,
        _key: &str,
        _component_type: &Arc<ComponentType>,
        instance: Instance,
    ) -> DependencyResult<Instance> {
        Ok(instance)
    }

    /// 初始化回调之后调用
    fn post_process_after_initialization(
        &self,
        _key: &str,
        _component_type: &Arc<ComponentType>,
        instance: Instance,
    ) -> DependencyResult<Instance> {
        Ok(instance)
    }

    /// 组件被销毁或创建失败后调用
    fn component_discarded(&self, _key: &str) {}
}
