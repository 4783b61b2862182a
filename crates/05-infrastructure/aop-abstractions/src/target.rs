//! 目标源
//!
//! 代理每次调用时通过目标源获取真正的目标对象。静态目标源始终返回同一个实例；
//! 动态目标源可以延迟创建或每次创建新实例。

use infrastructure_common::{AopResult, ComponentType, Instance};
use std::sync::Arc;

/// 目标源 trait
pub trait TargetSource: Send + Sync {
    /// 是否总是返回同一个实例
    fn is_static(&self) -> bool {
        false
    }

    /// 获取目标对象
    fn get_target(&self) -> AopResult<Instance>;

    /// 调用结束后归还目标对象
    fn release_target(&self, _target: Instance) {}
}

/// 目标源创建器
///
/// 在组件实例化之前被询问，返回 `Some` 时组件改由该目标源提供，容器不会再实例化它。
pub trait TargetSourceCreator: Send + Sync {
    /// 为组件创建目标源
    fn create_target_source(
        &self,
        key: &str,
        component_type: &ComponentType,
    ) -> Option<Arc<dyn TargetSource>>;
}
