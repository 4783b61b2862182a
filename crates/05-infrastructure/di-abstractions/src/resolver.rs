//! 组件解析器抽象接口
//!
//! 按键解析组件，并提供把类型擦除的实例还原为契约引用的扩展方法。

use infrastructure_common::{ComponentType, DependencyError, DependencyResult, Instance};
use std::any::Any;
use std::sync::Arc;

/// 组件解析器 trait
pub trait ComponentResolver: Send + Sync {
    /// 按键解析组件
    fn get_component(&self, key: &str) -> DependencyResult<Instance>;

    /// 查询组件类型
    fn component_type(&self, key: &str) -> Option<Arc<ComponentType>>;

    /// 是否存在指定键的组件定义或单例
    fn contains_component(&self, key: &str) -> bool;
}

/// 组件解析器扩展方法
pub trait ResolverExt {
    /// 按契约解析组件，原始实例与代理都通过组件类型上注册的视图转换
    fn get_as<C>(&self, key: &str) -> DependencyResult<Arc<C>>
    where
        C: ?Sized + Send + Sync + 'static;

    /// 按具体类型解析组件
    fn get_concrete<T>(&self, key: &str) -> DependencyResult<Arc<T>>
    where
        T: Any + Send + Sync;
}

impl<R> ResolverExt for R
where
    R: ComponentResolver + ?Sized,
{
    fn get_as<C>(&self, key: &str) -> DependencyResult<Arc<C>>
    where
        C: ?Sized + Send + Sync + 'static,
    {
        let instance = self.get_component(key)?;
        self.component_type(key)
            .and_then(|component_type| component_type.view::<C>(&instance))
            .ok_or_else(|| DependencyError::TypeMismatch {
                key: key.to_string(),
                expected: std::any::type_name::<C>().to_string(),
            })
    }

    fn get_concrete<T>(&self, key: &str) -> DependencyResult<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        self.get_component(key)?
            .downcast::<T>()
            .map_err(|_| DependencyError::TypeMismatch {
                key: key.to_string(),
                expected: std::any::type_name::<T>().to_string(),
            })
    }
}

/// 解析路径
///
/// 记录单个线程上正在解析的组件键，用于计算依赖方、限制解析深度与报告循环。
#[derive(Debug, Clone, Default)]
pub struct ResolutionPath {
    keys: Vec<String>,
}

impl ResolutionPath {
    /// 创建空的解析路径
    pub fn new() -> Self {
        Self::default()
    }

    /// 进入一个键的解析
    pub fn push(&mut self, key: &str, max_depth: usize) -> DependencyResult<()> {
        if self.keys.len() >= max_depth {
            return Err(DependencyError::ResolutionDepthExceeded {
                key: key.to_string(),
                depth: self.keys.len() + 1,
            });
        }
        self.keys.push(key.to_string());
        Ok(())
    }

    /// 离开最近一个键的解析
    pub fn pop(&mut self) {
        self.keys.pop();
    }

    /// 发起当前解析的组件（当前键的上一层）
    pub fn requester(&self) -> Option<&str> {
        let len = self.keys.len();
        if len < 2 {
            return None;
        }
        self.keys.get(len - 2).map(String::as_str)
    }

    /// 从 `key` 第一次出现的位置截取到末尾，并以 `key` 闭合
    pub fn cycle_from(&self, key: &str) -> Vec<String> {
        let start = self.keys.iter().position(|k| k == key).unwrap_or(0);
        let mut cycle: Vec<String> = self.keys[start..].to_vec();
        if cycle.last().map(String::as_str) != Some(key) || cycle.len() == 1 {
            cycle.push(key.to_string());
        }
        cycle
    }

    /// 当前深度
    pub fn depth(&self) -> usize {
        self.keys.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
