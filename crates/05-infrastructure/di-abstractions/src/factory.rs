//! 组件定义
//!
//! 把组件的创建拆成两个步骤：实例化（构造器注入）与属性填充（setter 注入）。
//! 只有在两步之间，组件的早期引用才可能被其他组件取走。

use crate::resolver::ComponentResolver;
use infrastructure_common::{
    ComponentDescriptor, ComponentType, DependencyError, DependencyResult, Instance, Lifetime,
};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// 实例化函数
pub type InstantiateFn =
    Arc<dyn Fn(&dyn ComponentResolver) -> DependencyResult<Instance> + Send + Sync>;

/// 属性填充函数
pub type PopulateFn =
    Arc<dyn Fn(&Instance, &dyn ComponentResolver) -> DependencyResult<()> + Send + Sync>;

/// 组件定义
#[derive(Clone)]
pub struct ComponentDefinition {
    /// 组件描述符
    pub descriptor: ComponentDescriptor,
    /// 实例化步骤
    pub instantiate: InstantiateFn,
    /// 属性填充步骤
    pub populate: Option<PopulateFn>,
}

impl ComponentDefinition {
    /// 使用类型擦除的实例化函数创建定义
    pub fn new<F>(descriptor: ComponentDescriptor, instantiate: F) -> Self
    where
        F: Fn(&dyn ComponentResolver) -> DependencyResult<Instance> + Send + Sync + 'static,
    {
        Self {
            descriptor,
            instantiate: Arc::new(instantiate),
            populate: None,
        }
    }

    /// 使用具体类型的构造函数创建定义
    pub fn of<T, F>(key: impl Into<String>, component_type: ComponentType, constructor: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&dyn ComponentResolver) -> DependencyResult<T> + Send + Sync + 'static,
    {
        let descriptor = ComponentDescriptor::new(key, component_type);
        Self::new(descriptor, move |resolver| {
            constructor(resolver).map(|component| Arc::new(component) as Instance)
        })
    }

    /// 设置属性填充步骤
    ///
    /// 实例不是 `T` 时返回创建失败错误。
    #[must_use]
    pub fn with_populate<T, F>(mut self, populate: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&T, &dyn ComponentResolver) -> DependencyResult<()> + Send + Sync + 'static,
    {
        let key = self.descriptor.key.clone();
        let populate: PopulateFn = Arc::new(
            move |instance: &Instance, resolver: &dyn ComponentResolver| {
                let target = instance.downcast_ref::<T>().ok_or_else(|| {
                    DependencyError::creation_failed(
                        key.clone(),
                        format!("属性填充需要 {} 类型的实例", std::any::type_name::<T>()),
                    )
                })?;
                populate(target, resolver)
            },
        );
        self.populate = Some(populate);
        self
    }

    /// 修改描述符
    #[must_use]
    pub fn configure(mut self, configure: impl FnOnce(ComponentDescriptor) -> ComponentDescriptor) -> Self {
        self.descriptor = configure(self.descriptor);
        self
    }

    /// 设置生命周期
    #[must_use]
    pub fn with_lifetime(self, lifetime: Lifetime) -> Self {
        self.configure(|descriptor| descriptor.with_lifetime(lifetime))
    }

    /// 组件键
    pub fn key(&self) -> &str {
        &self.descriptor.key
    }

    /// 组件类型
    pub fn component_type(&self) -> &Arc<ComponentType> {
        &self.descriptor.component_type
    }
}

impl fmt::Debug for ComponentDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentDefinition")
            .field("descriptor", &self.descriptor)
            .field("has_populate", &self.populate.is_some())
            .finish_non_exhaustive()
    }
}
