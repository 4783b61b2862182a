//! 组件描述定义
//!
//! 容器内的组件以键标识，以 [`ComponentDescriptor`] 描述如何构造。

use crate::lifecycle::Lifetime;
use crate::metadata::ComponentType;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// 类型擦除的组件实例
pub type Instance = Arc<dyn Any + Send + Sync>;

/// 判断两个实例是否为同一个对象
pub fn same_instance(a: &Instance, b: &Instance) -> bool {
    instance_address(a) == instance_address(b)
}

/// 实例的地址，用于以身份而非值比较实例
pub fn instance_address(instance: &Instance) -> usize {
    Arc::as_ptr(instance).cast::<()>() as usize
}

/// 组件角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ComponentRole {
    /// 应用组件
    #[default]
    Application,
    /// 支撑组件，通常是某个更大配置的一部分
    Support,
    /// 容器基础设施（通知、切面、后处理器等），不会被自动代理
    Infrastructure,
}

/// 组件描述符
///
/// 包含构造一个组件所需的全部元数据，由注册阶段产生，之后只读。
#[derive(Debug, Clone)]
pub struct ComponentDescriptor {
    /// 组件键
    pub key: String,
    /// 组件类型
    pub component_type: Arc<ComponentType>,
    /// 生命周期
    pub lifetime: Lifetime,
    /// 必须先于本组件创建的组件
    pub depends_on: Vec<String>,
    /// 初始化方法名称
    pub init_method: Option<String>,
    /// 销毁方法名称
    pub destroy_method: Option<String>,
    /// 是否延迟初始化
    pub lazy_init: bool,
    /// 自定义属性
    pub metadata: HashMap<String, String>,
}

impl ComponentDescriptor {
    /// 创建新的组件描述符
    pub fn new(key: impl Into<String>, component_type: ComponentType) -> Self {
        Self::with_shared_type(key, Arc::new(component_type))
    }

    /// 共享已有的组件类型
    pub fn with_shared_type(key: impl Into<String>, component_type: Arc<ComponentType>) -> Self {
        Self {
            key: key.into(),
            component_type,
            lifetime: Lifetime::default(),
            depends_on: Vec::new(),
            init_method: None,
            destroy_method: None,
            lazy_init: false,
            metadata: HashMap::new(),
        }
    }

    /// 设置生命周期
    #[must_use]
    pub fn with_lifetime(mut self, lifetime: Lifetime) -> Self {
        self.lifetime = lifetime;
        self
    }

    /// 声明显式依赖
    #[must_use]
    pub fn depends_on(mut self, key: impl Into<String>) -> Self {
        self.depends_on.push(key.into());
        self
    }

    /// 设置初始化方法
    #[must_use]
    pub fn with_init_method(mut self, method: impl Into<String>) -> Self {
        self.init_method = Some(method.into());
        self
    }

    /// 设置销毁方法
    #[must_use]
    pub fn with_destroy_method(mut self, method: impl Into<String>) -> Self {
        self.destroy_method = Some(method.into());
        self
    }

    /// 设置延迟初始化
    #[must_use]
    pub fn with_lazy_init(mut self, lazy: bool) -> Self {
        self.lazy_init = lazy;
        self
    }

    /// 添加自定义属性
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// 是否为单例
    pub fn is_singleton(&self) -> bool {
        self.lifetime == Lifetime::Singleton
    }
}
