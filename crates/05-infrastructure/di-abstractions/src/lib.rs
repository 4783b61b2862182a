//! # Dependency Injection Abstractions
//!
//! 依赖注入抽象层，定义组件注册、单例缓存和依赖解析的核心接口。
//!
//! ## 核心接口
//!
//! - [`SingletonRegistry`] - 单例注册表接口（三级缓存、依赖图、销毁）
//! - [`ComponentResolver`] - 组件解析接口
//! - [`ComponentDefinition`] - 组件的实例化与属性填充步骤
//! - [`ComponentPostProcessor`] - 组件创建过程中的扩展点
//! - [`ComponentContainer`] - 容器整体接口

pub mod container;
pub mod factory;
pub mod processor;
pub mod registry;
pub mod resolver;

pub use container::*;
pub use factory::*;
pub use processor::*;
pub use registry::*;
pub use resolver::*;
