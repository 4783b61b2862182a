//! # Infrastructure Common
//!
//! 这个 crate 提供了组件容器各层共享的基础类型。
//!
//! ## 核心类型
//!
//! - [`Instance`] - 类型擦除的组件实例
//! - [`ComponentDescriptor`] - 已解析的组件构造元数据
//! - [`ComponentType`] - 组件类型表面（方法签名、注解、契约视图、生命周期方法）
//! - [`ComponentState`] - 注册表中组件的生命周期状态
//! - [`DependencyError`] / [`AopError`] - 错误分类
//!
//! ## 设计原则
//!
//! - 组件之间在构造完成前只通过键引用
//! - 代理与原始实例共享同一套契约视图，调用方无需区分

pub mod component;
pub mod errors;
pub mod lifecycle;
pub mod metadata;

pub use component::*;
pub use errors::*;
pub use lifecycle::*;
pub use metadata::*;
