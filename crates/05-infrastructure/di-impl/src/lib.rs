//! # 依赖注入具体实现
//!
//! 提供单例注册表与组件容器的具体实现。
//!
//! - [`DefaultSingletonRegistry`] - 三级缓存单例注册表，支持跨线程等待与死锁检测
//! - [`DefaultComponentContainer`] - 组件创建编排器，通过早期引用解决 setter 注入循环

pub mod container;
pub mod registry;

pub use container::DefaultComponentContainer;
pub use registry::DefaultSingletonRegistry;
