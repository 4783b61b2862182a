//! # AOP Abstractions
//!
//! 面向切面编程的抽象层。
//!
//! ## 核心概念
//!
//! - [`Advice`] - 在被拦截方法周围执行的行为，共五种
//! - [`Pointcut`] - 选择方法的谓词
//! - [`Advisor`] - 切点与通知的组合，带有排序信息
//! - [`AdvisorCatalog`] - 通知器的来源
//! - [`TargetSource`] - 代理在每次调用时获取目标对象的方式
//! - [`ProxyConfig`] - 自动代理配置

pub mod advice;
pub mod advisor;
pub mod config;
pub mod pointcut;
pub mod target;

pub use advice::*;
pub use advisor::*;
pub use config::*;
pub use pointcut::*;
pub use target::*;
