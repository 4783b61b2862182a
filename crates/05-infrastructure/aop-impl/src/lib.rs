//! # AOP 具体实现
//!
//! - [`AdviceMatcher`] - 判断通知器能否作用于组件，并对匹配结果做缓存
//! - [`InterceptorChain`] - 单个方法上按序执行的通知链
//! - [`ProxyFactory`] / [`Proxy`] - 代理构建与方法调度
//! - [`AutoProxyDecider`] / [`AutoProxyCreator`] - 决定是否代理，并以后处理器的形式接入容器
//! - [`InMemoryAdvisorCatalog`] / [`AspectBuilder`] - 切面声明与通知器目录

pub mod auto_proxy;
pub mod catalog;
pub mod chain;
pub mod matcher;
pub mod proxy;
pub mod target_source;

pub use auto_proxy::*;
pub use catalog::*;
pub use chain::*;
pub use matcher::*;
pub use proxy::*;
pub use target_source::*;
