//! # 组件上下文组合层
//!
//! 把单例注册表、组件容器与自动代理引擎组合成一个可运行的组件上下文。
//!
//! ## 主要功能
//!
//! - **上下文构建器**: 使用构建者模式注册组件定义、切面与配置来源
//! - **配置加载**: 从 TOML 文件与环境变量叠加出容器与代理配置
//! - **生命周期管理**: 刷新时预先创建单例，关闭时按依赖顺序销毁
//!
//! ## 基本使用
//!
//! ```rust,no_run
//! use infrastructure_composition::ComponentContext;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let context = Arc::new(
//!         ComponentContext::builder()
//!             .with_default_env()
//!             .build()?,
//!     );
//!
//!     context.start().await?;
//!     println!("上下文状态: {:?}", context.status());
//!     context.stop().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod context;
pub mod settings;

pub use builder::{initialize_logging, parse_level, ContextBuilder, LoggingConfig};
pub use context::{ComponentContext, ContextMetrics, ContextStatus};
pub use settings::{ContextSettings, LoggingSettings, SettingsLoader, DEFAULT_ENV_PREFIX};

// 重新导出错误类型
pub use infrastructure_common::InfrastructureError;
