//! 组件上下文构建器

use crate::context::ComponentContext;
use crate::settings::{ContextSettings, LoggingSettings, SettingsLoader, DEFAULT_ENV_PREFIX};
use aop_abstractions::{Advisor, TargetSourceCreator};
use aop_impl::{AspectDefinition, AutoProxyCreator, InMemoryAdvisorCatalog};
use di_abstractions::{ComponentContainer, ComponentDefinition, ComponentPostProcessor};
use di_impl::DefaultComponentContainer;
use infrastructure_common::{Instance, InfrastructureError, InfrastructureResult};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// 组件上下文构建器
///
/// 使用建造者模式收集配置来源、组件定义与切面，最后组装出 [`ComponentContext`]。
pub struct ContextBuilder {
    /// 配置加载器
    loader: SettingsLoader,
    /// 显式给出的配置，优先于配置来源
    settings: Option<ContextSettings>,
    /// 组件定义
    definitions: Vec<ComponentDefinition>,
    /// 预先构造好的单例
    singletons: Vec<(String, Instance)>,
    /// 通知器目录
    catalog: Arc<InMemoryAdvisorCatalog>,
    /// 额外的后处理器
    post_processors: Vec<Arc<dyn ComponentPostProcessor>>,
    /// 目标源创建器
    target_source_creators: Vec<Arc<dyn TargetSourceCreator>>,
    /// 日志配置，设置后构建时安装订阅器
    logging: Option<LoggingConfig>,
}

impl ContextBuilder {
    /// 创建新的上下文构建器
    pub fn new() -> Self {
        Self {
            loader: SettingsLoader::new(),
            settings: None,
            definitions: Vec::new(),
            singletons: Vec::new(),
            catalog: Arc::new(InMemoryAdvisorCatalog::new()),
            post_processors: Vec::new(),
            target_source_creators: Vec::new(),
            logging: None,
        }
    }

    /// 添加配置文件
    pub fn with_settings_file<P: AsRef<Path>>(mut self, path: P) -> InfrastructureResult<Self> {
        self.loader.add_file(path)?;
        Ok(self)
    }

    /// 叠加指定前缀的环境变量
    #[must_use]
    pub fn with_env_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.loader.set_env_prefix(prefix);
        self
    }

    /// 叠加默认前缀的环境变量
    #[must_use]
    pub fn with_default_env(self) -> Self {
        self.with_env_prefix(DEFAULT_ENV_PREFIX)
    }

    /// 直接指定配置，忽略配置来源
    #[must_use]
    pub fn with_settings(mut self, settings: ContextSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// 注册组件定义
    #[must_use]
    pub fn register(mut self, definition: ComponentDefinition) -> Self {
        debug!("注册组件定义: {}", definition.key());
        self.definitions.push(definition);
        self
    }

    /// 注册已构造好的单例
    #[must_use]
    pub fn register_singleton(mut self, key: impl Into<String>, instance: Instance) -> Self {
        self.singletons.push((key.into(), instance));
        self
    }

    /// 添加切面
    #[must_use]
    pub fn add_aspect(self, aspect: AspectDefinition) -> Self {
        self.catalog.register_aspect(aspect);
        self
    }

    /// 添加单独的通知器
    #[must_use]
    pub fn add_advisor(self, advisor: Arc<Advisor>) -> Self {
        self.catalog.register_advisor(advisor);
        self
    }

    /// 添加后处理器
    #[must_use]
    pub fn add_post_processor(mut self, processor: Arc<dyn ComponentPostProcessor>) -> Self {
        info!("添加后处理器: {}", processor.name());
        self.post_processors.push(processor);
        self
    }

    /// 添加目标源创建器
    #[must_use]
    pub fn add_target_source_creator(mut self, creator: Arc<dyn TargetSourceCreator>) -> Self {
        self.target_source_creators.push(creator);
        self
    }

    /// 配置日志
    #[must_use]
    pub fn with_logging(mut self, config: LoggingConfig) -> Self {
        self.logging = Some(config);
        self
    }

    /// 构建组件上下文，不会创建任何组件
    pub fn build(self) -> InfrastructureResult<ComponentContext> {
        let settings = match self.settings {
            Some(settings) => settings,
            None => self.loader.load()?,
        };

        // 只有在明确配置了日志时才初始化日志，避免测试中重复安装订阅器
        if let Some(logging) = &self.logging {
            initialize_logging(logging)?;
        } else if settings.logging.enabled {
            initialize_logging(&LoggingConfig::from_settings(&settings.logging)?)?;
        }

        info!("开始构建组件上下文");
        let container = Arc::new(DefaultComponentContainer::with_config(
            settings.container.clone(),
        ));

        let auto_proxy = Arc::new(AutoProxyCreator::new(self.catalog.clone(), &settings.proxy)?);
        for creator in self.target_source_creators {
            auto_proxy.add_target_source_creator(creator);
        }
        container.add_post_processor(auto_proxy.clone());
        for processor in self.post_processors {
            container.add_post_processor(processor);
        }

        for (key, instance) in self.singletons {
            container.register_singleton(&key, instance)?;
        }
        for definition in self.definitions {
            container.register_definition(definition);
        }

        info!(
            "组件上下文构建完成: {} 个组件定义, {} 个通知器",
            container.definition_names().len(),
            self.catalog.len()
        );
        Ok(ComponentContext::new(
            container,
            self.catalog,
            auto_proxy,
            settings,
        ))
    }
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// 日志配置
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// 日志级别
    pub level: tracing::Level,
    /// 是否显示目标
    pub show_target: bool,
    /// 是否显示线程ID
    pub show_thread_ids: bool,
    /// 是否显示文件名
    pub show_file: bool,
    /// 是否显示行号
    pub show_line_number: bool,
    /// 是否使用 JSON 格式
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: tracing::Level::INFO,
            show_target: true,
            show_thread_ids: false,
            show_file: false,
            show_line_number: false,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// 创建开发环境日志配置
    pub fn development() -> Self {
        Self {
            level: tracing::Level::DEBUG,
            show_target: true,
            show_thread_ids: true,
            show_file: true,
            show_line_number: true,
            json_format: false,
        }
    }

    /// 创建生产环境日志配置
    pub fn production() -> Self {
        Self {
            level: tracing::Level::INFO,
            show_target: false,
            show_thread_ids: false,
            show_file: false,
            show_line_number: false,
            json_format: true,
        }
    }

    /// 指定日志级别
    #[must_use]
    pub fn with_level(mut self, level: tracing::Level) -> Self {
        self.level = level;
        self
    }

    /// 由配置项生成
    pub fn from_settings(settings: &LoggingSettings) -> InfrastructureResult<Self> {
        let level = parse_level(&settings.level)?;
        Ok(Self {
            level,
            json_format: settings.json,
            ..Self::default()
        })
    }
}

/// 解析日志级别
pub fn parse_level(level: &str) -> InfrastructureResult<tracing::Level> {
    level
        .parse::<tracing::Level>()
        .map_err(|e| InfrastructureError::BootstrapFailed {
            message: format!("无效的日志级别 {level}: {e}"),
        })
}

/// 安装全局日志订阅器
///
/// 已经安装过订阅器时返回错误。
pub fn initialize_logging(config: &LoggingConfig) -> InfrastructureResult<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(config.level)
        .with_target(config.show_target)
        .with_thread_ids(config.show_thread_ids)
        .with_file(config.show_file)
        .with_line_number(config.show_line_number);

    if config.json_format {
        subscriber.json().try_init()
    } else {
        subscriber.try_init()
    }
    .map_err(|e| InfrastructureError::BootstrapFailed {
        message: format!("日志初始化失败: {e}"),
    })?;

    info!("日志系统初始化完成");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_presets() {
        let development = LoggingConfig::development();
        assert_eq!(development.level, tracing::Level::DEBUG);
        assert!(!development.json_format);

        let production = LoggingConfig::production();
        assert_eq!(production.level, tracing::Level::INFO);
        assert!(production.json_format);
    }

    #[test]
    fn test_logging_from_settings() {
        let settings = LoggingSettings {
            enabled: true,
            level: "warn".to_string(),
            json: true,
        };
        let config = LoggingConfig::from_settings(&settings).unwrap();
        assert_eq!(config.level, tracing::Level::WARN);
        assert!(config.json_format);

        let invalid = LoggingSettings {
            level: "loud".to_string(),
            ..LoggingSettings::default()
        };
        assert!(matches!(
            LoggingConfig::from_settings(&invalid),
            Err(InfrastructureError::BootstrapFailed { .. })
        ));
    }

    #[test]
    fn test_missing_settings_file_fails_builder() {
        let result = ContextBuilder::new().with_settings_file("/no/such/settings.toml");
        assert!(matches!(
            result,
            Err(InfrastructureError::ConfigError { .. })
        ));
    }

    #[test]
    fn test_build_registers_definitions_without_creating_them() {
        let context = ContextBuilder::new()
            .register(ComponentDefinition::of::<String, _>(
                "greeting",
                infrastructure_common::ComponentType::of::<String>(),
                |_| Ok("你好".to_string()),
            ))
            .register_singleton("answer", Arc::new(42_u32))
            .build()
            .unwrap();

        let stats = context.container().stats();
        assert_eq!(stats.registered_components, 1);
        assert_eq!(stats.active_singletons, 1);
    }
}
