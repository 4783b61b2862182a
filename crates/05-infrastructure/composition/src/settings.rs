//! 上下文配置加载
//!
//! 配置来源按添加顺序叠加，后添加的覆盖先添加的；环境变量总是最后叠加。
//! 未出现的字段取各配置结构的默认值。

use aop_abstractions::ProxyConfig;
use di_abstractions::ContainerConfig;
use infrastructure_common::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// 默认环境变量前缀
pub const DEFAULT_ENV_PREFIX: &str = "CONTAINER";

/// 环境变量中嵌套字段的分隔符，例如 `CONTAINER__PROXY__FROZEN`
pub const ENV_SEPARATOR: &str = "__";

/// 组件上下文配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextSettings {
    /// 容器配置
    pub container: ContainerConfig,
    /// 自动代理配置
    pub proxy: ProxyConfig,
    /// 日志配置
    pub logging: LoggingSettings,
}

/// 日志配置项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// 构建上下文时是否安装日志订阅器
    pub enabled: bool,
    /// 日志级别
    pub level: String,
    /// 是否输出 JSON
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            level: "info".to_string(),
            json: false,
        }
    }
}

/// 配置加载器
#[derive(Debug, Clone, Default)]
pub struct SettingsLoader {
    files: Vec<PathBuf>,
    env_prefix: Option<String>,
}

impl SettingsLoader {
    /// 创建空的加载器
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加配置文件，格式由扩展名决定
    pub fn add_file(&mut self, path: impl AsRef<Path>) -> ConfigResult<()> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.display().to_string(),
            });
        }
        info!("添加配置文件: {}", path.display());
        self.files.push(path.to_path_buf());
        Ok(())
    }

    /// 设置环境变量前缀
    pub fn set_env_prefix(&mut self, prefix: impl Into<String>) {
        let prefix = prefix.into();
        info!("添加环境变量配置源，前缀: {}", prefix);
        self.env_prefix = Some(prefix);
    }

    /// 是否没有任何配置来源
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.env_prefix.is_none()
    }

    /// 加载配置
    pub fn load(&self) -> ConfigResult<ContextSettings> {
        let mut builder = config::Config::builder();
        for file in &self.files {
            builder = builder.add_source(config::File::from(file.as_path()));
        }
        if let Some(prefix) = &self.env_prefix {
            builder = builder.add_source(
                config::Environment::with_prefix(prefix)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true),
            );
        }

        let settings = builder
            .build()
            .map_err(ConfigError::parse_error)?
            .try_deserialize::<ContextSettings>()
            .map_err(ConfigError::parse_error)?;
        debug!("配置加载完成: {:?}", settings);
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_without_sources() {
        let settings = SettingsLoader::new().load().unwrap();
        assert!(settings.container.allow_circular_references);
        assert!(!settings.container.allow_raw_injection_despite_wrapping);
        assert_eq!(settings.container.max_resolution_depth, 100);
        assert!(!settings.proxy.frozen);
        assert!(settings.proxy.apply_common_advisors_first);
        assert_eq!(settings.logging, LoggingSettings::default());
    }

    #[test]
    fn test_missing_file_is_reported() {
        let mut loader = SettingsLoader::new();
        let error = loader.add_file("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(error, ConfigError::FileNotFound { .. }));
        assert!(loader.is_empty());
    }

    #[test]
    fn test_toml_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[container]
allow_circular_references = false
max_resolution_depth = 8

[proxy]
frozen = true
skip_components = ["internal*"]
common_advisors = ["audit.logCall"]

[logging]
level = "debug"
"#
        )
        .unwrap();

        let mut loader = SettingsLoader::new();
        loader.add_file(file.path()).unwrap();
        let settings = loader.load().unwrap();

        assert!(!settings.container.allow_circular_references);
        assert_eq!(settings.container.max_resolution_depth, 8);
        assert!(settings.container.pre_instantiate_singletons);
        assert!(settings.proxy.frozen);
        assert_eq!(settings.proxy.skip_components, vec!["internal*".to_string()]);
        assert_eq!(settings.proxy.common_advisors, vec!["audit.logCall".to_string()]);
        assert_eq!(settings.logging.level, "debug");
    }

    #[test]
    fn test_environment_overrides_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[proxy]\nfrozen = false").unwrap();

        std::env::set_var("SETTINGSTEST__PROXY__FROZEN", "true");
        let mut loader = SettingsLoader::new();
        loader.add_file(file.path()).unwrap();
        loader.set_env_prefix("SETTINGSTEST");
        let settings = loader.load().unwrap();
        std::env::remove_var("SETTINGSTEST__PROXY__FROZEN");

        assert!(settings.proxy.frozen);
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[container\nmax_resolution_depth = ").unwrap();

        let mut loader = SettingsLoader::new();
        loader.add_file(file.path()).unwrap();
        assert!(matches!(loader.load(), Err(ConfigError::ParseError { .. })));
    }
}
