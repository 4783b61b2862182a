//! 错误类型定义

use std::sync::Arc;
use thiserror::Error;

/// 装箱的动态错误
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// 可共享的错误，用于聚合创建过程中被抑制的错误
pub type SharedError = Arc<dyn std::error::Error + Send + Sync>;

/// 配置错误类型
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("配置文件不存在: {path}")]
    FileNotFound { path: String },

    #[error("配置解析失败: {source}")]
    ParseError { source: BoxError },

    #[error("配置验证失败: {message}")]
    ValidationError { message: String },
}

impl ConfigError {
    /// 创建解析错误
    pub fn parse_error(source: impl Into<BoxError>) -> Self {
        Self::ParseError {
            source: source.into(),
        }
    }
}

/// 依赖注入错误类型
#[derive(Error, Debug)]
pub enum DependencyError {
    #[error("组件未注册: {key}")]
    ComponentNotRegistered { key: String },

    #[error("组件创建失败: {key}, 原因: {source}{}", format_related(.related_causes))]
    ComponentCreationFailed {
        key: String,
        source: BoxError,
        related_causes: Vec<SharedError>,
    },

    #[error("检测到循环依赖: {}", .cycle.join(" -> "))]
    CircularDependency { cycle: Vec<String> },

    #[error("当前不允许创建组件: {key}, 原因: {message}")]
    CreationNotAllowed { key: String, message: String },

    #[error("组件已注册: {key}")]
    AlreadyRegistered { key: String },

    #[error("组件类型不匹配: {key}, 期望契约 {expected}")]
    TypeMismatch { key: String, expected: String },

    #[error(
        "组件 {key} 的原始实例已被注入到 {dependents:?}, 但最终暴露的是包装后的实例"
    )]
    EarlyReferenceMismatch { key: String, dependents: Vec<String> },

    #[error("组件 {key} 未声明生命周期方法: {method}")]
    UnknownLifecycleMethod { key: String, method: String },

    #[error("依赖解析深度超出上限: {key}, 深度 {depth}")]
    ResolutionDepthExceeded { key: String, depth: usize },

    #[error("AOP 错误: {source}")]
    Aop {
        #[from]
        source: AopError,
    },
}

fn format_related(causes: &[SharedError]) -> String {
    if causes.is_empty() {
        return String::new();
    }
    let joined = causes
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ");
    format!(" (相关错误: {joined})")
}

impl DependencyError {
    /// 创建组件创建失败错误
    pub fn creation_failed(key: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::ComponentCreationFailed {
            key: key.into(),
            source: source.into(),
            related_causes: Vec::new(),
        }
    }

    /// 创建组件未注册错误
    pub fn not_registered(key: impl Into<String>) -> Self {
        Self::ComponentNotRegistered { key: key.into() }
    }

    /// 创建循环依赖错误
    pub fn circular<I, S>(cycle: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::CircularDependency {
            cycle: cycle.into_iter().map(Into::into).collect(),
        }
    }

    /// 是否为循环依赖错误，包括被包装为创建失败的循环依赖
    pub fn is_circular(&self) -> bool {
        self.cycle().is_some()
    }

    /// 循环依赖链，首尾为同一个键
    pub fn cycle(&self) -> Option<&[String]> {
        match self {
            Self::CircularDependency { cycle } => Some(cycle),
            Self::ComponentCreationFailed { source, .. } => {
                source.downcast_ref::<Self>().and_then(Self::cycle)
            }
            _ => None,
        }
    }

    /// 附加创建过程中被抑制的错误
    ///
    /// 其他类型的错误在有相关错误时被包装为 `key` 的创建失败，原错误作为来源保留。
    #[must_use]
    pub fn with_related_causes(self, key: &str, causes: Vec<SharedError>) -> Self {
        if causes.is_empty() {
            return self;
        }
        match self {
            Self::ComponentCreationFailed {
                key,
                source,
                mut related_causes,
            } => {
                related_causes.extend(causes);
                Self::ComponentCreationFailed {
                    key,
                    source,
                    related_causes,
                }
            }
            other => Self::ComponentCreationFailed {
                key: key.to_string(),
                source: Box::new(other),
                related_causes: causes,
            },
        }
    }

    /// 已附加的相关错误
    pub fn related_causes(&self) -> &[SharedError] {
        match self {
            Self::ComponentCreationFailed { related_causes, .. } => related_causes,
            _ => &[],
        }
    }
}

/// AOP 错误类型
#[derive(Error, Debug)]
pub enum AopError {
    #[error("无法为组件 {component} 构建代理, 缺少契约: {contract}")]
    ProxyConstruction { component: String, contract: String },

    #[error("通知执行失败: {advisor}, 原因: {source}")]
    AdviceInvocation { advisor: String, source: BoxError },

    #[error("目标方法执行失败: {source}")]
    Target { source: BoxError },

    #[error("代理配置已冻结, 不能追加通知器: {advisor}")]
    ChainFrozen { advisor: String },

    #[error("方法 {method} 的返回值类型不匹配, 期望 {expected}")]
    ReturnTypeMismatch {
        method: String,
        expected: &'static str,
    },

    #[error("切点表达式无效: {expression}, 原因: {message}")]
    InvalidPointcut { expression: String, message: String },

    #[error("目标对象不可用: {message}")]
    TargetUnavailable { message: String },
}

impl AopError {
    /// 包装目标方法抛出的错误
    pub fn target(source: impl Into<BoxError>) -> Self {
        Self::Target {
            source: source.into(),
        }
    }

    /// 包装通知体抛出的错误
    pub fn advice(advisor: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::AdviceInvocation {
            advisor: advisor.into(),
            source: source.into(),
        }
    }

    /// 是否为目标方法抛出的错误
    pub fn is_target(&self) -> bool {
        matches!(self, Self::Target { .. })
    }

    /// 以具体类型查看目标方法抛出的错误
    pub fn target_error<E>(&self) -> Option<&E>
    where
        E: std::error::Error + 'static,
    {
        match self {
            Self::Target { source } => source.downcast_ref::<E>(),
            _ => None,
        }
    }

    /// 取回目标方法抛出的原始错误
    pub fn into_target<E>(self) -> Result<E, Self>
    where
        E: std::error::Error + 'static,
    {
        match self {
            Self::Target { source } => source
                .downcast::<E>()
                .map(|error| *error)
                .map_err(|source| Self::Target { source }),
            other => Err(other),
        }
    }
}

/// 生命周期管理错误类型
#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("组件销毁失败: {key}, 原因: {source}")]
    DestructionFailed { key: String, source: BoxError },

    #[error("容器状态不允许该操作: {message}")]
    InvalidState { message: String },
}

/// 基础设施错误类型
#[derive(Error, Debug)]
pub enum InfrastructureError {
    #[error("配置错误: {source}")]
    ConfigError {
        #[from]
        source: ConfigError,
    },

    #[error("依赖注入错误: {source}")]
    DependencyError {
        #[from]
        source: DependencyError,
    },

    #[error("AOP 错误: {source}")]
    AopError {
        #[from]
        source: AopError,
    },

    #[error("生命周期错误: {source}")]
    LifecycleError {
        #[from]
        source: LifecycleError,
    },

    #[error("基础设施启动失败: {message}")]
    BootstrapFailed { message: String },

    #[error("基础设施关闭失败: {message}")]
    ShutdownFailed { message: String },
}

/// 结果类型别名
pub type ConfigResult<T> = Result<T, ConfigError>;
pub type DependencyResult<T> = Result<T, DependencyError>;
pub type AopResult<T> = Result<T, AopError>;
pub type LifecycleResult<T> = Result<T, LifecycleError>;
pub type InfrastructureResult<T> = Result<T, InfrastructureError>;
