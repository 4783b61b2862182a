//! 切点定义
//!
//! 切点分两级匹配：
//!
//! - 类型级匹配是必要条件，用于快速排除不可能命中的组件
//! - 方法级匹配是完整判断，已经包含了类型级条件

use glob::Pattern;
use infrastructure_common::{AopError, AopResult, ComponentType, MethodSignature};
use std::fmt;

/// 匹配对象：组件键与组件类型
#[derive(Debug, Clone, Copy)]
pub struct MatchTarget<'a> {
    /// 组件键
    pub component_key: Option<&'a str>,
    /// 组件类型
    pub component_type: &'a ComponentType,
}

impl<'a> MatchTarget<'a> {
    /// 创建匹配对象
    pub fn new(component_key: Option<&'a str>, component_type: &'a ComponentType) -> Self {
        Self {
            component_key,
            component_type,
        }
    }
}

/// 名称通配模式
#[derive(Clone)]
pub struct NamePattern {
    expression: String,
    pattern: Pattern,
}

impl NamePattern {
    /// 编译通配模式
    pub fn new(expression: &str) -> AopResult<Self> {
        let pattern = Pattern::new(expression).map_err(|error| AopError::InvalidPointcut {
            expression: expression.to_string(),
            message: error.to_string(),
        })?;
        Ok(Self {
            expression: expression.to_string(),
            pattern,
        })
    }

    /// 是否匹配
    pub fn matches(&self, name: &str) -> bool {
        self.pattern.matches(name)
    }

    /// 原始表达式
    pub fn as_str(&self) -> &str {
        &self.expression
    }
}

impl fmt::Debug for NamePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.expression)
    }
}

/// 参数匹配
#[derive(Debug, Clone)]
pub enum ParamsPattern {
    /// 任意参数
    Any,
    /// 参数个数与类型逐一匹配
    Exact(Vec<NamePattern>),
}

/// 方法执行模式，类似 `execution(String *Service.find*(..))`
#[derive(Debug, Clone)]
pub struct MethodPattern {
    type_pattern: NamePattern,
    method_pattern: NamePattern,
    return_pattern: Option<NamePattern>,
    params: ParamsPattern,
}

impl MethodPattern {
    /// 按类型名与方法名通配创建
    pub fn new(type_pattern: &str, method_pattern: &str) -> AopResult<Self> {
        Ok(Self {
            type_pattern: NamePattern::new(type_pattern)?,
            method_pattern: NamePattern::new(method_pattern)?,
            return_pattern: None,
            params: ParamsPattern::Any,
        })
    }

    /// 限定返回值类型
    pub fn returning(mut self, return_pattern: &str) -> AopResult<Self> {
        self.return_pattern = Some(NamePattern::new(return_pattern)?);
        Ok(self)
    }

    /// 限定参数类型
    pub fn with_params(mut self, params: &[&str]) -> AopResult<Self> {
        let patterns = params
            .iter()
            .map(|param| NamePattern::new(param))
            .collect::<AopResult<Vec<_>>>()?;
        self.params = ParamsPattern::Exact(patterns);
        Ok(self)
    }

    fn matches_type(&self, component_type: &ComponentType) -> bool {
        self.type_pattern.matches(component_type.name())
    }

    fn matches_method(&self, component_type: &ComponentType, method: &MethodSignature) -> bool {
        if !self.matches_type(component_type) || !self.method_pattern.matches(&method.name) {
            return false;
        }
        if let Some(return_pattern) = &self.return_pattern {
            if !return_pattern.matches(&method.return_type) {
                return false;
            }
        }
        match &self.params {
            ParamsPattern::Any => true,
            ParamsPattern::Exact(patterns) => {
                patterns.len() == method.parameter_types.len()
                    && patterns
                        .iter()
                        .zip(&method.parameter_types)
                        .all(|(pattern, param)| pattern.matches(param))
            }
        }
    }
}

/// 切点
#[derive(Debug, Clone)]
pub enum Pointcut {
    /// 匹配所有方法
    True,
    /// 方法执行模式
    Execution(MethodPattern),
    /// 方法带有指定注解
    MethodAnnotation(String),
    /// 类型带有指定注解
    TypeAnnotation(String),
    /// 组件键匹配通配模式
    ComponentName(NamePattern),
    /// 两者都匹配
    And(Box<Pointcut>, Box<Pointcut>),
    /// 任意一个匹配
    Or(Box<Pointcut>, Box<Pointcut>),
    /// 取反
    Not(Box<Pointcut>),
}

impl Pointcut {
    /// 方法执行切点
    pub fn execution(type_pattern: &str, method_pattern: &str) -> AopResult<Self> {
        Ok(Self::Execution(MethodPattern::new(type_pattern, method_pattern)?))
    }

    /// 方法注解切点
    pub fn method_annotated(annotation: impl Into<String>) -> Self {
        Self::MethodAnnotation(annotation.into())
    }

    /// 类型注解切点
    pub fn type_annotated(annotation: impl Into<String>) -> Self {
        Self::TypeAnnotation(annotation.into())
    }

    /// 组件键切点
    pub fn component_named(pattern: &str) -> AopResult<Self> {
        Ok(Self::ComponentName(NamePattern::new(pattern)?))
    }

    /// 与
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        Self::And(Box::new(self), Box::new(other))
    }

    /// 或
    #[must_use]
    pub fn or(self, other: Self) -> Self {
        Self::Or(Box::new(self), Box::new(other))
    }

    /// 非
    #[must_use]
    pub fn negate(self) -> Self {
        Self::Not(Box::new(self))
    }

    /// 是否无条件匹配所有方法
    pub fn is_unconditional(&self) -> bool {
        matches!(self, Self::True)
    }

    /// 是否只依赖类型与组件键（与具体方法无关）
    pub fn is_type_level(&self) -> bool {
        match self {
            Self::True | Self::TypeAnnotation(_) | Self::ComponentName(_) => true,
            Self::Execution(_) | Self::MethodAnnotation(_) => false,
            Self::And(left, right) | Self::Or(left, right) => {
                left.is_type_level() && right.is_type_level()
            }
            Self::Not(inner) => inner.is_type_level(),
        }
    }

    /// 类型级匹配，返回 `false` 表示该组件的任何方法都不会命中
    pub fn matches_type(&self, target: &MatchTarget<'_>) -> bool {
        match self {
            Self::True => true,
            Self::Execution(pattern) => pattern.matches_type(target.component_type),
            Self::MethodAnnotation(annotation) => target
                .component_type
                .methods()
                .iter()
                .any(|method| method.has_annotation(annotation)),
            Self::TypeAnnotation(annotation) => target.component_type.has_annotation(annotation),
            Self::ComponentName(pattern) => target
                .component_key
                .is_some_and(|key| pattern.matches(key)),
            Self::And(left, right) => left.matches_type(target) && right.matches_type(target),
            Self::Or(left, right) => left.matches_type(target) || right.matches_type(target),
            Self::Not(inner) => !inner.is_type_level() || !inner.matches_type(target),
        }
    }

    /// 方法级匹配
    pub fn matches_method(&self, target: &MatchTarget<'_>, method: &MethodSignature) -> bool {
        match self {
            Self::True => true,
            Self::Execution(pattern) => pattern.matches_method(target.component_type, method),
            Self::MethodAnnotation(annotation) => method.has_annotation(annotation),
            Self::TypeAnnotation(_) | Self::ComponentName(_) => self.matches_type(target),
            Self::And(left, right) => {
                left.matches_method(target, method) && right.matches_method(target, method)
            }
            Self::Or(left, right) => {
                left.matches_method(target, method) || right.matches_method(target, method)
            }
            Self::Not(inner) => !inner.matches_method(target, method),
        }
    }
}
