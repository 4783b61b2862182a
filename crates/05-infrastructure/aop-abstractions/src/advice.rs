//! 通知定义
//!
//! 通知在连接点（一次被拦截的方法调用）周围执行。环绕通知通过
//! [`ProceedingJoinPoint::proceed`] 决定是否、以及多少次继续调用链。

use infrastructure_common::{AopError, BoxError, MethodSignature};
use std::any::Any;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// 类型擦除的方法返回值
pub type ReturnValue = Box<dyn Any + Send>;

/// 一次调用的结果
pub type InvocationResult = Result<ReturnValue, AopError>;

/// 通知种类
///
/// 声明顺序即同一切面内的优先级：环绕、前置、后置、返回后、异常后。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AdviceKind {
    /// 环绕通知
    Around,
    /// 前置通知
    Before,
    /// 后置通知（无论成功失败都会执行）
    After,
    /// 返回后通知
    AfterReturning,
    /// 异常后通知
    AfterThrowing,
}

impl AdviceKind {
    /// 排序优先级，越小越靠外
    pub fn precedence(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for AdviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Around => "around",
            Self::Before => "before",
            Self::After => "after",
            Self::AfterReturning => "after-returning",
            Self::AfterThrowing => "after-throwing",
        };
        f.write_str(text)
    }
}

/// 连接点
#[derive(Debug, Clone)]
pub struct JoinPoint {
    component_key: Option<String>,
    target_type: String,
    method: MethodSignature,
    args: Vec<String>,
}

impl JoinPoint {
    /// 创建连接点
    pub fn new(
        component_key: Option<String>,
        target_type: impl Into<String>,
        method: MethodSignature,
        args: Vec<String>,
    ) -> Self {
        Self {
            component_key,
            target_type: target_type.into(),
            method,
            args,
        }
    }

    /// 组件键（未经容器创建的代理没有键）
    pub fn component_key(&self) -> Option<&str> {
        self.component_key.as_deref()
    }

    /// 目标类型名称
    pub fn target_type(&self) -> &str {
        &self.target_type
    }

    /// 方法签名
    pub fn method(&self) -> &MethodSignature {
        &self.method
    }

    /// 方法名称
    pub fn method_name(&self) -> &str {
        &self.method.name
    }

    /// 调用参数的调试表示
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// 简短描述，例如 `GreeterImpl.greet`
    pub fn short_description(&self) -> String {
        format!("{}.{}", self.target_type, self.method.name)
    }
}

/// 继续执行调用链的能力
pub trait Proceed {
    /// 调用链中的下一个环节
    fn proceed(&self) -> InvocationResult;
}

/// 可继续执行的连接点，传给环绕通知
pub struct ProceedingJoinPoint<'a> {
    join_point: &'a JoinPoint,
    next: &'a dyn Proceed,
}

impl<'a> ProceedingJoinPoint<'a> {
    /// 创建可继续执行的连接点
    pub fn new(join_point: &'a JoinPoint, next: &'a dyn Proceed) -> Self {
        Self { join_point, next }
    }

    /// 继续执行调用链，可以调用零次或多次
    pub fn proceed(&self) -> InvocationResult {
        self.next.proceed()
    }

    /// 连接点
    pub fn join_point(&self) -> &JoinPoint {
        self.join_point
    }
}

impl Deref for ProceedingJoinPoint<'_> {
    type Target = JoinPoint;

    fn deref(&self) -> &Self::Target {
        self.join_point
    }
}

/// 前置通知体
pub type BeforeFn = Arc<dyn Fn(&JoinPoint) -> Result<(), BoxError> + Send + Sync>;
/// 后置通知体
pub type AfterFn = Arc<dyn Fn(&JoinPoint) -> Result<(), BoxError> + Send + Sync>;
/// 返回后通知体，可以查看返回值
pub type AfterReturningFn =
    Arc<dyn Fn(&JoinPoint, &(dyn Any + Send)) -> Result<(), BoxError> + Send + Sync>;
/// 异常后通知体，返回错误时以该错误替换原始错误
pub type AfterThrowingFn = Arc<dyn Fn(&JoinPoint, &AopError) -> Result<(), BoxError> + Send + Sync>;
/// 环绕通知体
pub type AroundFn = Arc<dyn Fn(&ProceedingJoinPoint<'_>) -> InvocationResult + Send + Sync>;

/// 通知
#[derive(Clone)]
pub enum Advice {
    /// 环绕通知
    Around(AroundFn),
    /// 前置通知
    Before(BeforeFn),
    /// 后置通知
    After(AfterFn),
    /// 返回后通知
    AfterReturning(AfterReturningFn),
    /// 异常后通知
    AfterThrowing(AfterThrowingFn),
}

impl Advice {
    /// 创建环绕通知
    pub fn around<F>(body: F) -> Self
    where
        F: Fn(&ProceedingJoinPoint<'_>) -> InvocationResult + Send + Sync + 'static,
    {
        Self::Around(Arc::new(body))
    }

    /// 创建前置通知
    pub fn before<F>(body: F) -> Self
    where
        F: Fn(&JoinPoint) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        Self::Before(Arc::new(body))
    }

    /// 创建后置通知
    pub fn after<F>(body: F) -> Self
    where
        F: Fn(&JoinPoint) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        Self::After(Arc::new(body))
    }

    /// 创建返回后通知
    pub fn after_returning<F>(body: F) -> Self
    where
        F: Fn(&JoinPoint, &(dyn Any + Send)) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        Self::AfterReturning(Arc::new(body))
    }

    /// 创建异常后通知
    pub fn after_throwing<F>(body: F) -> Self
    where
        F: Fn(&JoinPoint, &AopError) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        Self::AfterThrowing(Arc::new(body))
    }

    /// 通知种类
    pub fn kind(&self) -> AdviceKind {
        match self {
            Self::Around(_) => AdviceKind::Around,
            Self::Before(_) => AdviceKind::Before,
            Self::After(_) => AdviceKind::After,
            Self::AfterReturning(_) => AdviceKind::AfterReturning,
            Self::AfterThrowing(_) => AdviceKind::AfterThrowing,
        }
    }
}

impl fmt::Debug for Advice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Advice::{}", self.kind())
    }
}
