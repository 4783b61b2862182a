//! 拦截器链
//!
//! 链在构建时就已排好序并冻结，执行期间不可修改。执行采用递归下标：
//! 每个通知拿到一个指向下一环节的游标，最后一环是目标方法本身。

use crate::matcher::AdviceMatcher;
use aop_abstractions::{
    Advice, Advisor, InvocationResult, JoinPoint, MatchTarget, Proceed, ProceedingJoinPoint,
};
use infrastructure_common::{AopError, AopResult, MethodSignature};
use std::sync::Arc;
use tracing::debug;

/// 拦截器链
#[derive(Debug, Clone, Default)]
pub struct InterceptorChain {
    advisors: Vec<Arc<Advisor>>,
    frozen: bool,
}

impl InterceptorChain {
    /// 创建空的、可追加的链
    pub fn new() -> Self {
        Self::default()
    }

    /// 空的、已冻结的链
    pub fn empty() -> Self {
        Self {
            advisors: Vec::new(),
            frozen: true,
        }
    }

    /// 追加通知器
    pub fn push(&mut self, advisor: Arc<Advisor>) -> AopResult<()> {
        if self.frozen {
            return Err(AopError::ChainFrozen {
                advisor: advisor.qualified_name(),
            });
        }
        self.advisors.push(advisor);
        Ok(())
    }

    /// 冻结
    #[must_use]
    pub fn freeze(mut self) -> Self {
        self.frozen = true;
        self
    }

    /// 是否已冻结
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.advisors.is_empty()
    }

    /// 通知器数量
    pub fn len(&self) -> usize {
        self.advisors.len()
    }

    /// 链上的通知器
    pub fn advisors(&self) -> &[Arc<Advisor>] {
        &self.advisors
    }

    /// 执行链，最终调用 `target`
    pub fn invoke(
        &self,
        join_point: &JoinPoint,
        target: &dyn Fn() -> InvocationResult,
    ) -> InvocationResult {
        self.proceed_at(0, join_point, target)
    }

    fn proceed_at(
        &self,
        index: usize,
        join_point: &JoinPoint,
        target: &dyn Fn() -> InvocationResult,
    ) -> InvocationResult {
        let Some(advisor) = self.advisors.get(index) else {
            return target();
        };
        let next = Cursor {
            chain: self,
            index: index + 1,
            join_point,
            target,
        };

        match advisor.advice() {
            Advice::Around(body) => body(&ProceedingJoinPoint::new(join_point, &next)),
            Advice::Before(body) => {
                body(join_point).map_err(|error| AopError::advice(advisor.qualified_name(), error))?;
                next.proceed()
            }
            Advice::After(body) => {
                let outcome = next.proceed();
                match body(join_point) {
                    Ok(()) => outcome,
                    Err(error) => {
                        if let Err(original) = &outcome {
                            debug!(
                                "后置通知失败, 原始错误被替换: {}, 原始错误: {}",
                                advisor.qualified_name(),
                                original
                            );
                        }
                        Err(AopError::advice(advisor.qualified_name(), error))
                    }
                }
            }
            Advice::AfterReturning(body) => {
                let value = next.proceed()?;
                body(join_point, value.as_ref())
                    .map_err(|error| AopError::advice(advisor.qualified_name(), error))?;
                Ok(value)
            }
            Advice::AfterThrowing(body) => match next.proceed() {
                Ok(value) => Ok(value),
                Err(original) => match body(join_point, &original) {
                    Ok(()) => Err(original),
                    Err(replacement) => {
                        Err(AopError::advice(advisor.qualified_name(), replacement))
                    }
                },
            },
        }
    }
}

struct Cursor<'a> {
    chain: &'a InterceptorChain,
    index: usize,
    join_point: &'a JoinPoint,
    target: &'a dyn Fn() -> InvocationResult,
}

impl Proceed for Cursor<'_> {
    fn proceed(&self) -> InvocationResult {
        self.chain.proceed_at(self.index, self.join_point, self.target)
    }
}

/// 为单个方法构建冻结的拦截器链
///
/// `ordered` 已按优先级排序，这里只保留作用于该方法的通知器，顺序不变。
pub fn build_chain(
    matcher: &AdviceMatcher,
    ordered: &[Arc<Advisor>],
    target: &MatchTarget<'_>,
    method: &MethodSignature,
) -> InterceptorChain {
    let advisors = ordered
        .iter()
        .filter(|advisor| matcher.matches_method(advisor, target, method))
        .cloned()
        .collect();
    InterceptorChain {
        advisors,
        frozen: true,
    }
}
