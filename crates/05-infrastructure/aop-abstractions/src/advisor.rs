//! 通知器定义
//!
//! 通知器 = 切点 + 通知 + 排序信息。同一个连接点上的多个通知器按以下顺序排列：
//!
//! 1. 通知种类（环绕、前置、后置、返回后、异常后）
//! 2. 显式排序值，未设置时排在最后
//! 3. 声明顺序
//! 4. 通知名称

use crate::advice::{Advice, AdviceKind};
use crate::pointcut::Pointcut;
use std::cmp::Ordering;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

static NEXT_ADVISOR_ID: AtomicU64 = AtomicU64::new(1);

/// 通知器
#[derive(Clone)]
pub struct Advisor {
    id: u64,
    aspect: String,
    name: String,
    pointcut: Pointcut,
    advice: Advice,
    order: Option<i32>,
    declaration_order: usize,
}

impl Advisor {
    /// 创建通知器
    pub fn new(
        aspect: impl Into<String>,
        name: impl Into<String>,
        pointcut: Pointcut,
        advice: Advice,
    ) -> Self {
        Self {
            id: NEXT_ADVISOR_ID.fetch_add(1, AtomicOrdering::Relaxed),
            aspect: aspect.into(),
            name: name.into(),
            pointcut,
            advice,
            order: None,
            declaration_order: 0,
        }
    }

    /// 设置显式排序值
    #[must_use]
    pub fn with_order(mut self, order: i32) -> Self {
        self.order = Some(order);
        self
    }

    /// 设置声明顺序
    #[must_use]
    pub fn with_declaration_order(mut self, declaration_order: usize) -> Self {
        self.declaration_order = declaration_order;
        self
    }

    /// 唯一标识，用于匹配缓存
    pub fn id(&self) -> u64 {
        self.id
    }

    /// 所属切面
    pub fn aspect(&self) -> &str {
        &self.aspect
    }

    /// 通知名称
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 带切面前缀的名称，例如 `audit.logCall`
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.aspect, self.name)
    }

    /// 切点
    pub fn pointcut(&self) -> &Pointcut {
        &self.pointcut
    }

    /// 通知
    pub fn advice(&self) -> &Advice {
        &self.advice
    }

    /// 通知种类
    pub fn kind(&self) -> AdviceKind {
        self.advice.kind()
    }

    /// 显式排序值
    pub fn order(&self) -> Option<i32> {
        self.order
    }

    /// 声明顺序
    pub fn declaration_order(&self) -> usize {
        self.declaration_order
    }

    /// 按优先级比较两个通知器
    ///
    /// 依次比较通知种类、显式排序值、所属切面、声明顺序与名称。声明顺序只在切面内有意义，
    /// 因此同一切面的通知不会与其他切面的通知交错。
    pub fn precedence_cmp(&self, other: &Self) -> Ordering {
        self.kind()
            .precedence()
            .cmp(&other.kind().precedence())
            .then_with(|| {
                self.order
                    .unwrap_or(i32::MAX)
                    .cmp(&other.order.unwrap_or(i32::MAX))
            })
            .then_with(|| self.aspect.cmp(&other.aspect))
            .then_with(|| self.declaration_order.cmp(&other.declaration_order))
            .then_with(|| self.name.cmp(&other.name))
    }
}

impl fmt::Debug for Advisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Advisor")
            .field("id", &self.id)
            .field("name", &self.qualified_name())
            .field("kind", &self.kind())
            .field("order", &self.order)
            .field("declaration_order", &self.declaration_order)
            .field("pointcut", &self.pointcut)
            .finish()
    }
}

/// 按优先级排序通知器
pub fn sort_advisors(advisors: &mut [Arc<Advisor>]) {
    advisors.sort_by(|a, b| a.precedence_cmp(b));
}

/// 通知器来源
pub trait AdvisorCatalog: Send + Sync {
    /// 所有候选通知器
    fn advisors(&self) -> Vec<Arc<Advisor>>;

    /// 按名称查找通知器，名称可以是 `name` 或 `aspect.name`
    fn advisor_named(&self, name: &str) -> Option<Arc<Advisor>> {
        self.advisors()
            .into_iter()
            .find(|advisor| advisor.name() == name || advisor.qualified_name() == name)
    }
}
