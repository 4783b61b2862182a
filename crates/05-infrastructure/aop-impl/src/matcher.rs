//! 通知匹配器

use aop_abstractions::{sort_advisors, Advisor, MatchTarget};
use dashmap::DashMap;
use infrastructure_common::MethodSignature;
use std::any::TypeId;
use std::sync::Arc;
use tracing::trace;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MatchKey {
    advisor: u64,
    component_type: TypeId,
    component_key: Option<String>,
    method: MethodSignature,
}

/// 通知匹配器
///
/// 方法级匹配结果以（通知器、组件类型、组件键、方法）为键缓存，
/// 同一个问题在并发调用下总是得到同样的答案。
#[derive(Debug, Default)]
pub struct AdviceMatcher {
    cache: DashMap<MatchKey, bool>,
}

impl AdviceMatcher {
    /// 创建匹配器
    pub fn new() -> Self {
        Self::default()
    }

    /// 筛选可作用于组件的通知器，并按优先级排序
    pub fn find_eligible(
        &self,
        advisors: &[Arc<Advisor>],
        target: &MatchTarget<'_>,
    ) -> Vec<Arc<Advisor>> {
        let mut eligible: Vec<Arc<Advisor>> = advisors
            .iter()
            .filter(|advisor| self.can_apply(advisor, target))
            .cloned()
            .collect();
        sort_advisors(&mut eligible);
        eligible
    }

    /// 通知器能否作用于组件的至少一个方法
    pub fn can_apply(&self, advisor: &Advisor, target: &MatchTarget<'_>) -> bool {
        let pointcut = advisor.pointcut();
        if !pointcut.matches_type(target) {
            return false;
        }
        if pointcut.is_unconditional() {
            return true;
        }
        target
            .component_type
            .methods()
            .iter()
            .any(|method| self.matches_method(advisor, target, method))
    }

    /// 通知器是否作用于指定方法
    pub fn matches_method(
        &self,
        advisor: &Advisor,
        target: &MatchTarget<'_>,
        method: &MethodSignature,
    ) -> bool {
        let key = MatchKey {
            advisor: advisor.id(),
            component_type: target.component_type.info().id,
            component_key: target.component_key.map(ToString::to_string),
            method: method.clone(),
        };
        if let Some(hit) = self.cache.get(&key) {
            return *hit;
        }
        let matched = advisor.pointcut().matches_method(target, method);
        trace!(
            "切点匹配: {} -> {}.{} = {}",
            advisor.qualified_name(),
            target.component_type.name(),
            method.name,
            matched
        );
        *self.cache.entry(key).or_insert(matched)
    }

    /// 缓存条目数量
    pub fn cache_size(&self) -> usize {
        self.cache.len()
    }
}
