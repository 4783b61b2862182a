//! 自动代理配置

use serde::{Deserialize, Serialize};

/// 自动代理配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// 代理创建后是否冻结，冻结后不能再追加通知器
    pub frozen: bool,
    /// 不参与自动代理的组件键（通配模式）
    pub skip_components: Vec<String>,
    /// 是否排除基础设施角色的组件
    pub exclude_infrastructure: bool,
    /// 对所有被代理组件生效的公共通知器名称
    pub common_advisors: Vec<String>,
    /// 公共通知器是否排在组件专属通知器之前
    pub apply_common_advisors_first: bool,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            frozen: false,
            skip_components: Vec::new(),
            exclude_infrastructure: true,
            common_advisors: Vec::new(),
            apply_common_advisors_first: true,
        }
    }
}
