//! 组件生命周期定义

use serde::{Deserialize, Serialize};
use std::fmt;

/// 组件生命周期类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifetime {
    /// 单例模式 - 容器内只创建一个实例
    #[default]
    Singleton,
    /// 瞬时模式 - 每次请求都创建新实例
    Transient,
}

/// 注册表中组件的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentState {
    /// 从未注册或已被移除
    Absent,
    /// 正在创建，尚未暴露早期引用
    InCreation,
    /// 正在创建，早期引用已被他人取走
    EarlyExposed,
    /// 创建完成
    Created,
    /// 已销毁
    Destroyed,
}

impl fmt::Display for ComponentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Absent => "absent",
            Self::InCreation => "in-creation",
            Self::EarlyExposed => "early-exposed",
            Self::Created => "created",
            Self::Destroyed => "destroyed",
        };
        f.write_str(text)
    }
}
