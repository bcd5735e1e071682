//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 集中定义埋点层自身的错误：安装期能力缺失、配置文本非法；
//! - 宿主原生方法的错误（`XmlHttpRequest::Error`）不在此列，装饰器会原样透传，避免改写调用方既有的错误处理。
//!
//! ## 设计要求（What）
//! - 所有变体派生 `thiserror::Error`，可直接交给 `anyhow`/`eyre` 等上层框架；
//! - 生命周期状态机的拒绝跃迁属于正确性护栏，以 [`StateAdvance::Noop`](crate::core::StateAdvance)
//!   表达，不会产生错误值。

use thiserror::Error;

/// 埋点层统一结果类型。
pub type Result<T, E = RumError> = core::result::Result<T, E>;

/// 埋点层错误域。
///
/// # 教案式说明
/// - **意图 (Why)**：安装与配置是仅有的两个可失败入口，请求路径上不产生新的错误；
/// - **契约 (What)**：变体均为 `Send + Sync + 'static`；
/// - **风险 (Trade-offs)**：`InvalidConfig` 直接携带 `toml` 的错误，便于定位行列，但也把 `toml` 暴露为公共依赖。
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RumError {
    /// 请求类型既没有自身的监听原语，也没有事件目标原型的回退原语。
    #[error("request type `{request_type}` exposes no add/remove listener capability")]
    ListenerCapabilityUnavailable { request_type: &'static str },

    /// 配置文本无法解析或包含未知字段。
    #[error("invalid instrumentation configuration: {0}")]
    InvalidConfig(#[from] toml::de::Error),
}
