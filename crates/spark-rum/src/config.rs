//! 埋点安装配置。
//!
//! # 教案式说明
//! - **意图（Why）**：把两处语义取舍外部化：派发标记的作用域、观察者失败时的处理策略；
//! - **逻辑（How）**：[`InstrumentationConfig`] 通过 `serde` 反序列化，缺省字段回落到默认值，
//!   未知字段直接拒绝，避免拼写错误被静默忽略；
//! - **契约（What）**：默认值为 `dispatch_scope = "per_task"`、`observer_failure = "propagate"`。
//!
//! ```toml
//! dispatch_scope = "global"
//! observer_failure = "isolate"
//! ```

use serde::Deserialize;

use crate::error::Result;

/// “刚刚派发”标记的作用域。
///
/// # 教案式说明
/// - **意图 (Why)**：去重启发式需要知道“原生 `send` 是否已经返回”。历史实现使用进程级共享布尔值，
///   多个请求交错提交时只反映最近一次提交，较早请求的完成判定可能失效；
/// - **契约 (What)**：
///   - `Global`：同一次安装内所有请求共享一个标记，与历史行为逐位一致（包括上述缺陷）；
///   - `PerTask`：每个任务描述符持有自己的标记，互不干扰；
/// - **风险 (Trade-offs)**：只有在需要与旧数据逐条比对时才应选择 `Global`。
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum DispatchScope {
    Global,
    #[default]
    PerTask,
}

/// 观察者回调 panic 时的处理策略。
///
/// # 教案式说明
/// - **意图 (Why)**：观察者在宿主请求路径上同步执行，其失败会打断调用方原本的请求流程；
/// - **契约 (What)**：
///   - `Propagate`：不设边界，panic 沿调用栈展开到调用 `open`/`send`/`abort` 的代码；
///   - `Isolate`：以 `catch_unwind` 截获 panic，记录 `error` 级日志后继续执行请求流程；
/// - **风险 (Trade-offs)**：`Isolate` 会吞掉观察者内部的不变量破坏，观察者自身状态可能不一致。
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ObserverFailurePolicy {
    #[default]
    Propagate,
    Isolate,
}

/// 埋点安装配置。
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct InstrumentationConfig {
    pub dispatch_scope: DispatchScope,
    pub observer_failure: ObserverFailurePolicy,
}

impl InstrumentationConfig {
    /// 从 TOML 文本解析配置。
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn with_dispatch_scope(mut self, scope: DispatchScope) -> Self {
        self.dispatch_scope = scope;
        self
    }

    pub fn with_observer_failure(mut self, policy: ObserverFailurePolicy) -> Self {
        self.observer_failure = policy;
        self
    }
}
