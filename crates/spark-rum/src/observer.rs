//! 生命周期观察者契约。
//!
//! # 教案式说明
//! - **意图（Why）**：埋点只负责“在正确的时刻恰好通知一次”，记录、聚合与上报交给观察者；
//! - **逻辑（How）**：[`TaskObserver`] 对闭包提供 blanket 实现；内部的 [`ObserverSlot`] 按
//!   [`ObserverFailurePolicy`] 决定回调 panic 时是继续展开还是截获并记录；
//! - **契约（What）**：回调在 `open`/`send`/`abort`/监听器内部同步执行，不得阻塞；
//!   回调执行时任务状态已更新为该阶段对应的状态。

use std::{
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

use crate::{
    config::ObserverFailurePolicy,
    core::{Phase, Task},
};

const LOG_TARGET: &str = "spark_rum::observer";

/// 生命周期观察者。
pub trait TaskObserver: Send + Sync {
    fn on_task(&self, phase: Phase, task: &Task);
}

impl<F> TaskObserver for F
where
    F: Fn(Phase, &Task) + Send + Sync,
{
    fn on_task(&self, phase: Phase, task: &Task) {
        self(phase, task)
    }
}

/// 把每次生命周期通知输出为结构化 `tracing` 事件的观察者。
///
/// 适合在没有指标管线的环境下直接观察埋点行为；事件级别为 `info`，目标为 `spark_rum::observer`。
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingObserver;

impl TaskObserver for TracingObserver {
    fn on_task(&self, phase: Phase, task: &Task) {
        let data = task.data();
        tracing::info!(
            target: LOG_TARGET,
            phase = phase.as_str(),
            task = %task.id(),
            source = task.source(),
            kind = ?task.kind(),
            request = %data.target(),
            method = data.method().unwrap_or_default(),
            url = data.url().unwrap_or_default(),
            sync = data.is_sync(),
            aborted = data.is_aborted(),
            "xhr task lifecycle"
        );
    }
}

/// 安装期固定下来的观察者及其失败策略。
#[derive(Clone)]
pub(crate) struct ObserverSlot {
    observer: Arc<dyn TaskObserver>,
    policy: ObserverFailurePolicy,
}

impl ObserverSlot {
    pub(crate) fn new(observer: Arc<dyn TaskObserver>, policy: ObserverFailurePolicy) -> Self {
        Self { observer, policy }
    }

    pub(crate) fn notify(&self, phase: Phase, task: &Task) {
        match self.policy {
            ObserverFailurePolicy::Propagate => self.observer.on_task(phase, task),
            ObserverFailurePolicy::Isolate => {
                let outcome =
                    panic::catch_unwind(AssertUnwindSafe(|| self.observer.on_task(phase, task)));
                if let Err(payload) = outcome {
                    tracing::error!(
                        target: LOG_TARGET,
                        phase = phase.as_str(),
                        task = %task.id(),
                        request = %task.data().target(),
                        reason = panic_reason(payload.as_ref()),
                        "xhr task observer panicked; request flow continues"
                    );
                }
            }
        }
    }
}

impl fmt::Debug for ObserverSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverSlot")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

fn panic_reason(payload: &(dyn std::any::Any + Send)) -> &str {
    payload
        .downcast_ref::<&'static str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
