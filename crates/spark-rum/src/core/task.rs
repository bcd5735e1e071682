//! # 任务描述符与生命周期状态
//!
//! ## 核心意图（Why）
//! - 每次 `send` 产生一个任务描述符，记录该次请求的生命周期状态与元数据，并作为观察者回调的载体；
//! - 状态只允许前进：`Unset → Scheduled → {Invoked | Cleared}`，两个终态互斥，
//!   从而保证“每个状态值至多通知一次”。
//!
//! ## 状态机约束（What）
//! - 合法跃迁仅有三条：`Unset → Scheduled`、`Scheduled → Invoked`、`Scheduled → Cleared`；
//! - [`Task::advance`] 对其它一切请求返回 [`StateAdvance::Noop`]，调用方据此决定是否通知观察者；
//! - `aborted` 只会由取消路径置位一次，且不晚于 `Cleared` 通知。
//!
//! ## 风险提示（Trade-offs）
//! - 状态以 `parking_lot::Mutex` 保护，跃迁判定与写入在同一临界区完成；观察者回调发生在锁外，
//!   回调内读取 [`Task::state`] 不会死锁。

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde::Serialize;

use super::ids::{RequestId, TaskId};

/// 任务来源标签，对应宿主的 `XMLHttpRequest`。
pub const XHR_TASK_SOURCE: &str = "xmlhttprequest";

/// 任务种类。请求完成总是经由宿主宏任务送达，因此只有一种取值。
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum TaskKind {
    #[serde(rename = "macroTask")]
    MacroTask,
}

/// 报告给观察者的生命周期阶段。
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// 请求已提交。
    Schedule,
    /// 请求已完成（异步完成或同步返回）。
    Invoke,
    /// 请求在完成前被取消。
    Clear,
}

impl Phase {
    pub const fn as_str(self) -> &'static str {
        match self {
            Phase::Schedule => "schedule",
            Phase::Invoke => "invoke",
            Phase::Clear => "clear",
        }
    }

    /// 该阶段对应的任务状态。
    pub const fn state(self) -> TaskState {
        match self {
            Phase::Schedule => TaskState::Scheduled,
            Phase::Invoke => TaskState::Invoked,
            Phase::Clear => TaskState::Cleared,
        }
    }
}

/// 任务状态。
///
/// # 教案式说明
/// - **意图 (Why)**：与 [`Phase`] 一一对应，另加尚未调度的 `Unset`；
/// - **契约 (What)**：序列化值为 `""`、`"schedule"`、`"invoke"`、`"clear"`，与观察者协议保持一致；
///   跃迁受 [`TaskState::can_transition_to`] 约束。
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, Serialize)]
pub enum TaskState {
    #[default]
    #[serde(rename = "")]
    Unset,
    #[serde(rename = "schedule")]
    Scheduled,
    #[serde(rename = "invoke")]
    Invoked,
    #[serde(rename = "clear")]
    Cleared,
}

impl TaskState {
    pub const fn as_str(self) -> &'static str {
        match self {
            TaskState::Unset => "",
            TaskState::Scheduled => "schedule",
            TaskState::Invoked => "invoke",
            TaskState::Cleared => "clear",
        }
    }

    /// 判断能否跃迁至 `target`。自环一律视为不可跃迁，以免重复通知。
    pub fn can_transition_to(self, target: TaskState) -> bool {
        matches!(
            (self, target),
            (TaskState::Unset, TaskState::Scheduled)
                | (TaskState::Scheduled, TaskState::Invoked)
                | (TaskState::Scheduled, TaskState::Cleared)
        )
    }
}

/// 状态推进结果。
///
/// # 设计目标（Why）
/// - 让调用方明确区分“发生跃迁”与“重复/非法信号”，只有前者才通知观察者；
/// - `Noop` 携带当前状态，便于在 `trace` 日志中解释为何忽略。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StateAdvance {
    /// 状态未变化。
    Noop { state: TaskState },
    /// 状态发生跃迁。
    Transition { from: TaskState, to: TaskState },
}

impl StateAdvance {
    pub fn is_transition(&self) -> bool {
        matches!(self, StateAdvance::Transition { .. })
    }
}

/// 任务元数据。`target` 仅为回指请求对象的标识，不持有请求对象。
#[derive(Debug)]
pub struct TaskData {
    target: RequestId,
    method: Option<String>,
    url: Option<String>,
    sync: bool,
    aborted: AtomicBool,
}

impl TaskData {
    pub fn target(&self) -> RequestId {
        self.target
    }

    pub fn method(&self) -> Option<&str> {
        self.method.as_deref()
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn is_sync(&self) -> bool {
        self.sync
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    /// 置位取消标记。返回 `true` 表示本次调用首次置位。
    pub(crate) fn mark_aborted(&self) -> bool {
        self.aborted
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// 单次请求提交的任务描述符。
///
/// # 教案式说明
/// - **意图 (Why)**：观察者拿到的唯一载体，状态在每次回调前原地更新；
/// - **契约 (What)**：
///   - 由提交装饰器创建，经 `Arc` 在监听器、延迟检查与登记表之间共享；
///   - `dispatched` 为任务级派发标记，仅在 [`DispatchScope::PerTask`](crate::config::DispatchScope)
///     下参与判定；
/// - **风险 (Trade-offs)**：观察者若长期持有 `Arc<Task>` 不会延长请求对象的生命周期，但会延长描述符本身。
#[derive(Debug)]
pub struct Task {
    id: TaskId,
    source: &'static str,
    kind: TaskKind,
    state: Mutex<TaskState>,
    data: TaskData,
    dispatched: AtomicBool,
}

impl Task {
    pub(crate) fn new(
        target: RequestId,
        method: Option<String>,
        url: Option<String>,
        sync: bool,
    ) -> Self {
        Self {
            id: TaskId::next(),
            source: XHR_TASK_SOURCE,
            kind: TaskKind::MacroTask,
            state: Mutex::new(TaskState::Unset),
            data: TaskData {
                target,
                method,
                url,
                sync,
                aborted: AtomicBool::new(false),
            },
            dispatched: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn source(&self) -> &'static str {
        self.source
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    pub fn state(&self) -> TaskState {
        *self.state.lock()
    }

    pub fn data(&self) -> &TaskData {
        &self.data
    }

    /// 尝试推进到 `next`，判定与写入在同一临界区内完成。
    pub(crate) fn advance(&self, next: TaskState) -> StateAdvance {
        let mut state = self.state.lock();
        let from = *state;
        if !from.can_transition_to(next) {
            return StateAdvance::Noop { state: from };
        }
        *state = next;
        StateAdvance::Transition { from, to: next }
    }

    pub(crate) fn set_dispatched(&self, dispatched: bool) {
        self.dispatched.store(dispatched, Ordering::Release);
    }

    pub(crate) fn is_dispatched(&self) -> bool {
        self.dispatched.load(Ordering::Acquire)
    }

    /// 生成可序列化快照，形状为 `{ source, state, type, data: { target, method, sync, url, aborted } }`。
    pub fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            source: self.source,
            state: self.state(),
            kind: self.kind,
            data: TaskDataSnapshot {
                target: self.data.target,
                method: self.data.method.clone(),
                sync: self.data.sync,
                url: self.data.url.clone(),
                aborted: self.data.is_aborted(),
            },
        }
    }
}

/// [`Task`] 的值快照，供观察者转发到指标管线。
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct TaskSnapshot {
    pub source: &'static str,
    pub state: TaskState,
    #[serde(rename = "type")]
    pub kind: TaskKind,
    pub data: TaskDataSnapshot,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct TaskDataSnapshot {
    pub target: RequestId,
    pub method: Option<String>,
    pub sync: bool,
    pub url: Option<String>,
    pub aborted: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task() -> Task {
        Task::new(
            RequestId::next(),
            Some("GET".to_owned()),
            Some("/x".to_owned()),
            false,
        )
    }

    #[test]
    fn only_forward_transitions_are_accepted() {
        let all = [
            TaskState::Unset,
            TaskState::Scheduled,
            TaskState::Invoked,
            TaskState::Cleared,
        ];
        let allowed = [
            (TaskState::Unset, TaskState::Scheduled),
            (TaskState::Scheduled, TaskState::Invoked),
            (TaskState::Scheduled, TaskState::Cleared),
        ];
        for from in all {
            for to in all {
                assert_eq!(
                    from.can_transition_to(to),
                    allowed.contains(&(from, to)),
                    "{from:?} -> {to:?}"
                );
            }
        }
    }

    #[test]
    fn terminal_states_refuse_each_other() {
        let invoked = task();
        assert!(invoked.advance(TaskState::Scheduled).is_transition());
        assert!(invoked.advance(TaskState::Invoked).is_transition());
        assert_eq!(
            invoked.advance(TaskState::Cleared),
            StateAdvance::Noop {
                state: TaskState::Invoked
            }
        );

        let cleared = task();
        cleared.advance(TaskState::Scheduled);
        assert!(cleared.advance(TaskState::Cleared).is_transition());
        assert!(!cleared.advance(TaskState::Invoked).is_transition());
        assert_eq!(cleared.state(), TaskState::Cleared);
    }

    #[test]
    fn aborted_flag_is_set_at_most_once() {
        let task = task();
        assert!(!task.data().is_aborted());
        assert!(task.data().mark_aborted());
        assert!(!task.data().mark_aborted());
        assert!(task.data().is_aborted());
    }

    #[test]
    fn phases_map_onto_states() {
        assert_eq!(Phase::Schedule.state(), TaskState::Scheduled);
        assert_eq!(Phase::Invoke.state(), TaskState::Invoked);
        assert_eq!(Phase::Clear.state(), TaskState::Cleared);
        assert_eq!(Phase::Invoke.as_str(), TaskState::Invoked.as_str());
    }
}
