//! # 生命周期状态机与完成信号去重
//!
//! ## 核心意图（Why）
//! - 宿主的完成信号并不干净：部分宿主在 `readyState == DONE` 时多次派发 `readystatechange`；
//!   部分框架在请求完成的同一轮里立即调用 `abort`，抹掉完成信号；同步请求则在 `send` 内部就派发完全部事件；
//! - 本模块决定“请求何时真正完成”，并保证每个状态只向观察者报告一次。
//!
//! ## 执行逻辑（How）
//! 1. [`Lifecycle::schedule_task`]：重置派发标记 → `Scheduled` 并通知 → 以新监听器替换登记并摘除旧监听器 →
//!    挂载新监听器 → 首次提交时登记任务；
//! 2. 监听器持有私有的 `earlier_event`：
//!    - 尚未记录时，仅当请求已 `DONE`、任务未取消、派发标记已置位且任务仍为 `Scheduled`，
//!      记录本次事件类型；
//!    - 已记录且本次事件类型不同，则调度一次延迟检查，检查时任务尚未 `Invoked` 才推进；
//! 3. [`Lifecycle::invoke_task`] / [`Lifecycle::clear_task`]：推进到终态并通知。
//!
//! ## 契约说明（What）
//! - 终态互斥由 [`Task::advance`] 保证：取消之后迟到的完成事件不会产生 `Invoke`；
//! - 观察者、原生方法与监听器调用期间不持有任何锁或登记表 guard。
//!
//! ## 风险提示（Trade-offs）
//! - 只有 `readystatechange` 与 `load` 参与判定：网络错误时宿主派发 `error` 而非 `load`，
//!   此类请求停留在 `Scheduled`；
//! - [`DispatchScope::Global`] 下多个请求共享派发标记，交错提交可能使较早请求的完成判定失效。

use std::sync::{
    Arc, Weak,
    atomic::{AtomicBool, Ordering},
};

use parking_lot::Mutex;

use super::{
    ids::RequestId,
    registry::TaskRegistry,
    task::{Phase, StateAdvance, Task, TaskState},
};
use crate::{
    config::{DispatchScope, InstrumentationConfig},
    observer::ObserverSlot,
    platform::{
        Event, EventType, Listener, ListenerCapability, ReadyState, XmlHttpRequest,
        scheduler::MacroTaskScheduler,
    },
};

const LOG_TARGET: &str = "spark_rum::lifecycle";

/// “刚刚派发”标记，按配置选择进程级共享或任务级独立。
#[derive(Debug)]
struct DispatchTracker {
    scope: DispatchScope,
    global: AtomicBool,
}

impl DispatchTracker {
    fn new(scope: DispatchScope) -> Self {
        Self {
            scope,
            global: AtomicBool::new(false),
        }
    }

    fn reset(&self, task: &Task) {
        match self.scope {
            DispatchScope::Global => self.global.store(false, Ordering::Release),
            DispatchScope::PerTask => task.set_dispatched(false),
        }
    }

    fn mark(&self, task: &Task) {
        match self.scope {
            DispatchScope::Global => self.global.store(true, Ordering::Release),
            DispatchScope::PerTask => task.set_dispatched(true),
        }
    }

    fn is_dispatched(&self, task: &Task) -> bool {
        match self.scope {
            DispatchScope::Global => self.global.load(Ordering::Acquire),
            DispatchScope::PerTask => task.is_dispatched(),
        }
    }
}

/// 一次埋点安装的共享状态：缓存的监听原语、簿记表、观察者、延迟调度器与派发标记。
///
/// # 教案式说明
/// - **意图 (Why)**：装饰器、监听器闭包与延迟检查都需要访问同一份安装期状态，统一以 `Arc` 共享；
/// - **契约 (What)**：`capability` 在安装时解析一次，之后所有请求复用；
/// - **风险 (Trade-offs)**：监听器闭包持有 `Arc<Lifecycle>`，而登记表持有监听器，二者在装饰器释放槽位时断开。
pub(crate) struct Lifecycle<R: XmlHttpRequest> {
    capability: ListenerCapability<R>,
    registry: TaskRegistry,
    observer: ObserverSlot,
    scheduler: Arc<dyn MacroTaskScheduler>,
    dispatch: DispatchTracker,
}

impl<R: XmlHttpRequest> Lifecycle<R> {
    pub(crate) fn new(
        capability: ListenerCapability<R>,
        observer: ObserverSlot,
        scheduler: Arc<dyn MacroTaskScheduler>,
        config: &InstrumentationConfig,
    ) -> Self {
        Self {
            capability,
            registry: TaskRegistry::new(),
            observer,
            scheduler,
            dispatch: DispatchTracker::new(config.dispatch_scope),
        }
    }

    pub(crate) fn capability(&self) -> &ListenerCapability<R> {
        &self.capability
    }

    pub(crate) fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// 调度步骤：进入 `Scheduled`、通知观察者、替换监听器、首次提交时登记任务。
    pub(crate) fn schedule_task(
        self: &Arc<Self>,
        id: RequestId,
        target: &Arc<R>,
        task: &Arc<Task>,
    ) {
        self.dispatch.reset(task);
        self.advance_and_notify(task, Phase::Schedule);

        let listener = self.completion_listener(Arc::downgrade(target), Arc::clone(task));
        if let Some(previous) = self.registry.replace_listener(id, listener.clone()) {
            self.detach(target, &previous);
        }
        for event in EventType::COMPLETION_EVENTS {
            self.capability.add(target, event, &listener);
        }

        if !self.registry.store_task_if_vacant(id, task) {
            tracing::trace!(
                target: LOG_TARGET,
                request = %id,
                task = %task.id(),
                "request already stores an earlier task; keeping it"
            );
        }
    }

    /// 原生 `send` 返回后置位派发标记。
    pub(crate) fn mark_dispatched(&self, task: &Task) {
        self.dispatch.mark(task);
    }

    /// 完成步骤。
    pub(crate) fn invoke_task(&self, task: &Task) {
        self.advance_and_notify(task, Phase::Invoke);
    }

    /// 取消步骤：仍处于 `Scheduled` 时推进到 `Cleared` 并通知，随后置位取消标记。
    ///
    /// 此处不摘除监听器：已在派发途中的事件无法被撤回，迟到事件由取消标记与状态护栏过滤。
    pub(crate) fn clear_task(&self, task: &Task) {
        self.advance_and_notify(task, Phase::Clear);
        task.data().mark_aborted();
    }

    /// 从请求对象上摘除监听器的两个订阅。
    pub(crate) fn detach(&self, target: &R, listener: &Listener) {
        for event in EventType::COMPLETION_EVENTS {
            self.capability.remove(target, event, listener);
        }
    }

    fn advance_and_notify(&self, task: &Task, phase: Phase) {
        match task.advance(phase.state()) {
            StateAdvance::Transition { from, to } => {
                tracing::debug!(
                    target: LOG_TARGET,
                    request = %task.data().target(),
                    task = %task.id(),
                    from = from.as_str(),
                    to = to.as_str(),
                    "xhr task advanced"
                );
                self.observer.notify(phase, task);
            }
            StateAdvance::Noop { state } => {
                tracing::trace!(
                    target: LOG_TARGET,
                    request = %task.data().target(),
                    task = %task.id(),
                    state = state.as_str(),
                    requested = phase.state().as_str(),
                    "xhr task transition refused"
                );
            }
        }
    }

    /// 构造带去重启发式的完成监听器。
    ///
    /// # 教案式说明
    /// - **意图 (Why)**：单个 `DONE` 信号不足以确认完成（可能重复派发，也可能随后被框架立即取消），
    ///   因此先记录第一个合格事件的类型，等到另一种类型的事件到达后，再在下一轮宏任务中确认；
    /// - **契约 (What)**：监听器只弱引用请求对象，请求对象释放后监听器不再记录任何事件；
    /// - **风险 (Trade-offs)**：同一逻辑完成可能调度多次延迟检查，检查内的状态判定与状态机护栏保证至多一次 `Invoke`。
    fn completion_listener(self: &Arc<Self>, target: Weak<R>, task: Arc<Task>) -> Listener {
        let lifecycle = Arc::clone(self);
        let earlier_event: Mutex<Option<EventType>> = Mutex::new(None);

        Listener::new(move |event: &Event| {
            let mut earlier = earlier_event.lock();
            let recorded = *earlier;
            match recorded {
                Some(previous) => {
                    drop(earlier);
                    if previous != event.kind() {
                        lifecycle.defer_finish(&task, event.kind());
                    }
                }
                None => {
                    let done = target
                        .upgrade()
                        .is_some_and(|request| request.ready_state() == ReadyState::Done);
                    if done
                        && !task.data().is_aborted()
                        && lifecycle.dispatch.is_dispatched(&task)
                        && task.state() == TaskState::Scheduled
                    {
                        tracing::trace!(
                            target: LOG_TARGET,
                            request = %task.data().target(),
                            task = %task.id(),
                            event = event.kind().as_str(),
                            "xhr completion candidate recorded"
                        );
                        *earlier = Some(event.kind());
                    }
                }
            }
        })
    }

    fn defer_finish(self: &Arc<Self>, task: &Arc<Task>, trigger: EventType) {
        tracing::trace!(
            target: LOG_TARGET,
            request = %task.data().target(),
            task = %task.id(),
            event = trigger.as_str(),
            "xhr completion confirmed; deferring invoke"
        );
        let lifecycle = Arc::clone(self);
        let task = Arc::clone(task);
        self.scheduler.schedule(Box::new(move || {
            if task.state() != TaskState::Invoked {
                lifecycle.invoke_task(&task);
            }
        }));
    }
}
