//! 测试桩集合：可编程的原生请求替身与记录型观察者。
//!
//! # 设计定位（Why）
//! - 生命周期判定完全由宿主事件顺序驱动，测试需要精确控制 `readyState` 与事件派发的每一步；
//! - 集成测试、属性测试与下游宿主适配层共享同一套桩对象，接口演进时获得集中编译错误提示。
//!
//! # 使用方式（How）
//! - [`FakeXhr`] 记录每次原生调用，`progress`/`fire`/`complete` 模拟宿主派发；同步请求在 `send` 内完成全部派发；
//! - [`RecordingObserver`] 按顺序记录通知阶段与任务快照，克隆共享同一份记录。
//!
//! # 风险与权衡（Trade-offs）
//! - `FakeXhr` 只模拟埋点关心的 `readystatechange` 与 `load`，不派发 `abort`/`error`/`loadend`。

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use parking_lot::Mutex;
use thiserror::Error;

use crate::{
    core::{Phase, RequestId, Task, TaskSnapshot},
    observer::TaskObserver,
    platform::{
        Event, EventType, Listener, ListenerCapability, OpenArgs, ReadyState, XmlHttpRequest,
    },
};

/// [`FakeXhr`] 收到的原生调用。
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum NativeCall {
    Open {
        method: String,
        url: String,
        async_flag: Option<bool>,
        username: Option<String>,
        password: Option<String>,
    },
    Send {
        body: Option<String>,
    },
    Abort,
}

/// [`FakeXhr`] 的注入错误。
#[derive(Clone, Debug, Eq, Error, PartialEq)]
#[error("fake xhr failure: {0}")]
pub struct FakeXhrError(pub &'static str);

/// 可编程的原生 `XMLHttpRequest` 替身。
///
/// # 契约细节（What）
/// - `open` 置为 `Opened` 并派发一次 `readystatechange`；
/// - 同步 `send` 在返回前置为 `Done` 并依次派发 `readystatechange`、`load`；
/// - `abort` 对在途请求先置为 `Done` 并派发 `readystatechange`，最终一律回到 `Unsent`；
/// - 同一监听器对同一事件重复注册视为一次，与宿主语义一致。
#[derive(Debug)]
pub struct FakeXhr {
    ready_state: Mutex<ReadyState>,
    sync: AtomicBool,
    sent: AtomicBool,
    fail_next_send: AtomicBool,
    listeners: Mutex<Vec<(EventType, Listener)>>,
    calls: Mutex<Vec<NativeCall>>,
}

impl FakeXhr {
    pub fn new() -> Self {
        Self {
            ready_state: Mutex::new(ReadyState::Unsent),
            sync: AtomicBool::new(false),
            sent: AtomicBool::new(false),
            fail_next_send: AtomicBool::new(false),
            listeners: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// 让下一次 `send` 返回 [`FakeXhrError`]。
    pub fn fail_next_send(&self) {
        self.fail_next_send.store(true, Ordering::SeqCst);
    }

    /// 仅修改 `readyState`，不派发事件。
    pub fn set_ready_state(&self, state: ReadyState) {
        *self.ready_state.lock() = state;
    }

    /// 向当前订阅 `kind` 的监听器派发一次事件。派发期间不持有监听器列表的锁。
    pub fn fire(&self, kind: EventType) {
        let targets: Vec<Listener> = self
            .listeners
            .lock()
            .iter()
            .filter(|(event, _)| *event == kind)
            .map(|(_, listener)| listener.clone())
            .collect();
        let event = Event::new(kind);
        for listener in targets {
            listener.call(&event);
        }
    }

    /// 修改 `readyState` 并派发 `readystatechange`。
    pub fn progress(&self, state: ReadyState) {
        self.set_ready_state(state);
        self.fire(EventType::ReadyStateChange);
    }

    /// 模拟一次成功完成：`HeadersReceived` → `Loading` → `Done`，随后派发 `load`。
    pub fn complete(&self) {
        self.progress(ReadyState::HeadersReceived);
        self.progress(ReadyState::Loading);
        self.progress(ReadyState::Done);
        self.fire(EventType::Load);
    }

    pub fn calls(&self) -> Vec<NativeCall> {
        self.calls.lock().clone()
    }

    pub fn abort_calls(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| matches!(call, NativeCall::Abort))
            .count()
    }

    pub fn listener_count(&self, kind: EventType) -> usize {
        self.listeners
            .lock()
            .iter()
            .filter(|(event, _)| *event == kind)
            .count()
    }

    /// 原生 `addEventListener`。同一监听器对同一事件只登记一次。
    pub fn add_event_listener(&self, kind: EventType, listener: &Listener) {
        let mut listeners = self.listeners.lock();
        let duplicate = listeners
            .iter()
            .any(|(event, existing)| *event == kind && existing.same_as(listener));
        if !duplicate {
            listeners.push((kind, listener.clone()));
        }
    }

    pub fn remove_event_listener(&self, kind: EventType, listener: &Listener) {
        self.listeners
            .lock()
            .retain(|(event, existing)| !(*event == kind && existing.same_as(listener)));
    }
}

impl Default for FakeXhr {
    fn default() -> Self {
        Self::new()
    }
}

impl XmlHttpRequest for FakeXhr {
    type Body = String;
    type Error = FakeXhrError;

    fn open(&self, args: OpenArgs) -> Result<(), Self::Error> {
        self.calls.lock().push(NativeCall::Open {
            method: args.method().to_owned(),
            url: args.url().to_owned(),
            async_flag: args.async_flag(),
            username: args.username().map(str::to_owned),
            password: args.password().map(str::to_owned),
        });
        self.sync.store(args.is_sync(), Ordering::SeqCst);
        self.sent.store(false, Ordering::SeqCst);
        self.progress(ReadyState::Opened);
        Ok(())
    }

    fn send(&self, body: Option<Self::Body>) -> Result<(), Self::Error> {
        self.calls.lock().push(NativeCall::Send { body });
        if self.fail_next_send.swap(false, Ordering::SeqCst) {
            return Err(FakeXhrError("send rejected"));
        }
        self.sent.store(true, Ordering::SeqCst);
        if self.sync.load(Ordering::SeqCst) {
            self.progress(ReadyState::Done);
            self.fire(EventType::Load);
        }
        Ok(())
    }

    fn abort(&self) -> Result<(), Self::Error> {
        self.calls.lock().push(NativeCall::Abort);
        let in_flight = self.sent.swap(false, Ordering::SeqCst)
            && matches!(
                self.ready_state(),
                ReadyState::Opened | ReadyState::HeadersReceived | ReadyState::Loading
            );
        if in_flight {
            self.progress(ReadyState::Done);
        }
        self.set_ready_state(ReadyState::Unsent);
        Ok(())
    }

    fn ready_state(&self) -> ReadyState {
        *self.ready_state.lock()
    }

    fn own_listener_capability() -> Option<ListenerCapability<Self>> {
        Some(ListenerCapability::new(
            FakeXhr::add_event_listener,
            FakeXhr::remove_event_listener,
        ))
    }
}

/// 一次被记录的通知。
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ObservedTransition {
    pub phase: Phase,
    pub snapshot: TaskSnapshot,
}

/// 记录型观察者，按到达顺序保存每次通知。
#[derive(Clone, Debug, Default)]
pub struct RecordingObserver {
    events: Arc<Mutex<Vec<ObservedTransition>>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ObservedTransition> {
        self.events.lock().clone()
    }

    pub fn phases(&self) -> Vec<Phase> {
        self.events.lock().iter().map(|event| event.phase).collect()
    }

    /// 指定请求对象收到的通知阶段。
    pub fn phases_for(&self, request: RequestId) -> Vec<Phase> {
        self.events
            .lock()
            .iter()
            .filter(|event| event.snapshot.data.target == request)
            .map(|event| event.phase)
            .collect()
    }
}

impl TaskObserver for RecordingObserver {
    fn on_task(&self, phase: Phase, task: &Task) {
        self.events.lock().push(ObservedTransition {
            phase,
            snapshot: task.snapshot(),
        });
    }
}
