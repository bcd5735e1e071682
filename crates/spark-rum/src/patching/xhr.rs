//! # XMLHttpRequest 埋点装饰器
//!
//! ## 核心意图（Why）
//! - 以装饰器对象包裹原生请求，拦截 `open`/`send`/`abort` 三个方法，在委托原生实现的前后驱动任务生命周期；
//! - 装饰器实现与原生对象相同的 [`XmlHttpRequest`] 契约，调用方无需区分两者。
//!
//! ## 教案式使用指南（How）
//! 1. 调用 [`patch_xml_http_request`] 或 [`XhrInstrumentation::install`] 完成一次安装，
//!    安装期解析监听原语并固定观察者、调度器与配置；
//! 2. 对每个原生请求对象调用 [`XhrInstrumentation::wrap`]，之后只通过返回的 [`InstrumentedXhr`] 操作请求；
//! 3. 宿主事件循环在每轮结束时驱动延迟调度器（例如 [`DeferredQueue::run_until_idle`](crate::platform::scheduler::DeferredQueue::run_until_idle)）。
//!
//! ## 行为契约（What）
//! - 被标记忽略的请求：三个方法都是纯透传，不产生任何通知；
//! - 原生方法的返回值与错误原样返回；`send` 的原生错误会跳过派发标记与同步完成步骤；
//! - 重复安装并对已包装对象再次包装会产生双重埋点，由调用方负责避免。

use std::{fmt, sync::Arc};

use crate::{
    config::InstrumentationConfig,
    core::{RequestId, RequestMeta, Task, lifecycle::Lifecycle},
    error::Result,
    observer::{ObserverSlot, TaskObserver},
    platform::{
        EventType, Listener, ListenerCapability, OpenArgs, ReadyState, XmlHttpRequest,
        scheduler::MacroTaskScheduler,
    },
};

const LOG_TARGET: &str = "spark_rum::patching";

/// 以默认配置安装 XMLHttpRequest 埋点。
///
/// # 教案式说明
/// - **意图 (Why)**：最常见的接入方式只需提供观察者与宿主的宏任务调度器；
/// - **契约 (What)**：等价于 `XhrInstrumentation::install(observer, scheduler, InstrumentationConfig::default())`；
///   请求类型缺少监听原语时返回 [`RumError::ListenerCapabilityUnavailable`](crate::RumError::ListenerCapabilityUnavailable)。
pub fn patch_xml_http_request<R: XmlHttpRequest>(
    observer: impl TaskObserver + 'static,
    scheduler: Arc<dyn MacroTaskScheduler>,
) -> Result<XhrInstrumentation<R>> {
    XhrInstrumentation::install(observer, scheduler, InstrumentationConfig::default())
}

/// 一次埋点安装的句柄。
///
/// # 教案式说明
/// - **意图 (Why)**：持有安装期固定下来的共享状态，并作为包装请求对象的工厂；
/// - **契约 (What)**：句柄可廉价克隆，所有克隆共享同一份簿记表与派发标记；
/// - **风险 (Trade-offs)**：句柄本身不追踪包装出的对象，释放由各 [`InstrumentedXhr`] 的析构完成。
pub struct XhrInstrumentation<R: XmlHttpRequest> {
    lifecycle: Arc<Lifecycle<R>>,
}

impl<R: XmlHttpRequest> XhrInstrumentation<R> {
    /// 按给定配置安装埋点。
    pub fn install(
        observer: impl TaskObserver + 'static,
        scheduler: Arc<dyn MacroTaskScheduler>,
        config: InstrumentationConfig,
    ) -> Result<Self> {
        Self::install_shared(Arc::new(observer), scheduler, config)
    }

    /// 以共享观察者安装，便于多个安装复用同一观察者实例。
    pub fn install_shared(
        observer: Arc<dyn TaskObserver>,
        scheduler: Arc<dyn MacroTaskScheduler>,
        config: InstrumentationConfig,
    ) -> Result<Self> {
        let capability = ListenerCapability::<R>::resolve()?;
        tracing::info!(
            target: LOG_TARGET,
            request_type = std::any::type_name::<R>(),
            capability = ?capability.source(),
            dispatch_scope = ?config.dispatch_scope,
            observer_failure = ?config.observer_failure,
            "xhr instrumentation installed"
        );
        let observer = ObserverSlot::new(observer, config.observer_failure);
        Ok(Self {
            lifecycle: Arc::new(Lifecycle::new(capability, observer, scheduler, &config)),
        })
    }

    /// 包装一个原生请求对象并为其登记簿记槽位。
    pub fn wrap(&self, request: R) -> InstrumentedXhr<R> {
        let id = RequestId::next();
        self.lifecycle.registry().register(id);
        InstrumentedXhr {
            id,
            inner: Arc::new(request),
            lifecycle: Arc::clone(&self.lifecycle),
        }
    }

    /// 当前仍被包装、尚未释放的请求对象数量。
    pub fn tracked_requests(&self) -> usize {
        self.lifecycle.registry().len()
    }
}

impl<R: XmlHttpRequest> Clone for XhrInstrumentation<R> {
    fn clone(&self) -> Self {
        Self {
            lifecycle: Arc::clone(&self.lifecycle),
        }
    }
}

impl<R: XmlHttpRequest> fmt::Debug for XhrInstrumentation<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XhrInstrumentation")
            .field("capability", self.lifecycle.capability())
            .field("tracked_requests", &self.tracked_requests())
            .finish()
    }
}

/// 被埋点的请求对象。
///
/// # 教案式说明
/// - **意图 (Why)**：取代“替换原型方法并保存原始实现”的做法，显式持有原生对象并委托；
/// - **结构 (How)**：`inner` 以 `Arc` 持有，监听器只保留其弱引用；`id` 是簿记表中的键；
/// - **契约 (What)**：析构时释放簿记槽位并摘除当前监听器；
/// - **风险 (Trade-offs)**：忽略标记只影响之后的调用，已经提交的任务仍会按原监听器完成判定。
pub struct InstrumentedXhr<R: XmlHttpRequest> {
    id: RequestId,
    inner: Arc<R>,
    lifecycle: Arc<Lifecycle<R>>,
}

impl<R: XmlHttpRequest> InstrumentedXhr<R> {
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// 原生请求对象。
    pub fn inner(&self) -> &R {
        &self.inner
    }

    /// 设置忽略标记。应在 `open` 之前设置，之后三个方法均退化为纯透传。
    pub fn set_ignored(&self, ignored: bool) {
        self.lifecycle.registry().set_ignored(self.id, ignored);
    }

    pub fn is_ignored(&self) -> bool {
        self.lifecycle.registry().is_ignored(self.id)
    }

    /// 簿记表中为该请求存储的任务（首次提交胜出）。
    pub fn stored_task(&self) -> Option<Arc<Task>> {
        self.lifecycle.registry().stored_task(self.id)
    }
}

impl<R: XmlHttpRequest> XmlHttpRequest for InstrumentedXhr<R> {
    type Body = R::Body;
    type Error = R::Error;

    fn open(&self, args: OpenArgs) -> core::result::Result<(), Self::Error> {
        if !self.is_ignored() {
            self.lifecycle.registry().record_open(
                self.id,
                RequestMeta {
                    method: Some(args.method().to_owned()),
                    url: Some(args.url().to_owned()),
                    sync: args.is_sync(),
                },
            );
        }
        self.inner.open(args)
    }

    fn send(&self, body: Option<Self::Body>) -> core::result::Result<(), Self::Error> {
        if self.is_ignored() {
            return self.inner.send(body);
        }

        let meta = self.lifecycle.registry().request_meta(self.id);
        let sync = meta.sync;
        let task = Arc::new(Task::new(self.id, meta.method, meta.url, sync));
        self.lifecycle.schedule_task(self.id, &self.inner, &task);

        self.inner.send(body)?;
        self.lifecycle.mark_dispatched(&task);
        if sync {
            self.lifecycle.invoke_task(&task);
        }
        Ok(())
    }

    fn abort(&self) -> core::result::Result<(), Self::Error> {
        if !self.is_ignored() {
            if let Some(task) = self.stored_task() {
                if task.data().is_aborted() {
                    tracing::trace!(
                        target: LOG_TARGET,
                        request = %self.id,
                        task = %task.id(),
                        "xhr already aborted; skipping native abort"
                    );
                    return Ok(());
                }
                self.lifecycle.clear_task(&task);
            }
        }
        self.inner.abort()
    }

    fn ready_state(&self) -> ReadyState {
        self.inner.ready_state()
    }

    fn own_listener_capability() -> Option<ListenerCapability<Self>> {
        Some(ListenerCapability::new(add_via_inner::<R>, remove_via_inner::<R>))
    }
}

fn add_via_inner<R: XmlHttpRequest>(
    request: &InstrumentedXhr<R>,
    event: EventType,
    listener: &Listener,
) {
    request
        .lifecycle
        .capability()
        .add(&request.inner, event, listener);
}

fn remove_via_inner<R: XmlHttpRequest>(
    request: &InstrumentedXhr<R>,
    event: EventType,
    listener: &Listener,
) {
    request
        .lifecycle
        .capability()
        .remove(&request.inner, event, listener);
}

impl<R: XmlHttpRequest> Drop for InstrumentedXhr<R> {
    fn drop(&mut self) {
        if let Some(mut slot) = self.lifecycle.registry().release(self.id) {
            if let Some(listener) = slot.take_listener() {
                self.lifecycle.detach(&self.inner, &listener);
            }
        }
    }
}

impl<R: XmlHttpRequest> fmt::Debug for InstrumentedXhr<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstrumentedXhr")
            .field("id", &self.id)
            .field("ready_state", &self.inner.ready_state())
            .finish_non_exhaustive()
    }
}
