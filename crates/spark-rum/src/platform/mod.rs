//! # platform：宿主原生请求对象的能力契约
//!
//! ## 核心意图（Why）
//! - 将浏览器/宿主中 `XMLHttpRequest` 的最小能力面（`open`/`send`/`abort`/`readyState`）
//!   与事件监听原语抽象为 Rust trait，使埋点逻辑不依赖任何具体绑定（`web-sys`、嵌入式 JS 引擎、测试替身）。
//! - 用“装饰器实现同一 trait”取代原型链上的方法替换：埋点层持有原生对象并显式委托。
//!
//! ## 架构定位（Where）
//! - 位于依赖图最底层，`core` 与 `patching` 模块只通过这里的契约与宿主交互；
//! - [`scheduler`] 子模块承载“宏任务延迟执行”这一外部协作者的契约与参考实现。
//!
//! ## 契约说明（What）
//! - [`XmlHttpRequest`]：请求对象能力面，错误类型由宿主决定并原样透传；
//! - [`ListenerCapability`]：原生的“添加/移除监听器”函数对，安装期解析一次后缓存；
//! - [`Listener`]：带身份语义的监听器句柄，移除时按指针身份匹配。
//!
//! ## 风险提示（Trade-offs）
//! - 能力函数以 `fn` 指针而非闭包表达，牺牲少量灵活性，换取 `Copy` 语义与零分配缓存；
//! - 监听器要求 `Send + Sync`，单线程宿主需要为此付出一次 `Arc` 分配。

pub mod scheduler;

use std::{any::type_name, fmt, sync::Arc};

use serde::Serialize;

use crate::error::{Result, RumError};

/// 请求对象的就绪状态，对应 `XMLHttpRequest.readyState` 的五个取值。
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadyState {
    Unsent,
    Opened,
    HeadersReceived,
    Loading,
    /// 请求已完成（成功、失败或被取消后的终态），即 `XMLHttpRequest.DONE`。
    Done,
}

/// 埋点关心的两类原生事件。
///
/// # 教案式说明
/// - **意图 (Why)**：完成判定只依赖 `readystatechange` 与 `load` 两个信号，二者在不同宿主上的
///   触发次数与顺序并不稳定，去重启发式正是基于“两种不同类型先后到达”来确认真实完成；
/// - **契约 (What)**：[`EventType::as_str`] 返回宿主事件名，可直接用于绑定层注册。
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
pub enum EventType {
    #[serde(rename = "readystatechange")]
    ReadyStateChange,
    #[serde(rename = "load")]
    Load,
}

impl EventType {
    /// 埋点需要订阅的全部事件，顺序即注册顺序。
    pub const COMPLETION_EVENTS: [EventType; 2] = [EventType::ReadyStateChange, EventType::Load];

    /// 宿主侧事件名。
    pub const fn as_str(self) -> &'static str {
        match self {
            EventType::ReadyStateChange => "readystatechange",
            EventType::Load => "load",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 派发给监听器的事件。仅携带类型，其余状态由监听器回读请求对象获得。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Event {
    kind: EventType,
}

impl Event {
    pub const fn new(kind: EventType) -> Self {
        Self { kind }
    }

    pub const fn kind(&self) -> EventType {
        self.kind
    }
}

/// 带身份语义的事件监听器句柄。
///
/// # 教案式说明
/// - **意图 (Why)**：宿主的 `removeEventListener` 按函数身份匹配；Rust 闭包没有天然身份，
///   因此以 `Arc` 分配地址作为身份，克隆句柄共享同一身份；
/// - **契约 (What)**：[`Listener::same_as`] 仅比较数据指针，忽略 vtable，避免跨代码生成单元的误判；
/// - **风险 (Trade-offs)**：监听器在宿主事件派发线程上同步执行，实现方不得在其中阻塞。
#[derive(Clone)]
pub struct Listener {
    callback: Arc<dyn Fn(&Event) + Send + Sync>,
}

impl Listener {
    pub fn new(callback: impl Fn(&Event) + Send + Sync + 'static) -> Self {
        Self {
            callback: Arc::new(callback),
        }
    }

    /// 以事件调用监听器。
    pub fn call(&self, event: &Event) {
        (self.callback)(event)
    }

    /// 判断两个句柄是否指向同一个监听器。
    pub fn same_as(&self, other: &Listener) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.callback), Arc::as_ptr(&other.callback))
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("id", &Arc::as_ptr(&self.callback).cast::<()>())
            .finish()
    }
}

/// `open` 的参数集合，对应 `open(method, url, async?, user?, password?)`。
///
/// # 教案式说明
/// - **意图 (Why)**：保留“第三个参数是否被显式传入”的区别：只有显式传入 `false` 才视为同步请求，
///   省略该参数时宿主默认异步；
/// - **契约 (What)**：`async_flag` 为 `None` 表示调用方未传第三个参数；[`OpenArgs::is_sync`]
///   在且仅在 `async_flag == Some(false)` 时返回 `true`。
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OpenArgs {
    method: String,
    url: String,
    async_flag: Option<bool>,
    username: Option<String>,
    password: Option<String>,
}

impl OpenArgs {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            async_flag: None,
            username: None,
            password: None,
        }
    }

    /// 显式传入第三个参数。
    pub fn with_async(mut self, async_flag: bool) -> Self {
        self.async_flag = Some(async_flag);
        self
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn async_flag(&self) -> Option<bool> {
        self.async_flag
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    /// 是否为同步请求：仅当第三个参数被显式传入且为 `false`。
    pub fn is_sync(&self) -> bool {
        self.async_flag == Some(false)
    }
}

/// 原生 `XMLHttpRequest` 的能力面。
///
/// # 教案式说明
/// - **意图 (Why)**：埋点装饰器 [`InstrumentedXhr`](crate::patching::InstrumentedXhr) 与原生实现共享此契约，
///   调用方无需感知对象是否被埋点；
/// - **契约 (What)**：
///   - `open`/`send`/`abort` 的返回值与错误由宿主定义，装饰器必须原样返回；
///   - `send` 对同步请求必须在返回前完成请求（宿主可在其中同步派发事件）；
///   - `own_listener_capability` 对应请求原型自身的监听原语，`event_target_capability` 对应
///     上一层共享 `EventTarget` 原型的监听原语，二者在安装期按此顺序解析一次；
/// - **风险 (Trade-offs)**：能力函数是类型级信息，同一宿主类型的所有实例共享解析结果。
pub trait XmlHttpRequest: Send + Sync + Sized + 'static {
    /// 请求体类型。
    type Body: Send;
    /// 宿主错误类型，装饰器不做任何包装。
    type Error;

    fn open(&self, args: OpenArgs) -> core::result::Result<(), Self::Error>;

    fn send(&self, body: Option<Self::Body>) -> core::result::Result<(), Self::Error>;

    fn abort(&self) -> core::result::Result<(), Self::Error>;

    fn ready_state(&self) -> ReadyState;

    /// 请求原型自身提供的监听原语。
    fn own_listener_capability() -> Option<ListenerCapability<Self>>;

    /// 共享事件目标原型提供的监听原语，作为回退。
    fn event_target_capability() -> Option<ListenerCapability<Self>> {
        None
    }
}

/// 监听原语的来源，用于安装日志与诊断。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CapabilitySource {
    OwnPrototype,
    EventTarget,
}

/// 原生“添加/移除监听器”函数对。
///
/// # 教案式说明
/// - **意图 (Why)**：宿主的监听原语可能挂在请求原型上，也可能只存在于上一层事件目标原型；
///   在安装期显式解析一次并缓存，替代逐请求的动态查找；
/// - **执行 (How)**：[`ListenerCapability::resolve`] 先取自身原型，再回退到事件目标原型，
///   二者皆缺失时返回 [`RumError::ListenerCapabilityUnavailable`]；
/// - **契约 (What)**：`add`/`remove` 不得在内部调用监听器本身。
pub struct ListenerCapability<R> {
    add: fn(&R, EventType, &Listener),
    remove: fn(&R, EventType, &Listener),
    source: CapabilitySource,
}

impl<R> ListenerCapability<R> {
    pub const fn new(
        add: fn(&R, EventType, &Listener),
        remove: fn(&R, EventType, &Listener),
    ) -> Self {
        Self {
            add,
            remove,
            source: CapabilitySource::OwnPrototype,
        }
    }

    /// 标记该能力来自共享事件目标原型。
    pub const fn from_event_target(mut self) -> Self {
        self.source = CapabilitySource::EventTarget;
        self
    }

    pub fn add(&self, target: &R, event: EventType, listener: &Listener) {
        (self.add)(target, event, listener)
    }

    pub fn remove(&self, target: &R, event: EventType, listener: &Listener) {
        (self.remove)(target, event, listener)
    }

    pub const fn source(&self) -> CapabilitySource {
        self.source
    }
}

impl<R: XmlHttpRequest> ListenerCapability<R> {
    /// 按“自身原型 → 事件目标原型”的顺序解析监听原语。
    pub fn resolve() -> Result<Self> {
        R::own_listener_capability()
            .or_else(|| R::event_target_capability().map(ListenerCapability::from_event_target))
            .ok_or(RumError::ListenerCapabilityUnavailable {
                request_type: type_name::<R>(),
            })
    }
}

impl<R> Clone for ListenerCapability<R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<R> Copy for ListenerCapability<R> {}

impl<R> fmt::Debug for ListenerCapability<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerCapability")
            .field("source", &self.source)
            .finish()
    }
}
