#![deny(unsafe_code)]

//! # spark-rum
//!
//! ## 定位与职责（Why）
//! - 为宿主的 `XMLHttpRequest` 提供生命周期埋点：每个请求在 `send` 时被建模为一个宏任务，
//!   并在“调度 → 完成/取消”三个时刻向观察者各报告恰好一次；
//! - 宿主的完成信号存在重复派发与“完成后立即取消”两类噪声，本 crate 以去重监听器与延迟检查
//!   给出唯一的完成判定，供真实用户监控（RUM）等上层统计使用。
//!
//! ## 架构嵌入（Where）
//! - `platform`：宿主请求契约、事件与监听原语、宏任务调度契约；
//! - `core`：任务描述符、状态机、簿记旁路表与生命周期判定；
//! - `patching`：装饰器形式的埋点入口 [`patch_xml_http_request`] 与 [`InstrumentedXhr`]；
//! - `observer`：观察者契约与失败隔离；`config`：安装期配置；`error`：统一错误类型；
//! - `test_stubs`：可编程的原生请求替身与记录型观察者，供测试与宿主适配层复用。
//!
//! ## 使用约定（How）
//! ```ignore
//! let queue = Arc::new(DeferredQueue::new());
//! let instrumentation = patch_xml_http_request::<HostXhr>(TracingObserver, queue.clone())?;
//! let xhr = instrumentation.wrap(HostXhr::new());
//! xhr.open(OpenArgs::new("GET", "/api"))?;
//! xhr.send(None)?;
//! // 宿主事件循环每轮结束时：
//! queue.run_until_idle();
//! ```
//!
//! ## 风险提示（Trade-offs）
//! - 网络错误只派发 `error` 而不派发 `load`，此类请求不会产生完成通知，停留在已调度状态；
//! - 对同一原生对象重复包装会产生重复通知，是否去重由调用方负责。

pub mod config;
pub mod core;
pub mod error;
pub mod observer;
pub mod patching;
pub mod platform;

/// 测试桩集合。
///
/// - **意图说明 (Why)**：集成测试、属性测试与宿主适配层共享同一套替身，避免各处重复实现宿主事件派发；
/// - **契约定位 (What)**：桩对象只保证与 [`XmlHttpRequest`] 契约一致，不模拟网络行为。
pub mod test_stubs;

pub use config::{DispatchScope, InstrumentationConfig, ObserverFailurePolicy};
pub use crate::core::{Phase, RequestId, Task, TaskId, TaskSnapshot, TaskState};
pub use error::{Result, RumError};
pub use observer::{TaskObserver, TracingObserver};
pub use patching::{InstrumentedXhr, XhrInstrumentation, patch_xml_http_request};
pub use platform::{
    CapabilitySource, Event, EventType, Listener, ListenerCapability, OpenArgs, ReadyState,
    XmlHttpRequest,
    scheduler::{DeferredQueue, MacroTaskScheduler},
};
