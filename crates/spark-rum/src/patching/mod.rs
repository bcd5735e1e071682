//! 宿主请求对象的埋点装饰器集合。
//!
//! - **意图说明 (Why)**：每类宿主对象（当前仅 `XMLHttpRequest`）对应一个子模块，
//!   负责把原生方法调用翻译为任务生命周期步骤；
//! - **扩展指引 (How)**：新增宿主对象时复用 [`crate::core`] 的状态机与簿记表，只在此处编写装饰器。

mod xhr;

pub use xhr::{InstrumentedXhr, XhrInstrumentation, patch_xml_http_request};
