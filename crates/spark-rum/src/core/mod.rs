//! # core：任务生命周期的内部实现
//!
//! - `ids`：请求对象与任务描述符的进程内标识；
//! - `task`：任务描述符、状态与合法跃迁；
//! - `registry`：以请求身份为键的簿记旁路表；
//! - `lifecycle`：调度/完成/取消三个步骤与完成信号去重监听器。

mod ids;
pub(crate) mod lifecycle;
mod registry;
mod task;

pub use ids::{RequestId, TaskId};
pub use registry::{RequestMeta, RequestSlot, TaskRegistry};
pub use task::{
    Phase, StateAdvance, Task, TaskData, TaskDataSnapshot, TaskKind, TaskSnapshot, TaskState,
    XHR_TASK_SOURCE,
};
