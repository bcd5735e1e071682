//! 宏任务延迟调度契约。
//!
//! # 教案式说明
//! - **意图（Why）**：完成判定需要“等当前同步执行与本轮事件派发全部结束后再检查一次”，
//!   这一能力由宿主的宏任务队列（`setTimeout(0)`、事件循环下一 tick）提供，埋点只依赖契约；
//! - **逻辑（How）**：[`MacroTaskScheduler::schedule`] 接收一次性回调；[`DeferredQueue`]
//!   是 FIFO 参考实现，供自驱动事件循环的宿主与测试使用；
//! - **契约（What）**：回调必须在 `schedule` 返回之后执行，同一调度器上的回调按提交顺序执行，
//!   不同调度器之间不做顺序保证。

use std::{collections::VecDeque, fmt, sync::Arc};

use parking_lot::Mutex;

/// 被延迟执行的检查回调。
pub type DeferredCheck = Box<dyn FnOnce() + Send + 'static>;

/// 宏任务调度器。
pub trait MacroTaskScheduler: Send + Sync {
    /// 在当前执行轮次结束后运行 `check`。实现不得在本调用内同步执行回调。
    fn schedule(&self, check: DeferredCheck);
}

impl<S: MacroTaskScheduler + ?Sized> MacroTaskScheduler for Arc<S> {
    fn schedule(&self, check: DeferredCheck) {
        (**self).schedule(check)
    }
}

/// FIFO 延迟队列，由宿主事件循环在每轮结束时调用 [`DeferredQueue::run_until_idle`] 驱动。
///
/// # 教案式说明
/// - **意图 (Why)**：为没有现成宏任务原语的宿主提供最小实现，同时让测试可以精确控制“下一轮”何时到来；
/// - **执行 (How)**：出队时先释放锁再执行回调，回调内部可以继续调度新的检查，新检查排在队尾；
/// - **风险 (Trade-offs)**：`run_until_idle` 会一直执行到队列为空，回调若无限自我调度将无法返回。
#[derive(Default)]
pub struct DeferredQueue {
    pending: Mutex<VecDeque<DeferredCheck>>,
}

impl DeferredQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// 执行队首的一个检查，返回是否执行了回调。
    pub fn run_next(&self) -> bool {
        let next = self.pending.lock().pop_front();
        match next {
            Some(check) => {
                check();
                true
            }
            None => false,
        }
    }

    /// 持续执行直到队列为空，返回执行的回调数量。
    pub fn run_until_idle(&self) -> usize {
        let mut executed = 0;
        while self.run_next() {
            executed += 1;
        }
        executed
    }
}

impl MacroTaskScheduler for DeferredQueue {
    fn schedule(&self, check: DeferredCheck) {
        self.pending.lock().push_back(check);
    }
}

impl fmt::Debug for DeferredQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredQueue")
            .field("pending", &self.len())
            .finish()
    }
}
