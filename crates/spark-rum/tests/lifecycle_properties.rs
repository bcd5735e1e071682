//! 任务生命周期性质验证
//!
//! # 教案级注释概览
//!
//! - **核心目标 (Why)**：宿主事件可以以任意顺序、任意次数到达，框架也可能在任意时刻调用 `abort`；
//!   无论输入如何，观察者看到的阶段序列都必须满足“先调度、至多一个终态、每阶段至多一次”。
//! - **设计手法 (How)**：使用 Proptest 生成随机的宿主操作序列（推进 `readyState`、派发事件、取消、
//!   执行下一轮宏任务），对单个请求运行完整装饰器链路，再对记录下来的阶段序列断言性质。
//! - **合同与边界 (What)**：
//!   - 性质 1：第一个通知必为 `Schedule`，且只出现一次；
//!   - 性质 2：`Invoke` 与 `Clear` 至多出现一个，且只出现一次；
//!   - 性质 3：一旦观察到取消标记，之后不再出现 `Invoke`；
//!   - 性质 4：原生 `abort` 的调用次数不超过装饰器收到的 `abort` 次数，取消标记置位后不再下发；
//!   - 性质 5：从未取消且经历过一次完整完成的请求，在下一轮宏任务之后恰好报告 `Schedule → Invoke`。
//!
//! # 设计考量 (Trade-offs)
//!
//! - 只覆盖单请求单提交；重复提交与多请求交错由 `xhr_lifecycle` 中的场景用例覆盖。

use std::sync::Arc;

use proptest::prelude::*;
use spark_rum::{
    DeferredQueue, DispatchScope, EventType, InstrumentationConfig, OpenArgs, Phase, ReadyState,
    XhrInstrumentation, XmlHttpRequest,
    test_stubs::{FakeXhr, RecordingObserver},
};

#[derive(Clone, Copy, Debug)]
enum HostOp {
    Progress(ReadyState),
    Fire(EventType),
    Complete,
    Abort,
    RunDeferred,
}

fn host_op() -> impl Strategy<Value = HostOp> {
    prop_oneof![
        prop_oneof![
            Just(ReadyState::HeadersReceived),
            Just(ReadyState::Loading),
            Just(ReadyState::Done),
        ]
        .prop_map(HostOp::Progress),
        prop_oneof![Just(EventType::ReadyStateChange), Just(EventType::Load)]
            .prop_map(HostOp::Fire),
        Just(HostOp::Complete),
        Just(HostOp::Abort),
        Just(HostOp::RunDeferred),
    ]
}

fn dispatch_scope() -> impl Strategy<Value = DispatchScope> {
    prop_oneof![Just(DispatchScope::Global), Just(DispatchScope::PerTask)]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn prop_notifications_respect_lifecycle(
        sync in any::<bool>(),
        scope in dispatch_scope(),
        ops in prop::collection::vec(host_op(), 0..24),
    ) {
        let observer = RecordingObserver::new();
        let queue = Arc::new(DeferredQueue::new());
        let config = InstrumentationConfig::default().with_dispatch_scope(scope);
        let instrumentation =
            XhrInstrumentation::<FakeXhr>::install(observer.clone(), queue.clone(), config)
                .expect("install");
        let xhr = instrumentation.wrap(FakeXhr::new());
        xhr.open(OpenArgs::new("GET", "/prop").with_async(!sync)).expect("open");
        xhr.send(None).expect("send");

        let mut aborts_requested = 0usize;
        let mut phases_when_aborted: Option<usize> = None;
        let completed = ops.iter().any(|op| matches!(op, HostOp::Complete));
        for op in ops {
            match op {
                HostOp::Progress(state) => xhr.inner().progress(state),
                HostOp::Fire(kind) => xhr.inner().fire(kind),
                HostOp::Complete => xhr.inner().complete(),
                HostOp::Abort => {
                    aborts_requested += 1;
                    xhr.abort().expect("abort");
                }
                HostOp::RunDeferred => {
                    queue.run_until_idle();
                }
            }
            let task = xhr.stored_task().expect("task stored on submission");
            if task.data().is_aborted() && phases_when_aborted.is_none() {
                phases_when_aborted = Some(observer.phases().len());
            }
        }
        queue.run_until_idle();

        let phases = observer.phases();
        prop_assert_eq!(phases.first().copied(), Some(Phase::Schedule));
        prop_assert_eq!(phases.iter().filter(|p| **p == Phase::Schedule).count(), 1);

        let terminals = phases.iter().filter(|p| **p != Phase::Schedule).count();
        prop_assert!(terminals <= 1, "phases: {:?}", phases);

        if let Some(seen) = phases_when_aborted {
            prop_assert!(
                !phases[seen..].contains(&Phase::Invoke),
                "invoke reported after abort: {:?}",
                phases
            );
        }

        let native_aborts = xhr.inner().abort_calls();
        prop_assert!(native_aborts <= aborts_requested);
        prop_assert_eq!(native_aborts, aborts_requested.min(1));
        if sync {
            prop_assert_eq!(phases.get(1).copied(), Some(Phase::Invoke));
        }
        if aborts_requested == 0 && (sync || completed) {
            prop_assert_eq!(phases, vec![Phase::Schedule, Phase::Invoke]);
        }
    }
}
