//! # TaskRegistry：请求对象的埋点簿记
//!
//! ## 核心意图（Why）
//! - 以请求对象身份为键的旁路表，替代在宿主对象上注入隐藏属性：每个请求对象拥有一个槽位，
//!   记录忽略标记、`open` 时捕获的元数据、当前存储的任务以及当前生效的监听器；
//! - 表由一次埋点安装独占，装饰器析构时释放对应槽位，不会随请求数量无限增长。
//!
//! ## 行为契约（What）
//! - `store_task_if_vacant`：首次提交胜出，已有存储任务时不覆盖；
//! - `replace_listener`：每次提交都替换，并把旧监听器交还调用方负责摘除；
//! - 所有操作在槽位缺失时按默认槽位处理，不会 panic。
//!
//! ## 风险提示（Trade-offs）
//! - `DashMap` guard 持有期间会阻塞同分片写操作，因此所有方法都在返回前释放 guard，
//!   调用方拿到的都是克隆值；观察者与原生方法绝不会在 guard 内被调用。

use std::sync::Arc;

use dashmap::DashMap;

use super::{ids::RequestId, task::Task};
use crate::platform::Listener;

/// `open` 捕获、`send` 消费的请求元数据。
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RequestMeta {
    pub method: Option<String>,
    pub url: Option<String>,
    pub sync: bool,
}

/// 单个请求对象的簿记槽位。
#[derive(Debug, Default)]
pub struct RequestSlot {
    ignored: bool,
    meta: RequestMeta,
    task: Option<Arc<Task>>,
    listener: Option<Listener>,
}

impl RequestSlot {
    /// 拆出当前监听器，供释放槽位时摘除。
    pub(crate) fn take_listener(&mut self) -> Option<Listener> {
        self.listener.take()
    }
}

/// 请求对象簿记表。
///
/// # 教案式注释
/// - **意图 (Why)**：封装并发安全存储，避免装饰器直接操作 `DashMap`；
/// - **契约 (What)**：以 [`RequestId`] 为键，键由装饰器在构造时分配；
/// - **风险 (Trade-offs)**：表不感知请求对象是否仍然存活，释放依赖装饰器的 `Drop`。
#[derive(Debug, Default)]
pub struct TaskRegistry {
    slots: DashMap<RequestId, RequestSlot>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 为新包装的请求对象登记空槽位。
    pub fn register(&self, id: RequestId) {
        self.slots.entry(id).or_default();
    }

    /// 移除并返回槽位。
    pub fn release(&self, id: RequestId) -> Option<RequestSlot> {
        self.slots.remove(&id).map(|(_, slot)| slot)
    }

    pub fn set_ignored(&self, id: RequestId, ignored: bool) {
        self.slots.entry(id).or_default().ignored = ignored;
    }

    pub fn is_ignored(&self, id: RequestId) -> bool {
        self.slots.get(&id).is_some_and(|slot| slot.ignored)
    }

    /// 记录 `open` 捕获的元数据，覆盖上一次配置。
    pub fn record_open(&self, id: RequestId, meta: RequestMeta) {
        self.slots.entry(id).or_default().meta = meta;
    }

    pub fn request_meta(&self, id: RequestId) -> RequestMeta {
        self.slots
            .get(&id)
            .map(|slot| slot.meta.clone())
            .unwrap_or_default()
    }

    /// 安装新的监听器并返回被替换的旧监听器。
    pub fn replace_listener(&self, id: RequestId, listener: Listener) -> Option<Listener> {
        self.slots.entry(id).or_default().listener.replace(listener)
    }

    /// 仅在槽位尚无存储任务时写入，返回是否写入。
    pub fn store_task_if_vacant(&self, id: RequestId, task: &Arc<Task>) -> bool {
        let mut slot = self.slots.entry(id).or_default();
        if slot.task.is_some() {
            return false;
        }
        slot.task = Some(Arc::clone(task));
        true
    }

    pub fn stored_task(&self, id: RequestId) -> Option<Arc<Task>> {
        self.slots.get(&id).and_then(|slot| slot.task.clone())
    }

    /// 当前登记的请求对象数量。
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task_for(id: RequestId) -> Arc<Task> {
        Arc::new(Task::new(id, None, None, false))
    }

    #[test]
    fn first_stored_task_wins() {
        let registry = TaskRegistry::new();
        let id = RequestId::next();
        registry.register(id);

        let first = task_for(id);
        let second = task_for(id);
        assert!(registry.store_task_if_vacant(id, &first));
        assert!(!registry.store_task_if_vacant(id, &second));

        let stored = registry.stored_task(id).expect("task stored");
        assert!(Arc::ptr_eq(&stored, &first));
    }

    #[test]
    fn replacing_listener_hands_back_previous_one() {
        let registry = TaskRegistry::new();
        let id = RequestId::next();
        let first = Listener::new(|_| {});
        let second = Listener::new(|_| {});

        assert!(registry.replace_listener(id, first.clone()).is_none());
        let previous = registry
            .replace_listener(id, second.clone())
            .expect("previous listener returned");
        assert!(previous.same_as(&first));

        let mut slot = registry.release(id).expect("slot existed");
        assert!(slot.take_listener().is_some_and(|active| active.same_as(&second)));
    }

    #[test]
    fn unknown_requests_read_as_defaults_and_release_drops_slot() {
        let registry = TaskRegistry::new();
        let id = RequestId::next();
        assert!(!registry.is_ignored(id));
        assert_eq!(registry.request_meta(id), RequestMeta::default());
        assert!(registry.stored_task(id).is_none());

        registry.set_ignored(id, true);
        registry.record_open(
            id,
            RequestMeta {
                method: Some("POST".to_owned()),
                url: Some("/upload".to_owned()),
                sync: true,
            },
        );
        assert!(registry.is_ignored(id));
        assert_eq!(registry.len(), 1);

        assert_eq!(registry.request_meta(id).url.as_deref(), Some("/upload"));

        assert!(registry.release(id).is_some());
        assert!(registry.is_empty());
        assert!(!registry.is_ignored(id));
    }
}
