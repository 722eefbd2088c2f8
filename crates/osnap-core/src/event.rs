//! 引擎事件
//!
//! 按事件类型维护同步监听器列表：监听器按注册顺序执行；派发前
//! 先对列表做快照，监听器在回调中注册/注销不影响本次派发；
//! 单个监听器panic被隔离，不会阻断其余监听器或破坏引擎状态。

use crate::math::Point2;
use crate::snap::SnapResult;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;
use std::time::Duration;

/// 事件类别（订阅键）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    SnapStart,
    SnapFound,
    SnapLost,
    SnapError,
    IndexRebuilt,
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::SnapStart => "snap:start",
            EventKind::SnapFound => "snap:found",
            EventKind::SnapLost => "snap:lost",
            EventKind::SnapError => "snap:error",
            EventKind::IndexRebuilt => "index:rebuilt",
        }
    }
}

/// 引擎事件（带类型化载荷）
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// 一次捕捉查询开始
    SnapStart { cursor: Point2 },
    /// 查询命中
    SnapFound { result: SnapResult },
    /// 从命中转为未命中
    SnapLost { cursor: Point2 },
    /// 查询内部失败（已降级为安全的未命中结果）
    SnapError { message: String },
    /// 索引完成一次重建
    IndexRebuilt {
        entity_count: usize,
        elapsed: Duration,
    },
}

impl EngineEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            EngineEvent::SnapStart { .. } => EventKind::SnapStart,
            EngineEvent::SnapFound { .. } => EventKind::SnapFound,
            EngineEvent::SnapLost { .. } => EventKind::SnapLost,
            EngineEvent::SnapError { .. } => EventKind::SnapError,
            EngineEvent::IndexRebuilt { .. } => EventKind::IndexRebuilt,
        }
    }
}

/// 监听器句柄，用于注销
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Rc<dyn Fn(&EngineEvent)>;

/// 事件分发器
#[derive(Default)]
pub struct EventHub {
    listeners: HashMap<EventKind, Vec<(ListenerId, Listener)>>,
    next_id: u64,
}

impl std::fmt::Debug for EventHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: HashMap<&'static str, usize> = self
            .listeners
            .iter()
            .map(|(kind, list)| (kind.name(), list.len()))
            .collect();
        f.debug_struct("EventHub").field("listeners", &counts).finish()
    }
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册监听器，返回注销用的句柄
    pub fn on(&mut self, kind: EventKind, listener: impl Fn(&EngineEvent) + 'static) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.listeners
            .entry(kind)
            .or_default()
            .push((id, Rc::new(listener)));
        id
    }

    /// 注销监听器
    pub fn off(&mut self, id: ListenerId) -> bool {
        for list in self.listeners.values_mut() {
            let before = list.len();
            list.retain(|(lid, _)| *lid != id);
            if list.len() != before {
                return true;
            }
        }
        false
    }

    /// 同步派发事件
    pub fn emit(&self, event: &EngineEvent) {
        let snapshot: Vec<Listener> = match self.listeners.get(&event.kind()) {
            Some(list) => list.iter().map(|(_, l)| Rc::clone(l)).collect(),
            None => return,
        };

        for listener in snapshot {
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                tracing::warn!(event = event.kind().name(), "snap event listener panicked");
            }
        }
    }

    /// 释放所有监听器
    pub fn clear(&mut self) {
        self.listeners.clear();
    }
}
