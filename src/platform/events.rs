//! 事件队列
//!
//! 主机侧监听器入队，计算侧通过 `event-has-pending` / `event-pop` 轮询取出。
//! 事件 id 单调递增、永不复用；弹出顺序严格等于入队顺序（FIFO）。
//!
//! 已弹出的事件保留在有界历史中，计算侧可以按 id 继续查询类型、目标和参数。

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::core::error::{EventError, EventResult};

/// 事件类型（封闭集合，数值即线上编码）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum EventKind {
    Resize = 0,
    Click = 1,
    Change = 2,
    /// 参数: button, isDown, x, y
    PointerButton = 3,
    /// 参数: x, y
    PointerMove = 4,
    /// 参数: sign(dx), sign(dy)
    Wheel = 5,
    AudioBufferNeeded = 6,
    SliderInput = 7,
    FrameTick = 8,
}

impl EventKind {
    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            0 => EventKind::Resize,
            1 => EventKind::Click,
            2 => EventKind::Change,
            3 => EventKind::PointerButton,
            4 => EventKind::PointerMove,
            5 => EventKind::Wheel,
            6 => EventKind::AudioBufferNeeded,
            7 => EventKind::SliderInput,
            8 => EventKind::FrameTick,
            _ => return None,
        })
    }
}

/// 不可变事件记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub kind: EventKind,
    /// 目标元素/资源句柄；全局事件（窗口 resize、frame-tick）为 `None`
    pub target: Option<u32>,
    pub args: Vec<i64>,
}

impl Event {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            target: None,
            args: Vec::new(),
        }
    }

    pub fn targeted(kind: EventKind, target: u32) -> Self {
        Self {
            kind,
            target: Some(target),
            args: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: impl Into<Vec<i64>>) -> Self {
        self.args = args.into();
        self
    }
}

/// 事件 id
pub type EventId = u64;

/// 主机持有的 FIFO 事件队列
#[derive(Debug)]
pub struct EventQueue {
    next_id: EventId,
    records: BTreeMap<EventId, Event>,
    pending: VecDeque<EventId>,
    /// 已弹出、仍可查询的事件（最旧的在前）
    popped: VecDeque<EventId>,
    history_limit: usize,
}

impl EventQueue {
    pub fn new(history_limit: usize) -> Self {
        Self {
            next_id: 0,
            records: BTreeMap::new(),
            pending: VecDeque::new(),
            popped: VecDeque::new(),
            history_limit,
        }
    }

    /// 入队并返回新 id
    pub fn push(&mut self, event: Event) -> EventId {
        let id = self.next_id;
        self.next_id += 1;
        tracing::trace!(target: "bridge::events", id, kind = ?event.kind, target = ?event.target, "Event queued");
        self.records.insert(id, event);
        self.pending.push_back(id);
        id
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// 事件是否仍在队列中等待弹出
    pub fn is_pending(&self, id: EventId) -> bool {
        self.pending.contains(&id)
    }

    /// 弹出最早的待处理事件
    ///
    /// 队列为空时返回 `QueueEmpty`：调用方应先检查 `has_pending`。
    pub fn pop(&mut self) -> EventResult<EventId> {
        let Some(id) = self.pending.pop_front() else {
            tracing::error!(target: "bridge::events", "Popping event even though none is available");
            return Err(EventError::QueueEmpty);
        };
        self.popped.push_back(id);
        while self.popped.len() > self.history_limit {
            if let Some(old) = self.popped.pop_front() {
                self.records.remove(&old);
            }
        }
        Ok(id)
    }

    pub fn get(&self, id: EventId) -> EventResult<&Event> {
        self.records.get(&id).ok_or(EventError::UnknownEvent(id))
    }

    pub fn type_of(&self, id: EventId) -> EventResult<EventKind> {
        Ok(self.get(id)?.kind)
    }

    /// 全局事件没有目标，返回 `NoTarget`
    pub fn target_of(&self, id: EventId) -> EventResult<u32> {
        self.get(id)?.target.ok_or(EventError::NoTarget(id))
    }

    pub fn arg_of(&self, id: EventId, index: usize) -> EventResult<i64> {
        self.get(id)?
            .args
            .get(index)
            .copied()
            .ok_or(EventError::ArgOutOfRange { id, index })
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_pop_empty_is_reported() {
        let mut queue = EventQueue::default();
        assert!(!queue.has_pending());
        assert_eq!(queue.pop(), Err(EventError::QueueEmpty));
    }

    #[test]
    fn test_global_event_has_no_target() {
        let mut queue = EventQueue::default();
        let id = queue.push(Event::new(EventKind::Resize));
        assert_eq!(queue.pop().unwrap(), id);
        assert_eq!(queue.type_of(id).unwrap(), EventKind::Resize);
        assert_eq!(queue.target_of(id), Err(EventError::NoTarget(id)));
    }

    #[test]
    fn test_pointer_args() {
        let mut queue = EventQueue::default();
        let id = queue.push(Event::targeted(EventKind::PointerButton, 3).with_args([0, 1, 10, 20]));
        queue.pop().unwrap();
        assert_eq!(queue.target_of(id).unwrap(), 3);
        assert_eq!(queue.arg_of(id, 3).unwrap(), 20);
        assert_eq!(queue.arg_of(id, 4), Err(EventError::ArgOutOfRange { id, index: 4 }));
    }

    #[test]
    fn test_history_is_bounded() {
        let mut queue = EventQueue::new(2);
        for _ in 0..3 {
            queue.push(Event::new(EventKind::FrameTick));
        }
        for _ in 0..3 {
            queue.pop().unwrap();
        }
        assert_eq!(queue.type_of(0), Err(EventError::UnknownEvent(0)));
        assert!(queue.type_of(1).is_ok());
        assert!(queue.type_of(2).is_ok());
    }

    #[test]
    fn test_event_codes() {
        assert_eq!(EventKind::Wheel.code(), 5);
        assert_eq!(EventKind::from_code(8), Some(EventKind::FrameTick));
        assert_eq!(EventKind::from_code(9), None);
    }

    proptest! {
        // 任意交错的 push/pop 下，id 严格递增且弹出顺序等于入队顺序
        #[test]
        fn fifo_under_interleaving(ops in proptest::collection::vec(any::<bool>(), 1..200)) {
            let mut queue = EventQueue::new(8);
            let mut pushed = Vec::new();
            let mut popped = Vec::new();
            for push in ops {
                if push {
                    let id = queue.push(Event::new(EventKind::FrameTick));
                    if let Some(&last) = pushed.last() {
                        prop_assert!(id > last);
                    }
                    pushed.push(id);
                } else if queue.has_pending() {
                    popped.push(queue.pop().unwrap());
                }
            }
            while queue.has_pending() {
                popped.push(queue.pop().unwrap());
            }
            prop_assert_eq!(pushed, popped);
        }
    }
}
