//! Retain store (spec §3, §4.I).

use std::collections::VecDeque;

use ahash::AHashMap;

use bytes::Bytes;

use crate::codec::{Addr, QoS, TopicIdType};

#[derive(Debug, Clone)]
pub struct RetainedMessage {
    pub dup: bool,
    pub qos: QoS,
    pub topic_id_type: TopicIdType,
    pub data: Bytes,
}

/// `retain[topicId]` plus the `retainIds` mirror used for fast congestion
/// tests; here the mirror is implicit in the map's own key set since a plain
/// `HashMap` already gives O(1) membership.
#[derive(Debug, Default)]
pub struct RetainStore {
    retain: AHashMap<u16, RetainedMessage>,
    /// `pendingRetain[(addr,port)]` buffer drained by the pending-retain
    /// timer (spec §4.I). One entry per subscriber; a fresh SUBSCRIBE
    /// overwrites any not-yet-drained entry for that subscriber.
    pending: AHashMap<Addr, VecDeque<PendingRetain>>,
}

#[derive(Debug, Clone)]
pub struct PendingRetain {
    pub topic_id: u16,
    pub subscription_qos: QoS,
}

impl RetainStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `data`, replacing any previous retained payload for the topic
    /// (spec §4.I). Only called for `qos ∈ {0,1,2}`; callers must exclude
    /// `QoS::MinusOne` before calling.
    pub fn store(&mut self, topic_id: u16, msg: RetainedMessage) {
        self.retain.insert(topic_id, msg);
    }

    pub fn get(&self, topic_id: u16) -> Option<&RetainedMessage> {
        self.retain.get(&topic_id)
    }

    pub fn contains(&self, topic_id: u16) -> bool {
        self.retain.contains_key(&topic_id)
    }

    pub fn len(&self) -> usize {
        self.retain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.retain.is_empty()
    }

    /// Retain-id-space congestion (spec §8 Boundary: gates retained PUBLISH).
    /// Retained topic ids are a subset of the topic registry's own id space,
    /// so the same `UINT16_MAX-1` bound applies; a plain length check avoids
    /// standing up a full `IdSpace` (with its `reserve`/`release` trap on id
    /// `0`/`u16::MAX`) for ids that already live in the topic registry.
    pub fn congested(&self) -> bool {
        self.retain.len() as u32 >= (u16::MAX - 1) as u32
    }

    /// Buffer a pending retained delivery for a freshly-subscribed `addr`.
    pub fn enqueue_pending(&mut self, addr: Addr, topic_id: u16, subscription_qos: QoS) {
        self.pending.entry(addr).or_default().push_back(PendingRetain {
            topic_id,
            subscription_qos,
        });
    }

    /// Drain all pending entries across every subscriber (called by the
    /// pending-retain timer).
    pub fn drain_pending(&mut self) -> Vec<(Addr, PendingRetain)> {
        let mut out = Vec::new();
        for (addr, queue) in self.pending.iter_mut() {
            while let Some(entry) = queue.pop_front() {
                out.push((*addr, entry));
            }
        }
        self.pending.retain(|_, q| !q.is_empty());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storing_replaces_previous_payload() {
        let mut store = RetainStore::new();
        store.store(
            1,
            RetainedMessage {
                dup: false,
                qos: QoS::One,
                topic_id_type: TopicIdType::Normal,
                data: Bytes::from_static(b"old"),
            },
        );
        store.store(
            1,
            RetainedMessage {
                dup: false,
                qos: QoS::One,
                topic_id_type: TopicIdType::Normal,
                data: Bytes::from_static(b"new"),
            },
        );
        assert_eq!(store.get(1).unwrap().data, Bytes::from_static(b"new"));
    }

    #[test]
    fn pending_drain_empties_queue() {
        let mut store = RetainStore::new();
        let addr: Addr = "127.0.0.1:1".parse().unwrap();
        store.enqueue_pending(addr, 1, QoS::One);
        store.enqueue_pending(addr, 2, QoS::Zero);
        let drained = store.drain_pending();
        assert_eq!(drained.len(), 2);
        assert!(store.drain_pending().is_empty());
    }
}
