//! Message store (spec §3, §4.J): the shared, reference-counted-by-requests
//! payload table behind QoS-1/2 fan-out (spec §4.M "message store economy").

use ahash::{AHashMap, AHashSet};
use bytes::Bytes;

use crate::codec::{QoS, TagInfo, TopicIdType};
use crate::error::Trap;
use crate::ids::IdSpace;

#[derive(Debug, Clone)]
pub struct MessageInfo {
    pub topic_id: u16,
    pub topic_id_type: TopicIdType,
    pub dup: bool,
    pub qos: QoS,
    pub retain: bool,
    pub data: Bytes,
    pub tag: Option<TagInfo>,
}

/// `messages[mid] → MessageInfo`, `messageIds` mirror (spec §3).
#[derive(Debug, Default)]
pub struct MessageStore {
    messages: AHashMap<u16, MessageInfo>,
    ids: IdSpace,
}

impl MessageStore {
    pub fn new() -> Self {
        Self {
            messages: AHashMap::new(),
            // Message id space allows UINT16_MAX (spec §3 id allocator contract).
            ids: IdSpace::new(true),
        }
    }

    /// Allocate a fresh message id and store `info`. Called at most once per
    /// inbound PUBLISH via the caller's `isMessageAdded` latch (spec §4.M).
    pub fn insert(&mut self, info: MessageInfo) -> Option<u16> {
        let mid = self.ids.next_id()?;
        self.ids.reserve(mid);
        self.messages.insert(mid, info);
        self.check_invariant();
        Some(mid)
    }

    pub fn get(&self, mid: u16) -> Option<&MessageInfo> {
        self.messages.get(&mid)
    }

    /// Message id space congestion (spec §8 Boundary: gates QoS 1/2 PUBLISH).
    pub fn congested(&self) -> bool {
        self.ids.congested()
    }

    pub fn remove(&mut self, mid: u16) -> Option<MessageInfo> {
        self.ids.release(mid);
        let removed = self.messages.remove(&mid);
        self.check_invariant();
        removed
    }

    /// Sweep unreferenced rows (spec §4.J): drop every `mid` with no entry
    /// in `referenced`.
    pub fn sweep(&mut self, referenced: &AHashSet<u16>) {
        let stale: Vec<u16> = self
            .messages
            .keys()
            .copied()
            .filter(|mid| !referenced.contains(mid))
            .collect();
        for mid in stale {
            self.remove(mid);
        }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    fn check_invariant(&self) {
        if self.messages.len() != self.ids.len() {
            Trap::MessageStoreMirrorMismatch.raise();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MessageInfo {
        MessageInfo {
            topic_id: 1,
            topic_id_type: TopicIdType::Normal,
            dup: false,
            qos: QoS::One,
            retain: false,
            data: Bytes::from_static(b"x"),
            tag: None,
        }
    }

    #[test]
    fn sweep_drops_unreferenced_rows() {
        let mut store = MessageStore::new();
        let mid1 = store.insert(sample()).unwrap();
        let mid2 = store.insert(sample()).unwrap();
        let mut referenced = AHashSet::new();
        referenced.insert(mid1);
        store.sweep(&referenced);
        assert!(store.get(mid1).is_some());
        assert!(store.get(mid2).is_none());
    }

    #[test]
    fn removed_ids_are_freed_for_reuse() {
        let mut store = MessageStore::new();
        let mid = store.insert(sample()).unwrap();
        store.remove(mid);
        assert_eq!(store.len(), 0);
    }
}
