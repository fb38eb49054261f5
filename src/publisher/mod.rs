//! Publisher table: will state and inbound QoS-2 staging (spec §3, §4.G).

use ahash::AHashMap;

use bytes::Bytes;

use crate::codec::{Addr, QoS, TagInfo, TopicIdType};

/// Staged QoS-2 inbound payload, keyed by `msgId` (spec §3: `inflightQos2`).
#[derive(Debug, Clone)]
pub struct DataInfo {
    pub topic_id: u16,
    pub topic_id_type: TopicIdType,
    pub retain: bool,
    pub data: Bytes,
    pub tag: Option<TagInfo>,
}

#[derive(Debug, Clone, Default)]
pub struct PublisherInfo {
    pub will: bool,
    pub will_qos: Option<QoS>,
    pub will_retain: bool,
    pub will_topic: Option<String>,
    pub will_msg: Option<Bytes>,
    pub inflight_qos2: AHashMap<u16, DataInfo>,
}

impl PublisherInfo {
    /// Clean-session reset of will fields (spec §4.B, "Publisher: reset will fields").
    pub fn reset_will(&mut self) {
        self.will = false;
        self.will_qos = None;
        self.will_retain = false;
        self.will_topic = None;
        self.will_msg = None;
    }
}

#[derive(Debug, Default)]
pub struct PublisherTable {
    publishers: AHashMap<Addr, PublisherInfo>,
}

impl PublisherTable {
    pub fn new() -> Self {
        Self {
            publishers: AHashMap::new(),
        }
    }

    /// Created lazily on first publish-ish packet (spec §3).
    pub fn get_or_insert(&mut self, addr: Addr) -> &mut PublisherInfo {
        self.publishers.entry(addr).or_default()
    }

    pub fn get(&self, addr: Addr) -> Option<&PublisherInfo> {
        self.publishers.get(&addr)
    }

    pub fn get_mut(&mut self, addr: Addr) -> Option<&mut PublisherInfo> {
        self.publishers.get_mut(&addr)
    }

    pub fn remove(&mut self, addr: Addr) -> Option<PublisherInfo> {
        self.publishers.remove(&addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qos2_inbound_is_staged_by_msg_id() {
        let mut table = PublisherTable::new();
        let addr: Addr = "127.0.0.1:1".parse().unwrap();
        let info = table.get_or_insert(addr);
        info.inflight_qos2.insert(
            5,
            DataInfo {
                topic_id: 1,
                topic_id_type: TopicIdType::Normal,
                retain: false,
                data: Bytes::from_static(b"hi"),
                tag: None,
            },
        );
        assert!(table.get(addr).unwrap().inflight_qos2.contains_key(&5));
    }

    #[test]
    fn clean_session_resets_will_only() {
        let mut info = PublisherInfo::default();
        info.will = true;
        info.will_topic = Some("t".into());
        info.reset_will();
        assert!(!info.will);
        assert!(info.will_topic.is_none());
    }
}
