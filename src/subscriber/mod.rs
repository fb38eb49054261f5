//! Subscriber table and subscription index (spec §3), grounded in
//! `examples/vibesrc-vibemq/src/topic/mod.rs`'s subscriber-set-per-filter
//! shape, adapted to MQTT-SN's exact `(topicId, QoS)` keying.

use ahash::{AHashMap, AHashSet};

use crate::clock::TimerHandle;
use crate::codec::{Addr, QoS, TopicIdType};
use crate::error::Trap;

#[derive(Debug, Clone, Copy)]
pub struct SubscribedTopic {
    pub topic_id_type: TopicIdType,
    pub is_registered: bool,
}

#[derive(Debug, Default)]
pub struct SubscriberInfo {
    pub subscriber_topics: AHashMap<u16, SubscribedTopic>,
    pub awaken_check_event: Option<TimerHandle>,
    pub awaken_start_time: Option<std::time::Instant>,
}

#[derive(Debug, Default)]
pub struct SubscriberTable {
    subscribers: AHashMap<Addr, SubscriberInfo>,
    /// `subs: Map<(topicId,QoS) → Set<(addr,port)>>` (spec §3).
    subs: AHashMap<(u16, QoS), AHashSet<Addr>>,
    /// `topicIdToQoS: Map<topicId → Set<QoS>>` (spec §3).
    topic_id_to_qos: AHashMap<u16, AHashSet<QoS>>,
}

impl SubscriberTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, addr: Addr) -> Option<&SubscriberInfo> {
        self.subscribers.get(&addr)
    }

    pub fn get_mut(&mut self, addr: Addr) -> Option<&mut SubscriberInfo> {
        self.subscribers.get_mut(&addr)
    }

    pub fn get_or_insert(&mut self, addr: Addr) -> &mut SubscriberInfo {
        self.subscribers.entry(addr).or_default()
    }

    /// Subscribe `addr` to `(topic_id, qos)`. Re-subscribing with a
    /// different QoS replaces the prior entry for this subscriber on this
    /// topic (spec §3: "at most one (topicId,QoS) entry per subscriber per
    /// topic").
    pub fn subscribe(&mut self, addr: Addr, topic_id: u16, topic_id_type: TopicIdType, qos: QoS) {
        // Remove any existing subscription for this (addr, topic_id) pair
        // under a different QoS before inserting the new one.
        for existing_qos in self.topic_id_to_qos.get(&topic_id).cloned().unwrap_or_default() {
            if existing_qos == qos {
                continue;
            }
            if let Some(set) = self.subs.get_mut(&(topic_id, existing_qos)) {
                if set.remove(&addr) && set.is_empty() {
                    self.subs.remove(&(topic_id, existing_qos));
                    if let Some(qs) = self.topic_id_to_qos.get_mut(&topic_id) {
                        qs.remove(&existing_qos);
                        if qs.is_empty() {
                            self.topic_id_to_qos.remove(&topic_id);
                        }
                    }
                }
            }
        }

        self.subs.entry((topic_id, qos)).or_default().insert(addr);
        self.topic_id_to_qos.entry(topic_id).or_default().insert(qos);

        self.get_or_insert(addr).subscriber_topics.insert(
            topic_id,
            SubscribedTopic {
                topic_id_type,
                is_registered: false,
            },
        );
        self.check_invariant();
    }

    pub fn unsubscribe(&mut self, addr: Addr, topic_id: u16) {
        let qoses: Vec<QoS> = self
            .topic_id_to_qos
            .get(&topic_id)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default();
        for qos in qoses {
            if let Some(set) = self.subs.get_mut(&(topic_id, qos)) {
                if set.remove(&addr) && set.is_empty() {
                    self.subs.remove(&(topic_id, qos));
                    if let Some(qs) = self.topic_id_to_qos.get_mut(&topic_id) {
                        qs.remove(&qos);
                        if qs.is_empty() {
                            self.topic_id_to_qos.remove(&topic_id);
                        }
                    }
                }
            }
        }
        if let Some(info) = self.subscribers.get_mut(&addr) {
            info.subscriber_topics.remove(&topic_id);
        }
        self.check_invariant();
    }

    /// Delete every subscription held by `addr` (spec §4.B clean-session path).
    pub fn remove_all_subscriptions(&mut self, addr: Addr) {
        let topic_ids: Vec<u16> = self
            .subscribers
            .get(&addr)
            .map(|info| info.subscriber_topics.keys().copied().collect())
            .unwrap_or_default();
        for topic_id in topic_ids {
            self.unsubscribe(addr, topic_id);
        }
    }

    /// Mark every subscribed topic `isRegistered=false` (spec §4.B: non-clean
    /// reconnect of a subscriber forces a fresh REGISTER before delivery).
    pub fn unregister_all(&mut self, addr: Addr) {
        if let Some(info) = self.subscribers.get_mut(&addr) {
            for topic in info.subscriber_topics.values_mut() {
                topic.is_registered = false;
            }
        }
    }

    pub fn remove(&mut self, addr: Addr) -> Option<SubscriberInfo> {
        self.remove_all_subscriptions(addr);
        self.subscribers.remove(&addr)
    }

    /// Subscribers of `(topic_id, qos)`, used by dispatch (spec §4.M step 2).
    pub fn subscribers_of(&self, topic_id: u16, qos: QoS) -> impl Iterator<Item = Addr> + '_ {
        self.subs
            .get(&(topic_id, qos))
            .into_iter()
            .flat_map(|set| set.iter().copied())
    }

    /// All `(topicId, q)` pairs subscribed for `topic_id` (spec §4.M step 1).
    pub fn qos_levels_for(&self, topic_id: u16) -> impl Iterator<Item = QoS> + '_ {
        self.topic_id_to_qos
            .get(&topic_id)
            .into_iter()
            .flat_map(|set| set.iter().copied())
    }

    fn check_invariant(&self) {
        for ((topic_id, qos), set) in &self.subs {
            if set.is_empty() {
                Trap::RequestKeyInvariantViolated.raise();
            }
            match self.topic_id_to_qos.get(topic_id) {
                Some(qs) if qs.contains(qos) => {}
                _ => Trap::RequestKeyInvariantViolated.raise(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u16) -> Addr {
        format!("127.0.0.1:{n}").parse().unwrap()
    }

    #[test]
    fn resubscribe_with_new_qos_replaces_old_entry() {
        let mut subs = SubscriberTable::new();
        subs.subscribe(addr(1), 10, TopicIdType::Normal, QoS::Zero);
        subs.subscribe(addr(1), 10, TopicIdType::Normal, QoS::One);
        let at_zero: Vec<_> = subs.subscribers_of(10, QoS::Zero).collect();
        let at_one: Vec<_> = subs.subscribers_of(10, QoS::One).collect();
        assert!(at_zero.is_empty());
        assert_eq!(at_one, vec![addr(1)]);
    }

    #[test]
    fn removing_last_subscriber_prunes_both_indexes() {
        let mut subs = SubscriberTable::new();
        subs.subscribe(addr(1), 10, TopicIdType::Normal, QoS::One);
        subs.unsubscribe(addr(1), 10);
        assert_eq!(subs.qos_levels_for(10).count(), 0);
    }

    #[test]
    fn clean_session_removes_all_subscriptions() {
        let mut subs = SubscriberTable::new();
        subs.subscribe(addr(1), 10, TopicIdType::Normal, QoS::One);
        subs.subscribe(addr(1), 11, TopicIdType::Normal, QoS::Zero);
        subs.remove_all_subscriptions(addr(1));
        assert!(subs.get(addr(1)).unwrap().subscriber_topics.is_empty());
        assert_eq!(subs.qos_levels_for(10).count(), 0);
        assert_eq!(subs.qos_levels_for(11).count(), 0);
    }
}
