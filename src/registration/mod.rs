//! Registration engine (spec §4.L): outbound REGISTER bookkeeping for
//! subscribers that don't yet hold a topic id↔name mapping.

use ahash::AHashMap;
use std::time::{Duration, Instant};

use crate::codec::{Addr, ReturnCode};
use crate::error::Trap;
use crate::ids::IdSpace;
use crate::subscriber::SubscriberTable;

#[derive(Debug, Clone)]
pub struct RegisterInfo {
    pub request_time: Instant,
    pub subscriber: Addr,
    pub topic_id: u16,
    pub topic_name: String,
    pub retransmission_counter: u32,
}

#[derive(Debug, Clone)]
pub enum RegistrationAction {
    SendRegister {
        registration_id: u16,
        subscriber: Addr,
        topic_id: u16,
        topic_name: String,
    },
}

/// Keyed by registrationId (the REGISTER `msgId`), spec §4.L.
#[derive(Debug, Default)]
pub struct RegistrationEngine {
    registrations: AHashMap<u16, RegisterInfo>,
    ids: IdSpace,
}

impl RegistrationEngine {
    pub fn new() -> Self {
        Self {
            registrations: AHashMap::new(),
            // registration id space allows UINT16_MAX (spec §3 id allocator contract).
            ids: IdSpace::new(true),
        }
    }

    /// `manageRegistration(sub, topicId)` (spec §4.L). `topic_name` is the
    /// already-decoded (base64 → raw) name from the topic registry.
    pub fn manage_registration(
        &mut self,
        now: Instant,
        subscriber: Addr,
        topic_id: u16,
        topic_name: String,
    ) -> Option<RegistrationAction> {
        let id = self.ids.next_id()?;
        self.ids.reserve(id);
        self.registrations.insert(
            id,
            RegisterInfo {
                request_time: now,
                subscriber,
                topic_id,
                topic_name: topic_name.clone(),
                retransmission_counter: 0,
            },
        );
        Some(RegistrationAction::SendRegister {
            registration_id: id,
            subscriber,
            topic_id,
            topic_name,
        })
    }

    /// Periodic sweep: retransmit until `retransmission_limit`, then drop.
    pub fn sweep(
        &mut self,
        now: Instant,
        retransmission_interval: Duration,
        retransmission_limit: u32,
    ) -> Vec<RegistrationAction> {
        let mut actions = Vec::new();
        let stale: Vec<u16> = self
            .registrations
            .iter()
            .filter(|(_, r)| now.saturating_duration_since(r.request_time) > retransmission_interval)
            .map(|(id, _)| *id)
            .collect();

        for id in stale {
            let reg = self.registrations.get_mut(&id).unwrap();
            if reg.retransmission_counter >= retransmission_limit {
                self.ids.release(id);
                self.registrations.remove(&id);
                continue;
            }
            reg.retransmission_counter += 1;
            reg.request_time = now;
            actions.push(RegistrationAction::SendRegister {
                registration_id: id,
                subscriber: reg.subscriber,
                topic_id: reg.topic_id,
                topic_name: reg.topic_name.clone(),
            });
        }
        actions
    }

    /// REGACK from a subscriber with a known `registration_id` (spec §4.L).
    pub fn on_regack(
        &mut self,
        registration_id: u16,
        topic_id: u16,
        return_code: ReturnCode,
        subs: &mut SubscriberTable,
    ) {
        if topic_id == 0 {
            Trap::RegAckZeroTopicId.raise();
        }
        let Some(reg) = self.registrations.remove(&registration_id) else {
            return;
        };
        self.ids.release(registration_id);

        if return_code != ReturnCode::Accepted {
            subs.unsubscribe(reg.subscriber, reg.topic_id);
            return;
        }
        // Absence is tolerated: the subscription may have been removed
        // while the REGISTER was outstanding (spec §4.L).
        if let Some(info) = subs.get_mut(reg.subscriber) {
            if let Some(topic) = info.subscriber_topics.get_mut(&reg.topic_id) {
                topic.is_registered = true;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::TopicIdType;

    fn addr(n: u16) -> Addr {
        format!("127.0.0.1:{n}").parse().unwrap()
    }

    #[test]
    fn regack_accepted_marks_registered() {
        let mut engine = RegistrationEngine::new();
        let mut subs = SubscriberTable::new();
        subs.subscribe(addr(1), 7, TopicIdType::Normal, crate::codec::QoS::One);

        let now = Instant::now();
        let action = engine
            .manage_registration(now, addr(1), 7, "t".into())
            .unwrap();
        let RegistrationAction::SendRegister { registration_id, .. } = action;

        engine.on_regack(registration_id, 7, ReturnCode::Accepted, &mut subs);
        assert!(
            subs.get(addr(1))
                .unwrap()
                .subscriber_topics
                .get(&7)
                .unwrap()
                .is_registered
        );
    }

    #[test]
    fn regack_rejected_removes_subscription() {
        let mut engine = RegistrationEngine::new();
        let mut subs = SubscriberTable::new();
        subs.subscribe(addr(1), 7, TopicIdType::Normal, crate::codec::QoS::One);

        let now = Instant::now();
        let action = engine
            .manage_registration(now, addr(1), 7, "t".into())
            .unwrap();
        let RegistrationAction::SendRegister { registration_id, .. } = action;

        engine.on_regack(registration_id, 7, ReturnCode::RejectedInvalidTopicId, &mut subs);
        assert_eq!(subs.qos_levels_for(7).count(), 0);
    }

    #[test]
    #[should_panic]
    fn regack_zero_topic_id_traps() {
        let mut engine = RegistrationEngine::new();
        let mut subs = SubscriberTable::new();
        engine.on_regack(1, 0, ReturnCode::Accepted, &mut subs);
    }
}
