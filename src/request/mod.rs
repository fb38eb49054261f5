//! Request engine (spec §4.K): one RequestInfo per subscriber-bound
//! deliverable, periodic retransmission sweep, QoS-2 out promotion and
//! awake-drain.
//!
//! Mirrors the inflight/retransmission bookkeeping in
//! `examples/vibesrc-vibemq/src/broker/connection/publish.rs`, but keyed by
//! a dedicated 16-bit request id space instead of per-connection inflight
//! maps, per spec §3's `RequestInfo`/`requestIds` shape.

use ahash::{AHashMap, AHashSet};
use std::time::{Duration, Instant};

use bytes::Bytes;

use crate::client::{ClientState, ClientTable};
use crate::codec::{Addr, QoS, TopicIdType};
use crate::ids::IdSpace;
use crate::message::MessageStore;
use crate::subscriber::SubscriberTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMessageType {
    Publish,
    PubRel,
}

/// Exactly one of `Stored`/`Retained` applies per RequestInfo (spec §3:
/// "exactly one of the two keys is non-zero").
#[derive(Debug, Clone)]
pub enum MessageRef {
    Stored(u16),
    Retained(RetainedSnapshot),
}

#[derive(Debug, Clone)]
pub struct RetainedSnapshot {
    pub topic_id: u16,
    pub topic_id_type: TopicIdType,
    pub qos: QoS,
    pub data: Bytes,
}

#[derive(Debug, Clone)]
pub struct RequestInfo {
    pub request_time: Instant,
    pub subscriber: Addr,
    pub message_type: RequestMessageType,
    pub send_at_least_once: bool,
    pub retransmission_counter: u32,
    pub message_ref: MessageRef,
    pub subscription_topic_id: u16,
    pub subscription_qos: QoS,
    pub dup: bool,
}

/// An effect the engine wants performed by the caller (transport I/O and
/// cross-engine calls); the sweep/promotion methods never touch the
/// transport or registration engine directly.
#[derive(Debug, Clone)]
pub enum RequestAction {
    SendPublish {
        request_id: u16,
        subscriber: Addr,
        dup: bool,
        qos: QoS,
        topic_id: u16,
        topic_id_type: TopicIdType,
        data: Bytes,
    },
    SendPubRel {
        request_id: u16,
        subscriber: Addr,
    },
    KickRegistration {
        subscriber: Addr,
        topic_id: u16,
    },
}

#[derive(Debug, Default)]
pub struct RequestEngine {
    requests: AHashMap<u16, RequestInfo>,
    ids: IdSpace,
}

impl RequestEngine {
    pub fn new() -> Self {
        Self {
            requests: AHashMap::new(),
            // request id space allows UINT16_MAX (spec §3 id allocator contract).
            ids: IdSpace::new(true),
        }
    }

    /// Create a RequestInfo for a QoS 1/2 deliverable. QoS 0/-1 sends
    /// immediately and never calls this (spec §4.K).
    pub fn create(&mut self, now: Instant, info: RequestInfoSeed) -> Option<u16> {
        let id = self.ids.next_id()?;
        self.ids.reserve(id);
        self.requests.insert(
            id,
            RequestInfo {
                request_time: now,
                subscriber: info.subscriber,
                message_type: RequestMessageType::Publish,
                send_at_least_once: true,
                retransmission_counter: 0,
                message_ref: info.message_ref,
                subscription_topic_id: info.subscription_topic_id,
                subscription_qos: info.subscription_qos,
                dup: info.dup,
            },
        );
        Some(id)
    }

    pub fn get(&self, request_id: u16) -> Option<&RequestInfo> {
        self.requests.get(&request_id)
    }

    /// Request id space congestion (spec §8 Boundary: gates QoS 1/2 PUBLISH).
    pub fn congested(&self) -> bool {
        self.ids.congested()
    }

    fn drop_request(&mut self, request_id: u16) {
        self.ids.release(request_id);
        self.requests.remove(&request_id);
    }

    /// Every `mid` currently referenced by a stored (non-retained) request,
    /// used to keep `MessageStore` rows alive (spec §4.J).
    pub fn referenced_message_ids(&self) -> AHashSet<u16> {
        self.requests
            .values()
            .filter_map(|r| match r.message_ref {
                MessageRef::Stored(mid) => Some(mid),
                MessageRef::Retained(_) => None,
            })
            .collect()
    }

    /// PUBREC from a subscriber for `request_id` (spec §4.K "QoS-2 out
    /// promotion"): PUBLISH → PUBREL, counters reset.
    pub fn promote_qos2(&mut self, now: Instant, request_id: u16) -> Option<RequestAction> {
        let req = self.requests.get_mut(&request_id)?;
        if req.message_type != RequestMessageType::Publish {
            return None;
        }
        req.message_type = RequestMessageType::PubRel;
        req.retransmission_counter = 0;
        req.request_time = now;
        Some(RequestAction::SendPubRel {
            request_id,
            subscriber: req.subscriber,
        })
    }

    /// PUBCOMP from a subscriber for `request_id` (spec §4.K).
    pub fn complete(&mut self, request_id: u16) {
        self.drop_request(request_id);
    }

    /// Periodic sweep (spec §4.K steps a-e).
    pub fn sweep(
        &mut self,
        now: Instant,
        retransmission_interval: Duration,
        retransmission_limit: u32,
        clients: &ClientTable,
        subs: &SubscriberTable,
        messages: &MessageStore,
    ) -> Vec<RequestAction> {
        let mut actions = Vec::new();
        let ids: Vec<u16> = self.requests.keys().copied().collect();

        for request_id in ids {
            let Some(req) = self.requests.get(&request_id) else {
                continue;
            };

            // (a) subscriber must be Active or Awake, else stays buffered.
            let subscriber_state = clients.get(req.subscriber).map(|c| c.current_state);
            let Some(state) = subscriber_state else {
                self.drop_request(request_id);
                continue;
            };
            if !matches!(state, ClientState::Active | ClientState::Awake) {
                continue;
            }

            // (c) subscription must still exist.
            let still_subscribed = subs
                .qos_levels_for(req.subscription_topic_id)
                .any(|q| q == req.subscription_qos);
            if !still_subscribed {
                self.drop_request(request_id);
                continue;
            }

            // (d) Active subscriber with an unregistered topic: kick REGISTER.
            if state == ClientState::Active {
                let registered = subs
                    .get(req.subscriber)
                    .and_then(|info| info.subscriber_topics.get(&req.subscription_topic_id))
                    .map(|t| t.is_registered)
                    .unwrap_or(false);
                if !registered {
                    actions.push(RequestAction::KickRegistration {
                        subscriber: req.subscriber,
                        topic_id: req.subscription_topic_id,
                    });
                    continue;
                }
            }

            // (b) resolve MessageInfo.
            let (msg_qos, topic_id, topic_id_type, data) = match &req.message_ref {
                MessageRef::Stored(mid) => {
                    let Some(m) = messages.get(*mid) else {
                        self.drop_request(request_id);
                        continue;
                    };
                    (m.qos, m.topic_id, m.topic_id_type, m.data.clone())
                }
                MessageRef::Retained(snap) => {
                    (snap.qos, snap.topic_id, snap.topic_id_type, snap.data.clone())
                }
            };

            let effective_qos = req.subscription_qos.min(msg_qos);

            if matches!(effective_qos, QoS::MinusOne | QoS::Zero) {
                actions.push(RequestAction::SendPublish {
                    request_id,
                    subscriber: req.subscriber,
                    dup: req.dup,
                    qos: effective_qos,
                    topic_id,
                    topic_id_type,
                    data,
                });
                self.drop_request(request_id);
                continue;
            }

            let req = self.requests.get_mut(&request_id).unwrap();
            if req.send_at_least_once {
                let dup = req.dup;
                req.request_time = now;
                req.send_at_least_once = false;
                match req.message_type {
                    RequestMessageType::Publish => actions.push(RequestAction::SendPublish {
                        request_id,
                        subscriber: req.subscriber,
                        dup,
                        qos: effective_qos,
                        topic_id,
                        topic_id_type,
                        data,
                    }),
                    RequestMessageType::PubRel => actions.push(RequestAction::SendPubRel {
                        request_id,
                        subscriber: req.subscriber,
                    }),
                }
            } else if now.saturating_duration_since(req.request_time) > retransmission_interval {
                if req.retransmission_counter >= retransmission_limit {
                    self.drop_request(request_id);
                    continue;
                }
                req.retransmission_counter += 1;
                req.request_time = now;
                match req.message_type {
                    RequestMessageType::Publish => actions.push(RequestAction::SendPublish {
                        request_id,
                        subscriber: req.subscriber,
                        dup: true,
                        qos: effective_qos,
                        topic_id,
                        topic_id_type,
                        data,
                    }),
                    RequestMessageType::PubRel => actions.push(RequestAction::SendPubRel {
                        request_id,
                        subscriber: req.subscriber,
                    }),
                }
            }
        }

        actions
    }

    /// Whether any live `RequestInfo` still targets `subscriber` (spec
    /// §4.K awake-drain: a subscriber returns to Asleep once this is false).
    pub fn targets(&self, subscriber: Addr) -> bool {
        self.requests.values().any(|r| r.subscriber == subscriber)
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

pub struct RequestInfoSeed {
    pub subscriber: Addr,
    pub message_ref: MessageRef,
    pub subscription_topic_id: u16,
    pub subscription_qos: QoS,
    pub dup: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ClientInfo, ClientType};
    use crate::codec::TopicIdType;

    fn addr(n: u16) -> Addr {
        format!("127.0.0.1:{n}").parse().unwrap()
    }

    #[test]
    fn qos0_sends_immediately_and_drops() {
        let mut engine = RequestEngine::new();
        let mut clients = ClientTable::new(10);
        let mut client = ClientInfo::new("c1".into(), Instant::now());
        client.current_state = ClientState::Active;
        client.client_type = ClientType::Subscriber;
        clients.insert(addr(1), client);

        let mut subs = SubscriberTable::new();
        subs.subscribe(addr(1), 5, TopicIdType::Normal, QoS::Zero);
        subs.get_mut(addr(1)).unwrap().subscriber_topics.get_mut(&5).unwrap().is_registered = true;

        let mut messages = MessageStore::new();
        let mid = messages
            .insert(crate::message::MessageInfo {
                topic_id: 5,
                topic_id_type: TopicIdType::Normal,
                dup: false,
                qos: QoS::Zero,
                retain: false,
                data: Bytes::from_static(b"x"),
                tag: None,
            })
            .unwrap();

        let now = Instant::now();
        engine.create(
            now,
            RequestInfoSeed {
                subscriber: addr(1),
                message_ref: MessageRef::Stored(mid),
                subscription_topic_id: 5,
                subscription_qos: QoS::Zero,
                dup: false,
            },
        );

        let actions = engine.sweep(now, Duration::from_secs(5), 3, &clients, &subs, &messages);
        assert_eq!(actions.len(), 1);
        assert!(matches!(actions[0], RequestAction::SendPublish { .. }));
        assert!(engine.is_empty());
    }

    #[test]
    fn qos2_promotes_to_pubrel_on_pubrec() {
        let mut engine = RequestEngine::new();
        let now = Instant::now();
        let id = engine
            .create(
                now,
                RequestInfoSeed {
                    subscriber: addr(1),
                    message_ref: MessageRef::Stored(1),
                    subscription_topic_id: 5,
                    subscription_qos: QoS::Two,
                    dup: false,
                },
            )
            .unwrap();
        let action = engine.promote_qos2(now, id).unwrap();
        assert!(matches!(action, RequestAction::SendPubRel { .. }));
        assert_eq!(engine.get(id).unwrap().message_type, RequestMessageType::PubRel);
        engine.complete(id);
        assert!(engine.get(id).is_none());
    }
}
