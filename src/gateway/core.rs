//! Gateway core state and packet router (spec §4.B/F/G/I/K/L/M, §5).
//!
//! One `GatewayCore` per gateway process. Every method here is synchronous
//! and mutates only its own tables — the single-threaded cooperative model
//! from spec §5 is enforced by construction: nothing here awaits.

use ahash::AHashSet;
use std::time::{Duration, Instant};

use bytes::Bytes;

use crate::client::{ClientInfo, ClientState, ClientTable, ClientType, PreconditionClass};
use crate::codec::*;
use crate::config::Config;
use crate::dispatch::{self, FanoutAction};
use crate::message::{MessageInfo, MessageStore};
use crate::metrics::GatewayMetrics;
use crate::publisher::{DataInfo, PublisherTable};
use crate::registration::{RegistrationAction, RegistrationEngine};
use crate::request::{MessageRef, RequestAction, RequestEngine, RequestInfoSeed, RetainedSnapshot};
use crate::retain::{RetainStore, RetainedMessage};
use crate::subscriber::SubscriberTable;
use crate::topic::{RegisterTopicError, TopicRegistry};

use super::{GatewayState, Outbound};

pub struct GatewayCore {
    pub config: Config,
    pub state: GatewayState,
    pub metrics: GatewayMetrics,

    clients: ClientTable,
    publishers: PublisherTable,
    subscribers: SubscriberTable,
    topics: TopicRegistry,
    retain: RetainStore,
    messages: MessageStore,
    requests: RequestEngine,
    registrations: RegistrationEngine,
}

impl GatewayCore {
    pub fn new(config: Config) -> Self {
        let mut topics = TopicRegistry::new();
        topics.seed_predefined(&config.topics.predefined);
        Self {
            state: GatewayState::Offline,
            metrics: GatewayMetrics::new(),
            clients: ClientTable::new(config.limits.maximum_clients),
            publishers: PublisherTable::new(),
            subscribers: SubscriberTable::new(),
            topics,
            retain: RetainStore::new(),
            messages: MessageStore::new(),
            requests: RequestEngine::new(),
            registrations: RegistrationEngine::new(),
            config,
        }
    }

    pub(super) fn client_state(&self, addr: Addr) -> ClientState {
        self.clients
            .get(addr)
            .map(|c| c.current_state)
            .unwrap_or(ClientState::Disconnected)
    }

    fn precondition_for(packet: &Packet) -> PreconditionClass {
        match packet {
            Packet::SearchGw(_) | Packet::Connect(_) => PreconditionClass::None,
            Packet::Publish(p) if p.qos == QoS::MinusOne => PreconditionClass::None,
            Packet::WillTopic(_)
            | Packet::WillTopicUpd(_)
            | Packet::WillMsg(_)
            | Packet::WillMsgUpd(_)
            | Packet::PingResp(_)
            | Packet::Register(_)
            | Packet::Publish(_)
            | Packet::PubRel(_)
            | Packet::Subscribe(_)
            | Packet::Unsubscribe(_)
            | Packet::RegAck(_) => PreconditionClass::Active,
            Packet::PubAck(_) | Packet::PubRec(_) | Packet::PubComp(_) => {
                PreconditionClass::ActiveOrAwake
            }
            Packet::PingReq(_) | Packet::Disconnect(_) => PreconditionClass::ActiveOrAsleep,
            // Gateway-originated types never arrive inbound; treat as no
            // precondition so the router can drop them itself below.
            _ => PreconditionClass::None,
        }
    }

    /// Route one decoded inbound packet (spec §4.F precondition table, then
    /// per-type handler).
    pub fn handle_packet(&mut self, now: Instant, addr: Addr, packet: Packet) -> Vec<Outbound> {
        let class = Self::precondition_for(&packet);
        let state = self.client_state(addr);
        if !class.allows(state) {
            return Vec::new();
        }

        let out = match packet {
            Packet::SearchGw(p) => self.handle_search_gw(addr, p),
            Packet::Connect(p) => self.handle_connect(now, addr, p),
            Packet::WillTopic(p) => self.handle_will_topic(addr, p),
            Packet::WillMsg(p) => self.handle_will_msg(addr, p),
            Packet::WillTopicUpd(p) => self.handle_will_topic_upd(addr, p),
            Packet::WillMsgUpd(p) => self.handle_will_msg_upd(addr, p),
            Packet::Register(p) => self.handle_register(addr, p),
            Packet::RegAck(p) => self.handle_regack(p),
            Packet::Publish(p) => self.handle_publish(now, addr, p),
            Packet::PubAck(p) => self.handle_puback(p),
            Packet::PubRec(p) => self.handle_pubrec(now, p),
            Packet::PubRel(p) => self.handle_pubrel(now, addr, p),
            Packet::PubComp(p) => self.handle_pubcomp(p),
            Packet::Subscribe(p) => self.handle_subscribe(addr, p),
            Packet::Unsubscribe(p) => self.handle_unsubscribe(addr, p),
            Packet::PingReq(p) => self.handle_pingreq(now, addr, p),
            Packet::PingResp(_) => self.handle_pingresp(addr),
            Packet::Disconnect(p) => self.handle_disconnect(addr, p),
            // WILLTOPICREQ/WILLMSGREQ/CONNACK/WILLTOPICRESP/WILLMSGRESP/
            // SUBACK/UNSUBACK/ADVERTISE/GWINFO are gateway-originated;
            // receiving one inbound is a protocol violation (spec §7: drop).
            _ => Vec::new(),
        };

        if let Some(info) = self.clients.get_mut(addr) {
            info.touch(now);
        }
        out
    }

    fn handle_search_gw(&self, addr: Addr, _p: SearchGw) -> Vec<Outbound> {
        if self.state != GatewayState::Online {
            return Vec::new();
        }
        vec![Outbound::Unicast(
            addr,
            Packet::GwInfo(GwInfo {
                gateway_id: self.config.server.gateway_id,
            }),
        )]
    }

    /// CONNECT path (spec §4.B/).
    fn handle_connect(&mut self, now: Instant, addr: Addr, pkt: Connect) -> Vec<Outbound> {
        if pkt.protocol_id != 0x01 {
            return vec![conn_ack(addr, ReturnCode::RejectedNotSupported)];
        }

        if let Some(existing) = self.clients.get(addr) {
            if existing.client_id != pkt.client_id {
                return vec![conn_ack(addr, ReturnCode::RejectedNotSupported)];
            }
        }

        let is_new = self.clients.get(addr).is_none();

        if pkt.clean_session {
            match self.clients.get(addr).map(|c| c.client_type) {
                Some(ClientType::Publisher) => {
                    if let Some(info) = self.publishers.get_mut(addr) {
                        info.reset_will();
                    }
                }
                Some(ClientType::Subscriber) => self.subscribers.remove_all_subscriptions(addr),
                Some(ClientType::Unknown) | None => {}
            }
        } else if self.clients.get(addr).map(|c| c.client_type) == Some(ClientType::Subscriber) {
            self.subscribers.unregister_all(addr);
        }

        if is_new {
            if self.clients.congested() {
                GatewayMetrics::inc(&self.metrics.connects_rejected);
                return vec![conn_ack(addr, ReturnCode::RejectedCongestion)];
            }
            self.clients.insert(addr, ClientInfo::new(pkt.client_id.clone(), now));
        }

        let info = self.clients.get_mut(addr).expect("just inserted or pre-existing");
        info.keep_alive_duration = Duration::from_secs(pkt.duration_secs as u64);
        info.current_state = ClientState::Active;
        info.sent_ping_req = false;
        info.touch(now);
        GatewayMetrics::inc(&self.metrics.connects_accepted);

        if pkt.will {
            vec![Outbound::Unicast(addr, Packet::WillTopicReq(WillTopicReq))]
        } else {
            vec![conn_ack(addr, ReturnCode::Accepted)]
        }
    }

    fn handle_will_topic(&mut self, addr: Addr, pkt: WillTopic) -> Vec<Outbound> {
        let info = self.publishers.get_or_insert(addr);
        info.will = true;
        info.will_qos = Some(pkt.qos);
        info.will_retain = pkt.retain;
        info.will_topic = Some(pkt.will_topic);
        vec![Outbound::Unicast(addr, Packet::WillMsgReq(WillMsgReq))]
    }

    fn handle_will_msg(&mut self, addr: Addr, pkt: WillMsg) -> Vec<Outbound> {
        let info = self.publishers.get_or_insert(addr);
        info.will_msg = Some(pkt.will_msg);
        vec![conn_ack(addr, ReturnCode::Accepted)]
    }

    fn handle_will_topic_upd(&mut self, addr: Addr, pkt: WillTopicUpd) -> Vec<Outbound> {
        let info = self.publishers.get_or_insert(addr);
        info.will = true;
        info.will_qos = Some(pkt.qos);
        info.will_retain = pkt.retain;
        info.will_topic = Some(pkt.will_topic);
        vec![Outbound::Unicast(
            addr,
            Packet::WillTopicResp(WillTopicResp {
                return_code: ReturnCode::Accepted,
            }),
        )]
    }

    fn handle_will_msg_upd(&mut self, addr: Addr, pkt: WillMsgUpd) -> Vec<Outbound> {
        let info = self.publishers.get_or_insert(addr);
        info.will_msg = Some(pkt.will_msg);
        vec![Outbound::Unicast(
            addr,
            Packet::WillMsgResp(WillMsgResp {
                return_code: ReturnCode::Accepted,
            }),
        )]
    }

    /// Inbound REGISTER from a publisher announcing a topic name (spec §4.D).
    fn handle_register(&mut self, addr: Addr, pkt: Register) -> Vec<Outbound> {
        if let Some(info) = self.clients.get_mut(addr) {
            info.promote(ClientType::Publisher);
        }
        match self.topics.register_topic(&pkt.topic_name) {
            Ok((topic_id, _created)) => vec![Outbound::Unicast(
                addr,
                Packet::RegAck(RegAck {
                    topic_id,
                    msg_id: pkt.msg_id,
                    return_code: ReturnCode::Accepted,
                }),
            )],
            Err(RegisterTopicError::Congested) => vec![Outbound::Unicast(
                addr,
                Packet::RegAck(RegAck {
                    topic_id: 0,
                    msg_id: pkt.msg_id,
                    return_code: ReturnCode::RejectedCongestion,
                }),
            )],
            Err(RegisterTopicError::InvalidName) => vec![Outbound::Unicast(
                addr,
                Packet::RegAck(RegAck {
                    topic_id: 0,
                    msg_id: pkt.msg_id,
                    return_code: ReturnCode::RejectedInvalidTopicId,
                }),
            )],
        }
    }

    /// Inbound REGACK from a subscriber for a gateway-initiated REGISTER (spec §4.L).
    fn handle_regack(&mut self, pkt: RegAck) -> Vec<Outbound> {
        self.registrations
            .on_regack(pkt.msg_id, pkt.topic_id, pkt.return_code, &mut self.subscribers);
        Vec::new()
    }

    /// Resolve a PUBLISH/SUBSCRIBE topic reference to a numeric topic id,
    /// per the SHORT-name wire convention (spec §3/§6: the 2 raw octets of
    /// a SHORT name travel directly as the numeric topic id).
    fn resolve_publish_topic(&self, pkt: &Publish) -> Option<(u16, TopicIdType)> {
        match pkt.topic_id_type {
            TopicIdType::Short => Some((pkt.topic_id, TopicIdType::Short)),
            TopicIdType::Normal | TopicIdType::Predefined => {
                self.topics.lookup_by_id(pkt.topic_id).map(|info| (pkt.topic_id, info.topic_id_type))
            }
        }
    }

    fn handle_publish(&mut self, now: Instant, addr: Addr, pkt: Publish) -> Vec<Outbound> {
        if pkt.qos == QoS::MinusOne {
            return self.dispatch_publish(now, pkt.topic_id, TopicIdType::Predefined, pkt.retain, pkt.qos, pkt.dup, pkt.data);
        }

        if let Some(info) = self.clients.get_mut(addr) {
            info.promote(ClientType::Publisher);
        }
        GatewayMetrics::inc(&self.metrics.publishes_received);

        let Some((topic_id, topic_id_type)) = self.resolve_publish_topic(&pkt) else {
            return vec![pub_ack(addr, pkt.topic_id, pkt.msg_id, ReturnCode::RejectedInvalidTopicId)];
        };

        if self.publish_congested(pkt.retain, pkt.qos) {
            return vec![pub_ack(addr, topic_id, pkt.msg_id, ReturnCode::RejectedCongestion)];
        }

        match pkt.qos {
            QoS::Two => {
                if pkt.msg_id == 0 {
                    return vec![pub_ack(addr, topic_id, 0, ReturnCode::RejectedNotSupported)];
                }
                let publisher = self.publishers.get_or_insert(addr);
                publisher.inflight_qos2.insert(
                    pkt.msg_id,
                    DataInfo {
                        topic_id,
                        topic_id_type,
                        retain: pkt.retain,
                        data: pkt.data,
                        tag: pkt.tag,
                    },
                );
                vec![Outbound::Unicast(addr, Packet::PubRec(PubRec { msg_id: pkt.msg_id }))]
            }
            QoS::One => {
                let mut out =
                    self.dispatch_publish(now, topic_id, topic_id_type, pkt.retain, pkt.qos, pkt.dup, pkt.data);
                out.push(pub_ack(addr, topic_id, pkt.msg_id, ReturnCode::Accepted));
                out
            }
            QoS::Zero => {
                self.dispatch_publish(now, topic_id, topic_id_type, pkt.retain, pkt.qos, pkt.dup, pkt.data)
            }
            QoS::MinusOne => unreachable!("handled above"),
        }
    }

    /// PUBREL from the *publisher* completing its own QoS-2 inbound publish
    /// (spec §4.G): dispatched exactly once, regardless of duplicate PUBREL.
    fn handle_pubrel(&mut self, now: Instant, addr: Addr, pkt: PubRel) -> Vec<Outbound> {
        let mut out = Vec::new();
        if let Some(publisher) = self.publishers.get_mut(addr) {
            if let Some(data) = publisher.inflight_qos2.remove(&pkt.msg_id) {
                out = self.dispatch_publish(
                    now,
                    data.topic_id,
                    data.topic_id_type,
                    data.retain,
                    QoS::Two,
                    false,
                    data.data,
                );
            }
        }
        out.push(Outbound::Unicast(addr, Packet::PubComp(PubComp { msg_id: pkt.msg_id })));
        out
    }

    /// PUBACK from a *subscriber* acking a gateway-delivered QoS-1 PUBLISH.
    fn handle_puback(&mut self, pkt: PubAck) -> Vec<Outbound> {
        self.requests.complete(pkt.msg_id);
        Vec::new()
    }

    /// PUBREC from a *subscriber* acking a gateway-delivered QoS-2 PUBLISH
    /// (spec §4.K "QoS-2 out promotion").
    fn handle_pubrec(&mut self, now: Instant, pkt: PubRec) -> Vec<Outbound> {
        match self.requests.promote_qos2(now, pkt.msg_id) {
            Some(RequestAction::SendPubRel { subscriber, .. }) => {
                vec![Outbound::Unicast(subscriber, Packet::PubRel(PubRel { msg_id: pkt.msg_id }))]
            }
            _ => Vec::new(),
        }
    }

    /// PUBCOMP from a *subscriber* completing a gateway-delivered QoS-2 PUBLISH.
    fn handle_pubcomp(&mut self, pkt: PubComp) -> Vec<Outbound> {
        self.requests.complete(pkt.msg_id);
        Vec::new()
    }

    /// `checkPublishCongestion` (spec §8 Boundary): retain-id-space
    /// congestion gates on the `retain` flag regardless of QoS; message/
    /// request-id-space congestion gates only on QoS 1/2. Does not apply to
    /// the connection-less QoS -1 path, which never reaches this point.
    fn publish_congested(&self, retain: bool, qos: QoS) -> bool {
        if retain && self.retain.congested() {
            return true;
        }
        matches!(qos, QoS::One | QoS::Two) && (self.requests.congested() || self.messages.congested())
    }

    /// Dispatch fan-out for a message whose payload is already decoded
    /// (spec §4.M). Called for QoS 0/1/-1 at inbound time and for QoS 2 at
    /// PUBREL time.
    fn dispatch_publish(
        &mut self,
        now: Instant,
        topic_id: u16,
        topic_id_type: TopicIdType,
        retain: bool,
        qos: QoS,
        dup: bool,
        data: Bytes,
    ) -> Vec<Outbound> {
        if retain && qos != QoS::MinusOne {
            self.retain.store(
                topic_id,
                RetainedMessage {
                    dup,
                    qos,
                    topic_id_type,
                    data: data.clone(),
                },
            );
        }

        let targets = dispatch::resolve_targets(topic_id, qos, &self.clients, &self.subscribers);
        let needs_row = dispatch::needs_message_row(&targets);
        let mid = if needs_row {
            self.messages.insert(MessageInfo {
                topic_id,
                topic_id_type,
                dup,
                qos,
                retain,
                data: data.clone(),
                tag: None,
            })
        } else {
            None
        };

        let mut out = Vec::new();
        for target in &targets {
            if target.action == FanoutAction::Skip {
                continue;
            }
            // Only a registered, already-deliverable target sends straight
            // on the wire; RegisterThenBuffer (needs a REGISTER/REGACK round
            // trip first) and Buffer (Asleep) always defer through the
            // request engine, regardless of effective QoS (spec §4.M).
            if target.action == FanoutAction::AddAndSend
                && matches!(target.effective_qos, QoS::MinusOne | QoS::Zero)
            {
                out.push(Outbound::Unicast(
                    target.subscriber,
                    Packet::Publish(Publish {
                        dup,
                        qos: target.effective_qos,
                        retain,
                        topic_id_type,
                        topic_id,
                        msg_id: 0,
                        data: data.clone(),
                        tag: None,
                    }),
                ));
            } else if let Some(mid) = mid {
                self.requests.create(
                    now,
                    RequestInfoSeed {
                        subscriber: target.subscriber,
                        message_ref: MessageRef::Stored(mid),
                        subscription_topic_id: topic_id,
                        subscription_qos: target.subscription_qos,
                        dup,
                    },
                );
            }
        }
        if needs_row {
            GatewayMetrics::inc(&self.metrics.publishes_dispatched);
        }
        out
    }

    fn handle_subscribe(&mut self, addr: Addr, pkt: Subscribe) -> Vec<Outbound> {
        if let Some(info) = self.clients.get_mut(addr) {
            info.promote(ClientType::Subscriber);
        }

        let resolved = match &pkt.topic {
            SubscribeTopic::Predefined(id) => match self
                .topics
                .lookup_by_id(*id)
                .filter(|info| info.topic_id_type == TopicIdType::Predefined)
            {
                Some(info) => Ok((*id, info.topic_id_type)),
                None => Err(ReturnCode::RejectedInvalidTopicId),
            },
            SubscribeTopic::Name(name) if name.len() == 2 => {
                let bytes = name.as_bytes();
                Ok((u16::from_be_bytes([bytes[0], bytes[1]]), TopicIdType::Short))
            }
            SubscribeTopic::Name(name) => match self.topics.register_topic(name) {
                Ok((id, _)) => Ok((id, TopicIdType::Normal)),
                Err(RegisterTopicError::Congested) => Err(ReturnCode::RejectedCongestion),
                Err(RegisterTopicError::InvalidName) => Err(ReturnCode::RejectedInvalidTopicId),
            },
        };

        let (topic_id, topic_id_type) = match resolved {
            Ok(pair) => pair,
            Err(return_code) => {
                return vec![Outbound::Unicast(
                    addr,
                    Packet::SubAck(SubAck {
                        qos: pkt.qos,
                        topic_id: 0,
                        msg_id: pkt.msg_id,
                        return_code,
                    }),
                )]
            }
        };

        self.subscribers.subscribe(addr, topic_id, topic_id_type, pkt.qos);

        if self.retain.contains(topic_id) {
            self.retain.enqueue_pending(addr, topic_id, pkt.qos);
        }

        vec![Outbound::Unicast(
            addr,
            Packet::SubAck(SubAck {
                qos: pkt.qos,
                topic_id,
                msg_id: pkt.msg_id,
                return_code: ReturnCode::Accepted,
            }),
        )]
    }

    fn handle_unsubscribe(&mut self, addr: Addr, pkt: Unsubscribe) -> Vec<Outbound> {
        let topic_id = match &pkt.topic {
            SubscribeTopic::Predefined(id) => Some(*id),
            SubscribeTopic::Name(name) if name.len() == 2 => {
                let bytes = name.as_bytes();
                Some(u16::from_be_bytes([bytes[0], bytes[1]]))
            }
            SubscribeTopic::Name(name) => self.topics.lookup_by_name(name),
        };
        if let Some(id) = topic_id {
            self.subscribers.unsubscribe(addr, id);
        }
        vec![Outbound::Unicast(addr, Packet::UnsubAck(UnsubAck { msg_id: pkt.msg_id }))]
    }

    /// PINGREQ (spec §4.F/§4.K awake-drain).
    fn handle_pingreq(&mut self, now: Instant, addr: Addr, pkt: PingReq) -> Vec<Outbound> {
        let Some(info) = self.clients.get_mut(addr) else {
            return Vec::new();
        };
        let matches_client_id = pkt.client_id.as_deref() == Some(info.client_id.as_str());
        if info.current_state == ClientState::Asleep
            && matches_client_id
            && info.client_type == ClientType::Subscriber
        {
            info.current_state = ClientState::Awake;
            if let Some(sub) = self.subscribers.get_mut(addr) {
                sub.awaken_start_time = Some(now);
            }
            return Vec::new();
        }
        vec![Outbound::Unicast(addr, Packet::PingResp(PingResp))]
    }

    fn handle_pingresp(&mut self, addr: Addr) -> Vec<Outbound> {
        if let Some(info) = self.clients.get_mut(addr) {
            info.sent_ping_req = false;
        }
        Vec::new()
    }

    fn handle_disconnect(&mut self, addr: Addr, pkt: Disconnect) -> Vec<Outbound> {
        let Some(info) = self.clients.get_mut(addr) else {
            return Vec::new();
        };
        match pkt.duration_secs {
            Some(d) if d > 0 => {
                info.current_state = ClientState::Asleep;
                info.sleep_duration = Duration::from_secs(d as u64);
            }
            _ => info.current_state = ClientState::Disconnected,
        }
        vec![Outbound::Unicast(addr, Packet::Disconnect(Disconnect { duration_secs: pkt.duration_secs }))]
    }

    // --- periodic sweeps, invoked from gateway::timers ---

    /// `activeClientsCheck` (spec §4.N): solicit a keep-alive PINGREQ once a
    /// client goes quiet past `keepAliveDuration`, then mark it Lost if it
    /// stays quiet past a second interval without answering.
    pub fn sweep_active_clients(&mut self, now: Instant) -> Vec<Outbound> {
        let mut out = Vec::new();
        let keep_alive_due: Vec<Addr> = self
            .clients
            .iter()
            .filter(|(_, c)| {
                c.current_state == ClientState::Active
                    && now.saturating_duration_since(c.last_received_at) > c.keep_alive_duration
            })
            .map(|(addr, _)| *addr)
            .collect();
        for addr in keep_alive_due {
            let info = self.clients.get_mut(addr).unwrap();
            if !info.sent_ping_req {
                info.sent_ping_req = true;
                out.push(Outbound::Unicast(addr, Packet::PingReq(PingReq { client_id: None })));
            } else {
                info.current_state = ClientState::Lost;
            }
        }
        out
    }

    /// `asleepClientsCheck` (spec §4.N): an Asleep client that never returns
    /// within its advertised `sleepDuration` is marked Lost.
    pub fn sweep_asleep_clients(&mut self, now: Instant) {
        let asleep_expired: Vec<Addr> = self
            .clients
            .iter()
            .filter(|(_, c)| {
                c.current_state == ClientState::Asleep
                    && now.saturating_duration_since(c.last_received_at) > c.sleep_duration
            })
            .map(|(addr, _)| *addr)
            .collect();
        for addr in asleep_expired {
            self.clients.get_mut(addr).unwrap().current_state = ClientState::Lost;
        }
    }

    /// `pendingRetainCheck` (spec §4.I): drain buffered retained deliveries.
    /// QoS 0/-1 sends straight on the wire; QoS 1/2 goes through the request
    /// engine via `MessageRef::Retained` so it gets the same ack tracking,
    /// retransmission and subscriber-state gating as a live publish.
    pub fn sweep_pending_retain(&mut self, now: Instant) -> Vec<Outbound> {
        let mut out = Vec::new();
        for (addr, pending) in self.retain.drain_pending() {
            let Some(retained) = self.retain.get(pending.topic_id) else {
                continue;
            };
            let effective_qos = pending.subscription_qos.min(retained.qos);
            match effective_qos {
                QoS::MinusOne | QoS::Zero => out.push(Outbound::Unicast(
                    addr,
                    Packet::Publish(Publish {
                        dup: retained.dup,
                        qos: effective_qos,
                        retain: true,
                        topic_id_type: retained.topic_id_type,
                        topic_id: pending.topic_id,
                        msg_id: 0,
                        data: retained.data.clone(),
                        tag: None,
                    }),
                )),
                QoS::One | QoS::Two => {
                    self.requests.create(
                        now,
                        RequestInfoSeed {
                            subscriber: addr,
                            message_ref: MessageRef::Retained(RetainedSnapshot {
                                topic_id: pending.topic_id,
                                topic_id_type: retained.topic_id_type,
                                qos: retained.qos,
                                data: retained.data.clone(),
                            }),
                            subscription_topic_id: pending.topic_id,
                            subscription_qos: pending.subscription_qos,
                            dup: retained.dup,
                        },
                    );
                }
            }
        }
        out
    }

    pub fn sweep_requests(&mut self, now: Instant) -> Vec<Outbound> {
        let actions = self.requests.sweep(
            now,
            self.config.retransmission.interval,
            self.config.retransmission.limit,
            &self.clients,
            &self.subscribers,
            &self.messages,
        );
        let mut out = Vec::new();
        for action in actions {
            match action {
                RequestAction::SendPublish {
                    subscriber,
                    dup,
                    qos,
                    topic_id,
                    topic_id_type,
                    data,
                    request_id,
                } => out.push(Outbound::Unicast(
                    subscriber,
                    Packet::Publish(Publish {
                        dup,
                        qos,
                        retain: false,
                        topic_id_type,
                        topic_id,
                        msg_id: request_id,
                        data,
                        tag: None,
                    }),
                )),
                RequestAction::SendPubRel { subscriber, request_id } => {
                    out.push(Outbound::Unicast(subscriber, Packet::PubRel(PubRel { msg_id: request_id })));
                }
                RequestAction::KickRegistration { subscriber, topic_id } => {
                    if let Some(info) = self.topics.lookup_by_id(topic_id) {
                        let name = info.name.clone();
                        if let Some(RegistrationAction::SendRegister {
                            registration_id,
                            topic_id,
                            topic_name,
                            ..
                        }) = self.registrations.manage_registration(now, subscriber, topic_id, name)
                        {
                            out.push(Outbound::Unicast(
                                subscriber,
                                Packet::Register(Register {
                                    topic_id,
                                    msg_id: registration_id,
                                    topic_name,
                                }),
                            ));
                        }
                    }
                }
            }
        }
        out
    }

    pub fn sweep_registrations(&mut self, now: Instant) -> Vec<Outbound> {
        self.registrations
            .sweep(now, self.config.retransmission.interval, self.config.retransmission.limit)
            .into_iter()
            .map(|RegistrationAction::SendRegister { registration_id, subscriber, topic_id, topic_name }| {
                GatewayMetrics::inc(&self.metrics.retransmissions);
                Outbound::Unicast(
                    subscriber,
                    Packet::Register(Register {
                        topic_id,
                        msg_id: registration_id,
                        topic_name,
                    }),
                )
            })
            .collect()
    }

    pub fn sweep_messages(&mut self) {
        let referenced: AHashSet<u16> = self.requests.referenced_message_ids();
        self.messages.sweep(&referenced);
    }

    /// Awake-drain (spec §4.K): release a subscriber back to Asleep once no
    /// RequestInfo still targets it, or its budget expires.
    pub fn sweep_awaken(&mut self, now: Instant) -> Vec<Outbound> {
        let budget = self.config.retransmission.interval * self.config.retransmission.limit;
        let mut out = Vec::new();
        let candidates: Vec<Addr> = self
            .clients
            .iter()
            .filter(|(_, c)| c.current_state == ClientState::Awake)
            .map(|(addr, _)| *addr)
            .collect();

        for addr in candidates {
            let start = self.subscribers.get(addr).and_then(|s| s.awaken_start_time);
            let Some(start) = start else { continue };
            let still_targeted = self.requests.targets(addr);
            let expired = now.saturating_duration_since(start) > budget;
            if !still_targeted || expired {
                self.clients.get_mut(addr).unwrap().current_state = ClientState::Asleep;
                if let Some(sub) = self.subscribers.get_mut(addr) {
                    sub.awaken_start_time = None;
                    sub.awaken_check_event = None;
                }
                out.push(Outbound::Unicast(addr, Packet::PingResp(PingResp)));
            }
        }
        out
    }

    pub fn lifecycle_transition(&mut self) -> GatewayState {
        self.state = match self.state {
            GatewayState::Offline => GatewayState::Online,
            GatewayState::Online => GatewayState::Offline,
        };
        self.state
    }

    pub fn advertise(&self) -> Outbound {
        Outbound::Broadcast(Packet::Advertise(Advertise {
            gateway_id: self.config.server.gateway_id,
            duration_secs: self.config.timers.advertise_interval.as_secs() as u16,
        }))
    }
}

fn conn_ack(addr: Addr, return_code: ReturnCode) -> Outbound {
    Outbound::Unicast(addr, Packet::ConnAck(ConnAck { return_code }))
}

fn pub_ack(addr: Addr, topic_id: u16, msg_id: u16, return_code: ReturnCode) -> Outbound {
    Outbound::Unicast(
        addr,
        Packet::PubAck(PubAck {
            topic_id,
            msg_id,
            return_code,
        }),
    )
}

