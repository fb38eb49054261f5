//! Decoded MQTT-SN v1.2 packet structs (spec §3, §6).
//!
//! These are the structs the gateway core consumes and produces; wire-level
//! encoding lives in `codec::wire` and is never touched by `gateway::core`.

use std::sync::Arc;

use bytes::Bytes;

/// Quality of service, including the connection-less QoS −1 (spec §3, §GLOSSARY).
///
/// Declaration order gives the total order the spec requires:
/// `QOS_MINUS_ONE < QOS_ZERO < QOS_ONE < QOS_TWO`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(i8)]
pub enum QoS {
    MinusOne = -1,
    Zero = 0,
    One = 1,
    Two = 2,
}

impl QoS {
    pub fn from_i8(v: i8) -> Option<Self> {
        match v {
            -1 => Some(Self::MinusOne),
            0 => Some(Self::Zero),
            1 => Some(Self::One),
            2 => Some(Self::Two),
            _ => None,
        }
    }

    pub fn as_i8(self) -> i8 {
        self as i8
    }

    /// The minimum of two QoS levels, used when computing effective QoS at
    /// fan-out time (spec §4.M).
    pub fn min(self, other: Self) -> Self {
        if self <= other {
            self
        } else {
            other
        }
    }
}

/// `TopicIdType` (spec §3): SHORT is inferred from a 2-octet name, PREDEFINED
/// is seeded at boot, NORMAL is everything dynamically registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TopicIdType {
    Normal,
    Predefined,
    Short,
}

/// Return codes used in REGACK/SUBACK/CONNACK/PUBACK/PUBREC (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReturnCode {
    Accepted,
    RejectedCongestion,
    RejectedInvalidTopicId,
    RejectedNotSupported,
}

impl ReturnCode {
    pub fn as_u8(self) -> u8 {
        match self {
            Self::Accepted => 0x00,
            Self::RejectedCongestion => 0x01,
            Self::RejectedInvalidTopicId => 0x02,
            Self::RejectedNotSupported => 0x03,
        }
    }

    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0x00 => Some(Self::Accepted),
            0x01 => Some(Self::RejectedCongestion),
            0x02 => Some(Self::RejectedInvalidTopicId),
            0x03 => Some(Self::RejectedNotSupported),
            _ => None,
        }
    }
}

/// Correlation tag threaded from an inbound PUBLISH through dispatch to every
/// outbound PUBLISH derived from it. Opaque to the core; a caller-supplied
/// hook for embedders that want to trace a message's fan-out (see
/// SPEC_FULL.md §4's tag note, grounded in `original_source`'s `TagInfo`).
pub type TagInfo = u64;

/// CONNECT (spec §4.B, §6).
#[derive(Debug, Clone, PartialEq)]
pub struct Connect {
    pub will: bool,
    pub clean_session: bool,
    pub duration_secs: u16,
    /// Protocol id octet; only `0x01` is accepted (spec §4.B).
    pub protocol_id: u8,
    pub client_id: String,
}

/// WILLTOPICREQ / WILLMSGREQ carry no fields beyond the message type.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WillTopicReq;
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WillMsgReq;

#[derive(Debug, Clone, PartialEq)]
pub struct WillTopic {
    pub qos: QoS,
    pub retain: bool,
    pub will_topic: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WillMsg {
    pub will_msg: Bytes,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WillTopicUpd {
    pub qos: QoS,
    pub retain: bool,
    pub will_topic: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WillTopicResp {
    pub return_code: ReturnCode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WillMsgUpd {
    pub will_msg: Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WillMsgResp {
    pub return_code: ReturnCode,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConnAck {
    pub return_code: ReturnCode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Register {
    pub topic_id: u16,
    pub msg_id: u16,
    pub topic_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegAck {
    pub topic_id: u16,
    pub msg_id: u16,
    pub return_code: ReturnCode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Publish {
    pub dup: bool,
    pub qos: QoS,
    pub retain: bool,
    pub topic_id_type: TopicIdType,
    /// For `TopicIdType::Short`, this carries the 2-octet name as a topic
    /// id per the wire encoding; callers resolve it through the registry
    /// the same way as any other topic id.
    pub topic_id: u16,
    pub msg_id: u16,
    pub data: Bytes,
    pub tag: Option<TagInfo>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PubAck {
    pub topic_id: u16,
    pub msg_id: u16,
    pub return_code: ReturnCode,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PubRec {
    pub msg_id: u16,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PubRel {
    pub msg_id: u16,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PubComp {
    pub msg_id: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Subscribe {
    pub dup: bool,
    pub qos: QoS,
    pub msg_id: u16,
    pub topic: SubscribeTopic,
}

/// SUBSCRIBE's topic field is either a name (normal/short) or a predefined id.
#[derive(Debug, Clone, PartialEq)]
pub enum SubscribeTopic {
    Name(String),
    Predefined(u16),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubAck {
    pub qos: QoS,
    pub topic_id: u16,
    pub msg_id: u16,
    pub return_code: ReturnCode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Unsubscribe {
    pub msg_id: u16,
    pub topic: SubscribeTopic,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnsubAck {
    pub msg_id: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PingReq {
    /// Present only when sent by a client waking from Asleep (spec §4.F);
    /// absent for a gateway-solicited keep-alive PINGREQ answer.
    pub client_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PingResp;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Disconnect {
    /// `Some(d)` with `d > 0` requests Asleep with that duration; `None` or
    /// `Some(0)` is a clean disconnect (spec §4.F).
    pub duration_secs: Option<u16>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SearchGw {
    pub radius: u8,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GwInfo {
    pub gateway_id: u8,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Advertise {
    pub gateway_id: u8,
    pub duration_secs: u16,
}

/// Every inbound/outbound MQTT-SN packet the gateway handles (spec §6).
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    SearchGw(SearchGw),
    GwInfo(GwInfo),
    Connect(Connect),
    ConnAck(ConnAck),
    WillTopicReq(WillTopicReq),
    WillTopic(WillTopic),
    WillMsgReq(WillMsgReq),
    WillMsg(WillMsg),
    WillTopicUpd(WillTopicUpd),
    WillTopicResp(WillTopicResp),
    WillMsgUpd(WillMsgUpd),
    WillMsgResp(WillMsgResp),
    Register(Register),
    RegAck(RegAck),
    Publish(Publish),
    PubAck(PubAck),
    PubRec(PubRec),
    PubRel(PubRel),
    PubComp(PubComp),
    Subscribe(Subscribe),
    SubAck(SubAck),
    Unsubscribe(Unsubscribe),
    UnsubAck(UnsubAck),
    PingReq(PingReq),
    PingResp(PingResp),
    Disconnect(Disconnect),
    Advertise(Advertise),
}

/// A decoded packet paired with the address it arrived from/is destined to.
/// The pair `(addr, port)` keys the client/publisher/subscriber tables
/// (spec §3); we use `SocketAddr` directly since it already carries both.
pub type Addr = std::net::SocketAddr;

/// Shared client identifier string, cheap to clone across tables (client,
/// publisher and subscriber records all reference the same clientId).
pub type ClientId = Arc<str>;
