//! Wire codec error types (spec §4.B), in the teacher's plain-enum-with-Display style.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    InsufficientData,
    InvalidMsgType(u8),
    InvalidLengthEncoding,
    InvalidQoS(i8),
    InvalidReturnCode(u8),
    InvalidTopicIdType(u8),
    InvalidUtf8,
    MalformedPacket(&'static str),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InsufficientData => write!(f, "insufficient data in buffer"),
            Self::InvalidMsgType(t) => write!(f, "invalid message type: {t}"),
            Self::InvalidLengthEncoding => write!(f, "invalid length encoding"),
            Self::InvalidQoS(q) => write!(f, "invalid QoS value: {q}"),
            Self::InvalidReturnCode(r) => write!(f, "invalid return code: {r}"),
            Self::InvalidTopicIdType(t) => write!(f, "invalid topic id type: {t}"),
            Self::InvalidUtf8 => write!(f, "invalid UTF-8 in string field"),
            Self::MalformedPacket(msg) => write!(f, "malformed packet: {msg}"),
        }
    }
}

impl std::error::Error for DecodeError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    PacketTooLarge,
    ClientIdTooLong,
    TopicNameTooLong,
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PacketTooLarge => write!(f, "packet exceeds maximum MQTT-SN frame length"),
            Self::ClientIdTooLong => write!(f, "clientId exceeds 23 bytes"),
            Self::TopicNameTooLong => write!(f, "topic name too long for its frame"),
        }
    }
}

impl std::error::Error for EncodeError {}
