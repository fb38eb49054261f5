//! MQTT-SN v1.2 byte layout (spec §4.B), grounded in the message-type table
//! implied by `examples/original_source/src/modules/server/MqttSNServer.h`'s
//! handler set and the flag-byte packing in `MqttSNConnect.cc`/`MqttSNSubscribe.cc`.

use bytes::{BufMut, Bytes, BytesMut};

use super::error::{DecodeError, EncodeError};
use super::packet::*;

const MSG_ADVERTISE: u8 = 0x00;
const MSG_SEARCHGW: u8 = 0x01;
const MSG_GWINFO: u8 = 0x02;
const MSG_CONNECT: u8 = 0x04;
const MSG_CONNACK: u8 = 0x05;
const MSG_WILLTOPICREQ: u8 = 0x06;
const MSG_WILLTOPIC: u8 = 0x07;
const MSG_WILLMSGREQ: u8 = 0x08;
const MSG_WILLMSG: u8 = 0x09;
const MSG_REGISTER: u8 = 0x0A;
const MSG_REGACK: u8 = 0x0B;
const MSG_PUBLISH: u8 = 0x0C;
const MSG_PUBACK: u8 = 0x0D;
const MSG_PUBCOMP: u8 = 0x0E;
const MSG_PUBREC: u8 = 0x0F;
const MSG_PUBREL: u8 = 0x10;
const MSG_SUBSCRIBE: u8 = 0x12;
const MSG_SUBACK: u8 = 0x13;
const MSG_UNSUBSCRIBE: u8 = 0x14;
const MSG_UNSUBACK: u8 = 0x15;
const MSG_PINGREQ: u8 = 0x16;
const MSG_PINGRESP: u8 = 0x17;
const MSG_DISCONNECT: u8 = 0x18;
const MSG_WILLTOPICRESP: u8 = 0x1A;
const MSG_WILLTOPICUPD: u8 = 0x1B;
const MSG_WILLMSGRESP: u8 = 0x1C;
const MSG_WILLMSGUPD: u8 = 0x1D;

const FLAG_DUP: u8 = 0x80;
const FLAG_QOS_MASK: u8 = 0x60;
const FLAG_RETAIN: u8 = 0x10;
const FLAG_WILL: u8 = 0x08;
const FLAG_CLEAN_SESSION: u8 = 0x04;
const FLAG_TOPIC_ID_TYPE_MASK: u8 = 0x03;

fn qos_to_flag_bits(qos: QoS) -> u8 {
    match qos {
        QoS::MinusOne => 0b11,
        QoS::Zero => 0b00,
        QoS::One => 0b01,
        QoS::Two => 0b10,
    }
}

fn qos_from_flag_bits(bits: u8) -> QoS {
    match bits {
        0b00 => QoS::Zero,
        0b01 => QoS::One,
        0b10 => QoS::Two,
        _ => QoS::MinusOne,
    }
}

fn topic_id_type_to_bits(t: TopicIdType) -> u8 {
    match t {
        TopicIdType::Normal => 0b00,
        TopicIdType::Predefined => 0b01,
        TopicIdType::Short => 0b10,
    }
}

fn topic_id_type_from_bits(bits: u8) -> Result<TopicIdType, DecodeError> {
    match bits {
        0b00 => Ok(TopicIdType::Normal),
        0b01 => Ok(TopicIdType::Predefined),
        0b10 => Ok(TopicIdType::Short),
        other => Err(DecodeError::InvalidTopicIdType(other)),
    }
}

fn return_code(v: u8) -> Result<ReturnCode, DecodeError> {
    ReturnCode::from_u8(v).ok_or(DecodeError::InvalidReturnCode(v))
}

/// Decode one MQTT-SN frame (length-prefixed, no fragmentation) from `buf`.
/// `buf` must contain exactly one datagram's worth of bytes; MQTT-SN over
/// UDP does not split frames across datagrams.
pub fn decode(buf: &[u8]) -> Result<Packet, DecodeError> {
    if buf.len() < 2 {
        return Err(DecodeError::InsufficientData);
    }
    let mut cur = buf;
    let total_len = if cur[0] == 0x01 {
        if cur.len() < 4 {
            return Err(DecodeError::InsufficientData);
        }
        let len = u16::from_be_bytes([cur[1], cur[2]]) as usize;
        cur = &cur[3..];
        len
    } else {
        let len = cur[0] as usize;
        cur = &cur[1..];
        len
    };
    if total_len != buf.len() {
        return Err(DecodeError::InvalidLengthEncoding);
    }
    if cur.is_empty() {
        return Err(DecodeError::InsufficientData);
    }
    let msg_type = cur[0];
    let body = &cur[1..];
    decode_body(msg_type, body)
}

fn decode_body(msg_type: u8, b: &[u8]) -> Result<Packet, DecodeError> {
    match msg_type {
        MSG_ADVERTISE => {
            require_len(b, 3)?;
            Ok(Packet::Advertise(Advertise {
                gateway_id: b[0],
                duration_secs: u16::from_be_bytes([b[1], b[2]]),
            }))
        }
        MSG_SEARCHGW => {
            require_len(b, 1)?;
            Ok(Packet::SearchGw(SearchGw { radius: b[0] }))
        }
        MSG_GWINFO => {
            require_len(b, 1)?;
            Ok(Packet::GwInfo(GwInfo { gateway_id: b[0] }))
        }
        MSG_CONNECT => {
            require_min_len(b, 4)?;
            let flags = b[0];
            let protocol_id = b[1];
            let duration_secs = u16::from_be_bytes([b[2], b[3]]);
            let client_id = decode_str(&b[4..])?;
            if client_id.is_empty() || client_id.len() > 23 {
                return Err(DecodeError::MalformedPacket("clientId length out of range"));
            }
            Ok(Packet::Connect(Connect {
                will: flags & FLAG_WILL != 0,
                clean_session: flags & FLAG_CLEAN_SESSION != 0,
                duration_secs,
                protocol_id,
                client_id,
            }))
        }
        MSG_CONNACK => {
            require_len(b, 1)?;
            Ok(Packet::ConnAck(ConnAck {
                return_code: return_code(b[0])?,
            }))
        }
        MSG_WILLTOPICREQ => Ok(Packet::WillTopicReq(WillTopicReq)),
        MSG_WILLTOPIC => {
            if b.is_empty() {
                // zero-length WILLTOPIC cancels the will; represented as empty topic.
                return Ok(Packet::WillTopic(WillTopic {
                    qos: QoS::Zero,
                    retain: false,
                    will_topic: String::new(),
                }));
            }
            let flags = b[0];
            let will_topic = decode_str(&b[1..])?;
            Ok(Packet::WillTopic(WillTopic {
                qos: qos_from_flag_bits((flags & FLAG_QOS_MASK) >> 5),
                retain: flags & FLAG_RETAIN != 0,
                will_topic,
            }))
        }
        MSG_WILLMSGREQ => Ok(Packet::WillMsgReq(WillMsgReq)),
        MSG_WILLMSG => Ok(Packet::WillMsg(WillMsg {
            will_msg: Bytes::copy_from_slice(b),
        })),
        MSG_WILLTOPICUPD => {
            if b.is_empty() {
                return Ok(Packet::WillTopicUpd(WillTopicUpd {
                    qos: QoS::Zero,
                    retain: false,
                    will_topic: String::new(),
                }));
            }
            let flags = b[0];
            let will_topic = decode_str(&b[1..])?;
            Ok(Packet::WillTopicUpd(WillTopicUpd {
                qos: qos_from_flag_bits((flags & FLAG_QOS_MASK) >> 5),
                retain: flags & FLAG_RETAIN != 0,
                will_topic,
            }))
        }
        MSG_WILLTOPICRESP => {
            require_len(b, 1)?;
            Ok(Packet::WillTopicResp(WillTopicResp {
                return_code: return_code(b[0])?,
            }))
        }
        MSG_WILLMSGUPD => Ok(Packet::WillMsgUpd(WillMsgUpd {
            will_msg: Bytes::copy_from_slice(b),
        })),
        MSG_WILLMSGRESP => {
            require_len(b, 1)?;
            Ok(Packet::WillMsgResp(WillMsgResp {
                return_code: return_code(b[0])?,
            }))
        }
        MSG_REGISTER => {
            require_min_len(b, 4)?;
            let topic_id = u16::from_be_bytes([b[0], b[1]]);
            let msg_id = u16::from_be_bytes([b[2], b[3]]);
            let topic_name = decode_str(&b[4..])?;
            Ok(Packet::Register(Register {
                topic_id,
                msg_id,
                topic_name,
            }))
        }
        MSG_REGACK => {
            require_len(b, 5)?;
            Ok(Packet::RegAck(RegAck {
                topic_id: u16::from_be_bytes([b[0], b[1]]),
                msg_id: u16::from_be_bytes([b[2], b[3]]),
                return_code: return_code(b[4])?,
            }))
        }
        MSG_PUBLISH => {
            require_min_len(b, 5)?;
            let flags = b[0];
            let topic_id = u16::from_be_bytes([b[1], b[2]]);
            let msg_id = u16::from_be_bytes([b[3], b[4]]);
            let data = Bytes::copy_from_slice(&b[5..]);
            Ok(Packet::Publish(Publish {
                dup: flags & FLAG_DUP != 0,
                qos: qos_from_flag_bits((flags & FLAG_QOS_MASK) >> 5),
                retain: flags & FLAG_RETAIN != 0,
                topic_id_type: topic_id_type_from_bits(flags & FLAG_TOPIC_ID_TYPE_MASK)?,
                topic_id,
                msg_id,
                data,
                tag: None,
            }))
        }
        MSG_PUBACK => {
            require_len(b, 5)?;
            Ok(Packet::PubAck(PubAck {
                topic_id: u16::from_be_bytes([b[0], b[1]]),
                msg_id: u16::from_be_bytes([b[2], b[3]]),
                return_code: return_code(b[4])?,
            }))
        }
        MSG_PUBREC => {
            require_len(b, 2)?;
            Ok(Packet::PubRec(PubRec {
                msg_id: u16::from_be_bytes([b[0], b[1]]),
            }))
        }
        MSG_PUBREL => {
            require_len(b, 2)?;
            Ok(Packet::PubRel(PubRel {
                msg_id: u16::from_be_bytes([b[0], b[1]]),
            }))
        }
        MSG_PUBCOMP => {
            require_len(b, 2)?;
            Ok(Packet::PubComp(PubComp {
                msg_id: u16::from_be_bytes([b[0], b[1]]),
            }))
        }
        MSG_SUBSCRIBE => {
            require_min_len(b, 3)?;
            let flags = b[0];
            let msg_id = u16::from_be_bytes([b[1], b[2]]);
            let type_bits = flags & FLAG_TOPIC_ID_TYPE_MASK;
            let topic = match type_bits {
                0b01 => {
                    require_len(&b[3..], 2)?;
                    SubscribeTopic::Predefined(u16::from_be_bytes([b[3], b[4]]))
                }
                0b00 | 0b10 => SubscribeTopic::Name(decode_str(&b[3..])?),
                other => return Err(DecodeError::InvalidTopicIdType(other)),
            };
            Ok(Packet::Subscribe(Subscribe {
                dup: flags & FLAG_DUP != 0,
                qos: qos_from_flag_bits((flags & FLAG_QOS_MASK) >> 5),
                msg_id,
                topic,
            }))
        }
        MSG_SUBACK => {
            require_len(b, 6)?;
            let flags = b[0];
            Ok(Packet::SubAck(SubAck {
                qos: qos_from_flag_bits((flags & FLAG_QOS_MASK) >> 5),
                topic_id: u16::from_be_bytes([b[1], b[2]]),
                msg_id: u16::from_be_bytes([b[3], b[4]]),
                return_code: return_code(b[5])?,
            }))
        }
        MSG_UNSUBSCRIBE => {
            require_min_len(b, 3)?;
            let flags = b[0];
            let msg_id = u16::from_be_bytes([b[1], b[2]]);
            let type_bits = flags & FLAG_TOPIC_ID_TYPE_MASK;
            let topic = match type_bits {
                0b01 => {
                    require_len(&b[3..], 2)?;
                    SubscribeTopic::Predefined(u16::from_be_bytes([b[3], b[4]]))
                }
                0b00 | 0b10 => SubscribeTopic::Name(decode_str(&b[3..])?),
                other => return Err(DecodeError::InvalidTopicIdType(other)),
            };
            Ok(Packet::Unsubscribe(Unsubscribe { msg_id, topic }))
        }
        MSG_UNSUBACK => {
            require_len(b, 2)?;
            Ok(Packet::UnsubAck(UnsubAck {
                msg_id: u16::from_be_bytes([b[0], b[1]]),
            }))
        }
        MSG_PINGREQ => {
            let client_id = if b.is_empty() {
                None
            } else {
                Some(decode_str(b)?)
            };
            Ok(Packet::PingReq(PingReq { client_id }))
        }
        MSG_PINGRESP => Ok(Packet::PingResp(PingResp)),
        MSG_DISCONNECT => {
            let duration_secs = if b.is_empty() {
                None
            } else {
                require_len(b, 2)?;
                Some(u16::from_be_bytes([b[0], b[1]]))
            };
            Ok(Packet::Disconnect(Disconnect { duration_secs }))
        }
        other => Err(DecodeError::InvalidMsgType(other)),
    }
}

fn require_len(b: &[u8], n: usize) -> Result<(), DecodeError> {
    if b.len() != n {
        Err(DecodeError::InsufficientData)
    } else {
        Ok(())
    }
}

fn require_min_len(b: &[u8], n: usize) -> Result<(), DecodeError> {
    if b.len() < n {
        Err(DecodeError::InsufficientData)
    } else {
        Ok(())
    }
}

fn decode_str(b: &[u8]) -> Result<String, DecodeError> {
    std::str::from_utf8(b)
        .map(|s| s.to_owned())
        .map_err(|_| DecodeError::InvalidUtf8)
}

/// Encode `pkt` into a length-prefixed MQTT-SN frame.
pub fn encode(pkt: &Packet) -> Result<Bytes, EncodeError> {
    let mut body = BytesMut::new();
    let msg_type = encode_body(pkt, &mut body)?;
    let frame_len = 2 + body.len();
    let mut out = BytesMut::with_capacity(frame_len.max(4));
    if frame_len > 255 {
        if frame_len > u16::MAX as usize {
            return Err(EncodeError::PacketTooLarge);
        }
        out.put_u8(0x01);
        out.put_u16(frame_len as u16 + 2);
    } else {
        out.put_u8(frame_len as u8);
    }
    out.put_u8(msg_type);
    out.extend_from_slice(&body);
    Ok(out.freeze())
}

fn encode_body(pkt: &Packet, out: &mut BytesMut) -> Result<u8, EncodeError> {
    match pkt {
        Packet::Advertise(p) => {
            out.put_u8(p.gateway_id);
            out.put_u16(p.duration_secs);
            Ok(MSG_ADVERTISE)
        }
        Packet::SearchGw(p) => {
            out.put_u8(p.radius);
            Ok(MSG_SEARCHGW)
        }
        Packet::GwInfo(p) => {
            out.put_u8(p.gateway_id);
            Ok(MSG_GWINFO)
        }
        Packet::Connect(p) => {
            if p.client_id.len() > 23 {
                return Err(EncodeError::ClientIdTooLong);
            }
            let mut flags = 0u8;
            if p.will {
                flags |= FLAG_WILL;
            }
            if p.clean_session {
                flags |= FLAG_CLEAN_SESSION;
            }
            out.put_u8(flags);
            out.put_u8(p.protocol_id);
            out.put_u16(p.duration_secs);
            out.extend_from_slice(p.client_id.as_bytes());
            Ok(MSG_CONNECT)
        }
        Packet::ConnAck(p) => {
            out.put_u8(p.return_code.as_u8());
            Ok(MSG_CONNACK)
        }
        Packet::WillTopicReq(_) => Ok(MSG_WILLTOPICREQ),
        Packet::WillTopic(p) => {
            if p.will_topic.is_empty() {
                return Ok(MSG_WILLTOPIC);
            }
            let flags = (qos_to_flag_bits(p.qos) << 5) | if p.retain { FLAG_RETAIN } else { 0 };
            out.put_u8(flags);
            out.extend_from_slice(p.will_topic.as_bytes());
            Ok(MSG_WILLTOPIC)
        }
        Packet::WillMsgReq(_) => Ok(MSG_WILLMSGREQ),
        Packet::WillMsg(p) => {
            out.extend_from_slice(&p.will_msg);
            Ok(MSG_WILLMSG)
        }
        Packet::WillTopicUpd(p) => {
            if p.will_topic.is_empty() {
                return Ok(MSG_WILLTOPICUPD);
            }
            let flags = (qos_to_flag_bits(p.qos) << 5) | if p.retain { FLAG_RETAIN } else { 0 };
            out.put_u8(flags);
            out.extend_from_slice(p.will_topic.as_bytes());
            Ok(MSG_WILLTOPICUPD)
        }
        Packet::WillTopicResp(p) => {
            out.put_u8(p.return_code.as_u8());
            Ok(MSG_WILLTOPICRESP)
        }
        Packet::WillMsgUpd(p) => {
            out.extend_from_slice(&p.will_msg);
            Ok(MSG_WILLMSGUPD)
        }
        Packet::WillMsgResp(p) => {
            out.put_u8(p.return_code.as_u8());
            Ok(MSG_WILLMSGRESP)
        }
        Packet::Register(p) => {
            if p.topic_name.len() > u16::MAX as usize - 6 {
                return Err(EncodeError::TopicNameTooLong);
            }
            out.put_u16(p.topic_id);
            out.put_u16(p.msg_id);
            out.extend_from_slice(p.topic_name.as_bytes());
            Ok(MSG_REGISTER)
        }
        Packet::RegAck(p) => {
            out.put_u16(p.topic_id);
            out.put_u16(p.msg_id);
            out.put_u8(p.return_code.as_u8());
            Ok(MSG_REGACK)
        }
        Packet::Publish(p) => {
            let mut flags = (qos_to_flag_bits(p.qos) << 5) | topic_id_type_to_bits(p.topic_id_type);
            if p.dup {
                flags |= FLAG_DUP;
            }
            if p.retain {
                flags |= FLAG_RETAIN;
            }
            out.put_u8(flags);
            out.put_u16(p.topic_id);
            out.put_u16(p.msg_id);
            out.extend_from_slice(&p.data);
            Ok(MSG_PUBLISH)
        }
        Packet::PubAck(p) => {
            out.put_u16(p.topic_id);
            out.put_u16(p.msg_id);
            out.put_u8(p.return_code.as_u8());
            Ok(MSG_PUBACK)
        }
        Packet::PubRec(p) => {
            out.put_u16(p.msg_id);
            Ok(MSG_PUBREC)
        }
        Packet::PubRel(p) => {
            out.put_u16(p.msg_id);
            Ok(MSG_PUBREL)
        }
        Packet::PubComp(p) => {
            out.put_u16(p.msg_id);
            Ok(MSG_PUBCOMP)
        }
        Packet::Subscribe(p) => {
            let mut flags = qos_to_flag_bits(p.qos) << 5;
            if p.dup {
                flags |= FLAG_DUP;
            }
            match &p.topic {
                SubscribeTopic::Name(name) => {
                    let is_short = name.len() == 2;
                    flags |= if is_short { 0b10 } else { 0b00 };
                    out.put_u8(flags);
                    out.put_u16(p.msg_id);
                    out.extend_from_slice(name.as_bytes());
                }
                SubscribeTopic::Predefined(id) => {
                    flags |= 0b01;
                    out.put_u8(flags);
                    out.put_u16(p.msg_id);
                    out.put_u16(*id);
                }
            }
            Ok(MSG_SUBSCRIBE)
        }
        Packet::SubAck(p) => {
            out.put_u8(qos_to_flag_bits(p.qos) << 5);
            out.put_u16(p.topic_id);
            out.put_u16(p.msg_id);
            out.put_u8(p.return_code.as_u8());
            Ok(MSG_SUBACK)
        }
        Packet::Unsubscribe(p) => {
            match &p.topic {
                SubscribeTopic::Name(name) => {
                    let is_short = name.len() == 2;
                    out.put_u8(if is_short { 0b10 } else { 0b00 });
                    out.put_u16(p.msg_id);
                    out.extend_from_slice(name.as_bytes());
                }
                SubscribeTopic::Predefined(id) => {
                    out.put_u8(0b01);
                    out.put_u16(p.msg_id);
                    out.put_u16(*id);
                }
            }
            Ok(MSG_UNSUBSCRIBE)
        }
        Packet::UnsubAck(p) => {
            out.put_u16(p.msg_id);
            Ok(MSG_UNSUBACK)
        }
        Packet::PingReq(p) => {
            if let Some(id) = &p.client_id {
                out.extend_from_slice(id.as_bytes());
            }
            Ok(MSG_PINGREQ)
        }
        Packet::PingResp(_) => Ok(MSG_PINGRESP),
        Packet::Disconnect(p) => {
            if let Some(d) = p.duration_secs {
                out.put_u16(d);
            }
            Ok(MSG_DISCONNECT)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(pkt: Packet) {
        let encoded = encode(&pkt).expect("encode");
        let decoded = decode(&encoded).expect("decode");
        let re_encoded = encode(&decoded).expect("re-encode");
        assert_eq!(encoded, re_encoded);
    }

    #[test]
    fn connect_roundtrips() {
        roundtrip(Packet::Connect(Connect {
            will: true,
            clean_session: true,
            duration_secs: 300,
            protocol_id: 0x01,
            client_id: "sensor-07".to_owned(),
        }));
    }

    #[test]
    fn publish_with_qos_minus_one_roundtrips() {
        roundtrip(Packet::Publish(Publish {
            dup: false,
            qos: QoS::MinusOne,
            retain: false,
            topic_id_type: TopicIdType::Predefined,
            topic_id: 7,
            msg_id: 0,
            data: Bytes::from_static(b"42"),
            tag: None,
        }));
    }

    #[test]
    fn subscribe_short_topic_roundtrips() {
        roundtrip(Packet::Subscribe(Subscribe {
            dup: false,
            qos: QoS::One,
            msg_id: 12,
            topic: SubscribeTopic::Name("ab".to_owned()),
        }));
    }

    #[test]
    fn long_frame_uses_extended_length() {
        let data = Bytes::from(vec![0u8; 300]);
        let pkt = Packet::Publish(Publish {
            dup: false,
            qos: QoS::Zero,
            retain: false,
            topic_id_type: TopicIdType::Normal,
            topic_id: 1,
            msg_id: 1,
            data,
            tag: None,
        });
        let encoded = encode(&pkt).unwrap();
        assert_eq!(encoded[0], 0x01);
        let decoded = decode(&encoded).unwrap();
        match decoded {
            Packet::Publish(p) => assert_eq!(p.data.len(), 300),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn reject_unknown_msg_type() {
        let buf = [0x02u8, 0xFE];
        assert_eq!(decode(&buf), Err(DecodeError::InvalidMsgType(0xFE)));
    }

    #[test]
    fn reject_client_id_too_long() {
        let pkt = Packet::Connect(Connect {
            will: false,
            clean_session: false,
            duration_secs: 10,
            protocol_id: 0x01,
            client_id: "x".repeat(24),
        });
        assert_eq!(encode(&pkt), Err(EncodeError::ClientIdTooLong));
    }
}
