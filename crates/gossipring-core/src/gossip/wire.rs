//! Wire framing for gossip verbs (§6), adapted from the messaging
//! layer's hand-rolled header + bincode-payload framing.

use std::net::{IpAddr, SocketAddr};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::endpoint::{Endpoint, EndpointState};
use crate::error::{GossipError, Result};

use super::digest::GossipDigest;

/// Wire protocol version. A `SYN` whose version the receiver does not
/// understand is a protocol violation (§7.4).
pub const PROTOCOL_VERSION: u8 = 1;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GossipVerb {
    DigestSyn = 0x01,
    DigestAck = 0x02,
    DigestAck2 = 0x03,
    Shutdown = 0x04,
    Echo = 0x05,
    EchoAck = 0x06,
}

impl GossipVerb {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(GossipVerb::DigestSyn),
            0x02 => Some(GossipVerb::DigestAck),
            0x03 => Some(GossipVerb::DigestAck2),
            0x04 => Some(GossipVerb::Shutdown),
            0x05 => Some(GossipVerb::Echo),
            0x06 => Some(GossipVerb::EchoAck),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GossipHeader {
    pub version: u8,
    pub verb: GossipVerb,
    pub message_id: Uuid,
    pub source: Endpoint,
    pub payload_length: u32,
    pub checksum: u32,
}

impl GossipHeader {
    fn new(verb: GossipVerb, source: Endpoint) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            verb,
            message_id: Uuid::new_v4(),
            source,
            payload_length: 0,
            checksum: 0,
        }
    }

    fn encode_addr(buf: &mut BytesMut, addr: SocketAddr) {
        match addr.ip() {
            IpAddr::V4(v4) => {
                buf.put_u8(4);
                buf.put_slice(&v4.octets());
            }
            IpAddr::V6(v6) => {
                buf.put_u8(6);
                buf.put_slice(&v6.octets());
            }
        }
        buf.put_u16(addr.port());
    }

    fn decode_addr(buf: &mut impl Buf) -> Result<SocketAddr> {
        if buf.remaining() < 1 {
            return Err(GossipError::ProtocolViolation("truncated address".into()));
        }
        let tag = buf.get_u8();
        let ip = match tag {
            4 => {
                if buf.remaining() < 4 {
                    return Err(GossipError::ProtocolViolation("truncated ipv4".into()));
                }
                let mut octets = [0u8; 4];
                buf.copy_to_slice(&mut octets);
                IpAddr::from(octets)
            }
            6 => {
                if buf.remaining() < 16 {
                    return Err(GossipError::ProtocolViolation("truncated ipv6".into()));
                }
                let mut octets = [0u8; 16];
                buf.copy_to_slice(&mut octets);
                IpAddr::from(octets)
            }
            other => {
                return Err(GossipError::ProtocolViolation(format!(
                    "unknown address family tag {other}"
                )))
            }
        };
        if buf.remaining() < 2 {
            return Err(GossipError::ProtocolViolation("truncated port".into()));
        }
        let port = buf.get_u16();
        Ok(SocketAddr::new(ip, port))
    }

    fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(64);
        buf.put_u8(self.version);
        buf.put_u8(self.verb as u8);
        buf.put_slice(self.message_id.as_bytes());
        Self::encode_addr(&mut buf, self.source.addr);
        buf.put_u32(self.payload_length);
        buf.put_u32(self.checksum);
        buf
    }

    fn decode(buf: &mut impl Buf) -> Result<Self> {
        if buf.remaining() < 18 {
            return Err(GossipError::ProtocolViolation("truncated header".into()));
        }
        let version = buf.get_u8();
        if version != PROTOCOL_VERSION {
            return Err(GossipError::ProtocolViolation(format!(
                "unsupported gossip wire version {version}"
            )));
        }
        let verb_byte = buf.get_u8();
        let verb = GossipVerb::from_u8(verb_byte)
            .ok_or_else(|| GossipError::ProtocolViolation(format!("unknown verb {verb_byte}")))?;

        let mut message_id_bytes = [0u8; 16];
        buf.copy_to_slice(&mut message_id_bytes);
        let message_id = Uuid::from_bytes(message_id_bytes);

        let addr = Self::decode_addr(buf)?;

        if buf.remaining() < 8 {
            return Err(GossipError::ProtocolViolation("truncated trailer".into()));
        }
        let payload_length = buf.get_u32();
        let checksum = buf.get_u32();

        Ok(Self {
            version,
            verb,
            message_id,
            source: Endpoint::new(addr),
            payload_length,
            checksum,
        })
    }
}

/// A framed gossip message: header plus a bincode-encoded, crc32-checked
/// payload (grounded on the messaging layer's `Message`).
#[derive(Debug, Clone)]
pub struct GossipMessage {
    pub header: GossipHeader,
    pub payload: Bytes,
}

impl GossipMessage {
    pub fn new<T: Serialize>(verb: GossipVerb, source: Endpoint, payload: &T) -> Result<Self> {
        let payload_bytes = bincode::serialize(payload)?;
        let checksum = crc32fast::hash(&payload_bytes);

        let mut header = GossipHeader::new(verb, source);
        header.payload_length = payload_bytes.len() as u32;
        header.checksum = checksum;

        Ok(Self {
            header,
            payload: Bytes::from(payload_bytes),
        })
    }

    pub fn decode_payload<T: for<'de> Deserialize<'de>>(&self) -> Result<T> {
        let calculated = crc32fast::hash(&self.payload);
        if calculated != self.header.checksum {
            return Err(GossipError::ChecksumMismatch);
        }
        bincode::deserialize(&self.payload).map_err(Into::into)
    }

    pub fn encode(&self) -> BytesMut {
        let mut buf = self.header.encode();
        buf.put_slice(&self.payload);
        buf
    }

    pub fn decode(mut buf: impl Buf) -> Result<Self> {
        let header = GossipHeader::decode(&mut buf)?;
        if buf.remaining() < header.payload_length as usize {
            return Err(GossipError::ProtocolViolation("truncated payload".into()));
        }
        let payload = buf.copy_to_bytes(header.payload_length as usize);
        Ok(Self { header, payload })
    }
}

/// `GOSSIP_DIGEST_SYN` payload (§6): cluster id plus a digest list. An
/// empty `digests` list is a shadow round (§4.3.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynPayload {
    pub cluster_id: String,
    pub digests: Vec<GossipDigest>,
}

/// `GOSSIP_DIGEST_ACK` payload: digests the sender still needs, plus the
/// states the receiver has that the sender lacks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AckPayload {
    pub needs: Vec<GossipDigest>,
    pub haves: Vec<(Endpoint, EndpointState)>,
}

/// `GOSSIP_DIGEST_ACK2` payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ack2Payload {
    pub haves: Vec<(Endpoint, EndpointState)>,
}

/// Empty payloads for `SHUTDOWN`/`ECHO`/echo-reply.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct EmptyPayload;
