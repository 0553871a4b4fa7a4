//! MQTT 3.1.1 control packets used by a publish-only client

use crate::broker::error::{BrokerError, BrokerResult};
use bytes::{BufMut, Bytes, BytesMut};

pub const PROTOCOL_NAME: &str = "MQTT";
pub const PROTOCOL_LEVEL: u8 = 4;

pub const CONNECT: u8 = 0x10;
pub const CONNACK: u8 = 0x20;
pub const PUBLISH_QOS0: u8 = 0x30;
pub const DISCONNECT: u8 = 0xE0;

const FLAG_CLEAN_SESSION: u8 = 0x02;
const FLAG_PASSWORD: u8 = 0x40;
const FLAG_USERNAME: u8 = 0x80;

/// Largest value the 4-byte remaining-length field can carry
pub const MAX_REMAINING_LENGTH: usize = 268_435_455;

/// CONNECT parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectPacket<'a> {
    pub client_id: &'a str,
    pub username: Option<&'a str>,
    pub password: Option<&'a str>,
    pub keep_alive_secs: u16,
}

impl ConnectPacket<'_> {
    pub fn flags(&self) -> u8 {
        let mut flags = FLAG_CLEAN_SESSION;
        if self.username.is_some() {
            flags |= FLAG_USERNAME;
            if self.password.is_some() {
                flags |= FLAG_PASSWORD;
            }
        }
        flags
    }

    pub fn encode(&self) -> BrokerResult<Bytes> {
        let mut body = BytesMut::new();
        put_str(&mut body, PROTOCOL_NAME)?;
        body.put_u8(PROTOCOL_LEVEL);
        body.put_u8(self.flags());
        body.put_u16(self.keep_alive_secs);
        put_str(&mut body, self.client_id)?;

        // Password is only legal alongside a username in 3.1.1
        if let Some(user) = self.username {
            put_str(&mut body, user)?;
            if let Some(pass) = self.password {
                put_str(&mut body, pass)?;
            }
        }

        frame(CONNECT, &body)
    }
}

/// QoS 0 PUBLISH (no packet identifier)
pub fn encode_publish(topic: &str, payload: &[u8]) -> BrokerResult<Bytes> {
    let mut body = BytesMut::with_capacity(2 + topic.len() + payload.len());
    put_str(&mut body, topic)?;
    body.put_slice(payload);
    frame(PUBLISH_QOS0, &body)
}

pub fn encode_disconnect() -> Bytes {
    Bytes::from_static(&[DISCONNECT, 0x00])
}

/// Return code carried by a CONNACK
pub fn parse_connack(packet: &[u8]) -> BrokerResult<u8> {
    match packet {
        [CONNACK, 0x02, _session_present, code] => Ok(*code),
        [first, ..] if *first != CONNACK => Err(BrokerError::MalformedPacket(format!(
            "expected CONNACK, got 0x{first:02x}"
        ))),
        _ => Err(BrokerError::MalformedPacket(format!(
            "CONNACK of {} bytes",
            packet.len()
        ))),
    }
}

/// Variable-length remaining-length field (1 to 4 bytes)
pub fn encode_remaining_length(mut len: usize, buf: &mut BytesMut) -> BrokerResult<()> {
    if len > MAX_REMAINING_LENGTH {
        return Err(BrokerError::PacketTooLarge(len));
    }

    loop {
        let mut byte = (len % 128) as u8;
        len /= 128;
        if len > 0 {
            byte |= 0x80;
        }
        buf.put_u8(byte);
        if len == 0 {
            return Ok(());
        }
    }
}

fn put_str(buf: &mut BytesMut, value: &str) -> BrokerResult<()> {
    let len = u16::try_from(value.len()).map_err(|_| BrokerError::PacketTooLarge(value.len()))?;
    buf.put_u16(len);
    buf.put_slice(value.as_bytes());
    Ok(())
}

fn frame(header: u8, body: &[u8]) -> BrokerResult<Bytes> {
    let mut packet = BytesMut::with_capacity(body.len() + 5);
    packet.put_u8(header);
    encode_remaining_length(body.len(), &mut packet)?;
    packet.put_slice(body);
    Ok(packet.freeze())
}
