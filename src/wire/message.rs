//! Typed application messages. Only the handful this crawler actually
//! speaks get a dedicated variant; everything else round-trips through
//! `Unknown` so a chatty peer (`sendheaders`, `feefilter`, `alert`, ...)
//! doesn't break the session.

use crate::error::WireError;
use crate::wire::codec::{
    PayloadReader, write_net_addr_no_time, write_net_address, write_var_string, write_varint,
};
use crate::wire::types::{NetAddress, RELAY_FIELD_MIN_VERSION, VersionPayload};

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Version(VersionPayload),
    Verack,
    GetAddr,
    Addr(Vec<NetAddress>),
    Unknown { command: String, payload: Vec<u8> },
}

impl Message {
    pub fn command(&self) -> &str {
        match self {
            Message::Version(_) => "version",
            Message::Verack => "verack",
            Message::GetAddr => "getaddr",
            Message::Addr(_) => "addr",
            Message::Unknown { command, .. } => command,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            Message::Version(v) => encode_version(v),
            Message::Verack | Message::GetAddr => Vec::new(),
            Message::Addr(list) => encode_addr(list),
            Message::Unknown { payload, .. } => payload.clone(),
        }
    }

    pub fn decode(command: &str, payload: &[u8]) -> Result<Message, WireError> {
        match command {
            "version" => Ok(Message::Version(decode_version(payload)?)),
            "verack" => Ok(Message::Verack),
            "getaddr" => Ok(Message::GetAddr),
            "addr" => Ok(Message::Addr(decode_addr(payload)?)),
            other => Ok(Message::Unknown { command: other.to_string(), payload: payload.to_vec() }),
        }
    }
}

fn encode_version(v: &VersionPayload) -> Vec<u8> {
    let mut buf = Vec::with_capacity(96 + v.user_agent.len());
    buf.extend_from_slice(&v.version.to_le_bytes());
    buf.extend_from_slice(&v.services.to_le_bytes());
    buf.extend_from_slice(&v.timestamp.to_le_bytes());
    write_net_addr_no_time(&mut buf, &v.addr_recv);
    write_net_addr_no_time(&mut buf, &v.addr_from);
    buf.extend_from_slice(&v.nonce.to_le_bytes());
    write_var_string(&mut buf, &v.user_agent);
    buf.extend_from_slice(&v.start_height.to_le_bytes());
    if v.version >= RELAY_FIELD_MIN_VERSION {
        buf.push(v.relay as u8);
    }
    buf
}

fn decode_version(payload: &[u8]) -> Result<VersionPayload, WireError> {
    let mut r = PayloadReader::new(payload);
    let version = r.read_i32_le()?;
    let services = r.read_u64_le()?;
    let timestamp = r.read_i64_le()?;
    let addr_recv = r.read_net_addr_no_time()?;
    let addr_from = r.read_net_addr_no_time()?;
    let nonce = r.read_u64_le()?;
    let user_agent = r.read_var_string()?;
    let start_height = r.read_i32_le()?;
    // Older peers (pre-70001) never send the trailing relay byte; treat its
    // absence as "relay everything", matching the reference client.
    let relay = if version >= RELAY_FIELD_MIN_VERSION && r.remaining() > 0 {
        r.read_bool()?
    } else {
        true
    };
    Ok(VersionPayload {
        version,
        services,
        timestamp,
        addr_recv,
        addr_from,
        nonce,
        user_agent,
        start_height,
        relay,
    })
}

fn encode_addr(list: &[NetAddress]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(9 + list.len() * 30);
    write_varint(&mut buf, list.len() as u64);
    for addr in list {
        write_net_address(&mut buf, addr);
    }
    buf
}

const ADDR_RECORD_SIZE: usize = 30;

fn decode_addr(payload: &[u8]) -> Result<Vec<NetAddress>, WireError> {
    let mut r = PayloadReader::new(payload);
    let count = r.read_varint()?;
    // A peer can't possibly have sent more fixed-size records than fit in
    // the remaining payload; reject the obviously-bogus count up front
    // instead of looping until `read_net_address` starts failing.
    if count > (r.remaining() / ADDR_RECORD_SIZE) as u64 {
        return Err(WireError::MalformedAddr);
    }
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        out.push(r.read_net_address()?);
    }
    Ok(out)
}
