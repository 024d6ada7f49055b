//! Bitcoin P2P wire format: frame header, payload codecs and the small
//! [`message::Message`] enum this crawler speaks.

pub mod codec;
pub mod message;
pub mod types;

pub use codec::{read_frame, write_frame, Frame};
pub use message::Message;
pub use types::{
    NetAddrNoTime, NetAddress, VersionPayload, DEFAULT_PORT, MAGIC_MAINNET, MAX_PAYLOAD_SIZE,
    PROTOCOL_VERSION,
};
