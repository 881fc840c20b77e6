//! # Sensor Network ICD
//!
//! This is the Interface Control Document (ICD) for the slotted,
//! time-division wireless link used by the sensor network.
//!
//! A single server coordinates channel access by broadcasting periodic
//! SYNC beacons. Clients acquire a transmission slot with a JOINREQ /
//! JOINRESP handshake, and then exchange STATUS (uplink) and CONTRL
//! (downlink) application messages that are routed by the server.
//!
//! This library defines the wire format shared by clients and servers,
//! the byte-at-a-time receive [`Framer`](framer::Framer), the shared
//! [`NetworkBuffer`](net::NetworkBuffer) mailbox, and the
//! [`NetworkOps`](ops::NetworkOps) capability port that hardware
//! drivers implement.
//!
//! ## Frame layout
//!
//! Every frame shares a five byte prefix:
//!
//! | Offset | Size | Contents                                  |
//! | :---   | :--- | :---                                      |
//! | 0      | 2    | preamble, big endian, one per message type|
//! | 2      | 1    | message type (high nibble), status (low)  |
//! | 3      | 1    | length, from offset 5 through terminator  |
//! | 4      | 1    | checksum over offset 5 through terminator |
//!
//! The message specific fields follow, with multi-byte integers in
//! little endian order, then the payload and the `"\rt"` terminator.
#![cfg_attr(not(test), no_std)]

use core::{
    convert::TryFrom,
    fmt::{self, Write},
    str::FromStr,
};
use serde::{Deserialize, Serialize};

pub mod downlink;
pub mod framer;
pub mod header;
pub mod net;
pub mod ops;
pub mod uplink;

pub use crate::{
    downlink::{Control, JoinResponse, StatusAck, SyncBeacon},
    framer::{Framer, InboundEvent, Role},
    header::{FrameBuilder, FrameReader, Header},
    net::{
        AppFlags, DeviceConfig, MailboxError, MessageFlag, NetworkBuffer, NetworkSlot,
        SharedNetworkBuffer,
    },
    ops::{Callbacks, NetworkExt, NetworkOps, OpsError},
    uplink::{Credentials, JoinOptions, JoinRequest, StatusMessage},
};

#[toml_cfg::toml_config]
pub struct Config {
    #[default(64)]
    mtu_size: usize,
    #[default(40)]
    data_length: usize,
    #[default(5)]
    client_table_size: usize,
    #[default(20)]
    server_max_slots: u8,
    #[default(1000)]
    max_slot_time: u16,
    #[default(20)]
    sync_buffer_size: usize,
}

/// Capacity of a single frame, and of the framer and read buffers
pub const NET_MTU_SIZE: usize = CONFIG.mtu_size;

/// Capacity of the application and network message buffers
pub const NET_DATA_LENGTH: usize = CONFIG.data_length;

/// Largest STATUS or CONTRL payload, longer payloads are truncated
pub const MAX_PAYLOAD_LEN: usize = NET_DATA_LENGTH - TERMINATOR.len();

/// Number of clients a server can admit
pub const CLIENT_TABLE_SIZE: usize = CONFIG.client_table_size;

/// Largest number of slots a single JOINREQ may request
pub const SERVER_MAX_SLOTS: u8 = CONFIG.server_max_slots;

/// Largest slot time, in milliseconds, a server will advertise
pub const MAX_SLOT_TIME: u16 = CONFIG.max_slot_time;

/// Slot time used by servers that do not configure one
pub const DEFAULT_SLOT_TIME: u16 = 5;

/// Size of the preamble plus the fixed header
pub const HEADER_LEN: usize = 5;

/// The literal frame terminator
pub const TERMINATOR: [u8; 2] = *b"\rt";

/// Shortest frame that can be valid: prefix and terminator
pub const MIN_FRAME_LEN: usize = HEADER_LEN + TERMINATOR.len();

/// The server transmits (and beacons) in slot 1
pub const SERVER_SLOT: u8 = 1;

/// Joining clients transmit their JOINREQ in slot 2
pub const ACCESS_SLOT: u8 = 2;

/// The server answers joins and relays control messages in slot 3
pub const BROADCAST_SLOT: u8 = 3;

/// Slots `1..=RESERVED_SLOTS` are never assigned to a client
pub const RESERVED_SLOTS: u8 = BROADCAST_SLOT;

/// Longest SYNC payload, leaving room for the terminator in the sync buffer
pub const SYNC_PAYLOAD_LEN: usize = CONFIG.sync_buffer_size - TERMINATOR.len();

/// A single frame, as sent or received on the wire
pub type Frame = heapless::Vec<u8, NET_MTU_SIZE>;

/// Errors produced while encoding or decoding frames
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    /// A field was zero, empty, or out of range
    InvalidParameter,
    /// The preamble did not match the message type
    Preamble,
    /// The type nibble was not the expected (or any known) message type
    MessageType,
    /// The length field disagrees with the frame, or a field ran short
    Length,
    /// The frame did not end with `"\rt"`
    Terminator,
    /// The checksum byte did not match the frame contents
    Checksum,
    /// The status nibble is not a known status code
    UnknownStatus,
    /// The frame is addressed to another device or network
    NotForThisDevice,
    /// The frame would not fit in `NET_MTU_SIZE` bytes
    BufferFull,
    /// A device configuration could not be stored or restored
    Persist,
}

/// Message types, carried in the high nibble of byte 2
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Sync = 1,
    JoinRequest = 2,
    JoinResponse = 3,
    Status = 4,
    StatusAck = 5,
    Control = 6,
    /// Reserved, never sent
    Event = 7,
    /// Reserved, never sent
    Hibernate = 8,
    /// Reserved, never sent
    Unjoin = 9,
}

impl MessageType {
    /// The two byte magic that opens frames of this type
    ///
    /// Reserved message types have no preamble and cannot be framed.
    pub const fn preamble(self) -> Option<u16> {
        match self {
            MessageType::Sync => Some(0xAA11),
            MessageType::JoinRequest => Some(0xBB11),
            MessageType::JoinResponse => Some(0xBB22),
            MessageType::Status => Some(0xCC11),
            MessageType::Control => Some(0xCC22),
            MessageType::StatusAck => Some(0xCC33),
            MessageType::Event | MessageType::Hibernate | MessageType::Unjoin => None,
        }
    }
}

impl TryFrom<u8> for MessageType {
    type Error = CodecError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            1 => MessageType::Sync,
            2 => MessageType::JoinRequest,
            3 => MessageType::JoinResponse,
            4 => MessageType::Status,
            5 => MessageType::StatusAck,
            6 => MessageType::Control,
            7 => MessageType::Event,
            8 => MessageType::Hibernate,
            9 => MessageType::Unjoin,
            _ => return Err(CodecError::MessageType),
        })
    }
}

/// Status codes, carried in the low nibble of byte 2
///
/// `Ack`, `Nack` and `Dup` answer a JOINREQ. The remaining codes
/// describe how the server routed a CONTRL or STATUSACK message.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageStatus {
    Ack = 0,
    Nack = 1,
    Dup = 2,
    ClientEcho = 3,
    ClientNotFound = 4,
    MessageOk = 5,
}

impl TryFrom<u8> for MessageStatus {
    type Error = CodecError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => MessageStatus::Ack,
            1 => MessageStatus::Nack,
            2 => MessageStatus::Dup,
            3 => MessageStatus::ClientEcho,
            4 => MessageStatus::ClientNotFound,
            5 => MessageStatus::MessageOk,
            _ => return Err(CodecError::UnknownStatus),
        })
    }
}

/// A six byte hardware address
///
/// Parses from and displays as `aa:bb:cc:dd:ee:ff`.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Serialize, Deserialize, Eq, PartialEq, Clone, Copy, Hash, Default)]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    /// The all-zero address, used for "no destination"
    pub const ZERO: MacAddress = MacAddress([0u8; 6]);

    pub const fn from_bytes(by: [u8; 6]) -> Self {
        MacAddress(by)
    }

    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 6]
    }
}

impl FromStr for MacAddress {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut out = [0u8; 6];
        let mut parts = s.split(':');

        for byte in out.iter_mut() {
            let part = parts.next().ok_or(CodecError::InvalidParameter)?;
            if part.len() != 2 {
                return Err(CodecError::InvalidParameter);
            }
            *byte = u8::from_str_radix(part, 16).map_err(|_| CodecError::InvalidParameter)?;
        }

        if parts.next().is_some() {
            return Err(CodecError::InvalidParameter);
        }

        Ok(MacAddress(out))
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, b) in self.0.iter().enumerate() {
            if i != 0 {
                f.write_char(':')?;
            }
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

/// Frame checksum over `data[offset..end]`
///
/// An 8-bit running sum: every byte is added to the accumulator,
/// discarding any carry out of the low byte. Ranges that fall outside
/// of `data` are clipped to it.
///
/// ## Examples
///
/// ```
/// # use comms_icd::checksum;
/// #
/// assert_eq!(checksum(&[0, 0, 0, 0, 0, 0xFF, 0x02], 5, 7), 0x01);
/// ```
pub fn checksum(data: &[u8], offset: usize, end: usize) -> u8 {
    let end = end.min(data.len());
    data.get(offset..end)
        .unwrap_or(&[])
        .iter()
        .fold(0u8, |acc, b| acc.wrapping_add(*b))
}

/// Any decoded frame
///
/// Payloads borrow from the buffer the frame was decoded from.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message<'a> {
    Sync(SyncBeacon<'a>),
    JoinRequest(JoinRequest),
    JoinResponse(JoinResponse),
    Status(StatusMessage<'a>),
    StatusAck(StatusAck),
    Control(Control<'a>),
}

impl<'a> Message<'a> {
    /// Decode any of the six framed message types
    pub fn decode(bytes: &'a [u8]) -> Result<Self, CodecError> {
        let header = Header::parse(bytes)?;
        Ok(match header.message_type()? {
            MessageType::Sync => Message::Sync(SyncBeacon::decode(bytes)?),
            MessageType::JoinRequest => Message::JoinRequest(JoinRequest::decode(bytes)?),
            MessageType::JoinResponse => Message::JoinResponse(JoinResponse::decode(bytes)?),
            MessageType::Status => Message::Status(StatusMessage::decode(bytes)?),
            MessageType::StatusAck => Message::StatusAck(StatusAck::decode(bytes)?),
            MessageType::Control => Message::Control(Control::decode(bytes)?),
            _ => return Err(CodecError::MessageType),
        })
    }

    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Sync(_) => MessageType::Sync,
            Message::JoinRequest(_) => MessageType::JoinRequest,
            Message::JoinResponse(_) => MessageType::JoinResponse,
            Message::Status(_) => MessageType::Status,
            Message::StatusAck(_) => MessageType::StatusAck,
            Message::Control(_) => MessageType::Control,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference_checksum(data: &[u8], offset: usize, size: usize) -> u8 {
        let mut acc: u16 = 0;
        for b in &data[offset..size] {
            acc = (*b as u16) + ((acc & 0xFF) + ((acc >> 8) & 0xFF));
            acc &= 0xFF;
        }
        acc as u8
    }

    #[test]
    fn checksum_matches_reference() {
        let data: [u8; 12] = [0xAA, 0x11, 0x10, 0x0C, 0x00, 0xA1, 0x05, 0x01, 0xF0, 0xFF, b'\r', b't'];
        assert_eq!(checksum(&data, 5, data.len()), reference_checksum(&data, 5, data.len()));

        let long = [0xFFu8; 40];
        assert_eq!(checksum(&long, 0, 40), reference_checksum(&long, 0, 40));
    }

    #[test]
    fn checksum_clips_range() {
        let data = [1u8, 2, 3];
        assert_eq!(checksum(&data, 1, 99), 5);
        assert_eq!(checksum(&data, 5, 9), 0);
    }

    #[test]
    fn mac_parse_and_display() {
        let mac: MacAddress = "20:20:14:15:16:17".parse().unwrap();
        assert_eq!(mac.as_bytes(), &[0x20, 0x20, 0x14, 0x15, 0x16, 0x17]);

        let mut out = heapless::String::<32>::new();
        write!(out, "{}", mac).unwrap();
        assert_eq!(out.as_str(), "20:20:14:15:16:17");

        assert!("20:20:14:15:16".parse::<MacAddress>().is_err());
        assert!("20:20:14:15:16:17:18".parse::<MacAddress>().is_err());
        assert!("zz:20:14:15:16:17".parse::<MacAddress>().is_err());
    }

    #[test]
    fn reserved_types_have_no_preamble() {
        assert_eq!(MessageType::try_from(7).unwrap().preamble(), None);
        assert_eq!(MessageType::Control.preamble(), Some(0xCC22));
        assert_eq!(MessageType::try_from(10), Err(CodecError::MessageType));
        assert_eq!(MessageStatus::try_from(6), Err(CodecError::UnknownStatus));
    }

    #[test]
    fn decode_any() {
        let frame = SyncBeacon::new(1441, 5).encode().unwrap();
        match Message::decode(&frame).unwrap() {
            Message::Sync(s) => assert_eq!(s.network_id, 1441),
            other => panic!("{:?}", other),
        }
    }
}
