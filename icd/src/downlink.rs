//! # Server Messages
//!
//! These are messages that are sent FROM the server,
//! TO one or all client devices.
//!
//! * [`SyncBeacon`] opens every frame cycle and carries the slot timing
//! * [`JoinResponse`] answers a JOINREQ with the assigned client id
//! * [`Control`] relays a STATUS payload, or a server generated notice
//! * [`StatusAck`] acknowledges a STATUS message

use crate::{
    header::{FrameBuilder, FrameReader},
    net::DeviceConfig,
    CodecError, Frame, MacAddress, MessageStatus, MessageType, ACCESS_SLOT, MAX_PAYLOAD_LEN,
    MAX_SLOT_TIME, SERVER_SLOT, SYNC_PAYLOAD_LEN,
};
use core::fmt::Write;

/// CONTRL payload sent back when the destination is not registered
pub const NOT_FOUND_NOTICE: &[u8] = b"DEVICE NOT FOUND";

/// Prefix added to payloads addressed to the server itself
pub const ECHO_PREFIX: &[u8] = b"[Echo]:";

/// SYNC: the frame cycle beacon
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncBeacon<'a> {
    pub network_id: u16,
    /// The slot the server transmits in
    pub slot: u8,
    /// Slot length in milliseconds
    pub slot_time: u16,
    /// The slot joining clients use for JOINREQ
    pub access_slot: u8,
    pub payload: &'a [u8],
}

impl SyncBeacon<'static> {
    pub const fn new(network_id: u16, slot_time: u16) -> Self {
        SyncBeacon {
            network_id,
            slot: SERVER_SLOT,
            slot_time,
            access_slot: ACCESS_SLOT,
            payload: b"sync",
        }
    }
}

impl<'a> SyncBeacon<'a> {
    pub fn encode(&self) -> Result<Frame, CodecError> {
        if self.slot_time > MAX_SLOT_TIME || self.payload.len() > SYNC_PAYLOAD_LEN {
            return Err(CodecError::InvalidParameter);
        }

        let mut builder = FrameBuilder::new(MessageType::Sync, MessageStatus::Ack)?;
        builder
            .put_u16(self.network_id)?
            .put_u8(self.slot)?
            .put_u16(self.slot_time)?
            .put_u8(self.access_slot)?
            .put_slice(self.payload)?;
        builder.finish()
    }

    pub fn decode(bytes: &'a [u8]) -> Result<Self, CodecError> {
        let mut rdr = FrameReader::new(bytes, MessageType::Sync)?;

        Ok(SyncBeacon {
            network_id: rdr.u16()?,
            slot: rdr.u8()?,
            slot_time: rdr.u16()?,
            access_slot: rdr.u8()?,
            payload: rdr.rest(),
        })
    }
}

/// JOINRESP: the answer to a JOINREQ
///
/// The assigned client id travels as ASCII decimal in the payload.
/// A rejected request carries a `Nack` status and an id of zero.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinResponse {
    pub status: MessageStatus,
    pub source_mac: MacAddress,
    pub destination_mac: MacAddress,
    pub network_id: u16,
    pub slot: u8,
    pub client_id: u8,
}

impl JoinResponse {
    pub fn new(
        server: &DeviceConfig,
        status: MessageStatus,
        destination_mac: MacAddress,
        client_id: u8,
    ) -> Self {
        JoinResponse {
            status,
            source_mac: server.mac,
            destination_mac,
            network_id: server.network_id,
            slot: SERVER_SLOT,
            client_id,
        }
    }

    pub fn encode(&self) -> Result<Frame, CodecError> {
        let mut digits: heapless::String<4> = heapless::String::new();
        write!(digits, "{}", self.client_id).map_err(|_| CodecError::BufferFull)?;

        let mut builder = FrameBuilder::new(MessageType::JoinResponse, self.status)?;
        builder
            .put_slice(self.source_mac.as_bytes())?
            .put_slice(self.destination_mac.as_bytes())?
            .put_u16(self.network_id)?
            .put_u8(self.slot)?
            .put_slice(digits.as_bytes())?;
        builder.finish()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut rdr = FrameReader::new(bytes, MessageType::JoinResponse)?;
        let status = rdr.header().status()?;

        Ok(JoinResponse {
            status,
            source_mac: MacAddress::from_bytes(rdr.array()?),
            destination_mac: MacAddress::from_bytes(rdr.array()?),
            network_id: rdr.u16()?,
            slot: rdr.u8()?,
            client_id: parse_decimal(rdr.rest()),
        })
    }

    /// The slot this response grants to the device with `mac`
    ///
    /// A `Nack` grants slot 0. Responses for other devices are
    /// reported as `NotForThisDevice`.
    pub fn assigned_slot(&self, mac: &MacAddress) -> Result<u8, CodecError> {
        if &self.destination_mac != mac {
            return Err(CodecError::NotForThisDevice);
        }

        match self.status {
            MessageStatus::Ack | MessageStatus::Dup => Ok(self.client_id),
            MessageStatus::Nack => Ok(0),
            _ => Err(CodecError::UnknownStatus),
        }
    }
}

/// Leading ASCII digits as a number, zero when there are none
fn parse_decimal(digits: &[u8]) -> u8 {
    digits
        .iter()
        .take_while(|b| b.is_ascii_digit())
        .fold(0u8, |acc, b| acc.saturating_mul(10).saturating_add(b - b'0'))
}

/// CONTRL: a downlink application message
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Control<'a> {
    pub status: MessageStatus,
    pub network_id: u16,
    /// The slot the server transmits in
    pub slot: u8,
    pub source_id: u8,
    pub destination_id: u8,
    pub payload: &'a [u8],
}

impl<'a> Control<'a> {
    /// Build the CONTRL frame relaying a STATUS payload
    ///
    /// The status, addressing and payload follow the routing policy:
    ///
    /// | Destination        | Status           | Source | Destination | Payload                |
    /// | :---               | :---             | :---   | :---        | :---                   |
    /// | same as source     | `ClientEcho`     | server | source      | as sent                |
    /// | `0` (not found)    | `ClientNotFound` | server | source      | `"DEVICE NOT FOUND"`   |
    /// | `1` (the server)   | `ClientEcho`     | server | source      | `"[Echo]:"` + as sent  |
    /// | any other          | `MessageOk`      | source | destination | as sent                |
    ///
    /// The payload is truncated to `MAX_PAYLOAD_LEN` bytes, prefix included.
    pub fn relay(
        server: &DeviceConfig,
        source_id: u8,
        destination_id: u8,
        payload: &[u8],
    ) -> Result<Frame, CodecError> {
        let server_slot = server.slot_number;
        let none: &[u8] = &[];
        let (status, src, dst, prefix, body) = if destination_id == source_id {
            (MessageStatus::ClientEcho, server_slot, destination_id, none, payload)
        } else if destination_id == 0 {
            (MessageStatus::ClientNotFound, server_slot, source_id, none, NOT_FOUND_NOTICE)
        } else if destination_id == SERVER_SLOT {
            (MessageStatus::ClientEcho, server_slot, source_id, ECHO_PREFIX, payload)
        } else {
            (MessageStatus::MessageOk, source_id, destination_id, none, payload)
        };

        let len = body.len().min(MAX_PAYLOAD_LEN - prefix.len());

        let mut builder = FrameBuilder::new(MessageType::Control, status)?;
        builder
            .put_u16(server.network_id)?
            .put_u8(server_slot)?
            .put_u8(src)?
            .put_u8(dst)?
            .put_slice(prefix)?
            .put_slice(&body[..len])?;
        builder.finish()
    }

    pub fn decode(bytes: &'a [u8]) -> Result<Self, CodecError> {
        let mut rdr = FrameReader::new(bytes, MessageType::Control)?;
        let status = rdr.header().status()?;

        Ok(Control {
            status,
            network_id: rdr.u16()?,
            slot: rdr.u8()?,
            source_id: rdr.u8()?,
            destination_id: rdr.u8()?,
            payload: rdr.rest(),
        })
    }

    /// The payload, if this message is for `device_id` on `network_id`
    pub fn payload_for(&self, network_id: u16, device_id: u8) -> Result<&'a [u8], CodecError> {
        if network_id == 0 || device_id == 0 {
            return Err(CodecError::InvalidParameter);
        }
        if self.network_id != network_id || self.destination_id != device_id {
            return Err(CodecError::NotForThisDevice);
        }
        Ok(self.payload)
    }
}

/// STATUSACK: acknowledgement of a STATUS message
///
/// Defined on the wire, but servers do not send it yet.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusAck {
    pub status: MessageStatus,
    pub network_id: u16,
    pub slot: u8,
    pub destination_id: u8,
}

impl StatusAck {
    /// `client_id` is the table entry of the destination, zero when unknown
    pub fn new(server: &DeviceConfig, client_id: u8, destination_id: u8) -> Self {
        StatusAck {
            status: if client_id == 0 {
                MessageStatus::ClientNotFound
            } else {
                MessageStatus::MessageOk
            },
            network_id: server.network_id,
            slot: server.slot_number,
            destination_id,
        }
    }

    pub fn encode(&self) -> Result<Frame, CodecError> {
        let mut builder = FrameBuilder::new(MessageType::StatusAck, self.status)?;
        builder
            .put_u16(self.network_id)?
            .put_u8(self.slot)?
            .put_u8(self.destination_id)?;
        builder.finish()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut rdr = FrameReader::new(bytes, MessageType::StatusAck)?;
        let status = rdr.header().status()?;

        Ok(StatusAck {
            status,
            network_id: rdr.u16()?,
            slot: rdr.u8()?,
            destination_id: rdr.u8()?,
        })
    }

    pub fn status_for(&self, network_id: u16, device_id: u8) -> Result<MessageStatus, CodecError> {
        if self.network_id != network_id || self.destination_id != device_id {
            return Err(CodecError::NotForThisDevice);
        }
        Ok(self.status)
    }
}
