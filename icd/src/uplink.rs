//! # Client Messages
//!
//! These are messages that are sent FROM a client device,
//! TO the server.
//!
//! * [`JoinRequest`] asks the server for one or more slots
//! * [`StatusMessage`] carries an application payload addressed
//!   to another device

use crate::{
    header::{FrameBuilder, FrameReader},
    net::DeviceConfig,
    CodecError, Frame, MacAddress, MessageStatus, MessageType, MAX_PAYLOAD_LEN, RESERVED_SLOTS,
    SERVER_MAX_SLOTS,
};
use serde::{Deserialize, Serialize};

/// Size of the user name and password fields of a JOINREQ
pub const CREDENTIAL_LEN: usize = 10;

/// JOINREQ option bits
///
/// | Bits | Meaning        |
/// | :--- | :---           |
/// | 0..4 | reserved       |
/// | 4    | request slots  |
/// | 5    | keep alive     |
/// | 6..8 | quality of service |
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct JoinOptions {
    pub request_slots: bool,
    pub keep_alive: bool,
    pub qos: u8,
}

impl JoinOptions {
    /// Only QoS and keep-alive values of 0 or 1 are supported
    pub fn new(qos: u8, keep_alive: u8) -> Result<Self, CodecError> {
        if qos > 1 || keep_alive > 1 {
            return Err(CodecError::InvalidParameter);
        }

        Ok(JoinOptions {
            request_slots: false,
            keep_alive: keep_alive == 1,
            qos,
        })
    }

    pub fn to_byte(self) -> u8 {
        ((self.request_slots as u8) << 4) | ((self.keep_alive as u8) << 5) | ((self.qos & 0x03) << 6)
    }

    pub fn from_byte(byte: u8) -> Self {
        JoinOptions {
            request_slots: byte & (1 << 4) != 0,
            keep_alive: byte & (1 << 5) != 0,
            qos: byte >> 6,
        }
    }
}

/// Network credentials, zero padded to `CREDENTIAL_LEN` bytes each
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Credentials {
    user_name: [u8; CREDENTIAL_LEN],
    password: [u8; CREDENTIAL_LEN],
}

impl Credentials {
    pub fn new(user_name: &[u8], password: &[u8]) -> Result<Self, CodecError> {
        if user_name.len() > CREDENTIAL_LEN || password.len() > CREDENTIAL_LEN {
            return Err(CodecError::InvalidParameter);
        }

        let mut creds = Credentials::default();
        creds.user_name[..user_name.len()].copy_from_slice(user_name);
        creds.password[..password.len()].copy_from_slice(password);
        Ok(creds)
    }

    /// The user name, without its zero padding
    pub fn user_name(&self) -> &[u8] {
        let end = self
            .user_name
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(CREDENTIAL_LEN);
        &self.user_name[..end]
    }
}

/// JOINREQ: request admission to the network
///
/// Sent by a client in the access slot after it has seen a SYNC.
/// The payload is the requested slot count followed by the
/// user name and password fields.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinRequest {
    pub source_mac: MacAddress,
    pub destination_mac: MacAddress,
    pub network_id: u16,
    pub slot: u8,
    pub options: JoinOptions,
    pub requested_slots: u8,
    pub credentials: Credentials,
}

impl JoinRequest {
    /// A request from `device`, using the network id it learned from SYNC
    pub fn for_device(device: &DeviceConfig, requested_slots: u8, options: JoinOptions) -> Self {
        JoinRequest {
            source_mac: device.mac,
            destination_mac: MacAddress::ZERO,
            network_id: device.network_id,
            slot: 0,
            options: JoinOptions {
                request_slots: requested_slots != 0,
                ..options
            },
            requested_slots,
            credentials: device.credentials,
        }
    }

    pub fn encode(&self) -> Result<Frame, CodecError> {
        if self.network_id == 0 || self.requested_slots > SERVER_MAX_SLOTS {
            return Err(CodecError::InvalidParameter);
        }

        let mut builder = FrameBuilder::new(MessageType::JoinRequest, MessageStatus::Ack)?;
        builder
            .put_slice(self.source_mac.as_bytes())?
            .put_slice(self.destination_mac.as_bytes())?
            .put_u16(self.network_id)?
            .put_u8(self.slot)?
            .put_u8(self.options.to_byte())?
            .put_u8(self.requested_slots)?
            .put_slice(&self.credentials.user_name)?
            .put_slice(&self.credentials.password)?;
        builder.finish()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut rdr = FrameReader::new(bytes, MessageType::JoinRequest)?;

        Ok(JoinRequest {
            source_mac: MacAddress::from_bytes(rdr.array()?),
            destination_mac: MacAddress::from_bytes(rdr.array()?),
            network_id: rdr.u16()?,
            slot: rdr.u8()?,
            options: JoinOptions::from_byte(rdr.u8()?),
            requested_slots: rdr.u8()?,
            credentials: Credentials {
                user_name: rdr.array()?,
                password: rdr.array()?,
            },
        })
    }
}

/// STATUS: an uplink application message
///
/// Sent by a joined client in its own slot. The server relays the
/// payload to `destination_id` as a CONTRL message.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusMessage<'a> {
    pub network_id: u16,
    pub source_slot: u8,
    pub destination_id: u8,
    pub payload: &'a [u8],
}

impl<'a> StatusMessage<'a> {
    pub fn for_device(device: &DeviceConfig, destination_id: u8, payload: &'a [u8]) -> Self {
        StatusMessage {
            network_id: device.network_id,
            source_slot: device.slot_number,
            destination_id,
            payload,
        }
    }

    /// Payloads longer than `MAX_PAYLOAD_LEN` are truncated
    pub fn encode(&self) -> Result<Frame, CodecError> {
        if self.source_slot <= RESERVED_SLOTS {
            return Err(CodecError::InvalidParameter);
        }

        let len = self.payload.len().min(MAX_PAYLOAD_LEN);
        let mut builder = FrameBuilder::new(MessageType::Status, MessageStatus::Ack)?;
        builder
            .put_u16(self.network_id)?
            .put_u8(self.source_slot)?
            .put_u8(self.destination_id)?
            .put_slice(&self.payload[..len])?;
        builder.finish()
    }

    pub fn decode(bytes: &'a [u8]) -> Result<Self, CodecError> {
        let mut rdr = FrameReader::new(bytes, MessageType::Status)?;

        Ok(StatusMessage {
            network_id: rdr.u16()?,
            source_slot: rdr.u8()?,
            destination_id: rdr.u8()?,
            payload: rdr.rest(),
        })
    }

    /// Accept only messages on `network_id` from a client slot
    pub fn check(&self, network_id: u16) -> Result<(), CodecError> {
        if self.source_slot <= RESERVED_SLOTS {
            return Err(CodecError::InvalidParameter);
        }
        if self.network_id != network_id {
            return Err(CodecError::NotForThisDevice);
        }
        Ok(())
    }
}
