//! Device configuration and the protocol mailbox
//!
//! [`NetworkBuffer`] is the single point of contention between the
//! receive path (the [`Framer`](crate::framer::Framer)) and the state
//! machine that consumes its messages. It holds at most one pending
//! inbound message at a time.

use crate::{
    downlink::SyncBeacon, uplink::Credentials, CodecError, Frame, MacAddress, ACCESS_SLOT,
    BROADCAST_SLOT, MAX_SLOT_TIME, NET_DATA_LENGTH, SERVER_MAX_SLOTS, SERVER_SLOT,
};
use core::cell::RefCell;
use heapless::Vec;
use serde::{Deserialize, Serialize};

/// Configuration and link state of the local device
///
/// Owned by the state machine driving the device. Servers and
/// clients use the same shape:
///
/// * On a server, `slot_number` is the server slot and `total_slots`
///   grows as clients are admitted.
/// * On a client, `total_slots` is the number of slots to request,
///   and `slot_number` is the id granted by the server.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub mac: MacAddress,
    pub network_id: u16,
    pub network_access_slot: u8,
    pub slot_number: u8,
    /// Slot length in milliseconds
    pub slot_time: u16,
    pub total_slots: u8,
    pub network_joined: bool,
    pub device_count: u8,
    pub credentials: Credentials,
}

impl DeviceConfig {
    /// A server coordinating `network_id`
    ///
    /// `total_slots` is the starting slot count, normally the three
    /// reserved slots.
    pub fn server(
        mac: MacAddress,
        network_id: u16,
        slot_time: u16,
        total_slots: u8,
    ) -> Result<Self, CodecError> {
        if mac.is_zero() || network_id == 0 || slot_time == 0 || slot_time > MAX_SLOT_TIME {
            return Err(CodecError::InvalidParameter);
        }

        Ok(DeviceConfig {
            mac,
            network_id,
            network_access_slot: ACCESS_SLOT,
            slot_number: SERVER_SLOT,
            slot_time,
            total_slots,
            network_joined: false,
            device_count: 0,
            credentials: Credentials::default(),
        })
    }

    /// A client that will ask for `requested_slots` slots when joining
    pub fn client(mac: MacAddress, requested_slots: u8) -> Result<Self, CodecError> {
        if mac.is_zero() || requested_slots > SERVER_MAX_SLOTS {
            return Err(CodecError::InvalidParameter);
        }

        Ok(DeviceConfig {
            mac,
            network_id: 0,
            network_access_slot: 0,
            slot_number: 0,
            slot_time: 0,
            total_slots: requested_slots,
            network_joined: false,
            device_count: 0,
            credentials: Credentials::default(),
        })
    }

    pub fn with_credentials(self, credentials: Credentials) -> Self {
        DeviceConfig { credentials, ..self }
    }

    /// Take the network id and slot timing from a received beacon
    pub fn apply_sync(&mut self, sync: &SyncBeacon<'_>) {
        self.network_id = sync.network_id;
        self.network_access_slot = sync.access_slot;
        self.slot_time = sync.slot_time;
    }

    /// Serialize into `buf`, for keeping in non-volatile storage
    pub fn store<'b>(&self, buf: &'b mut [u8]) -> Result<&'b mut [u8], CodecError> {
        postcard::to_slice(self, buf).map_err(|_| CodecError::Persist)
    }

    pub fn restore(bytes: &[u8]) -> Result<Self, CodecError> {
        postcard::from_bytes(bytes).map_err(|_| CodecError::Persist)
    }
}

/// The slot a timer is armed for
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkSlot {
    /// The server beacon. Ranked after every assigned slot.
    Sync,
    Access,
    Broadcast,
    /// The access slot a client learned from SYNC
    ClientAccess,
    /// The slot a client was granted in its JOINRESP
    Client,
}

impl NetworkSlot {
    pub fn slot_number(self, device: &DeviceConfig) -> u8 {
        match self {
            NetworkSlot::Sync => device.total_slots,
            NetworkSlot::Access => ACCESS_SLOT,
            NetworkSlot::Broadcast => BROADCAST_SLOT,
            NetworkSlot::ClientAccess => device.network_access_slot,
            NetworkSlot::Client => device.slot_number,
        }
    }
}

/// Which message is waiting in the read buffer
///
/// The values match the message type tags.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum MessageFlag {
    #[default]
    Clear = 0,
    Sync = 1,
    JoinRequest = 2,
    JoinResponse = 3,
    Status = 4,
    StatusAck = 5,
    Control = 6,
}

/// Flags shared between the application and the state machines
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AppFlags {
    /// Client: the application wants to join
    pub join_request: bool,
    /// Server: the next valid JOINREQ may be admitted
    pub join_response: bool,
    /// Client: a JOINRESP granted a slot
    pub joined_state: bool,
    /// An outbound application message is queued
    pub application_message_ready: bool,
    /// An inbound network message waits for the application
    pub network_message_ready: bool,
    /// Server: an upstream gateway link is up
    pub gateway_connected: bool,
}

impl AppFlags {
    pub const fn new() -> Self {
        AppFlags {
            join_request: false,
            join_response: false,
            joined_state: false,
            application_message_ready: false,
            network_message_ready: false,
            gateway_connected: false,
        }
    }
}

/// Errors returned to the application when queueing a message
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxError {
    NotJoined,
    Busy,
}

/// An application payload and the device id it travels to or from
pub type AppMessage = Vec<u8, NET_DATA_LENGTH>;

/// The protocol mailbox
#[derive(Debug)]
pub struct NetworkBuffer {
    read_message: Frame,
    flag_state: MessageFlag,
    flags: AppFlags,
    application_message: AppMessage,
    destination_id: u8,
    network_message: AppMessage,
    source_id: u8,
}

/// A mailbox shared between interrupt and thread context
pub type SharedNetworkBuffer = critical_section::Mutex<RefCell<NetworkBuffer>>;

impl Default for NetworkBuffer {
    fn default() -> Self {
        NetworkBuffer::new()
    }
}

impl NetworkBuffer {
    pub const fn new() -> Self {
        NetworkBuffer {
            read_message: Vec::new(),
            flag_state: MessageFlag::Clear,
            flags: AppFlags::new(),
            application_message: Vec::new(),
            destination_id: 0,
            network_message: Vec::new(),
            source_id: 0,
        }
    }

    /// Place a validated frame in the read buffer
    ///
    /// Any message that was still pending is replaced.
    pub fn publish(&mut self, flag: MessageFlag, frame: &[u8]) -> Result<(), CodecError> {
        self.read_message.clear();
        self.flag_state = MessageFlag::Clear;
        self.read_message
            .extend_from_slice(frame)
            .map_err(|_| CodecError::BufferFull)?;
        self.flag_state = flag;
        Ok(())
    }

    pub fn read_message(&self) -> &[u8] {
        &self.read_message
    }

    pub fn clear_read_message(&mut self) {
        self.read_message.clear();
    }

    pub fn flag_state(&self) -> MessageFlag {
        self.flag_state
    }

    pub fn clear_flag(&mut self) {
        self.flag_state = MessageFlag::Clear;
    }

    pub fn flags(&self) -> &AppFlags {
        &self.flags
    }

    pub fn flags_mut(&mut self) -> &mut AppFlags {
        &mut self.flags
    }

    /// Ask a client to join the network on the next SYNC
    pub fn request_join(&mut self) {
        self.flags.join_request = true;
    }

    /// Allow a server to admit the next valid JOINREQ
    pub fn enable_join_response(&mut self) {
        self.flags.join_response = true;
    }

    pub fn is_joined(&self) -> bool {
        self.flags.joined_state
    }

    pub fn set_gateway_connected(&mut self, connected: bool) {
        self.flags.gateway_connected = connected;
    }

    /// Queue `payload` for device `destination_id`
    ///
    /// Sent as a STATUS message on the next SYNC. Payloads longer than
    /// `NET_DATA_LENGTH` are truncated; the stored length is returned.
    pub fn queue_application_message(
        &mut self,
        destination_id: u8,
        payload: &[u8],
    ) -> Result<usize, MailboxError> {
        if !self.flags.joined_state {
            return Err(MailboxError::NotJoined);
        }
        if self.flags.application_message_ready {
            return Err(MailboxError::Busy);
        }

        let len = payload.len().min(NET_DATA_LENGTH);
        self.application_message.clear();
        // Cannot fail, `len` fits the capacity
        let _ = self.application_message.extend_from_slice(&payload[..len]);
        self.destination_id = destination_id;
        self.flags.application_message_ready = true;
        Ok(len)
    }

    /// The queued outbound message, if any
    pub fn application_message(&self) -> Option<(u8, &[u8])> {
        if self.flags.application_message_ready {
            Some((self.destination_id, &self.application_message))
        } else {
            None
        }
    }

    pub fn clear_application_message(&mut self) {
        self.application_message.clear();
        self.flags.application_message_ready = false;
    }

    /// Hand an inbound payload from `source_id` to the application
    pub fn deliver_network_message(&mut self, source_id: u8, payload: &[u8]) {
        let len = payload.len().min(NET_DATA_LENGTH);
        self.network_message.clear();
        let _ = self.network_message.extend_from_slice(&payload[..len]);
        self.source_id = source_id;
        self.flags.network_message_ready = true;
    }

    /// Take the inbound payload and its source id
    pub fn take_network_message(&mut self) -> Option<(u8, AppMessage)> {
        if !self.flags.network_message_ready {
            return None;
        }
        self.flags.network_message_ready = false;
        Some((self.source_id, core::mem::take(&mut self.network_message)))
    }
}
