//! # The Sensor Network Server Library
//!
//! This crate is used by devices acting as the Server of the sensor network.
//!
//! The [`Server`] owns the slot schedule. Every cycle it broadcasts a
//! SYNC beacon, listens for a JOINREQ or STATUS message, answers with a
//! JOINRESP or CONTRL in the broadcast slot, and starts the next cycle.
//! It is stepped by [`Server::process_one`] on every slot timer tick.

#![cfg_attr(not(test), no_std)]

use comms_icd::{
    net::AppMessage, Control, JoinRequest, JoinResponse, MessageStatus, NetworkExt,
    NetworkSlot, StatusMessage, SyncBeacon, SERVER_SLOT,
};

pub use {
    crate::table::{Admitted, ClientEntry, ClientTable, Lookup},
    comms_icd::{
        self, CodecError, DeviceConfig, MessageFlag, NetworkBuffer, NetworkOps, OpsError,
        SharedNetworkBuffer,
    },
};

pub mod table;

/// Sent back to a client when its message cannot reach the gateway
pub const GATEWAY_OFFLINE_NOTICE: &[u8] = b"Gateway Offline";

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerError {
    TableFull,
    SlotsExceeded,
    InvalidParameter,
    NotImplemented,
    Codec(CodecError),
    Ops(OpsError),
}

impl From<CodecError> for ServerError {
    fn from(other: CodecError) -> Self {
        ServerError::Codec(other)
    }
}

impl From<OpsError> for ServerError {
    fn from(other: OpsError) -> Self {
        ServerError::Ops(other)
    }
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Start,
    /// Broadcasting the SYNC beacon
    Sync,
    /// Waiting for an uplink message
    MsgRead,
    JoinRequest,
    JoinResponse,
    StatusMsg,
    /// Reserved, never entered by the server itself
    StatusAck,
    ControlMsg,
}

/// Where STATUS messages addressed to the server go
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerMode {
    /// Echoed back to the sender
    Local,
    /// Handed to the application, which forwards them to a gateway
    Gateway,
}

/// An admitted JOINREQ waiting for its JOINRESP
#[derive(Debug, Clone, Copy)]
struct PendingJoin {
    requester: comms_icd::MacAddress,
    admitted: Result<Admitted, ServerError>,
}

/// A STATUS message waiting to be relayed as CONTRL
#[derive(Debug, Default)]
struct PendingRelay {
    source_id: u8,
    destination_id: u8,
    payload: AppMessage,
}

/// The Server interface
pub struct Server {
    state: ServerState,
    mode: ServerMode,
    device: DeviceConfig,
    table: ClientTable,
    join: Option<PendingJoin>,
    relay: PendingRelay,
}

// Public Interfaces
impl Server {
    /// Create a new server with an empty client table
    ///
    /// `device` is typically created with `DeviceConfig::server()`.
    /// Its `total_slots` grows by one or more for every admitted client.
    pub fn new(device: DeviceConfig, mode: ServerMode) -> Self {
        Server {
            state: ServerState::Start,
            mode,
            device,
            table: ClientTable::new(),
            join: None,
            relay: PendingRelay::default(),
        }
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    pub fn mode(&self) -> ServerMode {
        self.mode
    }

    pub fn device(&self) -> &DeviceConfig {
        &self.device
    }

    pub fn table(&self) -> &ClientTable {
        &self.table
    }

    /// Process a single step
    ///
    /// This function *must* be called on every slot timer tick.
    ///
    /// A step that fails before its frame is sent is retried on the
    /// next call. Once a frame is out, the server moves on even if
    /// arming the next timer fails, and the error is returned.
    pub fn process_one<O: NetworkOps + ?Sized>(
        &mut self,
        ops: &mut O,
        buf: &mut NetworkBuffer,
    ) -> Result<(), ServerError> {
        match self.state {
            // =====================================
            // Start
            // =====================================
            ServerState::Start => {
                ops.set_timer(&self.device, NetworkSlot::Sync)?;
                #[cfg(feature = "defmt")] defmt::info!("Start -> Sync");
                self.state = ServerState::Sync;
                Ok(())
            }

            // =====================================
            // Sync
            // =====================================
            ServerState::Sync => {
                ops.sync_activity();
                let frame = SyncBeacon::new(self.device.network_id, self.device.slot_time)
                    .encode()?;
                ops.send_frame(&frame)?;
                self.state = ServerState::MsgRead;
                Ok(())
            }

            // =====================================
            // Message Read
            // =====================================
            ServerState::MsgRead => {
                ops.clear_activity();
                self.state = match buf.flag_state() {
                    MessageFlag::JoinRequest => ServerState::JoinRequest,
                    MessageFlag::Status => ServerState::StatusMsg,
                    MessageFlag::StatusAck => ServerState::StatusAck,
                    _ => ServerState::Sync,
                };
                buf.clear_flag();
                Ok(())
            }

            // =====================================
            // Join Request
            // =====================================
            ServerState::JoinRequest => {
                let result = self.join_request(ops, buf);
                buf.clear_flag();
                buf.clear_read_message();
                result
            }

            // =====================================
            // Join Response
            // =====================================
            ServerState::JoinResponse => self.join_response(ops),

            // =====================================
            // Status Message
            // =====================================
            ServerState::StatusMsg => {
                let result = self.status_msg(ops, buf);
                buf.clear_flag();
                buf.clear_read_message();
                result
            }

            // =====================================
            // Status Acknowledgement
            // =====================================
            ServerState::StatusAck => {
                #[cfg(feature = "defmt")] defmt::warn!("STATUSACK is not handled by the server");
                buf.clear_read_message();
                self.state = ServerState::MsgRead;
                Err(ServerError::NotImplemented)
            }

            // =====================================
            // Control Message
            // =====================================
            ServerState::ControlMsg => self.control_msg(ops, buf),
        }
    }

    /// Process a single step on a mailbox shared with the receive interrupt
    pub fn process_shared<O: NetworkOps + ?Sized>(
        &mut self,
        ops: &mut O,
        shared: &SharedNetworkBuffer,
    ) -> Result<(), ServerError> {
        critical_section::with(|cs| self.process_one(ops, &mut shared.borrow_ref_mut(cs)))
    }
}

// Private interfaces
impl Server {
    fn join_request<O: NetworkOps + ?Sized>(
        &mut self,
        ops: &mut O,
        buf: &mut NetworkBuffer,
    ) -> Result<(), ServerError> {
        ops.recv_activity();

        let accepting = buf.flags().join_response;
        buf.flags_mut().join_response = false;

        let req = match JoinRequest::decode(buf.read_message()) {
            Ok(req) => req,
            Err(e) => {
                self.state = ServerState::Sync;
                return Err(e.into());
            }
        };

        let authorized = accepting
            && req.network_id == self.device.network_id
            && req.credentials == self.device.credentials;
        if !authorized {
            #[cfg(feature = "defmt")] defmt::warn!("Rejected JOINREQ from {}", req.source_mac);
            self.state = ServerState::Sync;
            return Ok(());
        }

        let admitted = self
            .table
            .admit(req.source_mac, req.requested_slots, &mut self.device);
        if let Ok(Admitted::NewIndex(idx)) = admitted {
            self.table.set_options(idx, req.options);
            #[cfg(feature = "defmt")] defmt::info!("Admitted {} at index {=usize}", req.source_mac, idx);
        }

        self.join = Some(PendingJoin {
            requester: req.source_mac,
            admitted,
        });
        self.state = ServerState::JoinResponse;
        ops.set_timer(&self.device, NetworkSlot::Broadcast)?;
        Ok(())
    }

    fn join_response<O: NetworkOps + ?Sized>(&mut self, ops: &mut O) -> Result<(), ServerError> {
        let pending = match self.join {
            Some(pending) => pending,
            None => {
                self.state = ServerState::Sync;
                return Ok(());
            }
        };

        ops.send_activity();

        let found = pending
            .admitted
            .ok()
            .and_then(|adm| self.table.lookup_by_index(adm.index()).map(|e| (adm, e)));
        let (status, mac, client_id) = match found {
            Some((Admitted::NewIndex(_), (mac, id))) => (MessageStatus::Ack, mac, id),
            Some((Admitted::Duplicate(_), (mac, id))) => (MessageStatus::Dup, mac, id),
            None => (MessageStatus::Nack, pending.requester, 0),
        };

        let frame = JoinResponse::new(&self.device, status, mac, client_id).encode()?;
        ops.send_frame(&frame)?;
        #[cfg(feature = "defmt")] defmt::info!("JOINRESP {} id {=u8}", status, client_id);

        self.join = None;
        self.state = ServerState::Sync;
        ops.set_timer(&self.device, NetworkSlot::Sync)?;
        Ok(())
    }

    fn status_msg<O: NetworkOps + ?Sized>(
        &mut self,
        ops: &mut O,
        buf: &mut NetworkBuffer,
    ) -> Result<(), ServerError> {
        ops.recv_activity();

        let decoded = StatusMessage::decode(buf.read_message())
            .and_then(|msg| msg.check(self.device.network_id).map(|_| msg));
        let msg = match decoded {
            Ok(msg) => msg,
            Err(e) => {
                self.state = ServerState::Sync;
                return Err(e.into());
            }
        };

        self.relay.source_id = msg.source_slot;
        self.relay.destination_id = msg.destination_id;
        self.relay.payload.clear();
        let len = msg.payload.len().min(self.relay.payload.capacity());
        // Cannot fail, `len` fits the capacity
        let _ = self.relay.payload.extend_from_slice(&msg.payload[..len]);

        if msg.destination_id == SERVER_SLOT {
            if self.mode == ServerMode::Local {
                self.state = ServerState::ControlMsg;
                return Ok(());
            }

            let known = self.table.find(Lookup::ById(msg.source_slot)).is_some();
            if known && buf.flags().gateway_connected {
                buf.deliver_network_message(self.relay.source_id, &self.relay.payload);
                self.relay = PendingRelay::default();
                self.state = ServerState::Sync;
                return Ok(());
            }
        } else if self.table.find(Lookup::ById(msg.destination_id)).is_none() {
            self.relay.destination_id = 0;
        }

        self.state = ServerState::ControlMsg;
        ops.set_timer(&self.device, NetworkSlot::Broadcast)?;
        Ok(())
    }

    fn control_msg<O: NetworkOps + ?Sized>(
        &mut self,
        ops: &mut O,
        buf: &NetworkBuffer,
    ) -> Result<(), ServerError> {
        ops.send_activity();

        let relay = &self.relay;
        let gateway_offline = self.mode == ServerMode::Gateway && !buf.flags().gateway_connected;
        let frame = if gateway_offline {
            Control::relay(
                &self.device,
                self.device.slot_number,
                relay.source_id,
                GATEWAY_OFFLINE_NOTICE,
            )?
        } else {
            Control::relay(
                &self.device,
                relay.source_id,
                relay.destination_id,
                &relay.payload,
            )?
        };
        ops.send_frame(&frame)?;

        self.relay = PendingRelay::default();
        self.state = ServerState::Sync;
        ops.set_timer(&self.device, NetworkSlot::Sync)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use comms_icd::{Credentials, JoinOptions, MacAddress};
    use std::vec::Vec;

    #[derive(Default)]
    struct Recorder {
        sent: Vec<Vec<u8>>,
        armed: Vec<(u16, u8)>,
        fail_send: bool,
    }

    impl NetworkOps for Recorder {
        fn send(&mut self, frame: &[u8]) -> Result<usize, OpsError> {
            if self.fail_send {
                return Err(OpsError::SendFailed);
            }
            self.sent.push(frame.to_vec());
            Ok(frame.len())
        }

        fn arm_slot_timer(&mut self, slot_time_ms: u16, slot_number: u8) -> Result<(), OpsError> {
            self.armed.push((slot_time_ms, slot_number));
            Ok(())
        }
    }

    fn server_mac() -> MacAddress {
        "11:22:33:44:55:66".parse().unwrap()
    }

    fn client_mac() -> MacAddress {
        "20:20:14:15:16:17".parse().unwrap()
    }

    fn server(mode: ServerMode) -> Server {
        let dev = DeviceConfig::server(server_mac(), 1441, 5, 3).unwrap();
        Server::new(dev, mode)
    }

    fn join_frame(mac: MacAddress, network_id: u16, credentials: Credentials) -> comms_icd::Frame {
        let mut dev = DeviceConfig::client(mac, 1).unwrap().with_credentials(credentials);
        dev.network_id = network_id;
        JoinRequest::for_device(&dev, 1, JoinOptions::new(0, 1).unwrap())
            .encode()
            .unwrap()
    }

    fn status_frame(source: u8, dest: u8, payload: &[u8]) -> comms_icd::Frame {
        status_frame_on(1441, source, dest, payload)
    }

    fn status_frame_on(network_id: u16, source: u8, dest: u8, payload: &[u8]) -> comms_icd::Frame {
        let mut dev = DeviceConfig::client(client_mac(), 1).unwrap();
        dev.network_id = network_id;
        dev.slot_number = source;
        StatusMessage::for_device(&dev, dest, payload).encode().unwrap()
    }

    /// Run Start, Sync, then MsgRead with `flag` pending
    fn to_read(srv: &mut Server, ops: &mut Recorder, buf: &mut NetworkBuffer, flag: MessageFlag, frame: &[u8]) {
        while srv.state() != ServerState::MsgRead {
            srv.process_one(ops, buf).unwrap();
        }
        buf.publish(flag, frame).unwrap();
        srv.process_one(ops, buf).unwrap();
    }

    fn admit(srv: &mut Server, ops: &mut Recorder, buf: &mut NetworkBuffer, mac: MacAddress) {
        buf.enable_join_response();
        let frame = join_frame(mac, 1441, Credentials::default());
        to_read(srv, ops, buf, MessageFlag::JoinRequest, &frame);
        srv.process_one(ops, buf).unwrap();
        srv.process_one(ops, buf).unwrap();
        assert_eq!(srv.state(), ServerState::Sync);
    }

    #[test]
    fn start_and_sync() {
        let mut srv = server(ServerMode::Local);
        let mut ops = Recorder::default();
        let mut buf = NetworkBuffer::new();

        srv.process_one(&mut ops, &mut buf).unwrap();
        assert_eq!(srv.state(), ServerState::Sync);
        assert_eq!(ops.armed, [(5, 3)]);

        srv.process_one(&mut ops, &mut buf).unwrap();
        assert_eq!(srv.state(), ServerState::MsgRead);
        let sync = SyncBeacon::decode(&ops.sent[0]).unwrap();
        assert_eq!(sync.network_id, 1441);
        assert_eq!(sync.slot_time, 5);
        assert_eq!(sync.payload, b"sync");

        // Nothing pending
        srv.process_one(&mut ops, &mut buf).unwrap();
        assert_eq!(srv.state(), ServerState::Sync);
    }

    #[test]
    fn sync_retried_after_send_failure() {
        let mut srv = server(ServerMode::Local);
        let mut ops = Recorder::default();
        let mut buf = NetworkBuffer::new();

        srv.process_one(&mut ops, &mut buf).unwrap();
        ops.fail_send = true;
        assert_eq!(
            srv.process_one(&mut ops, &mut buf),
            Err(ServerError::Ops(OpsError::SendFailed))
        );
        assert_eq!(srv.state(), ServerState::Sync);
    }

    #[test]
    fn join_accepted() {
        let mut srv = server(ServerMode::Local);
        let mut ops = Recorder::default();
        let mut buf = NetworkBuffer::new();
        buf.enable_join_response();

        let frame = join_frame(client_mac(), 1441, Credentials::default());
        to_read(&mut srv, &mut ops, &mut buf, MessageFlag::JoinRequest, &frame);
        assert_eq!(srv.state(), ServerState::JoinRequest);

        srv.process_one(&mut ops, &mut buf).unwrap();
        assert_eq!(srv.state(), ServerState::JoinResponse);
        assert!(!buf.flags().join_response);
        assert!(buf.read_message().is_empty());
        assert_eq!(srv.device().total_slots, 4);

        srv.process_one(&mut ops, &mut buf).unwrap();
        assert_eq!(srv.state(), ServerState::Sync);

        let resp = JoinResponse::decode(ops.sent.last().unwrap()).unwrap();
        assert_eq!(resp.status, MessageStatus::Ack);
        assert_eq!(resp.client_id, 4);
        assert_eq!(resp.destination_mac, client_mac());
        assert_eq!(resp.source_mac, server_mac());

        // Broadcast slot for the reply, then the new sync slot
        assert_eq!(ops.armed, [(5, 3), (5, 3), (5, 4)]);
        let opts = srv.table().entry(0).map(|e| e.options).unwrap();
        assert!(opts.request_slots);
        assert!(opts.keep_alive);
        assert_eq!(opts.qos, 0);
    }

    #[test]
    fn duplicate_join() {
        let mut srv = server(ServerMode::Local);
        let mut ops = Recorder::default();
        let mut buf = NetworkBuffer::new();

        admit(&mut srv, &mut ops, &mut buf, client_mac());
        admit(&mut srv, &mut ops, &mut buf, client_mac());

        let resp = JoinResponse::decode(ops.sent.last().unwrap()).unwrap();
        assert_eq!(resp.status, MessageStatus::Dup);
        assert_eq!(resp.client_id, 4);
        assert_eq!(srv.device().total_slots, 4);
    }

    #[test]
    fn join_not_enabled() {
        let mut srv = server(ServerMode::Local);
        let mut ops = Recorder::default();
        let mut buf = NetworkBuffer::new();

        let frame = join_frame(client_mac(), 1441, Credentials::default());
        to_read(&mut srv, &mut ops, &mut buf, MessageFlag::JoinRequest, &frame);
        srv.process_one(&mut ops, &mut buf).unwrap();

        assert_eq!(srv.state(), ServerState::Sync);
        assert!(srv.table().is_empty());
        assert!(buf.read_message().is_empty());
    }

    #[test]
    fn join_wrong_network_or_credentials() {
        let mut srv = server(ServerMode::Local);
        let mut ops = Recorder::default();
        let mut buf = NetworkBuffer::new();

        buf.enable_join_response();
        let frame = join_frame(client_mac(), 1442, Credentials::default());
        to_read(&mut srv, &mut ops, &mut buf, MessageFlag::JoinRequest, &frame);
        srv.process_one(&mut ops, &mut buf).unwrap();
        assert_eq!(srv.state(), ServerState::Sync);

        buf.enable_join_response();
        let creds = Credentials::new(b"mallory", b"guess").unwrap();
        let frame = join_frame(client_mac(), 1441, creds);
        to_read(&mut srv, &mut ops, &mut buf, MessageFlag::JoinRequest, &frame);
        srv.process_one(&mut ops, &mut buf).unwrap();
        assert_eq!(srv.state(), ServerState::Sync);

        assert!(srv.table().is_empty());
    }

    #[test]
    fn table_full_is_nacked() {
        let mut srv = server(ServerMode::Local);
        let mut ops = Recorder::default();
        let mut buf = NetworkBuffer::new();

        for i in 0..comms_icd::CLIENT_TABLE_SIZE {
            admit(&mut srv, &mut ops, &mut buf, MacAddress::from_bytes([2, 0, 0, 0, 0, i as u8 + 1]));
        }
        let late = MacAddress::from_bytes([2, 0, 0, 0, 0, 0xf0]);
        admit(&mut srv, &mut ops, &mut buf, late);

        let resp = JoinResponse::decode(ops.sent.last().unwrap()).unwrap();
        assert_eq!(resp.status, MessageStatus::Nack);
        assert_eq!(resp.client_id, 0);
        assert_eq!(resp.destination_mac, late);
    }

    #[test]
    fn status_relayed() {
        let mut srv = server(ServerMode::Local);
        let mut ops = Recorder::default();
        let mut buf = NetworkBuffer::new();
        admit(&mut srv, &mut ops, &mut buf, client_mac());
        admit(&mut srv, &mut ops, &mut buf, MacAddress::from_bytes([2, 0, 0, 0, 0, 5]));

        to_read(&mut srv, &mut ops, &mut buf, MessageFlag::Status, &status_frame(4, 5, b"hello"));
        srv.process_one(&mut ops, &mut buf).unwrap();
        assert_eq!(srv.state(), ServerState::ControlMsg);
        assert_eq!(ops.armed.last(), Some(&(5, 3)));

        srv.process_one(&mut ops, &mut buf).unwrap();
        assert_eq!(srv.state(), ServerState::Sync);
        assert_eq!(ops.armed.last(), Some(&(5, 5)));

        let ctl = Control::decode(ops.sent.last().unwrap()).unwrap();
        assert_eq!(ctl.status, MessageStatus::MessageOk);
        assert_eq!(ctl.source_id, 4);
        assert_eq!(ctl.destination_id, 5);
        assert_eq!(ctl.payload, b"hello");
    }

    #[test]
    fn status_unknown_destination() {
        let mut srv = server(ServerMode::Local);
        let mut ops = Recorder::default();
        let mut buf = NetworkBuffer::new();
        admit(&mut srv, &mut ops, &mut buf, client_mac());

        to_read(&mut srv, &mut ops, &mut buf, MessageFlag::Status, &status_frame(4, 9, b"hello"));
        srv.process_one(&mut ops, &mut buf).unwrap();
        srv.process_one(&mut ops, &mut buf).unwrap();

        let ctl = Control::decode(ops.sent.last().unwrap()).unwrap();
        assert_eq!(ctl.status, MessageStatus::ClientNotFound);
        assert_eq!(ctl.source_id, SERVER_SLOT);
        assert_eq!(ctl.destination_id, 4);
        assert_eq!(ctl.payload, b"DEVICE NOT FOUND");
    }

    #[test]
    fn status_to_server_echoed_in_local_mode() {
        let mut srv = server(ServerMode::Local);
        let mut ops = Recorder::default();
        let mut buf = NetworkBuffer::new();
        admit(&mut srv, &mut ops, &mut buf, client_mac());

        to_read(&mut srv, &mut ops, &mut buf, MessageFlag::Status, &status_frame(4, SERVER_SLOT, b"hi"));
        let armed = ops.armed.len();
        srv.process_one(&mut ops, &mut buf).unwrap();
        assert_eq!(srv.state(), ServerState::ControlMsg);
        assert_eq!(ops.armed.len(), armed);

        srv.process_one(&mut ops, &mut buf).unwrap();
        let ctl = Control::decode(ops.sent.last().unwrap()).unwrap();
        assert_eq!(ctl.status, MessageStatus::ClientEcho);
        assert_eq!(ctl.destination_id, 4);
        assert_eq!(ctl.payload, b"[Echo]:hi");
    }

    #[test]
    fn bad_status_dropped() {
        let mut srv = server(ServerMode::Local);
        let mut ops = Recorder::default();
        let mut buf = NetworkBuffer::new();

        let frame = status_frame_on(1442, 4, 5, b"hello");
        to_read(&mut srv, &mut ops, &mut buf, MessageFlag::Status, &frame);
        assert_eq!(
            srv.process_one(&mut ops, &mut buf),
            Err(ServerError::Codec(CodecError::NotForThisDevice))
        );
        assert_eq!(srv.state(), ServerState::Sync);
        assert!(buf.read_message().is_empty());
    }

    #[test]
    fn gateway_connected_delivers() {
        let mut srv = server(ServerMode::Gateway);
        let mut ops = Recorder::default();
        let mut buf = NetworkBuffer::new();
        admit(&mut srv, &mut ops, &mut buf, client_mac());
        buf.set_gateway_connected(true);

        to_read(&mut srv, &mut ops, &mut buf, MessageFlag::Status, &status_frame(4, SERVER_SLOT, b"temp=21"));
        let sent = ops.sent.len();
        srv.process_one(&mut ops, &mut buf).unwrap();

        assert_eq!(srv.state(), ServerState::Sync);
        assert_eq!(ops.sent.len(), sent);
        let (source, payload) = buf.take_network_message().unwrap();
        assert_eq!(source, 4);
        assert_eq!(payload, b"temp=21");
    }

    #[test]
    fn gateway_offline_notice() {
        let mut srv = server(ServerMode::Gateway);
        let mut ops = Recorder::default();
        let mut buf = NetworkBuffer::new();
        admit(&mut srv, &mut ops, &mut buf, client_mac());

        to_read(&mut srv, &mut ops, &mut buf, MessageFlag::Status, &status_frame(4, SERVER_SLOT, b"temp=21"));
        srv.process_one(&mut ops, &mut buf).unwrap();
        assert_eq!(srv.state(), ServerState::ControlMsg);
        srv.process_one(&mut ops, &mut buf).unwrap();

        let ctl = Control::decode(ops.sent.last().unwrap()).unwrap();
        assert_eq!(ctl.status, MessageStatus::MessageOk);
        assert_eq!(ctl.source_id, SERVER_SLOT);
        assert_eq!(ctl.destination_id, 4);
        assert_eq!(ctl.payload, GATEWAY_OFFLINE_NOTICE);
        assert!(buf.take_network_message().is_none());
    }

    #[test]
    fn status_ack_not_implemented() {
        let mut srv = server(ServerMode::Local);
        let mut ops = Recorder::default();
        let mut buf = NetworkBuffer::new();

        to_read(&mut srv, &mut ops, &mut buf, MessageFlag::StatusAck, b"ignored");
        assert_eq!(srv.state(), ServerState::StatusAck);
        assert_eq!(srv.process_one(&mut ops, &mut buf), Err(ServerError::NotImplemented));
        assert_eq!(srv.state(), ServerState::MsgRead);
    }
}
