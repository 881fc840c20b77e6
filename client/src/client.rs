//! The Client interface
//!
//! This is the primary interface used by clients. It tracks the state
//! of the device's network membership, and processes any incoming or
//! outgoing messages

use {
    crate::Error,
    comms_icd::{
        net::AppMessage, CodecError, Control, DeviceConfig, JoinOptions, JoinRequest,
        JoinResponse, MessageFlag, NetworkBuffer, NetworkExt, NetworkOps, NetworkSlot,
        SharedNetworkBuffer, StatusMessage, SyncBeacon,
    },
};

/// QoS level requested in every JOINREQ
const JOIN_QOS: u8 = 0;

/// Keep-alive requested in every JOINREQ
const JOIN_KEEP_ALIVE: u8 = 1;

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Init,
    /// Waiting for a SYNC while the application has asked to join
    Sync,
    /// Sending JOINREQ in the access slot, waiting for JOINRESP
    JoinRequest,
    /// Holding a slot, exchanging STATUS and CONTRL messages
    Joined,
}

/// The Client interface
///
/// This is the primary interface used by clients. It owns the local
/// [`DeviceConfig`], and is stepped by [`Client::process_one`].
pub struct Client {
    state: ClientState,
    device: DeviceConfig,
    join_once: bool,
}

impl Client {
    /// Create a new client instance
    ///
    /// ## Parameters
    ///
    /// ### `device`
    ///
    /// The local device, typically created with `DeviceConfig::client()`.
    /// Its `total_slots` is the number of slots requested when joining.
    ///
    /// By default the JOINREQ is only sent once per call to
    /// `NetworkBuffer::request_join()`. See [`Client::with_join_once`].
    pub fn new(device: DeviceConfig) -> Self {
        Self {
            state: ClientState::Init,
            device,
            join_once: true,
        }
    }

    /// Repeat the JOINREQ on every SYNC until a JOINRESP arrives
    /// when `once` is false
    pub fn with_join_once(self, once: bool) -> Self {
        Self {
            join_once: once,
            ..self
        }
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn device(&self) -> &DeviceConfig {
        &self.device
    }

    /// Is the client holding a slot?
    pub fn is_joined(&self) -> bool {
        self.state == ClientState::Joined
    }

    /// Give up the current slot and start over
    ///
    /// The application must call `NetworkBuffer::request_join()` again
    /// to rejoin.
    pub fn reset_connection(&mut self, buf: &mut NetworkBuffer) {
        #[cfg(feature = "defmt")] defmt::error!("Resetting Connection.");
        self.state = ClientState::Init;
        self.device.slot_number = 0;
        self.device.network_joined = false;
        buf.flags_mut().joined_state = false;
        buf.clear_application_message();
    }

    /// Process a single step
    ///
    /// This function *must* be called on every slot timer tick, and
    /// whenever the framer reports an `InboundEvent`.
    ///
    /// An error means the step was cut short: nothing that depends on
    /// the failed action was done, and the next call continues from a
    /// consistent state.
    pub fn process_one<O: NetworkOps + ?Sized>(
        &mut self,
        ops: &mut O,
        buf: &mut NetworkBuffer,
    ) -> Result<(), Error> {
        match self.state {
            // =====================================
            // Init
            // =====================================
            ClientState::Init => {
                #[cfg(feature = "defmt")] defmt::info!("Init -> Sync");
                self.state = ClientState::Sync;
                Ok(())
            }

            // =====================================
            // Sync
            // =====================================
            ClientState::Sync => self.sync(ops, buf),

            // =====================================
            // Join Request
            // =====================================
            ClientState::JoinRequest => self.join_request(ops, buf),

            // =====================================
            // Joined
            // =====================================
            ClientState::Joined => {
                let result = self.joined(ops, buf);
                buf.clear_flag();
                result
            }
        }
    }

    /// [`Client::process_one`] against a mailbox shared with the framer
    pub fn process_shared<O: NetworkOps + ?Sized>(
        &mut self,
        ops: &mut O,
        shared: &SharedNetworkBuffer,
    ) -> Result<(), Error> {
        critical_section::with(|cs| self.process_one(ops, &mut shared.borrow_ref_mut(cs)))
    }
}

// Private interfaces for the client. These are largely used to
// process incoming messages and handle state
impl Client {
    /// Process messages while in a `ClientState::Sync` state
    fn sync<O: NetworkOps + ?Sized>(&mut self, ops: &mut O, buf: &mut NetworkBuffer) -> Result<(), Error> {
        if buf.flag_state() != MessageFlag::Sync {
            return Ok(());
        }

        ops.sync_activity();

        let result = if buf.flags().join_request {
            self.begin_join(ops, buf)
        } else {
            Ok(())
        };

        buf.clear_flag();
        result
    }

    fn begin_join<O: NetworkOps + ?Sized>(&mut self, ops: &mut O, buf: &mut NetworkBuffer) -> Result<(), Error> {
        let applied = SyncBeacon::decode(buf.read_message()).map(|sync| self.device.apply_sync(&sync));
        buf.clear_read_message();
        applied?;

        #[cfg(feature = "defmt")] defmt::info!("Sync -> JoinRequest, network {=u16}", self.device.network_id);
        self.state = ClientState::JoinRequest;

        ops.set_timer(&self.device, NetworkSlot::ClientAccess)?;
        Ok(())
    }

    /// Process messages while in a `ClientState::JoinRequest` state
    fn join_request<O: NetworkOps + ?Sized>(&mut self, ops: &mut O, buf: &mut NetworkBuffer) -> Result<(), Error> {
        if buf.flag_state() == MessageFlag::Sync && buf.flags().join_request {
            buf.clear_flag();
            self.send_join_request(ops, buf)?;
        }

        if buf.flag_state() == MessageFlag::JoinResponse {
            let granted = JoinResponse::decode(buf.read_message())
                .and_then(|resp| resp.assigned_slot(&self.device.mac));
            buf.clear_read_message();
            buf.clear_flag();

            self.device.slot_number = match granted {
                Ok(slot) => slot,
                Err(CodecError::NotForThisDevice) => 0,
                Err(e) => return Err(e.into()),
            };

            if self.device.slot_number != 0 {
                ops.clear_activity();
                self.device.network_joined = true;
                buf.flags_mut().joined_state = true;
                buf.flags_mut().join_request = false;

                #[cfg(feature = "defmt")] defmt::info!("JoinRequest -> Joined, slot {=u8}", self.device.slot_number);
                self.state = ClientState::Joined;
                ops.print_joinresp(self.device.slot_number);

                ops.set_timer(&self.device, NetworkSlot::Client)?;
            }
        }

        Ok(())
    }

    fn send_join_request<O: NetworkOps + ?Sized>(&mut self, ops: &mut O, buf: &mut NetworkBuffer) -> Result<(), Error> {
        ops.send_activity();

        let requested = self.device.total_slots;
        let options = JoinOptions::new(JOIN_QOS, JOIN_KEEP_ALIVE)?;
        let frame = JoinRequest::for_device(&self.device, requested, options).encode()?;
        ops.send_frame(&frame)?;

        ops.print_joinreq(requested);

        if self.join_once {
            buf.flags_mut().join_request = false;
        }
        Ok(())
    }

    /// Process messages while in a `ClientState::Joined` state
    fn joined<O: NetworkOps + ?Sized>(&mut self, ops: &mut O, buf: &mut NetworkBuffer) -> Result<(), Error> {
        match buf.flag_state() {
            MessageFlag::Sync => {
                ops.connected_activity();
                self.send_status(ops, buf)
            }
            MessageFlag::Control => {
                let received = self.read_control(buf.read_message());
                buf.clear_read_message();

                if let Some((source_id, payload)) = received? {
                    buf.deliver_network_message(source_id, &payload);
                    ops.recv_activity();
                    ops.print_contrl(source_id, &payload);
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn send_status<O: NetworkOps + ?Sized>(&mut self, ops: &mut O, buf: &mut NetworkBuffer) -> Result<(), Error> {
        let (destination_id, payload) = match buf.application_message() {
            Some(msg) => msg,
            None => return Ok(()),
        };

        ops.send_activity();

        let sent = StatusMessage::for_device(&self.device, destination_id, payload)
            .encode()
            .map_err(Error::from)
            .and_then(|frame| ops.send_frame(&frame).map_err(Error::from));

        if sent.is_ok() {
            ops.print_status(destination_id, payload);
        }

        buf.clear_application_message();
        sent.map(|_| ())
    }

    /// The source and payload of a CONTRL frame addressed to us
    fn read_control(&self, frame: &[u8]) -> Result<Option<(u8, AppMessage)>, Error> {
        let msg = Control::decode(frame)?;

        let payload = match msg.payload_for(self.device.network_id, self.device.slot_number) {
            Ok(payload) if !payload.is_empty() => payload,
            Ok(_) | Err(CodecError::NotForThisDevice) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut out = AppMessage::new();
        let len = payload.len().min(out.capacity());
        // Cannot fail, `len` fits the capacity
        let _ = out.extend_from_slice(&payload[..len]);
        Ok(Some((msg.source_id, out)))
    }
}
