//! The hardware capability port
//!
//! The state machines never touch a radio, timer, or LED directly.
//! Everything goes through a [`NetworkOps`] implementation, supplied by
//! the board support code. Every method has a no-op default, so an
//! implementation only provides the capabilities its board has.

use crate::{
    net::{DeviceConfig, NetworkSlot},
    NET_MTU_SIZE,
};
use core::fmt::Write;
use heapless::String;

/// Errors reported by a [`NetworkOps`] implementation
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpsError {
    SendFailed,
    TimerArmFailed,
}

/// Capabilities the protocol needs from the hardware
pub trait NetworkOps {
    /// Transmit a complete frame, returning the number of bytes sent
    fn send(&mut self, frame: &[u8]) -> Result<usize, OpsError> {
        Ok(frame.len())
    }

    /// Arm the one-shot slot timer to fire at `slot_number`
    fn arm_slot_timer(&mut self, _slot_time_ms: u16, _slot_number: u8) -> Result<(), OpsError> {
        Ok(())
    }

    /// Restart the slot timer from zero, aligning it to a received SYNC
    fn reset_timer(&mut self) {}

    /// Mask the receive interrupt while a complete frame is handled
    fn clear_recv_interrupt(&mut self) {}

    fn sync_activity(&mut self) {}
    fn send_activity(&mut self) {}
    fn recv_activity(&mut self) {}
    fn clear_activity(&mut self) {}
    fn connected_activity(&mut self) {}

    fn debug_joinreq(&mut self, _line: &str) {}
    fn debug_joinresp(&mut self, _line: &str) {}
    fn debug_status(&mut self, _line: &str) {}
    fn debug_contrl(&mut self, _line: &str) {}
}

/// A [`NetworkOps`] built from plain function pointers
///
/// Capabilities that are not provided fall back to the trait defaults.
///
/// ```
/// # use comms_icd::ops::{Callbacks, NetworkOps, OpsError};
/// fn uart_send(frame: &[u8]) -> Result<usize, OpsError> {
///     Ok(frame.len())
/// }
///
/// let mut ops = Callbacks::new().with_send(uart_send);
/// assert_eq!(ops.send(b"frame"), Ok(5));
/// ```
#[derive(Clone, Copy, Default)]
pub struct Callbacks {
    send: Option<fn(&[u8]) -> Result<usize, OpsError>>,
    arm_slot_timer: Option<fn(u16, u8) -> Result<(), OpsError>>,
    reset_timer: Option<fn()>,
    clear_recv_interrupt: Option<fn()>,
    sync_activity: Option<fn()>,
    send_activity: Option<fn()>,
    recv_activity: Option<fn()>,
    clear_activity: Option<fn()>,
    connected_activity: Option<fn()>,
    debug_joinreq: Option<fn(&str)>,
    debug_joinresp: Option<fn(&str)>,
    debug_status: Option<fn(&str)>,
    debug_contrl: Option<fn(&str)>,
}

impl Callbacks {
    pub const fn new() -> Self {
        Callbacks {
            send: None,
            arm_slot_timer: None,
            reset_timer: None,
            clear_recv_interrupt: None,
            sync_activity: None,
            send_activity: None,
            recv_activity: None,
            clear_activity: None,
            connected_activity: None,
            debug_joinreq: None,
            debug_joinresp: None,
            debug_status: None,
            debug_contrl: None,
        }
    }

    pub const fn with_send(self, f: fn(&[u8]) -> Result<usize, OpsError>) -> Self {
        Callbacks { send: Some(f), ..self }
    }

    pub const fn with_timer(self, arm: fn(u16, u8) -> Result<(), OpsError>, reset: fn()) -> Self {
        Callbacks {
            arm_slot_timer: Some(arm),
            reset_timer: Some(reset),
            ..self
        }
    }

    pub const fn with_clear_recv_interrupt(self, f: fn()) -> Self {
        Callbacks {
            clear_recv_interrupt: Some(f),
            ..self
        }
    }

    pub const fn with_sync_activity(self, f: fn()) -> Self {
        Callbacks { sync_activity: Some(f), ..self }
    }

    pub const fn with_send_activity(self, f: fn()) -> Self {
        Callbacks { send_activity: Some(f), ..self }
    }

    pub const fn with_recv_activity(self, f: fn()) -> Self {
        Callbacks { recv_activity: Some(f), ..self }
    }

    pub const fn with_clear_activity(self, f: fn()) -> Self {
        Callbacks { clear_activity: Some(f), ..self }
    }

    pub const fn with_connected_activity(self, f: fn()) -> Self {
        Callbacks {
            connected_activity: Some(f),
            ..self
        }
    }

    /// One sink for every kind of debug line
    pub const fn with_debug(self, f: fn(&str)) -> Self {
        Callbacks {
            debug_joinreq: Some(f),
            debug_joinresp: Some(f),
            debug_status: Some(f),
            debug_contrl: Some(f),
            ..self
        }
    }

    pub const fn with_debug_joinreq(self, f: fn(&str)) -> Self {
        Callbacks { debug_joinreq: Some(f), ..self }
    }

    pub const fn with_debug_joinresp(self, f: fn(&str)) -> Self {
        Callbacks { debug_joinresp: Some(f), ..self }
    }

    pub const fn with_debug_status(self, f: fn(&str)) -> Self {
        Callbacks { debug_status: Some(f), ..self }
    }

    pub const fn with_debug_contrl(self, f: fn(&str)) -> Self {
        Callbacks { debug_contrl: Some(f), ..self }
    }

    fn call(f: Option<fn()>) {
        if let Some(f) = f {
            f()
        }
    }

    fn print(sink: Option<fn(&str)>, line: &str) {
        if let Some(f) = sink {
            f(line)
        }
    }
}

impl NetworkOps for Callbacks {
    fn send(&mut self, frame: &[u8]) -> Result<usize, OpsError> {
        match self.send {
            Some(f) => f(frame),
            None => Ok(frame.len()),
        }
    }

    fn arm_slot_timer(&mut self, slot_time_ms: u16, slot_number: u8) -> Result<(), OpsError> {
        match self.arm_slot_timer {
            Some(f) => f(slot_time_ms, slot_number),
            None => Ok(()),
        }
    }

    fn reset_timer(&mut self) {
        Self::call(self.reset_timer)
    }

    fn clear_recv_interrupt(&mut self) {
        Self::call(self.clear_recv_interrupt)
    }

    fn sync_activity(&mut self) {
        Self::call(self.sync_activity)
    }

    fn send_activity(&mut self) {
        Self::call(self.send_activity)
    }

    fn recv_activity(&mut self) {
        Self::call(self.recv_activity)
    }

    fn clear_activity(&mut self) {
        Self::call(self.clear_activity)
    }

    fn connected_activity(&mut self) {
        Self::call(self.connected_activity)
    }

    fn debug_joinreq(&mut self, line: &str) {
        Self::print(self.debug_joinreq, line)
    }

    fn debug_joinresp(&mut self, line: &str) {
        Self::print(self.debug_joinresp, line)
    }

    fn debug_status(&mut self, line: &str) {
        Self::print(self.debug_status, line)
    }

    fn debug_contrl(&mut self, line: &str) {
        Self::print(self.debug_contrl, line)
    }
}

/// A formatted debug line
pub type DebugLine = String<NET_MTU_SIZE>;

/// Protocol level helpers on top of any [`NetworkOps`]
pub trait NetworkExt: NetworkOps {
    /// Send a frame, refusing empty ones
    fn send_frame(&mut self, frame: &[u8]) -> Result<usize, OpsError> {
        if frame.is_empty() {
            return Err(OpsError::SendFailed);
        }
        self.send(frame)
    }

    /// Arm the slot timer for `slot`, using the timing in `device`
    fn set_timer(&mut self, device: &DeviceConfig, slot: NetworkSlot) -> Result<(), OpsError> {
        let slot_number = slot.slot_number(device);
        if device.slot_time == 0 || slot_number == 0 {
            return Err(OpsError::TimerArmFailed);
        }
        self.arm_slot_timer(device.slot_time, slot_number)
    }

    fn print_joinreq(&mut self, requested_slots: u8) {
        let mut line = DebugLine::new();
        let _ = write!(line, "JOINREQ (SL:{})", requested_slots);
        self.debug_joinreq(&line);
    }

    fn print_joinresp(&mut self, client_id: u8) {
        let mut line = DebugLine::new();
        let _ = write!(line, "JOINRESP (ID:{})", client_id);
        self.debug_joinresp(&line);
    }

    fn print_status(&mut self, destination_id: u8, payload: &[u8]) {
        let line = payload_line("STATUS (DID", destination_id, payload);
        self.debug_status(&line);
    }

    fn print_contrl(&mut self, source_id: u8, payload: &[u8]) {
        let line = payload_line("CONTRL (SID", source_id, payload);
        self.debug_contrl(&line);
    }
}

impl<T: NetworkOps + ?Sized> NetworkExt for T {}

/// `"<tag>:<id> LEN:<len>) DATA: '<payload>'"`, cut at the line capacity
fn payload_line(tag: &str, id: u8, payload: &[u8]) -> DebugLine {
    let mut line = DebugLine::new();
    let _ = write!(line, "{}:{} LEN:{}) DATA: '", tag, id, payload.len());
    for b in payload {
        let c = if b.is_ascii_graphic() || *b == b' ' { *b as char } else { '.' };
        // Leave room for the closing quote
        if line.len() + 2 > line.capacity() || line.push(c).is_err() {
            break;
        }
    }
    let _ = line.push('\'');
    line
}
