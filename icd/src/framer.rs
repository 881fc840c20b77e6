//! The receive framer
//!
//! Bytes arrive one at a time from the receive interrupt. The framer
//! assembles them until it sees the `"\rt"` terminator, validates the
//! frame, and publishes it to the [`NetworkBuffer`] for the state
//! machine to consume.

use crate::{
    checksum,
    header::Header,
    net::{MessageFlag, NetworkBuffer, SharedNetworkBuffer},
    ops::NetworkOps,
    Frame, MessageType, HEADER_LEN, MIN_FRAME_LEN, TERMINATOR,
};

/// Which side of the link this framer listens for
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Accepts SYNC, JOINRESP, STATUSACK and CONTRL
    Client,
    /// Accepts JOINREQ and STATUS
    Server,
}

impl Role {
    fn accepts(self, ty: MessageType) -> Option<MessageFlag> {
        match (self, ty) {
            (Role::Client, MessageType::Sync) => Some(MessageFlag::Sync),
            (Role::Client, MessageType::JoinResponse) => Some(MessageFlag::JoinResponse),
            (Role::Client, MessageType::StatusAck) => Some(MessageFlag::StatusAck),
            (Role::Client, MessageType::Control) => Some(MessageFlag::Control),
            (Role::Server, MessageType::JoinRequest) => Some(MessageFlag::JoinRequest),
            (Role::Server, MessageType::Status) => Some(MessageFlag::Status),
            _ => None,
        }
    }
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundEvent {
    /// A message is waiting in the read buffer
    MessageReady(MessageFlag),
}

/// Byte-at-a-time frame assembly
pub struct Framer {
    role: Role,
    buf: Frame,
}

impl Framer {
    pub const fn new(role: Role) -> Self {
        Framer {
            role,
            buf: Frame::new(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Bytes of the frame assembled so far
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn reset(&mut self) {
        self.buf.clear();
    }

    /// Feed one received byte
    ///
    /// Returns an event when a complete, valid frame for this role was
    /// published to `mailbox`. Damaged frames and frames meant for the
    /// other role are dropped without an event.
    pub fn feed<O: NetworkOps + ?Sized>(
        &mut self,
        ops: &mut O,
        mailbox: &mut NetworkBuffer,
        byte: u8,
    ) -> Option<InboundEvent> {
        let flag = self.accumulate(ops, byte)?;
        let published = mailbox.publish(flag, &self.buf);
        self.buf.clear();
        published.ok().map(|_| InboundEvent::MessageReady(flag))
    }

    /// Like [`Framer::feed`], for a mailbox shared with another context
    ///
    /// Assembly happens outside of the critical section; only the
    /// publish into the read buffer is done inside of it.
    pub fn feed_shared<O: NetworkOps + ?Sized>(
        &mut self,
        ops: &mut O,
        mailbox: &SharedNetworkBuffer,
        byte: u8,
    ) -> Option<InboundEvent> {
        let flag = self.accumulate(ops, byte)?;
        let published = critical_section::with(|cs| {
            mailbox.borrow_ref_mut(cs).publish(flag, &self.buf)
        });
        self.buf.clear();
        published.ok().map(|_| InboundEvent::MessageReady(flag))
    }

    /// Push `byte`, returning the flag of a completed frame
    ///
    /// On `Some`, the frame is still held in `self.buf`.
    fn accumulate<O: NetworkOps + ?Sized>(&mut self, ops: &mut O, byte: u8) -> Option<MessageFlag> {
        if self.buf.push(byte).is_err() {
            #[cfg(feature = "defmt")]
            defmt::warn!("Framer overflow, dropping {=usize} bytes", self.buf.len());
            self.buf.clear();
            return None;
        }

        let len = self.buf.len();
        if len < TERMINATOR.len() || self.buf[len - TERMINATOR.len()..] != TERMINATOR {
            return None;
        }

        ops.clear_recv_interrupt();

        let flag = self.validate(ops);
        if flag.is_none() {
            self.buf.clear();
        }
        flag
    }

    fn validate<O: NetworkOps + ?Sized>(&self, ops: &mut O) -> Option<MessageFlag> {
        let len = self.buf.len();
        if len < MIN_FRAME_LEN {
            return None;
        }

        let header = Header::parse(&self.buf).ok()?;
        if header.frame_len() != len {
            #[cfg(feature = "defmt")]
            defmt::warn!("Dropping frame with bad length");
            return None;
        }
        if header.message_checksum != checksum(&self.buf, HEADER_LEN, len) {
            #[cfg(feature = "defmt")]
            defmt::warn!("Dropping frame with bad checksum");
            return None;
        }

        let ty = header.message_type().ok()?;
        if ty.preamble() != Some(header.preamble) {
            return None;
        }
        let flag = self.role.accepts(ty)?;

        if flag == MessageFlag::Sync {
            ops.reset_timer();
        }

        Some(flag)
    }
}
