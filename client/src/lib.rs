//! # The Sensor Network Client Library
//!
//! This crate is used by devices acting as a Client of the sensor network.
//!
//! A [`Client`] is driven by calling [`Client::process_one`] once per slot
//! timer tick and once per received message. It never blocks: each call
//! looks at the pending message in the shared [`NetworkBuffer`], takes at
//! most one step, and returns.

#![cfg_attr(not(test), no_std)]

pub use {
    crate::client::{Client, ClientState},
    comms_icd::{
        self, CodecError, DeviceConfig, MessageFlag, NetworkBuffer, NetworkOps, OpsError,
        SharedNetworkBuffer,
    },
};

mod client;

/// The main Client error type
///
/// Errors are never fatal. The client stays in a consistent state and
/// the next tick carries on from there.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    Codec(CodecError),
    Ops(OpsError),
}

impl From<CodecError> for Error {
    fn from(other: CodecError) -> Self {
        Error::Codec(other)
    }
}

impl From<OpsError> for Error {
    fn from(other: OpsError) -> Self {
        Error::Ops(other)
    }
}
