//! The client device table
//!
//! A fixed capacity, append-only registry of admitted clients. Entries
//! are never removed, and client ids are never reused.

use crate::ServerError;
use comms_icd::{DeviceConfig, JoinOptions, MacAddress, CLIENT_TABLE_SIZE, SERVER_MAX_SLOTS};
use core::cell::RefCell;
use critical_section::Mutex;
use heapless::Vec;

/// A single admitted client
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientEntry {
    /// Also the client's first slot
    pub client_id: u8,
    pub mac: MacAddress,
    pub slots: u8,
    pub options: JoinOptions,
}

/// The outcome of a successful [`ClientTable::admit`]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admitted {
    /// A new entry was created at this index
    NewIndex(usize),
    /// The MAC was already registered at this index
    Duplicate(usize),
}

impl Admitted {
    pub fn index(self) -> usize {
        match self {
            Admitted::NewIndex(idx) | Admitted::Duplicate(idx) => idx,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    ById(u8),
    ByMac(MacAddress),
}

/// The client device table
///
/// Every scan and mutation runs inside a critical section, so the
/// table may be read from another context while the server runs.
pub struct ClientTable {
    entries: Mutex<RefCell<Vec<ClientEntry, CLIENT_TABLE_SIZE>>>,
}

impl Default for ClientTable {
    fn default() -> Self {
        ClientTable::new()
    }
}

impl ClientTable {
    pub const fn new() -> Self {
        ClientTable {
            entries: Mutex::new(RefCell::new(Vec::new())),
        }
    }

    /// Register `mac`, or find its existing entry
    ///
    /// A new client gets id `server.total_slots + 1`. The server's
    /// total slot count then grows by the requested slot count, or by
    /// one when one or no slots were requested.
    pub fn admit(
        &self,
        mac: MacAddress,
        requested_slots: u8,
        server: &mut DeviceConfig,
    ) -> Result<Admitted, ServerError> {
        if requested_slots > SERVER_MAX_SLOTS {
            return Err(ServerError::SlotsExceeded);
        }
        if mac.is_zero() {
            return Err(ServerError::InvalidParameter);
        }

        critical_section::with(|cs| {
            let mut entries = self.entries.borrow_ref_mut(cs);

            if let Some(idx) = entries.iter().position(|e| e.mac == mac) {
                return Ok(Admitted::Duplicate(idx));
            }

            let client_id = server
                .total_slots
                .checked_add(1)
                .ok_or(ServerError::SlotsExceeded)?;
            let grant = requested_slots.max(1);
            let total_slots = server
                .total_slots
                .checked_add(grant)
                .ok_or(ServerError::SlotsExceeded)?;

            entries
                .push(ClientEntry {
                    client_id,
                    mac,
                    slots: requested_slots,
                    options: JoinOptions::default(),
                })
                .map_err(|_| ServerError::TableFull)?;

            server.total_slots = total_slots;
            server.device_count = server.device_count.saturating_add(1);
            Ok(Admitted::NewIndex(entries.len() - 1))
        })
    }

    /// The MAC and client id stored at `idx`
    pub fn lookup_by_index(&self, idx: usize) -> Option<(MacAddress, u8)> {
        critical_section::with(|cs| {
            self.entries
                .borrow_ref(cs)
                .get(idx)
                .map(|e| (e.mac, e.client_id))
        })
    }

    /// The MAC and client id of the first matching entry
    pub fn find(&self, by: Lookup) -> Option<(MacAddress, u8)> {
        critical_section::with(|cs| {
            self.entries
                .borrow_ref(cs)
                .iter()
                .find(|e| match by {
                    Lookup::ById(id) => e.client_id == id,
                    Lookup::ByMac(mac) => e.mac == mac,
                })
                .map(|e| (e.mac, e.client_id))
        })
    }

    /// Record the JOINREQ options of the entry at `idx`
    pub fn set_options(&self, idx: usize, options: JoinOptions) {
        critical_section::with(|cs| {
            if let Some(entry) = self.entries.borrow_ref_mut(cs).get_mut(idx) {
                entry.options = options;
            }
        })
    }

    pub fn entry(&self, idx: usize) -> Option<ClientEntry> {
        critical_section::with(|cs| self.entries.borrow_ref(cs).get(idx).copied())
    }

    pub fn len(&self) -> usize {
        critical_section::with(|cs| self.entries.borrow_ref(cs).len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server() -> DeviceConfig {
        DeviceConfig::server("11:22:33:44:55:66".parse().unwrap(), 1441, 5, 3).unwrap()
    }

    fn mac(last: u8) -> MacAddress {
        MacAddress::from_bytes([0xaa, 0xaa, 0xaa, 0xaa, 0xaa, last])
    }

    #[test]
    fn duplicate_and_new() {
        let table = ClientTable::new();
        let mut srv = server();

        assert_eq!(table.admit(mac(0xaa), 1, &mut srv), Ok(Admitted::NewIndex(0)));
        assert_eq!(srv.total_slots, 4);
        assert_eq!(table.lookup_by_index(0), Some((mac(0xaa), 4)));

        assert_eq!(table.admit(mac(0xaa), 1, &mut srv), Ok(Admitted::Duplicate(0)));
        assert_eq!(srv.total_slots, 4);
        assert_eq!(srv.device_count, 1);

        assert_eq!(table.admit(mac(0xbb), 1, &mut srv), Ok(Admitted::NewIndex(1)));
        assert_eq!(srv.total_slots, 5);
        assert_eq!(srv.device_count, 2);
        assert_eq!(table.lookup_by_index(1), Some((mac(0xbb), 5)));
    }

    #[test]
    fn multi_slot_grant() {
        let table = ClientTable::new();
        let mut srv = server();

        table.admit(mac(1), 3, &mut srv).unwrap();
        assert_eq!(srv.total_slots, 6);
        table.admit(mac(2), 0, &mut srv).unwrap();
        assert_eq!(srv.total_slots, 7);
        assert_eq!(table.find(Lookup::ByMac(mac(2))), Some((mac(2), 7)));
    }

    #[test]
    fn rejects() {
        let table = ClientTable::new();
        let mut srv = server();

        assert_eq!(
            table.admit(mac(1), SERVER_MAX_SLOTS + 1, &mut srv),
            Err(ServerError::SlotsExceeded)
        );
        assert_eq!(
            table.admit(MacAddress::ZERO, 1, &mut srv),
            Err(ServerError::InvalidParameter)
        );

        for i in 0..CLIENT_TABLE_SIZE {
            table.admit(mac(i as u8 + 1), 1, &mut srv).unwrap();
        }
        let before = srv.total_slots;
        assert_eq!(table.admit(mac(0xf0), 1, &mut srv), Err(ServerError::TableFull));
        assert_eq!(srv.total_slots, before);

        // Known clients are still recognized when full
        assert_eq!(table.admit(mac(1), 1, &mut srv), Ok(Admitted::Duplicate(0)));
    }

    #[test]
    fn find_and_options() {
        let table = ClientTable::new();
        let mut srv = server();
        table.admit(mac(1), 1, &mut srv).unwrap();

        assert_eq!(table.find(Lookup::ById(4)), Some((mac(1), 4)));
        assert_eq!(table.find(Lookup::ById(5)), None);
        assert_eq!(table.find(Lookup::ById(0)), None);

        let opts = JoinOptions { request_slots: true, keep_alive: true, qos: 0 };
        table.set_options(0, opts);
        assert_eq!(table.entry(0).map(|e| e.options), Some(opts));
        assert_eq!(table.lookup_by_index(3), None);
    }
}
