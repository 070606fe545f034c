//! The single session record of a discovery run.

use super::{ConnId, GattInterface};

/// Interface handle and connection id.
///
/// Only the orchestrator writes it, and only when registration or
/// connection events arrive. Everyone else gets `&Session`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Session {
    interface: Option<GattInterface>,
    connection: Option<ConnId>,
}

impl Session {
    pub const fn new() -> Self {
        Self {
            interface: None,
            connection: None,
        }
    }

    pub fn interface(&self) -> Option<GattInterface> {
        self.interface
    }

    /// Connection id, `Some` only while connected.
    pub fn connection(&self) -> Option<ConnId> {
        self.connection
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Interface and connection together, as GATT queries need both.
    pub fn link(&self) -> Option<(GattInterface, ConnId)> {
        Some((self.interface?, self.connection?))
    }

    /// Set once; later calls keep the first handle.
    pub(crate) fn bind_interface(&mut self, interface: GattInterface) {
        if self.interface.is_none() {
            self.interface = Some(interface);
        }
    }

    pub(crate) fn open(&mut self, connection: ConnId) {
        self.connection = Some(connection);
    }

    pub(crate) fn close(&mut self) -> Option<ConnId> {
        self.connection.take()
    }
}
