//! The boundary to the BLE stack.
//!
//! Commands go out through [`GattcStack`]; each either fails right away
//! with a status code or is accepted and completes later as a
//! [`GapEvent`] or [`GattcEvent`] delivered to the dispatch shim.

use super::uuid::BleUuid;
use super::{AddressType, BdAddr, CharacteristicRecord, ConnId, GattInterface, ScanParams};
use crate::error::StackError;

/// Command surface of a BLE stack in central role.
pub trait GattcStack {
    /// Register a GATT client. Completes with [`GattcEvent::Registered`].
    fn register_client(&mut self, app_id: u16) -> Result<(), StackError>;

    /// Completes with [`GapEvent::ScanParamsSet`].
    fn set_scan_params(&mut self, params: &ScanParams) -> Result<(), StackError>;

    /// Completes with [`GapEvent::ScanStarted`], then one
    /// [`GapEvent::AdvertisementReport`] per report until the window
    /// elapses or [`GattcStack::stop_scan`] is called.
    fn start_scan(&mut self, duration_secs: u32) -> Result<(), StackError>;

    fn stop_scan(&mut self) -> Result<(), StackError>;

    /// Completes with [`GattcEvent::Connected`].
    fn connect(
        &mut self,
        interface: GattInterface,
        address: BdAddr,
        address_type: AddressType,
    ) -> Result<(), StackError>;

    /// Results arrive as [`GattcEvent::ServiceFound`] followed by one
    /// [`GattcEvent::SearchComplete`]. `None` searches every service.
    fn search_services(
        &mut self,
        interface: GattInterface,
        connection: ConnId,
        filter: Option<&BleUuid>,
    ) -> Result<(), StackError>;

    /// Number of characteristics declared in `[start_handle, end_handle]`.
    fn characteristic_count(
        &mut self,
        interface: GattInterface,
        connection: ConnId,
        start_handle: u16,
        end_handle: u16,
    ) -> Result<u16, StackError>;

    /// Copy the characteristics in range into `buf`, returning how many
    /// were written.
    fn all_characteristics(
        &mut self,
        interface: GattInterface,
        connection: ConnId,
        start_handle: u16,
        end_handle: u16,
        buf: &mut [CharacteristicRecord],
    ) -> Result<usize, StackError>;
}

impl<T: GattcStack + ?Sized> GattcStack for &mut T {
    fn register_client(&mut self, app_id: u16) -> Result<(), StackError> {
        (**self).register_client(app_id)
    }

    fn set_scan_params(&mut self, params: &ScanParams) -> Result<(), StackError> {
        (**self).set_scan_params(params)
    }

    fn start_scan(&mut self, duration_secs: u32) -> Result<(), StackError> {
        (**self).start_scan(duration_secs)
    }

    fn stop_scan(&mut self) -> Result<(), StackError> {
        (**self).stop_scan()
    }

    fn connect(
        &mut self,
        interface: GattInterface,
        address: BdAddr,
        address_type: AddressType,
    ) -> Result<(), StackError> {
        (**self).connect(interface, address, address_type)
    }

    fn search_services(
        &mut self,
        interface: GattInterface,
        connection: ConnId,
        filter: Option<&BleUuid>,
    ) -> Result<(), StackError> {
        (**self).search_services(interface, connection, filter)
    }

    fn characteristic_count(
        &mut self,
        interface: GattInterface,
        connection: ConnId,
        start_handle: u16,
        end_handle: u16,
    ) -> Result<u16, StackError> {
        (**self).characteristic_count(interface, connection, start_handle, end_handle)
    }

    fn all_characteristics(
        &mut self,
        interface: GattInterface,
        connection: ConnId,
        start_handle: u16,
        end_handle: u16,
        buf: &mut [CharacteristicRecord],
    ) -> Result<usize, StackError> {
        (**self).all_characteristics(interface, connection, start_handle, end_handle, buf)
    }
}

/// One advertising report, borrowed from the stack's buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AdvertisementReport<'a> {
    pub address: BdAddr,
    pub address_type: AddressType,
    pub rssi: i8,
    /// Raw AD structures (advertising data or scan response).
    pub data: &'a [u8],
}

/// Events from the GAP callback surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GapEvent<'a> {
    ScanParamsSet { status: Result<(), StackError> },
    ScanStarted { status: Result<(), StackError> },
    AdvertisementReport(AdvertisementReport<'a>),
    /// The scan duration ran out.
    ScanWindowElapsed,
    /// Confirmation of [`GattcStack::stop_scan`].
    ScanStopped { status: Result<(), StackError> },
}

/// Events from the GATT client callback surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GattcEvent {
    /// Client registration finished; the interface handle is the one the
    /// callback was invoked with.
    Registered {
        status: Result<(), StackError>,
        app_id: u16,
    },
    Connected {
        status: Result<(), StackError>,
        connection: ConnId,
        address: BdAddr,
    },
    Disconnected {
        connection: ConnId,
        reason: u16,
    },
    ServiceFound(super::ServiceHandleRange),
    SearchComplete {
        status: Result<(), StackError>,
    },
}
