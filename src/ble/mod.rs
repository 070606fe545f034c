//! Bluetooth Low Energy central-role discovery.
//!
//! This module drives a BLE stack in **Central** role through one run:
//!
//! 1. **Advertisement filter** - picks the target peripheral out of scan
//!    reports by its advertised local name.
//! 2. **Orchestrator** - register → scan → stop scan + connect → search
//!    services → enumerate characteristics, one event at a time.
//! 3. **Dispatch shim** - receives the stack's GAP and GATT client
//!    callbacks and routes them to the orchestrator.
//!
//! The stack itself is only reached through [`stack::GattcStack`].

pub mod adv_parser;
pub mod characteristics;
pub mod dispatch;
pub mod orchestrator;
pub mod report;
pub mod session;
pub mod stack;
pub mod uuid;

#[cfg(test)]
mod tests;

use core::fmt;

use heapless::String;

pub use characteristics::{enumerate, CharacteristicList};
pub use dispatch::Dispatcher;
pub use orchestrator::{DiscoveryState, Orchestrator};
pub use report::{DiscoverySink, LogSink, ServiceTable};
pub use session::Session;
pub use stack::{AdvertisementReport, GapEvent, GattcEvent, GattcStack};
pub use uuid::BleUuid;

/// 48-bit device address, most significant byte first.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct BdAddr(pub [u8; 6]);

impl fmt::Display for BdAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}", a, b, c, d, e, g)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for BdAddr {
    fn format(&self, f: defmt::Formatter) {
        let [a, b, c, d, e, g] = self.0;
        defmt::write!(
            f,
            "{=u8:02x}:{=u8:02x}:{=u8:02x}:{=u8:02x}:{=u8:02x}:{=u8:02x}",
            a,
            b,
            c,
            d,
            e,
            g
        )
    }
}

/// Kind of device address.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AddressType {
    #[default]
    Public,
    RandomStatic,
    RandomResolvable,
    RandomNonResolvable,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ScanType {
    /// Send scan requests so scan-response data (names) comes back.
    Active,
    Passive,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ScanFilterPolicy {
    AcceptAll,
    AcceptListOnly,
}

/// Scan parameter bundle. Interval and window are in 0.625 ms units.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ScanParams {
    pub scan_type: ScanType,
    pub own_address_type: AddressType,
    pub filter_policy: ScanFilterPolicy,
    pub interval: u16,
    pub window: u16,
}

impl ScanParams {
    /// Scan interval in milliseconds.
    pub fn interval_ms(&self) -> f32 {
        self.interval as f32 * 0.625
    }

    /// Scan window in milliseconds.
    pub fn window_ms(&self) -> f32 {
        self.window as f32 * 0.625
    }
}

/// GATT client interface handle, assigned by the stack at registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GattInterface(pub u8);

impl GattInterface {
    /// Events tagged with this interface concern every client.
    pub const NONE: GattInterface = GattInterface(0xFF);
}

/// Connection id, valid while the link is up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConnId(pub u16);

/// A primary service and the attribute handles it spans.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ServiceHandleRange {
    pub start_handle: u16,
    pub end_handle: u16,
    pub uuid: BleUuid,
}

impl fmt::Display for ServiceHandleRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "uuid={} handles=0x{:04x}-0x{:04x}",
            self.uuid, self.start_handle, self.end_handle
        )
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for ServiceHandleRange {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(
            f,
            "uuid={} handles=0x{=u16:04x}-0x{=u16:04x}",
            self.uuid,
            self.start_handle,
            self.end_handle
        )
    }
}

/// A characteristic declaration found inside a service.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CharacteristicRecord {
    pub uuid: BleUuid,
    /// Value handle.
    pub handle: u16,
}

impl fmt::Display for CharacteristicRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "uuid={} handle=0x{:04x}", self.uuid, self.handle)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for CharacteristicRecord {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "uuid={} handle=0x{=u16:04x}", self.uuid, self.handle)
    }
}

/// The peripheral picked out of the scan.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DiscoveredDevice {
    pub address: BdAddr,
    pub address_type: AddressType,
    /// Advertised name (truncated to 32 bytes for `heapless::String`).
    pub name: String<32>,
    /// Received Signal Strength Indicator (dBm).
    pub rssi: i8,
}

impl DiscoveredDevice {
    pub fn from_report(report: &AdvertisementReport<'_>) -> Self {
        let mut name = String::new();
        for c in adv_parser::local_name(report.data).unwrap_or("Unknown").chars() {
            if name.push(c).is_err() {
                break;
            }
        }
        Self {
            address: report.address,
            address_type: report.address_type,
            name,
            rssi: report.rssi,
        }
    }
}
