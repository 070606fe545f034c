//! Application-wide constants and compile-time configuration.
//!
//! The target name, scan parameters and buffer sizes live here so they
//! can be tuned in one place.

use crate::ble::{AddressType, ScanFilterPolicy, ScanParams, ScanType};

// BLE

/// Advertised local name of the peripheral to connect to.
pub const TARGET_DEVICE_NAME: &str = "TargetDevice";

/// Application id used when registering the GATT client.
pub const GATTC_APP_ID: u16 = 0;

/// Duration of the BLE scan window (seconds).
pub const BLE_SCAN_DURATION_SECS: u32 = 60;

/// Scan parameters: active scan, 50 ms interval, 23.125 ms window.
pub const BLE_SCAN_PARAMS: ScanParams = ScanParams {
    scan_type: ScanType::Active,
    own_address_type: AddressType::Public,
    filter_policy: ScanFilterPolicy::AcceptAll,
    interval: 0x50,
    window: 0x25,
};

/// BLE connection interval range (in 1.25 ms units).
pub const BLE_CONN_INTERVAL_MIN: u16 = 6;
pub const BLE_CONN_INTERVAL_MAX: u16 = 24;

/// BLE slave latency (number of connection events the peripheral can skip).
pub const BLE_SLAVE_LATENCY: u16 = 0;

/// BLE supervision timeout (in 10 ms units). 400 = 4 s.
pub const BLE_SUP_TIMEOUT: u16 = 400;

// GATT discovery

/// Services remembered per discovery run.
pub const MAX_SERVICES: usize = 16;

/// Capacity of the per-service characteristic buffer. A service declaring
/// more characteristics than this is skipped with an allocation error.
pub const MAX_CHARACTERISTICS_PER_SERVICE: usize = 16;

/// How long the firmware waits for service search to complete after
/// connecting before giving up (seconds).
pub const SERVICE_SEARCH_TIMEOUT_SECS: u64 = 30;

/// Everything the discovery state machine needs to know up front.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DiscoveryConfig {
    /// Local name matched against advertisement reports.
    pub target_name: &'static str,
    /// Application id passed to client registration.
    pub app_id: u16,
    /// Scan window length handed to the stack.
    pub scan_duration_secs: u32,
    /// Scan parameter bundle set before registration.
    pub scan_params: ScanParams,
}

impl DiscoveryConfig {
    /// Compile-time defaults with a different target name.
    pub const fn new(target_name: &'static str) -> Self {
        Self {
            target_name,
            app_id: GATTC_APP_ID,
            scan_duration_secs: BLE_SCAN_DURATION_SECS,
            scan_params: BLE_SCAN_PARAMS,
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self::new(TARGET_DEVICE_NAME)
    }
}
