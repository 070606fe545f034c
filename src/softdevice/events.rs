//! Raw SoftDevice events the discovery driver waits on, and conversions
//! between SoftDevice and library types.
//!
//! [`on_ble_event`] runs inside the SoftDevice event loop. It copies the
//! few events the driver needs out of the event buffer and queues them on
//! [`RESPONSES`]; everything else is left to nrf-softdevice.

use ble_discover::ble::{AddressType, BdAddr, BleUuid, CharacteristicRecord, ServiceHandleRange};
use defmt::warn;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use heapless::Vec;
use nrf_softdevice::ble::{self, Address};
use nrf_softdevice::raw;

/// Entries kept from one discovery response. The SoftDevice packs at most
/// a handful per event.
pub const RESPONSE_BATCH: usize = 8;

/// A discovery response or link loss, copied out of the event buffer.
#[derive(Clone)]
pub enum GattResponse {
    Services {
        conn_handle: u16,
        gatt_status: u16,
        services: Vec<ServiceHandleRange, RESPONSE_BATCH>,
    },
    Characteristics {
        conn_handle: u16,
        gatt_status: u16,
        characteristics: Vec<CharacteristicRecord, RESPONSE_BATCH>,
    },
    Disconnected {
        conn_handle: u16,
        reason: u8,
    },
}

pub static RESPONSES: Channel<CriticalSectionRawMutex, GattResponse, 4> = Channel::new();

/// Callback for `Softdevice::run_with_callback`.
pub fn on_ble_event(evt: *const raw::ble_evt_t) {
    // SAFETY: the SoftDevice hands us a valid event for the duration of
    // the call, and `capture` copies everything it keeps.
    if let Some(response) = unsafe { capture(evt) } {
        if RESPONSES.try_send(response).is_err() {
            warn!("GATT response dropped, queue full");
        }
    }
}

unsafe fn capture(evt: *const raw::ble_evt_t) -> Option<GattResponse> {
    match (*evt).header.evt_id as u32 {
        raw::BLE_GAP_EVTS_BLE_GAP_EVT_DISCONNECTED => {
            let gap_evt = &(*evt).evt.gap_evt;
            Some(GattResponse::Disconnected {
                conn_handle: gap_evt.conn_handle,
                reason: gap_evt.params.disconnected.reason,
            })
        }
        raw::BLE_GATTC_EVTS_BLE_GATTC_EVT_PRIM_SRVC_DISC_RSP => {
            let gattc_evt = &(*evt).evt.gattc_evt;
            let rsp = &gattc_evt.params.prim_srvc_disc_rsp;
            let services = rsp
                .services
                .as_slice(rsp.count as usize)
                .iter()
                .take(RESPONSE_BATCH)
                .map(|s| ServiceHandleRange {
                    start_handle: s.handle_range.start_handle,
                    end_handle: s.handle_range.end_handle,
                    uuid: uuid(&s.uuid),
                })
                .collect();
            Some(GattResponse::Services {
                conn_handle: gattc_evt.conn_handle,
                gatt_status: gattc_evt.gatt_status,
                services,
            })
        }
        raw::BLE_GATTC_EVTS_BLE_GATTC_EVT_CHAR_DISC_RSP => {
            let gattc_evt = &(*evt).evt.gattc_evt;
            let rsp = &gattc_evt.params.char_disc_rsp;
            let characteristics = rsp
                .chars
                .as_slice(rsp.count as usize)
                .iter()
                .take(RESPONSE_BATCH)
                .map(|c| CharacteristicRecord {
                    uuid: uuid(&c.uuid),
                    handle: c.handle_value,
                })
                .collect();
            Some(GattResponse::Characteristics {
                conn_handle: gattc_evt.conn_handle,
                gatt_status: gattc_evt.gatt_status,
                characteristics,
            })
        }
        _ => None,
    }
}

/// Convert a SoftDevice UUID. Vendor UUIDs are expanded to their full
/// 128-bit value; if that fails the 16-bit alias is kept.
pub fn uuid(raw_uuid: &raw::ble_uuid_t) -> BleUuid {
    if raw_uuid.type_ as u32 == raw::BLE_UUID_TYPE_BLE {
        return BleUuid::Uuid16(raw_uuid.uuid);
    }
    let mut len = 0u8;
    let mut bytes = [0u8; 16];
    let ret = unsafe { raw::sd_ble_uuid_encode(raw_uuid, &mut len, bytes.as_mut_ptr()) };
    if ret == raw::NRF_SUCCESS && len == 16 {
        BleUuid::Uuid128(bytes)
    } else {
        BleUuid::Uuid16(raw_uuid.uuid)
    }
}

/// SoftDevice addresses are least significant byte first.
pub fn bd_addr(address: &Address) -> BdAddr {
    let mut bytes = address.bytes();
    bytes.reverse();
    BdAddr(bytes)
}

pub fn sd_address(address: BdAddr, address_type: AddressType) -> Address {
    let mut bytes = address.0;
    bytes.reverse();
    Address::new(sd_address_type(address_type), bytes)
}

pub fn address_type(address_type: ble::AddressType) -> AddressType {
    match address_type {
        ble::AddressType::Public => AddressType::Public,
        ble::AddressType::RandomStatic => AddressType::RandomStatic,
        ble::AddressType::RandomPrivateResolvable => AddressType::RandomResolvable,
        ble::AddressType::RandomPrivateNonResolvable | ble::AddressType::Anonymous => {
            AddressType::RandomNonResolvable
        }
    }
}

fn sd_address_type(address_type: AddressType) -> ble::AddressType {
    match address_type {
        AddressType::Public => ble::AddressType::Public,
        AddressType::RandomStatic => ble::AddressType::RandomStatic,
        AddressType::RandomResolvable => ble::AddressType::RandomPrivateResolvable,
        AddressType::RandomNonResolvable => ble::AddressType::RandomPrivateNonResolvable,
    }
}
