//! ble-discover firmware for the nRF52840.
//!
//! Brings up the SoftDevice, then runs one discovery: scan for the
//! configured target name, connect, and log every GATT service and
//! characteristic the peripheral exposes.

#![no_std]
#![no_main]

mod softdevice;

use ble_discover::ble::{Dispatcher, LogSink, ServiceTable};
use ble_discover::config::{DiscoveryConfig, TARGET_DEVICE_NAME};
use defmt::{info, unwrap, warn};
use embassy_executor::Spawner;
use embassy_nrf::interrupt::Priority;
use nrf_softdevice::{raw, Softdevice};
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use softdevice::SoftdeviceStack;

type Discovery = Dispatcher<SoftdeviceStack, (LogSink, ServiceTable)>;

#[embassy_executor::task]
async fn softdevice_task(sd: &'static Softdevice) -> ! {
    sd.run_with_callback(softdevice::events::on_ble_event).await
}

#[embassy_executor::task]
async fn discovery_task(sd: &'static Softdevice, discovery: &'static mut Discovery) {
    softdevice::run(sd, discovery).await;

    let (_, table) = discovery.sink();
    match table.outcome() {
        Some(outcome) => info!("discovery finished: {}", outcome),
        None => warn!("discovery stalled in {}", discovery.state()),
    }
    if let Some(target) = table.target() {
        info!(
            "{} ({}): {} services",
            target.name.as_str(),
            target.address,
            table.services().len()
        );
    }
    if table.dropped() > 0 {
        warn!("{} services did not fit in the table", table.dropped());
    }

    softdevice::watch_link(discovery).await;
}

fn softdevice_config() -> nrf_softdevice::Config {
    nrf_softdevice::Config {
        clock: Some(raw::nrf_clock_lf_cfg_t {
            source: raw::NRF_CLOCK_LF_SRC_RC as u8,
            rc_ctiv: 16,
            rc_temp_ctiv: 2,
            accuracy: raw::NRF_CLOCK_LF_ACCURACY_500_PPM as u8,
        }),
        conn_gap: Some(raw::ble_gap_conn_cfg_t {
            conn_count: 1,
            event_length: 6,
        }),
        conn_gatt: Some(raw::ble_gatt_conn_cfg_t { att_mtu: 247 }),
        gatts_attr_tab_size: Some(raw::ble_gatts_cfg_attr_tab_size_t {
            attr_tab_size: raw::BLE_GATTS_ATTR_TAB_SIZE_DEFAULT,
        }),
        gap_role_count: Some(raw::ble_gap_cfg_role_count_t {
            adv_set_count: 1,
            periph_role_count: 0,
            central_role_count: 1,
            central_sec_count: 0,
            _bitfield_1: raw::ble_gap_cfg_role_count_t::new_bitfield_1(0),
        }),
        gap_device_name: Some(raw::ble_gap_cfg_device_name_t {
            p_value: b"ble-discover" as *const u8 as _,
            current_len: 12,
            max_len: 12,
            write_perm: unsafe { core::mem::zeroed() },
            _bitfield_1: raw::ble_gap_cfg_device_name_t::new_bitfield_1(
                raw::BLE_GATTS_VLOC_STACK as u8,
            ),
        }),
        ..Default::default()
    }
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("ble-discover starting, target \"{}\"", TARGET_DEVICE_NAME);

    // The SoftDevice reserves priorities 0, 1 and 4.
    let mut nrf_config = embassy_nrf::config::Config::default();
    nrf_config.gpiote_interrupt_priority = Priority::P2;
    nrf_config.time_interrupt_priority = Priority::P2;
    let _p = embassy_nrf::init(nrf_config);

    let sd = Softdevice::enable(&softdevice_config());
    unwrap!(spawner.spawn(softdevice_task(sd)));

    static DISCOVERY: StaticCell<Discovery> = StaticCell::new();
    let discovery = DISCOVERY.init(Dispatcher::new(
        DiscoveryConfig::default(),
        SoftdeviceStack::new(),
        (LogSink, ServiceTable::new()),
    ));
    unwrap!(spawner.spawn(discovery_task(sd, discovery)));
}
