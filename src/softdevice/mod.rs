//! [`GattcStack`] on top of the Nordic SoftDevice S140.
//!
//! The SoftDevice has no GATT client registration and its central API is
//! async rather than callback based. [`SoftdeviceStack`] therefore only
//! queues commands; [`run`] carries each one out with nrf-softdevice and
//! feeds the completion back into the dispatcher as a stack event, in the
//! order the commands were issued.
//!
//! Service search discovers every primary service and its characteristics
//! up front. The characteristic queries the orchestrator makes per search
//! result are then answered from that cache.

pub mod events;

use ble_discover::ble::{
    AddressType, AdvertisementReport, BdAddr, BleUuid, CharacteristicRecord, ConnId,
    DiscoverySink, DiscoveryState, Dispatcher, GapEvent, GattInterface, GattcEvent, GattcStack,
    ScanParams, ScanType, ServiceHandleRange,
};
use ble_discover::config::{self, MAX_SERVICES, SERVICE_SEARCH_TIMEOUT_SECS};
use ble_discover::error::StackError;
use defmt::{debug, info, warn};
use embassy_futures::select::{select, Either};
use embassy_time::{Duration, Timer};
use heapless::{Deque, Vec};
use nrf_softdevice::ble::central::{self, ConnectError, ScanError};
use nrf_softdevice::ble::{Address, Connection};
use nrf_softdevice::{raw, Softdevice};

use events::{GattResponse, RESPONSES};

/// The SoftDevice serves a single client; every event carries this handle.
pub const INTERFACE: GattInterface = GattInterface(0);

/// Characteristics cached across all services of one search.
const CACHED_CHARACTERISTICS: usize = 64;

/// A command accepted by [`SoftdeviceStack`], waiting for [`run`].
#[derive(Clone, Copy, defmt::Format)]
enum Request {
    ScanParams,
    Register { app_id: u16 },
    Scan { duration_secs: u32 },
    StopScan,
    Connect { address: BdAddr, address_type: AddressType },
    Search { filter: Option<BleUuid> },
}

/// Why a service search ended early.
enum SearchError {
    Status(StackError),
    Disconnected { reason: u8 },
}

pub struct SoftdeviceStack {
    requests: Deque<Request, 4>,
    scan_params: ScanParams,
    connection: Option<Connection>,
    services: Vec<ServiceHandleRange, MAX_SERVICES>,
    characteristics: Vec<CharacteristicRecord, CACHED_CHARACTERISTICS>,
}

impl SoftdeviceStack {
    pub fn new() -> Self {
        Self {
            requests: Deque::new(),
            scan_params: config::BLE_SCAN_PARAMS,
            connection: None,
            services: Vec::new(),
            characteristics: Vec::new(),
        }
    }

    fn queue(&mut self, request: Request) -> Result<(), StackError> {
        self.requests
            .push_back(request)
            .map_err(|_| StackError(raw::NRF_ERROR_BUSY))
    }

    fn conn_handle(&self) -> Option<u16> {
        self.connection.as_ref().and_then(Connection::handle)
    }

    fn check_link(&self, connection: ConnId) -> Result<(), StackError> {
        match self.conn_handle() {
            Some(handle) if handle == connection.0 => Ok(()),
            _ => Err(StackError(raw::BLE_ERROR_INVALID_CONN_HANDLE)),
        }
    }

    fn cached_in(&self, start: u16, end: u16) -> impl Iterator<Item = &CharacteristicRecord> {
        self.characteristics
            .iter()
            .filter(move |c| (start..=end).contains(&c.handle))
    }

    /// Discover every primary service, keep those matching `filter`, then
    /// discover the characteristics of each one kept.
    async fn discover(
        &mut self,
        conn_handle: u16,
        filter: Option<&BleUuid>,
    ) -> Result<(), SearchError> {
        self.services.clear();
        self.characteristics.clear();

        let mut start = 1u16;
        loop {
            let ret = unsafe {
                raw::sd_ble_gattc_primary_services_discover(conn_handle, start, core::ptr::null())
            };
            check(ret)?;

            let (gatt_status, batch) = loop {
                if let GattResponse::Services {
                    gatt_status,
                    services,
                    ..
                } = next_response(conn_handle).await?
                {
                    break (gatt_status, services);
                }
            };
            if gatt_status as u32 == raw::BLE_GATT_STATUS_ATTERR_ATTRIBUTE_NOT_FOUND {
                break;
            }
            gatt_check(gatt_status)?;

            let Some(last) = batch.last().copied() else {
                break;
            };
            for service in batch {
                if filter.map_or(true, |f| f.same_as(&service.uuid))
                    && self.services.push(service).is_err()
                {
                    warn!("service table full, dropping {}", service);
                }
            }
            match last.end_handle.checked_add(1) {
                Some(next) => start = next,
                None => break,
            }
        }

        for i in 0..self.services.len() {
            let service = self.services[i];
            self.discover_characteristics(conn_handle, &service).await?;
        }
        Ok(())
    }

    async fn discover_characteristics(
        &mut self,
        conn_handle: u16,
        service: &ServiceHandleRange,
    ) -> Result<(), SearchError> {
        let mut start = service.start_handle;
        while start <= service.end_handle {
            let range = raw::ble_gattc_handle_range_t {
                start_handle: start,
                end_handle: service.end_handle,
            };
            let ret = unsafe { raw::sd_ble_gattc_characteristics_discover(conn_handle, &range) };
            check(ret)?;

            let (gatt_status, batch) = loop {
                if let GattResponse::Characteristics {
                    gatt_status,
                    characteristics,
                    ..
                } = next_response(conn_handle).await?
                {
                    break (gatt_status, characteristics);
                }
            };
            if gatt_status as u32 == raw::BLE_GATT_STATUS_ATTERR_ATTRIBUTE_NOT_FOUND {
                break;
            }
            gatt_check(gatt_status)?;

            let Some(last) = batch.last().copied() else {
                break;
            };
            for characteristic in batch {
                if self.characteristics.push(characteristic).is_err() {
                    warn!("characteristic cache full, dropping {}", characteristic);
                }
            }
            match last.handle.checked_add(1) {
                Some(next) => start = next,
                None => break,
            }
        }
        Ok(())
    }
}

impl Default for SoftdeviceStack {
    fn default() -> Self {
        Self::new()
    }
}

impl GattcStack for SoftdeviceStack {
    fn register_client(&mut self, app_id: u16) -> Result<(), StackError> {
        self.queue(Request::Register { app_id })
    }

    fn set_scan_params(&mut self, params: &ScanParams) -> Result<(), StackError> {
        self.scan_params = *params;
        self.queue(Request::ScanParams)
    }

    fn start_scan(&mut self, duration_secs: u32) -> Result<(), StackError> {
        self.queue(Request::Scan { duration_secs })
    }

    fn stop_scan(&mut self) -> Result<(), StackError> {
        self.queue(Request::StopScan)
    }

    fn connect(
        &mut self,
        _interface: GattInterface,
        address: BdAddr,
        address_type: AddressType,
    ) -> Result<(), StackError> {
        self.queue(Request::Connect {
            address,
            address_type,
        })
    }

    fn search_services(
        &mut self,
        _interface: GattInterface,
        connection: ConnId,
        filter: Option<&BleUuid>,
    ) -> Result<(), StackError> {
        self.check_link(connection)?;
        self.queue(Request::Search {
            filter: filter.copied(),
        })
    }

    fn characteristic_count(
        &mut self,
        _interface: GattInterface,
        connection: ConnId,
        start_handle: u16,
        end_handle: u16,
    ) -> Result<u16, StackError> {
        self.check_link(connection)?;
        Ok(self.cached_in(start_handle, end_handle).count() as u16)
    }

    fn all_characteristics(
        &mut self,
        _interface: GattInterface,
        connection: ConnId,
        start_handle: u16,
        end_handle: u16,
        buf: &mut [CharacteristicRecord],
    ) -> Result<usize, StackError> {
        self.check_link(connection)?;
        let mut filled = 0;
        for (slot, record) in buf.iter_mut().zip(self.cached_in(start_handle, end_handle)) {
            *slot = *record;
            filled += 1;
        }
        Ok(filled)
    }
}

fn check(ret: u32) -> Result<(), SearchError> {
    if ret == raw::NRF_SUCCESS {
        Ok(())
    } else {
        Err(SearchError::Status(StackError(ret)))
    }
}

fn gatt_check(gatt_status: u16) -> Result<(), SearchError> {
    if gatt_status as u32 == raw::BLE_GATT_STATUS_SUCCESS {
        Ok(())
    } else {
        Err(SearchError::Status(StackError(gatt_status as u32)))
    }
}

/// Next response for `conn_handle`, or the link loss that ends the wait.
async fn next_response(conn_handle: u16) -> Result<GattResponse, SearchError> {
    loop {
        let response = RESPONSES.receive().await;
        match response {
            GattResponse::Disconnected {
                conn_handle: handle,
                reason,
            } if handle == conn_handle => return Err(SearchError::Disconnected { reason }),
            GattResponse::Services {
                conn_handle: handle,
                ..
            }
            | GattResponse::Characteristics {
                conn_handle: handle,
                ..
            } if handle == conn_handle => return Ok(response),
            _ => debug!("ignoring response for another connection"),
        }
    }
}

type SoftdeviceDispatcher<R> = Dispatcher<SoftdeviceStack, R>;

/// Carry out queued commands until none are left.
///
/// Errors returned by the dispatcher are already logged and reported to
/// the sink, so they are dropped here.
pub async fn run<R: DiscoverySink>(sd: &Softdevice, dispatcher: &mut SoftdeviceDispatcher<R>) {
    dispatcher.start().ok();

    while let Some(request) = dispatcher.stack_mut().requests.pop_front() {
        debug!("carrying out {}", request);
        match request {
            Request::ScanParams => {
                dispatcher
                    .on_gap_event(GapEvent::ScanParamsSet { status: Ok(()) })
                    .ok();
            }
            Request::Register { app_id } => {
                dispatcher
                    .on_gattc_event(
                        INTERFACE,
                        GattcEvent::Registered {
                            status: Ok(()),
                            app_id,
                        },
                    )
                    .ok();
            }
            Request::Scan { duration_secs } => scan(sd, dispatcher, duration_secs).await,
            // The scan loop has already returned by the time this is reached.
            Request::StopScan => {
                dispatcher
                    .on_gap_event(GapEvent::ScanStopped { status: Ok(()) })
                    .ok();
            }
            Request::Connect {
                address,
                address_type,
            } => connect(sd, dispatcher, address, address_type).await,
            Request::Search { filter } => search(dispatcher, filter).await,
        }
    }
}

/// Keep the link open and report its loss, if it is still up.
pub async fn watch_link<R: DiscoverySink>(dispatcher: &mut SoftdeviceDispatcher<R>) {
    let Some(conn_handle) = dispatcher.stack().conn_handle() else {
        return;
    };
    loop {
        if let GattResponse::Disconnected {
            conn_handle: handle,
            reason,
        } = RESPONSES.receive().await
        {
            if handle == conn_handle {
                dispatcher.stack_mut().connection = None;
                dispatcher
                    .on_gattc_event(
                        INTERFACE,
                        GattcEvent::Disconnected {
                            connection: ConnId(conn_handle),
                            reason: reason as u16,
                        },
                    )
                    .ok();
                return;
            }
        }
    }
}

async fn scan<R: DiscoverySink>(
    sd: &Softdevice,
    dispatcher: &mut SoftdeviceDispatcher<R>,
    duration_secs: u32,
) {
    let params = dispatcher.stack().scan_params;
    let config = central::ScanConfig {
        active: params.scan_type == ScanType::Active,
        interval: params.interval as u32,
        window: params.window as u32,
        // 10 ms units
        timeout: duration_secs.saturating_mul(100).min(u16::MAX as u32) as u16,
        ..Default::default()
    };
    info!(
        "BLE scan starting ({} s window, interval {} ms, window {} ms)",
        duration_secs,
        params.interval_ms(),
        params.window_ms()
    );

    let result = central::scan(sd, &config, |params| {
        let data =
            unsafe { core::slice::from_raw_parts(params.data.p_data, params.data.len as usize) };
        let address = Address::from_raw(params.peer_addr);
        let report = AdvertisementReport {
            address: events::bd_addr(&address),
            address_type: events::address_type(address.address_type()),
            rssi: params.rssi,
            data,
        };
        dispatcher
            .on_gap_event(GapEvent::AdvertisementReport(report))
            .ok();

        // Return None to keep scanning, Some(()) to stop.
        (*dispatcher.state() != DiscoveryState::Scanning).then_some(())
    })
    .await;

    let event = match result {
        Ok(()) => return,
        Err(ScanError::Timeout) => GapEvent::ScanWindowElapsed,
        Err(ScanError::Raw(e)) => GapEvent::ScanStarted {
            status: Err(StackError(e as u32)),
        },
    };
    dispatcher.on_gap_event(event).ok();
}

async fn connect<R: DiscoverySink>(
    sd: &Softdevice,
    dispatcher: &mut SoftdeviceDispatcher<R>,
    address: BdAddr,
    address_type: AddressType,
) {
    let peer = events::sd_address(address, address_type);
    let whitelist = [&peer];
    let conn_cfg = central::ConnectConfig {
        scan_config: central::ScanConfig {
            whitelist: Some(&whitelist),
            ..Default::default()
        },
        conn_params: raw::ble_gap_conn_params_t {
            min_conn_interval: config::BLE_CONN_INTERVAL_MIN,
            max_conn_interval: config::BLE_CONN_INTERVAL_MAX,
            slave_latency: config::BLE_SLAVE_LATENCY,
            conn_sup_timeout: config::BLE_SUP_TIMEOUT,
        },
        ..Default::default()
    };
    info!("connecting to {}", address);

    let (status, connection) = match central::connect(sd, &conn_cfg).await {
        Ok(conn) => match conn.handle() {
            Some(handle) => {
                dispatcher.stack_mut().connection = Some(conn);
                (Ok(()), ConnId(handle))
            }
            None => (
                Err(StackError(raw::BLE_ERROR_INVALID_CONN_HANDLE)),
                ConnId(raw::BLE_CONN_HANDLE_INVALID as u16),
            ),
        },
        Err(e) => {
            let code = match e {
                ConnectError::Timeout => raw::NRF_ERROR_TIMEOUT,
                ConnectError::Raw(e) => e as u32,
                _ => raw::NRF_ERROR_INVALID_PARAM,
            };
            (
                Err(StackError(code)),
                ConnId(raw::BLE_CONN_HANDLE_INVALID as u16),
            )
        }
    };

    dispatcher
        .on_gattc_event(
            INTERFACE,
            GattcEvent::Connected {
                status,
                connection,
                address,
            },
        )
        .ok();
}

async fn search<R: DiscoverySink>(
    dispatcher: &mut SoftdeviceDispatcher<R>,
    filter: Option<BleUuid>,
) {
    let Some(conn_handle) = dispatcher.stack().conn_handle() else {
        return;
    };
    let connection = ConnId(conn_handle);

    let discovery = dispatcher.stack_mut().discover(conn_handle, filter.as_ref());
    let timeout = Timer::after(Duration::from_secs(SERVICE_SEARCH_TIMEOUT_SECS));
    let raced = select(discovery, timeout).await;
    let outcome = match raced {
        Either::First(outcome) => outcome,
        Either::Second(()) => {
            warn!("service search timed out");
            dispatcher.on_search_timeout().ok();
            return;
        }
    };

    let event = match outcome {
        Ok(()) => {
            for i in 0..dispatcher.stack().services.len() {
                let service = dispatcher.stack().services[i];
                if dispatcher
                    .on_gattc_event(INTERFACE, GattcEvent::ServiceFound(service))
                    .is_err()
                {
                    return;
                }
            }
            GattcEvent::SearchComplete { status: Ok(()) }
        }
        Err(SearchError::Status(code)) => GattcEvent::SearchComplete { status: Err(code) },
        Err(SearchError::Disconnected { reason }) => {
            dispatcher.stack_mut().connection = None;
            GattcEvent::Disconnected {
                connection,
                reason: reason as u16,
            }
        }
    };
    dispatcher.on_gattc_event(INTERFACE, event).ok();
}
