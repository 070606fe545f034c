//! Unit tests for the discovery state machine and dispatch shim.
//!
//! These tests run on the host against a scripted [`MockStack`] that
//! records every command it receives.

use std::vec::Vec;

use super::orchestrator::{Event, EventKind, Orchestrator, StateKind};
use super::*;
use crate::config::{
    DiscoveryConfig, BLE_SCAN_DURATION_SECS, BLE_SCAN_PARAMS, MAX_CHARACTERISTICS_PER_SERVICE,
};
use crate::error::{EnumerateError, Error, Failure, QueryError, StackError, Step};

// ═══════════════════════════════════════════════════════════════════════════
// Test doubles
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Call {
    SetScanParams(ScanParams),
    RegisterClient(u16),
    StartScan(u32),
    StopScan,
    Connect(GattInterface, BdAddr, AddressType),
    SearchServices(GattInterface, ConnId, Option<BleUuid>),
    CharacteristicCount(GattInterface, ConnId, u16, u16),
    /// Last field is the buffer length offered.
    AllCharacteristics(GattInterface, ConnId, u16, u16, usize),
}

/// Records commands and answers characteristic queries from a fixed table.
#[derive(Debug, Default)]
pub(crate) struct MockStack {
    pub calls: Vec<Call>,
    pub characteristics: Vec<CharacteristicRecord>,
    pub reject: Option<(Step, StackError)>,
    pub count_error: Option<StackError>,
    pub fetch_error: Option<StackError>,
    /// Fill one record fewer than requested.
    pub short_fill: bool,
}

impl MockStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare characteristics as `(value handle, 16-bit uuid)` pairs.
    pub fn with_characteristics(mut self, declared: &[(u16, u16)]) -> Self {
        self.characteristics = declared
            .iter()
            .map(|&(handle, uuid)| CharacteristicRecord {
                uuid: BleUuid::Uuid16(uuid),
                handle,
            })
            .collect();
        self
    }

    pub fn rejecting(mut self, step: Step, code: StackError) -> Self {
        self.reject = Some((step, code));
        self
    }

    fn outcome(&self, step: Step) -> Result<(), StackError> {
        match self.reject {
            Some((rejected, code)) if rejected == step => Err(code),
            _ => Ok(()),
        }
    }

    fn in_range(&self, start: u16, end: u16) -> impl Iterator<Item = &CharacteristicRecord> {
        self.characteristics
            .iter()
            .filter(move |c| (start..=end).contains(&c.handle))
    }
}

impl GattcStack for MockStack {
    fn register_client(&mut self, app_id: u16) -> Result<(), StackError> {
        self.calls.push(Call::RegisterClient(app_id));
        self.outcome(Step::RegisterClient)
    }

    fn set_scan_params(&mut self, params: &ScanParams) -> Result<(), StackError> {
        self.calls.push(Call::SetScanParams(*params));
        self.outcome(Step::SetScanParams)
    }

    fn start_scan(&mut self, duration_secs: u32) -> Result<(), StackError> {
        self.calls.push(Call::StartScan(duration_secs));
        self.outcome(Step::StartScan)
    }

    fn stop_scan(&mut self) -> Result<(), StackError> {
        self.calls.push(Call::StopScan);
        self.outcome(Step::StopScan)
    }

    fn connect(
        &mut self,
        interface: GattInterface,
        address: BdAddr,
        address_type: AddressType,
    ) -> Result<(), StackError> {
        self.calls.push(Call::Connect(interface, address, address_type));
        self.outcome(Step::Connect)
    }

    fn search_services(
        &mut self,
        interface: GattInterface,
        connection: ConnId,
        filter: Option<&BleUuid>,
    ) -> Result<(), StackError> {
        self.calls
            .push(Call::SearchServices(interface, connection, filter.copied()));
        self.outcome(Step::SearchServices)
    }

    fn characteristic_count(
        &mut self,
        interface: GattInterface,
        connection: ConnId,
        start_handle: u16,
        end_handle: u16,
    ) -> Result<u16, StackError> {
        self.calls.push(Call::CharacteristicCount(
            interface,
            connection,
            start_handle,
            end_handle,
        ));
        if let Some(code) = self.count_error {
            return Err(code);
        }
        Ok(self.in_range(start_handle, end_handle).count() as u16)
    }

    fn all_characteristics(
        &mut self,
        interface: GattInterface,
        connection: ConnId,
        start_handle: u16,
        end_handle: u16,
        buf: &mut [CharacteristicRecord],
    ) -> Result<usize, StackError> {
        self.calls.push(Call::AllCharacteristics(
            interface,
            connection,
            start_handle,
            end_handle,
            buf.len(),
        ));
        if let Some(code) = self.fetch_error {
            return Err(code);
        }
        let found: Vec<CharacteristicRecord> =
            self.in_range(start_handle, end_handle).copied().collect();
        let mut n = found.len().min(buf.len());
        if self.short_fill {
            n = n.saturating_sub(1);
        }
        buf[..n].copy_from_slice(&found[..n]);
        Ok(n)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Entry {
    Target(BdAddr),
    Service(u16),
    Characteristics(u16, Vec<u16>),
    Skipped(u16, EnumerateError),
    Finished(DiscoveryState),
}

/// Sink that keeps the order in which results were reported.
#[derive(Debug, Default)]
struct Recorder {
    log: Vec<Entry>,
}

impl DiscoverySink for Recorder {
    fn target_found(&mut self, device: &DiscoveredDevice) {
        self.log.push(Entry::Target(device.address));
    }

    fn service_found(&mut self, service: &ServiceHandleRange) {
        self.log.push(Entry::Service(service.start_handle));
    }

    fn characteristics(
        &mut self,
        service: &ServiceHandleRange,
        characteristics: &[CharacteristicRecord],
    ) {
        let handles = characteristics.iter().map(|c| c.handle).collect();
        self.log
            .push(Entry::Characteristics(service.start_handle, handles));
    }

    fn service_skipped(&mut self, service: &ServiceHandleRange, error: &EnumerateError) {
        self.log.push(Entry::Skipped(service.start_handle, *error));
    }

    fn finished(&mut self, outcome: &DiscoveryState) {
        self.log.push(Entry::Finished(*outcome));
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Fixtures
// ═══════════════════════════════════════════════════════════════════════════

const IFACE: GattInterface = GattInterface(3);
const CONN: ConnId = ConnId(5);
const PEER: BdAddr = BdAddr([0xC0, 0x11, 0x22, 0x33, 0x44, 0x55]);
const TARGET: &str = "TargetDevice";

type TestDispatcher = Dispatcher<MockStack, Recorder>;

fn name_record(name: &str) -> Vec<u8> {
    let mut data = vec![0x02, 0x01, 0x06];
    data.push(name.len() as u8 + 1);
    data.push(adv_parser::AD_TYPE_COMPLETE_LOCAL_NAME);
    data.extend_from_slice(name.as_bytes());
    data
}

fn report(address: BdAddr, data: &[u8]) -> GapEvent<'_> {
    GapEvent::AdvertisementReport(AdvertisementReport {
        address,
        address_type: AddressType::RandomStatic,
        rssi: -60,
        data,
    })
}

fn service(start: u16, end: u16, uuid: u16) -> ServiceHandleRange {
    ServiceHandleRange {
        start_handle: start,
        end_handle: end,
        uuid: BleUuid::Uuid16(uuid),
    }
}

fn dispatcher(stack: MockStack) -> TestDispatcher {
    Dispatcher::new(DiscoveryConfig::new(TARGET), stack, Recorder::default())
}

fn scanning(stack: MockStack) -> TestDispatcher {
    let mut d = dispatcher(stack);
    d.start().unwrap();
    d.on_gattc_event(
        IFACE,
        GattcEvent::Registered {
            status: Ok(()),
            app_id: 0,
        },
    )
    .unwrap();
    d
}

fn connecting(stack: MockStack) -> TestDispatcher {
    let mut d = scanning(stack);
    let data = name_record(TARGET);
    d.on_gap_event(report(PEER, &data)).unwrap();
    d
}

fn searching(stack: MockStack) -> TestDispatcher {
    let mut d = connecting(stack);
    d.on_gattc_event(
        IFACE,
        GattcEvent::Connected {
            status: Ok(()),
            connection: CONN,
            address: PEER,
        },
    )
    .unwrap();
    d
}

fn calls_after(d: &TestDispatcher, skip: usize) -> &[Call] {
    &d.stack().calls[skip..]
}

// ═══════════════════════════════════════════════════════════════════════════
// Registration & scanning
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn start_sets_scan_params_then_registers() {
    let mut d = dispatcher(MockStack::new());
    d.start().unwrap();

    assert_eq!(d.state(), &DiscoveryState::Registering);
    assert_eq!(
        d.stack().calls,
        [Call::SetScanParams(BLE_SCAN_PARAMS), Call::RegisterClient(0)]
    );
}

#[test]
fn registration_binds_interface_and_starts_scan() {
    let d = scanning(MockStack::new());

    assert_eq!(d.state(), &DiscoveryState::Scanning);
    assert_eq!(d.session().interface(), Some(IFACE));
    assert!(!d.session().is_connected());
    assert_eq!(
        calls_after(&d, 2),
        [Call::StartScan(BLE_SCAN_DURATION_SECS)]
    );
}

#[test]
fn registration_failure_is_terminal() {
    let mut d = dispatcher(MockStack::new());
    d.start().unwrap();

    let err = d
        .on_gattc_event(
            IFACE,
            GattcEvent::Registered {
                status: Err(StackError(0x85)),
                app_id: 0,
            },
        )
        .unwrap_err();

    let failure = Failure::Status {
        step: Step::RegisterClient,
        code: StackError(0x85),
    };
    assert_eq!(err, Error::Failed(failure));
    assert_eq!(d.state(), &DiscoveryState::Failed(failure));
    assert_eq!(d.session().interface(), None);
    assert_eq!(d.stack().calls.len(), 2);
}

#[test]
fn second_registration_is_unexpected() {
    let mut d = scanning(MockStack::new());
    let calls = d.stack().calls.len();

    let err = d
        .on_gattc_event(
            IFACE,
            GattcEvent::Registered {
                status: Ok(()),
                app_id: 0,
            },
        )
        .unwrap_err();

    assert_eq!(
        err,
        Error::UnexpectedEvent {
            state: StateKind::Scanning,
            event: EventKind::Registered
        }
    );
    assert_eq!(d.session().interface(), Some(IFACE));
    assert_eq!(d.stack().calls.len(), calls);
}

#[test]
fn rejected_registration_command_fails_start() {
    let stack = MockStack::new().rejecting(Step::RegisterClient, StackError(0x103));
    let mut d = dispatcher(stack);

    let err = d.start().unwrap_err();

    assert_eq!(
        err,
        Error::Failed(Failure::Rejected {
            step: Step::RegisterClient,
            code: StackError(0x103)
        })
    );
    assert!(d.is_finished());
}

#[test]
fn rejected_scan_start_fails_run() {
    let stack = MockStack::new().rejecting(Step::StartScan, StackError(0x103));
    let mut d = dispatcher(stack);
    d.start().unwrap();

    let err = d
        .on_gattc_event(
            IFACE,
            GattcEvent::Registered {
                status: Ok(()),
                app_id: 0,
            },
        )
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Failed(Failure::Rejected {
            step: Step::StartScan,
            ..
        })
    ));
    // The interface was bound before the scan command went out.
    assert_eq!(d.session().interface(), Some(IFACE));
}

#[test]
fn scan_param_and_scan_start_confirmations_keep_state() {
    let mut d = dispatcher(MockStack::new());
    d.start().unwrap();
    d.on_gap_event(GapEvent::ScanParamsSet { status: Ok(()) })
        .unwrap();
    assert_eq!(d.state(), &DiscoveryState::Registering);

    let mut d = scanning(MockStack::new());
    d.on_gap_event(GapEvent::ScanStarted { status: Ok(()) })
        .unwrap();
    assert_eq!(d.state(), &DiscoveryState::Scanning);

    let err = d
        .on_gap_event(GapEvent::ScanStarted {
            status: Err(StackError(1)),
        })
        .unwrap_err();
    assert_eq!(
        err,
        Error::Failed(Failure::Status {
            step: Step::StartScan,
            code: StackError(1)
        })
    );
}

#[test]
fn scan_params_convert_to_milliseconds() {
    assert_eq!(BLE_SCAN_PARAMS.interval_ms(), 50.0);
    assert_eq!(BLE_SCAN_PARAMS.window_ms(), 23.125);
}

#[test]
fn scan_param_failure_is_terminal() {
    let mut d = dispatcher(MockStack::new());
    d.start().unwrap();

    let err = d
        .on_gap_event(GapEvent::ScanParamsSet {
            status: Err(StackError(0x07)),
        })
        .unwrap_err();

    let failure = Failure::Status {
        step: Step::SetScanParams,
        code: StackError(0x07),
    };
    assert_eq!(err, Error::Failed(failure));
    assert_eq!(d.state(), &DiscoveryState::Failed(failure));
    assert_eq!(
        d.sink().log,
        [Entry::Finished(DiscoveryState::Failed(failure))]
    );

    // A late registration no longer starts a scan.
    let calls = d.stack().calls.len();
    d.on_gattc_event(
        IFACE,
        GattcEvent::Registered {
            status: Ok(()),
            app_id: 0,
        },
    )
    .unwrap_err();
    assert_eq!(d.stack().calls.len(), calls);
}

#[test]
fn non_matching_adverts_keep_scanning() {
    let mut d = scanning(MockStack::new());
    let before = d.stack().calls.len();

    let other = name_record("Other");
    let prefix = name_record("Target");
    d.on_gap_event(report(PEER, &other)).unwrap();
    d.on_gap_event(report(PEER, &prefix)).unwrap();
    d.on_gap_event(report(PEER, &[])).unwrap();
    d.on_gap_event(report(PEER, &[0x1F, 0x09, b'T'])).unwrap();

    assert_eq!(d.state(), &DiscoveryState::Scanning);
    assert_eq!(d.stack().calls.len(), before);
}

#[test]
fn match_stops_scan_then_connects_exactly_once() {
    let mut d = scanning(MockStack::new());
    let before = d.stack().calls.len();
    let data = name_record(TARGET);

    d.on_gap_event(report(PEER, &data)).unwrap();

    assert_eq!(d.state(), &DiscoveryState::Connecting { peer: PEER });
    assert_eq!(
        calls_after(&d, before),
        [
            Call::StopScan,
            Call::Connect(IFACE, PEER, AddressType::RandomStatic)
        ]
    );
    assert_eq!(d.sink().log, [Entry::Target(PEER)]);

    // A report already in flight must not trigger a second connect.
    let err = d.on_gap_event(report(PEER, &data)).unwrap_err();
    assert_eq!(
        err,
        Error::UnexpectedEvent {
            state: StateKind::Connecting,
            event: EventKind::Advertisement
        }
    );
    assert_eq!(calls_after(&d, before).len(), 2);
}

#[test]
fn rejected_connect_fails_without_retry() {
    let stack = MockStack::new().rejecting(Step::Connect, StackError(0x0C));
    let mut d = scanning(stack);
    let data = name_record(TARGET);

    let err = d.on_gap_event(report(PEER, &data)).unwrap_err();

    let failure = Failure::Rejected {
        step: Step::Connect,
        code: StackError(0x0C),
    };
    assert_eq!(err, Error::Failed(failure));
    assert_eq!(d.state(), &DiscoveryState::Failed(failure));
    assert_eq!(
        d.stack().calls.last(),
        Some(&Call::Connect(IFACE, PEER, AddressType::RandomStatic))
    );
    assert_eq!(
        d.sink().log.last(),
        Some(&Entry::Finished(DiscoveryState::Failed(failure)))
    );

    // Later adverts are ignored; nothing is retried.
    let calls = d.stack().calls.len();
    assert!(d.on_gap_event(report(PEER, &data)).is_err());
    assert_eq!(d.stack().calls.len(), calls);
}

#[test]
fn rejected_stop_scan_never_connects() {
    let stack = MockStack::new().rejecting(Step::StopScan, StackError(0x0C));
    let mut d = scanning(stack);
    let data = name_record(TARGET);

    let err = d.on_gap_event(report(PEER, &data)).unwrap_err();

    assert!(matches!(
        err,
        Error::Failed(Failure::Rejected {
            step: Step::StopScan,
            ..
        })
    ));
    assert!(!d
        .stack()
        .calls
        .iter()
        .any(|c| matches!(c, Call::Connect(..))));
}

#[test]
fn scan_window_without_target_fails() {
    let mut d = scanning(MockStack::new());
    let err = d.on_gap_event(GapEvent::ScanWindowElapsed).unwrap_err();
    assert_eq!(err, Error::Failed(Failure::TargetNotFound));
}

#[test]
fn scan_stopped_confirmation_is_ignored() {
    let mut d = connecting(MockStack::new());
    d.on_gap_event(GapEvent::ScanStopped { status: Ok(()) })
        .unwrap();
    assert_eq!(d.state(), &DiscoveryState::Connecting { peer: PEER });
}

// ═══════════════════════════════════════════════════════════════════════════
// Connection
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn connect_complete_opens_session_and_searches_all_services() {
    let d = searching(MockStack::new());

    assert_eq!(d.state(), &DiscoveryState::ServiceSearching { services: 0 });
    assert_eq!(d.session().connection(), Some(CONN));
    assert_eq!(
        d.stack().calls.last(),
        Some(&Call::SearchServices(IFACE, CONN, None))
    );
    assert!(d.is_searching());
}

#[test]
fn connect_failure_status_is_terminal() {
    let mut d = connecting(MockStack::new());

    let err = d
        .on_gattc_event(
            IFACE,
            GattcEvent::Connected {
                status: Err(StackError(0x3E)),
                connection: CONN,
                address: PEER,
            },
        )
        .unwrap_err();

    assert_eq!(
        err,
        Error::Failed(Failure::Status {
            step: Step::Connect,
            code: StackError(0x3E)
        })
    );
    assert!(!d.session().is_connected());
}

#[test]
fn connect_complete_from_another_peer_is_unexpected() {
    let mut d = connecting(MockStack::new());

    let err = d
        .on_gattc_event(
            IFACE,
            GattcEvent::Connected {
                status: Ok(()),
                connection: CONN,
                address: BdAddr([1, 2, 3, 4, 5, 6]),
            },
        )
        .unwrap_err();

    assert!(matches!(err, Error::UnexpectedEvent { .. }));
    assert_eq!(d.state(), &DiscoveryState::Connecting { peer: PEER });
    assert!(!d.session().is_connected());
}

#[test]
fn rejected_search_fails_run() {
    let stack = MockStack::new().rejecting(Step::SearchServices, StackError(0x85));
    let mut d = connecting(stack);

    let err = d
        .on_gattc_event(
            IFACE,
            GattcEvent::Connected {
                status: Ok(()),
                connection: CONN,
                address: PEER,
            },
        )
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Failed(Failure::Rejected {
            step: Step::SearchServices,
            ..
        })
    ));
}

#[test]
fn disconnect_is_terminal_and_clears_connection() {
    let mut d = searching(MockStack::new());

    let err = d
        .on_gattc_event(
            IFACE,
            GattcEvent::Disconnected {
                connection: CONN,
                reason: 0x13,
            },
        )
        .unwrap_err();

    assert_eq!(err, Error::Failed(Failure::Disconnected { reason: 0x13 }));
    assert!(!d.session().is_connected());
    assert_eq!(d.session().interface(), Some(IFACE));
}

#[test]
fn disconnect_of_other_connection_is_ignored() {
    let mut d = searching(MockStack::new());

    d.on_gattc_event(
        IFACE,
        GattcEvent::Disconnected {
            connection: ConnId(9),
            reason: 0x13,
        },
    )
    .unwrap();

    assert_eq!(d.state(), &DiscoveryState::ServiceSearching { services: 0 });
    assert_eq!(d.session().connection(), Some(CONN));
}

// ═══════════════════════════════════════════════════════════════════════════
// Service search
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn services_are_enumerated_in_discovery_order() {
    let stack = MockStack::new().with_characteristics(&[
        (0x0003, 0x2A00),
        (0x0005, 0x2A01),
        (0x0012, 0x2A37),
        (0x0015, 0x2A38),
    ]);
    let mut d = searching(stack);
    let before = d.stack().calls.len();

    d.on_gattc_event(IFACE, GattcEvent::ServiceFound(service(0x0001, 0x0007, 0x1800)))
        .unwrap();
    d.on_gattc_event(IFACE, GattcEvent::ServiceFound(service(0x0010, 0x0020, 0x180D)))
        .unwrap();
    d.on_gattc_event(IFACE, GattcEvent::SearchComplete { status: Ok(()) })
        .unwrap();

    assert_eq!(d.state(), &DiscoveryState::Done { services: 2 });
    assert_eq!(
        d.sink().log[1..],
        [
            Entry::Service(0x0001),
            Entry::Characteristics(0x0001, vec![0x0003, 0x0005]),
            Entry::Service(0x0010),
            Entry::Characteristics(0x0010, vec![0x0012, 0x0015]),
            Entry::Finished(DiscoveryState::Done { services: 2 }),
        ]
    );
    assert_eq!(
        calls_after(&d, before),
        [
            Call::CharacteristicCount(IFACE, CONN, 0x0001, 0x0007),
            Call::AllCharacteristics(IFACE, CONN, 0x0001, 0x0007, 2),
            Call::CharacteristicCount(IFACE, CONN, 0x0010, 0x0020),
            Call::AllCharacteristics(IFACE, CONN, 0x0010, 0x0020, 2),
        ]
    );
}

#[test]
fn service_without_characteristics_is_skipped() {
    let stack = MockStack::new().with_characteristics(&[(0x0012, 0x2A37)]);
    let mut d = searching(stack);

    d.on_gattc_event(IFACE, GattcEvent::ServiceFound(service(0x0001, 0x0007, 0x1800)))
        .unwrap();
    d.on_gattc_event(IFACE, GattcEvent::ServiceFound(service(0x0010, 0x0020, 0x180D)))
        .unwrap();
    d.on_gattc_event(IFACE, GattcEvent::SearchComplete { status: Ok(()) })
        .unwrap();

    assert_eq!(d.state(), &DiscoveryState::Done { services: 2 });
    assert!(d.sink().log.contains(&Entry::Skipped(
        0x0001,
        EnumerateError::Query(QueryError::NoCharacteristics)
    )));
    assert!(d
        .sink()
        .log
        .contains(&Entry::Characteristics(0x0010, vec![0x0012])));
}

#[test]
fn oversized_service_is_skipped_and_search_continues() {
    let oversized = MAX_CHARACTERISTICS_PER_SERVICE as u16 + 1;
    let mut declared: Vec<(u16, u16)> = (0..oversized)
        .map(|i| (0x0002 + 2 * i, 0x2A00 + i))
        .collect();
    declared.push((0x0052, 0x2A37));
    let mut d = searching(MockStack::new().with_characteristics(&declared));

    d.on_gattc_event(IFACE, GattcEvent::ServiceFound(service(0x0001, 0x0040, 0x1800)))
        .unwrap();
    d.on_gattc_event(IFACE, GattcEvent::ServiceFound(service(0x0050, 0x0060, 0x180D)))
        .unwrap();
    d.on_gattc_event(IFACE, GattcEvent::SearchComplete { status: Ok(()) })
        .unwrap();

    assert_eq!(
        d.sink().log[1..],
        [
            Entry::Service(0x0001),
            Entry::Skipped(
                0x0001,
                EnumerateError::Allocation {
                    requested: oversized,
                    capacity: MAX_CHARACTERISTICS_PER_SERVICE,
                }
            ),
            Entry::Service(0x0050),
            Entry::Characteristics(0x0050, vec![0x0052]),
            Entry::Finished(DiscoveryState::Done { services: 2 }),
        ]
    );
    assert_eq!(d.state(), &DiscoveryState::Done { services: 2 });
    // No fetch was attempted for the service that did not fit.
    assert!(!d
        .stack()
        .calls
        .iter()
        .any(|c| matches!(c, Call::AllCharacteristics(_, _, 0x0001, _, _))));
}

#[test]
fn query_errors_do_not_abort_search() {
    let mut stack = MockStack::new().with_characteristics(&[(0x0012, 0x2A37)]);
    stack.fetch_error = Some(StackError(0x0A));
    let mut d = searching(stack);

    d.on_gattc_event(IFACE, GattcEvent::ServiceFound(service(0x0010, 0x0020, 0x180D)))
        .unwrap();

    assert_eq!(d.state(), &DiscoveryState::ServiceSearching { services: 1 });
    assert_eq!(
        d.sink().log.last(),
        Some(&Entry::Skipped(
            0x0010,
            EnumerateError::Query(QueryError::Status(StackError(0x0A)))
        ))
    );
}

#[test]
fn search_failure_status_is_terminal() {
    let mut d = searching(MockStack::new());
    let err = d
        .on_gattc_event(
            IFACE,
            GattcEvent::SearchComplete {
                status: Err(StackError(0x85)),
            },
        )
        .unwrap_err();
    assert_eq!(
        err,
        Error::Failed(Failure::Status {
            step: Step::SearchServices,
            code: StackError(0x85)
        })
    );
}

#[test]
fn search_timeout_only_applies_while_searching() {
    let mut d = scanning(MockStack::new());
    assert!(matches!(
        d.on_search_timeout(),
        Err(Error::UnexpectedEvent { .. })
    ));
    assert_eq!(d.state(), &DiscoveryState::Scanning);

    let mut d = searching(MockStack::new());
    assert_eq!(
        d.on_search_timeout(),
        Err(Error::Failed(Failure::SearchTimeout))
    );
}

#[test]
fn disconnect_after_done_is_reported() {
    let mut d = searching(MockStack::new());
    d.on_gattc_event(IFACE, GattcEvent::SearchComplete { status: Ok(()) })
        .unwrap();
    assert_eq!(d.state(), &DiscoveryState::Done { services: 0 });

    let err = d
        .on_gattc_event(
            IFACE,
            GattcEvent::Disconnected {
                connection: CONN,
                reason: 0x08,
            },
        )
        .unwrap_err();
    assert_eq!(err, Error::Failed(Failure::Disconnected { reason: 0x08 }));
}

// ═══════════════════════════════════════════════════════════════════════════
// Illegal transitions & routing
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn search_result_while_idle_is_unexpected() {
    let mut d = dispatcher(MockStack::new());

    let err = d
        .on_gattc_event(IFACE, GattcEvent::ServiceFound(service(1, 7, 0x1800)))
        .unwrap_err();

    assert_eq!(
        err,
        Error::UnexpectedEvent {
            state: StateKind::Idle,
            event: EventKind::ServiceFound
        }
    );
    assert_eq!(d.state(), &DiscoveryState::Idle);
    assert!(d.stack().calls.is_empty());
    assert!(d.sink().log.is_empty());
}

#[test]
fn failed_state_absorbs_everything() {
    let mut d = scanning(MockStack::new());
    d.on_gap_event(GapEvent::ScanWindowElapsed).unwrap_err();
    let calls = d.stack().calls.len();

    let data = name_record(TARGET);
    assert!(d.on_gap_event(report(PEER, &data)).is_err());
    assert!(d
        .on_gattc_event(
            IFACE,
            GattcEvent::Disconnected {
                connection: CONN,
                reason: 0x13
            }
        )
        .is_err());
    assert_eq!(d.state(), &DiscoveryState::Failed(Failure::TargetNotFound));
    assert_eq!(d.stack().calls.len(), calls);
}

#[test]
fn link_loss_after_failure_closes_session() {
    let mut d = searching(MockStack::new());
    d.on_search_timeout().unwrap_err();
    assert_eq!(d.session().connection(), Some(CONN));
    let calls = d.stack().calls.len();
    let reported = d.sink().log.len();

    d.on_gattc_event(
        IFACE,
        GattcEvent::Disconnected {
            connection: CONN,
            reason: 0x13,
        },
    )
    .unwrap();

    assert!(!d.session().is_connected());
    assert_eq!(d.state(), &DiscoveryState::Failed(Failure::SearchTimeout));
    assert_eq!(d.stack().calls.len(), calls);
    assert_eq!(d.sink().log.len(), reported);

    // Once the link is gone a repeat is just another absorbed event.
    let err = d
        .on_gattc_event(
            IFACE,
            GattcEvent::Disconnected {
                connection: CONN,
                reason: 0x13,
            },
        )
        .unwrap_err();
    assert_eq!(
        err,
        Error::UnexpectedEvent {
            state: StateKind::Failed,
            event: EventKind::Disconnected
        }
    );
}

#[test]
fn events_for_other_interfaces_are_ignored() {
    let mut d = searching(MockStack::new());

    d.on_gattc_event(
        GattInterface(7),
        GattcEvent::SearchComplete { status: Ok(()) },
    )
    .unwrap();
    assert_eq!(d.state(), &DiscoveryState::ServiceSearching { services: 0 });

    d.on_gattc_event(
        GattInterface::NONE,
        GattcEvent::SearchComplete { status: Ok(()) },
    )
    .unwrap();
    assert_eq!(d.state(), &DiscoveryState::Done { services: 0 });
}

#[test]
fn registration_of_other_app_is_ignored() {
    let mut d = dispatcher(MockStack::new());
    d.start().unwrap();

    d.on_gattc_event(
        GattInterface(9),
        GattcEvent::Registered {
            status: Ok(()),
            app_id: 4,
        },
    )
    .unwrap();

    assert_eq!(d.state(), &DiscoveryState::Registering);
    assert_eq!(d.session().interface(), None);
}

#[test]
fn transition_is_pure() {
    let orchestrator = Orchestrator::new(DiscoveryConfig::new(TARGET));

    let first = orchestrator.transition(&Event::Start).unwrap();
    let second = orchestrator.transition(&Event::Start).unwrap();

    assert_eq!(first, second);
    assert_eq!(first.next, DiscoveryState::Registering);
    assert_eq!(orchestrator.state(), &DiscoveryState::Idle);
    assert_eq!(orchestrator.session(), &Session::new());
}
