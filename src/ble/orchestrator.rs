//! Discovery state machine.
//!
//! `Idle → Registering → Scanning → Connecting → ServiceSearching → Done`,
//! with `Failed` reachable from every state.
//!
//! [`Orchestrator::transition`] is pure: it maps `(state, event)` to the
//! next state plus an ordered list of [`Effect`]s. [`Orchestrator::handle`]
//! applies those effects against the stack and the reporting sink. The
//! ordering rules live in the effect lists: stop-scan is always queued
//! before connect, and characteristics are only enumerated in response
//! to the service's own search result.

use heapless::Vec;

use super::adv_parser;
use super::characteristics;
use super::report::DiscoverySink;
use super::session::Session;
use super::stack::{AdvertisementReport, GattcStack};
use super::uuid::BleUuid;
use super::{
    AddressType, BdAddr, ConnId, DiscoveredDevice, GattInterface, ScanParams, ServiceHandleRange,
};
use crate::config::DiscoveryConfig;
use crate::error::{Error, Failure, StackError, Step};

/// Where a discovery run stands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DiscoveryState {
    Idle,
    Registering,
    Scanning,
    Connecting { peer: BdAddr },
    /// `services` counts search results handled so far.
    ServiceSearching { services: u16 },
    Done { services: u16 },
    Failed(Failure),
}

impl DiscoveryState {
    pub fn kind(&self) -> StateKind {
        match self {
            DiscoveryState::Idle => StateKind::Idle,
            DiscoveryState::Registering => StateKind::Registering,
            DiscoveryState::Scanning => StateKind::Scanning,
            DiscoveryState::Connecting { .. } => StateKind::Connecting,
            DiscoveryState::ServiceSearching { .. } => StateKind::ServiceSearching,
            DiscoveryState::Done { .. } => StateKind::Done,
            DiscoveryState::Failed(_) => StateKind::Failed,
        }
    }

    /// `Done` or `Failed`.
    pub fn is_finished(&self) -> bool {
        matches!(self, DiscoveryState::Done { .. } | DiscoveryState::Failed(_))
    }
}

/// [`DiscoveryState`] without its data, for error reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StateKind {
    Idle,
    Registering,
    Scanning,
    Connecting,
    ServiceSearching,
    Done,
    Failed,
}

/// Input to the state machine, already stripped of stack specifics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Event<'a> {
    Start,
    ScanParamsSet(Result<(), StackError>),
    Registered {
        status: Result<(), StackError>,
        interface: GattInterface,
    },
    ScanStarted(Result<(), StackError>),
    Advertisement(AdvertisementReport<'a>),
    ScanWindowElapsed,
    ScanStopped,
    Connected {
        status: Result<(), StackError>,
        connection: ConnId,
        address: BdAddr,
    },
    Disconnected {
        reason: u16,
    },
    ServiceFound(ServiceHandleRange),
    SearchComplete(Result<(), StackError>),
    SearchTimeout,
}

impl Event<'_> {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Start => EventKind::Start,
            Event::ScanParamsSet(_) => EventKind::ScanParamsSet,
            Event::Registered { .. } => EventKind::Registered,
            Event::ScanStarted(_) => EventKind::ScanStarted,
            Event::Advertisement(_) => EventKind::Advertisement,
            Event::ScanWindowElapsed => EventKind::ScanWindowElapsed,
            Event::ScanStopped => EventKind::ScanStopped,
            Event::Connected { .. } => EventKind::Connected,
            Event::Disconnected { .. } => EventKind::Disconnected,
            Event::ServiceFound(_) => EventKind::ServiceFound,
            Event::SearchComplete(_) => EventKind::SearchComplete,
            Event::SearchTimeout => EventKind::SearchTimeout,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EventKind {
    Start,
    ScanParamsSet,
    Registered,
    ScanStarted,
    Advertisement,
    ScanWindowElapsed,
    ScanStopped,
    Connected,
    Disconnected,
    ServiceFound,
    SearchComplete,
    SearchTimeout,
}

/// A stack command the orchestrator wants issued.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    SetScanParams(ScanParams),
    RegisterClient {
        app_id: u16,
    },
    StartScan {
        duration_secs: u32,
    },
    StopScan,
    Connect {
        interface: GattInterface,
        address: BdAddr,
        address_type: AddressType,
    },
    SearchServices {
        interface: GattInterface,
        connection: ConnId,
        filter: Option<BleUuid>,
    },
}

impl Command {
    pub fn step(&self) -> Step {
        match self {
            Command::SetScanParams(_) => Step::SetScanParams,
            Command::RegisterClient { .. } => Step::RegisterClient,
            Command::StartScan { .. } => Step::StartScan,
            Command::StopScan => Step::StopScan,
            Command::Connect { .. } => Step::Connect,
            Command::SearchServices { .. } => Step::SearchServices,
        }
    }

    pub fn issue<S: GattcStack + ?Sized>(&self, stack: &mut S) -> Result<(), StackError> {
        match *self {
            Command::SetScanParams(ref params) => stack.set_scan_params(params),
            Command::RegisterClient { app_id } => stack.register_client(app_id),
            Command::StartScan { duration_secs } => stack.start_scan(duration_secs),
            Command::StopScan => stack.stop_scan(),
            Command::Connect {
                interface,
                address,
                address_type,
            } => stack.connect(interface, address, address_type),
            Command::SearchServices {
                interface,
                connection,
                ref filter,
            } => stack.search_services(interface, connection, filter.as_ref()),
        }
    }
}

/// Side effects of one transition, applied in order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    BindInterface(GattInterface),
    OpenConnection(ConnId),
    CloseConnection,
    TargetFound(DiscoveredDevice),
    Issue(Command),
    /// Enumerate and report the characteristics of a found service.
    Enumerate(ServiceHandleRange),
}

pub type Effects = Vec<Effect, 4>;

/// Result of [`Orchestrator::transition`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transition {
    pub next: DiscoveryState,
    pub effects: Effects,
}

impl Transition {
    fn to<const N: usize>(next: DiscoveryState, effects: [Effect; N]) -> Self {
        Self {
            next,
            effects: effects.into_iter().collect(),
        }
    }

    fn fail(failure: Failure) -> Self {
        Self::to(DiscoveryState::Failed(failure), [])
    }
}

/// Owns the session and the current state of one discovery run.
#[derive(Debug)]
pub struct Orchestrator {
    config: DiscoveryConfig,
    state: DiscoveryState,
    session: Session,
}

impl Orchestrator {
    pub fn new(config: DiscoveryConfig) -> Self {
        Self {
            config,
            state: DiscoveryState::Idle,
            session: Session::new(),
        }
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    pub fn state(&self) -> &DiscoveryState {
        &self.state
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Compute what `event` does in the current state without doing it.
    pub fn transition(&self, event: &Event<'_>) -> Result<Transition, Error> {
        use DiscoveryState as S;

        let stay = || Transition::to(self.state, []);
        let unexpected = || Error::UnexpectedEvent {
            state: self.state.kind(),
            event: event.kind(),
        };

        let transition = match (self.state, event) {
            // A run can fail with the link still up; its loss must still
            // clear the session.
            (S::Failed(failure), Event::Disconnected { .. }) if self.session.is_connected() => {
                Transition::to(S::Failed(failure), [Effect::CloseConnection])
            }
            (S::Failed(_), _) => return Err(unexpected()),

            (_, Event::Disconnected { reason }) => Transition::to(
                S::Failed(Failure::Disconnected { reason: *reason }),
                [Effect::CloseConnection],
            ),
            (_, Event::ScanStopped) => stay(),

            (S::Idle, Event::Start) => Transition::to(
                S::Registering,
                [
                    Effect::Issue(Command::SetScanParams(self.config.scan_params)),
                    Effect::Issue(Command::RegisterClient {
                        app_id: self.config.app_id,
                    }),
                ],
            ),

            (S::Registering | S::Scanning, Event::ScanParamsSet(Ok(()))) => stay(),
            (S::Registering | S::Scanning, Event::ScanParamsSet(Err(code))) => {
                Transition::fail(Failure::Status {
                    step: Step::SetScanParams,
                    code: *code,
                })
            }

            (S::Registering, Event::Registered { status, interface }) => match status {
                Ok(()) => Transition::to(
                    S::Scanning,
                    [
                        Effect::BindInterface(*interface),
                        Effect::Issue(Command::StartScan {
                            duration_secs: self.config.scan_duration_secs,
                        }),
                    ],
                ),
                Err(code) => Transition::fail(Failure::Status {
                    step: Step::RegisterClient,
                    code: *code,
                }),
            },

            (S::Scanning, Event::ScanStarted(Ok(()))) => stay(),
            (S::Scanning, Event::ScanStarted(Err(code))) => Transition::fail(Failure::Status {
                step: Step::StartScan,
                code: *code,
            }),

            (S::Scanning, Event::Advertisement(report)) => {
                if !adv_parser::matches_name(report.data, self.config.target_name) {
                    return Ok(stay());
                }
                let interface = self.session.interface().ok_or_else(unexpected)?;
                Transition::to(
                    S::Connecting {
                        peer: report.address,
                    },
                    [
                        Effect::TargetFound(DiscoveredDevice::from_report(report)),
                        Effect::Issue(Command::StopScan),
                        Effect::Issue(Command::Connect {
                            interface,
                            address: report.address,
                            address_type: report.address_type,
                        }),
                    ],
                )
            }
            (S::Scanning, Event::ScanWindowElapsed) => Transition::fail(Failure::TargetNotFound),

            (
                S::Connecting { peer },
                Event::Connected {
                    status,
                    connection,
                    address,
                },
            ) if *address == peer => match status {
                Ok(()) => {
                    let interface = self.session.interface().ok_or_else(unexpected)?;
                    Transition::to(
                        S::ServiceSearching { services: 0 },
                        [
                            Effect::OpenConnection(*connection),
                            Effect::Issue(Command::SearchServices {
                                interface,
                                connection: *connection,
                                filter: None,
                            }),
                        ],
                    )
                }
                Err(code) => Transition::fail(Failure::Status {
                    step: Step::Connect,
                    code: *code,
                }),
            },

            (S::ServiceSearching { services }, Event::ServiceFound(range)) => Transition::to(
                S::ServiceSearching {
                    services: services.saturating_add(1),
                },
                [Effect::Enumerate(*range)],
            ),
            (S::ServiceSearching { services }, Event::SearchComplete(Ok(()))) => {
                Transition::to(S::Done { services }, [])
            }
            (S::ServiceSearching { .. }, Event::SearchComplete(Err(code))) => {
                Transition::fail(Failure::Status {
                    step: Step::SearchServices,
                    code: *code,
                })
            }
            (S::ServiceSearching { .. }, Event::SearchTimeout) => {
                Transition::fail(Failure::SearchTimeout)
            }

            _ => return Err(unexpected()),
        };
        Ok(transition)
    }

    /// Run one event through the state machine and apply its effects.
    ///
    /// Returns `Error::Failed` when this event ends the run in `Failed`,
    /// and `Error::UnexpectedEvent` (state untouched) when the event is
    /// not legal right now.
    pub fn handle<S, R>(
        &mut self,
        event: Event<'_>,
        stack: &mut S,
        sink: &mut R,
    ) -> Result<(), Error>
    where
        S: GattcStack + ?Sized,
        R: DiscoverySink + ?Sized,
    {
        let Transition { next, effects } = self.transition(&event)?;
        let previous = self.state;
        self.state = next;

        for effect in effects {
            if let Err(failure) = self.apply(effect, stack, sink) {
                self.state = DiscoveryState::Failed(failure);
                break;
            }
        }

        if self.state == previous {
            return Ok(());
        }
        if self.state.kind() != previous.kind() {
            debug!("discovery: {:?} -> {:?}", previous.kind(), self.state.kind());
        }

        match self.state {
            DiscoveryState::Failed(failure) => {
                error!("discovery failed: {:?}", failure);
                sink.finished(&self.state);
                Err(Error::Failed(failure))
            }
            DiscoveryState::Done { services } => {
                info!("service search complete, {} services", services);
                sink.finished(&self.state);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn apply<S, R>(&mut self, effect: Effect, stack: &mut S, sink: &mut R) -> Result<(), Failure>
    where
        S: GattcStack + ?Sized,
        R: DiscoverySink + ?Sized,
    {
        match effect {
            Effect::BindInterface(interface) => {
                info!("GATT client registered, interface {:?}", interface);
                self.session.bind_interface(interface);
            }
            Effect::OpenConnection(connection) => {
                info!("connected, conn id {:?}", connection);
                self.session.open(connection);
            }
            Effect::CloseConnection => {
                self.session.close();
            }
            Effect::TargetFound(device) => {
                info!("target found: {} ({})", device.name.as_str(), device.address);
                sink.target_found(&device);
            }
            Effect::Issue(command) => {
                let step = command.step();
                trace!("issuing {:?}", step);
                command.issue(stack).map_err(|code| {
                    error!("{:?} rejected by stack: {:?}", step, code);
                    Failure::Rejected { step, code }
                })?;
            }
            Effect::Enumerate(service) => {
                sink.service_found(&service);
                match characteristics::enumerate(stack, &self.session, &service) {
                    Ok(list) => sink.characteristics(&service, &list),
                    Err(e) => {
                        warn!("skipping service {}: {:?}", service, e);
                        sink.service_skipped(&service, &e);
                    }
                }
            }
        }
        Ok(())
    }
}
