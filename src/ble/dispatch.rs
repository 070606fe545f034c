//! Event dispatch shim between the stack callbacks and the orchestrator.
//!
//! The stack calls [`Dispatcher::on_gap_event`] and
//! [`Dispatcher::on_gattc_event`] from its callback context, one event at
//! a time. The shim filters out events addressed to other GATT clients
//! or stale connections, converts the rest and hands them to the
//! [`Orchestrator`].

use super::orchestrator::{DiscoveryState, Event, Orchestrator};
use super::report::DiscoverySink;
use super::session::Session;
use super::stack::{GapEvent, GattcEvent, GattcStack};
use super::GattInterface;
use crate::config::DiscoveryConfig;
use crate::error::Error;

pub struct Dispatcher<S, R> {
    orchestrator: Orchestrator,
    stack: S,
    sink: R,
}

impl<S: GattcStack, R: DiscoverySink> Dispatcher<S, R> {
    pub fn new(config: DiscoveryConfig, stack: S, sink: R) -> Self {
        Self {
            orchestrator: Orchestrator::new(config),
            stack,
            sink,
        }
    }

    /// Issue the scan-parameter and client-registration commands.
    pub fn start(&mut self) -> Result<(), Error> {
        info!(
            "starting discovery of \"{}\"",
            self.orchestrator.config().target_name
        );
        self.route(Event::Start)
    }

    /// Entry point for the GAP callback.
    pub fn on_gap_event(&mut self, event: GapEvent<'_>) -> Result<(), Error> {
        let event = match event {
            GapEvent::ScanParamsSet { status } => Event::ScanParamsSet(status),
            GapEvent::ScanStarted { status } => Event::ScanStarted(status),
            GapEvent::AdvertisementReport(report) => Event::Advertisement(report),
            GapEvent::ScanWindowElapsed => Event::ScanWindowElapsed,
            GapEvent::ScanStopped { status } => {
                if let Err(code) = status {
                    warn!("stop scan completed with {:?}", code);
                }
                Event::ScanStopped
            }
        };
        self.route(event)
    }

    /// Entry point for the GATT client callback.
    ///
    /// `interface` is the handle the callback was invoked with.
    pub fn on_gattc_event(
        &mut self,
        interface: GattInterface,
        event: GattcEvent,
    ) -> Result<(), Error> {
        let event = match event {
            GattcEvent::Registered { status, app_id } => {
                if app_id != self.orchestrator.config().app_id {
                    debug!("ignoring registration of app {}", app_id);
                    return Ok(());
                }
                Event::Registered { status, interface }
            }
            _ if !self.is_ours(interface) => {
                trace!("ignoring event for interface {:?}", interface);
                return Ok(());
            }
            GattcEvent::Connected {
                status,
                connection,
                address,
            } => Event::Connected {
                status,
                connection,
                address,
            },
            GattcEvent::Disconnected { connection, reason } => {
                match self.session().connection() {
                    Some(active) if active != connection => {
                        debug!("ignoring disconnect of stale {:?}", connection);
                        return Ok(());
                    }
                    _ => {}
                }
                warn!("disconnected, reason {}", reason);
                Event::Disconnected { reason }
            }
            GattcEvent::ServiceFound(service) => Event::ServiceFound(service),
            GattcEvent::SearchComplete { status } => Event::SearchComplete(status),
        };
        self.route(event)
    }

    /// Called by the integration when the service search timer expires.
    pub fn on_search_timeout(&mut self) -> Result<(), Error> {
        self.route(Event::SearchTimeout)
    }

    pub fn state(&self) -> &DiscoveryState {
        self.orchestrator.state()
    }

    pub fn session(&self) -> &Session {
        self.orchestrator.session()
    }

    pub fn is_finished(&self) -> bool {
        self.state().is_finished()
    }

    /// True while the run waits on search results; the window a search
    /// timer has to cover.
    pub fn is_searching(&self) -> bool {
        matches!(self.state(), DiscoveryState::ServiceSearching { .. })
    }

    pub fn stack(&self) -> &S {
        &self.stack
    }

    pub fn stack_mut(&mut self) -> &mut S {
        &mut self.stack
    }

    pub fn sink(&self) -> &R {
        &self.sink
    }

    fn is_ours(&self, interface: GattInterface) -> bool {
        interface == GattInterface::NONE
            || self
                .session()
                .interface()
                .map_or(true, |bound| bound == interface)
    }

    fn route(&mut self, event: Event<'_>) -> Result<(), Error> {
        let result = self
            .orchestrator
            .handle(event, &mut self.stack, &mut self.sink);
        if let Err(Error::UnexpectedEvent { state, event }) = result {
            debug!("{:?} not expected in {:?}, ignored", event, state);
        }
        result
    }
}
