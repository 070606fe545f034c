//! Where discovery results go.

use heapless::Vec;

use super::characteristics::CharacteristicList;
use super::orchestrator::DiscoveryState;
use super::{CharacteristicRecord, DiscoveredDevice, ServiceHandleRange};
use crate::config::MAX_SERVICES;
use crate::error::EnumerateError;

/// Receives discovery results as they are produced, in discovery order.
///
/// Every method defaults to doing nothing.
pub trait DiscoverySink {
    fn target_found(&mut self, _device: &DiscoveredDevice) {}

    /// A search result arrived; its characteristics follow immediately.
    fn service_found(&mut self, _service: &ServiceHandleRange) {}

    fn characteristics(
        &mut self,
        _service: &ServiceHandleRange,
        _characteristics: &[CharacteristicRecord],
    ) {
    }

    /// The service's characteristics could not be listed.
    fn service_skipped(&mut self, _service: &ServiceHandleRange, _error: &EnumerateError) {}

    /// The run reached `Done` or `Failed`.
    fn finished(&mut self, _outcome: &DiscoveryState) {}
}

impl<T: DiscoverySink + ?Sized> DiscoverySink for &mut T {
    fn target_found(&mut self, device: &DiscoveredDevice) {
        (**self).target_found(device)
    }

    fn service_found(&mut self, service: &ServiceHandleRange) {
        (**self).service_found(service)
    }

    fn characteristics(
        &mut self,
        service: &ServiceHandleRange,
        characteristics: &[CharacteristicRecord],
    ) {
        (**self).characteristics(service, characteristics)
    }

    fn service_skipped(&mut self, service: &ServiceHandleRange, error: &EnumerateError) {
        (**self).service_skipped(service, error)
    }

    fn finished(&mut self, outcome: &DiscoveryState) {
        (**self).finished(outcome)
    }
}

/// Feed both sinks, first `A` then `B`.
impl<A: DiscoverySink, B: DiscoverySink> DiscoverySink for (A, B) {
    fn target_found(&mut self, device: &DiscoveredDevice) {
        self.0.target_found(device);
        self.1.target_found(device);
    }

    fn service_found(&mut self, service: &ServiceHandleRange) {
        self.0.service_found(service);
        self.1.service_found(service);
    }

    fn characteristics(
        &mut self,
        service: &ServiceHandleRange,
        characteristics: &[CharacteristicRecord],
    ) {
        self.0.characteristics(service, characteristics);
        self.1.characteristics(service, characteristics);
    }

    fn service_skipped(&mut self, service: &ServiceHandleRange, error: &EnumerateError) {
        self.0.service_skipped(service, error);
        self.1.service_skipped(service, error);
    }

    fn finished(&mut self, outcome: &DiscoveryState) {
        self.0.finished(outcome);
        self.1.finished(outcome);
    }
}

/// Logs every service and characteristic as it is found.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogSink;

impl DiscoverySink for LogSink {
    fn service_found(&mut self, service: &ServiceHandleRange) {
        info!("service found: {}", service);
    }

    fn characteristics(
        &mut self,
        _service: &ServiceHandleRange,
        characteristics: &[CharacteristicRecord],
    ) {
        for characteristic in characteristics {
            info!("  characteristic found: {}", characteristic);
        }
    }

    fn service_skipped(&mut self, service: &ServiceHandleRange, error: &EnumerateError) {
        warn!("  no characteristics listed for {}: {:?}", service, error);
    }
}

/// One row of a [`ServiceTable`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiscoveredService {
    pub service: ServiceHandleRange,
    pub characteristics: CharacteristicList,
    /// Set when the characteristics could not be listed.
    pub error: Option<EnumerateError>,
}

/// Keeps the results of a run for inspection once it finishes.
#[derive(Clone, Debug, Default)]
pub struct ServiceTable {
    target: Option<DiscoveredDevice>,
    services: Vec<DiscoveredService, MAX_SERVICES>,
    /// Services that did not fit in the table.
    dropped: usize,
    outcome: Option<DiscoveryState>,
}

impl ServiceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn target(&self) -> Option<&DiscoveredDevice> {
        self.target.as_ref()
    }

    pub fn services(&self) -> &[DiscoveredService] {
        &self.services
    }

    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn outcome(&self) -> Option<&DiscoveryState> {
        self.outcome.as_ref()
    }

    /// Row for `service`, the most recent one if it was reported twice.
    fn row_mut(&mut self, service: &ServiceHandleRange) -> Option<&mut DiscoveredService> {
        self.services
            .iter_mut()
            .rev()
            .find(|row| row.service == *service)
    }
}

impl DiscoverySink for ServiceTable {
    fn target_found(&mut self, device: &DiscoveredDevice) {
        self.target = Some(device.clone());
    }

    fn service_found(&mut self, service: &ServiceHandleRange) {
        let row = DiscoveredService {
            service: *service,
            characteristics: CharacteristicList::new(),
            error: None,
        };
        if self.services.push(row).is_err() {
            self.dropped += 1;
        }
    }

    fn characteristics(
        &mut self,
        service: &ServiceHandleRange,
        characteristics: &[CharacteristicRecord],
    ) {
        if let Some(row) = self.row_mut(service) {
            row.characteristics.clear();
            // Never longer than the enumerator's own buffer.
            let _ = row.characteristics.extend_from_slice(characteristics);
        }
    }

    fn service_skipped(&mut self, service: &ServiceHandleRange, error: &EnumerateError) {
        if let Some(row) = self.row_mut(service) {
            row.error = Some(*error);
        }
    }

    fn finished(&mut self, outcome: &DiscoveryState) {
        self.outcome = Some(*outcome);
    }
}
