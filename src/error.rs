//! Unified error types for ble-discover.
//!
//! We avoid `alloc` - all error variants carry only fixed-size data and
//! are `Copy`, so a terminal failure can be stored inside the discovery
//! state. Implements `defmt::Format` (behind the `defmt` feature) for
//! efficient on-target logging.

use crate::ble::orchestrator::{EventKind, StateKind};

/// Raw status code returned by the BLE stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StackError(pub u32);

/// The workflow step a stack command belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Step {
    SetScanParams,
    RegisterClient,
    StartScan,
    StopScan,
    Connect,
    SearchServices,
}

/// An AD structure's length byte runs past the end of the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MalformedAdvertisement {
    /// Offset of the offending length byte.
    pub offset: usize,
    /// The length it declared.
    pub declared_len: u8,
}

/// Characteristic query failures. Local to one service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum QueryError {
    /// No connection (or no registered interface) to query through.
    NotConnected,
    /// The stack reports zero characteristics in the handle range.
    NoCharacteristics,
    /// The stack returned a non-success status.
    Status(StackError),
    /// The stack filled fewer records than it counted.
    Incomplete { expected: u16, received: u16 },
}

/// Why a service's characteristics could not be listed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EnumerateError {
    Query(QueryError),
    /// The record buffer could not hold `requested` entries.
    Allocation { requested: u16, capacity: usize },
}

/// Terminal failures of a discovery run. No retry follows any of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Failure {
    /// A command was refused synchronously.
    Rejected { step: Step, code: StackError },
    /// A command was accepted but its completion event carried an error.
    Status { step: Step, code: StackError },
    /// The link dropped.
    Disconnected { reason: u16 },
    /// The scan window elapsed without a matching advertisement.
    TargetNotFound,
    /// Service search did not complete in time.
    SearchTimeout,
}

/// Top-level error returned by the event entry points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// This event moved the run into `Failed`.
    Failed(Failure),
    /// The event is not legal in the current state; nothing changed.
    UnexpectedEvent { state: StateKind, event: EventKind },
}

// Convenience conversions

impl From<QueryError> for EnumerateError {
    fn from(e: QueryError) -> Self {
        EnumerateError::Query(e)
    }
}

impl From<Failure> for Error {
    fn from(f: Failure) -> Self {
        Error::Failed(f)
    }
}
