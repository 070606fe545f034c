//! Characteristic enumeration for one discovered service.

use heapless::Vec;

use super::session::Session;
use super::stack::GattcStack;
use super::{CharacteristicRecord, ServiceHandleRange};
use crate::config::MAX_CHARACTERISTICS_PER_SERVICE;
use crate::error::{EnumerateError, QueryError};

/// Characteristics of one service, in handle order as the stack reports them.
pub type CharacteristicList = Vec<CharacteristicRecord, MAX_CHARACTERISTICS_PER_SERVICE>;

/// List every characteristic declared in `service`'s handle range.
///
/// Counts first, then sizes the buffer to that count and asks the stack
/// to fill it. A short fill is an error and no partial list escapes; the
/// buffer is dropped on every error path.
pub fn enumerate<S: GattcStack + ?Sized>(
    stack: &mut S,
    session: &Session,
    service: &ServiceHandleRange,
) -> Result<CharacteristicList, EnumerateError> {
    let (interface, connection) = session.link().ok_or(QueryError::NotConnected)?;
    let (start, end) = (service.start_handle, service.end_handle);

    let count = stack
        .characteristic_count(interface, connection, start, end)
        .map_err(QueryError::Status)?;
    if count == 0 {
        return Err(QueryError::NoCharacteristics.into());
    }

    let mut buffer = CharacteristicList::new();
    buffer
        .resize_default(count as usize)
        .map_err(|_| EnumerateError::Allocation {
            requested: count,
            capacity: MAX_CHARACTERISTICS_PER_SERVICE,
        })?;

    let filled = stack
        .all_characteristics(interface, connection, start, end, &mut buffer[..])
        .map_err(QueryError::Status)?;
    if filled < buffer.len() {
        return Err(QueryError::Incomplete {
            expected: count,
            received: filled as u16,
        }
        .into());
    }

    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::tests::{Call, MockStack};
    use crate::ble::{BleUuid, ConnId, GattInterface};
    use crate::error::StackError;

    fn connected() -> Session {
        let mut session = Session::new();
        session.bind_interface(GattInterface(3));
        session.open(ConnId(5));
        session
    }

    fn heart_rate() -> ServiceHandleRange {
        ServiceHandleRange {
            start_handle: 0x0010,
            end_handle: 0x0020,
            uuid: BleUuid::Uuid16(0x180D),
        }
    }

    #[test]
    fn lists_characteristics_in_range() {
        let mut stack = MockStack::new().with_characteristics(&[
            (0x0008, 0x2A00),
            (0x0012, 0x2A37),
            (0x0015, 0x2A38),
            (0x0030, 0x2A19),
        ]);

        let list = enumerate(&mut stack, &connected(), &heart_rate()).unwrap();

        assert_eq!(
            list.as_slice(),
            &[
                CharacteristicRecord {
                    uuid: BleUuid::Uuid16(0x2A37),
                    handle: 0x0012
                },
                CharacteristicRecord {
                    uuid: BleUuid::Uuid16(0x2A38),
                    handle: 0x0015
                },
            ]
        );
        assert_eq!(
            stack.calls,
            [
                Call::CharacteristicCount(GattInterface(3), ConnId(5), 0x0010, 0x0020),
                Call::AllCharacteristics(GattInterface(3), ConnId(5), 0x0010, 0x0020, 2),
            ]
        );
    }

    #[test]
    fn zero_characteristics_is_a_query_error_without_buffer() {
        let mut stack = MockStack::new().with_characteristics(&[(0x0030, 0x2A19)]);

        let err = enumerate(&mut stack, &connected(), &heart_rate()).unwrap_err();

        assert_eq!(err, EnumerateError::Query(QueryError::NoCharacteristics));
        assert!(!stack
            .calls
            .iter()
            .any(|c| matches!(c, Call::AllCharacteristics(..))));
    }

    #[test]
    fn count_failure_is_reported() {
        let mut stack = MockStack::new();
        stack.count_error = Some(StackError(0x85));

        let err = enumerate(&mut stack, &connected(), &heart_rate()).unwrap_err();
        assert_eq!(
            err,
            EnumerateError::Query(QueryError::Status(StackError(0x85)))
        );
    }

    #[test]
    fn fetch_failure_is_reported() {
        let mut stack = MockStack::new().with_characteristics(&[(0x0012, 0x2A37)]);
        stack.fetch_error = Some(StackError(0x0A));

        let err = enumerate(&mut stack, &connected(), &heart_rate()).unwrap_err();
        assert_eq!(
            err,
            EnumerateError::Query(QueryError::Status(StackError(0x0A)))
        );
    }

    #[test]
    fn short_fill_yields_no_partial_results() {
        let mut stack =
            MockStack::new().with_characteristics(&[(0x0012, 0x2A37), (0x0015, 0x2A38)]);
        stack.short_fill = true;

        let err = enumerate(&mut stack, &connected(), &heart_rate()).unwrap_err();
        assert_eq!(
            err,
            EnumerateError::Query(QueryError::Incomplete {
                expected: 2,
                received: 1
            })
        );
    }

    #[test]
    fn too_many_characteristics_is_an_allocation_error() {
        let declared: std::vec::Vec<(u16, u16)> = (0..MAX_CHARACTERISTICS_PER_SERVICE as u16 + 1)
            .map(|i| (0x0011 + i, 0x2A00 + i))
            .collect();
        let mut stack = MockStack::new().with_characteristics(&declared);
        let service = ServiceHandleRange {
            end_handle: 0x00FF,
            ..heart_rate()
        };

        let err = enumerate(&mut stack, &connected(), &service).unwrap_err();

        assert_eq!(
            err,
            EnumerateError::Allocation {
                requested: MAX_CHARACTERISTICS_PER_SERVICE as u16 + 1,
                capacity: MAX_CHARACTERISTICS_PER_SERVICE,
            }
        );
        assert!(!stack
            .calls
            .iter()
            .any(|c| matches!(c, Call::AllCharacteristics(..))));
    }

    #[test]
    fn not_connected_never_touches_the_stack() {
        let mut stack = MockStack::new().with_characteristics(&[(0x0012, 0x2A37)]);

        let err = enumerate(&mut stack, &Session::new(), &heart_rate()).unwrap_err();

        assert_eq!(err, EnumerateError::Query(QueryError::NotConnected));
        assert!(stack.calls.is_empty());
    }
}
