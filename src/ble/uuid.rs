//! GATT attribute identifiers and their display form.

use core::fmt::{self, Write};

/// Formatted identifier. 36 bytes fits the dashed 128-bit form exactly.
pub type UuidString = heapless::String<36>;

/// The Bluetooth base UUID `00000000-0000-1000-8000-00805f9b34fb`.
pub const BASE_UUID: u128 = 0x0000_0000_0000_1000_8000_0080_5f9b_34fb;

/// A 16-, 32- or 128-bit attribute UUID.
///
/// 128-bit values are stored little-endian, the way the stack delivers
/// them; [`fmt::Display`] renders them most significant byte first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BleUuid {
    Uuid16(u16),
    Uuid32(u32),
    Uuid128([u8; 16]),
}

impl BleUuid {
    /// Build a 128-bit UUID from its display-order value.
    pub const fn from_u128(value: u128) -> Self {
        BleUuid::Uuid128(value.to_le_bytes())
    }

    /// Widen to 128 bits; short forms are placed on the base UUID.
    pub const fn to_u128(&self) -> u128 {
        match self {
            BleUuid::Uuid16(v) => BASE_UUID | ((*v as u128) << 96),
            BleUuid::Uuid32(v) => BASE_UUID | ((*v as u128) << 96),
            BleUuid::Uuid128(bytes) => u128::from_le_bytes(*bytes),
        }
    }

    /// Compare across widths, e.g. `0x180d` against its base-UUID form.
    pub const fn same_as(&self, other: &BleUuid) -> bool {
        self.to_u128() == other.to_u128()
    }

    /// Width of the stored value in bytes.
    pub const fn byte_len(&self) -> usize {
        match self {
            BleUuid::Uuid16(_) => 2,
            BleUuid::Uuid32(_) => 4,
            BleUuid::Uuid128(_) => 16,
        }
    }

    /// Canonical lowercase hex string.
    pub fn format(&self) -> UuidString {
        let mut s = UuidString::new();
        // Every variant fits in 36 bytes.
        let _ = write!(s, "{}", self);
        s
    }
}

impl Default for BleUuid {
    fn default() -> Self {
        BleUuid::Uuid16(0)
    }
}

impl fmt::Display for BleUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BleUuid::Uuid16(v) => write!(f, "{:04x}", v),
            BleUuid::Uuid32(v) => write!(f, "{:08x}", v),
            BleUuid::Uuid128(bytes) => {
                for (i, byte) in bytes.iter().rev().enumerate() {
                    if matches!(i, 4 | 6 | 8 | 10) {
                        f.write_char('-')?;
                    }
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for BleUuid {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "{=str}", self.format().as_str())
    }
}
