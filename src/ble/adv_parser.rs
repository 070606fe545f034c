//! Advertisement payload parsing.
//!
//! A payload is a run of AD structures `[len][type][len - 1 bytes]`,
//! ended by a zero length byte or the end of the buffer.

use crate::error::MalformedAdvertisement;

/// AD type: Shortened Local Name.
pub const AD_TYPE_SHORTENED_LOCAL_NAME: u8 = 0x08;
/// AD type: Complete Local Name.
pub const AD_TYPE_COMPLETE_LOCAL_NAME: u8 = 0x09;

/// One AD structure borrowed from a payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AdStructure<'a> {
    pub ad_type: u8,
    pub data: &'a [u8],
}

impl AdStructure<'_> {
    pub fn is_local_name(&self) -> bool {
        self.ad_type == AD_TYPE_COMPLETE_LOCAL_NAME || self.ad_type == AD_TYPE_SHORTENED_LOCAL_NAME
    }
}

/// Iterator over the AD structures of a payload.
///
/// Yields an error once if a length byte points past the end of the
/// buffer, then stops.
#[derive(Clone, Debug)]
pub struct AdStructures<'a> {
    data: &'a [u8],
    offset: usize,
    done: bool,
}

impl<'a> AdStructures<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            offset: 0,
            done: false,
        }
    }
}

impl<'a> Iterator for AdStructures<'a> {
    type Item = Result<AdStructure<'a>, MalformedAdvertisement>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let Some(&len) = self.data.get(self.offset) else {
            self.done = true;
            return None;
        };
        if len == 0 {
            self.done = true;
            return None;
        }

        let start = self.offset + 1;
        let end = start + len as usize;
        if end > self.data.len() {
            self.done = true;
            return Some(Err(MalformedAdvertisement {
                offset: self.offset,
                declared_len: len,
            }));
        }

        let record = &self.data[start..end];
        self.offset = end;
        Some(Ok(AdStructure {
            ad_type: record[0],
            data: &record[1..],
        }))
    }
}

/// Check if raw advertisement data carries a local name equal to `target`.
///
/// Both complete and shortened names are compared. A malformed payload
/// is a non-match.
pub fn matches_name(data: &[u8], target: &str) -> bool {
    for ad in AdStructures::new(data) {
        match ad {
            Ok(ad) if ad.is_local_name() && ad.data == target.as_bytes() => return true,
            Ok(_) => {}
            Err(_) => return false,
        }
    }
    false
}

/// Extract the first complete/shortened local name that is valid UTF-8.
pub fn local_name(data: &[u8]) -> Option<&str> {
    AdStructures::new(data)
        .map_while(Result::ok)
        .filter(|ad| ad.is_local_name())
        .find_map(|ad| core::str::from_utf8(ad.data).ok())
}

// ═══════════════════════════════════════════════════════════════════════════
// Unit Tests (run on host, not embedded)
// ═══════════════════════════════════════════════════════════════════════════
