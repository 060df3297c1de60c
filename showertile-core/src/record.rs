//! Fixed-width tile records and per-bin counters.
//!
//! Format per record (little-endian, 12 bytes):
//! `m u16, n u16, top u16, bottom u16, bin i16, inclination u16`.
//! The bin field is a signed bin count since the shower reference time
//! stored in a 16-bit slot.

/// Bytes per serialized tile record.
pub const TILE_RECORD_BYTES: usize = 12;

/// Counters stop accumulating at this value.
pub const COUNT_CEILING: u16 = 60_000;

/// Adds `amount` to a counter, saturating at [`COUNT_CEILING`].
#[allow(clippy::cast_possible_truncation)]
#[inline]
#[must_use]
pub fn saturating_count_add(count: u16, amount: u32) -> u16 {
    (u32::from(count) + amount).min(u32::from(COUNT_CEILING)) as u16
}

/// Converts a float count to a counter value: rounded, clamped to `[0, COUNT_CEILING]`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
#[inline]
#[must_use]
pub fn clamp_count(value: f64) -> u32 {
    if value.is_nan() || value <= 0.0 {
        0
    } else {
        value.round().min(f64::from(COUNT_CEILING)) as u32
    }
}

/// Deposit counters of one tile in one time bin.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BinCounts {
    /// Upper-layer count (hundredths of a VEM).
    pub top: u16,
    /// Lower-layer count (hundredths of a VEM).
    pub bottom: u16,
    /// Cosine-weighted count used to estimate the mean incidence angle.
    pub inclination: u16,
}

impl BinCounts {
    #[must_use]
    pub fn new(top: u16, bottom: u16, inclination: u16) -> Self {
        Self {
            top,
            bottom,
            inclination,
        }
    }

    /// True when no energy was deposited in either layer.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.top == 0 && self.bottom == 0
    }

    /// Sums another set of counters into this one, saturating.
    pub fn accumulate(&mut self, other: &BinCounts) {
        self.top = saturating_count_add(self.top, u32::from(other.top));
        self.bottom = saturating_count_add(self.bottom, u32::from(other.bottom));
        self.inclination = saturating_count_add(self.inclination, u32::from(other.inclination));
    }

    /// Inclination counter, replaced by the shower-axis estimate when missing
    /// or larger than the mean of the two layers.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    #[must_use]
    pub fn inclination_or_fallback(&self, cos_zenith: f64) -> u16 {
        let total = u32::from(self.top) + u32::from(self.bottom);
        if self.inclination == 0 || 2 * u32::from(self.inclination) > total {
            (cos_zenith * f64::from(total) / 2.0).max(0.0) as u16
        } else {
            self.inclination
        }
    }
}

/// One serialized `(tile, bin)` cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileRecord {
    pub m: u16,
    pub n: u16,
    pub top: u16,
    pub bottom: u16,
    pub bin: i16,
    pub inclination: u16,
}

impl TileRecord {
    /// Serializes the record.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; TILE_RECORD_BYTES] {
        let mut bytes = [0u8; TILE_RECORD_BYTES];
        bytes[0..2].copy_from_slice(&self.m.to_le_bytes());
        bytes[2..4].copy_from_slice(&self.n.to_le_bytes());
        bytes[4..6].copy_from_slice(&self.top.to_le_bytes());
        bytes[6..8].copy_from_slice(&self.bottom.to_le_bytes());
        bytes[8..10].copy_from_slice(&self.bin.to_le_bytes());
        bytes[10..12].copy_from_slice(&self.inclination.to_le_bytes());
        bytes
    }

    /// Deserializes a record.
    #[must_use]
    pub fn from_bytes(bytes: &[u8; TILE_RECORD_BYTES]) -> Self {
        let word = |i: usize| [bytes[2 * i], bytes[2 * i + 1]];
        Self {
            m: u16::from_le_bytes(word(0)),
            n: u16::from_le_bytes(word(1)),
            top: u16::from_le_bytes(word(2)),
            bottom: u16::from_le_bytes(word(3)),
            bin: i16::from_le_bytes(word(4)),
            inclination: u16::from_le_bytes(word(5)),
        }
    }

    /// Counters carried by the record.
    #[must_use]
    pub fn counts(&self) -> BinCounts {
        BinCounts::new(self.top, self.bottom, self.inclination)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_layout() {
        let record = TileRecord {
            m: 0x0102,
            n: 3,
            top: 4,
            bottom: 5,
            bin: -2,
            inclination: 6,
        };
        let bytes = record.to_bytes();
        assert_eq!(&bytes[0..2], &[0x02, 0x01]);
        assert_eq!(&bytes[8..10], &[0xFE, 0xFF]);
        assert_eq!(TileRecord::from_bytes(&bytes), record);
    }

    #[test]
    fn test_saturation() {
        assert_eq!(saturating_count_add(59_990, 5), 59_995);
        assert_eq!(saturating_count_add(59_990, 50), COUNT_CEILING);
        assert_eq!(saturating_count_add(COUNT_CEILING, 1), COUNT_CEILING);

        let mut counts = BinCounts::new(50_000, 10, 0);
        counts.accumulate(&BinCounts::new(50_000, 10, 3));
        assert_eq!(counts, BinCounts::new(COUNT_CEILING, 20, 3));
    }

    #[test]
    fn test_clamp_count() {
        assert_eq!(clamp_count(-3.2), 0);
        assert_eq!(clamp_count(f64::NAN), 0);
        assert_eq!(clamp_count(2.5), 3);
        assert_eq!(clamp_count(1.0e9), u32::from(COUNT_CEILING));
    }

    #[test]
    fn test_inclination_fallback() {
        let cos_zenith = 0.5;
        assert_eq!(BinCounts::new(100, 100, 80).inclination_or_fallback(cos_zenith), 80);
        assert_eq!(BinCounts::new(100, 100, 0).inclination_or_fallback(cos_zenith), 50);
        assert_eq!(BinCounts::new(100, 100, 101).inclination_or_fallback(cos_zenith), 50);
        assert!(BinCounts::new(0, 0, 0).is_empty());
    }
}
