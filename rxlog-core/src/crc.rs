//! CRC-32 used by receiver logs.
//!
//! Reflected polynomial `0xEDB88320`, initial value zero, no final XOR.
//! Binary logs carry the checksum as a 4-byte little-endian trailer over
//! header and body; text logs carry it as 8 lowercase hex digits after `*`,
//! computed over the bytes between the sync character and the `*`.

/// Reflected CRC-32 polynomial.
pub const CRC32_POLYNOMIAL: u32 = 0xEDB8_8320;

/// Lookup table, one entry per byte value.
static CRC_TABLE: [u32; 256] = build_table();

const fn build_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ CRC32_POLYNOMIAL
            } else {
                crc >> 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// Computes the CRC-32 of a complete block.
///
/// # Arguments
/// * `bytes` - Bytes covered by the checksum
#[inline]
#[must_use]
pub fn crc32(bytes: &[u8]) -> u32 {
    Crc32::new().update(bytes).finish()
}

/// Incremental CRC-32 state.
///
/// Feeding a block in pieces yields the same value as [`crc32`] over the
/// concatenation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Crc32 {
    value: u32,
}

impl Crc32 {
    /// Creates a fresh checksum state.
    #[must_use]
    pub const fn new() -> Self {
        Self { value: 0 }
    }

    /// Feeds more bytes into the checksum.
    #[inline]
    #[must_use]
    pub fn update(mut self, bytes: &[u8]) -> Self {
        let mut crc = self.value;
        for &byte in bytes {
            crc = CRC_TABLE[((crc ^ u32::from(byte)) & 0xFF) as usize] ^ (crc >> 8);
        }
        self.value = crc;
        self
    }

    /// Returns the checksum of every byte fed so far.
    #[inline]
    #[must_use]
    pub const fn finish(self) -> u32 {
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INSTHRESHOLDS: &[u8] = b"INSTHRESHOLDSA,THISPORT,0,0.0,UNKNOWN,0,0.000,00000000,48a5,0;LOW,0.000000000,0.000000000,0.000000000";
    const BESTPOS: &[u8] = b"BESTPOSA,COM1,0,83.5,FINESTEERING,2163,329760.000,02400000,b1f6,65535;SOL_COMPUTED,SINGLE,51.15043874397,-114.03066788586,1097.6822,-17.0000,WGS84,1.3648,1.1806,3.1112,\"\",0.000,0.000,18,18,18,0,00,02,11,01";

    #[test]
    fn test_empty_block() {
        assert_eq!(crc32(&[]), 0);
    }

    #[test]
    fn test_table_entries() {
        assert_eq!(CRC_TABLE[0], 0);
        assert_eq!(CRC_TABLE[1], 0x7707_3096);
        assert_eq!(CRC_TABLE[255], 0x2D02_EF8D);
    }

    #[test]
    fn test_known_ascii_logs() {
        assert_eq!(crc32(INSTHRESHOLDS), 0x3989_c2ac);
        assert_eq!(crc32(BESTPOS), 0xc319_4e35);
    }

    #[test]
    fn test_incremental_matches_block() {
        let (head, tail) = BESTPOS.split_at(70);
        let split = Crc32::new().update(head).update(tail).finish();
        assert_eq!(split, crc32(BESTPOS));
    }

    #[test]
    fn test_single_bit_flip_detected() {
        let mut corrupted = INSTHRESHOLDS.to_vec();
        corrupted[20] ^= 0x01;
        assert_ne!(crc32(&corrupted), crc32(INSTHRESHOLDS));
    }
}
