//! Range decompression.
//!
//! Compressed fields hold packed observation sub-records. Decompression is
//! lazy: a [`RangeDecompressor`] walks the block on request, one
//! [`BatchSize`] at a time.
//!
//! Three layouts exist:
//!
//! - `RANGE_RECORD`: self-contained 24-byte records.
//! - `SATELLITE_SIGNAL`: a 10-byte satellite block carrying a PSR and Doppler
//!   baseline, followed by up to 15 12-byte signal blocks holding deltas from
//!   that baseline. Each signal block is one sub-record.
//! - `BIT_PACKED`: per-system satellite and signal masks followed by
//!   reference or differential measurement blocks, see [`bitpacked`].
//!
//! Accumulated Doppler range is reported in carrier cycles. Doppler values
//! are divided by the field's scale factor.

pub mod bitpacked;
mod signal;

pub use bitpacked::ReferenceStore;
pub use signal::{GLONASS_CHANNEL_OFFSET, carrier_wavelength};

use crate::error::{CodecError, Result};
use rxlog_core::{ReadBuffer, WriteBuffer};
use rxlog_schema::CompressionScheme;

/// Size of one `RANGE_RECORD` sub-record.
pub const RANGE_RECORD_SIZE: usize = 24;
/// Size of a `SATELLITE_SIGNAL` satellite block.
pub const SATELLITE_BLOCK_SIZE: usize = 10;
/// Size of a `SATELLITE_SIGNAL` signal block.
pub const SIGNAL_BLOCK_SIZE: usize = 12;
/// Most signal blocks one satellite block can announce.
pub const MAX_SIGNALS_PER_SATELLITE: usize = 15;

const GLONASS_SYSTEM: u8 = 1;
const GLONASS_PRN_OFFSET: u16 = 37;
/// Range records store ADR modulo this many cycles.
const ADR_ROLLOVER: f64 = 8_388_608.0;

/// PSR standard deviation (m) indexed by the low nibble of a range record's std byte.
const RECORD_PSR_STD: [f64; 16] = [
    0.050, 0.075, 0.113, 0.169, 0.253, 0.380, 0.570, 0.854, 1.281, 2.375, 4.750, 9.500, 19.0,
    38.0, 76.0, 152.0,
];

/// PSR standard deviation (m) by signal block index.
const SIGNAL_PSR_STD: [f64; 16] = [
    0.020, 0.030, 0.045, 0.066, 0.099, 0.148, 0.220, 0.329, 0.491, 0.732, 1.092, 1.629, 2.430,
    3.625, 5.409, 5.409,
];

/// Phase range standard deviation (m) by signal block index.
const SIGNAL_ADR_STD: [f64; 16] = [
    0.00391, 0.00521, 0.00696, 0.00929, 0.01239, 0.01654, 0.02208, 0.02947, 0.03933, 0.05249,
    0.07006, 0.09350, 0.12480, 0.16656, 0.22230, 0.22230,
];

/// One decompressed observation.
///
/// `system` and `signal_type` use the codes of the block's scheme: tracking
/// status codes for `RANGE_RECORD`, compact codes otherwise.
/// `glonass_frequency` is stored offset by [`GLONASS_CHANNEL_OFFSET`].
///
/// `adr` is NaN when the signal has no known carrier and the scheme stores
/// phase as a range, or when a `BIT_PACKED` block marks it invalid.
/// `locktime` is seconds, except for `SATELLITE_SIGNAL` where it is the raw
/// lock-time count.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RangeObservation {
    /// Satellite PRN or GLONASS slot.
    pub prn: u16,
    /// GLONASS frequency channel.
    pub glonass_frequency: u8,
    /// Satellite system.
    pub system: u8,
    /// Signal type.
    pub signal_type: u8,
    /// Raw tracking status word.
    pub tracking_status: u32,
    /// Pseudorange (m).
    pub psr: f64,
    /// Pseudorange standard deviation (m).
    pub psr_std: f64,
    /// Accumulated Doppler range (cycles).
    pub adr: f64,
    /// Accumulated Doppler range standard deviation.
    pub adr_std: f64,
    /// Doppler (Hz), divided by the field scale.
    pub doppler: f64,
    /// Carrier to noise density (dB-Hz).
    pub cno: f64,
    /// Lock time.
    pub locktime: f64,
}

/// Number of sub-records decoded per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatchSize {
    /// One sub-record.
    #[default]
    One,
    /// Two sub-records.
    Two,
    /// Four sub-records.
    Four,
}

impl BatchSize {
    /// Returns the sub-record count.
    #[must_use]
    pub const fn len(self) -> usize {
        match self {
            Self::One => 1,
            Self::Two => 2,
            Self::Four => 4,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Baseline {
    prn: u16,
    system: u8,
    glonass_frequency: u8,
    psr: f64,
    doppler: f64,
    remaining: usize,
}

/// Lazy decompressor over one compressed block.
///
/// # Example
/// ```
/// use rxlog_codec::{BatchSize, RangeCompressor, RangeDecompressor, RangeObservation};
/// use rxlog_schema::CompressionScheme;
///
/// let obs = RangeObservation { prn: 12, psr: 2.0e7, cno: 40.0, ..Default::default() };
/// let mut compressor = RangeCompressor::new(CompressionScheme::RangeRecord, 1.0);
/// compressor.push_record(&obs).unwrap();
/// let block = compressor.finish();
///
/// let mut decompressor = RangeDecompressor::new(&block, CompressionScheme::RangeRecord, 1.0);
/// let mut out = Vec::new();
/// assert_eq!(decompressor.decompress_batch(BatchSize::Four, &mut out).unwrap(), 1);
/// assert_eq!(out[0].prn, 12);
/// ```
#[derive(Debug)]
pub struct RangeDecompressor<'a> {
    block: &'a [u8],
    scheme: CompressionScheme,
    scale: f64,
    field: &'a str,
    position: usize,
    baseline: Option<Baseline>,
    packed: bitpacked::Walk<'a>,
    references: Option<&'a mut ReferenceStore>,
    milliseconds: u32,
}

impl<'a> RangeDecompressor<'a> {
    /// Creates a decompressor positioned at the start of `block`.
    #[must_use]
    pub fn new(block: &'a [u8], scheme: CompressionScheme, scale: f64) -> Self {
        Self {
            block,
            scheme,
            scale,
            field: scheme.name(),
            position: 0,
            baseline: None,
            packed: bitpacked::Walk::new(block),
            references: None,
            milliseconds: 0,
        }
    }

    /// Sets the field name reported in errors.
    #[must_use]
    pub fn with_field(mut self, field: &'a str) -> Self {
        self.field = field;
        self
    }

    /// Attaches the reference store of the block's measurement source.
    ///
    /// `milliseconds` is the log's time of week. `BIT_PACKED` reference
    /// blocks are recorded in `store` and differential blocks are resolved
    /// against it; lock times are extrapolated across logs. The store drops
    /// its reference blocks when the log falls on a whole second. Other
    /// schemes ignore the store.
    #[must_use]
    pub fn with_references(mut self, store: &'a mut ReferenceStore, milliseconds: u32) -> Self {
        if self.scheme == CompressionScheme::BitPacked {
            store.begin(milliseconds);
        }
        self.references = Some(store);
        self.milliseconds = milliseconds;
        self
    }

    /// Returns the scheme.
    #[must_use]
    pub const fn scheme(&self) -> CompressionScheme {
        self.scheme
    }

    /// Returns the byte offset of the next unread block.
    #[must_use]
    pub fn position(&self) -> usize {
        match self.scheme {
            CompressionScheme::BitPacked => self.packed.position(),
            _ => self.position,
        }
    }

    /// Returns true once every sub-record has been decoded.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        match self.scheme {
            CompressionScheme::BitPacked => self.packed.is_finished(),
            _ => self.position >= self.block.len() && self.baseline.is_none_or(|b| b.remaining == 0),
        }
    }

    /// Decodes the next sub-record.
    ///
    /// # Errors
    /// Returns `FieldConversion` if the block ends inside a sub-record or a
    /// `BIT_PACKED` satellite number is out of range.
    pub fn decompress_one(&mut self) -> Result<Option<RangeObservation>> {
        match self.scheme {
            CompressionScheme::RangeRecord => {
                if self.position >= self.block.len() {
                    return Ok(None);
                }
                self.require(RANGE_RECORD_SIZE)?;
                let obs = self.range_record(self.position);
                self.position += RANGE_RECORD_SIZE;
                Ok(Some(obs))
            }
            CompressionScheme::SatelliteSignal => self.next_signal(),
            CompressionScheme::BitPacked => {
                let mut context = bitpacked::Context {
                    field: self.field,
                    scale: self.scale,
                    milliseconds: self.milliseconds,
                    store: self.references.as_deref_mut(),
                };
                self.packed.next(&mut context)
            }
        }
    }

    /// Decodes up to `batch` sub-records into `out` and returns how many
    /// were decoded; zero means the block is exhausted.
    ///
    /// # Errors
    /// Returns `FieldConversion` if the block ends inside a sub-record.
    /// Sub-records decoded before the truncation point are kept in `out`.
    pub fn decompress_batch(&mut self, batch: BatchSize, out: &mut Vec<RangeObservation>) -> Result<usize> {
        if self.scheme == CompressionScheme::RangeRecord {
            let remaining = self.block.len().saturating_sub(self.position);
            let count = (remaining / RANGE_RECORD_SIZE).min(batch.len());
            if count == 0 {
                if remaining > 0 {
                    self.require(RANGE_RECORD_SIZE)?;
                }
                return Ok(0);
            }
            out.reserve(count);
            for idx in 0..count {
                out.push(self.range_record(self.position + idx * RANGE_RECORD_SIZE));
            }
            self.position += count * RANGE_RECORD_SIZE;
            return Ok(count);
        }

        let mut decoded = 0;
        while decoded < batch.len() {
            match self.decompress_one()? {
                Some(obs) => {
                    out.push(obs);
                    decoded += 1;
                }
                None => break,
            }
        }
        Ok(decoded)
    }

    /// Decodes every remaining sub-record.
    ///
    /// # Errors
    /// Returns `FieldConversion` if the block is truncated.
    pub fn decompress_all(&mut self) -> Result<Vec<RangeObservation>> {
        let mut out = Vec::new();
        while self.decompress_batch(BatchSize::Four, &mut out)? > 0 {}
        Ok(out)
    }

    fn require(&self, len: usize) -> Result<()> {
        let available = self.block.len().saturating_sub(self.position);
        if available < len {
            return Err(CodecError::field(
                self.field,
                self.position,
                format!("compressed block truncated: {len} bytes required, {available} available"),
            ));
        }
        Ok(())
    }

    #[inline]
    fn range_record(&self, offset: usize) -> RangeObservation {
        let block = self.block;
        let cts = block.get_u32_le(offset);
        let packed = block.get_u64_le(offset + 4);
        let std = block.get_u8(offset + 16);
        let lock = block.get_u32_le(offset + 18);

        let system = ((cts >> 16) & 0x7) as u8;
        let signal_type = ((cts >> 21) & 0x1f) as u8;
        let glonass_frequency = ((lock >> 26) & 0x3f) as u8;
        let psr = (packed >> 28) as f64 / 128.0;
        let mut adr = f64::from(block.get_i32_le(offset + 12)) / 256.0;
        if let Some(wavelength) =
            carrier_wavelength(CompressionScheme::RangeRecord, system, signal_type, glonass_frequency)
        {
            adr -= ADR_ROLLOVER * ((psr / wavelength + adr) / ADR_ROLLOVER).round();
        }

        RangeObservation {
            prn: u16::from(block.get_u8(offset + 17)),
            glonass_frequency,
            system,
            signal_type,
            tracking_status: cts,
            psr,
            psr_std: RECORD_PSR_STD[usize::from(std & 0x0f)],
            adr,
            adr_std: f64::from((std >> 4) + 1) / 512.0,
            doppler: sign_extend(packed & 0x0FFF_FFFF, 28) as f64 / 256.0 / self.scale,
            cno: f64::from((lock >> 21) & 0x1f) + 20.0,
            locktime: f64::from(lock & 0x1F_FFFF) / 32.0,
        }
    }

    fn next_signal(&mut self) -> Result<Option<RangeObservation>> {
        let baseline = loop {
            match self.baseline {
                Some(b) if b.remaining > 0 => break b,
                _ => {
                    if self.position >= self.block.len() {
                        self.baseline = None;
                        return Ok(None);
                    }
                    self.require(SATELLITE_BLOCK_SIZE)?;
                    self.baseline = Some(self.satellite(self.position));
                    self.position += SATELLITE_BLOCK_SIZE;
                }
            }
        };

        self.require(SIGNAL_BLOCK_SIZE)?;
        let offset = self.position;
        let w1 = self.block.get_u32_le(offset);
        let w2 = self.block.get_u64_le(offset + 4);
        self.position += SIGNAL_BLOCK_SIZE;
        self.baseline = Some(Baseline {
            remaining: baseline.remaining - 1,
            ..baseline
        });

        let signal_type = (w1 & 0x1f) as u8;
        let psr_delta = ((w2 >> 13) & 0x3FFF) as f64 / 128.0;
        let phase_delta = ((w2 >> 27) & 0xF_FFFF) as f64 / 2048.0;
        let doppler_delta = sign_extend((w2 >> 47) & 0x1_FFFF, 17) as f64 / 256.0;
        let phase = baseline.psr + phase_delta;
        let adr = carrier_wavelength(
            CompressionScheme::SatelliteSignal,
            baseline.system,
            signal_type,
            baseline.glonass_frequency,
        )
        .map_or(f64::NAN, |wavelength| -phase / wavelength);

        Ok(Some(RangeObservation {
            prn: baseline.prn,
            glonass_frequency: baseline.glonass_frequency,
            system: baseline.system,
            signal_type,
            tracking_status: w1,
            psr: baseline.psr + psr_delta,
            psr_std: SIGNAL_PSR_STD[((w2 >> 5) & 0xf) as usize],
            adr,
            adr_std: SIGNAL_ADR_STD[((w2 >> 9) & 0xf) as usize],
            doppler: (baseline.doppler + doppler_delta) / self.scale,
            cno: (w2 & 0x1f) as f64 + 20.0,
            locktime: f64::from((w1 >> 8) & 0x1_FFFF),
        }))
    }

    fn satellite(&self, offset: usize) -> Baseline {
        let sat_id = u16::from(self.block.get_u8(offset + 1));
        let packed = self.block.get_u64_le(offset + 2);
        let system = ((packed >> 4) & 0x1f) as u8;
        Baseline {
            prn: if system == GLONASS_SYSTEM {
                sat_id + GLONASS_PRN_OFFSET
            } else {
                sat_id
            },
            system,
            glonass_frequency: (packed & 0xf) as u8,
            psr: sign_extend((packed >> 10) & 0x1FFF_FFFF, 29) as f64,
            doppler: sign_extend((packed >> 39) & 0x1F_FFFF, 21) as f64,
            remaining: ((packed >> 60) & 0xf) as usize,
        }
    }
}

impl Iterator for RangeDecompressor<'_> {
    type Item = Result<RangeObservation>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.decompress_one() {
            Ok(obs) => obs.map(Ok),
            Err(err) => {
                // stop after the first error
                self.position = self.block.len();
                self.baseline = None;
                self.packed.stop();
                Some(Err(err))
            }
        }
    }
}

/// Builds compressed blocks from observations.
///
/// Values are quantized to the wire resolution; standard deviations snap
/// to the nearest table entry. `BIT_PACKED` blocks hold reference blocks
/// only and are assembled by [`finish`](Self::finish).
#[derive(Debug, Clone)]
pub struct RangeCompressor {
    scheme: CompressionScheme,
    scale: f64,
    block: Vec<u8>,
    satellites: Vec<bitpacked::PackedSatellite>,
    reference_id: u8,
}

impl RangeCompressor {
    /// Creates an empty compressor.
    #[must_use]
    pub fn new(scheme: CompressionScheme, scale: f64) -> Self {
        Self {
            scheme,
            scale,
            block: Vec::new(),
            satellites: Vec::new(),
            reference_id: 0,
        }
    }

    /// Sets the reference block ID written into `BIT_PACKED` measurement
    /// headers; only the low three bits are kept.
    #[must_use]
    pub fn with_reference_id(mut self, id: u8) -> Self {
        self.reference_id = id & 0x7;
        self
    }

    /// Appends one `RANGE_RECORD` sub-record.
    ///
    /// When the signal's carrier is known the ADR is stored modulo 2^23
    /// cycles and restored on decode from the pseudorange, so it must lie
    /// within 2^22 cycles of `-psr / wavelength`.
    ///
    /// # Errors
    /// Returns `FieldConversion` if the scheme differs or a value is out of
    /// range.
    pub fn push_record(&mut self, obs: &RangeObservation) -> Result<()> {
        self.expect_scheme(CompressionScheme::RangeRecord)?;
        let at = self.block.len();
        let invalid = |reason: String| CodecError::field(self.scheme.name(), at, reason);

        let doppler = quantize(obs.doppler * self.scale, 256.0, 28, true, "doppler").map_err(invalid)?;
        let psr = quantize(obs.psr, 128.0, 36, false, "psr").map_err(invalid)?;
        let mut adr = obs.adr;
        if carrier_wavelength(self.scheme, obs.system, obs.signal_type, obs.glonass_frequency).is_some() {
            adr -= ADR_ROLLOVER * (adr / ADR_ROLLOVER).round();
        }
        let adr = (adr * 256.0).round();
        if !(f64::from(i32::MIN)..=f64::from(i32::MAX)).contains(&adr) {
            return Err(invalid(format!("adr {} out of range", obs.adr)));
        }
        let prn = u8::try_from(obs.prn).map_err(|_| invalid(format!("prn {} out of range", obs.prn)))?;
        let system = bounded(obs.system, 0x7, "system").map_err(invalid)?;
        let signal_type = bounded(obs.signal_type, 0x1f, "signal type").map_err(invalid)?;
        let glonass_frequency = bounded(obs.glonass_frequency, 0x3f, "glonass frequency").map_err(invalid)?;
        let locktime = quantize(obs.locktime, 32.0, 21, false, "locktime").map_err(invalid)?;
        let cno = quantize(obs.cno - 20.0, 1.0, 5, false, "cno").map_err(invalid)?;

        let psr_std = nearest(&RECORD_PSR_STD, obs.psr_std) as u8;
        let adr_std = ((obs.adr_std * 512.0).round() - 1.0).clamp(0.0, 15.0) as u8;
        let cts = (obs.tracking_status & !((0x7 << 16) | (0x1f << 21))) | (system << 16) | (signal_type << 21);

        self.block.resize(at + RANGE_RECORD_SIZE, 0);
        let block = &mut self.block;
        block.put_u32_le(at, cts);
        block.put_u64_le(at + 4, (psr << 28) | doppler);
        block.put_i32_le(at + 12, adr as i32);
        block.put_u8(at + 16, psr_std | (adr_std << 4));
        block.put_u8(at + 17, prn);
        block.put_u32_le(
            at + 18,
            locktime as u32 | ((cno as u32) << 21) | (glonass_frequency << 26),
        );
        Ok(())
    }

    /// Appends one satellite and its signals.
    ///
    /// All signals must share the first signal's PRN, system and GLONASS
    /// frequency. For `SATELLITE_SIGNAL` the baseline is the floor of the
    /// smallest pseudorange or phase range and the rounded Doppler of the
    /// first signal; the phase range is `-adr * wavelength`, so `adr` must be
    /// NaN exactly when the signal has no known carrier. `BIT_PACKED`
    /// ignores `channel` and writes one reference block per signal.
    ///
    /// # Errors
    /// Returns `FieldConversion` if the scheme is `RANGE_RECORD`, the group
    /// is empty or too large, the satellite was already pushed, or a value
    /// is out of range.
    pub fn push_satellite(&mut self, channel: u8, signals: &[RangeObservation]) -> Result<()> {
        if self.scheme == CompressionScheme::BitPacked {
            let at = self.satellites.len();
            let satellite = bitpacked::encode_satellite(signals, self.scale, self.reference_id)
                .and_then(|satellite| {
                    if self.satellites.iter().any(|s| s.same_satellite(&satellite)) {
                        return Err("satellite already pushed".to_string());
                    }
                    Ok(satellite)
                })
                .map_err(|reason| CodecError::field(self.scheme.name(), at, reason))?;
            self.satellites.push(satellite);
            return Ok(());
        }
        self.expect_scheme(CompressionScheme::SatelliteSignal)?;
        let at = self.block.len();
        let invalid = |reason: String| CodecError::field(self.scheme.name(), at, reason);

        let Some(first) = signals.first() else {
            return Err(invalid("satellite has no signals".to_string()));
        };
        if signals.len() > MAX_SIGNALS_PER_SATELLITE {
            return Err(invalid(format!(
                "{} signals exceed the maximum of {MAX_SIGNALS_PER_SATELLITE}",
                signals.len()
            )));
        }
        if signals
            .iter()
            .any(|s| s.prn != first.prn || s.system != first.system || s.glonass_frequency != first.glonass_frequency)
        {
            return Err(invalid("signals belong to different satellites".to_string()));
        }

        let sat_id = if first.system == GLONASS_SYSTEM {
            first.prn.checked_sub(GLONASS_PRN_OFFSET).unwrap_or(u16::MAX)
        } else {
            first.prn
        };
        let sat_id = u8::try_from(sat_id).map_err(|_| invalid(format!("prn {} out of range", first.prn)))?;
        let system = bounded(first.system, 0x1f, "system").map_err(invalid)?;
        let glonass_frequency = bounded(first.glonass_frequency, 0xf, "glonass frequency").map_err(invalid)?;

        let phases = signals
            .iter()
            .map(|s| phase_range(s).map_err(invalid))
            .collect::<Result<Vec<f64>>>()?;
        let psr_base = signals
            .iter()
            .zip(&phases)
            .map(|(s, phase)| s.psr.min(*phase))
            .fold(f64::INFINITY, f64::min)
            .floor();
        let doppler_base = (first.doppler * self.scale).round();
        let psr_bits = quantize(psr_base, 1.0, 29, true, "psr baseline").map_err(invalid)?;
        let doppler_bits = quantize(doppler_base, 1.0, 21, true, "doppler baseline").map_err(invalid)?;

        let mut words = Vec::with_capacity(signals.len());
        for (signal, phase) in signals.iter().zip(&phases) {
            let signal_type = bounded(signal.signal_type, 0x1f, "signal type").map_err(invalid)?;
            let locktime = quantize(signal.locktime, 1.0, 17, false, "locktime").map_err(invalid)?;
            let cno = quantize(signal.cno - 20.0, 1.0, 5, false, "cno").map_err(invalid)?;
            let psr_delta = quantize(signal.psr - psr_base, 128.0, 14, false, "psr delta").map_err(invalid)?;
            let phase_delta = quantize(phase - psr_base, 2048.0, 20, false, "phase delta").map_err(invalid)?;
            let doppler_delta = quantize(signal.doppler * self.scale - doppler_base, 256.0, 17, true, "doppler delta")
                .map_err(invalid)?;

            let w1 = (signal.tracking_status & !(0x1f | (0x1_FFFF << 8))) | signal_type | ((locktime as u32) << 8);
            let w2 = cno
                | (nearest(&SIGNAL_PSR_STD, signal.psr_std) << 5)
                | (nearest(&SIGNAL_ADR_STD, signal.adr_std) << 9)
                | (psr_delta << 13)
                | (phase_delta << 27)
                | (doppler_delta << 47);
            words.push((w1, w2));
        }

        let packed = u64::from(glonass_frequency)
            | (u64::from(system) << 4)
            | (psr_bits << 10)
            | (doppler_bits << 39)
            | ((signals.len() as u64) << 60);

        self.block
            .resize(at + SATELLITE_BLOCK_SIZE + signals.len() * SIGNAL_BLOCK_SIZE, 0);
        let block = &mut self.block;
        block.put_u8(at, channel);
        block.put_u8(at + 1, sat_id);
        block.put_u64_le(at + 2, packed);
        let mut offset = at + SATELLITE_BLOCK_SIZE;
        for (w1, w2) in words {
            block.put_u32_le(offset, w1);
            block.put_u64_le(offset + 4, w2);
            offset += SIGNAL_BLOCK_SIZE;
        }
        Ok(())
    }

    /// Returns the compressed block.
    #[must_use]
    pub fn finish(self) -> Vec<u8> {
        match self.scheme {
            CompressionScheme::BitPacked => bitpacked::assemble(&self.satellites),
            _ => self.block,
        }
    }

    fn expect_scheme(&self, scheme: CompressionScheme) -> Result<()> {
        if self.scheme != scheme {
            return Err(CodecError::field(
                self.scheme.name(),
                self.block.len(),
                format!("cannot append {} data", scheme.name()),
            ));
        }
        Ok(())
    }
}

/// Phase range (m) of a `SATELLITE_SIGNAL` observation.
fn phase_range(obs: &RangeObservation) -> std::result::Result<f64, String> {
    let wavelength = carrier_wavelength(
        CompressionScheme::SatelliteSignal,
        obs.system,
        obs.signal_type,
        obs.glonass_frequency,
    );
    match (wavelength, obs.adr.is_nan()) {
        (Some(wavelength), false) => Ok(-obs.adr * wavelength),
        (None, true) => Ok(obs.psr),
        (Some(_), true) => Err(format!("adr of signal type {} is not a number", obs.signal_type)),
        (None, false) => Err(format!(
            "no carrier for system {} signal type {}",
            obs.system, obs.signal_type
        )),
    }
}

#[inline]
fn sign_extend(raw: u64, bits: u32) -> i64 {
    let shift = 64 - bits;
    ((raw << shift) as i64) >> shift
}

/// Scales, rounds and range-checks a value; returns its `bits`-wide pattern.
fn quantize(value: f64, factor: f64, bits: u32, signed: bool, what: &str) -> std::result::Result<u64, String> {
    let raw = (value * factor).round();
    let (min, max) = if signed {
        (-((1i64 << (bits - 1)) as f64), ((1i64 << (bits - 1)) - 1) as f64)
    } else {
        (0.0, ((1u64 << bits) - 1) as f64)
    };
    if !(min..=max).contains(&raw) {
        return Err(format!("{what} {value} out of range"));
    }
    Ok((raw as i64 as u64) & ((1u64 << bits) - 1))
}

fn bounded(value: u8, max: u8, what: &str) -> std::result::Result<u32, String> {
    if value > max {
        return Err(format!("{what} {value} exceeds {max}"));
    }
    Ok(u32::from(value))
}

fn nearest(table: &[f64; 16], value: f64) -> u64 {
    let mut best = 0;
    for (idx, entry) in table.iter().enumerate() {
        if (entry - value).abs() < (table[best] - value).abs() {
            best = idx;
        }
    }
    best as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manual_record() -> Vec<u8> {
        let mut block = vec![0u8; RANGE_RECORD_SIZE];
        block.put_u32_le(0, (2 << 16) | (5 << 21));
        block.put_u64_le(4, (2_560_000_000u64 << 28) | 0x0FFF_FE00);
        block.put_i32_le(12, -256_000);
        block.put_u8(16, 0x23);
        block.put_u8(17, 17);
        block.put_u32_le(18, 320 | (25 << 21) | (7 << 26));
        block
    }

    fn record(prn: u16) -> RangeObservation {
        let psr = 2.0e7 + f64::from(prn) * 1000.25;
        let wavelength = carrier_wavelength(CompressionScheme::RangeRecord, 0, 0, 0).unwrap();
        RangeObservation {
            prn,
            glonass_frequency: 0,
            system: 0,
            signal_type: 0,
            tracking_status: 0x0810_1c04,
            psr,
            psr_std: 0.113,
            adr: (-psr / wavelength * 256.0).round() / 256.0 + f64::from(prn) / 256.0,
            adr_std: 2.0 / 512.0,
            doppler: -1200.5 + f64::from(prn),
            cno: 42.0,
            locktime: 1234.5,
        }
    }

    /// A `SATELLITE_SIGNAL` observation whose phase range is `phase` metres.
    fn signal(prn: u16, system: u8, signal_type: u8, psr: f64, phase: f64, doppler: f64) -> RangeObservation {
        let glonass_frequency = if system == GLONASS_SYSTEM { 9 } else { 0 };
        let adr = carrier_wavelength(CompressionScheme::SatelliteSignal, system, signal_type, glonass_frequency)
            .map_or(f64::NAN, |wavelength| -phase / wavelength);
        RangeObservation {
            prn,
            glonass_frequency,
            system,
            signal_type,
            tracking_status: u32::from(signal_type) | (1000 << 8) | (1 << 30),
            psr,
            psr_std: 0.066,
            adr,
            adr_std: 0.00929,
            doppler,
            cno: 45.0,
            locktime: 1000.0,
        }
    }

    #[test]
    fn test_range_record_fields() {
        let block = manual_record();
        let mut decompressor = RangeDecompressor::new(&block, CompressionScheme::RangeRecord, 1.0);
        let obs = decompressor.decompress_one().unwrap().unwrap();
        assert_eq!(obs.prn, 17);
        assert_eq!(obs.system, 2);
        assert_eq!(obs.signal_type, 5);
        assert_eq!(obs.tracking_status, (2 << 16) | (5 << 21));
        assert_eq!(obs.doppler, -2.0);
        assert_eq!(obs.psr, 20_000_000.0);
        assert_eq!(obs.adr, -1000.0);
        assert_eq!(obs.psr_std, 0.169);
        assert_eq!(obs.adr_std, 3.0 / 512.0);
        assert_eq!(obs.locktime, 10.0);
        assert_eq!(obs.cno, 45.0);
        assert_eq!(obs.glonass_frequency, 7);
        assert!(decompressor.decompress_one().unwrap().is_none());
        assert!(decompressor.is_finished());
    }

    #[test]
    fn test_doppler_scale() {
        let block = manual_record();
        let obs = RangeDecompressor::new(&block, CompressionScheme::RangeRecord, 4.0)
            .decompress_all()
            .unwrap();
        assert_eq!(obs[0].doppler, -0.5);
    }

    #[test]
    fn test_range_record_compressor() {
        let mut compressor = RangeCompressor::new(CompressionScheme::RangeRecord, 1.0);
        compressor.push_record(&record(3)).unwrap();
        let block = compressor.finish();
        assert_eq!(block.len(), RANGE_RECORD_SIZE);

        let decoded = RangeDecompressor::new(&block, CompressionScheme::RangeRecord, 1.0)
            .decompress_all()
            .unwrap();
        assert_eq!(decoded, vec![record(3)]);
    }

    #[test]
    fn test_satellite_signal_round_trip() {
        let gps = [
            signal(5, 0, 1, 21_000_000.5, 21_000_003.25, -1234.5),
            signal(5, 0, 5, 21_000_001.0, 21_000_000.75, -1234.25),
        ];
        let glonass = [signal(40, GLONASS_SYSTEM, 1, 19_500_100.125, 19_500_100.5, 880.0)];

        let mut compressor = RangeCompressor::new(CompressionScheme::SatelliteSignal, 1.0);
        compressor.push_satellite(0, &gps).unwrap();
        compressor.push_satellite(1, &glonass).unwrap();
        let block = compressor.finish();
        assert_eq!(block.len(), 2 * SATELLITE_BLOCK_SIZE + 3 * SIGNAL_BLOCK_SIZE);
        // GLONASS slot is stored relative to the PRN offset
        assert_eq!(block[SATELLITE_BLOCK_SIZE + 2 * SIGNAL_BLOCK_SIZE + 1], 3);

        let decoded = RangeDecompressor::new(&block, CompressionScheme::SatelliteSignal, 1.0)
            .decompress_all()
            .unwrap();
        assert_eq!(decoded, vec![gps[0], gps[1], glonass[0]]);
    }

    #[test]
    fn test_satellite_signal_scale() {
        let signals = [signal(8, 0, 1, 2.2e7, 2.2e7, 250.5)];
        let mut compressor = RangeCompressor::new(CompressionScheme::SatelliteSignal, 2.0);
        compressor.push_satellite(0, &signals).unwrap();
        let block = compressor.finish();
        let decoded = RangeDecompressor::new(&block, CompressionScheme::SatelliteSignal, 2.0)
            .decompress_all()
            .unwrap();
        assert_eq!(decoded[0].doppler, 250.5);
    }

    #[test]
    fn test_batch_sizes_agree() {
        let mut compressor = RangeCompressor::new(CompressionScheme::RangeRecord, 1.0);
        for prn in 1..=7 {
            compressor.push_record(&record(prn)).unwrap();
        }
        let block = compressor.finish();

        let mut results = Vec::new();
        for batch in [BatchSize::One, BatchSize::Two, BatchSize::Four] {
            let mut decompressor = RangeDecompressor::new(&block, CompressionScheme::RangeRecord, 1.0);
            let mut out = Vec::new();
            let mut calls = 0;
            while decompressor.decompress_batch(batch, &mut out).unwrap() > 0 {
                calls += 1;
            }
            assert_eq!(calls, 7usize.div_ceil(batch.len()));
            results.push(out);
        }
        assert_eq!(results[0].len(), 7);
        assert_eq!(results[0], results[1]);
        assert_eq!(results[0], results[2]);
    }

    #[test]
    fn test_truncated_range_record() {
        let mut block = manual_record();
        block.extend_from_slice(&manual_record()[..10]);
        let mut decompressor = RangeDecompressor::new(&block, CompressionScheme::RangeRecord, 1.0).with_field("range");
        let mut out = Vec::new();
        assert_eq!(decompressor.decompress_batch(BatchSize::Four, &mut out).unwrap(), 1);
        match decompressor.decompress_batch(BatchSize::Four, &mut out).unwrap_err() {
            CodecError::FieldConversion { field, offset, .. } => {
                assert_eq!(field, "range");
                assert_eq!(offset, RANGE_RECORD_SIZE);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_truncated_signal_block() {
        let mut compressor = RangeCompressor::new(CompressionScheme::SatelliteSignal, 1.0);
        compressor
            .push_satellite(0, &[signal(5, 0, 1, 2.0e7, 2.0e7, 0.0), signal(5, 0, 5, 2.0e7, 2.0e7, 0.0)])
            .unwrap();
        let mut block = compressor.finish();
        block.truncate(block.len() - 1);

        let results: Vec<_> = RangeDecompressor::new(&block, CompressionScheme::SatelliteSignal, 1.0).collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(CodecError::FieldConversion { .. })));
    }

    #[test]
    fn test_compressor_rejects_bad_input() {
        let mut records = RangeCompressor::new(CompressionScheme::RangeRecord, 1.0);
        let negative = RangeObservation {
            psr: -1.0,
            ..record(1)
        };
        assert!(records.push_record(&negative).is_err());
        assert!(records.push_satellite(0, &[record(1)]).is_err());

        let mut satellites = RangeCompressor::new(CompressionScheme::SatelliteSignal, 1.0);
        assert!(satellites.push_satellite(0, &[]).is_err());
        let mixed = [signal(5, 0, 1, 2.0e7, 2.0e7, 0.0), signal(6, 0, 1, 2.0e7, 2.0e7, 0.0)];
        assert!(satellites.push_satellite(0, &mixed).is_err());
        let far = [signal(5, 0, 1, 2.0e7, 2.0e7, 0.0), signal(5, 0, 5, 2.0e7 + 500.0, 2.0e7, 0.0)];
        assert!(satellites.push_satellite(0, &far).is_err());
        // known carrier without a phase, and a phase without a carrier
        let no_phase = RangeObservation {
            adr: f64::NAN,
            ..signal(5, 0, 1, 2.0e7, 2.0e7, 0.0)
        };
        assert!(satellites.push_satellite(0, &[no_phase]).is_err());
        let unknown = RangeObservation {
            adr: 1.0,
            ..signal(5, 0, 2, 2.0e7, 2.0e7, 0.0)
        };
        assert!(satellites.push_satellite(0, &[unknown]).is_err());
        assert!(satellites.finish().is_empty());
    }

    #[test]
    fn test_adr_rollover() {
        let obs = record(9);
        let mut compressor = RangeCompressor::new(CompressionScheme::RangeRecord, 1.0);
        compressor.push_record(&obs).unwrap();
        let block = compressor.finish();

        // the wire holds the ADR modulo 2^23 cycles
        let stored = f64::from(block.get_i32_le(12)) / 256.0;
        assert!(stored.abs() <= ADR_ROLLOVER / 2.0);
        assert_eq!((obs.adr - stored) % ADR_ROLLOVER, 0.0);

        let decoded = RangeDecompressor::new(&block, CompressionScheme::RangeRecord, 1.0)
            .decompress_all()
            .unwrap();
        assert_eq!(decoded[0].adr, obs.adr);
    }

    #[test]
    fn test_phase_without_carrier_is_nan() {
        let lband = signal(1, signal::system::LBAND, 1, 3.6e7, 0.0, 12.0);
        assert!(lband.adr.is_nan());
        let mut compressor = RangeCompressor::new(CompressionScheme::SatelliteSignal, 1.0);
        compressor.push_satellite(0, &[lband]).unwrap();
        let block = compressor.finish();
        let decoded = RangeDecompressor::new(&block, CompressionScheme::SatelliteSignal, 1.0)
            .decompress_all()
            .unwrap();
        assert_eq!(decoded[0].psr, 3.6e7);
        assert!(decoded[0].adr.is_nan());
    }

    #[test]
    fn test_sign_extend() {
        assert_eq!(sign_extend(0x0FFF_FE00, 28), -512);
        assert_eq!(sign_extend(0x07FF_FFFF, 28), 0x07FF_FFFF);
        assert_eq!(sign_extend(0x1_0000, 17), -65_536);
    }
}
