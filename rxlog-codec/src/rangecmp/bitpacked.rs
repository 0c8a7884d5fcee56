//! Bit-packed range blocks.
//!
//! A block opens with a 16-bit satellite system mask. Each system present
//! contributes a 64-bit satellite mask, a 16-bit signal mask and one
//! included-signal bitfield per satellite, followed by a measurement header
//! and one signal block per included signal for each satellite. Fields are
//! read least significant bit first.
//!
//! Reference blocks hold absolute measurements; the first signal of a
//! satellite is the primary and later signals are relative to it.
//! Differential blocks hold offsets from the reference block stored for the
//! same system, signal and satellite during the current second. Those
//! references live in a [`ReferenceStore`] owned by the caller.

use super::signal::{self, system, tracking};
use super::{RangeObservation, SIGNAL_PSR_STD, nearest, quantize, sign_extend};
use crate::error::{CodecError, Result};
use rxlog_schema::CompressionScheme;
use std::collections::{HashMap, VecDeque};

/// Systems in block order; a system's code is its bit in the system mask.
const SYSTEMS: [u8; 7] = [
    system::GPS,
    system::GLONASS,
    system::SBAS,
    system::GALILEO,
    system::BEIDOU,
    system::QZSS,
    system::NAVIC,
];

const SYSTEM_MASK_BITS: u32 = 16;
const SATELLITE_MASK_BITS: u32 = 64;
const SIGNAL_MASK_BITS: u32 = 16;

const DIFFERENTIAL_FLAG_BITS: u32 = 1;
const REFERENCE_ID_BITS: u32 = 3;
const GLONASS_FREQUENCY_BITS: u32 = 5;

const PARITY_BITS: u32 = 1;
const HALF_CYCLE_BITS: u32 = 1;
const CNO_BITS: u32 = 11;
const LOCK_TIME_BITS: u32 = 4;
const STD_BITS: u32 = 4;

const CNO_SCALE: f64 = 0.05;
const PSR_SCALE: f64 = 0.0005;
const PHASE_SCALE: f64 = 0.0001;
const DOPPLER_SCALE: f64 = 0.0001;

/// Reference block widths, primary then secondary.
const REFERENCE_PSR_BITS: [u32; 2] = [37, 20];
const REFERENCE_PHASE_BITS: u32 = 23;
const REFERENCE_DOPPLER_BITS: [u32; 2] = [26, 14];
const REFERENCE_INVALID_PSR: [i64; 2] = [0x1F_FFFF_FFFF, -524_288];
const REFERENCE_INVALID_PHASE: i64 = -4_194_304;
const REFERENCE_INVALID_DOPPLER: i64 = -33_554_432;

/// Differential block widths; Doppler is primary then secondary.
const DIFFERENTIAL_PSR_BITS: u32 = 19;
const DIFFERENTIAL_PHASE_BITS: u32 = 16;
const DIFFERENTIAL_DOPPLER_BITS: [u32; 2] = [18, 14];
const DIFFERENTIAL_INVALID_PSR: i64 = -262_144;
const DIFFERENTIAL_INVALID_PHASE: i64 = -32_768;
const DIFFERENTIAL_INVALID_DOPPLER: [i64; 2] = [-131_072, -8_192];

const GLONASS_PRN_OFFSET: u16 = 37;
const GLONASS_UNKNOWN_SLOTS: std::ops::RangeInclusive<u8> = 43..=64;
const SBAS_LOW_SLOTS: std::ops::RangeInclusive<u8> = 1..=39;
const SBAS_LOW_OFFSET: u16 = 119;
const SBAS_HIGH_SLOTS: std::ops::RangeInclusive<u8> = 54..=62;
const SBAS_HIGH_OFFSET: u16 = 129;
const QZSS_PRN_OFFSET: u16 = 192;

const TRACKING_PLL: u32 = 4;
const TRACKING_AIDED_PLL: u32 = 11;
const TRACKING_PHASE_LOCK: u32 = 1 << 10;
const TRACKING_PARITY_KNOWN: u32 = 1 << 11;
const TRACKING_CODE_LOCK: u32 = 1 << 12;
const TRACKING_GROUPED: u32 = 1 << 20;
const TRACKING_PRIMARY_L1: u32 = 1 << 27;
const TRACKING_HALF_CYCLE: u32 = 1 << 28;

/// ADR standard deviation (cycles) by index.
const ADR_STD: [f64; 16] = [
    0.003, 0.005, 0.007, 0.009, 0.012, 0.016, 0.022, 0.029, 0.039, 0.052, 0.070, 0.093, 0.124,
    0.166, 0.222, 0.222,
];

/// Lower bound of each lock time index (ms).
const LOCK_TIME_MS: [f64; 16] = [
    0.0, 16.0, 32.0, 64.0, 128.0, 256.0, 512.0, 1024.0, 2048.0, 4096.0, 8192.0, 16384.0, 32768.0,
    65536.0, 131_072.0, 262_144.0,
];

/// Signals of a system in block order; a signal's code is its bit in the
/// signal mask.
fn system_signals(system: u8) -> &'static [u8] {
    match system {
        system::GPS => &[1, 4, 5, 6, 7, 15],
        system::GLONASS => &[1, 3, 4, 6],
        system::SBAS => &[1, 2],
        system::GALILEO => &[1, 2, 3, 4, 5, 12],
        system::BEIDOU => &[1, 2, 3, 4, 5, 6, 7, 9, 11],
        system::QZSS => &[1, 3, 4, 8, 10, 11],
        system::NAVIC => &[1],
        _ => &[],
    }
}

/// Maps a block satellite number onto a PRN; `None` for unassigned slots.
fn prn(system: u8, slot: u8) -> Option<u16> {
    let mapped = match system {
        system::GLONASS if GLONASS_UNKNOWN_SLOTS.contains(&slot) => return None,
        system::GLONASS => u16::from(slot) + GLONASS_PRN_OFFSET,
        system::SBAS if SBAS_LOW_SLOTS.contains(&slot) => u16::from(slot) + SBAS_LOW_OFFSET,
        system::SBAS if SBAS_HIGH_SLOTS.contains(&slot) => u16::from(slot) + SBAS_HIGH_OFFSET,
        system::SBAS => return None,
        system::QZSS => u16::from(slot) + QZSS_PRN_OFFSET,
        _ => u16::from(slot),
    };
    Some(mapped)
}

/// Inverse of [`prn`].
fn slot(system: u8, prn: u16) -> Option<u8> {
    let slot = match system {
        system::GLONASS => prn.checked_sub(GLONASS_PRN_OFFSET)?,
        system::SBAS if prn > SBAS_HIGH_OFFSET + u16::from(*SBAS_LOW_SLOTS.end()) => {
            prn.checked_sub(SBAS_HIGH_OFFSET)?
        }
        system::SBAS => prn.checked_sub(SBAS_LOW_OFFSET)?,
        system::QZSS => prn.checked_sub(QZSS_PRN_OFFSET)?,
        _ => prn,
    };
    let slot = u8::try_from(slot).ok().filter(|s| (1..=64).contains(s))?;
    (self::prn(system, slot) == Some(prn)).then_some(slot)
}

/// Reads fields least significant bit first.
#[derive(Debug, Clone)]
pub(crate) struct BitReader<'a> {
    data: &'a [u8],
    bit: usize,
}

impl<'a> BitReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, bit: 0 }
    }

    pub(crate) fn read(&mut self, bits: u32, field: &str) -> Result<u64> {
        let available = self.data.len() * 8 - self.bit;
        if bits as usize > available {
            return Err(CodecError::field(
                field,
                self.bit / 8,
                format!("compressed block truncated: {bits} bits required, {available} available"),
            ));
        }
        let mut value = 0u64;
        for n in 0..bits {
            let at = self.bit + n as usize;
            if (self.data[at / 8] >> (at % 8)) & 1 == 1 {
                value |= 1 << n;
            }
        }
        self.bit += bits as usize;
        Ok(value)
    }

    pub(crate) fn read_signed(&mut self, bits: u32, field: &str) -> Result<i64> {
        Ok(sign_extend(self.read(bits, field)?, bits))
    }

    pub(crate) fn read_flag(&mut self, field: &str) -> Result<bool> {
        Ok(self.read(1, field)? == 1)
    }

    /// Returns the offset of the byte holding the next unread bit.
    pub(crate) const fn byte_offset(&self) -> usize {
        self.bit / 8
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.bit >= self.data.len() * 8
    }
}

/// Writes fields least significant bit first.
#[derive(Debug, Clone, Default)]
pub(crate) struct BitWriter {
    data: Vec<u8>,
    bits: usize,
}

impl BitWriter {
    pub(crate) fn write(&mut self, value: u64, bits: u32) {
        for n in 0..bits {
            if self.bits % 8 == 0 {
                self.data.push(0);
            }
            if let Some(last) = self.data.last_mut() {
                *last |= (((value >> n) & 1) as u8) << (self.bits % 8);
            }
            self.bits += 1;
        }
    }

    pub(crate) fn write_flag(&mut self, flag: bool) {
        self.write(u64::from(flag), 1);
    }

    pub(crate) fn append(&mut self, other: &BitWriter) {
        for at in 0..other.bits {
            self.write(u64::from((other.data[at / 8] >> (at % 8)) & 1), 1);
        }
    }

    pub(crate) fn finish(self) -> Vec<u8> {
        self.data
    }
}

/// One decoded signal block in metres and metres per second.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct SignalBlock {
    parity_known: bool,
    half_cycle: bool,
    cno: f64,
    lock_bits: u8,
    psr_std: u8,
    adr_std: u8,
    psr: f64,
    psr_valid: bool,
    phase: f64,
    phase_valid: bool,
    doppler: f64,
    doppler_valid: bool,
}

fn read_common(reader: &mut BitReader<'_>, field: &str) -> Result<SignalBlock> {
    Ok(SignalBlock {
        parity_known: reader.read(PARITY_BITS, field)? == 1,
        half_cycle: reader.read(HALF_CYCLE_BITS, field)? == 1,
        cno: reader.read(CNO_BITS, field)? as f64 * CNO_SCALE,
        lock_bits: reader.read(LOCK_TIME_BITS, field)? as u8,
        psr_std: reader.read(STD_BITS, field)? as u8,
        adr_std: reader.read(STD_BITS, field)? as u8,
        ..SignalBlock::default()
    })
}

/// Reads a reference block; `primary` is set for the secondary signals of
/// a satellite.
fn read_reference(reader: &mut BitReader<'_>, field: &str, primary: Option<&SignalBlock>) -> Result<SignalBlock> {
    let secondary = usize::from(primary.is_some());
    let mut block = read_common(reader, field)?;
    let psr = if primary.is_some() {
        reader.read_signed(REFERENCE_PSR_BITS[secondary], field)?
    } else {
        reader.read(REFERENCE_PSR_BITS[secondary], field)? as i64
    };
    let phase = reader.read_signed(REFERENCE_PHASE_BITS, field)?;
    let doppler = reader.read_signed(REFERENCE_DOPPLER_BITS[secondary], field)?;
    let (psr_base, doppler_base) = primary.map_or((0.0, 0.0), |p| (p.psr, p.doppler));

    block.psr_valid = psr != REFERENCE_INVALID_PSR[secondary];
    block.psr = psr as f64 * PSR_SCALE + psr_base;
    block.phase_valid = phase != REFERENCE_INVALID_PHASE;
    block.phase = phase as f64 * PHASE_SCALE + block.psr;
    block.doppler_valid = doppler != REFERENCE_INVALID_DOPPLER;
    block.doppler = doppler as f64 * DOPPLER_SCALE + doppler_base;
    Ok(block)
}

/// A differential block before its reference is applied.
#[derive(Debug, Clone, Copy)]
struct Differential {
    common: SignalBlock,
    secondary: usize,
    psr: i64,
    phase: i64,
    doppler: i64,
}

impl Differential {
    fn read(reader: &mut BitReader<'_>, field: &str, secondary: bool) -> Result<Self> {
        let secondary = usize::from(secondary);
        Ok(Self {
            common: read_common(reader, field)?,
            secondary,
            psr: reader.read_signed(DIFFERENTIAL_PSR_BITS, field)?,
            phase: reader.read_signed(DIFFERENTIAL_PHASE_BITS, field)?,
            doppler: reader.read_signed(DIFFERENTIAL_DOPPLER_BITS[secondary], field)?,
        })
    }

    /// Applies the offsets to `reference`, advanced by `second_offset`
    /// seconds of its Doppler.
    fn resolve(&self, reference: &SignalBlock, second_offset: f64) -> SignalBlock {
        let drift = reference.doppler * second_offset;
        SignalBlock {
            psr_valid: self.psr != DIFFERENTIAL_INVALID_PSR,
            psr: self.psr as f64 * PSR_SCALE + reference.psr + drift,
            phase_valid: self.phase != DIFFERENTIAL_INVALID_PHASE,
            phase: self.phase as f64 * PHASE_SCALE + reference.phase + drift,
            doppler_valid: self.doppler != DIFFERENTIAL_INVALID_DOPPLER[self.secondary],
            doppler: self.doppler as f64 * DOPPLER_SCALE + reference.doppler,
            ..self.common
        }
    }
}

type SignalKey = (u8, u8, u8);

#[derive(Debug, Clone, Copy)]
struct StoredReference {
    id: u8,
    glonass_frequency: u8,
    block: SignalBlock,
}

/// Lock time extrapolated from the coarse lock time index.
///
/// An index only gives a lower bound, so the lock time counts up with the
/// log time from the moment the index last changed. The count is relative
/// until a change is seen, then absolute. A decreasing index means the
/// signal was lost.
#[derive(Debug, Clone, Copy, Default)]
struct LockTime {
    millis: f64,
    last_change: f64,
    bits: Option<u8>,
    absolute: bool,
}

impl LockTime {
    fn update(&mut self, bits: u8, now: f64, key: SignalKey) -> f64 {
        let (system, signal_type, slot) = key;
        let floor = LOCK_TIME_MS[usize::from(bits & 0xf)];
        if self.bits != Some(bits) {
            let slipped = self.bits.is_some_and(|known| bits < known);
            if self.absolute && slipped {
                tracing::warn!(system, signal_type, slot, now, "lock time slipped, signal likely lost");
                self.absolute = false;
            } else if !self.absolute && (bits == 0 || self.bits.is_some_and(|known| bits > known)) {
                self.absolute = true;
                let jump = floor - self.millis;
                if jump.abs() > f64::EPSILON {
                    tracing::debug!(system, signal_type, slot, jump, "lock time jumped");
                }
            }
            self.last_change = now;
            self.bits = Some(bits);
        } else if floor > 0.0 && now - self.last_change > 2.0 * floor {
            tracing::warn!(system, signal_type, slot, now, "lock time index did not advance");
            self.last_change = now;
        }
        self.millis = now - self.last_change + floor;
        self.millis / 1000.0
    }
}

/// Reference blocks and lock time history carried between `BIT_PACKED`
/// blocks of one measurement source.
///
/// Attach one with
/// [`RangeDecompressor::with_references`](super::RangeDecompressor::with_references)
/// and reuse it for every log of the source, in time order.
#[derive(Debug, Clone, Default)]
pub struct ReferenceStore {
    references: HashMap<SignalKey, StoredReference>,
    lock_times: HashMap<SignalKey, LockTime>,
}

impl ReferenceStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored reference blocks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.references.len()
    }

    /// Returns true if no reference block is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }

    /// Forgets every reference block and lock time.
    pub fn clear(&mut self) {
        self.references.clear();
        self.lock_times.clear();
    }

    /// Drops stale reference blocks when a log starts a new second.
    pub(crate) fn begin(&mut self, milliseconds: u32) {
        if milliseconds % 1000 == 0 {
            self.references.clear();
        }
    }
}

/// Per-call settings of a walk.
pub(crate) struct Context<'s> {
    pub(crate) field: &'s str,
    pub(crate) scale: f64,
    pub(crate) milliseconds: u32,
    pub(crate) store: Option<&'s mut ReferenceStore>,
}

/// Lazy walk over a bit-packed block, one satellite at a time.
#[derive(Debug, Clone)]
pub(crate) struct Walk<'a> {
    reader: BitReader<'a>,
    systems: Option<u16>,
    system_index: usize,
    system: u8,
    signals: Vec<u8>,
    satellites: Vec<(u8, u64)>,
    satellite_index: usize,
    pending: VecDeque<RangeObservation>,
    done: bool,
}

impl<'a> Walk<'a> {
    pub(crate) fn new(block: &'a [u8]) -> Self {
        Self {
            reader: BitReader::new(block),
            systems: None,
            system_index: 0,
            system: 0,
            signals: Vec::new(),
            satellites: Vec::new(),
            satellite_index: 0,
            pending: VecDeque::new(),
            done: false,
        }
    }

    pub(crate) fn next(&mut self, context: &mut Context<'_>) -> Result<Option<RangeObservation>> {
        loop {
            if let Some(obs) = self.pending.pop_front() {
                return Ok(Some(obs));
            }
            if self.done {
                return Ok(None);
            }
            if self.satellite_index < self.satellites.len() {
                self.satellite(context)?;
            } else if !self.enter_system(context.field)? {
                self.done = true;
            }
        }
    }

    pub(crate) fn position(&self) -> usize {
        self.reader.byte_offset()
    }

    pub(crate) fn is_finished(&self) -> bool {
        if !self.pending.is_empty() || self.satellite_index < self.satellites.len() {
            return false;
        }
        if self.done {
            return true;
        }
        match self.systems {
            None => self.reader.is_empty(),
            Some(mask) => SYSTEMS
                .iter()
                .skip(self.system_index)
                .all(|system| mask & (1 << system) == 0),
        }
    }

    pub(crate) fn stop(&mut self) {
        self.pending.clear();
        self.satellites.clear();
        self.done = true;
    }

    /// Reads the masks of the next system present; false once none is left.
    fn enter_system(&mut self, field: &str) -> Result<bool> {
        let systems = match self.systems {
            Some(mask) => mask,
            None if self.reader.is_empty() => return Ok(false),
            None => {
                let mask = self.reader.read(SYSTEM_MASK_BITS, field)? as u16;
                self.systems = Some(mask);
                mask
            }
        };
        while let Some(&system) = SYSTEMS.get(self.system_index) {
            self.system_index += 1;
            if systems & (1 << system) == 0 {
                continue;
            }
            let satellite_mask = self.reader.read(SATELLITE_MASK_BITS, field)?;
            let signal_mask = self.reader.read(SIGNAL_MASK_BITS, field)?;
            self.system = system;
            self.signals = system_signals(system)
                .iter()
                .copied()
                .filter(|code| signal_mask & (1 << code) != 0)
                .collect();
            self.satellites.clear();
            self.satellite_index = 0;
            let width = self.signals.len() as u32;
            for bit in 0..64u8 {
                if (satellite_mask >> bit) & 1 == 1 {
                    let included = self.reader.read(width, field)?;
                    self.satellites.push((bit + 1, included));
                }
            }
            return Ok(true);
        }
        Ok(false)
    }

    /// Decodes every signal of the next satellite into `pending`.
    fn satellite(&mut self, context: &mut Context<'_>) -> Result<()> {
        let Some(&(slot, included)) = self.satellites.get(self.satellite_index) else {
            return Ok(());
        };
        self.satellite_index += 1;
        let field = context.field;
        let offset = self.reader.byte_offset();
        let Some(prn) = prn(self.system, slot) else {
            return Err(CodecError::field(
                field,
                offset,
                format!("satellite {slot} of system {} has no PRN", self.system),
            ));
        };

        let differential = self.reader.read(DIFFERENTIAL_FLAG_BITS, field)? == 1;
        let id = self.reader.read(REFERENCE_ID_BITS, field)? as u8;
        let glonass_frequency = if self.system == system::GLONASS && !differential {
            self.reader.read(GLONASS_FREQUENCY_BITS, field)? as u8
        } else {
            0
        };
        let second_offset = f64::from(context.milliseconds % 1000) / 1000.0;

        let mut primary: Option<SignalBlock> = None;
        let mut first = true;
        for (bit, &signal_type) in self.signals.iter().enumerate() {
            if (included >> bit) & 1 == 0 {
                continue;
            }
            let key = (self.system, signal_type, slot);
            let resolved = if differential {
                let raw = Differential::read(&mut self.reader, field, !first)?;
                let reference = context
                    .store
                    .as_deref()
                    .and_then(|store| store.references.get(&key))
                    .copied();
                match reference {
                    Some(reference) if reference.id == id => {
                        Some((raw.resolve(&reference.block, second_offset), reference.glonass_frequency))
                    }
                    Some(reference) => {
                        tracing::warn!(
                            system = self.system,
                            signal_type,
                            slot,
                            expected = reference.id,
                            found = id,
                            "differential block skipped, reference ID differs"
                        );
                        None
                    }
                    None => {
                        tracing::warn!(
                            system = self.system,
                            signal_type,
                            slot,
                            id,
                            "differential block skipped, no reference"
                        );
                        None
                    }
                }
            } else {
                let block = read_reference(&mut self.reader, field, primary.as_ref())?;
                if primary.is_none() {
                    primary = Some(block);
                }
                if let Some(store) = context.store.as_deref_mut() {
                    store.references.insert(
                        key,
                        StoredReference {
                            id,
                            glonass_frequency,
                            block,
                        },
                    );
                }
                Some((block, glonass_frequency))
            };
            first = false;

            let Some((block, glonass_frequency)) = resolved else {
                continue;
            };
            let locktime = match context.store.as_deref_mut() {
                Some(store) => store.lock_times.entry(key).or_default().update(
                    block.lock_bits,
                    f64::from(context.milliseconds),
                    key,
                ),
                None => LOCK_TIME_MS[usize::from(block.lock_bits & 0xf)] / 1000.0,
            };
            self.pending.push_back(observation(
                self.system,
                prn,
                signal_type,
                glonass_frequency,
                &block,
                locktime,
                context.scale,
            ));
        }

        if self.pending.len() > 1 {
            for obs in &mut self.pending {
                obs.tracking_status |= TRACKING_GROUPED;
            }
        }
        Ok(())
    }
}

fn observation(
    system: u8,
    prn: u16,
    signal_type: u8,
    glonass_frequency: u8,
    block: &SignalBlock,
    locktime: f64,
    scale: f64,
) -> RangeObservation {
    let wavelength = signal::carrier_wavelength(CompressionScheme::BitPacked, system, signal_type, glonass_frequency);
    let cycles = |metres: f64, valid: bool| match wavelength {
        Some(wavelength) if valid => -metres / wavelength,
        _ => f64::NAN,
    };
    RangeObservation {
        prn,
        glonass_frequency,
        system,
        signal_type,
        tracking_status: tracking_word(system, signal_type, block),
        psr: if block.psr_valid { block.psr } else { f64::NAN },
        psr_std: SIGNAL_PSR_STD[usize::from(block.psr_std & 0xf)],
        adr: cycles(block.phase, block.phase_valid),
        adr_std: ADR_STD[usize::from(block.adr_std & 0xf)],
        doppler: cycles(block.doppler, block.doppler_valid) / scale,
        cno: block.cno,
        locktime,
    }
}

/// Builds the tracking status word a bit-packed block implies.
fn tracking_word(system: u8, signal_type: u8, block: &SignalBlock) -> u32 {
    let (tracking_system, tracking_signal) =
        signal::tracking_codes(CompressionScheme::BitPacked, system, signal_type).unwrap_or((tracking::OTHER, 0x1f));
    let primary_l1 = signal_type == 1 || (system == system::BEIDOU && signal_type == 2);
    let mut word = if primary_l1 {
        TRACKING_PLL | TRACKING_PRIMARY_L1
    } else {
        TRACKING_AIDED_PLL
    };
    word |= u32::from(tracking_system) << 16 | u32::from(tracking_signal) << 21;
    if block.phase_valid {
        word |= TRACKING_PHASE_LOCK;
    }
    if block.parity_known {
        word |= TRACKING_PARITY_KNOWN;
    }
    if block.psr_valid {
        word |= TRACKING_CODE_LOCK;
    }
    if block.half_cycle {
        word |= TRACKING_HALF_CYCLE;
    }
    word
}

/// One satellite's measurement header and signal blocks, waiting for the
/// block header that [`assemble`] writes.
#[derive(Debug, Clone)]
pub(crate) struct PackedSatellite {
    system: u8,
    slot: u8,
    signal_mask: u16,
    bits: BitWriter,
}

impl PackedSatellite {
    pub(crate) fn same_satellite(&self, other: &Self) -> bool {
        self.system == other.system && self.slot == other.slot
    }
}

/// Encodes one satellite as reference blocks.
pub(crate) fn encode_satellite(
    signals: &[RangeObservation],
    scale: f64,
    reference_id: u8,
) -> std::result::Result<PackedSatellite, String> {
    let Some(first) = signals.first() else {
        return Err("satellite has no signals".to_string());
    };
    if signals
        .iter()
        .any(|s| s.prn != first.prn || s.system != first.system || s.glonass_frequency != first.glonass_frequency)
    {
        return Err("signals belong to different satellites".to_string());
    }
    let system = first.system;
    let order = system_signals(system);
    if order.is_empty() {
        return Err(format!("system {system} cannot be bit-packed"));
    }
    let slot = slot(system, first.prn).ok_or_else(|| format!("prn {} out of range", first.prn))?;
    let glonass_frequency = first.glonass_frequency;
    if glonass_frequency >= 1 << GLONASS_FREQUENCY_BITS || (system != system::GLONASS && glonass_frequency != 0) {
        return Err(format!("glonass frequency {glonass_frequency} out of range"));
    }

    let mut sorted = Vec::with_capacity(signals.len());
    let mut signal_mask = 0u16;
    for obs in signals {
        let rank = order
            .iter()
            .position(|&code| code == obs.signal_type)
            .ok_or_else(|| format!("signal type {} unknown for system {system}", obs.signal_type))?;
        if signal_mask & (1 << obs.signal_type) != 0 {
            return Err(format!("signal type {} repeated", obs.signal_type));
        }
        signal_mask |= 1 << obs.signal_type;
        sorted.push((rank, obs));
    }
    sorted.sort_by_key(|(rank, _)| *rank);

    let mut bits = BitWriter::default();
    bits.write(0, DIFFERENTIAL_FLAG_BITS);
    bits.write(u64::from(reference_id), REFERENCE_ID_BITS);
    if system == system::GLONASS {
        bits.write(u64::from(glonass_frequency), GLONASS_FREQUENCY_BITS);
    }

    let mut primary: Option<(f64, f64)> = None;
    for (_, obs) in sorted {
        let wavelength =
            signal::carrier_wavelength(CompressionScheme::BitPacked, system, obs.signal_type, glonass_frequency)
                .ok_or_else(|| format!("no carrier for signal type {}", obs.signal_type))?;
        write_common(&mut bits, obs)?;

        let phase = -obs.adr * wavelength;
        let doppler = -obs.doppler * scale * wavelength;
        let secondary = usize::from(primary.is_some());
        let (psr_base, doppler_base) = primary.unwrap_or((0.0, 0.0));

        let psr = packed(
            obs.psr - psr_base,
            PSR_SCALE,
            REFERENCE_PSR_BITS[secondary],
            primary.is_some(),
            REFERENCE_INVALID_PSR[secondary],
            "psr",
        )?;
        let decoded_psr = psr as f64 * PSR_SCALE + psr_base;
        let phase = packed(
            phase - decoded_psr,
            PHASE_SCALE,
            REFERENCE_PHASE_BITS,
            true,
            REFERENCE_INVALID_PHASE,
            "phase range",
        )?;
        if primary.is_some() && doppler.is_nan() {
            return Err("secondary signal needs a doppler".to_string());
        }
        let doppler = packed(
            doppler - doppler_base,
            DOPPLER_SCALE,
            REFERENCE_DOPPLER_BITS[secondary],
            true,
            REFERENCE_INVALID_DOPPLER,
            "doppler",
        )?;

        bits.write(psr as u64, REFERENCE_PSR_BITS[secondary]);
        bits.write(phase as u64, REFERENCE_PHASE_BITS);
        bits.write(doppler as u64, REFERENCE_DOPPLER_BITS[secondary]);
        if primary.is_none() {
            primary = Some((decoded_psr, doppler as f64 * DOPPLER_SCALE));
        }
    }

    Ok(PackedSatellite {
        system,
        slot,
        signal_mask,
        bits,
    })
}

fn write_common(bits: &mut BitWriter, obs: &RangeObservation) -> std::result::Result<(), String> {
    let cno = quantize(obs.cno, 1.0 / CNO_SCALE, CNO_BITS, false, "cno")?;
    let millis = obs.locktime * 1000.0 + 1e-6;
    let lock_bits = LOCK_TIME_MS.iter().rposition(|&floor| floor <= millis).unwrap_or(0);
    bits.write_flag(obs.tracking_status & TRACKING_PARITY_KNOWN != 0);
    bits.write_flag(obs.tracking_status & TRACKING_HALF_CYCLE != 0);
    bits.write(cno, CNO_BITS);
    bits.write(lock_bits as u64, LOCK_TIME_BITS);
    bits.write(nearest(&SIGNAL_PSR_STD, obs.psr_std), STD_BITS);
    bits.write(nearest(&ADR_STD, obs.adr_std), STD_BITS);
    Ok(())
}

/// Quantizes a measurement, mapping NaN onto the invalid marker.
fn packed(
    value: f64,
    scale: f64,
    bits: u32,
    signed: bool,
    invalid: i64,
    what: &str,
) -> std::result::Result<i64, String> {
    if value.is_nan() {
        return Ok(invalid);
    }
    let pattern = quantize(value, 1.0 / scale, bits, signed, what)?;
    let raw = if signed {
        sign_extend(pattern, bits)
    } else {
        pattern as i64
    };
    if raw == invalid {
        return Err(format!("{what} {value} collides with the invalid marker"));
    }
    Ok(raw)
}

/// Writes the block header and every satellite, systems and satellites in
/// block order.
pub(crate) fn assemble(satellites: &[PackedSatellite]) -> Vec<u8> {
    if satellites.is_empty() {
        return Vec::new();
    }
    let mut out = BitWriter::default();
    let systems = satellites.iter().fold(0u16, |mask, s| mask | 1 << s.system);
    out.write(u64::from(systems), SYSTEM_MASK_BITS);

    for system in SYSTEMS {
        let mut group: Vec<&PackedSatellite> = satellites.iter().filter(|s| s.system == system).collect();
        if group.is_empty() {
            continue;
        }
        group.sort_by_key(|s| s.slot);
        let satellite_mask = group.iter().fold(0u64, |mask, s| mask | 1 << (s.slot - 1));
        let signal_mask = group.iter().fold(0u16, |mask, s| mask | s.signal_mask);
        out.write(satellite_mask, SATELLITE_MASK_BITS);
        out.write(u64::from(signal_mask), SIGNAL_MASK_BITS);

        let signals: Vec<u8> = system_signals(system)
            .iter()
            .copied()
            .filter(|code| signal_mask & (1 << code) != 0)
            .collect();
        for satellite in &group {
            let included = signals
                .iter()
                .enumerate()
                .filter(|(_, code)| satellite.signal_mask & (1 << **code) != 0)
                .fold(0u64, |mask, (bit, _)| mask | 1 << bit);
            out.write(included, signals.len() as u32);
        }
        for satellite in &group {
            out.append(&satellite.bits);
        }
    }
    out.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rangecmp::{RangeCompressor, RangeDecompressor};

    const GPS_L1CA: u8 = 1;
    const GPS_L2CM: u8 = 5;
    const GPS_L5Q: u8 = 7;

    fn close(a: f64, b: f64, tolerance: f64) -> bool {
        (a - b).abs() <= tolerance
    }

    fn measurement(prn: u16, system: u8, signal_type: u8, glonass_frequency: u8, psr: f64) -> RangeObservation {
        let wavelength =
            signal::carrier_wavelength(CompressionScheme::BitPacked, system, signal_type, glonass_frequency).unwrap();
        RangeObservation {
            prn,
            glonass_frequency,
            system,
            signal_type,
            tracking_status: TRACKING_PARITY_KNOWN,
            psr,
            psr_std: 0.066,
            adr: -(psr + 0.25) / wavelength,
            adr_std: 0.009,
            doppler: 1_250.5,
            cno: 44.5,
            locktime: 4.096,
        }
    }

    fn satellites() -> Vec<Vec<RangeObservation>> {
        vec![
            vec![
                measurement(12, system::GPS, GPS_L1CA, 0, 21_000_123.5),
                measurement(12, system::GPS, GPS_L2CM, 0, 21_000_125.0),
            ],
            vec![measurement(3, system::GPS, GPS_L5Q, 0, 22_500_000.25)],
            vec![measurement(40, system::GLONASS, 1, 9, 19_100_000.0)],
            vec![measurement(195, system::QZSS, 10, 0, 38_000_000.0)],
        ]
    }

    fn compress(satellites: &[Vec<RangeObservation>]) -> Vec<u8> {
        let mut compressor = RangeCompressor::new(CompressionScheme::BitPacked, 1.0).with_reference_id(2);
        for signals in satellites {
            compressor.push_satellite(0, signals).unwrap();
        }
        compressor.finish()
    }

    #[test]
    fn test_bit_reader_order() {
        let data = [0b1010_1101, 0xff];
        let mut reader = BitReader::new(&data);
        assert_eq!(reader.read(1, "f").unwrap(), 1);
        assert_eq!(reader.read(3, "f").unwrap(), 0b110);
        assert_eq!(reader.read(6, "f").unwrap(), 0b11_1010);
        assert_eq!(reader.read_signed(6, "f").unwrap(), -1);
        assert!(reader.is_empty());
        assert!(matches!(reader.read(1, "f"), Err(CodecError::FieldConversion { offset: 2, .. })));
    }

    #[test]
    fn test_bit_writer_matches_reader() {
        let mut writer = BitWriter::default();
        writer.write(5, 3);
        writer.write(0x1F_FFFF_FFFF, 37);
        let mut tail = BitWriter::default();
        tail.write((-3i64) as u64, 14);
        writer.append(&tail);
        let data = writer.finish();
        assert_eq!(data.len(), 7);

        let mut reader = BitReader::new(&data);
        assert_eq!(reader.read(3, "f").unwrap(), 5);
        assert_eq!(reader.read(37, "f").unwrap(), 0x1F_FFFF_FFFF);
        assert_eq!(reader.read_signed(14, "f").unwrap(), -3);
    }

    #[test]
    fn test_prn_mapping() {
        assert_eq!(prn(system::GLONASS, 3), Some(40));
        assert_eq!(prn(system::GLONASS, 43), None);
        assert_eq!(prn(system::SBAS, 14), Some(133));
        assert_eq!(prn(system::SBAS, 55), Some(184));
        assert_eq!(prn(system::SBAS, 45), None);
        assert_eq!(prn(system::QZSS, 3), Some(195));
        assert_eq!(prn(system::GALILEO, 30), Some(30));

        for (system, prn) in [(system::GLONASS, 40), (system::SBAS, 133), (system::SBAS, 184), (system::QZSS, 195)] {
            let slot = slot(system, prn).unwrap();
            assert_eq!(self::prn(system, slot), Some(prn));
        }
        assert_eq!(slot(system::GLONASS, 90), None);
        assert_eq!(slot(system::GPS, 0), None);
        assert_eq!(slot(system::SBAS, 170), None);
    }

    #[test]
    fn test_reference_blocks_round_trip() {
        let input = satellites();
        let block = compress(&input);
        let decoded = RangeDecompressor::new(&block, CompressionScheme::BitPacked, 1.0)
            .decompress_all()
            .unwrap();
        assert_eq!(decoded.len(), 5);

        // systems then satellites in block order, signals in mask order
        let order: Vec<(u16, u8)> = decoded.iter().map(|o| (o.prn, o.signal_type)).collect();
        assert_eq!(order, vec![(3, GPS_L5Q), (12, GPS_L1CA), (12, GPS_L2CM), (40, 1), (195, 10)]);

        for obs in &decoded {
            let want = input.iter().flatten().find(|w| w.prn == obs.prn && w.signal_type == obs.signal_type).unwrap();
            assert!(close(obs.psr, want.psr, 0.0005), "{obs:?}");
            assert!(close(obs.adr, want.adr, 0.001), "{obs:?}");
            assert!(close(obs.doppler, want.doppler, 0.001), "{obs:?}");
            assert_eq!(obs.cno, 44.5);
            assert_eq!(obs.locktime, 4.096);
            assert_eq!(obs.psr_std, 0.066);
            assert_eq!(obs.adr_std, 0.009);
            assert_eq!(obs.glonass_frequency, want.glonass_frequency);
            assert_ne!(obs.tracking_status & TRACKING_PARITY_KNOWN, 0);
            assert_ne!(obs.tracking_status & TRACKING_CODE_LOCK, 0);
        }

        let grouped: Vec<bool> = decoded.iter().map(|o| o.tracking_status & TRACKING_GROUPED != 0).collect();
        assert_eq!(grouped, vec![false, true, true, false, false]);
        // GPS L1CA is a primary L1 channel, GPS L2C maps to tracking code 17
        assert_ne!(decoded[1].tracking_status & TRACKING_PRIMARY_L1, 0);
        assert_eq!((decoded[2].tracking_status >> 21) & 0x1f, 17);

        // decoded values re-encode to the same block
        let regrouped = vec![vec![decoded[0]], vec![decoded[1], decoded[2]], vec![decoded[3]], vec![decoded[4]]];
        assert_eq!(compress(&regrouped), block);
    }

    #[test]
    fn test_invalid_measurements_are_nan() {
        let mut obs = measurement(7, system::GPS, GPS_L1CA, 0, 20_000_000.0);
        obs.adr = f64::NAN;
        obs.doppler = f64::NAN;
        let block = compress(&[vec![obs]]);
        let decoded = RangeDecompressor::new(&block, CompressionScheme::BitPacked, 1.0)
            .decompress_all()
            .unwrap();
        assert_eq!(decoded[0].psr, 20_000_000.0);
        assert!(decoded[0].adr.is_nan());
        assert!(decoded[0].doppler.is_nan());
        assert_eq!(decoded[0].tracking_status & TRACKING_PHASE_LOCK, 0);
    }

    /// Builds a block holding one differential GPS L1CA satellite.
    fn differential_block(slot: u8, id: u8, psr: i64, phase: i64, doppler: i64) -> Vec<u8> {
        let mut bits = BitWriter::default();
        bits.write(1 << system::GPS, SYSTEM_MASK_BITS);
        bits.write(1 << (slot - 1), SATELLITE_MASK_BITS);
        bits.write(1 << GPS_L1CA, SIGNAL_MASK_BITS);
        bits.write(1, 1);
        bits.write(1, DIFFERENTIAL_FLAG_BITS);
        bits.write(u64::from(id), REFERENCE_ID_BITS);
        bits.write_flag(true);
        bits.write_flag(false);
        bits.write(900, CNO_BITS);
        bits.write(9, LOCK_TIME_BITS);
        bits.write(3, STD_BITS);
        bits.write(3, STD_BITS);
        bits.write(psr as u64, DIFFERENTIAL_PSR_BITS);
        bits.write(phase as u64, DIFFERENTIAL_PHASE_BITS);
        bits.write(doppler as u64, DIFFERENTIAL_DOPPLER_BITS[0]);
        bits.finish()
    }

    #[test]
    fn test_differential_block_uses_stored_reference() {
        let reference = measurement(7, system::GPS, GPS_L1CA, 0, 20_000_000.0);
        let reference_block = compress(&[vec![reference]]);
        let mut store = ReferenceStore::new();
        let base = RangeDecompressor::new(&reference_block, CompressionScheme::BitPacked, 1.0)
            .with_references(&mut store, 345_000)
            .decompress_all()
            .unwrap();
        assert_eq!(store.len(), 1);

        // half a second later: psr +1 m, phase -2 m, doppler +0.5 m/s
        let block = differential_block(7, 2, 2000, -20_000, 5000);
        let decoded = RangeDecompressor::new(&block, CompressionScheme::BitPacked, 1.0)
            .with_references(&mut store, 345_500)
            .decompress_all()
            .unwrap();
        assert_eq!(decoded.len(), 1);
        let obs = decoded[0];
        let wavelength = signal::carrier_wavelength(CompressionScheme::BitPacked, system::GPS, GPS_L1CA, 0).unwrap();
        let reference_doppler = -base[0].doppler * wavelength;
        let drift = reference_doppler * 0.5;
        assert!(close(obs.psr, base[0].psr + 1.0 + drift, 1e-6));
        let reference_phase = -base[0].adr * wavelength;
        assert!(close(obs.adr, -(reference_phase - 2.0 + drift) / wavelength, 1e-6));
        assert!(close(obs.doppler, -(reference_doppler + 0.5) / wavelength, 1e-6));
        assert_eq!(obs.cno, 45.0);
        assert_eq!(obs.psr_std, 0.066);
        assert_eq!(obs.adr_std, 0.009);
    }

    #[test]
    fn test_differential_without_matching_reference_is_skipped() {
        let block = differential_block(7, 2, 0, 0, 0);
        // no store at all
        let decoded = RangeDecompressor::new(&block, CompressionScheme::BitPacked, 1.0)
            .decompress_all()
            .unwrap();
        assert!(decoded.is_empty());

        let reference_block = compress(&[vec![measurement(7, system::GPS, GPS_L1CA, 0, 2.0e7)]]);
        let mut store = ReferenceStore::new();
        RangeDecompressor::new(&reference_block, CompressionScheme::BitPacked, 1.0)
            .with_references(&mut store, 1_000)
            .decompress_all()
            .unwrap();

        // reference ID 2 stored, block names 3
        let stale = differential_block(7, 3, 0, 0, 0);
        let decoded = RangeDecompressor::new(&stale, CompressionScheme::BitPacked, 1.0)
            .with_references(&mut store, 1_200)
            .decompress_all()
            .unwrap();
        assert!(decoded.is_empty());

        // a whole second drops the references
        let decoded = RangeDecompressor::new(&block, CompressionScheme::BitPacked, 1.0)
            .with_references(&mut store, 2_000)
            .decompress_all()
            .unwrap();
        assert!(decoded.is_empty());
        assert!(store.is_empty());
    }

    #[test]
    fn test_lock_time_extrapolation() {
        let key = (system::GPS, GPS_L1CA, 7);
        let mut lock = LockTime::default();
        // first sighting is relative to the index floor
        assert_eq!(lock.update(7, 10_000.0, key), 1.024);
        assert_eq!(lock.update(7, 10_500.0, key), 1.524);
        // index change makes the lock time absolute
        assert_eq!(lock.update(8, 11_000.0, key), 2.048);
        assert_eq!(lock.update(8, 12_000.0, key), 3.048);
        // a drop resets to the new floor
        assert_eq!(lock.update(0, 12_500.0, key), 0.0);
        assert_eq!(lock.update(0, 12_600.0, key), 0.1);
    }

    #[test]
    fn test_store_tracks_lock_time() {
        let mut store = ReferenceStore::new();
        let obs = measurement(7, system::GPS, GPS_L1CA, 0, 2.0e7);
        let block = compress(&[vec![obs]]);
        let mut seen = Vec::new();
        for millis in [3_000, 3_250, 3_500] {
            let decoded = RangeDecompressor::new(&block, CompressionScheme::BitPacked, 1.0)
                .with_references(&mut store, millis)
                .decompress_all()
                .unwrap();
            seen.push(decoded[0].locktime);
        }
        assert_eq!(seen, vec![4.096, 4.346, 4.596]);
    }

    #[test]
    fn test_truncated_block() {
        let block = compress(&satellites());
        let cut = &block[..block.len() - 4];
        let results: Vec<_> = RangeDecompressor::new(cut, CompressionScheme::BitPacked, 1.0).collect();
        assert!(results.len() >= 2);
        assert!(results[..results.len() - 1].iter().all(Result::is_ok));
        assert!(matches!(results.last(), Some(Err(CodecError::FieldConversion { .. }))));
    }

    #[test]
    fn test_empty_block_and_finish_state() {
        let mut empty = RangeDecompressor::new(&[], CompressionScheme::BitPacked, 1.0);
        assert!(empty.is_finished());
        assert!(empty.decompress_one().unwrap().is_none());

        let block = compress(&satellites());
        let mut decompressor = RangeDecompressor::new(&block, CompressionScheme::BitPacked, 1.0);
        assert!(!decompressor.is_finished());
        let mut out = Vec::new();
        assert_eq!(decompressor.decompress_batch(crate::rangecmp::BatchSize::Four, &mut out).unwrap(), 4);
        assert!(!decompressor.is_finished());
        assert_eq!(decompressor.decompress_batch(crate::rangecmp::BatchSize::Four, &mut out).unwrap(), 1);
        assert!(decompressor.is_finished());
    }

    #[test]
    fn test_compressor_rejects_bad_satellites() {
        let mut compressor = RangeCompressor::new(CompressionScheme::BitPacked, 1.0);
        let gps = measurement(7, system::GPS, GPS_L1CA, 0, 2.0e7);
        compressor.push_satellite(0, &[gps]).unwrap();
        assert!(compressor.push_satellite(0, &[gps]).is_err());
        assert!(compressor.push_satellite(0, &[]).is_err());
        assert!(compressor.push_satellite(0, &[RangeObservation { signal_type: 2, ..gps }]).is_err());
        assert!(compressor.push_satellite(0, &[RangeObservation { prn: 0, ..gps }]).is_err());
        assert!(compressor.push_satellite(0, &[RangeObservation { system: system::LBAND, ..gps }]).is_err());
        let far = RangeObservation { prn: 8, adr: gps.adr + 1.0e6, ..gps };
        assert!(compressor.push_satellite(0, &[far]).is_err());
        assert!(compressor.push_record(&gps).is_err());
    }
}
