//! Signalling shared by both acquisition backends.
//!
//! After the host releases the line the sensor answers with an 80us low and
//! an 80us high preamble, then sends 40 bits. Every bit is a ~50us low
//! followed by a high whose length carries the value: ~26-28us for `0`,
//! ~70us for `1`. Bits arrive most significant first.

use crate::frame::{FRAME_LEN, Frame};

/// Number of data bits in one exchange.
pub const FRAME_BITS: u8 = (FRAME_LEN * 8) as u8;

/// High pulses longer than this (in microseconds) are read as a `1` bit.
pub const BIT_ONE_THRESHOLD_US: u32 = 48;

/// Shortest low and high halves (in microseconds) accepted as the preamble
/// in a captured pulse list.
pub const PREAMBLE_MIN_US: u32 = 60;

/// Capacity of a captured pulse list: host release and its trailing edge,
/// the two preamble halves, a low/high pair per bit and the closing low.
pub const PULSE_CAPACITY: usize = 2 + 2 + 2 * FRAME_BITS as usize + 1;

/// Where an acquisition is in the exchange.
///
/// `Idle -> StartPulse -> WaitingPreamble -> ReadingBits(n) -> Complete`, or
/// `TimedOut` from any waiting phase. Transitions are driven only by measured
/// durations against fixed thresholds.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    /// Host is holding the line low.
    StartPulse,
    /// Line released, waiting for the sensor's 80us low + 80us high.
    WaitingPreamble,
    /// Number of bits received so far (below 40).
    ReadingBits(u8),
    Complete,
    TimedOut,
}

/// Electrical level of a captured pulse.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

/// One captured pulse: the line stayed at `level` for `duration_us`.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pulse {
    pub level: Level,
    pub duration_us: u16,
}

impl Pulse {
    pub const fn low(duration_us: u16) -> Self {
        Self {
            level: Level::Low,
            duration_us,
        }
    }

    pub const fn high(duration_us: u16) -> Self {
        Self {
            level: Level::High,
            duration_us,
        }
    }

    /// Placeholder used to fill capture buffers.
    pub const fn empty() -> Self {
        Self::low(0)
    }
}

/// Maps the duration of a bit's high pulse to the bit value.
pub fn bit_from_high_us(high_us: u32) -> bool {
    high_us > BIT_ONE_THRESHOLD_US
}

/// Packs bits MSB first into a frame.
#[derive(Debug, Default)]
pub(crate) struct FrameAssembler {
    bytes: [u8; FRAME_LEN],
    bits: u8,
}

impl FrameAssembler {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Appends one bit. Bits past the 40th are ignored.
    pub(crate) fn push(&mut self, one: bool) {
        if self.is_complete() {
            return;
        }
        if one {
            let byte = usize::from(self.bits / 8);
            self.bytes[byte] |= 1 << (7 - self.bits % 8);
        }
        self.bits += 1;
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.bits == FRAME_BITS
    }

    /// Current phase implied by the number of bits received.
    pub(crate) fn phase(&self) -> Phase {
        if self.is_complete() {
            Phase::Complete
        } else {
            Phase::ReadingBits(self.bits)
        }
    }

    /// The finished frame, or `None` while bits are missing.
    pub(crate) fn finish(self) -> Option<Frame> {
        self.is_complete().then(|| Frame::from_bytes(self.bytes))
    }
}

/// Decodes a captured pulse list into a frame.
///
/// Leading pulses before the preamble (the host's release of the line) are
/// skipped. On failure the phase reached is returned: `WaitingPreamble` if no
/// preamble was found, `ReadingBits(n)` if the list ran out or broke pattern
/// after `n` bits.
pub fn decode_pulses(pulses: &[Pulse]) -> Result<Frame, Phase> {
    let start = pulses
        .windows(2)
        .position(|pair| {
            pair[0].level == Level::Low
                && pair[1].level == Level::High
                && u32::from(pair[0].duration_us) >= PREAMBLE_MIN_US
                && u32::from(pair[1].duration_us) >= PREAMBLE_MIN_US
        })
        .ok_or(Phase::WaitingPreamble)?;

    let mut frame = FrameAssembler::new();
    for pair in pulses[start + 2..].chunks_exact(2) {
        if frame.is_complete() {
            break;
        }
        let (low, high) = (pair[0], pair[1]);
        if low.level != Level::Low || high.level != Level::High {
            break;
        }
        frame.push(bit_from_high_us(u32::from(high.duration_us)));
    }

    let phase = frame.phase();
    frame.finish().ok_or(phase)
}
