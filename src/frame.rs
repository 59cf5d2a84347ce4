/// Number of bytes in one sensor frame.
pub const FRAME_LEN: usize = 5;

/// The 5-byte payload of one exchange: humidity integer and fractional
/// parts, temperature integer and fractional parts, checksum.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Frame([u8; FRAME_LEN]);

impl Frame {
    pub const fn from_bytes(bytes: [u8; FRAME_LEN]) -> Self {
        Self(bytes)
    }

    pub const fn bytes(&self) -> [u8; FRAME_LEN] {
        self.0
    }

    pub const fn humidity(&self) -> u8 {
        self.0[0]
    }

    /// Always zero on DHT11-class sensors.
    pub const fn humidity_frac(&self) -> u8 {
        self.0[1]
    }

    pub const fn temperature(&self) -> u8 {
        self.0[2]
    }

    /// Always zero on DHT11-class sensors.
    pub const fn temperature_frac(&self) -> u8 {
        self.0[3]
    }

    pub const fn checksum(&self) -> u8 {
        self.0[4]
    }

    /// Sum of the four data bytes, modulo 256.
    pub fn expected_checksum(&self) -> u8 {
        self.0[..4].iter().fold(0u8, |sum, v| sum.wrapping_add(*v))
    }

    pub fn checksum_ok(&self) -> bool {
        self.expected_checksum() == self.checksum()
    }
}

/// Outcome of a read attempt.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    /// A full frame arrived and its checksum matched.
    Ok,
    /// The sensor did not answer with a full frame in time.
    Timeout,
    /// A full frame arrived but the checksum did not match.
    ChecksumError,
}

/// Reading returned by the driver.
///
/// `temperature` and `humidity` hold the last values that passed the
/// checksum. They are only fresh when `status` is [`Status::Ok`].
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Reading {
    /// Temperature in whole degrees Celsius.
    pub temperature: u8,
    /// Relative humidity in whole percent.
    pub humidity: u8,
    pub status: Status,
}

impl Reading {
    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }
}

impl Default for Reading {
    /// No data yet: zeroed values flagged as a timeout.
    fn default() -> Self {
        Reading {
            temperature: 0,
            humidity: 0,
            status: Status::Timeout,
        }
    }
}

/// Turns a frame into a reading.
///
/// A frame with a bad checksum only changes the status; the numeric fields
/// are carried over from `previous`.
pub fn decode(frame: &Frame, previous: Reading) -> Reading {
    if frame.checksum_ok() {
        Reading {
            temperature: frame.temperature(),
            humidity: frame.humidity(),
            status: Status::Ok,
        }
    } else {
        warn!(
            "checksum mismatch: received {}, calculated {}",
            frame.checksum(),
            frame.expected_checksum()
        );
        Reading {
            status: Status::ChecksumError,
            ..previous
        }
    }
}
