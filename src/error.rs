use crate::protocol::Phase;

/// Possible errors from one acquisition.
///
/// The driver never hands these to callers; it collapses them into
/// [`Status::Timeout`](crate::Status::Timeout).
#[derive(Debug, PartialEq, Eq)]
pub enum AcquireError<E> {
    /// Fewer than 40 bits arrived. `phase` is where the exchange stalled.
    InsufficientData { phase: Phase },
    /// Error from the GPIO pin or the capture peripheral.
    PinError(E),
}

impl<E> From<E> for AcquireError<E> {
    fn from(value: E) -> Self {
        Self::PinError(value)
    }
}

/// Error type of the capture backend, which talks to two peripherals.
#[derive(Debug, PartialEq, Eq)]
pub enum CaptureFault<PE, CE> {
    /// Error from the GPIO pin.
    Pin(PE),
    /// Error from the edge-capture peripheral.
    Capture(CE),
}

/// Invalid driver configuration.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// Reads would be spaced closer than the sensor can recover from.
    IntervalTooShort,
    /// The start pulse is too short to wake the sensor.
    StartPulseTooShort,
    /// Edge waits cannot cover the 80us preamble halves.
    EdgeTimeoutTooShort,
    /// The scheduler tick rate is zero.
    ZeroTickRate,
}

/// Errors from bringing up the driver. These are fatal.
#[derive(Debug, PartialEq, Eq)]
pub enum InitError<E> {
    InvalidConfig(ConfigError),
    /// The backend failed to initialise its peripherals.
    Backend(E),
}

impl<E> From<ConfigError> for InitError<E> {
    fn from(value: ConfigError) -> Self {
        Self::InvalidConfig(value)
    }
}
