use crate::error::ConfigError;

/// Shortest spacing between reads the driver accepts, in microseconds.
pub const MIN_SAFE_INTERVAL_US: u64 = 1_000_000;

/// Shortest start pulse that reliably wakes the sensor, in microseconds.
pub const MIN_START_LOW_US: u32 = 18_000;

/// Shortest edge wait that still covers one 80us preamble half.
pub const MIN_EDGE_TIMEOUT_US: u32 = 85;

/// How the capture backend manages the peripheral between reads.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum CaptureMode {
    /// Initialised once. Drained before and stopped after every read.
    #[default]
    Persistent,
    /// Initialised before and torn down after every read.
    ReconfigureEachRead,
}

/// Driver configuration.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Config {
    /// Minimum time between the starts of two physical reads.
    pub min_interval_us: u64,
    /// How long the host holds the line low to request a reading.
    pub start_low_us: u32,
    /// Upper bound on any single edge wait of the direct backend.
    pub edge_timeout_us: u32,
    /// Wait after power-up before the sensor is usable.
    pub settle_ms: u32,
    /// Bounded wait for the capture peripheral to deliver its pulses.
    pub capture_timeout_ms: u32,
    /// Scheduler tick rate the capture peripheral counts its timeout in.
    pub tick_rate_hz: u32,
    pub capture_mode: CaptureMode,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            min_interval_us: 2_000_000,
            start_low_us: 20_000,
            edge_timeout_us: 100,
            settle_ms: 1_000,
            capture_timeout_ms: 80,
            tick_rate_hz: 100,
            capture_mode: CaptureMode::Persistent,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_interval_us < MIN_SAFE_INTERVAL_US {
            return Err(ConfigError::IntervalTooShort);
        }
        if self.start_low_us < MIN_START_LOW_US {
            return Err(ConfigError::StartPulseTooShort);
        }
        if self.edge_timeout_us < MIN_EDGE_TIMEOUT_US {
            return Err(ConfigError::EdgeTimeoutTooShort);
        }
        if self.tick_rate_hz == 0 {
            return Err(ConfigError::ZeroTickRate);
        }
        Ok(())
    }

    /// Capture timeout in scheduler ticks, never less than one tick.
    pub fn capture_timeout_ticks(&self) -> u32 {
        let ticks = u64::from(self.capture_timeout_ms) * u64::from(self.tick_rate_hz) / 1_000;
        u32::try_from(ticks).unwrap_or(u32::MAX).max(1)
    }
}
