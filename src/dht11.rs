use embedded_hal::{
    delay::DelayNs,
    digital::{InputPin, OutputPin},
};

use crate::{
    backend::Acquire,
    capture::{CaptureBackend, EdgeCapture},
    clock::Monotonic,
    config::Config,
    direct::DirectBackend,
    error::InitError,
    frame::{Reading, Status, decode},
};

/// Driver for the DHT11 temperature and humidity sensor.
///
/// Wraps an acquisition backend with the sensor's minimum read spacing and
/// a cache of the last reading. Calls to [`read`](Self::read) that come too
/// soon after the previous physical read return the cached value without
/// touching the line.
pub struct Dht11<B, C> {
    backend: B,
    clock: C,
    min_interval_us: u64,
    last: Reading,
    last_attempt_us: Option<u64>,
}

impl<PIN, DELAY, C, E> Dht11<DirectBackend<PIN, DELAY, C>, C>
where
    PIN: InputPin<Error = E> + OutputPin<Error = E>,
    DELAY: DelayNs,
    C: Monotonic + Clone,
{
    /// Creates a driver that times the sensor's pulses in software.
    ///
    /// # Arguments
    ///
    /// * `pin` - Open-drain GPIO pin connected to the DHT11 data line.
    /// * `delay` - A delay provider implementing the `DelayNs` trait.
    /// * `clock` - Monotonic microsecond time source. The backend times the
    ///   pulses on a clone of it, the driver spaces the reads with the original.
    /// * `config` - Driver configuration, validated before any hardware access.
    pub fn direct(pin: PIN, delay: DELAY, clock: C, config: Config) -> Result<Self, InitError<E>> {
        let backend = DirectBackend::new(pin, delay, clock.clone(), &config);
        Self::new(backend, clock, config)
    }
}

impl<PIN, DELAY, CAP, C> Dht11<CaptureBackend<PIN, DELAY, CAP>, C>
where
    PIN: OutputPin,
    DELAY: DelayNs,
    CAP: EdgeCapture,
    C: Monotonic,
{
    /// Creates a driver that lets an edge-capture peripheral time the
    /// sensor's pulses.
    ///
    /// # Arguments
    ///
    /// * `pin` - Open-drain GPIO pin connected to the DHT11 data line.
    /// * `delay` - A delay provider implementing the `DelayNs` trait.
    /// * `capture` - Edge-capture channel watching the same line.
    /// * `clock` - Monotonic microsecond time source.
    /// * `config` - Driver configuration, validated before any hardware access.
    pub fn capture(
        pin: PIN,
        delay: DELAY,
        capture: CAP,
        clock: C,
        config: Config,
    ) -> Result<Self, InitError<<CaptureBackend<PIN, DELAY, CAP> as Acquire>::Error>> {
        Self::new(CaptureBackend::new(pin, delay, capture, &config), clock, config)
    }
}

impl<B, C> Dht11<B, C>
where
    B: Acquire,
    C: Monotonic,
{
    /// Creates a driver around any backend.
    ///
    /// Validates `config` and runs the backend's bring-up, which includes
    /// the sensor's power-on settle time.
    pub fn new(mut backend: B, clock: C, config: Config) -> Result<Self, InitError<B::Error>> {
        config.validate()?;
        backend.init().map_err(InitError::Backend)?;
        info!("DHT11 ready, min read interval {} us", config.min_interval_us);

        Ok(Dht11 {
            backend,
            clock,
            min_interval_us: config.min_interval_us,
            last: Reading::default(),
            last_attempt_us: None,
        })
    }

    /// Reads temperature and humidity.
    ///
    /// Starts a physical read only if the minimum interval has passed since
    /// the previous attempt, otherwise returns the cached reading unchanged.
    /// Every outcome, failures included, becomes the new cached reading.
    /// Nothing is retried.
    ///
    /// # Returns
    ///
    /// * `Status::Ok` with fresh values if a full frame passed the checksum.
    /// * `Status::Timeout` if the sensor did not deliver a full frame.
    /// * `Status::ChecksumError` if it did but the checksum failed.
    ///
    /// On errors the numeric fields keep the last good values.
    pub fn read(&mut self) -> Reading {
        let now = self.clock.now_us();
        if let Some(last) = self.last_attempt_us {
            if now.saturating_sub(last) < self.min_interval_us {
                trace!("read too soon after the last one, returning cached reading");
                return self.last;
            }
        }
        self.last_attempt_us = Some(now);

        self.last = match self.backend.acquire() {
            Ok(frame) => {
                debug!("raw frame {:?}", frame.bytes());
                decode(&frame, self.last)
            }
            Err(_) => {
                warn!("DHT11 read timed out");
                Reading {
                    status: Status::Timeout,
                    ..self.last
                }
            }
        };
        self.last
    }

    /// The cached reading, without touching the hardware.
    pub fn last_reading(&self) -> Reading {
        self.last
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Gives back the backend and clock.
    pub fn release(self) -> (B, C) {
        (self.backend, self.clock)
    }
}
