use embedded_hal::{delay::DelayNs, digital::OutputPin};

use crate::{
    backend::Acquire,
    config::{CaptureMode, Config},
    error::{AcquireError, CaptureFault},
    frame::Frame,
    protocol::{PULSE_CAPACITY, Phase, Pulse, decode_pulses},
};

/// A hardware unit that records line transitions as `(level, duration)`
/// pulses, such as the ESP32 RMT receiver or an RP2040 PIO program.
///
/// The capture channel must watch the same pin the backend drives.
pub trait EdgeCapture {
    type Error;

    fn init(&mut self) -> Result<(), Self::Error>;

    /// Arms the channel. Transitions from here on are recorded.
    fn start(&mut self) -> Result<(), Self::Error>;

    fn stop(&mut self) -> Result<(), Self::Error>;

    fn deinit(&mut self) -> Result<(), Self::Error>;

    /// Copies recorded pulses into `buf` and returns how many were written.
    ///
    /// Waits up to `timeout_ticks` scheduler ticks for a finished capture and
    /// returns 0 if none arrived. A timeout of 0 only collects what is
    /// already buffered.
    fn read(&mut self, buf: &mut [Pulse], timeout_ticks: u32) -> Result<usize, Self::Error>;
}

impl<T: EdgeCapture + ?Sized> EdgeCapture for &mut T {
    type Error = T::Error;

    fn init(&mut self) -> Result<(), Self::Error> {
        T::init(self)
    }

    fn start(&mut self) -> Result<(), Self::Error> {
        T::start(self)
    }

    fn stop(&mut self) -> Result<(), Self::Error> {
        T::stop(self)
    }

    fn deinit(&mut self) -> Result<(), Self::Error> {
        T::deinit(self)
    }

    fn read(&mut self, buf: &mut [Pulse], timeout_ticks: u32) -> Result<usize, Self::Error> {
        T::read(self, buf, timeout_ticks)
    }
}

type Fault<PIN, CAP> =
    CaptureFault<<PIN as embedded_hal::digital::ErrorType>::Error, <CAP as EdgeCapture>::Error>;

/// Backend that lets an edge-capture peripheral time the sensor's pulses.
///
/// The CPU only sends the start pulse and then sleeps in one bounded wait
/// while the peripheral records the answer, so interrupt jitter does not
/// disturb the measurement.
pub struct CaptureBackend<PIN, D, CAP> {
    pin: PIN,
    delay: D,
    capture: CAP,
    mode: CaptureMode,
    start_low_us: u32,
    settle_ms: u32,
    timeout_ticks: u32,
    phase: Phase,
    pulses: [Pulse; PULSE_CAPACITY],
}

impl<PIN, DELAY, CAP> CaptureBackend<PIN, DELAY, CAP>
where
    PIN: OutputPin,
    DELAY: DelayNs,
    CAP: EdgeCapture,
{
    /// Creates a new capture backend.
    ///
    /// # Arguments
    ///
    /// * `pin` - Open-drain GPIO pin connected to the sensor's data line.
    /// * `delay` - A delay provider implementing the `DelayNs` trait.
    /// * `capture` - Edge-capture channel watching the same line.
    /// * `config` - Supplies the start pulse length, capture timeout and [`CaptureMode`].
    pub fn new(pin: PIN, delay: DELAY, capture: CAP, config: &Config) -> Self {
        CaptureBackend {
            pin,
            delay,
            capture,
            mode: config.capture_mode,
            start_low_us: config.start_low_us,
            settle_ms: config.settle_ms,
            timeout_ticks: config.capture_timeout_ticks(),
            phase: Phase::Idle,
            pulses: [Pulse::empty(); PULSE_CAPACITY],
        }
    }

    /// Phase the last exchange ended in.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Gives back the pin, delay and capture channel.
    pub fn release(self) -> (PIN, DELAY, CAP) {
        (self.pin, self.delay, self.capture)
    }

    /// Makes sure no samples from an earlier capture reach this one.
    fn arm(&mut self) -> Result<(), Fault<PIN, CAP>> {
        match self.mode {
            CaptureMode::Persistent => {
                let stale = self
                    .capture
                    .read(&mut self.pulses, 0)
                    .map_err(CaptureFault::Capture)?;
                debug!("drained {} stale pulses before transmission", stale);
            }
            CaptureMode::ReconfigureEachRead => {
                self.capture.init().map_err(CaptureFault::Capture)?;
            }
        }
        Ok(())
    }

    /// Stops the channel after an armed exchange, and tears it down in
    /// [`CaptureMode::ReconfigureEachRead`].
    fn shutdown(&mut self) -> Result<(), Fault<PIN, CAP>> {
        self.capture.stop().map_err(CaptureFault::Capture)?;
        if self.mode == CaptureMode::ReconfigureEachRead {
            self.capture.deinit().map_err(CaptureFault::Capture)?;
        }
        Ok(())
    }

    /// Sends the start pulse and collects the answer. Returns the number of
    /// pulses captured.
    fn transmit(&mut self) -> Result<usize, Fault<PIN, CAP>> {
        self.pin.set_low().map_err(CaptureFault::Pin)?;
        self.delay.delay_us(self.start_low_us);
        self.capture.start().map_err(CaptureFault::Capture)?;
        self.pin.set_high().map_err(CaptureFault::Pin)?;

        self.phase = Phase::WaitingPreamble;
        self.capture
            .read(&mut self.pulses, self.timeout_ticks)
            .map_err(CaptureFault::Capture)
    }

    fn exchange(&mut self) -> Result<Frame, AcquireError<Fault<PIN, CAP>>> {
        let len = self.transmit()?;
        if len == 0 {
            error!("capture timed out");
            return Err(AcquireError::InsufficientData {
                phase: Phase::WaitingPreamble,
            });
        }

        let pulses = &self.pulses[..len.min(PULSE_CAPACITY)];
        decode_pulses(pulses).map_err(|phase| {
            warn!("captured {} pulses, frame incomplete at {:?}", len, phase);
            AcquireError::InsufficientData { phase }
        })
    }
}

impl<PIN, DELAY, CAP> Acquire for CaptureBackend<PIN, DELAY, CAP>
where
    PIN: OutputPin,
    DELAY: DelayNs,
    CAP: EdgeCapture,
{
    type Error = Fault<PIN, CAP>;

    /// Releases the line, waits for the sensor to settle and, in
    /// [`CaptureMode::Persistent`], brings the capture channel up once.
    fn init(&mut self) -> Result<(), Self::Error> {
        self.pin.set_high().map_err(CaptureFault::Pin)?;
        self.delay.delay_ms(self.settle_ms);
        if self.mode == CaptureMode::Persistent {
            self.capture.init().map_err(CaptureFault::Capture)?;
            self.capture.start().map_err(CaptureFault::Capture)?;
        }
        Ok(())
    }

    fn acquire(&mut self) -> Result<Frame, AcquireError<Self::Error>> {
        self.phase = Phase::StartPulse;
        let result = match self.arm() {
            Ok(()) => {
                let result = self.exchange();
                // A stop fault does not make the captured frame stale
                if self.shutdown().is_err() {
                    warn!("failed to stop the capture channel");
                }
                result
            }
            // Never armed, nothing to stop
            Err(fault) => Err(AcquireError::PinError(fault)),
        };
        self.phase = if result.is_ok() {
            Phase::Complete
        } else {
            Phase::TimedOut
        };
        result
    }
}
