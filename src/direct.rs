use embedded_hal::{
    delay::DelayNs,
    digital::{InputPin, OutputPin},
};

use crate::{
    backend::Acquire,
    clock::Monotonic,
    config::Config,
    error::AcquireError,
    frame::Frame,
    protocol::{FrameAssembler, Phase, bit_from_high_us},
};

/// Backend that times the sensor's pulses by busy-polling the pin.
///
/// The pin must be an open-drain input/output with a pull-up on the line:
/// `set_low` drives it, `set_high` releases it. Pulse widths are read from
/// the clock, so the cost of each pin read does not skew them. The calling
/// thread is occupied for the whole ~25ms exchange and interrupts landing in
/// the middle of it can still corrupt the measured pulse widths.
pub struct DirectBackend<PIN, D, CLK> {
    pin: PIN,
    delay: D,
    clock: CLK,
    start_low_us: u32,
    edge_timeout_us: u32,
    settle_ms: u32,
    phase: Phase,
}

impl<PIN, DELAY, CLK, E> DirectBackend<PIN, DELAY, CLK>
where
    PIN: InputPin<Error = E> + OutputPin<Error = E>,
    DELAY: DelayNs,
    CLK: Monotonic,
{
    /// Creates a new direct-timing backend.
    ///
    /// # Arguments
    ///
    /// * `pin` - Open-drain GPIO pin connected to the sensor's data line.
    /// * `delay` - A delay provider implementing the `DelayNs` trait.
    /// * `clock` - Monotonic microsecond time source used to time the pulses.
    /// * `config` - Supplies the start pulse length, the edge timeout and the settle time.
    pub fn new(pin: PIN, delay: DELAY, clock: CLK, config: &Config) -> Self {
        DirectBackend {
            pin,
            delay,
            clock,
            start_low_us: config.start_low_us,
            edge_timeout_us: config.edge_timeout_us,
            settle_ms: config.settle_ms,
            phase: Phase::Idle,
        }
    }

    /// Phase the last exchange ended in.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Gives back the pin, delay and clock.
    pub fn release(self) -> (PIN, DELAY, CLK) {
        (self.pin, self.delay, self.clock)
    }

    fn exchange(&mut self) -> Result<Frame, AcquireError<E>> {
        self.phase = Phase::StartPulse;
        self.start()?;

        self.phase = Phase::WaitingPreamble;
        self.wait_for_low()?; // sensor answers 20-40us after release
        self.wait_for_high()?; // 80us
        self.wait_for_low()?; // 80us

        let mut frame = FrameAssembler::new();
        while !frame.is_complete() {
            self.phase = frame.phase();
            let bit = self.read_bit()?;
            frame.push(bit);
        }

        let phase = frame.phase();
        frame
            .finish()
            .ok_or(AcquireError::InsufficientData { phase })
    }

    /// Sends the start signal: holds the line low long enough to wake the
    /// sensor, then releases it to the pull-up.
    fn start(&mut self) -> Result<(), AcquireError<E>> {
        self.pin.set_low()?;
        self.delay.delay_us(self.start_low_us);
        self.pin.set_high()?;
        Ok(())
    }

    /// Reads a single bit from the sensor.
    ///
    /// Waits out the ~50us low that opens every bit, then measures how long
    /// the line stays high.
    fn read_bit(&mut self) -> Result<bool, AcquireError<E>> {
        self.wait_for_high()?;
        let high_us = self.measure_high()?;
        Ok(bit_from_high_us(high_us))
    }

    /// Waits until the data line goes high or times out.
    fn wait_for_high(&mut self) -> Result<u32, AcquireError<E>> {
        Self::wait_for_state(
            &mut self.delay,
            &mut self.clock,
            self.edge_timeout_us,
            self.phase,
            || self.pin.is_high(),
        )
    }

    /// Waits until the data line goes low or times out.
    fn wait_for_low(&mut self) -> Result<u32, AcquireError<E>> {
        Self::wait_for_state(
            &mut self.delay,
            &mut self.clock,
            self.edge_timeout_us,
            self.phase,
            || self.pin.is_low(),
        )
    }

    /// How long, in microseconds, the line stays high from now on.
    fn measure_high(&mut self) -> Result<u32, AcquireError<E>> {
        self.wait_for_low()
    }

    /// Generic wait loop that checks a pin condition until true or timeout.
    ///
    /// Returns the microseconds elapsed on `clock` between entering the loop
    /// and seeing the condition hold. Polls at most once per microsecond, so
    /// a clock that stops still ends the wait after `timeout_us` polls.
    ///
    /// # Errors
    ///
    /// Returns `AcquireError::InsufficientData` tagged with `phase` if
    /// `timeout_us` is exceeded.
    fn wait_for_state<F>(
        delay: &mut DELAY,
        clock: &mut CLK,
        timeout_us: u32,
        phase: Phase,
        mut condition: F,
    ) -> Result<u32, AcquireError<E>>
    where
        F: FnMut() -> Result<bool, E>,
    {
        let started = clock.now_us();
        for _ in 0..timeout_us {
            let met = condition()?;
            let elapsed = clock.now_us().saturating_sub(started);
            if met {
                return Ok(u32::try_from(elapsed).unwrap_or(u32::MAX));
            }
            if elapsed >= u64::from(timeout_us) {
                break;
            }
            delay.delay_us(1);
        }
        Err(AcquireError::InsufficientData { phase })
    }
}

impl<PIN, DELAY, CLK, E> Acquire for DirectBackend<PIN, DELAY, CLK>
where
    PIN: InputPin<Error = E> + OutputPin<Error = E>,
    DELAY: DelayNs,
    CLK: Monotonic,
{
    type Error = E;

    /// Releases the line and waits for the sensor to leave its unstable
    /// power-up state.
    fn init(&mut self) -> Result<(), E> {
        self.pin.set_high()?;
        self.delay.delay_ms(self.settle_ms);
        Ok(())
    }

    fn acquire(&mut self) -> Result<Frame, AcquireError<E>> {
        let result = self.exchange();
        if let Err(AcquireError::InsufficientData { phase }) = &result {
            warn!("sensor stopped answering in {:?}", phase);
        }
        self.phase = if result.is_ok() {
            Phase::Complete
        } else {
            Phase::TimedOut
        };
        result
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::dht11::tests::{FakeClock, TickingDelay};
    use core::convert::Infallible;
    use embedded_hal::digital::ErrorType;
    use embedded_hal_mock::eh1::delay::CheckedDelay;
    use embedded_hal_mock::eh1::delay::NoopDelay;
    use embedded_hal_mock::eh1::delay::Transaction as DelayTx;
    use embedded_hal_mock::eh1::digital::{
        Mock as PinMock, State as PinState, Transaction as PinTx,
    };

    const ZERO_HIGH_POLLS: usize = 27;
    const ONE_HIGH_POLLS: usize = 70;

    fn backend<D: DelayNs>(
        pin: &PinMock,
        delay: D,
        config: &Config,
    ) -> DirectBackend<PinMock, TickingDelay<D>, FakeClock> {
        let clock = FakeClock::default();
        DirectBackend::new(
            pin.clone(),
            TickingDelay::new(delay, clock.clone()),
            clock,
            config,
        )
    }

    fn level(state: PinState, polls: usize) -> Vec<PinTx> {
        vec![PinTx::get(state); polls]
    }

    fn start_sequence() -> Vec<PinTx> {
        // MCU pulls the line low, then releases it
        vec![PinTx::set(PinState::Low), PinTx::set(PinState::High)]
    }

    fn preamble() -> Vec<PinTx> {
        let mut tx = vec![];
        // Pull-up holds the line high for a few polls before the sensor answers
        tx.extend(level(PinState::High, 3));
        tx.push(PinTx::get(PinState::Low));
        // 80us low
        tx.extend(level(PinState::Low, 79));
        tx.push(PinTx::get(PinState::High));
        // 80us high
        tx.extend(level(PinState::High, 79));
        tx.push(PinTx::get(PinState::Low));
        tx
    }

    fn encode_bit(one: bool) -> Vec<PinTx> {
        let mut tx = vec![];
        // wait_for_high through the 50us low
        tx.extend(level(PinState::Low, 49));
        tx.push(PinTx::get(PinState::High));
        // measure_high
        let polls = if one { ONE_HIGH_POLLS } else { ZERO_HIGH_POLLS };
        tx.extend(level(PinState::High, polls));
        tx.push(PinTx::get(PinState::Low));
        tx
    }

    // Helper to encode one byte into 8 bits (MSB first)
    fn encode_byte(byte: u8) -> Vec<PinTx> {
        (0..8)
            .flat_map(|i| encode_bit((byte >> (7 - i)) & 1 == 1))
            .collect()
    }

    pub(crate) fn exchange(bytes: [u8; 5]) -> Vec<PinTx> {
        let mut tx = start_sequence();
        tx.extend(preamble());
        for byte in bytes {
            tx.extend(encode_byte(byte));
        }
        tx
    }

    #[test]
    fn test_start_sequence() {
        let mut pin = PinMock::new(&start_sequence());

        let delay_transactions = vec![DelayTx::delay_us(20_000)];
        let mut delay = CheckedDelay::new(&delay_transactions);

        let mut dht = backend(&pin, &mut delay, &Config::default());
        dht.start().unwrap();

        pin.done();
        delay.done();
    }

    #[test]
    fn test_init_settles() {
        let mut pin = PinMock::new(&[PinTx::set(PinState::High)]);

        let delay_transactions = vec![DelayTx::delay_ms(1_000)];
        let mut delay = CheckedDelay::new(&delay_transactions);

        let mut dht = backend(&pin, &mut delay, &Config::default());
        dht.init().unwrap();

        pin.done();
        delay.done();
    }

    #[test]
    fn test_wait_for_state() {
        let mut pin = PinMock::new(&[
            // wait_for_high
            PinTx::get(PinState::Low), // Triggers Delay 1us
            PinTx::get(PinState::Low), // Triggers Delay 1us
            PinTx::get(PinState::High),
            // wait_for_low
            PinTx::get(PinState::Low),
        ]);

        let delay_transactions = vec![DelayTx::delay_us(1), DelayTx::delay_us(1)];
        let mut delay = CheckedDelay::new(&delay_transactions);

        let mut dht = backend(&pin, &mut delay, &Config::default());
        assert_eq!(dht.wait_for_high().unwrap(), 2);
        assert_eq!(dht.wait_for_low().unwrap(), 0);

        pin.done();
        delay.done();
    }

    #[test]
    fn test_read_bit_one() {
        let mut pin = PinMock::new(&encode_bit(true));

        let mut dht = backend(&pin, NoopDelay, &Config::default());
        assert!(dht.read_bit().unwrap());

        pin.done();
    }

    #[test]
    fn test_read_bit_zero() {
        let mut pin = PinMock::new(&[
            // wait_for_high
            PinTx::get(PinState::Low),  // To trigger Delay of 1 us, we keep it Low first
            PinTx::get(PinState::High), // now high
            // measure_high: high for 3us
            PinTx::get(PinState::High),
            PinTx::get(PinState::High),
            PinTx::get(PinState::High),
            PinTx::get(PinState::Low),
        ]);

        let delay_transactions = vec![DelayTx::delay_us(1); 4];
        let mut delay = CheckedDelay::new(&delay_transactions);

        let mut dht = backend(&pin, &mut delay, &Config::default());
        assert!(!dht.read_bit().unwrap());

        pin.done();
        delay.done();
    }

    #[test]
    fn test_read_bit_timeout() {
        // wait_for_high succeeds at once, measure_high runs out
        let mut pin_expects = vec![PinTx::get(PinState::High)];
        pin_expects.extend(level(PinState::High, 100));
        let mut pin = PinMock::new(&pin_expects);

        let delay_expects = vec![DelayTx::delay_us(1); 100];
        let mut delay = CheckedDelay::new(&delay_expects);

        let mut dht = backend(&pin, &mut delay, &Config::default());
        dht.phase = Phase::ReadingBits(7);

        assert_eq!(
            dht.read_bit().unwrap_err(),
            AcquireError::InsufficientData {
                phase: Phase::ReadingBits(7)
            }
        );

        pin.done();
        delay.done();
    }

    #[test]
    fn test_acquire_valid() {
        let bytes = [0x32, 0x00, 0x18, 0x00, 0x4A];
        let mut pin = PinMock::new(&exchange(bytes));

        let mut dht = backend(&pin, NoopDelay, &Config::default());
        let frame = dht.acquire().unwrap();

        assert_eq!(frame.bytes(), bytes);
        assert_eq!(dht.phase(), Phase::Complete);

        pin.done();
    }

    #[test]
    fn test_acquire_returns_frame_with_bad_checksum() {
        // Checksum is the decoder's concern, the backend hands the frame over
        let bytes = [0x32, 0x00, 0x18, 0x00, 0x00];
        let mut pin = PinMock::new(&exchange(bytes));

        let mut dht = backend(&pin, NoopDelay, &Config::default());
        let frame = dht.acquire().unwrap();

        assert_eq!(frame.bytes(), bytes);
        assert!(!frame.checksum_ok());

        pin.done();
    }

    #[test]
    fn test_acquire_no_response() {
        let mut pin_states = start_sequence();
        pin_states.extend(level(PinState::High, 100));
        let mut pin = PinMock::new(&pin_states);

        let mut delay_transactions = vec![DelayTx::delay_us(20_000)];
        delay_transactions.extend(vec![DelayTx::delay_us(1); 100]);
        let mut delay = CheckedDelay::new(&delay_transactions);

        let mut dht = backend(&pin, &mut delay, &Config::default());
        assert_eq!(
            dht.acquire().unwrap_err(),
            AcquireError::InsufficientData {
                phase: Phase::WaitingPreamble
            }
        );
        assert_eq!(dht.phase(), Phase::TimedOut);

        pin.done();
        delay.done();
    }

    #[test]
    fn test_acquire_stalls_mid_frame() {
        let mut pin_states = start_sequence();
        pin_states.extend(preamble());
        pin_states.extend(encode_byte(0x32));
        pin_states.extend(encode_bit(true));
        pin_states.extend(encode_bit(false));
        // Line stuck low, next bit never starts
        pin_states.extend(level(PinState::Low, 100));
        let mut pin = PinMock::new(&pin_states);

        let mut dht = backend(&pin, NoopDelay, &Config::default());
        assert_eq!(
            dht.acquire().unwrap_err(),
            AcquireError::InsufficientData {
                phase: Phase::ReadingBits(10)
            }
        );

        pin.done();
    }

    #[test]
    fn test_custom_edge_timeout() {
        let config = Config {
            edge_timeout_us: 150,
            ..Config::default()
        };
        let mut pin_states = start_sequence();
        // Sensor answers after 120us, too late for the default timeout
        pin_states.extend(level(PinState::High, 120));
        pin_states.push(PinTx::get(PinState::Low));
        pin_states.extend(level(PinState::Low, 150));
        let mut pin = PinMock::new(&pin_states);

        let mut dht = backend(&pin, NoopDelay, &config);
        assert_eq!(
            dht.acquire().unwrap_err(),
            AcquireError::InsufficientData {
                phase: Phase::WaitingPreamble
            }
        );

        pin.done();
    }

    /// Open-drain line with a sensor attached. Time comes from a shared
    /// [`FakeClock`] and every pin read takes `read_cost_ns` of it.
    struct SimulatedLine {
        clock: FakeClock,
        read_cost_ns: u64,
        driven_low: bool,
        released_at_ns: Option<u64>,
        // (high, duration in us) after release; idle high once exhausted
        answer: Vec<(bool, u64)>,
    }

    impl SimulatedLine {
        fn new(clock: FakeClock, read_cost_ns: u64, answer: Vec<(bool, u64)>) -> Self {
            SimulatedLine {
                clock,
                read_cost_ns,
                driven_low: false,
                released_at_ns: None,
                answer,
            }
        }

        fn answering(clock: FakeClock, read_cost_ns: u64, bytes: [u8; 5]) -> Self {
            let mut answer = vec![(true, 30), (false, 80), (true, 80)];
            for byte in bytes {
                for i in 0..8 {
                    let high = if (byte >> (7 - i)) & 1 == 1 { 70 } else { 27 };
                    answer.extend([(false, 50), (true, high)]);
                }
            }
            answer.push((false, 50));
            Self::new(clock, read_cost_ns, answer)
        }

        fn sample(&mut self) -> bool {
            self.clock.advance_ns(self.read_cost_ns);
            if self.driven_low {
                return false;
            }
            let Some(released) = self.released_at_ns else {
                return true;
            };
            let mut offset_ns = self.clock.now_ns() - released;
            for &(high, us) in &self.answer {
                if offset_ns < us * 1_000 {
                    return high;
                }
                offset_ns -= us * 1_000;
            }
            true
        }
    }

    impl ErrorType for SimulatedLine {
        type Error = Infallible;
    }

    impl InputPin for SimulatedLine {
        fn is_high(&mut self) -> Result<bool, Infallible> {
            Ok(self.sample())
        }

        fn is_low(&mut self) -> Result<bool, Infallible> {
            Ok(!self.sample())
        }
    }

    impl OutputPin for SimulatedLine {
        fn set_low(&mut self) -> Result<(), Infallible> {
            self.driven_low = true;
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Infallible> {
            self.driven_low = false;
            self.released_at_ns = Some(self.clock.now_ns());
            Ok(())
        }
    }

    #[test]
    fn test_pulse_widths_survive_slow_pin_reads() {
        let bytes = [0x32, 0x00, 0x18, 0x00, 0x4A];
        for read_cost_ns in [0, 300, 600, 1_000, 5_000] {
            let clock = FakeClock::default();
            let line = SimulatedLine::answering(clock.clone(), read_cost_ns, bytes);
            let delay = TickingDelay::new(NoopDelay, clock.clone());
            let mut dht = DirectBackend::new(line, delay, clock, &Config::default());

            let frame = dht.acquire().unwrap();
            assert_eq!(frame.bytes(), bytes, "pin read cost {read_cost_ns}ns");
        }
    }

    #[test]
    fn test_edge_timeout_follows_clock_with_slow_pin_reads() {
        let clock = FakeClock::default();
        // Sensor never pulls the line low
        let line = SimulatedLine::new(clock.clone(), 2_000, vec![]);
        let delay = TickingDelay::new(NoopDelay, clock.clone());
        let mut dht = DirectBackend::new(line, delay, clock.clone(), &Config::default());

        assert_eq!(
            dht.acquire().unwrap_err(),
            AcquireError::InsufficientData {
                phase: Phase::WaitingPreamble
            }
        );
        // 100us edge timeout after the 20ms start pulse, not 100 slow polls
        let waited_us = clock.now_ns() / 1_000 - 20_000;
        assert!((100..=103).contains(&waited_us), "waited {waited_us}us");
    }
}
