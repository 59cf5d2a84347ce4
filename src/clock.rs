/// Monotonic microsecond time source.
///
/// Used by the driver to space physical reads. Any free-running timer works,
/// e.g. a SysTick counter or `embassy_time::Instant::now().as_micros()`.
pub trait Monotonic {
    /// Microseconds since an arbitrary fixed point. Must never go backwards.
    fn now_us(&mut self) -> u64;
}

impl<T: Monotonic + ?Sized> Monotonic for &mut T {
    fn now_us(&mut self) -> u64 {
        T::now_us(self)
    }
}
