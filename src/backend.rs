use crate::{error::AcquireError, frame::Frame};

/// A way of pulling one frame off the sensor line.
///
/// Implemented by [`DirectBackend`](crate::DirectBackend), which times the
/// pulses in software, and [`CaptureBackend`](crate::CaptureBackend), which
/// lets an edge-capture peripheral do it.
pub trait Acquire {
    type Error;

    /// One-time bring-up, called when the driver is constructed.
    fn init(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Runs one complete exchange and returns the raw frame.
    ///
    /// Blocks for the whole exchange. Partial frames are never returned.
    fn acquire(&mut self) -> Result<Frame, AcquireError<Self::Error>>;
}

impl<T: Acquire + ?Sized> Acquire for &mut T {
    type Error = T::Error;

    fn init(&mut self) -> Result<(), Self::Error> {
        T::init(self)
    }

    fn acquire(&mut self) -> Result<Frame, AcquireError<Self::Error>> {
        T::acquire(self)
    }
}
