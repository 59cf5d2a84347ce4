use core::cell::RefCell;

use embassy_sync::blocking_mutex::{Mutex, raw::RawMutex};

use crate::{backend::Acquire, clock::Monotonic, dht11::Dht11, frame::Reading};

/// A [`Dht11`] that several execution contexts can read through a shared
/// reference.
///
/// Each read holds the mutex for the whole exchange, so at most one
/// acquisition is ever in flight and the rate limit and cache stay
/// consistent. With `CriticalSectionRawMutex` interrupts are also kept off
/// while the pulses are timed, which suits the direct backend; use
/// `NoopRawMutex` when all readers live on one executor.
pub struct SharedDht11<M: RawMutex, B, C> {
    inner: Mutex<M, RefCell<Dht11<B, C>>>,
}

impl<M, B, C> SharedDht11<M, B, C>
where
    M: RawMutex,
    B: Acquire,
    C: Monotonic,
{
    pub fn new(dht: Dht11<B, C>) -> Self {
        SharedDht11 {
            inner: Mutex::new(RefCell::new(dht)),
        }
    }

    /// See [`Dht11::read`].
    pub fn read(&self) -> Reading {
        self.inner.lock(|dht| dht.borrow_mut().read())
    }

    pub fn last_reading(&self) -> Reading {
        self.inner.lock(|dht| dht.borrow().last_reading())
    }

    pub fn into_inner(self) -> Dht11<B, C> {
        self.inner.into_inner().into_inner()
    }
}
