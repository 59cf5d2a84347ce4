//! DHT11 Sensor Driver for Embedded Rust
//!
//! This crate provides a platform-agnostic driver for the DHT11 temperature
//! and humidity sensor, built on top of the [`embedded-hal`] traits.
//!
//! The sensor talks over a single open-drain line: the host holds it low to
//! request a reading, the sensor answers with a preamble and 40 pulse-width
//! encoded bits (humidity, temperature, checksum). Two backends time those
//! pulses:
//!
//! - [`DirectBackend`] busy-polls the pin and times each pulse on a
//!   [`Monotonic`] clock.
//! - [`CaptureBackend`] lets an edge-capture peripheral ([`EdgeCapture`],
//!   e.g. the ESP32 RMT) record the pulses and decodes them afterwards.
//!
//! [`Dht11`] sits in front of either one. The sensor cannot be triggered more
//! than once every ~2 seconds, so reads inside that window return the cached
//! [`Reading`]. Failures are reported through [`Reading::status`] and keep
//! the last good values.
//!
//! # Features
//! - Blocking synchronous API using `embedded-hal` traits
//! - Designed for `no_std` environments
//! - Shared access from several contexts through [`SharedDht11`]
//! - Optional logging support via `defmt` or `log`
//!
//! # Optional Features
//! - `defmt`: Implements `defmt::Format` and logs through `defmt`
//! - `log`: Logs through the `log` facade
//!
//! # Example
//!
//! ```ignore
//! let mut dht = Dht11::direct(pin, delay, clock, Config::default())?;
//!
//! let reading = dht.read();
//! if reading.is_ok() {
//!     println!("{}C {}%", reading.temperature, reading.humidity);
//! }
//! ```
//!
//! [`embedded-hal`]: https://docs.rs/embedded-hal

#![cfg_attr(not(test), no_std)]

// MUST be the first module
mod fmt;

pub mod backend;
pub mod capture;
pub mod clock;
pub mod config;
pub mod dht11;
pub mod direct;
pub mod error;
pub mod frame;
pub mod protocol;
pub mod shared;

pub use backend::Acquire;
pub use capture::{CaptureBackend, EdgeCapture};
pub use clock::Monotonic;
pub use config::{CaptureMode, Config};
pub use dht11::Dht11;
pub use direct::DirectBackend;
pub use error::{AcquireError, CaptureFault, ConfigError, InitError};
pub use frame::{Frame, Reading, Status, decode};
pub use protocol::{Level, Phase, Pulse};
pub use shared::SharedDht11;
