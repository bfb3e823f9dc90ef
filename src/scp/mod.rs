//! # SuperCard Pro Capture Driver (§4.5)
//!
//! Drives an SCP device over an opaque serial/FTDI link at a 40 MHz
//! sample clock. The physical transport is abstracted behind
//! [`SerialTransport`] so this crate never depends on a particular
//! hardware library.

pub mod driver;
pub mod protocol;

pub use driver::{Drive, FluxCapture, Params, ScpDriver};
pub use protocol::ResponseCode;

/// 40 MHz sample clock: one tick is 25 nanoseconds (§6 "Tick↔nanosecond").
pub const TICK_NANOS: f64 = 25.0;

pub fn ticks_to_nanos(ticks: u32) -> f64 {
    ticks as f64 * TICK_NANOS
}

pub fn nanos_to_ticks(nanos: f64) -> u32 {
    (nanos / TICK_NANOS).round() as u32
}

/// Framing-layer error taxonomy (§7): the device's own response codes
/// plus the three conditions the framing layer itself can detect before
/// even reaching the device.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("serial timeout")]
    Timeout,
    #[error("command echo mismatch or device-reported command error")]
    CommandErr,
    #[error("checksum mismatch")]
    ChecksumErr,
    #[error("device reported: {0:?}")]
    Device(protocol::ResponseCode),
    #[error("transport error")]
    Transport,
}
