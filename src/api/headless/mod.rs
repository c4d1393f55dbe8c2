#![cfg(headless_backend)]

//! The in-process software backend.
//!
//! A deterministic driver with no GPU or window system behind it: formats
//! come from a fixed table, contexts and surfaces are bookkeeping records,
//! and entry points resolve to stub symbols. It serves headless and
//! automated environments where rendering output is not the point, and it is
//! what the crate's own tests run against.

mod device;
mod driver;
mod format;

pub use device::{Device, DeviceBuilder};
pub use format::FormatDescriptor;

pub(crate) use driver::Display;
