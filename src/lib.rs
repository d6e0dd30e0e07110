//! padshim impersonates the stock XInput library so games see a standard
//! gamepad while the actual input comes from arbitrary raw devices.
//!
//! The crate builds as a drop-in `xinput1_3.dll` replacement. A host
//! integration registers a [`device::DeviceSource`]; the shim handles the
//! rest: per-slot mapping profiles, raw-report translation, force feedback,
//! native pass-through and the optional API interception engine.

pub mod config;
pub mod device;
pub mod entry;
pub mod error;
pub mod ffb;
#[cfg(windows)]
pub mod ffi;
pub mod hooks;
pub mod passthrough;
pub mod registry;
pub mod translate;

pub use config::{MappingProfile, ShimConfig};
pub use device::{DeviceSource, RawDevice, RawSample};
pub use entry::Emulator;
pub use error::{Result, ShimError};

/// Initialize env_logger once; later calls are harmless.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}
