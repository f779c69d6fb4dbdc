//! Ghostscript API bridge
//!
//! Safe Rust access to the `gsapi_*` entry points of a precompiled Ghostscript
//! shared library. The crate does no rendering itself; it loads the library,
//! marshals calls and text across the C ABI, and keeps registered callbacks
//! alive for exactly as long as the library may call them.
//!
//! # Architecture
//!
//! - [`GsLibrary`] loads the shared library (or wraps a statically provided
//!   entry-point table) and reports the [`Revision`].
//! - [`Instance`] is one interpreter session; every native entry point is one
//!   method on it.
//! - The callback bridge ([`Registration`], [`OutputSink`], ...) binds Rust
//!   handlers to the native stdio, poll and display slots. Handlers are owned
//!   by the instance and released when it is deleted; errors and panics are
//!   stopped at the C boundary.
//!
//! # Example Usage
//!
//! ```no_run
//! use gsapi::{GsLibrary, Instance, Registration};
//!
//! let library = GsLibrary::load_default().unwrap();
//! println!("{}", library.revision().unwrap());
//!
//! let mut instance = Instance::new(&library).unwrap();
//! instance
//!     .register(Registration::stdout(|data: &[u8]| -> anyhow::Result<Option<usize>> {
//!         print!("{}", String::from_utf8_lossy(data));
//!         Ok(None)
//!     }))
//!     .unwrap();
//! instance.init_with_args(&["gs", "-dNODISPLAY", "-q"]).unwrap();
//! instance.run_string("(hello) print flush\n", 0).unwrap();
//! instance.exit().unwrap();
//! instance.delete();
//! ```

// Public modules
pub mod config;
pub mod encoding;
pub mod error;
pub mod ffi;
pub mod types;

// Re-export main types for convenience
pub use callbacks::{
    InputSource, OutputSink, PollHandler, ReadSource, Registration, Slot, WriteSink,
    CALLBACK_FAILURE,
};
pub use config::{ControlPaths, InstanceConfig};
pub use display::{DeviceId, DisplayEvent, DisplayFormat, DisplayHandler};
pub use error::{ErrorCode, GsError, Result};
pub use instance::Instance;
pub use library::{GsLibrary, NativeApi, DEFAULT_LIBRARY_NAMES};
pub use types::{ArgEncoding, Continuation, ParamKind, ParamValue, PermitKind, Revision};

mod callbacks;
mod display;
mod instance;
mod library;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
