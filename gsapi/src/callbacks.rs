//! Callback bridge
//!
//! The native library keeps raw function pointers to the callbacks it is
//! given and calls them long after the registering call returned. This module
//! owns the Rust side of that arrangement:
//!
//! - **Handlers** are caller-supplied objects ([`InputSource`],
//!   [`OutputSink`], [`PollHandler`], [`DisplayHandler`]). Closures with the
//!   matching signature implement these traits directly.
//! - **Trampolines** are `extern` functions with the exact native signature of
//!   each slot. They are plain statics, so their addresses never move.
//! - The **callback registry** is the per-instance retention record: one
//!   mutex-guarded slot per callback owning the boxed handler. Its address is
//!   the caller handle given to `gsapi_new_instance`, which is how a
//!   trampoline finds its handler. The registry is owned by the
//!   [`Instance`](crate::Instance) and dropped right after the native instance
//!   is deleted.
//!
//! Handler failures never cross the C ABI: an `Err` or a panic is caught at
//! the trampoline and turned into a negative status.

use std::fmt;
use std::io::{Read, Write};
use std::os::raw::{c_char, c_int, c_void};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::display::{DisplayHandler, DisplayRegistration};
use crate::error::ErrorCode;

/// Status returned to the library when a handler fails or panics
pub const CALLBACK_FAILURE: c_int = ErrorCode::UNKNOWN_ERROR.value();

/// A named callback registration point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Stdin,
    Stdout,
    Stderr,
    Poll,
    Display,
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Slot::Stdin => "stdin",
            Slot::Stdout => "stdout",
            Slot::Stderr => "stderr",
            Slot::Poll => "poll",
            Slot::Display => "display",
        };
        f.write_str(name)
    }
}

/// Supplies interpreter standard input
pub trait InputSource: Send {
    /// Fill `buf` with up to `buf.len()` bytes and return how many were
    /// written; `0` signals end of input.
    fn read(&mut self, buf: &mut [u8]) -> anyhow::Result<usize>;
}

/// Receives interpreter standard output or standard error
pub trait OutputSink: Send {
    /// Handle `data` and return how many bytes were consumed.
    ///
    /// `None` means the whole buffer was consumed.
    fn write(&mut self, data: &[u8]) -> anyhow::Result<Option<usize>>;
}

/// Called periodically by the interpreter during long operations.
///
/// Returning an error aborts the current operation. If the error is an
/// [`ErrorCode`], that code is passed to the interpreter.
pub trait PollHandler: Send {
    fn poll(&mut self) -> anyhow::Result<()>;
}

impl<F> InputSource for F
where
    F: FnMut(&mut [u8]) -> anyhow::Result<usize> + Send,
{
    fn read(&mut self, buf: &mut [u8]) -> anyhow::Result<usize> {
        self(buf)
    }
}

impl<F> OutputSink for F
where
    F: FnMut(&[u8]) -> anyhow::Result<Option<usize>> + Send,
{
    fn write(&mut self, data: &[u8]) -> anyhow::Result<Option<usize>> {
        self(data)
    }
}

impl<F> PollHandler for F
where
    F: FnMut() -> anyhow::Result<()> + Send,
{
    fn poll(&mut self) -> anyhow::Result<()> {
        self()
    }
}

/// Adapts any [`Read`] into an [`InputSource`]
pub struct ReadSource<R>(pub R);

impl<R: Read + Send> InputSource for ReadSource<R> {
    fn read(&mut self, buf: &mut [u8]) -> anyhow::Result<usize> {
        Ok(self.0.read(buf)?)
    }
}

/// Adapts any [`Write`] into an [`OutputSink`]; always consumes everything
pub struct WriteSink<W>(pub W);

impl<W: Write + Send> OutputSink for WriteSink<W> {
    fn write(&mut self, data: &[u8]) -> anyhow::Result<Option<usize>> {
        self.0.write_all(data)?;
        self.0.flush()?;
        Ok(None)
    }
}

/// A single callback registration request.
///
/// Each variant carries the handler type its slot expects, so a handler can
/// only be registered against a slot with a matching signature. `None` unsets
/// the slot and restores the library's default behaviour.
pub enum Registration {
    Stdin(Option<Box<dyn InputSource>>),
    Stdout(Option<Box<dyn OutputSink>>),
    Stderr(Option<Box<dyn OutputSink>>),
    Poll(Option<Box<dyn PollHandler>>),
    Display(Option<Box<dyn DisplayHandler>>),
}

impl Registration {
    pub fn stdin(source: impl InputSource + 'static) -> Self {
        Registration::Stdin(Some(Box::new(source)))
    }

    pub fn stdout(sink: impl OutputSink + 'static) -> Self {
        Registration::Stdout(Some(Box::new(sink)))
    }

    pub fn stderr(sink: impl OutputSink + 'static) -> Self {
        Registration::Stderr(Some(Box::new(sink)))
    }

    pub fn poll(handler: impl PollHandler + 'static) -> Self {
        Registration::Poll(Some(Box::new(handler)))
    }

    pub fn display(handler: impl DisplayHandler + 'static) -> Self {
        Registration::Display(Some(Box::new(handler)))
    }

    /// Unset `slot`
    pub fn unset(slot: Slot) -> Self {
        match slot {
            Slot::Stdin => Registration::Stdin(None),
            Slot::Stdout => Registration::Stdout(None),
            Slot::Stderr => Registration::Stderr(None),
            Slot::Poll => Registration::Poll(None),
            Slot::Display => Registration::Display(None),
        }
    }

    pub fn slot(&self) -> Slot {
        match self {
            Registration::Stdin(_) => Slot::Stdin,
            Registration::Stdout(_) => Slot::Stdout,
            Registration::Stderr(_) => Slot::Stderr,
            Registration::Poll(_) => Slot::Poll,
            Registration::Display(_) => Slot::Display,
        }
    }

    pub fn is_set(&self) -> bool {
        match self {
            Registration::Stdin(h) => h.is_some(),
            Registration::Stdout(h) | Registration::Stderr(h) => h.is_some(),
            Registration::Poll(h) => h.is_some(),
            Registration::Display(h) => h.is_some(),
        }
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("slot", &self.slot())
            .field("set", &self.is_set())
            .finish()
    }
}

/// Per-instance retention record
#[derive(Default)]
pub(crate) struct CallbackRegistry {
    pub(crate) stdin: Mutex<Option<Box<dyn InputSource>>>,
    pub(crate) stdout: Mutex<Option<Box<dyn OutputSink>>>,
    pub(crate) stderr: Mutex<Option<Box<dyn OutputSink>>>,
    pub(crate) poll: Mutex<Option<Box<dyn PollHandler>>>,
    pub(crate) display: Mutex<Option<DisplayRegistration>>,
}

impl CallbackRegistry {
    pub(crate) fn is_bound(&self, slot: Slot) -> bool {
        match slot {
            Slot::Stdin => lock(&self.stdin).is_some(),
            Slot::Stdout => lock(&self.stdout).is_some(),
            Slot::Stderr => lock(&self.stderr).is_some(),
            Slot::Poll => lock(&self.poll).is_some(),
            Slot::Display => lock(&self.display).is_some(),
        }
    }

    /// Drop every retained handler
    pub(crate) fn clear(&self) {
        drop(replace(&self.stdin, None));
        drop(replace(&self.stdout, None));
        drop(replace(&self.stderr, None));
        drop(replace(&self.poll, None));
        drop(replace(&self.display, None));
    }

    /// Resolve the registry a trampoline was called for
    ///
    /// # Safety
    /// `handle` must be null or the caller handle of a live instance.
    pub(crate) unsafe fn from_handle<'a>(handle: *mut c_void) -> Option<&'a CallbackRegistry> {
        (handle as *const CallbackRegistry).as_ref()
    }
}

/// Lock a slot, ignoring poisoning; a handler that panicked is still replaced
/// or dropped normally.
pub(crate) fn lock<T>(cell: &Mutex<T>) -> MutexGuard<'_, T> {
    cell.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Swap the content of a slot, returning the previous handler
pub(crate) fn replace<T>(cell: &Mutex<Option<T>>, value: Option<T>) -> Option<T> {
    std::mem::replace(&mut *lock(cell), value)
}

#[derive(Debug, thiserror::Error)]
#[error("no handler bound to the {0} slot")]
struct Unbound(Slot);

/// Run a handler call at the trampoline edge.
///
/// Errors and panics are logged and converted to a negative status.
pub(crate) fn guarded<F>(slot: Slot, call: F) -> c_int
where
    F: FnOnce() -> anyhow::Result<c_int>,
{
    match catch_unwind(AssertUnwindSafe(call)) {
        Ok(Ok(status)) => status,
        Ok(Err(e)) => {
            let status = match e.downcast_ref::<ErrorCode>() {
                Some(code) if code.value() < 0 => code.value(),
                _ => CALLBACK_FAILURE,
            };
            log::warn!("{} callback failed: {:#} (returning {})", slot, e, status);
            status
        }
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            log::warn!("{} callback panicked: {} (returning {})", slot, message, CALLBACK_FAILURE);
            CALLBACK_FAILURE
        }
    }
}

fn clamp_count(count: usize, len: usize) -> c_int {
    // len came from a c_int, so the clamped count always fits
    count.min(len) as c_int
}

pub(crate) unsafe extern "system" fn stdin_trampoline(
    handle: *mut c_void,
    buf: *mut c_char,
    len: c_int,
) -> c_int {
    let Some(registry) = CallbackRegistry::from_handle(handle) else {
        return CALLBACK_FAILURE;
    };
    let len = usize::try_from(len).unwrap_or(0);
    let buf: &mut [u8] = if buf.is_null() || len == 0 {
        &mut []
    } else {
        std::slice::from_raw_parts_mut(buf.cast::<u8>(), len)
    };

    guarded(Slot::Stdin, || {
        let mut source = lock(&registry.stdin);
        let source = source.as_mut().ok_or(Unbound(Slot::Stdin))?;
        let count = source.read(buf)?;
        Ok(clamp_count(count, len))
    })
}

unsafe fn output(slot: Slot, handle: *mut c_void, str: *const c_char, len: c_int) -> c_int {
    let Some(registry) = CallbackRegistry::from_handle(handle) else {
        return CALLBACK_FAILURE;
    };
    let len = usize::try_from(len).unwrap_or(0);
    // Bounded by len; payloads may contain zero bytes
    let data: &[u8] = if str.is_null() || len == 0 {
        &[]
    } else {
        std::slice::from_raw_parts(str.cast::<u8>(), len)
    };
    let cell = if slot == Slot::Stderr {
        &registry.stderr
    } else {
        &registry.stdout
    };

    guarded(slot, || {
        let mut sink = lock(cell);
        let sink = sink.as_mut().ok_or(Unbound(slot))?;
        let consumed = sink.write(data)?.unwrap_or(len);
        Ok(clamp_count(consumed, len))
    })
}

pub(crate) unsafe extern "system" fn stdout_trampoline(
    handle: *mut c_void,
    str: *const c_char,
    len: c_int,
) -> c_int {
    output(Slot::Stdout, handle, str, len)
}

pub(crate) unsafe extern "system" fn stderr_trampoline(
    handle: *mut c_void,
    str: *const c_char,
    len: c_int,
) -> c_int {
    output(Slot::Stderr, handle, str, len)
}

pub(crate) unsafe extern "system" fn poll_trampoline(handle: *mut c_void) -> c_int {
    let Some(registry) = CallbackRegistry::from_handle(handle) else {
        return CALLBACK_FAILURE;
    };

    guarded(Slot::Poll, || {
        let mut handler = lock(&registry.poll);
        handler.as_mut().ok_or(Unbound(Slot::Poll))?.poll()?;
        Ok(0)
    })
}
