//! Display device callbacks
//!
//! The display device reports its lifecycle (open, resize, page, close) through
//! a block of function pointers. Unlike the stdio callbacks, the library keeps
//! a pointer to the *block* itself, so the block is boxed and retained next to
//! the handler for as long as it is installed.
//!
//! Memory allocation callbacks are left unset; the device then allocates its
//! own image buffer and hands its address over in the `size` event.
//!
//! The device calls back with its `DisplayHandle` parameter rather than the
//! instance's caller handle, so the registry address travels in through
//! `-sDisplayHandle` on the init arguments.

use std::ffi::CStr;
use std::os::raw::{c_char, c_int, c_uint, c_ushort, c_void};

use crate::callbacks::{guarded, lock, CallbackRegistry, Slot, CALLBACK_FAILURE};
use crate::ffi;

/// Opaque identity of the display device instance that raised an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceId(usize);

impl DeviceId {
    pub fn as_usize(self) -> usize {
        self.0
    }
}

/// Raw `DISPLAY_*` format flags (colour model, depth, endianness, row order)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DisplayFormat(pub u32);

/// A display device event
#[derive(Debug)]
pub enum DisplayEvent<'a> {
    Open,
    PreClose,
    Close,
    PreSize {
        width: i32,
        height: i32,
        raster: i32,
        format: DisplayFormat,
    },
    Size {
        width: i32,
        height: i32,
        raster: i32,
        format: DisplayFormat,
    },
    /// The image may be shown; it is not necessarily complete
    Sync { image: Option<&'a [u8]> },
    /// A page is complete
    Page {
        copies: i32,
        flush: bool,
        image: Option<&'a [u8]>,
    },
    Update {
        x: i32,
        y: i32,
        width: i32,
        height: i32,
    },
    Separation {
        component: i32,
        name: String,
        cmyk: [u16; 4],
    },
}

/// Receives display device events
pub trait DisplayHandler: Send {
    fn on_event(&mut self, device: DeviceId, event: DisplayEvent<'_>) -> anyhow::Result<()>;
}

impl<F> DisplayHandler for F
where
    F: FnMut(DeviceId, DisplayEvent<'_>) -> anyhow::Result<()> + Send,
{
    fn on_event(&mut self, device: DeviceId, event: DisplayEvent<'_>) -> anyhow::Result<()> {
        self(device, event)
    }
}

// Image buffer announced by the last `size` event
struct Surface {
    ptr: *const u8,
    len: usize,
}

/// Retained state of an installed display handler
pub(crate) struct DisplayRegistration {
    handler: Box<dyn DisplayHandler>,
    block: Box<ffi::display_callback>,
    surface: Option<Surface>,
}

// SAFETY: the surface pointer refers to memory owned by the display device and
// is only dereferenced inside display trampolines, under the slot lock.
unsafe impl Send for DisplayRegistration {}

impl DisplayRegistration {
    pub(crate) fn new(handler: Box<dyn DisplayHandler>) -> Self {
        Self {
            handler,
            block: Box::new(callback_block()),
            surface: None,
        }
    }

    /// Address handed to `gsapi_set_display_callback`; stable while `self` lives
    pub(crate) fn block_ptr(&mut self) -> *mut ffi::display_callback {
        &mut *self.block
    }
}

fn callback_block() -> ffi::display_callback {
    ffi::display_callback {
        size: std::mem::size_of::<ffi::display_callback>() as c_int,
        version_major: ffi::DISPLAY_VERSION_MAJOR_V2,
        version_minor: ffi::DISPLAY_VERSION_MINOR_V2,
        display_open: Some(display_open),
        display_preclose: Some(display_preclose),
        display_close: Some(display_close),
        display_presize: Some(display_presize),
        display_size: Some(display_size),
        display_sync: Some(display_sync),
        display_page: Some(display_page),
        display_update: Some(display_update),
        display_memalloc: None,
        display_memfree: None,
        display_separation: Some(display_separation),
    }
}

/// Dispatch one event to the handler registered for `handle`.
///
/// `before` runs under the slot lock ahead of the handler and may update the
/// retained surface.
unsafe fn dispatch<F>(handle: *mut c_void, device: *mut c_void, before: F) -> c_int
where
    F: FnOnce(&mut Option<Surface>) -> anyhow::Result<DisplayEvent<'static>>,
{
    let Some(registry) = CallbackRegistry::from_handle(handle) else {
        return CALLBACK_FAILURE;
    };
    let device = DeviceId(device as usize);

    guarded(Slot::Display, || {
        let mut slot = lock(&registry.display);
        let registration = slot
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("no handler bound to the display slot"))?;
        let event = before(&mut registration.surface)?;
        registration.handler.on_event(device, event)?;
        Ok(0)
    })
}

// Events that carry the current image
enum ImageEvent {
    Sync,
    Page { copies: i32, flush: bool },
}

/// Like [`dispatch`], for events that expose the current image
unsafe fn dispatch_with_image(handle: *mut c_void, device: *mut c_void, kind: ImageEvent) -> c_int {
    let Some(registry) = CallbackRegistry::from_handle(handle) else {
        return CALLBACK_FAILURE;
    };
    let device = DeviceId(device as usize);

    guarded(Slot::Display, || {
        let mut slot = lock(&registry.display);
        let registration = slot
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("no handler bound to the display slot"))?;
        let DisplayRegistration { handler, surface, .. } = registration;
        let image = surface
            .as_ref()
            .map(|s| std::slice::from_raw_parts(s.ptr, s.len));
        let event = match kind {
            ImageEvent::Sync => DisplayEvent::Sync { image },
            ImageEvent::Page { copies, flush } => DisplayEvent::Page { copies, flush, image },
        };
        handler.on_event(device, event)?;
        Ok(0)
    })
}

unsafe extern "C" fn display_open(handle: *mut c_void, device: *mut c_void) -> c_int {
    dispatch(handle, device, |_| Ok(DisplayEvent::Open))
}

unsafe extern "C" fn display_preclose(handle: *mut c_void, device: *mut c_void) -> c_int {
    dispatch(handle, device, |_| Ok(DisplayEvent::PreClose))
}

unsafe extern "C" fn display_close(handle: *mut c_void, device: *mut c_void) -> c_int {
    dispatch(handle, device, |surface| {
        *surface = None;
        Ok(DisplayEvent::Close)
    })
}

unsafe extern "C" fn display_presize(
    handle: *mut c_void,
    device: *mut c_void,
    width: c_int,
    height: c_int,
    raster: c_int,
    format: c_uint,
) -> c_int {
    dispatch(handle, device, |_| {
        Ok(DisplayEvent::PreSize {
            width,
            height,
            raster,
            format: DisplayFormat(format),
        })
    })
}

unsafe extern "C" fn display_size(
    handle: *mut c_void,
    device: *mut c_void,
    width: c_int,
    height: c_int,
    raster: c_int,
    format: c_uint,
    pimage: *mut u8,
) -> c_int {
    dispatch(handle, device, |surface| {
        // raster is negative for bottom-up images; the buffer size is the same
        let len = (raster.unsigned_abs() as usize)
            .checked_mul(usize::try_from(height).unwrap_or(0))
            .ok_or_else(|| anyhow::anyhow!("image size overflows: {}x{}", raster, height))?;
        *surface = if pimage.is_null() || len == 0 {
            None
        } else {
            Some(Surface { ptr: pimage, len })
        };
        Ok(DisplayEvent::Size {
            width,
            height,
            raster,
            format: DisplayFormat(format),
        })
    })
}

unsafe extern "C" fn display_sync(handle: *mut c_void, device: *mut c_void) -> c_int {
    dispatch_with_image(handle, device, ImageEvent::Sync)
}

unsafe extern "C" fn display_page(
    handle: *mut c_void,
    device: *mut c_void,
    copies: c_int,
    flush: c_int,
) -> c_int {
    dispatch_with_image(
        handle,
        device,
        ImageEvent::Page {
            copies,
            flush: flush != 0,
        },
    )
}

unsafe extern "C" fn display_update(
    handle: *mut c_void,
    device: *mut c_void,
    x: c_int,
    y: c_int,
    w: c_int,
    h: c_int,
) -> c_int {
    dispatch(handle, device, |_| {
        Ok(DisplayEvent::Update {
            x,
            y,
            width: w,
            height: h,
        })
    })
}

#[allow(clippy::too_many_arguments)]
unsafe extern "C" fn display_separation(
    handle: *mut c_void,
    device: *mut c_void,
    component: c_int,
    component_name: *const c_char,
    c: c_ushort,
    m: c_ushort,
    y: c_ushort,
    k: c_ushort,
) -> c_int {
    let name = if component_name.is_null() {
        String::new()
    } else {
        CStr::from_ptr(component_name).to_string_lossy().into_owned()
    };
    dispatch(handle, device, move |_| {
        Ok(DisplayEvent::Separation {
            component,
            name,
            cmyk: [c, m, y, k],
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callbacks::replace;
    use std::sync::{Arc, Mutex as StdMutex};

    fn registry_with(events: Arc<StdMutex<Vec<String>>>) -> CallbackRegistry {
        let registry = CallbackRegistry::default();
        let handler = move |_: DeviceId, event: DisplayEvent<'_>| -> anyhow::Result<()> {
            let summary = match event {
                DisplayEvent::Page { image, .. } => format!("page:{}", image.map_or(0, |i| i.len())),
                other => format!("{:?}", other),
            };
            events.lock().unwrap().push(summary);
            Ok(())
        };
        replace(&registry.display, Some(DisplayRegistration::new(Box::new(handler))));
        registry
    }

    #[test]
    fn test_block_layout_header() {
        let block = callback_block();
        assert_eq!(block.size as usize, std::mem::size_of::<ffi::display_callback>());
        assert_eq!(block.version_major, 2);
        assert!(block.display_memalloc.is_none());
        assert!(block.display_page.is_some());
    }

    #[test]
    fn test_page_sees_image_from_size_event() {
        let events = Arc::new(StdMutex::new(Vec::new()));
        let registry = registry_with(events.clone());
        let handle = &registry as *const CallbackRegistry as *mut c_void;
        let device = 0x10 as *mut c_void;
        let mut image = vec![0u8; 4 * 3];

        unsafe {
            assert_eq!(display_open(handle, device), 0);
            assert_eq!(display_size(handle, device, 1, 3, -4, 0, image.as_mut_ptr()), 0);
            assert_eq!(display_page(handle, device, 1, 1), 0);
            assert_eq!(display_close(handle, device), 0);
            assert_eq!(display_page(handle, device, 1, 0), 0);
        }

        let events = events.lock().unwrap();
        assert_eq!(events[0], "Open");
        assert_eq!(events[2], "page:12");
        assert_eq!(events[3], "Close");
        assert_eq!(events[4], "page:0");
    }

    #[test]
    fn test_unbound_display_slot() {
        let registry = CallbackRegistry::default();
        let handle = &registry as *const CallbackRegistry as *mut c_void;
        assert_eq!(unsafe { display_sync(handle, std::ptr::null_mut()) }, CALLBACK_FAILURE);
    }
}
