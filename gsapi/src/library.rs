//! Loading the native library
//!
//! The shared library is opened at runtime with `libloading` and every entry
//! point is resolved once into a [`NativeApi`] table. Instances keep an `Arc`
//! of the [`GsLibrary`] they were created from, so the library stays mapped
//! for as long as any instance (and therefore any registered callback) exists.

use libloading::Library;
use std::ffi::{CStr, OsStr};
use std::os::raw::c_int;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{check, GsError, Result};
use crate::ffi;
use crate::types::Revision;

/// Library file names tried by [`GsLibrary::load_default`], in order
#[cfg(all(windows, target_pointer_width = "64"))]
pub const DEFAULT_LIBRARY_NAMES: &[&str] = &["gsdll64.dll", "gpdldll64.dll"];
#[cfg(all(windows, target_pointer_width = "32"))]
pub const DEFAULT_LIBRARY_NAMES: &[&str] = &["gsdll32.dll", "gpdldll32.dll"];
#[cfg(target_os = "macos")]
pub const DEFAULT_LIBRARY_NAMES: &[&str] = &["libgs.dylib", "libgs.10.dylib", "libgs.9.dylib"];
#[cfg(all(unix, not(target_os = "macos")))]
pub const DEFAULT_LIBRARY_NAMES: &[&str] = &["libgs.so", "libgs.so.10", "libgs.so.9"];

/// Resolved entry points of the interpreter API
///
/// Required entry points are plain function pointers; entry points that only
/// exist in newer library versions are `Option`s.
#[derive(Clone, Copy)]
pub struct NativeApi {
    pub revision: ffi::gsapi_revision_fn,
    pub new_instance: ffi::gsapi_new_instance_fn,
    pub delete_instance: ffi::gsapi_delete_instance_fn,
    pub set_stdio: ffi::gsapi_set_stdio_fn,
    pub set_poll: ffi::gsapi_set_poll_fn,
    pub set_display_callback: ffi::gsapi_set_display_callback_fn,
    pub set_default_device_list: ffi::gsapi_set_default_device_list_fn,
    pub get_default_device_list: ffi::gsapi_get_default_device_list_fn,
    pub set_arg_encoding: ffi::gsapi_set_arg_encoding_fn,
    pub init_with_args: ffi::gsapi_init_with_args_fn,
    pub run_string_begin: ffi::gsapi_run_string_begin_fn,
    pub run_string_continue: ffi::gsapi_run_string_continue_fn,
    pub run_string_end: ffi::gsapi_run_string_end_fn,
    pub run_string_with_length: ffi::gsapi_run_string_with_length_fn,
    pub run_file: ffi::gsapi_run_file_fn,
    pub exit: ffi::gsapi_exit_fn,
    pub set_param: Option<ffi::gsapi_set_param_fn>,
    pub get_param: Option<ffi::gsapi_get_param_fn>,
    pub add_control_path: Option<ffi::gsapi_add_control_path_fn>,
    pub remove_control_path: Option<ffi::gsapi_remove_control_path_fn>,
    pub purge_control_paths: Option<ffi::gsapi_purge_control_paths_fn>,
    pub activate_path_control: Option<ffi::gsapi_activate_path_control_fn>,
    pub is_path_control_active: Option<ffi::gsapi_is_path_control_active_fn>,
}

/// A loaded (or statically provided) interpreter library
pub struct GsLibrary {
    api: NativeApi,
    path: Option<PathBuf>,
    // Must outlive every function pointer copied into `api`
    _library: Option<Library>,
}

impl GsLibrary {
    /// Open the shared library at `path` and resolve its entry points
    pub fn load(path: impl AsRef<OsStr>) -> Result<Arc<Self>> {
        let path = path.as_ref();
        log::info!("Loading Ghostscript library: {:?}", path);

        // SAFETY: loading runs the library's initialisers; libgs has no
        // initialisation side effects beyond its own globals.
        let library = unsafe { Library::new(path)? };
        let api = unsafe { resolve(&library)? };

        log::info!("Ghostscript library loaded: {:?}", path);
        Ok(Arc::new(Self {
            api,
            path: Some(PathBuf::from(path)),
            _library: Some(library),
        }))
    }

    /// Try each of [`DEFAULT_LIBRARY_NAMES`] and return the first that loads
    pub fn load_default() -> Result<Arc<Self>> {
        let mut last_error = None;
        for name in DEFAULT_LIBRARY_NAMES {
            match Self::load(name) {
                Ok(library) => return Ok(library),
                Err(e) => {
                    log::debug!("Could not load {}: {}", name, e);
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or(GsError::Unsupported("no default library name for this platform")))
    }

    /// Build a library from an already resolved entry-point table, e.g. for a
    /// statically linked interpreter.
    ///
    /// # Safety
    /// Every function pointer in `api` must implement the documented
    /// behaviour of the corresponding `gsapi_*` entry point and remain valid
    /// for the lifetime of the returned library.
    pub unsafe fn from_api(api: NativeApi) -> Arc<Self> {
        Arc::new(Self {
            api,
            path: None,
            _library: None,
        })
    }

    /// The path the library was loaded from, if it was loaded from disk
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub(crate) fn api(&self) -> &NativeApi {
        &self.api
    }

    /// Query product and version information
    pub fn revision(&self) -> Result<Revision> {
        let mut raw = ffi::gsapi_revision_t::default();
        let size = std::mem::size_of::<ffi::gsapi_revision_t>() as c_int;

        let status = check(unsafe { (self.api.revision)(&mut raw, size) })?;
        if status > 0 {
            // The library wants a larger structure than this binding knows
            return Err(GsError::InvalidArgument(format!(
                "revision structure too small: library expects {} bytes, have {}",
                status, size
            )));
        }

        Ok(Revision {
            product: unsafe { lossy_string(raw.product) },
            copyright: unsafe { lossy_string(raw.copyright) },
            revision: i64::from(raw.revision),
            revision_date: i64::from(raw.revisiondate),
        })
    }
}

impl std::fmt::Debug for GsLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GsLibrary").field("path", &self.path).finish_non_exhaustive()
    }
}

unsafe fn lossy_string(ptr: *const std::os::raw::c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    CStr::from_ptr(ptr).to_string_lossy().into_owned()
}

unsafe fn required<T: Copy>(library: &Library, name: &[u8]) -> Result<T> {
    let symbol = library.get::<T>(name)?;
    Ok(*symbol)
}

unsafe fn optional<T: Copy>(library: &Library, name: &[u8]) -> Option<T> {
    match library.get::<T>(name) {
        Ok(symbol) => Some(*symbol),
        Err(e) => {
            log::debug!("Optional entry point unavailable: {}", e);
            None
        }
    }
}

unsafe fn resolve(library: &Library) -> Result<NativeApi> {
    Ok(NativeApi {
        revision: required(library, b"gsapi_revision\0")?,
        new_instance: required(library, b"gsapi_new_instance\0")?,
        delete_instance: required(library, b"gsapi_delete_instance\0")?,
        set_stdio: required(library, b"gsapi_set_stdio\0")?,
        set_poll: required(library, b"gsapi_set_poll\0")?,
        set_display_callback: required(library, b"gsapi_set_display_callback\0")?,
        set_default_device_list: required(library, b"gsapi_set_default_device_list\0")?,
        get_default_device_list: required(library, b"gsapi_get_default_device_list\0")?,
        set_arg_encoding: required(library, b"gsapi_set_arg_encoding\0")?,
        init_with_args: required(library, b"gsapi_init_with_args\0")?,
        run_string_begin: required(library, b"gsapi_run_string_begin\0")?,
        run_string_continue: required(library, b"gsapi_run_string_continue\0")?,
        run_string_end: required(library, b"gsapi_run_string_end\0")?,
        run_string_with_length: required(library, b"gsapi_run_string_with_length\0")?,
        run_file: required(library, b"gsapi_run_file\0")?,
        exit: required(library, b"gsapi_exit\0")?,
        set_param: optional(library, b"gsapi_set_param\0"),
        get_param: optional(library, b"gsapi_get_param\0"),
        add_control_path: optional(library, b"gsapi_add_control_path\0"),
        remove_control_path: optional(library, b"gsapi_remove_control_path\0"),
        purge_control_paths: optional(library, b"gsapi_purge_control_paths\0"),
        activate_path_control: optional(library, b"gsapi_activate_path_control\0"),
        is_path_control_active: optional(library, b"gsapi_is_path_control_active\0"),
    })
}
