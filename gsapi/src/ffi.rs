//! Raw C ABI of the Ghostscript interpreter API (`iapi.h`, `gdevdsp.h`)
//!
//! Everything in this module mirrors the native declarations exactly.
//! Entry points and stdio/poll callbacks use the `GSDLLAPI`/`GSDLLCALL`
//! convention, which is `__stdcall` on 32-bit Windows and the C convention
//! everywhere else; `extern "system"` expresses exactly that.

#![allow(non_camel_case_types)]

use std::os::raw::{c_char, c_int, c_long, c_uint, c_ulong, c_ushort, c_void};

/// Filled in by `gsapi_revision`
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct gsapi_revision_t {
    pub product: *const c_char,
    pub copyright: *const c_char,
    pub revision: c_long,
    pub revisiondate: c_long,
}

impl Default for gsapi_revision_t {
    fn default() -> Self {
        Self {
            product: std::ptr::null(),
            copyright: std::ptr::null(),
            revision: 0,
            revisiondate: 0,
        }
    }
}

// Standard I/O and poll callbacks
pub type stdin_fn = unsafe extern "system" fn(
    caller_handle: *mut c_void,
    buf: *mut c_char,
    len: c_int,
) -> c_int;
pub type stdout_fn = unsafe extern "system" fn(
    caller_handle: *mut c_void,
    str: *const c_char,
    len: c_int,
) -> c_int;
pub type poll_fn = unsafe extern "system" fn(caller_handle: *mut c_void) -> c_int;

// Display device callbacks (plain C convention in gdevdsp.h)
pub type display_open_fn = unsafe extern "C" fn(handle: *mut c_void, device: *mut c_void) -> c_int;
pub type display_presize_fn = unsafe extern "C" fn(
    handle: *mut c_void,
    device: *mut c_void,
    width: c_int,
    height: c_int,
    raster: c_int,
    format: c_uint,
) -> c_int;
pub type display_size_fn = unsafe extern "C" fn(
    handle: *mut c_void,
    device: *mut c_void,
    width: c_int,
    height: c_int,
    raster: c_int,
    format: c_uint,
    pimage: *mut u8,
) -> c_int;
pub type display_page_fn = unsafe extern "C" fn(
    handle: *mut c_void,
    device: *mut c_void,
    copies: c_int,
    flush: c_int,
) -> c_int;
pub type display_update_fn = unsafe extern "C" fn(
    handle: *mut c_void,
    device: *mut c_void,
    x: c_int,
    y: c_int,
    w: c_int,
    h: c_int,
) -> c_int;
pub type display_memalloc_fn = unsafe extern "C" fn(
    handle: *mut c_void,
    device: *mut c_void,
    size: c_ulong,
) -> *mut c_void;
pub type display_memfree_fn = unsafe extern "C" fn(
    handle: *mut c_void,
    device: *mut c_void,
    mem: *mut c_void,
) -> c_int;
pub type display_separation_fn = unsafe extern "C" fn(
    handle: *mut c_void,
    device: *mut c_void,
    component: c_int,
    component_name: *const c_char,
    c: c_ushort,
    m: c_ushort,
    y: c_ushort,
    k: c_ushort,
) -> c_int;

pub const DISPLAY_VERSION_MAJOR_V2: c_int = 2;
pub const DISPLAY_VERSION_MINOR_V2: c_int = 0;

/// Version 2 of `struct display_callback_s`.
///
/// The library keeps the *address* of this structure, not a copy, so it must
/// stay pinned for as long as it is installed.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct display_callback {
    pub size: c_int,
    pub version_major: c_int,
    pub version_minor: c_int,
    pub display_open: Option<display_open_fn>,
    pub display_preclose: Option<display_open_fn>,
    pub display_close: Option<display_open_fn>,
    pub display_presize: Option<display_presize_fn>,
    pub display_size: Option<display_size_fn>,
    pub display_sync: Option<display_open_fn>,
    pub display_page: Option<display_page_fn>,
    pub display_update: Option<display_update_fn>,
    pub display_memalloc: Option<display_memalloc_fn>,
    pub display_memfree: Option<display_memfree_fn>,
    pub display_separation: Option<display_separation_fn>,
}

// gs_arg_encoding
pub const GS_ARG_ENCODING_LOCAL: c_int = 0;
pub const GS_ARG_ENCODING_UTF8: c_int = 1;
pub const GS_ARG_ENCODING_UTF16LE: c_int = 2;

// gs_set_param_type
pub type gs_set_param_type = c_int;
pub const GS_SPT_INVALID: gs_set_param_type = -1;
pub const GS_SPT_NULL: gs_set_param_type = 0;
pub const GS_SPT_BOOL: gs_set_param_type = 1;
pub const GS_SPT_INT: gs_set_param_type = 2;
pub const GS_SPT_FLOAT: gs_set_param_type = 3;
pub const GS_SPT_NAME: gs_set_param_type = 4;
pub const GS_SPT_STRING: gs_set_param_type = 5;
pub const GS_SPT_LONG: gs_set_param_type = 6;
pub const GS_SPT_I64: gs_set_param_type = 7;
pub const GS_SPT_SIZE_T: gs_set_param_type = 8;

// Control path permit types
pub const GS_PERMIT_FILE_READING: c_int = 0;
pub const GS_PERMIT_FILE_WRITING: c_int = 1;
pub const GS_PERMIT_FILE_CONTROL: c_int = 2;

// Entry point signatures
pub type gsapi_revision_fn = unsafe extern "system" fn(
    pr: *mut gsapi_revision_t,
    len: c_int,
) -> c_int;
pub type gsapi_new_instance_fn = unsafe extern "system" fn(
    pinstance: *mut *mut c_void,
    caller_handle: *mut c_void,
) -> c_int;
pub type gsapi_delete_instance_fn = unsafe extern "system" fn(instance: *mut c_void);
pub type gsapi_set_stdio_fn = unsafe extern "system" fn(
    instance: *mut c_void,
    stdin_fn: Option<stdin_fn>,
    stdout_fn: Option<stdout_fn>,
    stderr_fn: Option<stdout_fn>,
) -> c_int;
pub type gsapi_set_poll_fn = unsafe extern "system" fn(
    instance: *mut c_void,
    poll_fn: Option<poll_fn>,
) -> c_int;
pub type gsapi_set_display_callback_fn = unsafe extern "system" fn(
    instance: *mut c_void,
    callback: *mut display_callback,
) -> c_int;
pub type gsapi_set_default_device_list_fn = unsafe extern "system" fn(
    instance: *mut c_void,
    list: *const c_char,
    listlen: c_int,
) -> c_int;
pub type gsapi_get_default_device_list_fn = unsafe extern "system" fn(
    instance: *mut c_void,
    list: *mut *mut c_char,
    listlen: *mut c_int,
) -> c_int;
pub type gsapi_set_arg_encoding_fn = unsafe extern "system" fn(
    instance: *mut c_void,
    encoding: c_int,
) -> c_int;
pub type gsapi_init_with_args_fn = unsafe extern "system" fn(
    instance: *mut c_void,
    argc: c_int,
    argv: *mut *mut c_char,
) -> c_int;
pub type gsapi_run_string_begin_fn = unsafe extern "system" fn(
    instance: *mut c_void,
    user_errors: c_int,
    pexit_code: *mut c_int,
) -> c_int;
pub type gsapi_run_string_continue_fn = unsafe extern "system" fn(
    instance: *mut c_void,
    str: *const c_char,
    length: c_uint,
    user_errors: c_int,
    pexit_code: *mut c_int,
) -> c_int;
pub type gsapi_run_string_end_fn = unsafe extern "system" fn(
    instance: *mut c_void,
    user_errors: c_int,
    pexit_code: *mut c_int,
) -> c_int;
pub type gsapi_run_string_with_length_fn = unsafe extern "system" fn(
    instance: *mut c_void,
    str: *const c_char,
    length: c_uint,
    user_errors: c_int,
    pexit_code: *mut c_int,
) -> c_int;
pub type gsapi_run_file_fn = unsafe extern "system" fn(
    instance: *mut c_void,
    file_name: *const c_char,
    user_errors: c_int,
    pexit_code: *mut c_int,
) -> c_int;
pub type gsapi_exit_fn = unsafe extern "system" fn(instance: *mut c_void) -> c_int;
pub type gsapi_set_param_fn = unsafe extern "system" fn(
    instance: *mut c_void,
    param: *const c_char,
    value: *const c_void,
    type_: gs_set_param_type,
) -> c_int;
pub type gsapi_get_param_fn = unsafe extern "system" fn(
    instance: *mut c_void,
    param: *const c_char,
    value: *mut c_void,
    type_: gs_set_param_type,
) -> c_int;
pub type gsapi_add_control_path_fn = unsafe extern "system" fn(
    instance: *mut c_void,
    type_: c_int,
    path: *const c_char,
) -> c_int;
pub type gsapi_remove_control_path_fn = unsafe extern "system" fn(
    instance: *mut c_void,
    type_: c_int,
    path: *const c_char,
) -> c_int;
pub type gsapi_purge_control_paths_fn = unsafe extern "system" fn(
    instance: *mut c_void,
    type_: c_int,
);
pub type gsapi_activate_path_control_fn = unsafe extern "system" fn(
    instance: *mut c_void,
    enable: c_int,
);
pub type gsapi_is_path_control_active_fn = unsafe extern "system" fn(
    instance: *mut c_void,
) -> c_int;
