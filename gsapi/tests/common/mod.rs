//! In-process stand-in for the native interpreter library.
//!
//! Implements every entry point with the native calling convention and keeps
//! per-instance state behind the instance handle. Programs are not
//! interpreted; a few `%directive` prefixes drive the registered callbacks:
//!
//! - `%stderr <text>` writes `<text>` to stderr
//! - `%stdin` reads stdin to end of input and echoes it to stdout
//! - `%poll` calls the poll callback and returns its status
//! - `%display` runs one open/size/page/close cycle on the display device,
//!   passing the `-sDisplayHandle=16#<hex>` value given to init as the handle
//! - `%args` / `%paths` / `%encoding` echo the recorded state to stdout
//! - `%quit` returns `Quit`
//!
//! Anything else is echoed to stdout unchanged. Setting the boolean parameter
//! `FailRegistration` makes callback registration fail with `rangecheck`.

#![allow(dead_code)]

use std::collections::HashMap;
use std::ffi::CStr;
use std::os::raw::{c_char, c_int, c_uint, c_void};
use std::ptr;
use std::sync::Arc;

use gsapi::ffi;
use gsapi::{GsLibrary, NativeApi};

pub const MOCK_PRODUCT: &str = "Mock Ghostscript";
pub const MOCK_REVISION: i64 = 10020;
pub const MOCK_REVISION_DATE: i64 = 20230913;

pub const RANGECHECK: c_int = -15;
pub const TYPECHECK: c_int = -20;
pub const UNDEFINED: c_int = -21;
pub const UNDEFINED_FILENAME: c_int = -22;
pub const QUIT: c_int = -101;
pub const NEED_INPUT: c_int = -106;

pub const DISPLAY_WIDTH: c_int = 3;
pub const DISPLAY_HEIGHT: c_int = 2;
pub const DISPLAY_RASTER: c_int = 12;

#[derive(Debug, Clone)]
enum StoredParam {
    Bool(bool),
    Int(i64),
    Float(f32),
    String(Vec<u8>),
}

struct MockInstance {
    caller_handle: *mut c_void,
    stdin: Option<ffi::stdin_fn>,
    stdout: Option<ffi::stdout_fn>,
    stderr: Option<ffi::stdout_fn>,
    poll: Option<ffi::poll_fn>,
    display: *mut ffi::display_callback,
    // DisplayHandle parameter from init; the device passes it to display callbacks
    display_handle: *mut c_void,
    image: Vec<u8>,
    device_list: Vec<u8>,
    encoding: c_int,
    args: Vec<String>,
    params: HashMap<String, StoredParam>,
    control_paths: Vec<(c_int, String)>,
    path_control: bool,
    pending: Vec<u8>,
}

impl MockInstance {
    fn new(caller_handle: *mut c_void) -> Self {
        Self {
            caller_handle,
            stdin: None,
            stdout: None,
            stderr: None,
            poll: None,
            display: ptr::null_mut(),
            display_handle: ptr::null_mut(),
            image: vec![0u8; (DISPLAY_RASTER * DISPLAY_HEIGHT) as usize],
            device_list: b"display bbox".to_vec(),
            encoding: ffi::GS_ARG_ENCODING_LOCAL,
            args: Vec::new(),
            params: HashMap::new(),
            control_paths: Vec::new(),
            path_control: false,
            pending: Vec::new(),
        }
    }

    fn registration_fails(&self) -> bool {
        matches!(self.params.get("FailRegistration"), Some(StoredParam::Bool(true)))
    }

    fn decode(&self, ptr: *const c_char) -> String {
        unsafe {
            if self.encoding == ffi::GS_ARG_ENCODING_UTF16LE {
                let mut units = Vec::new();
                let mut p = ptr as *const u8;
                loop {
                    let unit = u16::from_le_bytes([*p, *p.add(1)]);
                    if unit == 0 {
                        break;
                    }
                    units.push(unit);
                    p = p.add(2);
                }
                String::from_utf16_lossy(&units)
            } else {
                CStr::from_ptr(ptr).to_string_lossy().into_owned()
            }
        }
    }

    /// Write all of `data` through an output callback, honouring partial
    /// consumption. Returns the first negative callback status.
    fn write(&self, callback: Option<ffi::stdout_fn>, data: &[u8]) -> c_int {
        let Some(callback) = callback else {
            return 0;
        };
        let mut rest = data;
        while !rest.is_empty() {
            let written = unsafe { callback(self.caller_handle, rest.as_ptr().cast(), rest.len() as c_int) };
            if written < 0 {
                return written;
            }
            if written == 0 {
                break;
            }
            rest = &rest[(written as usize).min(rest.len())..];
        }
        0
    }

    fn read_stdin(&self) -> Result<Vec<u8>, c_int> {
        let Some(callback) = self.stdin else {
            return Ok(Vec::new());
        };
        let mut collected = Vec::new();
        let mut buf = [0u8; 4];
        loop {
            let n = unsafe { callback(self.caller_handle, buf.as_mut_ptr().cast(), buf.len() as c_int) };
            if n < 0 {
                return Err(n);
            }
            if n == 0 {
                return Ok(collected);
            }
            collected.extend_from_slice(&buf[..n as usize]);
        }
    }

    fn run_display(&mut self) -> c_int {
        let Some(block) = (unsafe { self.display.as_ref() }) else {
            return UNDEFINED;
        };
        let handle = self.display_handle;
        let device = self as *mut MockInstance as *mut c_void;
        for (i, byte) in self.image.iter_mut().enumerate() {
            *byte = i as u8;
        }
        let image = self.image.as_mut_ptr();

        unsafe {
            let steps = [
                block.display_open.map(|f| f(handle, device)),
                block
                    .display_presize
                    .map(|f| f(handle, device, DISPLAY_WIDTH, DISPLAY_HEIGHT, DISPLAY_RASTER, 0)),
                block
                    .display_size
                    .map(|f| f(handle, device, DISPLAY_WIDTH, DISPLAY_HEIGHT, DISPLAY_RASTER, 0, image)),
                block.display_page.map(|f| f(handle, device, 1, 1)),
                block.display_preclose.map(|f| f(handle, device)),
                block.display_close.map(|f| f(handle, device)),
            ];
            steps.into_iter().flatten().find(|&status| status < 0).unwrap_or(0)
        }
    }

    fn run(&mut self, program: &[u8]) -> c_int {
        if let Some(text) = program.strip_prefix(b"%stderr ") {
            return self.write(self.stderr, text);
        }
        match program {
            b"%stdin" => match self.read_stdin() {
                Ok(data) => self.write(self.stdout, &data),
                Err(status) => status,
            },
            b"%poll" => match self.poll {
                Some(poll) => unsafe { poll(self.caller_handle) }.min(0),
                None => 0,
            },
            b"%display" => self.run_display(),
            b"%args" => {
                let text = self.args.join("\n");
                self.write(self.stdout, text.as_bytes())
            }
            b"%paths" => {
                let text: Vec<String> = self
                    .control_paths
                    .iter()
                    .map(|(kind, path)| format!("{}:{}", kind, path))
                    .collect();
                self.write(self.stdout, text.join("\n").as_bytes())
            }
            b"%encoding" => self.write(self.stdout, self.encoding.to_string().as_bytes()),
            b"%quit" => QUIT,
            _ => self.write(self.stdout, program),
        }
    }
}

unsafe fn state<'a>(instance: *mut c_void) -> &'a mut MockInstance {
    &mut *(instance as *mut MockInstance)
}

unsafe extern "system" fn mock_revision(pr: *mut ffi::gsapi_revision_t, len: c_int) -> c_int {
    let size = std::mem::size_of::<ffi::gsapi_revision_t>() as c_int;
    if len < size {
        return size;
    }
    *pr = ffi::gsapi_revision_t {
        product: b"Mock Ghostscript\0".as_ptr().cast(),
        copyright: b"Copyright (C) Mock Contributors\0".as_ptr().cast(),
        revision: MOCK_REVISION as _,
        revisiondate: MOCK_REVISION_DATE as _,
    };
    0
}

unsafe extern "system" fn mock_new_instance(pinstance: *mut *mut c_void, caller_handle: *mut c_void) -> c_int {
    let instance = Box::new(MockInstance::new(caller_handle));
    *pinstance = Box::into_raw(instance).cast();
    0
}

unsafe extern "system" fn mock_delete_instance(instance: *mut c_void) {
    drop(Box::from_raw(instance as *mut MockInstance));
}

unsafe extern "system" fn mock_set_stdio(
    instance: *mut c_void,
    stdin: Option<ffi::stdin_fn>,
    stdout: Option<ffi::stdout_fn>,
    stderr: Option<ffi::stdout_fn>,
) -> c_int {
    let state = state(instance);
    if state.registration_fails() {
        return RANGECHECK;
    }
    state.stdin = stdin;
    state.stdout = stdout;
    state.stderr = stderr;
    0
}

unsafe extern "system" fn mock_set_poll(instance: *mut c_void, poll: Option<ffi::poll_fn>) -> c_int {
    let state = state(instance);
    if state.registration_fails() {
        return RANGECHECK;
    }
    state.poll = poll;
    0
}

unsafe extern "system" fn mock_set_display_callback(
    instance: *mut c_void,
    callback: *mut ffi::display_callback,
) -> c_int {
    let state = state(instance);
    if state.registration_fails() {
        return RANGECHECK;
    }
    state.display = callback;
    0
}

unsafe extern "system" fn mock_set_default_device_list(
    instance: *mut c_void,
    list: *const c_char,
    listlen: c_int,
) -> c_int {
    if listlen < 0 {
        return RANGECHECK;
    }
    state(instance).device_list = std::slice::from_raw_parts(list.cast::<u8>(), listlen as usize).to_vec();
    0
}

unsafe extern "system" fn mock_get_default_device_list(
    instance: *mut c_void,
    list: *mut *mut c_char,
    listlen: *mut c_int,
) -> c_int {
    let state = state(instance);
    *list = state.device_list.as_mut_ptr().cast();
    *listlen = state.device_list.len() as c_int;
    0
}

unsafe extern "system" fn mock_set_arg_encoding(instance: *mut c_void, encoding: c_int) -> c_int {
    if !(ffi::GS_ARG_ENCODING_LOCAL..=ffi::GS_ARG_ENCODING_UTF16LE).contains(&encoding) {
        return RANGECHECK;
    }
    state(instance).encoding = encoding;
    0
}

unsafe extern "system" fn mock_init_with_args(
    instance: *mut c_void,
    argc: c_int,
    argv: *mut *mut c_char,
) -> c_int {
    let state = state(instance);
    if !(*argv.add(argc as usize)).is_null() {
        return RANGECHECK;
    }
    let args: Vec<String> = (0..argc as usize).map(|i| state.decode(*argv.add(i))).collect();
    let handle = args.iter().find_map(|arg| arg.strip_prefix("-sDisplayHandle=16#"));
    if let Some(hex) = handle {
        match usize::from_str_radix(hex, 16) {
            Ok(address) => state.display_handle = address as *mut c_void,
            Err(_) => return RANGECHECK,
        }
    }
    state.args = args;
    0
}

unsafe extern "system" fn mock_run_string_begin(
    instance: *mut c_void,
    _user_errors: c_int,
    pexit_code: *mut c_int,
) -> c_int {
    state(instance).pending.clear();
    *pexit_code = 0;
    0
}

unsafe extern "system" fn mock_run_string_continue(
    instance: *mut c_void,
    str: *const c_char,
    length: c_uint,
    _user_errors: c_int,
    pexit_code: *mut c_int,
) -> c_int {
    *pexit_code = 0;
    // A zero-length chunk is never expected here
    if length == 0 {
        return RANGECHECK;
    }
    let chunk = std::slice::from_raw_parts(str.cast::<u8>(), length as usize);
    state(instance).pending.extend_from_slice(chunk);
    NEED_INPUT
}

unsafe extern "system" fn mock_run_string_end(
    instance: *mut c_void,
    _user_errors: c_int,
    pexit_code: *mut c_int,
) -> c_int {
    let state = state(instance);
    let program = std::mem::take(&mut state.pending);
    let status = state.run(&program);
    *pexit_code = status.min(0);
    status
}

unsafe extern "system" fn mock_run_string_with_length(
    instance: *mut c_void,
    str: *const c_char,
    length: c_uint,
    _user_errors: c_int,
    pexit_code: *mut c_int,
) -> c_int {
    let program = std::slice::from_raw_parts(str.cast::<u8>(), length as usize);
    let status = state(instance).run(program);
    *pexit_code = status.min(0);
    status
}

unsafe extern "system" fn mock_run_file(
    instance: *mut c_void,
    file_name: *const c_char,
    _user_errors: c_int,
    pexit_code: *mut c_int,
) -> c_int {
    let state = state(instance);
    let name = state.decode(file_name);
    let status = match std::fs::read(&name) {
        Ok(program) => state.run(&program),
        Err(_) => UNDEFINED_FILENAME,
    };
    *pexit_code = status.min(0);
    status
}

unsafe extern "system" fn mock_exit(_instance: *mut c_void) -> c_int {
    0
}

unsafe extern "system" fn mock_set_param(
    instance: *mut c_void,
    param: *const c_char,
    value: *const c_void,
    type_: ffi::gs_set_param_type,
) -> c_int {
    let name = CStr::from_ptr(param).to_string_lossy().into_owned();
    let stored = match type_ {
        ffi::GS_SPT_BOOL => StoredParam::Bool(*(value as *const c_int) != 0),
        ffi::GS_SPT_I64 => StoredParam::Int(*(value as *const i64)),
        ffi::GS_SPT_FLOAT => StoredParam::Float(*(value as *const f32)),
        ffi::GS_SPT_STRING => StoredParam::String(CStr::from_ptr(value.cast()).to_bytes().to_vec()),
        _ => return TYPECHECK,
    };
    state(instance).params.insert(name, stored);
    0
}

unsafe extern "system" fn mock_get_param(
    instance: *mut c_void,
    param: *const c_char,
    value: *mut c_void,
    type_: ffi::gs_set_param_type,
) -> c_int {
    let name = CStr::from_ptr(param).to_string_lossy().into_owned();
    let Some(stored) = state(instance).params.get(&name) else {
        return UNDEFINED;
    };
    match (stored, type_) {
        (StoredParam::Bool(v), ffi::GS_SPT_BOOL) => {
            *(value as *mut c_int) = c_int::from(*v);
            0
        }
        (StoredParam::Int(v), ffi::GS_SPT_I64) => {
            *(value as *mut i64) = *v;
            0
        }
        (StoredParam::Float(v), ffi::GS_SPT_FLOAT) => {
            *(value as *mut f32) = *v;
            0
        }
        (StoredParam::String(v), ffi::GS_SPT_STRING) => {
            let size = v.len() as c_int + 1;
            if !value.is_null() {
                let out = value as *mut u8;
                ptr::copy_nonoverlapping(v.as_ptr(), out, v.len());
                *out.add(v.len()) = 0;
            }
            size
        }
        _ => TYPECHECK,
    }
}

unsafe extern "system" fn mock_add_control_path(instance: *mut c_void, type_: c_int, path: *const c_char) -> c_int {
    let state = state(instance);
    let path = state.decode(path);
    state.control_paths.push((type_, path));
    0
}

unsafe extern "system" fn mock_remove_control_path(
    instance: *mut c_void,
    type_: c_int,
    path: *const c_char,
) -> c_int {
    let state = state(instance);
    let path = state.decode(path);
    state.control_paths.retain(|(t, p)| !(*t == type_ && *p == path));
    0
}

unsafe extern "system" fn mock_purge_control_paths(instance: *mut c_void, type_: c_int) {
    state(instance).control_paths.retain(|(t, _)| *t != type_);
}

unsafe extern "system" fn mock_activate_path_control(instance: *mut c_void, enable: c_int) {
    state(instance).path_control = enable != 0;
}

unsafe extern "system" fn mock_is_path_control_active(instance: *mut c_void) -> c_int {
    c_int::from(state(instance).path_control)
}

/// Entry-point table of the mock library
pub fn mock_api() -> NativeApi {
    NativeApi {
        revision: mock_revision,
        new_instance: mock_new_instance,
        delete_instance: mock_delete_instance,
        set_stdio: mock_set_stdio,
        set_poll: mock_set_poll,
        set_display_callback: mock_set_display_callback,
        set_default_device_list: mock_set_default_device_list,
        get_default_device_list: mock_get_default_device_list,
        set_arg_encoding: mock_set_arg_encoding,
        init_with_args: mock_init_with_args,
        run_string_begin: mock_run_string_begin,
        run_string_continue: mock_run_string_continue,
        run_string_end: mock_run_string_end,
        run_string_with_length: mock_run_string_with_length,
        run_file: mock_run_file,
        exit: mock_exit,
        set_param: Some(mock_set_param),
        get_param: Some(mock_get_param),
        add_control_path: Some(mock_add_control_path),
        remove_control_path: Some(mock_remove_control_path),
        purge_control_paths: Some(mock_purge_control_paths),
        activate_path_control: Some(mock_activate_path_control),
        is_path_control_active: Some(mock_is_path_control_active),
    }
}

/// Route library logging through the test harness
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// The mock library with every entry point available
pub fn mock_library() -> Arc<GsLibrary> {
    init_logging();
    unsafe { GsLibrary::from_api(mock_api()) }
}

/// The mock library as an older release without the optional entry points
pub fn legacy_mock_library() -> Arc<GsLibrary> {
    let api = NativeApi {
        set_param: None,
        get_param: None,
        add_control_path: None,
        remove_control_path: None,
        purge_control_paths: None,
        activate_path_control: None,
        is_path_control_active: None,
        ..mock_api()
    };
    unsafe { GsLibrary::from_api(api) }
}

/// Shared byte buffer usable as an output sink
#[derive(Clone, Default)]
pub struct Captured(pub Arc<std::sync::Mutex<Vec<u8>>>);

impl Captured {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }

    pub fn bytes(&self) -> Vec<u8> {
        self.0.lock().unwrap().clone()
    }

    pub fn sink(&self) -> impl FnMut(&[u8]) -> anyhow::Result<Option<usize>> + Send + 'static {
        let buffer = Arc::clone(&self.0);
        move |data: &[u8]| {
            buffer.lock().unwrap().extend_from_slice(data);
            Ok(None)
        }
    }
}
