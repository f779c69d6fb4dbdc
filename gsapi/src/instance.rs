//! Engine instance
//!
//! An [`Instance`] wraps one native interpreter session. Every caller-facing
//! operation maps to exactly one `gsapi_*` entry point, converts text into the
//! encoding the library expects and turns a negative status into a
//! [`GsError`].
//!
//! The instance owns the callback registry whose address is the native caller
//! handle. Deleting the instance (explicitly with [`Instance::delete`] or
//! implicitly on drop) first deletes the native session and then releases
//! every retained handler, so no trampoline can reach a handler afterwards.

use std::ffi::CString;
use std::os::raw::{c_char, c_int, c_uint, c_void};
use std::path::Path;
use std::ptr::{self, NonNull};
use std::sync::Arc;

use crate::callbacks::{
    poll_trampoline, replace, stderr_trampoline, stdin_trampoline, stdout_trampoline,
    CallbackRegistry, InputSource, OutputSink, PollHandler, Registration, Slot,
};
use crate::config::InstanceConfig;
use crate::display::{DisplayHandler, DisplayRegistration};
use crate::encoding::{decode_latin1, encode_arg, encode_latin1};
use crate::error::{check, ErrorCode, GsError, Result};
use crate::ffi;
use crate::library::GsLibrary;
use crate::types::{ArgEncoding, Continuation, ParamKind, ParamValue, PermitKind};

/// One interpreter session
pub struct Instance {
    library: Arc<GsLibrary>,
    raw: Option<NonNull<c_void>>,
    registry: Arc<CallbackRegistry>,
    encoding: ArgEncoding,
    last_exit_code: i32,
}

// SAFETY: the native instance may be driven from any single thread at a time;
// `Instance` is not `Sync` and every native call takes `&mut self`.
unsafe impl Send for Instance {}

impl Instance {
    /// Create a new native instance (`gsapi_new_instance`)
    pub fn new(library: &Arc<GsLibrary>) -> Result<Self> {
        let registry = Arc::new(CallbackRegistry::default());
        let caller_handle = Arc::as_ptr(&registry) as *mut c_void;

        let mut raw: *mut c_void = ptr::null_mut();
        check(unsafe { (library.api().new_instance)(&mut raw, caller_handle) })?;
        let raw = NonNull::new(raw).ok_or(GsError::NullInstance)?;

        log::info!("Created Ghostscript instance {:p}", raw);
        Ok(Self {
            library: Arc::clone(library),
            raw: Some(raw),
            registry,
            encoding: ArgEncoding::default(),
            last_exit_code: 0,
        })
    }

    /// Delete the native instance and release every retained callback
    pub fn delete(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(raw) = self.raw.take() {
            unsafe { (self.library.api().delete_instance)(raw.as_ptr()) };
            log::info!("Deleted Ghostscript instance {:p}", raw);
        }
        // Unconditionally, so nothing stays reachable through the registry
        self.registry.clear();
    }

    fn handle(&self) -> *mut c_void {
        self.raw.map_or(ptr::null_mut(), NonNull::as_ptr)
    }

    /// The library this instance was created from
    pub fn library(&self) -> &Arc<GsLibrary> {
        &self.library
    }

    /// Current argument encoding
    pub fn arg_encoding(&self) -> ArgEncoding {
        self.encoding
    }

    /// Exit code reported by the most recent run call
    pub fn last_exit_code(&self) -> i32 {
        self.last_exit_code
    }

    /// True if a handler is currently retained for `slot`
    pub fn is_registered(&self, slot: Slot) -> bool {
        self.registry.is_bound(slot)
    }

    // ---------------------------------------------------------------------
    // Callback registration
    // ---------------------------------------------------------------------

    /// Bind or unset one callback slot.
    ///
    /// The new handler replaces the retained one only if the native
    /// registration call succeeds; on failure the previous handler stays
    /// active and the new one is dropped.
    pub fn register(&mut self, registration: Registration) -> Result<()> {
        let slot = registration.slot();
        let set = registration.is_set();

        match registration {
            Registration::Stdin(source) => {
                let stdout = self.is_registered(Slot::Stdout);
                let stderr = self.is_registered(Slot::Stderr);
                self.install_stdio(source.is_some(), stdout, stderr)?;
                drop(replace(&self.registry.stdin, source));
            }
            Registration::Stdout(sink) => {
                let stdin = self.is_registered(Slot::Stdin);
                let stderr = self.is_registered(Slot::Stderr);
                self.install_stdio(stdin, sink.is_some(), stderr)?;
                drop(replace(&self.registry.stdout, sink));
            }
            Registration::Stderr(sink) => {
                let stdin = self.is_registered(Slot::Stdin);
                let stdout = self.is_registered(Slot::Stdout);
                self.install_stdio(stdin, stdout, sink.is_some())?;
                drop(replace(&self.registry.stderr, sink));
            }
            Registration::Poll(handler) => {
                let poll = handler.is_some().then_some(poll_trampoline as ffi::poll_fn);
                check(unsafe { (self.library.api().set_poll)(self.handle(), poll) })?;
                drop(replace(&self.registry.poll, handler));
            }
            Registration::Display(handler) => {
                let mut registration = handler.map(DisplayRegistration::new);
                let block = registration
                    .as_mut()
                    .map_or(ptr::null_mut(), DisplayRegistration::block_ptr);
                check(unsafe { (self.library.api().set_display_callback)(self.handle(), block) })?;
                // The block is boxed, so moving the registration keeps its address
                drop(replace(&self.registry.display, registration));
            }
        }

        log::debug!("{} {} callback", if set { "Registered" } else { "Unset" }, slot);
        Ok(())
    }

    /// Bind all three standard I/O slots in one native call
    pub fn set_stdio(
        &mut self,
        stdin: Option<Box<dyn InputSource>>,
        stdout: Option<Box<dyn OutputSink>>,
        stderr: Option<Box<dyn OutputSink>>,
    ) -> Result<()> {
        self.install_stdio(stdin.is_some(), stdout.is_some(), stderr.is_some())?;

        drop(replace(&self.registry.stdin, stdin));
        drop(replace(&self.registry.stdout, stdout));
        drop(replace(&self.registry.stderr, stderr));
        log::debug!("Registered stdio callbacks");
        Ok(())
    }

    fn install_stdio(&mut self, stdin: bool, stdout: bool, stderr: bool) -> Result<()> {
        let stdin = stdin.then_some(stdin_trampoline as ffi::stdin_fn);
        let stdout = stdout.then_some(stdout_trampoline as ffi::stdout_fn);
        let stderr = stderr.then_some(stderr_trampoline as ffi::stdout_fn);

        check(unsafe { (self.library.api().set_stdio)(self.handle(), stdin, stdout, stderr) })?;
        Ok(())
    }

    /// Bind or unset the poll callback
    pub fn set_poll(&mut self, handler: Option<Box<dyn PollHandler>>) -> Result<()> {
        self.register(Registration::Poll(handler))
    }

    /// Bind or unset the display device callbacks
    pub fn set_display_callback(&mut self, handler: Option<Box<dyn DisplayHandler>>) -> Result<()> {
        self.register(Registration::Display(handler))
    }

    // ---------------------------------------------------------------------
    // Devices and encoding
    // ---------------------------------------------------------------------

    /// Set the list of devices tried when none is selected
    pub fn set_default_device_list(&mut self, list: &str) -> Result<()> {
        let len = c_int::try_from(list.len())
            .map_err(|_| GsError::InvalidArgument("device list too long".to_string()))?;

        check(unsafe {
            (self.library.api().set_default_device_list)(self.handle(), list.as_ptr().cast(), len)
        })?;
        Ok(())
    }

    /// Read the default device list (decoded as Latin-1)
    pub fn default_device_list(&mut self) -> Result<String> {
        let mut list: *mut c_char = ptr::null_mut();
        let mut len: c_int = 0;

        let get_list = self.library.api().get_default_device_list;
        check(unsafe { get_list(self.handle(), &mut list, &mut len) })?;

        let len = usize::try_from(len).unwrap_or(0);
        if list.is_null() || len == 0 {
            return Ok(String::new());
        }
        let bytes = unsafe { std::slice::from_raw_parts(list.cast::<u8>(), len) };
        Ok(decode_latin1(bytes))
    }

    /// Select the encoding of subsequent text arguments
    pub fn set_arg_encoding(&mut self, encoding: ArgEncoding) -> Result<()> {
        let set_encoding = self.library.api().set_arg_encoding;
        check(unsafe { set_encoding(self.handle(), encoding.as_native()) })?;
        self.encoding = encoding;
        log::debug!("Argument encoding set to {:?}", encoding);
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Running
    // ---------------------------------------------------------------------

    /// `-sDisplayHandle` argument naming this instance's callback registry.
    ///
    /// The display device passes its `DisplayHandle` parameter, not the
    /// instance's caller handle, as the first argument of every display
    /// callback; it is null unless set. [`Instance::init_with_args`] adds
    /// this argument while a display handler is registered.
    pub fn display_handle_arg(&self) -> String {
        format!("-sDisplayHandle=16#{:x}", Arc::as_ptr(&self.registry) as usize)
    }

    /// Initialise the interpreter with an argument vector (`argv[0]` included).
    ///
    /// With a display handler registered and no `DisplayHandle` among `args`,
    /// [`Instance::display_handle_arg`] is inserted after `argv[0]`.
    pub fn init_with_args<S: AsRef<str>>(&mut self, args: &[S]) -> Result<()> {
        let handle_arg = self.display_handle_arg();
        let mut args: Vec<&str> = args.iter().map(AsRef::<str>::as_ref).collect();
        let has_handle = args.iter().any(|arg| names_display_handle(arg));
        if self.is_registered(Slot::Display) && !args.is_empty() && !has_handle {
            args.insert(1, &handle_arg);
        }

        let encoded = args
            .iter()
            .map(|arg| encode_arg(arg, self.encoding))
            .collect::<Result<Vec<Vec<u8>>>>()?;

        let mut argv: Vec<*mut c_char> = encoded
            .iter()
            .map(|arg| arg.as_ptr() as *mut c_char)
            .collect();
        argv.push(ptr::null_mut());

        let argc = c_int::try_from(encoded.len())
            .map_err(|_| GsError::InvalidArgument("too many arguments".to_string()))?;

        log::debug!("Initialising with {} argument(s)", argc);
        let init = self.library.api().init_with_args;
        check(unsafe { init(self.handle(), argc, argv.as_mut_ptr()) })?;
        Ok(())
    }

    /// Start feeding input incrementally; returns the exit code
    pub fn run_string_begin(&mut self, user_errors: i32) -> Result<i32> {
        let mut exit_code: c_int = 0;
        let begin = self.library.api().run_string_begin;
        let status = unsafe { begin(self.handle(), user_errors, &mut exit_code) };
        self.last_exit_code = exit_code;
        check(status)?;
        Ok(exit_code)
    }

    /// Feed one chunk of input.
    ///
    /// `NeedInput` from the library is the normal state between chunks and is
    /// reported as [`Continuation::NeedInput`]. An empty chunk is not passed
    /// to the library (which would take it as end of input) and leaves the
    /// exit code unchanged.
    pub fn run_string_continue(&mut self, chunk: &[u8], user_errors: i32) -> Result<Continuation> {
        if chunk.is_empty() {
            log::debug!("Ignoring empty input chunk");
            return Ok(Continuation::Accepted {
                exit_code: self.last_exit_code,
            });
        }

        let length = c_uint::try_from(chunk.len()).map_err(|_| {
            GsError::InvalidArgument(format!("chunk of {} bytes is too large", chunk.len()))
        })?;
        let mut exit_code: c_int = 0;
        let status = unsafe {
            (self.library.api().run_string_continue)(
                self.handle(),
                chunk.as_ptr().cast(),
                length,
                user_errors,
                &mut exit_code,
            )
        };
        self.last_exit_code = exit_code;

        if status == ErrorCode::NEED_INPUT.value() {
            return Ok(Continuation::NeedInput { exit_code });
        }
        check(status)?;
        Ok(Continuation::Accepted { exit_code })
    }

    /// Finish incremental input; returns the exit code
    pub fn run_string_end(&mut self, user_errors: i32) -> Result<i32> {
        let mut exit_code: c_int = 0;
        let end = self.library.api().run_string_end;
        let status = unsafe { end(self.handle(), user_errors, &mut exit_code) };
        self.last_exit_code = exit_code;
        check(status)?;
        Ok(exit_code)
    }

    /// Run a complete program. Passed by length, so it may contain zero bytes.
    pub fn run_string(&mut self, program: impl AsRef<[u8]>, user_errors: i32) -> Result<i32> {
        let program = program.as_ref();
        let length = c_uint::try_from(program.len()).map_err(|_| {
            GsError::InvalidArgument(format!("program of {} bytes is too large", program.len()))
        })?;

        let mut exit_code: c_int = 0;
        let status = unsafe {
            (self.library.api().run_string_with_length)(
                self.handle(),
                program.as_ptr().cast(),
                length,
                user_errors,
                &mut exit_code,
            )
        };
        self.last_exit_code = exit_code;
        check(status)?;
        Ok(exit_code)
    }

    /// Run the first `length` bytes of `program`
    pub fn run_string_with_length(
        &mut self,
        program: &[u8],
        length: usize,
        user_errors: i32,
    ) -> Result<i32> {
        let program = program.get(..length).ok_or_else(|| {
            GsError::InvalidArgument(format!(
                "length {} exceeds program size {}",
                length,
                program.len()
            ))
        })?;
        self.run_string(program, user_errors)
    }

    /// Run a file; the name is encoded with the current argument encoding
    pub fn run_file(&mut self, path: impl AsRef<Path>, user_errors: i32) -> Result<i32> {
        let path = path.as_ref();
        let name = self.encode_path(path)?;

        log::debug!("Running file: {:?}", path);
        let mut exit_code: c_int = 0;
        let run_file = self.library.api().run_file;
        let status =
            unsafe { run_file(self.handle(), name.as_ptr().cast(), user_errors, &mut exit_code) };
        self.last_exit_code = exit_code;
        check(status)?;
        Ok(exit_code)
    }

    /// Shut the interpreter down (`gsapi_exit`)
    pub fn exit(&mut self) -> Result<()> {
        check(unsafe { (self.library.api().exit)(self.handle()) })?;
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Parameters
    // ---------------------------------------------------------------------

    /// Set a typed device parameter; name and string values are Latin-1
    pub fn set_param(&mut self, name: &str, value: impl Into<ParamValue>) -> Result<()> {
        let set_param = self
            .library
            .api()
            .set_param
            .ok_or(GsError::Unsupported("gsapi_set_param"))?;
        let value = value.into();
        let c_name = encode_latin1(name)?;
        let kind = value.kind().as_native();

        let handle = self.handle();
        let status = match &value {
            ParamValue::Bool(v) => {
                let v = c_int::from(*v);
                unsafe { set_param(handle, c_name.as_ptr(), (&v as *const c_int).cast(), kind) }
            }
            ParamValue::Int(v) => unsafe {
                set_param(handle, c_name.as_ptr(), (v as *const i64).cast(), kind)
            },
            ParamValue::Float(v) => unsafe {
                set_param(handle, c_name.as_ptr(), (v as *const f32).cast(), kind)
            },
            ParamValue::String(v) => {
                let v: CString = encode_latin1(v)?;
                unsafe { set_param(handle, c_name.as_ptr(), v.as_ptr().cast(), kind) }
            }
        };

        check(status)?;
        log::debug!("Set parameter {} = {}", name, value);
        Ok(())
    }

    /// Read a device parameter back as `kind`
    pub fn get_param(&mut self, name: &str, kind: ParamKind) -> Result<ParamValue> {
        let get_param = self
            .library
            .api()
            .get_param
            .ok_or(GsError::Unsupported("gsapi_get_param"))?;
        let c_name = encode_latin1(name)?;
        let tag = kind.as_native();
        let handle = self.handle();
        let param = c_name.as_ptr();

        let value = match kind {
            ParamKind::Bool => {
                let mut v: c_int = 0;
                check(unsafe { get_param(handle, param, (&mut v as *mut c_int).cast(), tag) })?;
                ParamValue::Bool(v != 0)
            }
            ParamKind::Int => {
                let mut v: i64 = 0;
                check(unsafe { get_param(handle, param, (&mut v as *mut i64).cast(), tag) })?;
                ParamValue::Int(v)
            }
            ParamKind::Float => {
                let mut v: f32 = 0.0;
                check(unsafe { get_param(handle, param, (&mut v as *mut f32).cast(), tag) })?;
                ParamValue::Float(v)
            }
            ParamKind::String => {
                // First call with a null buffer reports the size needed
                let size = check(unsafe { get_param(handle, param, ptr::null_mut(), tag) })?;
                let mut buf = vec![0u8; usize::try_from(size).unwrap_or(0)];
                if !buf.is_empty() {
                    check(unsafe { get_param(handle, param, buf.as_mut_ptr().cast(), tag) })?;
                }
                let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
                ParamValue::String(decode_latin1(&buf[..end]))
            }
        };

        Ok(value)
    }

    // ---------------------------------------------------------------------
    // Control paths
    // ---------------------------------------------------------------------

    /// Permit access of `kind` to `path`
    pub fn add_control_path(&mut self, kind: PermitKind, path: &str) -> Result<()> {
        let add = self
            .library
            .api()
            .add_control_path
            .ok_or(GsError::Unsupported("gsapi_add_control_path"))?;
        let path_bytes = encode_arg(path, self.encoding)?;

        check(unsafe { add(self.handle(), kind.as_native(), path_bytes.as_ptr().cast()) })?;
        log::debug!("Added {:?} control path: {}", kind, path);
        Ok(())
    }

    /// Withdraw a previously added control path
    pub fn remove_control_path(&mut self, kind: PermitKind, path: &str) -> Result<()> {
        let remove = self
            .library
            .api()
            .remove_control_path
            .ok_or(GsError::Unsupported("gsapi_remove_control_path"))?;
        let path_bytes = encode_arg(path, self.encoding)?;

        check(unsafe { remove(self.handle(), kind.as_native(), path_bytes.as_ptr().cast()) })?;
        Ok(())
    }

    /// Remove every control path of `kind`
    pub fn purge_control_paths(&mut self, kind: PermitKind) -> Result<()> {
        let purge = self
            .library
            .api()
            .purge_control_paths
            .ok_or(GsError::Unsupported("gsapi_purge_control_paths"))?;

        unsafe { purge(self.handle(), kind.as_native()) };
        Ok(())
    }

    /// Enable or disable enforcement of the control paths
    pub fn activate_path_control(&mut self, enable: bool) -> Result<()> {
        let activate = self
            .library
            .api()
            .activate_path_control
            .ok_or(GsError::Unsupported("gsapi_activate_path_control"))?;

        unsafe { activate(self.handle(), c_int::from(enable)) };
        Ok(())
    }

    /// Whether control paths are currently enforced
    pub fn is_path_control_active(&mut self) -> Result<bool> {
        let is_active = self
            .library
            .api()
            .is_path_control_active
            .ok_or(GsError::Unsupported("gsapi_is_path_control_active"))?;

        let status = check(unsafe { is_active(self.handle()) })?;
        Ok(status != 0)
    }

    // ---------------------------------------------------------------------
    // Configuration
    // ---------------------------------------------------------------------

    /// Apply an [`InstanceConfig`].
    ///
    /// Order: argument encoding, default device list, control paths,
    /// initialisation arguments, parameters, path-control activation.
    pub fn configure(&mut self, config: &InstanceConfig) -> Result<()> {
        if let Some(encoding) = config.arg_encoding {
            self.set_arg_encoding(encoding)?;
        }

        if let Some(list) = &config.default_device_list {
            self.set_default_device_list(list)?;
        }

        for (kind, path) in config.control_paths.iter() {
            self.add_control_path(kind, path)?;
        }

        if !config.args.is_empty() {
            self.init_with_args(config.args.as_slice())?;
        }

        for (name, value) in &config.params {
            self.set_param(name, value.clone())?;
        }

        if let Some(enable) = config.path_control {
            self.activate_path_control(enable)?;
        }

        log::debug!("Instance configured");
        Ok(())
    }

    fn encode_path(&self, path: &Path) -> Result<Vec<u8>> {
        let text = path
            .to_str()
            .ok_or_else(|| GsError::Encoding(format!("path is not valid Unicode: {:?}", path)))?;
        encode_arg(text, self.encoding)
    }
}

fn names_display_handle(arg: &str) -> bool {
    arg.starts_with("-sDisplayHandle=") || arg.starts_with("-dDisplayHandle=")
}

impl Drop for Instance {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("raw", &self.raw)
            .field("encoding", &self.encoding)
            .field("last_exit_code", &self.last_exit_code)
            .finish_non_exhaustive()
    }
}
