//! Status codes and the typed error returned by every fallible operation
//!
//! The native library reports failures as negative `int` status codes
//! (`base/gserrors.h`). Each code maps to a fixed symbolic name and a short
//! description; the lookup is total, so an unknown code still produces a
//! usable error value.

use std::fmt;
use std::os::raw::c_int;

/// Result type for bridge operations
pub type Result<T> = std::result::Result<T, GsError>;

/// Description used for any status the table does not know about
pub const UNRECOGNIZED_DESCRIPTION: &str = "unrecognized error code";

// (code, symbolic name, description)
const STATUS_TABLE: &[(c_int, &str, &str)] = &[
    (0, "ok", "ok"),
    (-1, "unknownerror", "unknown error"),
    (-2, "dictfull", "dict full"),
    (-3, "dictstackoverflow", "dict stack overflow"),
    (-4, "dictstackunderflow", "dict stack underflow"),
    (-5, "execstackoverflow", "exec stack overflow"),
    (-6, "interrupt", "interrupt"),
    (-7, "invalidaccess", "invalid access"),
    (-8, "invalidexit", "invalid exit"),
    (-9, "invalidfileaccess", "invalid fileaccess"),
    (-10, "invalidfont", "invalid font"),
    (-11, "invalidrestore", "invalid restore"),
    (-12, "ioerror", "ioerror"),
    (-13, "limitcheck", "limit check"),
    (-14, "nocurrentpoint", "no current point"),
    (-15, "rangecheck", "range check"),
    (-16, "stackoverflow", "stack overflow"),
    (-17, "stackunderflow", "stack underflow"),
    (-18, "syntaxerror", "syntax error"),
    (-19, "timeout", "timeout"),
    (-20, "typecheck", "type check"),
    (-21, "undefined", "undefined"),
    (-22, "undefinedfilename", "undefined filename"),
    (-23, "undefinedresult", "undefined result"),
    (-24, "unmatchedmark", "unmatched mark"),
    (-25, "VMerror", "VMerror"),
    (-26, "configurationerror", "configuration error"),
    (-27, "undefinedresource", "undefined resource"),
    (-28, "unregistered", "unregistered"),
    (-29, "invalidcontext", "invalid context"),
    (-30, "invalidid", "invalid id"),
    (-99, "hit_detected", "hit detected"),
    (-100, "Fatal", "Fatal"),
    (-101, "Quit", "Quit"),
    (-102, "InterpreterExit", "Interpreter Exit"),
    (-103, "Remap_Color", "Remap Color"),
    (-104, "ExecStackUnderflow", "Exec Stack Underflow"),
    (-105, "VMreclaim", "VM reclaim"),
    (-106, "NeedInput", "Need Input"),
    (-107, "NeedFile", "Need File"),
    (-110, "Info", "Info"),
    (-111, "handled", "handled"),
];

/// A native status code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorCode(c_int);

impl ErrorCode {
    pub const OK: ErrorCode = ErrorCode(0);
    pub const UNKNOWN_ERROR: ErrorCode = ErrorCode(-1);
    pub const RANGE_CHECK: ErrorCode = ErrorCode(-15);
    pub const TYPE_CHECK: ErrorCode = ErrorCode(-20);
    pub const UNDEFINED: ErrorCode = ErrorCode(-21);
    pub const VM_ERROR: ErrorCode = ErrorCode(-25);
    pub const FATAL: ErrorCode = ErrorCode(-100);
    pub const QUIT: ErrorCode = ErrorCode(-101);
    pub const INTERPRETER_EXIT: ErrorCode = ErrorCode(-102);
    pub const NEED_INPUT: ErrorCode = ErrorCode(-106);
    pub const NEED_FILE: ErrorCode = ErrorCode(-107);

    /// Wrap a raw status value
    pub const fn new(value: c_int) -> Self {
        Self(value)
    }

    /// The raw status value
    pub const fn value(self) -> c_int {
        self.0
    }

    fn entry(self) -> Option<&'static (c_int, &'static str, &'static str)> {
        STATUS_TABLE.iter().find(|(code, _, _)| *code == self.0)
    }

    /// True if the code is present in the status table
    pub fn is_known(self) -> bool {
        self.entry().is_some()
    }

    /// Symbolic name as spelled in `gserrors.h`, or `"unrecognized"`
    pub fn name(self) -> &'static str {
        self.entry().map(|(_, name, _)| *name).unwrap_or("unrecognized")
    }

    /// Human-readable description; never fails, even for unknown codes
    pub fn description(self) -> &'static str {
        self.entry()
            .map(|(_, _, desc)| *desc)
            .unwrap_or(UNRECOGNIZED_DESCRIPTION)
    }

    /// Codes that signal a control-flow condition rather than a failure.
    ///
    /// `NeedInput` is expected while feeding input incrementally; `Quit` and
    /// `InterpreterExit` mark a normal early end of interpretation.
    pub fn is_control_flow(self) -> bool {
        matches!(self, Self::NEED_INPUT | Self::QUIT | Self::INTERPRETER_EXIT)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.0, self.description())
    }
}

// Lets handlers return a specific status through `anyhow`
impl std::error::Error for ErrorCode {}

impl From<c_int> for ErrorCode {
    fn from(value: c_int) -> Self {
        Self(value)
    }
}

/// Errors that can occur while talking to the native library
#[derive(Debug, thiserror::Error)]
pub enum GsError {
    #[error("Ghostscript exception {0}")]
    Native(ErrorCode),

    #[error("Failed to load Ghostscript library: {0}")]
    Library(#[from] libloading::Error),

    #[error("Library returned a null instance handle")]
    NullInstance,

    #[error("Entry point not provided by the loaded library: {0}")]
    Unsupported(&'static str),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl GsError {
    /// The native status code, if this error came from the library
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            GsError::Native(code) => Some(*code),
            _ => None,
        }
    }

    /// See [`ErrorCode::is_control_flow`]
    pub fn is_control_flow(&self) -> bool {
        self.code().is_some_and(ErrorCode::is_control_flow)
    }

    /// True for `Quit`, which the interpreter returns after a `quit` operator
    pub fn is_quit(&self) -> bool {
        self.code() == Some(ErrorCode::QUIT)
    }

    /// True for `Quit` and `InterpreterExit`: interpretation ended normally
    /// and the instance only needs `exit` before it is deleted.
    pub fn is_normal_exit(&self) -> bool {
        matches!(self.code(), Some(ErrorCode::QUIT | ErrorCode::INTERPRETER_EXIT))
    }
}

/// Convert a native status into a `Result`; negative values are errors
pub(crate) fn check(status: c_int) -> Result<c_int> {
    if status < 0 {
        Err(GsError::Native(ErrorCode(status)))
    } else {
        Ok(status)
    }
}
