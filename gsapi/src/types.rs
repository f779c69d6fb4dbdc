//! Caller-facing value types
//!
//! Plain Rust representations of the values that cross the native boundary:
//! revision info, argument encodings, typed parameters, control-path kinds and
//! the outcome of an incremental run.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::os::raw::c_int;

use crate::ffi;

/// Product and version information reported by `gsapi_revision`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    /// Product name, e.g. "GPL Ghostscript"
    pub product: String,
    /// Copyright notice
    pub copyright: String,
    /// Numeric revision, e.g. 10020 for 10.02.0
    pub revision: i64,
    /// Release date as the native `YYYYMMDD` number
    pub revision_date: i64,
}

impl Revision {
    /// Dotted version string derived from the numeric revision
    pub fn version(&self) -> String {
        let major = self.revision / 1000;
        let minor = (self.revision / 10) % 100;
        let patch = self.revision % 10;
        format!("{}.{:02}.{}", major, minor, patch)
    }

    /// Release date, if `revision_date` is a valid `YYYYMMDD` value
    pub fn date(&self) -> Option<NaiveDate> {
        let year = i32::try_from(self.revision_date / 10_000).ok()?;
        let month = u32::try_from((self.revision_date / 100) % 100).ok()?;
        let day = u32::try_from(self.revision_date % 100).ok()?;
        NaiveDate::from_ymd_opt(year, month, day)
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.product, self.version())?;
        if let Some(date) = self.date() {
            write!(f, " ({})", date)?;
        }
        Ok(())
    }
}

/// Encoding of text arguments (init args, file names, control paths)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgEncoding {
    /// The platform's local encoding; treated as UTF-8
    #[default]
    Local,
    Utf8,
    Utf16le,
}

impl ArgEncoding {
    pub(crate) fn as_native(self) -> c_int {
        match self {
            ArgEncoding::Local => ffi::GS_ARG_ENCODING_LOCAL,
            ArgEncoding::Utf8 => ffi::GS_ARG_ENCODING_UTF8,
            ArgEncoding::Utf16le => ffi::GS_ARG_ENCODING_UTF16LE,
        }
    }
}

/// A typed interpreter parameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f32),
    String(String),
}

impl ParamValue {
    /// The kind tag of this value
    pub fn kind(&self) -> ParamKind {
        match self {
            ParamValue::Bool(_) => ParamKind::Bool,
            ParamValue::Int(_) => ParamKind::Int,
            ParamValue::Float(_) => ParamKind::Float,
            ParamValue::String(_) => ParamKind::String,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(v) => write!(f, "{}", v),
            ParamValue::Int(v) => write!(f, "{}", v),
            ParamValue::Float(v) => write!(f, "{}", v),
            ParamValue::String(v) => write!(f, "({})", v),
        }
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        ParamValue::Int(value.into())
    }
}

impl From<f32> for ParamValue {
    fn from(value: f32) -> Self {
        ParamValue::Float(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::String(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::String(value)
    }
}

/// Native parameter type tag used for a [`ParamValue`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKind {
    Bool,
    Int,
    Float,
    String,
}

impl ParamKind {
    pub(crate) fn as_native(self) -> ffi::gs_set_param_type {
        match self {
            ParamKind::Bool => ffi::GS_SPT_BOOL,
            ParamKind::Int => ffi::GS_SPT_I64,
            ParamKind::Float => ffi::GS_SPT_FLOAT,
            // Strings are copied by the library; names are not
            ParamKind::String => ffi::GS_SPT_STRING,
        }
    }
}

/// Class of filesystem access a control path grants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermitKind {
    Reading,
    Writing,
    Control,
}

impl PermitKind {
    pub(crate) fn as_native(self) -> c_int {
        match self {
            PermitKind::Reading => ffi::GS_PERMIT_FILE_READING,
            PermitKind::Writing => ffi::GS_PERMIT_FILE_WRITING,
            PermitKind::Control => ffi::GS_PERMIT_FILE_CONTROL,
        }
    }
}

/// Outcome of feeding one chunk to `run_string_continue`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuation {
    /// The chunk was consumed without the interpreter asking for more
    Accepted { exit_code: i32 },
    /// The interpreter is waiting for further input (not an error)
    NeedInput { exit_code: i32 },
}

impl Continuation {
    pub fn exit_code(&self) -> i32 {
        match self {
            Continuation::Accepted { exit_code } | Continuation::NeedInput { exit_code } => *exit_code,
        }
    }

    pub fn needs_input(&self) -> bool {
        matches!(self, Continuation::NeedInput { .. })
    }
}
