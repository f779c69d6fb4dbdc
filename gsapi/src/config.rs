//! Instance configuration types
//!
//! Everything needed to bring an instance from "created" to "initialised and
//! ready to run" in one declarative value. Applied with
//! [`Instance::configure`](crate::Instance::configure).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::{ArgEncoding, ParamValue, PermitKind};

/// Configuration for one interpreter instance
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstanceConfig {
    /// Encoding for arguments, file names and control paths
    #[serde(default)]
    pub arg_encoding: Option<ArgEncoding>,

    /// Devices tried when no `-sDEVICE` is given
    #[serde(default)]
    pub default_device_list: Option<String>,

    /// Initialisation arguments, including `argv[0]`
    #[serde(default)]
    pub args: Vec<String>,

    /// Typed parameters set after initialisation
    #[serde(default)]
    pub params: BTreeMap<String, ParamValue>,

    /// Permitted filesystem paths
    #[serde(default)]
    pub control_paths: ControlPaths,

    /// Enable (or disable) enforcement of the control paths
    #[serde(default)]
    pub path_control: Option<bool>,
}

/// Permitted filesystem paths, by access kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlPaths {
    #[serde(default)]
    pub read: Vec<String>,
    #[serde(default)]
    pub write: Vec<String>,
    #[serde(default)]
    pub control: Vec<String>,
}

impl ControlPaths {
    /// All paths with their permit kind, reading first
    pub fn iter(&self) -> impl Iterator<Item = (PermitKind, &str)> {
        let read = self.read.iter().map(|p| (PermitKind::Reading, p.as_str()));
        let write = self.write.iter().map(|p| (PermitKind::Writing, p.as_str()));
        let control = self.control.iter().map(|p| (PermitKind::Control, p.as_str()));
        read.chain(write).chain(control)
    }

    pub fn is_empty(&self) -> bool {
        self.read.is_empty() && self.write.is_empty() && self.control.is_empty()
    }

    fn list_mut(&mut self, kind: PermitKind) -> &mut Vec<String> {
        match kind {
            PermitKind::Reading => &mut self.read,
            PermitKind::Writing => &mut self.write,
            PermitKind::Control => &mut self.control,
        }
    }
}

impl InstanceConfig {
    /// Create a new instance configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set the argument encoding
    pub fn with_arg_encoding(mut self, encoding: ArgEncoding) -> Self {
        self.arg_encoding = Some(encoding);
        self
    }

    /// Builder method: set the default device list
    pub fn with_default_device_list(mut self, list: impl Into<String>) -> Self {
        self.default_device_list = Some(list.into());
        self
    }

    /// Builder method: append an initialisation argument
    pub fn add_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Builder method: set a typed parameter
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Builder method: permit access of `kind` to `path`
    pub fn add_control_path(mut self, kind: PermitKind, path: impl Into<String>) -> Self {
        self.control_paths.list_mut(kind).push(path.into());
        self
    }

    /// Builder method: enable or disable path control
    pub fn with_path_control(mut self, enabled: bool) -> Self {
        self.path_control = Some(enabled);
        self
    }

    /// Merge `other` on top of `self`: scalars in `other` win, lists and
    /// parameters are extended.
    pub fn merge(mut self, other: InstanceConfig) -> Self {
        if other.arg_encoding.is_some() {
            self.arg_encoding = other.arg_encoding;
        }
        if other.default_device_list.is_some() {
            self.default_device_list = other.default_device_list;
        }
        if !other.args.is_empty() {
            self.args = other.args;
        }
        self.params.extend(other.params);
        self.control_paths.read.extend(other.control_paths.read);
        self.control_paths.write.extend(other.control_paths.write);
        self.control_paths.control.extend(other.control_paths.control);
        if other.path_control.is_some() {
            self.path_control = other.path_control;
        }
        self
    }
}
