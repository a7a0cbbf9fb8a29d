// Systemd data models

use serde::{Deserialize, Serialize};
use std::fmt;

/// ServiceScope selects the bus a connection is opened on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceScope {
    /// System-level manager (requires root or polkit)
    #[default]
    System,
    /// Per-user manager (runs in user session)
    User,
}

impl ServiceScope {
    /// Get display label for the scope
    pub fn label(&self) -> &'static str {
        match self {
            ServiceScope::System => "system",
            ServiceScope::User => "user",
        }
    }
}

/// Job mode passed to StartUnit/StopUnit/RestartUnit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobMode {
    #[default]
    Replace,
    Fail,
    Isolate,
    IgnoreDependencies,
    IgnoreRequirements,
}

impl JobMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobMode::Replace => "replace",
            JobMode::Fail => "fail",
            JobMode::Isolate => "isolate",
            JobMode::IgnoreDependencies => "ignore-dependencies",
            JobMode::IgnoreRequirements => "ignore-requirements",
        }
    }
}

/// Connection state transition reported by the connection guard
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionState {
    pub connected: bool,
    /// Reconnect attempts made so far, including this one
    pub total_attempts: usize,
    pub error: Option<String>,
}

/// One iteration of the unit start confirmation loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitCheck {
    pub unit_name: String,
    pub check_count: usize,
}

/// Raw job result text, tagged with the unit that was current when it arrived.
///
/// The tag is best effort: with several units in flight against one relay the
/// marker may already belong to the next operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Msg {
    pub unit_name: String,
    pub msg_str: String,
}

/// Coarse service status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Running,
    Stopped,
    Failed,
    Static,
    Activating,
    Active,
    Enabled,
    Disabled,
    Masked,
    Other,
    Unknown,
}

impl ServiceStatus {
    /// Parse a status word, case-insensitively. Unrecognised words are `Unknown`.
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "running" => ServiceStatus::Running,
            "stopped" => ServiceStatus::Stopped,
            "failed" => ServiceStatus::Failed,
            "static" => ServiceStatus::Static,
            "activating" => ServiceStatus::Activating,
            "active" => ServiceStatus::Active,
            "enabled" => ServiceStatus::Enabled,
            "disabled" => ServiceStatus::Disabled,
            "masked" => ServiceStatus::Masked,
            "other" => ServiceStatus::Other,
            _ => ServiceStatus::Unknown,
        }
    }

    /// Map an `ActiveState` value the way `systemctl is-active` callers expect
    pub fn from_active_state(state: &str) -> Self {
        match state.trim().to_lowercase().as_str() {
            "activating" => ServiceStatus::Activating,
            "active" => ServiceStatus::Active,
            "unknown" => ServiceStatus::Unknown,
            _ => ServiceStatus::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceStatus::Running => "running",
            ServiceStatus::Stopped => "stopped",
            ServiceStatus::Failed => "failed",
            ServiceStatus::Static => "static",
            ServiceStatus::Activating => "activating",
            ServiceStatus::Active => "active",
            ServiceStatus::Enabled => "enabled",
            ServiceStatus::Disabled => "disabled",
            ServiceStatus::Masked => "masked",
            ServiceStatus::Other => "other",
            ServiceStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A service together with the status it has and the status it should have
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub name: String,
    pub current_status: ServiceStatus,
    pub need_status: ServiceStatus,
}

impl Service {
    /// Returns true when the current status already matches the desired one
    pub fn is_satisfied(&self) -> bool {
        self.current_status == self.need_status
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.current_status.fmt(f)
    }
}

/// UnitStatus is one row of the manager's ListUnits reply
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitStatus {
    pub name: String,
    pub description: String,
    pub load_state: String,
    pub active_state: String,
    pub sub_state: String,
    pub followed: String,
    pub path: String,
    pub job_id: u32,
    pub job_type: String,
    pub job_path: String,
}

impl UnitStatus {
    /// Returns true if the unit is currently active/running
    pub fn is_active(&self) -> bool {
        self.active_state == "active"
    }

    /// Returns true if the unit failed
    pub fn is_failed(&self) -> bool {
        self.active_state == "failed"
    }

    /// Returns true if the unit is inactive/stopped
    pub fn is_inactive(&self) -> bool {
        self.active_state == "inactive"
    }

    /// Returns true if the unit is in a transitioning state
    pub fn is_transitioning(&self) -> bool {
        self.active_state == "activating" || self.active_state == "deactivating"
    }
}

/// One change reported by EnableUnitFiles, DisableUnitFiles or MaskUnitFiles
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitFileChange {
    /// "symlink" or "unlink"
    pub change_type: String,
    pub file_name: String,
    pub destination: String,
}

/// A unit property value.
///
/// Only the shapes systemd actually uses for the properties we read are
/// modelled; everything else is kept as its debug rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    Str(String),
    Bool(bool),
    U32(u32),
    U64(u64),
    I32(i32),
    I64(i64),
    StrList(Vec<String>),
    Other(String),
}

impl PropertyValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::Str(s.to_string())
    }
}
