// Systemd unit control calls

use crate::error::{Result, SysguardError};
use crate::systemd::client::DbusBus;
use crate::systemd::{JobMode, UnitFileChange};
use zbus::zvariant::OwnedObjectPath;

impl DbusBus {
    /// Enqueue a StartUnit/StopUnit/RestartUnit job and hand its path to the
    /// tracker so its result gets forwarded
    pub(crate) async fn enqueue_job(
        &self,
        method: &'static str,
        operation: &'static str,
        unit: &str,
        mode: JobMode,
    ) -> Result<String> {
        let job: OwnedObjectPath = self
            .manager
            .call(method, &(unit, mode.as_str()))
            .await
            .map_err(|e| control_error(unit, operation, e))?;

        let job = job.as_str().to_string();
        let finished = self.tracker.lock().await.track(&job);
        tracing::debug!("Enqueued {} job {} for {}", operation, job, unit);

        if let Some(result) = finished {
            tracing::debug!("Job {} finished before its enqueue returned: {}", job, result);
            if self.jobs.send(result).await.is_err() {
                tracing::debug!("Job result receiver is gone");
            }
        }
        Ok(job)
    }

    /// Reload the systemd daemon configuration
    pub(crate) async fn reload_daemon(&self) -> Result<()> {
        self.manager
            .call::<_, _, ()>("Reload", &())
            .await
            .map_err(|e| control_error("systemd", "reload", e))?;

        Ok(())
    }

    /// Enable unit files (creates symlinks)
    pub(crate) async fn enable_files(
        &self,
        units: &[String],
        runtime: bool,
        force: bool,
    ) -> Result<Vec<UnitFileChange>> {
        // EnableUnitFiles returns (carries_install_info, changes)
        let (carries_install_info, changes): (bool, Vec<(String, String, String)>) = self
            .manager
            .call("EnableUnitFiles", &(units, runtime, force))
            .await
            .map_err(|e| control_error(&units.join(","), "enable", e))?;

        if !carries_install_info {
            tracing::debug!("Units {:?} carry no [Install] section", units);
        }

        Ok(into_changes(changes))
    }

    /// Disable unit files (removes symlinks)
    pub(crate) async fn disable_files(
        &self,
        units: &[String],
        runtime: bool,
    ) -> Result<Vec<UnitFileChange>> {
        let changes: Vec<(String, String, String)> = self
            .manager
            .call("DisableUnitFiles", &(units, runtime))
            .await
            .map_err(|e| control_error(&units.join(","), "disable", e))?;

        Ok(into_changes(changes))
    }

    /// Mask unit files (links them to /dev/null)
    pub(crate) async fn mask_files(
        &self,
        units: &[String],
        runtime: bool,
        force: bool,
    ) -> Result<Vec<UnitFileChange>> {
        let changes: Vec<(String, String, String)> = self
            .manager
            .call("MaskUnitFiles", &(units, runtime, force))
            .await
            .map_err(|e| control_error(&units.join(","), "mask", e))?;

        Ok(into_changes(changes))
    }
}

fn into_changes(changes: Vec<(String, String, String)>) -> Vec<UnitFileChange> {
    changes
        .into_iter()
        .map(|(change_type, file_name, destination)| UnitFileChange {
            change_type,
            file_name,
            destination,
        })
        .collect()
}

/// Translate a failed manager call, calling out polkit denials
pub(crate) fn control_error(unit: &str, operation: &'static str, e: zbus::Error) -> SysguardError {
    let error_msg = e.to_string();
    let message = if error_msg.contains("Access denied") || error_msg.contains("Authentication") {
        "Access denied. Authentication required - ensure polkit agent is running or use sudo."
            .to_string()
    } else {
        error_msg
    };

    SysguardError::UnitOperation {
        unit: unit.to_string(),
        operation,
        message,
    }
}

/// systemd's UNIT_NAME_MAX less the terminating NUL
const UNIT_NAME_MAX: usize = 255;

/// Validate unit name format and prevent injection
pub fn validate_unit_name(unit: &str) -> Result<()> {
    let reason = if unit.is_empty() {
        "name cannot be empty"
    } else if unit.len() > UNIT_NAME_MAX {
        "name is longer than 255 bytes"
    } else if unit.contains("..") || unit.contains('/') {
        "name must not contain path components"
    } else if unit.contains('\0') {
        "name must not contain NUL"
    } else {
        return Ok(());
    };

    Err(SysguardError::InvalidUnitName {
        unit: unit.to_string(),
        reason,
    }
    .into())
}
