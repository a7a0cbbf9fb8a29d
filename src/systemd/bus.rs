// The systemd manager verbs the controller depends on

use crate::error::Result;
use crate::systemd::{JobMode, PropertyValue, UnitFileChange, UnitStatus};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

/// A live connection to a systemd manager.
///
/// Job-affecting calls return the job object path. The job's result string is
/// delivered later on the channel the connection was created with.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SystemdBus: Send + Sync {
    /// Cheap liveness probe
    async fn is_connected(&self) -> bool;

    async fn reload(&self) -> Result<()>;

    async fn start_unit(&self, unit: &str, mode: JobMode) -> Result<String>;

    async fn stop_unit(&self, unit: &str, mode: JobMode) -> Result<String>;

    async fn restart_unit(&self, unit: &str, mode: JobMode) -> Result<String>;

    async fn enable_unit_files(
        &self,
        units: &[String],
        runtime: bool,
        force: bool,
    ) -> Result<Vec<UnitFileChange>>;

    async fn disable_unit_files(&self, units: &[String], runtime: bool) -> Result<Vec<UnitFileChange>>;

    async fn mask_unit_files(
        &self,
        units: &[String],
        runtime: bool,
        force: bool,
    ) -> Result<Vec<UnitFileChange>>;

    async fn unit_properties(&self, unit: &str) -> Result<HashMap<String, PropertyValue>>;

    async fn list_units(&self) -> Result<Vec<UnitStatus>>;
}

/// Opens new connections for the connection guard
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BusConnector: Send + Sync {
    /// Connect and start forwarding job results into `jobs`
    async fn connect(&self, jobs: mpsc::Sender<String>) -> Result<Arc<dyn SystemdBus>>;
}
