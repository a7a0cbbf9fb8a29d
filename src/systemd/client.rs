// Systemd D-Bus client using zbus

use crate::config::Config;
use crate::error::{Result, SysguardError};
use crate::systemd::{
    BusConnector, JobMode, PropertyValue, ServiceScope, SystemdBus, UnitFileChange, UnitStatus,
};
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use zbus::zvariant::{OwnedObjectPath, OwnedValue};
use zbus::Connection;

pub(crate) const SYSTEMD_DESTINATION: &str = "org.freedesktop.systemd1";
pub(crate) const SYSTEMD_PATH: &str = "/org/freedesktop/systemd1";
pub(crate) const MANAGER_INTERFACE: &str = "org.freedesktop.systemd1.Manager";

/// Finished jobs remembered while their enqueue call may still be in flight
const EARLY_RESULTS_CAP: usize = 64;

/// Matches JobRemoved signals against the jobs we enqueued.
///
/// A job can finish before the call that enqueued it returns its path, so
/// results for unknown paths are kept in a small ring until claimed.
#[derive(Debug, Default)]
pub(crate) struct JobTracker {
    pending: HashSet<String>,
    early: VecDeque<(String, String)>,
}

impl JobTracker {
    /// Record a job we enqueued. Returns its result if it already finished.
    pub(crate) fn track(&mut self, job: &str) -> Option<String> {
        if let Some(pos) = self.early.iter().position(|(path, _)| path == job) {
            return self.early.remove(pos).map(|(_, result)| result);
        }
        self.pending.insert(job.to_string());
        None
    }

    /// Settle a finished job. Returns true when it was one of ours.
    pub(crate) fn finish(&mut self, job: &str, result: &str) -> bool {
        if self.pending.remove(job) {
            return true;
        }
        if self.early.len() == EARLY_RESULTS_CAP {
            self.early.pop_front();
        }
        self.early.push_back((job.to_string(), result.to_string()));
        false
    }
}

/// Systemd manager connection with job-result forwarding
pub struct DbusBus {
    pub(crate) connection: Connection,
    pub(crate) manager: zbus::Proxy<'static>,
    pub(crate) tracker: Arc<Mutex<JobTracker>>,
    /// Where results of our jobs go, shared with the signal listener
    pub(crate) jobs: mpsc::Sender<String>,
    listener: JoinHandle<()>,
}

impl DbusBus {
    /// Wrap an open connection, subscribe to manager signals and start
    /// forwarding results of our own jobs into `jobs`
    pub async fn new(connection: Connection, jobs: mpsc::Sender<String>) -> Result<Self> {
        let manager = zbus::Proxy::new(
            &connection,
            SYSTEMD_DESTINATION,
            SYSTEMD_PATH,
            MANAGER_INTERFACE,
        )
        .await
        .map_err(|e| SysguardError::SystemdConnection(e.to_string()))?;

        // The manager only emits job signals to subscribed clients
        manager
            .call_method("Subscribe", &())
            .await
            .map_err(|e| SysguardError::SystemdConnection(format!("Subscribe failed: {}", e)))?;

        let signals = manager
            .receive_signal("JobRemoved")
            .await
            .map_err(|e| SysguardError::SystemdConnection(e.to_string()))?;

        let tracker = Arc::new(Mutex::new(JobTracker::default()));
        let listener = tokio::spawn(forward_job_results(signals, tracker.clone(), jobs.clone()));

        Ok(Self {
            connection,
            manager,
            tracker,
            jobs,
            listener,
        })
    }

    /// Get unit properties from systemd
    async fn get_unit_properties(&self, unit_name: &str) -> Result<HashMap<String, OwnedValue>> {
        // LoadUnit works for both loaded and not-loaded units, unlike GetUnit
        let unit_path: OwnedObjectPath = self
            .manager
            .call("LoadUnit", &(unit_name,))
            .await
            .map_err(|e| SysguardError::UnitOperation {
                unit: unit_name.to_string(),
                operation: "load",
                message: e.to_string(),
            })?;

        let props_proxy = zbus::fdo::PropertiesProxy::builder(&self.connection)
            .destination(SYSTEMD_DESTINATION)?
            .path(unit_path.as_str())?
            .build()
            .await
            .map_err(|e| SysguardError::SystemdConnection(e.to_string()))?;

        use zbus::zvariant::Optional;
        let props = props_proxy
            .get_all(Optional::default())
            .await
            .map_err(|e| SysguardError::UnitOperation {
                unit: unit_name.to_string(),
                operation: "read properties of",
                message: e.to_string(),
            })?;

        Ok(props)
    }

    async fn list_loaded_units(&self) -> Result<Vec<UnitStatus>> {
        // ListUnits returns array of (name, description, load_state, active_state, sub_state,
        //                             followed, unit_path, job_id, job_type, job_path)
        #[allow(clippy::type_complexity)]
        let units: Vec<(
            String,
            String,
            String,
            String,
            String,
            String,
            OwnedObjectPath,
            u32,
            String,
            OwnedObjectPath,
        )> = self
            .manager
            .call("ListUnits", &())
            .await
            .map_err(|e| SysguardError::SystemdConnection(format!("ListUnits failed: {}", e)))?;

        Ok(units
            .into_iter()
            .map(
                |(name, description, load_state, active_state, sub_state, followed, path, job_id, job_type, job_path)| {
                    UnitStatus {
                        name,
                        description,
                        load_state,
                        active_state,
                        sub_state,
                        followed,
                        path: path.as_str().to_string(),
                        job_id,
                        job_type,
                        job_path: job_path.as_str().to_string(),
                    }
                },
            )
            .collect())
    }
}

impl Drop for DbusBus {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

#[async_trait]
impl SystemdBus for DbusBus {
    async fn is_connected(&self) -> bool {
        self.manager.call_method("ListJobs", &()).await.is_ok()
    }

    async fn reload(&self) -> Result<()> {
        self.reload_daemon().await
    }

    async fn start_unit(&self, unit: &str, mode: JobMode) -> Result<String> {
        self.enqueue_job("StartUnit", "start", unit, mode).await
    }

    async fn stop_unit(&self, unit: &str, mode: JobMode) -> Result<String> {
        self.enqueue_job("StopUnit", "stop", unit, mode).await
    }

    async fn restart_unit(&self, unit: &str, mode: JobMode) -> Result<String> {
        self.enqueue_job("RestartUnit", "restart", unit, mode).await
    }

    async fn enable_unit_files(
        &self,
        units: &[String],
        runtime: bool,
        force: bool,
    ) -> Result<Vec<UnitFileChange>> {
        self.enable_files(units, runtime, force).await
    }

    async fn disable_unit_files(&self, units: &[String], runtime: bool) -> Result<Vec<UnitFileChange>> {
        self.disable_files(units, runtime).await
    }

    async fn mask_unit_files(
        &self,
        units: &[String],
        runtime: bool,
        force: bool,
    ) -> Result<Vec<UnitFileChange>> {
        self.mask_files(units, runtime, force).await
    }

    async fn unit_properties(&self, unit: &str) -> Result<HashMap<String, PropertyValue>> {
        let props = self.get_unit_properties(unit).await?;
        Ok(props
            .iter()
            .map(|(name, value)| (name.clone(), to_property_value(value)))
            .collect())
    }

    async fn list_units(&self) -> Result<Vec<UnitStatus>> {
        self.list_loaded_units().await
    }
}

/// Forward results of jobs known to `tracker` until the signal stream or the
/// receiving side goes away
async fn forward_job_results(
    mut signals: zbus::proxy::SignalStream<'static>,
    tracker: Arc<Mutex<JobTracker>>,
    jobs: mpsc::Sender<String>,
) {
    while let Some(message) = signals.next().await {
        // JobRemoved(u id, o job, s unit, s result)
        let (id, job, unit, result): (u32, OwnedObjectPath, String, String) =
            match message.body().deserialize() {
                Ok(body) => body,
                Err(e) => {
                    tracing::warn!("Malformed JobRemoved signal: {}", e);
                    continue;
                }
            };

        if !tracker.lock().await.finish(job.as_str(), &result) {
            continue;
        }

        tracing::debug!("Job {} for {} finished: {}", id, unit, result);
        if jobs.send(result).await.is_err() {
            break;
        }
    }
    tracing::debug!("Job signal listener stopped");
}

/// Narrow a D-Bus variant to the closed set of shapes we model
fn to_property_value(value: &OwnedValue) -> PropertyValue {
    if let Ok(s) = value.downcast_ref::<String>() {
        return PropertyValue::Str(s);
    }
    if let Ok(b) = value.downcast_ref::<bool>() {
        return PropertyValue::Bool(b);
    }
    if let Ok(n) = value.downcast_ref::<u32>() {
        return PropertyValue::U32(n);
    }
    if let Ok(n) = value.downcast_ref::<u64>() {
        return PropertyValue::U64(n);
    }
    if let Ok(n) = value.downcast_ref::<i32>() {
        return PropertyValue::I32(n);
    }
    if let Ok(n) = value.downcast_ref::<i64>() {
        return PropertyValue::I64(n);
    }
    if let Ok(arr) = value.downcast_ref::<zbus::zvariant::Array>() {
        return PropertyValue::StrList(
            arr.iter()
                .filter_map(|item| item.downcast_ref::<String>().ok())
                .collect(),
        );
    }
    PropertyValue::Other(format!("{:?}", value))
}

/// Opens systemd manager connections on the configured bus
#[derive(Debug, Clone)]
pub struct DbusConnector {
    scope: ServiceScope,
    connection_timeout: Duration,
}

impl DbusConnector {
    pub fn new(scope: ServiceScope, connection_timeout: Duration) -> Self {
        Self {
            scope,
            connection_timeout,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.scope, config.connect_timeout())
    }

    async fn open(&self) -> Result<Connection> {
        let connect = async {
            match self.scope {
                ServiceScope::System => Connection::system().await,
                ServiceScope::User => Connection::session().await,
            }
        };

        let conn = tokio::time::timeout(self.connection_timeout, connect)
            .await
            .map_err(|_| SysguardError::SystemdConnection("Connection timeout".to_string()))?
            .map_err(|e| SysguardError::SystemdConnection(format!("Failed to connect: {}", e)))?;

        Ok(conn)
    }
}

#[async_trait]
impl BusConnector for DbusConnector {
    async fn connect(&self, jobs: mpsc::Sender<String>) -> Result<Arc<dyn SystemdBus>> {
        let connection = self.open().await?;
        tracing::debug!("Connected to {} bus", self.scope.label());
        let bus = DbusBus::new(connection, jobs).await?;
        Ok(Arc::new(bus))
    }
}
