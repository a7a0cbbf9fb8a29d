// Systemd unit-lifecycle controller

use crate::config::Config;
use crate::error::{Result, SysguardError};
use crate::systemd::control::validate_unit_name;
use crate::systemd::relay::relay_messages;
use crate::systemd::resilience::{Backoff, ConnectionGuard};
use crate::systemd::{
    BusConnector, ConnectionState, DbusConnector, Msg, ServiceStatus, SystemdBus, UnitCheck,
    UnitFileChange, UnitStatus,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub(crate) const ACTIVE_STATE: &str = "ActiveState";
const FRAGMENT_PATH: &str = "FragmentPath";

/// State shared between the controller, the connection guard and the relay
pub(crate) struct Shared {
    bus: RwLock<Option<Arc<dyn SystemdBus>>>,
    current_unit: RwLock<String>,
    pub(crate) total_attempts: AtomicUsize,
}

impl Shared {
    fn new(bus: Arc<dyn SystemdBus>) -> Self {
        Self {
            bus: RwLock::new(Some(bus)),
            current_unit: RwLock::new(String::new()),
            total_attempts: AtomicUsize::new(0),
        }
    }

    pub(crate) async fn current_bus(&self) -> Option<Arc<dyn SystemdBus>> {
        self.bus.read().await.clone()
    }

    /// The live handle, or `NotConnected`
    pub(crate) async fn bus(&self) -> Result<Arc<dyn SystemdBus>> {
        self.current_bus()
            .await
            .ok_or_else(|| SysguardError::NotConnected.into())
    }

    pub(crate) async fn replace_bus(&self, bus: Option<Arc<dyn SystemdBus>>) {
        *self.bus.write().await = bus;
    }

    pub(crate) async fn current_unit(&self) -> String {
        self.current_unit.read().await.clone()
    }

    async fn set_current_unit(&self, unit: &str) {
        let mut current = self.current_unit.write().await;
        current.clear();
        current.push_str(unit);
    }
}

/// Optional channels the controller reports on.
///
/// Every channel is optional. Sends are awaited: a registered receiver that is
/// never drained blocks the task reporting to it (the guard, the relay, or the
/// caller running a unit start).
#[derive(Debug, Clone, Default)]
pub struct Notifiers {
    pub connection_state: Option<mpsc::Sender<ConnectionState>>,
    pub messages: Option<mpsc::Sender<Msg>>,
    pub unit_checks: Option<mpsc::Sender<UnitCheck>>,
}

impl Notifiers {
    pub fn with_connection_state(mut self, tx: mpsc::Sender<ConnectionState>) -> Self {
        self.connection_state = Some(tx);
        self
    }

    pub fn with_messages(mut self, tx: mpsc::Sender<Msg>) -> Self {
        self.messages = Some(tx);
        self
    }

    pub fn with_unit_checks(mut self, tx: mpsc::Sender<UnitCheck>) -> Self {
        self.unit_checks = Some(tx);
        self
    }
}

/// Systemd controller owning one guarded manager connection.
///
/// Start, stop and restart are serialized: only one of them runs at a time and
/// the current unit marker names it.
pub struct Systemd {
    shared: Arc<Shared>,
    op_lock: Mutex<()>,
    pub(crate) config: Config,
    pub(crate) unit_checks: Option<mpsc::Sender<UnitCheck>>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Systemd {
    /// Connect to the bus named by `config.scope`
    pub async fn connect_dbus(config: &Config, notifiers: Notifiers) -> Result<Self> {
        let connector = Arc::new(DbusConnector::from_config(config));
        Self::connect(connector, config.clone(), notifiers, CancellationToken::new()).await
    }

    /// Open the initial connection and start the connection guard and the
    /// message relay. Both stop when `cancel` is cancelled or on `close`.
    pub async fn connect(
        connector: Arc<dyn BusConnector>,
        config: Config,
        notifiers: Notifiers,
        cancel: CancellationToken,
    ) -> Result<Self> {
        config.validate()?;

        let (jobs_tx, jobs_rx) = mpsc::channel(config.channel_capacity);
        let bus = connector.connect(jobs_tx.clone()).await?;
        let shared = Arc::new(Shared::new(bus));
        let cancel = cancel.child_token();

        let relay = tokio::spawn(relay_messages(
            jobs_rx,
            shared.clone(),
            notifiers.messages,
            cancel.clone(),
        ));

        let guard = ConnectionGuard {
            shared: shared.clone(),
            connector,
            jobs: jobs_tx,
            notify: notifiers.connection_state,
            backoff: Backoff::new(config.backoff_initial(), config.backoff_max()),
            health_interval: config.health_check_interval(),
            cancel: cancel.clone(),
        };
        let guard = tokio::spawn(guard.run());

        tracing::info!("Connected to systemd ({} bus)", config.scope.label());

        Ok(Self {
            shared,
            op_lock: Mutex::new(()),
            config,
            unit_checks: notifiers.unit_checks,
            cancel,
            tasks: Mutex::new(vec![relay, guard]),
        })
    }

    pub(crate) async fn bus(&self) -> Result<Arc<dyn SystemdBus>> {
        self.shared.bus().await
    }

    /// Unit the serialized operation in flight (or last run) works on
    pub async fn current_unit(&self) -> String {
        self.shared.current_unit().await
    }

    /// Reconnect attempts made by the connection guard so far
    pub fn total_attempts(&self) -> usize {
        self.shared.total_attempts.load(Ordering::SeqCst)
    }

    pub async fn is_connected(&self) -> bool {
        match self.shared.current_bus().await {
            Some(bus) => bus.is_connected().await,
            None => false,
        }
    }

    /// Reload the daemon, start the unit and wait until it is active
    pub async fn unit_start(&self, unit: &str) -> Result<()> {
        validate_unit_name(unit)?;
        let _op = self.op_lock.lock().await;
        self.shared.set_current_unit(unit).await;
        tracing::info!("Starting {}", unit);

        let mut errors = Vec::new();
        if let Err(e) = self.daemon_reload().await {
            errors.push(e);
        }
        match self.bus().await {
            Ok(bus) => {
                if let Err(e) = bus.start_unit(unit, self.config.job_mode).await {
                    errors.push(e);
                }
            }
            Err(e) => errors.push(e),
        }
        if let Err(e) = self.wait_until_active(unit).await {
            errors.push(e);
        }

        SysguardError::join(errors)
    }

    pub async fn unit_stop(&self, unit: &str) -> Result<()> {
        validate_unit_name(unit)?;
        let _op = self.op_lock.lock().await;
        self.shared.set_current_unit(unit).await;
        tracing::info!("Stopping {}", unit);

        self.bus().await?.stop_unit(unit, self.config.job_mode).await?;
        Ok(())
    }

    /// Restart the unit, give it time to settle, then wait until it is active
    pub async fn unit_restart(&self, unit: &str) -> Result<()> {
        validate_unit_name(unit)?;
        let _op = self.op_lock.lock().await;
        self.shared.set_current_unit(unit).await;
        tracing::info!("Restarting {}", unit);

        self.bus().await?.restart_unit(unit, self.config.job_mode).await?;
        tokio::time::sleep(self.config.restart_settle()).await;

        self.wait_until_active(unit).await
    }

    /// `systemctl enable --now`
    pub async fn unit_start_with_enable(&self, unit: &str) -> Result<()> {
        self.unit_start(unit)
            .await
            .map_err(|e| e.context(format!("start service {}", unit)))?;
        self.enable_service(&[unit]).await?;
        Ok(())
    }

    /// Enable unit files after a best-effort daemon reload
    pub async fn enable_service(&self, units: &[&str]) -> Result<Vec<UnitFileChange>> {
        let units = owned_units(units)?;
        if let Err(e) = self.daemon_reload().await {
            tracing::debug!("Ignoring reload failure before enable: {:#}", e);
        }

        let changes = self.bus().await?.enable_unit_files(&units, false, true).await?;
        tracing::info!("Enabled {}", units.join(","));
        Ok(changes)
    }

    /// `systemctl disable --now` followed by `systemctl mask`
    pub async fn unit_disable_and_mask(&self, units: &[&str]) -> Result<()> {
        let owned = owned_units(units)?;
        let mut errors = Vec::new();

        for unit in units {
            if let Err(e) = self.unit_stop(unit).await {
                errors.push(e);
            }
        }

        self.bus().await?.disable_unit_files(&owned, false).await?;

        if let Err(e) = self.unit_mask(units).await {
            errors.push(e);
        }

        SysguardError::join(errors)
    }

    /// Stop and disable, collecting every failure
    pub async fn unit_stop_disable(&self, units: &[&str]) -> Result<()> {
        let owned = owned_units(units)?;
        let mut errors = Vec::new();

        for unit in units {
            if let Err(e) = self.unit_stop(unit).await {
                errors.push(e);
            }
        }

        match self.bus().await {
            Ok(bus) => {
                if let Err(e) = bus.disable_unit_files(&owned, false).await {
                    errors.push(e);
                }
            }
            Err(e) => errors.push(e),
        }

        SysguardError::join(errors)
    }

    pub async fn unit_mask(&self, units: &[&str]) -> Result<Vec<UnitFileChange>> {
        let units = owned_units(units)?;
        let changes = self.bus().await?.mask_unit_files(&units, false, true).await?;
        tracing::info!("Masked {}", units.join(","));
        Ok(changes)
    }

    pub async fn daemon_reload(&self) -> Result<()> {
        self.bus().await?.reload().await
    }

    /// Path of the unit file backing `unit`
    pub async fn unit_fragment_path(&self, unit: &str) -> Result<String> {
        validate_unit_name(unit)?;
        let _op = self.op_lock.lock().await;
        self.shared.set_current_unit(unit).await;

        self.unit_some_property(unit, FRAGMENT_PATH).await
    }

    /// Read one string property exactly as systemd reports it
    pub async fn unit_some_property(&self, unit: &str, property: &str) -> Result<String> {
        validate_unit_name(unit)?;
        let props = self.bus().await?.unit_properties(unit).await?;

        match props.get(property).and_then(|value| value.as_str()) {
            Some(value) => Ok(value.to_string()),
            None => Err(SysguardError::PropertyNotFound {
                unit: unit.to_string(),
                property: property.to_string(),
            }
            .into()),
        }
    }

    /// True only if ActiveState reads "active"; lookup failures count as inactive
    pub async fn unit_is_active(&self, unit: &str) -> bool {
        matches!(self.unit_some_property(unit, ACTIVE_STATE).await, Ok(state) if state == "active")
    }

    /// `systemctl is-active`, coarsened to a ServiceStatus
    pub async fn unit_is_active_status(&self, unit: &str) -> ServiceStatus {
        match self.unit_some_property(unit, ACTIVE_STATE).await {
            Ok(state) => ServiceStatus::from_active_state(&state),
            Err(e) => {
                tracing::debug!("ActiveState of {} unavailable: {:#}", unit, e);
                ServiceStatus::Unknown
            }
        }
    }

    /// The loaded unit named exactly `unit`
    pub async fn unit_list_filter_by_name(&self, unit: &str) -> Result<UnitStatus> {
        validate_unit_name(unit)?;
        let _op = self.op_lock.lock().await;
        self.shared.set_current_unit(unit).await;

        self.bus()
            .await?
            .list_units()
            .await?
            .into_iter()
            .find(|status| status.name == unit)
            .ok_or_else(|| SysguardError::ServiceNotExist(unit.to_string()).into())
    }

    /// Stop the guard and relay and drop the connection
    pub async fn close(&self) -> Result<()> {
        self.cancel.cancel();

        let tasks = std::mem::take(&mut *self.tasks.lock().await);
        for task in tasks {
            if let Err(e) = task.await {
                tracing::warn!("Background task ended abnormally: {}", e);
            }
        }

        self.shared.replace_bus(None).await;
        tracing::info!("Systemd controller closed");
        Ok(())
    }
}

impl Drop for Systemd {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn owned_units(units: &[&str]) -> Result<Vec<String>> {
    units
        .iter()
        .map(|unit| {
            validate_unit_name(unit)?;
            Ok(unit.to_string())
        })
        .collect()
}
