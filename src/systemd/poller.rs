// Unit start confirmation

use crate::error::{Result, SysguardError};
use crate::systemd::controller::ACTIVE_STATE;
use crate::systemd::{Systemd, UnitCheck};

impl Systemd {
    /// Poll ActiveState until the unit is active, re-issuing the start while
    /// it isn't. Bounded by the unit check timeout.
    pub(crate) async fn wait_until_active(&self, unit: &str) -> Result<()> {
        let timeout = self.config.unit_check_timeout();

        match tokio::time::timeout(timeout, self.poll_active_state(unit)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!("{} not active after {:?}", unit, timeout);
                Err(SysguardError::Timeout {
                    unit: unit.to_string(),
                    timeout,
                }
                .into())
            }
        }
    }

    async fn poll_active_state(&self, unit: &str) -> Result<()> {
        let mut check_count = 0;

        loop {
            check_count += 1;
            if let Some(tx) = &self.unit_checks {
                let check = UnitCheck {
                    unit_name: unit.to_string(),
                    check_count,
                };
                if tx.send(check).await.is_err() {
                    tracing::debug!("Unit check receiver dropped");
                }
            }

            let state = self
                .unit_some_property(unit, ACTIVE_STATE)
                .await
                .map_err(|e| e.context(format!("checking {}", unit)))?;

            if state == "active" {
                tracing::info!("{} is active after {} checks", unit, check_count);
                return Ok(());
            }

            tracing::debug!("{} is {} (check {}), re-issuing start", unit, state, check_count);
            if let Err(e) = self.bus().await?.start_unit(unit, self.config.job_mode).await {
                tracing::debug!("Re-issued start of {} failed: {:#}", unit, e);
            }
            tokio::time::sleep(self.config.unit_retry_interval()).await;
        }
    }
}
