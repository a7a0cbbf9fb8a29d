// Connection guard: keeps the shared D-Bus handle alive with exponential backoff

use crate::systemd::controller::Shared;
use crate::systemd::{BusConnector, ConnectionState};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Exponential backoff between reconnect attempts
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// Delay the next failure will wait
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Return the delay to wait now and double the following one, capped at max
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

/// Background loop owning reconnection of the shared handle
pub(crate) struct ConnectionGuard {
    pub(crate) shared: Arc<Shared>,
    pub(crate) connector: Arc<dyn BusConnector>,
    /// Handed to every new connection so job results keep reaching the relay
    pub(crate) jobs: mpsc::Sender<String>,
    pub(crate) notify: Option<mpsc::Sender<ConnectionState>>,
    pub(crate) backoff: Backoff,
    pub(crate) health_interval: Duration,
    pub(crate) cancel: CancellationToken,
}

impl ConnectionGuard {
    pub(crate) async fn run(mut self) {
        tracing::debug!("Connection guard started");

        while !self.cancel.is_cancelled() {
            let healthy = match self.shared.current_bus().await {
                Some(bus) => bus.is_connected().await,
                None => false,
            };

            if healthy {
                if !self.sleep(self.health_interval).await {
                    break;
                }
                continue;
            }

            let attempts = self.shared.total_attempts.fetch_add(1, Ordering::SeqCst) + 1;
            tracing::info!("Systemd connection lost, reconnect attempt {}", attempts);

            match self.connector.connect(self.jobs.clone()).await {
                Ok(bus) => {
                    self.shared.replace_bus(Some(bus)).await;
                    tracing::info!("Reconnected to systemd after {} attempts", attempts);
                    self.report(ConnectionState {
                        connected: true,
                        total_attempts: attempts,
                        error: None,
                    })
                    .await;
                    self.backoff.reset();
                }
                Err(e) => {
                    tracing::warn!("Reconnect attempt {} failed: {:#}", attempts, e);
                    self.report(ConnectionState {
                        connected: false,
                        total_attempts: attempts,
                        error: Some(format!("{:#}", e)),
                    })
                    .await;

                    let delay = self.backoff.next_delay();
                    tracing::debug!("Retrying in {:?}...", delay);
                    if !self.sleep(delay).await {
                        break;
                    }
                }
            }
        }

        tracing::info!("Connection guard shutdown");
    }

    /// Sleep unless cancelled first; false means stop
    async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }

    async fn report(&self, state: ConnectionState) {
        let Some(tx) = &self.notify else {
            return;
        };

        tokio::select! {
            _ = self.cancel.cancelled() => {}
            sent = tx.send(state) => {
                if sent.is_err() {
                    tracing::debug!("Connection state receiver dropped");
                }
            }
        }
    }
}
