// Job result relay

use crate::systemd::controller::Shared;
use crate::systemd::Msg;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Drain raw job results and forward them tagged with the current unit.
///
/// Sends to `out` are awaited, so a caller that stops draining its channel
/// stalls this loop and, once the internal buffer is full, the bus listener
/// feeding it. A dropped receiver switches the relay to discarding.
pub(crate) async fn relay_messages(
    mut jobs: mpsc::Receiver<String>,
    shared: Arc<Shared>,
    mut out: Option<mpsc::Sender<Msg>>,
    cancel: CancellationToken,
) {
    loop {
        let msg_str = tokio::select! {
            _ = cancel.cancelled() => break,
            received = jobs.recv() => match received {
                Some(text) => text,
                None => break,
            },
        };

        let Some(tx) = &out else {
            tracing::trace!("Discarding job result '{}'", msg_str);
            continue;
        };

        let msg = Msg {
            unit_name: shared.current_unit().await,
            msg_str,
        };

        let delivered = tokio::select! {
            _ = cancel.cancelled() => break,
            sent = tx.send(msg) => sent.is_ok(),
        };

        if !delivered {
            tracing::warn!("Message receiver dropped, discarding further job results");
            out = None;
        }
    }

    tracing::debug!("Message relay stopped");
}
