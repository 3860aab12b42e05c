//! Election event log
//!
//! Drains the controller's [`EventBus`](election::EventBus) into the
//! tracing log so that starts, selections and failures of background
//! elections show up next to the request logs.

use election::ElectionEvent;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Log every event from `events` until the bus closes or `shutdown` fires.
///
/// Returns the number of events logged.
pub async fn log_events(
    mut events: broadcast::Receiver<ElectionEvent>,
    shutdown: CancellationToken,
) -> usize {
    let mut logged = 0;
    loop {
        let event = tokio::select! {
            biased;
            received = events.recv() => received,
            _ = shutdown.cancelled() => break,
        };
        match event {
            Ok(event) => {
                log_event(&event);
                logged += 1;
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Election event log fell behind");
            }
            Err(RecvError::Closed) => break,
        }
    }
    debug!(logged, "Election event log stopped");
    logged
}

fn log_event(event: &ElectionEvent) {
    let event_type = event.event_type();
    let guild_id = event.guild_id();
    match event {
        ElectionEvent::RoleMutationFailed { member_id, message, .. } => {
            warn!(event_type, %guild_id, %member_id, %message, "Election event");
        }
        ElectionEvent::ResultRecordFailed { message, .. } => {
            warn!(event_type, %guild_id, %message, "Election event");
        }
        _ if event.is_terminal() => info!(event_type, %guild_id, "Election event"),
        _ => debug!(event_type, %guild_id, ?event, "Election event"),
    }
}
