//! Structured log of every lifecycle event on the bus.

use tokio::sync::broadcast;
use xyplot_events::bus::{EVENT_GENERATION_ERRORED, EVENT_GENERATION_FAILED};
use xyplot_events::SweepEvent;

/// Log events until the bus is closed.
pub async fn run(mut receiver: broadcast::Receiver<SweepEvent>) {
    loop {
        match receiver.recv().await {
            Ok(event) => log_event(&event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Event log lagged behind the bus");
            }
            Err(broadcast::error::RecvError::Closed) => {
                tracing::debug!("Event bus closed, event log stopping");
                break;
            }
        }
    }
}

fn log_event(event: &SweepEvent) {
    let generation_id = event.generation_id;
    let batch_id = event.batch_id.map(|id| id.to_string());
    match event.event_type.as_str() {
        EVENT_GENERATION_FAILED | EVENT_GENERATION_ERRORED => tracing::warn!(
            event_type = %event.event_type,
            ?generation_id,
            ?batch_id,
            payload = %event.payload,
            "Sweep event",
        ),
        _ => tracing::info!(
            event_type = %event.event_type,
            ?generation_id,
            ?batch_id,
            payload = %event.payload,
            "Sweep event",
        ),
    }
}
