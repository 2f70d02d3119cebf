//! Server-Sent Events stream
//!
//! Every [`AirwaveEvent`] on the bus is serialized to one SSE message, named
//! by its event type. The player shim filters for `PlayerCommand` events;
//! dashboards can watch everything. Lagged subscribers silently skip the
//! events they missed rather than erroring the stream.

use std::convert::Infallible;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use futures::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tracing::debug;

use super::AppState;

pub async fn events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.engine.state.event_bus.subscribe();
    debug!("SSE subscriber connected");

    let stream = BroadcastStream::new(rx).filter_map(|result| async move {
        match result {
            Ok(event) => {
                let data = serde_json::to_string(&event).ok()?;
                Some(Ok(Event::default().event(event.event_type()).data(data)))
            }
            // Lagged receiver: drop what was missed, keep the stream alive.
            Err(_) => None,
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
