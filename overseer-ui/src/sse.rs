//! Server-Sent Events stream of published views.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use overseer::core::view::View;
use tracing::{debug, warn};

use crate::state::AppState;

/// SSE endpoint handler.
///
/// Emits the current view on connect and after every change. A `reload` event
/// precedes the view whenever the presentation epoch advanced (after a kill),
/// telling clients to drop any local presentation state.
pub async fn events_handler(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut views = state.sync.subscribe();

    let stream = async_stream::stream! {
        let mut epoch = None;
        loop {
            let view = views.borrow_and_update().clone();
            if epoch_advanced(epoch, view.presentation_epoch) {
                debug!(epoch = view.presentation_epoch, "broadcasting reload");
                yield Ok(Event::default().event("reload").data(view.presentation_epoch.to_string()));
            }
            epoch = Some(view.presentation_epoch);

            match view_event(&view) {
                Ok(event) => yield Ok(event),
                Err(err) => warn!(error = %err, "failed to serialize view"),
            }

            if views.changed().await.is_err() {
                // Synchronizer stopped.
                break;
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

fn epoch_advanced(previous: Option<u64>, current: u64) -> bool {
    previous.is_some_and(|previous| previous != current)
}

fn view_event(view: &View) -> Result<Event, serde_json::Error> {
    let json = serde_json::to_string(view)?;
    Ok(Event::default().event("view").data(json))
}
