use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use pkg_types::event::Notification;
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tracing::info;

use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct WatchQuery {
    #[serde(default)]
    pub namespace: Option<String>,
    /// Also stream stats samples, not just events.
    #[serde(default)]
    pub stats: bool,
    /// Replay retained events with a higher sequence number first.
    #[serde(default)]
    pub seq: Option<u64>,
}

fn namespace_of(notification: &Notification) -> &str {
    match notification {
        Notification::Event(e) => &e.involved_object.namespace,
        Notification::Stats(s) => &s.object.namespace,
    }
}

fn to_sse(query: &WatchQuery, notification: Notification) -> Option<Event> {
    if matches!(notification, Notification::Stats(_)) && !query.stats {
        return None;
    }
    if let Some(ns) = &query.namespace
        && namespace_of(&notification) != ns
    {
        return None;
    }
    let name = match notification {
        Notification::Event(_) => "event",
        Notification::Stats(_) => "stats",
    };
    let data = serde_json::to_string(&notification).ok()?;
    Some(Event::default().event(name).data(data))
}

/// GET /api/v1/watch: SSE stream of notifications. With `?seq=` the retained
/// events after that sequence number are replayed before live ones.
/// Subscribers that fall behind skip the lagged entries.
pub async fn watch_events(
    State(state): State<AppState>,
    Query(query): Query<WatchQuery>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    info!(
        "Watch subscription: namespace={:?}, stats={}, seq={:?}",
        query.namespace, query.stats, query.seq
    );

    // Subscribe before reading the backlog so nothing falls in between
    let rx = state.engine.subscribe();
    let buffered = match query.seq {
        Some(seq) => state.engine.events_since(seq),
        None => Vec::new(),
    };

    let query = Arc::new(query);
    let replay_query = Arc::clone(&query);
    let buffered_stream = tokio_stream::iter(buffered.into_iter().filter_map(move |e| {
        to_sse(&replay_query, Notification::Event(e)).map(Ok::<_, Infallible>)
    }));
    let live_stream = BroadcastStream::new(rx).filter_map(move |result| {
        to_sse(&query, result.ok()?).map(Ok::<_, Infallible>)
    });

    Sse::new(buffered_stream.chain(live_stream)).keep_alive(KeepAlive::default())
}
