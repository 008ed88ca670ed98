use std::sync::Arc;

use actix_web::web::Bytes;
use futures::Stream;
use futures::stream;
use serde::Serialize;
use tokio::sync::watch;

use crate::cache::{AppointmentCache, CacheStatus};
use crate::consumer::MountedConsumer;
use crate::error::RefreshError;
use crate::models::appointment::{Appointment, AppointmentSnapshot};

#[derive(Debug, Serialize)]
pub struct AppointmentsView {
    pub upcoming: Vec<Appointment>,
    pub status: CacheStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AppointmentsView {
    fn new(snapshot: &AppointmentSnapshot, status: CacheStatus) -> Self {
        Self {
            upcoming: snapshot.upcoming.clone(),
            status,
            error: None,
        }
    }

    /// Cached data together with the reason it could not be refreshed.
    pub fn stale(cache: &AppointmentCache, err: &RefreshError) -> Self {
        Self {
            error: Some(err.to_string()),
            ..current_appointments(cache)
        }
    }
}

pub fn current_appointments(cache: &AppointmentCache) -> AppointmentsView {
    AppointmentsView::new(&cache.read(), cache.status())
}

pub async fn refresh_appointments(
    cache: &AppointmentCache,
    force: bool,
) -> Result<AppointmentsView, RefreshError> {
    let snapshot = if force {
        cache.force_refresh().await?
    } else {
        cache.refresh().await?
    };
    Ok(AppointmentsView::new(&snapshot, cache.status()))
}

fn sse_frame(snapshot: &AppointmentSnapshot) -> Result<Bytes, actix_web::Error> {
    let json = serde_json::to_string(snapshot).map_err(actix_web::error::ErrorInternalServerError)?;
    Ok(Bytes::from(format!("event: appointments\ndata: {json}\n\n")))
}

fn error_frame(err: &RefreshError) -> Result<Bytes, actix_web::Error> {
    let json = serde_json::json!({ "error": err.to_string() });
    Ok(Bytes::from(format!("event: error\ndata: {json}\n\n")))
}

enum Phase {
    Initial,
    Loading,
    Live,
}

/// Server-sent events for one connected client. The client is a mounted
/// consumer for as long as the stream is alive and only ever sees the
/// latest snapshot.
pub fn appointment_events(
    cache: AppointmentCache,
) -> impl Stream<Item = Result<Bytes, actix_web::Error>> {
    let (tx, rx) = watch::channel::<Option<Arc<AppointmentSnapshot>>>(None);
    let tx = Arc::new(tx);
    let consumer = MountedConsumer::mount(&cache, "event-stream", {
        let tx = Arc::clone(&tx);
        move |snapshot| {
            tx.send_replace(Some(snapshot));
        }
    });
    // A snapshot pushed between subscribe and read is at least as new.
    let initial = consumer.initial();
    tx.send_if_modified(|slot| {
        if slot.is_some() {
            return false;
        }
        *slot = Some(initial);
        true
    });

    stream::unfold(
        (Phase::Initial, rx, consumer),
        |(phase, mut rx, mut consumer)| async move {
            match phase {
                Phase::Initial => {}
                Phase::Loading => {
                    if let Err(e) = consumer.loaded().await {
                        return Some((error_frame(&e), (Phase::Live, rx, consumer)));
                    }
                    rx.changed().await.ok()?;
                }
                Phase::Live => rx.changed().await.ok()?,
            }
            let next = rx.borrow_and_update().clone()?;
            let phase = match phase {
                Phase::Initial => Phase::Loading,
                _ => Phase::Live,
            };
            Some((sse_frame(&next), (phase, rx, consumer)))
        },
    )
}
