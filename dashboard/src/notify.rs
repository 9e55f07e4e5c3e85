use crate::event::Event;
use crate::metrics::NOTIFICATIONS_TOTAL;
use crate::reconciler::Reconciler;
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::post,
    Router,
};
use chrono::FixedOffset;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

const REQUEST_ID: &str = "x-m2m-ri";
const RESULT_CODE: &str = "x-m2m-rsc";
/// `OK` response status code expected by the broker for a delivered notification.
const ACK_RSC: &str = "2000";

/// Raw notification bodies in delivery order.
pub type NotificationSender = mpsc::UnboundedSender<Bytes>;
pub type NotificationReceiver = mpsc::UnboundedReceiver<Bytes>;

pub fn channel() -> (NotificationSender, NotificationReceiver) {
    mpsc::unbounded_channel()
}

#[derive(Clone)]
struct NotifyState {
    tx: NotificationSender,
}

/// Notification endpoint advertised as the dashboard AE's point of access.
pub fn create_router(tx: NotificationSender) -> Router {
    Router::new()
        .route("/", post(receive))
        .with_state(NotifyState { tx })
}

/// Acknowledges right away; the body is handed to [`run_notifications`].
async fn receive(
    State(state): State<NotifyState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    NOTIFICATIONS_TOTAL.inc();
    debug!("Notification of {} bytes", body.len());

    if state.tx.send(body).is_err() {
        error!("Notification consumer stopped, dropping delivery");
    }

    let mut reply = HeaderMap::new();
    reply.insert(
        HeaderName::from_static(RESULT_CODE),
        HeaderValue::from_static(ACK_RSC),
    );
    if let Some(ri) = headers.get(REQUEST_ID) {
        reply.insert(HeaderName::from_static(REQUEST_ID), ri.clone());
    }
    (StatusCode::OK, reply)
}

/// Decodes and applies notifications one at a time, in the order they were
/// received. Returns once every sender is dropped and the backlog is empty.
pub async fn run_notifications(
    mut rx: NotificationReceiver,
    reconciler: Arc<Reconciler>,
    offset: FixedOffset,
) {
    info!("Starting notification consumer");
    while let Some(body) = rx.recv().await {
        let event = Event::decode(&body, &offset);
        reconciler.handle(event).await;
    }
    info!("Notification consumer stopped");
}
