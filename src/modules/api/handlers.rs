use bytes::Bytes;
use std::{convert::Infallible, sync::Arc};
use warp::http::StatusCode;

use crate::processor::{Deadline, Disposition, MeasurementHandler};

/// The push subscription treats any 2xx as an ack and anything else as a
/// request to redeliver.
pub async fn push_handler(
    body: Bytes,
    processor: Arc<MeasurementHandler>,
    deadline: Deadline,
) -> Result<impl warp::Reply, Infallible> {
    let outcome = processor.handle(&body, &deadline).await;

    let status = match outcome.disposition() {
        Disposition::Ack => StatusCode::NO_CONTENT,
        Disposition::Nack => StatusCode::SERVICE_UNAVAILABLE,
    };

    Ok(status)
}

pub async fn health_handler() -> Result<impl warp::Reply, Infallible> {
    Ok(StatusCode::OK)
}
